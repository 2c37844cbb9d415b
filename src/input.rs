use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::StringRecord;
use tracing::debug;

use crate::config::ColumnNames;
use crate::error::PipelineError;
use crate::reference::parse_match_date;
use crate::resolver::ScrapedPlayerRow;
use crate::{PlayerId, TeamId};

pub fn read_scraped_rows(path: &Path, columns: &ColumnNames) -> Result<Vec<ScrapedPlayerRow>> {
    let file = File::open(path).with_context(|| format!("open input {}", path.display()))?;
    read_scraped_rows_from(file, columns).with_context(|| format!("read input {}", path.display()))
}

/// Reads cleaned match-player rows. The match id, club and player name
/// columns are required; team id and match date are optional; every other
/// column is kept in `extra`.
pub fn read_scraped_rows_from<R: Read>(
    reader: R,
    columns: &ColumnNames,
) -> Result<Vec<ScrapedPlayerRow>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers().context("read csv header")?.clone();

    let match_idx = require_column(&headers, &columns.match_id)?;
    let club_idx = require_column(&headers, &columns.club)?;
    let name_idx = require_column(&headers, &columns.name)?;
    let team_idx = find_column(&headers, &columns.team_id);
    let date_idx = find_column(&headers, &columns.match_date);
    let known = [Some(match_idx), Some(club_idx), Some(name_idx), team_idx, date_idx];

    let mut out = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("decode csv record {}", line + 2))?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();

        let team_id = team_idx.and_then(|idx| parse_id(&field(idx)));
        let match_date = date_idx.and_then(|idx| {
            let raw = field(idx);
            let date = parse_match_date(&raw);
            if date.is_none() && !raw.is_empty() {
                debug!(line = line + 2, value = %raw, "ignoring unparseable match date");
            }
            date
        });

        let extra = headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| !known.contains(&Some(*idx)))
            .map(|(idx, name)| (name.to_string(), field(idx)))
            .collect::<BTreeMap<_, _>>();

        out.push(ScrapedPlayerRow {
            match_id: field(match_idx),
            player_name: field(name_idx),
            club: field(club_idx),
            team_id,
            match_date,
            extra,
        });
    }
    Ok(out)
}

/// Team reference in a roster snapshot file: either the id or a label that
/// still needs mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotTeam {
    Id(TeamId),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    pub snap_date: NaiveDate,
    pub player_id: PlayerId,
    pub team: SnapshotTeam,
}

pub fn read_snapshot_rows(path: &Path) -> Result<Vec<SnapshotRow>> {
    let file = File::open(path).with_context(|| format!("open snapshots {}", path.display()))?;
    read_snapshot_rows_from(file).with_context(|| format!("read snapshots {}", path.display()))
}

/// Reads a roster snapshot export: a date column (`snap_date` or `date`), a
/// player column (`player_id`, `id` or `ID`) and a team column (`team_id` or
/// `team_name`). Rows with an unusable date or id are skipped.
pub fn read_snapshot_rows_from<R: Read>(reader: R) -> Result<Vec<SnapshotRow>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers().context("read csv header")?.clone();

    let date_idx = find_any(&headers, &["snap_date", "date"]).ok_or_else(|| {
        PipelineError::MissingColumn {
            column: "snap_date".to_string(),
        }
    })?;
    let player_idx = find_any(&headers, &["player_id", "id", "ID"]).ok_or_else(|| {
        PipelineError::MissingColumn {
            column: "player_id".to_string(),
        }
    })?;
    let team_id_idx = find_column(&headers, "team_id");
    let team_name_idx = find_column(&headers, "team_name");
    if team_id_idx.is_none() && team_name_idx.is_none() {
        return Err(PipelineError::MissingColumn {
            column: "team_id".to_string(),
        }
        .into());
    }

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("decode csv record {}", line + 2))?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let (Some(snap_date), Some(player_id)) =
            (parse_match_date(field(date_idx)), parse_id(field(player_idx)))
        else {
            skipped += 1;
            continue;
        };
        let team = match team_id_idx.and_then(|idx| parse_id(field(idx))) {
            Some(team_id) => SnapshotTeam::Id(team_id),
            None => {
                let label = team_name_idx.map(field).unwrap_or("");
                if label.is_empty() {
                    skipped += 1;
                    continue;
                }
                SnapshotTeam::Label(label.to_string())
            }
        };
        out.push(SnapshotRow {
            snap_date,
            player_id,
            team,
        });
    }
    if skipped > 0 {
        debug!(skipped, "snapshot rows without date, player or team");
    }
    Ok(out)
}

fn require_column(headers: &StringRecord, name: &str) -> Result<usize, PipelineError> {
    find_column(headers, name).ok_or_else(|| PipelineError::MissingColumn {
        column: name.to_string(),
    })
}

fn find_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

fn find_any(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| find_column(headers, name))
}

/// Integer ids, tolerating the `7.0` form that spreadsheet exports produce.
fn parse_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<i64>() {
        return Some(id);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 {
        Some(value as i64)
    } else {
        None
    }
}
