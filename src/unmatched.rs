use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

use crate::TeamId;
use crate::resolver::{Diagnostics, MatchStrategy, MissReason, ScrapedPlayerRow};

/// One line of the unmatched log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedRow {
    pub match_id: String,
    pub club: String,
    pub team_id: Option<TeamId>,
    pub match_date: Option<NaiveDate>,
    pub player_name: String,
    pub name_norm: String,
    pub match_strategy: MatchStrategy,
    pub reason: MissReason,
    pub attempted: MatchStrategy,
    pub match_score: Option<u8>,
}

impl UnmatchedRow {
    pub fn new(row: &ScrapedPlayerRow, reason: MissReason, diag: &Diagnostics) -> Self {
        Self {
            match_id: row.match_id.clone(),
            club: row.club.clone(),
            team_id: diag.team_id,
            match_date: diag.match_date,
            player_name: row.player_name.clone(),
            name_norm: diag.name_norm.clone(),
            match_strategy: MatchStrategy::None,
            reason,
            attempted: diag.attempted,
            match_score: diag.best_score,
        }
    }
}

/// Destination for rows that failed resolution.
pub trait UnmatchedSink {
    fn record(&mut self, rows: &[UnmatchedRow]) -> Result<()>;
}

/// Keeps rows in memory; used for dry runs and tests.
impl UnmatchedSink for Vec<UnmatchedRow> {
    fn record(&mut self, rows: &[UnmatchedRow]) -> Result<()> {
        self.extend_from_slice(rows);
        Ok(())
    }
}

/// Append-only CSV log. The header is written only when the file is new or
/// empty. One writer per file at a time.
#[derive(Debug, Clone)]
pub struct UnmatchedLog {
    path: PathBuf,
}

impl UnmatchedLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl UnmatchedSink for UnmatchedLog {
    fn record(&mut self, rows: &[UnmatchedRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let needs_header = fs::metadata(&self.path)
            .map(|meta| meta.len() == 0)
            .unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open unmatched log {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        for row in rows {
            writer
                .serialize(row)
                .with_context(|| format!("write unmatched log {}", self.path.display()))?;
        }
        writer.flush().context("flush unmatched log")?;
        Ok(())
    }
}
