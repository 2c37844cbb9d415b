use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use tracing::info;

use crate::{PlayerId, TeamId};

/// Stand-in `stint_end` for players still on the roster.
pub const OPEN_STINT_END: NaiveDate = match NaiveDate::from_ymd_opt(2100, 1, 1) {
    Some(date) => date,
    None => panic!("invalid open stint sentinel"),
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub team_id: TeamId,
    pub team_abbr: String,
    pub team_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterStint {
    pub player_id: PlayerId,
    pub team_id: TeamId,
    pub stint_start: NaiveDate,
    pub stint_end: NaiveDate,
}

impl RosterStint {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.stint_start <= date && date <= self.stint_end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePlayer {
    pub player_id: PlayerId,
    pub name: String,
}

/// Everything the resolver reads from the store, loaded once per batch.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub teams: Vec<Team>,
    pub roster: Vec<RosterStint>,
    pub players: Vec<ReferencePlayer>,
    pub match_dates: HashMap<String, NaiveDate>,
    /// `(match_id, CLUB)` -> team recorded for that side of the match.
    pub match_teams: HashMap<(String, String), TeamId>,
}

/// Loads all reference relations. Any failure aborts the batch; there is no
/// partial mode.
pub fn load_reference(conn: &Connection) -> Result<ReferenceData> {
    let teams = load_teams(conn)?;
    let roster = load_roster(conn)?;
    let players = load_players(conn)?;
    let match_dates = load_match_dates(conn)?;
    let match_teams = load_match_team_map(conn)?;
    info!(
        teams = teams.len(),
        stints = roster.len(),
        players = players.len(),
        matches = match_dates.len(),
        match_teams = match_teams.len(),
        "reference data loaded"
    );
    Ok(ReferenceData {
        teams,
        roster,
        players,
        match_dates,
        match_teams,
    })
}

pub fn load_teams(conn: &Connection) -> Result<Vec<Team>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT team_id, team_abbr, team_name
            FROM teams
            WHERE team_id IS NOT NULL AND team_abbr IS NOT NULL
            ORDER BY team_id ASC
            "#,
        )
        .context("prepare load teams query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Team {
                team_id: row.get(0)?,
                team_abbr: row.get::<_, String>(1)?.trim().to_uppercase(),
                team_name: row.get(2)?,
            })
        })
        .context("query teams")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode teams row")?);
    }
    Ok(out)
}

/// Roster stints; a NULL `stint_end` means the stint is still open.
pub fn load_roster(conn: &Connection) -> Result<Vec<RosterStint>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT player_id, team_id, stint_start, stint_end
            FROM team_roster
            WHERE player_id IS NOT NULL
              AND team_id IS NOT NULL
              AND stint_start IS NOT NULL
            ORDER BY player_id ASC, stint_start ASC
            "#,
        )
        .context("prepare load roster query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RosterStint {
                player_id: row.get(0)?,
                team_id: row.get(1)?,
                stint_start: row.get(2)?,
                stint_end: row
                    .get::<_, Option<NaiveDate>>(3)?
                    .unwrap_or(OPEN_STINT_END),
            })
        })
        .context("query team_roster")?;

    let mut out = Vec::new();
    for row in rows {
        let stint = row.context("decode team_roster row")?;
        if stint.stint_end < stint.stint_start {
            return Err(anyhow!(
                "team_roster stint for player {} on team {} ends ({}) before it starts ({})",
                stint.player_id,
                stint.team_id,
                stint.stint_end,
                stint.stint_start
            ));
        }
        out.push(stint);
    }
    Ok(out)
}

pub fn load_players(conn: &Connection) -> Result<Vec<ReferencePlayer>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT player_id, name
            FROM players_general
            WHERE player_id IS NOT NULL
              AND name IS NOT NULL
              AND TRIM(name) <> ''
            ORDER BY player_id ASC
            "#,
        )
        .context("prepare load players query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ReferencePlayer {
                player_id: row.get(0)?,
                name: row.get(1)?,
            })
        })
        .context("query players_general")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode players_general row")?);
    }
    Ok(out)
}

/// `match_id -> match_date`, used for rows scraped without a date.
/// Unparseable dates are skipped; those rows fall back to whole-history
/// eligibility.
pub fn load_match_dates(conn: &Connection) -> Result<HashMap<String, NaiveDate>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT match_id, match_date
            FROM matches
            WHERE match_id IS NOT NULL AND match_date IS NOT NULL
            "#,
        )
        .context("prepare load match dates query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .context("query matches")?;

    let mut out = HashMap::new();
    for row in rows {
        let (match_id, raw) = row.context("decode matches row")?;
        if let Some(date) = parse_match_date(&raw) {
            out.insert(match_id, date);
        }
    }
    Ok(out)
}

/// Key under which a scraped club label is looked up in the per-match team
/// map: trimmed and uppercased.
pub fn match_club_key(club: &str) -> String {
    club.trim().to_uppercase()
}

/// `(match_id, CLUB) -> team_id` from `match_team_stats`, the team each club
/// label was recorded as in a given match.
pub fn load_match_team_map(conn: &Connection) -> Result<HashMap<(String, String), TeamId>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT match_id, club, team_id
            FROM match_team_stats
            WHERE match_id IS NOT NULL AND club IS NOT NULL AND team_id IS NOT NULL
            "#,
        )
        .context("prepare load match team map query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, TeamId>(2)?,
            ))
        })
        .context("query match_team_stats")?;

    let mut out = HashMap::new();
    for row in rows {
        let (match_id, club, team_id) = row.context("decode match_team_stats row")?;
        let key = match_club_key(&club);
        if key.is_empty() {
            continue;
        }
        out.insert((match_id, key), team_id);
    }
    Ok(out)
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and RFC 3339-ish
/// `YYYY-MM-DDTHH:MM:SS` with an optional suffix.
pub fn parse_match_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    let head = raw.get(..10)?;
    let tail = &raw[10..];
    if tail.starts_with('T') || tail.starts_with(' ') {
        return NaiveDate::parse_from_str(head, "%Y-%m-%d").ok();
    }
    None
}
