use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, params};
use tracing::info;

use crate::attach::{AttachReport, ResolvedRow};
use crate::reference::{ReferencePlayer, Team, match_club_key};
use crate::stints::{RosterSnapshot, Stint, compute_stints};
use crate::TeamId;

const DEFAULT_DB_PATH: &str = "data/mls.sqlite";

/// `MLS_DB_PATH` when set, else `data/mls.sqlite`.
pub fn default_db_path() -> PathBuf {
    db_path_or_default(std::env::var("MLS_DB_PATH").ok().as_deref())
}

fn db_path_or_default(raw: Option<&str>) -> PathBuf {
    match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => PathBuf::from(raw),
        _ => PathBuf::from(DEFAULT_DB_PATH),
    }
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS teams (
            team_id INTEGER PRIMARY KEY,
            team_abbr TEXT NOT NULL,
            team_name TEXT NULL
        );

        CREATE TABLE IF NOT EXISTS players_general (
            player_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS roster_snapshots (
            snap_date TEXT NOT NULL,
            team_id INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            PRIMARY KEY (snap_date, team_id, player_id)
        );

        CREATE TABLE IF NOT EXISTS team_roster (
            player_id INTEGER NOT NULL,
            stint_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            stint_start TEXT NOT NULL,
            stint_end TEXT NULL,
            days_observed INTEGER NOT NULL,
            obs_count INTEGER NOT NULL,
            PRIMARY KEY (player_id, stint_id)
        );
        CREATE INDEX IF NOT EXISTS idx_team_roster_team ON team_roster(team_id);

        CREATE TABLE IF NOT EXISTS matches (
            match_id TEXT PRIMARY KEY,
            match_date TEXT NULL
        );

        CREATE TABLE IF NOT EXISTS match_team_stats (
            match_id TEXT NOT NULL,
            club TEXT NOT NULL,
            team_id INTEGER NOT NULL,
            PRIMARY KEY (match_id, club)
        );

        CREATE TABLE IF NOT EXISTS match_player_stats (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id TEXT NOT NULL,
            team_id INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            player_name TEXT NOT NULL,
            club TEXT NOT NULL,
            match_strategy TEXT NOT NULL,
            match_score INTEGER NOT NULL,
            stats_json TEXT NOT NULL,
            loaded_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_match_player_stats_match ON match_player_stats(match_id);

        CREATE TABLE IF NOT EXISTS attach_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            finished_at TEXT NOT NULL,
            rows_total INTEGER NOT NULL,
            teams_mapped INTEGER NOT NULL,
            players_matched INTEGER NOT NULL,
            unmatched INTEGER NOT NULL,
            by_strategy_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn upsert_teams(conn: &mut Connection, teams: &[Team]) -> Result<usize> {
    let tx = conn.transaction().context("begin teams transaction")?;
    for team in teams {
        tx.execute(
            r#"
            INSERT INTO teams (team_id, team_abbr, team_name) VALUES (?1, ?2, ?3)
            ON CONFLICT(team_id) DO UPDATE SET
                team_abbr = excluded.team_abbr,
                team_name = excluded.team_name
            "#,
            params![team.team_id, team.team_abbr, team.team_name],
        )
        .context("upsert team")?;
    }
    tx.commit().context("commit teams transaction")?;
    Ok(teams.len())
}

/// Adds players not already present; existing names are left alone.
pub fn insert_new_players(conn: &mut Connection, players: &[ReferencePlayer]) -> Result<usize> {
    let tx = conn.transaction().context("begin players transaction")?;
    let mut added = 0usize;
    for player in players {
        added += tx
            .execute(
                "INSERT OR IGNORE INTO players_general (player_id, name) VALUES (?1, ?2)",
                params![player.player_id, player.name],
            )
            .context("insert player")?;
    }
    tx.commit().context("commit players transaction")?;
    Ok(added)
}

pub fn upsert_match_dates(conn: &mut Connection, dates: &[(String, NaiveDate)]) -> Result<usize> {
    let tx = conn.transaction().context("begin matches transaction")?;
    for (match_id, date) in dates {
        tx.execute(
            r#"
            INSERT INTO matches (match_id, match_date) VALUES (?1, ?2)
            ON CONFLICT(match_id) DO UPDATE SET match_date = excluded.match_date
            "#,
            params![match_id, date],
        )
        .context("upsert match date")?;
    }
    tx.commit().context("commit matches transaction")?;
    Ok(dates.len())
}

/// Records which team each club label stood for in a match. Labels are
/// stored uppercased so lookups by scraped club text line up.
pub fn upsert_match_teams(
    conn: &mut Connection,
    rows: &[(String, String, TeamId)],
) -> Result<usize> {
    let tx = conn.transaction().context("begin match teams transaction")?;
    for (match_id, club, team_id) in rows {
        tx.execute(
            r#"
            INSERT INTO match_team_stats (match_id, club, team_id) VALUES (?1, ?2, ?3)
            ON CONFLICT(match_id, club) DO UPDATE SET team_id = excluded.team_id
            "#,
            params![match_id, match_club_key(club), team_id],
        )
        .context("upsert match team")?;
    }
    tx.commit().context("commit match teams transaction")?;
    Ok(rows.len())
}

/// Stores snapshots; re-sending the same observation is a no-op.
pub fn insert_snapshots(conn: &mut Connection, snapshots: &[RosterSnapshot]) -> Result<usize> {
    let tx = conn.transaction().context("begin snapshot transaction")?;
    let mut added = 0usize;
    for snap in snapshots {
        added += tx
            .execute(
                "INSERT OR IGNORE INTO roster_snapshots (snap_date, team_id, player_id) VALUES (?1, ?2, ?3)",
                params![snap.snap_date, snap.team_id, snap.player_id],
            )
            .context("insert roster snapshot")?;
    }
    tx.commit().context("commit snapshot transaction")?;
    Ok(added)
}

pub fn load_snapshots(conn: &Connection) -> Result<Vec<RosterSnapshot>> {
    let mut stmt = conn
        .prepare("SELECT snap_date, team_id, player_id FROM roster_snapshots")
        .context("prepare load snapshots query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RosterSnapshot {
                snap_date: row.get(0)?,
                team_id: row.get(1)?,
                player_id: row.get(2)?,
            })
        })
        .context("query roster_snapshots")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode roster snapshot row")?);
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct RosterRefresh {
    pub snapshots_added: usize,
    pub snapshots_total: usize,
    pub stints: usize,
    pub open_stints: usize,
}

/// Stores new snapshots, recomputes every stint from the full snapshot
/// history and replaces `team_roster` in one transaction.
pub fn refresh_team_roster(
    conn: &mut Connection,
    new_snapshots: &[RosterSnapshot],
) -> Result<RosterRefresh> {
    let snapshots_added = insert_snapshots(conn, new_snapshots)?;
    let snapshots = load_snapshots(conn)?;
    let stints = compute_stints(&snapshots);
    replace_team_roster(conn, &stints)?;

    let refresh = RosterRefresh {
        snapshots_added,
        snapshots_total: snapshots.len(),
        stints: stints.len(),
        open_stints: stints.iter().filter(|s| s.open).count(),
    };
    info!(
        added = refresh.snapshots_added,
        snapshots = refresh.snapshots_total,
        stints = refresh.stints,
        "team roster refreshed"
    );
    Ok(refresh)
}

fn replace_team_roster(conn: &mut Connection, stints: &[Stint]) -> Result<()> {
    let tx = conn.transaction().context("begin roster transaction")?;
    tx.execute("DELETE FROM team_roster", [])
        .context("clear team_roster")?;
    for stint in stints {
        let stint_end = if stint.open {
            None
        } else {
            Some(stint.stint_end)
        };
        tx.execute(
            r#"
            INSERT INTO team_roster (
                player_id, stint_id, team_id, stint_start, stint_end, days_observed, obs_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                stint.player_id,
                stint.stint_id,
                stint.team_id,
                stint.stint_start,
                stint_end,
                stint.days_observed,
                stint.obs_count,
            ],
        )
        .context("insert stint")?;
    }
    tx.commit().context("commit roster transaction")?;
    Ok(())
}

/// Appends resolved rows. Never updates existing rows; `player_id` is NOT
/// NULL, so unresolved rows must be filtered out before this call.
pub fn append_match_players(conn: &mut Connection, rows: &[ResolvedRow]) -> Result<usize> {
    let loaded_at = Utc::now().to_rfc3339();
    let tx = conn.transaction().context("begin match players transaction")?;
    for row in rows {
        let stats_json = serde_json::to_string(&row.source.extra).context("encode stats json")?;
        tx.execute(
            r#"
            INSERT INTO match_player_stats (
                match_id, team_id, player_id, player_name, club,
                match_strategy, match_score, stats_json, loaded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                row.source.match_id,
                row.team_id,
                row.player_id,
                row.source.player_name,
                row.source.club,
                row.strategy.as_str(),
                row.score,
                stats_json,
                loaded_at,
            ],
        )
        .context("insert match player row")?;
    }
    tx.commit().context("commit match players transaction")?;
    Ok(rows.len())
}

pub fn record_attach_run(conn: &Connection, report: &AttachReport) -> Result<i64> {
    let by_strategy = report
        .by_strategy
        .iter()
        .map(|(strategy, count)| (strategy.as_str(), *count))
        .collect::<std::collections::BTreeMap<_, _>>();
    let by_strategy_json = serde_json::to_string(&by_strategy).unwrap_or_else(|_| "{}".to_string());
    conn.execute(
        r#"
        INSERT INTO attach_runs (
            finished_at, rows_total, teams_mapped, players_matched, unmatched, by_strategy_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            Utc::now().to_rfc3339(),
            report.rows_total as i64,
            report.teams_mapped as i64,
            report.players_matched as i64,
            report.unmatched.len() as i64,
            by_strategy_json,
        ],
    )
    .context("insert attach run")?;
    Ok(conn.last_insert_rowid())
}
