use std::fs;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use rusqlite::Connection;

use mls_pipeline::attach::attach_player_ids;
use mls_pipeline::config::ResolverConfig;
use mls_pipeline::error::PipelineError;
use mls_pipeline::input::{self, SnapshotTeam};
use mls_pipeline::normalize::normalize_club;
use mls_pipeline::reference::{self, OPEN_STINT_END, ReferencePlayer, Team};
use mls_pipeline::resolver::{MatchStrategy, MissReason};
use mls_pipeline::stints::RosterSnapshot;
use mls_pipeline::store;
use mls_pipeline::teams::TeamDirectory;
use mls_pipeline::unmatched::{UnmatchedLog, UnmatchedRow, UnmatchedSink};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mls_pipeline_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("scratch dir should be creatable");
    dir
}

fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid test date")
}

fn seeded_db() -> Connection {
    let mut conn = Connection::open_in_memory().expect("in-memory sqlite");
    store::init_schema(&conn).expect("schema");

    let teams = vec![
        Team {
            team_id: 7,
            team_abbr: "MIN".to_string(),
            team_name: Some("Minnesota United FC".to_string()),
        },
        Team {
            team_id: 1,
            team_abbr: "ATL".to_string(),
            team_name: None,
        },
    ];
    store::upsert_teams(&mut conn, &teams).expect("teams");

    let players = [
        (1, "Diego Rossi"),
        (42, "Robin Lod"),
        (44, "Alejandro Markanich"),
        (50, "Hassani Dotson"),
        (70, "Thiago Almada"),
    ]
    .into_iter()
    .map(|(player_id, name)| ReferencePlayer {
        player_id,
        name: name.to_string(),
    })
    .collect::<Vec<_>>();
    store::insert_new_players(&mut conn, &players).expect("players");
    store::upsert_match_dates(&mut conn, &[("m100".to_string(), date("2025-04-01"))])
        .expect("match dates");

    let snapshots = mapped_snapshots(&conn).expect("snapshot fixture");
    store::refresh_team_roster(&mut conn, &snapshots).expect("roster refresh");
    conn
}

fn mapped_snapshots(conn: &Connection) -> Result<Vec<RosterSnapshot>> {
    let config = ResolverConfig::default();
    let teams = reference::load_teams(conn)?;
    let directory = TeamDirectory::build(&teams, &config.team_aliases);
    let rows = input::read_snapshot_rows(&fixture("roster_snapshots.csv"))?;
    let mut out = Vec::new();
    for row in rows {
        let team_id = match &row.team {
            SnapshotTeam::Id(team_id) => Some(*team_id),
            SnapshotTeam::Label(label) => directory
                .lookup(&normalize_club(label), config.team_threshold, config.scorer)
                .team_id(),
        };
        if let Some(team_id) = team_id {
            out.push(RosterSnapshot {
                snap_date: row.snap_date,
                team_id,
                player_id: row.player_id,
            });
        }
    }
    Ok(out)
}

struct FailingSink;

impl UnmatchedSink for FailingSink {
    fn record(&mut self, _rows: &[UnmatchedRow]) -> Result<()> {
        Err(anyhow!("disk full"))
    }
}

#[test]
fn roster_refresh_stores_open_stints_as_null() {
    let conn = seeded_db();

    let open_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM team_roster WHERE stint_end IS NULL",
            [],
            |row| row.get(0),
        )
        .expect("count open stints");
    assert_eq!(open_count, 5);

    let roster = reference::load_roster(&conn).expect("load roster");
    let rossi = roster
        .iter()
        .filter(|s| s.player_id == 1)
        .collect::<Vec<_>>();
    assert_eq!(rossi.len(), 2);
    assert_eq!(rossi[0].team_id, 7);
    assert_eq!(rossi[0].stint_end, date("2024-03-01"));
    assert_eq!(rossi[1].team_id, 1);
    assert_eq!(rossi[1].stint_end, OPEN_STINT_END);
}

#[test]
fn roster_refresh_is_idempotent() {
    let mut conn = seeded_db();
    let snapshots = mapped_snapshots(&conn).expect("snapshot fixture");
    let before = reference::load_roster(&conn).expect("load roster");

    let refresh = store::refresh_team_roster(&mut conn, &snapshots).expect("second refresh");
    assert_eq!(refresh.snapshots_added, 0);
    assert_eq!(refresh.snapshots_total, snapshots.len());
    assert_eq!(reference::load_roster(&conn).expect("reload roster"), before);
}

#[test]
fn attach_end_to_end() {
    let mut conn = seeded_db();
    let reference = reference::load_reference(&conn).expect("reference");
    let dir = scratch_dir("attach_end_to_end");
    let log_path = dir.join("interim").join("unmatched.csv");

    let config = ResolverConfig {
        log_path: log_path.clone(),
        ..ResolverConfig::default()
    };
    let rows = input::read_scraped_rows(&fixture("match_players.csv"), &config.columns)
        .expect("input fixture");
    let mut sink = UnmatchedLog::new(&config.log_path);
    let report = attach_player_ids(rows, &reference, &config, &mut sink).expect("attach");

    assert_eq!(report.rows_total, 6);
    assert_eq!(report.teams_mapped, 5);
    assert_eq!(report.players_matched, 3);
    assert_eq!(report.resolved.len() + report.unmatched.len(), report.rows_total);
    assert!(report.sink_error.is_none());

    let by_name = |name: &str| {
        report
            .resolved
            .iter()
            .find(|r| r.source.player_name == name)
            .map(|r| (r.player_id, r.team_id, r.strategy))
    };
    assert_eq!(by_name("R. Lod"), Some((42, 7, MatchStrategy::ExactInitial)));
    assert_eq!(by_name("Hassani Dotson"), Some((50, 7, MatchStrategy::Exact)));
    assert_eq!(by_name("Thiago Almada"), Some((70, 1, MatchStrategy::Exact)));

    let reasons = report
        .unmatched
        .iter()
        .map(|u| (u.player_name.as_str(), u.reason))
        .collect::<Vec<_>>();
    assert_eq!(
        reasons,
        vec![
            ("Diego Rossi", MissReason::BelowThreshold),
            ("Nobody Known", MissReason::UnmappedClub),
            ("", MissReason::BlankName),
        ]
    );

    let log = fs::read_to_string(&log_path).expect("unmatched log");
    let lines = log.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 1 + report.unmatched.len());
    assert!(lines[0].starts_with("match_id,club,team_id,match_date,player_name"));
    assert_eq!(
        lines.iter().filter(|l| l.contains("Diego Rossi")).count(),
        1
    );
    assert!(lines[1].contains("2025-04-01"));
    assert_eq!(lines[3], "m100,MIN,7,2025-04-01,,,none,blank_name,none,");

    let appended = store::append_match_players(&mut conn, &report.resolved).expect("append");
    assert_eq!(appended, 3);
    let (stored, null_ids): (i64, i64) = conn
        .query_row(
            "SELECT COUNT(*), SUM(CASE WHEN player_id IS NULL THEN 1 ELSE 0 END) FROM match_player_stats",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("count stored rows");
    assert_eq!(stored, 3);
    assert_eq!(null_ids, 0);
    let stats_json: String = conn
        .query_row(
            "SELECT stats_json FROM match_player_stats WHERE player_id = 42",
            [],
            |row| row.get(0),
        )
        .expect("stats json");
    let stats: serde_json::Value = serde_json::from_str(&stats_json).expect("valid json");
    assert_eq!(stats["minutes"], "90");
    assert_eq!(stats["goals"], "1");

    let run_id = store::record_attach_run(&conn, &report).expect("attach run");
    assert!(run_id > 0);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unmatched_log_appends_without_second_header() {
    let conn = seeded_db();
    let reference = reference::load_reference(&conn).expect("reference");
    let dir = scratch_dir("unmatched_append");
    let config = ResolverConfig {
        log_path: dir.join("unmatched.csv"),
        ..ResolverConfig::default()
    };

    for _ in 0..2 {
        let rows = input::read_scraped_rows(&fixture("match_players.csv"), &config.columns)
            .expect("input fixture");
        let mut sink = UnmatchedLog::new(&config.log_path);
        attach_player_ids(rows, &reference, &config, &mut sink).expect("attach");
    }

    let log = fs::read_to_string(&config.log_path).expect("unmatched log");
    let headers = log
        .lines()
        .filter(|l| l.starts_with("match_id,"))
        .count();
    assert_eq!(headers, 1);
    assert_eq!(log.lines().count(), 1 + 2 * 3);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn per_match_team_map_resolves_unknown_label() {
    let mut conn = seeded_db();
    store::upsert_match_teams(&mut conn, &[("m200".to_string(), "loons".to_string(), 7)])
        .expect("match teams");
    let reference = reference::load_reference(&conn).expect("reference");
    assert_eq!(
        reference
            .match_teams
            .get(&("m200".to_string(), "LOONS".to_string())),
        Some(&7)
    );

    let config = ResolverConfig::default();
    let raw = "match_id,club,player_name,match_date\n\
               m200,Loons,Robin Lod,2025-04-01\n\
               m201,Loons,Robin Lod,2025-04-01\n";
    let rows = input::read_scraped_rows_from(raw.as_bytes(), &config.columns).expect("rows");
    let mut sink: Vec<UnmatchedRow> = Vec::new();
    let report = attach_player_ids(rows, &reference, &config, &mut sink).expect("attach");

    assert_eq!(report.resolved.len(), 1);
    assert_eq!(report.resolved[0].team_id, 7);
    assert_eq!(report.resolved[0].player_id, 42);
    assert_eq!(sink.len(), 1);
    assert_eq!(sink[0].match_id, "m201");
    assert_eq!(sink[0].reason, MissReason::NoTeamId);
}

#[test]
fn sink_failure_does_not_fail_the_batch() {
    let conn = seeded_db();
    let reference = reference::load_reference(&conn).expect("reference");
    let config = ResolverConfig::default();
    let rows = input::read_scraped_rows(&fixture("match_players.csv"), &config.columns)
        .expect("input fixture");

    let report = attach_player_ids(rows, &reference, &config, &mut FailingSink).expect("attach");
    assert_eq!(report.players_matched, 3);
    assert_eq!(report.unmatched.len(), 3);
    assert!(
        report
            .sink_error
            .as_deref()
            .is_some_and(|e| e.contains("disk full"))
    );
}

#[test]
fn invalid_threshold_rejected_before_resolving() {
    let conn = seeded_db();
    let reference = reference::load_reference(&conn).expect("reference");
    let config = ResolverConfig {
        global_threshold: 101,
        ..ResolverConfig::default()
    };
    let mut sink: Vec<UnmatchedRow> = Vec::new();
    let err = attach_player_ids(Vec::new(), &reference, &config, &mut sink).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::InvalidThreshold { .. })
    ));
    assert!(sink.is_empty());
}

#[test]
fn reversed_stint_aborts_load() {
    let conn = seeded_db();
    conn.execute(
        "INSERT INTO team_roster (player_id, stint_id, team_id, stint_start, stint_end, days_observed, obs_count)
         VALUES (77, 1, 7, '2025-05-01', '2025-01-01', 1, 1)",
        [],
    )
    .expect("insert bad stint");
    assert!(reference::load_reference(&conn).is_err());
}
