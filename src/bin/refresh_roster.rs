use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use mls_pipeline::config::ResolverConfig;
use mls_pipeline::input::{self, SnapshotTeam};
use mls_pipeline::normalize::normalize_club;
use mls_pipeline::stints::RosterSnapshot;
use mls_pipeline::teams::TeamDirectory;
use mls_pipeline::{reference, store};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let snapshots_path = parse_path_arg("--snapshots").context("missing --snapshots <csv>")?;
    let db_path = parse_path_arg("--db").unwrap_or_else(store::default_db_path);
    let config = ResolverConfig::from_env()?;
    config.validate()?;

    let rows = input::read_snapshot_rows(&snapshots_path)?;
    if rows.is_empty() {
        return Err(anyhow!(
            "no usable snapshot rows in {}",
            snapshots_path.display()
        ));
    }

    let mut conn = store::open_db(&db_path)?;
    let teams = reference::load_teams(&conn).context("load teams")?;
    let directory = TeamDirectory::build(&teams, &config.team_aliases);

    let mut snapshots = Vec::with_capacity(rows.len());
    let mut unmapped: Vec<String> = Vec::new();
    for row in rows {
        let team_id = match &row.team {
            SnapshotTeam::Id(team_id) => Some(*team_id),
            SnapshotTeam::Label(label) => directory
                .lookup(&normalize_club(label), config.team_threshold, config.scorer)
                .team_id(),
        };
        match team_id {
            Some(team_id) => snapshots.push(RosterSnapshot {
                snap_date: row.snap_date,
                team_id,
                player_id: row.player_id,
            }),
            None => {
                if let SnapshotTeam::Label(label) = row.team
                    && !unmapped.contains(&label)
                {
                    unmapped.push(label);
                }
            }
        }
    }

    let refresh = store::refresh_team_roster(&mut conn, &snapshots)?;

    println!("Roster refresh complete");
    println!("DB: {}", db_path.display());
    println!(
        "Snapshots: +{} ({} total)",
        refresh.snapshots_added, refresh.snapshots_total
    );
    println!("Stints: {} ({} open)", refresh.stints, refresh.open_stints);
    if !unmapped.is_empty() {
        println!("Unmapped teams: {}", unmapped.len());
        for label in unmapped.iter().take(8) {
            println!(" - {label}");
        }
    }
    Ok(())
}

fn parse_path_arg(flag: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}
