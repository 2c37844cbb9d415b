use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use mls_pipeline::attach::{AttachReport, attach_player_ids};
use mls_pipeline::config::ResolverConfig;
use mls_pipeline::unmatched::{UnmatchedLog, UnmatchedRow};
use mls_pipeline::{input, reference, store};

const UNMATCHED_SAMPLE: usize = 10;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let input_path = parse_path_arg("--input").context("missing --input <csv>")?;
    let db_path = parse_path_arg("--db").unwrap_or_else(store::default_db_path);
    let dry_run = has_flag("--dry-run");

    let mut config = ResolverConfig::from_env()?;
    if let Some(log_path) = parse_path_arg("--log") {
        config.log_path = log_path;
    }

    let rows = input::read_scraped_rows(&input_path, &config.columns)?;
    let mut conn = store::open_db(&db_path)?;
    let reference = reference::load_reference(&conn).context("load reference data")?;

    let report = if dry_run {
        let mut sink: Vec<UnmatchedRow> = Vec::new();
        attach_player_ids(rows, &reference, &config, &mut sink)?
    } else {
        let mut sink = UnmatchedLog::new(&config.log_path);
        attach_player_ids(rows, &reference, &config, &mut sink)?
    };

    if !dry_run {
        let appended = store::append_match_players(&mut conn, &report.resolved)?;
        store::record_attach_run(&conn, &report)?;
        println!("Rows appended: {appended}");
    }

    print_report(&report, &config, dry_run);
    Ok(())
}

fn print_report(report: &AttachReport, config: &ResolverConfig, dry_run: bool) {
    println!("Player id attach complete{}", if dry_run { " (dry run)" } else { "" });
    for line in report.summary_lines() {
        println!("{line}");
    }
    if let Some(err) = report.sink_error.as_deref() {
        println!("[WARN] unmatched log not written: {err}");
    }
    if report.unmatched.is_empty() {
        return;
    }
    if !dry_run && report.sink_error.is_none() {
        println!(
            "Unmatched: {} (logged to {})",
            report.unmatched.len(),
            config.log_path.display()
        );
    } else {
        println!("Unmatched: {}", report.unmatched.len());
    }
    for row in report.unmatched_sample(UNMATCHED_SAMPLE) {
        println!(
            " - {} {} '{}' reason={} best={}",
            row.match_id,
            row.club,
            row.player_name,
            row.reason,
            row.match_score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "n/a".to_string())
        );
    }
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

fn has_flag(flag: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == flag)
}
