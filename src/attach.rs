use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::ResolverConfig;
use crate::reference::ReferenceData;
use crate::resolver::{
    MatchStrategy, ResolutionResult, ResolverContext, ScrapedPlayerRow, resolve_batch,
};
use crate::unmatched::{UnmatchedRow, UnmatchedSink};
use crate::{PlayerId, TeamId};

/// A scraped row with its resolved identity; `player_id` is never null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRow {
    pub source: ScrapedPlayerRow,
    pub player_id: PlayerId,
    pub team_id: TeamId,
    pub strategy: MatchStrategy,
    pub score: u8,
}

#[derive(Debug, Clone, Default)]
pub struct AttachReport {
    pub rows_total: usize,
    pub teams_mapped: usize,
    pub players_matched: usize,
    pub by_strategy: BTreeMap<MatchStrategy, usize>,
    pub resolved: Vec<ResolvedRow>,
    pub unmatched: Vec<UnmatchedRow>,
    /// Set when the unmatched sink failed. The batch still completes.
    pub sink_error: Option<String>,
}

impl AttachReport {
    pub fn unmatched_sample(&self, limit: usize) -> &[UnmatchedRow] {
        &self.unmatched[..self.unmatched.len().min(limit)]
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("team_id mapped: {}/{}", self.teams_mapped, self.rows_total),
            format!("players matched: {}/{}", self.players_matched, self.rows_total),
        ];
        for (strategy, count) in &self.by_strategy {
            lines.push(format!("  {strategy}: {count}"));
        }
        lines
    }
}

/// Runs one resolution batch. Lookup structures are built once, every row is
/// resolved, unresolved rows go to `sink` exactly once and are left out of
/// `resolved`. Fails only on invalid configuration; a failing sink is
/// reported on the returned report.
pub fn attach_player_ids(
    rows: Vec<ScrapedPlayerRow>,
    reference: &ReferenceData,
    config: &ResolverConfig,
    sink: &mut dyn UnmatchedSink,
) -> Result<AttachReport> {
    config.validate()?;
    let ctx = ResolverContext::build(reference, config);
    if ctx.teams.is_empty() {
        warn!("no teams in reference data; every row will miss");
    }

    let results = resolve_batch(&rows, &ctx, config);
    let mut report = AttachReport {
        rows_total: rows.len(),
        ..AttachReport::default()
    };

    for (row, result) in rows.into_iter().zip(results) {
        if result.team_id().is_some() {
            report.teams_mapped += 1;
        }
        match result {
            ResolutionResult::Matched {
                player_id,
                team_id,
                strategy,
                score,
            } => {
                report.players_matched += 1;
                *report.by_strategy.entry(strategy).or_default() += 1;
                report.resolved.push(ResolvedRow {
                    source: row,
                    player_id,
                    team_id,
                    strategy,
                    score,
                });
            }
            ResolutionResult::Unmatched {
                reason,
                diagnostics,
            } => {
                report
                    .unmatched
                    .push(UnmatchedRow::new(&row, reason, &diagnostics));
            }
        }
    }

    if let Err(err) = sink.record(&report.unmatched) {
        warn!(error = %err, rows = report.unmatched.len(), "failed to record unmatched rows");
        report.sink_error = Some(format!("{err:#}"));
    }

    info!(
        rows = report.rows_total,
        teams_mapped = report.teams_mapped,
        players_matched = report.players_matched,
        unmatched = report.unmatched.len(),
        "attach batch finished"
    );
    Ok(report)
}
