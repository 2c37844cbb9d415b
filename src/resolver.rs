use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::config::{EligibilityMode, ResolverConfig};
use crate::normalize::{ClubKey, initial_key, is_initialed, normalize, normalize_club};
use crate::reference::{ReferenceData, match_club_key};
use crate::roster_index::{Candidate, RosterIndex};
use crate::similarity::{Scorer, token_sorted};
use crate::teams::{TeamDirectory, TeamLookup};
use crate::{PlayerId, TeamId};

/// One player line from a scraped match page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedPlayerRow {
    pub match_id: String,
    pub player_name: String,
    pub club: String,
    pub team_id: Option<TeamId>,
    pub match_date: Option<NaiveDate>,
    /// Remaining input columns (minutes, goals, ...), carried through as-is.
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    /// Initial plus last name against a full reference name.
    ExactInitial,
    Fuzzy,
    /// Fuzzy against every reference player, ignoring rosters. Lower trust.
    FuzzyGlobal,
    None,
}

impl MatchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStrategy::Exact => "exact",
            MatchStrategy::ExactInitial => "exact_initial",
            MatchStrategy::Fuzzy => "fuzzy",
            MatchStrategy::FuzzyGlobal => "fuzzy_global",
            MatchStrategy::None => "none",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    BlankName,
    UnmappedClub,
    NoTeamId,
    NoRosterForTeam,
    NoEligiblePlayers,
    BelowThreshold,
}

impl MissReason {
    pub fn as_str(self) -> &'static str {
        match self {
            MissReason::BlankName => "blank_name",
            MissReason::UnmappedClub => "unmapped_club",
            MissReason::NoTeamId => "no_team_id",
            MissReason::NoRosterForTeam => "no_roster_for_team",
            MissReason::NoEligiblePlayers => "no_eligible_players",
            MissReason::BelowThreshold => "below_threshold",
        }
    }
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the resolver knew when it gave up on a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub name_norm: String,
    pub team_id: Option<TeamId>,
    pub match_date: Option<NaiveDate>,
    /// Last cascade step that ran.
    pub attempted: MatchStrategy,
    /// Best fuzzy score seen in any step.
    pub best_score: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionResult {
    Matched {
        player_id: PlayerId,
        team_id: TeamId,
        strategy: MatchStrategy,
        score: u8,
    },
    Unmatched {
        reason: MissReason,
        diagnostics: Diagnostics,
    },
}

impl ResolutionResult {
    pub fn player_id(&self) -> Option<PlayerId> {
        match self {
            ResolutionResult::Matched { player_id, .. } => Some(*player_id),
            ResolutionResult::Unmatched { .. } => None,
        }
    }

    pub fn team_id(&self) -> Option<TeamId> {
        match self {
            ResolutionResult::Matched { team_id, .. } => Some(*team_id),
            ResolutionResult::Unmatched { diagnostics, .. } => diagnostics.team_id,
        }
    }

    pub fn strategy(&self) -> MatchStrategy {
        match self {
            ResolutionResult::Matched { strategy, .. } => *strategy,
            ResolutionResult::Unmatched { .. } => MatchStrategy::None,
        }
    }

    /// Score of the match, or the best score seen for a miss.
    pub fn score(&self) -> Option<u8> {
        match self {
            ResolutionResult::Matched { score, .. } => Some(*score),
            ResolutionResult::Unmatched { diagnostics, .. } => diagnostics.best_score,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, ResolutionResult::Matched { .. })
    }
}

/// Lookup structures shared by every row of one batch. Immutable once built,
/// so rows can be resolved in any order or in parallel.
#[derive(Debug, Clone, Default)]
pub struct ResolverContext {
    pub teams: TeamDirectory,
    pub roster: RosterIndex,
    pub match_dates: HashMap<String, NaiveDate>,
    pub match_teams: HashMap<(String, String), TeamId>,
}

impl ResolverContext {
    pub fn build(reference: &ReferenceData, config: &ResolverConfig) -> Self {
        Self {
            teams: TeamDirectory::build(&reference.teams, &config.team_aliases),
            roster: RosterIndex::build(&reference.roster, &reference.players),
            match_dates: reference.match_dates.clone(),
            match_teams: reference.match_teams.clone(),
        }
    }
}

/// Resolves one row through the cascade: club to team, roster-scoped exact,
/// initial plus last name, roster-scoped fuzzy, then the optional global
/// fuzzy fallback. The first step that succeeds wins. The team is resolved
/// before the name is checked so every miss reports the team it was scoped to.
pub fn resolve(
    row: &ScrapedPlayerRow,
    ctx: &ResolverContext,
    config: &ResolverConfig,
) -> ResolutionResult {
    let mut diag = Diagnostics {
        name_norm: normalize(&row.player_name),
        team_id: None,
        match_date: row
            .match_date
            .or_else(|| ctx.match_dates.get(&row.match_id).copied()),
        attempted: MatchStrategy::None,
        best_score: None,
    };

    let team = resolve_team(row, ctx, config);
    diag.team_id = team.ok();
    if diag.name_norm.is_empty() {
        return unmatched(row, MissReason::BlankName, diag);
    }
    let team_id = match team {
        Ok(team_id) => team_id,
        Err(reason) => return unmatched(row, reason, diag),
    };

    let as_of = match config.eligibility {
        EligibilityMode::DateScoped => diag.match_date,
        EligibilityMode::WholeHistory => None,
    };
    let probe = token_sorted(&diag.name_norm);

    let scope_miss = if !ctx.roster.has_team(team_id) {
        Some(MissReason::NoRosterForTeam)
    } else {
        let eligible = ctx.roster.eligible_players(team_id, as_of);
        let scoped = ctx
            .roster
            .candidates_for_team(team_id)
            .iter()
            .filter(|c| eligible.contains(&c.player_id))
            .collect::<Vec<_>>();
        if scoped.is_empty() {
            Some(MissReason::NoEligiblePlayers)
        } else {
            if let Some(hit) = match_scoped(&scoped, &probe, team_id, &mut diag, config) {
                return hit;
            }
            None
        }
    };

    if config.global_fallback {
        diag.attempted = MatchStrategy::FuzzyGlobal;
        let all = ctx.roster.all_candidates().iter();
        if let Some((score, player_id)) = best_fuzzy(&probe, all, config.scorer) {
            diag.best_score = diag.best_score.max(Some(score));
            if score >= config.global_threshold {
                debug!(
                    player = %row.player_name,
                    player_id,
                    score,
                    "matched outside the roster"
                );
                return ResolutionResult::Matched {
                    player_id,
                    team_id,
                    strategy: MatchStrategy::FuzzyGlobal,
                    score,
                };
            }
        }
    }

    unmatched(
        row,
        scope_miss.unwrap_or(MissReason::BelowThreshold),
        diag,
    )
}

/// Upstream `team_id`, then the team recorded for this club in this match,
/// then the club label against the team directory.
fn resolve_team(
    row: &ScrapedPlayerRow,
    ctx: &ResolverContext,
    config: &ResolverConfig,
) -> Result<TeamId, MissReason> {
    if let Some(team_id) = row.team_id {
        return Ok(team_id);
    }
    let club_key = match_club_key(&row.club);
    if club_key.is_empty() {
        return Err(MissReason::UnmappedClub);
    }
    if let Some(team_id) = ctx.match_teams.get(&(row.match_id.clone(), club_key)) {
        return Ok(*team_id);
    }
    let club = normalize_club(&row.club);
    if club == ClubKey::Blank {
        return Err(MissReason::UnmappedClub);
    }
    match ctx.teams.lookup(&club, config.team_threshold, config.scorer) {
        TeamLookup::Found { team_id } => Ok(team_id),
        TeamLookup::Missing { best_score } => {
            debug!(club = %row.club, ?best_score, "club did not map to a team");
            Err(MissReason::NoTeamId)
        }
    }
}

fn match_scoped(
    scoped: &[&Candidate],
    probe: &str,
    team_id: TeamId,
    diag: &mut Diagnostics,
    config: &ResolverConfig,
) -> Option<ResolutionResult> {
    let matched = |player_id, strategy, score| ResolutionResult::Matched {
        player_id,
        team_id,
        strategy,
        score,
    };

    diag.attempted = MatchStrategy::Exact;
    if let Some(hit) = scoped.iter().find(|c| c.name_norm == diag.name_norm) {
        return Some(matched(hit.player_id, MatchStrategy::Exact, 100));
    }

    if is_initialed(&diag.name_norm)
        && let Some(key) = initial_key(&diag.name_norm)
    {
        diag.attempted = MatchStrategy::ExactInitial;
        let mut hits = scoped.iter().filter(|c| c.initial.as_ref() == Some(&key));
        match (hits.next(), hits.next()) {
            (Some(hit), None) => {
                return Some(matched(hit.player_id, MatchStrategy::ExactInitial, 100));
            }
            (Some(_), Some(_)) => {
                debug!(name = %diag.name_norm, team_id, "initial match is ambiguous");
            }
            _ => {}
        }
    }

    diag.attempted = MatchStrategy::Fuzzy;
    let (score, player_id) = best_fuzzy(probe, scoped.iter().copied(), config.scorer)?;
    diag.best_score = diag.best_score.max(Some(score));
    if score >= config.player_threshold {
        return Some(matched(player_id, MatchStrategy::Fuzzy, score));
    }
    None
}

/// Highest-scoring candidate; on ties the first in iteration order wins.
fn best_fuzzy<'a>(
    probe: &str,
    candidates: impl Iterator<Item = &'a Candidate>,
    scorer: Scorer,
) -> Option<(u8, PlayerId)> {
    let mut best: Option<(u8, PlayerId)> = None;
    for candidate in candidates {
        let score = scorer.score_sorted(probe, &candidate.sorted);
        if best.is_none_or(|(top, _)| score > top) {
            best = Some((score, candidate.player_id));
        }
    }
    best
}

fn unmatched(row: &ScrapedPlayerRow, reason: MissReason, diag: Diagnostics) -> ResolutionResult {
    debug!(
        match_id = %row.match_id,
        player = %row.player_name,
        club = %row.club,
        reason = %reason,
        best_score = ?diag.best_score,
        "row unresolved"
    );
    ResolutionResult::Unmatched {
        reason,
        diagnostics: diag,
    }
}

/// Resolves every row; the output lines up index-for-index with `rows`.
pub fn resolve_batch(
    rows: &[ScrapedPlayerRow],
    ctx: &ResolverContext,
    config: &ResolverConfig,
) -> Vec<ResolutionResult> {
    if config.parallel {
        rows.par_iter().map(|row| resolve(row, ctx, config)).collect()
    } else {
        rows.iter().map(|row| resolve(row, ctx, config)).collect()
    }
}
