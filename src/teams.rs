use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::TeamId;
use crate::normalize::{ClubKey, club_label_key};
use crate::reference::Team;
use crate::similarity::{Scorer, token_sorted};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamLookup {
    Found { team_id: TeamId },
    Missing {
        best_score: Option<u8>,
    },
}

impl TeamLookup {
    pub fn team_id(&self) -> Option<TeamId> {
        match self {
            TeamLookup::Found { team_id } => Some(*team_id),
            TeamLookup::Missing { .. } => None,
        }
    }
}

/// Club label -> `team_id`, built once per batch from the `teams` relation
/// and the configured alias table.
#[derive(Debug, Clone, Default)]
pub struct TeamDirectory {
    by_abbr: HashMap<String, TeamId>,
    by_label: HashMap<String, TeamId>,
    // (token-sorted label, team) ordered by team then label.
    universe: Vec<(String, TeamId)>,
}

impl TeamDirectory {
    pub fn build(teams: &[Team], aliases: &BTreeMap<String, String>) -> Self {
        let mut sorted_teams = teams.to_vec();
        sorted_teams.sort_by_key(|t| t.team_id);

        let mut by_abbr = HashMap::new();
        let mut by_label = HashMap::new();
        for team in &sorted_teams {
            let abbr = team.team_abbr.trim().to_uppercase();
            if abbr.is_empty() {
                continue;
            }
            if let Some(existing) = by_abbr.get(&abbr) {
                warn!(
                    abbr = %abbr,
                    kept = existing,
                    ignored = team.team_id,
                    "duplicate team abbreviation"
                );
                continue;
            }
            by_abbr.insert(abbr.clone(), team.team_id);
            by_label.entry(abbr.to_lowercase()).or_insert(team.team_id);
            if let Some(name) = team.team_name.as_deref() {
                let key = club_label_key(name);
                if !key.is_empty() {
                    by_label.entry(key).or_insert(team.team_id);
                }
            }
        }

        for (label, abbr) in aliases {
            let Some(team_id) = by_abbr.get(&abbr.trim().to_uppercase()).copied() else {
                debug!(label = %label, abbr = %abbr, "alias points at unknown abbreviation");
                continue;
            };
            let key = club_label_key(label);
            if !key.is_empty() {
                by_label.entry(key).or_insert(team_id);
            }
        }

        let mut universe = by_label
            .iter()
            .map(|(label, team_id)| (token_sorted(label), *team_id))
            .collect::<Vec<_>>();
        universe.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        universe.dedup();

        Self {
            by_abbr,
            by_label,
            universe,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_abbr.is_empty()
    }

    /// Exact code, then exact label or alias, then the best fuzzy label at or
    /// above `threshold`.
    pub fn lookup(&self, club: &ClubKey, threshold: u8, scorer: Scorer) -> TeamLookup {
        let Some(label) = club.label_key() else {
            return TeamLookup::Missing { best_score: None };
        };
        if let ClubKey::Abbr(code) = club
            && let Some(team_id) = self.by_abbr.get(code)
        {
            return TeamLookup::Found { team_id: *team_id };
        }
        if let Some(team_id) = self.by_label.get(&label) {
            return TeamLookup::Found { team_id: *team_id };
        }

        let probe = token_sorted(&label);
        let mut best: Option<(u8, TeamId)> = None;
        for (candidate, team_id) in &self.universe {
            let score = scorer.score_sorted(&probe, candidate);
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, *team_id));
            }
        }
        match best {
            Some((score, team_id)) if score >= threshold => {
                debug!(label = %label, team_id, score, "club matched by fuzzy label");
                TeamLookup::Found { team_id }
            }
            Some((score, _)) => TeamLookup::Missing {
                best_score: Some(score),
            },
            None => TeamLookup::Missing { best_score: None },
        }
    }
}
