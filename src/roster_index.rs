use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::normalize::{InitialKey, initial_key, normalize};
use crate::reference::{ReferencePlayer, RosterStint};
use crate::similarity::token_sorted;
use crate::{PlayerId, TeamId};

/// A reference player prepared for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub player_id: PlayerId,
    pub name_norm: String,
    pub sorted: String,
    pub initial: Option<InitialKey>,
}

impl Candidate {
    fn new(player_id: PlayerId, name: &str) -> Option<Self> {
        let name_norm = normalize(name);
        if name_norm.is_empty() {
            return None;
        }
        Some(Self {
            player_id,
            sorted: token_sorted(&name_norm),
            initial: initial_key(&name_norm),
            name_norm,
        })
    }
}

/// Immutable per-batch view of who played where and when.
///
/// Candidate lists are sorted by `player_id` so that fuzzy ties always break
/// the same way.
#[derive(Debug, Clone, Default)]
pub struct RosterIndex {
    stints_by_team: HashMap<TeamId, Vec<RosterStint>>,
    candidates_by_team: HashMap<TeamId, Vec<Candidate>>,
    all: Vec<Candidate>,
}

impl RosterIndex {
    pub fn build(roster: &[RosterStint], players: &[ReferencePlayer]) -> Self {
        let mut by_id: BTreeMap<PlayerId, Candidate> = BTreeMap::new();
        for player in players {
            if by_id.contains_key(&player.player_id) {
                continue;
            }
            if let Some(candidate) = Candidate::new(player.player_id, &player.name) {
                by_id.insert(player.player_id, candidate);
            }
        }

        let mut stints_by_team: HashMap<TeamId, Vec<RosterStint>> = HashMap::new();
        let mut ids_by_team: HashMap<TeamId, BTreeSet<PlayerId>> = HashMap::new();
        for stint in roster {
            stints_by_team.entry(stint.team_id).or_default().push(*stint);
            ids_by_team
                .entry(stint.team_id)
                .or_default()
                .insert(stint.player_id);
        }
        for stints in stints_by_team.values_mut() {
            stints.sort_by_key(|s| (s.player_id, s.stint_start));
        }

        let candidates_by_team = ids_by_team
            .into_iter()
            .map(|(team_id, ids)| {
                let candidates = ids
                    .iter()
                    .filter_map(|id| by_id.get(id).cloned())
                    .collect::<Vec<_>>();
                (team_id, candidates)
            })
            .collect();

        Self {
            stints_by_team,
            candidates_by_team,
            all: by_id.into_values().collect(),
        }
    }

    pub fn has_team(&self, team_id: TeamId) -> bool {
        self.stints_by_team.contains_key(&team_id)
    }

    /// Players whose stint on `team_id` covers `as_of`. Without a date every
    /// player who ever had a stint on the team is returned, which is looser
    /// and more prone to ambiguity.
    pub fn eligible_players(&self, team_id: TeamId, as_of: Option<NaiveDate>) -> BTreeSet<PlayerId> {
        let Some(stints) = self.stints_by_team.get(&team_id) else {
            return BTreeSet::new();
        };
        stints
            .iter()
            .filter(|stint| as_of.is_none_or(|date| stint.covers(date)))
            .map(|stint| stint.player_id)
            .collect()
    }

    /// Named players with any stint on `team_id`, sorted by `player_id`.
    pub fn candidates_for_team(&self, team_id: TeamId) -> &[Candidate] {
        self.candidates_by_team
            .get(&team_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every named reference player, sorted by `player_id`.
    pub fn all_candidates(&self) -> &[Candidate] {
        &self.all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn stint(player_id: PlayerId, team_id: TeamId, start: NaiveDate, end: NaiveDate) -> RosterStint {
        RosterStint {
            player_id,
            team_id,
            stint_start: start,
            stint_end: end,
        }
    }

    fn player(player_id: PlayerId, name: &str) -> ReferencePlayer {
        ReferencePlayer {
            player_id,
            name: name.to_string(),
        }
    }

    #[test]
    fn eligibility_respects_stint_windows() {
        let roster = vec![
            stint(1, 10, date(2024, 1, 1), date(2024, 6, 1)),
            stint(1, 20, date(2024, 6, 2), date(2100, 1, 1)),
            stint(2, 10, date(2023, 1, 1), date(2100, 1, 1)),
        ];
        let index = RosterIndex::build(&roster, &[player(1, "A B"), player(2, "C D")]);

        let july = Some(date(2024, 7, 1));
        assert_eq!(index.eligible_players(10, july), BTreeSet::from([2]));
        assert_eq!(index.eligible_players(20, july), BTreeSet::from([1]));
        assert_eq!(index.eligible_players(10, None), BTreeSet::from([1, 2]));
        assert!(index.eligible_players(99, july).is_empty());
    }

    #[test]
    fn candidates_are_sorted_and_named() {
        let roster = vec![
            stint(9, 10, date(2024, 1, 1), date(2100, 1, 1)),
            stint(3, 10, date(2024, 1, 1), date(2100, 1, 1)),
            stint(3, 10, date(2023, 1, 1), date(2023, 6, 1)),
            stint(5, 10, date(2024, 1, 1), date(2100, 1, 1)),
        ];
        let players = vec![player(9, "Robin Lod"), player(3, "Hassani Dotson"), player(5, " . ")];
        let index = RosterIndex::build(&roster, &players);

        let ids = index
            .candidates_for_team(10)
            .iter()
            .map(|c| c.player_id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![3, 9]);
        assert_eq!(index.candidates_for_team(10)[1].name_norm, "robin lod");
        assert_eq!(index.all_candidates().len(), 2);
        assert!(index.candidates_for_team(11).is_empty());
    }
}
