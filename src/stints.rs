use chrono::NaiveDate;

use crate::reference::{OPEN_STINT_END, RosterStint};
use crate::{PlayerId, TeamId};

/// One periodic observation of which team a player belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RosterSnapshot {
    pub snap_date: NaiveDate,
    pub team_id: TeamId,
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stint {
    pub player_id: PlayerId,
    /// 1-based position of this stint in the player's history.
    pub stint_id: u32,
    pub team_id: TeamId,
    pub stint_start: NaiveDate,
    /// Last date the player was observed on the team.
    pub stint_end: NaiveDate,
    pub days_observed: i64,
    pub obs_count: u32,
    /// Still on this team as of the most recent snapshot.
    pub open: bool,
}

impl Stint {
    pub fn as_roster_stint(&self) -> RosterStint {
        RosterStint {
            player_id: self.player_id,
            team_id: self.team_id,
            stint_start: self.stint_start,
            stint_end: if self.open {
                OPEN_STINT_END
            } else {
                self.stint_end
            },
        }
    }
}

/// Collapses snapshots into stints: sorted by `(player_id, snap_date,
/// team_id)`, a new stint starts whenever a player's team differs from the
/// previous observation. A player's last stint is open when it reaches the
/// newest snapshot date in the set.
pub fn compute_stints(snapshots: &[RosterSnapshot]) -> Vec<Stint> {
    let mut snaps = snapshots.to_vec();
    snaps.sort_by_key(|s| (s.player_id, s.snap_date, s.team_id));
    snaps.dedup();
    let Some(latest) = snaps.iter().map(|s| s.snap_date).max() else {
        return Vec::new();
    };

    let mut out: Vec<Stint> = Vec::new();
    for snap in &snaps {
        if let Some(last) = out.last_mut()
            && last.player_id == snap.player_id
            && last.team_id == snap.team_id
        {
            last.stint_end = snap.snap_date;
            last.obs_count += 1;
            continue;
        }
        let stint_id = match out.last() {
            Some(last) if last.player_id == snap.player_id => last.stint_id + 1,
            _ => 1,
        };
        out.push(Stint {
            player_id: snap.player_id,
            stint_id,
            team_id: snap.team_id,
            stint_start: snap.snap_date,
            stint_end: snap.snap_date,
            days_observed: 0,
            obs_count: 1,
            open: false,
        });
    }

    let len = out.len();
    for idx in 0..len {
        let is_last_for_player = idx + 1 == len || out[idx + 1].player_id != out[idx].player_id;
        let stint = &mut out[idx];
        stint.days_observed = (stint.stint_end - stint.stint_start).num_days() + 1;
        stint.open = is_last_for_player && stint.stint_end == latest;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(date: &str, team_id: TeamId, player_id: PlayerId) -> RosterSnapshot {
        RosterSnapshot {
            snap_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            team_id,
            player_id,
        }
    }

    #[test]
    fn transfers_split_stints() {
        let snaps = vec![
            snap("2024-05-20", 1, 10),
            snap("2024-05-27", 1, 10),
            snap("2024-06-03", 2, 10),
            snap("2024-06-10", 2, 10),
            snap("2024-06-10", 2, 10),
            snap("2024-05-20", 1, 11),
        ];
        let stints = compute_stints(&snaps);
        assert_eq!(stints.len(), 3);

        assert_eq!(stints[0].player_id, 10);
        assert_eq!(stints[0].stint_id, 1);
        assert_eq!(stints[0].team_id, 1);
        assert_eq!(stints[0].obs_count, 2);
        assert_eq!(stints[0].days_observed, 8);
        assert!(!stints[0].open);

        assert_eq!(stints[1].stint_id, 2);
        assert_eq!(stints[1].team_id, 2);
        assert_eq!(stints[1].obs_count, 2);
        assert!(stints[1].open);
        assert_eq!(stints[1].as_roster_stint().stint_end, OPEN_STINT_END);

        assert_eq!(stints[2].player_id, 11);
        assert!(!stints[2].open);
    }

    #[test]
    fn returning_player_gets_new_stint() {
        let snaps = vec![
            snap("2024-01-01", 1, 5),
            snap("2024-02-01", 2, 5),
            snap("2024-03-01", 1, 5),
        ];
        let ids = compute_stints(&snaps)
            .iter()
            .map(|s| (s.stint_id, s.team_id))
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![(1, 1), (2, 2), (3, 1)]);
    }

    #[test]
    fn empty_input() {
        assert!(compute_stints(&[]).is_empty());
    }
}
