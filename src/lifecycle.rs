use crate::error::{LeagueError, LeagueResult};
use crate::types::MatchAssignment;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone)]
pub struct Round {
    pub round_id: u32,
    pub status: RoundStatus,
    pub matches: Vec<MatchAssignment>,
    pub completed_match_ids: HashSet<String>,
}

impl Round {
    pub fn is_finished(&self) -> bool {
        self.completed_match_ids.len() == self.matches.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundCompletion {
    pub round_id: u32,
    pub matches_completed: usize,
    pub next_round_id: Option<u32>,
}

/// Owned tournament aggregate. Rounds advance strictly forward; round
/// N+1 cannot start until round N is COMPLETED.
#[derive(Debug)]
pub struct Tournament {
    pub league_id: String,
    rounds: BTreeMap<u32, Round>,
    current_round: u32,
}

impl Tournament {
    pub fn from_schedule(league_id: impl Into<String>, schedule: &[MatchAssignment]) -> Self {
        let mut rounds: BTreeMap<u32, Round> = BTreeMap::new();
        for assignment in schedule {
            rounds
                .entry(assignment.round_id)
                .or_insert_with(|| Round {
                    round_id: assignment.round_id,
                    status: RoundStatus::Pending,
                    matches: Vec::new(),
                    completed_match_ids: HashSet::new(),
                })
                .matches
                .push(assignment.clone());
        }
        Tournament {
            league_id: league_id.into(),
            rounds,
            current_round: 0,
        }
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn total_rounds(&self) -> usize {
        self.rounds.len()
    }

    pub fn total_matches(&self) -> usize {
        self.rounds.values().map(|r| r.matches.len()).sum()
    }

    pub fn round(&self, round_id: u32) -> Option<&Round> {
        self.rounds.get(&round_id)
    }

    pub fn next_pending_round_id(&self) -> Option<u32> {
        self.rounds
            .values()
            .find(|r| r.status == RoundStatus::Pending)
            .map(|r| r.round_id)
    }

    pub fn start_round(&mut self, round_id: u32) -> LeagueResult<&Round> {
        if let Some(previous) = self.rounds.get(&self.current_round) {
            if previous.status != RoundStatus::Completed {
                return Err(LeagueError::Round(format!(
                    "cannot start round {round_id} while round {} is {:?}",
                    self.current_round, previous.status
                )));
            }
        }
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or_else(|| LeagueError::Round(format!("no such round: {round_id}")))?;
        if round.status != RoundStatus::Pending {
            return Err(LeagueError::Round(format!(
                "round {round_id} is {:?}, expected PENDING",
                round.status
            )));
        }
        round.status = RoundStatus::InProgress;
        self.current_round = round_id;
        Ok(&self.rounds[&round_id])
    }

    /// Returns true when this completion finished the round. A repeat for
    /// an already-counted match is an error so the caller can decide to
    /// ignore a referee retry instead of double-counting it.
    pub fn mark_match_complete(&mut self, round_id: u32, match_id: &str) -> LeagueResult<bool> {
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or_else(|| LeagueError::Round(format!("no such round: {round_id}")))?;
        if round.status != RoundStatus::InProgress {
            return Err(LeagueError::Round(format!(
                "round {round_id} is {:?}, expected IN_PROGRESS",
                round.status
            )));
        }
        if !round.matches.iter().any(|m| m.match_id == match_id) {
            return Err(LeagueError::UnknownMatch(match_id.to_string()));
        }
        if !round.completed_match_ids.insert(match_id.to_string()) {
            return Err(LeagueError::Round(format!("match {match_id} already completed")));
        }
        Ok(round.is_finished())
    }

    pub fn complete_round(&mut self, round_id: u32) -> LeagueResult<RoundCompletion> {
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or_else(|| LeagueError::Round(format!("no such round: {round_id}")))?;
        if round.status != RoundStatus::InProgress {
            return Err(LeagueError::Round(format!(
                "round {round_id} is {:?}, expected IN_PROGRESS",
                round.status
            )));
        }
        if !round.is_finished() {
            return Err(LeagueError::Round(format!(
                "round {round_id} has {} of {} matches completed",
                round.completed_match_ids.len(),
                round.matches.len()
            )));
        }
        round.status = RoundStatus::Completed;
        let matches_completed = round.completed_match_ids.len();
        let next_round_id = self.next_pending_round_id();
        Ok(RoundCompletion {
            round_id,
            matches_completed,
            next_round_id,
        })
    }

    pub fn is_tournament_complete(&self) -> bool {
        !self.rounds.is_empty() && self.rounds.values().all(|r| r.status == RoundStatus::Completed)
    }

    pub fn is_match_complete(&self, round_id: u32, match_id: &str) -> bool {
        self.rounds
            .get(&round_id)
            .map(|r| r.completed_match_ids.contains(match_id))
            .unwrap_or(false)
    }

    pub fn match_players(&self, round_id: u32, match_id: &str) -> Option<(String, String)> {
        self.rounds.get(&round_id).and_then(|round| {
            round
                .matches
                .iter()
                .find(|m| m.match_id == match_id)
                .map(|m| (m.player_a_id.clone(), m.player_b_id.clone()))
        })
    }

    /// Uncompleted matches of the in-progress round assigned to one referee.
    pub fn assigned_matches(&self, referee_id: &str) -> Vec<MatchAssignment> {
        self.rounds
            .get(&self.current_round)
            .filter(|round| round.status == RoundStatus::InProgress)
            .map(|round| {
                round
                    .matches
                    .iter()
                    .filter(|m| m.referee_id == referee_id && !round.completed_match_ids.contains(&m.match_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PlayerRecord;
    use crate::scheduler::build_schedule;

    fn tournament(players: usize) -> Tournament {
        let records: Vec<PlayerRecord> = (1..=players)
            .map(|i| PlayerRecord {
                player_id: format!("P{i:02}"),
                name: format!("player-{i}"),
                endpoint: format!("http://127.0.0.1:{}/rpc", 8100 + i),
                auth_token: String::new(),
            })
            .collect();
        let schedule = build_schedule("lg", &records, &["REF01".to_string()]).unwrap();
        Tournament::from_schedule("lg", &schedule)
    }

    fn finish_round(t: &mut Tournament, round_id: u32) {
        let ids: Vec<String> = t.round(round_id).unwrap().matches.iter().map(|m| m.match_id.clone()).collect();
        for id in ids {
            t.mark_match_complete(round_id, &id).unwrap();
        }
        t.complete_round(round_id).unwrap();
    }

    #[test]
    fn builds_rounds_from_schedule() {
        let t = tournament(4);
        assert_eq!(t.total_rounds(), 3);
        assert_eq!(t.total_matches(), 6);
        assert_eq!(t.current_round(), 0);
        assert_eq!(t.next_pending_round_id(), Some(1));
    }

    #[test]
    fn rounds_advance_strictly_forward() {
        let mut t = tournament(4);
        t.start_round(1).unwrap();
        let err = t.start_round(2).unwrap_err();
        assert!(matches!(err, LeagueError::Round(_)), "round 2 must wait for round 1: {err}");

        finish_round(&mut t, 1);
        t.start_round(2).unwrap();
        assert_eq!(t.current_round(), 2);
    }

    #[test]
    fn starting_a_non_pending_round_is_an_error() {
        let mut t = tournament(4);
        t.start_round(1).unwrap();
        finish_round(&mut t, 1);
        assert!(t.start_round(1).is_err(), "completed round must not restart");
    }

    #[test]
    fn completion_requires_every_match() {
        let mut t = tournament(4);
        t.start_round(1).unwrap();
        let first = t.round(1).unwrap().matches[0].match_id.clone();
        t.mark_match_complete(1, &first).unwrap();
        let err = t.complete_round(1).unwrap_err();
        assert!(err.to_string().contains("1 of 2"), "unexpected error: {err}");
    }

    #[test]
    fn duplicate_completion_is_rejected() {
        let mut t = tournament(4);
        t.start_round(1).unwrap();
        let first = t.round(1).unwrap().matches[0].match_id.clone();
        assert!(!t.mark_match_complete(1, &first).unwrap());
        let err = t.mark_match_complete(1, &first).unwrap_err();
        assert!(err.to_string().contains("already completed"));
    }

    #[test]
    fn unknown_match_is_rejected() {
        let mut t = tournament(4);
        t.start_round(1).unwrap();
        assert!(matches!(
            t.mark_match_complete(1, "lg_R9_M001").unwrap_err(),
            LeagueError::UnknownMatch(_)
        ));
    }

    #[test]
    fn last_match_reports_round_finished() {
        let mut t = tournament(4);
        t.start_round(1).unwrap();
        let ids: Vec<String> = t.round(1).unwrap().matches.iter().map(|m| m.match_id.clone()).collect();
        assert!(!t.mark_match_complete(1, &ids[0]).unwrap());
        assert!(t.mark_match_complete(1, &ids[1]).unwrap());

        let completion = t.complete_round(1).unwrap();
        assert_eq!(completion.matches_completed, 2);
        assert_eq!(completion.next_round_id, Some(2));
    }

    #[test]
    fn tournament_completes_after_final_round() {
        let mut t = tournament(3);
        assert!(!t.is_tournament_complete());
        for round_id in 1..=3 {
            t.start_round(round_id).unwrap();
            finish_round(&mut t, round_id);
        }
        assert!(t.is_tournament_complete());
        assert_eq!(t.next_pending_round_id(), None);
    }

    #[test]
    fn assigned_matches_shrink_as_results_land() {
        let mut t = tournament(4);
        assert!(t.assigned_matches("REF01").is_empty(), "nothing assigned before the round starts");
        t.start_round(1).unwrap();
        let assigned = t.assigned_matches("REF01");
        assert_eq!(assigned.len(), 2);
        t.mark_match_complete(1, &assigned[0].match_id).unwrap();
        assert_eq!(t.assigned_matches("REF01").len(), 1);
        assert!(t.assigned_matches("REF02").is_empty());
    }
}
