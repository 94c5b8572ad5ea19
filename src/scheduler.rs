use crate::error::{LeagueError, LeagueResult};
use crate::registry::PlayerRecord;
use crate::types::MatchAssignment;
use std::collections::HashMap;

/// Circle-method round robin. Slot 0 stays fixed and the rest rotate,
/// which guarantees every pair meets exactly once and nobody plays twice
/// in the same round. Odd player counts get a phantom slot, so one
/// player sits out each round and the round count is n instead of n-1.
pub fn round_robin_pairings(players: &[String]) -> Vec<Vec<(String, String)>> {
    if players.len() < 2 {
        return Vec::new();
    }
    let mut slots: Vec<Option<String>> = players.iter().cloned().map(Some).collect();
    if slots.len() % 2 == 1 {
        slots.push(None);
    }
    let n = slots.len();
    let mut rounds = Vec::with_capacity(n - 1);
    for _ in 0..n - 1 {
        let mut round = Vec::new();
        for i in 0..n / 2 {
            if let (Some(a), Some(b)) = (&slots[i], &slots[n - 1 - i]) {
                round.push((a.clone(), b.clone()));
            }
        }
        rounds.push(round);
        slots[1..].rotate_right(1);
    }
    rounds
}

/// Least-loaded referee picker. Ties go to the earliest registered
/// referee, so assignment is deterministic for a given registration order.
pub struct RefereeAssigner {
    referee_ids: Vec<String>,
    workload: HashMap<String, u32>,
}

impl RefereeAssigner {
    pub fn new(referee_ids: Vec<String>) -> LeagueResult<Self> {
        if referee_ids.is_empty() {
            return Err(LeagueError::Config("cannot assign matches without referees".to_string()));
        }
        Ok(RefereeAssigner {
            referee_ids,
            workload: HashMap::new(),
        })
    }

    pub fn assign(&mut self) -> String {
        let picked = self
            .referee_ids
            .iter()
            .min_by_key(|id| self.workload.get(*id).copied().unwrap_or(0))
            .cloned()
            .unwrap_or_default();
        *self.workload.entry(picked.clone()).or_insert(0) += 1;
        picked
    }

    pub fn workload_of(&self, referee_id: &str) -> u32 {
        self.workload.get(referee_id).copied().unwrap_or(0)
    }
}

/// Match ids look like `league_2025_even_odd_R1_M001`; the match sequence
/// restarts at 1 every round.
pub fn format_match_id(league_id: &str, round_id: u32, seq: usize) -> String {
    format!("{league_id}_R{round_id}_M{seq:03}")
}

pub fn build_schedule(
    league_id: &str,
    players: &[PlayerRecord],
    referee_ids: &[String],
) -> LeagueResult<Vec<MatchAssignment>> {
    if players.len() < 2 {
        return Err(LeagueError::Config(format!(
            "need at least 2 registered players to build a schedule, have {}",
            players.len()
        )));
    }
    let mut assigner = RefereeAssigner::new(referee_ids.to_vec())?;

    let endpoints: HashMap<&str, &str> = players
        .iter()
        .map(|p| (p.player_id.as_str(), p.endpoint.as_str()))
        .collect();
    let ids: Vec<String> = players.iter().map(|p| p.player_id.clone()).collect();

    let mut schedule = Vec::new();
    for (round_idx, round) in round_robin_pairings(&ids).into_iter().enumerate() {
        let round_id = (round_idx + 1) as u32;
        for (seq, (player_a, player_b)) in round.into_iter().enumerate() {
            let referee_id = assigner.assign();
            schedule.push(MatchAssignment {
                match_id: format_match_id(league_id, round_id, seq + 1),
                round_id,
                player_a_endpoint: endpoints.get(player_a.as_str()).unwrap_or(&"").to_string(),
                player_b_endpoint: endpoints.get(player_b.as_str()).unwrap_or(&"").to_string(),
                player_a_id: player_a,
                player_b_id: player_b,
                referee_id,
            });
        }
    }
    Ok(schedule)
}
