use crate::error::{LeagueError, LeagueResult};
use crate::types::{LOSS_POINTS, TIE_POINTS, WIN_POINTS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerStanding {
    pub player_id: String,
    pub points: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingRow {
    pub player_id: String,
    pub rank: u32,
    pub points: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
}

/// League table. Win 3, tie 1, loss 0. Head-to-head results are kept in
/// both directions so either player can be looked up first.
#[derive(Debug, Default)]
pub struct StandingsEngine {
    players: HashMap<String, PlayerStanding>,
    head_to_head: HashMap<(String, String), char>,
}

impl StandingsEngine {
    pub fn ensure_player(&mut self, player_id: &str) {
        self.standing_mut(player_id);
    }

    fn standing_mut(&mut self, player_id: &str) -> &mut PlayerStanding {
        self.players.entry(player_id.to_string()).or_insert_with(|| PlayerStanding {
            player_id: player_id.to_string(),
            ..PlayerStanding::default()
        })
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// `winner` of `None` records a tie for both sides.
    pub fn record_match_result(
        &mut self,
        player_a: &str,
        player_b: &str,
        winner: Option<&str>,
    ) -> LeagueResult<()> {
        if let Some(w) = winner {
            if w != player_a && w != player_b {
                return Err(LeagueError::UnknownPlayer(format!(
                    "winner {w} is not one of ({player_a}, {player_b})"
                )));
            }
        }
        match winner {
            Some(w) => {
                let loser = if w == player_a { player_b } else { player_a };
                let entry = self.standing_mut(w);
                entry.points += WIN_POINTS;
                entry.wins += 1;
                let entry = self.standing_mut(loser);
                entry.points += LOSS_POINTS;
                entry.losses += 1;
                self.head_to_head.insert((w.to_string(), loser.to_string()), 'W');
                self.head_to_head.insert((loser.to_string(), w.to_string()), 'L');
            }
            None => {
                for id in [player_a, player_b] {
                    let entry = self.standing_mut(id);
                    entry.points += TIE_POINTS;
                    entry.ties += 1;
                }
                self.head_to_head.insert((player_a.to_string(), player_b.to_string()), 'T');
                self.head_to_head.insert((player_b.to_string(), player_a.to_string()), 'T');
            }
        }
        Ok(())
    }

    pub fn head_to_head(&self, player: &str, opponent: &str) -> Option<char> {
        self.head_to_head.get(&(player.to_string(), opponent.to_string())).copied()
    }

    /// Head-to-head only separates a two-way tie on points. With three or
    /// more players level the order falls back to player id.
    fn tiebreak_value(&self, player_id: &str, points: u32) -> u32 {
        let level: Vec<&PlayerStanding> = self
            .players
            .values()
            .filter(|p| p.points == points && p.player_id != player_id)
            .collect();
        if level.len() != 1 {
            return 0;
        }
        match self.head_to_head(player_id, &level[0].player_id) {
            Some('W') => 0,
            Some('L') => 1,
            _ => 0,
        }
    }

    pub fn get_standings(&self) -> Vec<StandingRow> {
        let mut entries: Vec<&PlayerStanding> = self.players.values().collect();
        entries.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| {
                    self.tiebreak_value(&a.player_id, a.points)
                        .cmp(&self.tiebreak_value(&b.player_id, b.points))
                })
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        entries
            .into_iter()
            .enumerate()
            .map(|(idx, p)| StandingRow {
                player_id: p.player_id.clone(),
                rank: (idx + 1) as u32,
                points: p.points,
                wins: p.wins,
                losses: p.losses,
                ties: p.ties,
            })
            .collect()
    }
}
