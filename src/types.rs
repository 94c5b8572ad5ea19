use crate::lifecycle::Tournament;
use crate::registry::Registry;
use crate::standings::StandingsEngine;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

// ── Protocol constants ─────────────────────────────────────────────────

pub const LEAGUE_PROTOCOL: &str = "league.v2";
pub const GAME_TYPE: &str = "even_odd";
pub const WIRE_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub const WIN_POINTS: u32 = 3;
pub const TIE_POINTS: u32 = 1;
pub const LOSS_POINTS: u32 = 0;

pub const DRAW_MIN: u8 = 1;
pub const DRAW_MAX: u8 = 10;

pub const BROADCAST_MAX_RETRIES: u32 = 2;
pub const BROADCAST_REQUEST_TIMEOUT_SECS: u64 = 5;

pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 5;
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 2;
pub const HEALTH_FAILURE_THRESHOLD: u32 = 3;

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedLeague = Arc<Mutex<LeagueState>>;

// ── Domain types ───────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    pub fn of_number(n: u8) -> Parity {
        if n % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }

    pub fn from_wire(raw: &str) -> Option<Parity> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "even" => Some(Parity::Even),
            "odd" => Some(Parity::Odd),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Parity::Even => "even",
            Parity::Odd => "odd",
        }
    }
}

/// One scheduled pairing, as stored in schedule.json and handed to referees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchAssignment {
    pub match_id: String,
    pub round_id: u32,
    #[serde(rename = "player_A_id")]
    pub player_a_id: String,
    #[serde(rename = "player_B_id")]
    pub player_b_id: String,
    #[serde(rename = "player_A_endpoint")]
    pub player_a_endpoint: String,
    #[serde(rename = "player_B_endpoint")]
    pub player_b_endpoint: String,
    pub referee_id: String,
}

/// Outcome of a finished game, before it is folded into the standings.
/// `winner_player_id` is `None` when neither choice matched the drawn
/// parity; the coordinator scores that as a tie. Choices keep the
/// (player A, player B) submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResult {
    pub status: String,
    pub winner_player_id: Option<String>,
    pub drawn_number: u8,
    pub number_parity: Parity,
    pub choices: Vec<(String, Parity)>,
    pub scores: Vec<(String, u32)>,
}

/// Coordinator league state. Every mutation (registration, result
/// application, round advance) happens under the one `SharedLeague` lock.
#[derive(Default)]
pub struct LeagueState {
    pub registry: Registry,
    pub tournament: Option<Tournament>,
    pub standings: StandingsEngine,
}

// ── Config ─────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AppConfig {
    pub league_id: String,
    pub coordinator_host: String,
    pub coordinator_port: u16,
    pub coordinator_url: String,
    pub max_players: usize,
    pub max_referees: usize,
    pub referee_id: String,
    pub referee_port: u16,
    pub player_name: String,
    pub player_port: u16,
    pub player_strategy: String,
    pub invitation_timeout_secs: u64,
    pub choice_timeout_secs: u64,
    pub max_concurrent_matches: usize,
    pub poll_interval_ms: u64,
    pub data_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            league_id: "league_2025_even_odd".to_string(),
            coordinator_host: "0.0.0.0".to_string(),
            coordinator_port: 8000,
            coordinator_url: "http://127.0.0.1:8000".to_string(),
            max_players: 50,
            max_referees: 10,
            referee_id: "REF01".to_string(),
            referee_port: 8001,
            player_name: String::new(),
            player_port: 8101,
            player_strategy: "random".to_string(),
            invitation_timeout_secs: 5,
            choice_timeout_secs: 30,
            max_concurrent_matches: 2,
            poll_interval_ms: 5000,
            data_dir: "data".to_string(),
        }
    }
}
