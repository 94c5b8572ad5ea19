use crate::error::{LeagueError, LeagueResult};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const TOKEN_SUFFIX_LEN: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: String,
    pub name: String,
    pub endpoint: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub auth_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefereeRecord {
    pub referee_id: String,
    pub endpoint: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub auth_token: String,
}

/// Bearer tokens look like `tok_pp01_x7c09k2m4qns81fw`: a kind initial,
/// the lowercased id, and sixteen characters of OS entropy.
pub fn generate_auth_token(kind: &str, id: &str) -> String {
    let initial = kind.chars().next().unwrap_or('x').to_ascii_lowercase();
    let suffix: String = (0..TOKEN_SUFFIX_LEN)
        .map(|_| TOKEN_ALPHABET[OsRng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect();
    format!("tok_{initial}{}_{suffix}", id.to_ascii_lowercase())
}

/// Tokens never appear whole in logs.
pub fn redact_token(token: &str) -> String {
    if token.len() > 8 {
        format!("{}...", &token[..8])
    } else {
        "***".to_string()
    }
}

/// Player and referee admission with hard capacity limits and sequential
/// id assignment (`P01`, `P02`, ... / `REF01`, ...).
#[derive(Debug)]
pub struct Registry {
    players: Vec<PlayerRecord>,
    referees: Vec<RefereeRecord>,
    max_players: usize,
    max_referees: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new(50, 10)
    }
}

impl Registry {
    pub fn new(max_players: usize, max_referees: usize) -> Self {
        Registry {
            players: Vec::new(),
            referees: Vec::new(),
            max_players,
            max_referees,
        }
    }

    pub fn register_player(&mut self, name: &str, endpoint: &str) -> LeagueResult<PlayerRecord> {
        if self.players.len() >= self.max_players {
            return Err(LeagueError::Registration(format!(
                "League full: maximum {} players allowed",
                self.max_players
            )));
        }
        let player_id = format!("P{:02}", self.players.len() + 1);
        let record = PlayerRecord {
            auth_token: generate_auth_token("player", &player_id),
            player_id,
            name: name.to_string(),
            endpoint: endpoint.to_string(),
        };
        self.players.push(record.clone());
        Ok(record)
    }

    pub fn register_referee(&mut self, requested_id: Option<&str>, endpoint: &str) -> LeagueResult<RefereeRecord> {
        if self.referees.len() >= self.max_referees {
            return Err(LeagueError::Registration(format!(
                "League full: maximum {} referees allowed",
                self.max_referees
            )));
        }
        let referee_id = match requested_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) if self.referees.iter().all(|r| r.referee_id != id) => id.to_string(),
            _ => format!("REF{:02}", self.referees.len() + 1),
        };
        let record = RefereeRecord {
            auth_token: generate_auth_token("referee", &referee_id),
            referee_id,
            endpoint: endpoint.to_string(),
        };
        self.referees.push(record.clone());
        Ok(record)
    }

    pub fn players(&self) -> &[PlayerRecord] {
        &self.players
    }

    pub fn referees(&self) -> &[RefereeRecord] {
        &self.referees
    }

    pub fn referee_ids(&self) -> Vec<String> {
        self.referees.iter().map(|r| r.referee_id.clone()).collect()
    }

    pub fn player_by_id(&self, player_id: &str) -> Option<&PlayerRecord> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn referee_endpoint(&self, referee_id: &str) -> Option<String> {
        self.referees
            .iter()
            .find(|r| r.referee_id == referee_id)
            .map(|r| r.endpoint.clone())
    }
}
