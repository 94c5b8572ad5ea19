use crate::error::{LeagueError, LeagueResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchState {
    WaitingForPlayers,
    CollectingChoices,
    DrawingNumber,
    Evaluating,
    Finished,
    Aborted,
}

impl MatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchState::WaitingForPlayers => "WAITING_FOR_PLAYERS",
            MatchState::CollectingChoices => "COLLECTING_CHOICES",
            MatchState::DrawingNumber => "DRAWING_NUMBER",
            MatchState::Evaluating => "EVALUATING",
            MatchState::Finished => "FINISHED",
            MatchState::Aborted => "ABORTED",
        }
    }

    /// Abort is only legal while the match is still waiting on players.
    /// Once a number is drawn the match runs to completion.
    pub fn can_transition_to(&self, to: MatchState) -> bool {
        use MatchState::*;
        matches!(
            (self, to),
            (WaitingForPlayers, CollectingChoices)
                | (CollectingChoices, DrawingNumber)
                | (DrawingNumber, Evaluating)
                | (Evaluating, Finished)
                | (WaitingForPlayers, Aborted)
                | (CollectingChoices, Aborted)
        )
    }
}

/// Per-match state machine with a timestamped audit trail. The history
/// keeps every state ever entered, including the initial one.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub match_id: String,
    state: MatchState,
    history: Vec<(MatchState, DateTime<Utc>)>,
}

impl GameSession {
    pub fn new(match_id: impl Into<String>) -> Self {
        let state = MatchState::WaitingForPlayers;
        GameSession {
            match_id: match_id.into(),
            state,
            history: vec![(state, Utc::now())],
        }
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn history(&self) -> &[(MatchState, DateTime<Utc>)] {
        &self.history
    }

    pub fn transition(&mut self, to: MatchState) -> LeagueResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(LeagueError::InvalidTransition {
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        self.state = to;
        self.history.push((to, Utc::now()));
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, MatchState::Finished | MatchState::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_all_states() {
        let mut session = GameSession::new("league_2025_even_odd_R1_M001");
        for to in [
            MatchState::CollectingChoices,
            MatchState::DrawingNumber,
            MatchState::Evaluating,
            MatchState::Finished,
        ] {
            session.transition(to).unwrap();
        }
        assert_eq!(session.state(), MatchState::Finished);
        assert!(session.is_terminal());
        assert_eq!(session.history().len(), 5);
        assert_eq!(session.history()[0].0, MatchState::WaitingForPlayers);
    }

    #[test]
    fn abort_only_from_early_states() {
        let mut session = GameSession::new("m");
        session.transition(MatchState::CollectingChoices).unwrap();
        session.transition(MatchState::Aborted).unwrap();
        assert!(session.is_terminal());

        let mut session = GameSession::new("m");
        session.transition(MatchState::CollectingChoices).unwrap();
        session.transition(MatchState::DrawingNumber).unwrap();
        let err = session.transition(MatchState::Aborted).unwrap_err();
        assert!(matches!(err, LeagueError::InvalidTransition { .. }));
    }

    #[test]
    fn skipping_states_is_rejected() {
        let mut session = GameSession::new("m");
        assert!(session.transition(MatchState::DrawingNumber).is_err());
        assert!(session.transition(MatchState::Finished).is_err());
        assert_eq!(session.state(), MatchState::WaitingForPlayers);
        assert_eq!(session.history().len(), 1, "failed transitions must not touch history");
    }

    #[test]
    fn terminal_states_are_dead_ends() {
        let mut session = GameSession::new("m");
        session.transition(MatchState::Aborted).unwrap();
        assert!(session.transition(MatchState::CollectingChoices).is_err());
    }

    #[test]
    fn history_timestamps_are_ordered() {
        let mut session = GameSession::new("m");
        session.transition(MatchState::CollectingChoices).unwrap();
        session.transition(MatchState::DrawingNumber).unwrap();
        let history = session.history();
        for pair in history.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn wire_names_are_screaming_snake() {
        let value = serde_json::to_value(MatchState::WaitingForPlayers).unwrap();
        assert_eq!(value, "WAITING_FOR_PLAYERS");
        let state: MatchState = serde_json::from_value(serde_json::json!("ABORTED")).unwrap();
        assert_eq!(state, MatchState::Aborted);
    }
}
