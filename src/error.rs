use thiserror::Error;

/// Engine-level failures. Thin IO layers (config files, league store)
/// keep the plain `Result<_, String>` convention instead.
#[derive(Debug, Error)]
pub enum LeagueError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("unknown player: {0}")]
    UnknownPlayer(String),

    #[error("unknown match: {0}")]
    UnknownMatch(String),

    #[error("round error: {0}")]
    Round(String),

    #[error("registration rejected: {0}")]
    Registration(String),
}

pub type LeagueResult<T> = Result<T, LeagueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = LeagueError::InvalidTransition {
            from: "FINISHED".to_string(),
            to: "ABORTED".to_string(),
        };
        assert_eq!(err.to_string(), "invalid transition FINISHED -> ABORTED");

        let err = LeagueError::UnknownPlayer("P99".to_string());
        assert!(err.to_string().contains("P99"));
    }
}
