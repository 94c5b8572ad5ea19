use crate::broadcast::send_with_retry;
use crate::protocol;
use crate::referee::rpc_endpoint;
use crate::registry::redact_token;
use crate::rpc::result_field;
use crate::strategy::{strategy_from_name, ChoiceContext, Strategy};
use crate::types::*;
use axum::{
    extract::State as AxumState,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

pub struct PlayerState {
    pub player_id: String,
    pub strategy: Arc<dyn Strategy>,
}

fn parse_registration(reply: &Value) -> Result<(String, String), String> {
    if let Some(e) = reply.get("error").and_then(Value::as_str) {
        return Err(e.to_string());
    }
    let result = result_field(reply);
    let player_id = result
        .get("player_id")
        .and_then(Value::as_str)
        .ok_or_else(|| "registration reply missing player_id".to_string())?
        .to_string();
    let auth_token = result
        .get("auth_token")
        .and_then(Value::as_str)
        .ok_or_else(|| "registration reply missing auth_token".to_string())?
        .to_string();
    Ok((player_id, auth_token))
}

// ── Message handling ───────────────────────────────────────────────────

/// A player never refuses work: invitations are accepted, calls are
/// answered from the configured strategy, broadcasts are acknowledged.
pub fn handle_message(state: &PlayerState, body: &Value) -> Value {
    match body.get("message_type").and_then(Value::as_str) {
        Some(protocol::MSG_GAME_INVITATION) => handle_invitation(state, body),
        Some(protocol::MSG_CHOOSE_PARITY_CALL) => handle_choice_call(state, body),
        Some(protocol::MSG_GAME_OVER) => handle_game_over(state, body),
        Some(protocol::MSG_TOURNAMENT_END) => {
            let champion = body.get("champion").and_then(Value::as_str).unwrap_or("nobody");
            info!("tournament over, champion {champion}");
            json!({ "result": { "status": "ok" } })
        }
        other => {
            debug!("acknowledging broadcast {other:?}");
            json!({ "result": { "status": "ok" } })
        }
    }
}

fn handle_invitation(state: &PlayerState, body: &Value) -> Value {
    let match_id = body.get("match_id").and_then(Value::as_str).unwrap_or("?");
    let opponent = body.get("opponent_id").and_then(Value::as_str).unwrap_or("?");
    let role = body.get("role_in_match").and_then(Value::as_str).unwrap_or("?");
    info!("{}: invited to {match_id} as {role} against {opponent}", state.player_id);
    json!({ "result": { "accept": true } })
}

fn handle_choice_call(state: &PlayerState, body: &Value) -> Value {
    let ctx = ChoiceContext {
        match_id: body.get("match_id").and_then(Value::as_str).unwrap_or_default().to_string(),
        opponent_id: body
            .pointer("/context/opponent_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        round_id: body.pointer("/context/round_id").and_then(Value::as_u64).unwrap_or_default() as u32,
    };
    let choice = state.strategy.choose(&ctx);
    info!("{}: calling {} in {}", state.player_id, choice.as_str(), ctx.match_id);
    json!({ "result": { "parity_choice": choice.as_str() } })
}

fn handle_game_over(state: &PlayerState, body: &Value) -> Value {
    let match_id = body.get("match_id").and_then(Value::as_str).unwrap_or("?");
    match body.pointer("/game_result/winner_player_id").and_then(Value::as_str) {
        Some(winner) if winner == state.player_id => info!("{}: won {match_id}", state.player_id),
        Some(winner) => info!("{}: lost {match_id} to {winner}", state.player_id),
        None => info!("{}: tied {match_id}", state.player_id),
    }
    json!({ "result": { "acknowledged": true } })
}

async fn dispatch(AxumState(state): AxumState<Arc<PlayerState>>, Json(body): Json<Value>) -> Json<Value> {
    Json(handle_message(&state, &body))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ── Service entrypoint ─────────────────────────────────────────────────

pub fn router(state: Arc<PlayerState>) -> Router {
    Router::new()
        .route("/rpc", post(dispatch))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn run(config: AppConfig) {
    let client = reqwest::Client::new();
    let coordinator = rpc_endpoint(&config.coordinator_url);
    let advertised = format!("http://127.0.0.1:{}/rpc", config.player_port);
    let display_name = if config.player_name.trim().is_empty() {
        format!("player_{}", config.player_port)
    } else {
        config.player_name.clone()
    };

    let registration = protocol::register_player(&display_name, &advertised);
    let reply = match send_with_retry(&client, &coordinator, &registration, BROADCAST_MAX_RETRIES).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("registration never reached {coordinator}: {e}");
            return;
        }
    };
    let (player_id, auth_token) = match parse_registration(&reply) {
        Ok(pair) => pair,
        Err(e) => {
            error!("registration rejected: {e}");
            return;
        }
    };
    let strategy = strategy_from_name(&config.player_strategy);
    info!(
        "player {player_id} ({display_name}) registered with token {}, playing {}",
        redact_token(&auth_token),
        strategy.name()
    );

    let state = Arc::new(PlayerState { player_id, strategy });
    let addr = format!("0.0.0.0:{}", config.player_port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("player failed to bind {addr}: {e}");
            return;
        }
    };
    info!("player listening at http://{addr}/");
    if let Err(e) = axum::serve(listener, router(state)).await {
        error!("player server error: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::FixedStrategy;
    use std::sync::Mutex;

    struct Recording {
        choice: Parity,
        seen: Mutex<Vec<ChoiceContext>>,
    }

    impl Strategy for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn choose(&self, ctx: &ChoiceContext) -> Parity {
            self.seen.lock().unwrap().push(ctx.clone());
            self.choice
        }
    }

    fn fixed_player(choice: Parity) -> PlayerState {
        PlayerState {
            player_id: "P01".to_string(),
            strategy: Arc::new(FixedStrategy(choice)),
        }
    }

    #[test]
    fn invitations_are_always_accepted() {
        let state = fixed_player(Parity::Even);
        let reply = handle_message(
            &state,
            &json!({
                "message_type": "GAME_INVITATION",
                "match_id": "lg_R1_M001",
                "role_in_match": "PLAYER_A",
                "opponent_id": "P02",
            }),
        );
        assert_eq!(reply["result"]["accept"], true);
    }

    #[test]
    fn choice_call_reaches_the_strategy_with_full_context() {
        let recording = Arc::new(Recording {
            choice: Parity::Odd,
            seen: Mutex::new(Vec::new()),
        });
        let state = PlayerState {
            player_id: "P01".to_string(),
            strategy: recording.clone(),
        };
        let reply = handle_message(
            &state,
            &json!({
                "message_type": "CHOOSE_PARITY_CALL",
                "match_id": "lg_R2_M003",
                "player_id": "P01",
                "context": { "opponent_id": "P05", "round_id": 2 },
            }),
        );
        assert_eq!(reply["result"]["parity_choice"], "odd");

        let seen = recording.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].match_id, "lg_R2_M003");
        assert_eq!(seen[0].opponent_id, "P05");
        assert_eq!(seen[0].round_id, 2);
    }

    #[test]
    fn game_over_is_acknowledged_for_every_outcome() {
        let state = fixed_player(Parity::Even);
        for winner in [json!("P01"), json!("P02"), Value::Null] {
            let reply = handle_message(
                &state,
                &json!({
                    "message_type": "GAME_OVER",
                    "match_id": "lg_R1_M001",
                    "game_result": { "winner_player_id": winner },
                }),
            );
            assert_eq!(reply["result"]["acknowledged"], true);
        }
    }

    #[test]
    fn broadcasts_are_acknowledged() {
        let state = fixed_player(Parity::Even);
        for message_type in ["ROUND_ANNOUNCEMENT", "ROUND_COMPLETED", "TOURNAMENT_START", "TOURNAMENT_END"] {
            let reply = handle_message(&state, &json!({ "message_type": message_type }));
            assert_eq!(reply["result"]["status"], "ok", "{message_type} should be acknowledged");
        }
    }

    #[test]
    fn registration_reply_shapes_are_covered() {
        let ok = json!({ "result": { "player_id": "P03", "auth_token": "tok_pp03_x" } });
        assert_eq!(parse_registration(&ok).unwrap(), ("P03".to_string(), "tok_pp03_x".to_string()));

        let full = json!({ "error": "League full: maximum 50 players allowed" });
        assert!(parse_registration(&full).unwrap_err().contains("League full"));
    }

    #[tokio::test]
    async fn rpc_and_healthz_answer_over_http() {
        let state = Arc::new(fixed_player(Parity::Even));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let client = reqwest::Client::new();
        let reply = client
            .post(format!("http://{addr}/rpc"))
            .json(&json!({ "message_type": "GAME_INVITATION", "match_id": "m1" }))
            .send()
            .await
            .unwrap()
            .json::<Value>()
            .await
            .unwrap();
        assert_eq!(reply["result"]["accept"], true);

        let status = client.get(format!("http://{addr}/healthz")).send().await.unwrap().status();
        assert!(status.is_success());
    }
}
