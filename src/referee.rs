use crate::broadcast::send_with_retry;
use crate::orchestrator::{run_match, RefereeContext};
use crate::protocol;
use crate::rpc::{post_message, result_field};
use crate::types::*;
use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Base URLs in config carry no path; the RPC endpoint is always `/rpc`.
pub fn rpc_endpoint(base_url: &str) -> String {
    format!("{}/rpc", base_url.trim_end_matches('/'))
}

fn parse_registration(reply: &Value) -> Result<(String, String), String> {
    if let Some(e) = reply.get("error").and_then(Value::as_str) {
        return Err(e.to_string());
    }
    let result = result_field(reply);
    let referee_id = result
        .get("referee_id")
        .and_then(Value::as_str)
        .ok_or_else(|| "registration reply missing referee_id".to_string())?
        .to_string();
    let auth_token = result
        .get("auth_token")
        .and_then(Value::as_str)
        .ok_or_else(|| "registration reply missing auth_token".to_string())?
        .to_string();
    Ok((referee_id, auth_token))
}

fn parse_assignments(reply: &Value) -> Result<Vec<MatchAssignment>, String> {
    let matches = result_field(reply).get("matches").cloned().unwrap_or(json!([]));
    serde_json::from_value(matches).map_err(|e| format!("bad assignment list: {e}"))
}

/// One poll against the coordinator. Assignments already seen are
/// filtered out; `processed` grows monotonically for the process life.
pub async fn claim_new_assignments(
    client: &reqwest::Client,
    coordinator_endpoint: &str,
    referee_id: &str,
    auth_token: &str,
    processed: &mut HashSet<String>,
) -> Vec<MatchAssignment> {
    let query = protocol::get_assigned_matches(referee_id, auth_token);
    let reply = match post_message(client, coordinator_endpoint, &query).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("assignment poll failed: {e}");
            return Vec::new();
        }
    };
    match parse_assignments(&reply) {
        Ok(assignments) => assignments
            .into_iter()
            .filter(|a| processed.insert(a.match_id.clone()))
            .collect(),
        Err(e) => {
            warn!("{e}");
            Vec::new()
        }
    }
}

// ── Broadcast inbox ────────────────────────────────────────────────────

/// League broadcasts are informational for a referee; everything is
/// acknowledged so the coordinator's delivery report stays clean.
fn handle_broadcast(body: &Value) -> Value {
    let round_id = body.get("round_id").and_then(Value::as_u64).unwrap_or_default();
    match body.get("message_type").and_then(Value::as_str) {
        Some(protocol::MSG_ROUND_ANNOUNCEMENT) => {
            let matches = body.get("matches").and_then(Value::as_array).map(Vec::len).unwrap_or(0);
            info!("round {round_id} announced with {matches} matches");
        }
        Some(protocol::MSG_ROUND_COMPLETED) => info!("round {round_id} completed"),
        Some(protocol::MSG_TOURNAMENT_START) => info!("tournament started"),
        Some(protocol::MSG_TOURNAMENT_END) => {
            info!("tournament over, champion {}", body.get("champion").and_then(serde_json::Value::as_str).unwrap_or("nobody"));
        }
        other => debug!("ignoring broadcast {other:?}"),
    }
    json!({ "result": { "status": "ok" } })
}

async fn inbox_dispatch(Json(body): Json<Value>) -> Json<Value> {
    Json(handle_broadcast(&body))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn serve_inbox(port: u16) {
    let addr = format!("0.0.0.0:{port}");
    let app = Router::new()
        .route("/rpc", post(inbox_dispatch))
        .route("/healthz", get(healthz));
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("referee failed to bind {addr}: {e}");
            return;
        }
    };
    info!("referee inbox listening at http://{addr}/");
    if let Err(e) = axum::serve(listener, app).await {
        error!("referee inbox error: {e}");
    }
}

// ── Service entrypoint ─────────────────────────────────────────────────

pub async fn run(config: AppConfig) {
    let client = reqwest::Client::new();
    let coordinator = rpc_endpoint(&config.coordinator_url);
    let advertised = format!("http://127.0.0.1:{}/rpc", config.referee_port);
    tokio::spawn(serve_inbox(config.referee_port));

    let registration = protocol::register_referee(&config.referee_id, &advertised);
    let reply = match send_with_retry(&client, &coordinator, &registration, BROADCAST_MAX_RETRIES).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("registration never reached {coordinator}: {e}");
            return;
        }
    };
    let (referee_id, auth_token) = match parse_registration(&reply) {
        Ok(pair) => pair,
        Err(e) => {
            error!("registration rejected: {e}");
            return;
        }
    };
    if referee_id != config.referee_id {
        warn!("requested id {} was taken, running as {referee_id}", config.referee_id);
    }
    info!("referee {referee_id} registered, polling every {}ms", config.poll_interval_ms);

    let ctx = RefereeContext {
        client: client.clone(),
        referee_id,
        auth_token,
        league_id: config.league_id.clone(),
        coordinator_endpoint: coordinator.clone(),
        invitation_timeout: Duration::from_secs(config.invitation_timeout_secs),
        choice_timeout: Duration::from_secs(config.choice_timeout_secs),
    };
    let limiter = Arc::new(Semaphore::new(config.max_concurrent_matches));
    let mut processed: HashSet<String> = HashSet::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    loop {
        ticker.tick().await;
        let fresh =
            claim_new_assignments(&client, &coordinator, &ctx.referee_id, &ctx.auth_token, &mut processed).await;
        for assignment in fresh {
            // Polling pauses while the league is at match capacity.
            let permit = match limiter.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let _permit = permit;
                run_match(&ctx, &assignment).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_endpoint_normalizes_the_base_url() {
        assert_eq!(rpc_endpoint("http://127.0.0.1:8000"), "http://127.0.0.1:8000/rpc");
        assert_eq!(rpc_endpoint("http://127.0.0.1:8000/"), "http://127.0.0.1:8000/rpc");
    }

    #[test]
    fn registration_reply_shapes_are_covered() {
        let ok = json!({ "result": { "referee_id": "REF02", "auth_token": "tok_rref02_x" } });
        assert_eq!(
            parse_registration(&ok).unwrap(),
            ("REF02".to_string(), "tok_rref02_x".to_string())
        );

        let rejected = json!({ "error": "League full: maximum 10 referees allowed" });
        assert!(parse_registration(&rejected).unwrap_err().contains("League full"));

        let truncated = json!({ "result": { "referee_id": "REF02" } });
        assert!(parse_registration(&truncated).unwrap_err().contains("auth_token"));
    }

    #[test]
    fn assignments_parse_from_wire_field_names() {
        let reply = json!({
            "result": {
                "matches": [{
                    "match_id": "lg_R1_M001",
                    "round_id": 1,
                    "player_A_id": "P01",
                    "player_B_id": "P02",
                    "player_A_endpoint": "http://127.0.0.1:8101/rpc",
                    "player_B_endpoint": "http://127.0.0.1:8102/rpc",
                    "referee_id": "REF01",
                }],
            },
        });
        let assignments = parse_assignments(&reply).unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].player_b_id, "P02");
        assert_eq!(assignments[0].player_a_endpoint, "http://127.0.0.1:8101/rpc");

        assert!(parse_assignments(&json!({ "result": {} })).unwrap().is_empty());
        assert!(parse_assignments(&json!({ "result": { "matches": "nope" } })).is_err());
    }

    #[test]
    fn broadcasts_are_always_acknowledged() {
        for message_type in ["ROUND_ANNOUNCEMENT", "ROUND_COMPLETED", "TOURNAMENT_START", "TOURNAMENT_END", "GOSSIP"] {
            let reply = handle_broadcast(&json!({ "message_type": message_type, "round_id": 1 }));
            assert_eq!(reply["result"]["status"], "ok", "{message_type} should be acknowledged");
        }
    }

    #[tokio::test]
    async fn polling_claims_each_assignment_once() {
        let assignment = json!({
            "match_id": "lg_R1_M001",
            "round_id": 1,
            "player_A_id": "P01",
            "player_B_id": "P02",
            "player_A_endpoint": "http://127.0.0.1:8101/rpc",
            "player_B_endpoint": "http://127.0.0.1:8102/rpc",
            "referee_id": "REF01",
        });
        let app = Router::new().route(
            "/rpc",
            post(move |Json(body): Json<Value>| {
                let assignment = assignment.clone();
                async move {
                    assert_eq!(body["message_type"], "GET_ASSIGNED_MATCHES");
                    Json(json!({ "result": { "matches": [assignment] } }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let endpoint = format!("http://{addr}/rpc");

        let client = reqwest::Client::new();
        let mut processed = HashSet::new();
        let fresh = claim_new_assignments(&client, &endpoint, "REF01", "tok", &mut processed).await;
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].match_id, "lg_R1_M001");

        let again = claim_new_assignments(&client, &endpoint, "REF01", "tok", &mut processed).await;
        assert!(again.is_empty(), "a second poll must not re-claim the match");
    }

    #[tokio::test]
    async fn unreachable_coordinator_yields_no_assignments() {
        let client = reqwest::Client::new();
        let mut processed = HashSet::new();
        let fresh = claim_new_assignments(&client, "http://127.0.0.1:9/rpc", "REF01", "tok", &mut processed).await;
        assert!(fresh.is_empty());
    }
}
