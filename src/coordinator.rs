use crate::broadcast::{broadcast, Recipient};
use crate::error::{LeagueError, LeagueResult};
use crate::lifecycle::Tournament;
use crate::monitor::{healthz_url, HealthMonitor, MonitoredAgent, MonitorEvent};
use crate::protocol;
use crate::registry::redact_token;
use crate::scheduler::build_schedule;
use crate::standings::StandingRow;
use crate::storage::{save_schedule, save_standings};
use crate::types::*;
use axum::{
    extract::State as AxumState,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct CoordinatorState {
    pub league: SharedLeague,
    pub config: Arc<AppConfig>,
    pub client: reqwest::Client,
}

impl CoordinatorState {
    pub fn new(config: AppConfig) -> Self {
        let league = LeagueState {
            registry: crate::registry::Registry::new(config.max_players, config.max_referees),
            tournament: None,
            standings: Default::default(),
        };
        CoordinatorState {
            league: Arc::new(Mutex::new(league)),
            config: Arc::new(config),
            client: reqwest::Client::new(),
        }
    }
}

// ── Report parsing ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    /// `None` means no choice matched the drawn parity: a tie.
    Winner(Option<String>),
    Aborted { reason: String },
}

#[derive(Debug, Clone)]
pub struct ParsedReport {
    pub round_id: u32,
    pub match_id: String,
    pub outcome: ReportOutcome,
}

pub fn parse_match_report(body: &Value) -> Result<ParsedReport, String> {
    let round_id = body
        .get("round_id")
        .and_then(Value::as_u64)
        .ok_or_else(|| "MATCH_RESULT_REPORT missing round_id".to_string())? as u32;
    let match_id = body
        .get("match_id")
        .and_then(Value::as_str)
        .ok_or_else(|| "MATCH_RESULT_REPORT missing match_id".to_string())?
        .to_string();
    let result = body
        .get("result")
        .filter(|v| v.is_object())
        .ok_or_else(|| "MATCH_RESULT_REPORT missing result".to_string())?;

    let outcome = if result.get("status").and_then(Value::as_str) == Some("ABORTED") {
        ReportOutcome::Aborted {
            reason: result
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("unspecified")
                .to_string(),
        }
    } else {
        ReportOutcome::Winner(result.get("winner").and_then(Value::as_str).map(str::to_string))
    };
    Ok(ParsedReport {
        round_id,
        match_id,
        outcome,
    })
}

// ── Result application (under the league lock) ─────────────────────────

#[derive(Debug, PartialEq, Eq)]
pub enum Applied {
    Duplicate,
    Recorded { round_finished: bool },
}

/// Fold one report into the league. Aborted matches count toward round
/// completion but leave the standings untouched. A report for an
/// already-completed match is a duplicate, not an error.
pub fn apply_match_result(league: &mut LeagueState, report: &ParsedReport) -> LeagueResult<Applied> {
    let LeagueState {
        tournament, standings, ..
    } = league;
    let tournament = tournament
        .as_mut()
        .ok_or_else(|| LeagueError::Round("no tournament in progress".to_string()))?;

    if tournament.is_match_complete(report.round_id, &report.match_id) {
        return Ok(Applied::Duplicate);
    }
    let (player_a, player_b) = tournament
        .match_players(report.round_id, &report.match_id)
        .ok_or_else(|| LeagueError::UnknownMatch(report.match_id.clone()))?;

    match &report.outcome {
        ReportOutcome::Winner(winner) => {
            standings.record_match_result(&player_a, &player_b, winner.as_deref())?;
        }
        ReportOutcome::Aborted { reason } => {
            warn!("match {} aborted upstream: {reason}", report.match_id);
        }
    }
    let round_finished = tournament.mark_match_complete(report.round_id, &report.match_id)?;
    Ok(Applied::Recorded { round_finished })
}

// ── Broadcast targets ──────────────────────────────────────────────────

fn league_recipients(league: &LeagueState) -> Vec<Recipient> {
    let mut recipients: Vec<Recipient> = league
        .registry
        .players()
        .iter()
        .map(|p| Recipient::new(p.player_id.clone(), p.endpoint.clone()))
        .collect();
    recipients.extend(
        league
            .registry
            .referees()
            .iter()
            .map(|r| Recipient::new(r.referee_id.clone(), r.endpoint.clone())),
    );
    recipients
}

fn announcement_entries(league: &LeagueState, tournament: &Tournament, round_id: u32) -> Vec<Value> {
    tournament
        .round(round_id)
        .map(|round| {
            round
                .matches
                .iter()
                .map(|m| {
                    let endpoint = league.registry.referee_endpoint(&m.referee_id).unwrap_or_default();
                    protocol::match_announcement_entry(m, &endpoint)
                })
                .collect()
        })
        .unwrap_or_default()
}

// ── Handlers ───────────────────────────────────────────────────────────

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn dispatch(AxumState(state): AxumState<CoordinatorState>, Json(body): Json<Value>) -> Json<Value> {
    match body.get("message_type").and_then(Value::as_str) {
        Some(protocol::MSG_REGISTER_PLAYER) => handle_register_player(&state, &body),
        Some(protocol::MSG_REGISTER_REFEREE) => handle_register_referee(&state, &body),
        Some(protocol::MSG_START_TOURNAMENT) => handle_start_tournament(&state).await,
        Some(protocol::MSG_GET_ASSIGNED_MATCHES) => handle_get_assigned_matches(&state, &body),
        Some(protocol::MSG_GET_STANDINGS) => handle_get_standings(&state),
        Some(protocol::MSG_MATCH_RESULT_REPORT) => handle_match_result(&state, &body).await,
        other => Json(json!({ "error": format!("unknown message_type: {other:?}") })),
    }
}

fn handle_register_player(state: &CoordinatorState, body: &Value) -> Json<Value> {
    let display_name = body.get("display_name").and_then(Value::as_str).unwrap_or("anonymous");
    let endpoint = match body.get("endpoint").and_then(Value::as_str) {
        Some(endpoint) if !endpoint.trim().is_empty() => endpoint,
        _ => return Json(json!({ "error": "REGISTER_PLAYER missing endpoint" })),
    };

    let mut guard = state.league.lock().unwrap_or_else(|e| e.into_inner());
    match guard.registry.register_player(display_name, endpoint) {
        Ok(record) => {
            guard.standings.ensure_player(&record.player_id);
            info!(
                "registered player {} ({display_name}) at {endpoint}, token {}",
                record.player_id,
                redact_token(&record.auth_token)
            );
            Json(json!({ "result": { "player_id": record.player_id, "auth_token": record.auth_token } }))
        }
        Err(e) => {
            warn!("player registration rejected: {e}");
            Json(json!({ "error": e.to_string() }))
        }
    }
}

fn handle_register_referee(state: &CoordinatorState, body: &Value) -> Json<Value> {
    let requested = body.get("referee_id").and_then(Value::as_str);
    let endpoint = match body.get("endpoint").and_then(Value::as_str) {
        Some(endpoint) if !endpoint.trim().is_empty() => endpoint,
        _ => return Json(json!({ "error": "REGISTER_REFEREE missing endpoint" })),
    };

    let mut guard = state.league.lock().unwrap_or_else(|e| e.into_inner());
    match guard.registry.register_referee(requested, endpoint) {
        Ok(record) => {
            info!(
                "registered referee {} at {endpoint}, token {}",
                record.referee_id,
                redact_token(&record.auth_token)
            );
            Json(json!({ "result": { "referee_id": record.referee_id, "auth_token": record.auth_token } }))
        }
        Err(e) => {
            warn!("referee registration rejected: {e}");
            Json(json!({ "error": e.to_string() }))
        }
    }
}

async fn handle_start_tournament(state: &CoordinatorState) -> Json<Value> {
    let (start_body, announcement_body, recipients, totals, schedule) = {
        let mut guard = state.league.lock().unwrap_or_else(|e| e.into_inner());
        if guard.tournament.is_some() {
            return Json(json!({ "error": "tournament already started" }));
        }
        let schedule = match build_schedule(
            &state.config.league_id,
            guard.registry.players(),
            &guard.registry.referee_ids(),
        ) {
            Ok(schedule) => schedule,
            Err(e) => return Json(json!({ "error": e.to_string() })),
        };
        let mut tournament = Tournament::from_schedule(state.config.league_id.clone(), &schedule);
        if let Err(e) = tournament.start_round(1) {
            return Json(json!({ "error": e.to_string() }));
        }

        let totals = (tournament.total_rounds(), tournament.total_matches());
        let start_body = protocol::tournament_start(
            &state.config.league_id,
            totals.0,
            totals.1,
            guard.registry.players().len(),
        );
        let entries = announcement_entries(&guard, &tournament, 1);
        let announcement_body = protocol::round_announcement(&state.config.league_id, 1, entries);
        let recipients = league_recipients(&guard);
        guard.tournament = Some(tournament);
        (start_body, announcement_body, recipients, totals, schedule)
    };

    if let Err(e) = save_schedule(&state.config.data_dir, &state.config.league_id, &schedule) {
        error!("schedule not persisted: {e}");
    }
    spawn_health_watch(state, &recipients);

    let report = broadcast(&state.client, &recipients, &start_body).await;
    info!("TOURNAMENT_START delivered to {}/{} agents", report.successful, report.total);
    let report = broadcast(&state.client, &recipients, &announcement_body).await;
    info!("round 1 announced to {}/{} agents", report.successful, report.total);

    Json(json!({
        "result": {
            "status": "started",
            "league_id": state.config.league_id,
            "total_rounds": totals.0,
            "total_matches": totals.1,
        }
    }))
}

fn handle_get_assigned_matches(state: &CoordinatorState, body: &Value) -> Json<Value> {
    let referee_id = match body.get("referee_id").and_then(Value::as_str) {
        Some(id) => id,
        None => return Json(json!({ "error": "GET_ASSIGNED_MATCHES missing referee_id" })),
    };
    let guard = state.league.lock().unwrap_or_else(|e| e.into_inner());
    let matches = guard
        .tournament
        .as_ref()
        .map(|t| t.assigned_matches(referee_id))
        .unwrap_or_default();
    Json(json!({ "result": { "matches": matches } }))
}

fn handle_get_standings(state: &CoordinatorState) -> Json<Value> {
    let guard = state.league.lock().unwrap_or_else(|e| e.into_inner());
    Json(json!({ "result": { "standings": guard.standings.get_standings() } }))
}

struct RoundFollowup {
    completed_body: Value,
    next_body: Option<Value>,
    recipients: Vec<Recipient>,
    standings_rows: Vec<StandingRow>,
}

async fn handle_match_result(state: &CoordinatorState, body: &Value) -> Json<Value> {
    let report = match parse_match_report(body) {
        Ok(report) => report,
        Err(e) => return Json(json!({ "error": e })),
    };

    let followup: Option<RoundFollowup> = {
        let mut guard = state.league.lock().unwrap_or_else(|e| e.into_inner());
        match apply_match_result(&mut guard, &report) {
            Ok(Applied::Duplicate) => {
                warn!("duplicate report for {} ignored", report.match_id);
                return Json(json!({ "result": { "status": "duplicate" } }));
            }
            Ok(Applied::Recorded { round_finished: false }) => None,
            Ok(Applied::Recorded { round_finished: true }) => {
                match finish_round(state, &mut guard, report.round_id) {
                    Ok(followup) => Some(followup),
                    Err(e) => return Json(json!({ "error": e.to_string() })),
                }
            }
            Err(e) => {
                warn!("report for {} rejected: {e}", report.match_id);
                return Json(json!({ "error": e.to_string() }));
            }
        }
    };
    info!("recorded result for match {}", report.match_id);

    if let Some(followup) = followup {
        if let Err(e) = save_standings(&state.config.data_dir, &state.config.league_id, &followup.standings_rows) {
            error!("standings not persisted: {e}");
        }
        let delivery = broadcast(&state.client, &followup.recipients, &followup.completed_body).await;
        info!(
            "round {} completion delivered to {}/{} agents",
            report.round_id, delivery.successful, delivery.total
        );
        if let Some(next_body) = followup.next_body {
            let delivery = broadcast(&state.client, &followup.recipients, &next_body).await;
            info!("next round announced to {}/{} agents", delivery.successful, delivery.total);
        }
    }
    Json(json!({ "result": { "status": "recorded" } }))
}

/// Runs under the league lock: closes the round, advances or ends the
/// tournament, and packages every broadcast body for delivery after the
/// lock is released.
fn finish_round(state: &CoordinatorState, league: &mut LeagueState, round_id: u32) -> LeagueResult<RoundFollowup> {
    let standings_rows = league.standings.get_standings();
    let recipients = league_recipients(league);

    let tournament = league
        .tournament
        .as_mut()
        .ok_or_else(|| LeagueError::Round("no tournament in progress".to_string()))?;
    let totals = (tournament.total_rounds(), tournament.total_matches());
    let completion = tournament.complete_round(round_id)?;
    let completed_body = protocol::round_completed(
        &state.config.league_id,
        round_id,
        completion.matches_completed,
        completion.next_round_id,
    );

    let next_body = match completion.next_round_id {
        Some(next_round_id) => {
            tournament.start_round(next_round_id)?;
            let entries = announcement_entries_mutable(league, next_round_id);
            Some(protocol::round_announcement(&state.config.league_id, next_round_id, entries))
        }
        None => {
            let champion = standings_rows.first().map(|row| row.player_id.clone());
            info!(
                "tournament {} complete, champion {:?}",
                state.config.league_id, champion
            );
            Some(protocol::tournament_end(
                &state.config.league_id,
                totals.0,
                totals.1,
                champion.as_deref(),
                serde_json::to_value(&standings_rows).unwrap_or_else(|_| json!([])),
            ))
        }
    };

    Ok(RoundFollowup {
        completed_body,
        next_body,
        recipients,
        standings_rows,
    })
}

fn announcement_entries_mutable(league: &LeagueState, round_id: u32) -> Vec<Value> {
    league
        .tournament
        .as_ref()
        .map(|t| announcement_entries(league, t, round_id))
        .unwrap_or_default()
}

// ── Health watch ───────────────────────────────────────────────────────

fn spawn_health_watch(state: &CoordinatorState, recipients: &[Recipient]) {
    let agents: Vec<MonitoredAgent> = recipients
        .iter()
        .filter_map(|r| {
            r.endpoint.as_ref().map(|endpoint| MonitoredAgent {
                id: r.id.clone(),
                health_url: healthz_url(endpoint),
            })
        })
        .collect();
    if agents.is_empty() {
        return;
    }
    let mut rx = HealthMonitor::default().spawn(state.client.clone(), agents);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                MonitorEvent::AgentUnhealthy { id } => error!("agent {id} is unhealthy"),
                MonitorEvent::AgentRecovered { id } => info!("agent {id} recovered"),
            }
        }
    });
}

// ── Service entrypoint ─────────────────────────────────────────────────

pub fn router(state: CoordinatorState) -> Router {
    Router::new()
        .route("/rpc", post(dispatch))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn serve(config: AppConfig) {
    let addr = format!("{}:{}", config.coordinator_host, config.coordinator_port);
    let app = router(CoordinatorState::new(config));
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("coordinator failed to bind {addr}: {e}");
            return;
        }
    };
    info!("coordinator listening at http://{addr}/");
    if let Err(e) = axum::serve(listener, app).await {
        error!("coordinator server error: {e}");
    }
}
