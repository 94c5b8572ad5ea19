use crate::broadcast::send_with_retry;
use crate::game::{determine_winner, draw_number};
use crate::protocol;
use crate::rpc::{post_with_deadline, result_field};
use crate::session::{GameSession, MatchState};
use crate::types::*;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, warn};

/// Everything a referee needs to drive one match.
#[derive(Clone)]
pub struct RefereeContext {
    pub client: reqwest::Client,
    pub referee_id: String,
    pub auth_token: String,
    pub league_id: String,
    pub coordinator_endpoint: String,
    pub invitation_timeout: Duration,
    pub choice_timeout: Duration,
}

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Finished(GameResult),
    Aborted { reason: String },
}

/// Both players must answer `{accept: true}` within the window.
fn invitation_accepted(reply: &Result<Value, String>, player_id: &str) -> Result<(), String> {
    match reply {
        Ok(value) => {
            if result_field(value).get("accept").and_then(Value::as_bool) == Some(true) {
                Ok(())
            } else {
                Err(format!("invitation declined by {player_id}"))
            }
        }
        Err(e) => Err(format!("invitation to {player_id} failed: {e}")),
    }
}

/// Anything but a literal `"even"` or `"odd"` is a protocol violation.
fn parse_parity_choice(reply: &Result<Value, String>, player_id: &str) -> Result<Parity, String> {
    match reply {
        Ok(value) => {
            let raw = result_field(value)
                .get("parity_choice")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_default();
            Parity::from_wire(&raw).ok_or_else(|| format!("invalid parity choice from {player_id}: {raw:?}"))
        }
        Err(e) => Err(format!("no choice from {player_id}: {e}")),
    }
}

/// Drive one match through its five phases. Every failure before the
/// draw aborts the session and still reports upstream; once the number
/// is drawn the match always runs to FINISHED.
pub async fn run_match(ctx: &RefereeContext, assignment: &MatchAssignment) -> MatchOutcome {
    let mut session = GameSession::new(assignment.match_id.clone());
    info!("match {} starting: {} vs {}", assignment.match_id, assignment.player_a_id, assignment.player_b_id);

    match drive(ctx, assignment, &mut session).await {
        Ok(result) => {
            report_result(ctx, assignment, &result).await;
            MatchOutcome::Finished(result)
        }
        Err(reason) => {
            if let Err(e) = session.transition(MatchState::Aborted) {
                error!("match {}: abort transition refused: {e}", assignment.match_id);
            }
            warn!("match {} aborted: {reason}", assignment.match_id);
            report_aborted(ctx, assignment, &reason).await;
            MatchOutcome::Aborted { reason }
        }
    }
}

async fn drive(
    ctx: &RefereeContext,
    assignment: &MatchAssignment,
    session: &mut GameSession,
) -> Result<GameResult, String> {
    let match_id = assignment.match_id.as_str();

    // Phase 1: invitations. Both legs are built before either is polled.
    let invite_a = protocol::game_invitation(
        &ctx.referee_id,
        &ctx.auth_token,
        &ctx.league_id,
        assignment.round_id,
        match_id,
        "PLAYER_A",
        &assignment.player_b_id,
    );
    let invite_b = protocol::game_invitation(
        &ctx.referee_id,
        &ctx.auth_token,
        &ctx.league_id,
        assignment.round_id,
        match_id,
        "PLAYER_B",
        &assignment.player_a_id,
    );
    let (reply_a, reply_b) = tokio::join!(
        post_with_deadline(&ctx.client, &assignment.player_a_endpoint, &invite_a, ctx.invitation_timeout),
        post_with_deadline(&ctx.client, &assignment.player_b_endpoint, &invite_b, ctx.invitation_timeout),
    );
    invitation_accepted(&reply_a, &assignment.player_a_id)?;
    invitation_accepted(&reply_b, &assignment.player_b_id)?;
    session.transition(MatchState::CollectingChoices).map_err(|e| e.to_string())?;

    // Phase 2: collect choices under the shared deadline.
    let call_a = protocol::choose_parity_call(
        &ctx.referee_id,
        &ctx.auth_token,
        match_id,
        &assignment.player_a_id,
        &assignment.player_b_id,
        assignment.round_id,
        ctx.choice_timeout.as_secs(),
    );
    let call_b = protocol::choose_parity_call(
        &ctx.referee_id,
        &ctx.auth_token,
        match_id,
        &assignment.player_b_id,
        &assignment.player_a_id,
        assignment.round_id,
        ctx.choice_timeout.as_secs(),
    );
    let (reply_a, reply_b) = tokio::join!(
        post_with_deadline(&ctx.client, &assignment.player_a_endpoint, &call_a, ctx.choice_timeout),
        post_with_deadline(&ctx.client, &assignment.player_b_endpoint, &call_b, ctx.choice_timeout),
    );
    let choice_a = parse_parity_choice(&reply_a, &assignment.player_a_id)?;
    let choice_b = parse_parity_choice(&reply_b, &assignment.player_b_id)?;

    // Phase 3: draw and evaluate.
    session.transition(MatchState::DrawingNumber).map_err(|e| e.to_string())?;
    let drawn = draw_number();
    session.transition(MatchState::Evaluating).map_err(|e| e.to_string())?;
    let choices = vec![
        (assignment.player_a_id.clone(), choice_a),
        (assignment.player_b_id.clone(), choice_b),
    ];
    let result = determine_winner(drawn, &choices);
    session.transition(MatchState::Finished).map_err(|e| e.to_string())?;
    info!(
        "match {match_id} finished: drew {drawn} ({}), winner {:?}",
        result.number_parity.as_str(),
        result.winner_player_id
    );

    // Phase 4: notify both players. Failures are logged, never fatal.
    let over = protocol::game_over(&ctx.referee_id, &ctx.auth_token, match_id, &result);
    let (ack_a, ack_b) = tokio::join!(
        post_with_deadline(&ctx.client, &assignment.player_a_endpoint, &over, ctx.invitation_timeout),
        post_with_deadline(&ctx.client, &assignment.player_b_endpoint, &over, ctx.invitation_timeout),
    );
    for (player_id, ack) in [(&assignment.player_a_id, ack_a), (&assignment.player_b_id, ack_b)] {
        if let Err(e) = ack {
            warn!("match {match_id}: GAME_OVER to {player_id} not acknowledged: {e}");
        }
    }

    Ok(result)
}

async fn report_result(ctx: &RefereeContext, assignment: &MatchAssignment, result: &GameResult) {
    let body = protocol::match_result_report(
        &ctx.referee_id,
        &ctx.auth_token,
        &ctx.league_id,
        assignment.round_id,
        &assignment.match_id,
        result,
    );
    if let Err(e) = send_with_retry(&ctx.client, &ctx.coordinator_endpoint, &body, BROADCAST_MAX_RETRIES).await {
        error!("match {}: result report undelivered: {e}", assignment.match_id);
    }
}

async fn report_aborted(ctx: &RefereeContext, assignment: &MatchAssignment, reason: &str) {
    let body = protocol::match_abort_report(
        &ctx.referee_id,
        &ctx.auth_token,
        &ctx.league_id,
        assignment.round_id,
        &assignment.match_id,
        reason,
    );
    if let Err(e) = send_with_retry(&ctx.client, &ctx.coordinator_endpoint, &body, BROADCAST_MAX_RETRIES).await {
        error!("match {}: abort report undelivered: {e}", assignment.match_id);
    }
}
