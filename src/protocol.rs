use crate::types::*;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};

// ── Message types ──────────────────────────────────────────────────────

pub const MSG_GAME_INVITATION: &str = "GAME_INVITATION";
pub const MSG_CHOOSE_PARITY_CALL: &str = "CHOOSE_PARITY_CALL";
pub const MSG_GAME_OVER: &str = "GAME_OVER";
pub const MSG_MATCH_RESULT_REPORT: &str = "MATCH_RESULT_REPORT";
pub const MSG_ROUND_ANNOUNCEMENT: &str = "ROUND_ANNOUNCEMENT";
pub const MSG_ROUND_COMPLETED: &str = "ROUND_COMPLETED";
pub const MSG_TOURNAMENT_START: &str = "TOURNAMENT_START";
pub const MSG_TOURNAMENT_END: &str = "TOURNAMENT_END";
pub const MSG_REGISTER_PLAYER: &str = "REGISTER_PLAYER";
pub const MSG_REGISTER_REFEREE: &str = "REGISTER_REFEREE";
pub const MSG_GET_ASSIGNED_MATCHES: &str = "GET_ASSIGNED_MATCHES";
pub const MSG_GET_STANDINGS: &str = "get_standings";
pub const MSG_START_TOURNAMENT: &str = "START_TOURNAMENT";

pub const LEAGUE_SENDER: &str = "league:league_manager";

pub fn referee_sender(referee_id: &str) -> String {
  format!("referee:{referee_id}")
}

pub fn player_sender(player_id: &str) -> String {
  format!("player:{player_id}")
}

// ── Envelope ───────────────────────────────────────────────────────────

pub fn wire_timestamp(t: DateTime<Utc>) -> String {
  t.format(WIRE_TIMESTAMP_FORMAT).to_string()
}

pub fn envelope(message_type: &str, sender: &str, conversation_id: &str) -> Value {
  json!({
    "protocol": LEAGUE_PROTOCOL,
    "message_type": message_type,
    "sender": sender,
    "timestamp": wire_timestamp(Utc::now()),
    "conversation_id": conversation_id,
  })
}

fn with_fields(mut base: Value, fields: Vec<(&str, Value)>) -> Value {
  if let Some(obj) = base.as_object_mut() {
    for (key, value) in fields {
      obj.insert(key.to_string(), value);
    }
  }
  base
}

fn choices_json(choices: &[(String, Parity)]) -> Value {
  let mut map = Map::new();
  for (player_id, choice) in choices {
    map.insert(player_id.clone(), Value::String(choice.as_str().to_string()));
  }
  Value::Object(map)
}

fn scores_json(scores: &[(String, u32)]) -> Value {
  let mut map = Map::new();
  for (player_id, points) in scores {
    map.insert(player_id.clone(), json!(points));
  }
  Value::Object(map)
}

pub fn game_result_json(result: &GameResult) -> Value {
  json!({
    "status": result.status,
    "winner_player_id": result.winner_player_id,
    "drawn_number": result.drawn_number,
    "number_parity": result.number_parity.as_str(),
    "choices": choices_json(&result.choices),
    "scores": scores_json(&result.scores),
  })
}

// ── Referee -> player messages ─────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn game_invitation(
  referee_id: &str,
  auth_token: &str,
  league_id: &str,
  round_id: u32,
  match_id: &str,
  role_in_match: &str,
  opponent_id: &str,
) -> Value {
  let base = envelope(
    MSG_GAME_INVITATION,
    &referee_sender(referee_id),
    &format!("conv{match_id}001"),
  );
  with_fields(
    base,
    vec![
      ("auth_token", json!(auth_token)),
      ("league_id", json!(league_id)),
      ("round_id", json!(round_id)),
      ("match_id", json!(match_id)),
      ("game_type", json!(GAME_TYPE)),
      ("role_in_match", json!(role_in_match)),
      ("opponent_id", json!(opponent_id)),
    ],
  )
}

pub fn choose_parity_call(
  referee_id: &str,
  auth_token: &str,
  match_id: &str,
  player_id: &str,
  opponent_id: &str,
  round_id: u32,
  choice_timeout_secs: u64,
) -> Value {
  let deadline = wire_timestamp(Utc::now() + Duration::seconds(choice_timeout_secs as i64));
  let base = envelope(
    MSG_CHOOSE_PARITY_CALL,
    &referee_sender(referee_id),
    &format!("conv{match_id}002"),
  );
  with_fields(
    base,
    vec![
      ("auth_token", json!(auth_token)),
      ("match_id", json!(match_id)),
      ("game_type", json!(GAME_TYPE)),
      ("deadline", json!(deadline)),
      ("player_id", json!(player_id)),
      ("context", json!({ "opponent_id": opponent_id, "round_id": round_id })),
    ],
  )
}

pub fn game_over(referee_id: &str, auth_token: &str, match_id: &str, result: &GameResult) -> Value {
  let base = envelope(
    MSG_GAME_OVER,
    &referee_sender(referee_id),
    &format!("conv{match_id}003"),
  );
  with_fields(
    base,
    vec![
      ("auth_token", json!(auth_token)),
      ("match_id", json!(match_id)),
      ("game_type", json!(GAME_TYPE)),
      ("game_result", game_result_json(result)),
    ],
  )
}

// ── Referee -> coordinator reports ─────────────────────────────────────

pub fn match_result_report(
  referee_id: &str,
  auth_token: &str,
  league_id: &str,
  round_id: u32,
  match_id: &str,
  result: &GameResult,
) -> Value {
  let base = envelope(
    MSG_MATCH_RESULT_REPORT,
    &referee_sender(referee_id),
    &format!("conv{match_id}report"),
  );
  with_fields(
    base,
    vec![
      ("auth_token", json!(auth_token)),
      ("league_id", json!(league_id)),
      ("round_id", json!(round_id)),
      ("match_id", json!(match_id)),
      ("game_type", json!(GAME_TYPE)),
      (
        "result",
        json!({
          "winner": result.winner_player_id,
          "score": scores_json(&result.scores),
          "details": {
            "drawn_number": result.drawn_number,
            "choices": choices_json(&result.choices),
          },
        }),
      ),
    ],
  )
}

pub fn match_abort_report(
  referee_id: &str,
  auth_token: &str,
  league_id: &str,
  round_id: u32,
  match_id: &str,
  reason: &str,
) -> Value {
  let base = envelope(
    MSG_MATCH_RESULT_REPORT,
    &referee_sender(referee_id),
    &format!("conv{match_id}abort"),
  );
  with_fields(
    base,
    vec![
      ("auth_token", json!(auth_token)),
      ("league_id", json!(league_id)),
      ("round_id", json!(round_id)),
      ("match_id", json!(match_id)),
      ("game_type", json!(GAME_TYPE)),
      ("result", json!({ "status": "ABORTED", "reason": reason })),
    ],
  )
}

// ── Coordinator broadcasts ─────────────────────────────────────────────

pub fn match_announcement_entry(assignment: &MatchAssignment, referee_endpoint: &str) -> Value {
  json!({
    "match_id": assignment.match_id,
    "game_type": GAME_TYPE,
    "player_A_id": assignment.player_a_id,
    "player_B_id": assignment.player_b_id,
    "referee_endpoint": referee_endpoint,
  })
}

pub fn round_announcement(league_id: &str, round_id: u32, matches: Vec<Value>) -> Value {
  let base = envelope(
    MSG_ROUND_ANNOUNCEMENT,
    LEAGUE_SENDER,
    &format!("league_{league_id}_r{round_id}"),
  );
  with_fields(
    base,
    vec![
      ("league_id", json!(league_id)),
      ("round_id", json!(round_id)),
      ("matches", Value::Array(matches)),
    ],
  )
}

pub fn round_completed(league_id: &str, round_id: u32, matches_completed: usize, next_round_id: Option<u32>) -> Value {
  let base = envelope(
    MSG_ROUND_COMPLETED,
    LEAGUE_SENDER,
    &format!("league_{league_id}_r{round_id}_complete"),
  );
  with_fields(
    base,
    vec![
      ("league_id", json!(league_id)),
      ("round_id", json!(round_id)),
      ("matches_completed", json!(matches_completed)),
      ("next_round_id", json!(next_round_id)),
    ],
  )
}

pub fn tournament_start(league_id: &str, total_rounds: usize, total_matches: usize, player_count: usize) -> Value {
  let base = envelope(MSG_TOURNAMENT_START, LEAGUE_SENDER, &format!("league_{league_id}_start"));
  with_fields(
    base,
    vec![
      ("league_id", json!(league_id)),
      ("total_rounds", json!(total_rounds)),
      ("total_matches", json!(total_matches)),
      ("player_count", json!(player_count)),
    ],
  )
}

pub fn tournament_end(
  league_id: &str,
  total_rounds: usize,
  total_matches: usize,
  champion: Option<&str>,
  final_standings: Value,
) -> Value {
  let base = envelope(MSG_TOURNAMENT_END, LEAGUE_SENDER, &format!("league_{league_id}_end"));
  with_fields(
    base,
    vec![
      ("league_id", json!(league_id)),
      ("total_rounds", json!(total_rounds)),
      ("total_matches", json!(total_matches)),
      ("champion", json!(champion)),
      ("final_standings", final_standings),
    ],
  )
}

// ── Registration and queries ───────────────────────────────────────────

pub fn register_player(display_name: &str, endpoint: &str) -> Value {
  let base = envelope(MSG_REGISTER_PLAYER, &format!("player:{display_name}"), "reg_player");
  with_fields(
    base,
    vec![("display_name", json!(display_name)), ("endpoint", json!(endpoint))],
  )
}

pub fn register_referee(referee_id: &str, endpoint: &str) -> Value {
  let base = envelope(MSG_REGISTER_REFEREE, &referee_sender(referee_id), "reg_referee");
  with_fields(
    base,
    vec![("referee_id", json!(referee_id)), ("endpoint", json!(endpoint))],
  )
}

pub fn get_assigned_matches(referee_id: &str, auth_token: &str) -> Value {
  let base = envelope(
    MSG_GET_ASSIGNED_MATCHES,
    &referee_sender(referee_id),
    &format!("poll_{referee_id}"),
  );
  with_fields(
    base,
    vec![("referee_id", json!(referee_id)), ("auth_token", json!(auth_token))],
  )
}

pub fn get_standings_query(sender: &str) -> Value {
  envelope(MSG_GET_STANDINGS, sender, "standings_query")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_result() -> GameResult {
    GameResult {
      status: "WIN".to_string(),
      winner_player_id: Some("P01".to_string()),
      drawn_number: 4,
      number_parity: Parity::Even,
      choices: vec![("P01".to_string(), Parity::Even), ("P02".to_string(), Parity::Odd)],
      scores: vec![("P01".to_string(), 3), ("P02".to_string(), 0)],
    }
  }

  #[test]
  fn envelope_has_all_header_fields() {
    let value = envelope(MSG_GAME_OVER, "referee:REF01", "conv_x");
    assert_eq!(value["protocol"], "league.v2");
    assert_eq!(value["message_type"], "GAME_OVER");
    assert_eq!(value["sender"], "referee:REF01");
    assert_eq!(value["conversation_id"], "conv_x");
    let ts = value["timestamp"].as_str().unwrap();
    assert_eq!(ts.len(), 16, "timestamp {ts} should be compact UTC");
    assert!(ts.ends_with('Z'));
    assert_eq!(&ts[8..9], "T");
  }

  #[test]
  fn invitation_carries_match_context() {
    let value = game_invitation("REF01", "tok", "lg", 2, "lg_R2_M001", "PLAYER_B", "P01");
    assert_eq!(value["conversation_id"], "convlg_R2_M001001");
    assert_eq!(value["role_in_match"], "PLAYER_B");
    assert_eq!(value["opponent_id"], "P01");
    assert_eq!(value["game_type"], "even_odd");
    assert_eq!(value["round_id"], 2);
  }

  #[test]
  fn choice_call_context_names_opponent_and_round() {
    let value = choose_parity_call("REF01", "tok", "m1", "P02", "P01", 3, 30);
    assert_eq!(value["context"]["opponent_id"], "P01");
    assert_eq!(value["context"]["round_id"], 3);
    assert_eq!(value["player_id"], "P02");
    let deadline = value["deadline"].as_str().unwrap();
    assert!(deadline > value["timestamp"].as_str().unwrap());
  }

  #[test]
  fn result_report_nests_details() {
    let value = match_result_report("REF01", "tok", "lg", 1, "lg_R1_M001", &sample_result());
    assert_eq!(value["conversation_id"], "convlg_R1_M001report");
    assert_eq!(value["result"]["winner"], "P01");
    assert_eq!(value["result"]["score"]["P01"], 3);
    assert_eq!(value["result"]["details"]["drawn_number"], 4);
    assert_eq!(value["result"]["details"]["choices"]["P02"], "odd");
  }

  #[test]
  fn abort_report_has_status_and_reason() {
    let value = match_abort_report("REF01", "tok", "lg", 1, "m1", "invitation declined by P02");
    assert_eq!(value["conversation_id"], "convm1abort");
    assert_eq!(value["result"]["status"], "ABORTED");
    assert_eq!(value["result"]["reason"], "invitation declined by P02");
    assert!(value["result"].get("winner").is_none());
  }

  #[test]
  fn broadcast_conversation_ids_follow_league_naming() {
    let value = round_announcement("lg", 1, vec![]);
    assert_eq!(value["conversation_id"], "league_lg_r1");
    assert_eq!(value["sender"], LEAGUE_SENDER);

    let value = round_completed("lg", 1, 3, Some(2));
    assert_eq!(value["conversation_id"], "league_lg_r1_complete");
    assert_eq!(value["next_round_id"], 2);

    let value = round_completed("lg", 5, 3, None);
    assert!(value["next_round_id"].is_null());

    let value = tournament_end("lg", 5, 15, Some("P03"), serde_json::json!([]));
    assert_eq!(value["conversation_id"], "league_lg_end");
    assert_eq!(value["champion"], "P03");
  }

  #[test]
  fn game_over_embeds_full_result() {
    let value = game_over("REF01", "tok", "m1", &sample_result());
    assert_eq!(value["game_result"]["status"], "WIN");
    assert_eq!(value["game_result"]["number_parity"], "even");
    assert_eq!(value["game_result"]["scores"]["P02"], 0);
  }
}
