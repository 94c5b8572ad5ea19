use serde_json::Value;
use std::time::Duration;

/// POST a protocol message as JSON and decode the JSON reply. Errors are
/// flattened to strings; callers decide whether a failure aborts a match,
/// counts against a retry budget, or is merely logged.
pub async fn post_message(client: &reqwest::Client, endpoint: &str, body: &Value) -> Result<Value, String> {
  let response = client
    .post(endpoint)
    .json(body)
    .send()
    .await
    .map_err(|e| format!("post {endpoint}: {e}"))?;
  let status = response.status();
  if !status.is_success() {
    return Err(format!("post {endpoint}: HTTP {status}"));
  }
  response
    .json::<Value>()
    .await
    .map_err(|e| format!("decode response from {endpoint}: {e}"))
}

/// Same as `post_message` but bounded by an explicit deadline, for the
/// invitation and choice phases where the protocol fixes the wait.
pub async fn post_with_deadline(
  client: &reqwest::Client,
  endpoint: &str,
  body: &Value,
  deadline: Duration,
) -> Result<Value, String> {
  match tokio::time::timeout(deadline, post_message(client, endpoint, body)).await {
    Ok(result) => result,
    Err(_) => Err(format!("post {endpoint}: timed out after {}s", deadline.as_secs_f64())),
  }
}

/// Replies are wrapped as `{"result": ...}`; pull the payload out.
pub fn result_field(value: &Value) -> Value {
  value.get("result").cloned().unwrap_or(Value::Null)
}
