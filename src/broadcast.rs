use crate::rpc;
use crate::types::BROADCAST_MAX_RETRIES;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Recipient {
    pub id: String,
    pub endpoint: Option<String>,
}

impl Recipient {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Recipient {
            id: id.into(),
            endpoint: Some(endpoint.into()),
        }
    }
}

/// Outcome of one fan-out. `successful + failed == total` always holds;
/// a recipient with no endpoint counts as failed without an attempt.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub failed_ids: Vec<String>,
    pub errors: Vec<(String, String)>,
}

/// Up to `max_retries + 1` attempts with a linear backoff between them
/// (0.5 s, then 1.0 s, ...). Returns the last error when the budget runs out.
pub async fn send_with_retry(
    client: &reqwest::Client,
    endpoint: &str,
    body: &Value,
    max_retries: u32,
) -> Result<Value, String> {
    let mut last_err = String::new();
    for attempt in 0..=max_retries {
        if attempt > 0 {
            sleep(Duration::from_millis(500 * u64::from(attempt))).await;
        }
        match rpc::post_message(client, endpoint, body).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("delivery attempt {} of {} to {endpoint} failed: {e}", attempt + 1, max_retries + 1);
                last_err = e;
            }
        }
    }
    Err(last_err)
}

/// Deliver `body` to every recipient concurrently, one task each, and
/// gather the outcome into a `DeliveryReport`. Never returns an error;
/// broadcast failures are data, not faults.
pub async fn broadcast(client: &reqwest::Client, recipients: &[Recipient], body: &Value) -> DeliveryReport {
    broadcast_with_retries(client, recipients, body, BROADCAST_MAX_RETRIES).await
}

pub async fn broadcast_with_retries(
    client: &reqwest::Client,
    recipients: &[Recipient],
    body: &Value,
    max_retries: u32,
) -> DeliveryReport {
    let mut report = DeliveryReport {
        total: recipients.len(),
        ..DeliveryReport::default()
    };

    let mut handles = Vec::new();
    for recipient in recipients {
        let endpoint = match &recipient.endpoint {
            Some(endpoint) if !endpoint.trim().is_empty() => endpoint.clone(),
            _ => {
                report.failed += 1;
                report.failed_ids.push(recipient.id.clone());
                report.errors.push((recipient.id.clone(), "no endpoint on record".to_string()));
                continue;
            }
        };
        let client = client.clone();
        let body = body.clone();
        let id = recipient.id.clone();
        handles.push((
            id,
            tokio::spawn(async move { send_with_retry(&client, &endpoint, &body, max_retries).await }),
        ));
    }

    for (id, handle) in handles {
        match handle.await {
            Ok(Ok(_)) => report.successful += 1,
            Ok(Err(e)) => {
                report.failed += 1;
                report.failed_ids.push(id.clone());
                report.errors.push((id, e));
            }
            Err(e) => {
                report.failed += 1;
                report.failed_ids.push(id.clone());
                report.errors.push((id, format!("delivery task panicked: {e}")));
            }
        }
    }
    report
}
