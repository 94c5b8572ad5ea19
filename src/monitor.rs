use crate::types::{HEALTH_CHECK_INTERVAL_SECS, HEALTH_CHECK_TIMEOUT_SECS, HEALTH_FAILURE_THRESHOLD};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    AgentUnhealthy { id: String },
    AgentRecovered { id: String },
}

#[derive(Debug, Clone)]
pub struct MonitoredAgent {
    pub id: String,
    pub health_url: String,
}

/// `POST /rpc` endpoints map to their service's `GET /healthz`.
pub fn healthz_url(rpc_endpoint: &str) -> String {
    let base = rpc_endpoint.trim_end_matches('/');
    let base = base.strip_suffix("/rpc").unwrap_or(base);
    format!("{base}/healthz")
}

#[derive(Debug, Default)]
struct AgentHealth {
    failures: u32,
    unhealthy: bool,
}

/// Events fire only on a state transition: `threshold` consecutive
/// failures flip an agent to unhealthy, one success flips it back.
fn note_check(health: &mut AgentHealth, success: bool, threshold: u32) -> Option<bool> {
    if success {
        health.failures = 0;
        if health.unhealthy {
            health.unhealthy = false;
            return Some(true);
        }
        return None;
    }
    health.failures += 1;
    if !health.unhealthy && health.failures >= threshold {
        health.unhealthy = true;
        return Some(false);
    }
    None
}

pub struct HealthMonitor {
    pub interval: Duration,
    pub check_timeout: Duration,
    pub failure_threshold: u32,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        HealthMonitor {
            interval: Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS),
            check_timeout: Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS),
            failure_threshold: HEALTH_FAILURE_THRESHOLD,
        }
    }
}

impl HealthMonitor {
    /// Spawns the check loop and hands back the event channel. The loop
    /// ends when the receiver is dropped.
    pub fn spawn(self, client: reqwest::Client, agents: Vec<MonitoredAgent>) -> mpsc::Receiver<MonitorEvent> {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut states: HashMap<String, AgentHealth> = HashMap::new();
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                for agent in &agents {
                    let success = check_once(&client, &agent.health_url, self.check_timeout).await;
                    let health = states.entry(agent.id.clone()).or_default();
                    match note_check(health, success, self.failure_threshold) {
                        Some(true) => {
                            debug!("agent {} recovered", agent.id);
                            if tx.send(MonitorEvent::AgentRecovered { id: agent.id.clone() }).await.is_err() {
                                return;
                            }
                        }
                        Some(false) => {
                            warn!("agent {} unhealthy after {} failed checks", agent.id, health.failures);
                            if tx.send(MonitorEvent::AgentUnhealthy { id: agent.id.clone() }).await.is_err() {
                                return;
                            }
                        }
                        None => {}
                    }
                }
            }
        });
        rx
    }
}

async fn check_once(client: &reqwest::Client, url: &str, check_timeout: Duration) -> bool {
    let request = client.get(url).send();
    match tokio::time::timeout(check_timeout, request).await {
        Ok(Ok(response)) => response.status().is_success(),
        _ => false,
    }
}
