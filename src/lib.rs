pub mod broadcast;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod game;
pub mod lifecycle;
pub mod monitor;
pub mod orchestrator;
pub mod player;
pub mod protocol;
pub mod referee;
pub mod registry;
pub mod rpc;
pub mod scheduler;
pub mod session;
pub mod standings;
pub mod storage;
pub mod strategy;
pub mod types;

use config::repo_root;
use std::fs;
use tracing_subscriber::EnvFilter;

/// Initialize tracing with daily-rolling file output under `logs/`.
/// The returned guard flushes the writer; hold it for the process life.
pub fn init_logging(role: &str) -> tracing_appender::non_blocking::WorkerGuard {
    let logs_dir = repo_root().join("logs");
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, format!("{role}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    guard
}

pub async fn run(role: &str, config: types::AppConfig) {
    match role {
        "coordinator" => coordinator::serve(config).await,
        "referee" => referee::run(config).await,
        "player" => player::run(config).await,
        other => tracing::error!("unknown role {other:?}; expected coordinator, referee, or player"),
    }
}
