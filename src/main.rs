use parity_league::config::{load_config_inner, load_env_file, log_env_warnings};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    load_env_file();
    let role = std::env::args().nth(1).unwrap_or_else(|| "coordinator".to_string());
    let _guard = parity_league::init_logging(&role);

    let config = match load_config_inner() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return;
        }
    };
    info!("parity league starting as {role}");
    log_env_warnings(&config);
    parity_league::run(&role, config).await;
}
