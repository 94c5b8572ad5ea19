use crate::types::*;
use std::{
  env,
  fs,
  path::PathBuf,
  time::{SystemTime, UNIX_EPOCH},
};

pub fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_repo_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    repo_root().join(path)
  }
}

pub fn config_path() -> PathBuf {
  if let Ok(raw) = env::var("LEAGUE_CONFIG_PATH") {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return PathBuf::from(trimmed);
    }
  }
  repo_root().join("config.json")
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
  env_default(key).and_then(|value| value.parse::<u64>().ok())
}

fn env_u16(key: &str) -> Option<u16> {
  env_default(key).and_then(|value| value.parse::<u16>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
  env_default(key).and_then(|value| value.parse::<usize>().ok())
}

/// Environment variables win over config.json values when set.
pub fn apply_env_defaults(mut config: AppConfig) -> AppConfig {
  if let Some(value) = env_default("LEAGUE_ID") {
    config.league_id = value;
  }
  if let Some(value) = env_default("COORDINATOR_HOST") {
    config.coordinator_host = value;
  }
  if let Some(value) = env_u16("COORDINATOR_PORT") {
    config.coordinator_port = value;
  }
  if let Some(value) = env_default("COORDINATOR_URL") {
    config.coordinator_url = value;
  }
  if let Some(value) = env_usize("MAX_PLAYERS") {
    config.max_players = value;
  }
  if let Some(value) = env_usize("MAX_REFEREES") {
    config.max_referees = value;
  }
  if let Some(value) = env_default("REFEREE_ID") {
    config.referee_id = value;
  }
  if let Some(value) = env_u16("REFEREE_PORT") {
    config.referee_port = value;
  }
  if let Some(value) = env_default("PLAYER_NAME") {
    config.player_name = value;
  }
  if let Some(value) = env_u16("PLAYER_PORT") {
    config.player_port = value;
  }
  if let Some(value) = env_default("PLAYER_STRATEGY") {
    config.player_strategy = value;
  }
  if let Some(value) = env_u64("INVITATION_TIMEOUT_SECS") {
    config.invitation_timeout_secs = value;
  }
  if let Some(value) = env_u64("CHOICE_TIMEOUT_SECS") {
    config.choice_timeout_secs = value;
  }
  if let Some(value) = env_usize("MAX_CONCURRENT_MATCHES") {
    config.max_concurrent_matches = value;
  }
  if let Some(value) = env_u64("POLL_INTERVAL_MS") {
    config.poll_interval_ms = value;
  }
  if let Some(value) = env_default("LEAGUE_DATA_DIR") {
    config.data_dir = value;
  }
  config
}

pub fn load_config_inner() -> Result<AppConfig, String> {
  let path = config_path();
  if !path.is_file() {
    return Ok(apply_env_defaults(AppConfig::default()));
  }
  let data = fs::read_to_string(&path).map_err(|e| format!("read config {}: {e}", path.display()))?;
  let config =
    serde_json::from_str::<AppConfig>(&data).map_err(|e| format!("parse config {}: {e}", path.display()))?;
  Ok(apply_env_defaults(config))
}

pub fn load_env_file() {
  let env_path = repo_root().join(".env");
  if !env_path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(&env_path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let mut value = raw_value.trim();
  if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if let Some(idx) = value.find('#') {
    value = value[..idx].trim_end();
  }
  Some((key.to_string(), value.to_string()))
}

pub fn now_ms() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}

pub fn log_env_warnings(config: &AppConfig) {
  let mut warnings: Vec<String> = Vec::new();

  if config.player_name.trim().is_empty() {
    warnings.push(
      "PLAYER_NAME not set and no player name in config; the player role will register under a generated name"
        .to_string(),
    );
  }
  if config.coordinator_url.trim().is_empty() {
    warnings.push("COORDINATOR_URL not set; referees and players cannot reach the coordinator".to_string());
  }
  if config.invitation_timeout_secs >= config.choice_timeout_secs {
    warnings.push(format!(
      "invitation timeout ({}s) is not below choice timeout ({}s); matches may abort before players can answer",
      config.invitation_timeout_secs, config.choice_timeout_secs
    ));
  }

  for msg in warnings {
    tracing::warn!("{}", msg);
  }
}
