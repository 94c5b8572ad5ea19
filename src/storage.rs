use crate::config::resolve_repo_path;
use crate::standings::StandingRow;
use crate::types::MatchAssignment;
use std::fs;
use std::path::{Path, PathBuf};

pub fn league_dir(data_dir: &str, league_id: &str) -> PathBuf {
  resolve_repo_path(data_dir).join("leagues").join(league_id)
}

fn write_json(path: &Path, payload: &str) -> Result<(), String> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(|e| format!("create {}: {e}", parent.display()))?;
  }
  fs::write(path, payload).map_err(|e| format!("write {}: {e}", path.display()))
}

pub fn save_schedule(data_dir: &str, league_id: &str, schedule: &[MatchAssignment]) -> Result<PathBuf, String> {
  let path = league_dir(data_dir, league_id).join("schedule.json");
  let payload = serde_json::to_string_pretty(schedule).map_err(|e| e.to_string())?;
  write_json(&path, &payload)?;
  Ok(path)
}

/// `Ok(None)` when no schedule has been written yet.
pub fn load_schedule(data_dir: &str, league_id: &str) -> Result<Option<Vec<MatchAssignment>>, String> {
  let path = league_dir(data_dir, league_id).join("schedule.json");
  if !path.is_file() {
    return Ok(None);
  }
  let data = fs::read_to_string(&path).map_err(|e| format!("read schedule {}: {e}", path.display()))?;
  let schedule = serde_json::from_str::<Vec<MatchAssignment>>(&data)
    .map_err(|e| format!("parse schedule {}: {e}", path.display()))?;
  Ok(Some(schedule))
}

/// Whole-document overwrite after every applied result.
pub fn save_standings(data_dir: &str, league_id: &str, rows: &[StandingRow]) -> Result<PathBuf, String> {
  let path = league_dir(data_dir, league_id).join("standings.json");
  let payload = serde_json::to_string_pretty(rows).map_err(|e| e.to_string())?;
  write_json(&path, &payload)?;
  Ok(path)
}
