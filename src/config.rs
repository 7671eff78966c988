//! Engine configuration, loaded from `~/.leadflow/config.json`.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Tunables for the engine. Every field has a serde default so a partial
/// config file (or none at all) still yields a working engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Workspace this session is scoped to.
    #[serde(default = "default_workspace_id")]
    pub workspace_id: String,

    /// Polling-fallback cadence.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seed the poll low-water-mark this many seconds before session start to
    /// tolerate clock skew between client and storage.
    #[serde(default = "default_poll_clock_skew_secs")]
    pub poll_clock_skew_secs: i64,

    /// Default size of the ranked urgent queue.
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,

    /// A qualified conversation with no interaction for this many hours
    /// becomes a ranking candidate.
    #[serde(default = "default_qualified_inactive_hours")]
    pub qualified_inactive_hours: i64,
}

fn default_workspace_id() -> String {
    "default".to_string()
}
fn default_poll_interval_secs() -> u64 {
    20
}
fn default_poll_clock_skew_secs() -> i64 {
    5
}
fn default_queue_limit() -> usize {
    6
}
fn default_qualified_inactive_hours() -> i64 {
    24
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_id: default_workspace_id(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_clock_skew_secs: default_poll_clock_skew_secs(),
            queue_limit: default_queue_limit(),
            qualified_inactive_hours: default_qualified_inactive_hours(),
        }
    }
}

/// Get the canonical config file path (`~/.leadflow/config.json`).
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".leadflow").join("config.json"))
}

/// Load configuration from `~/.leadflow/config.json`. A missing file is an
/// error; callers that want silent defaults use `unwrap_or_default`.
pub fn load_config() -> Result<EngineConfig, String> {
    let path = config_path()?;
    if !path.exists() {
        return Err(format!(
            "Config file not found at {}. Create it with: {{ \"workspaceId\": \"...\" }}",
            path.display()
        ));
    }

    let content =
        fs::read_to_string(&path).map_err(|e| format!("Failed to read config: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Write the config back to disk, creating `~/.leadflow/` if needed.
pub fn save_config(config: &EngineConfig) -> Result<(), String> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.workspace_id, "default");
        assert_eq!(config.queue_limit, 6);
        assert_eq!(config.qualified_inactive_hours, 24);
    }

    #[test]
    fn test_partial_config_parses() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"workspaceId": "ws-9", "queueLimit": 10}"#).expect("parse");
        assert_eq!(config.workspace_id, "ws-9");
        assert_eq!(config.queue_limit, 10);
        assert_eq!(config.poll_interval_secs, 20);
    }
}
