//! Configuration reading and data directory paths.

pub mod paths;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use paths::get_data_dir;

/// config.json shape. Every field is optional on disk; a missing or
/// unparseable file means full defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Port the synthesis service listens on, same for every candidate.
    pub port: u16,
    /// Speak trigger combo, e.g. "ctrl+alt+p".
    pub hotkey: String,
    /// Playback volume, 0.0 to 1.0.
    pub volume: f32,
    /// Transport probe timeout per candidate, in milliseconds.
    pub probe_timeout_ms: u64,
    /// Timeout for a single remote synthesis dispatch, in milliseconds.
    pub dispatch_timeout_ms: u64,
    /// Wall-clock bound on the whole remote candidate search.
    pub remote_budget_ms: u64,
    /// Explicit model name forwarded to every tier. None = auto-select.
    pub model: Option<String>,
    /// Explicit language tag. None = detect from text.
    pub language: Option<String>,
    /// Directory holding local model files.
    pub model_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8090,
            hotkey: "ctrl+alt+p".to_string(),
            volume: 1.0,
            probe_timeout_ms: 2000,
            dispatch_timeout_ms: 60_000,
            remote_budget_ms: 8000,
            model: None,
            language: None,
            model_dir: None,
        }
    }
}

impl AppConfig {
    pub fn model_dir(&self) -> PathBuf {
        self.model_dir
            .clone()
            .unwrap_or_else(paths::default_model_dir)
    }
}

/// Read config.json from the data directory.
pub fn read_config() -> AppConfig {
    read_json_file(&get_config_path()).unwrap_or_default()
}

/// Path to config.json.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.port, 8090);
        assert_eq!(cfg.hotkey, "ctrl+alt+p");
        assert_eq!(cfg.dispatch_timeout_ms, 60_000);
        assert!(cfg.model.is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults_for_missing_fields() {
        let cfg: AppConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.hotkey, "ctrl+alt+p");
        assert_eq!(cfg.remote_budget_ms, 8000);
    }

    #[test]
    fn test_garbage_json_is_rejected() {
        assert!(serde_json::from_str::<AppConfig>(r#"{"port": "lots"}"#).is_err());
    }
}
