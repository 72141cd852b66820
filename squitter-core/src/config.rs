//! Configuration file management for squitter.
//!
//! Reads/writes `~/.squitter/config.toml` with the receiver reference
//! position, tracker limits, and pipeline sizing.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::AdsbError;

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub receiver: ReceiverConfig,
    pub tracker: TrackerConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub name: String,
    /// Reference position, needed for surface CPR decoding.
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Positions kept per aircraft. Zero or negative keeps everything.
    pub max_history: i64,
    /// Seconds between prune sweeps.
    pub prune_interval_secs: u64,
    /// Seconds of silence before an aircraft is removed.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub event_queue_size: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            name: "default".into(),
            lat: None,
            lon: None,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            max_history: 1000,
            prune_interval_secs: 10,
            timeout_secs: 300,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            workers: 5,
            queue_size: 1000,
            event_queue_size: 10_000,
        }
    }
}

impl ReceiverConfig {
    /// Reference position when both coordinates are set.
    pub fn reference(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lon?))
    }
}

/// Get the config directory path (`~/.squitter/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".squitter")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.squitter/config.toml`.
///
/// Returns default config if the file doesn't exist or can't be parsed.
pub fn load_config() -> Config {
    load_config_from(&config_file())
}

/// Load config from an explicit path, with the same fallbacks.
pub fn load_config_from(path: &std::path::Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read config, using defaults");
            return Config::default();
        }
    };

    parse_config(&text).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "invalid config, using defaults");
        Config::default()
    })
}

/// Save config to `~/.squitter/config.toml`.
pub fn save_config(config: &Config) -> Result<PathBuf, AdsbError> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save config to an explicit path, creating parent directories.
pub fn save_config_to(config: &Config, path: &std::path::Path) -> Result<(), AdsbError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| AdsbError::Config(e.to_string()))?;
    }
    let text = serialize_config(config)?;
    std::fs::write(path, text).map_err(|e| AdsbError::Config(e.to_string()))?;
    Ok(())
}

/// Parse TOML config text. Missing keys take their defaults.
pub fn parse_config(text: &str) -> Result<Config, AdsbError> {
    toml::from_str(text).map_err(|e| AdsbError::Config(e.to_string()))
}

/// Serialize config to TOML text.
pub fn serialize_config(config: &Config) -> Result<String, AdsbError> {
    let body = toml::to_string_pretty(config).map_err(|e| AdsbError::Config(e.to_string()))?;
    Ok(format!("# squitter configuration\n\n{body}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.receiver.name, "default");
        assert_eq!(config.tracker.max_history, 1000);
        assert_eq!(config.tracker.prune_interval_secs, 10);
        assert_eq!(config.tracker.timeout_secs, 300);
        assert_eq!(config.pipeline.workers, 5);
        assert_eq!(config.pipeline.queue_size, 1000);
        assert_eq!(config.pipeline.event_queue_size, 10_000);
        assert!(config.receiver.reference().is_none());
    }

    #[test]
    fn test_parse_config() {
        let text = r#"
[receiver]
name = "perth"
lat = -31.95
lon = 115.86

[tracker]
max_history = 50
prune_interval_secs = 5
timeout_secs = 120

[pipeline]
workers = 2
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.receiver.name, "perth");
        assert_eq!(config.receiver.reference(), Some((-31.95, 115.86)));
        assert_eq!(config.tracker.max_history, 50);
        assert_eq!(config.tracker.timeout_secs, 120);
        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.pipeline.queue_size, 1000, "unset keys keep defaults");
    }

    #[test]
    fn test_parse_partial_and_empty() {
        let config = parse_config("").unwrap();
        assert_eq!(config, Config::default());

        let config = parse_config("[receiver]\nlat = 52.0\n").unwrap();
        assert_eq!(config.receiver.lat, Some(52.0));
        assert!(config.receiver.reference().is_none(), "needs both coordinates");
    }

    #[test]
    fn test_parse_invalid() {
        let err = parse_config("[tracker]\nmax_history = \"lots\"\n").unwrap_err();
        assert!(matches!(err, AdsbError::Config(_)), "got {err}");
    }

    #[test]
    fn test_roundtrip() {
        let mut config = Config::default();
        config.receiver.name = "test".into();
        config.receiver.lat = Some(35.5);
        config.receiver.lon = Some(-82.5);
        config.tracker.max_history = -1;

        let text = serialize_config(&config).unwrap();
        assert!(text.starts_with("# squitter configuration"));
        let parsed = parse_config(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.pipeline.workers = 8;
        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path), config);

        std::fs::write(&path, "not = [valid").unwrap();
        assert_eq!(load_config_from(&path), Config::default(), "bad file falls back");
        assert_eq!(
            load_config_from(&dir.path().join("missing.toml")),
            Config::default()
        );
    }
}
