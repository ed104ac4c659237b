//! Runtime configuration, read from a JSON file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::audio::AudioConfig;

/// Env var naming the config file; defaults to `config.json`.
pub const CONFIG_ENV: &str = "VOCAL_REMINDERS_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub locale: String,
    pub wakeword_model: PathBuf,
    /// External locale table; the built-in table is used when unset.
    pub locale_table: Option<PathBuf>,
    pub database: PathBuf,
    pub history_retention_days: u32,
    pub audio: AudioConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locale: "en".into(),
            wakeword_model: PathBuf::from("data/wakeword_model.json"),
            locale_table: None,
            database: PathBuf::from("reminders.db"),
            history_retention_days: 30,
            audio: AudioConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl Config {
    /// Load from the path in `VOCAL_REMINDERS_CONFIG`, or `config.json`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.json"));
        Self::load(&path)
    }

    /// A missing file yields the defaults; an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: Config =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), locale = %config.locale, "config loaded");
        Ok(config)
    }
}
