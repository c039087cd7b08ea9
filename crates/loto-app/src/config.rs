//! App configuration

use crate::error::{AppError, AppResult};
use loto_common::{LogConfig, LogFormat};
use loto_sw::CacheConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, Level};

/// App configuration, read from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory for persisted state
    pub storage_dir: Option<PathBuf>,

    /// Offline cache settings
    pub cache: CacheConfig,

    /// Log directives (`EnvFilter` syntax); overrides `log_level`
    pub log_filter: Option<String>,

    /// Default log level
    pub log_level: String,

    /// Log output format: pretty, compact or json
    pub log_format: String,

    /// Timeout for network fetches in seconds
    pub network_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            cache: CacheConfig::default(),
            log_filter: None,
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            network_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| AppError::config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.network_timeout_secs == 0 {
            return Err(AppError::config("network_timeout_secs must be positive"));
        }
        if self.log_level.parse::<Level>().is_err() {
            return Err(AppError::config(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }
        if LogFormat::parse(&self.log_format).is_none() {
            return Err(AppError::config(format!(
                "unknown log format '{}'",
                self.log_format
            )));
        }
        self.cache.validate()?;
        Ok(())
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    /// Storage directory, falling back to the platform data directory.
    pub fn resolved_storage_dir(&self) -> Option<PathBuf> {
        self.storage_dir
            .clone()
            .or_else(loto_storage::FileStore::default_root)
    }

    pub fn log_config(&self) -> LogConfig {
        let mut config = LogConfig {
            level: self.log_level.parse().unwrap_or(Level::INFO),
            ..LogConfig::default()
        };
        if let Some(format) = LogFormat::parse(&self.log_format) {
            config = config.with_format(format);
        }
        if let Some(filter) = &self.log_filter {
            config = config.with_filter(filter.clone());
        }
        config
    }
}
