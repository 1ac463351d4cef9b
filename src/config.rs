//! Application configuration loaded from YAML.

use crate::analytics::correlation::DEFAULT_CORRELATION_BARS;
use crate::yahoo_finance::DownloaderConfig;
use chrono_tz::Tz;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the YAML config file.
pub const CONFIG_PATH_VAR: &str = "CONFIG_PATH";
/// Config file read when `CONFIG_PATH` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

const DEFAULT_EXCHANGE_TIMEZONE: &str = "America/New_York";
/// Upper bound for `downloader.default_history_days` (100 years).
const MAX_HISTORY_DAYS: i64 = 36_500;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("db_path must not be empty")]
    MissingDbPath,
    #[error("unknown exchange timezone: {0}")]
    UnknownTimezone(String),
    #[error("correlation_bars must be at least 2")]
    InvalidCorrelationBars,
    #[error("downloader.default_history_days must be between 1 and {max}, got {0}", max = MAX_HISTORY_DAYS)]
    InvalidHistoryDays(i64),
    #[error("invalid {name} override: {value}")]
    InvalidOverride { name: &'static str, value: String },
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address (default: "127.0.0.1")
    pub host: String,
    /// Server port (default: 3000)
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding the listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Top-level configuration.
///
/// ```yaml
/// db_path: stock_data.db
/// exchange_timezone: America/New_York
/// correlation_bars: 30
/// downloader:
///   timeout_seconds: 30
/// server:
///   port: 3000
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
    #[serde(default = "default_exchange_timezone")]
    pub exchange_timezone: String,
    /// Recent bars used to rank and correlate peers.
    #[serde(default = "default_correlation_bars")]
    pub correlation_bars: usize,
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_exchange_timezone() -> String {
    DEFAULT_EXCHANGE_TIMEZONE.to_string()
}

fn default_correlation_bars() -> usize {
    DEFAULT_CORRELATION_BARS
}

impl AppConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Loads the file named by `CONFIG_PATH` (or `config.yaml`) and applies
    /// `HOST`/`PORT` overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(path)?;
        config.apply_overrides(env::var("HOST").ok(), env::var("PORT").ok())?;
        Ok(config)
    }

    /// Replaces the server host and port when overrides are given.
    pub fn apply_overrides(
        &mut self,
        host: Option<String>,
        port: Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
            self.server.host = host.trim().to_string();
        }
        if let Some(port) = port {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                name: "PORT",
                value: port.clone(),
            })?;
        }
        Ok(())
    }

    /// The exchange timezone used to evaluate "today".
    pub fn exchange_tz(&self) -> Result<Tz, ConfigError> {
        self.exchange_timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.exchange_timezone.clone()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingDbPath);
        }
        if self.correlation_bars < 2 {
            return Err(ConfigError::InvalidCorrelationBars);
        }
        let history_days = self.downloader.default_history_days;
        if !(1..=MAX_HISTORY_DAYS).contains(&history_days) {
            return Err(ConfigError::InvalidHistoryDays(history_days));
        }
        self.exchange_tz()?;
        Ok(())
    }
}
