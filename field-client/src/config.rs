//! Configuration loading for livefield clients.
//!
//! Configuration is loaded from a TOML file (default: `livefield.toml`).
//! Every section and key is optional.

use field_core::{ReconnectPolicy, DEFAULT_MAX_POINTS};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Push channel configuration.
    #[serde(default)]
    pub push: PushConfig,
    /// Request/response channel configuration.
    #[serde(default)]
    pub rest: RestConfig,
    /// Series defaults.
    #[serde(default)]
    pub series: SeriesConfig,
}

/// Push channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// WebSocket URL (default: ws://127.0.0.1/ws/status).
    #[serde(default = "default_push_url")]
    pub url: String,
    /// Minimum gap between outbound sends in ms (default: 500).
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Consecutive closes before auto-reconnect stops (default: 10).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First reconnect delay in ms, doubled per attempt (default: 1000).
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    /// Reconnect delay cap in ms (default: 30000).
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    /// Random jitter added to each reconnect delay in ms (default: 500).
    #[serde(default = "default_reconnect_jitter_ms")]
    pub reconnect_jitter_ms: u64,
    /// Connect timeout in ms; 0 waits indefinitely (default: 5000).
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Appended as `?access_token=` when non-empty.
    #[serde(default)]
    pub access_token: String,
}

/// Request/response channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    /// Base URL; form names are appended (default: http://127.0.0.1/rest).
    #[serde(default = "default_rest_url")]
    pub base_url: String,
    /// Request timeout in ms; 0 waits indefinitely (default: 5000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Sent as a bearer token when non-empty.
    #[serde(default)]
    pub access_token: String,
}

/// Series defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SeriesConfig {
    /// Row cap for series fields whose encoding has no `maxPoints` (default: 3000).
    #[serde(default = "default_max_points")]
    pub max_points: i64,
}

// Default value functions
fn default_push_url() -> String {
    "ws://127.0.0.1/ws/status".to_string()
}

fn default_throttle_ms() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    10
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_reconnect_jitter_ms() -> u64 {
    500
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_rest_url() -> String {
    "http://127.0.0.1/rest".to_string()
}

fn default_max_points() -> i64 {
    DEFAULT_MAX_POINTS
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: default_push_url(),
            throttle_ms: default_throttle_ms(),
            max_attempts: default_max_attempts(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            reconnect_jitter_ms: default_reconnect_jitter_ms(),
            connect_timeout_ms: default_timeout_ms(),
            access_token: String::new(),
        }
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_rest_url(),
            timeout_ms: default_timeout_ms(),
            access_token: String::new(),
        }
    }
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            max_points: default_max_points(),
        }
    }
}

fn millis_limit(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl PushConfig {
    /// Reconnect ceiling and backoff.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.reconnect_base_ms),
            max_delay: Duration::from_millis(self.reconnect_max_ms),
            jitter: Duration::from_millis(self.reconnect_jitter_ms),
        }
    }

    /// Outbound throttle interval.
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// Connect timeout; `None` when set to 0.
    pub fn connect_timeout(&self) -> Option<Duration> {
        millis_limit(self.connect_timeout_ms)
    }

    /// The URL to connect to, with the access token applied.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not a valid URL.
    pub fn endpoint(&self) -> Result<String, ConfigError> {
        let mut url = url::Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.url.clone(),
            source: e,
        })?;
        if !self.access_token.is_empty() {
            url.query_pairs_mut()
                .append_pair("access_token", &self.access_token);
        }
        Ok(url.to_string())
    }
}

impl RestConfig {
    /// Request timeout; `None` when set to 0.
    pub fn timeout(&self) -> Option<Duration> {
        millis_limit(self.timeout_ms)
    }

    /// URL of a form endpoint.
    pub fn form_url(&self, form: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            form.trim_start_matches('/')
        )
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A configured URL does not parse.
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        /// The offending value.
        url: String,
        /// Underlying parse error.
        source: url::ParseError,
    },
}
