//! Configuration module for feedsync.

use serde::Deserialize;
use std::path::Path;

use crate::{FeedsyncError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (`sqlite://...` or `postgres://...`).
    #[serde(default = "default_db_url")]
    pub url: String,
}

fn default_db_url() -> String {
    "sqlite://data/feedsync.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional path to a log file. Console output is always enabled.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// HTTP fetch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Maximum content snippet length in characters.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Allow loopback and private network hosts. Only for local testing.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    20
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_max_content_length() -> usize {
    10000
}

fn default_user_agent() -> String {
    format!("feedsync/{} (Feed Reader)", env!("CARGO_PKG_VERSION"))
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            max_feed_size_bytes: default_max_feed_size(),
            max_content_length: default_max_content_length(),
            user_agent: default_user_agent(),
            allow_private_hosts: false,
        }
    }
}

/// Feed discovery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// How much of a site's HTML page is read when scanning for `<link>` tags.
    #[serde(default = "default_max_page_bytes")]
    pub max_page_bytes: u64,
    /// Well-known feed paths probed, in order, when the page declares none.
    #[serde(default = "default_probe_paths")]
    pub probe_paths: Vec<String>,
}

fn default_max_page_bytes() -> u64 {
    256 * 1024
}

fn default_probe_paths() -> Vec<String> {
    ["/feed", "/rss", "/atom.xml", "/feed.xml", "/rss.xml", "/index.xml"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_page_bytes: default_max_page_bytes(),
            probe_paths: default_probe_paths(),
        }
    }
}

/// Sync configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Retry a sync once when the fetch fails transiently.
    #[serde(default = "default_retry_transient")]
    pub retry_transient: bool,
    /// Delay before the retry in milliseconds.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_retry_transient() -> bool {
    true
}

fn default_retry_backoff() -> u64 {
    500
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_transient: default_retry_transient(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// HTTP fetch configuration.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Feed discovery configuration.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Sync configuration.
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FeedsyncError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FeedsyncError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FEEDSYNC_DATABASE_URL`: Override the database URL
    /// - `FEEDSYNC_LOG_LEVEL`: Override the log level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FEEDSYNC_DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = url;
            }
        }
        if let Ok(level) = std::env::var("FEEDSYNC_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let fetch = &self.fetch;
        if fetch.connect_timeout_secs == 0
            || fetch.read_timeout_secs == 0
            || fetch.total_timeout_secs == 0
        {
            return Err(FeedsyncError::Config(
                "fetch timeouts must be greater than zero".to_string(),
            ));
        }
        if fetch.max_redirects > 20 {
            return Err(FeedsyncError::Config(format!(
                "max_redirects must be at most 20, got {}",
                fetch.max_redirects
            )));
        }
        if let Some(path) = self
            .discovery
            .probe_paths
            .iter()
            .find(|p| !p.starts_with('/'))
        {
            return Err(FeedsyncError::Config(format!(
                "probe path must start with '/': {path:?}"
            )));
        }
        Ok(())
    }
}
