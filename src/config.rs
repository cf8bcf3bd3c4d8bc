//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub tumblr: TumblrConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Tumblr API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TumblrConfig {
    /// API root (default: "https://api.tumblr.com/v2")
    pub api_base_url: String,
    /// OAuth consumer key, also sent as `api_key` on public endpoints
    pub consumer_key: String,
    /// OAuth consumer secret
    pub consumer_secret: String,
    /// Posts requested per page (default: 50)
    pub page_size: u32,
    /// Exact avatar width to keep (default: 128)
    pub avatar_size: u32,
    /// Optional upper bound on pages fetched per sync
    ///
    /// Absent means paginate until the API returns an empty page.
    pub max_pages: Option<u32>,
    /// Request timeout in seconds (default: 30)
    pub request_timeout_seconds: u64,
}

/// Sync job configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Interval profile
    pub profile: SyncProfile,
    /// Explicit interval gate TTL, overrides the profile default
    pub interval_seconds: Option<u64>,
    /// Mutex lease duration in seconds (default: 600)
    pub mutex_lease_seconds: u64,
    /// Number of worker tasks (default: 4)
    pub workers: usize,
    /// Bounded queue capacity (default: 256)
    pub queue_capacity: usize,
    /// Periodic re-sync of every account; absent or 0 disables
    pub refresh_interval_seconds: Option<u64>,
    /// Backend for the interval gate and mutex keys
    pub kv_backend: KvBackend,
}

/// Interval profile selector
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncProfile {
    /// Short interval for interactive testing
    Development,
    #[default]
    Production,
}

impl SyncProfile {
    pub fn default_interval(self) -> Duration {
        match self {
            SyncProfile::Development => Duration::from_secs(10),
            SyncProfile::Production => Duration::from_secs(60 * 60),
        }
    }
}

/// Key-value backend selector
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum KvBackend {
    /// Shared through the SQLite database file, safe across processes
    #[default]
    Sqlite,
    /// Process-local
    Memory,
}

impl SyncConfig {
    /// TTL applied by the interval gate after a sync starts
    pub fn interval(&self) -> Duration {
        self.interval_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.profile.default_interval())
    }

    pub fn mutex_lease(&self) -> Duration {
        Duration::from_secs(self.mutex_lease_seconds)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_seconds
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            profile: SyncProfile::Production,
            interval_seconds: None,
            mutex_lease_seconds: 600,
            workers: 4,
            queue_capacity: 256,
            refresh_interval_seconds: None,
            kv_backend: KvBackend::Sqlite,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (BLOGMIRROR__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("database.path", "data/blogmirror.db")?
            .set_default("tumblr.api_base_url", "https://api.tumblr.com/v2")?
            .set_default("tumblr.consumer_key", "")?
            .set_default("tumblr.consumer_secret", "")?
            .set_default("tumblr.page_size", 50)?
            .set_default("tumblr.avatar_size", 128)?
            .set_default("tumblr.request_timeout_seconds", 30)?
            .set_default("sync.profile", "production")?
            .set_default("sync.mutex_lease_seconds", 600)?
            .set_default("sync.workers", 4)?
            .set_default("sync.queue_capacity", 256)?
            .set_default("sync.kv_backend", "sqlite")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("BLOGMIRROR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        if self.tumblr.consumer_key.trim().is_empty()
            || self.tumblr.consumer_secret.trim().is_empty()
        {
            return Err(AppError::Config(
                "tumblr.consumer_key and tumblr.consumer_secret are required".to_string(),
            ));
        }

        if self.tumblr.page_size == 0 {
            return Err(AppError::Config(
                "tumblr.page_size must be greater than 0".to_string(),
            ));
        }

        if url::Url::parse(&self.tumblr.api_base_url).is_err() {
            return Err(AppError::Config(format!(
                "tumblr.api_base_url is not a valid URL: {}",
                self.tumblr.api_base_url
            )));
        }

        if self.sync.mutex_lease_seconds == 0 {
            return Err(AppError::Config(
                "sync.mutex_lease_seconds must be greater than 0".to_string(),
            ));
        }

        if self.sync.workers == 0 || self.sync.queue_capacity == 0 {
            return Err(AppError::Config(
                "sync.workers and sync.queue_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
