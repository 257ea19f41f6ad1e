//! Sync configuration
//!
//! Configuration is assembled in layers: built-in defaults, an optional TOML
//! file, then `BABYSYNC_*` environment variables.
//!
//! ```toml
//! api_url = "http://localhost:3000/api"
//! sync_interval_secs = 10
//! max_attempts = 20
//!
//! [probe]
//! health_path = "/health"
//! slow_threshold_ms = 1500
//! ```

use crate::offline::retry::{BackoffStrategy, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default REST API base URL
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

/// Storage key under which the pending log is persisted
pub const DEFAULT_STORAGE_KEY: &str = "pending-sync";

const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_RETENTION_DAYS: u32 = 7;
const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(1500);
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(300);

/// Largest accepted backoff delay, one retention window
pub const MAX_BACKOFF: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Connectivity probe settings
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// Path appended to the API URL for health checks
    pub health_path: String,
    /// Delay between two probes
    pub interval: Duration,
    /// Round trips slower than this mark the connection as slow
    pub slow_threshold: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            health_path: "/health".to_string(),
            interval: DEFAULT_PROBE_INTERVAL,
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
        }
    }
}

/// Offline write-queue configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Base URL targets are resolved against
    pub api_url: String,
    /// SQLite file holding the key-value namespace
    pub db_path: PathBuf,
    /// Key of the pending log inside the namespace
    pub storage_key: String,
    /// Period of the safety-net timer
    pub sync_interval: Duration,
    /// Upper bound for a single replayed request
    pub request_timeout: Duration,
    /// Entries older than this many days are pruned at startup
    pub retention_days: u32,
    /// Whether the periodic timer also drains when online
    pub drain_on_tick: bool,
    /// Defer later entries of a target once one of its entries failed
    pub preserve_target_order: bool,
    /// Dead-letter threshold, `None` retries forever
    pub max_attempts: Option<u32>,
    /// First exponential backoff delay, `None` disables backoff
    pub backoff_base: Option<Duration>,
    /// Ceiling of the exponential backoff
    pub backoff_max: Duration,
    /// Connectivity probe settings
    pub probe: ProbeConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            db_path: default_db_path(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retention_days: DEFAULT_RETENTION_DAYS,
            drain_on_tick: true,
            preserve_target_order: true,
            max_attempts: None,
            backoff_base: None,
            backoff_max: DEFAULT_BACKOFF_MAX,
            probe: ProbeConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                Self::builder().apply_toml(&raw)?
            }
            None => Self::builder(),
        };
        builder = builder.apply_env(|key| std::env::var(key).ok())?;
        builder.build()
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::builder().apply_toml(raw)?.build()
    }

    /// Retention window as a chrono duration
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    /// Retry policy applied by the coordinator
    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = match self.backoff_base {
            Some(base) => BackoffStrategy::Exponential {
                base,
                max: self.backoff_max.max(base),
            },
            None => BackoffStrategy::None,
        };
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff,
        }
    }

    /// Full URL for a target path
    pub fn api_url_for(&self, target: &str) -> String {
        join_url(&self.api_url, target)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.api_url.clone()));
        }
        if self.sync_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "sync_interval",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.max_attempts == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts",
                message: "must be at least 1 when set".to_string(),
            });
        }
        if self.backoff_base.is_some_and(|base| base > MAX_BACKOFF) {
            return Err(ConfigError::InvalidValue {
                field: "backoff_base",
                message: format!("must not exceed {} seconds", MAX_BACKOFF.as_secs()),
            });
        }
        if self.backoff_max > MAX_BACKOFF {
            return Err(ConfigError::InvalidValue {
                field: "backoff_max",
                message: format!("must not exceed {} seconds", MAX_BACKOFF.as_secs()),
            });
        }
        if self.storage_key.is_empty() {
            return Err(ConfigError::MissingValue("storage_key"));
        }
        Ok(())
    }
}

/// Concatenate a base URL and a target path with exactly one slash between them
pub fn join_url(base: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        target.trim_start_matches('/')
    )
}

/// Platform data directory location of the queue database
pub fn default_db_path() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
    path.push("babysync");
    path.push("queue.db");
    path
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    api_url: Option<String>,
    db_path: Option<PathBuf>,
    storage_key: Option<String>,
    sync_interval: Option<Duration>,
    request_timeout: Option<Duration>,
    retention_days: Option<u32>,
    drain_on_tick: Option<bool>,
    preserve_target_order: Option<bool>,
    max_attempts: Option<u32>,
    backoff_base: Option<Duration>,
    backoff_max: Option<Duration>,
    probe: Option<ProbeConfig>,
}

impl SyncConfigBuilder {
    /// Set the API base URL
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Set the SQLite database path
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Set the key of the pending log
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    /// Set the periodic timer interval
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Set the per-request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the retention window in days
    pub fn retention_days(mut self, days: u32) -> Self {
        self.retention_days = Some(days);
        self
    }

    /// Enable or disable opportunistic drains on timer ticks
    pub fn drain_on_tick(mut self, enabled: bool) -> Self {
        self.drain_on_tick = Some(enabled);
        self
    }

    /// Enable or disable the per-target ordering guard
    pub fn preserve_target_order(mut self, enabled: bool) -> Self {
        self.preserve_target_order = Some(enabled);
        self
    }

    /// Set the dead-letter threshold
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Enable exponential backoff between attempts of one entry
    pub fn backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = Some(base);
        self.backoff_max = Some(max);
        self
    }

    /// Set the connectivity probe settings
    pub fn probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Merge values from a TOML document
    pub fn apply_toml(mut self, raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;

        if let Some(url) = file.api_url {
            self.api_url = Some(url);
        }
        if let Some(path) = file.db_path {
            self.db_path = Some(path);
        }
        if let Some(key) = file.storage_key {
            self.storage_key = Some(key);
        }
        if let Some(secs) = file.sync_interval_secs {
            self.sync_interval = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(days) = file.retention_days {
            self.retention_days = Some(days);
        }
        if let Some(enabled) = file.drain_on_tick {
            self.drain_on_tick = Some(enabled);
        }
        if let Some(enabled) = file.preserve_target_order {
            self.preserve_target_order = Some(enabled);
        }
        if let Some(attempts) = file.max_attempts {
            self.max_attempts = Some(attempts);
        }
        if let Some(secs) = file.backoff_base_secs {
            self.backoff_base = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = file.backoff_max_secs {
            self.backoff_max = Some(Duration::from_secs(secs));
        }
        if let Some(probe) = file.probe {
            let mut merged = self.probe.take().unwrap_or_default();
            if let Some(path) = probe.health_path {
                merged.health_path = path;
            }
            if let Some(secs) = probe.interval_secs {
                merged.interval = Duration::from_secs(secs);
            }
            if let Some(ms) = probe.slow_threshold_ms {
                merged.slow_threshold = Duration::from_millis(ms);
            }
            self.probe = Some(merged);
        }

        Ok(self)
    }

    /// Merge `BABYSYNC_*` overrides read through `lookup`
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BABYSYNC_API_URL") {
            self.api_url = Some(url);
        }
        if let Some(path) = lookup("BABYSYNC_DB_PATH") {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup("BABYSYNC_SYNC_INTERVAL_SECS") {
            self.sync_interval = Some(Duration::from_secs(parse_env("BABYSYNC_SYNC_INTERVAL_SECS", &raw)?));
        }
        if let Some(raw) = lookup("BABYSYNC_REQUEST_TIMEOUT_SECS") {
            self.request_timeout = Some(Duration::from_secs(parse_env("BABYSYNC_REQUEST_TIMEOUT_SECS", &raw)?));
        }
        if let Some(raw) = lookup("BABYSYNC_MAX_ATTEMPTS") {
            self.max_attempts = Some(parse_env("BABYSYNC_MAX_ATTEMPTS", &raw)?);
        }
        Ok(self)
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        let defaults = SyncConfig::default();
        let config = SyncConfig {
            api_url: self.api_url.unwrap_or(defaults.api_url),
            db_path: self.db_path.unwrap_or(defaults.db_path),
            storage_key: self.storage_key.unwrap_or(defaults.storage_key),
            sync_interval: self.sync_interval.unwrap_or(defaults.sync_interval),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            retention_days: self.retention_days.unwrap_or(defaults.retention_days),
            drain_on_tick: self.drain_on_tick.unwrap_or(defaults.drain_on_tick),
            preserve_target_order: self
                .preserve_target_order
                .unwrap_or(defaults.preserve_target_order),
            max_attempts: self.max_attempts.or(defaults.max_attempts),
            backoff_base: self.backoff_base.or(defaults.backoff_base),
            backoff_max: self.backoff_max.unwrap_or(defaults.backoff_max),
            probe: self.probe.unwrap_or(defaults.probe),
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: key,
        message: format!("cannot parse '{}'", raw),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_url: Option<String>,
    db_path: Option<PathBuf>,
    storage_key: Option<String>,
    sync_interval_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    retention_days: Option<u32>,
    drain_on_tick: Option<bool>,
    preserve_target_order: Option<bool>,
    max_attempts: Option<u32>,
    backoff_base_secs: Option<u64>,
    backoff_max_secs: Option<u64>,
    probe: Option<FileProbeConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileProbeConfig {
    health_path: Option<String>,
    interval_secs: Option<u64>,
    slow_threshold_ms: Option<u64>,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("cannot parse config: {0}")]
    Parse(String),
    #[error("cannot read {path}: {message}")]
    Io { path: PathBuf, message: String },
}
