//! # Configuration
//!
//! One JSON file with a section per subsystem. Every key has a default, so
//! a missing file or a partial one is valid. Environment variables
//! override the file:
//!
//! | Variable | Overrides |
//! |---|---|
//! | `RATE_LIMIT_WINDOW_MS` | `rate_limit.window_ms` |
//! | `RATE_LIMIT_MAX` | `rate_limit.max_hits` |
//! | `TENANTSYNC_PORT` | `http.port` |
//! | `TENANTSYNC_QUEUE_PATH` | `queue.path` |

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http_server::HttpServerConfig;
use crate::observability::LogConfig;
use crate::pagination::PaginationConfig;
use crate::queue::QueueConfig;
use crate::ratelimit::RateLimitPolicy;
use crate::realtime::{ChannelAddress, EngineConfig, ListSpec};

/// Result type for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// File exists but could not be read
    #[error("Failed to read config {path}: {reason}")]
    Read { path: String, reason: String },

    /// File is not valid JSON for the schema
    #[error("Invalid config JSON: {0}")]
    Parse(String),

    /// Environment override did not parse
    #[error("Invalid value for {var}: '{value}'")]
    Env { var: String, value: String },

    /// Values are inconsistent
    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn default_cache_cap() -> usize {
    200
}

fn default_backoff_initial_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_subscribe_timeout_ms() -> u64 {
    10_000
}

fn default_legacy_topics() -> bool {
    true
}

fn default_resync_on_reconnect() -> bool {
    true
}

/// Realtime client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Maximum rows per cached list
    #[serde(default = "default_cache_cap")]
    pub cache_cap: usize,

    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Wait for a subscribe acknowledgment before backing off
    #[serde(default = "default_subscribe_timeout_ms")]
    pub subscribe_timeout_ms: u64,

    /// Reload a list's first page after a reconnect
    #[serde(default = "default_resync_on_reconnect")]
    pub resync_on_reconnect: bool,

    /// Also use legacy topic names while naming migrates
    #[serde(default = "default_legacy_topics")]
    pub legacy_topics: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            cache_cap: default_cache_cap(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            subscribe_timeout_ms: default_subscribe_timeout_ms(),
            resync_on_reconnect: default_resync_on_reconnect(),
            legacy_topics: default_legacy_topics(),
        }
    }
}

impl RealtimeConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            backoff_initial: Duration::from_millis(self.backoff_initial_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            subscribe_timeout: Duration::from_millis(self.subscribe_timeout_ms),
            resync_on_reconnect: self.resync_on_reconnect,
            ..EngineConfig::default()
        }
    }

    /// List of `table` for `tenant_id`, capped at `cache_cap`
    pub fn list_spec(&self, table: &str, tenant_id: &str) -> ListSpec {
        ListSpec::new(table, tenant_id).with_cap(self.cache_cap)
    }

    pub fn resolver(&self) -> ChannelAddress {
        ChannelAddress::with_legacy(self.legacy_topics)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub http: HttpServerConfig,

    #[serde(default)]
    pub pagination: PaginationConfig,

    #[serde(default)]
    pub rate_limit: RateLimitPolicy,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl SyncConfig {
    /// Load from `path` (defaults when the file does not exist), apply
    /// environment overrides, and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let mut config = match fs::read_to_string(path) {
            Ok(content) => Self::from_json(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without overrides or validation
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        if let Some(value) = lookup("RATE_LIMIT_WINDOW_MS") {
            self.rate_limit.window_ms = parse_env("RATE_LIMIT_WINDOW_MS", &value)?;
        }
        if let Some(value) = lookup("RATE_LIMIT_MAX") {
            self.rate_limit.max_hits = parse_env("RATE_LIMIT_MAX", &value)?;
        }
        if let Some(value) = lookup("TENANTSYNC_PORT") {
            self.http.port = parse_env("TENANTSYNC_PORT", &value)?;
        }
        if let Some(value) = lookup("TENANTSYNC_QUEUE_PATH") {
            if !value.is_empty() {
                self.queue.path = PathBuf::from(value);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let p = &self.pagination;
        if p.max_limit == 0 {
            return Err(ConfigError::Invalid("pagination.max_limit must be > 0".into()));
        }
        if p.default_limit == 0 || p.default_limit > p.max_limit {
            return Err(ConfigError::Invalid(format!(
                "pagination.default_limit must be in 1..={}",
                p.max_limit
            )));
        }

        if self.rate_limit.window_ms == 0 {
            return Err(ConfigError::Invalid("rate_limit.window_ms must be > 0".into()));
        }
        if self.rate_limit.max_hits == 0 {
            return Err(ConfigError::Invalid("rate_limit.max_hits must be > 0".into()));
        }

        let r = &self.realtime;
        if r.cache_cap == 0 {
            return Err(ConfigError::Invalid("realtime.cache_cap must be > 0".into()));
        }
        if r.backoff_initial_ms == 0 || r.backoff_initial_ms > r.backoff_max_ms {
            return Err(ConfigError::Invalid(
                "realtime.backoff_initial_ms must be > 0 and <= backoff_max_ms".into(),
            ));
        }
        if r.subscribe_timeout_ms == 0 {
            return Err(ConfigError::Invalid("realtime.subscribe_timeout_ms must be > 0".into()));
        }

        if self.queue.retry_ceiling == 0 {
            return Err(ConfigError::Invalid("queue.retry_ceiling must be > 0".into()));
        }
        if self.queue.max_entries == Some(0) {
            return Err(ConfigError::Invalid("queue.max_entries must be > 0 when set".into()));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::{BoundaryMode, MAX_LIMIT};
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.http.port, 54321);
        assert_eq!(config.pagination.default_limit, 50);
        assert_eq!(config.pagination.max_limit, 100);
        assert_eq!(config.pagination.boundary, BoundaryMode::Compound);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.rate_limit.max_hits, 20);
        assert_eq!(config.realtime.cache_cap, 200);
        assert!(config.realtime.legacy_topics);
        assert_eq!(config.queue.retry_ceiling, 5);
        assert_eq!(config.queue.attachment_budget_bytes, 1_200_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file() {
        let config = SyncConfig::from_json(
            r#"{"pagination": {"boundary": "created_at_only"}, "queue": {"retry_ceiling": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.pagination.boundary, BoundaryMode::CreatedAtOnly);
        assert_eq!(config.pagination.max_limit, 100);
        assert_eq!(config.queue.retry_ceiling, 3);
        assert_eq!(config.http.port, 54321);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.realtime, RealtimeConfig::default());
        assert_eq!(config.pagination.max_limit, MAX_LIMIT);
    }

    #[test]
    fn test_load_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tenantsync.json");
        fs::write(&path, r#"{"realtime": {"legacy_topics": false}}"#).unwrap();

        let config = SyncConfig::load(&path).unwrap();
        assert!(!config.realtime.legacy_topics);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            SyncConfig::from_json("{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("RATE_LIMIT_WINDOW_MS", "1000"),
            ("RATE_LIMIT_MAX", "3"),
            ("TENANTSYNC_QUEUE_PATH", "/tmp/q.json"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config
            .apply_overrides(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.rate_limit.window_ms, 1000);
        assert_eq!(config.rate_limit.max_hits, 3);
        assert_eq!(config.queue.path, PathBuf::from("/tmp/q.json"));
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = SyncConfig::default();
        let result = config.apply_overrides(|var| (var == "TENANTSYNC_PORT").then(|| "http".to_string()));
        assert!(matches!(result, Err(ConfigError::Env { .. })));
    }

    #[test]
    fn test_validation() {
        let mut config = SyncConfig::default();
        config.pagination.default_limit = 500;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.queue.retry_ceiling = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.realtime.backoff_initial_ms = 60_000;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.realtime.subscribe_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_realtime_knobs_reach_engine() {
        let config = SyncConfig::from_json(
            r#"{"realtime": {"cache_cap": 25, "backoff_initial_ms": 50, "backoff_max_ms": 400,
                "subscribe_timeout_ms": 750, "resync_on_reconnect": false}}"#,
        )
        .unwrap();

        let engine = config.realtime.engine_config();
        assert_eq!(engine.backoff_initial, Duration::from_millis(50));
        assert_eq!(engine.backoff_max, Duration::from_millis(400));
        assert_eq!(engine.subscribe_timeout, Duration::from_millis(750));
        assert!(!engine.resync_on_reconnect);

        let spec = config.realtime.list_spec("expenses", "acme");
        assert_eq!(spec.cap, 25);
        assert_eq!(spec.tenant_id, "acme");
    }
}
