//! Observability subsystem for tenantsync
//!
//! Structured logging on `tracing`. Log lines name a typed [`Event`] in
//! their `event` field so they can be filtered regardless of format.
//!
//! # Usage
//!
//! ```ignore
//! use tenantsync::observability::{init_logging, Event, LogConfig};
//!
//! init_logging(&LogConfig::default())?;
//! tracing::info!(event = %Event::ServerStart, port = 54321, "starting");
//! ```

mod events;

pub use events::Event;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Observability errors. Never fatal to the caller.
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// Filter directive did not parse
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    /// A global subscriber is already installed
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Result type for observability operations
pub type ObservabilityResult<T> = Result<T, ObservabilityError>;

/// Build the filter: `RUST_LOG` when set, otherwise the configured level
pub fn env_filter(config: &LogConfig) -> ObservabilityResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| ObservabilityError::InvalidFilter {
        directive: config.level.clone(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber
pub fn init_logging(config: &LogConfig) -> ObservabilityResult<()> {
    let filter = env_filter(config)?;

    let fmt_layer = match config.format {
        LogFormat::Json => fmt::layer().json().with_current_span(false).boxed(),
        LogFormat::Pretty => fmt::layer().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ObservabilityError::AlreadyInitialized(e.to_string()))
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    if event.is_fatal() {
        tracing::error!(event = %event, "{}", event);
    } else {
        tracing::info!(event = %event, "{}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config: LogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_parses_lowercase() {
        let config: LogConfig = serde_json::from_str(r#"{"format":"json"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = LogConfig {
            level: "tenantsync=loudest".to_string(),
            format: LogFormat::Pretty,
        };
        if std::env::var("RUST_LOG").is_err() {
            assert!(matches!(
                env_filter(&config),
                Err(ObservabilityError::InvalidFilter { .. })
            ));
        }
    }

    #[test]
    fn test_log_event() {
        // No subscriber installed; verifies no panic
        log_event(Event::ServerStart);
        log_event(Event::QueueCorruption);
    }
}
