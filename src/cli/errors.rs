//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use thiserror::Error;

use crate::config::ConfigError;
use crate::observability::ObservabilityError;
use crate::queue::QueueError;

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    ConfigError,
    IoError,
    BootFailed,
    QueueError,
    NotFound,
    RetryExceeded,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "TENANTSYNC_CLI_CONFIG_ERROR",
            Self::IoError => "TENANTSYNC_CLI_IO_ERROR",
            Self::BootFailed => "TENANTSYNC_CLI_BOOT_FAILED",
            Self::QueueError => "TENANTSYNC_CLI_QUEUE_ERROR",
            Self::NotFound => "TENANTSYNC_CLI_NOT_FOUND",
            Self::RetryExceeded => "TENANTSYNC_CLI_RETRY_EXCEEDED",
        }
    }
}

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    #[error("TENANTSYNC_CLI_CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),

    #[error("TENANTSYNC_CLI_IO_ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("TENANTSYNC_CLI_BOOT_FAILED: {0}")]
    BootFailed(String),

    #[error("TENANTSYNC_CLI_QUEUE_ERROR: {0}")]
    Queue(#[from] QueueError),

    #[error("TENANTSYNC_CLI_NOT_FOUND: no queued mutation with id {0}")]
    NotFound(String),

    #[error("TENANTSYNC_CLI_RETRY_EXCEEDED: {dropped} mutation(s) dropped after the retry ceiling")]
    RetryExceeded { dropped: usize },
}

impl CliError {
    pub fn code(&self) -> CliErrorCode {
        match self {
            CliError::Config(_) => CliErrorCode::ConfigError,
            CliError::Io(_) => CliErrorCode::IoError,
            CliError::BootFailed(_) => CliErrorCode::BootFailed,
            CliError::Queue(_) => CliErrorCode::QueueError,
            CliError::NotFound(_) => CliErrorCode::NotFound,
            CliError::RetryExceeded { .. } => CliErrorCode::RetryExceeded,
        }
    }

    pub fn boot_failed(msg: impl Into<String>) -> Self {
        CliError::BootFailed(msg.into())
    }
}

impl From<ObservabilityError> for CliError {
    fn from(e: ObservabilityError) -> Self {
        CliError::boot_failed(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("JSON error: {e}"),
        ))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
