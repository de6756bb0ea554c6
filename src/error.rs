//! # Crate Errors
//!
//! [`SyncError`] folds the subsystem errors into one vocabulary for
//! callers that drive several subsystems at once. [`ErrorKind`] is the
//! stable classification; match on it rather than on message text.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::cursor::CursorError;
use crate::pagination::FetchError;
use crate::queue::{FailedMutation, QueueError, TransportError};
use crate::realtime::RealtimeError;

/// Result type for crate-level operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Stable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidCursor,
    Fetch,
    Subscribe,
    QueueFull,
    RetryExceeded,
    InvalidMutation,
    Encoding,
    RateLimited,
    Transport,
    Storage,
    Config,
    Stopped,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidCursor => "INVALID_CURSOR",
            ErrorKind::Fetch => "FETCH",
            ErrorKind::Subscribe => "SUBSCRIBE",
            ErrorKind::QueueFull => "QUEUE_FULL",
            ErrorKind::RetryExceeded => "RETRY_EXCEEDED",
            ErrorKind::InvalidMutation => "INVALID_MUTATION",
            ErrorKind::Encoding => "ENCODING",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Transport => "TRANSPORT",
            ErrorKind::Storage => "STORAGE",
            ErrorKind::Config => "CONFIG",
            ErrorKind::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crate-level error
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    // ==================
    // Read Path
    // ==================
    #[error(transparent)]
    InvalidCursor(#[from] CursorError),

    #[error(transparent)]
    Fetch(FetchError),

    #[error(transparent)]
    Subscribe(RealtimeError),

    // ==================
    // Write Path
    // ==================
    /// Queue storage cap reached
    #[error("Write queue full ({capacity} entries)")]
    QueueFull { capacity: usize },

    /// Mutation dropped after the retry ceiling
    #[error("Mutation {id} dropped after {attempts} attempts: {last_error}")]
    RetryExceeded {
        id: String,
        attempts: u32,
        last_error: TransportError,
    },

    /// Mutation cannot be queued as given
    #[error("Invalid mutation: {0}")]
    InvalidMutation(String),

    /// Body or attachment could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Endpoint rejected the write with 429
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Replay transport failed
    #[error(transparent)]
    Transport(TransportError),

    // ==================
    // Infrastructure
    // ==================
    /// Durable queue storage failed or is corrupt
    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A background task has stopped
    #[error("{0} stopped")]
    Stopped(&'static str),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::InvalidCursor(_) => ErrorKind::InvalidCursor,
            SyncError::Fetch(_) => ErrorKind::Fetch,
            SyncError::Subscribe(_) => ErrorKind::Subscribe,
            SyncError::QueueFull { .. } => ErrorKind::QueueFull,
            SyncError::RetryExceeded { .. } => ErrorKind::RetryExceeded,
            SyncError::InvalidMutation(_) => ErrorKind::InvalidMutation,
            SyncError::Encoding(_) => ErrorKind::Encoding,
            SyncError::RateLimited { .. } => ErrorKind::RateLimited,
            SyncError::Transport(_) => ErrorKind::Transport,
            SyncError::Storage(_) => ErrorKind::Storage,
            SyncError::Config(_) => ErrorKind::Config,
            SyncError::Stopped(_) => ErrorKind::Stopped,
        }
    }

    /// Whether the same operation may succeed if tried again later
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Fetch(e) => e.is_retryable(),
            SyncError::Subscribe(_) | SyncError::RateLimited { .. } | SyncError::Transport(_) => {
                true
            }
            _ => false,
        }
    }
}

impl From<FetchError> for SyncError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidCursor(e) => SyncError::InvalidCursor(e),
            other => SyncError::Fetch(other),
        }
    }
}

impl From<RealtimeError> for SyncError {
    fn from(err: RealtimeError) -> Self {
        match err {
            RealtimeError::Fetch(e) => e.into(),
            RealtimeError::EngineStopped => SyncError::Stopped("Merge engine"),
            other => SyncError::Subscribe(other),
        }
    }
}

impl From<QueueError> for SyncError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::QueueFull { capacity } => SyncError::QueueFull { capacity },
            QueueError::Stopped => SyncError::Stopped("Write queue"),
            QueueError::InvalidMutation(reason) => SyncError::InvalidMutation(reason),
            QueueError::Compression(reason) | QueueError::Serialization(reason) => {
                SyncError::Encoding(reason)
            }
            other @ (QueueError::Storage { .. } | QueueError::Corrupt { .. }) => {
                SyncError::Storage(other.to_string())
            }
        }
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::RateLimited { retry_after } => SyncError::RateLimited {
                retry_after_secs: retry_after.map(|d| d.as_secs().max(1)).unwrap_or(1),
            },
            other => SyncError::Transport(other),
        }
    }
}

impl From<FailedMutation> for SyncError {
    fn from(failed: FailedMutation) -> Self {
        SyncError::RetryExceeded {
            attempts: failed.attempts(),
            id: failed.mutation.id,
            last_error: failed.last_error,
        }
    }
}
