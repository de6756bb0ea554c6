//! # Write Queue Errors
//!
//! Error types for the offline write queue and its replay transport.

use std::time::Duration;

use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue errors
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    // ==================
    // Capacity Errors
    // ==================
    /// Storage cap reached; the mutation was not queued
    #[error("Write queue full ({capacity} entries)")]
    QueueFull { capacity: usize },

    // ==================
    // Storage Errors
    // ==================
    /// Queue file could not be read or written
    #[error("Queue storage error at {path}: {reason}")]
    Storage { path: String, reason: String },

    /// Stored queue failed validation
    #[error("Queue file corrupt at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// Entry could not be serialized
    #[error("Queue serialization error: {0}")]
    Serialization(String),

    // ==================
    // Input Errors
    // ==================
    /// Mutation is not replayable
    #[error("Invalid mutation: {0}")]
    InvalidMutation(String),

    /// Attachment could not be encoded
    #[error("Attachment compression failed: {0}")]
    Compression(String),

    // ==================
    // Lifecycle Errors
    // ==================
    /// Queue task has stopped
    #[error("Write queue stopped")]
    Stopped,
}

impl QueueError {
    /// Durability is lost or cannot be established
    pub fn is_fatal(&self) -> bool {
        matches!(self, QueueError::Corrupt { .. } | QueueError::Storage { .. })
    }
}

/// Failure replaying one mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Endpoint answered 429; retryable
    #[error("Rate limited{}", retry_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Endpoint answered a non-success status
    #[error("HTTP {0}")]
    Status(u16),

    /// Connection failed
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

fn retry_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}
