//! # Realtime Errors
//!
//! Error types for the realtime module.

use thiserror::Error;

use crate::pagination::FetchError;

/// Result type for realtime operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Realtime errors
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    // ==================
    // Transport Errors
    // ==================
    /// Subscribe was not acknowledged
    #[error("Subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// Subscribe acknowledgment did not arrive in time
    #[error("Subscribe to {topic} not acknowledged within {after_ms}ms")]
    SubscribeTimeout { topic: String, after_ms: u64 },

    /// Topic stream closed by the transport
    #[error("Topic closed: {0}")]
    TopicClosed(String),

    /// Receiver fell behind and messages were dropped
    #[error("Topic {topic} lagged by {skipped} messages")]
    Lagged { topic: String, skipped: u64 },

    /// Publish failed
    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    // ==================
    // Payload Errors
    // ==================
    /// Message payload does not decode to an event
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    // ==================
    // Engine Errors
    // ==================
    /// Page load failed; the cached list is unchanged
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Engine task has stopped
    #[error("Merge engine stopped")]
    EngineStopped,
}

impl RealtimeError {
    /// Transport-level errors that must trigger a resubscribe
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            RealtimeError::Subscribe { .. }
                | RealtimeError::SubscribeTimeout { .. }
                | RealtimeError::TopicClosed(_)
                | RealtimeError::Lagged { .. }
        )
    }
}
