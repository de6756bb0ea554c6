//! # Store Errors

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Backing store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Store cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Row id already present
    #[error("Record already exists: {0}")]
    Conflict(String),

    /// Query or bookkeeping failure
    #[error("Store error: {0}")]
    Internal(String),
}
