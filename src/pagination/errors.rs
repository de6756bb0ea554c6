//! # Fetch Errors

use thiserror::Error;

use crate::cursor::CursorError;
use crate::store::StoreError;

/// Result type for page fetches
pub type FetchResult<T> = Result<T, FetchError>;

/// Page fetch errors.
///
/// The fetcher never retries; retry policy belongs to the caller.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Cursor could not be decoded
    #[error(transparent)]
    InvalidCursor(#[from] CursorError),

    /// Backing store failed
    #[error("Fetch from {table} failed: {source}")]
    Store {
        table: String,
        #[source]
        source: StoreError,
    },

    /// Remote list endpoint failed
    #[error("Fetch request failed: {0}")]
    Http(String),

    /// Remote list endpoint returned an unreadable body
    #[error("Fetch response invalid: {0}")]
    Decode(String),

    /// Caller deadline elapsed
    #[error("Fetch deadline exceeded")]
    Timeout,
}

impl FetchError {
    /// Whether a caller may reasonably retry
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::InvalidCursor(_) | FetchError::Decode(_))
    }
}
