//! # Cursor Errors

use thiserror::Error;

/// Result type for cursor decoding
pub type CursorResult<T> = Result<T, CursorError>;

/// Cursor decoding errors.
///
/// Every variant means "invalid cursor"; none of them fall back to the
/// head of the list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    /// Empty token
    #[error("invalid cursor: empty")]
    Empty,

    /// Not base64url or not UTF-8
    #[error("invalid cursor: bad encoding")]
    Encoding,

    /// Unknown layout version
    #[error("invalid cursor: unsupported version")]
    Version,

    /// Structurally broken payload
    #[error("invalid cursor: {0}")]
    Malformed(&'static str),
}
