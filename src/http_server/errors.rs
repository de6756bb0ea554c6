//! # HTTP Errors
//!
//! Error types for the list and write endpoints.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::cursor::CursorError;
use crate::pagination::{FetchError, ParamError};
use crate::store::StoreError;

/// Result type for HTTP handlers
pub type HttpResult<T> = Result<T, HttpError>;

/// HTTP errors
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    // ==================
    // Client Errors (4xx)
    // ==================
    /// Tenant header absent or empty
    #[error("Missing x-tenant-id header")]
    MissingTenant,

    /// Invalid query parameter
    #[error("Invalid query parameter: {0}")]
    InvalidParam(String),

    /// Cursor did not decode
    #[error(transparent)]
    InvalidCursor(#[from] CursorError),

    /// Invalid request body
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Row not found
    #[error("Record not found: {table}/{id}")]
    NotFound { table: String, id: String },

    /// Write rate exceeded
    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    // ==================
    // Server Errors (5xx)
    // ==================
    /// Backing store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HttpError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            HttpError::MissingTenant => StatusCode::BAD_REQUEST,
            HttpError::InvalidParam(_) => StatusCode::BAD_REQUEST,
            HttpError::InvalidCursor(_) => StatusCode::BAD_REQUEST,
            HttpError::InvalidBody(_) => StatusCode::BAD_REQUEST,

            // 404 Not Found
            HttpError::NotFound { .. } => StatusCode::NOT_FOUND,

            // 429 Too Many Requests
            HttpError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 409 for id collisions, 503 when the store is down
            HttpError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            HttpError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            HttpError::Store(StoreError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ParamError> for HttpError {
    fn from(err: ParamError) -> Self {
        match err {
            ParamError::InvalidLimit(raw) => HttpError::InvalidParam(format!("limit={raw}")),
            ParamError::InvalidCursor(e) => HttpError::InvalidCursor(e),
        }
    }
}

impl From<FetchError> for HttpError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidCursor(e) => HttpError::InvalidCursor(e),
            FetchError::Store { source, .. } => HttpError::Store(source),
            other => HttpError::Internal(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl From<&HttpError> for ErrorResponse {
    fn from(err: &HttpError) -> Self {
        Self {
            code: err.status_code().as_u16(),
            error: err.to_string(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse::from(&self));
        let mut response = (status, body).into_response();
        if let HttpError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}
