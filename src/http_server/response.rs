//! # Response Formatting
//!
//! Response bodies for the write and health endpoints. List responses are
//! [`Page`](crate::pagination::Page) serialized as is.

use serde::Serialize;

/// Single record response
#[derive(Debug, Clone, Serialize)]
pub struct SingleResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> SingleResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Delete response
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub id: String,
}

impl DeleteResponse {
    pub fn success(id: impl Into<String>) -> Self {
        Self {
            deleted: true,
            id: id.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_response() {
        let value = serde_json::to_value(SingleResponse::new(json!({"id": "1"}))).unwrap();
        assert_eq!(value["data"]["id"], "1");
    }

    #[test]
    fn test_health_response() {
        let value = serde_json::to_value(HealthResponse::ok()).unwrap();
        assert_eq!(value["status"], "ok");
    }
}
