//! # List Query Parameters
//!
//! Parses `?limit=N&cursor=<opaque>` for list endpoints.

use std::collections::HashMap;

use thiserror::Error;

use super::fetcher::PaginationConfig;
use crate::cursor::{Cursor, CursorError};

/// Parameter parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error(transparent)]
    InvalidCursor(#[from] CursorError),
}

/// Parsed list parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    /// Already clamped to the configured maximum
    pub limit: usize,
    pub cursor: Option<Cursor>,
}

impl ListParams {
    /// Parse from a query map. Unknown keys are ignored.
    pub fn parse(
        params: &HashMap<String, String>,
        config: &PaginationConfig,
    ) -> Result<Self, ParamError> {
        let limit = match params.get("limit") {
            Some(raw) => parse_limit(raw)?,
            None => config.default_limit,
        };

        // an empty cursor is the same as none
        let cursor = match params.get("cursor").map(String::as_str) {
            None | Some("") => None,
            Some(token) => {
                let cursor = Cursor::from_token(token);
                cursor.decode()?;
                Some(cursor)
            }
        };

        Ok(Self {
            limit: config.clamp(limit),
            cursor,
        })
    }
}

fn parse_limit(value: &str) -> Result<usize, ParamError> {
    let limit: usize = value
        .trim()
        .parse()
        .map_err(|_| ParamError::InvalidLimit(value.to_string()))?;
    if limit == 0 {
        return Err(ParamError::InvalidLimit(value.to_string()));
    }
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::encode;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let parsed = ListParams::parse(&params(&[]), &PaginationConfig::default()).unwrap();
        assert_eq!(parsed.limit, 50);
        assert!(parsed.cursor.is_none());
    }

    #[test]
    fn test_limit_clamped_not_rejected() {
        let parsed =
            ListParams::parse(&params(&[("limit", "5000")]), &PaginationConfig::default()).unwrap();
        assert_eq!(parsed.limit, 100);
    }

    #[test]
    fn test_bad_limits() {
        let config = PaginationConfig::default();
        assert!(matches!(
            ListParams::parse(&params(&[("limit", "abc")]), &config),
            Err(ParamError::InvalidLimit(_))
        ));
        assert!(matches!(
            ListParams::parse(&params(&[("limit", "0")]), &config),
            Err(ParamError::InvalidLimit(_))
        ));
        assert!(matches!(
            ListParams::parse(&params(&[("limit", "-3")]), &config),
            Err(ParamError::InvalidLimit(_))
        ));
    }

    #[test]
    fn test_cursor_validated_eagerly() {
        let config = PaginationConfig::default();
        let err = ListParams::parse(&params(&[("cursor", "%%%")]), &config).unwrap_err();
        assert!(matches!(err, ParamError::InvalidCursor(_)));

        let token = encode("2024-01-01T00:00:00Z", "x");
        let parsed = ListParams::parse(&params(&[("cursor", token.as_str())]), &config).unwrap();
        assert_eq!(parsed.cursor, Some(token));
    }

    #[test]
    fn test_empty_cursor_means_first_page() {
        let parsed =
            ListParams::parse(&params(&[("cursor", "")]), &PaginationConfig::default()).unwrap();
        assert!(parsed.cursor.is_none());
    }
}
