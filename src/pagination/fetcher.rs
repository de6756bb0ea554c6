//! # Page Fetcher

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::{FetchError, FetchResult};
use crate::cursor::Cursor;
use crate::record::Record;
use crate::store::{Boundary, PageQuery, RecordStore};

/// Limit used when the caller gives none
pub const DEFAULT_LIMIT: usize = 50;

/// Hard ceiling on rows per page
pub const MAX_LIMIT: usize = 100;

/// How a cursor bounds the next page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// `(created_at, id) < cursor`; exact under `created_at` collisions
    #[default]
    Compound,
    /// `created_at < cursor.created_at`; drops rows tied with the cursor row
    CreatedAtOnly,
}

/// Pagination settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "max_limit")]
    pub max_limit: usize,

    #[serde(default)]
    pub boundary: BoundaryMode,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn max_limit() -> usize {
    MAX_LIMIT
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
            boundary: BoundaryMode::default(),
        }
    }
}

impl PaginationConfig {
    /// Clamp a requested limit into `1..=max_limit`
    pub fn clamp(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_limit.max(1))
    }
}

/// One page of results. A `None` cursor means there are no further pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub items: Vec<Record>,
    pub next_cursor: Option<Cursor>,
}

impl Page {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Stateless page fetcher; safe to share across concurrent requests.
#[derive(Clone)]
pub struct PageFetcher {
    store: Arc<dyn RecordStore>,
    config: PaginationConfig,
}

impl PageFetcher {
    pub fn new(store: Arc<dyn RecordStore>, config: PaginationConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    /// Fetch one page of `table` for `tenant_id`.
    ///
    /// Queries `limit + 1` rows; when the extra row exists it is dropped and
    /// the cursor is taken from the last returned row.
    pub async fn fetch(
        &self,
        table: &str,
        tenant_id: &str,
        limit: usize,
        cursor: Option<&Cursor>,
    ) -> FetchResult<Page> {
        let limit = self.config.clamp(limit);

        let boundary = match cursor {
            Some(cursor) => {
                let key = cursor.decode()?;
                Some(match self.config.boundary {
                    BoundaryMode::Compound => Boundary::Before(key),
                    BoundaryMode::CreatedAtOnly => Boundary::CreatedBefore(key.created_at),
                })
            }
            None => None,
        };

        let query = PageQuery {
            table: table.to_string(),
            tenant_id: tenant_id.to_string(),
            limit: limit + 1,
            boundary,
        };

        let mut items = self
            .store
            .query_page(&query)
            .await
            .map_err(|source| FetchError::Store {
                table: table.to_string(),
                source,
            })?;

        let next_cursor = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|last| Cursor::from_key(&last.sort_key()))
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }
}
