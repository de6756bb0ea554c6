//! # Record Store
//!
//! The backing store that list endpoints page over. The persistence engine
//! itself is external; [`MemoryRecordStore`] serves the HTTP surface and
//! tests.

mod errors;
mod memory;

pub use errors::{StoreError, StoreResult};
pub use memory::MemoryRecordStore;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::record::{Record, SortKey};

/// Where a page starts, exclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Boundary {
    /// Rows strictly before `(created_at, id)` in descending order
    Before(SortKey),
    /// Rows with `created_at` strictly less than the value
    CreatedBefore(String),
}

impl Boundary {
    /// Whether a row lies past the boundary
    pub fn admits(&self, record: &Record) -> bool {
        match self {
            Boundary::Before(key) => record.sort_key() < *key,
            Boundary::CreatedBefore(created_at) => record.created_at.as_str() < created_at.as_str(),
        }
    }
}

/// A descending page query over one table partition
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub table: String,
    pub tenant_id: String,
    /// Rows to return at most
    pub limit: usize,
    pub boundary: Option<Boundary>,
}

/// Outcome of [`RecordStore::insert_or_get`]
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Created(Record),
    /// The id was already taken; carries the stored row
    Existing(Record),
}

/// Backing store for tenant-scoped tables
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Rows ordered `(created_at DESC, id DESC)`, past the boundary
    async fn query_page(&self, query: &PageQuery) -> StoreResult<Vec<Record>>;

    /// Insert a row; an existing id is a conflict
    async fn insert(&self, table: &str, record: Record) -> StoreResult<Record>;

    /// Insert a row, or return the stored one when the id exists. The
    /// check and the insert are one atomic step.
    async fn insert_or_get(&self, table: &str, record: Record) -> StoreResult<InsertOutcome>;

    /// Fetch one row by id
    async fn get(&self, table: &str, tenant_id: &str, id: &str) -> StoreResult<Option<Record>>;

    /// Shallow-merge fields into a row. Returns the updated row, or `None`
    /// when it does not exist.
    async fn update(
        &self,
        table: &str,
        tenant_id: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<Option<Record>>;

    /// Remove a row, returning it if it existed
    async fn delete(&self, table: &str, tenant_id: &str, id: &str) -> StoreResult<Option<Record>>;
}
