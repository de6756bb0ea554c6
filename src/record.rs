//! # Records
//!
//! Tenant-scoped rows and their pagination ordering key.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tenant-scoped row.
///
/// Identity is `id`. `created_at` is assigned at insert and may collide
/// between rows, so ordering always falls back to `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Opaque id, unique within its table
    pub id: String,

    /// Insert timestamp (RFC 3339, lexicographically ordered)
    #[serde(default)]
    pub created_at: String,

    /// Owning tenant (company)
    #[serde(default)]
    pub tenant_id: String,

    /// Remaining business fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a record with no business fields
    pub fn new(
        id: impl Into<String>,
        created_at: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            created_at: created_at.into(),
            tenant_id: tenant_id.into(),
            fields: Map::new(),
        }
    }

    /// Set a business field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Ordering key for pagination
    pub fn sort_key(&self) -> SortKey {
        SortKey::new(self.created_at.clone(), self.id.clone())
    }

    /// Shallow merge: fields present in `other` overwrite ours, absent
    /// fields are kept. Empty `created_at`/`tenant_id` in `other` are
    /// treated as absent.
    pub fn merge_from(&mut self, other: &Record) {
        if !other.created_at.is_empty() {
            self.created_at = other.created_at.clone();
        }
        if !other.tenant_id.is_empty() {
            self.tenant_id = other.tenant_id.clone();
        }
        for (key, value) in &other.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }
}

/// Position in the `(created_at, id)` ordering.
///
/// `Ord` is ascending; list views walk it in reverse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SortKey {
    pub created_at: String,
    pub id: String,
}

impl SortKey {
    pub fn new(created_at: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            created_at: created_at.into(),
            id: id.into(),
        }
    }
}

/// Newest-first comparison used by cached lists.
pub fn newest_first(a: &Record, b: &Record) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}
