//! # In-Memory Record Store

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::errors::{StoreError, StoreResult};
use super::{InsertOutcome, PageQuery, Record, RecordStore};
use crate::record::SortKey;

/// One `(table, tenant)` partition
#[derive(Debug, Default)]
struct Partition {
    rows: BTreeMap<SortKey, Record>,
    by_id: HashMap<String, SortKey>,
}

/// Record store held in process memory
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    partitions: RwLock<HashMap<(String, String), Partition>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows across all partitions
    pub fn len(&self) -> usize {
        self.partitions
            .read()
            .map(|p| p.values().map(|part| part.rows.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Internal("Lock poisoned".into())
}

fn partition_key(table: &str, tenant_id: &str) -> (String, String) {
    (table.to_string(), tenant_id.to_string())
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn query_page(&self, query: &PageQuery) -> StoreResult<Vec<Record>> {
        let partitions = self.partitions.read().map_err(|_| poisoned())?;
        let Some(partition) = partitions.get(&partition_key(&query.table, &query.tenant_id)) else {
            return Ok(Vec::new());
        };

        let rows = partition
            .rows
            .values()
            .rev()
            .filter(|r| query.boundary.as_ref().map_or(true, |b| b.admits(r)))
            .take(query.limit)
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn insert(&self, table: &str, record: Record) -> StoreResult<Record> {
        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        let partition = partitions
            .entry(partition_key(table, &record.tenant_id))
            .or_default();

        if partition.by_id.contains_key(&record.id) {
            return Err(StoreError::Conflict(record.id));
        }

        let key = record.sort_key();
        partition.by_id.insert(record.id.clone(), key.clone());
        partition.rows.insert(key, record.clone());
        Ok(record)
    }

    async fn insert_or_get(&self, table: &str, record: Record) -> StoreResult<InsertOutcome> {
        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        let partition = partitions
            .entry(partition_key(table, &record.tenant_id))
            .or_default();

        if let Some(existing) = partition.by_id.get(&record.id).and_then(|key| partition.rows.get(key)) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        let key = record.sort_key();
        partition.by_id.insert(record.id.clone(), key.clone());
        partition.rows.insert(key, record.clone());
        Ok(InsertOutcome::Created(record))
    }

    async fn get(&self, table: &str, tenant_id: &str, id: &str) -> StoreResult<Option<Record>> {
        let partitions = self.partitions.read().map_err(|_| poisoned())?;
        Ok(partitions
            .get(&partition_key(table, tenant_id))
            .and_then(|p| p.by_id.get(id).and_then(|key| p.rows.get(key)))
            .cloned())
    }

    async fn update(
        &self,
        table: &str,
        tenant_id: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<Option<Record>> {
        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        let Some(partition) = partitions.get_mut(&partition_key(table, tenant_id)) else {
            return Ok(None);
        };
        let Some(key) = partition.by_id.get(id) else {
            return Ok(None);
        };
        let Some(row) = partition.rows.get_mut(key) else {
            return Err(StoreError::Internal(format!("index out of sync for {id}")));
        };

        // ordering columns are immutable
        for (field, value) in fields {
            if matches!(field.as_str(), "id" | "created_at" | "tenant_id") {
                continue;
            }
            row.fields.insert(field, value);
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, table: &str, tenant_id: &str, id: &str) -> StoreResult<Option<Record>> {
        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        let Some(partition) = partitions.get_mut(&partition_key(table, tenant_id)) else {
            return Ok(None);
        };
        Ok(partition
            .by_id
            .remove(id)
            .and_then(|key| partition.rows.remove(&key)))
    }
}
