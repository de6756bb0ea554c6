//! # Realtime Events
//!
//! Row change events and the `{ event, payload }` envelope they travel in.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{RealtimeError, RealtimeResult};
use crate::record::Record;

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Insert => write!(f, "insert"),
            Op::Update => write!(f, "update"),
            Op::Delete => write!(f, "delete"),
        }
    }
}

/// A row change in one tenant's table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub table: String,
    pub tenant_id: String,
    pub op: Op,
    pub record: Record,
}

impl RealtimeEvent {
    pub fn new(op: Op, table: impl Into<String>, record: Record) -> Self {
        Self {
            table: table.into(),
            tenant_id: record.tenant_id.clone(),
            op,
            record,
        }
    }

    pub fn insert(table: impl Into<String>, record: Record) -> Self {
        Self::new(Op::Insert, table, record)
    }

    pub fn update(table: impl Into<String>, record: Record) -> Self {
        Self::new(Op::Update, table, record)
    }

    pub fn delete(table: impl Into<String>, record: Record) -> Self {
        Self::new(Op::Delete, table, record)
    }
}

/// Event names the publisher emits. Anything else on the wire is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    RecordChanged,
    PoUpdated,
    DeliveryUpdated,
    ExpenseUpdated,
    OrderUpdated,
    ProjectUpdated,
}

impl EventName {
    pub const ALL: [EventName; 6] = [
        EventName::RecordChanged,
        EventName::PoUpdated,
        EventName::DeliveryUpdated,
        EventName::ExpenseUpdated,
        EventName::OrderUpdated,
        EventName::ProjectUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::RecordChanged => "record_changed",
            EventName::PoUpdated => "po_updated",
            EventName::DeliveryUpdated => "delivery_updated",
            EventName::ExpenseUpdated => "expense_updated",
            EventName::OrderUpdated => "order_updated",
            EventName::ProjectUpdated => "project_updated",
        }
    }

    /// Parse a wire name; `None` for names outside the vocabulary
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }

    /// Name published for writes to `table`
    pub fn for_table(table: &str) -> Self {
        match table {
            "pos" | "purchase_orders" => EventName::PoUpdated,
            "deliveries" => EventName::DeliveryUpdated,
            "expenses" => EventName::ExpenseUpdated,
            "orders" | "change_orders" => EventName::OrderUpdated,
            "projects" | "jobs" => EventName::ProjectUpdated,
            _ => EventName::RecordChanged,
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire envelope on a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMessage {
    pub event: String,
    pub payload: Value,
}

impl TopicMessage {
    pub fn new(name: EventName, event: &RealtimeEvent) -> RealtimeResult<Self> {
        let payload = serde_json::to_value(event)
            .map_err(|e| RealtimeError::InvalidPayload(e.to_string()))?;
        Ok(Self {
            event: name.as_str().to_string(),
            payload,
        })
    }

    /// Decode the carried event.
    ///
    /// `Ok(None)` for unknown event names; an error for a known name whose
    /// payload does not parse.
    pub fn decode(&self) -> RealtimeResult<Option<RealtimeEvent>> {
        if EventName::parse(&self.event).is_none() {
            return Ok(None);
        }
        serde_json::from_value(self.payload.clone())
            .map(Some)
            .map_err(|e| RealtimeError::InvalidPayload(e.to_string()))
    }
}
