//! # Realtime
//!
//! Keeps paginated list views live.
//!
//! ## Architecture
//!
//! - **Topics**: [`ChannelAddress`] resolves the topic names for a
//!   `(table, tenant)` stream, canonical and legacy during migration
//! - **Bus**: opaque publish/subscribe with at-least-once delivery
//! - **Cache**: [`CachedList`], the ordered, deduplicated, capped list
//! - **Engine**: [`MergeEngine`], a task that owns one cached list and
//!   applies page loads and push events to it one message at a time

pub mod backoff;
pub mod bus;
pub mod cache;
pub mod engine;
pub mod errors;
pub mod event;
pub mod topic;

pub use backoff::Backoff;
pub use bus::{InMemoryBus, RealtimeBus, RealtimePublisher, TopicReceiver};
pub use cache::{CachedList, ListSnapshot, MergeOutcome, RecordFilter};
pub use engine::{ConnectionState, EngineConfig, ListSpec, MergeEngine};
pub use errors::{RealtimeError, RealtimeResult};
pub use event::{EventName, Op, RealtimeEvent, TopicMessage};
pub use topic::{ChannelAddress, Topic, TopicResolver, TopicSet};
