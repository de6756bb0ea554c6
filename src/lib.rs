//! tenantsync - data synchronization for tenant-scoped list views
//!
//! The crate covers four interlocking pieces:
//! - Cursor pagination over `(created_at, id)` descending ([`pagination`], [`cursor`])
//! - Realtime merging of push events into cached lists ([`realtime`])
//! - A durable offline write queue with bounded retry ([`queue`])
//! - A fixed-reset window rate limiter for write endpoints ([`ratelimit`])
//!
//! [`http_server`] exposes the paginated list and rate-limited write
//! endpoints that queued mutations replay against.

pub mod cli;
pub mod config;
pub mod cursor;
pub mod error;
pub mod http_server;
pub mod observability;
pub mod pagination;
pub mod queue;
pub mod ratelimit;
pub mod realtime;
pub mod record;
pub mod store;

pub use config::SyncConfig;
pub use cursor::Cursor;
pub use error::{ErrorKind, SyncError, SyncResult};
pub use pagination::{Page, PageFetcher};
pub use queue::{QueuedMutation, WriteQueue};
pub use ratelimit::{RateDecision, RateKey, RateLimiter};
pub use realtime::{ChannelAddress, MergeEngine, RealtimeEvent};
pub use record::{Record, SortKey};
