//! # Offline Write Queue
//!
//! Mutations that cannot be applied right away are queued durably and
//! replayed in order once connectivity returns.
//!
//! - [`WritePath`] decides between a direct send and the queue
//! - [`WriteQueue`] owns the pending entries and runs flush passes
//! - [`FileQueueStore`] persists them across restarts
//! - [`spawn_auto_flush`] flushes on every offline to online transition

mod autoflush;
mod compress;
mod errors;
mod mutation;
mod store;
mod transport;
mod write_path;
mod write_queue;

pub use autoflush::{spawn_auto_flush, Connectivity};
pub use compress::{
    compress_image, scaled_dimensions, CompressedImage, ImageEncoder, DEFAULT_BUDGET_BYTES,
    MAX_EDGE_PX,
};
pub use errors::{QueueError, QueueResult, TransportError};
pub use mutation::{HttpMethod, NewMutation, QueuedMutation};
pub use store::{FileQueueStore, MemoryQueueStore, QueueStore};
pub use transport::{classify_status, HttpTransport, MutationTransport};
pub use write_path::{WriteOutcome, WritePath};
pub use write_queue::{FailedMutation, FlushReport, QueueConfig, WriteQueue, DEFAULT_RETRY_CEILING};
