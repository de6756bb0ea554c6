//! # Write Path
//!
//! Entry point for user mutations: send directly while online, fall back
//! to the queue when offline or when the direct attempt fails.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::autoflush::Connectivity;
use super::errors::{QueueResult, TransportError};
use super::mutation::NewMutation;
use super::transport::MutationTransport;
use super::write_queue::WriteQueue;

/// What happened to a submitted mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Applied by the endpoint
    Sent,
    /// Queued for replay under this id
    Queued(String),
}

#[derive(Clone)]
pub struct WritePath {
    transport: Arc<dyn MutationTransport>,
    queue: WriteQueue,
    connectivity: watch::Receiver<Connectivity>,
}

impl WritePath {
    pub fn new(
        transport: Arc<dyn MutationTransport>,
        queue: WriteQueue,
        connectivity: watch::Receiver<Connectivity>,
    ) -> Self {
        Self {
            transport,
            queue,
            connectivity,
        }
    }

    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }

    pub async fn submit(&self, mutation: NewMutation) -> QueueResult<WriteOutcome> {
        let mutation = mutation.into_mutation()?;

        let online = self.connectivity.borrow().is_online();
        if online {
            let timeout = self.queue.config().request_timeout();
            let sent = tokio::time::timeout(timeout, self.transport.send(&mutation))
                .await
                .unwrap_or(Err(TransportError::Timeout));
            match sent {
                Ok(()) => return Ok(WriteOutcome::Sent),
                Err(e) => debug!(id = %mutation.id, error = %e, "direct write failed, queueing"),
            }
        }

        let id = self.queue.enqueue_mutation(mutation).await?;
        Ok(WriteOutcome::Queued(id))
    }
}
