//! # Auto-flush
//!
//! Flushes the write queue whenever connectivity comes back, then keeps
//! re-flushing with capped backoff while entries remain and the client
//! stays online.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::errors::QueueError;
use super::write_queue::WriteQueue;
use crate::realtime::Backoff;

/// Network reachability as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

/// Spawn the auto-flush task. It ends when the connectivity sender is
/// dropped or the queue stops.
pub fn spawn_auto_flush(
    queue: WriteQueue,
    connectivity: watch::Receiver<Connectivity>,
    backoff: Backoff,
) -> JoinHandle<()> {
    tokio::spawn(run(queue, connectivity, backoff))
}

async fn run(queue: WriteQueue, mut connectivity: watch::Receiver<Connectivity>, mut backoff: Backoff) {
    let mut last = *connectivity.borrow_and_update();

    loop {
        if connectivity.changed().await.is_err() {
            return;
        }
        let now = *connectivity.borrow_and_update();
        let restored = last == Connectivity::Offline && now == Connectivity::Online;
        last = now;
        if !restored {
            continue;
        }

        debug!("connectivity restored");
        backoff.reset();
        loop {
            let report = match queue.flush().await {
                Ok(report) => report,
                Err(QueueError::Stopped) => return,
                Err(e) => {
                    warn!(error = %e, "auto-flush failed");
                    break;
                }
            };
            if report.remaining == 0 {
                break;
            }

            let delay = backoff.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    last = *connectivity.borrow_and_update();
                }
            }
            if !last.is_online() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::errors::TransportError;
    use crate::queue::mutation::{HttpMethod, NewMutation, QueuedMutation};
    use crate::queue::store::MemoryQueueStore;
    use crate::queue::transport::MutationTransport;
    use crate::queue::write_queue::QueueConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Fails the first `failures` sends, then succeeds
    struct Flaky {
        failures: AtomicUsize,
        sends: AtomicUsize,
    }

    #[async_trait]
    impl MutationTransport for Flaky {
        async fn send(&self, _: &QueuedMutation) -> Result<(), TransportError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                Err(TransportError::Network("offline".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_flushes_on_reconnect_and_retries_until_drained() {
        let transport = Arc::new(Flaky {
            failures: AtomicUsize::new(2),
            sends: AtomicUsize::new(0),
        });
        let queue = WriteQueue::open(
            Arc::new(MemoryQueueStore::new()),
            transport.clone(),
            QueueConfig::default(),
        )
        .unwrap();
        queue
            .enqueue(NewMutation::new(HttpMethod::Post, "/api/pos"))
            .await
            .unwrap();

        let (tx, rx) = watch::channel(Connectivity::Offline);
        let backoff = Backoff::new(Duration::from_millis(5), Duration::from_millis(20));
        let handle = spawn_auto_flush(queue.clone(), rx, backoff);

        assert_eq!(transport.sends.load(Ordering::SeqCst), 0);
        tx.send_replace(Connectivity::Online);

        let mut pending = queue.subscribe_pending();
        tokio::time::timeout(Duration::from_secs(5), pending.wait_for(|n| *n == 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transport.sends.load(Ordering::SeqCst), 3);

        drop(tx);
        handle.await.unwrap();
    }
}
