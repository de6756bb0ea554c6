//! # Write Queue
//!
//! Durable FIFO of pending mutations, owned by a single actor task.
//!
//! Flush semantics:
//! - Entries are replayed in enqueue order. A failure does not block later
//!   entries in the same pass.
//! - Success drops the entry. Any failure, 429 included, increments
//!   `retries`; reaching the ceiling drops the entry and reports it.
//! - Only one pass runs at a time. Callers arriving mid-pass wait for it
//!   and receive the same report.
//! - Entries removed while a pass is in flight are not resurrected.
//! - Every change is persisted before callers are answered.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::compress::{ImageEncoder, DEFAULT_BUDGET_BYTES};
use super::errors::{QueueError, QueueResult, TransportError};
use super::mutation::{NewMutation, QueuedMutation};
use super::store::QueueStore;
use super::transport::MutationTransport;
use crate::error::SyncError;
use crate::observability::Event;

/// Default retry ceiling
pub const DEFAULT_RETRY_CEILING: u32 = 5;

fn default_path() -> PathBuf {
    PathBuf::from("./tenantsync-queue.json")
}

fn default_retry_ceiling() -> u32 {
    DEFAULT_RETRY_CEILING
}

fn default_attachment_budget() -> usize {
    DEFAULT_BUDGET_BYTES
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

/// Write queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue file
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Failed attempts after which an entry is dropped
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    /// Optional cap on pending entries
    #[serde(default)]
    pub max_entries: Option<usize>,

    /// Encoded-size budget for attachments
    #[serde(default = "default_attachment_budget")]
    pub attachment_budget_bytes: usize,

    /// Per-request replay timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            retry_ceiling: DEFAULT_RETRY_CEILING,
            max_entries: None,
            attachment_budget_bytes: DEFAULT_BUDGET_BYTES,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl QueueConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// A mutation dropped after reaching the retry ceiling
#[derive(Debug, Clone, PartialEq)]
pub struct FailedMutation {
    pub mutation: QueuedMutation,
    pub last_error: TransportError,
}

impl FailedMutation {
    pub fn attempts(&self) -> u32 {
        self.mutation.retries
    }
}

/// Outcome of one flush pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    /// Ids replayed successfully and removed
    pub succeeded: Vec<String>,
    /// Ids that failed and stay queued
    pub retried: Vec<String>,
    /// Entries permanently failed (retry ceiling reached)
    pub failed: Vec<FailedMutation>,
    /// Entries not attempted because the deadline passed
    pub skipped: usize,
    /// Entries left in the queue after the pass
    pub remaining: usize,
}

impl FlushReport {
    /// Nothing failed and nothing is left
    pub fn is_drained(&self) -> bool {
        self.retried.is_empty() && self.failed.is_empty() && self.remaining == 0
    }

    /// Permanently failed entries as `RetryExceeded` errors
    pub fn errors(&self) -> Vec<SyncError> {
        self.failed.iter().cloned().map(SyncError::from).collect()
    }
}

type FlushReply = oneshot::Sender<QueueResult<FlushReport>>;

enum Command {
    Enqueue {
        mutation: QueuedMutation,
        reply: oneshot::Sender<QueueResult<String>>,
    },
    Remove {
        id: String,
        reply: oneshot::Sender<QueueResult<bool>>,
    },
    Clear {
        reply: oneshot::Sender<QueueResult<usize>>,
    },
    List(oneshot::Sender<Vec<QueuedMutation>>),
    Flush {
        deadline: Option<Duration>,
        reply: FlushReply,
    },
    Shutdown,
}

/// Result of a pass, sent back to the actor
struct FlushPass {
    outcomes: Vec<(String, Result<(), TransportError>)>,
    skipped: usize,
}

/// Handle to the queue actor. Cloning shares the queue.
#[derive(Clone)]
pub struct WriteQueue {
    commands: mpsc::Sender<Command>,
    pending: watch::Receiver<usize>,
    config: Arc<QueueConfig>,
}

impl WriteQueue {
    /// Load persisted entries and start the actor. Must be called inside
    /// a Tokio runtime. Fails if the stored queue is unreadable.
    pub fn open(
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn MutationTransport>,
        config: QueueConfig,
    ) -> QueueResult<Self> {
        let entries = store.load().map_err(|e| {
            if let QueueError::Corrupt { .. } = &e {
                error!(event = %Event::QueueCorruption, error = %e, "stored queue rejected");
            }
            e
        })?;
        info!(event = %Event::QueueLoaded, pending = entries.len(), "write queue loaded");

        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (done_tx, done_rx) = mpsc::channel(1);
        let (pending_tx, pending_rx) = watch::channel(entries.len());
        let config = Arc::new(config);

        let actor = QueueActor {
            entries,
            store,
            transport,
            config: config.clone(),
            pending: pending_tx,
            waiters: None,
            removed_in_flight: HashSet::new(),
            done_tx,
        };
        tokio::spawn(actor.run(commands_rx, done_rx));

        Ok(Self {
            commands: commands_tx,
            pending: pending_rx,
            config,
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Append a mutation. Returns its id.
    pub async fn enqueue(&self, mutation: NewMutation) -> QueueResult<String> {
        self.enqueue_mutation(mutation.into_mutation()?).await
    }

    /// Compress an image into `field` within the configured attachment
    /// budget, then append
    pub async fn enqueue_with_image(
        &self,
        mutation: NewMutation,
        field: &str,
        encoder: &dyn ImageEncoder,
    ) -> QueueResult<String> {
        let mutation = mutation.attach_image(field, encoder, self.config.attachment_budget_bytes)?;
        self.enqueue(mutation).await
    }

    /// Append an already-built mutation, keeping its id and retry count
    pub async fn enqueue_mutation(&self, mutation: QueuedMutation) -> QueueResult<String> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Enqueue { mutation, reply }).await?;
        rx.await.map_err(|_| QueueError::Stopped)?
    }

    /// Remove one entry. Returns whether it existed.
    pub async fn remove(&self, id: impl Into<String>) -> QueueResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Remove {
            id: id.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| QueueError::Stopped)?
    }

    /// Remove everything. Returns the number removed.
    pub async fn clear(&self) -> QueueResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Clear { reply }).await?;
        rx.await.map_err(|_| QueueError::Stopped)?
    }

    /// Snapshot of pending entries in enqueue order
    pub async fn list(&self) -> QueueResult<Vec<QueuedMutation>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::List(reply)).await?;
        rx.await.map_err(|_| QueueError::Stopped)
    }

    /// Replay all entries
    pub async fn flush(&self) -> QueueResult<FlushReport> {
        self.flush_within(None).await
    }

    /// Replay entries until `deadline` elapses. Entries not reached in
    /// time are left untouched. A caller joining a pass already in flight
    /// waits for that pass regardless of its own deadline.
    pub async fn flush_within(&self, deadline: Option<Duration>) -> QueueResult<FlushReport> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Flush { deadline, reply }).await?;
        rx.await.map_err(|_| QueueError::Stopped)?
    }

    /// Current pending count
    pub fn pending_count(&self) -> usize {
        *self.pending.borrow()
    }

    /// Watch the pending count. Updated on every change.
    pub fn subscribe_pending(&self) -> watch::Receiver<usize> {
        self.pending.clone()
    }

    /// Stop the actor. An in-flight pass is abandoned unapplied.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn send(&self, command: Command) -> QueueResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| QueueError::Stopped)
    }
}

struct QueueActor {
    entries: Vec<QueuedMutation>,
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn MutationTransport>,
    config: Arc<QueueConfig>,
    pending: watch::Sender<usize>,
    /// Some while a pass is in flight
    waiters: Option<Vec<FlushReply>>,
    removed_in_flight: HashSet<String>,
    done_tx: mpsc::Sender<FlushPass>,
}

impl QueueActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut done: mpsc::Receiver<FlushPass>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                Some(pass) = done.recv() => self.finish_flush(pass),
            }
        }
        debug!("write queue stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue { mutation, reply } => {
                let _ = reply.send(self.enqueue(mutation));
            }
            Command::Remove { id, reply } => {
                let _ = reply.send(self.remove(&id));
            }
            Command::Clear { reply } => {
                let _ = reply.send(self.clear());
            }
            Command::List(reply) => {
                let _ = reply.send(self.entries.clone());
            }
            Command::Flush { deadline, reply } => self.start_flush(deadline, reply),
            Command::Shutdown => {}
        }
    }

    fn persist(&self) -> QueueResult<()> {
        self.store.save(&self.entries).map_err(|e| {
            error!(event = %Event::QueuePersistFailed, error = %e, "queue not persisted");
            e
        })
    }

    fn publish_pending(&self) {
        self.pending.send_replace(self.entries.len());
    }

    fn enqueue(&mut self, mutation: QueuedMutation) -> QueueResult<String> {
        if let Some(capacity) = self.config.max_entries {
            if self.entries.len() >= capacity {
                return Err(QueueError::QueueFull { capacity });
            }
        }
        if self.entries.iter().any(|m| m.id == mutation.id) {
            return Err(QueueError::InvalidMutation(format!(
                "duplicate mutation id {}",
                mutation.id
            )));
        }

        let id = mutation.id.clone();
        self.entries.push(mutation);
        if let Err(e) = self.persist() {
            self.entries.pop();
            return Err(e);
        }

        debug!(event = %Event::QueueEnqueue, id = %id, pending = self.entries.len(), "mutation queued");
        self.publish_pending();
        Ok(id)
    }

    fn remove(&mut self, id: &str) -> QueueResult<bool> {
        let Some(pos) = self.entries.iter().position(|m| m.id == id) else {
            return Ok(false);
        };
        let removed = self.entries.remove(pos);
        if let Err(e) = self.persist() {
            self.entries.insert(pos, removed);
            return Err(e);
        }
        if self.waiters.is_some() {
            self.removed_in_flight.insert(id.to_string());
        }
        self.publish_pending();
        Ok(true)
    }

    fn clear(&mut self) -> QueueResult<usize> {
        let removed = std::mem::take(&mut self.entries);
        if let Err(e) = self.persist() {
            self.entries = removed;
            return Err(e);
        }
        if self.waiters.is_some() {
            self.removed_in_flight
                .extend(removed.iter().map(|m| m.id.clone()));
        }
        self.publish_pending();
        Ok(removed.len())
    }

    fn start_flush(&mut self, deadline: Option<Duration>, reply: FlushReply) {
        if let Some(waiters) = self.waiters.as_mut() {
            waiters.push(reply);
            return;
        }
        if self.entries.is_empty() {
            let _ = reply.send(Ok(FlushReport::default()));
            return;
        }

        info!(event = %Event::QueueFlushBegin, pending = self.entries.len(), "flushing write queue");
        self.waiters = Some(vec![reply]);

        let batch = self.entries.clone();
        let transport = self.transport.clone();
        let request_timeout = self.config.request_timeout();
        let deadline = deadline.map(|d| Instant::now() + d);
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let pass = replay(batch, transport, request_timeout, deadline).await;
            let _ = done.send(pass).await;
        });
    }

    /// Apply a finished pass. If the result cannot be persisted, memory
    /// rolls back to the stored entries and every waiter gets the error;
    /// sent entries are replayed again by the next pass.
    fn finish_flush(&mut self, pass: FlushPass) {
        let ceiling = self.config.retry_ceiling.max(1);
        let before = self.entries.clone();
        let mut report = FlushReport {
            skipped: pass.skipped,
            ..FlushReport::default()
        };

        for (id, result) in pass.outcomes {
            if self.removed_in_flight.contains(&id) {
                continue;
            }
            let Some(pos) = self.entries.iter().position(|m| m.id == id) else {
                continue;
            };
            match result {
                Ok(()) => {
                    self.entries.remove(pos);
                    report.succeeded.push(id);
                }
                Err(last_error) => {
                    self.entries[pos].retries += 1;
                    if self.entries[pos].retries >= ceiling {
                        let mutation = self.entries.remove(pos);
                        warn!(
                            event = %Event::MutationDropped,
                            id = %mutation.id,
                            url = %mutation.url,
                            attempts = mutation.retries,
                            error = %last_error,
                            "mutation failed permanently"
                        );
                        report.failed.push(FailedMutation {
                            mutation,
                            last_error,
                        });
                    } else {
                        debug!(id = %id, retries = self.entries[pos].retries, error = %last_error, "mutation will retry");
                        report.retried.push(id);
                    }
                }
            }
        }
        report.remaining = self.entries.len();

        let result = match self.persist() {
            Ok(()) => Ok(report.clone()),
            Err(e) => {
                self.entries = before;
                Err(e)
            }
        };
        self.publish_pending();
        info!(
            event = %Event::QueueFlushComplete,
            succeeded = report.succeeded.len(),
            retried = report.retried.len(),
            failed = report.failed.len(),
            skipped = report.skipped,
            remaining = report.remaining,
            persisted = result.is_ok(),
            "write queue flushed"
        );

        self.removed_in_flight.clear();
        for waiter in self.waiters.take().unwrap_or_default() {
            let _ = waiter.send(result.clone());
        }
    }
}

/// Send each mutation in order. Runs outside the actor and touches no
/// queue state.
async fn replay(
    batch: Vec<QueuedMutation>,
    transport: Arc<dyn MutationTransport>,
    request_timeout: Duration,
    deadline: Option<Instant>,
) -> FlushPass {
    let total = batch.len();
    let mut outcomes = Vec::with_capacity(total);

    for mutation in batch {
        let limit = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                request_timeout.min(deadline - now)
            }
            None => request_timeout,
        };

        let result = match tokio::time::timeout(limit, transport.send(&mutation)).await {
            Ok(result) => result,
            // overall deadline hit mid-request: leave the entry untouched
            Err(_) if deadline.is_some_and(|d| Instant::now() >= d) && limit < request_timeout => {
                break;
            }
            Err(_) => Err(TransportError::Timeout),
        };
        outcomes.push((mutation.id, result));
    }

    FlushPass {
        skipped: total - outcomes.len(),
        outcomes,
    }
}
