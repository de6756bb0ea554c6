//! # Merge Engine
//!
//! One actor task per cached list. The actor exclusively owns the
//! [`CachedList`]; page loads and realtime events reach it only as
//! messages, so appends and merges are serialized without locks.
//!
//! A companion subscriber task holds the topic subscriptions and drives
//! the connection state machine:
//!
//! ```text
//! Disconnected --subscribe--> Connecting --ack--> Live
//!      ^                          |                 |
//!      +------ transport error ---+-----------------+
//! ```
//!
//! A subscribe that is not acknowledged within `subscribe_timeout` counts
//! as a transport error. After a transport error the subscriber waits a
//! jittered, capped exponential delay and subscribes again. Events sent
//! while it was down are lost, so once it is live again the actor reloads
//! the first page of any list that was already loaded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::bus::{RealtimeBus, TopicReceiver};
use super::cache::{CachedList, ListSnapshot, MergeOutcome, RecordFilter, DEFAULT_CACHE_CAP};
use super::errors::{RealtimeError, RealtimeResult};
use super::event::{RealtimeEvent, TopicMessage};
use super::topic::{Topic, TopicResolver, TopicSet};
use crate::observability::Event;
use crate::pagination::{FetchError, PageSource, DEFAULT_LIMIT};

/// Subscription state of one list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Live,
}

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Capacity of the command and event channels
    pub channel_capacity: usize,
    /// Longest wait for one topic's subscribe acknowledgment
    pub subscribe_timeout: Duration,
    /// Reload the first page after a reconnect
    pub resync_on_reconnect: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            channel_capacity: 64,
            subscribe_timeout: Duration::from_secs(10),
            resync_on_reconnect: true,
        }
    }
}

/// What a cached list shows
#[derive(Clone)]
pub struct ListSpec {
    pub table: String,
    pub tenant_id: String,
    /// Page size requested from the source
    pub limit: usize,
    /// Maximum cached rows
    pub cap: usize,
    pub filter: Option<RecordFilter>,
}

impl ListSpec {
    pub fn new(table: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            tenant_id: tenant_id.into(),
            limit: DEFAULT_LIMIT,
            cap: DEFAULT_CACHE_CAP,
            filter: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

enum Command {
    Load {
        more: bool,
        deadline: Option<Duration>,
        reply: oneshot::Sender<RealtimeResult<ListSnapshot>>,
    },
    Apply {
        event: RealtimeEvent,
        reply: oneshot::Sender<MergeOutcome>,
    },
    Snapshot(oneshot::Sender<ListSnapshot>),
    Shutdown,
}

/// What the subscriber hands the actor
enum Inbound {
    Event(RealtimeEvent),
    /// Subscriptions are back after a transport error
    Resync,
}

/// Handle to a running merge engine.
///
/// Cloning shares the engine. The actor stops on [`MergeEngine::shutdown`]
/// or when every handle is dropped; the subscriber follows it.
#[derive(Clone)]
pub struct MergeEngine {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    topics: Arc<Vec<Topic>>,
}

impl MergeEngine {
    /// Start the actor and subscriber tasks. Must be called inside a
    /// Tokio runtime. The list starts empty; call [`MergeEngine::load_first`].
    pub fn spawn(
        spec: ListSpec,
        source: Arc<dyn PageSource>,
        bus: Arc<dyn RealtimeBus>,
        resolver: Arc<dyn TopicResolver>,
        config: EngineConfig,
    ) -> Self {
        let capacity = config.channel_capacity.max(1);
        let (commands_tx, commands_rx) = mpsc::channel(capacity);
        let (events_tx, events_rx) = mpsc::channel(capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let topics: TopicSet = resolver
            .topics_for(&spec.table, &spec.tenant_id)
            .into_iter()
            .collect();
        let topics: Vec<Topic> = topics.iter().cloned().collect();

        let actor = EngineActor {
            list: CachedList::new(spec.cap, spec.filter.clone()),
            spec,
            source,
            loaded: false,
        };
        tokio::spawn(actor.run(commands_rx, events_rx));

        let subscriber = Subscriber {
            topics: topics.clone(),
            bus,
            events: events_tx,
            state: state_tx,
            backoff: Backoff::new(config.backoff_initial, config.backoff_max),
            subscribe_timeout: config.subscribe_timeout,
            resync: config.resync_on_reconnect,
        };
        tokio::spawn(subscriber.run());

        Self {
            commands: commands_tx,
            state: state_rx,
            topics: Arc::new(topics),
        }
    }

    /// Replace the list with the first page
    pub async fn load_first(&self, deadline: Option<Duration>) -> RealtimeResult<ListSnapshot> {
        self.load(false, deadline).await
    }

    /// Append the page after the stored cursor. No-op when the list is
    /// already at its last page.
    pub async fn load_more(&self, deadline: Option<Duration>) -> RealtimeResult<ListSnapshot> {
        self.load(true, deadline).await
    }

    /// Drop everything and reload the first page
    pub async fn reset(&self) -> RealtimeResult<ListSnapshot> {
        self.load(false, None).await
    }

    async fn load(&self, more: bool, deadline: Option<Duration>) -> RealtimeResult<ListSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Load {
            more,
            deadline,
            reply,
        })
        .await?;
        rx.await.map_err(|_| RealtimeError::EngineStopped)?
    }

    /// Apply an event directly, bypassing the bus
    pub async fn apply(&self, event: RealtimeEvent) -> RealtimeResult<MergeOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Apply { event, reply }).await?;
        rx.await.map_err(|_| RealtimeError::EngineStopped)
    }

    pub async fn snapshot(&self) -> RealtimeResult<ListSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| RealtimeError::EngineStopped)
    }

    /// Watch the subscription state
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Resolved, deduplicated topics this list listens on
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Stop the actor and the subscriber
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn send(&self, command: Command) -> RealtimeResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RealtimeError::EngineStopped)
    }
}

struct EngineActor {
    spec: ListSpec,
    list: CachedList,
    source: Arc<dyn PageSource>,
    /// A page load has succeeded at least once
    loaded: bool,
}

impl EngineActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut inbound: mpsc::Receiver<Inbound>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                },
                Some(item) = inbound.recv() => match item {
                    Inbound::Event(event) => {
                        self.apply(&event);
                    }
                    Inbound::Resync => self.resync().await,
                },
            }
        }
        debug!(table = %self.spec.table, "merge engine stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Load {
                more,
                deadline,
                reply,
            } => {
                let result = self.load(more, deadline).await;
                let _ = reply.send(result);
            }
            Command::Apply { event, reply } => {
                let outcome = self.apply(&event);
                let _ = reply.send(outcome);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.list.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn apply(&mut self, event: &RealtimeEvent) -> MergeOutcome {
        let outcome = self.list.apply(event);
        debug!(
            table = %self.spec.table,
            op = %event.op,
            id = %event.record.id,
            outcome = ?outcome,
            "realtime event applied"
        );
        outcome
    }

    async fn resync(&mut self) {
        if !self.loaded {
            return;
        }
        match self.load(false, None).await {
            Ok(snapshot) => info!(
                event = %Event::RealtimeResync,
                table = %self.spec.table,
                rows = snapshot.items.len(),
                "list reloaded after reconnect"
            ),
            Err(e) => warn!(
                event = %Event::RealtimeResync,
                table = %self.spec.table,
                error = %e,
                "reload after reconnect failed"
            ),
        }
    }

    /// Fetch then apply. Nothing is applied if the fetch fails or the
    /// deadline passes.
    async fn load(
        &mut self,
        more: bool,
        deadline: Option<Duration>,
    ) -> RealtimeResult<ListSnapshot> {
        let cursor = if more {
            match self.list.next_cursor() {
                Some(cursor) => Some(cursor.clone()),
                None => return Ok(self.list.snapshot()),
            }
        } else {
            None
        };

        let fetch = self
            .source
            .fetch_page(&self.spec.tenant_id, self.spec.limit, cursor.as_ref());
        let page = match deadline {
            Some(deadline) => tokio::time::timeout(deadline, fetch)
                .await
                .map_err(|_| FetchError::Timeout)??,
            None => fetch.await?,
        };

        if more {
            self.list.append_page(page);
        } else {
            self.list.replace_page(page);
        }
        self.loaded = true;
        Ok(self.list.snapshot())
    }
}

enum PumpEnd {
    Stopped,
    Reconnect(RealtimeError),
}

struct Subscriber {
    topics: Vec<Topic>,
    bus: Arc<dyn RealtimeBus>,
    events: mpsc::Sender<Inbound>,
    state: watch::Sender<ConnectionState>,
    backoff: Backoff,
    subscribe_timeout: Duration,
    resync: bool,
}

impl Subscriber {
    async fn run(mut self) {
        let mut was_live = false;
        loop {
            self.state.send_replace(ConnectionState::Connecting);
            info!(event = %Event::RealtimeConnecting, topics = self.topics.len(), "subscribing");

            let error = match self.subscribe_all().await {
                Ok(receivers) => {
                    self.state.send_replace(ConnectionState::Live);
                    self.backoff.reset();
                    info!(event = %Event::RealtimeLive, topics = self.topics.len(), "live");

                    if was_live && self.resync && self.events.send(Inbound::Resync).await.is_err() {
                        break;
                    }
                    was_live = true;

                    match self.pump(receivers).await {
                        PumpEnd::Stopped => break,
                        PumpEnd::Reconnect(e) => e,
                    }
                }
                Err(e) => e,
            };

            self.state.send_replace(ConnectionState::Disconnected);
            let delay = self.backoff.next_delay();
            warn!(
                event = %Event::RealtimeReconnect,
                error = %error,
                attempt = self.backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "realtime transport error"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.events.closed() => break,
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    async fn subscribe_all(&self) -> RealtimeResult<Vec<(Topic, TopicReceiver)>> {
        let mut receivers = Vec::with_capacity(self.topics.len());
        for topic in &self.topics {
            let receiver = tokio::time::timeout(self.subscribe_timeout, self.bus.subscribe(topic))
                .await
                .map_err(|_| RealtimeError::SubscribeTimeout {
                    topic: topic.to_string(),
                    after_ms: self.subscribe_timeout.as_millis() as u64,
                })??;
            receivers.push((topic.clone(), receiver));
        }
        Ok(receivers)
    }

    /// Forward decoded events to the actor until a transport error or the
    /// actor goes away.
    async fn pump(&self, receivers: Vec<(Topic, TopicReceiver)>) -> PumpEnd {
        let (tx, mut rx) = mpsc::channel::<RealtimeResult<TopicMessage>>(self.topics.len().max(1) * 16);
        let mut forwarders = JoinSet::new();

        for (topic, mut receiver) in receivers {
            let tx = tx.clone();
            forwarders.spawn(async move {
                loop {
                    let item = match receiver.recv().await {
                        Ok(message) => Ok(message),
                        Err(RecvError::Lagged(skipped)) => Err(RealtimeError::Lagged {
                            topic: topic.to_string(),
                            skipped,
                        }),
                        Err(RecvError::Closed) => Err(RealtimeError::TopicClosed(topic.to_string())),
                    };
                    let terminal = item.is_err();
                    if tx.send(item).await.is_err() || terminal {
                        return;
                    }
                }
            });
        }
        drop(tx);

        let end = loop {
            tokio::select! {
                item = rx.recv() => match item {
                    Some(Ok(message)) => {
                        if let Some(event) = decode(&message) {
                            if self.events.send(Inbound::Event(event)).await.is_err() {
                                break PumpEnd::Stopped;
                            }
                        }
                    }
                    Some(Err(e)) => break PumpEnd::Reconnect(e),
                    None => break PumpEnd::Reconnect(RealtimeError::TopicClosed(
                        self.topics.iter().map(Topic::as_str).collect::<Vec<_>>().join(","),
                    )),
                },
                _ = self.events.closed() => break PumpEnd::Stopped,
            }
        };

        forwarders.abort_all();
        end
    }
}

/// Unknown event names are skipped; malformed payloads are logged and
/// skipped.
fn decode(message: &TopicMessage) -> Option<RealtimeEvent> {
    match message.decode() {
        Ok(Some(event)) => Some(event),
        Ok(None) => {
            debug!(name = %message.event, "ignoring unknown event");
            None
        }
        Err(e) => {
            warn!(event = %Event::RealtimeBadPayload, name = %message.event, error = %e, "dropping message");
            None
        }
    }
}
