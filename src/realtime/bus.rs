//! # Realtime Bus
//!
//! Opaque publish/subscribe primitive. Delivery is at-least-once and only
//! ordered within one topic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::broadcast;

use super::errors::{RealtimeError, RealtimeResult};
use super::event::{EventName, RealtimeEvent, TopicMessage};
use super::topic::{Topic, TopicResolver};

/// Receiving end of one topic subscription
pub type TopicReceiver = broadcast::Receiver<TopicMessage>;

/// Publish/subscribe transport
#[async_trait]
pub trait RealtimeBus: Send + Sync {
    /// Subscribe to a topic. Returns once the subscription is acknowledged.
    async fn subscribe(&self, topic: &Topic) -> RealtimeResult<TopicReceiver>;

    /// Publish to a topic, returning how many receivers were reached
    async fn publish(&self, topic: &Topic, message: TopicMessage) -> RealtimeResult<usize>;
}

/// Default per-topic buffer
pub const DEFAULT_TOPIC_CAPACITY: usize = 256;

/// In-process bus over tokio broadcast channels
#[derive(Debug)]
pub struct InMemoryBus {
    topics: RwLock<HashMap<Topic, broadcast::Sender<TopicMessage>>>,
    capacity: usize,
    failing_subscribes: AtomicUsize,
    stalled_subscribes: AtomicUsize,
    subscribe_calls: AtomicUsize,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            failing_subscribes: AtomicUsize::new(0),
            stalled_subscribes: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` subscribe calls fail
    pub fn fail_next_subscribes(&self, n: usize) {
        self.failing_subscribes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` subscribe calls never complete
    pub fn stall_next_subscribes(&self, n: usize) {
        self.stalled_subscribes.store(n, Ordering::SeqCst);
    }

    /// Drop a topic; its receivers observe the stream closing
    pub fn close_topic(&self, topic: &Topic) -> bool {
        self.topics
            .write()
            .map(|mut topics| topics.remove(topic).is_some())
            .unwrap_or(false)
    }

    /// Live receivers on a topic
    pub fn receiver_count(&self, topic: &Topic) -> usize {
        self.topics
            .read()
            .ok()
            .and_then(|topics| topics.get(topic).map(|tx| tx.receiver_count()))
            .unwrap_or(0)
    }

    /// Subscribe calls seen so far, failed ones included
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RealtimeBus for InMemoryBus {
    async fn subscribe(&self, topic: &Topic) -> RealtimeResult<TopicReceiver> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .failing_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(RealtimeError::Subscribe {
                topic: topic.to_string(),
                reason: "transport unavailable".into(),
            });
        }

        let stalled = self
            .stalled_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            return std::future::pending().await;
        }

        let mut topics = self.topics.write().map_err(|_| RealtimeError::Subscribe {
            topic: topic.to_string(),
            reason: "Lock poisoned".into(),
        })?;
        let sender = topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(sender.subscribe())
    }

    async fn publish(&self, topic: &Topic, message: TopicMessage) -> RealtimeResult<usize> {
        let topics = self.topics.read().map_err(|_| RealtimeError::Publish {
            topic: topic.to_string(),
            reason: "Lock poisoned".into(),
        })?;
        match topics.get(topic) {
            // no receivers is not an error on a pub/sub bus
            Some(sender) => Ok(sender.send(message).unwrap_or(0)),
            None => Ok(0),
        }
    }
}

/// Publishes row changes to every topic of their stream
#[derive(Clone)]
pub struct RealtimePublisher {
    bus: Arc<dyn RealtimeBus>,
    resolver: Arc<dyn TopicResolver>,
}

impl RealtimePublisher {
    pub fn new(bus: Arc<dyn RealtimeBus>, resolver: Arc<dyn TopicResolver>) -> Self {
        Self { bus, resolver }
    }

    pub fn bus(&self) -> Arc<dyn RealtimeBus> {
        self.bus.clone()
    }

    pub fn resolver(&self) -> Arc<dyn TopicResolver> {
        self.resolver.clone()
    }

    /// Publish to all resolved topics. Every topic is attempted; the first
    /// failure is returned after the rest have been tried.
    pub async fn publish(&self, name: EventName, event: &RealtimeEvent) -> RealtimeResult<usize> {
        let message = TopicMessage::new(name, event)?;
        let topics = self.resolver.topics_for(&event.table, &event.tenant_id);

        let results = join_all(
            topics
                .iter()
                .map(|topic| self.bus.publish(topic, message.clone())),
        )
        .await;

        let mut delivered = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(n) => delivered += n,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }
}
