//! # Topic Addressing
//!
//! Topic names for a `(table, tenant)` stream.
//!
//! While topic naming migrates, a stream has two names: the canonical one
//! and the legacy one. Subscribers listen on every name returned and
//! publishers publish to every name returned. When migration ends the
//! resolver returns a single name.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A resolved topic name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strategy for naming the topics of a stream
pub trait TopicResolver: Send + Sync {
    /// All topics for the stream, no duplicates, canonical first
    fn topics_for(&self, table: &str, tenant_id: &str) -> Vec<Topic>;
}

/// Default resolver.
///
/// Canonical names are `realtime:<tenant>:<table>`; legacy names are
/// `<table>:<tenant>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelAddress {
    legacy: bool,
}

impl ChannelAddress {
    /// Resolver that also returns legacy names
    pub fn migrating() -> Self {
        Self { legacy: true }
    }

    /// Resolver for canonical names only
    pub fn canonical_only() -> Self {
        Self { legacy: false }
    }

    pub fn with_legacy(legacy: bool) -> Self {
        Self { legacy }
    }

    pub fn canonical(table: &str, tenant_id: &str) -> Topic {
        Topic(format!("realtime:{tenant_id}:{table}"))
    }

    pub fn legacy(table: &str, tenant_id: &str) -> Topic {
        Topic(format!("{table}:{tenant_id}"))
    }
}

impl Default for ChannelAddress {
    fn default() -> Self {
        Self::migrating()
    }
}

impl TopicResolver for ChannelAddress {
    fn topics_for(&self, table: &str, tenant_id: &str) -> Vec<Topic> {
        let mut topics = vec![Self::canonical(table, tenant_id)];
        if self.legacy {
            let legacy = Self::legacy(table, tenant_id);
            if !topics.contains(&legacy) {
                topics.push(legacy);
            }
        }
        topics
    }
}

/// Set of topics a subscriber holds. Adding a held topic is a no-op.
#[derive(Debug, Clone, Default)]
pub struct TopicSet {
    topics: BTreeSet<Topic>,
}

impl TopicSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the topic was already held
    pub fn insert(&mut self, topic: Topic) -> bool {
        self.topics.insert(topic)
    }

    pub fn contains(&self, topic: &Topic) -> bool {
        self.topics.contains(topic)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Topic> {
        self.topics.iter()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl FromIterator<Topic> for TopicSet {
    fn from_iter<I: IntoIterator<Item = Topic>>(iter: I) -> Self {
        Self {
            topics: iter.into_iter().collect(),
        }
    }
}
