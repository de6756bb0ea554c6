//! Observable events for tenantsync
//!
//! Events are explicit and typed. Every structured log line carries one of
//! these names in its `event` field.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Server startup begins
    ServerStart,
    /// Listener bound, ready to serve
    ServerServing,
    /// Shutdown initiated
    ShutdownStart,
    /// Configuration loaded
    ConfigLoaded,

    // Rate limiting
    /// Write request denied
    RateLimited,
    /// Expired windows swept
    RateWindowsSwept,

    // Realtime
    /// Subscribing to topics
    RealtimeConnecting,
    /// All topics acknowledged
    RealtimeLive,
    /// Transport error, resubscribing
    RealtimeReconnect,
    /// Message dropped because its payload did not decode
    RealtimeBadPayload,
    /// List reloaded after a reconnect
    RealtimeResync,

    // Write queue
    /// Queue restored from storage
    QueueLoaded,
    /// Mutation appended
    QueueEnqueue,
    /// Flush pass started
    QueueFlushBegin,
    /// Flush pass finished
    QueueFlushComplete,
    /// Mutation dropped after the retry ceiling
    MutationDropped,
    /// Queue could not be persisted (FATAL for durability)
    QueuePersistFailed,
    /// Stored queue failed its checksum (FATAL)
    QueueCorruption,
}

impl Event {
    /// Returns the string representation for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ServerStart => "SERVER_START",
            Event::ServerServing => "SERVER_SERVING",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::RateLimited => "RATE_LIMITED",
            Event::RateWindowsSwept => "RATE_WINDOWS_SWEPT",
            Event::RealtimeConnecting => "REALTIME_CONNECTING",
            Event::RealtimeLive => "REALTIME_LIVE",
            Event::RealtimeReconnect => "REALTIME_RECONNECT",
            Event::RealtimeBadPayload => "REALTIME_BAD_PAYLOAD",
            Event::RealtimeResync => "REALTIME_RESYNC",
            Event::QueueLoaded => "QUEUE_LOADED",
            Event::QueueEnqueue => "QUEUE_ENQUEUE",
            Event::QueueFlushBegin => "QUEUE_FLUSH_BEGIN",
            Event::QueueFlushComplete => "QUEUE_FLUSH_COMPLETE",
            Event::MutationDropped => "MUTATION_DROPPED",
            Event::QueuePersistFailed => "QUEUE_PERSIST_FAILED",
            Event::QueueCorruption => "QUEUE_CORRUPTION",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::QueuePersistFailed | Event::QueueCorruption)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
