use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Current wall-clock time in milliseconds
pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Limiter key: who is calling which route
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub identity: String,
    pub route: String,
}

impl RateKey {
    pub fn new(identity: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            route: route.into(),
        }
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.identity, self.route)
    }
}

/// Per-key window state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub window_start: u64,
    pub count: u64,
}

/// Outcome of a [`RateLimiter::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Hits in the current window, this one included
    pub count: u64,
    /// Milliseconds until the window resets
    pub retry_after_ms: u64,
}

impl RateDecision {
    /// `Retry-After` value in whole seconds, at least 1
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after_ms.div_ceil(1000).max(1)
    }
}

/// Window length, admissions per window, and the most keys tracked at once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    #[serde(default = "default_max_hits")]
    pub max_hits: u64,

    #[serde(default = "default_max_keys")]
    pub max_keys: usize,
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_max_hits() -> u64 {
    20
}

fn default_max_keys() -> usize {
    100_000
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_hits: default_max_hits(),
            max_keys: default_max_keys(),
        }
    }
}

/// Key → window map behind a mutex.
///
/// Near-simultaneous hits for one key are serialized on the mutex, so no
/// two of them read the same count.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<RateKey, RateWindow>>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RateKey, RateWindow>> {
        // the map stays consistent even if a holder panicked
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a hit for `key` at `now_ms` and report admission
    pub fn check(&self, key: &RateKey, now_ms: u64, window_ms: u64, max_hits: u64) -> RateDecision {
        let mut windows = self.lock();
        hit(&mut windows, key, now_ms, window_ms, max_hits)
    }

    /// [`check`](Self::check) with the configured policy.
    ///
    /// The map never holds more than `max_keys` windows. A new key arriving
    /// at capacity first sweeps expired windows; if that frees nothing, the
    /// oldest windows are evicted in a batch of about an eighth of the cap.
    pub fn admit(&self, key: &RateKey, now_ms: u64) -> RateDecision {
        let max_keys = self.policy.max_keys.max(1);
        let mut windows = self.lock();

        if windows.len() >= max_keys && !windows.contains_key(key) {
            let expired = retain_live(&mut windows, now_ms, self.policy.window_ms);
            let evicted = if windows.len() >= max_keys {
                evict_oldest(&mut windows, max_keys - (max_keys / 8).max(1))
            } else {
                0
            };
            debug!(expired, evicted, tracked = windows.len(), "rate limiter at capacity");
        }

        hit(&mut windows, key, now_ms, self.policy.window_ms, self.policy.max_hits)
    }

    /// Drop windows that have already expired. Returns how many were removed.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let mut windows = self.lock();
        retain_live(&mut windows, now_ms, self.policy.window_ms)
    }

    /// Current window for a key, if any
    pub fn window(&self, key: &RateKey) -> Option<RateWindow> {
        self.lock().get(key).copied()
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn hit(
    windows: &mut HashMap<RateKey, RateWindow>,
    key: &RateKey,
    now_ms: u64,
    window_ms: u64,
    max_hits: u64,
) -> RateDecision {
    let window = windows.entry(key.clone()).or_insert(RateWindow {
        window_start: now_ms,
        count: 0,
    });

    if now_ms > window.window_start.saturating_add(window_ms) {
        window.window_start = now_ms;
        window.count = 0;
    }

    window.count += 1;

    let resets_at = window.window_start.saturating_add(window_ms);
    RateDecision {
        allowed: window.count <= max_hits,
        count: window.count,
        retry_after_ms: resets_at.saturating_sub(now_ms),
    }
}

fn retain_live(windows: &mut HashMap<RateKey, RateWindow>, now_ms: u64, window_ms: u64) -> usize {
    let before = windows.len();
    windows.retain(|_, w| now_ms <= w.window_start.saturating_add(window_ms));
    before - windows.len()
}

/// Remove the earliest-started windows until `keep` remain
fn evict_oldest(windows: &mut HashMap<RateKey, RateWindow>, keep: usize) -> usize {
    if windows.len() <= keep {
        return 0;
    }
    let mut starts: Vec<(u64, RateKey)> = windows
        .iter()
        .map(|(k, w)| (w.window_start, k.clone()))
        .collect();
    let excess = starts.len() - keep;
    starts.select_nth_unstable_by_key(excess - 1, |(start, _)| *start);
    for (_, key) in &starts[..excess] {
        windows.remove(key);
    }
    excess
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key() -> RateKey {
        RateKey::new("10.0.0.1", "/api/pos")
    }

    #[test]
    fn test_window_admission_sequence() {
        let limiter = RateLimiter::default();

        for expected in 1..=3 {
            let d = limiter.check(&key(), 1_000 + expected, 1_000, 3);
            assert!(d.allowed);
            assert_eq!(d.count, expected);
        }

        let denied = limiter.check(&key(), 1_500, 1_000, 3);
        assert!(!denied.allowed);
        assert_eq!(denied.count, 4);

        // window started at 1_001
        let reset = limiter.check(&key(), 1_001 + 1_000 + 1, 1_000, 3);
        assert!(reset.allowed);
        assert_eq!(reset.count, 1);
    }

    #[test]
    fn test_boundary_hit_stays_in_window() {
        let limiter = RateLimiter::default();
        limiter.check(&key(), 0, 1_000, 1);
        let d = limiter.check(&key(), 1_000, 1_000, 1);
        assert!(!d.allowed);
        assert_eq!(d.count, 2);
    }

    #[test]
    fn test_denied_hits_keep_counting() {
        let limiter = RateLimiter::default();
        for _ in 0..10 {
            limiter.check(&key(), 5, 1_000, 2);
        }
        assert_eq!(limiter.window(&key()).unwrap().count, 10);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::default();
        let other = RateKey::new("10.0.0.1", "/api/expenses");
        limiter.check(&key(), 0, 1_000, 1);
        assert!(!limiter.check(&key(), 1, 1_000, 1).allowed);
        assert!(limiter.check(&other, 1, 1_000, 1).allowed);
    }

    #[test]
    fn test_retry_after() {
        let limiter = RateLimiter::default();
        let d = limiter.check(&key(), 10_000, 60_000, 20);
        assert_eq!(d.retry_after_ms, 60_000);
        assert_eq!(d.retry_after_secs(), 60);

        let d = limiter.check(&key(), 69_999, 60_000, 20);
        assert_eq!(d.retry_after_ms, 1);
        assert_eq!(d.retry_after_secs(), 1);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let limiter = RateLimiter::new(RateLimitPolicy {
            window_ms: 100,
            ..Default::default()
        });
        limiter.admit(&RateKey::new("a", "/r"), 0);
        limiter.admit(&RateKey::new("b", "/r"), 150);

        assert_eq!(limiter.sweep(200), 1);
        assert_eq!(limiter.len(), 1);
        assert!(limiter.window(&RateKey::new("b", "/r")).is_some());
    }

    #[test]
    fn test_admit_sweeps_over_capacity() {
        let limiter = RateLimiter::new(RateLimitPolicy {
            window_ms: 10,
            max_hits: 5,
            max_keys: 2,
        });
        for i in 0..3 {
            limiter.admit(&RateKey::new(format!("c{i}"), "/r"), 0);
        }
        assert_eq!(limiter.len(), 2);

        limiter.admit(&RateKey::new("late", "/r"), 100);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_live_keys_never_exceed_capacity() {
        let limiter = RateLimiter::new(RateLimitPolicy {
            window_ms: 60_000,
            max_hits: 5,
            max_keys: 16,
        });
        for i in 0..500u64 {
            limiter.admit(&RateKey::new(format!("198.51.100.{i}"), "/api/pos"), i);
            assert!(limiter.len() <= 16);
        }
        // newest survive
        assert!(limiter.window(&RateKey::new("198.51.100.499", "/api/pos")).is_some());
        assert!(limiter.window(&RateKey::new("198.51.100.0", "/api/pos")).is_none());
    }

    #[test]
    fn test_known_key_at_capacity_is_not_evicted() {
        let limiter = RateLimiter::new(RateLimitPolicy {
            window_ms: 60_000,
            max_hits: 1,
            max_keys: 2,
        });
        let a = RateKey::new("a", "/r");
        limiter.admit(&a, 0);
        limiter.admit(&RateKey::new("b", "/r"), 1);

        let again = limiter.admit(&a, 2);
        assert!(!again.allowed);
        assert_eq!(again.count, 2);
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_evict_oldest_keeps_newest() {
        let mut windows = HashMap::new();
        for (i, start) in [30u64, 10, 50, 20, 40].into_iter().enumerate() {
            windows.insert(
                RateKey::new(format!("k{i}"), "/r"),
                RateWindow { window_start: start, count: 1 },
            );
        }
        assert_eq!(evict_oldest(&mut windows, 2), 3);
        let mut left: Vec<u64> = windows.values().map(|w| w.window_start).collect();
        left.sort_unstable();
        assert_eq!(left, vec![40, 50]);
    }

    #[test]
    fn test_concurrent_hits_are_not_lost() {
        let limiter = Arc::new(RateLimiter::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        limiter.check(&key(), 1, 60_000, 1_000_000);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(limiter.window(&key()).unwrap().count, 800);
    }
}
