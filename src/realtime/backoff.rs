//! # Reconnect Backoff
//!
//! Capped exponential delay with equal jitter: each delay is drawn from
//! `[base / 2, base]`, where `base = min(max, initial * 2^attempt)`.

use std::time::Duration;

use rand::Rng;

/// Doublings beyond this add nothing for any sane cap
const MAX_EXPONENT: u32 = 20;

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
        }
    }

    /// Un-jittered delay for an attempt number
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_EXPONENT);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let half = base_ms / 2;
        let jitter = if half == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=half)
        };
        Duration::from_millis(base_ms - half + jitter)
    }

    /// Attempts since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
