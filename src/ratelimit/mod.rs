//! # Rate Limiting
//!
//! Fixed-reset window admission keyed by `(identity, route)`.
//!
//! A window opens at the first hit for a key and lasts `window_ms`. Every
//! hit inside it counts, denied ones included; the limiter reports
//! admission and leaves backoff to the caller.

mod limiter;

pub use limiter::{now_ms, RateDecision, RateKey, RateLimitPolicy, RateLimiter, RateWindow};
