//! # Cursor Codec
//!
//! Opaque, URL-safe pagination cursors over the `(created_at, id)` ordering.
//!
//! A cursor names the last item already returned. Callers treat it as an
//! opaque string; only this module knows its layout.

mod codec;
mod errors;

pub use codec::{decode, encode, Cursor};
pub use errors::{CursorError, CursorResult};
