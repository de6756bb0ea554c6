//! Cursor layout: base64url (no padding) of `c1:<len>:<created_at><id>`,
//! where `<len>` is the byte length of `created_at`. Length-prefixing keeps
//! both fields lossless whatever characters they contain.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::errors::{CursorError, CursorResult};
use crate::record::SortKey;

const VERSION_PREFIX: &str = "c1:";

/// Opaque pagination cursor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Cursor positioned after the row with this key
    pub fn from_key(key: &SortKey) -> Self {
        encode(&key.created_at, &key.id)
    }

    /// Wrap a token received from a caller. No validation happens until
    /// [`Cursor::decode`].
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn decode(&self) -> CursorResult<SortKey> {
        decode(&self.0)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode an ordering key into a cursor
pub fn encode(created_at: &str, id: &str) -> Cursor {
    let mut raw = String::with_capacity(VERSION_PREFIX.len() + 8 + created_at.len() + id.len());
    raw.push_str(VERSION_PREFIX);
    raw.push_str(&created_at.len().to_string());
    raw.push(':');
    raw.push_str(created_at);
    raw.push_str(id);
    Cursor(URL_SAFE_NO_PAD.encode(raw.as_bytes()))
}

/// Decode a cursor token back into its ordering key
pub fn decode(token: &str) -> CursorResult<SortKey> {
    if token.is_empty() {
        return Err(CursorError::Empty);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .map_err(|_| CursorError::Encoding)?;
    let raw = String::from_utf8(bytes).map_err(|_| CursorError::Encoding)?;

    let body = raw.strip_prefix(VERSION_PREFIX).ok_or(CursorError::Version)?;
    let (len, rest) = body
        .split_once(':')
        .ok_or(CursorError::Malformed("missing length"))?;

    if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CursorError::Malformed("bad length"));
    }
    let len: usize = len
        .parse()
        .map_err(|_| CursorError::Malformed("bad length"))?;

    if len > rest.len() || !rest.is_char_boundary(len) {
        return Err(CursorError::Malformed("length out of range"));
    }

    let (created_at, id) = rest.split_at(len);
    Ok(SortKey::new(created_at, id))
}
