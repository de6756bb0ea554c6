//! # Queued Mutations
//!
//! A write captured for later replay. Identity is the mutation's own id,
//! independent of any record id in its body.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::compress::{compress_image, ImageEncoder};
use super::errors::{QueueError, QueueResult};

/// Replayable HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Parse a method name, case-insensitive
    pub fn parse(method: &str) -> QueueResult<Self> {
        match method.to_ascii_uppercase().as_str() {
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(QueueError::InvalidMutation(format!(
                "method {other} is not a write"
            ))),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub id: String,
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Failed replay attempts so far
    #[serde(default)]
    pub retries: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedMutation {
    pub fn builder(method: HttpMethod, url: impl Into<String>) -> NewMutation {
        NewMutation::new(method, url)
    }
}

/// Builder for a mutation that has not been queued yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewMutation {
    id: Option<String>,
    url: String,
    method: HttpMethod,
    headers: BTreeMap<String, String>,
    body: Option<Value>,
}

impl NewMutation {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Use a caller-chosen id instead of a generated one
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Compress an image and store it in the body under `field` as a
    /// `data:image/jpeg;base64,` URL. The body must be absent or an object.
    pub fn attach_image(
        mut self,
        field: &str,
        encoder: &dyn ImageEncoder,
        budget_bytes: usize,
    ) -> QueueResult<Self> {
        let image = compress_image(encoder, budget_bytes)?;
        let body = self.body.get_or_insert_with(|| Value::Object(Map::new()));
        match body {
            Value::Object(map) => {
                map.insert(field.to_string(), Value::String(image.to_data_url()));
                Ok(self)
            }
            _ => Err(QueueError::InvalidMutation(
                "attachments need an object body".to_string(),
            )),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Finalize with zero retries
    pub fn into_mutation(self) -> QueueResult<QueuedMutation> {
        if self.url.trim().is_empty() {
            return Err(QueueError::InvalidMutation("empty url".to_string()));
        }
        Ok(QueuedMutation {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            url: self.url,
            method: self.method,
            headers: self.headers,
            body: self.body,
            retries: 0,
            enqueued_at: Utc::now(),
        })
    }
}
