//! # Replay Transport
//!
//! Re-issues a queued mutation as a plain HTTP request against the same
//! endpoints normal writes use. Idempotency is the endpoint's concern.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, StatusCode};

use super::errors::TransportError;
use super::mutation::{HttpMethod, QueuedMutation};

/// Sends one mutation
#[async_trait]
pub trait MutationTransport: Send + Sync {
    async fn send(&self, mutation: &QueuedMutation) -> Result<(), TransportError>;
}

/// Transport over `reqwest`. Relative mutation URLs are resolved against
/// the base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    /// Absolute URL for a mutation
    pub fn resolve(&self, url: &str) -> Result<String, TransportError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(url.to_string());
        }
        match &self.base_url {
            Some(base) if url.starts_with('/') => Ok(format!("{base}{url}")),
            Some(base) => Ok(format!("{base}/{url}")),
            None => Err(TransportError::InvalidRequest(format!(
                "relative url {url} without a base url"
            ))),
        }
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Map a response status to the replay outcome
pub fn classify_status(status: StatusCode, retry_after: Option<&str>) -> Result<(), TransportError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(TransportError::RateLimited { retry_after });
    }
    Err(TransportError::Status(status.as_u16()))
}

#[async_trait]
impl MutationTransport for HttpTransport {
    async fn send(&self, mutation: &QueuedMutation) -> Result<(), TransportError> {
        let url = self.resolve(&mutation.url)?;
        let mut request = self.client.request(method(mutation.method), url);
        for (name, value) in &mutation.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &mutation.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok());
        classify_status(response.status(), retry_after)
    }
}
