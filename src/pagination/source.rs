//! # Page Sources
//!
//! What a cached list loads pages from: a local [`PageFetcher`] bound to a
//! table, or a remote list endpoint over HTTP.

use async_trait::async_trait;

use super::errors::{FetchError, FetchResult};
use super::fetcher::{Page, PageFetcher};
use crate::cursor::Cursor;

/// Header carrying the tenant on list and write requests
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Source of pages for one table
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(
        &self,
        tenant_id: &str,
        limit: usize,
        cursor: Option<&Cursor>,
    ) -> FetchResult<Page>;
}

/// A [`PageFetcher`] bound to one table
#[derive(Clone)]
pub struct TablePages {
    fetcher: PageFetcher,
    table: String,
}

impl TablePages {
    pub fn new(fetcher: PageFetcher, table: impl Into<String>) -> Self {
        Self {
            fetcher,
            table: table.into(),
        }
    }
}

#[async_trait]
impl PageSource for TablePages {
    async fn fetch_page(
        &self,
        tenant_id: &str,
        limit: usize,
        cursor: Option<&Cursor>,
    ) -> FetchResult<Page> {
        self.fetcher.fetch(&self.table, tenant_id, limit, cursor).await
    }
}

/// Remote list endpoint, `GET <endpoint>?limit=N&cursor=<opaque>`
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPageSource {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(
        &self,
        tenant_id: &str,
        limit: usize,
        cursor: Option<&Cursor>,
    ) -> FetchResult<Page> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.as_str().to_string()));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .header(TENANT_HEADER, tenant_id)
            .query(&query)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(format!("HTTP {}", status.as_u16())));
        }

        response
            .json::<Page>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}
