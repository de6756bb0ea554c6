//! # Cursor Pagination
//!
//! Over-fetch-by-one page queries against a [`RecordStore`], plus the
//! [`PageSource`] seam that cached lists load pages through.
//!
//! [`RecordStore`]: crate::store::RecordStore

mod errors;
mod fetcher;
mod params;
mod source;

pub use errors::{FetchError, FetchResult};
pub use fetcher::{BoundaryMode, Page, PageFetcher, PaginationConfig, DEFAULT_LIMIT, MAX_LIMIT};
pub use params::{ListParams, ParamError};
pub use source::{HttpPageSource, PageSource, TablePages, TENANT_HEADER};
