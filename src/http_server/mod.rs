//! # tenantsync HTTP Server Module
//!
//! The API surface queued mutations replay against.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /api/:table?limit=N&cursor=<opaque>` - Cursor-paginated list
//! - `POST /api/:table` - Insert (rate limited)
//! - `PATCH /api/:table/:id` - Shallow update (rate limited)
//! - `DELETE /api/:table/:id` - Delete (rate limited)
//!
//! Every request names its tenant in the `x-tenant-id` header.

mod config;
mod errors;
mod response;
mod routes;
mod server;

pub use config::HttpServerConfig;
pub use errors::{ErrorResponse, HttpError, HttpResult};
pub use response::{DeleteResponse, HealthResponse, SingleResponse};
pub use routes::{api_routes, client_identity, health_routes, AppState};
pub use server::HttpServer;
