//! Table HTTP Routes
//!
//! `GET /api/:table` pages a table; `POST`, `PATCH` and `DELETE` write to
//! it. Writes pass the rate limiter and are published to every realtime
//! topic for the table.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::errors::{HttpError, HttpResult};
use super::response::{DeleteResponse, HealthResponse, SingleResponse};
use crate::config::RealtimeConfig;
use crate::observability::Event;
use crate::pagination::{ListParams, Page, PageFetcher, TablePages, TENANT_HEADER};
use crate::ratelimit::{now_ms, RateKey, RateLimiter};
use crate::realtime::{EventName, MergeEngine, RealtimeEvent, RealtimePublisher};
use crate::record::Record;
use crate::store::{InsertOutcome, RecordStore};

// ==================
// Shared State
// ==================

/// State shared across handlers
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub fetcher: PageFetcher,
    pub limiter: Arc<RateLimiter>,
    pub publisher: RealtimePublisher,
    pub realtime: RealtimeConfig,
}

impl AppState {
    /// Live list of `table` for `tenant_id`, paged from this state's store
    /// and fed by the bus its writes publish to. Call inside a Tokio runtime.
    pub fn open_list(&self, table: &str, tenant_id: &str) -> MergeEngine {
        MergeEngine::spawn(
            self.realtime.list_spec(table, tenant_id),
            Arc::new(TablePages::new(self.fetcher.clone(), table)),
            self.publisher.bus(),
            self.publisher.resolver(),
            self.realtime.engine_config(),
        )
    }
}

// ==================
// Routes
// ==================

/// Create table routes, nested under `/api`
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/:table", get(list_handler).post(insert_handler))
        .route("/:table/:id", patch(update_handler).delete(delete_handler))
        .with_state(state)
}

/// Health check route
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_handler))
}

// ==================
// Helper Functions
// ==================

fn tenant(headers: &HeaderMap) -> HttpResult<String> {
    headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(HttpError::MissingTenant)
}

/// First hop of `x-forwarded-for`, or "local"
pub fn client_identity(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("local")
        .to_string()
}

fn admit(state: &AppState, headers: &HeaderMap, uri: &OriginalUri) -> HttpResult<()> {
    let key = RateKey::new(client_identity(headers), uri.0.path());
    let decision = state.limiter.admit(&key, now_ms());
    if decision.allowed {
        return Ok(());
    }
    info!(event = %Event::RateLimited, key = %key, count = decision.count, "write denied");
    Err(HttpError::RateLimited {
        retry_after_secs: decision.retry_after_secs(),
    })
}

fn object_body(body: Value) -> HttpResult<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(HttpError::InvalidBody("expected a JSON object".to_string())),
    }
}

/// Publish without failing the write; subscribers recover on reload
async fn publish(state: &AppState, event: RealtimeEvent) {
    let name = EventName::for_table(&event.table);
    if let Err(e) = state.publisher.publish(name, &event).await {
        warn!(table = %event.table, id = %event.record.id, error = %e, "realtime publish failed");
    }
}

fn created_at_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ==================
// Handlers
// ==================

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse::ok()))
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> HttpResult<Json<Page>> {
    let tenant_id = tenant(&headers)?;
    let params = ListParams::parse(&query, state.fetcher.config())?;
    let page = state
        .fetcher
        .fetch(&table, &tenant_id, params.limit, params.cursor.as_ref())
        .await?;
    Ok(Json(page))
}

/// Insert a row. A client-supplied id that already exists returns the
/// stored row, so replayed inserts are idempotent.
async fn insert_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: OriginalUri,
    Path(table): Path<String>,
    Json(body): Json<Value>,
) -> HttpResult<(StatusCode, Json<SingleResponse<Record>>)> {
    let tenant_id = tenant(&headers)?;
    admit(&state, &headers, &uri)?;

    let mut fields = object_body(body)?;
    let id = match fields.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => id,
        Some(Value::Null) | None => Uuid::new_v4().to_string(),
        Some(_) => return Err(HttpError::InvalidBody("id must be a string".to_string())),
    };
    fields.remove("created_at");
    fields.remove("tenant_id");

    let record = Record {
        id,
        created_at: created_at_now(),
        tenant_id,
        fields,
    };
    match state.store.insert_or_get(&table, record).await? {
        InsertOutcome::Existing(existing) => Ok((StatusCode::OK, Json(SingleResponse::new(existing)))),
        InsertOutcome::Created(stored) => {
            publish(&state, RealtimeEvent::insert(table, stored.clone())).await;
            Ok((StatusCode::CREATED, Json(SingleResponse::new(stored))))
        }
    }
}

async fn update_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: OriginalUri,
    Path((table, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> HttpResult<Json<SingleResponse<Record>>> {
    let tenant_id = tenant(&headers)?;
    admit(&state, &headers, &uri)?;

    let fields = object_body(body)?;
    let updated = state
        .store
        .update(&table, &tenant_id, &id, fields)
        .await?
        .ok_or_else(|| HttpError::NotFound {
            table: table.clone(),
            id: id.clone(),
        })?;
    publish(&state, RealtimeEvent::update(table, updated.clone())).await;

    Ok(Json(SingleResponse::new(updated)))
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: OriginalUri,
    Path((table, id)): Path<(String, String)>,
) -> HttpResult<Json<DeleteResponse>> {
    let tenant_id = tenant(&headers)?;
    admit(&state, &headers, &uri)?;

    let removed = state
        .store
        .delete(&table, &tenant_id, &id)
        .await?
        .ok_or_else(|| HttpError::NotFound {
            table: table.clone(),
            id: id.clone(),
        })?;
    publish(&state, RealtimeEvent::delete(table, removed)).await;

    Ok(Json(DeleteResponse::success(id)))
}
