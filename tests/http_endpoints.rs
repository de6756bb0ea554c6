//! HTTP Endpoint Tests
//!
//! Drives the axum router in-process:
//! - list pages carry `items` and `nextCursor`, and a bad cursor is a 400
//! - writes past the rate limit are 429 with `Retry-After`
//! - inserts publish to every realtime topic of the table
//! - replayed inserts with a known id are idempotent, even when concurrent

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use tenantsync::config::RealtimeConfig;
use tenantsync::http_server::{AppState, HttpServer, HttpServerConfig};
use tenantsync::pagination::{PageFetcher, PaginationConfig};
use tenantsync::ratelimit::{RateLimitPolicy, RateLimiter};
use tenantsync::realtime::{
    ChannelAddress, InMemoryBus, Op, RealtimeBus, RealtimePublisher, TopicMessage,
};
use tenantsync::record::Record;
use tenantsync::store::{MemoryRecordStore, RecordStore};

// =============================================================================
// Test Utilities
// =============================================================================

const TENANT: &str = "acme";

struct Harness {
    router: Router,
    store: Arc<MemoryRecordStore>,
    bus: Arc<InMemoryBus>,
}

fn harness(max_hits: u64) -> Harness {
    let store = Arc::new(MemoryRecordStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let state = AppState {
        store: store.clone(),
        fetcher: PageFetcher::new(store.clone(), PaginationConfig::default()),
        limiter: Arc::new(RateLimiter::new(RateLimitPolicy {
            window_ms: 60_000,
            max_hits,
            ..RateLimitPolicy::default()
        })),
        publisher: RealtimePublisher::new(bus.clone(), Arc::new(ChannelAddress::migrating())),
        realtime: RealtimeConfig::default(),
    };
    Harness {
        router: HttpServer::new(HttpServerConfig::default(), state).router(),
        store,
        bus,
    }
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.expect("router error")
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("x-tenant-id", TENANT)
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("x-tenant-id", TENANT)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn seed(store: &MemoryRecordStore, table: &str, n: usize) {
    for i in 0..n {
        store
            .insert(
                table,
                Record::new(format!("r{i}"), format!("2024-01-0{}T00:00:00Z", i + 1), TENANT),
            )
            .await
            .unwrap();
    }
}

// =============================================================================
// List Endpoint
// =============================================================================

#[tokio::test]
async fn test_list_pages_with_cursor() {
    let h = harness(20);
    seed(&h.store, "deliveries", 3).await;

    let response = send(&h.router, get("/api/deliveries?limit=2")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    let ids: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["r2", "r1"]);

    let cursor = page["nextCursor"].as_str().unwrap().to_string();
    let response = send(
        &h.router,
        get(&format!("/api/deliveries?limit=2&cursor={cursor}")),
    )
    .await;
    let page = body_json(response).await;
    assert_eq!(page["items"][0]["id"], "r0");
    assert_eq!(page["nextCursor"], Value::Null);
}

#[tokio::test]
async fn test_bad_cursor_is_400() {
    let h = harness(20);
    let response = send(&h.router, get("/api/deliveries?cursor=not-a-cursor")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], 400);
    assert!(body["error"].as_str().unwrap().contains("cursor"));
}

#[tokio::test]
async fn test_bad_limit_is_400() {
    let h = harness(20);
    let response = send(&h.router, get("/api/deliveries?limit=lots")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_tenant_is_400() {
    let h = harness(20);
    let request = Request::get("/api/deliveries").body(Body::empty()).unwrap();
    let response = send(&h.router, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Rate Limiting
// =============================================================================

#[tokio::test]
async fn test_fourth_write_is_429_with_retry_after() {
    let h = harness(3);

    for n in 0..3 {
        let response = send(&h.router, post("/api/expenses", json!({ "amount": n }))).await;
        assert_eq!(response.status(), StatusCode::CREATED, "write {n}");
    }

    let response = send(&h.router, post("/api/expenses", json!({ "amount": 3 }))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(body_json(response).await["code"], 429);

    // a different route has its own window
    let response = send(&h.router, post("/api/deliveries", json!({}))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_forwarded_clients_are_limited_separately() {
    let h = harness(1);
    for ip in ["203.0.113.1", "203.0.113.2"] {
        let mut request = post("/api/expenses", json!({}));
        request
            .headers_mut()
            .insert("x-forwarded-for", ip.parse().unwrap());
        assert_eq!(send(&h.router, request).await.status(), StatusCode::CREATED);
    }
}

// =============================================================================
// Writes and Publishing
// =============================================================================

#[tokio::test]
async fn test_insert_publishes_to_every_topic() {
    let h = harness(20);
    let mut canonical = h
        .bus
        .subscribe(&ChannelAddress::canonical("pos", TENANT))
        .await
        .unwrap();
    let mut legacy = h
        .bus
        .subscribe(&ChannelAddress::legacy("pos", TENANT))
        .await
        .unwrap();

    let response = send(
        &h.router,
        post("/api/pos", json!({ "id": "po-1", "vendor": "Northwind" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["data"]["tenant_id"], TENANT);

    for receiver in [&mut canonical, &mut legacy] {
        let message: TopicMessage = receiver.recv().await.unwrap();
        assert_eq!(message.event, "po_updated");
        let event = message.decode().unwrap().unwrap();
        assert_eq!(event.op, Op::Insert);
        assert_eq!(event.record.id, "po-1");
        assert_eq!(event.record.fields["vendor"], "Northwind");
    }
}

#[tokio::test]
async fn test_replayed_insert_is_idempotent() {
    let h = harness(20);
    let body = json!({ "id": "exp-1", "amount": 12 });

    let first = send(&h.router, post("/api/expenses", body.clone())).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let created_at = body_json(first).await["data"]["created_at"].clone();

    let second = send(&h.router, post("/api/expenses", body)).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_json(second).await["data"]["created_at"], created_at);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replays_create_one_row() {
    let h = harness(100);
    let body = json!({ "id": "exp-7", "amount": 40 });

    let sends = (0..8).map(|_| {
        let router = h.router.clone();
        let request = post("/api/expenses", body.clone());
        tokio::spawn(async move { send(&router, request).await.status() })
    });
    let mut statuses = Vec::new();
    for handle in sends.collect::<Vec<_>>() {
        statuses.push(handle.await.unwrap());
    }

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 1);
    assert!(statuses
        .iter()
        .all(|s| *s == StatusCode::CREATED || *s == StatusCode::OK));
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn test_update_and_delete() {
    let h = harness(20);
    seed(&h.store, "orders", 1).await;

    let patch = Request::patch("/api/orders/r0")
        .header("x-tenant-id", TENANT)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "status": "approved" }).to_string()))
        .unwrap();
    let response = send(&h.router, patch).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "approved");

    let delete = || {
        Request::delete("/api/orders/r0")
            .header("x-tenant-id", TENANT)
            .body(Body::empty())
            .unwrap()
    };
    let response = send(&h.router, delete()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "deleted": true, "id": "r0" }));

    let response = send(&h.router, delete()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
