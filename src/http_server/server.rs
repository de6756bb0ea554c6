//! # HTTP Server
//!
//! Combines the table and health routers, applies tracing and CORS
//! layers, and runs the periodic rate-window sweep.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::config::HttpServerConfig;
use super::routes::{api_routes, health_routes, AppState};
use crate::observability::{log_event, Event};
use crate::ratelimit::{now_ms, RateLimiter};

/// HTTP server for list and write endpoints
pub struct HttpServer {
    config: HttpServerConfig,
    state: Arc<AppState>,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: AppState) -> Self {
        let state = Arc::new(state);
        let router = Self::build_router(&config, state.clone());
        Self {
            config,
            state,
            router,
        }
    }

    /// Build the combined router
    fn build_router(config: &HttpServerConfig, state: Arc<AppState>) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(health_routes())
            .nest("/api", api_routes(state))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind and serve until ctrl-c
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid socket address {}: {e}", self.config.socket_addr()),
            )
        })?;

        info!(event = %Event::ServerStart, addr = %addr, "starting tenantsync HTTP server");
        let listener = TcpListener::bind(addr).await?;
        self.serve_until(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until the task is dropped
    pub async fn serve(self, listener: TcpListener) -> Result<(), std::io::Error> {
        self.serve_until(listener, std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn serve_until<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sweeper = spawn_sweeper(self.state.limiter.clone(), self.config.sweep_interval());

        info!(
            event = %Event::ServerServing,
            addr = %listener.local_addr()?,
            "serving /health and /api/:table"
        );
        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await;
        sweeper.abort();
        result
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        log_event(Event::ShutdownStart);
    }
}

/// Periodically drop expired rate windows
fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = limiter.sweep(now_ms());
            if removed > 0 {
                debug!(event = %Event::RateWindowsSwept, removed, remaining = limiter.len(), "rate windows swept");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::{PageFetcher, PaginationConfig};
    use crate::ratelimit::RateLimitPolicy;
    use crate::config::RealtimeConfig;
    use crate::realtime::{ChannelAddress, InMemoryBus, RealtimePublisher};
    use crate::store::MemoryRecordStore;

    fn state() -> AppState {
        let store = Arc::new(MemoryRecordStore::new());
        AppState {
            store: store.clone(),
            fetcher: PageFetcher::new(store, PaginationConfig::default()),
            limiter: Arc::new(RateLimiter::new(RateLimitPolicy::default())),
            publisher: RealtimePublisher::new(
                Arc::new(InMemoryBus::new()),
                Arc::new(ChannelAddress::default()),
            ),
            realtime: RealtimeConfig::default(),
        }
    }

    #[test]
    fn test_server_with_custom_port() {
        let config = HttpServerConfig {
            port: 8080,
            ..HttpServerConfig::default()
        };
        let server = HttpServer::new(config, state());
        assert_eq!(server.socket_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_router_builds_with_origins() {
        let config = HttpServerConfig {
            cors_origins: vec!["http://localhost:5173".to_string()],
            ..HttpServerConfig::default()
        };
        let _router = HttpServer::new(config, state()).router();
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_windows() {
        let limiter = Arc::new(RateLimiter::new(RateLimitPolicy {
            window_ms: 1,
            ..RateLimitPolicy::default()
        }));
        limiter.admit(&crate::ratelimit::RateKey::new("ip", "/api/pos"), 0);
        assert_eq!(limiter.len(), 1);

        let handle = spawn_sweeper(limiter.clone(), Duration::from_millis(5));
        for _ in 0..100 {
            if limiter.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.abort();
        assert!(limiter.is_empty());
    }

    #[tokio::test]
    async fn test_serve_until_stops_on_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = HttpServer::new(HttpServerConfig::default(), state());

        let handle = tokio::spawn(server.serve_until(listener, async move {
            let _ = stop_rx.await;
        }));
        stop_tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not stop");
        assert!(result.unwrap().is_ok());
    }
}
