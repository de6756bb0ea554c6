//! CLI command implementations
//!
//! `serve` boots the HTTP surface over an in-memory record store and an
//! in-process realtime bus. The `queue` commands open the durable queue
//! file named in the config and act on it directly.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::config::SyncConfig;
use crate::http_server::{AppState, HttpServer, HttpServerConfig};
use crate::observability::{init_logging, Event, ObservabilityError};
use crate::pagination::PageFetcher;
use crate::queue::{FileQueueStore, FlushReport, HttpTransport, WriteQueue};
use crate::ratelimit::RateLimiter;
use crate::realtime::{InMemoryBus, RealtimePublisher};
use crate::store::MemoryRecordStore;

use super::args::{Cli, Command, QueueAction};
use super::errors::{CliError, CliResult};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, port } => serve(&config, port),
        Command::Queue { config, action } => queue(&config, action),
    }
}

fn load_config(path: &Path) -> CliResult<SyncConfig> {
    let config = SyncConfig::load(path)?;
    match init_logging(&config.log) {
        Ok(()) | Err(ObservabilityError::AlreadyInitialized(_)) => {}
        Err(e) => return Err(e.into()),
    }
    info!(event = %Event::ConfigLoaded, path = %path.display(), "configuration loaded");
    Ok(config)
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))
}

/// Shared handler state for a config
pub fn build_state(config: &SyncConfig) -> AppState {
    let store = Arc::new(MemoryRecordStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let resolver = Arc::new(config.realtime.resolver());

    AppState {
        store: store.clone(),
        fetcher: PageFetcher::new(store, config.pagination.clone()),
        limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
        publisher: RealtimePublisher::new(bus, resolver),
        realtime: config.realtime.clone(),
    }
}

/// Serve the HTTP surface until the process exits
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.http.port = port;
    }

    let state = build_state(&config);
    let server = HttpServer::new(config.http.clone(), state);

    let rt = runtime()?;
    rt.block_on(async {
        server
            .start()
            .await
            .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
    })
}

/// Local address of the configured server, for relative mutation URLs
fn default_target(http: &HttpServerConfig) -> String {
    let host = match http.host.as_str() {
        "0.0.0.0" | "::" | "" => "127.0.0.1",
        other => other,
    };
    format!("http://{}:{}", host, http.port)
}

/// Act on the durable write queue
pub fn queue(config_path: &Path, action: QueueAction) -> CliResult<()> {
    let config = load_config(config_path)?;
    let rt = runtime()?;
    rt.block_on(run_queue_action(&config, action))
}

async fn run_queue_action(config: &SyncConfig, action: QueueAction) -> CliResult<()> {
    let target = match &action {
        QueueAction::Flush {
            target: Some(target),
        } => target.clone(),
        _ => default_target(&config.http),
    };
    let transport = HttpTransport::new(reqwest::Client::new()).with_base_url(target);
    let store = FileQueueStore::new(config.queue.path.clone());
    let queue = WriteQueue::open(Arc::new(store), Arc::new(transport), config.queue.clone())?;

    let result = match action {
        QueueAction::List => {
            let entries = queue.list().await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
        QueueAction::Flush { .. } => {
            let report = queue.flush().await?;
            println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
            match report.failed.len() {
                0 => Ok(()),
                dropped => Err(CliError::RetryExceeded { dropped }),
            }
        }
        QueueAction::Remove { id } => {
            if queue.remove(id.clone()).await? {
                println!("{}", json!({ "removed": id }));
                Ok(())
            } else {
                Err(CliError::NotFound(id))
            }
        }
        QueueAction::Clear => {
            let cleared = queue.clear().await?;
            println!("{}", json!({ "cleared": cleared }));
            Ok(())
        }
    };

    queue.shutdown().await;
    result
}

fn report_json(report: &FlushReport) -> serde_json::Value {
    json!({
        "succeeded": report.succeeded,
        "retried": report.retried,
        "failed": report
            .failed
            .iter()
            .zip(report.errors())
            .map(|(f, err)| json!({
                "id": f.mutation.id,
                "attempts": f.attempts(),
                "kind": err.kind().as_str(),
                "error": err.to_string(),
            }))
            .collect::<Vec<_>>(),
        "skipped": report.skipped,
        "remaining": report.remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{HttpMethod, QueueStore, QueuedMutation};
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> SyncConfig {
        let mut config = SyncConfig::default();
        config.queue.path = dir.path().join("queue.json");
        config
    }

    fn seed(config: &SyncConfig, ids: &[&str]) {
        let entries: Vec<QueuedMutation> = ids
            .iter()
            .map(|id| {
                QueuedMutation::builder(HttpMethod::Post, "/api/pos")
                    .with_id(*id)
                    .into_mutation()
                    .unwrap()
            })
            .collect();
        FileQueueStore::new(config.queue.path.clone())
            .save(&entries)
            .unwrap();
    }

    #[test]
    fn test_default_target() {
        let mut http = HttpServerConfig::default();
        assert_eq!(default_target(&http), "http://127.0.0.1:54321");
        http.host = "sync.internal".into();
        http.port = 8080;
        assert_eq!(default_target(&http), "http://sync.internal:8080");
    }

    #[tokio::test]
    async fn test_queue_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        seed(&config, &["a", "b", "c"]);

        run_queue_action(&config, QueueAction::Remove { id: "b".into() })
            .await
            .unwrap();
        let left = FileQueueStore::new(config.queue.path.clone()).load().unwrap();
        assert_eq!(
            left.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );

        let missing = run_queue_action(&config, QueueAction::Remove { id: "b".into() }).await;
        assert!(matches!(missing, Err(CliError::NotFound(_))));

        run_queue_action(&config, QueueAction::Clear).await.unwrap();
        let left = FileQueueStore::new(config.queue.path.clone()).load().unwrap();
        assert!(left.is_empty());
    }

    #[tokio::test]
    async fn test_flush_reports_dropped_mutations() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut last_try = QueuedMutation::builder(HttpMethod::Post, "/api/pos")
            .with_id("doomed")
            .into_mutation()
            .unwrap();
        last_try.retries = 4;
        FileQueueStore::new(config.queue.path.clone())
            .save(&[last_try])
            .unwrap();

        // nothing listens on port 1
        let result = run_queue_action(
            &config,
            QueueAction::Flush {
                target: Some("http://127.0.0.1:1".into()),
            },
        )
        .await;

        assert!(matches!(result, Err(CliError::RetryExceeded { dropped: 1 })));
        assert_eq!(result.unwrap_err().code().code(), "TENANTSYNC_CLI_RETRY_EXCEEDED");
        let left = FileQueueStore::new(config.queue.path.clone()).load().unwrap();
        assert!(left.is_empty());
    }

    #[test]
    fn test_report_json_names_retry_exceeded() {
        use crate::queue::{FailedMutation, TransportError};

        let mut mutation = QueuedMutation::builder(HttpMethod::Patch, "/api/pos/1")
            .with_id("m-1")
            .into_mutation()
            .unwrap();
        mutation.retries = 5;
        let report = FlushReport {
            failed: vec![FailedMutation {
                mutation,
                last_error: TransportError::Status(502),
            }],
            ..FlushReport::default()
        };

        let value = report_json(&report);
        assert_eq!(value["failed"][0]["kind"], "RETRY_EXCEEDED");
        assert_eq!(value["failed"][0]["attempts"], 5);
    }

    #[tokio::test]
    async fn test_build_state_serves_health() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use tower::ServiceExt;

        let config = SyncConfig::default();
        let router = HttpServer::new(config.http.clone(), build_state(&config)).router();
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
