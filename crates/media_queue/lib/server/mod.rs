pub mod monitoring;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use monitoring::{LiveFeedMetrics, QueueMetrics, LIVE_FEED_METRICS, QUEUE_METRICS};
use prometheus_client::encoding::text::encode;
use tracing::{error, info};

use crate::state::AppState;

async fn health_handler() -> &'static str {
    "ok"
}

async fn expose_metrics(State(state): State<Arc<AppState>>) -> Result<String, StatusCode> {
    let mut buffer = String::new();
    let registry = state.registry.read().await;
    encode(&mut buffer, &registry).map_err(|err| {
        error!(event = "metrics_encode_failed", error = %err, "could not encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(buffer)
}

/// Registers the queue and live-feed metric families in the shared registry. Call once per
/// process: the metric cells are global.
pub async fn register_metrics(state: &AppState) {
    let mut registry = state.registry.write().await;

    QUEUE_METRICS
        .get_or_init(|| async { QueueMetrics::register(&mut registry, "queue") })
        .await;
    LIVE_FEED_METRICS
        .get_or_init(|| async { LiveFeedMetrics::register(&mut registry, "live_feed") })
        .await;
    monitoring::register_build_info_metric(&mut registry, "media_queue");
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(expose_metrics))
        .with_state(state)
}

/// Serves `/health` and `/metrics` until the shared shutdown token is cancelled.
pub async fn setup_server_with_addr(
    state: Arc<AppState>,
    addr: SocketAddr,
) -> Result<tokio::task::JoinHandle<()>, std::io::Error> {
    let shutdown_token = state.shutdown_token.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(event = "metrics_server_listening", addr = %local_addr, "metrics server listening");

    Ok(tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            })
            .await;
        if let Err(err) = result {
            error!(event = "metrics_server_failed", error = %err, "metrics server failed");
        }
    }))
}
