//! HTTP endpoints for probes, Prometheus scraping and a runtime summary

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use monitor_lib::{
    health::{ComponentStatus, HealthRegistry},
    notifier::SubscriberHub,
    observability::MonitorMetrics,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: MonitorMetrics,
    pub hub: Arc<SubscriberHub>,
    pub node_name: String,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: MonitorMetrics,
        hub: Arc<SubscriberHub>,
        node_name: impl Into<String>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            hub,
            node_name: node_name.into(),
        }
    }
}

/// Body of `GET /status`
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub node: String,
    pub status: ComponentStatus,
    pub subscribers: usize,
}

/// 200 while at least degraded, 503 once a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let subscribers = state.hub.subscriber_count();
    state.metrics.set_subscribers(subscribers);

    Json(StatusResponse {
        version: crate::VERSION,
        node: state.node_name.clone(),
        status: state.health_registry.health().await.status,
        subscribers,
    })
}

/// Prometheus text exposition of the global registry
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    let status_code = match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            buffer.clear();
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status_code,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until the shutdown signal fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
