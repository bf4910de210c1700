//! Integration tests for the monitor HTTP endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use meterwatch::{api::create_router, config::MonitorConfig, Monitor};
use monitor_lib::{health::components, models::Classification};
use std::collections::HashMap;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Monitor) {
    let config = MonitorConfig::from_vars(HashMap::new()).unwrap();
    let monitor = Monitor::build(config).await.unwrap();
    let router = create_router(monitor.app_state());
    (router, monitor)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_lists_monitor_components() {
    let (app, _monitor) = setup_test_app().await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    for component in components::ALL {
        assert_eq!(health["components"][component.as_str()]["status"], "healthy");
    }
}

#[tokio::test]
async fn test_healthz_returns_ok_when_sweep_degraded() {
    let (app, monitor) = setup_test_app().await;

    monitor
        .health
        .set_degraded(components::SWEEP, "1 of 4 devices failed evaluation")
        .await;

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_store_unhealthy() {
    let (app, monitor) = setup_test_app().await;

    monitor
        .health
        .set_unhealthy(components::RECORD_STORE, "backend unavailable")
        .await;

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
    assert_eq!(
        health["components"]["record_store"]["message"],
        "backend unavailable"
    );
}

#[tokio::test]
async fn test_readyz_follows_readiness_flag() {
    let (app, monitor) = setup_test_app().await;

    let (status, readiness) = get_json(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    monitor.health.set_ready(true).await;
    let (status, readiness) = get_json(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);

    monitor
        .health
        .set_unhealthy(components::ALERT_ENGINE, "Failed")
        .await;
    let (status, _) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_status_reports_subscribers() {
    let (app, monitor) = setup_test_app().await;
    let _first = monitor.hub.subscribe();
    let _second = monitor.hub.subscribe();

    let (status, body) = get_json(app, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscribers"], 2);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_monitor_metrics() {
    let (app, monitor) = setup_test_app().await;
    let state = monitor.app_state();

    state.metrics.inc_reading(Classification::Valid);
    state.metrics.observe_ingest_latency(0.001);
    state.metrics.observe_ingest_latency(0.005);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("meterwatch_readings_classified_total"));
    assert!(metrics_text.contains("meterwatch_ingest_latency_seconds_bucket"));
    assert!(metrics_text.contains("meterwatch_ingest_latency_seconds_sum"));
    assert!(metrics_text.contains("meterwatch_ingest_latency_seconds_count"));
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let (app, _monitor) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
