//! Integration tests for the stdin reading feed

use chrono::{Duration, Utc};
use meterwatch::{config::MonitorConfig, Monitor};
use monitor_lib::{
    alerts::AlertType,
    health::{components, ComponentStatus},
    store::{DeviceDirectory, RecordStore},
};
use std::collections::HashMap;

async fn monitor() -> Monitor {
    Monitor::build(MonitorConfig::from_vars(HashMap::new()).unwrap())
        .await
        .unwrap()
}

fn line(device_id: i64, code: &str, value: f64, minutes_ago: i64) -> String {
    let ts = (Utc::now() - Duration::minutes(minutes_ago)).to_rfc3339();
    format!(
        r#"{{"device_id": {}, "device_code": "{}", "value": {}, "timestamp": "{}"}}"#,
        device_id, code, value, ts
    )
}

#[tokio::test]
async fn test_feed_registers_devices_and_raises_alerts() {
    let monitor = monitor().await;
    let mut subscription = monitor.hub.subscribe();

    let input = [
        line(1, "INV-001", 1000.0, 30),
        line(1, "INV-001", 1040.0, 20),
        line(1, "INV-001", 1030.0, 10),
        line(2, "INV-002", 500.0, 5),
    ]
    .join("\n");

    let summary = monitor.feed().run(input.as_bytes()).await.unwrap();

    assert_eq!(summary.lines, 4);
    assert_eq!(summary.ingested, 4);
    assert_eq!(summary.alerts_created, 1);
    assert_eq!(monitor.devices.active().await.unwrap().len(), 2);
    assert_eq!(monitor.records.latest_n(1, 10).await.unwrap().len(), 3);

    let notification = subscription.try_recv().unwrap();
    assert_eq!(notification.alert_type, AlertType::NegativeDelta);
    assert_eq!(notification.device_code, "INV-001");
}

#[tokio::test]
async fn test_feed_skips_malformed_lines() {
    let monitor = monitor().await;

    let input = format!(
        "not json\n\n{}\n{{\"device_id\": 3, \"value\": \"high\"}}\n",
        line(3, "INV-003", 10.0, 1)
    );
    let summary = monitor.feed().run(input.as_bytes()).await.unwrap();

    assert_eq!(summary.lines, 3);
    assert_eq!(summary.ingested, 1);
    assert_eq!(summary.rejected, 2);
    assert_eq!(
        monitor.health.status(components::RECORD_STORE).await,
        ComponentStatus::Healthy
    );
}
