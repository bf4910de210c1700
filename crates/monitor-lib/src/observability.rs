//! Observability infrastructure for the monitor
//!
//! Provides:
//! - Prometheus metrics (classification counts, alert lifecycle, notification
//!   delivery, ingest and sweep latency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::alerts::{Alert, AlertSeverity, AlertType};
use crate::models::{Classification, JudgedRecord};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Global metrics instance (registered once). `None` when registration failed.
static GLOBAL_METRICS: OnceLock<Option<MonitorMetricsInner>> = OnceLock::new();

struct MonitorMetricsInner {
    readings_classified: IntCounterVec,
    alerts_created: IntCounterVec,
    alerts_resolved: IntCounterVec,
    notifications_delivered: IntCounter,
    notifications_dropped: IntCounterVec,
    subscribers: IntGauge,
    ingest_latency_seconds: Histogram,
    sweep_latency_seconds: Histogram,
    persistence_errors: IntCounterVec,
}

impl MonitorMetricsInner {
    fn new() -> prometheus::Result<Self> {
        Ok(Self {
            readings_classified: register_int_counter_vec!(
                "meterwatch_readings_classified_total",
                "Readings judged, by classification",
                &["classification"]
            )?,

            alerts_created: register_int_counter_vec!(
                "meterwatch_alerts_created_total",
                "Alerts created, by alert type",
                &["alert_type"]
            )?,

            alerts_resolved: register_int_counter_vec!(
                "meterwatch_alerts_resolved_total",
                "Alerts resolved, by alert type and trigger",
                &["alert_type", "trigger"]
            )?,

            notifications_delivered: register_int_counter!(
                "meterwatch_notifications_delivered_total",
                "Alert notifications delivered to a subscriber"
            )?,

            notifications_dropped: register_int_counter_vec!(
                "meterwatch_notifications_dropped_total",
                "Alert notifications a subscriber did not receive",
                &["reason"]
            )?,

            subscribers: register_int_gauge!(
                "meterwatch_subscribers",
                "Live alert subscribers"
            )?,

            ingest_latency_seconds: register_histogram!(
                "meterwatch_ingest_latency_seconds",
                "Time spent classifying, storing and evaluating one reading",
                LATENCY_BUCKETS.to_vec()
            )?,

            sweep_latency_seconds: register_histogram!(
                "meterwatch_sweep_latency_seconds",
                "Time spent evaluating every active device in one sweep",
                LATENCY_BUCKETS.to_vec()
            )?,

            persistence_errors: register_int_counter_vec!(
                "meterwatch_persistence_errors_total",
                "Store operations that failed",
                &["operation"]
            )?,
        })
    }
}

/// Monitor metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the same
/// underlying metrics. If registration fails the handle records nothing.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(|| match MonitorMetricsInner::new() {
            Ok(inner) => Some(inner),
            Err(e) => {
                warn!(error = %e, "Failed to register metrics, metrics disabled");
                None
            }
        });
        Self { _private: () }
    }

    fn inner(&self) -> Option<&MonitorMetricsInner> {
        GLOBAL_METRICS.get().and_then(Option::as_ref)
    }

    pub fn inc_reading(&self, classification: Classification) {
        if let Some(inner) = self.inner() {
            inner
                .readings_classified
                .with_label_values(&[classification.as_str()])
                .inc();
        }
    }

    pub fn inc_alert_created(&self, alert_type: AlertType) {
        if let Some(inner) = self.inner() {
            inner
                .alerts_created
                .with_label_values(&[alert_type.as_str()])
                .inc();
        }
    }

    /// `trigger` is either "auto" or "manual"
    pub fn inc_alert_resolved(&self, alert_type: AlertType, trigger: &str) {
        if let Some(inner) = self.inner() {
            inner
                .alerts_resolved
                .with_label_values(&[alert_type.as_str(), trigger])
                .inc();
        }
    }

    pub fn inc_notification_delivered(&self) {
        if let Some(inner) = self.inner() {
            inner.notifications_delivered.inc();
        }
    }

    /// `reason` is either "full" or "closed"
    pub fn inc_notification_dropped(&self, reason: &str) {
        if let Some(inner) = self.inner() {
            inner.notifications_dropped.with_label_values(&[reason]).inc();
        }
    }

    pub fn set_subscribers(&self, count: usize) {
        if let Some(inner) = self.inner() {
            inner.subscribers.set(count as i64);
        }
    }

    pub fn observe_ingest_latency(&self, duration_secs: f64) {
        if let Some(inner) = self.inner() {
            inner.ingest_latency_seconds.observe(duration_secs);
        }
    }

    pub fn observe_sweep_latency(&self, duration_secs: f64) {
        if let Some(inner) = self.inner() {
            inner.sweep_latency_seconds.observe(duration_secs);
        }
    }

    pub fn inc_persistence_error(&self, operation: &str) {
        if let Some(inner) = self.inner() {
            inner
                .persistence_errors
                .with_label_values(&[operation])
                .inc();
        }
    }
}

/// Structured logger for monitor events
///
/// Emits consistently named events so log pipelines can filter on `event`.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("local")
    }
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Log a judged reading
    pub fn log_reading_classified(&self, device_code: &str, record: &JudgedRecord) {
        match record.classification {
            Classification::Valid => debug!(
                event = "reading_classified",
                node = %self.node_name,
                device_id = record.device_id,
                device_code = %device_code,
                timestamp = %record.timestamp,
                accumulated_value = record.accumulated_value,
                delta_value = ?record.delta_value,
                classification = %record.classification,
                reason = %record.reason,
                "Reading classified"
            ),
            _ => info!(
                event = "reading_classified",
                node = %self.node_name,
                device_id = record.device_id,
                device_code = %device_code,
                timestamp = %record.timestamp,
                accumulated_value = record.accumulated_value,
                delta_value = ?record.delta_value,
                classification = %record.classification,
                reason = %record.reason,
                "Reading flagged"
            ),
        }
    }

    /// Log an alert creation
    pub fn log_alert_created(&self, device_code: &str, alert: &Alert) {
        match alert.severity {
            AlertSeverity::Critical => {
                warn!(
                    event = "alert_created",
                    node = %self.node_name,
                    alert_id = alert.id,
                    device_id = alert.device_id,
                    device_code = %device_code,
                    alert_type = %alert.alert_type,
                    severity = %alert.severity,
                    message = %alert.message,
                    "Critical alert created"
                );
            }
            AlertSeverity::Warning => {
                info!(
                    event = "alert_created",
                    node = %self.node_name,
                    alert_id = alert.id,
                    device_id = alert.device_id,
                    device_code = %device_code,
                    alert_type = %alert.alert_type,
                    severity = %alert.severity,
                    message = %alert.message,
                    "Alert created"
                );
            }
        }
    }

    /// Log an alert resolution
    pub fn log_alert_resolved(&self, alert: &Alert, manual: bool) {
        info!(
            event = "alert_resolved",
            node = %self.node_name,
            alert_id = alert.id,
            device_id = alert.device_id,
            alert_type = %alert.alert_type,
            manual = manual,
            resolved_at = ?alert.resolved_at,
            "Alert resolved"
        );
    }

    /// Log the outcome of one periodic sweep
    pub fn log_sweep_completed(
        &self,
        devices: usize,
        created: usize,
        resolved: usize,
        errors: usize,
        elapsed_ms: u128,
    ) {
        if errors > 0 {
            warn!(
                event = "sweep_completed",
                node = %self.node_name,
                devices = devices,
                created = created,
                resolved = resolved,
                errors = errors,
                elapsed_ms = elapsed_ms as u64,
                "Alert sweep completed with errors"
            );
        } else {
            debug!(
                event = "sweep_completed",
                node = %self.node_name,
                devices = devices,
                created = created,
                resolved = resolved,
                elapsed_ms = elapsed_ms as u64,
                "Alert sweep completed"
            );
        }
    }

    /// Log monitor startup
    pub fn log_startup(&self, version: &str, tolerance_percentage: f64, threshold: usize) {
        info!(
            event = "monitor_started",
            node = %self.node_name,
            monitor_version = %version,
            tolerance_percentage = tolerance_percentage,
            consecutive_quarantine_threshold = threshold,
            "Meterwatch monitor started"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Meterwatch monitor shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_metrics_creation() {
        // The Prometheus registry is process global; every handle shares it.
        let metrics = MonitorMetrics::new();
        let again = MonitorMetrics::new();

        metrics.inc_reading(Classification::Quarantine);
        metrics.inc_alert_created(AlertType::FrozenValue);
        metrics.inc_alert_resolved(AlertType::FrozenValue, "auto");
        again.inc_notification_delivered();
        again.inc_notification_dropped("full");
        again.set_subscribers(2);
        again.observe_ingest_latency(0.001);
        again.observe_sweep_latency(0.01);
        again.inc_persistence_error("append record");

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "meterwatch_readings_classified_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name(), "test-node");
        assert_eq!(StructuredLogger::default().node_name(), "local");
    }
}
