//! Newline-delimited JSON reading feed
//!
//! Each line is `{"device_id", "device_code", "value", "timestamp"}`. Devices
//! are registered the first time they appear.

use chrono::Utc;
use monitor_lib::{
    health::{components, HealthRegistry},
    models::FeedLine,
    notifier::Subscription,
    pipeline::ReadingProcessor,
    store::{DeviceDirectory, MemoryDeviceDirectory},
    MonitorError,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// Counts from one feed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub lines: usize,
    pub ingested: usize,
    pub rejected: usize,
    pub failed: usize,
    pub alerts_created: usize,
}

pub struct ReadingFeed<'a> {
    processor: &'a ReadingProcessor,
    devices: &'a MemoryDeviceDirectory,
    health: &'a HealthRegistry,
}

impl<'a> ReadingFeed<'a> {
    pub fn new(
        processor: &'a ReadingProcessor,
        devices: &'a MemoryDeviceDirectory,
        health: &'a HealthRegistry,
    ) -> Self {
        Self {
            processor,
            devices,
            health,
        }
    }

    /// Consume the reader until EOF
    pub async fn run<R>(&self, reader: R) -> anyhow::Result<FeedSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut summary = FeedSummary::default();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            summary.lines += 1;
            self.ingest_line(line, &mut summary).await;
        }

        info!(
            lines = summary.lines,
            ingested = summary.ingested,
            rejected = summary.rejected,
            failed = summary.failed,
            alerts_created = summary.alerts_created,
            "Reading feed ended"
        );
        Ok(summary)
    }

    async fn ingest_line(&self, line: &str, summary: &mut FeedSummary) {
        let received_at = Utc::now();
        let parsed = FeedLine::parse(line).and_then(|feed| {
            let device = feed.device();
            feed.into_reading(received_at).map(|reading| (device, reading))
        });

        let (device, reading) = match parsed {
            Ok(parts) => parts,
            Err(e) => {
                summary.rejected += 1;
                warn!(error = %e, "Rejected feed line");
                return;
            }
        };

        match self.devices.get(device.id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(device_id = device.id, device_code = %device.code, "Registering device");
                self.devices.register(device);
            }
            Err(e) => {
                summary.failed += 1;
                warn!(error = %e, "Device lookup failed");
                return;
            }
        }

        match self.processor.ingest(reading).await {
            Ok(outcome) => {
                summary.ingested += 1;
                summary.alerts_created += outcome.created.len();
                self.health.set_healthy(components::RECORD_STORE).await;
            }
            Err(e @ MonitorError::Persistence { .. }) => {
                summary.failed += 1;
                warn!(error = %e, "Reading not stored");
                self.health
                    .set_unhealthy(components::RECORD_STORE, e.to_string())
                    .await;
            }
            Err(e) => {
                summary.rejected += 1;
                warn!(error = %e, "Reading rejected");
            }
        }
    }
}

/// Log every alert notification until the hub drops the subscription
pub async fn log_notifications(mut subscription: Subscription) {
    while let Some(notification) = subscription.recv().await {
        info!(
            event = "alert_notification",
            alert_id = notification.id,
            device_code = %notification.device_code,
            alert_type = %notification.alert_type,
            severity = %notification.severity,
            timestamp = %notification.timestamp,
            message = %notification.message,
            "Alert notification"
        );
    }
}
