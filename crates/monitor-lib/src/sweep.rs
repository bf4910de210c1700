//! Periodic alert sweep
//!
//! Re-evaluates every active device on a fixed interval so time-based
//! conditions (windows aging out, counters that stay frozen) are noticed even
//! when no new reading arrives.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::alerts::AlertEngine;
use crate::error::{MonitorError, Result};
use crate::health::{components, HealthRegistry};
use crate::notifier::Notifier;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::pipeline::publish_created;
use crate::store::DeviceDirectory;

/// Default seconds between sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Totals from one pass over the active devices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub devices: usize,
    pub created: usize,
    pub resolved: usize,
    pub errors: usize,
}

pub struct SweepLoop {
    engine: Arc<AlertEngine>,
    devices: Arc<dyn DeviceDirectory>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl SweepLoop {
    pub fn new(
        engine: Arc<AlertEngine>,
        devices: Arc<dyn DeviceDirectory>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            devices,
            notifier,
            interval,
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::default(),
            health: None,
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Report sweep health to the registry after every pass
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting alert sweep loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = self.sweep_once().await;
                    if let Err(e) = &result {
                        warn!(error = %e, "Alert sweep failed");
                    }
                    self.report_health(&result).await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down alert sweep loop");
                    break;
                }
            }
        }
    }

    /// Evaluate every active device once. Only a failure to list devices is
    /// returned; per-device failures are logged and counted.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let start = Instant::now();
        let devices = self
            .devices
            .active()
            .await
            .map_err(|e| {
                self.metrics.inc_persistence_error("list active devices");
                MonitorError::persistence("list active devices")(e)
            })?;

        let mut report = SweepReport {
            devices: devices.len(),
            ..SweepReport::default()
        };

        for device in &devices {
            match self
                .engine
                .evaluate_device(device.id, &device.code, Utc::now())
                .await
            {
                Ok(outcome) => {
                    report.created += outcome.created.len();
                    report.resolved += outcome.resolved.len();
                    publish_created(self.notifier.as_ref(), &device.code, &outcome.created);
                }
                Err(e) => {
                    report.errors += 1;
                    warn!(
                        device_id = device.id,
                        device_code = %device.code,
                        error = %e,
                        "Failed to evaluate device"
                    );
                }
            }
        }

        let elapsed = start.elapsed();
        self.metrics.observe_sweep_latency(elapsed.as_secs_f64());
        self.logger.log_sweep_completed(
            report.devices,
            report.created,
            report.resolved,
            report.errors,
            elapsed.as_millis(),
        );

        Ok(report)
    }

    async fn report_health(&self, result: &Result<SweepReport>) {
        let Some(health) = &self.health else {
            return;
        };
        match result {
            Ok(report) if report.errors == 0 => health.set_healthy(components::SWEEP).await,
            Ok(report) => {
                health
                    .set_degraded(
                        components::SWEEP,
                        format!("{} of {} devices failed evaluation", report.errors, report.devices),
                    )
                    .await
            }
            Err(e) => health.set_unhealthy(components::SWEEP, e.to_string()).await,
        }
    }
}
