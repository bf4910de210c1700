//! Meterwatch monitor service
//!
//! Wires the in-memory stores, the reading pipeline, the alert sweep and the
//! notification hub into one runtime, and serves probes and metrics.

pub mod api;
pub mod config;
pub mod feed;

use std::sync::Arc;

use anyhow::{Context, Result};
use monitor_lib::{
    health::HealthRegistry,
    notifier::SubscriberHub,
    observability::{MonitorMetrics, StructuredLogger},
    pipeline::ReadingProcessor,
    store::{MemoryAlertStore, MemoryDeviceDirectory, MemoryRecordStore, MemoryStatsProvider},
    sweep::SweepLoop,
    AlertEngine, DeviceLocks,
};

use crate::config::MonitorConfig;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Every long-lived component of a running monitor
pub struct Monitor {
    pub config: MonitorConfig,
    pub devices: Arc<MemoryDeviceDirectory>,
    pub records: Arc<MemoryRecordStore>,
    pub alerts: Arc<MemoryAlertStore>,
    pub stats: Arc<MemoryStatsProvider>,
    pub engine: Arc<AlertEngine>,
    pub hub: Arc<SubscriberHub>,
    pub processor: ReadingProcessor,
    pub health: HealthRegistry,
    pub logger: StructuredLogger,
}

impl Monitor {
    /// Build the runtime and register its health components
    pub async fn build(config: MonitorConfig) -> Result<Self> {
        let logger = StructuredLogger::new(&config.node_name);

        let devices = Arc::new(MemoryDeviceDirectory::new());
        let records = Arc::new(MemoryRecordStore::new());
        let alerts = Arc::new(MemoryAlertStore::new());
        let stats = Arc::new(match &config.stats_file {
            Some(path) => load_stats(path)?,
            None => MemoryStatsProvider::new(),
        });
        let hub = Arc::new(SubscriberHub::new(config.notification_buffer));

        let engine = Arc::new(
            AlertEngine::new(
                records.clone(),
                alerts.clone(),
                DeviceLocks::new(),
                config.alert_config()?,
            )?
            .with_logger(logger.clone()),
        );

        let processor = ReadingProcessor::new(
            config.classifier()?,
            devices.clone(),
            records.clone(),
            stats.clone(),
            engine.clone(),
            hub.clone(),
        )
        .with_logger(logger.clone());

        let health = HealthRegistry::new();

        Ok(Self {
            config,
            devices,
            records,
            alerts,
            stats,
            engine,
            hub,
            processor,
            health,
            logger,
        })
    }

    pub fn sweep_loop(&self) -> SweepLoop {
        SweepLoop::new(
            self.engine.clone(),
            self.devices.clone(),
            self.hub.clone(),
            self.config.sweep_interval(),
        )
        .with_logger(self.logger.clone())
        .with_health(self.health.clone())
    }

    pub fn app_state(&self) -> Arc<api::AppState> {
        Arc::new(api::AppState::new(
            self.health.clone(),
            MonitorMetrics::new(),
            self.hub.clone(),
            self.config.node_name.clone(),
        ))
    }

    pub fn feed(&self) -> feed::ReadingFeed<'_> {
        feed::ReadingFeed::new(&self.processor, &self.devices, &self.health)
    }
}

fn load_stats(path: &str) -> Result<MemoryStatsProvider> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read stats file {}", path))?;
    let stats = MemoryStatsProvider::from_json(&json)
        .with_context(|| format!("failed to load stats file {}", path))?;
    tracing::info!(path = %path, rows = stats.len(), "Loaded hourly stats");
    Ok(stats)
}
