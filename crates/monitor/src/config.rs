//! Monitor configuration

use anyhow::{Context, Result};
use chrono::FixedOffset;
use monitor_lib::{
    alerts::{AlertConfig, DEFAULT_CONSECUTIVE_THRESHOLD},
    classifier::{Classifier, DEFAULT_TOLERANCE_PERCENTAGE},
    notifier::DEFAULT_SUBSCRIBER_BUFFER,
    sweep::DEFAULT_SWEEP_INTERVAL_SECS,
    MonitorError,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const MAX_UTC_OFFSET_SECS: i32 = 24 * 60 * 60 - 1;

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Node name used in structured logs
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Tolerance added around the historical band, in percent of the average delta
    #[serde(default = "default_tolerance_percentage")]
    pub tolerance_percentage: f64,

    /// Quarantined records in a row that raise an alert
    #[serde(default = "default_threshold")]
    pub consecutive_quarantine_threshold: usize,

    /// Seconds between alert sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Local time offset for hour-of-day rules
    #[serde(default)]
    pub utc_offset_secs: i32,

    /// Per-subscriber notification buffer
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,

    /// JSON array of hourly delta statistics loaded at startup
    #[serde(default)]
    pub stats_file: Option<String>,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_tolerance_percentage() -> f64 {
    DEFAULT_TOLERANCE_PERCENTAGE
}

fn default_threshold() -> usize {
    DEFAULT_CONSECUTIVE_THRESHOLD
}

fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_notification_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}

impl MonitorConfig {
    /// Load configuration from `METERWATCH_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix("METERWATCH"))
    }

    /// Load configuration from an explicit variable map, as if it were the environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix("METERWATCH").source(Some(vars)))
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()
            .context("failed to read monitor configuration")?;

        let parsed: MonitorConfig = config
            .try_deserialize()
            .context("failed to parse monitor configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject values the monitor cannot run with
    pub fn validate(&self) -> Result<(), MonitorError> {
        if !self.tolerance_percentage.is_finite() || self.tolerance_percentage < 0.0 {
            return Err(MonitorError::InvalidConfig(format!(
                "tolerance_percentage must be a non-negative number, got {}",
                self.tolerance_percentage
            )));
        }
        if self.consecutive_quarantine_threshold == 0 {
            return Err(MonitorError::InvalidConfig(
                "consecutive_quarantine_threshold must be at least 1".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(MonitorError::InvalidConfig(
                "sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        self.utc_offset()?;
        Ok(())
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, MonitorError> {
        if self.utc_offset_secs.abs() > MAX_UTC_OFFSET_SECS {
            return Err(MonitorError::InvalidConfig(format!(
                "utc_offset_secs out of range: {}",
                self.utc_offset_secs
            )));
        }
        FixedOffset::east_opt(self.utc_offset_secs).ok_or_else(|| {
            MonitorError::InvalidConfig(format!(
                "utc_offset_secs out of range: {}",
                self.utc_offset_secs
            ))
        })
    }

    pub fn classifier(&self) -> Result<Classifier, MonitorError> {
        Ok(Classifier::new(self.tolerance_percentage)?.with_offset(self.utc_offset()?))
    }

    pub fn alert_config(&self) -> Result<AlertConfig, MonitorError> {
        Ok(AlertConfig {
            consecutive_quarantine_threshold: self.consecutive_quarantine_threshold,
            utc_offset: self.utc_offset()?,
        })
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
