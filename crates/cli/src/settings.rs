//! Classification settings shared by every subcommand

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use clap::Args;
use monitor_lib::{
    alerts::{AlertConfig, DEFAULT_CONSECUTIVE_THRESHOLD},
    classifier::{Classifier, DEFAULT_TOLERANCE_PERCENTAGE},
    models::parse_timestamp,
};

use crate::error::CliError;

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Tolerance around the historical band, in percent of the average delta
    #[arg(long, global = true, env = "MWCTL_TOLERANCE", default_value_t = DEFAULT_TOLERANCE_PERCENTAGE)]
    pub tolerance: f64,

    /// Quarantined records in a row that raise an alert
    #[arg(long, global = true, env = "MWCTL_THRESHOLD", default_value_t = DEFAULT_CONSECUTIVE_THRESHOLD)]
    pub threshold: usize,

    /// Local UTC offset in seconds used for hour-of-day rules
    #[arg(
        long,
        global = true,
        env = "MWCTL_UTC_OFFSET_SECS",
        default_value_t = 0,
        allow_hyphen_values = true
    )]
    pub utc_offset_secs: i32,
}

impl Settings {
    pub fn offset(&self) -> Result<FixedOffset, CliError> {
        FixedOffset::east_opt(self.utc_offset_secs).ok_or(CliError::InvalidOffset(self.utc_offset_secs))
    }

    pub fn classifier(&self) -> Result<Classifier> {
        Ok(Classifier::new(self.tolerance)?.with_offset(self.offset()?))
    }

    pub fn alert_config(&self) -> Result<AlertConfig> {
        Ok(AlertConfig {
            consecutive_quarantine_threshold: self.threshold,
            utc_offset: self.offset()?,
        })
    }
}

/// Parse a user supplied timestamp
pub fn timestamp_arg(raw: &str) -> Result<DateTime<Utc>, CliError> {
    parse_timestamp(raw).ok_or_else(|| CliError::InvalidTimestamp(raw.to_string()))
}
