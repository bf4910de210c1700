//! Alert detectors
//!
//! Each detector inspects a slice of judged records and reports the evidence
//! for a new alert. Detectors do no I/O and know nothing about dedup; the
//! engine fetches the records and checks for existing alerts.

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};

use super::types::{AlertDetails, AlertType};
use crate::classifier::local_hour;
use crate::models::{Classification, JudgedRecord};

/// Default number of consecutive quarantined records that raise an alert
pub const DEFAULT_CONSECUTIVE_THRESHOLD: usize = 3;

/// Trailing window for negative delta detection and resolution
pub const NEGATIVE_DELTA_WINDOW_MINUTES: i64 = 60;

/// Most recent negative deltas kept as evidence
const NEGATIVE_DELTA_MAX_SAMPLES: usize = 5;

/// Records that must share one value before a frozen alert
pub const FROZEN_SAMPLE_SIZE: usize = 5;

/// Minimum span covered by the frozen sample
const FROZEN_MIN_DURATION_MINUTES: i64 = 60;

/// Local hours (inclusive) in which a flat reading is suspicious
const GENERATION_START_HOUR: u8 = 7;
const GENERATION_END_HOUR: u8 = 17;

/// Human readable alert message for a device
pub fn alert_message(device_code: &str, details: &AlertDetails) -> String {
    match details {
        AlertDetails::ConsecutiveQuarantine {
            consecutive_count, ..
        } => format!(
            "Device {}: {} consecutive quarantined records",
            device_code, consecutive_count
        ),
        AlertDetails::NegativeDelta { .. } => {
            format!("Device {}: negative delta detected", device_code)
        }
        AlertDetails::FrozenValue { duration_hours, .. } => format!(
            "Device {}: value frozen for {:.1} hours",
            device_code, duration_hours
        ),
    }
}

/// Raises an alert when the latest `threshold` records are all quarantined
#[derive(Debug, Clone, Copy)]
pub struct ConsecutiveQuarantineDetector {
    pub threshold: usize,
}

impl ConsecutiveQuarantineDetector {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn alert_type(&self) -> AlertType {
        AlertType::ConsecutiveQuarantine
    }

    /// `latest` must be newest first. Only the first `threshold` entries are
    /// considered.
    pub fn detect(&self, latest: &[JudgedRecord]) -> Option<AlertDetails> {
        if self.threshold == 0 || latest.len() < self.threshold {
            return None;
        }

        let window = &latest[..self.threshold];
        if !window
            .iter()
            .all(|r| r.classification == Classification::Quarantine)
        {
            return None;
        }

        Some(AlertDetails::ConsecutiveQuarantine {
            consecutive_count: window.len(),
            timestamps: window.iter().map(|r| r.timestamp).collect(),
            reasons: window.iter().map(|r| r.reason.clone()).collect(),
        })
    }
}

impl Default for ConsecutiveQuarantineDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CONSECUTIVE_THRESHOLD)
    }
}

/// Raises an alert when any negative delta falls within the trailing window
#[derive(Debug, Clone, Copy)]
pub struct NegativeDeltaDetector {
    pub window: Duration,
    pub max_samples: usize,
}

impl NegativeDeltaDetector {
    pub fn alert_type(&self) -> AlertType {
        AlertType::NegativeDelta
    }

    /// Start of the trailing window ending at `now`
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    /// Negative-delta records within the window, newest first
    pub fn offending<'a>(
        &self,
        records: &'a [JudgedRecord],
        now: DateTime<Utc>,
    ) -> Vec<&'a JudgedRecord> {
        let since = self.window_start(now);
        let mut hits: Vec<&JudgedRecord> = records
            .iter()
            .filter(|r| r.timestamp >= since && r.is_negative_delta())
            .collect();
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        hits
    }

    /// `records` may be in any order and may extend past the window
    pub fn detect(&self, records: &[JudgedRecord], now: DateTime<Utc>) -> Option<AlertDetails> {
        let hits = self.offending(records, now);
        if hits.is_empty() {
            return None;
        }

        let recent = &hits[..hits.len().min(self.max_samples)];
        Some(AlertDetails::NegativeDelta {
            delta_values: recent.iter().filter_map(|r| r.delta_value).collect(),
            timestamps: recent.iter().map(|r| r.timestamp).collect(),
        })
    }
}

impl Default for NegativeDeltaDetector {
    fn default() -> Self {
        Self {
            window: Duration::minutes(NEGATIVE_DELTA_WINDOW_MINUTES),
            max_samples: NEGATIVE_DELTA_MAX_SAMPLES,
        }
    }
}

/// Raises an alert when the counter stops moving during the generation window
#[derive(Debug, Clone, Copy)]
pub struct FrozenValueDetector {
    pub sample_size: usize,
    pub min_duration: Duration,
    pub offset: FixedOffset,
}

impl FrozenValueDetector {
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    pub fn alert_type(&self) -> AlertType {
        AlertType::FrozenValue
    }

    /// `latest` must be newest first. Only the first `sample_size` entries are
    /// considered.
    pub fn detect(&self, latest: &[JudgedRecord]) -> Option<AlertDetails> {
        if self.sample_size == 0 || latest.len() < self.sample_size {
            return None;
        }

        let window = &latest[..self.sample_size];
        let newest = &window[0];
        let oldest = &window[window.len() - 1];

        if window
            .iter()
            .any(|r| r.accumulated_value != newest.accumulated_value)
        {
            return None;
        }

        let span = newest.timestamp - oldest.timestamp;
        if span < self.min_duration {
            return None;
        }

        let hour = local_hour(newest.timestamp, self.offset);
        if !(GENERATION_START_HOUR..=GENERATION_END_HOUR).contains(&hour) {
            return None;
        }

        Some(AlertDetails::FrozenValue {
            frozen_value: newest.accumulated_value,
            duration_hours: span.num_seconds() as f64 / 3600.0,
            start_time: oldest.timestamp,
            end_time: newest.timestamp,
        })
    }
}

impl Default for FrozenValueDetector {
    fn default() -> Self {
        Self {
            sample_size: FROZEN_SAMPLE_SIZE,
            min_duration: Duration::minutes(FROZEN_MIN_DURATION_MINUTES),
            offset: Utc.fix(),
        }
    }
}
