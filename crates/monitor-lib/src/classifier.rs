//! Reading classification
//!
//! Judges each new cumulative reading against the device's previous judged
//! record and its historical per-hour delta statistics. Rules are evaluated
//! in precedence order and the first match wins:
//! 1. first record for the device
//! 2. negative delta (always quarantined)
//! 3. unchanged value for an hour or more (night vs generation window)
//! 4. comparison with historical bounds, or a permissive no-history check

use chrono::{DateTime, Duration, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MonitorError, Result};
use crate::models::{Classification, HourlyStats, JudgedRecord, Reading};

/// Default tolerance, as a percentage of the historical average delta
pub const DEFAULT_TOLERANCE_PERCENTAGE: f64 = 10.0;

/// Standard deviation used when history has none, as a fraction of the average
const STD_FALLBACK_RATIO: f64 = 0.1;

/// Width of the normal band in standard deviations
const SIGMA_BAND: f64 = 2.0;

/// Deltas beyond `upper * SPIKE_FACTOR` are quarantined rather than uncertain
const SPIKE_FACTOR: f64 = 1.5;

/// Upper bound (exclusive) for a plausible delta when no history exists
const NO_HISTORY_MAX_DELTA: f64 = 100.0;

/// Local hours outside [NIGHT_END_HOUR, NIGHT_START_HOUR) are night
const NIGHT_END_HOUR: u32 = 6;
const NIGHT_START_HOUR: u32 = 19;

/// Outcome of classifying one reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgement {
    pub classification: Classification,
    pub reason: String,
    pub delta: Option<f64>,
}

impl Judgement {
    fn new(classification: Classification, reason: impl Into<String>, delta: f64) -> Self {
        Self {
            classification,
            reason: reason.into(),
            delta: Some(delta),
        }
    }

    /// Attach the judgement to the reading it was computed for
    pub fn into_record(self, reading: &Reading) -> JudgedRecord {
        JudgedRecord {
            device_id: reading.device_id,
            timestamp: reading.timestamp,
            accumulated_value: reading.accumulated_value,
            delta_value: self.delta,
            classification: self.classification,
            reason: self.reason,
        }
    }
}

/// Hour of day of `timestamp` in the given local offset
pub fn local_hour(timestamp: DateTime<Utc>, offset: FixedOffset) -> u8 {
    timestamp.with_timezone(&offset).hour() as u8
}

fn is_nighttime(hour: u8) -> bool {
    let hour = u32::from(hour);
    hour < NIGHT_END_HOUR || hour >= NIGHT_START_HOUR
}

/// Classifier configured with a tolerance and the local offset for hour-of-day
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    tolerance: f64,
    offset: FixedOffset,
}

impl Classifier {
    /// Create a classifier from a tolerance percentage (10 means 10%)
    pub fn new(tolerance_percentage: f64) -> Result<Self> {
        if !tolerance_percentage.is_finite() || tolerance_percentage < 0.0 {
            return Err(MonitorError::InvalidConfig(format!(
                "tolerance_percentage must be a non-negative number, got {}",
                tolerance_percentage
            )));
        }
        Ok(Self {
            tolerance: tolerance_percentage / 100.0,
            offset: utc(),
        })
    }

    /// Evaluate hours of day in a fixed local offset instead of UTC
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Tolerance as a fraction
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Hour of day used for the stats lookup of a reading
    pub fn hour_of(&self, timestamp: DateTime<Utc>) -> u8 {
        local_hour(timestamp, self.offset)
    }

    pub fn classify(
        &self,
        reading: &Reading,
        previous: Option<&JudgedRecord>,
        stats: Option<&HourlyStats>,
    ) -> Judgement {
        classify(reading, previous, stats, self.tolerance, self.offset)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE_PERCENTAGE / 100.0,
            offset: utc(),
        }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Classify one reading.
///
/// # Arguments
/// * `previous` - The device's most recent judged record before this reading
/// * `stats` - Historical stats for the reading's local hour, if any
/// * `tolerance` - Fraction of the average delta widening both bounds
/// * `offset` - Local offset used to derive hour of day
pub fn classify(
    reading: &Reading,
    previous: Option<&JudgedRecord>,
    stats: Option<&HourlyStats>,
    tolerance: f64,
    offset: FixedOffset,
) -> Judgement {
    let previous = previous.filter(|prev| {
        let same_device = prev.device_id == reading.device_id;
        if !same_device {
            warn!(
                device_id = reading.device_id,
                previous_device_id = prev.device_id,
                "Ignoring previous record from another device"
            );
        }
        same_device
    });

    let Some(previous) = previous else {
        return if reading.accumulated_value >= 0.0 {
            Judgement::new(Classification::Valid, "first record for device", 0.0)
        } else {
            Judgement::new(Classification::Quarantine, "negative initial value", 0.0)
        };
    };

    let delta = reading.accumulated_value - previous.accumulated_value;

    if delta < 0.0 {
        return Judgement::new(
            Classification::Quarantine,
            "negative delta - possible device fault",
            delta,
        );
    }

    let elapsed = reading.timestamp - previous.timestamp;
    if delta == 0.0 && elapsed >= Duration::hours(1) {
        return if is_nighttime(local_hour(reading.timestamp, offset)) {
            Judgement::new(Classification::Valid, "no nighttime generation expected", delta)
        } else {
            Judgement::new(
                Classification::Quarantine,
                "frozen value during generation window",
                delta,
            )
        };
    }

    match stats.and_then(|s| Bounds::new(s, tolerance)) {
        Some(bounds) => bounds.judge(delta),
        None if delta > 0.0 && delta < NO_HISTORY_MAX_DELTA => {
            Judgement::new(Classification::Valid, "no history - reasonable value", delta)
        }
        None => Judgement::new(
            Classification::Uncertain,
            "no history - requires review",
            delta,
        ),
    }
}

/// Acceptance band derived from historical stats
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub expected: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    /// Build bounds from stats; a missing or zero average means no usable history,
    /// and a missing or zero deviation falls back to a fraction of the average.
    pub fn new(stats: &HourlyStats, tolerance: f64) -> Option<Self> {
        let avg = stats.avg_delta.filter(|avg| *avg != 0.0)?;
        let std = stats
            .std_delta
            .filter(|std| *std != 0.0)
            .unwrap_or(avg * STD_FALLBACK_RATIO);
        let margin = SIGMA_BAND * std + avg * tolerance;
        Some(Self {
            expected: avg,
            lower: avg - margin,
            upper: avg + margin,
        })
    }

    pub fn contains(&self, delta: f64) -> bool {
        self.lower <= delta && delta <= self.upper
    }

    fn judge(&self, delta: f64) -> Judgement {
        if self.contains(delta) {
            Judgement::new(Classification::Valid, "within normal historical range", delta)
        } else if delta > self.upper * SPIKE_FACTOR {
            Judgement::new(
                Classification::Quarantine,
                format!("atypical spike: {:.2} vs expected {:.2}", delta, self.expected),
                delta,
            )
        } else {
            Judgement::new(
                Classification::Uncertain,
                format!("out of normal range: {:.2} vs expected {:.2}", delta, self.expected),
                delta,
            )
        }
    }
}
