//! Auto-resolution rules

use chrono::{DateTime, Utc};

use super::detectors::NegativeDeltaDetector;
use super::types::AlertType;
use crate::models::{Classification, JudgedRecord};

/// Records inspected when deciding whether a frozen counter moved again
pub const FROZEN_RESOLUTION_SAMPLE: usize = 3;

/// Records the resolver needs
///
/// `latest` holds the newest records first and must contain at least
/// `FROZEN_RESOLUTION_SAMPLE` entries when the device has that many.
/// `recent` holds the records of the trailing negative-delta window.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionInput<'a> {
    pub latest: &'a [JudgedRecord],
    pub recent: &'a [JudgedRecord],
    pub now: DateTime<Utc>,
}

/// Decides whether the condition behind an alert type has cleared
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
    negative_delta: NegativeDeltaDetector,
}

impl Resolver {
    pub fn new(negative_delta: NegativeDeltaDetector) -> Self {
        Self { negative_delta }
    }

    pub fn should_resolve(&self, alert_type: AlertType, input: &ResolutionInput<'_>) -> bool {
        match alert_type {
            AlertType::ConsecutiveQuarantine => input
                .latest
                .first()
                .map(|r| r.classification == Classification::Valid)
                .unwrap_or(false),
            AlertType::NegativeDelta => self
                .negative_delta
                .offending(input.recent, input.now)
                .is_empty(),
            AlertType::FrozenValue => {
                let sample = &input.latest[..input.latest.len().min(FROZEN_RESOLUTION_SAMPLE)];
                match sample.split_first() {
                    Some((first, rest)) => rest
                        .iter()
                        .any(|r| r.accumulated_value != first.accumulated_value),
                    None => false,
                }
            }
        }
    }
}
