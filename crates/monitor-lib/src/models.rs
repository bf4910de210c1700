//! Core data models for the monitor

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

pub type DeviceId = i64;
pub type RecordId = i64;

/// A monitored generation device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// Human-facing code used in alert messages and notifications
    pub code: String,
    /// Inactive devices are skipped by the periodic sweep
    pub active: bool,
}

impl Device {
    pub fn new(id: DeviceId, code: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            active: true,
        }
    }
}

/// Raw cumulative-energy reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: DeviceId,
    pub timestamp: DateTime<Utc>,
    pub accumulated_value: f64,
}

impl Reading {
    /// Build a reading, rejecting values that are not real numbers
    pub fn new(
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
        accumulated_value: f64,
    ) -> Result<Self> {
        if !accumulated_value.is_finite() {
            return Err(MonitorError::MalformedInput(format!(
                "accumulated value for device {} is not a finite number",
                device_id
            )));
        }
        Ok(Self {
            device_id,
            timestamp,
            accumulated_value,
        })
    }
}

/// Ingest payload as submitted by an external producer.
///
/// The timestamp is optional; when missing or unparsable, the ingest time is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub value: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl IngestRequest {
    pub fn into_reading(self, device_id: DeviceId, received_at: DateTime<Utc>) -> Result<Reading> {
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(received_at);
        Reading::new(device_id, timestamp, self.value)
    }
}

/// One line of a newline-delimited JSON reading feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedLine {
    pub device_id: DeviceId,
    #[serde(default)]
    pub device_code: Option<String>,
    pub value: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl FeedLine {
    /// Parse one line of the feed
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| MonitorError::MalformedInput(e.to_string()))
    }

    /// Device described by this line; the code defaults to `DEV-<id>`
    pub fn device(&self) -> Device {
        let code = self
            .device_code
            .clone()
            .unwrap_or_else(|| format!("DEV-{}", self.device_id));
        Device::new(self.device_id, code)
    }

    pub fn into_reading(self, received_at: DateTime<Utc>) -> Result<Reading> {
        IngestRequest {
            value: self.value,
            timestamp: self.timestamp,
        }
        .into_reading(self.device_id, received_at)
    }
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one taken as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Trust level assigned to a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Valid,
    Uncertain,
    Quarantine,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Valid => "valid",
            Classification::Uncertain => "uncertain",
            Classification::Quarantine => "quarantine",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reading annotated with its classification, reason and delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgedRecord {
    pub device_id: DeviceId,
    pub timestamp: DateTime<Utc>,
    pub accumulated_value: f64,
    pub delta_value: Option<f64>,
    pub classification: Classification,
    pub reason: String,
}

impl JudgedRecord {
    pub fn is_negative_delta(&self) -> bool {
        self.delta_value.is_some_and(|d| d < 0.0)
    }
}

/// Historical delta statistics for one device and hour of day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyStats {
    pub device_id: DeviceId,
    pub hour_of_day: u8,
    pub avg_delta: Option<f64>,
    pub std_delta: Option<f64>,
    pub sample_count: u64,
}
