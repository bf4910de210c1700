//! Alert objects and their notification payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::DeviceId;

pub type AlertId = i64;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Alert type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ConsecutiveQuarantine,
    NegativeDelta,
    FrozenValue,
}

impl AlertType {
    pub const ALL: [AlertType; 3] = [
        AlertType::ConsecutiveQuarantine,
        AlertType::NegativeDelta,
        AlertType::FrozenValue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::ConsecutiveQuarantine => "consecutive_quarantine",
            AlertType::NegativeDelta => "negative_delta",
            AlertType::FrozenValue => "frozen_value",
        }
    }

    pub fn severity(&self) -> AlertSeverity {
        match self {
            AlertType::ConsecutiveQuarantine | AlertType::NegativeDelta => AlertSeverity::Critical,
            AlertType::FrozenValue => AlertSeverity::Warning,
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence attached to an alert, serialized as a flat map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlertDetails {
    ConsecutiveQuarantine {
        consecutive_count: usize,
        timestamps: Vec<DateTime<Utc>>,
        reasons: Vec<String>,
    },
    NegativeDelta {
        delta_values: Vec<f64>,
        timestamps: Vec<DateTime<Utc>>,
    },
    FrozenValue {
        frozen_value: f64,
        duration_hours: f64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
}

impl AlertDetails {
    pub fn alert_type(&self) -> AlertType {
        match self {
            AlertDetails::ConsecutiveQuarantine { .. } => AlertType::ConsecutiveQuarantine,
            AlertDetails::NegativeDelta { .. } => AlertType::NegativeDelta,
            AlertDetails::FrozenValue { .. } => AlertType::FrozenValue,
        }
    }
}

/// An alert that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub device_id: DeviceId,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub details: AlertDetails,
    pub created_at: DateTime<Utc>,
}

impl NewAlert {
    pub fn into_alert(self, id: AlertId) -> Alert {
        Alert {
            id,
            device_id: self.device_id,
            alert_type: self.alert_type,
            severity: self.severity,
            message: self.message,
            details: self.details,
            resolved: false,
            created_at: self.created_at,
            resolved_at: None,
        }
    }
}

/// A persisted alert.
///
/// Only resolution mutates an alert, and only from unresolved to resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub device_id: DeviceId,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub details: AlertDetails,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Event pushed to live subscribers when an alert is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotification {
    pub id: AlertId,
    pub device_code: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertNotification {
    pub fn new(alert: &Alert, device_code: &str) -> Self {
        Self {
            id: alert.id,
            device_code: device_code.to_string(),
            alert_type: alert.alert_type,
            severity: alert.severity,
            message: alert.message.clone(),
            timestamp: alert.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_details_serialize_as_flat_map() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 1, 10, 30, 0).unwrap();
        let details = AlertDetails::FrozenValue {
            frozen_value: 1000.0,
            duration_hours: 1.5,
            start_time: start,
            end_time: end,
        };

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["frozen_value"], 1000.0);
        assert_eq!(json["duration_hours"], 1.5);
        assert!(json.get("FrozenValue").is_none());
    }

    #[test]
    fn test_alert_type_severity_and_names() {
        assert_eq!(AlertType::ConsecutiveQuarantine.severity(), AlertSeverity::Critical);
        assert_eq!(AlertType::NegativeDelta.severity(), AlertSeverity::Critical);
        assert_eq!(AlertType::FrozenValue.severity(), AlertSeverity::Warning);
        assert_eq!(
            serde_json::to_string(&AlertType::NegativeDelta).unwrap(),
            "\"negative_delta\""
        );
        assert_eq!(AlertSeverity::Critical.to_string(), "critical");
    }

    #[test]
    fn test_notification_from_alert() {
        let now = Utc::now();
        let alert = NewAlert {
            device_id: 3,
            alert_type: AlertType::NegativeDelta,
            severity: AlertSeverity::Critical,
            message: "Device INV-003: negative delta detected".to_string(),
            details: AlertDetails::NegativeDelta {
                delta_values: vec![-4.0],
                timestamps: vec![now],
            },
            created_at: now,
        }
        .into_alert(42);

        assert!(!alert.resolved);
        let event = AlertNotification::new(&alert, "INV-003");
        assert_eq!(event.id, 42);
        assert_eq!(event.device_code, "INV-003");
        assert_eq!(event.timestamp, now);
    }
}
