//! Classify a single reading

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use monitor_lib::{
    models::{Classification, HourlyStats, JudgedRecord, Reading},
    DeviceId,
};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{color_classification, format_value, print_json, print_table, OutputFormat};
use crate::settings::{timestamp_arg, Settings};

/// Inputs for one classification
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub device_id: DeviceId,
    pub value: f64,
    pub timestamp: Option<String>,
    pub previous_value: Option<f64>,
    pub previous_timestamp: Option<String>,
    pub avg: Option<f64>,
    pub std: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ClassifyOutput {
    record: JudgedRecord,
    hour_of_day: u8,
    tolerance: f64,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// Judge the reading against the supplied previous record and stats
pub fn judge(request: &ClassifyRequest, settings: &Settings, now: DateTime<Utc>) -> Result<(JudgedRecord, u8)> {
    let classifier = settings.classifier()?;

    let timestamp = match &request.timestamp {
        Some(raw) => timestamp_arg(raw)?,
        None => now,
    };
    let reading = Reading::new(request.device_id, timestamp, request.value)?;

    let previous = match (request.previous_value, &request.previous_timestamp) {
        (Some(value), Some(raw)) => Some(JudgedRecord {
            device_id: request.device_id,
            timestamp: timestamp_arg(raw)?,
            accumulated_value: value,
            delta_value: None,
            classification: Classification::Valid,
            reason: "supplied on the command line".to_string(),
        }),
        _ => None,
    };

    let hour_of_day = classifier.hour_of(timestamp);
    let stats = request.avg.map(|avg| HourlyStats {
        device_id: request.device_id,
        hour_of_day,
        avg_delta: Some(avg),
        std_delta: request.std,
        sample_count: 0,
    });

    let record = classifier
        .classify(&reading, previous.as_ref(), stats.as_ref())
        .into_record(&reading);
    Ok((record, hour_of_day))
}

pub fn run(request: ClassifyRequest, settings: &Settings, format: OutputFormat) -> Result<()> {
    let (record, hour_of_day) = judge(&request, settings, Utc::now())?;

    match format {
        OutputFormat::Json => print_json(&ClassifyOutput {
            record,
            hour_of_day,
            tolerance: settings.tolerance,
        })?,
        OutputFormat::Table => {
            println!("{}", "Reading Classification".bold());
            let rows = vec![
                FieldRow {
                    field: "Device",
                    value: record.device_id.to_string(),
                },
                FieldRow {
                    field: "Timestamp",
                    value: record.timestamp.to_rfc3339(),
                },
                FieldRow {
                    field: "Local hour",
                    value: hour_of_day.to_string(),
                },
                FieldRow {
                    field: "Value",
                    value: format_value(Some(record.accumulated_value)),
                },
                FieldRow {
                    field: "Delta",
                    value: format_value(record.delta_value),
                },
                FieldRow {
                    field: "Classification",
                    value: color_classification(record.classification),
                },
                FieldRow {
                    field: "Reason",
                    value: record.reason.clone(),
                },
            ];
            print_table(&rows, "Nothing to classify");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings() -> Settings {
        Settings {
            tolerance: 10.0,
            threshold: 3,
            utc_offset_secs: 0,
        }
    }

    fn request(value: f64) -> ClassifyRequest {
        ClassifyRequest {
            device_id: 1,
            value,
            timestamp: Some("2025-06-01T12:00:00Z".to_string()),
            previous_value: Some(1000.0),
            previous_timestamp: Some("2025-06-01T11:45:00Z".to_string()),
            avg: Some(50.0),
            std: Some(5.0),
        }
    }

    #[test]
    fn test_judge_against_supplied_history() {
        let now = Utc::now();
        let (record, hour) = judge(&request(1040.0), &settings(), now).unwrap();
        assert_eq!(record.classification, Classification::Valid);
        assert_eq!(record.delta_value, Some(40.0));
        assert_eq!(hour, 12);

        let (record, _) = judge(&request(1100.0), &settings(), now).unwrap();
        assert_eq!(record.classification, Classification::Quarantine);
        assert!(record.reason.starts_with("atypical spike"));
    }

    #[test]
    fn test_judge_without_previous_is_first_record() {
        let mut req = request(10.0);
        req.previous_value = None;
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let (record, _) = judge(&req, &settings(), now).unwrap();
        assert_eq!(record.reason, "first record for device");
    }

    #[test]
    fn test_judge_rejects_bad_timestamp() {
        let mut req = request(10.0);
        req.timestamp = Some("tomorrow".to_string());
        assert!(judge(&req, &settings(), Utc::now()).is_err());
    }
}
