//! Replay a reading feed through the full pipeline
//!
//! Readings are processed in file order with in-memory stores. Alert windows
//! are evaluated as of each reading's own timestamp, so historical feeds
//! produce the alerts they would have produced live.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use monitor_lib::{
    models::{parse_timestamp, Classification, FeedLine},
    store::{DeviceDirectory, MemoryAlertStore, MemoryDeviceDirectory, MemoryRecordStore, MemoryStatsProvider},
    Alert, AlertEngine, DeviceLocks, IngestOutcome, MonitorError, ReadingProcessor, SubscriberHub,
};
use serde::Serialize;
use tabled::Tabled;

use crate::error::CliError;
use crate::output::{
    color_classification, color_severity, format_value, print_info, print_json, print_success,
    print_table, print_warning, OutputFormat,
};
use crate::settings::Settings;

#[derive(Debug, Clone, Serialize)]
pub struct ReplayedRecord {
    pub line: usize,
    pub device_code: String,
    pub timestamp: DateTime<Utc>,
    pub accumulated_value: f64,
    pub delta_value: Option<f64>,
    pub classification: Classification,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertEvent {
    Created,
    Resolved,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayedAlert {
    pub line: usize,
    pub event: AlertEvent,
    pub alert: Alert,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplaySummary {
    pub readings: usize,
    pub valid: usize,
    pub uncertain: usize,
    pub quarantine: usize,
    pub alerts_created: usize,
    pub alerts_resolved: usize,
    pub notifications: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    pub records: Vec<ReplayedRecord>,
    pub alerts: Vec<ReplayedAlert>,
    pub summary: ReplaySummary,
}

impl ReplayReport {
    fn push(&mut self, line: usize, device_code: &str, outcome: IngestOutcome) {
        let record = outcome.record;
        match record.classification {
            Classification::Valid => self.summary.valid += 1,
            Classification::Uncertain => self.summary.uncertain += 1,
            Classification::Quarantine => self.summary.quarantine += 1,
        }
        self.summary.readings += 1;
        self.summary.alerts_resolved += outcome.resolved.len();
        self.summary.alerts_created += outcome.created.len();

        self.records.push(ReplayedRecord {
            line,
            device_code: device_code.to_string(),
            timestamp: record.timestamp,
            accumulated_value: record.accumulated_value,
            delta_value: record.delta_value,
            classification: record.classification,
            reason: record.reason,
        });

        let resolved = outcome.resolved.into_iter().map(|alert| ReplayedAlert {
            line,
            event: AlertEvent::Resolved,
            alert,
        });
        let created = outcome.created.into_iter().map(|alert| ReplayedAlert {
            line,
            event: AlertEvent::Created,
            alert,
        });
        self.alerts.extend(resolved.chain(created));
    }
}

fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Replay `feed` and collect every judged record and alert transition
pub async fn replay(feed: &Path, stats: Option<&Path>, settings: &Settings) -> Result<ReplayReport> {
    let content = read_file(feed)?;
    let stats = match stats {
        Some(path) => MemoryStatsProvider::from_json(&read_file(path)?).map_err(|e| {
            anyhow::anyhow!("{}: {}", path.display(), e)
        })?,
        None => MemoryStatsProvider::new(),
    };

    let devices = Arc::new(MemoryDeviceDirectory::new());
    let records = Arc::new(MemoryRecordStore::new());
    let hub = Arc::new(SubscriberHub::default());
    let mut subscription = hub.subscribe();

    let engine = Arc::new(AlertEngine::new(
        records.clone(),
        Arc::new(MemoryAlertStore::new()),
        DeviceLocks::new(),
        settings.alert_config()?,
    )?);
    let processor = ReadingProcessor::new(
        settings.classifier()?,
        devices.clone(),
        records,
        Arc::new(stats),
        engine,
        hub.clone(),
    );

    let mut report = ReplayReport::default();
    let line_error = |line: usize, source| CliError::Line {
        path: PathBuf::from(feed),
        line,
        source,
    };

    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }

        let entry = FeedLine::parse(raw).map_err(|e| line_error(line, e))?;
        let device = entry.device();
        if devices.get(device.id).await?.is_none() {
            devices.register(device.clone());
        }

        // a replayed line has no receive time to fall back on
        let timestamp = entry
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| {
                line_error(
                    line,
                    MonitorError::MalformedInput("missing or unparsable timestamp".to_string()),
                )
            })?;
        let reading = entry
            .into_reading(timestamp)
            .map_err(|e| line_error(line, e))?;
        let at = reading.timestamp;
        let outcome = processor
            .ingest_at(reading, at)
            .await
            .map_err(|e| line_error(line, e))?;
        report.push(line, &device.code, outcome);

        while subscription.try_recv().is_some() {
            report.summary.notifications += 1;
        }
    }

    Ok(report)
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Line")]
    line: usize,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Delta")]
    delta: String,
    #[tabled(rename = "Class")]
    classification: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Line")]
    line: usize,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Type")]
    alert_type: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Message")]
    message: String,
}

pub async fn run(
    feed: PathBuf,
    stats: Option<PathBuf>,
    alerts_only: bool,
    settings: &Settings,
    format: OutputFormat,
) -> Result<()> {
    let report = replay(&feed, stats.as_deref(), settings).await?;

    if let OutputFormat::Json = format {
        return print_json(&report);
    }

    if !alerts_only {
        println!("{}", "Judged Records".bold());
        let rows: Vec<RecordRow> = report
            .records
            .iter()
            .map(|r| RecordRow {
                line: r.line,
                device: r.device_code.clone(),
                timestamp: r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                value: format_value(Some(r.accumulated_value)),
                delta: format_value(r.delta_value),
                classification: color_classification(r.classification),
                reason: r.reason.clone(),
            })
            .collect();
        print_table(&rows, "No readings in feed");
        println!();
    }

    println!("{}", "Alerts".bold());
    let rows: Vec<AlertRow> = report
        .alerts
        .iter()
        .map(|a| AlertRow {
            line: a.line,
            event: match a.event {
                AlertEvent::Created => "created".red().to_string(),
                AlertEvent::Resolved => "resolved".green().to_string(),
            },
            id: a.alert.id,
            alert_type: a.alert.alert_type.to_string(),
            severity: color_severity(a.alert.severity),
            message: a.alert.message.clone(),
        })
        .collect();
    print_table(&rows, "No alerts raised");

    let s = &report.summary;
    println!();
    print_info(&format!(
        "{} readings: {} valid, {} uncertain, {} quarantined",
        s.readings, s.valid, s.uncertain, s.quarantine
    ));
    if s.alerts_created > 0 {
        print_warning(&format!(
            "{} alerts created, {} resolved",
            s.alerts_created, s.alerts_resolved
        ));
    } else {
        print_success("No alerts created");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_lib::AlertType;
    use std::io::Write;

    fn settings() -> Settings {
        Settings {
            tolerance: 10.0,
            threshold: 3,
            utc_offset_secs: 0,
        }
    }

    fn feed(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[tokio::test]
    async fn test_replay_negative_delta_then_resolution() {
        let file = feed(&[
            r#"{"device_id": 1, "device_code": "INV-001", "value": 1000, "timestamp": "2025-06-01T10:00:00Z"}"#,
            r#"{"device_id": 1, "device_code": "INV-001", "value": 990, "timestamp": "2025-06-01T10:15:00Z"}"#,
            "",
            r#"{"device_id": 1, "device_code": "INV-001", "value": 1030, "timestamp": "2025-06-01T11:30:00Z"}"#,
        ]);

        let report = replay(file.path(), None, &settings()).await.unwrap();

        assert_eq!(report.summary.readings, 3);
        assert_eq!(report.summary.quarantine, 1);
        assert_eq!(report.summary.notifications, 1);
        assert_eq!(report.alerts.len(), 2);
        assert_eq!(report.alerts[0].event, AlertEvent::Created);
        assert_eq!(report.alerts[0].alert.alert_type, AlertType::NegativeDelta);
        assert_eq!(report.alerts[0].line, 2);
        assert_eq!(report.alerts[1].event, AlertEvent::Resolved);
        assert_eq!(report.alerts[1].line, 4);
    }

    #[tokio::test]
    async fn test_replay_reports_bad_line_number() {
        let file = feed(&[
            r#"{"device_id": 1, "value": 1000, "timestamp": "2025-06-01T10:00:00Z"}"#,
            r#"{"device_id": 1, "value": "oops"}"#,
        ]);

        let err = replay(file.path(), None, &settings()).await.unwrap_err();
        match err.downcast_ref::<CliError>() {
            Some(CliError::Line { line, .. }) => assert_eq!(*line, 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_replay_rejects_line_without_usable_timestamp() {
        for bad in [
            r#"{"device_id": 1, "value": 1010}"#,
            r#"{"device_id": 1, "value": 1010, "timestamp": "yesterday"}"#,
        ] {
            let file = feed(&[
                r#"{"device_id": 1, "value": 1000, "timestamp": "2025-06-01T10:00:00Z"}"#,
                bad,
            ]);

            let err = replay(file.path(), None, &settings()).await.unwrap_err();
            match err.downcast_ref::<CliError>() {
                Some(CliError::Line { line, source, .. }) => {
                    assert_eq!(*line, 2);
                    assert!(matches!(source, MonitorError::MalformedInput(_)));
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_replay_uses_stats_file() {
        let file = feed(&[
            r#"{"device_id": 1, "value": 1000, "timestamp": "2025-06-01T12:00:00Z"}"#,
            r#"{"device_id": 1, "value": 1080, "timestamp": "2025-06-01T12:15:00Z"}"#,
        ]);
        let mut stats = tempfile::NamedTempFile::new().unwrap();
        write!(
            stats,
            r#"[{{"device_id": 1, "hour_of_day": 12, "avg_delta": 50.0, "std_delta": 5.0, "sample_count": 30}}]"#
        )
        .unwrap();

        let report = replay(file.path(), Some(stats.path()), &settings()).await.unwrap();
        assert_eq!(report.records[1].classification, Classification::Uncertain);
        assert!(report.records[1].reason.starts_with("out of normal range"));
    }
}
