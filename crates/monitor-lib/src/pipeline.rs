//! Reading ingest pipeline
//!
//! Classifies a reading against the device's previous record, persists the
//! judgement and evaluates alerts, all under the device lock. If evaluation
//! fails the appended record is removed again, so a retried reading is stored
//! once. Notifications go out after the lock is released.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::warn;

use crate::alerts::{Alert, AlertEngine, AlertNotification};
use crate::classifier::Classifier;
use crate::error::{MonitorError, Result, StoreError};
use crate::models::{DeviceId, JudgedRecord, Reading, RecordId};
use crate::notifier::Notifier;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::store::{DeviceDirectory, RecordStore, StatsProvider};

/// Result of ingesting one reading
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub record_id: RecordId,
    pub record: JudgedRecord,
    pub created: Vec<Alert>,
    pub resolved: Vec<Alert>,
}

/// Publish one notification per created alert
pub fn publish_created(notifier: &dyn Notifier, device_code: &str, created: &[Alert]) {
    for alert in created {
        notifier.publish(AlertNotification::new(alert, device_code));
    }
}

pub struct ReadingProcessor {
    classifier: Classifier,
    devices: Arc<dyn DeviceDirectory>,
    records: Arc<dyn RecordStore>,
    stats: Arc<dyn StatsProvider>,
    engine: Arc<AlertEngine>,
    notifier: Arc<dyn Notifier>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl ReadingProcessor {
    pub fn new(
        classifier: Classifier,
        devices: Arc<dyn DeviceDirectory>,
        records: Arc<dyn RecordStore>,
        stats: Arc<dyn StatsProvider>,
        engine: Arc<AlertEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            classifier,
            devices,
            records,
            stats,
            engine,
            notifier,
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::default(),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Ingest a reading, evaluating alerts as of the current time
    pub async fn ingest(&self, reading: Reading) -> Result<IngestOutcome> {
        self.ingest_at(reading, Utc::now()).await
    }

    /// Ingest a reading, evaluating alert windows as of `now`
    pub async fn ingest_at(&self, reading: Reading, now: DateTime<Utc>) -> Result<IngestOutcome> {
        let start = Instant::now();
        let device_id = reading.device_id;

        let guard = self.engine.locks().lock(device_id).await;

        let device = self
            .devices
            .get(device_id)
            .await
            .map_err(self.persistence("load device"))?
            .ok_or(MonitorError::UnknownDevice(device_id))?;

        let previous = self
            .records
            .latest_before(device_id, reading.timestamp)
            .await
            .map_err(self.persistence("load previous record"))?;
        let stats = self
            .stats
            .get(device_id, self.classifier.hour_of(reading.timestamp))
            .await
            .map_err(self.persistence("load hourly stats"))?;

        let record = self
            .classifier
            .classify(&reading, previous.as_ref(), stats.as_ref())
            .into_record(&reading);

        let record_id = self
            .records
            .append(record.clone())
            .await
            .map_err(self.persistence("append record"))?;

        let evaluation = match self.engine.evaluate_locked(&guard, &device.code, now).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                self.rollback(device_id, record_id).await;
                return Err(e);
            }
        };
        drop(guard);

        self.metrics.inc_reading(record.classification);
        self.logger.log_reading_classified(&device.code, &record);

        publish_created(self.notifier.as_ref(), &device.code, &evaluation.created);
        self.metrics
            .observe_ingest_latency(start.elapsed().as_secs_f64());

        Ok(IngestOutcome {
            record_id,
            record,
            created: evaluation.created,
            resolved: evaluation.resolved,
        })
    }

    async fn rollback(&self, device_id: DeviceId, record_id: RecordId) {
        if let Err(e) = self.records.remove(device_id, record_id).await {
            self.metrics.inc_persistence_error("remove record");
            warn!(device_id, record_id, error = %e, "Failed to roll back judged record");
        }
    }

    fn persistence(&self, operation: &'static str) -> impl FnOnce(StoreError) -> MonitorError + '_ {
        move |source| {
            self.metrics.inc_persistence_error(operation);
            MonitorError::persistence(operation)(source)
        }
    }
}
