//! Alert lifecycle engine
//!
//! Runs resolution and then detection for one device at a time. Every
//! evaluation happens while the caller holds the device's [`DeviceGuard`], so
//! the "no unresolved alert, insert one" sequence cannot interleave with
//! another evaluation of the same device.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tracing::debug;

use super::detectors::{
    alert_message, ConsecutiveQuarantineDetector, FrozenValueDetector, NegativeDeltaDetector,
    DEFAULT_CONSECUTIVE_THRESHOLD, FROZEN_SAMPLE_SIZE,
};
use super::resolution::{ResolutionInput, Resolver, FROZEN_RESOLUTION_SAMPLE};
use super::types::{Alert, AlertDetails, AlertId, AlertType, NewAlert};
use crate::error::{MonitorError, Result, StoreError};
use crate::locks::{DeviceGuard, DeviceLocks};
use crate::models::{DeviceId, JudgedRecord};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::store::{AlertStore, RecordStore};

/// Tunables for the alert engine
#[derive(Debug, Clone, Copy)]
pub struct AlertConfig {
    /// Quarantined records in a row that raise a ConsecutiveQuarantine alert
    pub consecutive_quarantine_threshold: usize,
    /// Offset used to place readings in the local generation window
    pub utc_offset: FixedOffset,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            consecutive_quarantine_threshold: DEFAULT_CONSECUTIVE_THRESHOLD,
            utc_offset: Utc.fix(),
        }
    }
}

/// Alerts touched by one evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationOutcome {
    pub created: Vec<Alert>,
    pub resolved: Vec<Alert>,
}

impl EvaluationOutcome {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.resolved.is_empty()
    }
}

pub struct AlertEngine {
    records: Arc<dyn RecordStore>,
    alerts: Arc<dyn AlertStore>,
    locks: DeviceLocks,
    consecutive: ConsecutiveQuarantineDetector,
    negative_delta: NegativeDeltaDetector,
    frozen: FrozenValueDetector,
    resolver: Resolver,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl AlertEngine {
    pub fn new(
        records: Arc<dyn RecordStore>,
        alerts: Arc<dyn AlertStore>,
        locks: DeviceLocks,
        config: AlertConfig,
    ) -> Result<Self> {
        if config.consecutive_quarantine_threshold == 0 {
            return Err(MonitorError::InvalidConfig(
                "consecutive_quarantine_threshold must be at least 1".to_string(),
            ));
        }

        let negative_delta = NegativeDeltaDetector::default();
        Ok(Self {
            records,
            alerts,
            locks,
            consecutive: ConsecutiveQuarantineDetector::new(config.consecutive_quarantine_threshold),
            negative_delta,
            frozen: FrozenValueDetector::with_offset(config.utc_offset),
            resolver: Resolver::new(negative_delta),
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::default(),
        })
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Lock registry shared with the ingest pipeline
    pub fn locks(&self) -> &DeviceLocks {
        &self.locks
    }

    /// Lock the device, then resolve and detect
    pub async fn evaluate_device(
        &self,
        device_id: DeviceId,
        device_code: &str,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutcome> {
        let guard = self.locks.lock(device_id).await;
        self.evaluate_locked(&guard, device_code, now).await
    }

    /// Resolve cleared alerts, then create new ones, for the guarded device
    pub async fn evaluate_locked(
        &self,
        guard: &DeviceGuard,
        device_code: &str,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutcome> {
        let device_id = guard.device_id();

        let depth = self
            .consecutive
            .threshold
            .max(FROZEN_SAMPLE_SIZE)
            .max(FROZEN_RESOLUTION_SAMPLE);
        let latest = self
            .records
            .latest_n(device_id, depth)
            .await
            .map_err(self.persistence("load latest records"))?;
        let recent = self
            .records
            .since(device_id, self.negative_delta.window_start(now))
            .await
            .map_err(self.persistence("load recent records"))?;

        let resolved = self.resolve(device_id, &latest, &recent, now).await?;
        let created = self
            .detect(device_id, device_code, &latest, &recent, now)
            .await?;

        debug!(
            device_id = device_id,
            created = created.len(),
            resolved = resolved.len(),
            "Device evaluated"
        );

        Ok(EvaluationOutcome { created, resolved })
    }

    /// Resolve an alert by hand. Resolving a resolved alert returns it unchanged.
    pub async fn resolve_manually(&self, alert_id: AlertId, now: DateTime<Utc>) -> Result<Alert> {
        let alert = self
            .alerts
            .get(alert_id)
            .await
            .map_err(self.persistence("load alert"))?
            .ok_or(MonitorError::AlertNotFound(alert_id))?;

        if alert.resolved {
            return Ok(alert);
        }

        let _guard = self.locks.lock(alert.device_id).await;
        match self.alerts.mark_resolved(alert_id, now).await {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => return Err(MonitorError::AlertNotFound(alert_id)),
            Err(e) => return Err(self.persistence("resolve alert")(e)),
        }

        let resolved = self
            .alerts
            .get(alert_id)
            .await
            .map_err(self.persistence("load alert"))?
            .ok_or(MonitorError::AlertNotFound(alert_id))?;

        // a concurrent evaluation may have resolved it first
        if resolved.resolved_at == Some(now) {
            self.metrics.inc_alert_resolved(resolved.alert_type, "manual");
            self.logger.log_alert_resolved(&resolved, true);
        }
        Ok(resolved)
    }

    async fn resolve(
        &self,
        device_id: DeviceId,
        latest: &[JudgedRecord],
        recent: &[JudgedRecord],
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>> {
        let open = self
            .alerts
            .unresolved_for_device(device_id)
            .await
            .map_err(self.persistence("load unresolved alerts"))?;

        let input = ResolutionInput {
            latest,
            recent,
            now,
        };

        let mut resolved = Vec::new();
        for mut alert in open {
            if !self.resolver.should_resolve(alert.alert_type, &input) {
                continue;
            }

            self.alerts
                .mark_resolved(alert.id, now)
                .await
                .map_err(self.persistence("resolve alert"))?;

            alert.resolved = true;
            alert.resolved_at = Some(now);
            self.metrics.inc_alert_resolved(alert.alert_type, "auto");
            self.logger.log_alert_resolved(&alert, false);
            resolved.push(alert);
        }

        Ok(resolved)
    }

    async fn detect(
        &self,
        device_id: DeviceId,
        device_code: &str,
        latest: &[JudgedRecord],
        recent: &[JudgedRecord],
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>> {
        let findings = [
            self.consecutive.detect(latest),
            self.negative_delta.detect(recent, now),
            self.frozen.detect(latest),
        ];

        let mut created = Vec::new();
        for details in findings.into_iter().flatten() {
            let alert_type = details.alert_type();
            if self.already_alerted(device_id, alert_type, now).await? {
                continue;
            }

            let alert = self.create(device_id, device_code, details, now).await?;
            created.push(alert);
        }

        Ok(created)
    }

    /// NegativeDelta dedupes on creation time, the other types on open alerts
    async fn already_alerted(
        &self,
        device_id: DeviceId,
        alert_type: AlertType,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let existing = match alert_type {
            AlertType::NegativeDelta => self
                .alerts
                .find_created_since(device_id, alert_type, self.negative_delta.window_start(now))
                .await
                .map_err(self.persistence("check recent alerts"))?,
            AlertType::ConsecutiveQuarantine | AlertType::FrozenValue => self
                .alerts
                .find_unresolved(device_id, alert_type)
                .await
                .map_err(self.persistence("check unresolved alerts"))?,
        };
        Ok(existing.is_some())
    }

    async fn create(
        &self,
        device_id: DeviceId,
        device_code: &str,
        details: AlertDetails,
        now: DateTime<Utc>,
    ) -> Result<Alert> {
        let alert_type = details.alert_type();
        let new_alert = NewAlert {
            device_id,
            alert_type,
            severity: alert_type.severity(),
            message: alert_message(device_code, &details),
            details,
            created_at: now,
        };

        let id = self
            .alerts
            .save(new_alert.clone())
            .await
            .map_err(self.persistence("save alert"))?;

        let alert = new_alert.into_alert(id);
        self.metrics.inc_alert_created(alert_type);
        self.logger.log_alert_created(device_code, &alert);
        Ok(alert)
    }

    fn persistence(&self, operation: &'static str) -> impl FnOnce(StoreError) -> MonitorError + '_ {
        move |source| {
            self.metrics.inc_persistence_error(operation);
            MonitorError::persistence(operation)(source)
        }
    }
}
