//! Storage seams consumed by the classifier and the alert engine
//!
//! Durable storage is owned elsewhere; this module defines the queries the
//! core relies on and ships in-memory implementations.

mod memory;

pub use memory::{MemoryAlertStore, MemoryDeviceDirectory, MemoryRecordStore, MemoryStatsProvider};

use chrono::{DateTime, Utc};

use crate::alerts::{Alert, AlertId, AlertType, NewAlert};
use crate::error::StoreResult;
use crate::models::{Device, DeviceId, HourlyStats, JudgedRecord, RecordId};

pub use async_trait::async_trait;

/// Append-only store of judged records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Most recent record of the device strictly before `timestamp`
    async fn latest_before(
        &self,
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<Option<JudgedRecord>>;

    /// Up to `n` most recent records, newest first
    async fn latest_n(&self, device_id: DeviceId, n: usize) -> StoreResult<Vec<JudgedRecord>>;

    /// All records with `timestamp >= since`, in no particular order
    async fn since(
        &self,
        device_id: DeviceId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<JudgedRecord>>;

    /// Persist a record; valid records are also written to the valid-only projection
    async fn append(&self, record: JudgedRecord) -> StoreResult<RecordId>;

    /// Drop a record appended by an ingest that did not commit
    async fn remove(&self, device_id: DeviceId, record_id: RecordId) -> StoreResult<()>;
}

/// Read-only access to per-hour historical delta statistics
#[async_trait]
pub trait StatsProvider: Send + Sync {
    async fn get(&self, device_id: DeviceId, hour_of_day: u8) -> StoreResult<Option<HourlyStats>>;
}

/// Alert persistence
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn find_unresolved(
        &self,
        device_id: DeviceId,
        alert_type: AlertType,
    ) -> StoreResult<Option<Alert>>;

    async fn find_created_since(
        &self,
        device_id: DeviceId,
        alert_type: AlertType,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<Alert>>;

    async fn unresolved_for_device(&self, device_id: DeviceId) -> StoreResult<Vec<Alert>>;

    async fn get(&self, alert_id: AlertId) -> StoreResult<Option<Alert>>;

    async fn save(&self, alert: NewAlert) -> StoreResult<AlertId>;

    /// Mark an alert resolved; resolving an already resolved alert keeps its
    /// original `resolved_at`
    async fn mark_resolved(&self, alert_id: AlertId, resolved_at: DateTime<Utc>)
        -> StoreResult<()>;
}

/// Lookup of monitored devices
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn get(&self, device_id: DeviceId) -> StoreResult<Option<Device>>;

    async fn active(&self) -> StoreResult<Vec<Device>>;
}
