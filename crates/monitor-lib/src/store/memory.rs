//! In-memory store implementations

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::{async_trait, AlertStore, DeviceDirectory, RecordStore, StatsProvider};
use crate::alerts::{Alert, AlertId, AlertType, NewAlert};
use crate::error::{StoreError, StoreResult};
use crate::models::{Classification, Device, DeviceId, HourlyStats, JudgedRecord, RecordId};

/// Judged records per device, kept ordered by timestamp
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: DashMap<DeviceId, Vec<(RecordId, JudgedRecord)>>,
    valid: DashMap<DeviceId, Vec<(RecordId, JudgedRecord)>>,
    next_id: AtomicI64,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Valid-only projection for a device, oldest first
    pub fn valid_records(&self, device_id: DeviceId) -> Vec<JudgedRecord> {
        snapshot(&self.valid, device_id)
    }

    /// All records for a device, oldest first
    pub fn records(&self, device_id: DeviceId) -> Vec<JudgedRecord> {
        snapshot(&self.records, device_id)
    }

    pub fn len(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn snapshot(map: &DashMap<DeviceId, Vec<(RecordId, JudgedRecord)>>, device_id: DeviceId) -> Vec<JudgedRecord> {
    map.get(&device_id)
        .map(|records| records.iter().map(|(_, r)| r.clone()).collect())
        .unwrap_or_default()
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn latest_before(
        &self,
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<Option<JudgedRecord>> {
        Ok(self.records.get(&device_id).and_then(|records| {
            let idx = records.partition_point(|(_, r)| r.timestamp < timestamp);
            idx.checked_sub(1).map(|i| records[i].1.clone())
        }))
    }

    async fn latest_n(&self, device_id: DeviceId, n: usize) -> StoreResult<Vec<JudgedRecord>> {
        Ok(self
            .records
            .get(&device_id)
            .map(|records| {
                records
                    .iter()
                    .rev()
                    .take(n)
                    .map(|(_, r)| r.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn since(
        &self,
        device_id: DeviceId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<JudgedRecord>> {
        Ok(self
            .records
            .get(&device_id)
            .map(|records| {
                let start = records.partition_point(|(_, r)| r.timestamp < since);
                records[start..].iter().map(|(_, r)| r.clone()).collect()
            })
            .unwrap_or_default())
    }

    async fn append(&self, record: JudgedRecord) -> StoreResult<RecordId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let device_id = record.device_id;

        if record.classification == Classification::Valid {
            insert_ordered(&mut self.valid.entry(device_id).or_default(), id, record.clone());
        }
        insert_ordered(&mut self.records.entry(device_id).or_default(), id, record);

        debug!(device_id, record_id = id, "Appended judged record");
        Ok(id)
    }

    async fn remove(&self, device_id: DeviceId, record_id: RecordId) -> StoreResult<()> {
        let mut found = false;
        for map in [&self.records, &self.valid] {
            if let Some(mut records) = map.get_mut(&device_id) {
                let before = records.len();
                records.retain(|(id, _)| *id != record_id);
                found |= records.len() != before;
            }
        }
        if !found {
            return Err(StoreError::NotFound {
                entity: "record",
                id: record_id,
            });
        }
        debug!(device_id, record_id, "Removed judged record");
        Ok(())
    }
}

/// Equal timestamps keep arrival order
fn insert_ordered(records: &mut Vec<(RecordId, JudgedRecord)>, id: RecordId, record: JudgedRecord) {
    let idx = records.partition_point(|(_, r)| r.timestamp <= record.timestamp);
    records.insert(idx, (id, record));
}

/// Historical stats keyed by (device, hour of day)
#[derive(Debug, Default)]
pub struct MemoryStatsProvider {
    stats: DashMap<(DeviceId, u8), HourlyStats>,
}

impl MemoryStatsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the stats for one device and hour
    pub fn upsert(&self, stats: HourlyStats) {
        self.stats.insert((stats.device_id, stats.hour_of_day), stats);
    }

    /// Load a JSON array of hourly stats
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let rows: Vec<HourlyStats> = serde_json::from_str(json)
            .map_err(|e| StoreError::Unavailable(format!("invalid stats document: {}", e)))?;
        Ok(rows.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

impl FromIterator<HourlyStats> for MemoryStatsProvider {
    fn from_iter<I: IntoIterator<Item = HourlyStats>>(iter: I) -> Self {
        let provider = Self::new();
        for stats in iter {
            provider.upsert(stats);
        }
        provider
    }
}

#[async_trait]
impl StatsProvider for MemoryStatsProvider {
    async fn get(&self, device_id: DeviceId, hour_of_day: u8) -> StoreResult<Option<HourlyStats>> {
        Ok(self
            .stats
            .get(&(device_id, hour_of_day))
            .map(|s| s.value().clone()))
    }
}

/// Alerts keyed by id
#[derive(Debug, Default)]
pub struct MemoryAlertStore {
    alerts: DashMap<AlertId, Alert>,
    next_id: AtomicI64,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All alerts of a device, oldest first
    pub fn alerts_for_device(&self, device_id: DeviceId) -> Vec<Alert> {
        self.matching(|a| a.device_id == device_id)
    }

    pub fn all(&self) -> Vec<Alert> {
        self.matching(|_| true)
    }

    fn matching(&self, predicate: impl Fn(&Alert) -> bool) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        alerts.sort_by_key(|a| a.id);
        alerts
    }

    fn newest(&self, predicate: impl Fn(&Alert) -> bool) -> Option<Alert> {
        self.matching(predicate).pop()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn find_unresolved(
        &self,
        device_id: DeviceId,
        alert_type: AlertType,
    ) -> StoreResult<Option<Alert>> {
        Ok(self.newest(|a| a.device_id == device_id && a.alert_type == alert_type && !a.resolved))
    }

    async fn find_created_since(
        &self,
        device_id: DeviceId,
        alert_type: AlertType,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<Alert>> {
        Ok(self.newest(|a| {
            a.device_id == device_id && a.alert_type == alert_type && a.created_at >= since
        }))
    }

    async fn unresolved_for_device(&self, device_id: DeviceId) -> StoreResult<Vec<Alert>> {
        Ok(self.matching(|a| a.device_id == device_id && !a.resolved))
    }

    async fn get(&self, alert_id: AlertId) -> StoreResult<Option<Alert>> {
        Ok(self.alerts.get(&alert_id).map(|a| a.value().clone()))
    }

    async fn save(&self, alert: NewAlert) -> StoreResult<AlertId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.alerts.insert(id, alert.into_alert(id));
        Ok(id)
    }

    async fn mark_resolved(
        &self,
        alert_id: AlertId,
        resolved_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut alert = self.alerts.get_mut(&alert_id).ok_or(StoreError::NotFound {
            entity: "alert",
            id: alert_id,
        })?;
        if !alert.resolved {
            alert.resolved = true;
            alert.resolved_at = Some(resolved_at);
        }
        Ok(())
    }
}

/// Registry of known devices
#[derive(Debug, Default)]
pub struct MemoryDeviceDirectory {
    devices: DashMap<DeviceId, Device>,
}

impl MemoryDeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, device: Device) {
        debug!(device_id = device.id, code = %device.code, "Registering device");
        self.devices.insert(device.id, device);
    }

    /// Returns false if the device is unknown
    pub fn set_active(&self, device_id: DeviceId, active: bool) -> bool {
        match self.devices.get_mut(&device_id) {
            Some(mut device) => {
                device.active = active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl DeviceDirectory for MemoryDeviceDirectory {
    async fn get(&self, device_id: DeviceId) -> StoreResult<Option<Device>> {
        Ok(self.devices.get(&device_id).map(|d| d.value().clone()))
    }

    async fn active(&self) -> StoreResult<Vec<Device>> {
        let mut devices: Vec<Device> = self
            .devices
            .iter()
            .filter(|entry| entry.value().active)
            .map(|entry| entry.value().clone())
            .collect();
        devices.sort_by_key(|d| d.id);
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertDetails, AlertSeverity};
    use chrono::{Duration, TimeZone};

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn record(device_id: DeviceId, minute: i64, value: f64, class: Classification) -> JudgedRecord {
        JudgedRecord {
            device_id,
            timestamp: ts(minute),
            accumulated_value: value,
            delta_value: Some(1.0),
            classification: class,
            reason: "test".to_string(),
        }
    }

    fn new_alert(device_id: DeviceId, alert_type: AlertType, created_at: DateTime<Utc>) -> NewAlert {
        NewAlert {
            device_id,
            alert_type,
            severity: AlertSeverity::Critical,
            message: "test".to_string(),
            details: AlertDetails::NegativeDelta {
                delta_values: vec![],
                timestamps: vec![],
            },
            created_at,
        }
    }

    #[tokio::test]
    async fn test_records_are_ordered_and_queryable() {
        let store = MemoryRecordStore::new();
        // Out-of-order arrival
        store.append(record(1, 30, 30.0, Classification::Valid)).await.unwrap();
        store.append(record(1, 0, 0.0, Classification::Valid)).await.unwrap();
        store.append(record(1, 15, 15.0, Classification::Quarantine)).await.unwrap();
        store.append(record(2, 45, 99.0, Classification::Valid)).await.unwrap();

        let latest = store.latest_n(1, 2).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].timestamp, ts(30));
        assert_eq!(latest[1].timestamp, ts(15));

        let before = store.latest_before(1, ts(30)).await.unwrap().unwrap();
        assert_eq!(before.timestamp, ts(15));
        assert!(store.latest_before(1, ts(0)).await.unwrap().is_none());

        let since = store.since(1, ts(15)).await.unwrap();
        assert_eq!(since.len(), 2);
        assert!(since.iter().all(|r| r.timestamp >= ts(15)));

        assert_eq!(store.len(), 4);
        assert!(store.latest_n(3, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_valid_projection_only_holds_valid_records() {
        let store = MemoryRecordStore::new();
        store.append(record(1, 0, 0.0, Classification::Valid)).await.unwrap();
        store.append(record(1, 15, 5.0, Classification::Uncertain)).await.unwrap();
        store.append(record(1, 30, 2.0, Classification::Quarantine)).await.unwrap();

        let valid = store.valid_records(1);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].timestamp, ts(0));
        assert_eq!(store.records(1).len(), 3);
    }

    #[tokio::test]
    async fn test_remove_drops_record_from_both_views() {
        let store = MemoryRecordStore::new();
        let kept = store.append(record(1, 0, 0.0, Classification::Valid)).await.unwrap();
        let dropped = store.append(record(1, 15, 40.0, Classification::Valid)).await.unwrap();

        store.remove(1, dropped).await.unwrap();
        assert_eq!(store.records(1).len(), 1);
        assert_eq!(store.valid_records(1).len(), 1);
        assert_eq!(store.valid_records(1)[0].timestamp, ts(0));

        assert!(matches!(
            store.remove(1, dropped).await,
            Err(StoreError::NotFound { entity: "record", .. })
        ));
        assert!(store.remove(2, kept).await.is_err());
    }

    #[tokio::test]
    async fn test_alert_lookups() {
        let store = MemoryAlertStore::new();
        let id = store
            .save(new_alert(1, AlertType::NegativeDelta, ts(0)))
            .await
            .unwrap();
        store
            .save(new_alert(2, AlertType::NegativeDelta, ts(0)))
            .await
            .unwrap();

        let found = store.find_unresolved(1, AlertType::NegativeDelta).await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(id));
        assert!(store
            .find_unresolved(1, AlertType::FrozenValue)
            .await
            .unwrap()
            .is_none());

        assert!(store
            .find_created_since(1, AlertType::NegativeDelta, ts(-60))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_created_since(1, AlertType::NegativeDelta, ts(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_mark_resolved_is_terminal() {
        let store = MemoryAlertStore::new();
        let id = store
            .save(new_alert(1, AlertType::FrozenValue, ts(0)))
            .await
            .unwrap();

        store.mark_resolved(id, ts(10)).await.unwrap();
        store.mark_resolved(id, ts(20)).await.unwrap();

        let alert = store.get(id).await.unwrap().unwrap();
        assert!(alert.resolved);
        assert_eq!(alert.resolved_at, Some(ts(10)));
        assert!(store.unresolved_for_device(1).await.unwrap().is_empty());

        let missing = store.mark_resolved(999, ts(30)).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_stats_and_devices() {
        let stats: MemoryStatsProvider = [HourlyStats {
            device_id: 1,
            hour_of_day: 12,
            avg_delta: Some(50.0),
            std_delta: Some(5.0),
            sample_count: 10,
        }]
        .into_iter()
        .collect();
        assert!(stats.get(1, 12).await.unwrap().is_some());
        assert!(stats.get(1, 13).await.unwrap().is_none());

        let loaded = MemoryStatsProvider::from_json(
            r#"[{"device_id": 1, "hour_of_day": 9, "avg_delta": null, "std_delta": null, "sample_count": 0}]"#,
        )
        .unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.get(1, 9).await.unwrap().unwrap().avg_delta.is_none());
        assert!(MemoryStatsProvider::from_json("{").is_err());

        let devices = MemoryDeviceDirectory::new();
        devices.register(Device::new(2, "INV-002"));
        devices.register(Device::new(1, "INV-001"));
        assert!(devices.set_active(2, false));
        assert!(!devices.set_active(9, false));

        let active = devices.active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].code, "INV-001");
        assert_eq!(devices.get(2).await.unwrap().map(|d| d.active), Some(false));
    }
}
