//! Per-device mutual exclusion
//!
//! Classification of reading N needs reading N-1 to be durably judged, and
//! alert dedup is a check-then-insert sequence. Both run while holding the
//! device's guard. Devices never share a lock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::DeviceId;

/// Registry of one async mutex per device
#[derive(Debug, Clone, Default)]
pub struct DeviceLocks {
    locks: Arc<DashMap<DeviceId, Arc<Mutex<()>>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a device
    pub async fn lock(&self, device_id: DeviceId) -> DeviceGuard {
        // Clone the mutex out so the map shard is not held across the await
        let mutex = self.locks.entry(device_id).or_default().value().clone();
        DeviceGuard {
            device_id,
            _guard: mutex.lock_owned().await,
        }
    }

    /// Number of devices that have been locked at least once
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Proof of exclusive access to one device, released on drop
#[derive(Debug)]
pub struct DeviceGuard {
    device_id: DeviceId,
    _guard: OwnedMutexGuard<()>,
}

impl DeviceGuard {
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }
}
