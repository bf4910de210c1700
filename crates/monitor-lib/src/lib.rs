//! Monitor library for cumulative energy readings
//!
//! This crate provides the core functionality for:
//! - Classifying readings against historical per-hour statistics
//! - Alert detection, dedup and resolution under per-device locks
//! - Best-effort alert notification fan-out
//! - Periodic re-evaluation of active devices
//! - Health checks and observability

pub mod alerts;
pub mod classifier;
pub mod error;
pub mod health;
pub mod locks;
pub mod models;
pub mod notifier;
pub mod observability;
pub mod pipeline;
pub mod store;
pub mod sweep;

pub use alerts::{
    Alert, AlertConfig, AlertDetails, AlertEngine, AlertId, AlertNotification, AlertSeverity,
    AlertType, EvaluationOutcome,
};
pub use classifier::{Classifier, Judgement};
pub use error::{MonitorError, Result, StoreError};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use locks::{DeviceGuard, DeviceLocks};
pub use models::*;
pub use notifier::{Notifier, SubscriberHub, Subscription};
pub use observability::{MonitorMetrics, StructuredLogger};
pub use pipeline::{IngestOutcome, ReadingProcessor};
pub use sweep::{SweepLoop, SweepReport};
