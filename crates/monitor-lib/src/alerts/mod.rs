//! Alert lifecycle
//!
//! Detection, dedup and resolution of device alerts:
//! - ConsecutiveQuarantine: the latest N records are all quarantined
//! - NegativeDelta: a negative delta within the trailing hour
//! - FrozenValue: the counter stood still during the generation window

mod detectors;
mod engine;
mod resolution;
mod types;

pub use detectors::{
    alert_message, ConsecutiveQuarantineDetector, FrozenValueDetector, NegativeDeltaDetector,
    DEFAULT_CONSECUTIVE_THRESHOLD,
};
pub use engine::{AlertConfig, AlertEngine, EvaluationOutcome};
pub use resolution::{ResolutionInput, Resolver};
pub use types::{Alert, AlertDetails, AlertId, AlertNotification, AlertSeverity, AlertType, NewAlert};
