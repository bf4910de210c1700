//! Error types for the monitor library

use crate::alerts::AlertId;
use crate::models::DeviceId;

/// Errors raised by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not complete the operation.
    #[error("Store: backend unavailable: {0}")]
    Unavailable(String),

    /// A referenced row does not exist.
    #[error("Store: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: i64 },
}

/// Errors surfaced by classification, alerting and configuration.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Reading rejected before classification.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),

    #[error("alert {0} not found")]
    AlertNotFound(AlertId),

    /// A judged record or alert could not be written or read; the evaluation
    /// for the affected reading is not committed.
    #[error("persistence failure during {operation}: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MonitorError {
    pub fn persistence(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| MonitorError::Persistence { operation, source }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_error_keeps_source() {
        let err = MonitorError::persistence("append record")(StoreError::Unavailable(
            "disk full".to_string(),
        ));
        assert!(err.to_string().contains("append record"));
        assert!(err.to_string().contains("disk full"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
