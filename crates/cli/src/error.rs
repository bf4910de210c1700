//! CLI error types

use std::path::PathBuf;

use monitor_lib::MonitorError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("invalid timestamp '{0}', expected RFC 3339 or YYYY-MM-DDTHH:MM:SS")]
    InvalidTimestamp(String),

    #[error("utc offset out of range: {0} seconds")]
    InvalidOffset(i32),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: {source}", path.display())]
    Line {
        path: PathBuf,
        line: usize,
        #[source]
        source: MonitorError,
    },
}
