use std::io;

use thiserror::Error;

use crate::types::ObjectName;

/// Error type for configuration, scenario IO, and remote store failures.
///
/// Recoverable conditions (failed lookup queries, per-record save failures,
/// poll exhaustion) are logged at their recovery site and never surface here.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("scenario directory '{path}' is unavailable: {reason}")]
    ScenarioUnavailable { path: String, reason: String },
    #[error("remote store rejected {operation} on '{object}': {reason}")]
    Store {
        object: ObjectName,
        operation: String,
        reason: String,
    },
    #[error("analytics store failure: {0}")]
    Analytics(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}
