//! Ingestion errors

use crate::storage::StoreError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A metric that could not be persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricWriteFailure {
    /// Position in the submitted batch
    pub index: usize,
    pub name: String,
    pub reason: String,
}

/// Why an ingestion call failed
///
/// Partial metric failures are not errors; they travel in the report.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("all {} metrics failed to persist", .failures.len())]
    MetricWrite { failures: Vec<MetricWriteFailure> },

    #[error("failed to read state for device {device_id}: {source}")]
    StateRead {
        device_id: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to write state for device {device_id}: {source}")]
    StateWrite {
        device_id: String,
        #[source]
        source: StoreError,
    },
}

/// Stable classification of [`IngestError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    MetricWriteFailure,
    StateReadFailure,
    StateWriteFailure,
}

impl ErrorKind {
    /// Wire code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::MetricWriteFailure => "METRIC_WRITE_FAILURE",
            ErrorKind::StateReadFailure => "STATE_READ_FAILURE",
            ErrorKind::StateWriteFailure => "STATE_WRITE_FAILURE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            IngestError::MetricWrite { .. } => ErrorKind::MetricWriteFailure,
            IngestError::StateRead { .. } => ErrorKind::StateReadFailure,
            IngestError::StateWrite { .. } => ErrorKind::StateWriteFailure,
        }
    }
}
