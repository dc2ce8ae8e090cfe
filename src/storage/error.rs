//! Storage error type

use std::io::{Error as IoError, ErrorKind};
use thiserror::Error;

/// Errors surfaced by the metric, state, and profile stores
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error from the object store
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization/deserialization error
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Stored document decoded but is internally inconsistent
    #[error("corrupt object at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Io(e) if e.kind() == ErrorKind::NotFound)
    }
}
