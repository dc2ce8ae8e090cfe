//! Ingestion orchestrator
//!
//! Drives one batch through the pipeline:
//!
//! ```text
//! Received -> Validated -> MetricsPersisted -> StateFolded -> StatePersisted -> Completed
//!     \__________\______________\________________\________________\__________-> Failed
//! ```
//!
//! Raw metrics are appended one at a time, in order, outside any lock. Only
//! the read-fold-replace of the device's state runs inside the per-device
//! exclusive section, so a concurrent batch for the same device can never
//! overwrite a fold it did not see.

use super::consolidation::fold;
use super::error::{IngestError, MetricWriteFailure};
use super::types::{IngestRequest, Metric};
use crate::locks::KeyLocks;
use crate::storage::{MetricStore, StateStore};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Pipeline stage, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Received,
    Validated,
    MetricsPersisted,
    StateFolded,
    StatePersisted,
    Completed,
    Failed,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Received => "received",
            IngestStage::Validated => "validated",
            IngestStage::MetricsPersisted => "metrics_persisted",
            IngestStage::StateFolded => "state_folded",
            IngestStage::StatePersisted => "state_persisted",
            IngestStage::Completed => "completed",
            IngestStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful ingestion call
///
/// Non-empty `failures` means partial success: the listed metrics were not
/// persisted and did not influence the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub device_id: String,
    pub accepted: usize,
    pub failures: Vec<MetricWriteFailure>,
    pub state_changed: bool,
}

impl IngestReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Validates batches, persists raw metrics, and maintains consolidated state
pub struct IngestionOrchestrator<M: MetricStore, S: StateStore> {
    metrics: M,
    states: S,
    locks: KeyLocks,
}

impl<M: MetricStore, S: StateStore> IngestionOrchestrator<M, S> {
    pub fn new(metrics: M, states: S) -> Self {
        IngestionOrchestrator {
            metrics,
            states,
            locks: KeyLocks::new(),
        }
    }

    pub fn metric_store(&self) -> &M {
        &self.metrics
    }

    pub fn state_store(&self) -> &S {
        &self.states
    }

    pub fn device_locks(&self) -> &KeyLocks {
        &self.locks
    }

    /// Parse a JSON payload and ingest it
    pub async fn ingest_payload(&self, payload: &[u8]) -> Result<IngestReport, IngestError> {
        if payload.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(IngestError::InvalidRequest("empty payload".to_string()));
        }

        let request: IngestRequest = serde_json::from_slice(payload)
            .map_err(|e| IngestError::InvalidRequest(format!("malformed payload: {}", e)))?;

        self.ingest(request).await
    }

    /// Ingest one batch
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport, IngestError> {
        let IngestRequest { device_id, metrics } = request;
        debug!(
            "[{}] device={} metrics={}",
            IngestStage::Received,
            device_id,
            metrics.len()
        );

        if let Err(e) = validate(&device_id, &metrics) {
            debug!("[{}] device={} error={}", IngestStage::Failed, device_id, e);
            return Err(e);
        }
        debug!("[{}] device={}", IngestStage::Validated, device_id);

        if metrics.is_empty() {
            debug!("[{}] device={} empty batch", IngestStage::Completed, device_id);
            return Ok(IngestReport {
                device_id,
                accepted: 0,
                failures: Vec::new(),
                state_changed: false,
            });
        }

        let submitted = metrics.len();
        let mut persisted = Vec::with_capacity(submitted);
        let mut failures = Vec::new();
        for (index, metric) in metrics.into_iter().enumerate() {
            let appended = self.metrics.append(&device_id, &metric).await;
            match appended {
                Ok(()) => persisted.push(metric),
                Err(e) => failures.push(MetricWriteFailure {
                    index,
                    name: metric.name,
                    reason: e.to_string(),
                }),
            }
        }

        if persisted.is_empty() {
            let err = IngestError::MetricWrite { failures };
            warn!("Device {}: {}", device_id, err);
            debug!("[{}] device={}", IngestStage::Failed, device_id);
            return Err(err);
        }
        if !failures.is_empty() {
            warn!(
                "Device {}: {} of {} metrics failed to persist",
                device_id,
                failures.len(),
                submitted
            );
        }
        debug!(
            "[{}] device={} persisted={}",
            IngestStage::MetricsPersisted,
            device_id,
            persisted.len()
        );

        let state_changed = self.consolidate(&device_id, &persisted).await?;

        info!(
            "Ingested batch for device {}: accepted={} failed={} state_changed={}",
            device_id,
            persisted.len(),
            failures.len(),
            state_changed
        );
        debug!("[{}] device={}", IngestStage::Completed, device_id);

        Ok(IngestReport {
            device_id,
            accepted: persisted.len(),
            failures,
            state_changed,
        })
    }

    /// Read, fold, and replace the device state under its lock
    async fn consolidate(&self, device_id: &str, persisted: &[Metric]) -> Result<bool, IngestError> {
        let _guard = self.locks.lock(device_id).await;

        let previous = self.states.read(device_id).await.map_err(|source| {
            error!("[{}] device={} state read failed: {}", IngestStage::Failed, device_id, source);
            IngestError::StateRead {
                device_id: device_id.to_string(),
                source,
            }
        })?;

        let folded = fold(previous.clone(), persisted);
        let changed = previous.as_ref() != Some(&folded);
        debug!(
            "[{}] device={} entries={} changed={}",
            IngestStage::StateFolded,
            device_id,
            folded.len(),
            changed
        );

        if changed {
            self.states
                .replace(device_id, &folded)
                .await
                .map_err(|source| {
                    error!(
                        "[{}] device={} state write failed: {}",
                        IngestStage::Failed,
                        device_id,
                        source
                    );
                    IngestError::StateWrite {
                        device_id: device_id.to_string(),
                        source,
                    }
                })?;
            debug!("[{}] device={}", IngestStage::StatePersisted, device_id);
        }

        Ok(changed)
    }
}

fn validate(device_id: &str, metrics: &[Metric]) -> Result<(), IngestError> {
    if device_id.trim().is_empty() {
        return Err(IngestError::InvalidRequest("deviceId must not be empty".to_string()));
    }
    if let Some(index) = metrics.iter().position(|m| m.name.trim().is_empty()) {
        return Err(IngestError::InvalidRequest(format!(
            "metric at index {} has an empty name",
            index
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::ErrorKind;

    #[test]
    fn test_validate_rejects_empty_device() {
        let err = validate("  ", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_validate_rejects_empty_metric_name() {
        let metrics = vec![Metric::new("ok", 1.0, 1), Metric::new("", 2.0, 2)];
        let err = validate("d1", &metrics).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid request: metric at index 1 has an empty name"
        );
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(IngestStage::MetricsPersisted.to_string(), "metrics_persisted");
        assert_eq!(IngestStage::Failed.to_string(), "failed");
    }

    #[test]
    fn test_report_partial_flag() {
        let mut report = IngestReport {
            device_id: "d1".into(),
            accepted: 1,
            failures: Vec::new(),
            state_changed: true,
        };
        assert!(!report.is_partial());
        report.failures.push(MetricWriteFailure {
            index: 1,
            name: "x".into(),
            reason: "disk".into(),
        });
        assert!(report.is_partial());
    }
}
