//! Telemetry ingestion and state consolidation
//!
//! Devices push batches of timestamped metrics. Every metric is stored as a
//! raw record, and a per-device consolidated state keeps the most recent
//! value per metric name, ordered by producer timestamp rather than arrival.

pub mod consolidation;
pub mod dst;
pub mod error;
pub mod ingest;
pub mod types;

pub use consolidation::{fold, ConsolidatedState};
pub use dst::{
    run_dst_batch, summarize_batch, IngestDSTConfig, IngestDSTHarness, IngestDSTResult,
};
pub use error::{ErrorKind, IngestError, MetricWriteFailure};
pub use ingest::{IngestReport, IngestStage, IngestionOrchestrator};
pub use types::{IngestRequest, Metric, MetricRecord, MetricValue};
