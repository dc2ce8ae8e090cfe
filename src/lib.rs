pub mod buggify;
pub mod cache;
pub mod clock;
pub mod config;
pub mod files;
pub mod io;
pub mod locks;
pub mod observability;
pub mod profile;
pub mod server;
pub mod storage;
pub mod telemetry;

pub use config::ServiceConfig;
pub use telemetry::{
    fold, ConsolidatedState, IngestError, IngestReport, IngestRequest, IngestionOrchestrator,
    Metric, MetricValue,
};
