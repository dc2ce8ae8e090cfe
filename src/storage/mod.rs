//! Persistence layer
//!
//! Everything durable goes through the [`ObjectStore`] trait, so the same
//! metric, state, and profile stores run against memory, the local
//! filesystem, or the fault-injecting simulator.

pub mod error;
pub mod keys;
pub mod metric_store;
pub mod object_store;
pub mod simulated_store;
pub mod state_store;

pub use error::StoreError;
pub use keys::{escape_component, StoreKeys};
pub use metric_store::{MetricStore, ObjectMetricStore, StoreResultFuture};
pub use object_store::{
    InMemoryObjectStore, LocalFsObjectStore, ObjectMeta, ObjectStore, SharedObjectStore,
    StoreFuture,
};
pub use simulated_store::{SimulatedObjectStore, SimulatedStoreConfig, SimulatedStoreStats};
pub use state_store::{ObjectStateStore, StateStore};
