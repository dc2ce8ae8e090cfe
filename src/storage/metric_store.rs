//! Raw metric store
//!
//! Append-only: every accepted metric becomes its own object, never
//! overwritten and never deleted.

use super::error::StoreError;
use super::keys::StoreKeys;
use super::object_store::ObjectStore;
use crate::clock::Clock;
use crate::io::{ProductionRng, Rng};
use crate::telemetry::{Metric, MetricRecord};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Boxed future returned by the telemetry stores
pub type StoreResultFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Durable sink for raw metrics
pub trait MetricStore: Send + Sync + 'static {
    /// Persist one metric for a device
    fn append<'a>(&'a self, device_id: &'a str, metric: &'a Metric) -> StoreResultFuture<'a, ()>;
}

impl<T: MetricStore + ?Sized> MetricStore for Arc<T> {
    fn append<'a>(&'a self, device_id: &'a str, metric: &'a Metric) -> StoreResultFuture<'a, ()> {
        (**self).append(device_id, metric)
    }
}

/// Metric store on top of an object store
///
/// Record keys carry a random writer id drawn at construction, so stores
/// sharing a backend, or a restarted process whose clock repeats, never
/// overwrite each other's records. Clones share the id and the sequence.
pub struct ObjectMetricStore<S: ObjectStore, C: Clock> {
    store: S,
    keys: StoreKeys,
    clock: C,
    writer_id: u64,
    sequence: Arc<AtomicU64>,
}

impl<S: ObjectStore + Clone, C: Clock> Clone for ObjectMetricStore<S, C> {
    fn clone(&self) -> Self {
        ObjectMetricStore {
            store: self.store.clone(),
            keys: self.keys.clone(),
            clock: self.clock.clone(),
            writer_id: self.writer_id,
            sequence: self.sequence.clone(),
        }
    }
}

impl<S: ObjectStore, C: Clock> ObjectMetricStore<S, C> {
    pub fn new(store: S, keys: StoreKeys, clock: C) -> Self {
        let writer_id = ProductionRng::new().next_u64();
        Self::with_writer_id(store, keys, clock, writer_id)
    }

    /// Fixed writer id, for deterministic simulation
    pub fn with_writer_id(store: S, keys: StoreKeys, clock: C, writer_id: u64) -> Self {
        ObjectMetricStore {
            store,
            keys,
            clock,
            writer_id,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn writer_id(&self) -> u64 {
        self.writer_id
    }

    /// Every persisted record for a device, in key order
    ///
    /// Not part of the ingestion path; used to audit the stored history.
    pub async fn scan(&self, device_id: &str) -> Result<Vec<MetricRecord>, StoreError> {
        let objects = self.store.list(&self.keys.metric_prefix(device_id)).await?;
        let mut records = Vec::with_capacity(objects.len());
        for object in objects {
            let data = self.store.get(&object.key).await?;
            records.push(serde_json::from_slice(&data)?);
        }
        Ok(records)
    }
}

impl<S: ObjectStore, C: Clock> MetricStore for ObjectMetricStore<S, C> {
    fn append<'a>(&'a self, device_id: &'a str, metric: &'a Metric) -> StoreResultFuture<'a, ()> {
        Box::pin(async move {
            let record = MetricRecord {
                device_id: device_id.to_string(),
                metric: metric.clone(),
                received_at_ms: self.clock.now_ms(),
                writer_id: self.writer_id,
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            };
            let key = self.keys.metric_record(
                device_id,
                record.received_at_ms,
                record.writer_id,
                record.sequence,
            );
            let data = serde_json::to_vec(&record)?;

            self.store.put(&key, &data).await?;
            Ok(())
        })
    }
}
