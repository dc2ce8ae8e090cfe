//! Consolidated state store
//!
//! One document per device. Replacement follows the atomic update pattern:
//!
//! 1. Write the document to `{key}.tmp`
//! 2. Rename temp to final (atomic on POSIX)
//! 3. On failure or cancellation the temp is orphaned and the original intact

use super::error::StoreError;
use super::keys::StoreKeys;
use super::metric_store::StoreResultFuture;
use super::object_store::ObjectStore;
use crate::telemetry::ConsolidatedState;
use std::sync::Arc;
use tracing::warn;

/// Durable home of each device's consolidated state
pub trait StateStore: Send + Sync + 'static {
    /// Current state, or `None` if the device has never been consolidated
    fn read<'a>(&'a self, device_id: &'a str) -> StoreResultFuture<'a, Option<ConsolidatedState>>;

    /// Replace the whole document; readers see the old or the new one, never a mix
    fn replace<'a>(
        &'a self,
        device_id: &'a str,
        state: &'a ConsolidatedState,
    ) -> StoreResultFuture<'a, ()>;
}

impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    fn read<'a>(&'a self, device_id: &'a str) -> StoreResultFuture<'a, Option<ConsolidatedState>> {
        (**self).read(device_id)
    }

    fn replace<'a>(
        &'a self,
        device_id: &'a str,
        state: &'a ConsolidatedState,
    ) -> StoreResultFuture<'a, ()> {
        (**self).replace(device_id, state)
    }
}

/// State store on top of an object store
pub struct ObjectStateStore<S: ObjectStore> {
    store: S,
    keys: StoreKeys,
}

impl<S: ObjectStore + Clone> Clone for ObjectStateStore<S> {
    fn clone(&self) -> Self {
        ObjectStateStore {
            store: self.store.clone(),
            keys: self.keys.clone(),
        }
    }
}

impl<S: ObjectStore> ObjectStateStore<S> {
    pub fn new(store: S, keys: StoreKeys) -> Self {
        ObjectStateStore { store, keys }
    }
}

impl<S: ObjectStore> StateStore for ObjectStateStore<S> {
    fn read<'a>(&'a self, device_id: &'a str) -> StoreResultFuture<'a, Option<ConsolidatedState>> {
        Box::pin(async move {
            let key = self.keys.state(device_id);
            let data = match self.store.get(&key).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            let state: ConsolidatedState = serde_json::from_slice(&data)?;
            if let Some(name) = state.misplaced_entry() {
                return Err(StoreError::Corrupt {
                    key,
                    reason: format!("entry '{}' holds a metric with a different name", name),
                });
            }
            Ok(Some(state))
        })
    }

    fn replace<'a>(
        &'a self,
        device_id: &'a str,
        state: &'a ConsolidatedState,
    ) -> StoreResultFuture<'a, ()> {
        Box::pin(async move {
            let key = self.keys.state(device_id);
            let temp_key = self.keys.state_temp(device_id);
            let data = serde_json::to_vec(state)?;

            self.store.put(&temp_key, &data).await?;

            if let Err(e) = self.store.rename(&temp_key, &key).await {
                if let Err(cleanup) = self.store.delete(&temp_key).await {
                    warn!("Failed to remove orphaned state temp {}: {}", temp_key, cleanup);
                }
                return Err(e.into());
            }
            Ok(())
        })
    }
}
