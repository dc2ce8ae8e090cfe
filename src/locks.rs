//! Per-key exclusive sections
//!
//! Calls for the same key (a device id, a user id) queue on one async mutex;
//! different keys never share a lock. Entries are dropped from the registry
//! once nobody holds or waits on them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-key locks
#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a key
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let entry = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = entry.lock_owned().await;
        KeyGuard {
            registry: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys with a live entry
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    /// Drop entries nobody holds or waits on
    ///
    /// Catches entries left behind by callers cancelled while waiting.
    pub fn prune(&self) {
        self.locks
            .lock()
            .retain(|_, entry| Arc::strong_count(entry) > 1);
    }

    fn release(&self, key: &str) {
        let mut locks = self.locks.lock();
        if let Some(entry) = locks.get(key) {
            // Only the registry's own reference is left.
            if Arc::strong_count(entry) == 1 {
                locks.remove(key);
            }
        }
    }
}

/// Exclusive access to one key; released on drop
pub struct KeyGuard<'a> {
    registry: &'a KeyLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Unlock before pruning so our own reference is gone.
        drop(self.guard.take());
        self.registry.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = KeyLocks::new();
        {
            let guard = locks.lock("d1").await;
            assert_eq!(guard.key(), "d1");
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok(), "different keys must not share a lock");
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::new());
        let held = locks.lock("d1").await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.lock("d1")).await;
        assert!(blocked.is_err(), "second holder must wait");

        drop(held);
        let again = tokio::time::timeout(Duration::from_millis(100), locks.lock("d1")).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let locks = Arc::new(KeyLocks::new());
        let held = locks.lock("d1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock("d1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(held);
        assert!(waiter.await.is_ok());
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_prune_clears_abandoned_entries() {
        let locks = KeyLocks::new();
        let held = locks.lock("d1").await;
        let _ = tokio::time::timeout(Duration::from_millis(10), locks.lock("d1")).await;
        drop(held);
        locks.prune();
        assert!(locks.is_empty());
    }
}
