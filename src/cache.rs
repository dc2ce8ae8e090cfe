//! Bounded lookaside cache
//!
//! LRU with a fixed capacity and a time-to-live per entry. Expired entries
//! are dropped when touched or by `purge_expired`; the least recently used
//! entry is evicted when the cache is full. Callers invalidate explicitly
//! whenever the backing data changes.

use crate::clock::{Clock, ProductionClock};
use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    value: V,
    inserted_at_ms: u64,
}

struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, Entry<V>>,
    stats: CacheStats,
}

/// Thread-safe LRU + TTL cache
///
/// A zero `ttl` disables expiry; a zero capacity is treated as one.
pub struct BoundedCache<K: Hash + Eq, V, C: Clock = ProductionClock> {
    inner: Mutex<Inner<K, V>>,
    ttl: Duration,
    clock: C,
}

impl<K: Hash + Eq + Clone, V: Clone> BoundedCache<K, V, ProductionClock> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, ProductionClock::new())
    }
}

impl<K: Hash + Eq + Clone, V: Clone, C: Clock> BoundedCache<K, V, C> {
    pub fn with_clock(capacity: usize, ttl: Duration, clock: C) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        BoundedCache {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            ttl,
            clock,
        }
    }

    fn is_expired(&self, entry: &Entry<V>, now_ms: u64) -> bool {
        !self.ttl.is_zero()
            && now_ms.saturating_sub(entry.inserted_at_ms) >= self.ttl.as_millis() as u64
    }

    /// Cached value, if present and fresh
    pub fn get(&self, key: &K) -> Option<V> {
        let now_ms = self.clock.now_ms();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get(key) {
            Some(entry) if !self.is_expired(entry, now_ms) => {
                let value = entry.value.clone();
                inner.stats.hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.pop(key);
            inner.stats.expirations += 1;
        }
        inner.stats.misses += 1;
        None
    }

    /// Insert or refresh a value
    pub fn insert(&self, key: K, value: V) {
        let entry = Entry {
            value,
            inserted_at_ms: self.clock.now_ms(),
        };
        let mut inner = self.inner.lock();
        let replacing = inner.entries.contains(&key);
        if inner.entries.push(key, entry).is_some() && !replacing {
            inner.stats.evictions += 1;
        }
    }

    /// Drop a key; returns true if it was cached
    pub fn invalidate(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.entries.pop(key).is_some();
        if removed {
            inner.stats.invalidations += 1;
        }
        removed
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now_ms = self.clock.now_ms();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired: Vec<K> = inner
            .entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now_ms))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.entries.pop(key);
        }
        inner.stats.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().entries.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }
}
