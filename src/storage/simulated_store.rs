//! Simulated Object Store with Fault Injection
//!
//! DST-compatible wrapper that injects faults using buggify.
//! Follows FoundationDB patterns for deterministic simulation testing.

use super::object_store::{ObjectMeta, ObjectStore, StoreFuture};
use crate::buggify::faults::object_store as faults;
use crate::buggify::{FaultConfig, FaultInjector, FaultStats};
use crate::io::Rng;
use parking_lot::Mutex;
use std::io::{Error as IoError, ErrorKind};
use std::sync::Arc;

/// Configuration for simulated fault injection
#[derive(Debug, Clone)]
pub struct SimulatedStoreConfig {
    /// Probability of PUT operation failure
    pub put_fail_prob: f64,
    /// Probability of GET operation failure
    pub get_fail_prob: f64,
    /// Probability of GET returning corrupted data
    pub get_corrupt_prob: f64,
    /// Probability of operation timeout
    pub timeout_prob: f64,
    /// Probability of a PUT persisting only a prefix of the data
    pub partial_write_prob: f64,
    /// Probability of DELETE failure
    pub delete_fail_prob: f64,
    /// Probability of RENAME failure
    pub rename_fail_prob: f64,
    /// Simulated latency range in microseconds (min, max)
    pub latency_range_us: (u64, u64),
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.01,
            get_fail_prob: 0.01,
            get_corrupt_prob: 0.001,
            timeout_prob: 0.005,
            partial_write_prob: 0.005,
            delete_fail_prob: 0.01,
            rename_fail_prob: 0.01,
            latency_range_us: (100, 10_000),
        }
    }
}

impl SimulatedStoreConfig {
    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.05,
            get_fail_prob: 0.05,
            get_corrupt_prob: 0.01,
            timeout_prob: 0.02,
            partial_write_prob: 0.02,
            delete_fail_prob: 0.05,
            rename_fail_prob: 0.05,
            latency_range_us: (1_000, 100_000),
        }
    }

    /// Operation failures only: no corruption, no partial writes
    ///
    /// A failed operation leaves the inner store untouched, which is the
    /// fault model the ingestion invariants are checked against.
    pub fn clean_failures(fail_prob: f64) -> Self {
        SimulatedStoreConfig {
            put_fail_prob: fail_prob,
            get_fail_prob: fail_prob,
            rename_fail_prob: fail_prob,
            ..Self::no_faults()
        }
    }

    /// Per-site probabilities for the fault injector
    pub fn fault_config(&self) -> FaultConfig {
        FaultConfig::new()
            .with(faults::PUT_FAIL, self.put_fail_prob)
            .with(faults::GET_FAIL, self.get_fail_prob)
            .with(faults::GET_CORRUPT, self.get_corrupt_prob)
            .with(faults::TIMEOUT, self.timeout_prob)
            .with(faults::PARTIAL_WRITE, self.partial_write_prob)
            .with(faults::DELETE_FAIL, self.delete_fail_prob)
            .with(faults::RENAME_FAIL, self.rename_fail_prob)
    }

    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.0,
            get_fail_prob: 0.0,
            get_corrupt_prob: 0.0,
            timeout_prob: 0.0,
            partial_write_prob: 0.0,
            delete_fail_prob: 0.0,
            rename_fail_prob: 0.0,
            latency_range_us: (0, 0),
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default)]
pub struct SimulatedStoreStats {
    pub put_attempts: u64,
    pub put_failures: u64,
    pub get_attempts: u64,
    pub get_failures: u64,
    pub get_corruptions: u64,
    pub delete_attempts: u64,
    pub delete_failures: u64,
    pub rename_attempts: u64,
    pub rename_failures: u64,
    pub timeouts: u64,
    pub partial_writes: u64,
}

struct SimulatedStoreInner<R: Rng> {
    faults: FaultInjector<R>,
    stats: SimulatedStoreStats,
}

/// Simulated object store that wraps another store and injects faults
pub struct SimulatedObjectStore<S: ObjectStore, R: Rng> {
    inner_store: S,
    config: SimulatedStoreConfig,
    state: Arc<Mutex<SimulatedStoreInner<R>>>,
}

impl<S: ObjectStore + Clone, R: Rng> Clone for SimulatedObjectStore<S, R> {
    fn clone(&self) -> Self {
        SimulatedObjectStore {
            inner_store: self.inner_store.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S: ObjectStore, R: Rng> SimulatedObjectStore<S, R> {
    pub fn new(inner_store: S, rng: R, config: SimulatedStoreConfig) -> Self {
        SimulatedObjectStore {
            inner_store,
            state: Arc::new(Mutex::new(SimulatedStoreInner {
                faults: FaultInjector::new(rng, config.fault_config()),
                stats: SimulatedStoreStats::default(),
            })),
            config,
        }
    }

    pub fn stats(&self) -> SimulatedStoreStats {
        self.state.lock().stats.clone()
    }

    /// Per-site check and trigger counts
    pub fn fault_stats(&self) -> FaultStats {
        self.state.lock().faults.stats().clone()
    }

    fn roll(&self, fault_id: &'static str) -> bool {
        let mut s = self.state.lock();
        crate::buggify!(s.faults, fault_id)
    }

    fn check_timeout(&self) -> std::io::Result<()> {
        if self.roll(faults::TIMEOUT) {
            self.state.lock().stats.timeouts += 1;
            return Err(IoError::new(ErrorKind::TimedOut, "simulated timeout"));
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        let (min, max) = self.config.latency_range_us;
        if min == 0 && max == 0 {
            return;
        }
        let latency_us = {
            let mut s = self.state.lock();
            s.faults.draw(min, max)
        };
        if latency_us > 0 {
            tokio::time::sleep(std::time::Duration::from_micros(latency_us)).await;
        }
    }
}

impl<S: ObjectStore, R: Rng + 'static> ObjectStore for SimulatedObjectStore<S, R> {
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.state.lock().stats.put_attempts += 1;
            self.check_timeout()?;

            if self.roll(faults::PUT_FAIL) {
                self.state.lock().stats.put_failures += 1;
                return Err(IoError::new(ErrorKind::Other, "simulated put failure"));
            }

            let partial = data.len() > 1
                && self.roll(faults::PARTIAL_WRITE);
            let write_len = if partial {
                let mut s = self.state.lock();
                s.stats.partial_writes += 1;
                s.faults.draw(1, data.len() as u64) as usize
            } else {
                data.len()
            };

            self.simulate_latency().await;
            self.inner_store.put(key, &data[..write_len]).await
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            self.state.lock().stats.get_attempts += 1;
            self.check_timeout()?;

            if self.roll(faults::GET_FAIL) {
                self.state.lock().stats.get_failures += 1;
                return Err(IoError::new(ErrorKind::Other, "simulated get failure"));
            }

            self.simulate_latency().await;
            let mut data = self.inner_store.get(key).await?;

            if !data.is_empty() && self.roll(faults::GET_CORRUPT) {
                let idx = {
                    let mut s = self.state.lock();
                    s.stats.get_corruptions += 1;
                    s.faults.draw(0, data.len() as u64) as usize
                };
                data[idx] ^= 0xFF;
            }

            Ok(data)
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.state.lock().stats.delete_attempts += 1;

            if self.roll(faults::DELETE_FAIL) {
                self.state.lock().stats.delete_failures += 1;
                return Err(IoError::new(ErrorKind::Other, "simulated delete failure"));
            }

            self.inner_store.delete(key).await
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<ObjectMeta>> {
        self.inner_store.list(prefix)
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.state.lock().stats.rename_attempts += 1;

            if self.roll(faults::RENAME_FAIL) {
                self.state.lock().stats.rename_failures += 1;
                return Err(IoError::new(ErrorKind::Other, "simulated rename failure"));
            }

            self.simulate_latency().await;
            self.inner_store.rename(from, to).await
        })
    }
}
