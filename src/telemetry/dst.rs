//! Deterministic Simulation Testing for Ingestion
//!
//! Shadow-state harness: random batches go through the real orchestrator on
//! top of a fault-injecting object store, while a shadow model folds exactly
//! the metrics each successful call reported as accepted.
//!
//! ## Invariants
//!
//! - The stored state of every device equals the shadow state
//! - Every stored state entry is backed by a raw record
//! - Stored timestamps per name never decrease
//! - Failed calls leave the stored state untouched
//! - Empty batches touch no store at all
//! - No temp state documents are left behind
//!
//! Store faults are clean (an operation fails before touching the inner
//! store), so any divergence is an orchestration bug, not corruption.

use super::consolidation::ConsolidatedState;
use super::error::ErrorKind;
use super::ingest::IngestionOrchestrator;
use super::types::{IngestRequest, Metric, MetricValue};
use crate::buggify::FaultStats;
use crate::clock::SimulatedClock;
use crate::io::{Rng, SimulatedRng};
use crate::storage::{
    InMemoryObjectStore, ObjectMetricStore, ObjectStateStore, ObjectStore, SimulatedObjectStore,
    SimulatedStoreConfig, SimulatedStoreStats, StateStore, StoreKeys,
};
use std::collections::{HashMap, HashSet};

type SimStore = SimulatedObjectStore<InMemoryObjectStore, SimulatedRng>;

/// Configuration for ingestion DST
#[derive(Debug, Clone)]
pub struct IngestDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Object store fault configuration
    pub store_config: SimulatedStoreConfig,
    /// Device ids to draw from
    pub devices: Vec<String>,
    /// Number of distinct metric names
    pub metric_names: u64,
    /// Maximum metrics per batch
    pub max_batch_len: u64,
    /// Timestamps are drawn from `[0, timestamp_range)`; small ranges force ties
    pub timestamp_range: u64,
    /// Probability of an empty batch
    pub empty_batch_probability: f64,
    /// Probability of a batch with an empty metric name
    pub invalid_probability: f64,
    /// Key prefix
    pub prefix: String,
}

impl Default for IngestDSTConfig {
    fn default() -> Self {
        IngestDSTConfig {
            seed: 0,
            store_config: SimulatedStoreConfig::clean_failures(0.05),
            // Includes ids that only differ once escaped.
            devices: ["dev-0", "dev-1", "dev-2", "dev/3", "dev%2F3"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            metric_names: 6,
            max_batch_len: 8,
            timestamp_range: 64,
            empty_batch_probability: 0.05,
            invalid_probability: 0.05,
            prefix: "dst".to_string(),
        }
    }
}

impl IngestDSTConfig {
    pub fn new(seed: u64) -> Self {
        IngestDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// No faults
    pub fn calm(seed: u64) -> Self {
        IngestDSTConfig {
            seed,
            store_config: SimulatedStoreConfig::no_faults(),
            ..Default::default()
        }
    }

    /// Aggressive clean faults
    pub fn chaos(seed: u64) -> Self {
        IngestDSTConfig {
            seed,
            store_config: SimulatedStoreConfig::clean_failures(0.25),
            ..Default::default()
        }
    }

    /// Few devices and names, tiny timestamp range: maximal contention and ties
    pub fn hot_device(seed: u64) -> Self {
        IngestDSTConfig {
            seed,
            devices: vec!["hot".to_string()],
            metric_names: 2,
            timestamp_range: 4,
            ..Default::default()
        }
    }

    /// Latency on every store call so concurrent calls interleave
    pub fn concurrent(seed: u64) -> Self {
        IngestDSTConfig {
            seed,
            store_config: SimulatedStoreConfig {
                latency_range_us: (0, 300),
                ..SimulatedStoreConfig::clean_failures(0.05)
            },
            devices: vec!["dev-a".to_string(), "dev-b".to_string()],
            ..Default::default()
        }
    }
}

/// Outcome of a DST run
#[derive(Debug, Clone)]
pub struct IngestDSTResult {
    pub seed: u64,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub partial_operations: u64,
    pub failed_operations: u64,
    pub invalid_operations: u64,
    pub empty_operations: u64,
    pub accepted_metrics: u64,
    pub invariant_violations: Vec<String>,
    pub store_stats: Option<SimulatedStoreStats>,
    pub fault_stats: Option<FaultStats>,
}

impl IngestDSTResult {
    pub fn new(seed: u64) -> Self {
        IngestDSTResult {
            seed,
            total_operations: 0,
            successful_operations: 0,
            partial_operations: 0,
            failed_operations: 0,
            invalid_operations: 0,
            empty_operations: 0,
            accepted_metrics: 0,
            invariant_violations: Vec::new(),
            store_stats: None,
            fault_stats: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops ({} ok, {} partial, {} failed, {} invalid, {} empty), {} metrics accepted, {} faults fired, {} violations",
            self.seed,
            self.total_operations,
            self.successful_operations,
            self.partial_operations,
            self.failed_operations,
            self.invalid_operations,
            self.empty_operations,
            self.accepted_metrics,
            self.fault_stats.as_ref().map_or(0, FaultStats::total_triggers),
            self.invariant_violations.len()
        )
    }
}

/// Ingestion DST harness
pub struct IngestDSTHarness {
    config: IngestDSTConfig,
    rng: SimulatedRng,
    clock: SimulatedClock,
    inner: InMemoryObjectStore,
    store: SimStore,
    orchestrator: IngestionOrchestrator<ObjectMetricStore<SimStore, SimulatedClock>, ObjectStateStore<SimStore>>,
    audit_metrics: ObjectMetricStore<InMemoryObjectStore, SimulatedClock>,
    audit_states: ObjectStateStore<InMemoryObjectStore>,
    /// Ground truth: fold of every metric reported as accepted
    shadow: HashMap<String, ConsolidatedState>,
    accepted_per_device: HashMap<String, usize>,
    high_water: HashMap<(String, String), i64>,
    next_unique_timestamp: i64,
    result: IngestDSTResult,
}

impl IngestDSTHarness {
    pub fn new(config: IngestDSTConfig) -> Self {
        let mut rng = SimulatedRng::new(config.seed);
        // Independent stream so fault decisions don't shift the workload.
        let fault_rng = SimulatedRng::new(config.seed ^ 0x9E37_79B9_7F4A_7C15);
        let clock = SimulatedClock::new(1_700_000_000_000);
        let keys = StoreKeys::new(&config.prefix);

        let inner = InMemoryObjectStore::new();
        let store = SimulatedObjectStore::new(inner.clone(), fault_rng, config.store_config.clone());

        let writer_id = rng.next_u64();
        let orchestrator = IngestionOrchestrator::new(
            ObjectMetricStore::with_writer_id(store.clone(), keys.clone(), clock.clone(), writer_id),
            ObjectStateStore::new(store.clone(), keys.clone()),
        );
        let audit_metrics =
            ObjectMetricStore::with_writer_id(inner.clone(), keys.clone(), clock.clone(), writer_id);
        let audit_states = ObjectStateStore::new(inner.clone(), keys);

        IngestDSTHarness {
            result: IngestDSTResult::new(config.seed),
            config,
            rng,
            clock,
            inner,
            store,
            orchestrator,
            audit_metrics,
            audit_states,
            shadow: HashMap::new(),
            accepted_per_device: HashMap::new(),
            high_water: HashMap::new(),
            next_unique_timestamp: 0,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(IngestDSTConfig::new(seed))
    }

    fn pick_device(&mut self) -> String {
        let idx = self.rng.gen_range(0, self.config.devices.len() as u64) as usize;
        self.config.devices[idx].clone()
    }

    fn random_value(&mut self) -> MetricValue {
        match self.rng.gen_range(0, 3) {
            0 => MetricValue::Number(self.rng.gen_range(0, 1000) as f64 / 10.0),
            1 => MetricValue::Text(format!("s{}", self.rng.gen_range(0, 10))),
            _ => MetricValue::Boolean(self.rng.gen_bool(0.5)),
        }
    }

    fn random_metric(&mut self, timestamp: i64) -> Metric {
        let name = format!("m{}", self.rng.gen_range(0, self.config.metric_names));
        let value = self.random_value();
        Metric {
            name,
            value,
            timestamp,
        }
    }

    /// Generate the next request
    pub fn next_request(&mut self) -> IngestRequest {
        let device_id = self.pick_device();
        let len = if self.rng.gen_bool(self.config.empty_batch_probability) {
            0
        } else {
            self.rng.gen_range(1, self.config.max_batch_len + 1)
        };

        let mut metrics = Vec::with_capacity(len as usize);
        for _ in 0..len {
            let timestamp = self.rng.gen_range(0, self.config.timestamp_range) as i64;
            metrics.push(self.random_metric(timestamp));
        }

        if !metrics.is_empty() && self.rng.gen_bool(self.config.invalid_probability) {
            let idx = self.rng.gen_range(0, metrics.len() as u64) as usize;
            metrics[idx].name = String::new();
        }

        IngestRequest { device_id, metrics }
    }

    fn violation(&mut self, message: String) {
        self.result
            .invariant_violations
            .push(format!("op {}: {}", self.result.total_operations, message));
    }

    fn store_touches(stats: &SimulatedStoreStats) -> u64 {
        stats.put_attempts + stats.get_attempts + stats.rename_attempts + stats.delete_attempts
    }

    /// Fold accepted metrics into the shadow; returns whether it changed
    fn apply_to_shadow(&mut self, device_id: &str, accepted: &[Metric]) -> bool {
        let had_state = self.shadow.contains_key(device_id);
        let shadow = self.shadow.entry(device_id.to_string()).or_default();
        let mut changed = !had_state;
        for metric in accepted {
            changed |= shadow.observe(metric);
        }
        *self.accepted_per_device.entry(device_id.to_string()).or_insert(0) += accepted.len();
        self.result.accepted_metrics += accepted.len() as u64;
        changed
    }

    /// Run one request through the orchestrator and check the outcome
    pub async fn execute(&mut self, request: IngestRequest) {
        self.result.total_operations += 1;
        self.clock.advance_ms(1);

        let device_id = request.device_id.clone();
        let had_invalid_name = request.metrics.iter().any(|m| m.name.is_empty());
        let touches_before = Self::store_touches(&self.store.stats());

        let outcome = self.orchestrator.ingest(request.clone()).await;
        match outcome {
            Ok(report) => {
                if had_invalid_name {
                    self.violation(format!("invalid batch for {} was accepted", device_id));
                }

                if request.metrics.is_empty() {
                    self.result.empty_operations += 1;
                    if Self::store_touches(&self.store.stats()) != touches_before {
                        self.violation(format!("empty batch for {} touched the store", device_id));
                    }
                    if report.state_changed || report.accepted != 0 {
                        self.violation(format!("empty batch for {} reported changes", device_id));
                    }
                } else {
                    let failed: HashSet<usize> = report.failures.iter().map(|f| f.index).collect();
                    let accepted: Vec<Metric> = request
                        .metrics
                        .into_iter()
                        .enumerate()
                        .filter(|(i, _)| !failed.contains(i))
                        .map(|(_, m)| m)
                        .collect();

                    if report.accepted != accepted.len() {
                        self.violation(format!(
                            "report accepted {} but {} metrics did not fail",
                            report.accepted,
                            accepted.len()
                        ));
                    }
                    if report.is_partial() {
                        self.result.partial_operations += 1;
                    } else {
                        self.result.successful_operations += 1;
                    }

                    let changed = self.apply_to_shadow(&device_id, &accepted);
                    if changed != report.state_changed {
                        self.violation(format!(
                            "state_changed={} for {} but shadow changed={}",
                            report.state_changed, device_id, changed
                        ));
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::InvalidRequest => {
                self.result.invalid_operations += 1;
                if !had_invalid_name {
                    self.violation(format!("valid batch rejected as invalid: {}", e));
                }
                if Self::store_touches(&self.store.stats()) != touches_before {
                    self.violation("invalid batch touched the store".to_string());
                }
            }
            Err(_) => {
                self.result.failed_operations += 1;
            }
        }

        self.check_device(&device_id).await;
    }

    /// Run `operations` sequential random requests
    pub async fn run(&mut self, operations: usize) {
        for _ in 0..operations {
            let request = self.next_request();
            self.execute(request).await;
        }
        self.result.store_stats = Some(self.store.stats());
        self.result.fault_stats = Some(self.store.fault_stats());
    }

    /// Run rounds of concurrent batches
    ///
    /// Timestamps are unique across the run, so the expected state does not
    /// depend on which call wins the device lock first.
    pub async fn run_concurrent(&mut self, rounds: usize, parallelism: usize) {
        for _ in 0..rounds {
            let mut requests = Vec::with_capacity(parallelism);
            for _ in 0..parallelism {
                let device_id = self.pick_device();
                let len = self.rng.gen_range(1, self.config.max_batch_len + 1);
                let mut metrics = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    self.next_unique_timestamp += 1 + self.rng.gen_range(0, 3) as i64;
                    metrics.push(self.random_metric(self.next_unique_timestamp));
                }
                self.rng.shuffle(&mut metrics);
                requests.push(IngestRequest { device_id, metrics });
            }
            self.rng.shuffle(&mut requests);

            self.clock.advance_ms(1);
            let outcomes = futures::future::join_all(
                requests
                    .iter()
                    .map(|request| self.orchestrator.ingest(request.clone())),
            )
            .await;

            for (request, outcome) in requests.into_iter().zip(outcomes) {
                self.result.total_operations += 1;
                match outcome {
                    Ok(report) => {
                        if report.is_partial() {
                            self.result.partial_operations += 1;
                        } else {
                            self.result.successful_operations += 1;
                        }
                        let failed: HashSet<usize> =
                            report.failures.iter().map(|f| f.index).collect();
                        let accepted: Vec<Metric> = request
                            .metrics
                            .into_iter()
                            .enumerate()
                            .filter(|(i, _)| !failed.contains(i))
                            .map(|(_, m)| m)
                            .collect();
                        self.apply_to_shadow(&request.device_id, &accepted);
                    }
                    Err(_) => self.result.failed_operations += 1,
                }
            }

            let devices = self.config.devices.clone();
            for device_id in &devices {
                self.check_device(device_id).await;
            }
        }

        if !self.orchestrator.device_locks().is_empty() {
            self.violation("device lock registry not pruned after all calls finished".to_string());
        }
        self.result.store_stats = Some(self.store.stats());
        self.result.fault_stats = Some(self.store.fault_stats());
    }

    /// Compare one device's stored state against the shadow
    async fn check_device(&mut self, device_id: &str) {
        let read = self.audit_states.read(device_id).await;
        let stored = match read {
            Ok(stored) => stored,
            Err(e) => {
                self.violation(format!("state for {} unreadable: {}", device_id, e));
                return;
            }
        };

        let expected = self.shadow.get(device_id).cloned();
        if stored != expected {
            self.violation(format!(
                "state mismatch for {}: stored={:?} expected={:?}",
                device_id, stored, expected
            ));
        }

        if let Some(state) = stored {
            for (name, metric) in state.iter() {
                let key = (device_id.to_string(), name.clone());
                let previous = self.high_water.insert(key, metric.timestamp);
                if let Some(previous) = previous {
                    if metric.timestamp < previous {
                        self.violation(format!(
                            "timestamp for {}/{} went backwards: {} -> {}",
                            device_id, name, previous, metric.timestamp
                        ));
                    }
                }
            }
        }
    }

    /// Whole-store checks; call after a run
    pub async fn check_invariants(&mut self) {
        let devices = self.config.devices.clone();
        for device_id in &devices {
            self.check_device(device_id).await;

            let scanned = self.audit_metrics.scan(device_id).await;
            let records = match scanned {
                Ok(records) => records,
                Err(e) => {
                    self.violation(format!("records for {} unreadable: {}", device_id, e));
                    continue;
                }
            };

            if records.iter().any(|r| r.device_id != *device_id) {
                self.violation(format!("foreign record under {}'s prefix", device_id));
            }

            let accepted = self.accepted_per_device.get(device_id).copied().unwrap_or(0);
            if records.len() < accepted {
                self.violation(format!(
                    "{} has {} records but {} metrics were accepted",
                    device_id,
                    records.len(),
                    accepted
                ));
            }

            if let Some(state) = self.shadow.get(device_id).cloned() {
                for (name, metric) in state.iter() {
                    if !records.iter().any(|r| &r.metric == metric) {
                        self.violation(format!(
                            "state entry {}/{} has no raw record",
                            device_id, name
                        ));
                    }
                }
            }
        }

        let listing = self.inner.list(self.config.prefix.as_str()).await;
        match listing {
            Ok(objects) => {
                for object in objects.iter().filter(|o| o.key.ends_with(".tmp")) {
                    let message = format!("orphaned temp document {}", object.key);
                    self.violation(message);
                }
            }
            Err(e) => self.violation(format!("store listing failed: {}", e)),
        }
    }

    pub fn result(&self) -> &IngestDSTResult {
        &self.result
    }

    pub fn into_result(self) -> IngestDSTResult {
        self.result
    }
}

/// Run a batch of DST runs with consecutive seeds
pub async fn run_dst_batch(
    base_seed: u64,
    count: usize,
    ops_per_run: usize,
    config_fn: impl Fn(u64) -> IngestDSTConfig,
) -> Vec<IngestDSTResult> {
    let mut results = Vec::with_capacity(count);

    for i in 0..count {
        let seed = base_seed + i as u64;
        let mut harness = IngestDSTHarness::new(config_fn(seed));
        harness.run(ops_per_run).await;
        harness.check_invariants().await;
        results.push(harness.into_result());
    }

    results
}

/// Summary of batch results
pub fn summarize_batch(results: &[IngestDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed_seeds: Vec<u64> = results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.seed)
        .collect();

    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();
    let partial: u64 = results.iter().map(|r| r.partial_operations).sum();
    let failed: u64 = results.iter().map(|r| r.failed_operations).sum();

    let mut summary = format!(
        "Batch: {}/{} passed, {} total ops, {} partial, {} failed",
        passed, total, total_ops, partial, failed
    );

    if !failed_seeds.is_empty() {
        summary.push_str(&format!("\nFailed seeds: {:?}", failed_seeds));
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dst_harness_calm() {
        let mut harness = IngestDSTHarness::new(IngestDSTConfig::calm(42));
        harness.run(100).await;
        harness.check_invariants().await;

        let result = harness.result();
        assert!(
            result.is_success(),
            "Calm mode should not have invariant violations: {:?}",
            result.invariant_violations
        );
        assert_eq!(result.failed_operations, 0);
        assert_eq!(result.partial_operations, 0);
    }

    #[tokio::test]
    async fn test_dst_deterministic() {
        let seed = 12345;

        let mut harness1 = IngestDSTHarness::with_seed(seed);
        harness1.run(80).await;
        let mut harness2 = IngestDSTHarness::with_seed(seed);
        harness2.run(80).await;

        let (r1, r2) = (harness1.result(), harness2.result());
        assert_eq!(r1.successful_operations, r2.successful_operations);
        assert_eq!(r1.partial_operations, r2.partial_operations);
        assert_eq!(r1.accepted_metrics, r2.accepted_metrics);
    }

    #[tokio::test]
    async fn test_generated_requests_vary() {
        let mut harness = IngestDSTHarness::with_seed(7);
        let requests: Vec<_> = (0..50).map(|_| harness.next_request()).collect();
        let devices: HashSet<_> = requests.iter().map(|r| r.device_id.clone()).collect();
        assert!(devices.len() > 1);
        assert!(requests.iter().any(|r| r.metrics.len() > 1));
    }
}
