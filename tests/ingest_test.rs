//! Ingestion pipeline integration tests
//!
//! Drives `IngestionOrchestrator` end to end over the object-store backed
//! metric and state stores.

use device_telemetry::clock::SimulatedClock;
use device_telemetry::io::SimulatedRng;
use device_telemetry::storage::{
    InMemoryObjectStore, LocalFsObjectStore, MetricStore, ObjectMetricStore, ObjectStateStore,
    SimulatedObjectStore, SimulatedStoreConfig, StateStore, StoreError, StoreKeys,
    StoreResultFuture,
};
use device_telemetry::telemetry::{
    ConsolidatedState, ErrorKind, IngestError, IngestRequest, IngestionOrchestrator, Metric,
    MetricValue,
};
use std::sync::Arc;
use std::time::Duration;

type MemMetrics = ObjectMetricStore<InMemoryObjectStore, SimulatedClock>;
type MemStates = ObjectStateStore<InMemoryObjectStore>;

fn in_memory() -> (InMemoryObjectStore, IngestionOrchestrator<MemMetrics, MemStates>) {
    let store = InMemoryObjectStore::new();
    let keys = StoreKeys::new("telemetry");
    let orchestrator = IngestionOrchestrator::new(
        ObjectMetricStore::new(store.clone(), keys.clone(), SimulatedClock::new(1_000)),
        ObjectStateStore::new(store.clone(), keys),
    );
    (store, orchestrator)
}

fn temp(value: f64, timestamp: i64) -> Metric {
    Metric::new("temp", value, timestamp)
}

async fn state_of<M: MetricStore, S: StateStore>(
    orchestrator: &IngestionOrchestrator<M, S>,
    device_id: &str,
) -> Option<ConsolidatedState> {
    orchestrator
        .state_store()
        .read(device_id)
        .await
        .unwrap_or_else(|e| panic!("state read failed: {}", e))
}

// =============================================================================
// Consolidation scenarios
// =============================================================================

#[tokio::test]
async fn test_newest_in_batch_wins() {
    let (_, orchestrator) = in_memory();

    let report = orchestrator
        .ingest(IngestRequest::new("d1", vec![temp(20.0, 100), temp(22.0, 200)]))
        .await
        .unwrap();
    assert_eq!(report.accepted, 2);
    assert!(report.state_changed);

    let state = state_of(&orchestrator, "d1").await.unwrap();
    assert_eq!(state.len(), 1);
    assert_eq!(state.get("temp"), Some(&temp(22.0, 200)));
}

#[tokio::test]
async fn test_older_metric_does_not_regress_state() {
    let (store, orchestrator) = in_memory();
    orchestrator
        .ingest(IngestRequest::new("d1", vec![temp(22.0, 200)]))
        .await
        .unwrap();
    let state_key = StoreKeys::new("telemetry").state("d1");
    let before = store.snapshot(&state_key);

    let report = orchestrator
        .ingest(IngestRequest::new("d1", vec![temp(18.0, 150)]))
        .await
        .unwrap();

    assert_eq!(report.accepted, 1);
    assert!(!report.state_changed);
    assert_eq!(store.snapshot(&state_key), before);
    assert_eq!(
        state_of(&orchestrator, "d1").await.unwrap().get("temp"),
        Some(&temp(22.0, 200))
    );

    // The stale metric is still kept as a raw record.
    let records = orchestrator.metric_store().scan("d1").await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_new_name_is_added_alongside_existing() {
    let (_, orchestrator) = in_memory();
    orchestrator
        .ingest(IngestRequest::new("d1", vec![temp(22.0, 200)]))
        .await
        .unwrap();

    orchestrator
        .ingest(IngestRequest::new(
            "d1",
            vec![Metric::new("humidity", 55.0, 201)],
        ))
        .await
        .unwrap();

    let state = state_of(&orchestrator, "d1").await.unwrap();
    assert_eq!(state.len(), 2);
    assert_eq!(state.get("temp"), Some(&temp(22.0, 200)));
    assert_eq!(state.get("humidity"), Some(&Metric::new("humidity", 55.0, 201)));
}

#[tokio::test]
async fn test_concurrent_disjoint_names_are_both_kept() {
    let (_, orchestrator) = in_memory();
    let orchestrator = Arc::new(orchestrator);

    let mut handles = Vec::new();
    for i in 0..16 {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            let metric = Metric::new(format!("sensor-{}", i), i as f64, 100 + i);
            orchestrator
                .ingest(IngestRequest::new("shared", vec![metric]))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let state = state_of(orchestrator.as_ref(), "shared").await.unwrap();
    assert_eq!(state.len(), 16);
    assert!(orchestrator.device_locks().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingest_with_store_latency() {
    let inner = InMemoryObjectStore::new();
    let config = SimulatedStoreConfig {
        latency_range_us: (50, 500),
        ..SimulatedStoreConfig::no_faults()
    };
    let store = SimulatedObjectStore::new(inner, SimulatedRng::new(5), config);
    let keys = StoreKeys::new("lat");
    let orchestrator = Arc::new(IngestionOrchestrator::new(
        ObjectMetricStore::new(store.clone(), keys.clone(), SimulatedClock::new(0)),
        ObjectStateStore::new(store, keys),
    ));

    let a = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .ingest(IngestRequest::new("d1", vec![Metric::new("a", 1.0, 10)]))
                .await
        })
    };
    let b = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .ingest(IngestRequest::new("d1", vec![Metric::new("b", 2.0, 10)]))
                .await
        })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let state = state_of(orchestrator.as_ref(), "d1").await.unwrap();
    assert!(state.get("a").is_some());
    assert!(state.get("b").is_some());
}

// =============================================================================
// Edge cases
// =============================================================================

#[tokio::test]
async fn test_empty_batch_touches_nothing() {
    let inner = InMemoryObjectStore::new();
    let store = SimulatedObjectStore::new(
        inner.clone(),
        SimulatedRng::new(1),
        SimulatedStoreConfig::no_faults(),
    );
    let keys = StoreKeys::new("t");
    let orchestrator = IngestionOrchestrator::new(
        ObjectMetricStore::new(store.clone(), keys.clone(), SimulatedClock::new(0)),
        ObjectStateStore::new(store.clone(), keys),
    );

    let report = orchestrator
        .ingest(IngestRequest::new("d1", Vec::new()))
        .await
        .unwrap();

    assert_eq!(report.accepted, 0);
    assert!(!report.state_changed);
    let stats = store.stats();
    assert_eq!(stats.put_attempts + stats.get_attempts + stats.rename_attempts, 0);
    assert!(inner.is_empty());
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_storage() {
    let (store, orchestrator) = in_memory();

    let err = orchestrator
        .ingest(IngestRequest::new("  ", vec![temp(1.0, 1)]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    let err = orchestrator
        .ingest(IngestRequest::new("d1", vec![Metric::new("", 1.0, 1)]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    assert!(store.is_empty());
}

#[tokio::test]
async fn test_payload_parsing() {
    let (_, orchestrator) = in_memory();

    let report = orchestrator
        .ingest_payload(
            br#"{"deviceId":"d9","metrics":[{"name":"on","value":true,"timestamp":5},{"name":"mode","value":"eco","timestamp":5}]}"#,
        )
        .await
        .unwrap();
    assert_eq!(report.accepted, 2);

    let state = state_of(&orchestrator, "d9").await.unwrap();
    assert_eq!(state.get("on").map(|m| &m.value), Some(&MetricValue::Boolean(true)));
    assert_eq!(
        state.get("mode").map(|m| &m.value),
        Some(&MetricValue::Text("eco".to_string()))
    );

    let malformed: [&[u8]; 4] = [b"", b"   ", b"{not json", br#"{"deviceId":"d9"}"#];
    for bad in malformed {
        let err = orchestrator.ingest_payload(bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }
}

#[tokio::test]
async fn test_device_ids_with_separators_are_isolated() {
    let (_, orchestrator) = in_memory();

    orchestrator
        .ingest(IngestRequest::new("a/b", vec![temp(1.0, 1)]))
        .await
        .unwrap();
    orchestrator
        .ingest(IngestRequest::new("a", vec![temp(2.0, 2)]))
        .await
        .unwrap();

    assert_eq!(orchestrator.metric_store().scan("a").await.unwrap().len(), 1);
    assert_eq!(orchestrator.metric_store().scan("a/b").await.unwrap().len(), 1);
    assert_eq!(
        state_of(&orchestrator, "a/b").await.unwrap().get("temp"),
        Some(&temp(1.0, 1))
    );
}

// =============================================================================
// Failures
// =============================================================================

/// Fails every metric whose name starts with `bad`
struct SelectiveMetricStore {
    inner: MemMetrics,
}

impl MetricStore for SelectiveMetricStore {
    fn append<'a>(&'a self, device_id: &'a str, metric: &'a Metric) -> StoreResultFuture<'a, ()> {
        Box::pin(async move {
            if metric.name.starts_with("bad") {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.append(device_id, metric).await
        })
    }
}

fn selective() -> IngestionOrchestrator<SelectiveMetricStore, MemStates> {
    let store = InMemoryObjectStore::new();
    let keys = StoreKeys::new("sel");
    IngestionOrchestrator::new(
        SelectiveMetricStore {
            inner: ObjectMetricStore::new(store.clone(), keys.clone(), SimulatedClock::new(0)),
        },
        ObjectStateStore::new(store, keys),
    )
}

#[tokio::test]
async fn test_partial_metric_failure_is_reported() {
    let orchestrator = selective();

    let report = orchestrator
        .ingest(IngestRequest::new(
            "d1",
            vec![temp(20.0, 100), Metric::new("bad-sensor", 1.0, 100)],
        ))
        .await
        .unwrap();

    assert!(report.is_partial());
    assert_eq!(report.accepted, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 1);
    assert_eq!(report.failures[0].name, "bad-sensor");

    let state = state_of(&orchestrator, "d1").await.unwrap();
    assert!(state.get("bad-sensor").is_none());
    assert_eq!(state.get("temp"), Some(&temp(20.0, 100)));
}

#[tokio::test]
async fn test_all_metrics_failing_is_an_error() {
    let orchestrator = selective();

    let err = orchestrator
        .ingest(IngestRequest::new(
            "d1",
            vec![Metric::new("bad-a", 1.0, 1), Metric::new("bad-b", 2.0, 2)],
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MetricWriteFailure);
    match err {
        IngestError::MetricWrite { failures } => assert_eq!(failures.len(), 2),
        other => panic!("unexpected error: {}", other),
    }
    assert!(state_of(&orchestrator, "d1").await.is_none());
}

#[tokio::test]
async fn test_state_write_failure_keeps_prior_state() {
    let inner = InMemoryObjectStore::new();
    let keys = StoreKeys::new("sw");

    let healthy = IngestionOrchestrator::new(
        ObjectMetricStore::new(inner.clone(), keys.clone(), SimulatedClock::new(0)),
        ObjectStateStore::new(inner.clone(), keys.clone()),
    );
    healthy
        .ingest(IngestRequest::new("d1", vec![temp(22.0, 200)]))
        .await
        .unwrap();
    let before = inner.snapshot(&keys.state("d1"));

    let config = SimulatedStoreConfig {
        rename_fail_prob: 1.0,
        ..SimulatedStoreConfig::no_faults()
    };
    let failing = SimulatedObjectStore::new(inner.clone(), SimulatedRng::new(3), config);
    let orchestrator = IngestionOrchestrator::new(
        ObjectMetricStore::new(inner.clone(), keys.clone(), SimulatedClock::new(0)),
        ObjectStateStore::new(failing, keys.clone()),
    );

    let err = orchestrator
        .ingest(IngestRequest::new("d1", vec![temp(30.0, 300)]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StateWriteFailure);
    assert_eq!(inner.snapshot(&keys.state("d1")), before);
    assert!(inner.snapshot(&keys.state_temp("d1")).is_none());
    // The raw record committed before the failure stays.
    assert_eq!(healthy.metric_store().scan("d1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_state_read_failure_is_reported() {
    let inner = InMemoryObjectStore::new();
    let keys = StoreKeys::new("sr");
    let config = SimulatedStoreConfig {
        get_fail_prob: 1.0,
        ..SimulatedStoreConfig::no_faults()
    };
    let failing = SimulatedObjectStore::new(inner.clone(), SimulatedRng::new(4), config);
    let orchestrator = IngestionOrchestrator::new(
        ObjectMetricStore::new(inner.clone(), keys.clone(), SimulatedClock::new(0)),
        ObjectStateStore::new(failing, keys.clone()),
    );

    let err = orchestrator
        .ingest(IngestRequest::new("d1", vec![temp(1.0, 1)]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StateReadFailure);
    assert!(inner.snapshot(&keys.state("d1")).is_none());
}

// =============================================================================
// Cancellation
// =============================================================================

/// Reads pass through; replacements never complete
struct StallingStateStore {
    inner: MemStates,
}

impl StateStore for StallingStateStore {
    fn read<'a>(&'a self, device_id: &'a str) -> StoreResultFuture<'a, Option<ConsolidatedState>> {
        self.inner.read(device_id)
    }

    fn replace<'a>(
        &'a self,
        _device_id: &'a str,
        _state: &'a ConsolidatedState,
    ) -> StoreResultFuture<'a, ()> {
        Box::pin(std::future::pending())
    }
}

#[tokio::test]
async fn test_cancelled_ingest_leaves_state_untouched() {
    let store = InMemoryObjectStore::new();
    let keys = StoreKeys::new("c");
    let metrics = ObjectMetricStore::new(store.clone(), keys.clone(), SimulatedClock::new(0));
    let states = ObjectStateStore::new(store.clone(), keys.clone());

    let healthy = IngestionOrchestrator::new(metrics.clone(), states.clone());
    healthy
        .ingest(IngestRequest::new("d1", vec![temp(22.0, 200)]))
        .await
        .unwrap();
    let before = store.snapshot(&keys.state("d1"));

    let stalling = IngestionOrchestrator::new(metrics, StallingStateStore { inner: states });
    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        stalling.ingest(IngestRequest::new("d1", vec![temp(30.0, 300)])),
    )
    .await;

    assert!(outcome.is_err(), "ingest should have been cancelled");
    assert_eq!(store.snapshot(&keys.state("d1")), before);
    assert!(stalling.device_locks().is_empty(), "dropped guard must release the lock");
    assert_eq!(healthy.metric_store().scan("d1").await.unwrap().len(), 2);

    // The device is usable again after the cancelled call.
    healthy
        .ingest(IngestRequest::new("d1", vec![temp(31.0, 301)]))
        .await
        .unwrap();
    assert_eq!(
        state_of(&healthy, "d1").await.unwrap().get("temp"),
        Some(&temp(31.0, 301))
    );
}

// =============================================================================
// Local filesystem backend
// =============================================================================

#[tokio::test]
async fn test_local_fs_backend_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalFsObjectStore::new(dir.path().to_path_buf());
    let keys = StoreKeys::new("fs");
    let orchestrator = IngestionOrchestrator::new(
        ObjectMetricStore::new(store.clone(), keys.clone(), SimulatedClock::new(10)),
        ObjectStateStore::new(store, keys),
    );

    orchestrator
        .ingest(IngestRequest::new("d1", vec![temp(20.0, 100), temp(22.0, 200)]))
        .await
        .unwrap();
    orchestrator
        .ingest(IngestRequest::new("d1", vec![temp(18.0, 150)]))
        .await
        .unwrap();

    let state = state_of(&orchestrator, "d1").await.unwrap();
    assert_eq!(state.get("temp"), Some(&temp(22.0, 200)));
    assert_eq!(orchestrator.metric_store().scan("d1").await.unwrap().len(), 3);
}
