//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::sync::Arc;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use serde_json::json;

use kaupang::telemetry;
use kaupang::{
    Kaupang, KaupangError, Pipeline, PriceField, QueueTask, RawPayload, Result, Scope, Side,
    Transport,
};

// ============================================================================
// Mock transports
// ============================================================================

/// Answers every requested item with aggregates derived from its id.
struct ScriptedTransport;

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn attempt(&self, task: &QueueTask) -> Result<RawPayload> {
        let mut payload = serde_json::Map::new();
        for &item in &task.items {
            payload.insert(
                item.to_string(),
                json!({ "buy": { "max": item as f64 }, "sell": {} }),
            );
        }
        Ok(payload)
    }
}

struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    fn name(&self) -> &str {
        "failing"
    }

    async fn attempt(&self, _task: &QueueTask) -> Result<RawPayload> {
        Err(KaupangError::Api {
            status: 404,
            message: "scripted failure".into(),
        })
    }
}

fn pipeline_with(transport: Arc<dyn Transport>) -> Pipeline {
    Kaupang::builder()
        .transport(transport)
        .build()
        .expect("pipeline should build")
}

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Sum counter values matching a metric name and one label pair.
fn counter_with_label(snapshot: &SnapshotVec, name: &str, label: &str, value: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.kind() == MetricKind::Counter
                && key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label && l.value() == value)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Check if any histogram entries exist for a given metric name.
fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

// ============================================================================
// Tests
// ============================================================================

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` ensures the sync `with_local_recorder` closure stays
/// on the current thread while `block_on` drives the inner async work.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn full_cycle_records_counters() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let pipeline = pipeline_with(Arc::new(ScriptedTransport));
                pipeline
                    .read(Scope::Region, 10000002, &[34, 35], Side::Buy, PriceField::Max)
                    .await;
                pipeline.tick().await;
                pipeline
                    .read(Scope::Region, 10000002, &[34, 35], Side::Buy, PriceField::Max)
                    .await;
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(
        counter_with_label(&snapshot, telemetry::READS_TOTAL, "result", "pending"),
        2,
        "first read should report both items pending"
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::READS_TOTAL, "result", "hit"),
        2,
        "second read should report both items as hits"
    );
    assert_eq!(counter_total(&snapshot, telemetry::ENQUEUED_TOTAL), 2);
    assert_eq!(counter_total(&snapshot, telemetry::FETCH_REQUESTS_TOTAL), 1);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::CLAIMS_TOTAL, "outcome", "claimed"),
        2
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::ENTRIES_WRITTEN_TOTAL, "kind", "hit"),
        2
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn tick_records_duration_histograms() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let pipeline = pipeline_with(Arc::new(ScriptedTransport));
                pipeline
                    .read(Scope::Station, 60003760, &[34], Side::Buy, PriceField::Max)
                    .await;
                pipeline.tick().await;
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();

    assert!(
        has_histogram(&snapshot, telemetry::TICK_DURATION_SECONDS),
        "expected a tick duration histogram entry"
    );
    assert!(
        has_histogram(&snapshot, telemetry::FETCH_DURATION_SECONDS),
        "expected a fetch duration histogram entry"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failed_fetch_records_failed_task() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let pipeline = pipeline_with(Arc::new(FailingTransport));
                pipeline
                    .read(Scope::Region, 10000002, &[34], Side::Buy, PriceField::Max)
                    .await;
                pipeline.tick().await;
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(
        counter_with_label(&snapshot, telemetry::FETCH_TASKS_TOTAL, "status", "failed"),
        1
    );
    // Initial enqueue plus the re-enqueue of the failed batch.
    assert_eq!(counter_total(&snapshot, telemetry::ENQUEUED_TOTAL), 2);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::ENTRIES_WRITTEN_TOTAL, "kind", "hit"),
        0
    );
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let pipeline = pipeline_with(Arc::new(ScriptedTransport));
    pipeline
        .read(Scope::Region, 10000002, &[34], Side::Buy, PriceField::Max)
        .await;
    pipeline.tick().await;
}
