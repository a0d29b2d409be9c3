//! Telemetry metric name constants.
//!
//! Centralised metric names for kaupang operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `kaupang_`. Counters end in `_total`,
//! gauges are plain nouns, histograms use meaningful units (e.g.
//! `_seconds`).
//!
//! # Common labels
//!
//! - `scope` — query scope: "region", "system", or "station"
//! - `transport` — wire strategy name (e.g. "json_body", "query")
//! - `operation` — internal operation (e.g. "fetch", "enqueue", "drain")
//! - `status` — outcome: "ok" or "error"
//! - `result` — per-item read outcome: "hit", "absent", "pending", "invalid"

/// Total item reads served by the accessor.
///
/// Labels: `scope`, `result` ("hit" | "absent" | "pending" | "invalid").
pub const READS_TOTAL: &str = "kaupang_reads_total";

/// Total item ids newly added to the pending queue.
///
/// Labels: `scope`.
pub const ENQUEUED_TOTAL: &str = "kaupang_enqueued_total";

/// Item ids currently waiting in the pending queue.
pub const QUEUE_DEPTH: &str = "kaupang_queue_depth";

/// Claim attempts, split by whether the lease was taken.
///
/// Labels: `scope`, `outcome` ("claimed" | "skipped").
pub const CLAIMS_TOTAL: &str = "kaupang_claims_total";

/// Upstream fetch requests, one per transport-chain resolution.
///
/// Labels: `transport`, `status` ("ok" | "error").
pub const FETCH_REQUESTS_TOTAL: &str = "kaupang_fetch_requests_total";

/// Upstream fetch duration in seconds, measured across the whole chain.
///
/// Labels: `transport`.
pub const FETCH_DURATION_SECONDS: &str = "kaupang_fetch_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `transport`, `operation`.
pub const RETRIES_TOTAL: &str = "kaupang_retries_total";

/// Fetch tasks processed by the scheduler.
///
/// Labels: `status` ("ok" | "failed").
pub const FETCH_TASKS_TOTAL: &str = "kaupang_fetch_tasks_total";

/// Wall-clock duration of one scheduler tick in seconds.
pub const TICK_DURATION_SECONDS: &str = "kaupang_tick_duration_seconds";

/// Cache entries written, split by entry kind.
///
/// Labels: `kind` ("hit" | "absent").
pub const ENTRIES_WRITTEN_TOTAL: &str = "kaupang_entries_written_total";

/// Entries dropped before a store write because the encoded value
/// exceeded the size limit.
pub const ENTRIES_OVERSIZE_TOTAL: &str = "kaupang_entries_oversize_total";

/// Store operations that failed and were degraded to a miss or no-op.
///
/// Labels: `operation` ("get" | "put" | "remove").
pub const STORE_ERRORS_TOTAL: &str = "kaupang_store_errors_total";

/// Bounded lock waits that timed out and proceeded without the lock.
///
/// Labels: `operation`.
pub const LOCK_TIMEOUTS_TOTAL: &str = "kaupang_lock_timeouts_total";
