//! Batch fetcher with transport fallback chain semantics.
//!
//! The `BatchFetcher` holds transports in priority order (index 0 =
//! highest). A task is sent through the first transport, wrapped in
//! retry; unusable payloads count as transient, so a transport
//! exhausts its retries before the chain falls through to the next.
//! Permanent errors (bad request, not found) are terminal and fail
//! the task.
//!
//! A successful payload is classified per item: every requested id
//! gets either a sanitised record or a confirmed absence, so the
//! scheduler can cache both outcomes. Ids the upstream did not echo
//! back are absences, not errors.
//!
//! # Fallback Chain Flow
//!
//! ```text
//! tick: fetcher.fetch(task { region 10000002, [34, 35] })
//!                     │
//!                     ▼
//!         ┌─────────────────────┐
//!         │  JsonBodyTransport  │ ──► POST {"region":…,"types":"34,35"}
//!         │  (priority 0)       │ ──► retries transient, then falls through
//!         └─────────┬───────────┘
//!                   │ retries exhausted
//!                   ▼
//!         ┌─────────────────────┐
//!         │  FormBodyTransport  │ ──► POST region=…&types=34,35
//!         │  (priority 1)       │
//!         └─────────┬───────────┘
//!                   │
//!                   ▼
//!         ┌─────────────────────┐
//!         │  QueryTransport     │ ──► GET ?region=…&types=34,35
//!         │  (priority 2)       │
//!         └─────────────────────┘
//! ```

mod retry;
mod transport;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{instrument, warn};

use crate::error::{KaupangError, Result};
use crate::queue::QueueTask;
use crate::telemetry;
use crate::types::{FetchOutcome, ItemId, PriceAggregate};

pub use retry::RetryConfig;
pub use transport::{
    FormBodyTransport, JsonBodyTransport, QueryTransport, RawPayload, Transport,
};

pub(crate) use transport::default_client;

/// Fetches queued tasks through an ordered transport chain.
pub struct BatchFetcher {
    transports: Vec<Arc<dyn Transport>>,
    retry: RetryConfig,
}

impl BatchFetcher {
    /// Create a fetcher over the given chain, highest priority first.
    pub fn new(transports: Vec<Arc<dyn Transport>>, retry: RetryConfig) -> Self {
        Self { transports, retry }
    }

    /// Transport names in priority order.
    pub fn transport_names(&self) -> Vec<String> {
        self.transports
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Fetch one task, classifying the payload per requested item.
    ///
    /// Errors only when every transport failed; the scheduler then
    /// re-queues the whole task for the next tick.
    #[instrument(skip(self, task), fields(scope = %task.scope, location = task.location, batch = task.items.len()))]
    pub async fn fetch(&self, task: &QueueTask) -> Result<BTreeMap<ItemId, FetchOutcome>> {
        let start = Instant::now();
        let mut last_err = None;
        for transport in &self.transports {
            match retry::with_retry(&self.retry, transport.name(), "fetch", || {
                transport.attempt(task)
            })
            .await
            {
                Ok(payload) => {
                    Self::record_request(transport.name(), start, true);
                    return Ok(classify(task, &payload));
                }
                Err(e) if Self::is_fallback_trigger(&e) => {
                    warn!(transport = transport.name(), error = %e, "transport failed, trying next");
                    last_err = Some(e);
                    continue;
                }
                Err(e) => {
                    Self::record_request(transport.name(), start, false);
                    return Err(e);
                }
            }
        }
        Self::record_request("none", start, false);
        Err(last_err.unwrap_or(KaupangError::NoTransport))
    }

    /// Whether an error should trigger fallback to the next transport.
    ///
    /// Transient errors do, since the retry wrapper already exhausted
    /// its attempts by the time the chain sees them. Permanent errors
    /// are terminal.
    fn is_fallback_trigger(e: &KaupangError) -> bool {
        e.is_transient()
    }

    /// Record fetch outcome metrics (counter + histogram).
    fn record_request(transport: &str, start: Instant, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        let elapsed = start.elapsed().as_secs_f64();
        metrics::counter!(telemetry::FETCH_REQUESTS_TOTAL,
            "transport" => transport.to_owned(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::FETCH_DURATION_SECONDS,
            "transport" => transport.to_owned(),
        )
        .record(elapsed);
    }
}

/// Classify a payload per requested item.
///
/// Present entries with data become records; present-but-empty entries
/// and ids missing from the payload become confirmed absences.
fn classify(task: &QueueTask, payload: &RawPayload) -> BTreeMap<ItemId, FetchOutcome> {
    let mut outcomes = BTreeMap::new();
    for &item in &task.items {
        let outcome = match payload.get(&item.to_string()) {
            Some(raw) => {
                let aggregate = PriceAggregate::from_raw(raw);
                if aggregate.is_empty() {
                    FetchOutcome::ConfirmedAbsent
                } else {
                    FetchOutcome::Record(aggregate)
                }
            }
            None => FetchOutcome::ConfirmedAbsent,
        };
        outcomes.insert(item, outcome);
    }
    outcomes
}

// ============================================================================
// Tests
// ============================================================================
