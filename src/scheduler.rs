//! Fetch-side scheduler: drains the queue, claims work, caches results.
//!
//! The pipeline does no background work of its own. The host calls
//! [`Pipeline::tick`] from whatever timer or job runner it already has;
//! each tick drains the pending queue, claims the items no other
//! process is already fetching, fetches the claimed batches, and
//! writes both hits and confirmed absences back to the store.
//!
//! Ticks are idempotent. An empty queue makes a tick a cheap no-op, a
//! failed batch is re-queued whole for the next tick, and items another
//! holder has leased are simply skipped; their results arrive through
//! the shared store. [`TickReport::work_remaining`] tells callers that
//! ran a tick off-schedule whether it is worth scheduling another one
//! soon.

use std::collections::BTreeMap;
use std::time::Instant;

use futures_util::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::pipeline::Pipeline;
use crate::queue::QueueTask;
use crate::store;
use crate::telemetry;
use crate::types::{CacheKey, FetchOutcome, ItemId};

/// What one tick drained, fetched, and left behind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks taken off the queue this tick.
    pub drained_tasks: usize,
    /// Aggregates fetched and written to the cache.
    pub fetched_records: usize,
    /// Absences confirmed by upstream and cached negatively.
    pub confirmed_absent: usize,
    /// Tasks that failed upstream or on write and were re-queued.
    pub failed_tasks: usize,
    /// Items skipped because they were already resolved or leased.
    pub skipped_items: usize,
    /// Item ids still queued after the tick.
    pub pending_after: usize,
}

impl TickReport {
    /// Whether another tick soon would make progress.
    pub fn work_remaining(&self) -> bool {
        self.failed_tasks > 0 || self.pending_after > 0
    }
}

/// Per-task accounting folded into the report.
#[derive(Default)]
struct TaskOutcome {
    records: usize,
    absents: usize,
    skipped: usize,
    failed: bool,
}

impl Pipeline {
    /// Run one fetch cycle over the pending queue.
    ///
    /// Never returns an error: failures are logged, counted in the
    /// report, and retried on a later tick.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> TickReport {
        let start = Instant::now();
        let tasks = self.queue.drain_all().await;
        let mut report = TickReport {
            drained_tasks: tasks.len(),
            ..TickReport::default()
        };

        if !tasks.is_empty() {
            let outcomes = join_all(tasks.into_iter().map(|task| self.process_task(task))).await;
            for outcome in outcomes {
                report.fetched_records += outcome.records;
                report.confirmed_absent += outcome.absents;
                report.skipped_items += outcome.skipped;
                if outcome.failed {
                    report.failed_tasks += 1;
                }
            }
            report.pending_after = self.queue.pending_len().await;
            info!(
                drained = report.drained_tasks,
                records = report.fetched_records,
                absent = report.confirmed_absent,
                failed = report.failed_tasks,
                skipped = report.skipped_items,
                pending = report.pending_after,
                "tick complete"
            );
        }

        metrics::histogram!(telemetry::TICK_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        report
    }

    /// Claim, fetch, and cache one drained task.
    async fn process_task(&self, task: QueueTask) -> TaskOutcome {
        let keys = task.keys();
        let claimed = self.claims.try_claim(&keys).await;
        let skipped = keys.len() - claimed.len();
        if claimed.is_empty() {
            debug!(
                scope = %task.scope,
                location = task.location,
                items = task.items.len(),
                "nothing left to fetch, task already resolved or leased"
            );
            return TaskOutcome {
                skipped,
                ..TaskOutcome::default()
            };
        }

        let claimed_task = QueueTask {
            scope: task.scope,
            location: task.location,
            items: claimed.iter().map(|key| key.item).collect(),
        };

        match self.fetcher.fetch(&claimed_task).await {
            Ok(outcomes) => {
                let written = self.write_outcomes(&claimed_task, &outcomes).await;
                self.claims.release(&claimed).await;
                match written {
                    Some((records, absents)) => {
                        record_task("ok");
                        TaskOutcome {
                            records,
                            absents,
                            skipped,
                            failed: false,
                        }
                    }
                    None => {
                        self.queue
                            .enqueue(task.scope, task.location, &claimed_task.items)
                            .await;
                        record_task("failed");
                        TaskOutcome {
                            skipped,
                            failed: true,
                            ..TaskOutcome::default()
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    scope = %task.scope,
                    location = task.location,
                    items = claimed_task.items.len(),
                    error = %e,
                    "batch fetch failed, re-queueing for next tick"
                );
                self.claims.release(&claimed).await;
                self.queue
                    .enqueue(task.scope, task.location, &claimed_task.items)
                    .await;
                record_task("failed");
                TaskOutcome {
                    skipped,
                    failed: true,
                    ..TaskOutcome::default()
                }
            }
        }
    }

    /// Encode and write fetched outcomes, hits and absences separately.
    ///
    /// Hits get the scope's jittered positive TTL per chunk so a large
    /// batch does not expire all at once. Absences get the long
    /// negative TTL. Returns `None` if any write failed.
    async fn write_outcomes(
        &self,
        task: &QueueTask,
        outcomes: &BTreeMap<ItemId, FetchOutcome>,
    ) -> Option<(usize, usize)> {
        let mut hits: Vec<(String, String)> = Vec::new();
        let mut absents: Vec<(String, String)> = Vec::new();
        for (&item, outcome) in outcomes {
            let key = CacheKey::new(task.scope, task.location, item).price_key();
            let encoded = match outcome {
                FetchOutcome::Record(aggregate) => store::encode_hit(aggregate),
                FetchOutcome::ConfirmedAbsent => store::encode_absent(),
            };
            match (outcome, encoded) {
                (FetchOutcome::Record(_), Ok(encoded)) => hits.push((key, encoded)),
                (FetchOutcome::ConfirmedAbsent, Ok(encoded)) => absents.push((key, encoded)),
                (_, Err(e)) => warn!(key = %key, error = %e, "failed to encode entry, skipping"),
            }
        }

        let mut ok = true;
        let mut records = 0;
        for chunk in store::chunk_for_write(hits, &self.config.limits) {
            let ttl = self.config.ttl.jittered_positive(task.scope);
            if self.put_chunk(&chunk, ttl, "hit").await {
                records += chunk.len();
            } else {
                ok = false;
            }
        }

        let mut confirmed = 0;
        for chunk in store::chunk_for_write(absents, &self.config.limits) {
            if self.put_chunk(&chunk, self.config.ttl.negative_ttl, "absent").await {
                confirmed += chunk.len();
            } else {
                ok = false;
            }
        }

        ok.then_some((records, confirmed))
    }

    async fn put_chunk(
        &self,
        chunk: &[(String, String)],
        ttl: std::time::Duration,
        kind: &'static str,
    ) -> bool {
        match self.store.put_many(chunk, ttl).await {
            Ok(()) => {
                metrics::counter!(telemetry::ENTRIES_WRITTEN_TOTAL, "kind" => kind)
                    .increment(chunk.len() as u64);
                true
            }
            Err(e) => {
                warn!(error = %e, kind, entries = chunk.len(), "cache write failed");
                metrics::counter!(telemetry::STORE_ERRORS_TOTAL, "operation" => "put")
                    .increment(1);
                false
            }
        }
    }
}

fn record_task(status: &'static str) {
    metrics::counter!(telemetry::FETCH_TASKS_TOTAL, "status" => status).increment(1);
}

// ============================================================================
// Tests
// ============================================================================
