//! Pending-fetch queue.
//!
//! Misses do not fetch inline; they are parked here and fetched in
//! batches by the next scheduler tick. The queue is one serialized
//! blob in the cache store, re-read and re-written under the
//! coordination lock so concurrent enqueues merge instead of clobber.
//!
//! Consolidation keeps the queue canonical: all pending ids for one
//! `(scope, location)` pair live in sorted, deduplicated tasks of at
//! most `max_ids_per_task` ids, so re-reading the same missing items
//! never grows the queue. A corrupt blob is dropped and rebuilt from
//! subsequent reads; an expired blob is the same, just slower.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::KaupangConfig;
use crate::lock::CoordLock;
use crate::store::CacheStore;
use crate::telemetry;
use crate::types::{CacheKey, ItemId, LocationId, Scope};

/// Storage key of the queue blob.
const QUEUE_KEY: &str = "queue:pending";

/// One unit of fetch work: a batch of item ids for one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTask {
    /// Query scope.
    pub scope: Scope,
    /// Location to query.
    pub location: LocationId,
    /// Item ids to fetch, sorted and deduplicated.
    pub items: Vec<ItemId>,
}

impl QueueTask {
    /// Cache keys addressed by this task.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.items
            .iter()
            .map(|&item| CacheKey::new(self.scope, self.location, item))
            .collect()
    }
}

/// Merge new ids into the task list for one `(scope, location)` pair.
///
/// Tasks for other pairs pass through untouched. Matching tasks are
/// flattened into one id set, unioned with `items`, and re-chunked to
/// `cap`. Returns the rebuilt list and the number of genuinely new ids.
pub(crate) fn merge_pending(
    tasks: Vec<QueueTask>,
    scope: Scope,
    location: LocationId,
    items: &[ItemId],
    cap: usize,
) -> (Vec<QueueTask>, usize) {
    let mut merged: Vec<QueueTask> = Vec::with_capacity(tasks.len() + 1);
    let mut ids: BTreeSet<ItemId> = BTreeSet::new();

    for task in tasks {
        if task.scope == scope && task.location == location {
            ids.extend(task.items);
        } else {
            merged.push(task);
        }
    }

    let before = ids.len();
    ids.extend(items.iter().copied());
    let added = ids.len() - before;

    let ids: Vec<ItemId> = ids.into_iter().collect();
    for chunk in ids.chunks(cap) {
        merged.push(QueueTask {
            scope,
            location,
            items: chunk.to_vec(),
        });
    }
    (merged, added)
}

/// Store-backed queue of pending fetch tasks.
pub struct PendingQueue {
    store: Arc<dyn CacheStore>,
    lock: CoordLock,
    max_ids_per_task: usize,
    queue_ttl: Duration,
    enqueue_wait: Duration,
    drain_wait: Duration,
}

impl PendingQueue {
    /// Create a queue over the given store.
    pub fn new(store: Arc<dyn CacheStore>, lock: CoordLock, config: &KaupangConfig) -> Self {
        Self {
            store,
            lock,
            max_ids_per_task: config.limits.max_ids_per_task,
            queue_ttl: config.ttl.queue_ttl,
            enqueue_wait: config.lock.enqueue_wait,
            drain_wait: config.lock.drain_wait,
        }
    }

    /// Add item ids for one location, consolidating with whatever is
    /// already queued. Re-enqueueing queued ids is a no-op.
    pub async fn enqueue(&self, scope: Scope, location: LocationId, items: &[ItemId]) {
        if items.is_empty() {
            return;
        }
        let _guard = self.lock.acquire(self.enqueue_wait, "enqueue").await;

        let tasks = self.read_tasks().await;
        let (tasks, added) = merge_pending(tasks, scope, location, items, self.max_ids_per_task);
        let depth: usize = tasks.iter().map(|t| t.items.len()).sum();
        self.write_tasks(&tasks).await;

        metrics::counter!(telemetry::ENQUEUED_TOTAL, "scope" => scope.as_str())
            .increment(added as u64);
        metrics::gauge!(telemetry::QUEUE_DEPTH).set(depth as f64);
        debug!(%scope, location, added, depth, "enqueued pending items");
    }

    /// Atomically take every queued task, leaving the queue empty.
    pub async fn drain_all(&self) -> Vec<QueueTask> {
        let _guard = self.lock.acquire(self.drain_wait, "drain").await;

        let tasks = self.read_tasks().await;
        if tasks.is_empty() {
            return tasks;
        }
        match self.store.remove_many(&[QUEUE_KEY.to_string()]).await {
            Ok(()) => {
                metrics::gauge!(telemetry::QUEUE_DEPTH).set(0.0);
            }
            Err(error) => {
                metrics::counter!(telemetry::STORE_ERRORS_TOTAL, "operation" => "remove")
                    .increment(1);
                // Tasks may be drained again next tick; claims keep the
                // duplicate fetches bounded.
                warn!(%error, "failed to clear drained queue");
            }
        }
        tasks
    }

    /// Total item ids currently queued.
    pub async fn pending_len(&self) -> usize {
        self.read_tasks().await.iter().map(|t| t.items.len()).sum()
    }

    async fn read_tasks(&self) -> Vec<QueueTask> {
        let raw = match self.store.get_many(&[QUEUE_KEY.to_string()]).await {
            Ok(mut values) => values.pop().flatten(),
            Err(error) => {
                metrics::counter!(telemetry::STORE_ERRORS_TOTAL, "operation" => "get")
                    .increment(1);
                warn!(%error, "failed to read pending queue, treating as empty");
                return Vec::new();
            }
        };
        let Some(raw) = raw else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(tasks) => tasks,
            Err(error) => {
                warn!(%error, "corrupt pending queue, resetting");
                Vec::new()
            }
        }
    }

    async fn write_tasks(&self, tasks: &[QueueTask]) {
        let blob = match serde_json::to_string(tasks) {
            Ok(blob) => blob,
            Err(error) => {
                warn!(%error, "failed to encode pending queue");
                return;
            }
        };
        let entries = [(QUEUE_KEY.to_string(), blob)];
        if let Err(error) = self.store.put_many(&entries, self.queue_ttl).await {
            metrics::counter!(telemetry::STORE_ERRORS_TOTAL, "operation" => "put").increment(1);
            // Lost enqueues self-heal: unresolved reads re-enqueue.
            warn!(%error, "failed to write pending queue");
        }
    }
}
