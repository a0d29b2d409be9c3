//! Read-side pipeline: cache lookups, miss queueing, invalidation.
//!
//! `Pipeline` is the long-lived object applications hold. Reads are
//! answered from the store alone and never wait on the network: a
//! cached aggregate yields a number, a confirmed absence yields a
//! blank, and anything else yields a pending marker while the items
//! are queued for the next fetch tick.
//!
//! The write side (draining the queue, claiming, fetching, caching)
//! lives in [`crate::scheduler`] as `Pipeline::tick`.

mod builder;

pub use builder::{Kaupang, KaupangBuilder};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::claim::ClaimCoordinator;
use crate::config::KaupangConfig;
use crate::fetch::BatchFetcher;
use crate::queue::PendingQueue;
use crate::store::{self, CacheStore};
use crate::telemetry;
use crate::types::{
    CacheKey, CacheResult, ItemId, LocationId, PriceField, PriceValue, Scope, Side,
    is_valid_item, is_valid_location,
};

/// Cache-first price lookup pipeline.
///
/// Construct one with [`Kaupang::builder`], share it behind an `Arc`,
/// and drive the fetch side by calling [`Pipeline::tick`] from a timer
/// or job runner.
pub struct Pipeline {
    pub(crate) store: Arc<dyn CacheStore>,
    pub(crate) queue: PendingQueue,
    pub(crate) claims: ClaimCoordinator,
    pub(crate) fetcher: BatchFetcher,
    pub(crate) config: KaupangConfig,
}

impl Pipeline {
    /// Read one price value per requested item, aligned with `items`.
    ///
    /// Never errors and never blocks on upstream work. Items without a
    /// cached resolution come back as [`PriceValue::Pending`] and are
    /// queued, so a later read after a tick finds them resolved.
    /// Duplicate ids are answered consistently but queued once.
    #[instrument(skip(self, items), fields(scope = %scope, batch = items.len()))]
    pub async fn read(
        &self,
        scope: Scope,
        location: LocationId,
        items: &[ItemId],
        side: Side,
        field: PriceField,
    ) -> Vec<PriceValue> {
        if !is_valid_location(location) {
            warn!(scope = %scope, location, "invalid location in read, answering blanks");
            record_reads(scope, "invalid", items.len());
            return vec![PriceValue::Blank; items.len()];
        }

        // Distinct valid ids, looked up once regardless of duplicates.
        let unique: Vec<ItemId> = items
            .iter()
            .copied()
            .filter(|&item| is_valid_item(item))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let keys: Vec<String> = unique
            .iter()
            .map(|&item| CacheKey::new(scope, location, item).price_key())
            .collect();

        let entries = match self.store.get_many(&keys).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "store read failed, treating batch as misses");
                metrics::counter!(telemetry::STORE_ERRORS_TOTAL, "operation" => "get")
                    .increment(1);
                vec![None; unique.len()]
            }
        };

        let resolved: HashMap<ItemId, CacheResult> = unique
            .iter()
            .zip(entries.iter())
            .map(|(&item, entry)| (item, store::decode_entry(entry.as_ref())))
            .collect();

        let mut misses = BTreeSet::new();
        let mut hits = 0;
        let mut absent = 0;
        let mut pending = 0;
        let mut invalid = 0;

        let values = items
            .iter()
            .map(|&item| {
                if !is_valid_item(item) {
                    invalid += 1;
                    return PriceValue::Blank;
                }
                match resolved.get(&item) {
                    Some(CacheResult::Hit(aggregate)) => {
                        hits += 1;
                        match aggregate.value(side, field) {
                            Some(value) => PriceValue::Number(value),
                            // Cached but this side/field was never reported.
                            None => PriceValue::Blank,
                        }
                    }
                    Some(CacheResult::ConfirmedAbsent) => {
                        absent += 1;
                        PriceValue::Blank
                    }
                    _ => {
                        pending += 1;
                        misses.insert(item);
                        PriceValue::Pending
                    }
                }
            })
            .collect();

        record_reads(scope, "hit", hits);
        record_reads(scope, "absent", absent);
        record_reads(scope, "pending", pending);
        record_reads(scope, "invalid", invalid);

        if !misses.is_empty() {
            let misses: Vec<ItemId> = misses.into_iter().collect();
            self.queue.enqueue(scope, location, &misses).await;
        }

        values
    }

    /// Convenience wrapper for a single item.
    pub async fn read_one(
        &self,
        scope: Scope,
        location: LocationId,
        item: ItemId,
        side: Side,
        field: PriceField,
    ) -> PriceValue {
        self.read(scope, location, &[item], side, field)
            .await
            .pop()
            .unwrap_or(PriceValue::Blank)
    }

    /// Drop cached entries and claim leases for the given items.
    ///
    /// The next read sees a miss and re-queues them.
    pub async fn invalidate(&self, scope: Scope, location: LocationId, items: &[ItemId]) {
        let keys: Vec<String> = items
            .iter()
            .copied()
            .filter(|&item| is_valid_item(item))
            .flat_map(|item| {
                let key = CacheKey::new(scope, location, item);
                [key.price_key(), key.claim_key()]
            })
            .collect();
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.store.remove_many(&keys).await {
            warn!(error = %e, "invalidate failed, entries expire on their own");
            metrics::counter!(telemetry::STORE_ERRORS_TOTAL, "operation" => "remove")
                .increment(1);
        }
    }

    /// Number of item ids currently waiting for a fetch tick.
    pub async fn pending_len(&self) -> usize {
        self.queue.pending_len().await
    }
}

fn record_reads(scope: Scope, result: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    metrics::counter!(telemetry::READS_TOTAL,
        "scope" => scope.as_str(),
        "result" => result,
    )
    .increment(count as u64);
}

// ============================================================================
// Tests
// ============================================================================
