//! Claim leases: single-flight coordination for fetch tasks.
//!
//! Before fetching, the scheduler claims each item by writing a short
//! TTL lease next to the item's data key. An item with a live lease is
//! already being fetched by someone (this process or another sharing
//! the store) and is skipped. Leases are re-checked under the
//! coordination lock against both the data key and the lease key, so
//! at most one fetcher per item wins.
//!
//! A crashed holder never wedges an item: its lease expires on its
//! own, and the next read re-enqueues the item.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::KaupangConfig;
use crate::lock::CoordLock;
use crate::store::{self, CacheStore};
use crate::telemetry;
use crate::types::CacheKey;

/// Lease payload written under a claim key.
///
/// Liveness is carried by the store TTL; the fields exist for
/// observability when inspecting a shared store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Opaque token identifying the claiming pipeline instance.
    pub holder: String,
    /// Milliseconds since the Unix epoch when the lease was written.
    pub claimed_at_ms: u64,
}

/// Takes and releases claim leases for fetch tasks.
pub struct ClaimCoordinator {
    store: Arc<dyn CacheStore>,
    lock: CoordLock,
    holder: String,
    claim_ttl: Duration,
    claim_wait: Duration,
}

impl ClaimCoordinator {
    /// Create a coordinator with a fresh holder token.
    pub fn new(store: Arc<dyn CacheStore>, lock: CoordLock, config: &KaupangConfig) -> Self {
        Self {
            store,
            lock,
            holder: holder_token(),
            claim_ttl: config.ttl.claim_ttl,
            claim_wait: config.lock.claim_wait,
        }
    }

    /// Claim the subset of `keys` that still needs fetching.
    ///
    /// Under the coordination lock, re-reads each key's data entry and
    /// lease: keys with a fresh entry (hit or confirmed absence) or a
    /// live lease are skipped, the rest get a lease written and are
    /// returned for fetching. Keys are expected to share one scope.
    ///
    /// Fails open on store trouble: an unreadable store claims
    /// everything, an unwritable one claims without a lease. Either
    /// way the fetch proceeds and duplicates stay possible but bounded.
    pub async fn try_claim(&self, keys: &[CacheKey]) -> Vec<CacheKey> {
        if keys.is_empty() {
            return Vec::new();
        }
        let _guard = self.lock.acquire(self.claim_wait, "claim").await;

        let price_keys: Vec<String> = keys.iter().map(CacheKey::price_key).collect();
        let claim_keys: Vec<String> = keys.iter().map(CacheKey::claim_key).collect();

        let entries = self.read_degraded(&price_keys).await;
        let leases = self.read_degraded(&claim_keys).await;

        let mut claimed = Vec::new();
        for ((key, entry), lease) in keys.iter().zip(&entries).zip(&leases) {
            if store::decode_entry(entry.as_ref()).is_resolved() {
                continue;
            }
            // Any live lease payload counts, decodable or not.
            if lease.is_some() {
                continue;
            }
            claimed.push(*key);
        }

        let scope = keys[0].scope.as_str();
        metrics::counter!(telemetry::CLAIMS_TOTAL, "scope" => scope, "outcome" => "claimed")
            .increment(claimed.len() as u64);
        metrics::counter!(telemetry::CLAIMS_TOTAL, "scope" => scope, "outcome" => "skipped")
            .increment((keys.len() - claimed.len()) as u64);

        if !claimed.is_empty() {
            self.write_leases(&claimed).await;
        }
        claimed
    }

    /// Release leases after their task finished (or failed and was
    /// re-queued). Idempotent; missing leases are fine.
    pub async fn release(&self, keys: &[CacheKey]) {
        if keys.is_empty() {
            return;
        }
        let claim_keys: Vec<String> = keys.iter().map(CacheKey::claim_key).collect();
        if let Err(error) = self.store.remove_many(&claim_keys).await {
            metrics::counter!(telemetry::STORE_ERRORS_TOTAL, "operation" => "remove")
                .increment(1);
            warn!(%error, keys = claim_keys.len(), "failed to release claim leases");
        }
    }

    async fn read_degraded(&self, keys: &[String]) -> Vec<Option<String>> {
        match self.store.get_many(keys).await {
            Ok(values) => values,
            Err(error) => {
                metrics::counter!(telemetry::STORE_ERRORS_TOTAL, "operation" => "get")
                    .increment(1);
                warn!(%error, "claim pre-check read failed, treating as unclaimed");
                vec![None; keys.len()]
            }
        }
    }

    async fn write_leases(&self, claimed: &[CacheKey]) {
        let record = ClaimRecord {
            holder: self.holder.clone(),
            claimed_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        };
        let payload = match serde_json::to_string(&record) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "failed to encode claim record");
                return;
            }
        };
        let entries: Vec<(String, String)> = claimed
            .iter()
            .map(|key| (key.claim_key(), payload.clone()))
            .collect();
        if let Err(error) = self.store.put_many(&entries, self.claim_ttl).await {
            metrics::counter!(telemetry::STORE_ERRORS_TOTAL, "operation" => "put").increment(1);
            warn!(%error, "failed to write claim leases, fetching unguarded");
        }
    }
}

fn holder_token() -> String {
    use rand::Rng;
    format!("{:016x}", rand::rng().random::<u64>())
}
