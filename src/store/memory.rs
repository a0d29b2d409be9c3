//! In-memory store backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::sync::Cache;

use super::CacheStore;
use crate::error::Result;

/// Default entry capacity for the bundled in-memory store.
const DEFAULT_MAX_ENTRIES: u64 = 100_000;

/// Stored value plus the TTL it was written with.
#[derive(Clone)]
struct StoredValue {
    data: String,
    ttl: Duration,
}

/// Expiry policy reading each entry's own TTL.
///
/// `put_many` takes a per-call TTL, so a single cache-wide
/// `time_to_live` cannot express it; the TTL rides along with the
/// value instead.
struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    // Overwrites restart the clock; a re-fetched entry is fresh again.
    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory [`CacheStore`] backed by a bounded moka cache.
///
/// Suitable for single-process embedding and for tests. Entries honour
/// the TTL passed to `put_many`; capacity overflow evicts least-used
/// entries, which readers observe as ordinary misses.
pub struct MemoryStore {
    cache: Cache<String, StoredValue>,
}

impl MemoryStore {
    /// Create a store bounded to `max_entries`.
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Number of live entries. Approximate under concurrent writes.
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        Ok(keys
            .iter()
            .map(|key| self.cache.get(key).map(|value| value.data))
            .collect())
    }

    async fn put_many(&self, entries: &[(String, String)], ttl: Duration) -> Result<()> {
        for (key, value) in entries {
            self.cache.insert(
                key.clone(),
                StoredValue {
                    data: value.clone(),
                    ttl,
                },
            );
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.cache.invalidate(key);
        }
        Ok(())
    }
}
