//! Cache store abstraction.
//!
//! The pipeline talks to a string key-value store with per-call TTLs;
//! [`CacheStore`] is the seam. The bundled [`MemoryStore`] covers the
//! embedded case. A shared backend (redis, memcached) slots in by
//! implementing the trait and handing it to the builder.
//!
//! Store failures never propagate to readers: callers degrade a failed
//! `get` to a miss and a failed `put` to a dropped write, then let TTLs
//! and re-enqueues heal the gap.

mod codec;
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::LimitsConfig;
use crate::error::Result;
use crate::telemetry;

pub use memory::MemoryStore;

pub(crate) use codec::{decode_entry, encode_absent, encode_hit};

/// String key-value store with per-call TTLs.
///
/// Implementations must be safe for concurrent use: the queue, claim
/// coordinator, and scheduler all share one instance.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch values for `keys`. The result aligns 1:1 with the input;
    /// `None` means absent or expired.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Write all entries with the same TTL.
    async fn put_many(&self, entries: &[(String, String)], ttl: Duration) -> Result<()>;

    /// Remove entries. Missing keys are not an error.
    async fn remove_many(&self, keys: &[String]) -> Result<()>;
}

/// Split entries into bulk-write sized chunks, dropping values that
/// exceed the per-entry size limit.
///
/// Oversize values would be rejected by capped store backends anyway;
/// dropping them up front keeps the rest of the batch writable. The
/// dropped item stays fetchable and will simply be fetched again next
/// time it is read.
pub(crate) fn chunk_for_write(
    entries: Vec<(String, String)>,
    limits: &LimitsConfig,
) -> Vec<Vec<(String, String)>> {
    let mut chunks: Vec<Vec<(String, String)>> = Vec::new();
    for (key, value) in entries {
        if value.len() > limits.max_entry_bytes {
            warn!(
                key = %key,
                size = value.len(),
                limit = limits.max_entry_bytes,
                "encoded entry exceeds size limit, skipping write"
            );
            metrics::counter!(telemetry::ENTRIES_OVERSIZE_TOTAL).increment(1);
            continue;
        }
        match chunks.last_mut() {
            Some(chunk) if chunk.len() < limits.max_entries_per_write => {
                chunk.push((key, value));
            }
            _ => chunks.push(vec![(key, value)]),
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(i: usize) -> (String, String) {
        (format!("key{i}"), format!("value{i}"))
    }

    #[test]
    fn chunking_respects_write_limit() {
        let limits = LimitsConfig::new().max_entries_per_write(3);
        let entries: Vec<_> = (0..8).map(entry).collect();

        let chunks = chunk_for_write(entries, &limits);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 3);
        assert_eq!(chunks[1].len(), 3);
        assert_eq!(chunks[2].len(), 2);
    }

    #[test]
    fn chunking_drops_oversize_values() {
        let limits = LimitsConfig::new()
            .max_entries_per_write(10)
            .max_entry_bytes(8);
        let entries = vec![
            ("small".to_string(), "ok".to_string()),
            ("big".to_string(), "x".repeat(9)),
            ("edge".to_string(), "y".repeat(8)),
        ];

        let chunks = chunk_for_write(entries, &limits);
        assert_eq!(chunks.len(), 1);
        let keys: Vec<_> = chunks[0].iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["small", "edge"]);
    }

    #[test]
    fn chunking_empty_input() {
        let chunks = chunk_for_write(Vec::new(), &LimitsConfig::default());
        assert!(chunks.is_empty());
    }
}
