//! Cache entry envelope codec.
//!
//! Stored values are JSON envelopes tagged by state, so a decoded
//! entry is unambiguous: `{"state":"hit","value":{...}}` for a real
//! aggregate, `{"state":"absent"}` for a confirmed absence. Anything
//! that fails to decode is treated as a miss, never surfaced to
//! readers, so a deployment that changes the envelope simply re-fetches.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::types::{CacheResult, PriceAggregate};

#[derive(Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
enum Envelope {
    Hit { value: PriceAggregate },
    Absent,
}

/// Encode a fetched aggregate for storage.
pub(crate) fn encode_hit(aggregate: &PriceAggregate) -> Result<String> {
    Ok(serde_json::to_string(&Envelope::Hit { value: *aggregate })?)
}

/// Encode a confirmed absence for storage.
pub(crate) fn encode_absent() -> Result<String> {
    Ok(serde_json::to_string(&Envelope::Absent)?)
}

/// Decode a raw lookup result.
///
/// `None` and undecodable payloads both come back as [`CacheResult::Miss`].
pub(crate) fn decode_entry(raw: Option<&String>) -> CacheResult {
    let Some(raw) = raw else {
        return CacheResult::Miss;
    };
    match serde_json::from_str::<Envelope>(raw) {
        Ok(Envelope::Hit { value }) => CacheResult::Hit(value),
        Ok(Envelope::Absent) => CacheResult::ConfirmedAbsent,
        Err(error) => {
            debug!(%error, "undecodable cache entry, treating as miss");
            CacheResult::Miss
        }
    }
}
