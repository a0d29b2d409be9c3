//! Lookup and fetch outcome types.
//!
//! These enums replace in-band sentinel strings: a cache lookup, a
//! fetch classification, and a reader-facing value each get their own
//! tagged type, so "no data yet" and "confirmed no data" can never be
//! confused with a real price.

use crate::types::PriceAggregate;

/// Decoded state of one cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult {
    /// A fresh sanitised aggregate is cached.
    Hit(PriceAggregate),
    /// Upstream previously confirmed this item has no market data.
    ConfirmedAbsent,
    /// Nothing usable is cached: never fetched, expired, or the stored
    /// payload failed to decode.
    Miss,
}

impl CacheResult {
    /// Whether this lookup found anything actionable.
    ///
    /// Both hits and confirmed absences count: neither needs a fetch.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, CacheResult::Miss)
    }
}

/// Per-item classification of a successful batch fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Upstream returned usable statistics.
    Record(PriceAggregate),
    /// Upstream answered but had no data for the item, either because
    /// the id was missing from the response or every field was empty.
    ConfirmedAbsent,
}

/// Value handed to readers for one requested item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceValue {
    /// The requested statistic.
    Number(f64),
    /// A fetch is queued or in flight; ask again shortly.
    Pending,
    /// No value exists: the id is invalid, the item has no market
    /// data, or the cached aggregate lacks the requested field.
    Blank,
}

impl PriceValue {
    /// The numeric value, if resolved.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PriceValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether a fetch is still outstanding for this item.
    pub fn is_pending(&self) -> bool {
        matches!(self, PriceValue::Pending)
    }
}
