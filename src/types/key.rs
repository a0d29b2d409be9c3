//! Cache key types.
//!
//! Every cached aggregate is addressed by a `(scope, location, item)`
//! triple. The same triple also addresses the claim lease that guards
//! in-flight fetches, under a separate key prefix.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Inventory item identifier as it appears in upstream payloads.
pub type ItemId = i64;

/// Location identifier; its meaning depends on the query scope.
pub type LocationId = i64;

/// Largest item id accepted from callers.
///
/// Upstream ids are 32-bit; anything above this is caller garbage and
/// is answered with a blank rather than queued.
pub const MAX_ITEM_ID: ItemId = i32::MAX as ItemId;

/// Geographic granularity of a market query.
///
/// Scope determines the upstream request parameter and the positive
/// cache TTL: broader scopes aggregate more orders and change more
/// slowly, so they stay fresh longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// A whole region's order book.
    Region,
    /// A single solar system.
    System,
    /// One station's orders only.
    Station,
}

impl Scope {
    /// Stable lowercase name, used in storage keys, request parameters,
    /// and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Region => "region",
            Scope::System => "system",
            Scope::Station => "station",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of one cached aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// Query scope.
    pub scope: Scope,
    /// Location the aggregate was computed over.
    pub location: LocationId,
    /// Item the aggregate describes.
    pub item: ItemId,
}

impl CacheKey {
    /// Create a key for the given triple.
    pub fn new(scope: Scope, location: LocationId, item: ItemId) -> Self {
        Self {
            scope,
            location,
            item,
        }
    }

    /// Storage key of the price entry, e.g. `price:region:10000002:34`.
    pub fn price_key(&self) -> String {
        format!("price:{}:{}:{}", self.scope, self.location, self.item)
    }

    /// Storage key of the claim lease, e.g. `claim:region:10000002:34`.
    pub fn claim_key(&self) -> String {
        format!("claim:{}:{}:{}", self.scope, self.location, self.item)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.scope, self.location, self.item)
    }
}

/// Whether an item id is plausible enough to query upstream.
///
/// Non-positive ids and ids beyond [`MAX_ITEM_ID`] are rejected at the
/// read boundary so they never reach the queue.
pub fn is_valid_item(item: ItemId) -> bool {
    item > 0 && item <= MAX_ITEM_ID
}

/// Whether a location id is plausible enough to query upstream.
pub fn is_valid_location(location: LocationId) -> bool {
    location > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_names_are_stable() {
        assert_eq!(Scope::Region.as_str(), "region");
        assert_eq!(Scope::System.as_str(), "system");
        assert_eq!(Scope::Station.as_str(), "station");
    }

    #[test]
    fn scope_serializes_lowercase() {
        let json = serde_json::to_string(&Scope::Region).unwrap();
        assert_eq!(json, "\"region\"");
        let back: Scope = serde_json::from_str("\"station\"").unwrap();
        assert_eq!(back, Scope::Station);
    }

    #[test]
    fn storage_keys_are_namespaced() {
        let key = CacheKey::new(Scope::Region, 10000002, 34);
        assert_eq!(key.price_key(), "price:region:10000002:34");
        assert_eq!(key.claim_key(), "claim:region:10000002:34");
    }

    #[test]
    fn item_validation_bounds() {
        assert!(is_valid_item(1));
        assert!(is_valid_item(34));
        assert!(is_valid_item(MAX_ITEM_ID));

        assert!(!is_valid_item(0));
        assert!(!is_valid_item(-5));
        assert!(!is_valid_item(MAX_ITEM_ID + 1));
    }

    #[test]
    fn location_validation_bounds() {
        assert!(is_valid_location(10000002));
        assert!(!is_valid_location(0));
        assert!(!is_valid_location(-1));
    }
}
