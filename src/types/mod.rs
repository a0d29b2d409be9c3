//! Public types for the Kaupang API.

mod aggregate;
mod key;
mod outcome;

pub use aggregate::{PriceAggregate, PriceField, Side, SideAggregate};
pub use key::{
    CacheKey, ItemId, LocationId, MAX_ITEM_ID, Scope, is_valid_item, is_valid_location,
};
pub use outcome::{CacheResult, FetchOutcome, PriceValue};
