//! Kaupang - Cache-first price lookups over a batched fetch pipeline
//!
//! This crate answers bulk market-price lookups from a TTL cache and
//! fills misses through a queued, claim-coordinated fetch pipeline, so
//! any number of concurrent readers costs one upstream request per
//! batch.
//!
//! Reads never wait on the network: a read answers what the cache can
//! resolve, reports everything else as pending, and queues it. The
//! host drives [`Pipeline::tick`] from a timer or job runner to drain
//! the queue, fetch in batches, and cache the results. Confirmed
//! absences are cached too, so items the upstream does not know about
//! are not refetched for hours.
//!
//! # Example
//!
//! ```rust,no_run
//! use kaupang::{Kaupang, PriceField, PriceValue, Scope, Side};
//!
//! #[tokio::main]
//! async fn main() -> kaupang::Result<()> {
//!     let pipeline = Kaupang::builder()
//!         .base_url("https://market.example/api/aggregates")
//!         .build()?;
//!
//!     // Nothing cached yet: the items come back pending and are queued.
//!     let values = pipeline
//!         .read(Scope::Region, 10000002, &[34, 35], Side::Sell, PriceField::Min)
//!         .await;
//!     assert!(values.iter().all(|v| matches!(v, PriceValue::Pending)));
//!
//!     // One tick (normally run from a timer) fetches and caches.
//!     let report = pipeline.tick().await;
//!     println!("fetched {} records", report.fetched_records);
//!
//!     // The same read now answers from cache.
//!     for value in pipeline
//!         .read(Scope::Region, 10000002, &[34, 35], Side::Sell, PriceField::Min)
//!         .await
//!     {
//!         println!("{value:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod claim;
pub mod config;
pub mod error;
pub mod fetch;
pub mod lock;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use claim::{ClaimCoordinator, ClaimRecord};
pub use config::{KaupangConfig, LimitsConfig, LockConfig, TtlConfig};
pub use error::{KaupangError, Result};
pub use fetch::{
    BatchFetcher, FormBodyTransport, JsonBodyTransport, QueryTransport, RawPayload, RetryConfig,
    Transport,
};
pub use lock::CoordLock;
pub use pipeline::{Kaupang, KaupangBuilder, Pipeline};
pub use queue::QueueTask;
pub use scheduler::TickReport;
pub use store::{CacheStore, MemoryStore};

// Re-export all types
pub use types::{
    CacheKey, CacheResult, FetchOutcome, ItemId, LocationId, MAX_ITEM_ID, PriceAggregate,
    PriceField, PriceValue, Scope, Side, SideAggregate, is_valid_item, is_valid_location,
};
