//! Builder for configuring pipeline instances

use std::sync::Arc;

use super::Pipeline;
use crate::config::{KaupangConfig, LimitsConfig, LockConfig, TtlConfig};
use crate::error::{KaupangError, Result};
use crate::fetch::{BatchFetcher, RetryConfig, Transport};
use crate::store::CacheStore;

/// Main entry point for creating pipeline instances.
pub struct Kaupang;

impl Kaupang {
    /// Create a new builder for configuring the pipeline.
    pub fn builder() -> KaupangBuilder {
        KaupangBuilder::new()
    }
}

/// Builder for configuring pipeline instances.
pub struct KaupangBuilder {
    base_url: Option<String>,
    store: Option<Arc<dyn CacheStore>>,
    http: Option<reqwest::Client>,
    transports: Vec<Arc<dyn Transport>>,
    config: KaupangConfig,
}

impl KaupangBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            store: None,
            http: None,
            transports: Vec::new(),
            config: KaupangConfig::default(),
        }
    }

    /// Upstream endpoint the default transport chain talks to.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Use a custom store backend.
    ///
    /// Defaults to an in-process [`MemoryStore`](crate::store::MemoryStore).
    /// Sharing claims and the queue across processes requires a store
    /// backed by something those processes can all reach.
    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a pre-configured HTTP client for the default transports.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Append a custom transport, tried after any added earlier.
    ///
    /// When any custom transport is present the default chain is not
    /// built and `base_url` is not required.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: KaupangConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the TTL policy.
    pub fn ttl(mut self, ttl: TtlConfig) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Replace the batching and size limits.
    pub fn limits(mut self, limits: LimitsConfig) -> Self {
        self.config.limits = limits;
        self
    }

    /// Replace the bounded lock waits.
    pub fn lock(mut self, lock: LockConfig) -> Self {
        self.config.lock = lock;
        self
    }

    /// Replace the upstream retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the pipeline.
    pub fn build(self) -> Result<Pipeline> {
        use crate::claim::ClaimCoordinator;
        use crate::fetch::{FormBodyTransport, JsonBodyTransport, QueryTransport};
        use crate::lock::CoordLock;
        use crate::queue::PendingQueue;
        use crate::store::MemoryStore;

        self.config.validate()?;

        let transports: Vec<Arc<dyn Transport>> = if !self.transports.is_empty() {
            self.transports
        } else {
            let url = self.base_url.ok_or_else(|| {
                KaupangError::Configuration(
                    "either base_url or at least one custom transport is required".into(),
                )
            })?;
            let http = match self.http {
                Some(client) => client,
                None => crate::fetch::default_client()?,
            };
            // Default chain, most to least structured.
            vec![
                Arc::new(JsonBodyTransport::new(http.clone(), url.clone())),
                Arc::new(FormBodyTransport::new(http.clone(), url.clone())),
                Arc::new(QueryTransport::new(http, url)),
            ]
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::default()));

        // One lock serializes queue and claim mutations alike.
        let lock = CoordLock::new();

        Ok(Pipeline {
            store: store.clone(),
            queue: PendingQueue::new(store.clone(), lock.clone(), &self.config),
            claims: ClaimCoordinator::new(store.clone(), lock, &self.config),
            fetcher: BatchFetcher::new(transports, self.config.retry.clone()),
            config: self.config,
        })
    }
}

impl Default for KaupangBuilder {
    fn default() -> Self {
        Self::new()
    }
}
