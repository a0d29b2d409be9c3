//! Pipeline configuration.
//!
//! Small builder-style structs with working defaults, grouped under
//! [`KaupangConfig`]. Everything is validated once at build time; the
//! running pipeline treats its config as immutable.

use std::time::Duration;

use rand::Rng;

use crate::error::{KaupangError, Result};
use crate::fetch::RetryConfig;
use crate::types::Scope;

/// Cache lifetime policy.
///
/// Positive entries live minutes and vary by scope: broader scopes
/// aggregate more orders, drift more slowly, and may be served staler.
/// Confirmed absences live hours, since items without market data
/// rarely gain any. Claim leases live seconds, just long enough to
/// cover one fetch round including retries.
///
/// ```rust
/// # use kaupang::TtlConfig;
/// # use std::time::Duration;
/// let ttl = TtlConfig::new()
///     .station_ttl(Duration::from_secs(300))
///     .negative_ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone)]
pub struct TtlConfig {
    /// Positive TTL for region-scoped entries. Default: 30 minutes.
    pub region_ttl: Duration,
    /// Positive TTL for system-scoped entries. Default: 20 minutes.
    pub system_ttl: Duration,
    /// Positive TTL for station-scoped entries. Default: 10 minutes.
    pub station_ttl: Duration,
    /// TTL for confirmed-absent entries. Default: 6 hours.
    pub negative_ttl: Duration,
    /// Lease lifetime for claim records. Default: 30 seconds.
    pub claim_ttl: Duration,
    /// Lifetime of the pending-queue blob. Default: 1 hour.
    ///
    /// Losing the queue to expiry is harmless: the next read of an
    /// unresolved item re-enqueues it.
    pub queue_ttl: Duration,
    /// Fractional TTL jitter applied to positive writes, `0.0..1.0`.
    /// Default: 0.10.
    ///
    /// Spreads expiry of entries written in the same batch so they do
    /// not all miss at once.
    pub jitter: f64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            region_ttl: Duration::from_secs(30 * 60),
            system_ttl: Duration::from_secs(20 * 60),
            station_ttl: Duration::from_secs(10 * 60),
            negative_ttl: Duration::from_secs(6 * 60 * 60),
            claim_ttl: Duration::from_secs(30),
            queue_ttl: Duration::from_secs(60 * 60),
            jitter: 0.10,
        }
    }
}

impl TtlConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the positive TTL for region-scoped entries.
    pub fn region_ttl(mut self, ttl: Duration) -> Self {
        self.region_ttl = ttl;
        self
    }

    /// Set the positive TTL for system-scoped entries.
    pub fn system_ttl(mut self, ttl: Duration) -> Self {
        self.system_ttl = ttl;
        self
    }

    /// Set the positive TTL for station-scoped entries.
    pub fn station_ttl(mut self, ttl: Duration) -> Self {
        self.station_ttl = ttl;
        self
    }

    /// Set the TTL for confirmed-absent entries.
    pub fn negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = ttl;
        self
    }

    /// Set the claim lease lifetime.
    pub fn claim_ttl(mut self, ttl: Duration) -> Self {
        self.claim_ttl = ttl;
        self
    }

    /// Set the pending-queue blob lifetime.
    pub fn queue_ttl(mut self, ttl: Duration) -> Self {
        self.queue_ttl = ttl;
        self
    }

    /// Set the fractional TTL jitter for positive writes.
    pub fn jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction;
        self
    }

    /// Positive TTL for the given scope, without jitter.
    pub fn positive_ttl(&self, scope: Scope) -> Duration {
        match scope {
            Scope::Region => self.region_ttl,
            Scope::System => self.system_ttl,
            Scope::Station => self.station_ttl,
        }
    }

    /// Positive TTL for the given scope with jitter applied.
    ///
    /// Scales the base TTL by a uniform factor in `1.0 ± jitter`.
    pub fn jittered_positive(&self, scope: Scope) -> Duration {
        let base = self.positive_ttl(scope);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = rand::rng().random_range(1.0 - self.jitter..1.0 + self.jitter);
        base.mul_f64(factor)
    }

    /// Check invariants. Called by the pipeline builder.
    pub fn validate(&self) -> Result<()> {
        for (name, ttl) in [
            ("region_ttl", self.region_ttl),
            ("system_ttl", self.system_ttl),
            ("station_ttl", self.station_ttl),
            ("negative_ttl", self.negative_ttl),
            ("claim_ttl", self.claim_ttl),
            ("queue_ttl", self.queue_ttl),
        ] {
            if ttl.is_zero() {
                return Err(KaupangError::Configuration(format!(
                    "{name} must be non-zero"
                )));
            }
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(KaupangError::Configuration(format!(
                "jitter must be in [0.0, 1.0), got {}",
                self.jitter
            )));
        }
        // Absences must stay cached longer than any positive entry,
        // even one written at the top of the jitter band.
        for scope in [Scope::Region, Scope::System, Scope::Station] {
            let ceiling = self.positive_ttl(scope).mul_f64(1.0 + self.jitter);
            if self.negative_ttl <= ceiling {
                return Err(KaupangError::Configuration(format!(
                    "negative_ttl must exceed the jittered {scope} TTL"
                )));
            }
        }
        Ok(())
    }
}

/// Batching and size limits.
///
/// Defaults reflect upstream and store ceilings: requests over ~700
/// ids get rejected upstream, bulk writes above 80 entries get
/// truncated by some store backends, and values near 100KB hit
/// per-entry store limits.
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Maximum item ids per queued fetch task. Default: 700.
    pub max_ids_per_task: usize,
    /// Maximum entries per bulk store write. Default: 80.
    pub max_entries_per_write: usize,
    /// Maximum encoded value size in bytes; larger values are skipped
    /// with a warning. Default: 95 KiB.
    pub max_entry_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ids_per_task: 700,
            max_entries_per_write: 80,
            max_entry_bytes: 95 * 1024,
        }
    }
}

impl LimitsConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum item ids per queued fetch task.
    pub fn max_ids_per_task(mut self, n: usize) -> Self {
        self.max_ids_per_task = n;
        self
    }

    /// Set the maximum entries per bulk store write.
    pub fn max_entries_per_write(mut self, n: usize) -> Self {
        self.max_entries_per_write = n;
        self
    }

    /// Set the maximum encoded value size in bytes.
    pub fn max_entry_bytes(mut self, n: usize) -> Self {
        self.max_entry_bytes = n;
        self
    }

    /// Check invariants. Called by the pipeline builder.
    pub fn validate(&self) -> Result<()> {
        if self.max_ids_per_task == 0 {
            return Err(KaupangError::Configuration(
                "max_ids_per_task must be non-zero".into(),
            ));
        }
        if self.max_entries_per_write == 0 {
            return Err(KaupangError::Configuration(
                "max_entries_per_write must be non-zero".into(),
            ));
        }
        if self.max_entry_bytes == 0 {
            return Err(KaupangError::Configuration(
                "max_entry_bytes must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Bounded waits for the coordination lock.
///
/// Every wait fails open: a caller that cannot take the lock in time
/// proceeds without it and accepts the (small, self-healing) risk of
/// duplicate work.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Wait when merging new ids into the queue. Default: 5 seconds.
    pub enqueue_wait: Duration,
    /// Wait when draining the queue in a tick. Default: 10 seconds.
    pub drain_wait: Duration,
    /// Wait when taking claim leases. Default: 3 seconds.
    pub claim_wait: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enqueue_wait: Duration::from_secs(5),
            drain_wait: Duration::from_secs(10),
            claim_wait: Duration::from_secs(3),
        }
    }
}

impl LockConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the enqueue lock wait.
    pub fn enqueue_wait(mut self, wait: Duration) -> Self {
        self.enqueue_wait = wait;
        self
    }

    /// Set the drain lock wait.
    pub fn drain_wait(mut self, wait: Duration) -> Self {
        self.drain_wait = wait;
        self
    }

    /// Set the claim lock wait.
    pub fn claim_wait(mut self, wait: Duration) -> Self {
        self.claim_wait = wait;
        self
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default)]
pub struct KaupangConfig {
    /// Cache lifetime policy.
    pub ttl: TtlConfig,
    /// Batching and size limits.
    pub limits: LimitsConfig,
    /// Bounded lock waits.
    pub lock: LockConfig,
    /// Upstream retry policy.
    pub retry: RetryConfig,
}

impl KaupangConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the TTL policy.
    pub fn ttl(mut self, ttl: TtlConfig) -> Self {
        self.ttl = ttl;
        self
    }

    /// Replace the limits.
    pub fn limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the lock waits.
    pub fn lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    /// Replace the retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Check all invariants. Called by the pipeline builder.
    pub fn validate(&self) -> Result<()> {
        self.ttl.validate()?;
        self.limits.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(KaupangConfig::default().validate().is_ok());
    }

    #[test]
    fn positive_ttl_orders_by_scope_breadth() {
        let ttl = TtlConfig::default();
        assert!(ttl.positive_ttl(Scope::Region) > ttl.positive_ttl(Scope::System));
        assert!(ttl.positive_ttl(Scope::System) > ttl.positive_ttl(Scope::Station));
    }

    #[test]
    fn negative_ttl_outlives_positive() {
        let ttl = TtlConfig::default();
        for scope in [Scope::Region, Scope::System, Scope::Station] {
            let ceiling = ttl.positive_ttl(scope).mul_f64(1.0 + ttl.jitter);
            assert!(
                ttl.negative_ttl > ceiling,
                "negative TTL must outlive the longest jittered {scope} TTL"
            );
        }
    }

    #[test]
    fn jittered_ttl_stays_in_band() {
        let ttl = TtlConfig::new().jitter(0.10);
        let base = ttl.positive_ttl(Scope::Region);
        for _ in 0..100 {
            let jittered = ttl.jittered_positive(Scope::Region);
            assert!(jittered >= base.mul_f64(0.9));
            assert!(jittered <= base.mul_f64(1.1));
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let ttl = TtlConfig::new().jitter(0.0);
        assert_eq!(
            ttl.jittered_positive(Scope::Station),
            ttl.positive_ttl(Scope::Station)
        );
    }

    #[test]
    fn validation_rejects_zero_ttl() {
        let ttl = TtlConfig::new().claim_ttl(Duration::ZERO);
        assert!(ttl.validate().is_err());
    }

    #[test]
    fn validation_rejects_out_of_range_jitter() {
        assert!(TtlConfig::new().jitter(1.0).validate().is_err());
        assert!(TtlConfig::new().jitter(-0.1).validate().is_err());
        assert!(TtlConfig::new().jitter(0.99).validate().is_ok());
    }

    #[test]
    fn validation_rejects_short_negative_ttl() {
        let ttl = TtlConfig::new().negative_ttl(Duration::from_secs(1));
        assert!(ttl.validate().is_err());

        // Exactly the jittered region ceiling is still too short.
        let ttl = TtlConfig::new()
            .jitter(0.0)
            .negative_ttl(Duration::from_secs(30 * 60));
        assert!(ttl.validate().is_err());

        let ttl = TtlConfig::new().negative_ttl(Duration::from_secs(60 * 60));
        assert!(ttl.validate().is_ok());
    }

    #[test]
    fn validation_rejects_zero_limits() {
        assert!(LimitsConfig::new().max_ids_per_task(0).validate().is_err());
        assert!(
            LimitsConfig::new()
                .max_entries_per_write(0)
                .validate()
                .is_err()
        );
        assert!(LimitsConfig::new().max_entry_bytes(0).validate().is_err());
    }
}
