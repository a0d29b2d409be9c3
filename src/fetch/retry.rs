//! Retry configuration and delay calculation.
//!
//! Provides [`RetryConfig`] for controlling retry behaviour and the
//! shared `with_retry()` helper the fetcher wraps around each
//! transport attempt. Retries apply per transport: a transport
//! exhausts its attempts before the chain falls through to the next.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{KaupangError, Result};
use crate::telemetry;

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff with optional jitter:
///
/// ```rust
/// # use kaupang::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200))
///     .jitter(true);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
    /// Whether to add random jitter to delays. Default: true.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Check invariants. Called by the pipeline builder.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(KaupangError::Configuration(
                "max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Uses exponential backoff: `initial_delay * 2^attempt`, capped at
    /// `max_delay`. Does NOT include jitter — see
    /// [`effective_delay()`](Self::effective_delay) for the full
    /// calculation.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Calculate the effective delay, respecting server `retry_after` hints.
    ///
    /// A `retry_after` duration (from a `RateLimited` error) takes
    /// precedence over the calculated backoff and is never jittered.
    /// Otherwise the backoff is scaled by a uniform factor in
    /// `0.5..1.5` when jitter is enabled.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint;
        }
        let base = self.delay_for_attempt(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        use rand::Rng;
        base.mul_f64(rand::rng().random_range(0.5..1.5))
    }
}

/// Execute an async operation with retry logic.
///
/// Retries on transient errors (as classified by
/// [`KaupangError::is_transient()`]) up to `config.max_attempts`, using
/// exponential backoff and respecting `retry_after` hints from
/// `RateLimited` errors.
///
/// Permanent errors are returned immediately without retry.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    transport_name: &str,
    operation: &'static str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() => {
                metrics::counter!(telemetry::RETRIES_TOTAL,
                    "transport" => transport_name.to_owned(),
                    "operation" => operation,
                )
                .increment(1);
                if attempt + 1 < config.max_attempts {
                    let delay = config.effective_delay(attempt, e.retry_after());
                    warn!(
                        transport = transport_name,
                        operation,
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e), // permanent error, no retry
        }
    }
    Err(last_err.unwrap_or(KaupangError::NoTransport))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let config = RetryConfig::new()
            .initial_delay(Duration::from_millis(500))
            .max_delay(Duration::from_secs(30));

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[test]
    fn retry_after_hint_wins_and_skips_jitter() {
        let config = RetryConfig::new().jitter(true);
        let hint = Some(Duration::from_secs(7));
        assert_eq!(config.effective_delay(0, hint), Duration::from_secs(7));
    }

    #[test]
    fn jitter_stays_in_band() {
        let config = RetryConfig::new()
            .initial_delay(Duration::from_millis(100))
            .jitter(true);
        for _ in 0..100 {
            let delay = config.effective_delay(0, None);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn no_jitter_is_exact() {
        let config = RetryConfig::new().jitter(false);
        assert_eq!(config.effective_delay(1, None), Duration::from_secs(1));
    }

    #[test]
    fn validation_rejects_zero_attempts() {
        assert!(RetryConfig::new().max_attempts(0).validate().is_err());
        assert!(RetryConfig::disabled().validate().is_ok());
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let config = RetryConfig::new()
            .max_attempts(3)
            .initial_delay(Duration::from_millis(1))
            .jitter(false);
        let calls = AtomicU32::new(0);

        let result = with_retry(&config, "test", "fetch", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(KaupangError::Http("connection reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_short_circuit() {
        let config = RetryConfig::new()
            .max_attempts(3)
            .initial_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(&config, "test", "fetch", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(KaupangError::Api {
                    status: 404,
                    message: "not found".into(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(KaupangError::Api { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let config = RetryConfig::new()
            .max_attempts(2)
            .initial_delay(Duration::from_millis(1))
            .jitter(false);
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(&config, "test", "fetch", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(KaupangError::Api {
                    status: 503,
                    message: "overloaded".into(),
                })
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(KaupangError::Api { status: 503, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
