//! Bounded, fail-open coordination lock.
//!
//! One lock serialises the read-modify-write cycles of the pending
//! queue and the claim coordinator. Waits are bounded: a caller that
//! cannot take the lock in time proceeds without it, because a stale
//! read is preferable to a reader waiting forever. The duplicate work
//! an unlocked cycle can cause is self-healing (idempotent merges,
//! TTL-expiring claims).
//!
//! Never hold the guard across upstream network calls; critical
//! sections cover store reads and writes only.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::telemetry;

/// Shared coordination lock with bounded, fail-open acquisition.
#[derive(Clone, Default)]
pub struct CoordLock {
    inner: Arc<Mutex<()>>,
}

impl CoordLock {
    /// Create a new unheld lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the lock within `wait`.
    ///
    /// Returns `None` on timeout. Callers treat `None` as permission
    /// to proceed unlocked; the timeout is recorded and logged.
    pub async fn acquire(
        &self,
        wait: Duration,
        operation: &'static str,
    ) -> Option<OwnedMutexGuard<()>> {
        match tokio::time::timeout(wait, self.inner.clone().lock_owned()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                metrics::counter!(telemetry::LOCK_TIMEOUTS_TOTAL, "operation" => operation)
                    .increment(1);
                warn!(
                    operation,
                    wait_ms = wait.as_millis() as u64,
                    "lock wait timed out, proceeding without lock"
                );
                None
            }
        }
    }
}
