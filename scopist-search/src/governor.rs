//! Per-adapter rate governor enforcing a strict minimum call spacing.
//!
//! Each adapter owns exactly one [`RateGovernor`]. There is no burst
//! credit: after an idle period the next call is granted immediately, but
//! the one after it still waits the full interval. Governors share no
//! state, so one adapter's throttling never delays another.
//!
//! Time comes from [`tokio::time`], so tests drive it with a paused clock.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Strict minimum-spacing throttle for one source.
#[derive(Debug)]
pub struct RateGovernor {
    interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateGovernor {
    /// Creates a governor that grants at most one call per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    /// The configured minimum spacing.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until `interval` has passed since the last grant, then records
    /// and returns the new grant time.
    ///
    /// Concurrent callers queue on the internal lock, so grants stay spaced
    /// even when one adapter issues requests from several tasks. Dropping
    /// the future while it waits leaves the last grant untouched.
    pub async fn acquire(&self) -> Instant {
        let mut last = self.last_grant.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            let now = Instant::now();
            if ready_at > now {
                tracing::trace!(
                    wait_ms = (ready_at - now).as_millis() as u64,
                    "rate governor delaying call"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        let granted = Instant::now();
        *last = Some(granted);
        granted
    }

    /// When the last call was granted, if any.
    pub async fn last_grant(&self) -> Option<Instant> {
        *self.last_grant.lock().await
    }
}
