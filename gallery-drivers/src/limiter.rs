//! Token bucket rate limiting for outbound requests.
//!
//! Each driver owns one [`RateLimiter`]. Callers reserve their slot while holding the bucket
//! lock and then sleep outside of it, so requests are delayed in arrival order and never
//! dropped.
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use gallery_common::log::trace;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::DriverError;

const MIN_RATE: f64 = 1e-6;

#[derive(Debug)]
struct Bucket {
    /// Can go negative: every outstanding reservation takes one token in advance.
    tokens: f64,
    last_refill: Instant,
    /// Slot handed to the most recent caller that had to wait.
    latest_slot: Option<Instant>,
}

#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a limiter refilling `rate` tokens per second and banking at most `burst` tokens.
    ///
    /// The bucket starts full. A `burst` of zero is treated as one.
    #[must_use]
    pub fn new(rate: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate: rate.max(MIN_RATE),
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
                latest_slot: None,
            }),
        }
    }

    /// Waits until a token is available.
    ///
    /// Returns [`DriverError::Cancelled`] as soon as `cancel` fires. A cancelled caller hands its
    /// slot back when nobody reserved after it.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), DriverError> {
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }

        let Some(slot) = self.reserve() else {
            return Ok(());
        };

        trace!(
            "Rate limited, waiting {:?}",
            slot.saturating_duration_since(Instant::now())
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.release(slot);
                Err(DriverError::Cancelled)
            }
            () = sleep_until(slot) => Ok(()),
        }
    }

    /// Takes a token and returns the instant it becomes usable, or `None` if it's usable now.
    fn reserve(&self) -> Option<Instant> {
        let now = Instant::now();
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = self.burst.min(bucket.tokens + elapsed.as_secs_f64() * self.rate);
        bucket.last_refill = now;
        bucket.tokens -= 1.0;

        if bucket.tokens >= 0.0 {
            return None;
        }

        let slot = now + Duration::from_secs_f64(-bucket.tokens / self.rate);
        bucket.latest_slot = Some(slot);
        Some(slot)
    }

    fn release(&self, slot: Instant) {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        if bucket.latest_slot == Some(slot) {
            bucket.tokens = self.burst.min(bucket.tokens + 1.0);
            bucket.latest_slot = None;
        }
    }
}
