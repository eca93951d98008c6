//! Exponential backoff with jitter for offline redelivery

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Backoff schedule for offline queue retries.
///
/// The nominal delay for attempt `n` is `min(base * 2^n, max)`; the actual
/// delay is drawn uniformly from `[nominal / 2, nominal]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Upper bound of the delay before retry number `retry_count`
    pub fn nominal_delay(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max))
    }

    pub fn delay_with<R: Rng + ?Sized>(&self, retry_count: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_delay(retry_count).as_millis() as u64;
        if nominal == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng.gen_range(nominal / 2..=nominal))
    }

    pub fn delay(&self, retry_count: u32) -> Duration {
        self.delay_with(retry_count, &mut rand::thread_rng())
    }

    /// Next attempt time, or `None` once `retry_count` exceeds `max_retry`
    pub fn next_retry_at(
        &self,
        now: DateTime<Utc>,
        retry_count: i32,
        max_retry: i32,
    ) -> Option<DateTime<Utc>> {
        if retry_count > max_retry {
            return None;
        }
        let delay = self.delay(u32::try_from(retry_count).unwrap_or(0));
        chrono::Duration::from_std(delay).ok().map(|d| now + d)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(300))
    }
}
