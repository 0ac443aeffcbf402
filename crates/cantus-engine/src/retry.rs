//! Retry policy for synthesis calls.
//!
//! Retries only the kinds the taxonomy marks retriable; everything else
//! propagates on first failure. The schedule is exponential with a cap
//! and symmetric jitter so parallel slots do not thunder in step.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff schedule with jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base: Duration,
    pub multiplier: u32,
    pub cap: Duration,
    /// Symmetric jitter fraction (0.25 means ±25%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
            multiplier: 2,
            cap: Duration::from_secs(10),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based: the delay after the
    /// first failed attempt is `delay(1)`).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let raw = self
            .base
            .saturating_mul(self.multiplier.saturating_pow(exp));
        let capped = raw.min(self.cap);

        if self.jitter <= 0.0 {
            return capped;
        }
        let spread = capped.as_secs_f64() * self.jitter;
        let jittered = capped.as_secs_f64()
            + rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64(jittered.max(0.0))
    }
}
