//! Exponential reconnect backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay schedule for store reconnection attempts.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the given attempt (attempt 0 is immediate).
    /// Jitter of up to 10% spreads reconnect storms across a fleet.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponential_base = 2u64.saturating_pow(attempt - 1);
        let delay_ms = (self.base.as_millis() as u64).saturating_mul(exponential_base);
        let capped_delay = delay_ms.min(self.max.as_millis() as u64);

        let jitter_range = capped_delay / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped_delay + jitter)
    }
}
