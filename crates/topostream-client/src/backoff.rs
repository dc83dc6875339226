//! Reconnect delay schedule.
//!
//! The delay for attempt `n` is `min(base * 2^n, max)` plus a uniformly
//! random jitter of up to half that value, so a fleet of viewers that lost
//! the server at the same moment does not reconnect in lockstep.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    attempt: u32,
}

impl Backoff {
    /// Start a schedule at attempt zero.
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            base_ms: config.base_ms,
            max_ms: config.max_ms,
            attempt: 0,
        }
    }

    /// Number of delays handed out since the last reset.
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Return to attempt zero after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the next attempt, advancing the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling_ms(self.attempt);
        let jitter = rand::rng().random_range(0..=ceiling.checked_div(2).unwrap_or(0));
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(ceiling.saturating_add(jitter))
    }

    /// Exponential part of the delay for `attempt`, before jitter.
    fn ceiling_ms(&self, attempt: u32) -> u64 {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.max_ms)
    }
}
