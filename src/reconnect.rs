//! Reconnection Policy
//!
//! Full-jitter exponential backoff for WebSocket reconnection: each attempt
//! sleeps a uniformly random duration between zero and the current ceiling,
//! which doubles per attempt up to a cap. A bounded attempt budget turns
//! persistent outages into a fatal [`ReconnectError`].

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Backoff ceiling for the first attempt.
    pub base_delay: Duration,
    /// Maximum backoff ceiling.
    pub max_delay: Duration,
    /// Attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 20,
        }
    }
}

/// Full-jitter exponential backoff policy.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Get the delay for the next attempt, or `None` once the attempt
    /// budget is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }

        let exponent = self.attempt_count.min(31);
        self.attempt_count += 1;

        let base_millis = u128::from(u64::try_from(self.config.base_delay.as_millis()).unwrap_or(u64::MAX));
        let ceiling = base_millis
            .saturating_mul(1u128 << exponent)
            .min(self.config.max_delay.as_millis());
        let ceiling = u64::try_from(ceiling).unwrap_or(u64::MAX);

        let jittered = if ceiling == 0 {
            0
        } else {
            rand::rng().random_range(0..=ceiling)
        };

        Some(Duration::from_millis(jittered))
    }

    /// Reset after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts consumed since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt remains in the budget.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }
}

/// Error raised when the reconnect budget is spent.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxAttemptsExceeded(u32),
}
