//! Retry pacing for connection establishment

use rand::Rng;
use std::time::Duration;

/// Backoff parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Growth factor per consecutive failure
    pub multiplier: f64,
    /// Fraction of the delay added as uniform random jitter (0.0 disables)
    pub jitter: f64,
    /// Consecutive failures tolerated before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: 0.1,
            max_attempts: None,
        }
    }
}

/// Exponential backoff state for consecutive failures
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempts: u32,
}

impl Backoff {
    /// Create backoff state from its configuration
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    ///
    /// Returns `None` once `max_attempts` consecutive failures were recorded.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        if let Some(max) = self.config.max_attempts {
            if self.attempts >= max {
                return None;
            }
        }

        let base = self.base_delay(self.attempts - 1);
        if self.config.jitter > 0.0 && !base.is_zero() {
            let extra = rand::thread_rng().gen_range(0.0..=self.config.jitter);
            let jittered = (base.as_nanos() as f64 * (1.0 + extra)).round() as u64;
            Some(Duration::from_nanos(jittered).min(self.config.max_delay))
        } else {
            Some(base)
        }
    }

    /// Forget previous failures after a success
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive failures recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn base_delay(&self, exponent: u32) -> Duration {
        let factor = self.config.multiplier.max(1.0).powi(exponent.min(64) as i32);
        let initial = self.config.initial_delay.as_nanos() as f64;
        let max = self.config.max_delay.as_nanos() as f64;
        Duration::from_nanos((initial * factor).min(max).round() as u64)
    }
}
