//! Bounded retry policy: which failures are retried and how long to wait.

use crate::config::GatewayConfig;
use crate::gateway::error::GatewayError;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Applied to the backoff of rate-limited attempts.
    pub rate_limit_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            rate_limit_multiplier: config.rate_limit_backoff_multiplier,
            jitter: true,
        }
    }

    /// Policy with no waits, for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            rate_limit_multiplier: 1.0,
            jitter: false,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether a failure after `retries_done` retries gets another attempt.
    pub fn should_retry(&self, error: &GatewayError, retries_done: u32) -> bool {
        error.is_retryable() && retries_done < self.max_retries
    }

    /// Wait before retry number `retry` (0-based) following `error`.
    ///
    /// `base * 2^retry` capped at `max_delay`; rate limits multiply both the
    /// delay and the cap, and a longer server `retry_after` wins.
    pub fn backoff(&self, retry: u32, error: &GatewayError) -> Duration {
        let exp = self
            .base_delay
            .checked_mul(2u32.saturating_pow(retry.min(16)))
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if matches!(error, GatewayError::RateLimited { .. }) {
            let cap = self.max_delay.mul_f64(self.rate_limit_multiplier);
            let scaled = self.jittered(exp.mul_f64(self.rate_limit_multiplier));
            match error.retry_after() {
                Some(server) if server > scaled => server.min(cap),
                _ => scaled,
            }
        } else {
            self.jittered(exp)
        }
    }

    /// Equal jitter: half the delay plus a random share of the other half.
    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half = delay / 2;
        let spread = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
        half + Duration::from_millis(spread)
    }
}
