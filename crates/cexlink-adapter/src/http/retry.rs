/*
[INPUT]:  Failed REST attempt (normalized error + attempt number)
[OUTPUT]: Retry decision with the delay to wait before the next attempt
[POS]:    HTTP layer - retry classification and backoff curve
[UPDATE]: When changing which errors are retryable or the backoff formula
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ExchangeError;

/// Exponential backoff: `min(initial * factor^(attempt-1), max)` for attempt >= 1.
pub fn exponential_backoff(initial: Duration, factor: f64, max: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(63) as i32;
    let scaled = initial.as_nanos() as f64 * factor.max(1.0).powi(exp);
    if !scaled.is_finite() || scaled >= max.as_nanos() as f64 {
        max
    } else {
        Duration::from_nanos(scaled.round() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        exponential_backoff(
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_factor,
            Duration::from_millis(self.max_delay_ms),
            attempt,
        )
    }

    /// Returns the delay before the next attempt, or `None` when the error is
    /// terminal or attempts are exhausted. `attempt` is the 1-based number of
    /// the attempt that just failed.
    pub fn should_retry(&self, error: &ExchangeError, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts || !error.is_retryable() {
            return None;
        }

        let backoff = self.backoff(attempt);
        Some(match error.retry_delay() {
            Some(hint) => hint.max(backoff),
            None => backoff,
        })
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    5_000
}
