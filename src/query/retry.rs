//! Exponential backoff with jitter for failed live fetches.

use rand::Rng;
use std::time::Duration;

use crate::api::FetchError;

/// When and how soon to retry a failed fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  /// Consecutive failures after which automatic retries stop
  pub max_attempts: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
  /// Upper bound of the random extra delay, as a fraction of the base delay
  pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      base_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(30),
      jitter_ratio: 0.1,
    }
  }
}

impl RetryPolicy {
  /// Whether to retry after a failure.
  ///
  /// `retry_count` is the number of consecutive failures including this one.
  /// Auth failures are never retried.
  pub fn should_retry(&self, error: &FetchError, retry_count: u32) -> bool {
    !error.is_auth() && error.is_retryable() && retry_count < self.max_attempts
  }

  /// `min(base * 2^attempt, max)`, where `attempt` counts earlier failures.
  pub fn base_delay(&self, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }

  /// The backoff delay plus a random jitter of at most `jitter_ratio` of it.
  pub fn delay(&self, attempt: u32) -> Duration {
    let base = self.base_delay(attempt);
    if self.jitter_ratio <= 0.0 {
      return base;
    }
    let max_jitter = base.as_secs_f64() * self.jitter_ratio;
    let jitter = rand::rng().random_range(0.0..=max_jitter);
    base + Duration::from_secs_f64(jitter)
  }
}
