//! Exponential backoff for operations that may fail transiently.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first.
  pub max_attempts: u32,
  pub base_delay:   Duration,
  pub max_delay:    Duration,
}

impl RetryPolicy {
  /// Delay to wait after failed attempt number `attempt` (1-based): the base
  /// delay doubled once per earlier failure, capped at `max_delay`.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    self
      .base_delay
      .saturating_mul(1u32 << exponent)
      .min(self.max_delay)
  }

  /// Whether another attempt is allowed after `attempt` attempts.
  pub fn allows_retry_after(&self, attempt: u32) -> bool {
    attempt < self.max_attempts
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      base_delay:   Duration::from_millis(200),
      max_delay:    Duration::from_secs(5),
    }
  }
}
