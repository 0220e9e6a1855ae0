//! Engine tuning knobs, deserialised from the `[engine]` table of the binary's
//! configuration.

use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::retry::RetryPolicy;

fn default_timezone() -> Tz { chrono_tz::America::New_York }
fn default_generation_timeout_secs() -> u64 { 120 }
fn default_commit_timeout_secs() -> u64 { 30 }
fn default_publish_timeout_secs() -> u64 { 30 }
fn default_feed_timeout_secs() -> u64 { 60 }
fn default_commit_max_attempts() -> u32 { 5 }
fn default_commit_backoff_ms() -> u64 { 200 }
fn default_commit_backoff_max_ms() -> u64 { 5_000 }
fn default_catch_up() -> bool { true }

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// IANA zone that defines calendar days for the daily tier.
  #[serde(default = "default_timezone")]
  pub timezone:                Tz,
  #[serde(default = "default_generation_timeout_secs")]
  pub generation_timeout_secs: u64,
  /// Bound on a single commit attempt, not on the whole retry loop.
  #[serde(default = "default_commit_timeout_secs")]
  pub commit_timeout_secs:     u64,
  #[serde(default = "default_publish_timeout_secs")]
  pub publish_timeout_secs:    u64,
  #[serde(default = "default_feed_timeout_secs")]
  pub feed_timeout_secs:       u64,
  #[serde(default = "default_commit_max_attempts")]
  pub commit_max_attempts:     u32,
  #[serde(default = "default_commit_backoff_ms")]
  pub commit_backoff_ms:       u64,
  #[serde(default = "default_commit_backoff_max_ms")]
  pub commit_backoff_max_ms:   u64,
  /// Also run earlier periods that still have eligible inputs.
  #[serde(default = "default_catch_up")]
  pub catch_up:                bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      timezone:                default_timezone(),
      generation_timeout_secs: default_generation_timeout_secs(),
      commit_timeout_secs:     default_commit_timeout_secs(),
      publish_timeout_secs:    default_publish_timeout_secs(),
      feed_timeout_secs:       default_feed_timeout_secs(),
      commit_max_attempts:     default_commit_max_attempts(),
      commit_backoff_ms:       default_commit_backoff_ms(),
      commit_backoff_max_ms:   default_commit_backoff_max_ms(),
      catch_up:                default_catch_up(),
    }
  }
}

impl EngineConfig {
  pub fn generation_timeout(&self) -> Duration {
    Duration::from_secs(self.generation_timeout_secs)
  }

  pub fn commit_timeout(&self) -> Duration {
    Duration::from_secs(self.commit_timeout_secs)
  }

  pub fn publish_timeout(&self) -> Duration {
    Duration::from_secs(self.publish_timeout_secs)
  }

  pub fn feed_timeout(&self) -> Duration {
    Duration::from_secs(self.feed_timeout_secs)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.commit_max_attempts.max(1),
      base_delay:   Duration::from_millis(self.commit_backoff_ms),
      max_delay:    Duration::from_millis(self.commit_backoff_max_ms),
    }
  }
}
