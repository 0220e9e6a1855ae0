//! Why a run ended in `FAILED`.

use pulse_core::PeriodKey;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RunError {
  /// The feed or the store could not be reached while reading.
  #[error("{operation} failed: {message}")]
  TransientIo {
    operation: &'static str,
    message:   String,
  },

  /// The generator failed, timed out or returned an unusable document.
  /// Nothing was written and the inputs stay eligible.
  #[error("generation for {period} failed: {reason}")]
  Generation { period: PeriodKey, reason: String },

  /// Content was generated but could not be recorded.
  #[error("commit for {period} failed after {attempts} attempt(s): {message}")]
  CommitIo {
    period:   PeriodKey,
    attempts: u32,
    message:  String,
  },
}

impl RunError {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::TransientIo { .. } => "transient_io",
      Self::Generation { .. } => "generation",
      Self::CommitIo { .. } => "commit_io",
    }
  }

  /// Generated work was lost and needs an operator.
  pub fn is_critical(&self) -> bool { matches!(self, Self::CommitIo { .. }) }
}
