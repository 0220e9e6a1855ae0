//! Error types for `pulse-core`.

use thiserror::Error;

use crate::tier::Tier;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid period key: {0:?}")]
  InvalidPeriod(String),

  #[error("expected a {expected} period, found {found}")]
  TierMismatch { expected: Tier, found: Tier },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
