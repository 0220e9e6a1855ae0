//! Error type for `pulse-store-sqlite`.

use pulse_core::{PeriodKey, Tier, lineage::ChildRef, store::StoreError};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] pulse_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {column} value: {value:?}")]
  UnknownValue { column: &'static str, value: String },

  /// A child handed to the commit was already included, failed, unknown, or
  /// of the wrong tier. The transaction was rolled back.
  #[error("{child:?} is not eligible for inclusion in {period}")]
  ChildNotEligible { child: ChildRef, period: PeriodKey },

  #[error("refusing to commit {0} without any inputs")]
  NoChildren(PeriodKey),

  #[error("window does not fit the {0} tier")]
  WindowMismatch(Tier),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl StoreError for Error {
  fn is_transient(&self) -> bool {
    match self {
      Error::Database(tokio_rusqlite::Error::ConnectionClosed) => true,
      Error::Database(tokio_rusqlite::Error::Rusqlite(e)) => matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
      ),
      _ => false,
    }
  }
}
