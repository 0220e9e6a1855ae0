//! Collaborator contracts: the source feed, the artifact generator and the
//! artifact publisher.
//!
//! These are the only ways the engine talks to the outside world. None of
//! them touch the lineage store.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{lineage::Artifact, period::PeriodKey, tier::Tier};

/// An error reported by a collaborator.
#[derive(Debug, Error)]
pub enum CollabError {
  /// The remote side could not be reached or answered with a server error.
  #[error("collaborator unavailable: {0}")]
  Unavailable(String),

  /// The remote side refused the request.
  #[error("collaborator rejected request: {0}")]
  Rejected(String),

  /// The remote side answered, but the answer is unusable.
  #[error("malformed response: {0}")]
  Malformed(String),
}

impl CollabError {
  pub fn is_transient(&self) -> bool { matches!(self, Self::Unavailable(_)) }
}

// ─── Source feed ─────────────────────────────────────────────────────────────

/// One file offered by the source feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
  pub source_id: String,
  pub payload:   String,
  pub timestamp: DateTime<Utc>,
}

/// Lists raw sources. Must be safe to call repeatedly; returning an item that
/// was already offered is expected.
pub trait SourceFeed: Send + Sync {
  fn list_new_sources(
    &self,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<SourceItem>, CollabError>> + Send + '_;
}

// ─── Generator ───────────────────────────────────────────────────────────────

/// One input handed to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPayload {
  /// Source id for raw inputs, period key for artifacts.
  pub label: String,
  pub body:  String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
  pub period: PeriodKey,
  pub inputs: Vec<InputPayload>,
}

impl GenerationRequest {
  pub fn tier(&self) -> Tier { self.period.tier() }
}

/// Turns a set of inputs into one summary document. Either a full document
/// or an error; never partial output.
pub trait ArtifactGenerator: Send + Sync {
  fn generate(
    &self,
    request: GenerationRequest,
  ) -> impl Future<Output = Result<String, CollabError>> + Send + '_;
}

// ─── Publisher ───────────────────────────────────────────────────────────────

/// Pushes a committed artifact to outbound channels. Best-effort.
pub trait ArtifactPublisher: Send + Sync {
  fn publish<'a>(
    &'a self,
    artifact: &'a Artifact,
  ) -> impl Future<Output = Result<(), CollabError>> + Send + 'a;
}
