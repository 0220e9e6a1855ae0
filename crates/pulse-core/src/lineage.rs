//! Lineage records: raw inputs, artifacts, and the inclusion edges between
//! them.
//!
//! Raw inputs and artifacts carry an explicit status. Inclusion edges are
//! strictly append-only; a child has at most one parent edge, so "has X been
//! included" is a single lookup rather than a derived computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
  period::PeriodKey,
  tier::{InclusionStatus, InputStatus, Tier},
};

// ─── Raw inputs ──────────────────────────────────────────────────────────────

/// One ingested source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInput {
  /// Stable identifier assigned by the source feed.
  pub source_id:      String,
  pub discovered_at:  DateTime<Utc>,
  pub payload:        String,
  pub status:         InputStatus,
  pub processed_at:   Option<DateTime<Utc>>,
  /// Set only when `status` is [`InputStatus::Failed`].
  pub failure_reason: Option<String>,
}

// ─── Artifacts ───────────────────────────────────────────────────────────────

/// One generated report at a given tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
  pub artifact_id:    Uuid,
  pub period:         PeriodKey,
  pub generated_at:   DateTime<Utc>,
  pub content:        String,
  /// Lowercase hex SHA-256 of `content`.
  pub content_digest: String,
  pub status:         InclusionStatus,
  pub published_at:   Option<DateTime<Utc>>,
}

impl Artifact {
  pub fn tier(&self) -> Tier { self.period.tier() }

  pub fn is_available(&self) -> bool {
    self.status == InclusionStatus::Available
  }
}

/// Hex SHA-256 digest of generated content.
pub fn content_digest(content: &str) -> String {
  hex::encode(Sha256::digest(content.as_bytes()))
}

/// A generated artifact waiting to be committed together with its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArtifact {
  pub period:   PeriodKey,
  pub content:  String,
  pub children: Vec<ChildRef>,
}

/// Result of [`LineageStore::create_artifact_and_commit_inclusion`].
///
/// [`LineageStore::create_artifact_and_commit_inclusion`]:
/// crate::store::LineageStore::create_artifact_and_commit_inclusion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
  /// This call created the artifact and committed every inclusion edge.
  Created(Artifact),
  /// An artifact for the period already existed; nothing was written.
  Existing(Artifact),
}

impl CommitOutcome {
  pub fn artifact(&self) -> &Artifact {
    match self {
      Self::Created(a) | Self::Existing(a) => a,
    }
  }

  pub fn into_artifact(self) -> Artifact {
    match self {
      Self::Created(a) | Self::Existing(a) => a,
    }
  }

  pub fn is_created(&self) -> bool { matches!(self, Self::Created(_)) }
}

// ─── Inclusion edges ─────────────────────────────────────────────────────────

/// Reference to something that can be included in an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ChildRef {
  /// A raw input, by source identifier.
  Raw(String),
  /// A lower-tier artifact, by artifact id.
  Artifact(Uuid),
}

/// Records that `child` contributed to the artifact `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionEdge {
  pub edge_id:      Uuid,
  pub child:        ChildRef,
  pub parent_id:    Uuid,
  pub committed_at: DateTime<Utc>,
}

// ─── Pending inputs ──────────────────────────────────────────────────────────

/// A row eligible to feed the next generation at some tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingInput {
  Raw(RawInput),
  Artifact(Artifact),
}

impl PendingInput {
  pub fn child_ref(&self) -> ChildRef {
    match self {
      Self::Raw(raw) => ChildRef::Raw(raw.source_id.clone()),
      Self::Artifact(artifact) => ChildRef::Artifact(artifact.artifact_id),
    }
  }

  /// Human-readable name for the input: the source id or the period key.
  pub fn label(&self) -> String {
    match self {
      Self::Raw(raw) => raw.source_id.clone(),
      Self::Artifact(artifact) => artifact.period.to_string(),
    }
  }

  pub fn payload(&self) -> &str {
    match self {
      Self::Raw(raw) => &raw.payload,
      Self::Artifact(artifact) => &artifact.content,
    }
  }
}
