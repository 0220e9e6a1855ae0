//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with a fixed microsecond
//! width, so lexical order in SQL matches chronological order. Calendar dates
//! are `YYYY-MM-DD`. UUIDs are stored as hyphenated lowercase strings. Enums
//! use their `snake_case` names.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use pulse_core::{
  PeriodKey, Tier,
  lineage::{Artifact, ChildRef, InclusionEdge, RawInput},
  tier::{InclusionStatus, InputStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc>
// ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

// ─── Enums ───────────────────────────────────────────────────────────────────

fn decode_enum<T: std::str::FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::UnknownValue {
    column,
    value: s.to_owned(),
  })
}

// ─── ChildRef ────────────────────────────────────────────────────────────────

pub fn encode_child(child: &ChildRef) -> (&'static str, String) {
  match child {
    ChildRef::Raw(source_id) => ("raw", source_id.clone()),
    ChildRef::Artifact(id) => ("artifact", encode_uuid(*id)),
  }
}

pub fn decode_child(kind: &str, id: &str) -> Result<ChildRef> {
  match kind {
    "raw" => Ok(ChildRef::Raw(id.to_owned())),
    "artifact" => Ok(ChildRef::Artifact(decode_uuid(id)?)),
    other => Err(Error::UnknownValue {
      column: "child_kind",
      value:  other.to_owned(),
    }),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawInputRow::from_row`].
pub const RAW_INPUT_COLUMNS: &str =
  "source_id, discovered_at, payload, status, processed_at, failure_reason";

/// Raw strings read directly from a `raw_inputs` row.
pub struct RawInputRow {
  pub source_id:      String,
  pub discovered_at:  String,
  pub payload:        String,
  pub status:         String,
  pub processed_at:   Option<String>,
  pub failure_reason: Option<String>,
}

impl RawInputRow {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      source_id:      row.get(0)?,
      discovered_at:  row.get(1)?,
      payload:        row.get(2)?,
      status:         row.get(3)?,
      processed_at:   row.get(4)?,
      failure_reason: row.get(5)?,
    })
  }

  pub fn into_raw_input(self) -> Result<RawInput> {
    Ok(RawInput {
      source_id:      self.source_id,
      discovered_at:  decode_dt(&self.discovered_at)?,
      payload:        self.payload,
      status:         decode_enum::<InputStatus>("raw_inputs.status", &self.status)?,
      processed_at:   self.processed_at.as_deref().map(decode_dt).transpose()?,
      failure_reason: self.failure_reason,
    })
  }
}

/// Column list matching [`ArtifactRow::from_row`].
pub const ARTIFACT_COLUMNS: &str = "artifact_id, tier, period_key, generated_at, \
                                    content, content_digest, status, published_at";

/// Raw strings read directly from an `artifacts` row.
pub struct ArtifactRow {
  pub artifact_id:    String,
  pub tier:           String,
  pub period_key:     String,
  pub generated_at:   String,
  pub content:        String,
  pub content_digest: String,
  pub status:         String,
  pub published_at:   Option<String>,
}

impl ArtifactRow {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      artifact_id:    row.get(0)?,
      tier:           row.get(1)?,
      period_key:     row.get(2)?,
      generated_at:   row.get(3)?,
      content:        row.get(4)?,
      content_digest: row.get(5)?,
      status:         row.get(6)?,
      published_at:   row.get(7)?,
    })
  }

  pub fn into_artifact(self) -> Result<Artifact> {
    let tier = decode_enum::<Tier>("artifacts.tier", &self.tier)?;
    let period = PeriodKey::parse_for(tier, &self.period_key)?;

    Ok(Artifact {
      artifact_id: decode_uuid(&self.artifact_id)?,
      period,
      generated_at: decode_dt(&self.generated_at)?,
      content: self.content,
      content_digest: self.content_digest,
      status: decode_enum::<InclusionStatus>("artifacts.status", &self.status)?,
      published_at: self.published_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Column list matching [`EdgeRow::from_row`].
pub const EDGE_COLUMNS: &str =
  "edge_id, child_kind, child_id, parent_id, committed_at";

/// Raw strings read directly from an `inclusion_edges` row.
pub struct EdgeRow {
  pub edge_id:      String,
  pub child_kind:   String,
  pub child_id:     String,
  pub parent_id:    String,
  pub committed_at: String,
}

impl EdgeRow {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      edge_id:      row.get(0)?,
      child_kind:   row.get(1)?,
      child_id:     row.get(2)?,
      parent_id:    row.get(3)?,
      committed_at: row.get(4)?,
    })
  }

  pub fn into_edge(self) -> Result<InclusionEdge> {
    Ok(InclusionEdge {
      edge_id:      decode_uuid(&self.edge_id)?,
      child:        decode_child(&self.child_kind, &self.child_id)?,
      parent_id:    decode_uuid(&self.parent_id)?,
      committed_at: decode_dt(&self.committed_at)?,
    })
  }
}
