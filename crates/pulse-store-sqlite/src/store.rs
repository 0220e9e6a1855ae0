//! [`SqliteStore`], the SQLite implementation of [`LineageStore`].

use std::{path::Path, time::Duration};

use chrono::{DateTime, Utc};
use pulse_core::{
  PeriodKey, Tier,
  lineage::{
    Artifact, ChildRef, CommitOutcome, InclusionEdge, NewArtifact, PendingInput,
    RawInput, content_digest,
  },
  store::{InputWindow, LineageStore},
};
use rusqlite::{ErrorCode, OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    ARTIFACT_COLUMNS, ArtifactRow, EDGE_COLUMNS, EdgeRow, RAW_INPUT_COLUMNS,
    RawInputRow, decode_dt, encode_child, encode_date, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

/// How long a connection waits on another writer before reporting busy.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A lineage store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Several
/// processes may open the same file; the commit transaction is the only
/// synchronisation they need.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Query helpers ───────────────────────────────────────────────────────────

fn select_artifact(
  conn: &rusqlite::Connection,
  tier: &str,
  period_key: &str,
) -> rusqlite::Result<Option<ArtifactRow>> {
  conn
    .query_row(
      &format!(
        "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE tier = ?1 AND period_key = ?2"
      ),
      rusqlite::params![tier, period_key],
      ArtifactRow::from_row,
    )
    .optional()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(err.sqlite_error_code(), Some(ErrorCode::ConstraintViolation))
}

/// What the commit transaction found, before decoding.
enum CommitRow {
  Created(ArtifactRow),
  Existing(ArtifactRow),
  /// Index into the child list of the first child that could not be flipped.
  Ineligible(usize),
}

// ─── LineageStore impl ───────────────────────────────────────────────────────

impl LineageStore for SqliteStore {
  type Error = Error;

  // ── Raw inputs ────────────────────────────────────────────────────────────

  async fn record_discovered(
    &self,
    source_id:     String,
    discovered_at: DateTime<Utc>,
    payload:       String,
  ) -> Result<bool> {
    let at_str = encode_dt(discovered_at);

    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT INTO raw_inputs (source_id, discovered_at, payload, status)
           VALUES (?1, ?2, ?3, 'discovered')
           ON CONFLICT (source_id) DO NOTHING",
          rusqlite::params![source_id, at_str, payload],
        )?;
        Ok(n == 1)
      })
      .await?;

    Ok(inserted)
  }

  async fn mark_failed(&self, source_id: String, reason: String) -> Result<bool> {
    let at_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE raw_inputs
           SET status = 'failed', processed_at = ?2, failure_reason = ?3
           WHERE source_id = ?1 AND status = 'discovered'",
          rusqlite::params![source_id, at_str, reason],
        )?;
        Ok(n == 1)
      })
      .await?;

    Ok(changed)
  }

  async fn get_raw_input(&self, source_id: String) -> Result<Option<RawInput>> {
    let raw: Option<RawInputRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {RAW_INPUT_COLUMNS} FROM raw_inputs WHERE source_id = ?1"),
              rusqlite::params![source_id],
              RawInputRow::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawInputRow::into_raw_input).transpose()
  }

  async fn latest_discovery(&self) -> Result<Option<DateTime<Utc>>> {
    let latest: Option<String> = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT MAX(discovered_at) FROM raw_inputs", [], |r| {
          r.get(0)
        })?)
      })
      .await?;

    latest.as_deref().map(decode_dt).transpose()
  }

  // ── Resolution ────────────────────────────────────────────────────────────

  async fn list_unprocessed(
    &self,
    tier:   Tier,
    window: InputWindow,
  ) -> Result<Vec<PendingInput>> {
    if !window.fits(tier) {
      return Err(Error::WindowMismatch(tier));
    }

    match (window, tier.child()) {
      (InputWindow::Discovery { start, end }, _) => {
        let start_str = encode_dt(start);
        let end_str   = encode_dt(end);

        let rows: Vec<RawInputRow> = self
          .conn
          .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
              "SELECT {RAW_INPUT_COLUMNS} FROM raw_inputs
               WHERE status = 'discovered'
                 AND discovered_at >= ?1
                 AND discovered_at <  ?2
               ORDER BY discovered_at, source_id"
            ))?;
            let rows = stmt
              .query_map(rusqlite::params![start_str, end_str], RawInputRow::from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
          })
          .await?;

        rows
          .into_iter()
          .map(|row| row.into_raw_input().map(PendingInput::Raw))
          .collect()
      }
      (InputWindow::Anchor { first, last }, Some(child_tier)) => {
        let tier_str  = child_tier.as_ref().to_owned();
        let first_str = encode_date(first);
        let last_str  = encode_date(last);

        let rows: Vec<ArtifactRow> = self
          .conn
          .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
              "SELECT {ARTIFACT_COLUMNS} FROM artifacts
               WHERE tier = ?1
                 AND status = 'available'
                 AND anchor_date >= ?2
                 AND anchor_date <= ?3
               ORDER BY anchor_date, period_key, artifact_id"
            ))?;
            let rows = stmt
              .query_map(
                rusqlite::params![tier_str, first_str, last_str],
                ArtifactRow::from_row,
              )?
              .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
          })
          .await?;

        rows
          .into_iter()
          .map(|row| row.into_artifact().map(PendingInput::Artifact))
          .collect()
      }
      (InputWindow::Anchor { .. }, None) => Err(Error::WindowMismatch(tier)),
    }
  }

  // ── Commit ────────────────────────────────────────────────────────────────

  async fn create_artifact_and_commit_inclusion(
    &self,
    artifact: NewArtifact,
  ) -> Result<CommitOutcome> {
    let NewArtifact { period, content, children } = artifact;
    if children.is_empty() {
      return Err(Error::NoChildren(period));
    }

    let now            = Utc::now();
    let artifact_id    = encode_uuid(Uuid::new_v4());
    let tier_str       = period.tier().as_ref().to_owned();
    let child_tier_str = period.tier().child().map(|t| t.as_ref().to_owned());
    let key_str        = period.to_string();
    let start_str      = encode_date(period.start());
    let end_str        = encode_date(period.end());
    let anchor_str     = encode_date(period.anchor());
    let at_str         = encode_dt(now);
    let digest         = content_digest(&content);
    let encoded: Vec<(&'static str, String, String)> = children
      .iter()
      .map(|child| {
        let (kind, id) = encode_child(child);
        (kind, id, encode_uuid(Uuid::new_v4()))
      })
      .collect();

    let row = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = select_artifact(&tx, &tier_str, &key_str)? {
          return Ok(CommitRow::Existing(existing));
        }

        let inserted = tx.execute(
          "INSERT INTO artifacts (
             artifact_id, tier, period_key, period_start, period_end,
             anchor_date, generated_at, content, content_digest, status
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'available')",
          rusqlite::params![
            artifact_id,
            tier_str,
            key_str,
            start_str,
            end_str,
            anchor_str,
            at_str,
            content,
            digest,
          ],
        );
        if let Err(err) = inserted {
          if !is_unique_violation(&err) {
            return Err(err.into());
          }
          // Lost the race to a writer on another connection.
          drop(tx);
          return match select_artifact(conn, &tier_str, &key_str)? {
            Some(existing) => Ok(CommitRow::Existing(existing)),
            None => Err(err.into()),
          };
        }

        for (index, (kind, child_id, edge_id)) in encoded.iter().enumerate() {
          let flipped = match (*kind, child_tier_str.as_deref()) {
            ("raw", None) => tx.execute(
              "UPDATE raw_inputs SET status = 'processed', processed_at = ?2
               WHERE source_id = ?1 AND status = 'discovered'",
              rusqlite::params![child_id, at_str],
            )?,
            ("artifact", Some(child_tier)) => tx.execute(
              "UPDATE artifacts SET status = 'included'
               WHERE artifact_id = ?1 AND tier = ?2 AND status = 'available'",
              rusqlite::params![child_id, child_tier],
            )?,
            _ => 0,
          };
          if flipped != 1 {
            // Dropping `tx` rolls the whole commit back.
            return Ok(CommitRow::Ineligible(index));
          }

          tx.execute(
            "INSERT INTO inclusion_edges (
               edge_id, child_kind, child_id, parent_id, committed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![edge_id, kind, child_id, artifact_id, at_str],
          )?;
        }

        let created = select_artifact(&tx, &tier_str, &key_str)?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(CommitRow::Created(created))
      })
      .await?;

    match row {
      CommitRow::Created(row) => {
        let artifact = row.into_artifact()?;
        tracing::debug!(
          period = %artifact.period,
          children = children.len(),
          "committed artifact and inclusion edges"
        );
        Ok(CommitOutcome::Created(artifact))
      }
      CommitRow::Existing(row) => Ok(CommitOutcome::Existing(row.into_artifact()?)),
      CommitRow::Ineligible(index) => Err(Error::ChildNotEligible {
        child: children[index].clone(),
        period,
      }),
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_artifact(&self, period: PeriodKey) -> Result<Option<Artifact>> {
    let tier_str = period.tier().as_ref().to_owned();
    let key_str  = period.to_string();

    let raw: Option<ArtifactRow> = self
      .conn
      .call(move |conn| Ok(select_artifact(conn, &tier_str, &key_str)?))
      .await?;

    raw.map(ArtifactRow::into_artifact).transpose()
  }

  async fn list_artifacts(&self, tier: Option<Tier>) -> Result<Vec<Artifact>> {
    let tier_str = tier.map(|t| t.as_ref().to_owned());

    let rows: Vec<ArtifactRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ARTIFACT_COLUMNS} FROM artifacts
           WHERE (?1 IS NULL OR tier = ?1)
           ORDER BY CASE tier WHEN 'daily' THEN 0 WHEN 'weekly' THEN 1 ELSE 2 END,
                    anchor_date, period_key"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![tier_str], ArtifactRow::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows.into_iter().map(ArtifactRow::into_artifact).collect()
  }

  async fn lineage(&self, artifact_id: Uuid) -> Result<Vec<InclusionEdge>> {
    let id_str = encode_uuid(artifact_id);

    let rows: Vec<EdgeRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EDGE_COLUMNS} FROM inclusion_edges
           WHERE parent_id = ?1
           ORDER BY rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], EdgeRow::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows.into_iter().map(EdgeRow::into_edge).collect()
  }

  async fn parent_of(&self, child: ChildRef) -> Result<Option<InclusionEdge>> {
    let (kind, id) = encode_child(&child);

    let raw: Option<EdgeRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {EDGE_COLUMNS} FROM inclusion_edges
                 WHERE child_kind = ?1 AND child_id = ?2"
              ),
              rusqlite::params![kind, id],
              EdgeRow::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(EdgeRow::into_edge).transpose()
  }

  // ── Publication ───────────────────────────────────────────────────────────

  async fn list_unpublished(&self) -> Result<Vec<Artifact>> {
    let rows: Vec<ArtifactRow> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ARTIFACT_COLUMNS} FROM artifacts
           WHERE published_at IS NULL
           ORDER BY generated_at, rowid"
        ))?;
        let rows = stmt
          .query_map([], ArtifactRow::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows.into_iter().map(ArtifactRow::into_artifact).collect()
  }

  async fn mark_published(&self, artifact_id: Uuid, at: DateTime<Utc>) -> Result<()> {
    let id_str = encode_uuid(artifact_id);
    let at_str = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE artifacts SET published_at = ?2
           WHERE artifact_id = ?1 AND published_at IS NULL",
          rusqlite::params![id_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
