//! The `LineageStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `pulse-store-sqlite`).
//! The engine depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  lineage::{
    Artifact, ChildRef, CommitOutcome, InclusionEdge, NewArtifact, PendingInput,
    RawInput,
  },
  period::PeriodKey,
  tier::Tier,
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// The slice of time a resolution looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputWindow {
  /// Half-open range over raw-input discovery timestamps. Used by the daily
  /// tier.
  Discovery {
    start: DateTime<Utc>,
    end:   DateTime<Utc>,
  },
  /// Inclusive range over child artifacts' anchor dates. Used by the weekly
  /// and monthly tiers.
  Anchor { first: NaiveDate, last: NaiveDate },
}

impl InputWindow {
  /// A window of the right shape for `tier` that admits every row.
  pub fn unbounded(tier: Tier) -> Self {
    let first = NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN);
    let last = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX);
    match tier {
      Tier::Daily => Self::Discovery {
        start: first.and_time(chrono::NaiveTime::MIN).and_utc(),
        end:   last.and_time(chrono::NaiveTime::MIN).and_utc(),
      },
      Tier::Weekly | Tier::Monthly => Self::Anchor { first, last },
    }
  }

  /// Whether this window has the shape `tier` resolves against.
  pub fn fits(&self, tier: Tier) -> bool {
    matches!(
      (self, tier),
      (Self::Discovery { .. }, Tier::Daily)
        | (Self::Anchor { .. }, Tier::Weekly | Tier::Monthly)
    )
  }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Classification every backend error must offer so callers can decide
/// whether to retry without matching on strings.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// `true` when the same call may succeed if repeated later (connection
  /// dropped, database busy or locked).
  fn is_transient(&self) -> bool;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a lineage store backend.
///
/// All mutation of lineage state goes through [`record_discovered`],
/// [`mark_failed`] and [`create_artifact_and_commit_inclusion`]. Inclusion
/// edges are append-only.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
///
/// [`record_discovered`]: LineageStore::record_discovered
/// [`mark_failed`]: LineageStore::mark_failed
/// [`create_artifact_and_commit_inclusion`]:
/// LineageStore::create_artifact_and_commit_inclusion
pub trait LineageStore: Send + Sync {
  type Error: StoreError;

  // ── Raw inputs ────────────────────────────────────────────────────────

  /// Record a newly discovered source in `Discovered` state.
  ///
  /// Returns `false` without touching the existing row when `source_id` is
  /// already known.
  fn record_discovered(
    &self,
    source_id: String,
    discovered_at: DateTime<Utc>,
    payload: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Move a `Discovered` raw input to `Failed`. Returns `false` if the input
  /// is unknown or not in `Discovered` state.
  fn mark_failed(
    &self,
    source_id: String,
    reason: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn get_raw_input(
    &self,
    source_id: String,
  ) -> impl Future<Output = Result<Option<RawInput>, Self::Error>> + Send + '_;

  /// Discovery time of the most recently discovered raw input.
  fn latest_discovery(
    &self,
  ) -> impl Future<Output = Result<Option<DateTime<Utc>>, Self::Error>> + Send + '_;

  // ── Resolution ────────────────────────────────────────────────────────

  /// Rows eligible as inputs for the next generation at `tier`, restricted
  /// to `window`.
  ///
  /// Daily: `Discovered` raw inputs ordered by discovery time. Weekly and
  /// monthly: `Available` artifacts of the child tier ordered by anchor date.
  /// Ties break on identity, so the order is deterministic.
  fn list_unprocessed(
    &self,
    tier: Tier,
    window: InputWindow,
  ) -> impl Future<Output = Result<Vec<PendingInput>, Self::Error>> + Send + '_;

  // ── Commit ────────────────────────────────────────────────────────────

  /// The single atomic write of the tracker.
  ///
  /// Creates the artifact for `artifact.period`, appends one inclusion edge
  /// per child, and moves each child to `Processed`/`Included`, all in one
  /// transaction. If an artifact for the period already exists, returns it
  /// as [`CommitOutcome::Existing`] and writes nothing. If any child is no
  /// longer eligible, nothing is written and an error is returned.
  fn create_artifact_and_commit_inclusion(
    &self,
    artifact: NewArtifact,
  ) -> impl Future<Output = Result<CommitOutcome, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_artifact(
    &self,
    period: PeriodKey,
  ) -> impl Future<Output = Result<Option<Artifact>, Self::Error>> + Send + '_;

  /// All artifacts, optionally restricted to one tier, ordered by tier then
  /// anchor date.
  fn list_artifacts(
    &self,
    tier: Option<Tier>,
  ) -> impl Future<Output = Result<Vec<Artifact>, Self::Error>> + Send + '_;

  /// Inclusion edges whose parent is `artifact_id`, in commit order.
  fn lineage(
    &self,
    artifact_id: Uuid,
  ) -> impl Future<Output = Result<Vec<InclusionEdge>, Self::Error>> + Send + '_;

  /// The inclusion edge for `child`, if it has been included anywhere.
  fn parent_of(
    &self,
    child: ChildRef,
  ) -> impl Future<Output = Result<Option<InclusionEdge>, Self::Error>> + Send + '_;

  // ── Publication ───────────────────────────────────────────────────────

  /// Artifacts with no recorded publication, oldest first.
  fn list_unpublished(
    &self,
  ) -> impl Future<Output = Result<Vec<Artifact>, Self::Error>> + Send + '_;

  /// Record that `artifact_id` was published. Publication is bookkeeping
  /// only and never affects lineage.
  fn mark_published(
    &self,
    artifact_id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
