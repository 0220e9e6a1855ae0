//! Drives one tier through `RESOLVING → GENERATING → COMMITTING`.
//!
//! The orchestrator owns no lineage state of its own. Everything it knows is
//! read from the store at the start of a run, and the only durable write of a
//! successful run is the committer's single transaction. A run that is
//! dropped before it reaches `COMMITTING` therefore leaves nothing behind.

use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use pulse_core::{
  PeriodKey, Tier,
  collab::{
    ArtifactGenerator, ArtifactPublisher, GenerationRequest, InputPayload,
  },
  lineage::{Artifact, CommitOutcome, NewArtifact, PendingInput},
  store::LineageStore,
};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
  committer::InclusionCommitter,
  config::EngineConfig,
  error::RunError,
  resolver::IngestionResolver,
  state::{RunMachine, RunState, TransitionRecord},
};

// ─── Reports ─────────────────────────────────────────────────────────────────

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
  /// No eligible inputs.
  Empty,
  /// The period already had an artifact. `late_inputs` eligible rows were
  /// found for it and left untouched.
  AlreadyGenerated {
    artifact:    Artifact,
    late_inputs: usize,
  },
  /// This run created the artifact.
  Created(Artifact),
  /// A concurrent run committed the period first.
  AlreadyCommitted(Artifact),
  Failed(RunError),
}

impl RunOutcome {
  pub fn is_failure(&self) -> bool { matches!(self, Self::Failed(_)) }

  pub fn artifact(&self) -> Option<&Artifact> {
    match self {
      Self::AlreadyGenerated { artifact, .. }
      | Self::Created(artifact)
      | Self::AlreadyCommitted(artifact) => Some(artifact),
      Self::Empty | Self::Failed(_) => None,
    }
  }
}

impl fmt::Display for RunOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Empty => f.write_str("no eligible inputs"),
      Self::AlreadyGenerated { late_inputs, .. } => {
        write!(f, "already generated ({late_inputs} late input(s) ignored)")
      }
      Self::Created(a) => write!(f, "created {}", a.artifact_id),
      Self::AlreadyCommitted(a) => {
        write!(f, "already committed as {}", a.artifact_id)
      }
      Self::Failed(e) => write!(f, "failed: {e}"),
    }
  }
}

#[derive(Debug, Clone)]
pub struct RunReport {
  pub run_id:      Uuid,
  pub period:      PeriodKey,
  /// Number of eligible inputs the run resolved.
  pub inputs:      usize,
  pub outcome:     RunOutcome,
  pub transitions: Vec<TransitionRecord>,
}

impl RunReport {
  pub fn final_state(&self) -> RunState {
    self.transitions.last().map_or(RunState::Idle, |t| t.to)
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
  pub published: usize,
  pub failed:    usize,
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

pub struct TierOrchestrator<S, G, P> {
  store:     S,
  generator: G,
  publisher: P,
  resolver:  IngestionResolver,
  committer: InclusionCommitter,
  config:    EngineConfig,
}

impl<S, G, P> TierOrchestrator<S, G, P>
where
  S: LineageStore,
  G: ArtifactGenerator,
  P: ArtifactPublisher,
{
  pub fn new(store: S, generator: G, publisher: P, config: EngineConfig) -> Self {
    Self {
      resolver: IngestionResolver::new(config.timezone),
      committer: InclusionCommitter::new(
        config.retry_policy(),
        config.commit_timeout(),
      ),
      store,
      generator,
      publisher,
      config,
    }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn resolver(&self) -> &IngestionResolver { &self.resolver }

  pub fn config(&self) -> &EngineConfig { &self.config }

  /// Run the scheduled work for `tier` at `now`: the default target period,
  /// preceded by every earlier period with eligible inputs when catch-up is
  /// enabled. Periods run oldest first, one at a time.
  pub async fn tick(&self, tier: Tier, now: DateTime<Utc>) -> Vec<RunReport> {
    let target = self.resolver.default_target(tier, now);
    let mut periods = BTreeSet::new();

    if self.config.catch_up {
      match self.resolver.pending_periods(&self.store, tier).await {
        Ok(pending) => {
          periods.extend(pending.into_iter().filter(|p| *p < target));
        }
        Err(e) => {
          tracing::warn!(
            %tier,
            error = %e,
            "could not list pending periods, skipping catch-up"
          );
        }
      }
    }
    periods.insert(target);

    let mut reports = Vec::with_capacity(periods.len());
    for period in periods {
      reports.push(self.run_period(period).await);
    }
    reports
  }

  /// Run one period to completion. Every failure is captured in the report.
  pub async fn run_period(&self, period: PeriodKey) -> RunReport {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!(
      "run",
      tier = %period.tier(),
      %period,
      %run_id
    );
    async move {
      let mut run = Run::new(run_id, period);
      let outcome = self.drive(&mut run).await;
      if let RunOutcome::Failed(e) = &outcome {
        run.enter(RunState::Failed);
        if !e.is_critical() {
          tracing::warn!(kind = e.kind(), error = %e, "run failed; inputs stay eligible");
        }
      }
      run.finish(outcome)
    }
    .instrument(span)
    .await
  }

  async fn drive(&self, run: &mut Run) -> RunOutcome {
    let period = run.period;
    run.enter(RunState::Resolving);

    let inputs = match self.resolver.resolve(&self.store, period).await {
      Ok(inputs) => inputs,
      Err(e) => {
        return RunOutcome::Failed(RunError::TransientIo {
          operation: "list_unprocessed",
          message:   e.to_string(),
        });
      }
    };
    let inputs = match self.screen(inputs).await {
      Ok(inputs) => inputs,
      Err(e) => return RunOutcome::Failed(e),
    };
    run.inputs = inputs.len();

    if inputs.is_empty() {
      tracing::info!("no eligible inputs");
      run.enter(RunState::Done);
      return RunOutcome::Empty;
    }

    match self.store.get_artifact(period).await {
      Ok(Some(artifact)) => {
        tracing::warn!(
          late_inputs = inputs.len(),
          artifact_id = %artifact.artifact_id,
          "period already has an artifact; late inputs left untouched"
        );
        run.enter(RunState::Done);
        return RunOutcome::AlreadyGenerated {
          artifact,
          late_inputs: inputs.len(),
        };
      }
      Ok(None) => {}
      Err(e) => {
        return RunOutcome::Failed(RunError::TransientIo {
          operation: "get_artifact",
          message:   e.to_string(),
        });
      }
    }

    run.enter(RunState::Generating);
    let content = match self.generate(period, &inputs).await {
      Ok(content) => content,
      Err(e) => return RunOutcome::Failed(e),
    };

    run.enter(RunState::Committing);
    let new = NewArtifact {
      period,
      content,
      children: inputs.iter().map(PendingInput::child_ref).collect(),
    };
    match self.committer.commit(&self.store, new).await {
      Ok(CommitOutcome::Created(artifact)) => {
        tracing::info!(
          artifact_id = %artifact.artifact_id,
          children = inputs.len(),
          "artifact committed"
        );
        run.enter(RunState::Done);
        self.publish(&artifact).await;
        RunOutcome::Created(artifact)
      }
      Ok(CommitOutcome::Existing(artifact)) => {
        tracing::info!(
          artifact_id = %artifact.artifact_id,
          "period was committed by a concurrent run"
        );
        run.enter(RunState::Done);
        RunOutcome::AlreadyCommitted(artifact)
      }
      Err(e) => RunOutcome::Failed(e),
    }
  }

  /// Daily tier only: raw inputs with a blank payload are marked failed and
  /// dropped from the batch.
  async fn screen(
    &self,
    inputs: Vec<PendingInput>,
  ) -> Result<Vec<PendingInput>, RunError> {
    let mut kept = Vec::with_capacity(inputs.len());
    for input in inputs {
      match &input {
        PendingInput::Raw(raw) if raw.payload.trim().is_empty() => {
          tracing::warn!(source_id = %raw.source_id, "blank raw input, marking failed");
          self
            .store
            .mark_failed(raw.source_id.clone(), "empty payload".to_owned())
            .await
            .map_err(|e| RunError::TransientIo {
              operation: "mark_failed",
              message:   e.to_string(),
            })?;
        }
        _ => kept.push(input),
      }
    }
    Ok(kept)
  }

  async fn generate(
    &self,
    period: PeriodKey,
    inputs: &[PendingInput],
  ) -> Result<String, RunError> {
    let request = GenerationRequest {
      period,
      inputs: inputs
        .iter()
        .map(|input| InputPayload {
          label: input.label(),
          body:  input.payload().to_owned(),
        })
        .collect(),
    };
    let timeout = self.config.generation_timeout();

    let reason = match tokio::time::timeout(timeout, self.generator.generate(request))
      .await
    {
      Ok(Ok(content)) if !content.trim().is_empty() => return Ok(content),
      Ok(Ok(_)) => "generator returned blank content".to_owned(),
      Ok(Err(e)) => e.to_string(),
      Err(_) => format!("timed out after {timeout:?}"),
    };
    Err(RunError::Generation { period, reason })
  }

  /// Best effort. A failure is logged and retried by
  /// [`republish_pending`](Self::republish_pending).
  async fn publish(&self, artifact: &Artifact) -> bool {
    let timeout = self.config.publish_timeout();
    let error = match tokio::time::timeout(timeout, self.publisher.publish(artifact))
      .await
    {
      Ok(Ok(())) => None,
      Ok(Err(e)) => Some(e.to_string()),
      Err(_) => Some(format!("timed out after {timeout:?}")),
    };

    if let Some(error) = error {
      tracing::warn!(
        artifact_id = %artifact.artifact_id,
        period = %artifact.period,
        %error,
        "publish failed; will retry on a later tick"
      );
      return false;
    }

    if let Err(e) = self
      .store
      .mark_published(artifact.artifact_id, Utc::now())
      .await
    {
      tracing::warn!(
        artifact_id = %artifact.artifact_id,
        error = %e,
        "published but could not record publication"
      );
    }
    true
  }

  /// Publish every committed artifact that has no recorded publication.
  pub async fn republish_pending(&self) -> PublishReport {
    let mut report = PublishReport::default();
    let pending = match self.store.list_unpublished().await {
      Ok(pending) => pending,
      Err(e) => {
        tracing::warn!(error = %e, "could not list unpublished artifacts");
        return report;
      }
    };

    for artifact in &pending {
      if self.publish(artifact).await {
        report.published += 1;
      } else {
        report.failed += 1;
      }
    }
    if !pending.is_empty() {
      tracing::info!(
        published = report.published,
        failed = report.failed,
        "republish sweep complete"
      );
    }
    report
  }
}

// ─── Run bookkeeping ─────────────────────────────────────────────────────────

struct Run {
  run_id:  Uuid,
  period:  PeriodKey,
  inputs:  usize,
  machine: RunMachine,
}

impl Run {
  fn new(run_id: Uuid, period: PeriodKey) -> Self {
    Self {
      run_id,
      period,
      inputs: 0,
      machine: RunMachine::new(),
    }
  }

  /// The orchestrator's control flow only asks for legal transitions, so a
  /// rejection here is a bug; it is logged rather than aborting the run.
  fn enter(&mut self, to: RunState) {
    if let Err(e) = self.machine.advance(to) {
      tracing::error!(error = %e, "state machine rejected transition");
    }
  }

  fn finish(self, outcome: RunOutcome) -> RunReport {
    RunReport {
      run_id: self.run_id,
      period: self.period,
      inputs: self.inputs,
      outcome,
      transitions: self.machine.into_transitions(),
    }
  }
}
