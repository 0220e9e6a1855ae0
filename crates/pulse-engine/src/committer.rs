//! Retries the atomic create-and-commit until it lands or the budget runs out.

use std::time::Duration;

use pulse_core::{
  lineage::{CommitOutcome, NewArtifact},
  store::{LineageStore, StoreError},
};

use crate::{error::RunError, retry::RetryPolicy};

#[derive(Debug, Clone)]
pub struct InclusionCommitter {
  policy:          RetryPolicy,
  attempt_timeout: Duration,
}

impl InclusionCommitter {
  pub fn new(policy: RetryPolicy, attempt_timeout: Duration) -> Self {
    Self {
      policy,
      attempt_timeout,
    }
  }

  pub fn policy(&self) -> &RetryPolicy { &self.policy }

  /// Commit `artifact` with its children.
  ///
  /// Every attempt sends identical content and children, so an attempt that
  /// timed out after the store actually committed is picked up by the next
  /// attempt as [`CommitOutcome::Existing`].
  pub async fn commit<S: LineageStore>(
    &self,
    store: &S,
    artifact: NewArtifact,
  ) -> Result<CommitOutcome, RunError> {
    let period = artifact.period;
    let mut attempt = 0;

    loop {
      attempt += 1;
      let result = tokio::time::timeout(
        self.attempt_timeout,
        store.create_artifact_and_commit_inclusion(artifact.clone()),
      )
      .await;

      let (message, retryable) = match result {
        Ok(Ok(outcome)) => {
          if attempt > 1 {
            tracing::info!(attempt, "commit succeeded after retry");
          }
          return Ok(outcome);
        }
        Ok(Err(e)) => (e.to_string(), e.is_transient()),
        Err(_) => (
          format!("attempt timed out after {:?}", self.attempt_timeout),
          true,
        ),
      };

      if !retryable || !self.policy.allows_retry_after(attempt) {
        tracing::error!(
          alert = "critical",
          %period,
          attempts = attempt,
          retryable,
          error = %message,
          "commit failed; generated content was not recorded"
        );
        return Err(RunError::CommitIo {
          period,
          attempts: attempt,
          message,
        });
      }

      let delay = self.policy.delay_for(attempt);
      tracing::warn!(
        attempt,
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        error = %message,
        "commit failed, retrying with identical content"
      );
      tokio::time::sleep(delay).await;
    }
  }
}
