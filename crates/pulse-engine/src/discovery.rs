//! Pulls new sources from the feed into the store as `Discovered` raw inputs.

use std::time::Duration;

use pulse_core::{
  collab::{SourceFeed, SourceItem},
  store::LineageStore,
};
use serde::Serialize;

use crate::{error::RunError, retry::RetryPolicy};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
  /// Items the feed offered.
  pub offered:  usize,
  /// Items that were new to the store.
  pub recorded: usize,
}

/// Ask `feed` for sources newer than the latest recorded discovery and
/// record each one. Re-offered sources are ignored by the store, so calling
/// this repeatedly is safe.
///
/// Transient feed failures and timeouts are retried under `policy`.
pub async fn discover<S, F>(
  store: &S,
  feed: &F,
  policy: &RetryPolicy,
  feed_timeout: Duration,
) -> Result<DiscoveryReport, RunError>
where
  S: LineageStore,
  F: SourceFeed,
{
  let since = store
    .latest_discovery()
    .await
    .map_err(|e| RunError::TransientIo {
      operation: "latest_discovery",
      message:   e.to_string(),
    })?;

  let items = fetch(feed, since, policy, feed_timeout).await?;
  let mut report = DiscoveryReport {
    offered: items.len(),
    ..DiscoveryReport::default()
  };

  for SourceItem {
    source_id,
    payload,
    timestamp,
  } in items
  {
    let inserted = store
      .record_discovered(source_id.clone(), timestamp, payload)
      .await
      .map_err(|e| RunError::TransientIo {
        operation: "record_discovered",
        message:   e.to_string(),
      })?;
    if inserted {
      tracing::debug!(%source_id, %timestamp, "discovered raw input");
      report.recorded += 1;
    }
  }

  tracing::info!(
    offered = report.offered,
    recorded = report.recorded,
    "discovery complete"
  );
  Ok(report)
}

async fn fetch<F: SourceFeed>(
  feed: &F,
  since: Option<chrono::DateTime<chrono::Utc>>,
  policy: &RetryPolicy,
  feed_timeout: Duration,
) -> Result<Vec<SourceItem>, RunError> {
  let mut attempt = 0;
  loop {
    attempt += 1;
    let (message, retryable) =
      match tokio::time::timeout(feed_timeout, feed.list_new_sources(since)).await
      {
        Ok(Ok(items)) => return Ok(items),
        Ok(Err(e)) => (e.to_string(), e.is_transient()),
        Err(_) => (format!("timed out after {feed_timeout:?}"), true),
      };

    if !retryable || !policy.allows_retry_after(attempt) {
      return Err(RunError::TransientIo {
        operation: "list_new_sources",
        message,
      });
    }
    let delay = policy.delay_for(attempt);
    tracing::warn!(attempt, error = %message, "source feed failed, retrying");
    tokio::time::sleep(delay).await;
  }
}
