//! `pulse` binary.
//!
//! Reads `pulse.toml` (or the path given with `--config`), opens the SQLite
//! lineage store and runs one command to completion. Scheduling is left to
//! cron, for example:
//!
//! ```text
//! 30 18 * * 1-5  pulse tick daily
//! 0  19 * * 5    pulse tick weekly
//! 0  7  4 * *    pulse tick monthly
//! ```
//!
//! The daily tick closes the current local day. A file for that day that
//! lands after the tick stays discovered and is reported as a late input on
//! every later run; it is never folded into a report, so schedule the daily
//! tick after the last export of the day.
//!
//! The monthly tick closes the latest month whose weeks have all ended. A
//! week belongs to the month holding its Thursday, so the last week of a
//! month can end as late as the 3rd of the next one; running on the 4th
//! always closes the previous month.
//!
//! Every period is attempted even when an earlier one fails; the process
//! exits non-zero afterwards if any of them did.

mod feed;
mod generator;
mod publisher;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pulse_core::{PeriodKey, Tier, lineage::ChildRef, store::LineageStore};
use pulse_engine::{RunOutcome, RunReport, RunState, TierOrchestrator, discover};
use pulse_store_sqlite::SqliteStore;
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::{
  feed::DirectoryFeed, generator::HttpGenerator, publisher::DirectoryPublisher,
  settings::Settings,
};

#[derive(Parser)]
#[command(author, version, about = "Trade Pulse report lineage tracker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "pulse.toml", env = "PULSE_CONFIG")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Record new raw inputs from the feed directory.
  Discover,
  /// Generate a single period; the tier's default target when `--period` is
  /// omitted.
  Run {
    tier:   Tier,
    #[arg(long)]
    period: Option<PeriodKey>,
  },
  /// Scheduled entry point: discovery (daily tier only), catch-up, the
  /// default target, then a republish sweep.
  Tick { tier: Tier },
  /// Retry publication of committed but unpublished artifacts.
  Republish,
  #[command(subcommand)]
  Show(Show),
}

#[derive(Subcommand)]
enum Show {
  /// List artifacts, optionally for one tier.
  Artifacts {
    #[arg(long)]
    tier: Option<Tier>,
  },
  /// Show an artifact with its children and its parent.
  Lineage { period: PeriodKey },
}

type Orchestrator =
  TierOrchestrator<SqliteStore, HttpGenerator, DirectoryPublisher>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  if let Some(parent) = settings.store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;

  match cli.command {
    Command::Discover => {
      let ok = run_discovery(&store, &settings).await;
      anyhow::ensure!(ok, "discovery failed");
    }
    Command::Run { tier, period } => {
      let orch = orchestrator(store, &settings)?;
      let period =
        period.unwrap_or_else(|| orch.resolver().default_target(tier, Utc::now()));
      anyhow::ensure!(
        period.tier() == tier,
        "period {period} is not a {tier} period"
      );
      let report = orch.run_period(period).await;
      finish(&[report], true)?;
    }
    Command::Tick { tier } => {
      let discovered = tier != Tier::Daily || run_discovery(&store, &settings).await;
      let orch = orchestrator(store, &settings)?;
      let reports = orch.tick(tier, Utc::now()).await;
      orch.republish_pending().await;
      finish(&reports, discovered)?;
    }
    Command::Republish => {
      let orch = orchestrator(store, &settings)?;
      let report = orch.republish_pending().await;
      print_json(&report)?;
      anyhow::ensure!(report.failed == 0, "{} artifact(s) not published", report.failed);
    }
    Command::Show(Show::Artifacts { tier }) => {
      let artifacts = store.list_artifacts(tier).await?;
      print_json(&artifacts)?;
    }
    Command::Show(Show::Lineage { period }) => {
      let artifact = store
        .get_artifact(period)
        .await?
        .with_context(|| format!("no artifact for {period}"))?;
      let children = store.lineage(artifact.artifact_id).await?;
      let parent = store
        .parent_of(ChildRef::Artifact(artifact.artifact_id))
        .await?;
      print_json(&serde_json::json!({
        "artifact": artifact,
        "children": children,
        "parent":   parent,
      }))?;
    }
  }

  Ok(())
}

fn orchestrator(store: SqliteStore, settings: &Settings) -> anyhow::Result<Orchestrator> {
  let generator = HttpGenerator::new(settings.generator.clone())?;
  let publisher = DirectoryPublisher::new(settings.reports_dir.clone());
  Ok(TierOrchestrator::new(
    store,
    generator,
    publisher,
    settings.engine.clone(),
  ))
}

/// Returns `false` when discovery failed; the failure is already logged.
async fn run_discovery(store: &SqliteStore, settings: &Settings) -> bool {
  let feed = DirectoryFeed::new(settings.feed_dir.clone(), settings.engine.timezone);
  let policy = settings.engine.retry_policy();
  match discover(store, &feed, &policy, settings.engine.feed_timeout()).await {
    Ok(report) => print_json(&report).is_ok(),
    Err(e) => {
      tracing::error!(error = %e, "discovery failed");
      false
    }
  }
}

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct RunSummary {
  run_id:      Uuid,
  period:      PeriodKey,
  inputs:      usize,
  state:       RunState,
  outcome:     String,
  #[serde(skip_serializing_if = "Option::is_none")]
  artifact_id: Option<Uuid>,
  #[serde(skip_serializing_if = "Option::is_none")]
  error_kind:  Option<&'static str>,
}

impl From<&RunReport> for RunSummary {
  fn from(report: &RunReport) -> Self {
    Self {
      run_id:      report.run_id,
      period:      report.period,
      inputs:      report.inputs,
      state:       report.final_state(),
      outcome:     report.outcome.to_string(),
      artifact_id: report.outcome.artifact().map(|a| a.artifact_id),
      error_kind:  match &report.outcome {
        RunOutcome::Failed(e) => Some(e.kind()),
        _ => None,
      },
    }
  }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  let text = serde_json::to_string_pretty(value).context("serialising output")?;
  println!("{text}");
  Ok(())
}

/// Print every report, then fail if any run failed.
fn finish(reports: &[RunReport], discovered: bool) -> anyhow::Result<()> {
  let summaries: Vec<RunSummary> = reports.iter().map(RunSummary::from).collect();
  print_json(&summaries)?;

  let failed = reports.iter().filter(|r| r.outcome.is_failure()).count();
  anyhow::ensure!(discovered, "discovery failed");
  anyhow::ensure!(failed == 0, "{failed} of {} run(s) failed", reports.len());
  Ok(())
}
