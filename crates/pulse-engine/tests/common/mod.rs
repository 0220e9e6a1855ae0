//! In-process collaborators and a fault-injecting store for engine tests.

#![allow(dead_code)]

use std::{
  collections::VecDeque,
  future::Future,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::America::New_York;
use pulse_core::{
  PeriodKey, Tier,
  collab::{
    ArtifactGenerator, ArtifactPublisher, CollabError, GenerationRequest,
    SourceFeed, SourceItem,
  },
  lineage::{
    Artifact, ChildRef, CommitOutcome, InclusionEdge, NewArtifact, PendingInput,
    RawInput,
  },
  store::{InputWindow, LineageStore, StoreError},
};
use pulse_engine::{EngineConfig, TierOrchestrator};
use pulse_store_sqlite::SqliteStore;
use uuid::Uuid;

// ─── Fixtures ────────────────────────────────────────────────────────────────

pub fn config() -> EngineConfig {
  EngineConfig {
    timezone:                New_York,
    generation_timeout_secs: 1,
    commit_timeout_secs:     5,
    publish_timeout_secs:    1,
    feed_timeout_secs:       1,
    commit_max_attempts:     4,
    commit_backoff_ms:       5,
    commit_backoff_max_ms:   20,
    catch_up:                true,
  }
}

/// A wall-clock time in New York.
pub fn et(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
  New_York
    .with_ymd_and_hms(y, m, d, h, min, 0)
    .unwrap()
    .with_timezone(&Utc)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn day(y: i32, m: u32, d: u32) -> PeriodKey { PeriodKey::day(date(y, m, d)) }

pub async fn memory_store() -> SqliteStore {
  SqliteStore::open_in_memory().await.unwrap()
}

pub type Orchestrator<S> = TierOrchestrator<S, FakeGenerator, FakePublisher>;

pub fn orchestrator<S: LineageStore>(
  store: S,
  generator: &FakeGenerator,
  publisher: &FakePublisher,
) -> Orchestrator<S> {
  orchestrator_with(store, generator, publisher, config())
}

pub fn orchestrator_with<S: LineageStore>(
  store: S,
  generator: &FakeGenerator,
  publisher: &FakePublisher,
  config: EngineConfig,
) -> Orchestrator<S> {
  TierOrchestrator::new(store, generator.clone(), publisher.clone(), config)
}

/// Record a raw input discovered at `at`.
pub async fn seed_raw<S: LineageStore>(
  store: &S,
  source_id: &str,
  at: DateTime<Utc>,
) {
  store
    .record_discovered(
      source_id.to_owned(),
      at,
      format!("symbol,qty,price\nAAPL,10,190.5\n# {source_id}"),
    )
    .await
    .unwrap();
}

/// Commit a daily artifact for `d` directly through the store.
pub async fn seed_daily<S: LineageStore>(store: &S, d: NaiveDate) -> Artifact {
  let source_id = format!("trades_{}.csv", d.format("%m_%d_%Y"));
  seed_raw(store, &source_id, d.and_hms_opt(17, 0, 0).unwrap().and_utc()).await;
  store
    .create_artifact_and_commit_inclusion(NewArtifact {
      period:   PeriodKey::day(d),
      content:  format!("daily report {d}"),
      children: vec![ChildRef::Raw(source_id)],
    })
    .await
    .unwrap()
    .into_artifact()
}

// ─── Generator ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
  Succeed,
  Fail,
  Blank,
  Hang,
  Slow(Duration),
}

#[derive(Default)]
struct GeneratorState {
  script:   Mutex<VecDeque<Behaviour>>,
  requests: Mutex<Vec<GenerationRequest>>,
}

/// Follows a script of behaviours, then succeeds forever.
#[derive(Clone, Default)]
pub struct FakeGenerator {
  state: Arc<GeneratorState>,
}

impl FakeGenerator {
  pub fn new() -> Self { Self::default() }

  pub fn then(&self, behaviour: Behaviour) -> &Self {
    self.state.script.lock().unwrap().push_back(behaviour);
    self
  }

  pub fn calls(&self) -> usize { self.state.requests.lock().unwrap().len() }

  pub fn requests(&self) -> Vec<GenerationRequest> {
    self.state.requests.lock().unwrap().clone()
  }
}

fn render(request: &GenerationRequest) -> String {
  let labels: Vec<&str> =
    request.inputs.iter().map(|i| i.label.as_str()).collect();
  format!(
    "# {} report {}\n\n{}\n",
    request.tier(),
    request.period,
    labels.join("\n")
  )
}

impl ArtifactGenerator for FakeGenerator {
  async fn generate(
    &self,
    request: GenerationRequest,
  ) -> Result<String, CollabError> {
    self.state.requests.lock().unwrap().push(request.clone());
    let behaviour = self
      .state
      .script
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or(Behaviour::Succeed);

    match behaviour {
      Behaviour::Succeed => Ok(render(&request)),
      Behaviour::Fail => Err(CollabError::Unavailable("model offline".into())),
      Behaviour::Blank => Ok("  \n".into()),
      Behaviour::Hang => {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(render(&request))
      }
      Behaviour::Slow(delay) => {
        tokio::time::sleep(delay).await;
        Ok(render(&request))
      }
    }
  }
}

// ─── Publisher ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct PublisherState {
  failing:   AtomicBool,
  published: Mutex<Vec<PeriodKey>>,
}

#[derive(Clone, Default)]
pub struct FakePublisher {
  state: Arc<PublisherState>,
}

impl FakePublisher {
  pub fn new() -> Self { Self::default() }

  pub fn set_failing(&self, failing: bool) {
    self.state.failing.store(failing, Ordering::SeqCst);
  }

  pub fn published(&self) -> Vec<PeriodKey> {
    self.state.published.lock().unwrap().clone()
  }
}

impl ArtifactPublisher for FakePublisher {
  fn publish<'a>(
    &'a self,
    artifact: &'a Artifact,
  ) -> impl Future<Output = Result<(), CollabError>> + Send + 'a {
    async move {
      if self.state.failing.load(Ordering::SeqCst) {
        return Err(CollabError::Unavailable("mail relay down".into()));
      }
      self.state.published.lock().unwrap().push(artifact.period);
      Ok(())
    }
  }
}

// ─── Feed ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FeedState {
  items:         Mutex<Vec<SourceItem>>,
  failures_left: AtomicUsize,
  calls:         AtomicUsize,
}

/// Offers every item it holds on every call, ignoring `since`.
#[derive(Clone, Default)]
pub struct FakeFeed {
  state: Arc<FeedState>,
}

impl FakeFeed {
  pub fn new() -> Self { Self::default() }

  pub fn offer(&self, source_id: &str, payload: &str, timestamp: DateTime<Utc>) {
    self.state.items.lock().unwrap().push(SourceItem {
      source_id: source_id.to_owned(),
      payload:   payload.to_owned(),
      timestamp,
    });
  }

  pub fn fail_next(&self, n: usize) {
    self.state.failures_left.store(n, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize { self.state.calls.load(Ordering::SeqCst) }
}

impl SourceFeed for FakeFeed {
  async fn list_new_sources(
    &self,
    _since: Option<DateTime<Utc>>,
  ) -> Result<Vec<SourceItem>, CollabError> {
    self.state.calls.fetch_add(1, Ordering::SeqCst);
    let failing = self
      .state
      .failures_left
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if failing {
      return Err(CollabError::Unavailable("share not mounted".into()));
    }
    Ok(self.state.items.lock().unwrap().clone())
  }
}

// ─── Fault-injecting store ───────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FlakyError {
  #[error("injected fault (transient: {transient})")]
  Injected { transient: bool },
  #[error(transparent)]
  Store(#[from] pulse_store_sqlite::Error),
}

impl StoreError for FlakyError {
  fn is_transient(&self) -> bool {
    match self {
      Self::Injected { transient } => *transient,
      Self::Store(e) => e.is_transient(),
    }
  }
}

/// Where a stalled commit hangs relative to the real write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
  /// Hang before the write, so a caller that gives up leaves nothing behind.
  BeforeWrite,
  /// Hang after the write has landed.
  AfterWrite,
}

/// Wraps a real store and fails or stalls the next N commits.
#[derive(Clone)]
pub struct FlakyStore {
  inner:           SqliteStore,
  commit_failures: Arc<AtomicUsize>,
  transient:       Arc<AtomicBool>,
  commit_stalls:   Arc<AtomicUsize>,
  stall:           Arc<Mutex<(Stall, Duration)>>,
  commit_calls:    Arc<AtomicUsize>,
}

impl FlakyStore {
  pub fn new(inner: SqliteStore) -> Self {
    Self {
      inner,
      commit_failures: Arc::default(),
      transient: Arc::new(AtomicBool::new(true)),
      commit_stalls: Arc::default(),
      stall: Arc::new(Mutex::new((Stall::BeforeWrite, Duration::ZERO))),
      commit_calls: Arc::default(),
    }
  }

  /// Hang the next `n` commits for `delay`, on the given side of the write.
  pub fn stall_commits(&self, n: usize, stall: Stall, delay: Duration) {
    *self.stall.lock().unwrap() = (stall, delay);
    self.commit_stalls.store(n, Ordering::SeqCst);
  }

  pub fn fail_commits(&self, n: usize, transient: bool) {
    self.commit_failures.store(n, Ordering::SeqCst);
    self.transient.store(transient, Ordering::SeqCst);
  }

  pub fn commit_calls(&self) -> usize { self.commit_calls.load(Ordering::SeqCst) }

  pub fn inner(&self) -> &SqliteStore { &self.inner }
}

impl LineageStore for FlakyStore {
  type Error = FlakyError;

  async fn record_discovered(
    &self,
    source_id: String,
    discovered_at: DateTime<Utc>,
    payload: String,
  ) -> Result<bool, FlakyError> {
    Ok(
      self
        .inner
        .record_discovered(source_id, discovered_at, payload)
        .await?,
    )
  }

  async fn mark_failed(
    &self,
    source_id: String,
    reason: String,
  ) -> Result<bool, FlakyError> {
    Ok(self.inner.mark_failed(source_id, reason).await?)
  }

  async fn get_raw_input(
    &self,
    source_id: String,
  ) -> Result<Option<RawInput>, FlakyError> {
    Ok(self.inner.get_raw_input(source_id).await?)
  }

  async fn latest_discovery(&self) -> Result<Option<DateTime<Utc>>, FlakyError> {
    Ok(self.inner.latest_discovery().await?)
  }

  async fn list_unprocessed(
    &self,
    tier: Tier,
    window: InputWindow,
  ) -> Result<Vec<PendingInput>, FlakyError> {
    Ok(self.inner.list_unprocessed(tier, window).await?)
  }

  async fn create_artifact_and_commit_inclusion(
    &self,
    artifact: NewArtifact,
  ) -> Result<CommitOutcome, FlakyError> {
    self.commit_calls.fetch_add(1, Ordering::SeqCst);
    let inject = self
      .commit_failures
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if inject {
      return Err(FlakyError::Injected {
        transient: self.transient.load(Ordering::SeqCst),
      });
    }

    let stalled = self
      .commit_stalls
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    let (stall, delay) = *self.stall.lock().unwrap();
    if stalled && stall == Stall::BeforeWrite {
      tokio::time::sleep(delay).await;
    }
    let outcome = self.inner.create_artifact_and_commit_inclusion(artifact).await?;
    if stalled && stall == Stall::AfterWrite {
      tokio::time::sleep(delay).await;
    }
    Ok(outcome)
  }

  async fn get_artifact(
    &self,
    period: PeriodKey,
  ) -> Result<Option<Artifact>, FlakyError> {
    Ok(self.inner.get_artifact(period).await?)
  }

  async fn list_artifacts(
    &self,
    tier: Option<Tier>,
  ) -> Result<Vec<Artifact>, FlakyError> {
    Ok(self.inner.list_artifacts(tier).await?)
  }

  async fn lineage(
    &self,
    artifact_id: Uuid,
  ) -> Result<Vec<InclusionEdge>, FlakyError> {
    Ok(self.inner.lineage(artifact_id).await?)
  }

  async fn parent_of(
    &self,
    child: ChildRef,
  ) -> Result<Option<InclusionEdge>, FlakyError> {
    Ok(self.inner.parent_of(child).await?)
  }

  async fn list_unpublished(&self) -> Result<Vec<Artifact>, FlakyError> {
    Ok(self.inner.list_unpublished().await?)
  }

  async fn mark_published(
    &self,
    artifact_id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<(), FlakyError> {
    Ok(self.inner.mark_published(artifact_id, at).await?)
  }
}
