//! Property test: whatever order discoveries, runs and failures interleave in,
//! inclusion only ever grows and every row is included at most once.

mod common;

use std::collections::{HashMap, HashSet};

use common::*;
use proptest::prelude::*;
use pulse_core::{
  PeriodKey, Tier,
  lineage::ChildRef,
  store::LineageStore,
  tier::{InclusionStatus, InputStatus},
};
use pulse_store_sqlite::SqliteStore;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Op {
  Discover { day: u32, hour: u32, blank: bool },
  Daily(u32),
  Weekly(u32),
  Monthly,
  FailNextGeneration,
  Tick(Tier),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    4 => (17u32..=30, 0u32..24, prop::bool::weighted(0.1))
      .prop_map(|(day, hour, blank)| Op::Discover { day, hour, blank }),
    3 => (17u32..=30).prop_map(Op::Daily),
    2 => (47u32..=48).prop_map(Op::Weekly),
    1 => Just(Op::Monthly),
    1 => Just(Op::FailNextGeneration),
    1 => prop_oneof![
      Just(Tier::Daily),
      Just(Tier::Weekly),
      Just(Tier::Monthly)
    ]
    .prop_map(Op::Tick),
  ]
}

#[derive(Debug, Default)]
struct Snapshot {
  edges:     HashMap<ChildRef, (Uuid, Uuid)>,
  artifacts: HashMap<Uuid, InclusionStatus>,
  raws:      HashMap<String, InputStatus>,
  periods:   Vec<PeriodKey>,
}

async fn snapshot(store: &SqliteStore, raw_ids: &[String]) -> Snapshot {
  let mut snap = Snapshot::default();
  for artifact in store.list_artifacts(None).await.unwrap() {
    snap.periods.push(artifact.period);
    snap.artifacts.insert(artifact.artifact_id, artifact.status);
    for edge in store.lineage(artifact.artifact_id).await.unwrap() {
      let previous = snap
        .edges
        .insert(edge.child, (edge.edge_id, edge.parent_id));
      assert!(previous.is_none(), "child included twice");
    }
  }
  for id in raw_ids {
    let raw = store.get_raw_input(id.clone()).await.unwrap().unwrap();
    snap.raws.insert(id.clone(), raw.status);
  }
  snap
}

fn check(before: &Snapshot, after: &Snapshot) -> Result<(), TestCaseError> {
  for (child, edge) in &before.edges {
    prop_assert_eq!(after.edges.get(child), Some(edge), "edge changed");
  }
  for (id, status) in &before.artifacts {
    if *status == InclusionStatus::Included {
      prop_assert_eq!(after.artifacts.get(id), Some(status));
    }
  }
  for (id, status) in &before.raws {
    if *status != InputStatus::Discovered {
      prop_assert_eq!(after.raws.get(id), Some(status));
    }
  }

  let unique: HashSet<_> = after.periods.iter().collect();
  prop_assert_eq!(unique.len(), after.periods.len(), "duplicate period");

  for (id, status) in &after.artifacts {
    let has_parent = after.edges.contains_key(&ChildRef::Artifact(*id));
    prop_assert_eq!(*status == InclusionStatus::Included, has_parent);
  }
  for (id, status) in &after.raws {
    let has_parent = after.edges.contains_key(&ChildRef::Raw(id.clone()));
    prop_assert_eq!(*status == InputStatus::Processed, has_parent);
  }
  for (_, parent) in after.edges.values() {
    prop_assert!(after.artifacts.contains_key(parent));
  }
  Ok(())
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(24))]

  #[test]
  fn inclusion_is_monotonic(ops in prop::collection::vec(op(), 1..30)) {
    let rt = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .unwrap();

    rt.block_on(async move {
      let store = memory_store().await;
      let generator = FakeGenerator::new();
      let orch = orchestrator(store.clone(), &generator, &FakePublisher::new());
      let mut raw_ids = Vec::new();
      let mut before = Snapshot::default();

      for (n, op) in ops.into_iter().enumerate() {
        match op {
          Op::Discover { day, hour, blank } => {
            let id = format!("trades_11_{day:02}_2025_{n}.csv");
            let payload = if blank { String::new() } else { format!("AAPL,{n}") };
            store
              .record_discovered(id.clone(), et(2025, 11, day, hour, 0), payload)
              .await
              .unwrap();
            raw_ids.push(id);
          }
          Op::Daily(d) => {
            orch.run_period(PeriodKey::day(date(2025, 11, d))).await;
          }
          Op::Weekly(w) => {
            orch.run_period(PeriodKey::iso_week(2025, w).unwrap()).await;
          }
          Op::Monthly => {
            orch.run_period(PeriodKey::month(2025, 11).unwrap()).await;
          }
          Op::FailNextGeneration => {
            generator.then(Behaviour::Fail);
          }
          Op::Tick(tier) => {
            orch.tick(tier, et(2025, 11, 30, 20, 0)).await;
          }
        }

        let after = snapshot(&store, &raw_ids).await;
        check(&before, &after)?;
        before = after;
      }
      Ok::<_, TestCaseError>(())
    })?;
  }
}
