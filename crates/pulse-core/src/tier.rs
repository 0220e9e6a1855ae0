//! Processing tiers and the status enumerations attached to their rows.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// One rollup level. Each tier consumes the output of the tier below it; the
/// daily tier consumes raw inputs.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tier {
  Daily,
  Weekly,
  Monthly,
}

impl Tier {
  pub const ALL: [Tier; 3] = [Tier::Daily, Tier::Weekly, Tier::Monthly];

  /// The tier whose artifacts feed this one. `None` for the daily tier, which
  /// is fed by raw inputs.
  pub fn child(self) -> Option<Tier> {
    match self {
      Tier::Daily => None,
      Tier::Weekly => Some(Tier::Daily),
      Tier::Monthly => Some(Tier::Weekly),
    }
  }

  /// The tier that consumes this one's artifacts.
  pub fn parent(self) -> Option<Tier> {
    match self {
      Tier::Daily => Some(Tier::Weekly),
      Tier::Weekly => Some(Tier::Monthly),
      Tier::Monthly => None,
    }
  }

  /// Monthly artifacts are never included anywhere.
  pub fn is_terminal(self) -> bool { self.parent().is_none() }
}

/// Lifecycle of a [`RawInput`](crate::lineage::RawInput).
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InputStatus {
  Discovered,
  Processed,
  Failed,
}

/// Lifecycle of an [`Artifact`](crate::lineage::Artifact) with respect to the
/// tier above it.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InclusionStatus {
  Available,
  Included,
}
