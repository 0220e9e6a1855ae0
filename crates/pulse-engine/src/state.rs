//! Per-run state machine with a legal-transition table.
//!
//! Every run starts at `Idle` and ends at `Done` or `Failed`. The orchestrator
//! calls [`RunMachine::advance`] between steps; each accepted transition is
//! recorded so the run report carries the full path.

use std::{fmt, time::Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
  Idle,
  Resolving,
  Generating,
  Committing,
  Done,
  Failed,
}

impl RunState {
  pub fn is_terminal(self) -> bool { matches!(self, Self::Done | Self::Failed) }
}

impl fmt::Display for RunState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Idle => "IDLE",
      Self::Resolving => "RESOLVING",
      Self::Generating => "GENERATING",
      Self::Committing => "COMMITTING",
      Self::Done => "DONE",
      Self::Failed => "FAILED",
    };
    f.write_str(name)
  }
}

/// ```text
/// Idle       → Resolving
/// Resolving  → Generating | Done | Failed
/// Generating → Committing | Failed
/// Committing → Done | Failed
/// ```
fn is_legal_transition(from: RunState, to: RunState) -> bool {
  use RunState::*;

  matches!(
    (from, to),
    (Idle, Resolving)
      | (Resolving, Generating)
      | (Resolving, Done)
      | (Resolving, Failed)
      | (Generating, Committing)
      | (Generating, Failed)
      | (Committing, Done)
      | (Committing, Failed)
  )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRecord {
  pub from:       RunState,
  pub to:         RunState,
  /// Milliseconds since the run started.
  pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
  pub from: RunState,
  pub to:   RunState,
}

impl fmt::Display for IllegalTransition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "illegal run state transition: {} -> {}", self.from, self.to)
  }
}

impl std::error::Error for IllegalTransition {}

#[derive(Debug)]
pub struct RunMachine {
  current:     RunState,
  started_at:  Instant,
  transitions: Vec<TransitionRecord>,
}

impl Default for RunMachine {
  fn default() -> Self { Self::new() }
}

impl RunMachine {
  pub fn new() -> Self {
    Self {
      current:     RunState::Idle,
      started_at:  Instant::now(),
      transitions: Vec::new(),
    }
  }

  pub fn current(&self) -> RunState { self.current }

  pub fn transitions(&self) -> &[TransitionRecord] { &self.transitions }

  pub fn into_transitions(self) -> Vec<TransitionRecord> { self.transitions }

  pub fn advance(&mut self, to: RunState) -> Result<(), IllegalTransition> {
    let from = self.current;
    if !is_legal_transition(from, to) {
      return Err(IllegalTransition { from, to });
    }

    let elapsed_ms =
      u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::debug!(%from, %to, elapsed_ms, "run state transition");
    self.transitions.push(TransitionRecord {
      from,
      to,
      elapsed_ms,
    });
    self.current = to;
    Ok(())
  }

  /// The sequence of states visited, starting with `Idle`.
  pub fn path(&self) -> Vec<RunState> {
    std::iter::once(RunState::Idle)
      .chain(self.transitions.iter().map(|t| t.to))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::{RunState::*, *};

  #[test]
  fn happy_path() {
    let mut machine = RunMachine::new();
    for state in [Resolving, Generating, Committing, Done] {
      machine.advance(state).unwrap();
    }
    assert_eq!(machine.current(), Done);
    assert_eq!(machine.path(), vec![
      Idle, Resolving, Generating, Committing, Done
    ]);
  }

  #[test]
  fn empty_period_goes_straight_to_done() {
    let mut machine = RunMachine::new();
    machine.advance(Resolving).unwrap();
    machine.advance(Done).unwrap();
    assert!(machine.current().is_terminal());
  }

  #[test]
  fn terminal_states_are_final() {
    let mut machine = RunMachine::new();
    machine.advance(Resolving).unwrap();
    machine.advance(Failed).unwrap();
    let err = machine.advance(Resolving).unwrap_err();
    assert_eq!(err, IllegalTransition {
      from: Failed,
      to:   Resolving,
    });
    assert_eq!(machine.transitions().len(), 2);
  }

  #[test]
  fn cannot_skip_generation() {
    let mut machine = RunMachine::new();
    machine.advance(Resolving).unwrap();
    assert!(machine.advance(Committing).is_err());
    assert!(RunMachine::new().advance(Generating).is_err());
  }
}
