//! The Trade Pulse engine: resolves which inputs feed a period, generates the
//! period's artifact through a collaborator, and commits it together with
//! its inclusion edges.
//!
//! Everything here is generic over [`pulse_core::store::LineageStore`] and the
//! collaborator traits in [`pulse_core::collab`].

pub mod committer;
pub mod config;
pub mod discovery;
pub mod error;
pub mod orchestrator;
pub mod resolver;
pub mod retry;
pub mod state;

pub use committer::InclusionCommitter;
pub use config::EngineConfig;
pub use discovery::{DiscoveryReport, discover};
pub use error::RunError;
pub use orchestrator::{PublishReport, RunOutcome, RunReport, TierOrchestrator};
pub use resolver::IngestionResolver;
pub use retry::RetryPolicy;
pub use state::{RunMachine, RunState};
