//! Coordination layer for mapfuse: who uses which graph, and when graphs
//! are fused.
//!
//! Agents fold their own percepts concurrently. Everything that touches
//! more than one graph (identification, merging, dimension inference) runs
//! on a single coordinator task, one round per step.
//!
//! # Modules
//!
//! - [`barrier`] -- Per-step check-in barrier for the participating agents.
//! - [`config`] -- Configuration loading from `mapfuse-config.yaml` into
//!   strongly-typed structs.
//! - [`coordinator`] -- The coordinator actor and the handle sessions use.
//! - [`error`] -- [`CoreError`].
//! - [`registry`] -- Agent to shared graph mapping.
//! - [`session`] -- One agent's turn: fold, check in, wait, plan.
//! - [`strategist`] -- Identify, eliminate, merge, and infer dimensions.

pub mod barrier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod session;
pub mod strategist;

pub use barrier::CheckInBarrier;
pub use config::{ConfigError, FusionConfig};
pub use coordinator::{Coordinator, CoordinatorEvent, CoordinatorHandle, CoordinatorSummary};
pub use error::CoreError;
pub use registry::{GraphRegistry, SharedGraph};
pub use session::{AgentSession, TurnOutcome};
pub use strategist::{Dimensions, DimensionVerdict, MergeOutcome, RoundReport, Strategist};
