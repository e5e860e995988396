//! Error types for the `mapfuse-nav` crate.
//!
//! "No path" is not an error: the planner reports it as `None` and the
//! navigator as [`NavCommand::NoPath`](crate::navigator::NavCommand::NoPath).

use mapfuse_types::{AgentId, Coord};

/// Errors that abort a planning attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavError {
    /// The search kept popping the same few nodes. The graph or cost model
    /// is inconsistent; the planner must be discarded, not retried.
    #[error("stuck in replanning loop at {node} (last {window} pops)")]
    StuckInReplanLoop {
        /// The node popped last.
        node: Coord,
        /// Size of the inspected pop window.
        window: usize,
    },

    /// The agent has no pose in the graph being planned over.
    #[error("agent {0} is not registered in the graph")]
    UnknownAgent(AgentId),
}
