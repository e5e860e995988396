//! Error types for the `mapfuse-graph` crate.
//!
//! All fallible operations in this crate return [`GraphError`] through the
//! standard [`Result`] type alias.

use mapfuse_types::AgentId;

/// Errors that can occur during belief-graph operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The agent has no pose in this graph.
    #[error("agent {0} is not registered in this graph")]
    UnknownAgent(AgentId),

    /// A map dimension must be strictly positive.
    #[error("invalid {axis} dimension: {value}")]
    InvalidDimension {
        /// Which axis (`width` or `height`).
        axis: &'static str,
        /// The rejected value.
        value: i32,
    },

    /// Absorbing a graph would register the same agent twice.
    #[error("agent {0} is already registered in the absorbing graph")]
    DuplicateAgent(AgentId),
}
