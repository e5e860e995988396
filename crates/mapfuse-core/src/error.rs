//! Error type for the coordination layer.
//!
//! [`CoreError`] wraps the graph and planner errors that bubble up through
//! a turn or a strategist round, plus the failures that only exist once
//! graphs are shared between tasks.

use mapfuse_graph::GraphError;
use mapfuse_nav::NavError;
use mapfuse_types::AgentId;

use crate::config::ConfigError;

/// Errors raised by the registry, the strategist, and agent sessions.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A belief graph operation failed.
    #[error("graph error: {source}")]
    Graph {
        /// The underlying graph error.
        #[from]
        source: GraphError,
    },

    /// Planning failed fatally.
    #[error("navigation error: {source}")]
    Nav {
        /// The underlying planner error.
        #[from]
        source: NavError,
    },

    /// Configuration could not be loaded.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The agent has no graph in the registry.
    #[error("agent {0} is not registered")]
    UnknownAgent(AgentId),

    /// Another task panicked while holding a lock.
    #[error("lock poisoned: {what}")]
    LockPoisoned {
        /// Which lock.
        what: &'static str,
    },

    /// The coordinator has shut down.
    #[error("coordinator channel closed")]
    ChannelClosed,
}
