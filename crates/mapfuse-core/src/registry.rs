//! Agent to graph ownership.
//!
//! Each agent starts with a private [`BeliefGraph`]. After a merge several
//! agents point at the same [`SharedGraph`]; two agents share a handle if
//! and only if they have been merged. Sessions read their handle at the
//! start of every turn, and only the strategist reassigns entries.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use mapfuse_graph::BeliefGraph;
use mapfuse_types::AgentId;

use crate::error::CoreError;

/// A belief graph that may be used by several agents.
pub type SharedGraph = Arc<RwLock<BeliefGraph>>;

/// Read-lock a shared graph.
///
/// # Errors
///
/// Returns [`CoreError::LockPoisoned`] if a writer panicked.
pub fn read_graph(graph: &SharedGraph) -> Result<RwLockReadGuard<'_, BeliefGraph>, CoreError> {
    graph
        .read()
        .map_err(|_poisoned| CoreError::LockPoisoned { what: "graph" })
}

/// Write-lock a shared graph.
///
/// # Errors
///
/// Returns [`CoreError::LockPoisoned`] if a writer panicked.
pub fn write_graph(graph: &SharedGraph) -> Result<RwLockWriteGuard<'_, BeliefGraph>, CoreError> {
    graph
        .write()
        .map_err(|_poisoned| CoreError::LockPoisoned { what: "graph" })
}

/// Cloneable handle to the registry.
#[derive(Debug, Clone, Default)]
pub struct GraphRegistry {
    graphs: Arc<RwLock<BTreeMap<AgentId, SharedGraph>>>,
}

impl GraphRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<RwLockReadGuard<'_, BTreeMap<AgentId, SharedGraph>>, CoreError> {
        self.graphs
            .read()
            .map_err(|_poisoned| CoreError::LockPoisoned { what: "registry" })
    }

    /// Give `agent` a fresh private graph of vision `radius` and return it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockPoisoned`] if the registry lock is poisoned.
    pub fn register(&self, agent: AgentId, radius: i32) -> Result<SharedGraph, CoreError> {
        let graph = Arc::new(RwLock::new(BeliefGraph::new(agent, radius)));
        self.assign(agent, Arc::clone(&graph))?;
        Ok(graph)
    }

    /// Point `agent` at `graph`.
    pub(crate) fn assign(&self, agent: AgentId, graph: SharedGraph) -> Result<(), CoreError> {
        self.graphs
            .write()
            .map_err(|_poisoned| CoreError::LockPoisoned { what: "registry" })?
            .insert(agent, graph);
        Ok(())
    }

    /// The graph `agent` currently uses.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownAgent`] if `agent` was never registered.
    pub fn graph(&self, agent: AgentId) -> Result<SharedGraph, CoreError> {
        self.entries()?
            .get(&agent)
            .cloned()
            .ok_or(CoreError::UnknownAgent(agent))
    }

    /// All registered agents in id order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockPoisoned`] if the registry lock is poisoned.
    pub fn agents(&self) -> Result<Vec<AgentId>, CoreError> {
        Ok(self.entries()?.keys().copied().collect())
    }

    /// Whether `a` and `b` use the identical graph.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownAgent`] if either agent is unknown.
    pub fn same_graph(&self, a: AgentId, b: AgentId) -> Result<bool, CoreError> {
        Ok(Arc::ptr_eq(&self.graph(a)?, &self.graph(b)?))
    }

    /// Each distinct graph once, keyed by the lowest agent using it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockPoisoned`] if the registry lock is poisoned.
    pub fn distinct_graphs(&self) -> Result<Vec<(AgentId, SharedGraph)>, CoreError> {
        let entries = self.entries()?;
        let mut out: Vec<(AgentId, SharedGraph)> = Vec::new();
        for (agent, graph) in entries.iter() {
            if !out.iter().any(|(_, g)| Arc::ptr_eq(g, graph)) {
                out.push((*agent, Arc::clone(graph)));
            }
        }
        Ok(out)
    }
}
