//! One agent's turn loop.
//!
//! Each turn an [`AgentSession`] folds the percept into its graph, checks
//! in with the coordinator, waits for the round, and then plans. Locks are
//! scoped so that no graph guard is ever held across an `.await`.
//!
//! Goals are given in the agent's original frame. A merge moves the agent
//! into another graph's frame; the session keeps the accumulated
//! translation and applies it to every goal.

use std::sync::Arc;

use mapfuse_graph::PerceptDelta;
use mapfuse_nav::{NavCommand, Navigator, PlannerSettings};
use mapfuse_types::{AgentId, Coord, Percept};
use tracing::{debug, info};

use crate::coordinator::CoordinatorHandle;
use crate::error::CoreError;
use crate::registry::{GraphRegistry, SharedGraph, read_graph, write_graph};

/// What happened during one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Step of the percept.
    pub step: u64,
    /// What the percept changed in the graph.
    pub delta: PerceptDelta,
    /// Whether the coordinator finished the round before the timeout.
    pub round_completed: bool,
    /// Whether the agent now uses a different graph.
    pub rebased: bool,
    /// Agent location in its current graph after the round.
    pub location: Coord,
    /// Navigation decision, if a goal was given.
    pub command: Option<NavCommand>,
}

/// Per-agent driver.
#[derive(Debug)]
pub struct AgentSession {
    agent: AgentId,
    registry: GraphRegistry,
    coordinator: CoordinatorHandle,
    navigator: Navigator,
    graph: SharedGraph,
    frame: Coord,
}

impl AgentSession {
    /// Create the session for a registered agent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownAgent`] if `agent` is not registered.
    pub fn new(
        agent: AgentId,
        registry: GraphRegistry,
        coordinator: CoordinatorHandle,
        settings: PlannerSettings,
    ) -> Result<Self, CoreError> {
        let graph = registry.graph(agent)?;
        Ok(Self {
            agent,
            registry,
            coordinator,
            navigator: Navigator::new(agent, settings),
            graph,
            frame: Coord::ORIGIN,
        })
    }

    /// The agent this session drives.
    pub const fn agent(&self) -> AgentId {
        self.agent
    }

    /// The graph the session currently uses.
    pub const fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// Translation from the agent's original frame to the current graph's.
    pub const fn frame(&self) -> Coord {
        self.frame
    }

    /// The navigator.
    pub const fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// Play one turn.
    ///
    /// `goal`, in the agent's original frame, is navigated toward after the
    /// round; `None` cancels navigation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Nav`] when planning fails fatally, and other
    /// [`CoreError`] variants when the graph or coordinator is unusable.
    pub async fn turn(
        &mut self,
        percept: &Percept,
        goal: Option<Coord>,
    ) -> Result<TurnOutcome, CoreError> {
        // A straggler may have been merged while it was not looking.
        let stale = self.rebase()?;

        let delta = write_graph(&self.graph)?.update(self.agent, percept)?;
        self.coordinator.check_in(self.agent, percept.step).await?;
        let round_completed = self.coordinator.wait_for_round(percept.step).await?;
        if !round_completed {
            debug!(agent = %self.agent, step = percept.step, "round not completed in time");
        }
        let rebased = self.rebase()? || stale;

        let moved = percept.moved_direction().is_some() && !rebased;
        let graph = read_graph(&self.graph)?;
        let location = graph
            .location(self.agent)
            .ok_or(CoreError::UnknownAgent(self.agent))?;
        let command = match goal {
            Some(goal) => Some(
                self.navigator
                    .nav_to(&graph, goal + self.frame, &delta, moved)?,
            ),
            None => {
                self.navigator.quit_nav();
                None
            }
        };

        Ok(TurnOutcome {
            step: percept.step,
            delta,
            round_completed,
            rebased,
            location,
            command,
        })
    }

    /// Adopt the registry's graph if it changed. The frame shift is read
    /// off the agent's location in the old and the new graph.
    fn rebase(&mut self) -> Result<bool, CoreError> {
        let current = self.registry.graph(self.agent)?;
        if Arc::ptr_eq(&current, &self.graph) {
            return Ok(false);
        }
        let before = read_graph(&self.graph)?
            .location(self.agent)
            .ok_or(CoreError::UnknownAgent(self.agent))?;
        let after = read_graph(&current)?
            .location(self.agent)
            .ok_or(CoreError::UnknownAgent(self.agent))?;
        let shift = after - before;
        self.frame = self.frame + shift;
        self.graph = current;
        self.navigator.quit_nav();
        info!(agent = %self.agent, %shift, frame = %self.frame, "session moved to merged graph");
        Ok(true)
    }
}
