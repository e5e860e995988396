//! Goal-driven wrapper around the planner.
//!
//! A [`Navigator`] owns at most one [`DStarLite`] instance. Asking for a
//! different goal discards it outright; nothing is reused across goals.
//! Each turn the navigator repairs the plan with the latest percept delta
//! and turns the recommended cell into a concrete [`NavCommand`].

use mapfuse_graph::{BeliefGraph, PerceptDelta};
use mapfuse_types::{AgentId, Coord, Direction};
use tracing::debug;

use crate::cost::PlannerSettings;
use crate::dstar::DStarLite;
use crate::error::NavError;

/// What the agent should do this turn to approach its goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    /// Step in a direction.
    Move(Direction),
    /// Clear the obstacle at this offset relative to the agent.
    Clear(Coord),
    /// Already standing on the goal.
    Arrived,
    /// The goal cannot be reached with what is currently known.
    NoPath,
}

/// Per-agent navigation state.
#[derive(Debug, Clone)]
pub struct Navigator {
    agent: AgentId,
    settings: PlannerSettings,
    planner: Option<DStarLite>,
}

impl Navigator {
    /// A navigator with no active goal.
    pub const fn new(agent: AgentId, settings: PlannerSettings) -> Self {
        Self {
            agent,
            settings,
            planner: None,
        }
    }

    /// Goal of the active planner, if any.
    pub fn goal(&self) -> Option<Coord> {
        self.planner.as_ref().map(DStarLite::goal)
    }

    /// The active planner, if any.
    pub const fn planner(&self) -> Option<&DStarLite> {
        self.planner.as_ref()
    }

    /// Drop the active planner.
    pub fn quit_nav(&mut self) {
        if self.planner.take().is_some() {
            debug!(agent = %self.agent, "navigation cancelled");
        }
    }

    /// Decide the next command toward `goal`.
    ///
    /// `delta` is what the agent's latest percept changed in `graph` and
    /// `moved` whether the agent changed cell on that turn. A fatal planner
    /// error discards the planner before it is returned.
    ///
    /// # Errors
    ///
    /// Returns [`NavError`] if the agent is not in `graph` or the planner
    /// trips its loop guard.
    pub fn nav_to(
        &mut self,
        graph: &BeliefGraph,
        goal: Coord,
        delta: &PerceptDelta,
        moved: bool,
    ) -> Result<NavCommand, NavError> {
        let here = graph
            .location(self.agent)
            .ok_or(NavError::UnknownAgent(self.agent))?;
        let goal = graph.modulate(goal);
        if here == goal {
            self.quit_nav();
            return Ok(NavCommand::Arrived);
        }

        let planner = match self.planner.take() {
            Some(mut planner) if planner.goal() == goal => {
                planner.update(graph, delta, moved)?;
                planner
            }
            previous => {
                if previous.is_some() {
                    debug!(agent = %self.agent, goal = %goal, "goal changed, discarding planner");
                }
                DStarLite::new(graph, self.agent, goal, self.settings.clone())?
            }
        };
        let planner = self.planner.insert(planner);

        let Some(step) = planner.move_to_goal(graph) else {
            return Ok(NavCommand::NoPath);
        };
        let Some(direction) = graph.get_direction(self.agent, step.next) else {
            planner.hold();
            return Ok(NavCommand::NoPath);
        };
        if graph.node(step.next).is_some_and(|n| n.is_obstacle()) {
            planner.hold();
            return Ok(NavCommand::Clear(direction.delta()));
        }
        Ok(NavCommand::Move(direction))
    }
}
