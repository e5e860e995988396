//! Per-agent replay task.
//!
//! Each scripted agent runs in its own task: it parses its next recorded
//! message, plays the turn through its [`AgentSession`], and logs the
//! resulting command. A fatal planning error costs the agent that turn
//! only. A malformed message or a broken coordinator ends the script.

use mapfuse_core::{AgentSession, CoreError};
use mapfuse_nav::NavCommand;
use mapfuse_types::{AgentId, Coord, Percept};
use tracing::{info, warn};

use crate::scenario::ScriptedAgent;

/// What one agent did over its script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReport {
    /// The agent.
    pub agent: AgentId,
    /// Turns played.
    pub turns: u64,
    /// Move commands issued.
    pub moves: u64,
    /// Clear commands issued.
    pub clears: u64,
    /// Turns without a path to the goal.
    pub no_path: u64,
    /// Turns lost to fatal planning errors.
    pub planning_failures: u64,
    /// Whether the agent stood on its goal on its last turn.
    pub arrived: bool,
    /// How often the agent moved into a merged graph.
    pub rebases: u64,
    /// Location in its final graph.
    pub location: Option<Coord>,
    /// Why the script ended early, if it did.
    pub aborted: Option<String>,
}

/// Play `script` through `session`.
pub async fn play(mut session: AgentSession, script: ScriptedAgent) -> AgentReport {
    let agent = session.agent();
    let mut report = AgentReport {
        agent,
        turns: 0,
        moves: 0,
        clears: 0,
        no_path: 0,
        planning_failures: 0,
        arrived: false,
        rebases: 0,
        location: None,
        aborted: None,
    };

    for (index, message) in script.messages.into_iter().enumerate() {
        let percept = match Percept::from_value(message) {
            Ok(percept) => percept,
            Err(e) => {
                warn!(%agent, index, error = %e, "malformed message, ending script");
                report.aborted = Some(e.to_string());
                break;
            }
        };

        match session.turn(&percept, script.goal).await {
            Ok(outcome) => {
                report.turns = report.turns.saturating_add(1);
                report.location = Some(outcome.location);
                report.arrived = outcome.command == Some(NavCommand::Arrived);
                if outcome.rebased {
                    report.rebases = report.rebases.saturating_add(1);
                }
                match outcome.command {
                    Some(NavCommand::Move(_)) => report.moves = report.moves.saturating_add(1),
                    Some(NavCommand::Clear(_)) => report.clears = report.clears.saturating_add(1),
                    Some(NavCommand::NoPath) => report.no_path = report.no_path.saturating_add(1),
                    Some(NavCommand::Arrived) | None => {}
                }
                info!(
                    %agent,
                    step = outcome.step,
                    location = %outcome.location,
                    command = ?outcome.command,
                    new_obstacles = outcome.delta.new_obstacles.len(),
                    new_clearings = outcome.delta.new_clearings.len(),
                    rebased = outcome.rebased,
                    "turn played"
                );
            }
            Err(CoreError::Nav { source }) => {
                report.turns = report.turns.saturating_add(1);
                report.planning_failures = report.planning_failures.saturating_add(1);
                warn!(%agent, step = percept.step, error = %source, "planning failed, skipping turn");
            }
            Err(e) => {
                warn!(%agent, step = percept.step, error = %e, "turn failed, ending script");
                report.aborted = Some(e.to_string());
                break;
            }
        }
    }
    report
}
