//! Recorded scenarios.
//!
//! A scenario is a JSON document listing the agents of one team, each with
//! an optional goal (in that agent's own frame) and the `request-action`
//! messages the server sent it, in order:
//!
//! ```json
//! { "agents": [ { "id": 1, "goal": [3, -2], "messages": [ ... ] } ] }
//! ```
//!
//! Messages are kept as raw JSON here and parsed into percepts one by one
//! while the agent plays, so a malformed message only ends that agent's
//! script.

use std::collections::BTreeSet;
use std::path::Path;

use mapfuse_types::{AgentId, Coord};
use serde::Deserialize;

use crate::error::EngineError;

/// A recorded run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scenario {
    /// The scripted agents.
    pub agents: Vec<ScriptedAgent>,
}

/// One agent's script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptedAgent {
    /// Server index of the agent.
    pub id: AgentId,
    /// Where the agent should go, relative to its starting cell.
    #[serde(default)]
    pub goal: Option<Coord>,
    /// The `request-action` messages, oldest first.
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
}

impl Scenario {
    /// Load a scenario from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path).map_err(|e| EngineError::Scenario {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::parse(&contents)
    }

    /// Parse a scenario from a JSON string. Agent ids must be unique.
    pub fn parse(json: &str) -> Result<Self, EngineError> {
        let scenario: Self = serde_json::from_str(json).map_err(|e| EngineError::Scenario {
            message: format!("invalid scenario JSON: {e}"),
        })?;
        let mut seen = BTreeSet::new();
        for agent in &scenario.agents {
            if !seen.insert(agent.id) {
                return Err(EngineError::Scenario {
                    message: format!("agent {} appears more than once", agent.id),
                });
            }
        }
        Ok(scenario)
    }

    /// Longest script length.
    pub fn steps(&self) -> usize {
        self.agents
            .iter()
            .map(|a| a.messages.len())
            .max()
            .unwrap_or(0)
    }
}
