//! Percept payload delivered to an agent each turn.
//!
//! The percept is the **only** information an agent receives about the
//! world. The server wraps it in a `request-action` message; this module
//! parses that envelope once, validates every loosely typed field into the
//! enumerations of [`crate::enums`], and hands the rest of the workspace a
//! typed [`Percept`].
//!
//! A percept that fails validation is a protocol error. Callers treat
//! [`PerceptError`] as fatal for the offending message; nothing downstream
//! re-checks the fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::coord::{Coord, Direction};
use crate::enums::{ActionOutcome, TerrainKind, Thing, ThingKind};

/// Errors raised while parsing a `request-action` message.
#[derive(Debug, thiserror::Error)]
pub enum PerceptError {
    /// The message is not valid JSON or lacks a required key.
    #[error("malformed percept JSON: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The envelope is some other message type.
    #[error("expected a request-action message, got {0:?}")]
    UnexpectedMessage(String),

    /// A terrain key is not one of `empty`, `obstacle`, `goal`.
    #[error("unknown terrain kind: {0:?}")]
    UnknownTerrain(String),

    /// A thing `type` is not one of the known kinds.
    #[error("unknown thing kind: {0:?}")]
    UnknownThing(String),

    /// A successful move carried no direction parameter.
    #[error("successful move without a direction parameter")]
    MissingMoveDirection,

    /// A move parameter is not a compass letter.
    #[error("invalid move direction: {0:?}")]
    InvalidMoveDirection(String),
}

// ---------------------------------------------------------------------------
// Typed percept
// ---------------------------------------------------------------------------

/// The previous action as reported back by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LastAction {
    /// Action name (`move`, `clear`, `skip`, ... or empty on the first step).
    pub name: String,
    /// Stringified action parameters.
    pub params: Vec<String>,
    /// Whether it worked.
    pub outcome: ActionOutcome,
}

/// A thing seen at an offset relative to the perceiving agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenThing {
    /// Offset from the agent.
    pub offset: Coord,
    /// The thing itself.
    pub thing: Thing,
}

/// One block an active task requires, at an offset from the submitting agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequirement {
    /// Where the block must sit relative to the agent.
    pub offset: Coord,
    /// Required block type.
    pub block: String,
}

/// An active task announced by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task name used by `accept` and `submit`.
    pub name: String,
    /// Last step on which the task can be submitted.
    pub deadline: u64,
    /// Score awarded on submission.
    pub reward: u32,
    /// Required block pattern.
    pub requirements: Vec<TaskRequirement>,
}

/// Everything one agent perceives on one turn, with offsets relative to
/// the agent's own cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Percept {
    /// Simulation step this percept belongs to.
    pub step: u64,
    /// Request identifier that must be echoed with the reply.
    pub request_id: u64,
    /// Reply deadline (server epoch milliseconds).
    pub deadline: u64,
    /// Report on the previous action.
    pub last_action: LastAction,
    /// Non-empty terrain cells by kind.
    pub terrain: BTreeMap<TerrainKind, Vec<Coord>>,
    /// Things in view.
    pub things: Vec<SeenThing>,
    /// Offsets of blocks attached to this agent.
    pub attached: Vec<Coord>,
    /// Current energy.
    pub energy: u32,
    /// Whether the agent is disabled this step.
    pub disabled: bool,
    /// Team score.
    pub score: u64,
    /// Active tasks.
    pub tasks: Vec<Task>,
}

impl Percept {
    /// An empty percept for `step` with full energy and no previous action.
    ///
    /// Mostly useful for building synthetic percepts in tests and replays.
    pub fn new(step: u64) -> Self {
        Self {
            step,
            request_id: step,
            deadline: 0,
            last_action: LastAction::default(),
            terrain: BTreeMap::new(),
            things: Vec::new(),
            attached: Vec::new(),
            energy: 300,
            disabled: false,
            score: 0,
            tasks: Vec::new(),
        }
    }

    /// Record that the previous action was a move in `direction`.
    pub fn with_move(mut self, direction: Direction, outcome: ActionOutcome) -> Self {
        self.last_action = LastAction {
            name: "move".to_owned(),
            params: vec![direction.as_str().to_owned()],
            outcome,
        };
        self
    }

    /// Add terrain cells of `kind` at the given offsets.
    pub fn with_terrain(mut self, kind: TerrainKind, offsets: &[(i32, i32)]) -> Self {
        self.terrain
            .entry(kind)
            .or_default()
            .extend(offsets.iter().copied().map(Coord::from));
        self
    }

    /// Add a thing at an offset.
    pub fn with_thing(mut self, offset: (i32, i32), kind: ThingKind, detail: &str) -> Self {
        self.things.push(SeenThing {
            offset: Coord::from(offset),
            thing: Thing::new(kind, detail),
        });
        self
    }

    /// Set the attached block offsets.
    pub fn with_attached(mut self, offsets: &[(i32, i32)]) -> Self {
        self.attached = offsets.iter().copied().map(Coord::from).collect();
        self
    }

    /// Set the energy value.
    pub const fn with_energy(mut self, energy: u32) -> Self {
        self.energy = energy;
        self
    }

    /// Direction of the previous action if it was a successful move.
    pub fn moved_direction(&self) -> Option<Direction> {
        if self.last_action.name != "move" || !self.last_action.outcome.is_success() {
            return None;
        }
        self.last_action
            .params
            .first()
            .and_then(|p| p.parse::<Direction>().ok())
    }

    /// Parse a full `request-action` message.
    ///
    /// # Errors
    ///
    /// Returns [`PerceptError`] if the JSON is malformed, is a different
    /// message type, or contains an unknown terrain/thing kind.
    pub fn from_request_action(json: &str) -> Result<Self, PerceptError> {
        let raw: RawMessage = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Parse a `request-action` message that is already a JSON value.
    ///
    /// # Errors
    ///
    /// Same as [`Percept::from_request_action`].
    pub fn from_value(value: serde_json::Value) -> Result<Self, PerceptError> {
        let raw: RawMessage = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawMessage) -> Result<Self, PerceptError> {
        if raw.kind != "request-action" {
            return Err(PerceptError::UnexpectedMessage(raw.kind));
        }
        let content = raw.content;
        let p = content.percept;

        let mut terrain: BTreeMap<TerrainKind, Vec<Coord>> = BTreeMap::new();
        for (key, offsets) in p.terrain {
            let kind =
                TerrainKind::from_wire(&key).ok_or_else(|| PerceptError::UnknownTerrain(key))?;
            terrain.entry(kind).or_default().extend(offsets);
        }

        let mut things = Vec::with_capacity(p.things.len());
        for t in p.things {
            let kind =
                ThingKind::from_wire(&t.kind).ok_or_else(|| PerceptError::UnknownThing(t.kind))?;
            things.push(SeenThing {
                offset: Coord::new(t.x, t.y),
                thing: Thing::new(kind, t.details),
            });
        }

        let params: Vec<String> = p.last_action_params.iter().map(param_to_string).collect();
        let outcome = ActionOutcome::from_wire(&p.last_action_result);
        if p.last_action == "move" && outcome.is_success() {
            let first = params.first().ok_or(PerceptError::MissingMoveDirection)?;
            first
                .parse::<Direction>()
                .map_err(|e| PerceptError::InvalidMoveDirection(e.0))?;
        }

        let tasks = p
            .tasks
            .into_iter()
            .map(|t| Task {
                name: t.name,
                deadline: t.deadline,
                reward: t.reward,
                requirements: t
                    .requirements
                    .into_iter()
                    .map(|r| TaskRequirement {
                        offset: Coord::new(r.x, r.y),
                        block: r.details,
                    })
                    .collect(),
            })
            .collect();

        Ok(Self {
            step: content.step,
            request_id: content.id,
            deadline: content.deadline,
            last_action: LastAction {
                name: p.last_action,
                params,
                outcome,
            },
            terrain,
            things,
            attached: p.attached,
            energy: p.energy,
            disabled: p.disabled,
            score: p.score,
            tasks,
        })
    }
}

fn param_to_string(value: &serde_json::Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), ToOwned::to_owned)
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    content: RawContent,
}

#[derive(Deserialize)]
struct RawContent {
    step: u64,
    id: u64,
    #[serde(default)]
    deadline: u64,
    percept: RawPercept,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPercept {
    last_action: String,
    last_action_params: Vec<serde_json::Value>,
    last_action_result: String,
    terrain: BTreeMap<String, Vec<Coord>>,
    things: Vec<RawThing>,
    attached: Vec<Coord>,
    energy: u32,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    score: u64,
    #[serde(default)]
    tasks: Vec<RawTask>,
}

#[derive(Deserialize)]
struct RawThing {
    x: i32,
    y: i32,
    #[serde(rename = "type")]
    kind: String,
    details: String,
}

#[derive(Deserialize)]
struct RawTask {
    name: String,
    #[serde(default)]
    deadline: u64,
    #[serde(default)]
    reward: u32,
    #[serde(default)]
    requirements: Vec<RawRequirement>,
}

#[derive(Deserialize)]
struct RawRequirement {
    x: i32,
    y: i32,
    details: String,
}
