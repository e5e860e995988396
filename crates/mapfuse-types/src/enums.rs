//! Enumeration types for cell contents and action results.
//!
//! These replace the loosely typed strings of the wire format. Parsing from
//! the wire happens once, in [`crate::percept`]; everything past that
//! boundary works with these tags.

use core::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Terrain
// ---------------------------------------------------------------------------

/// What the ground of a cell is made of.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TerrainKind {
    /// Free ground (the server omits these cells from percepts).
    #[default]
    Empty,
    /// A wall that can be cleared at an energy cost.
    Obstacle,
    /// A goal zone where tasks are submitted.
    Goal,
}

impl TerrainKind {
    /// Parse the wire key used in the percept's terrain map.
    pub fn from_wire(key: &str) -> Option<Self> {
        match key {
            "empty" => Some(Self::Empty),
            "obstacle" => Some(Self::Obstacle),
            "goal" => Some(Self::Goal),
            _ => None,
        }
    }
}

impl fmt::Display for TerrainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::Obstacle => "obstacle",
            Self::Goal => "goal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Things
// ---------------------------------------------------------------------------

/// The kind of a thing standing on a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThingKind {
    /// An agent of either team. The detail is the team name.
    Entity,
    /// A block. The detail is the block type.
    Block,
    /// A block dispenser. The detail is the block type it hands out.
    Dispenser,
    /// A transient marker (clear events and similar).
    Marker,
    /// A task board where tasks are accepted.
    Taskboard,
}

impl ThingKind {
    /// Parse the wire `type` field of a thing.
    pub fn from_wire(key: &str) -> Option<Self> {
        match key {
            "entity" => Some(Self::Entity),
            "block" => Some(Self::Block),
            "dispenser" => Some(Self::Dispenser),
            "marker" => Some(Self::Marker),
            "taskboard" => Some(Self::Taskboard),
            _ => None,
        }
    }

    /// Whether a thing of this kind occupies its cell so nothing can enter.
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Entity | Self::Block)
    }
}

impl fmt::Display for ThingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Entity => "entity",
            Self::Block => "block",
            Self::Dispenser => "dispenser",
            Self::Marker => "marker",
            Self::Taskboard => "taskboard",
        };
        f.write_str(s)
    }
}

/// A thing as recorded on a node: its kind plus the free-form detail.
///
/// Ordering is derived so occupant lists can be compared as sorted
/// signatures.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Thing {
    /// What the thing is.
    pub kind: ThingKind,
    /// Team name, block type, or similar qualifier.
    pub detail: String,
}

impl Thing {
    /// Create a thing.
    pub fn new(kind: ThingKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Thing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.detail)
    }
}

// ---------------------------------------------------------------------------
// Action results
// ---------------------------------------------------------------------------

/// The server's verdict on the previous action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActionOutcome {
    /// No action was taken yet (first step of a run).
    #[default]
    None,
    /// The action succeeded.
    Success,
    /// The action failed deterministically.
    Failed,
    /// The action failed by the server's random failure roll.
    FailedRandom,
    /// Any other failure code (`failed_path`, `failed_parameter`, ...).
    Other(String),
}

impl ActionOutcome {
    /// Map the wire `lastActionResult` string.
    pub fn from_wire(result: &str) -> Self {
        match result {
            "" => Self::None,
            "success" => Self::Success,
            "failed" => Self::Failed,
            "failed_random" => Self::FailedRandom,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Whether the action took effect.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
