//! Shared type definitions for the mapfuse workspace.
//!
//! Every crate in the workspace speaks in these types. Loosely typed wire
//! data is validated into them exactly once, when a percept is parsed.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe wrappers for agent identifiers
//! - [`coord`] -- Grid coordinates and compass directions
//! - [`enums`] -- Terrain kinds, thing kinds, and action outcomes
//! - [`percept`] -- The per-turn percept and its `request-action` parser

pub mod coord;
pub mod enums;
pub mod ids;
pub mod percept;

// Re-export all public types at crate root for convenience.
pub use coord::{Coord, Direction, ParseDirectionError};
pub use enums::{ActionOutcome, TerrainKind, Thing, ThingKind};
pub use ids::AgentId;
pub use percept::{LastAction, Percept, PerceptError, SeenThing, Task, TaskRequirement};
