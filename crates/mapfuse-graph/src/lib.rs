//! Belief graphs for agents exploring an unknown toroidal grid.
//!
//! Each agent folds its percepts into a [`BeliefGraph`]: a coordinate-keyed
//! arena of [`Node`]s relative to the agent's own arbitrary root. The graph
//! grows lazily, becomes toroidal once its dimensions are inferred, and can
//! absorb another agent's graph when the two are merged.
//!
//! # Modules
//!
//! - [`node`] -- A single cell's terrain, occupant history, and links
//! - [`belief`] -- The graph itself: percept folding, queries, folding, absorption
//! - [`error`] -- Error types for graph operations

pub mod belief;
pub mod error;
pub mod node;

pub use belief::{AgentPose, BeliefGraph, GraphSnapshot, KnownThings, PerceptDelta, window_offsets};
pub use error::GraphError;
pub use node::{Node, Terrain};
