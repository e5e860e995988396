//! Incremental path planning over belief graphs.
//!
//! The planner is D*-Lite: it keeps its search tree between turns and only
//! repairs the parts a percept invalidated. The transition cost model lets
//! a well-fed agent clear through obstacles and forbids it while carrying
//! blocks.
//!
//! # Modules
//!
//! - [`cost`] -- Transition costs, heuristic, and planner settings
//! - [`queue`] -- Priority queue with keyed removal
//! - [`dstar`] -- The D*-Lite planner
//! - [`navigator`] -- Goal switching and command selection
//! - [`error`] -- Fatal planning errors

pub mod cost;
pub mod dstar;
pub mod error;
pub mod navigator;
pub mod queue;

pub use cost::{CostContext, CostModel, PlannerSettings};
pub use dstar::{Bounds, DStarLite, PlannedStep};
pub use error::NavError;
pub use navigator::{NavCommand, Navigator};
pub use queue::{Key, KeyedQueue};
