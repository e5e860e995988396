//! Transition costs and the search heuristic.
//!
//! The cost of a single move depends on the target cell's terrain, on
//! whether either cell is occupied by something impassable on the current
//! step, and on the moving agent's own state (energy, attached blocks):
//!
//! | Situation | Cost |
//! |---|---|
//! | source or target blocked by an entity or block (not our own) | +inf |
//! | target is an obstacle or touches one, while carrying | +inf |
//! | target is an obstacle, not carrying | `base * e^(-decay * energy)` |
//! | anything else, unknown cells included | 1 |

use std::collections::BTreeSet;

use mapfuse_graph::BeliefGraph;
use mapfuse_types::{AgentId, Coord};
use serde::{Deserialize, Serialize};

use crate::error::NavError;

/// Tuning knobs of the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Obstacle cost at zero energy.
    #[serde(default = "default_obstacle_base_cost")]
    pub obstacle_base_cost: f64,
    /// Exponential decay of the obstacle cost per energy point.
    #[serde(default = "default_energy_decay")]
    pub energy_decay: f64,
    /// Number of consecutive pops inspected by the loop guard.
    #[serde(default = "default_loop_window")]
    pub loop_window: usize,
    /// Minimum number of distinct nodes the window must contain.
    #[serde(default = "default_loop_min_distinct")]
    pub loop_min_distinct: usize,
    /// How far past known nodes the search may route through unknown
    /// cells while an axis is still unbounded.
    #[serde(default = "default_frontier_margin")]
    pub frontier_margin: i32,
}

const fn default_obstacle_base_cost() -> f64 {
    32.0
}

const fn default_energy_decay() -> f64 {
    0.008
}

const fn default_loop_window() -> usize {
    10
}

const fn default_loop_min_distinct() -> usize {
    3
}

const fn default_frontier_margin() -> i32 {
    6
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            obstacle_base_cost: default_obstacle_base_cost(),
            energy_decay: default_energy_decay(),
            loop_window: default_loop_window(),
            loop_min_distinct: default_loop_min_distinct(),
            frontier_margin: default_frontier_margin(),
        }
    }
}

/// The agent-dependent inputs of the cost model. When these change between
/// replans, every obstacle-adjacent edge may have changed cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostContext {
    /// Agent energy.
    pub energy: u32,
    /// Whether any block is attached.
    pub carrying: bool,
}

/// Transition costs for one agent over one graph snapshot.
#[derive(Debug)]
pub struct CostModel<'a> {
    graph: &'a BeliefGraph,
    own: BTreeSet<Coord>,
    context: CostContext,
    obstacle_cost: f64,
}

impl<'a> CostModel<'a> {
    /// Build the cost model for `agent` as it currently stands in `graph`.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::UnknownAgent`] if `agent` is not in `graph`.
    pub fn for_agent(
        graph: &'a BeliefGraph,
        agent: AgentId,
        settings: &PlannerSettings,
    ) -> Result<Self, NavError> {
        let pose = graph.pose(agent).ok_or(NavError::UnknownAgent(agent))?;
        let mut own = BTreeSet::new();
        own.insert(pose.location);
        own.extend(pose.attached.iter().map(|o| graph.modulate(pose.location + *o)));
        let context = CostContext {
            energy: pose.energy,
            carrying: pose.is_carrying(),
        };
        Ok(Self {
            graph,
            own,
            context,
            obstacle_cost: obstacle_cost(settings, pose.energy),
        })
    }

    /// The agent-dependent inputs this model was built with.
    pub const fn context(&self) -> CostContext {
        self.context
    }

    /// Cells occupied by the agent and its attached blocks.
    pub const fn own_cells(&self) -> &BTreeSet<Coord> {
        &self.own
    }

    /// Whether something impassable that is not ours stands on `cell` now.
    pub fn is_blocked(&self, cell: Coord) -> bool {
        let key = self.graph.modulate(cell);
        !self.own.contains(&key)
            && self
                .graph
                .node(key)
                .is_some_and(|n| n.is_blocked_at(self.graph.step()))
    }

    /// Cost of moving from `from` to the adjacent `to`.
    pub fn transition(&self, from: Coord, to: Coord) -> f64 {
        if self.is_blocked(from) || self.is_blocked(to) {
            return f64::INFINITY;
        }
        let Some(node) = self.graph.node(to) else {
            return 1.0;
        };
        if self.context.carrying && (node.is_obstacle() || node.hazard_count > 0) {
            f64::INFINITY
        } else if node.is_obstacle() {
            self.obstacle_cost
        } else {
            1.0
        }
    }
}

/// Soft cost of clearing through an obstacle at `energy`.
pub fn obstacle_cost(settings: &PlannerSettings, energy: u32) -> f64 {
    settings.obstacle_base_cost * (-settings.energy_decay * f64::from(energy)).exp()
}

/// Every cell currently blocked in `graph`, except `own` cells.
pub fn blocked_cells(graph: &BeliefGraph, own: &BTreeSet<Coord>) -> BTreeSet<Coord> {
    let step = graph.step();
    graph
        .nodes()
        .filter(|n| n.is_blocked_at(step) && !own.contains(&n.coord))
        .map(|n| n.coord)
        .collect()
}

/// Manhattan distance, taking the short way around known seams.
pub fn heuristic(a: Coord, b: Coord, width: Option<i32>, height: Option<i32>) -> f64 {
    let axis = |d: u32, size: Option<i32>| {
        size.and_then(|s| u32::try_from(s).ok())
            .map_or(d, |s| d.min(s.saturating_sub(d)))
    };
    let dx = axis(a.x.abs_diff(b.x), width);
    let dy = axis(a.y.abs_diff(b.y), height);
    f64::from(dx.saturating_add(dy))
}

#[cfg(test)]
mod tests {
    use mapfuse_types::{Percept, TerrainKind, ThingKind};

    use super::*;

    const A: AgentId = AgentId::new(0);

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn obstacle_cost_follows_energy() {
        let s = PlannerSettings::default();
        assert!(close(obstacle_cost(&s, 0), 32.0));
        assert!(close(obstacle_cost(&s, 300), 32.0 * (-2.4_f64).exp()));
        assert!(obstacle_cost(&s, 100) > obstacle_cost(&s, 200));
    }

    #[test]
    fn costs_by_situation() {
        let s = PlannerSettings::default();
        let mut g = BeliefGraph::new(A, 5);
        let p = Percept::new(0)
            .with_thing((0, 0), ThingKind::Entity, "A")
            .with_thing((-1, 0), ThingKind::Entity, "B")
            .with_terrain(TerrainKind::Obstacle, &[(0, 2)])
            .with_energy(300);
        let _ = g.update(A, &p);

        let m = CostModel::for_agent(&g, A, &s);
        assert!(m.is_ok());
        let Ok(m) = m else {
            return;
        };
        let here = Coord::ORIGIN;
        assert!(close(m.transition(here, Coord::new(1, 0)), 1.0));
        assert!(m.transition(here, Coord::new(-1, 0)).is_infinite());
        assert!(m.transition(Coord::new(-1, 0), Coord::new(-1, 1)).is_infinite());
        assert!(close(m.transition(Coord::new(0, 1), Coord::new(0, 2)), obstacle_cost(&s, 300)));
        assert!(close(m.transition(Coord::new(9, 9), Coord::new(9, 10)), 1.0));
        assert!(!m.is_blocked(here));
    }

    #[test]
    fn carrying_forbids_obstacles_and_their_surroundings() {
        let s = PlannerSettings::default();
        let mut g = BeliefGraph::new(A, 5);
        let p = Percept::new(0)
            .with_thing((0, 0), ThingKind::Entity, "A")
            .with_thing((1, 0), ThingKind::Block, "b0")
            .with_attached(&[(1, 0)])
            .with_terrain(TerrainKind::Obstacle, &[(0, 3)]);
        let _ = g.update(A, &p);

        let m = CostModel::for_agent(&g, A, &s);
        assert!(m.is_ok());
        let Ok(m) = m else {
            return;
        };
        assert!(m.context().carrying);
        assert!(!m.is_blocked(Coord::new(1, 0)));
        assert!(m.transition(Coord::new(0, 1), Coord::new(0, 2)).is_infinite());
        assert!(m.transition(Coord::new(0, 2), Coord::new(0, 3)).is_infinite());
        assert!(close(m.transition(Coord::ORIGIN, Coord::new(0, 1)), 1.0));
    }

    #[test]
    fn heuristic_wraps_known_axes() {
        let a = Coord::new(1, 0);
        let b = Coord::new(9, 3);
        assert!(close(heuristic(a, b, None, None), 11.0));
        assert!(close(heuristic(a, b, Some(10), None), 5.0));
        assert!(close(heuristic(a, b, Some(10), Some(5)), 4.0));
    }

    #[test]
    fn settings_fill_defaults_from_partial_yaml() {
        let s: Result<PlannerSettings, _> = serde_yml::from_str("loop_window: 20\n");
        let s = s.unwrap_or_default();
        assert_eq!(s.loop_window, 20);
        assert_eq!(s.loop_min_distinct, 3);
        assert!(close(s.obstacle_base_cost, 32.0));
    }
}
