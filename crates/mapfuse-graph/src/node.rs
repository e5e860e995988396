//! A single grid cell's accumulated knowledge.
//!
//! Nodes live in the coordinate-keyed arena of a
//! [`BeliefGraph`](crate::belief::BeliefGraph). Neighbor links are stored as
//! coordinates, never as references, so a node can be re-keyed by a fold or
//! a merge without anything dangling. The graph keeps links reciprocal.

use core::fmt;
use std::collections::BTreeMap;

use mapfuse_types::{Coord, Direction, TerrainKind, Thing, ThingKind};
use serde::{Deserialize, Serialize};

/// Terrain of a cell and when it was last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Terrain {
    /// What the ground is.
    pub kind: TerrainKind,
    /// Step of the last observation, `None` if never seen.
    pub step: Option<u64>,
}

impl Terrain {
    /// Terrain observed at `step`.
    pub const fn observed(kind: TerrainKind, step: u64) -> Self {
        Self {
            kind,
            step: Some(step),
        }
    }
}

/// One cell of a belief graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Key of this node in its graph.
    pub coord: Coord,
    /// Latest known terrain.
    pub terrain: Terrain,
    /// Things seen here, by step. Each list is duplicate-free.
    pub occupants: BTreeMap<u64, Vec<Thing>>,
    /// Neighbor keys in N, E, S, W slot order.
    links: [Option<Coord>; 4],
    /// Number of obstacle cells among the 8 surrounding cells.
    pub hazard_count: u8,
}

impl Node {
    /// An unobserved, unlinked node.
    pub const fn new(coord: Coord) -> Self {
        Self {
            coord,
            terrain: Terrain {
                kind: TerrainKind::Empty,
                step: None,
            },
            occupants: BTreeMap::new(),
            links: [None; 4],
            hazard_count: 0,
        }
    }

    /// Whether the cell is believed to be an obstacle.
    pub fn is_obstacle(&self) -> bool {
        self.terrain.kind == TerrainKind::Obstacle
    }

    /// Whether the cell has ever been observed.
    pub const fn is_observed(&self) -> bool {
        self.terrain.step.is_some()
    }

    /// The neighbor key linked in `direction`, if any.
    pub fn link(&self, direction: Direction) -> Option<Coord> {
        self.links.get(direction.slot()).copied().flatten()
    }

    pub(crate) fn set_link(&mut self, direction: Direction, target: Option<Coord>) {
        if let Some(slot) = self.links.get_mut(direction.slot()) {
            *slot = target;
        }
    }

    /// Things seen here at `step`.
    pub fn things_at(&self, step: u64) -> &[Thing] {
        self.occupants.get(&step).map_or(&[], Vec::as_slice)
    }

    /// Record a thing seen at `step`. Returns `false` if it was already
    /// recorded for that step.
    pub fn add_thing(&mut self, step: u64, thing: Thing) -> bool {
        let list = self.occupants.entry(step).or_default();
        if list.contains(&thing) {
            return false;
        }
        list.push(thing);
        true
    }

    /// Whether an entity of any team stood here at `step`.
    pub fn has_entity_at(&self, step: u64) -> bool {
        self.things_at(step)
            .iter()
            .any(|t| t.kind == ThingKind::Entity)
    }

    /// Whether something impassable stood here at `step`.
    pub fn is_blocked_at(&self, step: u64) -> bool {
        self.things_at(step).iter().any(|t| t.kind.is_blocking())
    }

    /// Terrain kind plus the sorted occupant list at `step`.
    ///
    /// Two agents looking at the same cell on the same step produce equal
    /// signatures.
    pub fn signature(&self, step: u64) -> (TerrainKind, Vec<Thing>) {
        let mut things = self.things_at(step).to_vec();
        things.sort();
        (self.terrain.kind, things)
    }

    /// Fold another node's knowledge into this one.
    ///
    /// The more recently observed terrain wins (ties keep `self`) and
    /// occupant histories are unioned. Links are left for the graph to
    /// rebuild.
    pub fn merge_from(&mut self, other: Self) {
        if other.terrain.step > self.terrain.step {
            self.terrain = other.terrain;
        }
        for (step, things) in other.occupants {
            for thing in things {
                self.add_thing(step, thing);
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.coord, self.terrain.kind)?;
        if let Some(step) = self.terrain.step {
            write!(f, "@{step}")?;
        }
        if let Some((step, things)) = self.occupants.last_key_value() {
            let names: Vec<String> = things.iter().map(ToString::to_string).collect();
            write!(f, " [{}]@{step}", names.join(", "))?;
        }
        Ok(())
    }
}
