//! The belief graph: one agent's (or one merged team's) map of the world.
//!
//! A [`BeliefGraph`] owns every discovered [`Node`] in a coordinate-keyed
//! arena. Coordinates are relative to the arbitrary root of whichever agent
//! created the graph. The graph starts as a small Manhattan lattice around
//! that root and grows lazily as moves and merges reveal new cells.
//!
//! Once the map's true width and/or height are known, every coordinate is
//! folded through [`BeliefGraph::modulate`] and the graph becomes a torus.
//! Folding is idempotent.
//!
//! Several agents can share one graph after a merge, so per-agent state
//! (location, attached blocks, energy) lives in [`AgentPose`] keyed by
//! [`AgentId`].

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

use mapfuse_types::{AgentId, Coord, Direction, Percept, TerrainKind, Thing, ThingKind};
use serde::Serialize;
use tracing::debug;

use crate::error::GraphError;
use crate::node::{Node, Terrain};

/// Iterate the offsets of a Manhattan window of `radius`, the agent's own
/// cell included.
pub fn window_offsets(radius: i32) -> impl Iterator<Item = Coord> {
    let r = radius.max(0);
    let limit = r.unsigned_abs();
    (r.saturating_neg()..=r).flat_map(move |dx| {
        (r.saturating_neg()..=r)
            .map(move |dy| Coord::new(dx, dy))
            .filter(move |c| c.manhattan() <= limit)
    })
}

fn fold(coord: Coord, width: Option<i32>, height: Option<i32>) -> Coord {
    let x = width.map_or(coord.x, |w| coord.x.checked_rem_euclid(w).unwrap_or(coord.x));
    let y = height.map_or(coord.y, |h| coord.y.checked_rem_euclid(h).unwrap_or(coord.y));
    Coord::new(x, y)
}

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Per-agent state held by the graph the agent currently uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentPose {
    /// Node the agent occupies.
    pub location: Coord,
    /// Offsets of attached blocks, relative to the agent.
    pub attached: Vec<Coord>,
    /// Last reported energy.
    pub energy: u32,
    /// Team name, learned from the entity on the agent's own cell.
    pub team: Option<String>,
}

impl AgentPose {
    /// A pose at `location` with nothing attached.
    pub const fn at(location: Coord) -> Self {
        Self {
            location,
            attached: Vec::new(),
            energy: 0,
            team: None,
        }
    }

    /// Whether the agent is carrying any block.
    pub fn is_carrying(&self) -> bool {
        !self.attached.is_empty()
    }
}

/// Locations of interesting static features.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KnownThings {
    /// Goal-zone cells.
    pub goals: BTreeSet<Coord>,
    /// Task boards.
    pub taskboards: BTreeSet<Coord>,
    /// Dispensers by the block type they hand out.
    pub dispensers: BTreeMap<String, BTreeSet<Coord>>,
}

impl KnownThings {
    fn map(&self, f: impl Fn(Coord) -> Coord) -> Self {
        Self {
            goals: self.goals.iter().copied().map(&f).collect(),
            taskboards: self.taskboards.iter().copied().map(&f).collect(),
            dispensers: self
                .dispensers
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().copied().map(&f).collect()))
                .collect(),
        }
    }

    fn extend(&mut self, other: Self) {
        self.goals.extend(other.goals);
        self.taskboards.extend(other.taskboards);
        for (kind, coords) in other.dispensers {
            self.dispensers.entry(kind).or_default().extend(coords);
        }
    }
}

/// What changed in the graph because of one percept. All coordinates are
/// graph keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PerceptDelta {
    /// Cells that became obstacles.
    pub new_obstacles: Vec<Coord>,
    /// Cells that stopped being obstacles.
    pub new_clearings: Vec<Coord>,
    /// Entity sightings absent on the previous step.
    pub new_agents: Vec<Coord>,
}

impl PerceptDelta {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.new_obstacles.is_empty() && self.new_clearings.is_empty() && self.new_agents.is_empty()
    }

    /// Every coordinate mentioned by the delta.
    pub fn touched(&self) -> impl Iterator<Item = Coord> + '_ {
        self.new_obstacles
            .iter()
            .chain(&self.new_clearings)
            .chain(&self.new_agents)
            .copied()
    }
}

/// Serializable view of a graph, for dumps and debugging.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    /// Graph step.
    pub step: u64,
    /// Known width.
    pub width: Option<i32>,
    /// Known height.
    pub height: Option<i32>,
    /// Agents and their poses.
    pub agents: Vec<(AgentId, AgentPose)>,
    /// Observed nodes only.
    pub nodes: Vec<Node>,
    /// Static features.
    pub known: KnownThings,
}

struct SeenCell {
    terrain: TerrainKind,
    things: Vec<Thing>,
}

// ---------------------------------------------------------------------------
// BeliefGraph
// ---------------------------------------------------------------------------

/// An agent's accumulated, partial map of the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeliefGraph {
    nodes: BTreeMap<Coord, Node>,
    agents: BTreeMap<AgentId, AgentPose>,
    step: u64,
    known: KnownThings,
    width: Option<i32>,
    height: Option<i32>,
    radius: i32,
    revision: u64,
}

impl BeliefGraph {
    /// Create a graph for `agent` standing on the origin, pre-populated with
    /// the Manhattan lattice of `radius`.
    pub fn new(agent: AgentId, radius: i32) -> Self {
        let mut graph = Self {
            nodes: BTreeMap::new(),
            agents: BTreeMap::new(),
            step: 0,
            known: KnownThings::default(),
            width: None,
            height: None,
            radius: radius.max(0),
            revision: 0,
        };
        graph.ensure_window(Coord::ORIGIN);
        graph.agents.insert(agent, AgentPose::at(Coord::ORIGIN));
        graph
    }

    // -------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------

    /// Latest step folded into the graph.
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Known map width.
    pub const fn width(&self) -> Option<i32> {
        self.width
    }

    /// Known map height.
    pub const fn height(&self) -> Option<i32> {
        self.height
    }

    /// Vision radius.
    pub const fn radius(&self) -> i32 {
        self.radius
    }

    /// Bumped whenever a fold or an absorbed graph rewrites nodes the
    /// owning agent did not observe itself. Percept updates leave it alone.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Static features seen so far.
    pub const fn known(&self) -> &KnownThings {
        &self.known
    }

    /// Number of nodes, observed or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate all nodes in key order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Agents using this graph.
    pub fn agent_ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.agents.keys().copied()
    }

    /// Whether `agent` uses this graph.
    pub fn contains_agent(&self, agent: AgentId) -> bool {
        self.agents.contains_key(&agent)
    }

    /// Pose of `agent`.
    pub fn pose(&self, agent: AgentId) -> Option<&AgentPose> {
        self.agents.get(&agent)
    }

    /// Node occupied by `agent`.
    pub fn location(&self, agent: AgentId) -> Option<Coord> {
        self.agents.get(&agent).map(|p| p.location)
    }

    /// Non-creating node lookup.
    pub fn node(&self, loc: Coord) -> Option<&Node> {
        self.nodes.get(&self.modulate(loc))
    }

    /// The node linked from `loc` in `direction`, validated against the arena.
    pub fn neighbor(&self, loc: Coord, direction: Direction) -> Option<Coord> {
        self.node(loc)?
            .link(direction)
            .filter(|n| self.nodes.contains_key(n))
    }

    /// Fold a coordinate through the known dimensions.
    pub fn modulate(&self, loc: Coord) -> Coord {
        fold(loc, self.width, self.height)
    }

    /// Direction from `agent`'s location to the adjacent `loc`, if adjacent.
    ///
    /// Adjacency is tested after folding, so a step across the seam of a
    /// torus resolves to the wrap direction.
    pub fn get_direction(&self, agent: AgentId, loc: Coord) -> Option<Direction> {
        let here = self.location(agent)?;
        let target = self.modulate(loc);
        Direction::ALL
            .into_iter()
            .find(|d| self.modulate(here.step(*d)) == target)
    }

    /// Whether every cell of the torus has been observed. Always `false`
    /// until both dimensions are known.
    pub fn is_fully_explored(&self) -> bool {
        let (Some(w), Some(h)) = (self.width, self.height) else {
            return false;
        };
        let cells = w
            .checked_mul(h)
            .and_then(|c| usize::try_from(c).ok())
            .unwrap_or(usize::MAX);
        self.nodes.values().filter(|n| n.is_observed()).count() >= cells
    }

    // -------------------------------------------------------------------
    // Node creation
    // -------------------------------------------------------------------

    /// Return the node at `loc`, creating and linking it if it is new.
    pub fn get_node(&mut self, loc: Coord) -> &mut Node {
        let key = self.ensure_node(loc);
        self.nodes.entry(key).or_insert_with(|| Node::new(key))
    }

    fn ensure_node(&mut self, loc: Coord) -> Coord {
        let key = self.modulate(loc);
        if self.nodes.contains_key(&key) {
            return key;
        }
        let mut node = Node::new(key);
        for direction in Direction::ALL {
            let n = self.modulate(key.step(direction));
            if n == key {
                node.set_link(direction, Some(key));
            } else if let Some(other) = self.nodes.get_mut(&n) {
                other.set_link(direction.opposite(), Some(key));
                node.set_link(direction, Some(n));
            }
        }
        node.hazard_count = self.hazards_around(key);
        self.nodes.insert(key, node);
        key
    }

    fn ensure_window(&mut self, center: Coord) -> usize {
        let before = self.nodes.len();
        for offset in window_offsets(self.radius) {
            self.ensure_node(center + offset);
        }
        self.nodes.len().saturating_sub(before)
    }

    fn hazards_around(&self, key: Coord) -> u8 {
        let count = key
            .surrounding()
            .iter()
            .filter(|c| self.node(**c).is_some_and(Node::is_obstacle))
            .count();
        u8::try_from(count).unwrap_or(u8::MAX)
    }

    fn refresh_hazards(&mut self, around: impl IntoIterator<Item = Coord>) {
        let mut targets = BTreeSet::new();
        for c in around {
            targets.extend(c.surrounding().iter().map(|s| self.modulate(*s)));
        }
        for key in targets {
            let hazards = self.hazards_around(key);
            if let Some(node) = self.nodes.get_mut(&key) {
                node.hazard_count = hazards;
            }
        }
    }

    fn refresh_all_hazards(&mut self) {
        let keys: Vec<Coord> = self.nodes.keys().copied().collect();
        for key in keys {
            let hazards = self.hazards_around(key);
            if let Some(node) = self.nodes.get_mut(&key) {
                node.hazard_count = hazards;
            }
        }
    }

    fn relink_all(&mut self) {
        let keys: Vec<Coord> = self.nodes.keys().copied().collect();
        for key in keys {
            for direction in Direction::ALL {
                let n = self.modulate(key.step(direction));
                let target = self.nodes.contains_key(&n).then_some(n);
                if let Some(node) = self.nodes.get_mut(&key) {
                    node.set_link(direction, target);
                }
            }
        }
    }

    fn insert_merged(&mut self, key: Coord, mut node: Node) {
        node.coord = key;
        match self.nodes.get_mut(&key) {
            Some(existing) => existing.merge_from(node),
            None => {
                self.nodes.insert(key, node);
            }
        }
    }

    // -------------------------------------------------------------------
    // Percept folding
    // -------------------------------------------------------------------

    /// Fold one percept of `agent` into the graph.
    ///
    /// Relocates the agent along a successful move, then overwrites every
    /// cell of the vision window with what the percept reports. Cells the
    /// percept does not mention are empty.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownAgent`] if `agent` does not use this
    /// graph.
    pub fn update(&mut self, agent: AgentId, percept: &Percept) -> Result<PerceptDelta, GraphError> {
        let mut location = self.location(agent).ok_or(GraphError::UnknownAgent(agent))?;
        let step = percept.step;
        self.step = self.step.max(step);

        let created = if let Some(direction) = percept.moved_direction() {
            let created = self.ensure_window(location.step(direction));
            location = self
                .neighbor(location, direction)
                .unwrap_or_else(|| self.modulate(location.step(direction)));
            created
        } else {
            self.ensure_window(location)
        };

        let vision = self.vision(location, percept);
        let previous = step.checked_sub(1);
        let mut delta = PerceptDelta::default();
        let mut team = None;

        for offset in window_offsets(self.radius) {
            let key = self.modulate(location + offset);
            let seen = vision.get(&key);
            let kind = seen.map_or(TerrainKind::Empty, |s| s.terrain);

            let node = self.get_node(key);
            let was = node.terrain.kind;
            node.terrain = Terrain::observed(kind, step);
            let mut sighted = false;
            if let Some(seen) = seen {
                for thing in &seen.things {
                    if thing.kind == ThingKind::Entity {
                        if offset == Coord::ORIGIN {
                            team = Some(thing.detail.clone());
                        } else if !previous.is_some_and(|p| node.has_entity_at(p)) {
                            sighted = true;
                        }
                    }
                    node.add_thing(step, thing.clone());
                }
            }

            if was == TerrainKind::Obstacle && kind != TerrainKind::Obstacle {
                delta.new_clearings.push(key);
            } else if kind == TerrainKind::Obstacle && was != TerrainKind::Obstacle {
                delta.new_obstacles.push(key);
            }
            if sighted && !delta.new_agents.contains(&key) {
                delta.new_agents.push(key);
            }
            if kind == TerrainKind::Goal {
                self.known.goals.insert(key);
            } else {
                self.known.goals.remove(&key);
            }
            if let Some(seen) = seen {
                for thing in &seen.things {
                    match thing.kind {
                        ThingKind::Taskboard => {
                            self.known.taskboards.insert(key);
                        }
                        ThingKind::Dispenser => {
                            self.known
                                .dispensers
                                .entry(thing.detail.clone())
                                .or_default()
                                .insert(key);
                        }
                        _ => {}
                    }
                }
            }
        }

        let changed: Vec<Coord> = delta
            .new_obstacles
            .iter()
            .chain(&delta.new_clearings)
            .copied()
            .collect();
        self.refresh_hazards(changed);

        if let Some(pose) = self.agents.get_mut(&agent) {
            pose.location = location;
            pose.attached.clone_from(&percept.attached);
            pose.energy = percept.energy;
            if team.is_some() {
                pose.team = team;
            }
        }

        debug!(
            agent = %agent,
            step,
            location = %location,
            created,
            new_obstacles = delta.new_obstacles.len(),
            new_clearings = delta.new_clearings.len(),
            new_agents = delta.new_agents.len(),
            "percept folded"
        );
        Ok(delta)
    }

    /// Absolute view of a percept: graph key to terrain and things.
    /// Cells with things but no terrain entry are empty ground.
    fn vision(&self, location: Coord, percept: &Percept) -> BTreeMap<Coord, SeenCell> {
        let mut vision: BTreeMap<Coord, SeenCell> = BTreeMap::new();
        for (kind, offsets) in &percept.terrain {
            for offset in offsets {
                vision
                    .entry(self.modulate(location + *offset))
                    .or_insert_with(|| SeenCell {
                        terrain: TerrainKind::Empty,
                        things: Vec::new(),
                    })
                    .terrain = *kind;
            }
        }
        for seen in &percept.things {
            vision
                .entry(self.modulate(location + seen.offset))
                .or_insert_with(|| SeenCell {
                    terrain: TerrainKind::Empty,
                    things: Vec::new(),
                })
                .things
                .push(seen.thing.clone());
        }
        vision
    }

    // -------------------------------------------------------------------
    // Local vision queries
    // -------------------------------------------------------------------

    /// Graph keys inside `agent`'s vision window.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownAgent`] if `agent` does not use this
    /// graph.
    pub fn local_window(&self, agent: AgentId) -> Result<BTreeSet<Coord>, GraphError> {
        let here = self.location(agent).ok_or(GraphError::UnknownAgent(agent))?;
        Ok(window_offsets(self.radius)
            .map(|o| self.modulate(here + o))
            .collect())
    }

    /// Offsets, relative to `agent`, of teammates it sees on the current
    /// step. The agent's own cell is excluded.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownAgent`] if `agent` does not use this
    /// graph.
    pub fn local_agents(&self, agent: AgentId) -> Result<Vec<Coord>, GraphError> {
        let pose = self.agents.get(&agent).ok_or(GraphError::UnknownAgent(agent))?;
        let team = pose.team.as_deref();
        Ok(window_offsets(self.radius)
            .filter(|o| *o != Coord::ORIGIN)
            .filter(|o| {
                self.node(pose.location + *o).is_some_and(|n| {
                    n.things_at(self.step).iter().any(|t| {
                        t.kind == ThingKind::Entity && team.is_none_or(|team| t.detail == team)
                    })
                })
            })
            .collect())
    }

    /// Every cell where an entity of `team` was seen at `step`.
    pub fn agents_seen(&self, step: u64, team: &str) -> Vec<Coord> {
        self.nodes
            .values()
            .filter(|n| {
                n.things_at(step)
                    .iter()
                    .any(|t| t.kind == ThingKind::Entity && t.detail == team)
            })
            .map(|n| n.coord)
            .collect()
    }

    /// Terrain and sorted occupants of `loc` at `step`, if the node exists.
    pub fn signature(&self, loc: Coord, step: u64) -> Option<(TerrainKind, Vec<Thing>)> {
        self.node(loc).map(|n| n.signature(step))
    }

    // -------------------------------------------------------------------
    // Dimensions and merging
    // -------------------------------------------------------------------

    /// Establish the map width and/or height and fold the graph.
    ///
    /// `None` keeps the current value of that axis. Every node is re-keyed
    /// through [`BeliefGraph::modulate`]; colliding nodes are merged with
    /// [`Node::merge_from`]. Agent locations and known things follow.
    /// Attached offsets are agent-relative and stay unchanged.
    ///
    /// Returns `true` if the dimensions changed. Calling it again with the
    /// same values leaves the graph untouched.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidDimension`] for a non-positive value.
    pub fn apply_dimensions(
        &mut self,
        width: Option<i32>,
        height: Option<i32>,
    ) -> Result<bool, GraphError> {
        for (axis, value) in [("width", width), ("height", height)] {
            if let Some(value) = value.filter(|v| *v <= 0) {
                return Err(GraphError::InvalidDimension { axis, value });
            }
        }
        let width = width.or(self.width);
        let height = height.or(self.height);
        if width == self.width && height == self.height {
            return Ok(false);
        }
        self.width = width;
        self.height = height;

        let before = self.nodes.len();
        let nodes = std::mem::take(&mut self.nodes);
        for (coord, node) in nodes {
            let key = self.modulate(coord);
            self.insert_merged(key, node);
        }
        for pose in self.agents.values_mut() {
            pose.location = fold(pose.location, width, height);
        }
        self.known = self.known.map(|c| fold(c, width, height));
        self.relink_all();
        self.refresh_all_hazards();
        self.revision = self.revision.saturating_add(1);

        debug!(
            ?width,
            ?height,
            before,
            after = self.nodes.len(),
            "graph folded"
        );
        Ok(true)
    }

    /// Absorb `other` into this graph, translating its keys by `shift`.
    ///
    /// Overlapping nodes are reconciled with [`Node::merge_from`], links
    /// are rebuilt across the seam, and `other`'s agents are re-registered
    /// here. If `other` knows a dimension this graph does not, this graph is
    /// folded first.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateAgent`] if both graphs hold the same
    /// agent.
    pub fn absorb(&mut self, other: Self, shift: Coord) -> Result<(), GraphError> {
        if let Some(dup) = other.agents.keys().find(|a| self.agents.contains_key(a)) {
            return Err(GraphError::DuplicateAgent(*dup));
        }
        self.apply_dimensions(other.width, other.height)?;

        let Self {
            nodes,
            agents,
            step,
            known,
            ..
        } = other;
        for (coord, node) in nodes {
            let key = self.modulate(coord + shift);
            self.insert_merged(key, node);
        }
        for (id, mut pose) in agents {
            pose.location = self.modulate(pose.location + shift);
            self.agents.insert(id, pose);
        }
        let (width, height) = (self.width, self.height);
        self.known
            .extend(known.map(|c| fold(c + shift, width, height)));
        self.step = self.step.max(step);
        self.relink_all();
        self.refresh_all_hazards();
        self.revision = self.revision.saturating_add(1);
        Ok(())
    }

    /// Serializable view of the observed part of the graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            step: self.step,
            width: self.width,
            height: self.height,
            agents: self
                .agents
                .iter()
                .map(|(id, pose)| (*id, pose.clone()))
                .collect(),
            nodes: self
                .nodes
                .values()
                .filter(|n| n.is_observed())
                .cloned()
                .collect(),
            known: self.known.clone(),
        }
    }
}

impl fmt::Display for BeliefGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dim = |d: Option<i32>| d.map_or_else(|| "?".to_owned(), |v| v.to_string());
        write!(
            f,
            "BeliefGraph step={} nodes={} size={}x{} agents=[",
            self.step,
            self.nodes.len(),
            dim(self.width),
            dim(self.height)
        )?;
        for (i, (id, pose)) in self.agents.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id}@{}", pose.location)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use mapfuse_types::ActionOutcome;

    use super::*;

    const A: AgentId = AgentId::new(1);

    fn seen_self(step: u64) -> Percept {
        Percept::new(step).with_thing((0, 0), ThingKind::Entity, "A")
    }

    fn links_reciprocal(g: &BeliefGraph) -> bool {
        g.nodes().all(|n| {
            Direction::ALL.into_iter().all(|d| match n.link(d) {
                Some(t) => g.node(t).and_then(|m| m.link(d.opposite())) == Some(n.coord),
                None => true,
            })
        })
    }

    #[test]
    fn new_graph_is_manhattan_lattice() {
        let g = BeliefGraph::new(A, 5);
        assert_eq!(g.node_count(), 61);
        assert!(g.node(Coord::new(0, 5)).is_some());
        assert!(g.node(Coord::new(3, 3)).is_none());
        assert_eq!(g.location(A), Some(Coord::ORIGIN));
        assert!(links_reciprocal(&g));
    }

    #[test]
    fn get_node_creates_and_links_lazily() {
        let mut g = BeliefGraph::new(A, 1);
        assert!(g.node(Coord::new(2, 0)).is_none());
        g.get_node(Coord::new(2, 0));
        assert_eq!(g.neighbor(Coord::new(1, 0), Direction::East), Some(Coord::new(2, 0)));
        assert_eq!(g.neighbor(Coord::new(2, 0), Direction::West), Some(Coord::new(1, 0)));
        assert!(links_reciprocal(&g));
    }

    #[test]
    fn two_step_scenario_reports_one_obstacle() {
        let mut g = BeliefGraph::new(A, 5);
        let first = seen_self(0).with_terrain(TerrainKind::Obstacle, &[(0, 5)]);
        let d0 = g.update(A, &first).unwrap_or_default();
        assert_eq!(d0.new_obstacles, vec![Coord::new(0, 5)]);
        assert!(d0.new_clearings.is_empty());

        let second = seen_self(1)
            .with_move(Direction::South, ActionOutcome::Success)
            .with_terrain(TerrainKind::Obstacle, &[(0, 4)]);
        let d1 = g.update(A, &second).unwrap_or_default();
        assert!(d1.new_obstacles.is_empty());
        assert!(d1.new_clearings.is_empty());

        let here = g.location(A).unwrap_or(Coord::ORIGIN);
        assert_eq!(here, Coord::new(0, 1));
        let ahead = g.node(here + Coord::new(0, 4));
        assert_eq!(ahead.map(|n| n.coord), Some(Coord::new(0, 5)));
        assert!(ahead.is_some_and(Node::is_obstacle));
        assert!(links_reciprocal(&g));
    }

    #[test]
    fn failed_move_keeps_location() {
        let mut g = BeliefGraph::new(A, 3);
        let p = seen_self(1).with_move(Direction::East, ActionOutcome::FailedRandom);
        assert!(g.update(A, &p).is_ok());
        assert_eq!(g.location(A), Some(Coord::ORIGIN));
    }

    #[test]
    fn vanished_obstacle_is_a_clearing() {
        let mut g = BeliefGraph::new(A, 5);
        let _ = g.update(A, &seen_self(0).with_terrain(TerrainKind::Obstacle, &[(1, 1)]));
        assert_eq!(g.node(Coord::new(1, 1)).map(|n| n.hazard_count), Some(0));
        assert_eq!(g.node(Coord::new(1, 0)).map(|n| n.hazard_count), Some(1));

        let d = g.update(A, &seen_self(1)).unwrap_or_default();
        assert_eq!(d.new_clearings, vec![Coord::new(1, 1)]);
        assert!(d.new_obstacles.is_empty());
        assert_eq!(g.node(Coord::new(1, 0)).map(|n| n.hazard_count), Some(0));
    }

    #[test]
    fn new_agents_are_sightings_absent_last_step() {
        let mut g = BeliefGraph::new(A, 5);
        let p0 = seen_self(0).with_thing((2, 0), ThingKind::Entity, "A");
        let d0 = g.update(A, &p0).unwrap_or_default();
        assert_eq!(d0.new_agents, vec![Coord::new(2, 0)]);

        let p1 = seen_self(1)
            .with_thing((2, 0), ThingKind::Entity, "A")
            .with_thing((0, -3), ThingKind::Entity, "B");
        let d1 = g.update(A, &p1).unwrap_or_default();
        assert_eq!(d1.new_agents, vec![Coord::new(0, -3)]);
        assert_eq!(g.pose(A).and_then(|p| p.team.clone()).as_deref(), Some("A"));
    }

    #[test]
    fn local_agents_are_same_team_and_exclude_self() {
        let mut g = BeliefGraph::new(A, 5);
        let p = seen_self(0)
            .with_thing((2, 1), ThingKind::Entity, "A")
            .with_thing((-1, 0), ThingKind::Entity, "B");
        let _ = g.update(A, &p);
        assert_eq!(g.local_agents(A).unwrap_or_default(), vec![Coord::new(2, 1)]);
        assert_eq!(g.agents_seen(0, "B"), vec![Coord::new(-1, 0)]);
    }

    #[test]
    fn known_things_are_recorded() {
        let mut g = BeliefGraph::new(A, 5);
        let p = seen_self(0)
            .with_terrain(TerrainKind::Goal, &[(1, 2)])
            .with_thing((0, 3), ThingKind::Dispenser, "b1")
            .with_thing((-2, 0), ThingKind::Taskboard, "");
        let _ = g.update(A, &p);
        assert!(g.known().goals.contains(&Coord::new(1, 2)));
        assert!(g.known().taskboards.contains(&Coord::new(-2, 0)));
        assert!(g.known().dispensers.get("b1").is_some_and(|s| s.contains(&Coord::new(0, 3))));
    }

    #[test]
    fn width_ten_links_seam() {
        let mut g = BeliefGraph::new(A, 1);
        for x in 0..10 {
            g.get_node(Coord::new(x, 0));
        }
        assert_eq!(g.apply_dimensions(Some(10), None), Ok(true));
        assert_eq!(g.neighbor(Coord::new(9, 0), Direction::East), Some(Coord::new(0, 0)));
        assert_eq!(g.neighbor(Coord::new(0, 0), Direction::West), Some(Coord::new(9, 0)));
        assert_eq!(g.get_direction(A, Coord::new(9, 0)), Some(Direction::West));
        assert_eq!(g.get_direction(A, Coord::new(8, 0)), None);
        assert!(links_reciprocal(&g));
    }

    #[test]
    fn folding_merges_collisions_by_latest_step() {
        let mut g = BeliefGraph::new(A, 1);
        let _ = g.update(A, &seen_self(1));
        let far = g.get_node(Coord::new(11, 0));
        far.terrain = Terrain::observed(TerrainKind::Obstacle, 3);
        far.add_thing(3, Thing::new(ThingKind::Block, "b0"));

        assert_eq!(g.apply_dimensions(Some(10), None), Ok(true));
        let n = g.node(Coord::new(1, 0));
        assert!(n.is_some_and(Node::is_obstacle));
        assert!(n.is_some_and(|n| n.is_blocked_at(3)));
        assert_eq!(g.node(Coord::new(0, 0)).map(|n| n.hazard_count), Some(1));
    }

    #[test]
    fn folding_is_idempotent() {
        let mut g = BeliefGraph::new(A, 5);
        let p = seen_self(0)
            .with_terrain(TerrainKind::Obstacle, &[(-4, 0), (3, 1)])
            .with_terrain(TerrainKind::Goal, &[(0, -5)]);
        let _ = g.update(A, &p);

        let _ = g.apply_dimensions(Some(7), Some(6));
        let once = g.clone();
        assert_eq!(g.apply_dimensions(Some(7), Some(6)), Ok(false));
        assert_eq!(g, once);
        assert!(once.nodes().all(|n| (0..7).contains(&n.coord.x) && (0..6).contains(&n.coord.y)));
        assert!(once.known().goals.contains(&Coord::new(0, 1)));
    }

    #[test]
    fn fully_explored_needs_every_cell() {
        let mut g = BeliefGraph::new(A, 5);
        assert!(!g.is_fully_explored());
        let _ = g.apply_dimensions(Some(3), Some(3));
        assert!(!g.is_fully_explored());
        let _ = g.update(A, &seen_self(0));
        assert!(g.is_fully_explored());
    }

    #[test]
    fn invalid_dimension_is_rejected() {
        let mut g = BeliefGraph::new(A, 1);
        assert_eq!(
            g.apply_dimensions(Some(0), None),
            Err(GraphError::InvalidDimension { axis: "width", value: 0 })
        );
        assert_eq!(g.width(), None);
    }

    #[test]
    fn unknown_agent_is_an_error() {
        let mut g = BeliefGraph::new(A, 1);
        let r = g.update(AgentId::new(9), &Percept::new(0));
        assert_eq!(r, Err(GraphError::UnknownAgent(AgentId::new(9))));
    }

    #[test]
    fn absorb_shifts_nodes_and_agents() {
        let b = AgentId::new(2);
        let mut ga = BeliefGraph::new(A, 2);
        let mut gb = BeliefGraph::new(b, 2);
        let _ = gb.update(b, &seen_self(4).with_terrain(TerrainKind::Obstacle, &[(1, 0)]));

        let before = ga.revision();
        assert!(ga.absorb(gb, Coord::new(3, 0)).is_ok());
        assert!(ga.revision() > before);
        assert_eq!(ga.location(b), Some(Coord::new(3, 0)));
        assert!(ga.node(Coord::new(4, 0)).is_some_and(Node::is_obstacle));
        assert_eq!(ga.step(), 4);
        assert!(links_reciprocal(&ga));

        let merged = ga.revision();
        let _ = ga.update(A, &seen_self(5));
        assert_eq!(ga.revision(), merged);

        let dup = ga.clone();
        assert_eq!(ga.absorb(dup, Coord::ORIGIN), Err(GraphError::DuplicateAgent(A)));
    }

    #[test]
    fn snapshot_serializes_observed_part() {
        let mut g = BeliefGraph::new(A, 2);
        let _ = g.update(A, &seen_self(4).with_terrain(TerrainKind::Obstacle, &[(1, 0)]));
        let snap = g.snapshot();
        assert!(snap.nodes.iter().all(Node::is_observed));
        assert!(snap.nodes.iter().any(Node::is_obstacle));

        let json = serde_json::to_value(&snap);
        assert!(json.is_ok());
        let Ok(json) = json else {
            return;
        };
        assert_eq!(json.get("step").and_then(serde_json::Value::as_u64), Some(4));
        assert_eq!(json.get("width"), Some(&serde_json::Value::Null));
        assert!(json.get("nodes").is_some_and(serde_json::Value::is_array));
    }

    #[test]
    fn display_summarises_graph() {
        let g = BeliefGraph::new(A, 0);
        assert_eq!(g.to_string(), "BeliefGraph step=0 nodes=1 size=?x? agents=[1@(0, 0)]");
    }
}
