//! D*-Lite over a belief graph.
//!
//! The search runs backwards from the goal, so `g(u)` is the cost of
//! reaching the goal from `u` and the agent can move while the search tree
//! stays rooted. When percepts reveal new obstacles, clearings, or agents,
//! only the affected neighbourhoods are re-evaluated instead of planning
//! from scratch.
//!
//! Until the map dimensions are known the grid is unbounded, so the search
//! is confined to the bounding box of known nodes (plus goal and agent)
//! widened by [`PlannerSettings::frontier_margin`]. Cells inside the box
//! that the graph has never seen are routable at unit cost.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use mapfuse_graph::{BeliefGraph, PerceptDelta};
use mapfuse_types::{AgentId, Coord, Direction};
use tracing::{debug, warn};

use crate::cost::{self, CostContext, CostModel, PlannerSettings};
use crate::error::NavError;
use crate::queue::{Key, KeyedQueue};

fn same(a: f64, b: f64) -> bool {
    a.total_cmp(&b).is_eq()
}

/// Rectangle the search is confined to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    /// Inclusive top-left corner.
    pub min: Coord,
    /// Inclusive bottom-right corner.
    pub max: Coord,
}

impl Bounds {
    /// Box around all nodes of `graph` and `extra`, widened by `margin` and
    /// clamped to the torus on every known axis.
    pub fn around(graph: &BeliefGraph, extra: &[Coord], margin: i32) -> Self {
        let mut min = Coord::new(i32::MAX, i32::MAX);
        let mut max = Coord::new(i32::MIN, i32::MIN);
        for c in graph.nodes().map(|n| n.coord).chain(extra.iter().copied()) {
            min = Coord::new(min.x.min(c.x), min.y.min(c.y));
            max = Coord::new(max.x.max(c.x), max.y.max(c.y));
        }
        let mut bounds = Self {
            min: min.offset(margin.saturating_neg(), margin.saturating_neg()),
            max: max.offset(margin, margin),
        };
        if let Some(w) = graph.width() {
            bounds.min.x = 0;
            bounds.max.x = w.saturating_sub(1);
        }
        if let Some(h) = graph.height() {
            bounds.min.y = 0;
            bounds.max.y = h.saturating_sub(1);
        }
        bounds
    }

    /// Whether `c` lies inside.
    pub const fn contains(&self, c: Coord) -> bool {
        c.x >= self.min.x && c.x <= self.max.x && c.y >= self.min.y && c.y <= self.max.y
    }

    /// Smallest box containing both.
    pub fn union(self, other: Self) -> Self {
        Self {
            min: Coord::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Coord::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// All cells inside, row by row.
    pub fn cells(self) -> impl Iterator<Item = Coord> {
        (self.min.y..=self.max.y)
            .flat_map(move |y| (self.min.x..=self.max.x).map(move |x| Coord::new(x, y)))
    }

    fn perimeter(self) -> BTreeSet<Coord> {
        let mut out = BTreeSet::new();
        for x in self.min.x..=self.max.x {
            out.insert(Coord::new(x, self.min.y));
            out.insert(Coord::new(x, self.max.y));
        }
        for y in self.min.y..=self.max.y {
            out.insert(Coord::new(self.min.x, y));
            out.insert(Coord::new(self.max.x, y));
        }
        out
    }
}

/// One recommendation from [`DStarLite::move_to_goal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedStep {
    /// Cheapest neighbour to move to.
    pub next: Coord,
    /// Second-best neighbour, tried next if the move fails.
    pub recovery: Option<Coord>,
}

/// Incremental shortest-path planner bound to one agent and one goal.
#[derive(Debug, Clone)]
pub struct DStarLite {
    agent: AgentId,
    goal: Coord,
    position: Coord,
    last_position: Coord,
    km: f64,
    g: BTreeMap<Coord, f64>,
    rhs: BTreeMap<Coord, f64>,
    back_pointers: BTreeMap<Coord, Coord>,
    queue: KeyedQueue,
    settings: PlannerSettings,
    bounds: Bounds,
    dims: (Option<i32>, Option<i32>),
    revision: u64,
    blocked: BTreeSet<Coord>,
    context: CostContext,
    pending: Option<PlannedStep>,
    retry: Option<Coord>,
}

impl DStarLite {
    /// Bind a planner to `agent` and `goal` and compute the initial path.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::UnknownAgent`] if `agent` is not in `graph`, or
    /// [`NavError::StuckInReplanLoop`] if the initial search trips the loop
    /// guard.
    pub fn new(
        graph: &BeliefGraph,
        agent: AgentId,
        goal: Coord,
        settings: PlannerSettings,
    ) -> Result<Self, NavError> {
        let model = CostModel::for_agent(graph, agent, &settings)?;
        let position = graph.location(agent).ok_or(NavError::UnknownAgent(agent))?;
        let goal = graph.modulate(goal);
        let mut planner = Self {
            agent,
            goal,
            position,
            last_position: position,
            km: 0.0,
            g: BTreeMap::new(),
            rhs: BTreeMap::new(),
            back_pointers: BTreeMap::new(),
            queue: KeyedQueue::new(),
            bounds: Bounds::around(graph, &[goal, position], settings.frontier_margin),
            settings,
            dims: (graph.width(), graph.height()),
            revision: graph.revision(),
            blocked: cost::blocked_cells(graph, model.own_cells()),
            context: model.context(),
            pending: None,
            retry: None,
        };
        planner.seed_goal();
        planner.compute_shortest_path(graph)?;
        Ok(planner)
    }

    // -------------------------------------------------------------------
    // State accessors
    // -------------------------------------------------------------------

    /// The goal this planner is bound to.
    pub const fn goal(&self) -> Coord {
        self.goal
    }

    /// Where the planner believes the agent stands.
    pub const fn position(&self) -> Coord {
        self.position
    }

    /// Accumulated heuristic offset.
    pub const fn km(&self) -> f64 {
        self.km
    }

    /// Search area.
    pub const fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Cost-to-goal estimate of `c`.
    pub fn g(&self, c: Coord) -> f64 {
        self.g.get(&c).copied().unwrap_or(f64::INFINITY)
    }

    /// One-step lookahead cost of `c`.
    pub fn rhs(&self, c: Coord) -> f64 {
        self.rhs.get(&c).copied().unwrap_or(f64::INFINITY)
    }

    /// Cheapest successor recorded for `c`.
    pub fn back_pointer(&self, c: Coord) -> Option<Coord> {
        self.back_pointers.get(&c).copied()
    }

    /// Whether `c` is waiting in the queue (locally inconsistent).
    pub fn is_queued(&self, c: Coord) -> bool {
        self.queue.contains(c)
    }

    /// Priority of `c` relative to the current position.
    pub fn key(&self, c: Coord) -> Key {
        let m = self.g(c).min(self.rhs(c));
        let h = cost::heuristic(c, self.position, self.dims.0, self.dims.1);
        Key::new(m + h + self.km, m)
    }

    /// Follow back pointers from the current position, at most `limit` cells.
    pub fn path(&self, limit: usize) -> Vec<Coord> {
        let mut path = Vec::new();
        let mut at = self.position;
        while at != self.goal && path.len() < limit {
            let Some(next) = self.back_pointer(at) else {
                break;
            };
            path.push(next);
            at = next;
        }
        path
    }

    // -------------------------------------------------------------------
    // Search
    // -------------------------------------------------------------------

    fn seed_goal(&mut self) {
        self.rhs.insert(self.goal, 0.0);
        self.queue.insert(self.goal, self.key(self.goal));
    }

    fn set_g(&mut self, c: Coord, value: f64) {
        if value.is_finite() {
            self.g.insert(c, value);
        } else {
            self.g.remove(&c);
        }
    }

    fn neighbors(&self, graph: &BeliefGraph, c: Coord) -> Vec<Coord> {
        Direction::ALL
            .into_iter()
            .map(|d| graph.modulate(c.step(d)))
            .filter(|n| self.bounds.contains(*n) && *n != c)
            .collect()
    }

    fn update_vertex(&mut self, graph: &BeliefGraph, model: &CostModel<'_>, c: Coord) {
        if c != self.goal {
            let best = self
                .neighbors(graph, c)
                .into_iter()
                .map(|s| (model.transition(c, s) + self.g(s), s))
                .filter(|(cost, _)| cost.is_finite())
                .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            match best {
                Some((cost, via)) => {
                    self.rhs.insert(c, cost);
                    self.back_pointers.insert(c, via);
                }
                None => {
                    self.rhs.remove(&c);
                    self.back_pointers.remove(&c);
                }
            }
        }
        self.queue.remove(c);
        if !same(self.g(c), self.rhs(c)) {
            self.queue.insert(c, self.key(c));
        }
    }

    fn guard(&self, window: &mut VecDeque<Coord>, node: Coord) -> Result<(), NavError> {
        let size = self.settings.loop_window.max(1);
        window.push_back(node);
        if window.len() > size {
            window.pop_front();
        }
        if window.len() < size {
            return Ok(());
        }
        let distinct = window.iter().collect::<BTreeSet<_>>().len();
        if distinct < self.settings.loop_min_distinct {
            warn!(
                agent = %self.agent,
                node = %node,
                distinct,
                window = size,
                "planner stuck in replanning loop"
            );
            return Err(NavError::StuckInReplanLoop { node, window: size });
        }
        Ok(())
    }

    /// Expand inconsistent nodes until the agent's position is consistent
    /// and nothing cheaper remains queued. Returns the number of pops.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::StuckInReplanLoop`] when the loop guard trips,
    /// or [`NavError::UnknownAgent`] if the agent left the graph.
    pub fn compute_shortest_path(&mut self, graph: &BeliefGraph) -> Result<usize, NavError> {
        let model = CostModel::for_agent(graph, self.agent, &self.settings)?;
        let mut window = VecDeque::with_capacity(self.settings.loop_window);
        let mut pops = 0_usize;

        while let Some((k_old, u)) = self.queue.peek() {
            let start = self.position;
            if k_old >= self.key(start) && same(self.g(start), self.rhs(start)) {
                break;
            }
            self.guard(&mut window, u)?;
            self.queue.pop();
            pops = pops.saturating_add(1);

            let k_new = self.key(u);
            if k_old < k_new {
                self.queue.insert(u, k_new);
            } else if self.g(u) > self.rhs(u) {
                self.set_g(u, self.rhs(u));
                for p in self.neighbors(graph, u) {
                    self.update_vertex(graph, &model, p);
                }
            } else {
                self.set_g(u, f64::INFINITY);
                self.update_vertex(graph, &model, u);
                for p in self.neighbors(graph, u) {
                    self.update_vertex(graph, &model, p);
                }
            }
        }

        debug!(
            agent = %self.agent,
            goal = %self.goal,
            pops,
            queued = self.queue.len(),
            cost = self.g(self.position),
            "shortest path computed"
        );
        Ok(pops)
    }

    // -------------------------------------------------------------------
    // Stepping
    // -------------------------------------------------------------------

    /// Recommend the next cell, or `None` at the goal or when no path
    /// exists.
    ///
    /// After a failed move the previous recovery neighbour is preferred
    /// over the optimistic one, as long as it is still reachable.
    pub fn move_to_goal(&mut self, graph: &BeliefGraph) -> Option<PlannedStep> {
        self.pending = None;
        if self.position == self.goal || self.g(self.position).is_infinite() {
            return None;
        }
        let model = CostModel::for_agent(graph, self.agent, &self.settings).ok()?;
        let here = self.position;
        let mut ranked: Vec<(f64, Coord)> = self
            .neighbors(graph, here)
            .into_iter()
            .map(|s| (model.transition(here, s) + self.g(s), s))
            .filter(|(cost, _)| cost.is_finite())
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let retry = self
            .retry
            .take()
            .filter(|r| ranked.iter().any(|(_, c)| c == r));
        let best = ranked.first().map(|e| e.1)?;
        let step = match retry {
            Some(r) => PlannedStep {
                next: r,
                recovery: Some(best).filter(|b| *b != r),
            },
            None => PlannedStep {
                next: best,
                recovery: ranked.get(1).map(|e| e.1),
            },
        };
        self.pending = Some(step);
        Some(step)
    }

    /// Forget the outstanding recommendation, e.g. because the agent acted
    /// without moving on purpose.
    pub fn hold(&mut self) {
        self.pending = None;
    }

    /// Rebind to the refreshed `graph` after the agent's percept was folded
    /// in, repair the neighbourhoods that changed, and replan.
    ///
    /// `moved` says whether the agent actually changed cell this turn.
    ///
    /// # Errors
    ///
    /// Same as [`DStarLite::compute_shortest_path`].
    pub fn update(
        &mut self,
        graph: &BeliefGraph,
        delta: &PerceptDelta,
        moved: bool,
    ) -> Result<(), NavError> {
        let model = CostModel::for_agent(graph, self.agent, &self.settings)?;
        let actual = graph
            .location(self.agent)
            .ok_or(NavError::UnknownAgent(self.agent))?;

        // Folds and merges rewrite nodes outside the percept delta.
        if graph.revision() != self.revision {
            debug!(
                agent = %self.agent,
                revision = graph.revision(),
                "graph reshaped, replanning from scratch"
            );
            self.reset(graph, &model, actual);
            return self.compute_shortest_path(graph).map(|_| ());
        }

        let expected = match self.pending.take() {
            Some(step) if moved => step.next,
            Some(step) => {
                self.retry = step.recovery;
                self.position
            }
            None => self.position,
        };
        if expected != actual {
            warn!(
                agent = %self.agent,
                expected = %expected,
                actual = %actual,
                "planner position diverged from graph, resynchronising"
            );
        }
        self.km += cost::heuristic(self.last_position, actual, self.dims.0, self.dims.1);
        self.last_position = actual;
        self.position = actual;

        let mut dirty: BTreeSet<Coord> = delta.touched().collect();
        let blocked = cost::blocked_cells(graph, model.own_cells());
        dirty.extend(blocked.symmetric_difference(&self.blocked).copied());
        self.blocked = blocked;
        if model.context() != self.context {
            dirty.extend(graph.nodes().filter(|n| n.is_obstacle()).map(|n| n.coord));
            self.context = model.context();
        }

        let grown = Bounds::around(graph, &[self.goal, actual], self.settings.frontier_margin)
            .union(self.bounds);
        let mut affected = BTreeSet::new();
        if grown != self.bounds {
            for c in self.bounds.perimeter() {
                for d in Direction::ALL {
                    let n = graph.modulate(c.step(d));
                    if grown.contains(n) && !self.bounds.contains(n) {
                        affected.insert(n);
                    }
                }
            }
            self.bounds = grown;
        }
        for c in dirty {
            for dx in -2..=2 {
                for dy in -2..=2 {
                    let u = graph.modulate(c.offset(dx, dy));
                    if self.bounds.contains(u) {
                        affected.insert(u);
                    }
                }
            }
        }
        for u in affected {
            self.update_vertex(graph, &model, u);
        }
        self.compute_shortest_path(graph).map(|_| ())
    }

    fn reset(&mut self, graph: &BeliefGraph, model: &CostModel<'_>, position: Coord) {
        self.goal = graph.modulate(self.goal);
        self.position = position;
        self.last_position = position;
        self.km = 0.0;
        self.g.clear();
        self.rhs.clear();
        self.back_pointers.clear();
        self.queue = KeyedQueue::new();
        self.dims = (graph.width(), graph.height());
        self.revision = graph.revision();
        self.bounds = Bounds::around(graph, &[self.goal, position], self.settings.frontier_margin);
        self.blocked = cost::blocked_cells(graph, model.own_cells());
        self.context = model.context();
        self.pending = None;
        self.retry = None;
        self.seed_goal();
    }
}
