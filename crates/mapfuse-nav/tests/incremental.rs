//! Incremental repair versus planning from scratch.
//!
//! Random worlds are generated from fixed seeds. Each turn the world
//! changes (obstacles appear and vanish, other agents wander, energy and
//! carried blocks change) and the repaired planner must agree with a
//! planner built from scratch on the same graph.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use std::collections::BTreeSet;

use mapfuse_graph::{BeliefGraph, window_offsets};
use mapfuse_nav::{DStarLite, PlannerSettings};
use mapfuse_types::{ActionOutcome, AgentId, Coord, Percept, TerrainKind, ThingKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const AGENT: AgentId = AgentId::new(0);
const RADIUS: i32 = 5;

struct World {
    obstacles: BTreeSet<Coord>,
    others: BTreeSet<Coord>,
    carrying: bool,
    energy: u32,
}

impl World {
    fn random(rng: &mut StdRng, goal: Coord) -> Self {
        let mut obstacles = BTreeSet::new();
        for x in -8..=8 {
            for y in -8..=8 {
                let c = Coord::new(x, y);
                if c != Coord::ORIGIN && c != goal && rng.random_bool(0.25) {
                    obstacles.insert(c);
                }
            }
        }
        Self {
            obstacles,
            others: BTreeSet::new(),
            carrying: false,
            energy: 300,
        }
    }

    fn churn(&mut self, rng: &mut StdRng, at: Coord, goal: Coord) {
        for _ in 0..6 {
            let c = Coord::new(at.x + rng.random_range(-5..=5), at.y + rng.random_range(-5..=5));
            if c == at || c == goal {
                continue;
            }
            if !self.obstacles.remove(&c) {
                self.obstacles.insert(c);
            }
        }
        self.others.clear();
        for _ in 0..2 {
            let c = Coord::new(at.x + rng.random_range(-4..=4), at.y + rng.random_range(-4..=4));
            if c != at && c != goal && !self.obstacles.contains(&c) {
                self.others.insert(c);
            }
        }
        self.energy = rng.random_range(0..=300);
        self.carrying = rng.random_bool(0.3);
    }

    fn percept(&self, step: u64, at: Coord) -> Percept {
        let mut p = Percept::new(step)
            .with_thing((0, 0), ThingKind::Entity, "A")
            .with_energy(self.energy);
        for o in window_offsets(RADIUS) {
            let c = at + o;
            if self.obstacles.contains(&c) {
                p = p.with_terrain(TerrainKind::Obstacle, &[(o.x, o.y)]);
            }
            if self.others.contains(&c) {
                p = p.with_thing((o.x, o.y), ThingKind::Entity, "A");
            }
        }
        if self.carrying && !self.obstacles.contains(&(at + Coord::new(0, -1))) {
            p = p
                .with_thing((0, -1), ThingKind::Block, "b0")
                .with_attached(&[(0, -1)]);
        }
        p
    }
}

fn agree(a: f64, b: f64) -> bool {
    (a.is_infinite() && b.is_infinite()) || (a - b).abs() < 1e-6
}

fn assert_matches_scratch(planner: &DStarLite, graph: &BeliefGraph, goal: Coord, ctx: &str) {
    let fresh = DStarLite::new(graph, AGENT, goal, PlannerSettings::default()).unwrap();
    let here = graph.location(AGENT).unwrap();
    assert_eq!(planner.position(), here, "{ctx}");
    assert_eq!(planner.bounds(), fresh.bounds(), "{ctx}");
    assert!(
        agree(planner.g(here), fresh.g(here)),
        "{ctx}: incremental {} vs scratch {}",
        planner.g(here),
        fresh.g(here)
    );
    assert!(agree(planner.rhs(here), fresh.rhs(here)), "{ctx}");
}

#[test]
fn stationary_agent_matches_scratch() {
    let goal = Coord::new(4, 1);
    for seed in 0..8_u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut world = World::random(&mut rng, goal);
        let mut graph = BeliefGraph::new(AGENT, RADIUS);
        graph.update(AGENT, &world.percept(0, Coord::ORIGIN)).unwrap();
        let mut planner =
            DStarLite::new(&graph, AGENT, goal, PlannerSettings::default()).unwrap();

        for step in 1..=6 {
            world.churn(&mut rng, Coord::ORIGIN, goal);
            let delta = graph.update(AGENT, &world.percept(step, Coord::ORIGIN)).unwrap();
            planner.update(&graph, &delta, false).unwrap();
            assert_matches_scratch(&planner, &graph, goal, &format!("seed {seed} step {step}"));
        }
    }
}

#[test]
fn moving_agent_matches_scratch() {
    let goal = Coord::new(9, -6);
    for seed in 100..106_u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut world = World::random(&mut rng, goal);
        let mut graph = BeliefGraph::new(AGENT, RADIUS);
        let mut at = Coord::ORIGIN;
        graph.update(AGENT, &world.percept(0, at)).unwrap();
        let mut planner =
            DStarLite::new(&graph, AGENT, goal, PlannerSettings::default()).unwrap();

        for step in 1..=10 {
            let Some(next) = planner.move_to_goal(&graph).map(|s| s.next) else {
                break;
            };
            let direction = graph.get_direction(AGENT, next).unwrap();
            let mut percept_move = None;
            if world.obstacles.remove(&next) {
                planner.hold();
            } else {
                at = next;
                percept_move = Some(direction);
            }
            world.churn(&mut rng, at, goal);
            world.obstacles.remove(&at);
            world.others.remove(&at);

            let mut percept = world.percept(step, at);
            if let Some(d) = percept_move {
                percept = percept.with_move(d, ActionOutcome::Success);
            }
            let delta = graph.update(AGENT, &percept).unwrap();
            planner.update(&graph, &delta, percept_move.is_some()).unwrap();
            assert_matches_scratch(&planner, &graph, goal, &format!("seed {seed} step {step}"));
        }
    }
}

#[test]
fn open_world_reaches_goal() {
    let goal = Coord::new(-3, 7);
    let world = World {
        obstacles: BTreeSet::new(),
        others: BTreeSet::new(),
        carrying: false,
        energy: 300,
    };
    let mut graph = BeliefGraph::new(AGENT, RADIUS);
    let mut at = Coord::ORIGIN;
    graph.update(AGENT, &world.percept(0, at)).unwrap();
    let mut planner = DStarLite::new(&graph, AGENT, goal, PlannerSettings::default()).unwrap();

    let mut steps = 0_u64;
    while let Some(step) = planner.move_to_goal(&graph) {
        steps += 1;
        assert!(steps <= 10, "walked too far");
        let d = graph.get_direction(AGENT, step.next).unwrap();
        at = step.next;
        let p = world.percept(steps, at).with_move(d, ActionOutcome::Success);
        let delta = graph.update(AGENT, &p).unwrap();
        planner.update(&graph, &delta, true).unwrap();
    }
    assert_eq!(at, goal);
    assert_eq!(steps, 10);
}

#[test]
fn absorbed_wall_matches_scratch() {
    let goal = Coord::new(0, 14);
    let other = AgentId::new(1);
    let mut graph = BeliefGraph::new(AGENT, RADIUS);
    let seen = Percept::new(0)
        .with_thing((0, 0), ThingKind::Entity, "A")
        .with_energy(0);
    graph.update(AGENT, &seen).unwrap();
    let mut planner = DStarLite::new(&graph, AGENT, goal, PlannerSettings::default()).unwrap();
    let open = planner.g(Coord::ORIGIN);

    // The other agent stands seven cells south and sees a wall in front.
    let wall: Vec<(i32, i32)> = (-4..=4).map(|x| (x, 1)).collect();
    let mut theirs = BeliefGraph::new(other, RADIUS);
    theirs
        .update(
            other,
            &Percept::new(0)
                .with_thing((0, 0), ThingKind::Entity, "A")
                .with_terrain(TerrainKind::Obstacle, &wall),
        )
        .unwrap();
    graph.absorb(theirs, Coord::new(0, 7)).unwrap();
    assert!(graph.node(Coord::new(0, 8)).unwrap().is_obstacle());

    // A's own percept cannot reach the wall.
    let delta = graph.update(AGENT, &seen).unwrap();
    assert!(delta.touched().all(|c| c.y < 8));
    planner.update(&graph, &delta, false).unwrap();
    assert_matches_scratch(&planner, &graph, goal, "after absorb");
    assert!(planner.g(Coord::ORIGIN) > open);
}
