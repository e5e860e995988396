//! Map fusion scenarios.
//!
//! Agents are placed in a small synthetic world with a fixed set of
//! obstacles. Each agent's percept is cut from the world around its true
//! position, so overlapping views agree unless a test makes them differ.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use std::collections::BTreeSet;

use mapfuse_core::config::CoordinationConfig;
use mapfuse_core::registry::write_graph;
use mapfuse_core::{
    AgentSession, Coordinator, DimensionVerdict, Dimensions, GraphRegistry, MergeOutcome,
    Strategist,
};
use mapfuse_graph::window_offsets;
use mapfuse_nav::PlannerSettings;
use mapfuse_types::{AgentId, Coord, Percept, TerrainKind, ThingKind};

const A: AgentId = AgentId::new(1);
const B: AgentId = AgentId::new(2);
const C: AgentId = AgentId::new(3);
const RADIUS: i32 = 5;

fn world() -> BTreeSet<Coord> {
    [(1, 1), (2, -1), (3, 4), (-2, 0), (5, 2), (4, -2), (0, -4)]
        .into_iter()
        .map(Coord::from)
        .collect()
}

/// What an agent standing on `at` sees of `obstacles` and of the team
/// members standing on `team`.
fn sight(step: u64, obstacles: &BTreeSet<Coord>, at: Coord, team: &[Coord]) -> Percept {
    let mut p = Percept::new(step);
    for o in window_offsets(RADIUS) {
        let cell = at + o;
        if obstacles.contains(&cell) {
            p = p.with_terrain(TerrainKind::Obstacle, &[(o.x, o.y)]);
        }
        if team.contains(&cell) {
            p = p.with_thing((o.x, o.y), ThingKind::Entity, "A");
        }
    }
    p
}

fn feed(registry: &GraphRegistry, agent: AgentId, percept: &Percept) {
    let graph = registry.graph(agent).unwrap();
    write_graph(&graph).unwrap().update(agent, percept).unwrap();
}

fn strategist(agents: &[AgentId]) -> Strategist {
    let registry = GraphRegistry::new();
    for agent in agents {
        registry.register(*agent, RADIUS).unwrap();
    }
    Strategist::new(registry)
}

#[test]
fn merge_fuses_overlapping_views() {
    let mut s = strategist(&[A, B]);
    let obstacles = world();
    let a_at = Coord::new(0, 0);
    let b_at = Coord::new(3, 2);
    let team = [a_at, b_at];
    feed(s.registry(), A, &sight(0, &obstacles, a_at, &team));
    feed(s.registry(), B, &sight(0, &obstacles, b_at, &team));

    // B looks again a step later; a new obstacle appeared in the overlap.
    let mut later = obstacles.clone();
    later.insert(Coord::new(2, 1));
    feed(s.registry(), B, &sight(1, &later, b_at, &team));

    let outcome = s.merge(A, Coord::new(3, 2), &[B]).unwrap();
    assert_eq!(
        outcome,
        MergeOutcome::Merged {
            absorber: A,
            absorbed: B,
            shift: Coord::new(3, 2),
        }
    );
    assert!(s.registry().same_graph(A, B).unwrap());

    let graph = s.registry().graph(A).unwrap();
    let graph = graph.read().unwrap();
    assert_eq!(graph.location(A), Some(a_at));
    assert_eq!(graph.location(B), Some(b_at));
    assert_eq!(graph.step(), 1);

    let fresh = graph.node(Coord::new(2, 1)).unwrap();
    assert!(fresh.is_obstacle());
    assert_eq!(fresh.terrain.step, Some(1));

    // Both saw B on its cell at step 0; the union keeps one sighting.
    let b_cell = graph.node(b_at).unwrap();
    assert_eq!(b_cell.things_at(0).len(), 1);

    // Cells only B could see are now known from A's frame.
    assert!(graph.node(Coord::new(5, 2)).unwrap().is_obstacle());
    assert!(graph.node(Coord::new(3, 4)).unwrap().is_obstacle());
}

#[test]
fn single_difference_eliminates_false_candidate() {
    let s = strategist(&[A, B, C]);
    let obstacles = world();
    let a_at = Coord::new(0, 0);
    let b_at = Coord::new(2, 0);
    feed(s.registry(), A, &sight(0, &obstacles, a_at, &[a_at, b_at]));
    feed(s.registry(), B, &sight(0, &obstacles, b_at, &[a_at, b_at]));

    // C stands somewhere that looks like B's surroundings, with one extra
    // obstacle inside the region A and B share.
    let mut elsewhere = obstacles.clone();
    elsewhere.insert(Coord::new(1, 2));
    feed(s.registry(), C, &sight(0, &elsewhere, b_at, &[a_at, b_at]));

    let hypotheses = s.identify(A).unwrap();
    assert_eq!(hypotheses.get(&Coord::new(2, 0)), Some(&vec![B, C]));

    let survivors = s.eliminate(A, Coord::new(2, 0), &[B, C]).unwrap();
    assert_eq!(survivors, vec![B]);
}

#[test]
fn indistinguishable_candidates_are_deferred() {
    let mut s = strategist(&[A, B, C]);
    let obstacles = world();
    let a_at = Coord::new(0, 0);
    let b_at = Coord::new(2, 0);
    let view = sight(0, &obstacles, b_at, &[a_at, b_at]);
    feed(s.registry(), A, &sight(0, &obstacles, a_at, &[a_at, b_at]));
    feed(s.registry(), B, &view);
    feed(s.registry(), C, &view);

    let report = s.resolve(A).unwrap();
    assert!(report.merges.is_empty());
    assert_eq!(report.deferred, vec![(Coord::new(2, 0), vec![B, C])]);
    assert!(!s.registry().same_graph(A, B).unwrap());
    assert_eq!(s.merges(), 0);
}

#[test]
fn resolve_merges_unambiguous_pair() {
    let mut s = strategist(&[A, B]);
    let obstacles = world();
    let a_at = Coord::new(0, 0);
    let b_at = Coord::new(-1, 3);
    feed(s.registry(), A, &sight(0, &obstacles, a_at, &[a_at, b_at]));
    feed(s.registry(), B, &sight(0, &obstacles, b_at, &[a_at, b_at]));

    let report = s.resolve(B).unwrap();
    assert_eq!(
        report.merges,
        vec![MergeOutcome::Merged {
            absorber: A,
            absorbed: B,
            shift: Coord::new(-1, 3),
        }]
    );

    // Seen again from A, B already shares the graph and sits where A
    // sees it, so there is nothing to infer.
    let again = s.resolve(A).unwrap();
    assert!(again.merges.is_empty());
    assert_eq!(again.dimensions, None);
    assert_eq!(s.dimensions(), Dimensions::default());
}

#[test]
fn dimensions_follow_divisibility() {
    let mut s = strategist(&[A, B]);
    s.merge(A, Coord::new(1, 0), &[B]).unwrap();

    // A sees B nine cells west, but the graph has B one cell east: the
    // map is ten wide.
    let verdict = s.infer_dimensions(A, B, Coord::new(-9, 0)).unwrap();
    assert_eq!(
        verdict,
        DimensionVerdict::Applied(Dimensions {
            width: Some(10),
            height: None,
        })
    );
    {
        let graph = s.registry().graph(A).unwrap();
        let graph = graph.read().unwrap();
        assert_eq!(graph.width(), Some(10));
        assert_eq!(graph.location(B), Some(Coord::new(1, 0)));
    }

    // Three does not divide ten.
    let verdict = s.infer_dimensions(A, B, Coord::new(4, 0)).unwrap();
    assert_eq!(
        verdict,
        DimensionVerdict::Rejected {
            axis: "width",
            candidate: 3,
        }
    );
    assert_eq!(s.dimensions().width, Some(10));

    // Five does.
    let verdict = s.infer_dimensions(A, B, Coord::new(-4, 0)).unwrap();
    assert_eq!(
        verdict,
        DimensionVerdict::Applied(Dimensions {
            width: Some(5),
            height: None,
        })
    );

    // A consistent sighting teaches nothing.
    let verdict = s.infer_dimensions(A, B, Coord::new(1, 0)).unwrap();
    assert_eq!(verdict, DimensionVerdict::Unchanged);
}

#[test]
fn dimensions_reach_unmerged_graphs() {
    let mut s = strategist(&[A, B, C]);
    s.merge(A, Coord::new(0, 2), &[B]).unwrap();
    let verdict = s.infer_dimensions(A, B, Coord::new(0, -6)).unwrap();
    assert_eq!(
        verdict,
        DimensionVerdict::Applied(Dimensions {
            width: None,
            height: Some(8),
        })
    );
    let graph = s.registry().graph(C).unwrap();
    assert_eq!(graph.read().unwrap().height(), Some(8));

    // Agents in different graphs say nothing about dimensions.
    let verdict = s.infer_dimensions(A, C, Coord::new(0, 3)).unwrap();
    assert_eq!(verdict, DimensionVerdict::Unchanged);
}

#[tokio::test]
async fn coordinator_round_merges_sessions() {
    let registry = GraphRegistry::new();
    registry.register(A, RADIUS).unwrap();
    registry.register(B, RADIUS).unwrap();
    let config = CoordinationConfig::default();
    let (coordinator, handle) =
        Coordinator::new(Strategist::new(registry.clone()), &config).unwrap();
    let task = tokio::spawn(coordinator.run());

    let mut a = AgentSession::new(A, registry.clone(), handle.clone(), PlannerSettings::default())
        .unwrap();
    let mut b = AgentSession::new(B, registry.clone(), handle.clone(), PlannerSettings::default())
        .unwrap();

    let obstacles = world();
    let a_at = Coord::new(0, 0);
    let b_at = Coord::new(3, 1);
    let a_view = sight(0, &obstacles, a_at, &[a_at, b_at]);
    let b_view = sight(0, &obstacles, b_at, &[a_at, b_at]);

    // B's goal is the cell south of A, expressed in B's own frame.
    let (ra, rb) = tokio::join!(a.turn(&a_view, None), b.turn(&b_view, Some(Coord::new(-3, 0))));
    let ra = ra.unwrap();
    let rb = rb.unwrap();

    assert!(ra.round_completed && rb.round_completed);
    assert!(!ra.rebased);
    assert!(rb.rebased);
    assert_eq!(b.frame(), Coord::new(3, 1));
    assert_eq!(rb.location, b_at);
    assert!(registry.same_graph(A, B).unwrap());
    assert!(rb.command.is_some());
    assert_eq!(b.navigator().goal(), Some(Coord::new(0, 1)));

    handle.shutdown().await.unwrap();
    let summary = task.await.unwrap();
    assert_eq!(summary.merges, 1);
    assert_eq!(summary.rounds, 1);
    assert_eq!(summary.timeouts, 0);
}
