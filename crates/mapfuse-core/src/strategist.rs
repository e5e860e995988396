//! Identity resolution, graph merging, and map dimension inference.
//!
//! Agents never learn each other's identity or absolute position. What an
//! agent does see is an entity of its own team at some relative offset. If
//! another agent sees an entity at the negated offset on the same step, the
//! two sightings may be each other, and that pairing is a merge hypothesis.
//!
//! # Round structure
//!
//! 1. [`Strategist::identify`] collects hypotheses per offset.
//! 2. [`Strategist::eliminate`] drops candidates whose view of the shared
//!    region disagrees with the main agent's.
//! 3. [`Strategist::merge`] fuses graphs when exactly one candidate
//!    survives; ambiguous offsets wait for more evidence.
//! 4. For a surviving candidate that already shares the graph,
//!    [`Strategist::infer_dimensions`] compares the predicted and recorded
//!    positions. A mismatch is a wrap of the torus.
//!
//! The strategist is the only writer of the [`GraphRegistry`] and is owned
//! by a single coordinator task, so merges never interleave.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use mapfuse_graph::window_offsets;
use mapfuse_types::{AgentId, Coord, TerrainKind, Thing};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::registry::{GraphRegistry, read_graph, write_graph};

/// Global map dimensions, as far as they are known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    /// Width of the torus.
    pub width: Option<i32>,
    /// Height of the torus.
    pub height: Option<i32>,
}

/// Result of a merge attempt at one offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Two graphs were fused.
    Merged {
        /// Agent whose graph absorbed the other.
        absorber: AgentId,
        /// Agent whose graph was absorbed.
        absorbed: AgentId,
        /// Translation applied to the absorbed graph's coordinates.
        shift: Coord,
    },
    /// The single candidate already uses the main agent's graph.
    AlreadyShared {
        /// The candidate.
        other: AgentId,
    },
    /// Zero or several candidates remain; wait for more evidence.
    Deferred {
        /// The remaining candidates.
        candidates: Vec<AgentId>,
    },
}

/// Result of a dimension inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionVerdict {
    /// New dimensions were established and applied to every graph.
    Applied(Dimensions),
    /// The candidate does not divide the established value.
    Rejected {
        /// `"width"` or `"height"`.
        axis: &'static str,
        /// The discarded candidate.
        candidate: i32,
    },
    /// Nothing to learn.
    Unchanged,
}

/// What one [`Strategist::resolve`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Merges performed.
    pub merges: Vec<MergeOutcome>,
    /// Offsets left ambiguous, with their remaining candidates.
    pub deferred: Vec<(Coord, Vec<AgentId>)>,
    /// Dimensions established during the round, if any.
    pub dimensions: Option<Dimensions>,
    /// Dimension candidates that were discarded.
    pub rejected: usize,
}

/// Owner of identity resolution and merging.
#[derive(Debug)]
pub struct Strategist {
    registry: GraphRegistry,
    dimensions: Dimensions,
    merges: u64,
}

impl Strategist {
    /// Create a strategist over `registry`.
    pub const fn new(registry: GraphRegistry) -> Self {
        Self {
            registry,
            dimensions: Dimensions {
                width: None,
                height: None,
            },
            merges: 0,
        }
    }

    /// The registry this strategist writes.
    pub const fn registry(&self) -> &GraphRegistry {
        &self.registry
    }

    /// Dimensions established so far.
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Number of merges performed.
    pub const fn merges(&self) -> u64 {
        self.merges
    }

    /// Merge hypotheses for `main`: for every teammate `main` sees at
    /// offset `o`, the other agents that see a teammate at `-o`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownAgent`] if `main` is not registered.
    pub fn identify(&self, main: AgentId) -> Result<BTreeMap<Coord, Vec<AgentId>>, CoreError> {
        let sightings = self.local_agents(main)?;
        let mut hypotheses: BTreeMap<Coord, Vec<AgentId>> = BTreeMap::new();
        if sightings.is_empty() {
            return Ok(hypotheses);
        }
        for other in self.registry.agents()? {
            if other == main {
                continue;
            }
            let theirs = self.local_agents(other)?;
            for offset in &sightings {
                if theirs.contains(&-*offset) {
                    hypotheses.entry(*offset).or_default().push(other);
                }
            }
        }
        Ok(hypotheses)
    }

    /// Keep the candidates whose view agrees with `main`'s on every cell
    /// both can see, assuming the candidate stands at `offset` from `main`.
    ///
    /// Terrain kind and the sorted occupants at `main`'s current step are
    /// compared. A cell the candidate has no node for counts as a mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownAgent`] if an agent is not registered.
    pub fn eliminate(
        &self,
        main: AgentId,
        offset: Coord,
        candidates: &[AgentId],
    ) -> Result<Vec<AgentId>, CoreError> {
        let (step, shared) = {
            let graph = self.registry.graph(main)?;
            let graph = read_graph(&graph)?;
            let here = graph.location(main).ok_or(CoreError::UnknownAgent(main))?;
            let radius = graph.radius();
            let shared: Vec<(Coord, Option<(TerrainKind, Vec<Thing>)>)> = window_offsets(radius)
                .filter(|r| (*r - offset).manhattan() <= radius.unsigned_abs())
                .map(|r| (r, graph.signature(here + r, graph.step())))
                .collect();
            (graph.step(), shared)
        };

        let mut survivors = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let graph = self.registry.graph(*candidate)?;
            let graph = read_graph(&graph)?;
            let there = graph
                .location(*candidate)
                .ok_or(CoreError::UnknownAgent(*candidate))?;
            let mismatch = shared.iter().find(|(r, ours)| {
                let theirs = graph.signature(there + *r - offset, step);
                ours.is_none() || theirs != *ours
            });
            match mismatch {
                Some((r, _)) => {
                    debug!(%main, candidate = %candidate, %offset, cell = %r, "candidate eliminated");
                }
                None => survivors.push(*candidate),
            }
        }
        Ok(survivors)
    }

    /// Fuse `main`'s graph with the graph of the single surviving candidate
    /// seen at `offset`.
    ///
    /// The graph with more nodes absorbs the other one, the lower agent id
    /// winning ties, and every agent of the absorbed graph is repointed at
    /// the survivor.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if an agent is unknown, a lock is poisoned,
    /// or the graphs cannot be combined.
    pub fn merge(
        &mut self,
        main: AgentId,
        offset: Coord,
        survivors: &[AgentId],
    ) -> Result<MergeOutcome, CoreError> {
        let &[other] = survivors else {
            return Ok(MergeOutcome::Deferred {
                candidates: survivors.to_vec(),
            });
        };
        if self.registry.same_graph(main, other)? {
            return Ok(MergeOutcome::AlreadyShared { other });
        }

        let main_graph = self.registry.graph(main)?;
        let other_graph = self.registry.graph(other)?;
        let main_size = read_graph(&main_graph)?.node_count();
        let other_size = read_graph(&other_graph)?.node_count();
        let main_absorbs = match main_size.cmp(&other_size) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => main < other,
        };
        let (absorber, absorbed, offset, keep, gone) = if main_absorbs {
            (main, other, offset, main_graph, other_graph)
        } else {
            (other, main, -offset, other_graph, main_graph)
        };

        let (shift, moved) = {
            // Locks in agent id order.
            let (mut target, source) = if absorber < absorbed {
                let target = write_graph(&keep)?;
                let source = read_graph(&gone)?.clone();
                (target, source)
            } else {
                let source = read_graph(&gone)?.clone();
                (write_graph(&keep)?, source)
            };
            let from = target
                .location(absorber)
                .ok_or(CoreError::UnknownAgent(absorber))?;
            let to = source
                .location(absorbed)
                .ok_or(CoreError::UnknownAgent(absorbed))?;
            let shift = from + offset - to;
            let moved: Vec<AgentId> = source.agent_ids().collect();
            target.absorb(source, shift)?;
            target.apply_dimensions(self.dimensions.width, self.dimensions.height)?;
            (shift, moved)
        };
        for agent in &moved {
            self.registry.assign(*agent, Arc::clone(&keep))?;
        }
        self.merges = self.merges.saturating_add(1);

        info!(
            %absorber,
            %absorbed,
            %shift,
            agents = moved.len(),
            "graphs merged"
        );
        Ok(MergeOutcome::Merged {
            absorber,
            absorbed,
            shift,
        })
    }

    /// Compare where `main` sees `agent` with where the shared graph
    /// records it. A mismatch along an axis is a candidate size for it.
    ///
    /// The first candidate for an axis is accepted. Later candidates must
    /// evenly divide the established value; anything else is discarded
    /// without side effects. Accepted dimensions are folded into every
    /// registered graph.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if an agent is unknown, a lock is poisoned,
    /// or folding fails.
    pub fn infer_dimensions(
        &mut self,
        main: AgentId,
        agent: AgentId,
        offset: Coord,
    ) -> Result<DimensionVerdict, CoreError> {
        if !self.registry.same_graph(main, agent)? {
            return Ok(DimensionVerdict::Unchanged);
        }
        let (predicted, actual) = {
            let graph = self.registry.graph(main)?;
            let graph = read_graph(&graph)?;
            let here = graph.location(main).ok_or(CoreError::UnknownAgent(main))?;
            let there = graph.location(agent).ok_or(CoreError::UnknownAgent(agent))?;
            (graph.modulate(here + offset), there)
        };
        if predicted == actual {
            return Ok(DimensionVerdict::Unchanged);
        }

        let width = match reconcile(discrepancy(actual.x, predicted.x), self.dimensions.width) {
            Ok(width) => width,
            Err(candidate) => return Ok(rejected("width", candidate)),
        };
        let height = match reconcile(discrepancy(actual.y, predicted.y), self.dimensions.height) {
            Ok(height) => height,
            Err(candidate) => return Ok(rejected("height", candidate)),
        };
        let next = Dimensions { width, height };
        if next == self.dimensions {
            return Ok(DimensionVerdict::Unchanged);
        }

        self.dimensions = next;
        for (_, graph) in self.registry.distinct_graphs()? {
            write_graph(&graph)?.apply_dimensions(next.width, next.height)?;
        }
        info!(
            width = ?next.width,
            height = ?next.height,
            %main,
            %agent,
            "map dimensions established"
        );
        Ok(DimensionVerdict::Applied(next))
    }

    /// Run one identification round for `main`.
    ///
    /// # Errors
    ///
    /// Returns the first [`CoreError`] raised by any step; earlier merges
    /// in the same round stay in effect.
    pub fn resolve(&mut self, main: AgentId) -> Result<RoundReport, CoreError> {
        let mut report = RoundReport::default();
        for (offset, candidates) in self.identify(main)? {
            let survivors = self.eliminate(main, offset, &candidates)?;
            if survivors.is_empty() {
                continue;
            }
            match self.merge(main, offset, &survivors)? {
                MergeOutcome::AlreadyShared { other } => {
                    match self.infer_dimensions(main, other, offset)? {
                        DimensionVerdict::Applied(dims) => report.dimensions = Some(dims),
                        DimensionVerdict::Rejected { axis, candidate } => {
                            debug!(%main, %other, axis, candidate, "dimension candidate rejected");
                            report.rejected = report.rejected.saturating_add(1);
                        }
                        DimensionVerdict::Unchanged => {}
                    }
                }
                MergeOutcome::Deferred { candidates } => {
                    debug!(%main, %offset, candidates = candidates.len(), "identity ambiguous");
                    report.deferred.push((offset, candidates));
                }
                merged @ MergeOutcome::Merged { .. } => report.merges.push(merged),
            }
        }
        Ok(report)
    }

    fn local_agents(&self, agent: AgentId) -> Result<Vec<Coord>, CoreError> {
        let graph = self.registry.graph(agent)?;
        let graph = read_graph(&graph)?;
        Ok(graph.local_agents(agent)?)
    }
}

const fn rejected(axis: &'static str, candidate: i32) -> DimensionVerdict {
    DimensionVerdict::Rejected { axis, candidate }
}

fn discrepancy(actual: i32, predicted: i32) -> Option<i32> {
    i32::try_from(actual.abs_diff(predicted))
        .ok()
        .filter(|d| *d > 0)
}

/// Combine a candidate with the established value of one axis.
/// `Err` carries a candidate that does not divide the established value.
fn reconcile(candidate: Option<i32>, established: Option<i32>) -> Result<Option<i32>, i32> {
    match (candidate, established) {
        (None, established) => Ok(established),
        (Some(c), None) => Ok(Some(c)),
        (Some(c), Some(e)) if e.checked_rem(c) == Some(0) => Ok(Some(c)),
        (Some(c), Some(_)) => Err(c),
    }
}
