//! Priority queue with keyed removal.
//!
//! D*-Lite needs to re-prioritise and remove arbitrary nodes, which
//! `BinaryHeap` cannot do. Like the world-map Dijkstra, this uses an ordered
//! `BTreeSet<(key, node)>`, plus an index from node to its current key so an
//! entry can be found and removed.

use core::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use mapfuse_types::Coord;

/// Lexicographic D*-Lite priority.
#[derive(Debug, Clone, Copy)]
pub struct Key {
    /// `min(g, rhs) + h + km`.
    pub primary: f64,
    /// `min(g, rhs)`.
    pub secondary: f64,
}

impl Key {
    /// Create a key.
    pub const fn new(primary: f64, secondary: f64) -> Self {
        Self { primary, secondary }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.primary
            .total_cmp(&other.primary)
            .then_with(|| self.secondary.total_cmp(&other.secondary))
    }
}

/// Min-priority queue of coordinates.
#[derive(Debug, Clone, Default)]
pub struct KeyedQueue {
    order: BTreeSet<(Key, Coord)>,
    index: BTreeMap<Coord, Key>,
}

impl KeyedQueue {
    /// An empty queue.
    pub const fn new() -> Self {
        Self {
            order: BTreeSet::new(),
            index: BTreeMap::new(),
        }
    }

    /// Insert `node`, replacing any existing entry.
    pub fn insert(&mut self, node: Coord, key: Key) {
        if let Some(old) = self.index.insert(node, key) {
            self.order.remove(&(old, node));
        }
        self.order.insert((key, node));
    }

    /// Remove `node` if queued.
    pub fn remove(&mut self, node: Coord) -> bool {
        match self.index.remove(&node) {
            Some(key) => self.order.remove(&(key, node)),
            None => false,
        }
    }

    /// The lowest entry.
    pub fn peek(&self) -> Option<(Key, Coord)> {
        self.order.first().copied()
    }

    /// Remove and return the lowest entry.
    pub fn pop(&mut self) -> Option<(Key, Coord)> {
        let entry = self.order.pop_first()?;
        self.index.remove(&entry.1);
        Some(entry)
    }

    /// Whether `node` is queued.
    pub fn contains(&self, node: Coord) -> bool {
        self.index.contains_key(&node)
    }

    /// Number of queued nodes.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
