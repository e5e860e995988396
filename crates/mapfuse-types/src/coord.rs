//! Grid coordinates and compass directions.
//!
//! The server's grid uses screen orientation: `x` grows eastward and `y`
//! grows southward, so moving north decreases `y`. Every coordinate the
//! core stores is relative to some agent's arbitrary root; absolute world
//! positions are never known.
//!
//! Coordinate arithmetic saturates instead of overflowing. Coordinates on a
//! real map never approach `i32` bounds, so saturation is only a guard.

use core::fmt;
use core::ops::{Add, Neg, Sub};
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// A cell coordinate `(x, y)`.
///
/// Serialized as a two-element array, matching the `[dx, dy]` pairs the
/// server uses inside percepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Coord {
    /// Column, growing eastward.
    pub x: i32,
    /// Row, growing southward.
    pub y: i32,
}

impl Coord {
    /// The root of a freshly created graph.
    pub const ORIGIN: Self = Self { x: 0, y: 0 };

    /// Create a coordinate.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Translate by `(dx, dy)`.
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    /// The adjacent coordinate in `direction` (no wraparound).
    pub const fn step(self, direction: Direction) -> Self {
        let delta = direction.delta();
        self.offset(delta.x, delta.y)
    }

    /// Manhattan length of this coordinate treated as an offset.
    pub const fn manhattan(self) -> u32 {
        self.x.unsigned_abs().saturating_add(self.y.unsigned_abs())
    }

    /// Manhattan distance between two coordinates.
    pub const fn distance(self, other: Self) -> u32 {
        self.x
            .abs_diff(other.x)
            .saturating_add(self.y.abs_diff(other.y))
    }

    /// Chebyshev (king-move) distance between two coordinates.
    pub const fn chebyshev(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        if dx > dy { dx } else { dy }
    }

    /// The 8 cells surrounding this one, row by row.
    pub const fn surrounding(self) -> [Self; 8] {
        [
            self.offset(-1, -1),
            self.offset(0, -1),
            self.offset(1, -1),
            self.offset(-1, 0),
            self.offset(1, 0),
            self.offset(-1, 1),
            self.offset(0, 1),
            self.offset(1, 1),
        ]
    }
}

impl Add for Coord {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.offset(rhs.x, rhs.y)
    }
}

impl Sub for Coord {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x.saturating_sub(rhs.x),
            y: self.y.saturating_sub(rhs.y),
        }
    }
}

impl Neg for Coord {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            x: self.x.saturating_neg(),
            y: self.y.saturating_neg(),
        }
    }
}

impl From<(i32, i32)> for Coord {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl From<Coord> for (i32, i32) {
    fn from(c: Coord) -> Self {
        (c.x, c.y)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One of the four compass directions an agent can move in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Toward decreasing `y`.
    #[serde(rename = "n")]
    North,
    /// Toward increasing `x`.
    #[serde(rename = "e")]
    East,
    /// Toward increasing `y`.
    #[serde(rename = "s")]
    South,
    /// Toward decreasing `x`.
    #[serde(rename = "w")]
    West,
}

impl Direction {
    /// All directions in link-slot order: N, E, S, W.
    pub const ALL: [Self; 4] = [Self::North, Self::East, Self::South, Self::West];

    /// Unit offset of one step in this direction.
    pub const fn delta(self) -> Coord {
        match self {
            Self::North => Coord::new(0, -1),
            Self::East => Coord::new(1, 0),
            Self::South => Coord::new(0, 1),
            Self::West => Coord::new(-1, 0),
        }
    }

    /// The direction pointing back.
    pub const fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::West => Self::East,
        }
    }

    /// Index of this direction's link slot on a node.
    pub const fn slot(self) -> usize {
        match self {
            Self::North => 0,
            Self::East => 1,
            Self::South => 2,
            Self::West => 3,
        }
    }

    /// The single-letter form used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::North => "n",
            Self::East => "e",
            Self::South => "s",
            Self::West => "w",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of `n`, `e`, `s`, `w`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid direction: {0:?}")]
pub struct ParseDirectionError(pub String);

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "n" => Ok(Self::North),
            "e" => Ok(Self::East),
            "s" => Ok(Self::South),
            "w" => Ok(Self::West),
            other => Err(ParseDirectionError(other.to_owned())),
        }
    }
}
