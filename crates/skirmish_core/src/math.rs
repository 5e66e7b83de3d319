//! Integer grid math for deterministic simulation.
//!
//! All map positions are whole cells. Distances are compared squared so no
//! floating-point value ever reaches the simulation, keeping lockstep peers
//! bit-identical.

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// A cell coordinate on the map grid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct GridPos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl GridPos {
    /// Origin cell.
    pub const ZERO: Self = Self { x: 0, y: 0 };

    /// Create a new grid position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance (exact, no sqrt).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        dx * dx + dy * dy
    }

    /// True if `other` is strictly closer than `radius` cells.
    #[must_use]
    pub fn within(self, other: Self, radius: i32) -> bool {
        let r = i64::from(radius);
        self.distance_squared(other) < r * r
    }

    /// Chebyshev (king-move) distance.
    #[must_use]
    pub fn chebyshev(self, other: Self) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    /// One cell step from `self` toward `target`, diagonal allowed.
    #[must_use]
    pub fn step_toward(self, target: Self) -> Self {
        Self {
            x: self.x + (target.x - self.x).signum(),
            y: self.y + (target.y - self.y).signum(),
        }
    }
}

impl Add for GridPos {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for GridPos {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::fmt::Display for GridPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Facing used for build commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CardinalDir {
    /// Facing up the map.
    #[default]
    North,
    /// Facing right.
    East,
    /// Facing down the map.
    South,
    /// Facing left.
    West,
}
