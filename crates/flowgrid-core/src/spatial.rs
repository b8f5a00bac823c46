//! Grid coordinates and the spatial query boundary.
//!
//! The core never owns a world map. Adjacency discovery reads whatever
//! implements [`SpatialQuery`] and treats it as a snapshot for one build.

use crate::id::NodeId;
use serde::{Deserialize, Serialize};

/// A position on the 2D grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

impl GridPosition {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The adjacent cell in `direction`.
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        Self::new(self.x + dx, self.y + dy)
    }

    /// The four cardinal neighbors in [`Direction::all`] order.
    pub fn neighbors(self) -> [GridPosition; 4] {
        Direction::all().map(|d| self.step(d))
    }

    pub fn manhattan_distance(&self, other: &GridPosition) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }
}

/// Cardinal directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub fn all() -> [Direction; 4] {
        [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ]
    }

    pub fn offset(&self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }
}

/// Read-only view of part placement on the grid.
pub trait SpatialQuery {
    /// Every cell covered by `node`'s footprint. Empty when not placed.
    fn cells_occupied_by(&self, node: NodeId) -> Vec<GridPosition>;

    /// Parts covering `cell`. Several parts may share a cell when they
    /// belong to different families (a pipe under a wire).
    fn parts_at(&self, cell: GridPosition) -> Vec<NodeId>;

    /// False for cells outside the map.
    fn is_in_bounds(&self, cell: GridPosition) -> bool;
}
