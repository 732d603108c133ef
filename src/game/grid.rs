//! Grid geometry
//!
//! Pure functions over cell coordinates. Everything else in the engine
//! goes through [`Grid`] for indexing and bounds checks.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::constants::grid::{COLS, ROWS};

/// A single grid cell. Signed so offsets can be computed before bounds checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Cell one step away in `direction` (may be out of bounds)
    #[inline]
    pub fn offset(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self::new(self.x + dx, self.y + dy)
    }

    /// Manhattan distance between two cells
    #[inline]
    pub fn manhattan(self, other: Cell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

/// Movement direction as sent over the wire (`U`, `D`, `L`, `R`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Unit offset for this direction (y grows downward)
    #[inline]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Wire letter
    pub const fn as_char(self) -> char {
        match self {
            Direction::Up => 'U',
            Direction::Down => 'D',
            Direction::Left => 'L',
            Direction::Right => 'R',
        }
    }

    /// Parse a wire letter
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "U" => Some(Direction::Up),
            "D" => Some(Direction::Down),
            "L" => Some(Direction::Left),
            "R" => Some(Direction::Right),
            _ => None,
        }
    }
}

/// Neighbour offsets in scan order: dx ascending, then dy ascending
const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1), (-1, 0), (-1, 1),
    ( 0, -1),          ( 0, 1),
    ( 1, -1), ( 1, 0), ( 1, 1),
];

/// Grid dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    pub cols: i32,
    pub rows: i32,
}

impl Grid {
    pub const fn new(cols: i32, rows: i32) -> Self {
        Self { cols, rows }
    }

    /// Row-major linear index (`x + y * cols`). Only meaningful for in-bounds cells.
    #[inline]
    pub fn to_index(&self, cell: Cell) -> usize {
        debug_assert!(self.in_bounds(cell), "to_index on out-of-bounds cell {:?}", cell);
        (cell.x + cell.y * self.cols) as usize
    }

    #[inline]
    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.x < self.cols && cell.y >= 0 && cell.y < self.rows
    }

    /// In-bounds cells around `cell` (centre excluded) in fixed scan order
    pub fn neighbors8(&self, cell: Cell) -> SmallVec<[Cell; 8]> {
        NEIGHBOR_OFFSETS
            .iter()
            .map(|&(dx, dy)| Cell::new(cell.x + dx, cell.y + dy))
            .filter(|c| self.in_bounds(*c))
            .collect()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(COLS, ROWS)
    }
}
