//! Grid Geometry
//!
//! Integer cell positions and the four compass headings robots can face.
//! Row `y` grows southwards, so the docking bay sits below the factory floor.

use std::fmt;
use serde::{Serialize, Deserialize};

/// A cell on the board.
///
/// Coordinates are signed so that stepping off the board is representable;
/// bounds are checked by [`crate::game::board::Board::contains`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column, 0 = west edge.
    pub x: i32,
    /// Row, 0 = north edge.
    pub y: i32,
}

impl Position {
    /// Create a position.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell in `direction`.
    #[inline]
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Translate by a vertical offset (used when composing boards).
    #[inline]
    pub fn offset_y(self, dy: i32) -> Self {
        Self { x: self.x, y: self.y + dy }
    }

    /// Manhattan distance to another cell.
    #[inline]
    pub fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Facing of a robot or orientation of a board element.
///
/// Serialized as its index (0 = north, 1 = east, 2 = south, 3 = west).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Direction {
    #[default]
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Direction {
    /// All headings in index order.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Get direction from index (0-3).
    pub fn from_index(index: u8) -> Option<Direction> {
        match index {
            0 => Some(Direction::North),
            1 => Some(Direction::East),
            2 => Some(Direction::South),
            3 => Some(Direction::West),
            _ => None,
        }
    }

    /// Cell delta for one step in this direction.
    #[inline]
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }

    /// 90° clockwise.
    #[inline]
    pub fn turn_right(self) -> Self {
        Self::ALL[(self as usize + 1) % 4]
    }

    /// 90° counter-clockwise.
    #[inline]
    pub fn turn_left(self) -> Self {
        Self::ALL[(self as usize + 3) % 4]
    }

    /// 180°.
    #[inline]
    pub fn opposite(self) -> Self {
        Self::ALL[(self as usize + 2) % 4]
    }
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> u8 {
        direction as u8
    }
}

impl TryFrom<u8> for Direction {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Direction::from_index(value).ok_or_else(|| format!("invalid direction index {value}"))
    }
}

/// Sense of a quarter turn (gears, rotation cards).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
}

impl Rotation {
    /// Apply this rotation to a heading.
    #[inline]
    pub fn apply(self, direction: Direction) -> Direction {
        match self {
            Rotation::Clockwise => direction.turn_right(),
            Rotation::CounterClockwise => direction.turn_left(),
        }
    }
}
