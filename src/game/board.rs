//! Board Model
//!
//! Static description of a race course: tiles, walls, lasers, ordered
//! checkpoints and docks. A board never changes once a game has started;
//! robots live in [`crate::game::state::Player`], not here.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::grid::{Direction, Position, Rotation};

/// Registers (1-based) on which a pusher fires, as a bitmask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<u8>", into = "Vec<u8>")]
pub struct RegisterSet(u8);

impl RegisterSet {
    /// Registers 1, 3 and 5.
    pub const ODD: RegisterSet = RegisterSet(0b10101);
    /// Registers 2 and 4.
    pub const EVEN: RegisterSet = RegisterSet(0b01010);

    /// Build from 1-based register numbers; out-of-range numbers are dropped.
    pub fn from_registers(registers: &[u8]) -> Self {
        let mut mask = 0u8;
        for &r in registers {
            if (1..=5).contains(&r) {
                mask |= 1 << (r - 1);
            }
        }
        RegisterSet(mask)
    }

    /// Whether the pusher is active in the given 0-based register.
    pub fn contains(self, register_index: u8) -> bool {
        register_index < 5 && self.0 & (1 << register_index) != 0
    }
}

impl From<Vec<u8>> for RegisterSet {
    fn from(registers: Vec<u8>) -> Self {
        RegisterSet::from_registers(&registers)
    }
}

impl From<RegisterSet> for Vec<u8> {
    fn from(set: RegisterSet) -> Vec<u8> {
        (0..5u8).filter(|&i| set.contains(i)).map(|i| i + 1).collect()
    }
}

/// Kind of a board cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TileKind {
    /// Plain floor
    #[default]
    Empty,
    /// Robots entering are destroyed
    Pit,
    /// Repairs one damage at cleanup
    Repair,
    /// Repairs one damage and draws an option card at cleanup
    Option,
    /// Moves a robot one cell per register
    Conveyor {
        /// Belt output direction
        direction: Direction,
    },
    /// Moves a robot in both conveyor passes
    ExpressConveyor {
        /// Belt output direction
        direction: Direction,
    },
    /// Rotates a robot a quarter turn
    Gear {
        /// Turn sense
        rotation: Rotation,
    },
    /// Shoves a robot one cell on selected registers
    Pusher {
        /// Push direction
        direction: Direction,
        /// Active registers
        registers: RegisterSet,
    },
}

impl TileKind {
    /// Belt direction for either conveyor kind.
    pub fn conveyor_direction(self) -> Option<Direction> {
        match self {
            TileKind::Conveyor { direction } | TileKind::ExpressConveyor { direction } => Some(direction),
            _ => None,
        }
    }

    /// True for express belts.
    pub fn is_express(self) -> bool {
        matches!(self, TileKind::ExpressConveyor { .. })
    }
}

/// A non-empty cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Cell
    pub position: Position,
    /// What is on the cell
    pub kind: TileKind,
}

/// A wall segment on one side of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wall {
    /// Cell the wall belongs to
    pub position: Position,
    /// Side of the cell
    pub side: Direction,
}

/// A wall-mounted laser emitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Laser {
    /// Emitter cell (the beam covers it)
    pub position: Position,
    /// Beam direction
    pub direction: Direction,
    /// Damage per hit
    pub strength: u8,
}

/// A numbered checkpoint flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// 1-based order
    pub number: u8,
    /// Cell
    pub position: Position,
}

/// A dock in the docking bay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingPosition {
    /// Dock number, 1-based
    pub number: u8,
    /// Cell
    pub position: Position,
    /// Facing on entry
    pub direction: Direction,
}

/// Board validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("board dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },

    #[error("checkpoints must be numbered 1..={count} exactly once, found {found:?}")]
    CheckpointSequence { count: usize, found: Vec<u8> },

    #[error("{what} at {position} is outside the board")]
    OutOfBounds { what: &'static str, position: Position },

    #[error("duplicate starting position number {0}")]
    DuplicateStart(u8),

    #[error("board has no starting positions")]
    NoStartingPositions,
}

/// A composed race course.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    /// Layout name
    pub name: String,
    /// Columns
    pub width: i32,
    /// Rows
    pub height: i32,
    /// Non-empty cells
    pub tiles: Vec<Tile>,
    /// Wall segments
    pub walls: Vec<Wall>,
    /// Board lasers
    pub lasers: Vec<Laser>,
    /// Flags in race order
    pub checkpoints: Vec<Checkpoint>,
    /// Docks
    pub starting_positions: Vec<StartingPosition>,
}

impl Board {
    /// An empty board of the given size.
    pub fn empty(name: impl Into<String>, width: i32, height: i32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            tiles: Vec::new(),
            walls: Vec::new(),
            lasers: Vec::new(),
            checkpoints: Vec::new(),
            starting_positions: Vec::new(),
        }
    }

    /// Add (or replace) a tile.
    pub fn with_tile(mut self, position: Position, kind: TileKind) -> Self {
        self.tiles.retain(|t| t.position != position);
        self.tiles.push(Tile { position, kind });
        self
    }

    /// Add a wall on one side of a cell.
    pub fn with_wall(mut self, position: Position, side: Direction) -> Self {
        self.walls.push(Wall { position, side });
        self
    }

    /// Add a board laser.
    pub fn with_laser(mut self, position: Position, direction: Direction, strength: u8) -> Self {
        self.lasers.push(Laser { position, direction, strength });
        self
    }

    /// Append the next checkpoint.
    pub fn with_checkpoint(mut self, position: Position) -> Self {
        let number = self.checkpoints.len() as u8 + 1;
        self.checkpoints.push(Checkpoint { number, position });
        self
    }

    /// Append the next dock.
    pub fn with_start(mut self, position: Position, direction: Direction) -> Self {
        let number = self.starting_positions.len() as u8 + 1;
        self.starting_positions.push(StartingPosition { number, position, direction });
        self
    }

    /// Whether the cell is on the board.
    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    /// Tile kind at a cell: `None` off the board, `Empty` when unspecified.
    pub fn tile_at(&self, pos: Position) -> Option<TileKind> {
        if !self.contains(pos) {
            return None;
        }
        Some(
            self.tiles
                .iter()
                .find(|t| t.position == pos)
                .map(|t| t.kind)
                .unwrap_or_default(),
        )
    }

    /// Whether a wall sits on `side` of `pos`.
    pub fn has_wall(&self, pos: Position, side: Direction) -> bool {
        self.walls.iter().any(|w| w.position == pos && w.side == side)
    }

    /// Whether leaving `from` towards `heading` is impossible.
    ///
    /// Blocked by a wall on the leaving side, a wall on the entering side of
    /// the neighbour, or the neighbour being off the board.
    pub fn is_blocked(&self, from: Position, heading: Direction) -> bool {
        let to = from.step(heading);
        self.has_wall(from, heading)
            || self.has_wall(to, heading.opposite())
            || !self.contains(to)
    }

    /// Checkpoint number on a cell, if any.
    pub fn checkpoint_at(&self, pos: Position) -> Option<u8> {
        self.checkpoints.iter().find(|c| c.position == pos).map(|c| c.number)
    }

    /// Number of checkpoints.
    pub fn checkpoint_count(&self) -> u8 {
        self.checkpoints.len() as u8
    }

    /// Dock by number.
    pub fn starting_position(&self, number: u8) -> Option<&StartingPosition> {
        self.starting_positions.iter().find(|s| s.number == number)
    }

    /// Dock occupying a cell, if any.
    pub fn starting_position_at(&self, pos: Position) -> Option<&StartingPosition> {
        self.starting_positions.iter().find(|s| s.position == pos)
    }

    /// Stack a factory floor on top of a docking bay.
    ///
    /// Bay items are shifted down by the floor height. The result is as wide
    /// as the wider part and as tall as both together.
    pub fn compose(floor: &Board, bay: &Board) -> Board {
        let dy = floor.height;

        let mut tiles = floor.tiles.clone();
        tiles.extend(bay.tiles.iter().map(|t| Tile {
            position: t.position.offset_y(dy),
            kind: t.kind,
        }));

        let mut walls = floor.walls.clone();
        walls.extend(bay.walls.iter().map(|w| Wall {
            position: w.position.offset_y(dy),
            side: w.side,
        }));

        let mut lasers = floor.lasers.clone();
        lasers.extend(bay.lasers.iter().map(|l| Laser {
            position: l.position.offset_y(dy),
            ..*l
        }));

        let mut checkpoints = floor.checkpoints.clone();
        checkpoints.extend(bay.checkpoints.iter().map(|c| Checkpoint {
            position: c.position.offset_y(dy),
            ..*c
        }));

        let mut starting_positions = floor.starting_positions.clone();
        starting_positions.extend(bay.starting_positions.iter().map(|s| StartingPosition {
            position: s.position.offset_y(dy),
            ..*s
        }));

        Board {
            name: format!("{} + {}", floor.name, bay.name),
            width: floor.width.max(bay.width),
            height: floor.height + bay.height,
            tiles,
            walls,
            lasers,
            checkpoints,
            starting_positions,
        }
    }

    /// Check structural consistency.
    pub fn validate(&self) -> Result<(), BoardError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(BoardError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }

        let mut numbers: Vec<u8> = self.checkpoints.iter().map(|c| c.number).collect();
        numbers.sort_unstable();
        let expected: Vec<u8> = (1..=self.checkpoints.len() as u8).collect();
        if numbers != expected {
            return Err(BoardError::CheckpointSequence {
                count: self.checkpoints.len(),
                found: numbers,
            });
        }

        if self.starting_positions.is_empty() {
            return Err(BoardError::NoStartingPositions);
        }

        let mut seen = Vec::with_capacity(self.starting_positions.len());
        for start in &self.starting_positions {
            if seen.contains(&start.number) {
                return Err(BoardError::DuplicateStart(start.number));
            }
            seen.push(start.number);
        }

        let cells = self.tiles.iter().map(|t| ("tile", t.position))
            .chain(self.walls.iter().map(|w| ("wall", w.position)))
            .chain(self.lasers.iter().map(|l| ("laser", l.position)))
            .chain(self.checkpoints.iter().map(|c| ("checkpoint", c.position)))
            .chain(self.starting_positions.iter().map(|s| ("starting position", s.position)));

        for (what, position) in cells {
            if !self.contains(position) {
                return Err(BoardError::OutOfBounds { what, position });
            }
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
