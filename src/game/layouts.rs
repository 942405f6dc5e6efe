//! Built-in Layouts
//!
//! Deterministic board definitions: the docking bay every course starts in
//! and the factory floors it is attached to.

use crate::core::grid::{Direction, Position, Rotation};
use crate::game::board::{Board, RegisterSet, TileKind};

/// Names accepted by [`by_name`].
pub const LAYOUT_NAMES: [&str; 2] = ["training", "factory"];

/// Layout used when none is configured.
pub const DEFAULT_LAYOUT: &str = "training";

const FLOOR_SIZE: i32 = 12;

/// Dock columns in dock-number order (docks 1 and 2 sit in the middle).
const DOCK_COLUMNS: [i32; 8] = [5, 6, 3, 8, 1, 10, 0, 11];

fn p(x: i32, y: i32) -> Position {
    Position::new(x, y)
}

/// 12×4 docking bay with eight north-facing docks on row 2.
pub fn docking_bay() -> Board {
    let mut bay = Board::empty("docking bay", FLOOR_SIZE, 4);

    for x in DOCK_COLUMNS {
        bay = bay.with_start(p(x, 2), Direction::North);
    }

    // Entry belts between dock groups
    for (x, y) in [(2, 0), (2, 1), (9, 0), (9, 1)] {
        bay = bay.with_tile(p(x, y), TileKind::Conveyor { direction: Direction::North });
    }

    bay.with_wall(p(2, 3), Direction::East)
        .with_wall(p(9, 3), Direction::West)
}

/// Empty 12×12 floor with three checkpoints.
pub fn open_floor() -> Board {
    Board::empty("open floor", FLOOR_SIZE, FLOOR_SIZE)
        .with_checkpoint(p(6, 3))
        .with_checkpoint(p(2, 8))
        .with_checkpoint(p(9, 9))
}

/// 12×12 floor with every hazard kind.
pub fn hazard_floor() -> Board {
    let mut floor = Board::empty("hazard floor", FLOOR_SIZE, FLOOR_SIZE);

    // Express line east along row 5, turning north at column 6
    for x in 0..=5 {
        floor = floor.with_tile(p(x, 5), TileKind::ExpressConveyor { direction: Direction::East });
    }
    for y in [4, 5] {
        floor = floor.with_tile(p(6, y), TileKind::ExpressConveyor { direction: Direction::North });
    }

    // Slow belt down column 10
    for y in 0..=6 {
        floor = floor.with_tile(p(10, y), TileKind::Conveyor { direction: Direction::South });
    }

    floor
        .with_tile(p(3, 2), TileKind::Gear { rotation: Rotation::Clockwise })
        .with_tile(p(8, 9), TileKind::Gear { rotation: Rotation::CounterClockwise })
        .with_tile(p(0, 8), TileKind::Pusher { direction: Direction::East, registers: RegisterSet::EVEN })
        .with_tile(p(11, 3), TileKind::Pusher { direction: Direction::West, registers: RegisterSet::ODD })
        .with_tile(p(4, 7), TileKind::Pit)
        .with_tile(p(7, 2), TileKind::Pit)
        .with_tile(p(1, 1), TileKind::Repair)
        .with_tile(p(10, 10), TileKind::Repair)
        .with_tile(p(5, 10), TileKind::Option)
        .with_wall(p(4, 4), Direction::North)
        .with_wall(p(7, 7), Direction::East)
        .with_wall(p(2, 9), Direction::South)
        .with_wall(p(8, 5), Direction::West)
        .with_wall(p(0, 3), Direction::West)
        .with_laser(p(0, 3), Direction::East, 1)
        .with_wall(p(11, 9), Direction::East)
        .with_laser(p(11, 9), Direction::West, 1)
        .with_checkpoint(p(9, 2))
        .with_checkpoint(p(2, 4))
        .with_checkpoint(p(6, 9))
}

/// Look up a complete course (floor plus docking bay) by name.
pub fn by_name(name: &str) -> Option<Board> {
    let floor = match name {
        "training" => open_floor(),
        "factory" => hazard_floor(),
        _ => return None,
    };
    let mut board = Board::compose(&floor, &docking_bay());
    board.name = name.to_string();
    Some(board)
}
