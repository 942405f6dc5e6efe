//! Movement & Hazard Resolution
//!
//! One register resolves in fixed steps:
//!
//! 1. Program cards, highest priority first. Moves go one cell at a time and
//!    push whole chains of robots.
//! 2. Express conveyors (twice), then regular conveyors.
//! 3. Gears.
//! 4. Pushers active in this register.
//! 5. Board and robot lasers, fired together from one position snapshot.
//!
//! Checkpoints and destruction are booked afterwards by the round module.

use tracing::trace;

use crate::core::grid::{Direction, Position};
use crate::game::board::TileKind;
use crate::game::cards::{CardType, ProgramCard};
use crate::game::damage;
use crate::game::events::{GameEventData, LaserSource, MoveCause};
use crate::game::options;
use crate::game::power;
use crate::game::state::Game;

/// A laser beam that ended on a robot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaserHit {
    /// Index of the robot hit
    pub target: usize,
    /// Emitter
    pub source: LaserSource,
    /// Damage before absorption
    pub damage: u8,
}

// =============================================================================
// PROGRAM CARDS
// =============================================================================

/// Execute every programmed card of a register in descending priority.
pub fn execute_cards(game: &mut Game, register: usize) {
    let mut order: Vec<(usize, ProgramCard)> = game
        .players
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.eliminated && p.is_on_board() && power::executes_cards(p))
        .filter_map(|(i, p)| p.selected_cards.get(register).copied().flatten().map(|c| (i, c)))
        .collect();
    order.sort_by(|a, b| b.1.priority.cmp(&a.1.priority));

    for (index, card) in order {
        // Pushed into a pit by an earlier card
        if !game.players[index].is_on_board() {
            continue;
        }
        let player_id = game.players[index].id;
        game.push_event(GameEventData::CardPlayed { player_id, card });
        execute_card(game, index, card.card_type);
    }
}

/// Apply one card to one robot.
pub fn execute_card(game: &mut Game, index: usize, card_type: CardType) {
    let facing = game.players[index].direction;
    match card_type {
        CardType::RotateLeft => rotate(game, index, facing.turn_left()),
        CardType::RotateRight => rotate(game, index, facing.turn_right()),
        CardType::UTurn => rotate(game, index, facing.opposite()),
        CardType::Move1 | CardType::Move2 | CardType::Move3 | CardType::BackUp => {
            let distance = card_type.distance();
            let heading = if distance < 0 { facing.opposite() } else { facing };
            for _ in 0..distance.unsigned_abs() {
                if !try_move(game, index, heading, MoveCause::Card) {
                    break;
                }
                if !game.players[index].is_on_board() {
                    break;
                }
            }
        }
    }
}

fn rotate(game: &mut Game, index: usize, direction: Direction) {
    let player = &mut game.players[index];
    player.direction = direction;
    let player_id = player.id;
    game.push_event(GameEventData::RobotRotated { player_id, direction });
}

/// Robots that would move if `index` stepped towards `heading`, mover first.
///
/// `None` when a wall or the board edge stops the mover or any robot in the
/// chain.
pub fn push_chain(game: &Game, index: usize, heading: Direction) -> Option<Vec<usize>> {
    let board = game.board.as_ref()?;
    let mut cell = game.players[index].position?;
    let mut chain = vec![index];

    loop {
        if board.is_blocked(cell, heading) {
            return None;
        }
        let next = cell.step(heading);
        match game.robot_at(next) {
            Some(other) => {
                chain.push(other);
                cell = next;
            }
            None => return Some(chain),
        }
    }
}

/// Step one cell, pushing any robots in the way. Returns false when blocked.
pub fn try_move(game: &mut Game, index: usize, heading: Direction, cause: MoveCause) -> bool {
    let Some(chain) = push_chain(game, index, heading) else {
        return false;
    };
    // Far end first so every destination is already vacated
    for &robot in chain.iter().rev() {
        let robot_cause = if robot == index { cause } else { MoveCause::Pushed };
        shift(game, robot, heading, robot_cause);
    }
    true
}

/// Move a robot one cell without any checks, then apply pits.
fn shift(game: &mut Game, index: usize, heading: Direction, cause: MoveCause) {
    let Some(from) = game.players[index].position else {
        return;
    };
    let to = from.step(heading);
    relocate(game, index, from, to, cause);
}

fn relocate(game: &mut Game, index: usize, from: Position, to: Position, cause: MoveCause) {
    game.players[index].position = Some(to);
    let player_id = game.players[index].id;
    game.push_event(GameEventData::RobotMoved { player_id, from, to, cause });

    let in_pit = game
        .board
        .as_ref()
        .and_then(|b| b.tile_at(to))
        .map_or(false, |t| t == TileKind::Pit);
    if in_pit {
        damage::fall_into_pit(game, index);
    }
}

// =============================================================================
// BOARD ELEMENTS
// =============================================================================

#[derive(Clone, Copy, Debug)]
struct BeltMove {
    index: usize,
    from: Position,
    to: Position,
    heading: Direction,
    active: bool,
}

/// Run one conveyor pass (express belts only, or regular belts only).
///
/// All belt moves are simultaneous. A move is cancelled when another move
/// targets the same cell, when the target holds a robot that is not itself
/// moving, or when two robots would swap cells. Cancelling can block further
/// moves, so the check repeats until nothing changes.
pub fn run_conveyors(game: &mut Game, express: bool) {
    let Some(board) = game.board.as_ref() else {
        return;
    };

    let mut moves: Vec<BeltMove> = Vec::new();
    for (index, player) in game.players.iter().enumerate() {
        let Some(pos) = player.position else { continue };
        let Some(tile) = board.tile_at(pos) else { continue };
        let Some(heading) = tile.conveyor_direction() else { continue };
        if tile.is_express() != express || board.is_blocked(pos, heading) {
            continue;
        }
        moves.push(BeltMove {
            index,
            from: pos,
            to: pos.step(heading),
            heading,
            active: true,
        });
    }

    loop {
        let cancelled: Vec<usize> = (0..moves.len())
            .filter(|&i| moves[i].active)
            .filter(|&i| {
                let m = moves[i];
                let contested = moves
                    .iter()
                    .enumerate()
                    .any(|(j, o)| j != i && o.active && o.to == m.to);
                let swap = moves.iter().any(|o| o.active && o.from == m.to && o.to == m.from);
                let blocked = game
                    .robot_at(m.to)
                    .map_or(false, |occupant| !moves.iter().any(|o| o.active && o.index == occupant));
                contested || swap || blocked
            })
            .collect();

        if cancelled.is_empty() {
            break;
        }
        for i in cancelled {
            moves[i].active = false;
        }
    }

    let arrivals: Vec<(BeltMove, Option<Direction>)> = moves
        .into_iter()
        .filter(|m| m.active)
        .map(|m| (m, board.tile_at(m.to).and_then(|t| t.conveyor_direction())))
        .collect();

    for (m, next_belt) in arrivals {
        game.players[m.index].position = Some(m.to);
        let player_id = game.players[m.index].id;
        game.push_event(GameEventData::RobotMoved {
            player_id,
            from: m.from,
            to: m.to,
            cause: MoveCause::Conveyor,
        });

        // Arriving on a belt that turns rotates the robot with it
        if let Some(belt) = next_belt {
            let facing = game.players[m.index].direction;
            if belt == m.heading.turn_right() {
                rotate(game, m.index, facing.turn_right());
            } else if belt == m.heading.turn_left() {
                rotate(game, m.index, facing.turn_left());
            }
        }

        let in_pit = game.board.as_ref().and_then(|b| b.tile_at(m.to)) == Some(TileKind::Pit);
        if in_pit {
            damage::fall_into_pit(game, m.index);
        }
    }
}

/// Fire pushers configured for this register (0-based).
///
/// A pusher only moves a robot into a free, reachable cell.
pub fn run_pushers(game: &mut Game, register: u8) {
    for index in 0..game.players.len() {
        let push = {
            let Some(board) = game.board.as_ref() else { return };
            let Some(pos) = game.players[index].position else { continue };
            match board.tile_at(pos) {
                Some(TileKind::Pusher { direction, registers }) if registers.contains(register) => {
                    let free = !board.is_blocked(pos, direction) && game.robot_at(pos.step(direction)).is_none();
                    free.then_some((pos, direction))
                }
                _ => None,
            }
        };
        if let Some((from, direction)) = push {
            trace!(index, ?direction, "pusher fired");
            relocate(game, index, from, from.step(direction), MoveCause::Pusher);
        }
    }
}

/// Rotate every robot standing on a gear.
pub fn run_gears(game: &mut Game) {
    for index in 0..game.players.len() {
        let turn = game.players[index].position.and_then(|pos| {
            match game.board.as_ref().and_then(|b| b.tile_at(pos)) {
                Some(TileKind::Gear { rotation }) => Some(rotation),
                _ => None,
            }
        });
        if let Some(rotation) = turn {
            let facing = game.players[index].direction;
            rotate(game, index, rotation.apply(facing));
        }
    }
}

// =============================================================================
// LASERS
// =============================================================================

/// Follow a beam until it hits a robot or is stopped by a wall or the edge.
fn trace_beam(game: &Game, start: Position, direction: Direction, covers_start: bool) -> Option<usize> {
    let board = game.board.as_ref()?;
    if covers_start {
        if let Some(hit) = game.robot_at(start) {
            return Some(hit);
        }
    }

    let mut cell = start;
    loop {
        if board.is_blocked(cell, direction) {
            return None;
        }
        cell = cell.step(direction);
        if let Some(hit) = game.robot_at(cell) {
            return Some(hit);
        }
    }
}

/// Compute all laser hits for the current positions.
///
/// Board lasers cover their emitter cell. Robots fire forward from the next
/// cell, and powered-down robots do not fire.
pub fn fire_lasers(game: &Game) -> Vec<LaserHit> {
    let Some(board) = game.board.as_ref() else {
        return Vec::new();
    };
    let mut hits = Vec::new();

    for laser in &board.lasers {
        if let Some(target) = trace_beam(game, laser.position, laser.direction, true) {
            hits.push(LaserHit {
                target,
                source: LaserSource::Board { position: laser.position },
                damage: laser.strength,
            });
        }
    }

    for player in &game.players {
        let Some(pos) = player.position else { continue };
        if player.eliminated || !power::fires_laser(player) {
            continue;
        }
        if let Some(target) = trace_beam(game, pos, player.direction, false) {
            hits.push(LaserHit {
                target,
                source: LaserSource::Robot { player_id: player.id },
                damage: options::robot_laser_damage(player),
            });
        }
    }

    hits
}

/// Apply laser hits: passive absorption per hit, then one damage-prevention
/// window (or direct damage) per robot.
pub fn resolve_hits(game: &mut Game, hits: Vec<LaserHit>) {
    let mut totals = vec![0u8; game.players.len()];

    for hit in hits {
        let player_id = game.players[hit.target].id;
        game.push_event(GameEventData::LaserHit {
            player_id,
            source: hit.source,
            damage: hit.damage,
        });
        let rest = options::absorb_hit(game, hit.target, hit.damage);
        totals[hit.target] = totals[hit.target].saturating_add(rest);
    }

    for (index, total) in totals.into_iter().enumerate() {
        if total > 0 {
            options::open_window(game, index, total);
        }
    }
}

// =============================================================================
// CHECKPOINTS
// =============================================================================

/// Advance checkpoint counters for robots on their next checkpoint.
///
/// Returns the indices of robots that just reached the last checkpoint.
pub fn touch_checkpoints(game: &mut Game) -> Vec<usize> {
    let Some(board) = game.board.as_ref() else {
        return Vec::new();
    };
    let last = board.checkpoint_count();

    let reached: Vec<(usize, u8)> = game
        .players
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.eliminated && !p.destroyed_this_register)
        .filter_map(|(i, p)| {
            let number = board.checkpoint_at(p.position?)?;
            (number == p.checkpoints_visited + 1).then_some((i, number))
        })
        .collect();

    let mut finishers = Vec::new();
    for (index, number) in reached {
        game.players[index].checkpoints_visited = number;
        let player_id = game.players[index].id;
        game.push_event(GameEventData::CheckpointReached { player_id, number });
        if number == last {
            finishers.push(index);
        }
    }
    finishers
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::Rotation;
    use crate::game::board::{Board, RegisterSet};
    use crate::game::options::{OptionCard, OptionType};
    use crate::game::state::{GameRules, Phase, Player, PlayerId, PowerState};

    fn p(x: i32, y: i32) -> Position {
        Position::new(x, y)
    }

    fn arena(board: Board, robots: &[(Position, Direction)]) -> Game {
        let mut game = Game::new("MOVE01", GameRules::default(), 3);
        game.board = Some(board);
        for (i, (pos, dir)) in robots.iter().enumerate() {
            let mut player = Player::new(PlayerId::new([i as u8 + 1; 16]), format!("r{i}"), 3);
            player.position = Some(*pos);
            player.direction = *dir;
            game.players.push(player);
        }
        game.phase = Phase::Executing;
        game
    }

    fn open(w: i32, h: i32) -> Board {
        Board::empty("open", w, h).with_start(p(0, 0), Direction::North)
    }

    fn pos(game: &Game, i: usize) -> Option<Position> {
        game.players[i].position
    }

    #[test]
    fn test_move_three_stops_at_edge() {
        let mut game = arena(open(5, 5), &[(p(2, 1), Direction::North)]);
        execute_card(&mut game, 0, CardType::Move3);
        assert_eq!(pos(&game, 0), Some(p(2, 0)));
    }

    #[test]
    fn test_back_up_keeps_facing() {
        let mut game = arena(open(5, 5), &[(p(2, 2), Direction::East)]);
        execute_card(&mut game, 0, CardType::BackUp);
        assert_eq!(pos(&game, 0), Some(p(1, 2)));
        assert_eq!(game.players[0].direction, Direction::East);
    }

    #[test]
    fn test_rotations() {
        let mut game = arena(open(5, 5), &[(p(2, 2), Direction::North)]);
        execute_card(&mut game, 0, CardType::RotateRight);
        assert_eq!(game.players[0].direction, Direction::East);
        execute_card(&mut game, 0, CardType::UTurn);
        assert_eq!(game.players[0].direction, Direction::West);
        execute_card(&mut game, 0, CardType::RotateLeft);
        assert_eq!(game.players[0].direction, Direction::South);
        assert_eq!(pos(&game, 0), Some(p(2, 2)));
    }

    #[test]
    fn test_wall_blocks_movement() {
        let board = open(5, 5).with_wall(p(2, 1), Direction::South);
        let mut game = arena(board, &[(p(2, 3), Direction::North)]);
        execute_card(&mut game, 0, CardType::Move3);
        // Wall sits between (2,1) and (2,2)
        assert_eq!(pos(&game, 0), Some(p(2, 2)));
    }

    #[test]
    fn test_chain_push() {
        let mut game = arena(
            open(6, 1),
            &[(p(0, 0), Direction::East), (p(1, 0), Direction::North), (p(2, 0), Direction::South)],
        );
        execute_card(&mut game, 0, CardType::Move2);
        assert_eq!(pos(&game, 0), Some(p(2, 0)));
        assert_eq!(pos(&game, 1), Some(p(3, 0)));
        assert_eq!(pos(&game, 2), Some(p(4, 0)));
        // Pushed robots keep their facing
        assert_eq!(game.players[1].direction, Direction::North);
    }

    #[test]
    fn test_chain_push_blocked_at_far_end() {
        let board = open(6, 1).with_wall(p(2, 0), Direction::East);
        let mut game = arena(board, &[(p(0, 0), Direction::East), (p(1, 0), Direction::North), (p(2, 0), Direction::North)]);
        execute_card(&mut game, 0, CardType::Move1);
        assert_eq!(pos(&game, 0), Some(p(0, 0)));
        assert_eq!(pos(&game, 1), Some(p(1, 0)));
        assert_eq!(pos(&game, 2), Some(p(2, 0)));
    }

    #[test]
    fn test_push_into_pit_destroys() {
        let board = open(4, 1).with_tile(p(2, 0), TileKind::Pit);
        let mut game = arena(board, &[(p(0, 0), Direction::East), (p(1, 0), Direction::North)]);
        execute_card(&mut game, 0, CardType::Move1);
        assert_eq!(pos(&game, 0), Some(p(1, 0)));
        assert_eq!(pos(&game, 1), None);
        assert!(game.players[1].destroyed_this_register);
    }

    #[test]
    fn test_moving_into_pit_stops_the_card() {
        let board = open(5, 1).with_tile(p(1, 0), TileKind::Pit);
        let mut game = arena(board, &[(p(0, 0), Direction::East)]);
        execute_card(&mut game, 0, CardType::Move3);
        assert_eq!(pos(&game, 0), None);
        assert!(game.players[0].destroyed_this_register);
    }

    #[test]
    fn test_cards_run_in_priority_order() {
        // Both head for (1,0); the higher priority arrives first and is pushed back
        let mut game = arena(open(3, 1), &[(p(0, 0), Direction::East), (p(2, 0), Direction::West)]);
        game.players[0].selected_cards[0] = ProgramCard::standard(500);
        game.players[1].selected_cards[0] = ProgramCard::standard(510);
        execute_cards(&mut game, 0);
        assert_eq!(pos(&game, 0), Some(p(1, 0)));
        assert_eq!(pos(&game, 1), Some(p(2, 0)));

        // Swapped priorities: r0 moves first and r1 shoves it back
        let mut game = arena(open(3, 1), &[(p(0, 0), Direction::East), (p(2, 0), Direction::West)]);
        game.players[0].selected_cards[0] = ProgramCard::standard(510);
        game.players[1].selected_cards[0] = ProgramCard::standard(500);
        execute_cards(&mut game, 0);
        assert_eq!(pos(&game, 0), Some(p(0, 0)));
        assert_eq!(pos(&game, 1), Some(p(1, 0)));
    }

    #[test]
    fn test_off_robot_does_not_execute() {
        let mut game = arena(open(3, 3), &[(p(1, 2), Direction::North)]);
        game.players[0].power_state = PowerState::Off;
        game.players[0].selected_cards[0] = ProgramCard::standard(500);
        execute_cards(&mut game, 0);
        assert_eq!(pos(&game, 0), Some(p(1, 2)));
    }

    #[test]
    fn test_conveyor_moves_and_turns() {
        let board = open(4, 4)
            .with_tile(p(0, 1), TileKind::Conveyor { direction: Direction::East })
            .with_tile(p(1, 1), TileKind::Conveyor { direction: Direction::South });
        let mut game = arena(board, &[(p(0, 1), Direction::North)]);
        run_conveyors(&mut game, false);
        assert_eq!(pos(&game, 0), Some(p(1, 1)));
        // East belt feeding a south belt is a right turn
        assert_eq!(game.players[0].direction, Direction::East);
    }

    #[test]
    fn test_conveyor_train_moves_together() {
        let board = open(4, 1)
            .with_tile(p(0, 0), TileKind::Conveyor { direction: Direction::East })
            .with_tile(p(1, 0), TileKind::Conveyor { direction: Direction::East });
        let mut game = arena(board, &[(p(0, 0), Direction::North), (p(1, 0), Direction::North)]);
        run_conveyors(&mut game, false);
        assert_eq!(pos(&game, 0), Some(p(1, 0)));
        assert_eq!(pos(&game, 1), Some(p(2, 0)));
    }

    #[test]
    fn test_conveyor_conflicts_cancelled() {
        // Two belts converging on (1,1)
        let board = open(3, 3)
            .with_tile(p(0, 1), TileKind::Conveyor { direction: Direction::East })
            .with_tile(p(2, 1), TileKind::Conveyor { direction: Direction::West });
        let mut game = arena(board, &[(p(0, 1), Direction::North), (p(2, 1), Direction::North)]);
        run_conveyors(&mut game, false);
        assert_eq!(pos(&game, 0), Some(p(0, 1)));
        assert_eq!(pos(&game, 1), Some(p(2, 1)));
    }

    #[test]
    fn test_conveyor_head_on_swap_cancelled() {
        let board = open(2, 1)
            .with_tile(p(0, 0), TileKind::Conveyor { direction: Direction::East })
            .with_tile(p(1, 0), TileKind::Conveyor { direction: Direction::West });
        let mut game = arena(board, &[(p(0, 0), Direction::North), (p(1, 0), Direction::North)]);
        run_conveyors(&mut game, false);
        assert_eq!(pos(&game, 0), Some(p(0, 0)));
        assert_eq!(pos(&game, 1), Some(p(1, 0)));
    }

    #[test]
    fn test_conveyor_blocked_by_standing_robot_cascades() {
        // r2 stands still on plain floor, so r1 cannot move, so r0 cannot move
        let board = open(4, 1)
            .with_tile(p(0, 0), TileKind::Conveyor { direction: Direction::East })
            .with_tile(p(1, 0), TileKind::Conveyor { direction: Direction::East });
        let mut game = arena(
            board,
            &[(p(0, 0), Direction::North), (p(1, 0), Direction::North), (p(2, 0), Direction::North)],
        );
        run_conveyors(&mut game, false);
        assert_eq!(pos(&game, 0), Some(p(0, 0)));
        assert_eq!(pos(&game, 1), Some(p(1, 0)));
    }

    #[test]
    fn test_express_pass_ignores_regular_belts() {
        let board = open(4, 1)
            .with_tile(p(0, 0), TileKind::ExpressConveyor { direction: Direction::East })
            .with_tile(p(1, 0), TileKind::ExpressConveyor { direction: Direction::East })
            .with_tile(p(2, 0), TileKind::Conveyor { direction: Direction::East });
        let mut game = arena(board, &[(p(0, 0), Direction::North)]);
        run_conveyors(&mut game, true);
        run_conveyors(&mut game, true);
        assert_eq!(pos(&game, 0), Some(p(2, 0)));
        run_conveyors(&mut game, false);
        assert_eq!(pos(&game, 0), Some(p(3, 0)));
    }

    #[test]
    fn test_gear_rotates() {
        let board = open(3, 3).with_tile(p(1, 1), TileKind::Gear { rotation: Rotation::CounterClockwise });
        let mut game = arena(board, &[(p(1, 1), Direction::North)]);
        run_gears(&mut game);
        assert_eq!(game.players[0].direction, Direction::West);
    }

    #[test]
    fn test_pusher_fires_on_configured_registers() {
        let board = open(3, 1).with_tile(
            p(0, 0),
            TileKind::Pusher { direction: Direction::East, registers: RegisterSet::EVEN },
        );
        let mut game = arena(board, &[(p(0, 0), Direction::North)]);
        run_pushers(&mut game, 0);
        assert_eq!(pos(&game, 0), Some(p(0, 0)));
        run_pushers(&mut game, 1);
        assert_eq!(pos(&game, 0), Some(p(1, 0)));
    }

    #[test]
    fn test_pusher_needs_free_cell() {
        let board = open(3, 1).with_tile(
            p(0, 0),
            TileKind::Pusher { direction: Direction::East, registers: RegisterSet::ODD },
        );
        let mut game = arena(board, &[(p(0, 0), Direction::North), (p(1, 0), Direction::North)]);
        run_pushers(&mut game, 0);
        assert_eq!(pos(&game, 0), Some(p(0, 0)));
        assert_eq!(pos(&game, 1), Some(p(1, 0)));
    }

    #[test]
    fn test_board_laser_hits_first_robot_only() {
        let board = open(5, 1).with_laser(p(0, 0), Direction::East, 1);
        let mut game = arena(board, &[(p(2, 0), Direction::North), (p(4, 0), Direction::North)]);
        let hits = fire_lasers(&game);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target, 0);

        // Robot on the emitter cell is hit too
        game.players[0].position = Some(p(0, 0));
        assert_eq!(fire_lasers(&game)[0].target, 0);
    }

    #[test]
    fn test_wall_stops_laser() {
        let board = open(5, 1)
            .with_laser(p(0, 0), Direction::East, 1)
            .with_wall(p(1, 0), Direction::East);
        let game = arena(board, &[(p(3, 0), Direction::North)]);
        assert!(fire_lasers(&game).is_empty());
    }

    #[test]
    fn test_robot_lasers() {
        let mut game = arena(open(5, 1), &[(p(0, 0), Direction::East), (p(3, 0), Direction::North)]);
        let hits = fire_lasers(&game);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target, 1);
        assert_eq!(hits[0].source, LaserSource::Robot { player_id: game.players[0].id });
        assert_eq!(hits[0].damage, 1);

        game.players[0].option_cards.push(OptionCard::new(1, OptionType::DoubleBarreledLaser));
        assert_eq!(fire_lasers(&game)[0].damage, 2);

        game.players[0].power_state = PowerState::Off;
        assert!(fire_lasers(&game).is_empty());
    }

    #[test]
    fn test_hits_summed_into_one_window() {
        let board = open(5, 3).with_laser(p(2, 0), Direction::South, 1);
        let mut game = arena(board, &[(p(2, 2), Direction::North), (p(0, 2), Direction::East)]);
        game.players[0].option_cards.push(OptionCard::new(1, OptionType::Brakes));

        let hits = fire_lasers(&game);
        // Board laser from the north and r1 from the west
        assert_eq!(hits.len(), 2);
        resolve_hits(&mut game, hits);
        assert_eq!(game.damage_windows.len(), 1);
        assert_eq!(game.damage_windows[0].incoming, 2);
        assert_eq!(game.players[0].damage, 0);
    }

    #[test]
    fn test_checkpoints_only_in_order() {
        let board = open(4, 1)
            .with_checkpoint(p(1, 0))
            .with_checkpoint(p(2, 0));
        let mut game = arena(board, &[(p(2, 0), Direction::West)]);
        assert!(touch_checkpoints(&mut game).is_empty());
        assert_eq!(game.players[0].checkpoints_visited, 0);

        game.players[0].position = Some(p(1, 0));
        touch_checkpoints(&mut game);
        assert_eq!(game.players[0].checkpoints_visited, 1);

        game.players[0].position = Some(p(2, 0));
        assert_eq!(touch_checkpoints(&mut game), vec![0]);
        assert_eq!(game.players[0].checkpoints_visited, 2);
    }
}
