//! Game Logic Module
//!
//! The race simulation. Deterministic given a seed and a command log.
//!
//! ## Module Structure
//!
//! - `cards`: Program cards, deck construction and dealing
//! - `board`: Board model, tiles, walls, lasers, docks
//! - `layouts`: Built-in courses (docking bay + factory floor)
//! - `state`: Game, player and snapshot types
//! - `command`: Command values, validation errors, replay
//! - `round`: Phase machine and register loop
//! - `movement`: Card execution, conveyors, pushers, gears, lasers
//! - `damage`: Damage, lives, destruction and respawn
//! - `power`: Power-down state machine
//! - `options`: Option cards and damage-prevention windows
//! - `wait`: Which decision the game is blocked on
//! - `events`: Game events for clients and replay

pub mod cards;
pub mod board;
pub mod layouts;
pub mod state;
pub mod command;
pub mod round;
pub mod movement;
pub mod damage;
pub mod power;
pub mod options;
pub mod wait;
pub mod events;

// Re-export key types
pub use board::Board;
pub use cards::{CardType, ProgramCard};
pub use command::{apply_command, replay, Applied, Command, CommandError};
pub use events::{GameEvent, GameEventData};
pub use state::{Game, GameRules, GameSnapshot, Phase, PlayerId, PowerState};
pub use wait::{WaitKind, WaitingOn};
