//! # RoboRace Server
//!
//! Authoritative multiplayer server for a programmable robot race.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ROBORACE SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── grid.rs     - Cells, directions, rotations              │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  game/           - Race simulation (deterministic)           │
//! │  ├── cards.rs    - Program deck                              │
//! │  ├── board.rs    - Board model and layouts                   │
//! │  ├── command.rs  - Commands and replay                       │
//! │  ├── round.rs    - Phase machine and register loop           │
//! │  ├── movement.rs - Cards, conveyors, gears, lasers           │
//! │  ├── damage.rs   - Damage, lives, respawn                    │
//! │  ├── power.rs    - Power down                                │
//! │  ├── options.rs  - Option cards                              │
//! │  └── wait.rs     - Wait-state broadcaster                    │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── room.rs     - Per-room actor and timers                 │
//! │  ├── registry.rs - Room code → actor handle                  │
//! │  └── store.rs    - Snapshot persistence                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are deterministic:
//! - No HashMap (uses BTreeMap and Vec for ordered iteration)
//! - No system time dependencies (timeouts arrive as commands)
//! - All randomness from the room's seeded Xorshift128+
//!
//! Given the same seed and command log, a room reaches the same state hash.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use core::grid::{Direction, Position};
pub use game::command::{apply_command, Command, CommandError};
pub use game::state::{Game, GameRules, GameSnapshot, PlayerId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Registers per round
pub const REGISTER_COUNT: usize = 5;

/// Cards dealt to an undamaged robot
pub const HAND_SIZE: usize = 9;

/// Damage that destroys a robot
pub const MAX_DAMAGE: u8 = 10;

/// Lives at game start
pub const STARTING_LIVES: u8 = 3;

/// Seats per room
pub const MAX_PLAYERS: usize = 8;

/// Program deck size
pub const DECK_SIZE: usize = game::cards::DECK_SIZE;
