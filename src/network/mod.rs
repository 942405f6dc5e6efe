//! Network Layer
//!
//! WebSocket server, per-room actors and snapshot persistence.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod protocol;
pub mod registry;
pub mod room;
pub mod server;
pub mod store;

pub use protocol::{ClientMessage, ErrorCode, ServerMessage, StateDigest, StateUpdate};
pub use registry::RoomRegistry;
pub use room::{spawn_room, RoomConfig, RoomError, RoomHandle};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use store::{InMemoryStore, RoomStore, StoreError};
