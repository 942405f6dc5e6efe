//! Snapshot Persistence
//!
//! Rooms hand their full snapshot to a [`RoomStore`] after every change.
//! Snapshots are stored as JSON, the same shape clients see plus engine
//! state, so a room can be rebuilt with [`Game::restore`](crate::game::state::Game::restore).

use std::collections::BTreeMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::game::state::GameSnapshot;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Snapshot could not be encoded or decoded.
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Backend unavailable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Where room snapshots go.
pub trait RoomStore: Send + Sync {
    /// Persist the latest snapshot of a room.
    fn save(&self, room_code: &str, snapshot: &GameSnapshot) -> Result<(), StoreError>;

    /// Latest snapshot of a room, if any.
    fn load(&self, room_code: &str) -> Result<Option<GameSnapshot>, StoreError>;

    /// Forget a closed room.
    fn remove(&self, room_code: &str) -> Result<(), StoreError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rooms: Mutex<BTreeMap<String, String>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON stored for a room.
    pub fn raw(&self, room_code: &str) -> Option<String> {
        self.rooms.lock().ok()?.get(room_code).cloned()
    }

    /// Number of stored rooms.
    pub fn len(&self) -> usize {
        self.rooms.lock().map(|rooms| rooms.len()).unwrap_or(0)
    }

    /// Store holds no rooms.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rooms(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StoreError> {
        self.rooms
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

impl RoomStore for InMemoryStore {
    fn save(&self, room_code: &str, snapshot: &GameSnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string(snapshot)?;
        self.rooms()?.insert(room_code.to_string(), json);
        Ok(())
    }

    fn load(&self, room_code: &str) -> Result<Option<GameSnapshot>, StoreError> {
        let Some(json) = self.rooms()?.get(room_code).cloned() else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&json)?))
    }

    fn remove(&self, room_code: &str) -> Result<(), StoreError> {
        self.rooms()?.remove(room_code);
        Ok(())
    }
}
