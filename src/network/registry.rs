//! Room Registry
//!
//! Maps room codes to room handles. It owns no game state: creating a room
//! spawns its actor, closing one stops it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{error, info};

use crate::core::rng::derive_room_seed;
use crate::game::state::Game;
use crate::network::room::{spawn_room, RoomConfig, RoomHandle};
use crate::network::store::RoomStore;

/// Length of a room code.
pub const ROOM_CODE_LEN: usize = 6;

struct RoomEntry {
    handle: RoomHandle,
    /// When the last subscriber went away
    empty_since: Option<Instant>,
}

/// All live rooms.
pub struct RoomRegistry {
    rooms: RwLock<BTreeMap<String, RoomEntry>>,
    config: RoomConfig,
    store: Arc<dyn RoomStore>,
}

/// Fresh random room code: six uppercase hex characters.
pub fn generate_room_code() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..ROOM_CODE_LEN].to_uppercase()
}

/// Room codes are case-insensitive on input.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new(config: RoomConfig, store: Arc<dyn RoomStore>) -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
            config,
            store,
        }
    }

    /// Open a room under a fresh code.
    pub async fn create_room(&self) -> RoomHandle {
        let mut rooms = self.rooms.write().await;
        let code = loop {
            let code = generate_room_code();
            if !rooms.contains_key(&code) {
                break code;
            }
        };

        let nonce = uuid::Uuid::new_v4();
        let seed = derive_room_seed(&code, nonce.as_bytes());
        let game = Game::new(code.clone(), self.config.rules.clone(), seed);
        let (handle, _task) = spawn_room(game, self.config.clone(), self.store.clone());

        info!(room = %code, seed = %hex::encode(seed.to_be_bytes()), "room created");
        rooms.insert(code, RoomEntry { handle: handle.clone(), empty_since: None });
        handle
    }

    /// Reopen a room from its stored snapshot.
    pub async fn restore_room(&self, code: &str) -> Option<RoomHandle> {
        let code = normalize_code(code);
        let snapshot = match self.store.load(&code) {
            Ok(snapshot) => snapshot?,
            Err(err) => {
                error!(room = %code, %err, "failed to load snapshot");
                return None;
            }
        };

        let mut rooms = self.rooms.write().await;
        if let Some(entry) = rooms.get(&code) {
            return Some(entry.handle.clone());
        }
        let seed = derive_room_seed(&code, &[]);
        let game = Game::restore(code.clone(), snapshot, self.config.rules.clone(), seed);
        let (handle, _task) = spawn_room(game, self.config.clone(), self.store.clone());

        info!(room = %code, "room restored");
        rooms.insert(code, RoomEntry { handle: handle.clone(), empty_since: None });
        Some(handle)
    }

    /// Look up a room.
    pub async fn get(&self, code: &str) -> Option<RoomHandle> {
        let rooms = self.rooms.read().await;
        rooms.get(&normalize_code(code)).map(|e| e.handle.clone())
    }

    /// Stop a room and forget it.
    pub async fn close_room(&self, code: &str) -> bool {
        let code = normalize_code(code);
        let Some(entry) = self.rooms.write().await.remove(&code) else {
            return false;
        };
        entry.handle.shutdown().await;
        if let Err(err) = self.store.remove(&code) {
            error!(room = %code, %err, "failed to drop stored snapshot");
        }
        info!(room = %code, "room closed");
        true
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Drop stopped rooms and close rooms abandoned for too long.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut to_close = Vec::new();
        {
            let mut rooms = self.rooms.write().await;
            rooms.retain(|_, entry| !entry.handle.is_closed());

            for (code, entry) in rooms.iter_mut() {
                if entry.handle.subscriber_count() > 0 {
                    entry.empty_since = None;
                    continue;
                }
                let since = *entry.empty_since.get_or_insert(now);
                if now.duration_since(since) >= self.config.abandon_after {
                    to_close.push(code.clone());
                }
            }
        }

        for code in to_close {
            info!(room = %code, "closing abandoned room");
            self.close_room(&code).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::game::command::Command;
    use crate::game::state::PlayerId;
    use crate::network::store::InMemoryStore;

    fn registry(config: RoomConfig) -> (RoomRegistry, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (RoomRegistry::new(config, store.clone()), store)
    }

    #[test]
    fn test_room_code_format() {
        let code = generate_room_code();
        assert_eq!(code.len(), ROOM_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_eq!(normalize_code(" abc123 "), "ABC123");
    }

    #[tokio::test]
    async fn test_create_lookup_close() {
        let (registry, _store) = registry(RoomConfig::default());
        let handle = registry.create_room().await;
        assert_eq!(registry.room_count().await, 1);

        let found = registry.get(&handle.code().to_lowercase()).await.unwrap();
        assert_eq!(found.code(), handle.code());

        assert!(registry.close_room(handle.code()).await);
        assert!(!registry.close_room(handle.code()).await);
        assert!(registry.get(handle.code()).await.is_none());
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let (registry, _store) = registry(RoomConfig::default());
        let a = registry.create_room().await;
        let b = registry.create_room().await;
        assert_ne!(a.code(), b.code());

        a.apply(Command::Join { player_id: PlayerId::new([1; 16]), name: "ada".into() }).await.unwrap();
        assert_eq!(a.state().await.unwrap().snapshot.players.len(), 1);
        assert!(b.state().await.unwrap().snapshot.players.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_room_closed() {
        let config = RoomConfig { abandon_after: Duration::ZERO, ..RoomConfig::default() };
        let (registry, store) = registry(config);
        let kept = registry.create_room().await;
        let _subscriber = kept.subscribe();
        let abandoned = registry.create_room().await;

        registry.cleanup().await;
        assert!(registry.get(kept.code()).await.is_some());
        assert!(registry.get(abandoned.code()).await.is_none());
        assert!(store.raw(abandoned.code()).is_none());
    }

    #[tokio::test]
    async fn test_restore_from_store() {
        let (registry, _store) = registry(RoomConfig::default());
        let handle = registry.create_room().await;
        let code = handle.code().to_string();
        handle.apply(Command::Join { player_id: PlayerId::new([7; 16]), name: "kim".into() }).await.unwrap();
        let before = handle.state().await.unwrap();

        registry.rooms.write().await.remove(&code);
        handle.shutdown().await;

        let restored = registry.restore_room(&code).await.unwrap();
        let after = restored.state().await.unwrap();
        assert_eq!(after.snapshot, before.snapshot);
    }
}
