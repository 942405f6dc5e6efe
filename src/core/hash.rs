//! State Hashing for Verification
//!
//! Deterministic SHA-256 digests of game state. Clients compare the hash sent
//! with every snapshot, and replay tests compare hashes across runs.

use sha2::{Sha256, Digest};
use super::grid::{Direction, Position};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Deterministic hasher for game state.
///
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for game state.
    pub fn for_game_state() -> Self {
        Self::new(b"ROBORACE_STATE_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a length-prefixed string.
    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.update_u32(value.len() as u32);
        self.hasher.update(value.as_bytes());
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an i32 value (little-endian).
    #[inline]
    pub fn update_i32(&mut self, value: i32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an optional board position.
    ///
    /// A tag byte distinguishes "off the board" from any real cell.
    #[inline]
    pub fn update_position(&mut self, position: Option<Position>) {
        match position {
            Some(pos) => {
                self.update_u8(1);
                self.update_i32(pos.x);
                self.update_i32(pos.y);
            }
            None => self.update_u8(0),
        }
    }

    /// Update with a heading.
    #[inline]
    pub fn update_direction(&mut self, direction: Direction) {
        self.update_u8(direction.into());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Update with a UUID (16 bytes).
    #[inline]
    pub fn update_uuid(&mut self, uuid: &[u8; 16]) {
        self.hasher.update(uuid);
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute state hash for a game.
///
/// Round, register and seed are always hashed first; the closure adds the
/// per-player and per-board data.
pub fn compute_state_hash<F>(round: u32, register: u8, rng_seed: u64, add_state: F) -> StateHash
where
    F: FnOnce(&mut StateHasher),
{
    let mut hasher = StateHasher::for_game_state();

    hasher.update_u32(round);
    hasher.update_u8(register);
    hasher.update_u64(rng_seed);

    add_state(&mut hasher);

    hasher.finalize()
}

// =============================================================================
// TESTS
// =============================================================================
