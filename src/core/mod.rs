//! Core deterministic primitives.
//!
//! Everything the simulation needs to be reproducible: a seeded PRNG, state
//! hashing and integer grid geometry. Nothing here touches system time.

pub mod grid;
pub mod rng;
pub mod hash;

// Re-export core types
pub use grid::{Direction, Position, Rotation};
pub use rng::DeterministicRng;
pub use hash::compute_state_hash;
