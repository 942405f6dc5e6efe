//! Game State Definitions
//!
//! The authoritative state of one room: players in join order, the board,
//! phase and register counters, and the room's seeded RNG. Everything that is
//! iterated is a `Vec` or `BTreeMap` so iteration order is deterministic.

use std::fmt;
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::grid::{Direction, Position};
use crate::core::rng::DeterministicRng;
use crate::core::hash::{StateHash, StateHasher, compute_state_hash};
use crate::game::board::Board;
use crate::game::cards::ProgramCard;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::options::{DamageWindow, OptionCard};
use crate::game::wait::{self, WaitingOn};
use crate::{HAND_SIZE, MAX_PLAYERS, REGISTER_COUNT, STARTING_LIVES};

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier.
///
/// Serialized as the hyphenated UUID string; ordered by its bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Fresh random id (network layer only, never inside the simulation).
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// =============================================================================
// POWER STATE
// =============================================================================

/// Robot power state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum PowerState {
    /// Normal operation
    #[default]
    On = 0,
    /// Will power down at the next round start
    Announcing = 1,
    /// Powered down: no cards, no robot laser
    Off = 2,
}

// =============================================================================
// PLAYER
// =============================================================================

/// Respawn decision made during cleanup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespawnChoice {
    /// Chosen dock cell
    pub position: Position,
    /// Chosen facing
    pub direction: Direction,
}

/// State of a single player and their robot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Unique player ID
    pub id: PlayerId,

    /// Display name
    pub name: String,

    /// Robot cell, `None` while destroyed or eliminated
    pub position: Option<Position>,

    /// Robot facing
    pub direction: Direction,

    /// Damage tokens, 0..=10
    pub damage: u8,

    /// Remaining lives, 0..=3
    pub lives: u8,

    /// Power state
    pub power_state: PowerState,

    /// Hand dealt this round
    pub dealt_cards: Vec<ProgramCard>,

    /// Program registers
    pub selected_cards: [Option<ProgramCard>; REGISTER_COUNT],

    /// Program locked in for this round
    pub submitted: bool,

    /// Checkpoints touched in order
    pub checkpoints_visited: u8,

    /// Connection dropped (soft flag)
    pub is_disconnected: bool,

    /// Option cards held
    pub option_cards: Vec<OptionCard>,

    /// Out of lives
    #[serde(default)]
    pub eliminated: bool,

    /// Own dock number (1-based)
    #[serde(default)]
    pub dock: u8,

    /// Waiting for a continue-power-down answer
    #[serde(default)]
    pub pending_power_down: bool,

    /// Answer to the power-down question, applied at the next round start
    #[serde(default)]
    pub power_down_decision: Option<bool>,

    /// Needs to re-enter the board at cleanup
    #[serde(default)]
    pub pending_respawn: bool,

    /// Respawn decision, if made
    #[serde(default)]
    pub respawn_choice: Option<RespawnChoice>,

    /// Must discard one option card
    #[serde(default)]
    pub pending_card_loss: bool,

    /// Destruction already triggered in the current register
    #[serde(default)]
    pub destroyed_this_register: bool,
}

impl Player {
    /// Create a new player with full lives and no robot on the board.
    pub fn new(id: PlayerId, name: impl Into<String>, lives: u8) -> Self {
        Self {
            id,
            name: name.into(),
            position: None,
            direction: Direction::North,
            damage: 0,
            lives,
            power_state: PowerState::On,
            dealt_cards: Vec::new(),
            selected_cards: [None; REGISTER_COUNT],
            submitted: false,
            checkpoints_visited: 0,
            is_disconnected: false,
            option_cards: Vec::new(),
            eliminated: false,
            dock: 0,
            pending_power_down: false,
            power_down_decision: None,
            pending_respawn: false,
            respawn_choice: None,
            pending_card_loss: false,
            destroyed_this_register: false,
        }
    }

    /// Robot is on the board.
    #[inline]
    pub fn is_on_board(&self) -> bool {
        self.position.is_some()
    }

    /// Player programs cards this round (on the board and not powered down).
    #[inline]
    pub fn can_program(&self) -> bool {
        !self.eliminated && self.is_on_board() && self.power_state != PowerState::Off
    }

    /// Ids of the cards in the program, `None` for empty registers.
    pub fn selected_ids(&self) -> [Option<u32>; REGISTER_COUNT] {
        self.selected_cards.map(|slot| slot.map(|card| card.id))
    }

    /// Clear hand and program.
    pub fn clear_program(&mut self) {
        self.dealt_cards.clear();
        self.selected_cards = [None; REGISTER_COUNT];
        self.submitted = false;
    }

    /// Hash player state into hasher.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_uuid(self.id.as_bytes());
        hasher.update_position(self.position);
        hasher.update_direction(self.direction);
        hasher.update_u8(self.damage);
        hasher.update_u8(self.lives);
        hasher.update_u8(self.power_state as u8);
        hasher.update_u8(self.checkpoints_visited);
        hasher.update_bool(self.eliminated);
        hasher.update_bool(self.submitted);

        hasher.update_u32(self.dealt_cards.len() as u32);
        for card in &self.dealt_cards {
            hasher.update_u32(card.id);
        }
        for slot in self.selected_ids() {
            hasher.update_u32(slot.unwrap_or(0));
        }

        hasher.update_u32(self.option_cards.len() as u32);
        for option in &self.option_cards {
            hasher.update_u32(option.id);
            hasher.update_u8(option.damage_absorbed);
        }
    }
}

// =============================================================================
// PHASE & RULES
// =============================================================================

/// Current phase of the game.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Phase {
    /// Lobby, players joining
    #[default]
    Waiting = 0,
    /// Players choosing programs
    Programming = 1,
    /// Registers resolving
    Executing = 2,
    /// End-of-round repairs, respawns and discards
    Cleanup = 3,
    /// Game over
    Finished = 4,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Waiting => "waiting",
            Phase::Programming => "programming",
            Phase::Executing => "executing",
            Phase::Cleanup => "cleanup",
            Phase::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// In-game rules fixed when the room is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRules {
    /// Cards dealt to each acting player per round
    pub hand_size: usize,
    /// Players needed to start
    pub min_players: usize,
    /// Seats in the room
    pub max_players: usize,
    /// Lives each robot starts with
    pub starting_lives: u8,
    /// Damage a robot re-enters the board with
    pub respawn_damage: u8,
    /// Card ids removed from the deck
    pub excluded_cards: Vec<u32>,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            hand_size: HAND_SIZE,
            min_players: 2,
            max_players: MAX_PLAYERS,
            starting_lives: STARTING_LIVES,
            respawn_damage: 2,
            excluded_cards: Vec::new(),
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Engine bookkeeping persisted alongside a started game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    /// Room seed
    pub rng_seed: u64,
    /// RNG position
    pub rng_state: [u64; 2],
    /// Undealt option cards, top last
    pub option_deck: Vec<OptionCard>,
    /// Players at game start
    pub started_with: usize,
}

/// Serialized view of a game.
///
/// A fresh room serializes to exactly
/// `{"phase":"waiting","players":{},"board":null,"currentRegister":0,"roundNumber":0}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Phase
    pub phase: Phase,
    /// Players keyed by id, in join order
    #[serde(with = "players_by_id")]
    pub players: Vec<Player>,
    /// Board, once started
    pub board: Option<Board>,
    /// Register being resolved (0-4)
    pub current_register: u8,
    /// Round counter, 0 before the first round
    pub round_number: u32,
    /// Current blocking decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_on: Option<WaitingOn>,
    /// Damage-prevention windows of the current register
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub damage_windows: Vec<DamageWindow>,
    /// Winner, once finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
    /// Engine bookkeeping (persistence only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineState>,
}

/// Players as a JSON object keyed by id, keeping join order.
mod players_by_id {
    use std::fmt;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::{Player, PlayerId};

    pub fn serialize<S: Serializer>(players: &[Player], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(players.len()))?;
        for player in players {
            map.serialize_entry(&player.id, player)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Player>, D::Error> {
        struct PlayersVisitor;

        impl<'de> Visitor<'de> for PlayersVisitor {
            type Value = Vec<Player>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of players keyed by id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut players = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((_id, player)) = access.next_entry::<PlayerId, Player>()? {
                    players.push(player);
                }
                Ok(players)
            }
        }

        deserializer.deserialize_map(PlayersVisitor)
    }
}

// =============================================================================
// GAME
// =============================================================================

/// Complete state of one room.
#[derive(Clone, Debug)]
pub struct Game {
    /// Room code
    pub room_code: String,

    /// Current phase
    pub phase: Phase,

    /// Course, set at start
    pub board: Option<Board>,

    /// Players in join order
    pub players: Vec<Player>,

    /// Register being resolved (0-4)
    pub current_register: u8,

    /// Round counter
    pub round_number: u32,

    /// Rules
    pub rules: GameRules,

    /// RNG seed (for verification)
    pub rng_seed: u64,

    /// Deterministic RNG state
    pub rng: DeterministicRng,

    /// Undealt option cards, drawn from the end
    pub option_deck: Vec<OptionCard>,

    /// Damage-prevention windows of the current register
    pub damage_windows: Vec<DamageWindow>,

    /// Winner, once finished
    pub winner: Option<PlayerId>,

    /// Players at game start (last-robot-standing needs two)
    pub started_with: usize,

    /// Events generated since the last drain
    pending_events: Vec<GameEvent>,
}

impl Game {
    /// Create an empty room in the waiting phase.
    pub fn new(room_code: impl Into<String>, rules: GameRules, rng_seed: u64) -> Self {
        Self {
            room_code: room_code.into(),
            phase: Phase::Waiting,
            board: None,
            players: Vec::new(),
            current_register: 0,
            round_number: 0,
            rules,
            rng_seed,
            rng: DeterministicRng::new(rng_seed),
            option_deck: Vec::new(),
            damage_windows: Vec::new(),
            winner: None,
            started_with: 0,
            pending_events: Vec::new(),
        }
    }

    /// Rebuild a game from a persisted snapshot.
    ///
    /// Snapshots without engine state (rooms that never started) reseed
    /// from `rng_seed`.
    pub fn restore(room_code: impl Into<String>, snapshot: GameSnapshot, rules: GameRules, rng_seed: u64) -> Self {
        let mut game = Game::new(room_code, rules, rng_seed);
        game.phase = snapshot.phase;
        game.players = snapshot.players;
        game.board = snapshot.board;
        game.current_register = snapshot.current_register;
        game.round_number = snapshot.round_number;
        game.damage_windows = snapshot.damage_windows;
        game.winner = snapshot.winner;

        if let Some(engine) = snapshot.engine {
            game.rng_seed = engine.rng_seed;
            game.rng = DeterministicRng::new(engine.rng_seed);
            game.rng.set_state(engine.rng_state);
            game.option_deck = engine.option_deck;
            game.started_with = engine.started_with;
        }
        game
    }

    /// Full snapshot, including engine bookkeeping once the game started.
    pub fn snapshot(&self) -> GameSnapshot {
        let engine = (self.phase != Phase::Waiting).then(|| EngineState {
            rng_seed: self.rng_seed,
            rng_state: self.rng.state(),
            option_deck: self.option_deck.clone(),
            started_with: self.started_with,
        });

        GameSnapshot {
            phase: self.phase,
            players: self.players.clone(),
            board: self.board.clone(),
            current_register: self.current_register,
            round_number: self.round_number,
            waiting_on: wait::compute_waiting_on(self),
            damage_windows: self.damage_windows.clone(),
            winner: self.winner,
            engine,
        }
    }

    /// Snapshot for clients (no RNG state).
    pub fn public_snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            engine: None,
            ..self.snapshot()
        }
    }

    /// Get a player by ID.
    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == *id)
    }

    /// Get a player mutably by ID.
    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == *id)
    }

    /// Join-order index of a player.
    pub fn player_index(&self, id: &PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == *id)
    }

    /// Index of the robot standing on a cell.
    pub fn robot_at(&self, pos: Position) -> Option<usize> {
        self.players.iter().position(|p| p.position == Some(pos))
    }

    /// Players still in the race.
    pub fn active_player_count(&self) -> usize {
        self.players.iter().filter(|p| !p.eliminated).count()
    }

    /// At least one player still in the race is connected.
    pub fn has_connected_players(&self) -> bool {
        self.players.iter().any(|p| !p.eliminated && !p.is_disconnected)
    }

    /// Check if the game has ended.
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Compute hash of current state for verification.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.round_number, self.current_register, self.rng_seed, |hasher| {
            hasher.update_u8(self.phase as u8);
            let [s0, s1] = self.rng.state();
            hasher.update_u64(s0);
            hasher.update_u64(s1);

            for player in &self.players {
                player.hash_into(hasher);
            }

            for window in &self.damage_windows {
                hasher.update_uuid(window.player_id.as_bytes());
                hasher.update_u8(window.incoming);
                hasher.update_u8(window.prevented);
                hasher.update_bool(window.resolved);
            }

            hasher.update_u32(self.option_deck.len() as u32);
            match self.winner {
                Some(id) => hasher.update_uuid(id.as_bytes()),
                None => hasher.update_u8(0),
            }
        })
    }

    /// Record an event stamped with the current round and register.
    pub fn push_event(&mut self, data: GameEventData) {
        self.pending_events.push(GameEvent::new(self.round_number, self.current_register, data));
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_room_snapshot_contract() {
        let game = Game::new("ABCDEF", GameRules::default(), 1);
        let json = serde_json::to_string(&game.snapshot()).unwrap();
        assert_eq!(
            json,
            r#"{"phase":"waiting","players":{},"board":null,"currentRegister":0,"roundNumber":0}"#
        );
    }

    #[test]
    fn test_player_id_ordering() {
        let id1 = PlayerId::new([0; 16]);
        let id2 = PlayerId::new([1; 16]);
        let id3 = PlayerId::new([0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        assert!(id1 < id2);
        assert!(id1 < id3);
        assert!(id3 < id2);
    }

    #[test]
    fn test_player_id_string_roundtrip() {
        let id = PlayerId::new([7; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        assert_eq!(PlayerId::from_uuid_str(&id.to_string()), Some(id));
        assert_eq!(PlayerId::from_uuid_str("not-a-uuid"), None);
    }

    #[test]
    fn test_players_keep_join_order_through_json() {
        let mut game = Game::new("ROOM01", GameRules::default(), 1);
        // Ids deliberately out of byte order
        for (i, byte) in [9u8, 1, 5].iter().enumerate() {
            game.players.push(Player::new(PlayerId::new([*byte; 16]), format!("p{i}"), 3));
        }

        let json = serde_json::to_string(&game.snapshot()).unwrap();
        let back: GameSnapshot = serde_json::from_str(&json).unwrap();
        let names: Vec<_> = back.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["p0", "p1", "p2"]);
    }

    #[test]
    fn test_power_state_wire_names() {
        assert_eq!(serde_json::to_string(&PowerState::Announcing).unwrap(), "\"ANNOUNCING\"");
        assert_eq!(serde_json::to_string(&Phase::Cleanup).unwrap(), "\"cleanup\"");
    }

    #[test]
    fn test_hash_tracks_player_changes() {
        let mut game = Game::new("ROOM01", GameRules::default(), 42);
        game.players.push(Player::new(PlayerId::new([1; 16]), "ada", 3));
        let before = game.compute_hash();

        game.players[0].damage = 1;
        assert_ne!(before, game.compute_hash());
    }

    #[test]
    fn test_restore_keeps_rng_position() {
        let mut game = Game::new("ROOM01", GameRules::default(), 42);
        game.phase = Phase::Programming;
        game.rng.next_u64();

        let snapshot = game.snapshot();
        let mut restored = Game::restore("ROOM01", snapshot, GameRules::default(), 0);
        assert_eq!(restored.rng_seed, 42);
        assert_eq!(restored.rng.next_u64(), game.rng.next_u64());
    }
}
