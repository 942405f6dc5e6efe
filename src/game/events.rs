//! Game Events
//!
//! Events generated while commands are applied. The room actor broadcasts
//! them to clients after every command; they never feed back into the
//! simulation.

use serde::{Serialize, Deserialize};

use crate::core::grid::{Direction, Position};
use crate::game::cards::ProgramCard;
use crate::game::state::{Phase, PlayerId, PowerState};

/// Why a robot changed cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveCause {
    /// Its own program card
    Card,
    /// Shoved by another robot
    Pushed,
    /// Carried by a belt
    Conveyor,
    /// Shoved by a pusher panel
    Pusher,
}

/// Where a laser beam came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LaserSource {
    /// Wall-mounted emitter
    Board {
        /// Emitter cell
        position: Position,
    },
    /// Another robot's forward laser
    Robot {
        /// Shooter
        player_id: PlayerId,
    },
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GameEventData {
    /// Player took a seat
    PlayerJoined { player_id: PlayerId, name: String },

    /// Connection flag changed
    ConnectionChanged { player_id: PlayerId, connected: bool },

    /// Phase changed
    PhaseChanged { from: Phase, to: Phase },

    /// New round began
    RoundStarted { round: u32 },

    /// Hand dealt
    CardsDealt { player_id: PlayerId, count: usize },

    /// Programs filled in after the programming timer
    ProgramAutoFilled { player_id: PlayerId },

    /// Power state transition at a round boundary or on announcement
    PowerChanged { player_id: PlayerId, from: PowerState, to: PowerState },

    /// Card executed
    CardPlayed { player_id: PlayerId, card: ProgramCard },

    /// Robot changed cell
    RobotMoved { player_id: PlayerId, from: Position, to: Position, cause: MoveCause },

    /// Robot turned
    RobotRotated { player_id: PlayerId, direction: Direction },

    /// Robot entered a pit
    FellIntoPit { player_id: PlayerId, position: Position },

    /// Laser hit a robot
    LaserHit { player_id: PlayerId, source: LaserSource, damage: u8 },

    /// Passive option absorbed damage
    DamageAbsorbed { player_id: PlayerId, card_id: u32, amount: u8 },

    /// Damage-prevention window opened
    DamageWindowOpened { player_id: PlayerId, incoming: u8 },

    /// Option card discarded to prevent one damage
    DamagePrevented { player_id: PlayerId, card_id: u32 },

    /// Damage applied
    DamageTaken { player_id: PlayerId, amount: u8, total: u8 },

    /// Damage repaired
    Repaired { player_id: PlayerId, amount: u8, total: u8 },

    /// Robot destroyed and removed from the board
    RobotDestroyed { player_id: PlayerId, lives_left: u8 },

    /// Player out of lives
    PlayerEliminated { player_id: PlayerId },

    /// Robot re-entered the board
    Respawned { player_id: PlayerId, position: Position, direction: Direction },

    /// Respawn postponed (every dock occupied)
    RespawnDeferred { player_id: PlayerId },

    /// Checkpoint reached in order
    CheckpointReached { player_id: PlayerId, number: u8 },

    /// Option card drawn
    OptionCardDrawn { player_id: PlayerId, card_id: u32 },

    /// Option card discarded or worn out
    OptionCardLost { player_id: PlayerId, card_id: u32 },

    /// Active option card used
    OptionCardActivated { player_id: PlayerId, card_id: u32 },

    /// Game over
    GameEnded { winner: Option<PlayerId> },
}

/// A game event with timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    /// Round when the event occurred
    pub round: u32,

    /// Register when the event occurred
    pub register: u8,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(round: u32, register: u8, data: GameEventData) -> Self {
        Self { round, register, data }
    }

    /// Player the event is about, if any.
    pub fn player_id(&self) -> Option<PlayerId> {
        match &self.data {
            GameEventData::PlayerJoined { player_id, .. }
            | GameEventData::ConnectionChanged { player_id, .. }
            | GameEventData::CardsDealt { player_id, .. }
            | GameEventData::ProgramAutoFilled { player_id }
            | GameEventData::PowerChanged { player_id, .. }
            | GameEventData::CardPlayed { player_id, .. }
            | GameEventData::RobotMoved { player_id, .. }
            | GameEventData::RobotRotated { player_id, .. }
            | GameEventData::FellIntoPit { player_id, .. }
            | GameEventData::LaserHit { player_id, .. }
            | GameEventData::DamageAbsorbed { player_id, .. }
            | GameEventData::DamageWindowOpened { player_id, .. }
            | GameEventData::DamagePrevented { player_id, .. }
            | GameEventData::DamageTaken { player_id, .. }
            | GameEventData::Repaired { player_id, .. }
            | GameEventData::RobotDestroyed { player_id, .. }
            | GameEventData::PlayerEliminated { player_id }
            | GameEventData::Respawned { player_id, .. }
            | GameEventData::RespawnDeferred { player_id }
            | GameEventData::CheckpointReached { player_id, .. }
            | GameEventData::OptionCardDrawn { player_id, .. }
            | GameEventData::OptionCardLost { player_id, .. }
            | GameEventData::OptionCardActivated { player_id, .. } => Some(*player_id),
            GameEventData::GameEnded { winner } => *winner,
            GameEventData::PhaseChanged { .. } | GameEventData::RoundStarted { .. } => None,
        }
    }

    /// Check if this is a destruction or elimination event.
    pub fn is_destruction(&self) -> bool {
        matches!(
            self.data,
            GameEventData::RobotDestroyed { .. } | GameEventData::PlayerEliminated { .. }
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
