//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Messages are JSON text frames tagged by `type`; each state update is
//! followed by a compact bincode [`StateDigest`] binary frame for clients
//! that verify state hashes.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::grid::{Direction, Position};
use crate::core::hash::StateHash;
use crate::game::command::Command;
use crate::game::events::GameEvent;
use crate::game::state::{GameSnapshot, Phase, PlayerId};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Open a new room and take the first seat.
    CreateRoom {
        /// Display name
        name: String,
        /// Id to play under, random when absent
        #[serde(default)]
        player_id: Option<PlayerId>,
    },

    /// Join a room, or rejoin it with a known player id.
    JoinRoom {
        /// Room code
        room_code: String,
        /// Display name
        name: String,
        /// Known id when reconnecting
        #[serde(default)]
        player_id: Option<PlayerId>,
    },

    /// Start the race on a built-in layout.
    StartGame {
        /// Layout name, server default when absent
        #[serde(default)]
        board: Option<String>,
    },

    /// In-progress register selection.
    RegisterUpdate {
        /// Sender
        player_id: PlayerId,
        /// Card id per register
        selected_cards: Vec<Option<u32>>,
    },

    /// Final program.
    SubmitCards {
        /// Sender
        player_id: PlayerId,
        /// One card id per register
        cards: Vec<u32>,
    },

    /// Clear the selection.
    ResetCards {
        /// Sender
        player_id: PlayerId,
    },

    /// Power down next round.
    AnnouncePowerDown {
        /// Sender
        player_id: PlayerId,
    },

    /// Answer the power-down question.
    ContinuePowerDown {
        /// Sender
        player_id: PlayerId,
        /// Stay OFF next round
        continue_down: bool,
    },

    /// Discard an option card against incoming damage.
    UseOptionForDamage {
        /// Card to discard
        card_id: u32,
    },

    /// Accept the remaining damage.
    DamagePreventionComplete,

    /// Pick the respawn dock.
    ChooseRespawn {
        /// Sender
        player_id: PlayerId,
        /// Dock cell
        #[serde(default)]
        position: Option<Position>,
        /// Facing
        #[serde(default)]
        direction: Option<Direction>,
    },

    /// Pick the option card to lose.
    OptionCardLossDecision {
        /// Sender
        player_id: PlayerId,
        /// Card to discard
        card_to_lose: u32,
    },

    /// Deal an option card to everyone.
    DealOptionCardsToAll,

    /// Use an active option card.
    ActivateOption {
        /// Card to use
        card_id: u32,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back
        timestamp: u64,
    },

    /// Leave the room.
    Leave,
}

/// Client message could not be turned into a game command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// `playerId` names someone other than the connection's player
    #[error("playerId {claimed} does not match this connection ({actual})")]
    PlayerMismatch {
        /// Id in the message
        claimed: PlayerId,
        /// Id bound to the connection
        actual: PlayerId,
    },

    /// Message is handled by the server, not the game
    #[error("{0} is not a game command")]
    NotAGameCommand(&'static str),
}

impl ClientMessage {
    /// Wire name.
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::CreateRoom { .. } => "create-room",
            ClientMessage::JoinRoom { .. } => "join-room",
            ClientMessage::StartGame { .. } => "start-game",
            ClientMessage::RegisterUpdate { .. } => "register-update",
            ClientMessage::SubmitCards { .. } => "submit-cards",
            ClientMessage::ResetCards { .. } => "reset-cards",
            ClientMessage::AnnouncePowerDown { .. } => "announce-power-down",
            ClientMessage::ContinuePowerDown { .. } => "continue-power-down",
            ClientMessage::UseOptionForDamage { .. } => "use-option-for-damage",
            ClientMessage::DamagePreventionComplete => "damage-prevention-complete",
            ClientMessage::ChooseRespawn { .. } => "choose-respawn",
            ClientMessage::OptionCardLossDecision { .. } => "option-card-loss-decision",
            ClientMessage::DealOptionCardsToAll => "deal-option-cards-to-all",
            ClientMessage::ActivateOption { .. } => "activate-option",
            ClientMessage::Ping { .. } => "ping",
            ClientMessage::Leave => "leave",
        }
    }

    /// Turn an in-game message into a command for the connection's player.
    pub fn into_command(self, me: PlayerId) -> Result<Command, ProtocolError> {
        let check = |claimed: PlayerId| {
            if claimed == me {
                Ok(claimed)
            } else {
                Err(ProtocolError::PlayerMismatch { claimed, actual: me })
            }
        };

        Ok(match self {
            ClientMessage::RegisterUpdate { player_id, selected_cards } => Command::RegisterUpdate {
                player_id: check(player_id)?,
                selected_cards,
            },
            ClientMessage::SubmitCards { player_id, cards } => Command::SubmitCards {
                player_id: check(player_id)?,
                cards,
            },
            ClientMessage::ResetCards { player_id } => Command::ResetCards { player_id: check(player_id)? },
            ClientMessage::AnnouncePowerDown { player_id } => {
                Command::AnnouncePowerDown { player_id: check(player_id)? }
            }
            ClientMessage::ContinuePowerDown { player_id, continue_down } => Command::ContinuePowerDown {
                player_id: check(player_id)?,
                continue_down,
            },
            ClientMessage::UseOptionForDamage { card_id } => Command::UseOptionForDamage { player_id: me, card_id },
            ClientMessage::DamagePreventionComplete => Command::DamagePreventionComplete { player_id: me },
            ClientMessage::ChooseRespawn { player_id, position, direction } => Command::ChooseRespawn {
                player_id: check(player_id)?,
                position,
                direction,
            },
            ClientMessage::OptionCardLossDecision { player_id, card_to_lose } => Command::OptionCardLossDecision {
                player_id: check(player_id)?,
                card_to_lose,
            },
            ClientMessage::DealOptionCardsToAll => Command::DealOptionCardsToAll,
            ClientMessage::ActivateOption { card_id } => Command::ActivateOption { player_id: me, card_id },
            other => return Err(ProtocolError::NotAGameCommand(other.name())),
        })
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Room opened, sender seated.
    RoomCreated {
        /// New room code
        room_code: String,
        /// Sender's player id
        player_id: PlayerId,
    },

    /// Sender seated (or reconnected).
    Joined {
        /// Room code
        room_code: String,
        /// Sender's player id
        player_id: PlayerId,
    },

    /// Full room state after a change.
    State(StateUpdate),

    /// Events since the last state.
    Events {
        /// Room code
        room_code: String,
        /// Events in order
        events: Vec<GameEvent>,
    },

    /// Error for the originating client only.
    Error(ServerError),

    /// Ping response.
    Pong {
        /// Echoed client timestamp
        timestamp: u64,
        /// Server wall clock (ms since epoch)
        server_time: i64,
    },

    /// Server or room is going away.
    Shutdown {
        /// Reason
        reason: String,
    },
}

/// Snapshot broadcast to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    /// Room code
    pub room_code: String,
    /// Public snapshot
    pub snapshot: GameSnapshot,
    /// State hash (hex)
    pub state_hash: String,
    /// When the reported wait times out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl StateUpdate {
    /// Compact digest of this update.
    pub fn digest(&self) -> Option<StateDigest> {
        let bytes = hex::decode(&self.state_hash).ok()?;
        let state_hash: StateHash = bytes.try_into().ok()?;
        Some(StateDigest {
            room_code: self.room_code.clone(),
            round: self.snapshot.round_number,
            register: self.snapshot.current_register,
            phase: self.snapshot.phase as u8,
            state_hash,
        })
    }
}

/// Binary frame carrying just enough to compare state hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDigest {
    /// Room code
    pub room_code: String,
    /// Round number
    pub round: u32,
    /// Register index
    pub register: u8,
    /// Phase discriminant
    pub phase: u8,
    /// State hash
    pub state_hash: StateHash,
}

impl StateDigest {
    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerMessage {
    /// Error message for the originating client.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError {
            code,
            message: message.into(),
        })
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed message.
    InvalidInput,
    /// No room with that code.
    RoomNotFound,
    /// Connection has not joined a room.
    NotInRoom,
    /// Connection already sits in a room.
    AlreadyInRoom,
    /// `playerId` does not match the connection.
    PlayerMismatch,
    /// Game rejected the command.
    Rejected,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Phase from a digest discriminant.
pub fn phase_from_u8(value: u8) -> Option<Phase> {
    Some(match value {
        0 => Phase::Waiting,
        1 => Phase::Programming,
        2 => Phase::Executing,
        3 => Phase::Cleanup,
        4 => Phase::Finished,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Game, GameRules};

    fn id(n: u8) -> PlayerId {
        PlayerId::new([n; 16])
    }

    #[test]
    fn test_client_messages_parse() {
        let msg = ClientMessage::from_json(r#"{"type":"submit-cards","playerId":"01010101-0101-0101-0101-010101010101","cards":[490,500,510,520,530]}"#).unwrap();
        assert_eq!(msg, ClientMessage::SubmitCards { player_id: id(1), cards: vec![490, 500, 510, 520, 530] });

        let msg = ClientMessage::from_json(r#"{"type":"use-option-for-damage","cardId":7}"#).unwrap();
        assert_eq!(msg, ClientMessage::UseOptionForDamage { card_id: 7 });

        let msg = ClientMessage::from_json(r#"{"type":"damage-prevention-complete"}"#).unwrap();
        assert_eq!(msg, ClientMessage::DamagePreventionComplete);

        let msg = ClientMessage::from_json(r#"{"type":"join-room","roomCode":"ABC123","name":"ada"}"#).unwrap();
        assert_eq!(msg.name(), "join-room");

        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn test_player_mismatch_rejected() {
        let msg = ClientMessage::ResetCards { player_id: id(2) };
        assert_eq!(
            msg.into_command(id(1)),
            Err(ProtocolError::PlayerMismatch { claimed: id(2), actual: id(1) })
        );
    }

    #[test]
    fn test_implicit_player_filled_in() {
        let command = ClientMessage::UseOptionForDamage { card_id: 3 }.into_command(id(4)).unwrap();
        assert_eq!(command, Command::UseOptionForDamage { player_id: id(4), card_id: 3 });

        let err = ClientMessage::Leave.into_command(id(4)).unwrap_err();
        assert_eq!(err, ProtocolError::NotAGameCommand("leave"));
    }

    #[test]
    fn test_state_message_shape() {
        let game = Game::new("ROOM42", GameRules::default(), 1);
        let update = StateUpdate {
            room_code: "ROOM42".into(),
            snapshot: game.public_snapshot(),
            state_hash: hex::encode(game.compute_hash()),
            deadline: None,
        };
        let json: serde_json::Value = serde_json::from_str(&ServerMessage::State(update.clone()).to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "state");
        assert_eq!(json["roomCode"], "ROOM42");
        assert_eq!(json["snapshot"]["phase"], "waiting");
        assert!(json.get("deadline").is_none());

        let digest = update.digest().unwrap();
        let decoded = StateDigest::from_bytes(&digest.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.state_hash, game.compute_hash());
        assert_eq!(phase_from_u8(decoded.phase), Some(Phase::Waiting));
    }

    #[test]
    fn test_error_codes() {
        let json = ServerMessage::error(ErrorCode::RoomNotFound, "no room ZZZZZZ").to_json().unwrap();
        assert!(json.contains("room_not_found"));
        assert!(json.contains(r#""type":"error""#));
    }
}
