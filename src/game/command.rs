//! Commands
//!
//! Every input to a room, from players or timers, is a [`Command`]. A
//! command is validated and applied atomically; rejected commands leave the
//! game untouched. After a change the round orchestrator advances as far as
//! it can without more input, so replaying the same command log over the
//! same seed reproduces a match exactly.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::grid::{Direction, Position};
use crate::game::board::{Board, BoardError};
use crate::game::state::{Game, GameRules, Phase, PlayerId, PowerState};
use crate::game::wait::WaitKind;
use crate::game::{damage, options, power, round};

/// One atomic input to a game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Command {
    /// Take a seat in the lobby
    Join {
        /// New player
        player_id: PlayerId,
        /// Display name
        name: String,
    },
    /// Place robots on the docks and deal the first round
    Start {
        /// Course to race on
        board: Board,
    },
    /// Replace the in-progress selection (`None` = empty register)
    RegisterUpdate {
        /// Programming player
        player_id: PlayerId,
        /// Card id per register
        selected_cards: Vec<Option<u32>>,
    },
    /// Lock in a full program
    SubmitCards {
        /// Programming player
        player_id: PlayerId,
        /// One card id per register
        cards: Vec<u32>,
    },
    /// Clear the selection
    ResetCards {
        /// Programming player
        player_id: PlayerId,
    },
    /// Power down next round
    AnnouncePowerDown {
        /// Announcing player
        player_id: PlayerId,
    },
    /// Answer the power-down question
    ContinuePowerDown {
        /// OFF player
        player_id: PlayerId,
        /// Stay OFF next round
        continue_down: bool,
    },
    /// Discard an option card to prevent one damage
    UseOptionForDamage {
        /// Damaged player
        player_id: PlayerId,
        /// Card to discard
        card_id: u32,
    },
    /// Accept the remaining damage
    DamagePreventionComplete {
        /// Damaged player
        player_id: PlayerId,
    },
    /// Pick the dock to re-enter from
    ChooseRespawn {
        /// Destroyed player
        player_id: PlayerId,
        /// Dock cell, default dock when absent
        #[serde(default)]
        position: Option<Position>,
        /// Facing, the dock's own when absent
        #[serde(default)]
        direction: Option<Direction>,
    },
    /// Pick the option card given up after destruction
    OptionCardLossDecision {
        /// Destroyed player
        player_id: PlayerId,
        /// Card to discard
        card_to_lose: u32,
    },
    /// Deal one option card to everyone still racing
    DealOptionCardsToAll,
    /// Use an active option card
    ActivateOption {
        /// Holder
        player_id: PlayerId,
        /// Card to use
        card_id: u32,
    },
    /// Connection state changed
    SetConnected {
        /// Player
        player_id: PlayerId,
        /// New state
        connected: bool,
    },
    /// A wait timer ran out
    Expire {
        /// Wait that timed out
        kind: WaitKind,
        /// Opening the timer was armed for
        serial: u64,
    },
}

impl Command {
    /// Wire name, used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Join { .. } => "join",
            Command::Start { .. } => "start",
            Command::RegisterUpdate { .. } => "register-update",
            Command::SubmitCards { .. } => "submit-cards",
            Command::ResetCards { .. } => "reset-cards",
            Command::AnnouncePowerDown { .. } => "announce-power-down",
            Command::ContinuePowerDown { .. } => "continue-power-down",
            Command::UseOptionForDamage { .. } => "use-option-for-damage",
            Command::DamagePreventionComplete { .. } => "damage-prevention-complete",
            Command::ChooseRespawn { .. } => "choose-respawn",
            Command::OptionCardLossDecision { .. } => "option-card-loss-decision",
            Command::DealOptionCardsToAll => "deal-option-cards-to-all",
            Command::ActivateOption { .. } => "activate-option",
            Command::SetConnected { .. } => "set-connected",
            Command::Expire { .. } => "expire",
        }
    }

    /// Player the command acts for, if any.
    pub fn player_id(&self) -> Option<PlayerId> {
        match self {
            Command::Join { player_id, .. }
            | Command::RegisterUpdate { player_id, .. }
            | Command::SubmitCards { player_id, .. }
            | Command::ResetCards { player_id }
            | Command::AnnouncePowerDown { player_id }
            | Command::ContinuePowerDown { player_id, .. }
            | Command::UseOptionForDamage { player_id, .. }
            | Command::DamagePreventionComplete { player_id }
            | Command::ChooseRespawn { player_id, .. }
            | Command::OptionCardLossDecision { player_id, .. }
            | Command::ActivateOption { player_id, .. }
            | Command::SetConnected { player_id, .. } => Some(*player_id),
            Command::Start { .. } | Command::DealOptionCardsToAll | Command::Expire { .. } => None,
        }
    }
}

/// Outcome of an accepted command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// State changed
    Changed,
    /// Valid but had no effect
    Ignored,
}

/// Reasons a command is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Command not valid in the current phase
    #[error("{command} not allowed during {phase}")]
    WrongPhase {
        /// Command name
        command: &'static str,
        /// Current phase
        phase: Phase,
    },

    /// Player is not seated in this room
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    /// Player id already seated
    #[error("player {0} already joined")]
    AlreadyJoined(PlayerId),

    /// Empty display name
    #[error("player name must not be empty")]
    InvalidName,

    /// All seats taken
    #[error("room is full ({max} players)")]
    RoomFull {
        /// Seat limit
        max: usize,
    },

    /// Too few players to start
    #[error("need at least {required} players, have {joined}")]
    NotEnoughPlayers {
        /// Minimum
        required: usize,
        /// Seated
        joined: usize,
    },

    /// More players than docks
    #[error("board has {docks} docks for {players} players")]
    NotEnoughDocks {
        /// Docks on the board
        docks: usize,
        /// Seated players
        players: usize,
    },

    /// Board failed validation
    #[error("invalid board: {0}")]
    InvalidBoard(#[from] BoardError),

    /// Player has no program this round (destroyed, OFF or eliminated)
    #[error("player {0} is not programming this round")]
    NotActing(PlayerId),

    /// Submitted program has the wrong number of cards
    #[error("program needs {expected} cards, got {got}")]
    IncompleteProgram {
        /// Registers to fill
        expected: usize,
        /// Cards sent
        got: usize,
    },

    /// Selection longer than the register count
    #[error("at most {max} registers, got {got}")]
    TooManyCards {
        /// Registers
        max: usize,
        /// Slots sent
        got: usize,
    },

    /// Card id not in the player's hand
    #[error("card {0} is not in the player's hand")]
    UnknownCard(u32),

    /// Same card in two registers
    #[error("card {0} selected twice")]
    DuplicateCard(u32),

    /// Program already locked in
    #[error("program already submitted")]
    AlreadySubmitted,

    /// Power-down not possible from this state
    #[error("cannot announce power down while {0:?}")]
    PowerDownNotAllowed(PowerState),

    /// No decision of this kind is pending for the player
    #[error("player {player_id} has no pending {kind} decision")]
    NotAwaiting {
        /// Player
        player_id: PlayerId,
        /// Decision kind
        kind: WaitKind,
    },

    /// Option card not held by the player
    #[error("option card {0} not held")]
    UnknownOptionCard(u32),

    /// Option card cannot be used now
    #[error("option card {0} cannot be used now")]
    OptionNotUsable(u32),

    /// Respawn cell is not a free dock
    #[error("{0} is not a free dock")]
    InvalidRespawn(Position),

    /// Every dock is occupied
    #[error("no free dock")]
    NoFreeDock,

    /// Match is over
    #[error("game is finished")]
    GameFinished,
}

/// Validate and apply one command, then advance the game as far as it goes
/// without further input.
pub fn apply_command(game: &mut Game, command: &Command) -> Result<Applied, CommandError> {
    debug!(room = %game.room_code, command = command.name(), "applying command");

    if game.is_finished() && !matches!(command, Command::SetConnected { .. }) {
        return Err(CommandError::GameFinished);
    }

    let applied = match command {
        Command::Join { player_id, name } => round::join(game, *player_id, name)?,
        Command::Start { board } => round::start(game, board.clone())?,
        Command::RegisterUpdate { player_id, selected_cards } => {
            round::register_update(game, player_id, selected_cards)?
        }
        Command::SubmitCards { player_id, cards } => round::submit_cards(game, player_id, cards)?,
        Command::ResetCards { player_id } => round::reset_cards(game, player_id)?,
        Command::AnnouncePowerDown { player_id } => power::announce_power_down(game, player_id)?,
        Command::ContinuePowerDown { player_id, continue_down } => {
            power::answer_power_down(game, player_id, *continue_down)?
        }
        Command::UseOptionForDamage { player_id, card_id } => {
            options::use_option_for_damage(game, player_id, *card_id)?
        }
        Command::DamagePreventionComplete { player_id } => options::complete_window(game, player_id)?,
        Command::ChooseRespawn { player_id, position, direction } => {
            damage::choose_respawn(game, player_id, *position, *direction)?
        }
        Command::OptionCardLossDecision { player_id, card_to_lose } => {
            damage::decide_card_loss(game, player_id, *card_to_lose)?
        }
        Command::DealOptionCardsToAll => options::deal_option_cards_to_all(game)?,
        Command::ActivateOption { player_id, card_id } => options::activate_option(game, player_id, *card_id)?,
        Command::SetConnected { player_id, connected } => round::set_connected(game, player_id, *connected)?,
        Command::Expire { kind, serial } => round::expire(game, *kind, *serial),
    };

    if applied == Applied::Changed {
        round::advance(game);
    }
    Ok(applied)
}

/// Rebuild a game by replaying a command log from a fresh room.
///
/// Rejected commands are skipped, exactly as they were when first applied.
pub fn replay(room_code: &str, rules: GameRules, rng_seed: u64, commands: &[Command]) -> Game {
    let mut game = Game::new(room_code, rules, rng_seed);
    for command in commands {
        if let Err(err) = apply_command(&mut game, command) {
            debug!(room = room_code, command = command.name(), %err, "replayed command rejected");
        }
    }
    game.take_events();
    game
}

// =============================================================================
// TESTS
// =============================================================================
