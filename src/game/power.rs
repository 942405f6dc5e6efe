//! Power State Machine
//!
//! ```text
//! ON ──announce──▶ ANNOUNCING ──round start──▶ OFF ──round start, answer=false──▶ ON
//!                                               ▲                      │
//!                                               └── answer=true ───────┘
//! ```
//!
//! Transitions only happen at round boundaries; announcing and answering
//! merely record intent.

use crate::game::command::{Applied, CommandError};
use crate::game::events::GameEventData;
use crate::game::state::{Game, Phase, Player, PlayerId, PowerState};
use crate::game::wait::WaitKind;

/// Declare a power-down for the next round.
///
/// The robot still runs this round's program.
pub fn announce_power_down(game: &mut Game, player_id: &PlayerId) -> Result<Applied, CommandError> {
    if game.phase != Phase::Programming {
        return Err(CommandError::WrongPhase { command: "announce-power-down", phase: game.phase });
    }
    let index = game.player_index(player_id).ok_or(CommandError::UnknownPlayer(*player_id))?;
    let player = &mut game.players[index];

    match player.power_state {
        PowerState::Announcing => Ok(Applied::Ignored),
        PowerState::Off => Err(CommandError::PowerDownNotAllowed(PowerState::Off)),
        PowerState::On => {
            if !player.can_program() {
                return Err(CommandError::NotActing(*player_id));
            }
            player.power_state = PowerState::Announcing;
            game.push_event(GameEventData::PowerChanged {
                player_id: *player_id,
                from: PowerState::On,
                to: PowerState::Announcing,
            });
            Ok(Applied::Changed)
        }
    }
}

/// Answer the power-down question of an OFF round.
///
/// `continue_down = true` keeps the robot OFF next round, `false` powers it
/// back on.
pub fn answer_power_down(game: &mut Game, player_id: &PlayerId, continue_down: bool) -> Result<Applied, CommandError> {
    let index = game.player_index(player_id).ok_or(CommandError::UnknownPlayer(*player_id))?;
    let player = &mut game.players[index];
    if game.phase != Phase::Programming || !player.pending_power_down {
        return Err(CommandError::NotAwaiting { player_id: *player_id, kind: WaitKind::PowerDown });
    }
    player.pending_power_down = false;
    player.power_down_decision = Some(continue_down);
    Ok(Applied::Changed)
}

/// Unanswered power-down questions default to staying OFF.
pub fn apply_power_down_defaults(game: &mut Game) {
    for player in &mut game.players {
        if player.pending_power_down {
            player.pending_power_down = false;
            player.power_down_decision = Some(true);
        }
    }
}

/// Round-boundary transition for one player.
///
/// Returns the transition that happened, if any. A player entering or staying
/// in an OFF round is fully repaired and asked the power-down question again.
pub fn start_round(player: &mut Player) -> Option<(PowerState, PowerState)> {
    let from = player.power_state;
    let to = match from {
        PowerState::On => PowerState::On,
        PowerState::Announcing => PowerState::Off,
        PowerState::Off => match player.power_down_decision {
            Some(false) => PowerState::On,
            _ => PowerState::Off,
        },
    };
    player.power_state = to;
    player.power_down_decision = None;
    player.pending_power_down = false;

    if to == PowerState::Off && !player.eliminated {
        player.damage = 0;
        player.pending_power_down = player.is_on_board();
    }

    (from != to).then_some((from, to))
}

/// Robot executes its program cards.
#[inline]
pub fn executes_cards(player: &Player) -> bool {
    player.power_state != PowerState::Off
}

/// Robot fires its own forward laser.
#[inline]
pub fn fires_laser(player: &Player) -> bool {
    player.power_state != PowerState::Off
}
