//! Wait-State Broadcaster
//!
//! Derives, from the game state alone, which human decisions the game is
//! blocked on. Nothing here is stored: every snapshot recomputes it.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::game::state::{Game, Phase, Player, PlayerId, PowerState};

/// Kind of decision a wait is blocked on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitKind {
    /// Program submission
    Cards,
    /// Continue-power-down answer
    PowerDown,
    /// Respawn dock choice
    Respawn,
    /// Option discards against incoming damage
    DamagePrevention,
    /// Option card to give up after destruction
    OptionCardLoss,
}

impl WaitKind {
    /// Every kind.
    pub const ALL: [WaitKind; 5] = [
        WaitKind::Cards,
        WaitKind::PowerDown,
        WaitKind::Respawn,
        WaitKind::DamagePrevention,
        WaitKind::OptionCardLoss,
    ];

    /// Which kind is reported when several are open at once.
    pub const DISPLAY_ORDER: [WaitKind; 5] = [
        WaitKind::DamagePrevention,
        WaitKind::Respawn,
        WaitKind::OptionCardLoss,
        WaitKind::PowerDown,
        WaitKind::Cards,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            WaitKind::Cards => "cards",
            WaitKind::PowerDown => "powerDown",
            WaitKind::Respawn => "respawn",
            WaitKind::DamagePrevention => "damagePrevention",
            WaitKind::OptionCardLoss => "optionCardLoss",
        }
    }
}

impl fmt::Display for WaitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision the game is currently blocked on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingOn {
    /// Decision kind
    #[serde(rename = "type")]
    pub kind: WaitKind,
    /// Players who still have to act
    pub player_ids: Vec<PlayerId>,
    /// Their names, same order
    pub player_names: Vec<String>,
    /// Names of players who already acted
    pub completed_player_names: Vec<String>,
}

/// Player owes a decision of this kind (connected or not).
pub fn is_pending(game: &Game, player: &Player, kind: WaitKind) -> bool {
    if player.eliminated {
        return false;
    }
    match kind {
        WaitKind::Cards => game.phase == Phase::Programming && player.can_program() && !player.submitted,
        WaitKind::PowerDown => game.phase == Phase::Programming && player.pending_power_down,
        WaitKind::Respawn => {
            game.phase == Phase::Cleanup && player.pending_respawn && player.respawn_choice.is_none()
        }
        WaitKind::OptionCardLoss => game.phase == Phase::Cleanup && player.pending_card_loss,
        WaitKind::DamagePrevention => {
            game.phase == Phase::Executing
                && game
                    .damage_windows
                    .iter()
                    .any(|w| w.player_id == player.id && !w.resolved)
        }
    }
}

/// Connected players the game is waiting on for `kind`, in join order.
pub fn blocking_players(game: &Game, kind: WaitKind) -> Vec<&Player> {
    game.players
        .iter()
        .filter(|p| !p.is_disconnected && is_pending(game, p, kind))
        .collect()
}

/// Kind is blocking progress.
pub fn is_open(game: &Game, kind: WaitKind) -> bool {
    game.players
        .iter()
        .any(|p| !p.is_disconnected && is_pending(game, p, kind))
}

/// Identifies one opening of a wait.
///
/// Per-register for damage prevention, per-round for the rest, so a timer
/// armed for one opening never fires into the next.
pub fn wait_serial(game: &Game, kind: WaitKind) -> u64 {
    let register = match kind {
        WaitKind::DamagePrevention => game.current_register as u64 + 1,
        _ => 0,
    };
    ((game.round_number as u64) << 8) | register
}

/// Open waits with their serials.
pub fn open_waits(game: &Game) -> Vec<(WaitKind, u64)> {
    WaitKind::ALL
        .iter()
        .copied()
        .filter(|&kind| is_open(game, kind))
        .map(|kind| (kind, wait_serial(game, kind)))
        .collect()
}

fn completed_names(game: &Game, kind: WaitKind) -> Vec<String> {
    match kind {
        WaitKind::DamagePrevention => game
            .damage_windows
            .iter()
            .filter(|w| w.resolved)
            .filter_map(|w| game.player(&w.player_id))
            .map(|p| p.name.clone())
            .collect(),
        WaitKind::Cards => game
            .players
            .iter()
            .filter(|p| !p.is_disconnected && p.can_program() && p.submitted)
            .map(|p| p.name.clone())
            .collect(),
        WaitKind::PowerDown => game
            .players
            .iter()
            .filter(|p| {
                !p.is_disconnected && p.power_state == PowerState::Off && p.power_down_decision.is_some()
            })
            .map(|p| p.name.clone())
            .collect(),
        WaitKind::Respawn | WaitKind::OptionCardLoss => Vec::new(),
    }
}

/// The decision to show clients, if the game is blocked on one.
///
/// Disconnected players are never listed.
pub fn compute_waiting_on(game: &Game) -> Option<WaitingOn> {
    WaitKind::DISPLAY_ORDER.iter().find_map(|&kind| {
        let players = blocking_players(game, kind);
        if players.is_empty() {
            return None;
        }
        Some(WaitingOn {
            kind,
            player_ids: players.iter().map(|p| p.id).collect(),
            player_names: players.iter().map(|p| p.name.clone()).collect(),
            completed_player_names: completed_names(game, kind),
        })
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::Position;
    use crate::game::options::DamageWindow;
    use crate::game::state::GameRules;

    fn game(n: u8) -> Game {
        let mut game = Game::new("WAIT01", GameRules::default(), 1);
        for i in 0..n {
            let mut p = Player::new(PlayerId::new([i + 1; 16]), format!("p{i}"), 3);
            p.position = Some(Position::new(i as i32, 0));
            game.players.push(p);
        }
        game
    }

    #[test]
    fn test_nothing_to_wait_for_in_lobby() {
        let game = game(2);
        assert!(compute_waiting_on(&game).is_none());
        assert!(open_waits(&game).is_empty());
    }

    #[test]
    fn test_cards_wait_lists_unsubmitted() {
        let mut game = game(3);
        game.phase = Phase::Programming;
        game.players[0].submitted = true;
        game.players[2].is_disconnected = true;

        let waiting = compute_waiting_on(&game).unwrap();
        assert_eq!(waiting.kind, WaitKind::Cards);
        assert_eq!(waiting.player_names, ["p1"]);
        assert_eq!(waiting.completed_player_names, ["p0"]);
    }

    #[test]
    fn test_power_down_reported_before_cards() {
        let mut game = game(2);
        game.phase = Phase::Programming;
        game.players[1].power_state = PowerState::Off;
        game.players[1].pending_power_down = true;

        let waiting = compute_waiting_on(&game).unwrap();
        assert_eq!(waiting.kind, WaitKind::PowerDown);
        assert_eq!(waiting.player_ids, [game.players[1].id]);

        let kinds: Vec<_> = open_waits(&game).into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, [WaitKind::Cards, WaitKind::PowerDown]);
    }

    #[test]
    fn test_damage_prevention_completed_names() {
        let mut game = game(2);
        game.phase = Phase::Executing;
        game.damage_windows = vec![
            DamageWindow { player_id: game.players[0].id, incoming: 2, prevented: 2, resolved: true },
            DamageWindow { player_id: game.players[1].id, incoming: 1, prevented: 0, resolved: false },
        ];

        let waiting = compute_waiting_on(&game).unwrap();
        assert_eq!(waiting.kind, WaitKind::DamagePrevention);
        assert_eq!(waiting.player_names, ["p1"]);
        assert_eq!(waiting.completed_player_names, ["p0"]);
    }

    #[test]
    fn test_respawn_before_card_loss() {
        let mut game = game(2);
        game.phase = Phase::Cleanup;
        game.players[0].pending_card_loss = true;
        game.players[1].pending_respawn = true;

        assert_eq!(compute_waiting_on(&game).unwrap().kind, WaitKind::Respawn);
        game.players[1].pending_respawn = false;
        assert_eq!(compute_waiting_on(&game).unwrap().kind, WaitKind::OptionCardLoss);
    }

    #[test]
    fn test_serial_changes_per_register_for_damage() {
        let mut game = game(1);
        game.round_number = 3;
        game.current_register = 1;
        let a = wait_serial(&game, WaitKind::DamagePrevention);
        let cards = wait_serial(&game, WaitKind::Cards);
        game.current_register = 2;
        assert_ne!(a, wait_serial(&game, WaitKind::DamagePrevention));
        assert_eq!(cards, wait_serial(&game, WaitKind::Cards));
    }

    #[test]
    fn test_waiting_on_wire_format() {
        let mut game = game(1);
        game.phase = Phase::Programming;
        let json = serde_json::to_value(compute_waiting_on(&game).unwrap()).unwrap();
        assert_eq!(json["type"], "cards");
        assert_eq!(json["playerNames"][0], "p0");
        assert!(json["completedPlayerNames"].as_array().unwrap().is_empty());
    }
}
