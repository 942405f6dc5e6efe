//! Damage, Lives & Respawn
//!
//! Damage is clamped at [`MAX_DAMAGE`]. Reaching it, or falling into a pit,
//! marks the robot destroyed once per register; the loss of a life is booked
//! when the register finishes. Destroyed robots re-enter at a free dock
//! during cleanup.

use tracing::{debug, info};

use crate::core::grid::{Direction, Position};
use crate::game::command::{Applied, CommandError};
use crate::game::events::GameEventData;
use crate::game::state::{Game, Phase, Player, PlayerId, RespawnChoice};
use crate::game::wait::WaitKind;
use crate::MAX_DAMAGE;

/// Result of applying damage to one robot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageOutcome {
    /// Damage actually added after clamping
    pub applied: u8,
    /// This call triggered destruction
    pub destroyed: bool,
}

/// Add damage, clamping at [`MAX_DAMAGE`].
///
/// Destruction fires at most once per register no matter how much more
/// damage arrives.
pub fn apply_damage(player: &mut Player, amount: u8) -> DamageOutcome {
    let before = player.damage;
    player.damage = player.damage.saturating_add(amount).min(MAX_DAMAGE);
    let applied = player.damage - before;

    let destroyed = player.damage >= MAX_DAMAGE && !player.destroyed_this_register;
    if destroyed {
        player.destroyed_this_register = true;
    }
    DamageOutcome { applied, destroyed }
}

/// Remove damage. Returns the amount actually repaired.
pub fn repair(player: &mut Player, amount: u8) -> u8 {
    let repaired = player.damage.min(amount);
    player.damage -= repaired;
    repaired
}

/// [`apply_damage`] with event reporting.
pub fn damage_player(game: &mut Game, index: usize, amount: u8) -> DamageOutcome {
    if amount == 0 {
        return DamageOutcome { applied: 0, destroyed: false };
    }
    let player = &mut game.players[index];
    let outcome = apply_damage(player, amount);
    let (player_id, total) = (player.id, player.damage);

    game.push_event(GameEventData::DamageTaken {
        player_id,
        amount: outcome.applied,
        total,
    });
    if outcome.destroyed {
        debug!(player = %player_id, "robot reached maximum damage");
    }
    outcome
}

/// [`repair`] with event reporting.
pub fn repair_player(game: &mut Game, index: usize, amount: u8) {
    let player = &mut game.players[index];
    let repaired = repair(player, amount);
    if repaired > 0 {
        let (player_id, total) = (player.id, player.damage);
        game.push_event(GameEventData::Repaired {
            player_id,
            amount: repaired,
            total,
        });
    }
}

/// Robot entered a pit: off the board and destroyed for this register.
pub fn fall_into_pit(game: &mut Game, index: usize) {
    let player = &mut game.players[index];
    let Some(position) = player.position.take() else {
        return;
    };
    player.destroyed_this_register = true;
    let player_id = player.id;
    game.push_event(GameEventData::FellIntoPit { player_id, position });
}

/// Book destructions at the end of a register.
///
/// Each destroyed robot leaves the board and loses one life. At zero lives
/// the player is eliminated; otherwise a holder of option cards owes one
/// discard.
pub fn process_destructions(game: &mut Game) {
    for index in 0..game.players.len() {
        let player = &mut game.players[index];
        if !player.destroyed_this_register {
            continue;
        }
        player.destroyed_this_register = false;
        player.position = None;
        player.lives = player.lives.saturating_sub(1);
        let (player_id, lives_left) = (player.id, player.lives);

        game.push_event(GameEventData::RobotDestroyed { player_id, lives_left });

        let player = &mut game.players[index];
        if lives_left == 0 {
            if !player.eliminated {
                player.eliminated = true;
                player.option_cards.clear();
                player.pending_card_loss = false;
                info!(room = %game.room_code, player = %player_id, "player eliminated");
                game.push_event(GameEventData::PlayerEliminated { player_id });
            }
        } else if !player.option_cards.is_empty() {
            player.pending_card_loss = true;
        }
    }
}

// =============================================================================
// RESPAWN
// =============================================================================

/// Flag every destroyed player still in the race for respawn.
pub fn open_respawns(game: &mut Game) {
    for player in &mut game.players {
        if !player.eliminated && !player.is_on_board() {
            player.pending_respawn = true;
            player.respawn_choice = None;
        }
    }
}

/// Dock cell is free: no robot on it and not claimed by another respawn.
fn dock_is_free(game: &Game, position: Position, claimant: &PlayerId) -> bool {
    game.robot_at(position).is_none()
        && !game.players.iter().any(|p| {
            p.id != *claimant
                && p.pending_respawn
                && p.respawn_choice.map(|c| c.position) == Some(position)
        })
}

/// Own dock if free, else the first free dock, facing the dock's direction.
pub fn default_respawn(game: &Game, index: usize) -> Option<RespawnChoice> {
    let board = game.board.as_ref()?;
    let player = &game.players[index];

    let own = board
        .starting_position(player.dock)
        .filter(|dock| dock_is_free(game, dock.position, &player.id));
    let dock = own.or_else(|| {
        board
            .starting_positions
            .iter()
            .find(|dock| dock_is_free(game, dock.position, &player.id))
    })?;

    Some(RespawnChoice {
        position: dock.position,
        direction: dock.direction,
    })
}

/// Record a player's respawn decision.
///
/// Without a position the default dock is used; without a direction the
/// dock's own facing.
pub fn choose_respawn(
    game: &mut Game,
    player_id: &PlayerId,
    position: Option<Position>,
    direction: Option<Direction>,
) -> Result<Applied, CommandError> {
    if game.phase != Phase::Cleanup {
        return Err(CommandError::WrongPhase { command: "choose-respawn", phase: game.phase });
    }
    let index = game.player_index(player_id).ok_or(CommandError::UnknownPlayer(*player_id))?;
    let player = &game.players[index];
    if !player.pending_respawn || player.respawn_choice.is_some() {
        return Err(CommandError::NotAwaiting { player_id: *player_id, kind: WaitKind::Respawn });
    }

    let choice = match position {
        Some(position) => {
            let dock = game
                .board
                .as_ref()
                .and_then(|b| b.starting_position_at(position))
                .ok_or(CommandError::InvalidRespawn(position))?;
            if !dock_is_free(game, position, player_id) {
                return Err(CommandError::InvalidRespawn(position));
            }
            RespawnChoice {
                position,
                direction: direction.unwrap_or(dock.direction),
            }
        }
        None => {
            let mut choice = default_respawn(game, index).ok_or(CommandError::NoFreeDock)?;
            if let Some(direction) = direction {
                choice.direction = direction;
            }
            choice
        }
    };

    game.players[index].respawn_choice = Some(choice);
    Ok(Applied::Changed)
}

/// Put every pending robot back on the board.
///
/// Unanswered players get their default. When no dock is free the respawn is
/// deferred to the next cleanup.
pub fn place_respawns(game: &mut Game) {
    let respawn_damage = game.rules.respawn_damage;

    for index in 0..game.players.len() {
        if !game.players[index].pending_respawn {
            continue;
        }

        let chosen = game.players[index]
            .respawn_choice
            .filter(|c| game.robot_at(c.position).is_none());
        let choice = chosen.or_else(|| default_respawn(game, index));

        let player = &mut game.players[index];
        player.pending_respawn = false;
        player.respawn_choice = None;
        let player_id = player.id;

        match choice {
            Some(RespawnChoice { position, direction }) => {
                player.position = Some(position);
                player.direction = direction;
                player.damage = respawn_damage;
                game.push_event(GameEventData::Respawned { player_id, position, direction });
            }
            None => {
                info!(room = %game.room_code, player = %player_id, "no free dock, respawn deferred");
                game.push_event(GameEventData::RespawnDeferred { player_id });
            }
        }
    }
}

// =============================================================================
// OPTION CARD LOSS
// =============================================================================

/// Discard the chosen card to settle a destruction.
pub fn decide_card_loss(game: &mut Game, player_id: &PlayerId, card_id: u32) -> Result<Applied, CommandError> {
    let index = game.player_index(player_id).ok_or(CommandError::UnknownPlayer(*player_id))?;
    if !game.players[index].pending_card_loss {
        return Err(CommandError::NotAwaiting { player_id: *player_id, kind: WaitKind::OptionCardLoss });
    }
    if !crate::game::options::discard(game, index, card_id) {
        return Err(CommandError::UnknownOptionCard(card_id));
    }
    game.players[index].pending_card_loss = false;
    Ok(Applied::Changed)
}

/// Unanswered card losses discard the first card held.
pub fn apply_card_loss_defaults(game: &mut Game) {
    for index in 0..game.players.len() {
        if !game.players[index].pending_card_loss {
            continue;
        }
        game.players[index].pending_card_loss = false;
        if let Some(card_id) = game.players[index].option_cards.first().map(|c| c.id) {
            crate::game::options::discard(game, index, card_id);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Board;
    use crate::game::options::{OptionCard, OptionType};
    use crate::game::state::GameRules;
    use proptest::prelude::*;

    fn player() -> Player {
        Player::new(PlayerId::new([1; 16]), "ada", 3)
    }

    fn game_on_board(n: u8) -> Game {
        let mut game = Game::new("DMG001", GameRules::default(), 9);
        game.board = Some(
            Board::empty("test", 6, 6)
                .with_start(Position::new(1, 5), Direction::North)
                .with_start(Position::new(2, 5), Direction::East)
                .with_start(Position::new(3, 5), Direction::North),
        );
        for i in 0..n {
            let mut p = Player::new(PlayerId::new([i + 1; 16]), format!("p{i}"), 3);
            p.dock = i + 1;
            p.position = Some(Position::new(i as i32 + 1, 2));
            game.players.push(p);
        }
        game.phase = Phase::Cleanup;
        game
    }

    #[test]
    fn test_damage_clamps_and_destroys_once() {
        let mut p = player();
        p.damage = 9;
        let first = apply_damage(&mut p, 3);
        assert_eq!(first, DamageOutcome { applied: 1, destroyed: true });
        assert_eq!(p.damage, MAX_DAMAGE);

        let second = apply_damage(&mut p, 1);
        assert_eq!(second, DamageOutcome { applied: 0, destroyed: false });
    }

    #[test]
    fn test_repair_floors_at_zero() {
        let mut p = player();
        p.damage = 1;
        assert_eq!(repair(&mut p, 3), 1);
        assert_eq!(p.damage, 0);
    }

    #[test]
    fn test_destruction_costs_one_life() {
        let mut game = game_on_board(1);
        game.players[0].destroyed_this_register = true;
        process_destructions(&mut game);

        let p = &game.players[0];
        assert_eq!(p.lives, 2);
        assert!(p.position.is_none());
        assert!(!p.eliminated);
        assert!(!p.pending_card_loss);
    }

    #[test]
    fn test_last_life_eliminates_exactly_once() {
        let mut game = game_on_board(1);
        game.players[0].lives = 1;
        game.players[0].destroyed_this_register = true;
        process_destructions(&mut game);
        assert!(game.players[0].eliminated);

        // A second pass must not emit another elimination
        game.take_events();
        process_destructions(&mut game);
        assert!(game.take_events().is_empty());
    }

    #[test]
    fn test_option_holder_owes_a_discard() {
        let mut game = game_on_board(1);
        game.players[0].option_cards.push(OptionCard::new(4, OptionType::Brakes));
        game.players[0].option_cards.push(OptionCard::new(5, OptionType::Flywheel));
        game.players[0].destroyed_this_register = true;
        process_destructions(&mut game);
        assert!(game.players[0].pending_card_loss);

        let id = game.players[0].id;
        assert_eq!(decide_card_loss(&mut game, &id, 99), Err(CommandError::UnknownOptionCard(99)));
        decide_card_loss(&mut game, &id, 5).unwrap();
        assert_eq!(game.players[0].option_cards.len(), 1);
        assert!(!game.players[0].pending_card_loss);
    }

    #[test]
    fn test_default_respawn_prefers_own_dock() {
        let mut game = game_on_board(2);
        game.players[1].position = None;
        open_respawns(&mut game);

        let choice = default_respawn(&game, 1).unwrap();
        assert_eq!(choice.position, Position::new(2, 5));
        assert_eq!(choice.direction, Direction::East);

        // Own dock occupied: first free dock instead
        game.players[0].position = Some(Position::new(2, 5));
        let choice = default_respawn(&game, 1).unwrap();
        assert_eq!(choice.position, Position::new(1, 5));
    }

    #[test]
    fn test_respawn_places_with_damage() {
        let mut game = game_on_board(1);
        game.players[0].position = None;
        game.players[0].damage = 10;
        open_respawns(&mut game);
        place_respawns(&mut game);

        let p = &game.players[0];
        assert_eq!(p.position, Some(Position::new(1, 5)));
        assert_eq!(p.damage, 2);
        assert!(!p.pending_respawn);
    }

    #[test]
    fn test_choose_respawn_validates_dock() {
        let mut game = game_on_board(2);
        game.players[0].position = None;
        game.players[1].position = Some(Position::new(3, 5));
        open_respawns(&mut game);
        let id = game.players[0].id;

        assert_eq!(
            choose_respawn(&mut game, &id, Some(Position::new(0, 0)), None),
            Err(CommandError::InvalidRespawn(Position::new(0, 0)))
        );
        assert_eq!(
            choose_respawn(&mut game, &id, Some(Position::new(3, 5)), None),
            Err(CommandError::InvalidRespawn(Position::new(3, 5)))
        );
        choose_respawn(&mut game, &id, Some(Position::new(2, 5)), Some(Direction::West)).unwrap();
        place_respawns(&mut game);
        assert_eq!(game.players[0].position, Some(Position::new(2, 5)));
        assert_eq!(game.players[0].direction, Direction::West);
    }

    #[test]
    fn test_respawn_deferred_without_free_dock() {
        let mut game = game_on_board(1);
        game.board = Some(Board::empty("tiny", 3, 3).with_start(Position::new(0, 0), Direction::North));
        game.players.push(Player::new(PlayerId::new([9; 16]), "blocker", 3));
        game.players[1].position = Some(Position::new(0, 0));
        game.players[0].position = None;

        open_respawns(&mut game);
        place_respawns(&mut game);
        assert!(game.players[0].position.is_none());
        assert!(!game.players[0].pending_respawn);

        // Opens again next cleanup
        open_respawns(&mut game);
        assert!(game.players[0].pending_respawn);
    }

    proptest! {
        #[test]
        fn prop_damage_stays_in_range(hits in proptest::collection::vec(0u8..6, 0..20)) {
            let mut p = player();
            let mut destructions = 0;
            for amount in hits {
                let outcome = apply_damage(&mut p, amount);
                prop_assert!(p.damage <= MAX_DAMAGE);
                if outcome.destroyed {
                    destructions += 1;
                }
            }
            prop_assert!(destructions <= 1);
        }
    }
}
