//! Option Cards
//!
//! Upgrades robots collect from option tiles or a table-wide deal. Any held
//! card can be discarded to cancel one point of laser damage while a
//! damage-prevention window is open; a few cards also have passive or
//! activated effects.

use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::core::rng::DeterministicRng;
use crate::game::command::{Applied, CommandError};
use crate::game::damage;
use crate::game::events::GameEventData;
use crate::game::state::{Game, Phase, Player, PlayerId};
use crate::game::wait::WaitKind;

/// Hits an Ablative Coat absorbs before it is discarded.
pub const ABLATIVE_CAPACITY: u8 = 3;

/// Copies of each option type in a fresh option deck.
const COPIES_PER_TYPE: u32 = 2;

/// Option card catalogue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionType {
    /// Absorbs one damage per hit, three times
    AblativeCoat,
    /// Robot laser deals two damage
    DoubleBarreledLaser,
    /// Repairs one damage when activated
    EmergencyRepair,
    Brakes,
    FourthGear,
    ReverseGear,
    RammingGear,
    Flywheel,
    CircuitBreaker,
}

impl OptionType {
    /// Every option type, in deck order.
    pub const ALL: [OptionType; 9] = [
        OptionType::AblativeCoat,
        OptionType::DoubleBarreledLaser,
        OptionType::EmergencyRepair,
        OptionType::Brakes,
        OptionType::FourthGear,
        OptionType::ReverseGear,
        OptionType::RammingGear,
        OptionType::Flywheel,
        OptionType::CircuitBreaker,
    ];

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            OptionType::AblativeCoat => "Ablative Coat",
            OptionType::DoubleBarreledLaser => "Double-Barreled Laser",
            OptionType::EmergencyRepair => "Emergency Repair",
            OptionType::Brakes => "Brakes",
            OptionType::FourthGear => "Fourth Gear",
            OptionType::ReverseGear => "Reverse Gear",
            OptionType::RammingGear => "Ramming Gear",
            OptionType::Flywheel => "Flywheel",
            OptionType::CircuitBreaker => "Circuit Breaker",
        }
    }

    /// Works without being activated.
    pub fn passive(self) -> bool {
        matches!(self, OptionType::AblativeCoat | OptionType::DoubleBarreledLaser)
    }

    /// Has an effect in this engine (others are discard fodder only).
    pub fn implemented(self) -> bool {
        matches!(
            self,
            OptionType::AblativeCoat | OptionType::DoubleBarreledLaser | OptionType::EmergencyRepair
        )
    }
}

/// An option card instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionCard {
    /// Unique card id
    pub id: u32,
    /// Catalogue entry
    #[serde(rename = "type")]
    pub option_type: OptionType,
    /// Display name
    pub name: String,
    /// Passive effect
    pub passive: bool,
    /// Has an effect in this engine
    pub implemented: bool,
    /// Damage absorbed so far (Ablative Coat)
    #[serde(default)]
    pub damage_absorbed: u8,
    /// Already activated this register
    #[serde(default)]
    pub used_this_register: bool,
}

impl OptionCard {
    /// Create a card with all fields set from the catalogue.
    pub fn new(id: u32, option_type: OptionType) -> Self {
        Self {
            id,
            option_type,
            name: option_type.name().to_string(),
            passive: option_type.passive(),
            implemented: option_type.implemented(),
            damage_absorbed: 0,
            used_this_register: false,
        }
    }
}

/// Build and shuffle the option deck for a new game.
pub fn build_option_deck(rng: &mut DeterministicRng) -> Vec<OptionCard> {
    let mut deck: Vec<OptionCard> = OptionType::ALL
        .iter()
        .flat_map(|&t| std::iter::repeat(t).take(COPIES_PER_TYPE as usize))
        .enumerate()
        .map(|(i, t)| OptionCard::new(i as u32 + 1, t))
        .collect();
    rng.shuffle(&mut deck);
    deck
}

/// An open damage-prevention negotiation for one player in one register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageWindow {
    /// Player under attack
    pub player_id: PlayerId,
    /// Damage after passive absorption
    pub incoming: u8,
    /// Points cancelled by discards
    pub prevented: u8,
    /// Closed (damage applied or fully prevented)
    pub resolved: bool,
}

impl DamageWindow {
    /// Damage still to be applied.
    pub fn remaining(&self) -> u8 {
        self.incoming.saturating_sub(self.prevented)
    }
}

// =============================================================================
// PASSIVE EFFECTS
// =============================================================================

/// Damage a robot's own laser deals.
pub fn robot_laser_damage(player: &Player) -> u8 {
    if player.option_cards.iter().any(|c| c.option_type == OptionType::DoubleBarreledLaser) {
        2
    } else {
        1
    }
}

/// Let an Ablative Coat soak one point of a single hit.
///
/// Returns the damage left over. A coat that reaches its capacity is
/// discarded.
pub fn absorb_hit(game: &mut Game, index: usize, amount: u8) -> u8 {
    if amount == 0 {
        return 0;
    }
    let player = &mut game.players[index];
    let Some(slot) = player
        .option_cards
        .iter()
        .position(|c| c.option_type == OptionType::AblativeCoat)
    else {
        return amount;
    };

    let player_id = player.id;
    let coat = &mut player.option_cards[slot];
    coat.damage_absorbed += 1;
    let card_id = coat.id;
    let worn_out = coat.damage_absorbed >= ABLATIVE_CAPACITY;
    if worn_out {
        player.option_cards.remove(slot);
    }

    game.push_event(GameEventData::DamageAbsorbed { player_id, card_id, amount: 1 });
    if worn_out {
        game.push_event(GameEventData::OptionCardLost { player_id, card_id });
    }
    amount - 1
}

/// Clear per-register activation flags.
pub fn reset_register_flags(game: &mut Game) {
    for player in &mut game.players {
        for card in &mut player.option_cards {
            card.used_this_register = false;
        }
    }
}

// =============================================================================
// DAMAGE PREVENTION
// =============================================================================

/// Player holds a card that may be discarded to prevent damage.
pub fn has_eligible_card(player: &Player) -> bool {
    player.option_cards.iter().any(|c| !c.used_this_register)
}

/// Open a window, or apply the damage straight away when the player cannot
/// respond (no eligible card, or disconnected).
pub fn open_window(game: &mut Game, index: usize, incoming: u8) {
    if incoming == 0 {
        return;
    }
    let player = &game.players[index];
    if player.is_disconnected || !has_eligible_card(player) {
        damage::damage_player(game, index, incoming);
        return;
    }

    let player_id = player.id;
    game.damage_windows.push(DamageWindow {
        player_id,
        incoming,
        prevented: 0,
        resolved: false,
    });
    game.push_event(GameEventData::DamageWindowOpened { player_id, incoming });
}

fn open_window_index(game: &Game, player_id: &PlayerId) -> Option<usize> {
    game.damage_windows
        .iter()
        .position(|w| w.player_id == *player_id && !w.resolved)
}

/// Discard an option card to cancel one point of pending damage.
pub fn use_option_for_damage(game: &mut Game, player_id: &PlayerId, card_id: u32) -> Result<Applied, CommandError> {
    let window = open_window_index(game, player_id).ok_or(CommandError::NotAwaiting {
        player_id: *player_id,
        kind: WaitKind::DamagePrevention,
    })?;
    let index = game.player_index(player_id).ok_or(CommandError::UnknownPlayer(*player_id))?;

    let player = &mut game.players[index];
    let slot = player
        .option_cards
        .iter()
        .position(|c| c.id == card_id)
        .ok_or(CommandError::UnknownOptionCard(card_id))?;
    if player.option_cards[slot].used_this_register {
        return Err(CommandError::OptionNotUsable(card_id));
    }
    player.option_cards.remove(slot);

    let w = &mut game.damage_windows[window];
    w.prevented += 1;
    let fully_prevented = w.remaining() == 0;
    if fully_prevented {
        w.resolved = true;
    }

    debug!(player = %player_id, card_id, "option card discarded to prevent damage");
    game.push_event(GameEventData::DamagePrevented { player_id: *player_id, card_id });
    Ok(Applied::Changed)
}

/// Close a player's window and apply whatever damage was not prevented.
pub fn complete_window(game: &mut Game, player_id: &PlayerId) -> Result<Applied, CommandError> {
    let window = open_window_index(game, player_id).ok_or(CommandError::NotAwaiting {
        player_id: *player_id,
        kind: WaitKind::DamagePrevention,
    })?;
    resolve_window(game, window);
    Ok(Applied::Changed)
}

/// Close every open window (timer expiry or disconnected players).
pub fn resolve_all_windows(game: &mut Game) {
    for window in 0..game.damage_windows.len() {
        if !game.damage_windows[window].resolved {
            resolve_window(game, window);
        }
    }
}

fn resolve_window(game: &mut Game, window: usize) {
    let w = game.damage_windows[window];
    game.damage_windows[window].resolved = true;
    if let Some(index) = game.player_index(&w.player_id) {
        damage::damage_player(game, index, w.remaining());
    }
}

// =============================================================================
// ACTIVE EFFECTS & DEALING
// =============================================================================

/// Use an active option card. Each card works at most once per register.
pub fn activate_option(game: &mut Game, player_id: &PlayerId, card_id: u32) -> Result<Applied, CommandError> {
    if !matches!(game.phase, Phase::Programming | Phase::Executing) {
        return Err(CommandError::WrongPhase {
            command: "activate-option",
            phase: game.phase,
        });
    }
    let index = game.player_index(player_id).ok_or(CommandError::UnknownPlayer(*player_id))?;
    let player = &mut game.players[index];
    let card = player
        .option_cards
        .iter_mut()
        .find(|c| c.id == card_id)
        .ok_or(CommandError::UnknownOptionCard(card_id))?;

    if card.passive || !card.implemented || card.used_this_register {
        return Err(CommandError::OptionNotUsable(card_id));
    }
    card.used_this_register = true;
    let option_type = card.option_type;

    game.push_event(GameEventData::OptionCardActivated { player_id: *player_id, card_id });
    if option_type == OptionType::EmergencyRepair {
        damage::repair_player(game, index, 1);
    }
    Ok(Applied::Changed)
}

/// Draw the top option card for a player. `None` when the deck is empty.
pub fn draw_option_card(game: &mut Game, index: usize) -> Option<u32> {
    let card = game.option_deck.pop()?;
    let card_id = card.id;
    let player = &mut game.players[index];
    let player_id = player.id;
    player.option_cards.push(card);
    game.push_event(GameEventData::OptionCardDrawn { player_id, card_id });
    Some(card_id)
}

/// Deal one option card to every player still in the race.
pub fn deal_option_cards_to_all(game: &mut Game) -> Result<Applied, CommandError> {
    if matches!(game.phase, Phase::Waiting | Phase::Finished) {
        return Err(CommandError::WrongPhase {
            command: "deal-option-cards-to-all",
            phase: game.phase,
        });
    }

    let mut dealt = 0;
    for index in 0..game.players.len() {
        if game.players[index].eliminated {
            continue;
        }
        if draw_option_card(game, index).is_none() {
            warn!(room = %game.room_code, "option deck empty, skipping remaining players");
            break;
        }
        dealt += 1;
    }

    Ok(if dealt > 0 { Applied::Changed } else { Applied::Ignored })
}

/// Remove a held option card.
pub fn discard(game: &mut Game, index: usize, card_id: u32) -> bool {
    let player = &mut game.players[index];
    let Some(slot) = player.option_cards.iter().position(|c| c.id == card_id) else {
        return false;
    };
    player.option_cards.remove(slot);
    let player_id = player.id;
    game.push_event(GameEventData::OptionCardLost { player_id, card_id });
    true
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::GameRules;

    fn game_with_player(cards: &[OptionType]) -> (Game, PlayerId) {
        let mut game = Game::new("OPTS01", GameRules::default(), 5);
        let id = PlayerId::new([1; 16]);
        let mut player = Player::new(id, "ada", 3);
        for (i, t) in cards.iter().enumerate() {
            player.option_cards.push(OptionCard::new(100 + i as u32, *t));
        }
        game.players.push(player);
        game.phase = Phase::Executing;
        (game, id)
    }

    #[test]
    fn test_catalogue_defaults() {
        let coat = OptionCard::new(1, OptionType::AblativeCoat);
        assert!(coat.passive && coat.implemented);
        assert_eq!(coat.name, "Ablative Coat");

        let repair = OptionCard::new(2, OptionType::EmergencyRepair);
        assert!(!repair.passive && repair.implemented);

        let brakes = OptionCard::new(3, OptionType::Brakes);
        assert!(!brakes.implemented && !brakes.passive);
        for t in OptionType::ALL {
            assert!(!t.passive() || t.implemented(), "{t:?} has no effect");
        }
    }

    #[test]
    fn test_option_deck_is_seeded() {
        let a = build_option_deck(&mut DeterministicRng::new(3));
        let b = build_option_deck(&mut DeterministicRng::new(3));
        assert_eq!(a, b);
        assert_eq!(a.len(), OptionType::ALL.len() * COPIES_PER_TYPE as usize);
    }

    #[test]
    fn test_ablative_coat_wears_out() {
        let (mut game, _) = game_with_player(&[OptionType::AblativeCoat]);
        assert_eq!(absorb_hit(&mut game, 0, 1), 0);
        assert_eq!(absorb_hit(&mut game, 0, 2), 1);
        assert_eq!(game.players[0].option_cards[0].damage_absorbed, 2);
        assert_eq!(absorb_hit(&mut game, 0, 1), 0);
        assert!(game.players[0].option_cards.is_empty());
        assert_eq!(absorb_hit(&mut game, 0, 1), 1);
    }

    #[test]
    fn test_double_barreled_laser() {
        let (game, _) = game_with_player(&[OptionType::DoubleBarreledLaser]);
        assert_eq!(robot_laser_damage(&game.players[0]), 2);
        let (game, _) = game_with_player(&[]);
        assert_eq!(robot_laser_damage(&game.players[0]), 1);
    }

    #[test]
    fn test_window_prevents_and_applies_remainder() {
        let (mut game, id) = game_with_player(&[OptionType::Brakes, OptionType::Flywheel]);
        open_window(&mut game, 0, 3);
        assert_eq!(game.damage_windows.len(), 1);

        use_option_for_damage(&mut game, &id, 100).unwrap();
        use_option_for_damage(&mut game, &id, 101).unwrap();
        assert_eq!(game.damage_windows[0].remaining(), 1);
        assert!(!game.damage_windows[0].resolved);

        complete_window(&mut game, &id).unwrap();
        assert_eq!(game.players[0].damage, 1);
        assert!(game.damage_windows[0].resolved);
        assert!(complete_window(&mut game, &id).is_err());
    }

    #[test]
    fn test_window_closes_early_when_fully_prevented() {
        let (mut game, id) = game_with_player(&[OptionType::Brakes, OptionType::Flywheel]);
        open_window(&mut game, 0, 1);
        use_option_for_damage(&mut game, &id, 100).unwrap();
        assert!(game.damage_windows[0].resolved);
        assert_eq!(game.players[0].damage, 0);
        assert_eq!(game.players[0].option_cards.len(), 1);
    }

    #[test]
    fn test_no_window_without_cards() {
        let (mut game, _) = game_with_player(&[]);
        open_window(&mut game, 0, 2);
        assert!(game.damage_windows.is_empty());
        assert_eq!(game.players[0].damage, 2);
    }

    #[test]
    fn test_emergency_repair_once_per_register() {
        let (mut game, id) = game_with_player(&[OptionType::EmergencyRepair]);
        game.players[0].damage = 4;
        activate_option(&mut game, &id, 100).unwrap();
        assert_eq!(game.players[0].damage, 3);
        assert_eq!(activate_option(&mut game, &id, 100), Err(CommandError::OptionNotUsable(100)));

        reset_register_flags(&mut game);
        activate_option(&mut game, &id, 100).unwrap();
        assert_eq!(game.players[0].damage, 2);
    }

    #[test]
    fn test_passive_cards_cannot_be_activated() {
        let (mut game, id) = game_with_player(&[OptionType::AblativeCoat]);
        assert_eq!(activate_option(&mut game, &id, 100), Err(CommandError::OptionNotUsable(100)));
    }

    #[test]
    fn test_deal_to_all_skips_when_empty() {
        let (mut game, _) = game_with_player(&[]);
        game.option_deck = vec![OptionCard::new(7, OptionType::Brakes)];
        assert_eq!(deal_option_cards_to_all(&mut game), Ok(Applied::Changed));
        assert_eq!(game.players[0].option_cards.len(), 1);
        assert_eq!(deal_option_cards_to_all(&mut game), Ok(Applied::Ignored));
    }
}
