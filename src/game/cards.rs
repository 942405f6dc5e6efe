//! Program Cards and Deck
//!
//! The standard 84-card program deck. A card's priority equals its id, so
//! every card in play has a unique, strictly ordered priority.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::rng::DeterministicRng;

/// Number of cards in the standard deck.
pub const DECK_SIZE: usize = 84;

/// What a program card does when its register executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardType {
    /// Move forward one cell
    #[serde(rename = "MOVE_1")]
    Move1,
    /// Move forward two cells
    #[serde(rename = "MOVE_2")]
    Move2,
    /// Move forward three cells
    #[serde(rename = "MOVE_3")]
    Move3,
    /// Move backward one cell, facing unchanged
    #[serde(rename = "BACK_UP")]
    BackUp,
    /// Quarter turn counter-clockwise
    #[serde(rename = "ROTATE_LEFT")]
    RotateLeft,
    /// Quarter turn clockwise
    #[serde(rename = "ROTATE_RIGHT")]
    RotateRight,
    /// Half turn
    #[serde(rename = "U_TURN")]
    UTurn,
}

impl CardType {
    /// Signed number of cells this card moves (negative is backwards).
    pub fn distance(self) -> i32 {
        match self {
            CardType::Move1 => 1,
            CardType::Move2 => 2,
            CardType::Move3 => 3,
            CardType::BackUp => -1,
            CardType::RotateLeft | CardType::RotateRight | CardType::UTurn => 0,
        }
    }

    /// True for cards that only turn the robot.
    pub fn is_rotation(self) -> bool {
        matches!(self, CardType::RotateLeft | CardType::RotateRight | CardType::UTurn)
    }
}

/// A single program card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramCard {
    /// Unique card id
    pub id: u32,
    /// Card effect
    #[serde(rename = "type")]
    pub card_type: CardType,
    /// Execution priority (higher goes first)
    pub priority: u32,
}

impl ProgramCard {
    /// Look up a card of the standard deck by id.
    ///
    /// Returns `None` for ids outside the deck (not a multiple of 10, or
    /// outside 10..=840).
    pub fn standard(id: u32) -> Option<ProgramCard> {
        if id == 0 || id % 10 != 0 || id > 840 {
            return None;
        }

        let card_type = match id {
            10..=70 => CardType::UTurn,
            80..=420 => {
                if matches!((id / 10) % 4, 0 | 1) {
                    CardType::RotateRight
                } else {
                    CardType::RotateLeft
                }
            }
            430..=480 => CardType::BackUp,
            490..=660 => CardType::Move1,
            670..=780 => CardType::Move2,
            _ => CardType::Move3,
        };

        Some(ProgramCard {
            id,
            card_type,
            priority: id,
        })
    }
}

/// Build the standard deck minus the excluded card ids.
///
/// Unknown ids are ignored, and an empty list yields the full deck.
pub fn create_deck(excluded: &[u32]) -> Vec<ProgramCard> {
    (1..=DECK_SIZE as u32)
        .filter_map(|n| ProgramCard::standard(n * 10))
        .filter(|card| !excluded.contains(&card.id))
        .collect()
}

/// Deck errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeckError {
    /// Not enough cards left to deal a full hand
    #[error("deck exhausted: requested {requested} cards, {available} left")]
    Exhausted {
        /// Cards requested
        requested: usize,
        /// Cards remaining
        available: usize,
    },
}

/// A draw pile, rebuilt and shuffled every round.
#[derive(Clone, Debug, Default)]
pub struct Deck {
    cards: Vec<ProgramCard>,
}

impl Deck {
    /// Create an unshuffled deck without the excluded ids.
    pub fn new(excluded: &[u32]) -> Self {
        Self {
            cards: create_deck(excluded),
        }
    }

    /// Shuffle with the room's RNG.
    pub fn shuffle(&mut self, rng: &mut DeterministicRng) {
        rng.shuffle(&mut self.cards);
    }

    /// Remove `n` cards from the top of the deck.
    ///
    /// Leaves the deck untouched when fewer than `n` cards remain.
    pub fn deal_hand(&mut self, n: usize) -> Result<Vec<ProgramCard>, DeckError> {
        if n > self.cards.len() {
            return Err(DeckError::Exhausted {
                requested: n,
                available: self.cards.len(),
            });
        }
        let split = self.cards.len() - n;
        let mut hand = self.cards.split_off(split);
        hand.reverse();
        Ok(hand)
    }

    /// Cards remaining.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// True when no cards remain.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn count(deck: &[ProgramCard], card_type: CardType) -> usize {
        deck.iter().filter(|c| c.card_type == card_type).count()
    }

    #[test]
    fn test_full_deck_composition() {
        let deck = create_deck(&[]);
        assert_eq!(deck.len(), DECK_SIZE);

        assert_eq!(count(&deck, CardType::UTurn), 7);
        assert_eq!(count(&deck, CardType::RotateRight) + count(&deck, CardType::RotateLeft), 35);
        assert_eq!(count(&deck, CardType::BackUp), 6);
        assert_eq!(count(&deck, CardType::Move1), 18);
        assert_eq!(count(&deck, CardType::Move2), 12);
        assert_eq!(count(&deck, CardType::Move3), 6);

        for card in &deck {
            assert_eq!(card.priority, card.id);
        }
    }

    #[test]
    fn test_known_card_ids() {
        assert_eq!(ProgramCard::standard(70).map(|c| c.card_type), Some(CardType::UTurn));
        assert_eq!(ProgramCard::standard(80).map(|c| c.card_type), Some(CardType::RotateRight));
        assert_eq!(ProgramCard::standard(100).map(|c| c.card_type), Some(CardType::RotateLeft));
        assert_eq!(ProgramCard::standard(490).map(|c| c.card_type), Some(CardType::Move1));
        assert_eq!(ProgramCard::standard(670).map(|c| c.card_type), Some(CardType::Move2));
        assert_eq!(ProgramCard::standard(840).map(|c| c.card_type), Some(CardType::Move3));
        assert!(ProgramCard::standard(0).is_none());
        assert!(ProgramCard::standard(85).is_none());
        assert!(ProgramCard::standard(850).is_none());
    }

    #[test]
    fn test_create_deck_with_exclusions() {
        let deck = create_deck(&[70, 80, 490]);
        assert_eq!(deck.len(), 81);
        for excluded in [70, 80, 490] {
            assert!(deck.iter().all(|c| c.id != excluded));
        }
    }

    #[test]
    fn test_unknown_exclusions_ignored() {
        assert_eq!(create_deck(&[5, 9999]).len(), DECK_SIZE);
    }

    #[test]
    fn test_card_type_wire_names() {
        let card = ProgramCard::standard(490).unwrap();
        let json = serde_json::to_string(&card).unwrap();
        assert_eq!(json, r#"{"id":490,"type":"MOVE_1","priority":490}"#);

        let back: ProgramCard = serde_json::from_str(r#"{"id":70,"type":"U_TURN","priority":70}"#).unwrap();
        assert_eq!(back.card_type, CardType::UTurn);
    }

    #[test]
    fn test_deal_hand() {
        let mut deck = Deck::new(&[]);
        let mut rng = DeterministicRng::new(7);
        deck.shuffle(&mut rng);

        let hand = deck.deal_hand(9).unwrap();
        assert_eq!(hand.len(), 9);
        assert_eq!(deck.len(), DECK_SIZE - 9);
        for card in &hand {
            assert!(ProgramCard::standard(card.id).is_some());
        }
    }

    #[test]
    fn test_deal_hand_exhausted() {
        let mut deck = Deck::new(&[]);
        for _ in 0..9 {
            deck.deal_hand(9).unwrap();
        }
        assert_eq!(deck.len(), 3);

        let err = deck.deal_hand(9).unwrap_err();
        assert_eq!(err, DeckError::Exhausted { requested: 9, available: 3 });
        assert_eq!(deck.len(), 3);
    }

    #[test]
    fn test_duplicate_exclusions_remove_one_card() {
        let deck = create_deck(&[70, 70, 80]);
        assert_eq!(deck.len(), DECK_SIZE - 2);
        assert!(deck.iter().all(|c| c.id != 70 && c.id != 80));
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let mut a = Deck::new(&[]);
        let mut b = Deck::new(&[]);
        a.shuffle(&mut DeterministicRng::new(99));
        b.shuffle(&mut DeterministicRng::new(99));
        assert_eq!(a.deal_hand(20).unwrap(), b.deal_hand(20).unwrap());
    }

    proptest! {
        #[test]
        fn prop_deck_ids_unique_and_exclusions_removed(
            excluded in proptest::collection::vec(0u32..900, 0..30)
        ) {
            let deck = create_deck(&excluded);
            let ids: BTreeSet<u32> = deck.iter().map(|c| c.id).collect();
            prop_assert_eq!(ids.len(), deck.len());

            let removed: BTreeSet<u32> = excluded
                .iter()
                .copied()
                .filter(|id| ProgramCard::standard(*id).is_some())
                .collect();
            prop_assert_eq!(deck.len(), DECK_SIZE - removed.len());
            for id in removed {
                prop_assert!(!ids.contains(&id));
            }
        }
    }
}
