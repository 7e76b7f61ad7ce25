//! Verifier cards from the physical game.
//!
//! Only cards expressible with the supported rule kinds are listed. A card
//! fixes the public part of a rule; the hidden parameters are supplied
//! separately when a game is set up.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::verifier::{Rule, Verifier};

/// Rule kind a card stands for, with its public parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardKind {
    DuplicateCount { digit: u8 },
    IsMinimum,
    LessThanConstant { value: u8 },
    EqualsValue { value: u8 },
    PositionalLessThan,
}

impl CardKind {
    /// Number of hidden parameters the card needs
    pub fn hidden_arity(self) -> usize {
        match self {
            CardKind::PositionalLessThan => 2,
            _ => 1,
        }
    }

    /// What the hidden parameters mean, for error messages and listings
    pub fn hidden_names(self) -> &'static str {
        match self {
            CardKind::DuplicateCount { .. } => "count",
            CardKind::PositionalLessThan => "first,second",
            _ => "position",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Card {
    pub id: u32,
    pub description: &'static str,
    #[serde(flatten)]
    pub kind: CardKind,
}

const CARDS: &[Card] = &[
    Card {
        id: 8,
        description: "the number of 1s in the code",
        kind: CardKind::DuplicateCount { digit: 1 },
    },
    Card {
        id: 9,
        description: "the number of 3s in the code",
        kind: CardKind::DuplicateCount { digit: 3 },
    },
    Card {
        id: 10,
        description: "the number of 4s in the code",
        kind: CardKind::DuplicateCount { digit: 4 },
    },
    Card {
        id: 14,
        description: "which position's number is smaller than either of the others",
        kind: CardKind::IsMinimum,
    },
    Card {
        id: 26,
        description: "that a specific position is less than 3",
        kind: CardKind::LessThanConstant { value: 3 },
    },
    Card {
        id: 27,
        description: "that a specific position is less than 4",
        kind: CardKind::LessThanConstant { value: 4 },
    },
    Card {
        id: 28,
        description: "that a specific position is equal to 1",
        kind: CardKind::EqualsValue { value: 1 },
    },
    Card {
        id: 29,
        description: "that a specific position is equal to 3",
        kind: CardKind::EqualsValue { value: 3 },
    },
    Card {
        id: 30,
        description: "that a specific position is equal to 4",
        kind: CardKind::EqualsValue { value: 4 },
    },
    Card {
        id: 48,
        description: "one specific position compared to another specific position",
        kind: CardKind::PositionalLessThan,
    },
];

/// Every supported card, by ascending id
pub fn cards() -> &'static [Card] {
    CARDS
}

pub fn card(id: u32) -> Option<&'static Card> {
    CARDS.iter().find(|card| card.id == id)
}

/// Build a verifier from a card id and its hidden parameters
pub fn build(num_digits: usize, id: u32, hidden: &[u8]) -> Result<Verifier> {
    let card = card(id).ok_or_else(|| {
        Error::Configuration(format!("card {} is not supported", id))
    })?;

    let arity = card.kind.hidden_arity();
    if hidden.len() != arity {
        return Err(Error::Configuration(format!(
            "card {} takes {} hidden parameter(s) ({}) but got {}",
            id,
            arity,
            card.kind.hidden_names(),
            hidden.len()
        )));
    }

    let rule = match card.kind {
        CardKind::DuplicateCount { digit } => Rule::DuplicateCount {
            digit,
            count: hidden[0] as usize,
        },
        CardKind::IsMinimum => Rule::IsMinimum {
            position: hidden[0] as usize,
        },
        CardKind::LessThanConstant { value } => Rule::LessThanConstant {
            position: hidden[0] as usize,
            value,
        },
        CardKind::EqualsValue { value } => Rule::EqualsValue {
            position: hidden[0] as usize,
            value,
        },
        CardKind::PositionalLessThan => Rule::PositionalLessThan {
            first: hidden[0] as usize,
            second: hidden[1] as usize,
        },
    };

    Verifier::new(num_digits, rule)
}

/// Build verifiers from `(card id, hidden parameters)` pairs, in order
pub fn verifiers_from_cards(num_digits: usize, cards: &[(u32, Vec<u8>)]) -> Result<Vec<Verifier>> {
    cards
        .iter()
        .map(|(id, hidden)| build(num_digits, *id, hidden))
        .collect()
}
