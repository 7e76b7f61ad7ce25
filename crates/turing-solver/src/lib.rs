//! Adaptive constraint-solving player for the "Turing Machine" deduction game.
//!
//! Each round the player builds a constraint system over the verifiers'
//! possible interpretations, rules out interpretations contradicted by past
//! responses, and picks a code that is consistent with everything learned.
//! Once every verifier is down to one interpretation the derived code is
//! declared the solution.

pub mod backend;
pub mod catalog;
pub mod code;
pub mod constraint;
pub mod eliminator;
pub mod error;
pub mod game;
pub mod history;
pub mod selector;
pub mod verifier;

// Re-export main types
pub use backend::{Backend, VarisatBackend};
pub use catalog::{verifiers_from_cards, Card, CardKind};
pub use code::{Code, DEFAULT_NUM_DIGITS, MAX_DIGIT, MIN_DIGIT};
pub use constraint::{ConstraintStore, Formula, Model, Verdict};
pub use eliminator::{find_impossible, Elimination, EvidenceMode, InterpretationSpace};
pub use error::{Error, Result};
pub use game::{default_scenario, Game, GameConfig, GameOutcome, GameState, RoundRecord};
pub use history::{History, Observation};
pub use selector::{select_guess, RoundStats, Selection, SelectorConfig};
pub use verifier::{Rule, Verifier};
