//! Error type shared by every stage of the solver.

use thiserror::Error;

/// Errors raised while configuring or playing a game.
#[derive(Debug, Error)]
pub enum Error {
    /// A verifier or card was built with parameters outside its range
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A code of the wrong shape was handed to a verifier
    #[error("Validation error: {0}")]
    Validation(String),

    /// The accumulated constraint system has no solution.
    ///
    /// This is a correctness violation, never an expected runtime state.
    /// The rendered assertions are kept for diagnosis.
    #[error("Contradiction in {context}: {} assertions are unsatisfiable", assertions.len())]
    Contradiction {
        context: String,
        assertions: Vec<String>,
    },

    /// A round ran past its deadline or combination cap
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// The SAT engine itself failed
    #[error("SAT engine error: {0}")]
    Solver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
