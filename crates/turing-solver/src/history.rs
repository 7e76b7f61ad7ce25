//! Append-only record of submitted codes and the responses they drew.

use serde::{Deserialize, Serialize};

use crate::code::Code;

/// One submitted code with every verifier's response, in verifier order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub code: Code,
    pub responses: Vec<bool>,
}

/// Submitted codes in submission order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    observations: Vec<Observation>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a round. A code already present keeps its first entry.
    ///
    /// Returns whether the history grew.
    pub fn record(&mut self, code: Code, responses: Vec<bool>) -> bool {
        if let Some(existing) = self.get(&code) {
            debug_assert_eq!(existing, responses.as_slice());
            return false;
        }
        self.observations.push(Observation { code, responses });
        true
    }

    /// Responses recorded for a code
    pub fn get(&self, code: &Code) -> Option<&[bool]> {
        self.observations
            .iter()
            .find(|obs| &obs.code == code)
            .map(|obs| obs.responses.as_slice())
    }

    pub fn contains(&self, code: &Code) -> bool {
        self.get(code).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    pub fn codes(&self) -> impl Iterator<Item = &Code> {
        self.observations.iter().map(|obs| &obs.code)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
