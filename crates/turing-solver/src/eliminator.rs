//! Hypothesis elimination from accumulated evidence.
//!
//! Every verifier has a list of possible interpretations. Given the history
//! of submitted codes and responses, this module finds the interpretations
//! that can no longer be the real one and removes them from the verifier's
//! interpretation space for good.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::constraint::{concrete, BoolVar, ConstraintStore, Formula, Verdict};
use crate::error::{Error, Result};
use crate::history::History;
use crate::selector::check_deadline;
use crate::verifier::Verifier;

/// How a historical response constrains the selected interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceMode {
    /// `(selected & predicate held) -> response`; only false responses prune
    Implication,
    /// `selected -> (predicate held <-> response)`
    #[default]
    Biconditional,
}

impl EvidenceMode {
    fn relate(self, selected: Formula, predicate: Formula, response: bool) -> Formula {
        match self {
            EvidenceMode::Implication => Formula::implies(
                Formula::and([selected, predicate]),
                Formula::Const(response),
            ),
            EvidenceMode::Biconditional => Formula::implies(
                selected,
                Formula::iff(predicate, Formula::Const(response)),
            ),
        }
    }
}

impl FromStr for EvidenceMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "implication" | "implies" => Ok(EvidenceMode::Implication),
            "biconditional" | "iff" => Ok(EvidenceMode::Biconditional),
            other => Err(Error::Configuration(format!(
                "unknown evidence mode '{}' (expected implication or biconditional)",
                other
            ))),
        }
    }
}

impl fmt::Display for EvidenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvidenceMode::Implication => write!(f, "implication"),
            EvidenceMode::Biconditional => write!(f, "biconditional"),
        }
    }
}

/// The interpretations of one verifier that are still possible
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpretationSpace {
    alive: Vec<bool>,
}

impl InterpretationSpace {
    /// Every interpretation still open
    pub fn full(count: usize) -> Self {
        Self {
            alive: vec![true; count],
        }
    }

    /// Total interpretations, eliminated or not
    pub fn len(&self) -> usize {
        self.alive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alive.is_empty()
    }

    /// Interpretations not yet eliminated
    pub fn remaining(&self) -> usize {
        self.alive.iter().filter(|&&alive| alive).count()
    }

    pub fn is_resolved(&self) -> bool {
        self.remaining() == 1
    }

    pub fn contains(&self, index: usize) -> bool {
        self.alive.get(index).copied().unwrap_or(false)
    }

    /// Remove an interpretation; returns whether it was still open
    pub fn eliminate(&mut self, index: usize) -> bool {
        match self.alive.get_mut(index) {
            Some(alive) if *alive => {
                *alive = false;
                true
            }
            _ => false,
        }
    }

    /// Indices still open, ascending
    pub fn open(&self) -> impl Iterator<Item = usize> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, &alive)| alive)
            .map(|(index, _)| index)
    }

    /// The only interpretation left, once resolved
    pub fn resolved_index(&self) -> Option<usize> {
        if self.is_resolved() {
            self.open().next()
        } else {
            None
        }
    }
}

/// A verifier interpretation proven impossible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Elimination {
    pub verifier: usize,
    pub possibility: usize,
}

/// One space per verifier, each sized to the verifier's interpretations
pub(crate) fn check_spaces(verifiers: &[Verifier], spaces: &[InterpretationSpace]) -> Result<()> {
    if spaces.len() != verifiers.len() {
        return Err(Error::Configuration(format!(
            "{} interpretation spaces for {} verifiers",
            spaces.len(),
            verifiers.len()
        )));
    }
    for (index, (verifier, space)) in verifiers.iter().zip(spaces).enumerate() {
        if space.len() != verifier.possibility_count() {
            return Err(Error::Configuration(format!(
                "verifier {} has {} interpretations but its space holds {}",
                index,
                verifier.possibility_count(),
                space.len()
            )));
        }
    }
    Ok(())
}

/// Find interpretations the history rules out.
///
/// Only interpretations still open in `spaces` are tested, so running this
/// twice on the same history and applying the result in between reports
/// nothing the second time. `deadline` is checked before every trial.
pub fn find_impossible<B: Backend>(
    backend: &mut B,
    verifiers: &[Verifier],
    history: &History,
    spaces: &[InterpretationSpace],
    mode: EvidenceMode,
    deadline: Option<Instant>,
) -> Result<Vec<Elimination>> {
    check_spaces(verifiers, spaces)?;
    if let Some(observation) = history
        .iter()
        .find(|obs| obs.responses.len() != verifiers.len())
    {
        return Err(Error::Configuration(format!(
            "observation of {} has {} responses for {} verifiers",
            observation.code,
            observation.responses.len(),
            verifiers.len()
        )));
    }

    let mut baseline = ConstraintStore::new();

    // Fresh selection flags, exactly one per verifier
    let selections: Vec<Vec<BoolVar>> = verifiers
        .iter()
        .map(|verifier| {
            let flags = baseline.new_bools(verifier.possibility_count());
            baseline.assert(Formula::exactly_one(&flags));
            flags
        })
        .collect();

    for observation in history.iter() {
        let old_code = concrete(&observation.code);

        for ((verifier, flags), &response) in verifiers
            .iter()
            .zip(&selections)
            .zip(&observation.responses)
        {
            let options = verifier.possibilities(&old_code);
            for (&flag, option) in flags.iter().zip(options) {
                baseline.assert(mode.relate(Formula::var(flag), option, response));
            }
        }
    }

    if let Verdict::Unsat = backend.check(&baseline)? {
        log::error!(
            "evidence from {} observations is self-contradictory",
            history.len()
        );
        return Err(Error::Contradiction {
            context: "hypothesis elimination".to_string(),
            assertions: baseline.render(),
        });
    }

    let mut impossible = Vec::new();
    for (index, (verifier, flags)) in verifiers.iter().zip(&selections).enumerate() {
        for (possibility, &flag) in flags.iter().enumerate() {
            if !spaces[index].contains(possibility) {
                continue;
            }
            check_deadline(deadline, "hypothesis elimination")?;

            let trial = baseline.with(Formula::var(flag));
            if let Verdict::Unsat = backend.check(&trial)? {
                log::debug!(
                    "verifier {} ({}) cannot be checking {}",
                    index,
                    verifier.public_description(),
                    verifier.describe_possibility(possibility)
                );
                impossible.push(Elimination {
                    verifier: index,
                    possibility,
                });
            }
        }
    }

    Ok(impossible)
}
