//! Per-round guess selection.
//!
//! Builds the round's constraint system (one selection flag per verifier
//! interpretation, exactly one per verifier), throws out interpretation
//! combinations that do not pin down a single code, folds in what the
//! eliminator has learned, and picks the next code to submit.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::code::Code;
use crate::constraint::{BoolVar, ConstraintStore, Formula, SymbolicCode, Verdict};
use crate::eliminator::{check_spaces, find_impossible, EvidenceMode, InterpretationSpace};
use crate::error::{Error, Result};
use crate::history::History;
use crate::verifier::Verifier;

/// Configuration for one round of guess selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorConfig {
    /// Maximum time for one round, checked between solver calls
    pub timeout: Duration,
    /// Largest interpretation product the round will enumerate
    pub max_combinations: usize,
    /// Try not to resubmit codes already in the history
    pub avoid_repeats: bool,
    /// How historical responses constrain interpretations
    pub evidence: EvidenceMode,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_combinations: 100_000,
            avoid_repeats: true,
            evidence: EvidenceMode::default(),
        }
    }
}

/// Statistics for one round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStats {
    /// Interpretation combinations enumerated
    pub combinations: usize,
    /// Combinations forbidden as unsatisfiable or ambiguous
    pub forbidden: usize,
    /// Interpretations newly eliminated this round
    pub eliminated: usize,
    /// Solver calls made this round
    pub solver_calls: usize,
    /// Whether the no-repeat constraint had to be dropped
    pub repeat_fallback: bool,
    pub time_elapsed_ms: u64,
}

/// Result of guess selection
#[derive(Debug, Clone)]
pub struct Selection {
    /// Code to submit next (or the solution, once fully determined)
    pub code: Code,
    /// Every verifier is down to one interpretation
    pub fully_determined: bool,
    pub stats: RoundStats,
}

/// Odometer over one index per verifier
struct Combinations {
    sizes: Vec<usize>,
    current: Option<Vec<usize>>,
}

impl Combinations {
    fn new(sizes: Vec<usize>) -> Self {
        let current = if sizes.iter().all(|&size| size > 0) {
            Some(vec![0; sizes.len()])
        } else {
            None
        };
        Self { sizes, current }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.current.take()?;

        let mut next = current.clone();
        let mut position = next.len();
        let mut carried = true;
        while carried && position > 0 {
            position -= 1;
            next[position] += 1;
            if next[position] == self.sizes[position] {
                next[position] = 0;
            } else {
                carried = false;
            }
        }
        if !carried {
            self.current = Some(next);
        }

        Some(current)
    }
}

/// The round's base system: symbolic code plus selection flags
struct RoundSystem {
    store: ConstraintStore,
    code: SymbolicCode,
    selections: Vec<Vec<BoolVar>>,
}

impl RoundSystem {
    fn build(verifiers: &[Verifier], num_digits: usize) -> Self {
        let mut store = ConstraintStore::new();
        let code = store.new_code(num_digits);

        let mut selections = Vec::with_capacity(verifiers.len());
        for verifier in verifiers {
            let options = verifier.possibilities(&code);
            let flags = store.new_bools(options.len());

            store.assert(Formula::exactly_one(&flags));
            for (&flag, option) in flags.iter().zip(options) {
                store.assert(Formula::implies(Formula::var(flag), option));
            }
            selections.push(flags);
        }

        Self {
            store,
            code,
            selections,
        }
    }

    fn combination(&self, indices: &[usize]) -> Vec<Formula> {
        self.selections
            .iter()
            .zip(indices)
            .map(|(flags, &index)| Formula::var(flags[index]))
            .collect()
    }
}

/// Fail with `BudgetExceeded` once `deadline` has passed. `None` never expires.
pub(crate) fn check_deadline(deadline: Option<Instant>, stage: &str) -> Result<()> {
    match deadline {
        Some(deadline) if Instant::now() > deadline => Err(Error::BudgetExceeded(format!(
            "round deadline passed during {}",
            stage
        ))),
        _ => Ok(()),
    }
}

/// Spaces and verifiers must line up one to one
fn check_shapes(
    verifiers: &[Verifier],
    num_digits: usize,
    spaces: &[InterpretationSpace],
) -> Result<()> {
    if let Some(bad) = verifiers.iter().find(|v| v.num_digits() != num_digits) {
        return Err(Error::Configuration(format!(
            "verifier {} expects {} digits but the round uses {}",
            bad,
            bad.num_digits(),
            num_digits
        )));
    }
    check_spaces(verifiers, spaces)
}

/// Choose the next code to submit.
///
/// `spaces` carries every interpretation eliminated in earlier rounds and is
/// narrowed in place by what this round's history proves.
pub fn select_guess<B: Backend>(
    backend: &mut B,
    verifiers: &[Verifier],
    num_digits: usize,
    history: &History,
    spaces: &mut [InterpretationSpace],
    config: &SelectorConfig,
) -> Result<Selection> {
    check_shapes(verifiers, num_digits, spaces)?;

    let start_time = Instant::now();
    // A timeout too large to represent means no deadline
    let deadline = start_time.checked_add(config.timeout);
    let calls_before = backend.calls();
    let mut stats = RoundStats::default();

    let system = RoundSystem::build(verifiers, num_digits);

    let sizes: Vec<usize> = system.selections.iter().map(Vec::len).collect();
    let total = sizes
        .iter()
        .try_fold(1usize, |acc, &size| acc.checked_mul(size))
        .filter(|&total| total <= config.max_combinations)
        .ok_or_else(|| {
            Error::BudgetExceeded(format!(
                "interpretation product {:?} exceeds {} combinations",
                sizes, config.max_combinations
            ))
        })?;
    log::debug!("enumerating {} interpretation combinations", total);

    // Keep only combinations that pin exactly one code
    let mut forbidden = Vec::new();
    for indices in Combinations::new(sizes) {
        check_deadline(deadline, "combination filtering")?;
        stats.combinations += 1;

        let flags = system.combination(&indices);
        let already_out = indices
            .iter()
            .zip(spaces.iter())
            .any(|(&index, space)| !space.contains(index));

        let keep = !already_out
            && match backend.check(&system.store.with_all(flags.iter().cloned()))? {
                Verdict::Unsat => false,
                Verdict::Sat(model) => {
                    let first = model.code(&system.code).ok_or_else(|| {
                        Error::Solver("model is missing a code digit".to_string())
                    })?;
                    let second = system
                        .store
                        .with_all(flags.iter().cloned())
                        .with(Formula::differs(&system.code, &first));
                    !backend.check(&second)?.is_sat()
                }
            };

        if !keep {
            forbidden.push(Formula::not(Formula::and(flags)));
        }
    }
    stats.forbidden = forbidden.len();

    let mut store = system.store.with_all(forbidden);

    if !history.is_empty() {
        check_deadline(deadline, "hypothesis elimination")?;
        let impossible =
            find_impossible(backend, verifiers, history, spaces, config.evidence, deadline)?;
        for elimination in impossible {
            if let Some(space) = spaces.get_mut(elimination.verifier) {
                if space.eliminate(elimination.possibility) {
                    stats.eliminated += 1;
                }
            }
        }
    }

    // Everything ever eliminated stays out
    for (flags, space) in system.selections.iter().zip(spaces.iter()) {
        for (index, &flag) in flags.iter().enumerate() {
            if !space.contains(index) {
                store.assert(Formula::not(Formula::var(flag)));
            }
        }
    }

    let mut verdict = None;
    if !history.is_empty() && config.avoid_repeats {
        let fresh = store.with_all(
            history
                .codes()
                .map(|old| Formula::differs(&system.code, old)),
        );
        match backend.check(&fresh)? {
            Verdict::Sat(model) => verdict = Some(Verdict::Sat(model)),
            Verdict::Unsat => {
                log::warn!("every consistent code was already tried, allowing a repeat");
                stats.repeat_fallback = true;
            }
        }
    }

    let verdict = match verdict {
        Some(verdict) => verdict,
        None => backend.check(&store)?,
    };

    let model = match verdict {
        Verdict::Sat(model) => model,
        Verdict::Unsat => {
            log::error!("no code satisfies the round's constraints");
            return Err(Error::Contradiction {
                context: "guess selection".to_string(),
                assertions: store.render(),
            });
        }
    };

    let code = model
        .code(&system.code)
        .ok_or_else(|| Error::Solver("model is missing a code digit".to_string()))?;

    for (index, (verifier, space)) in verifiers.iter().zip(spaces.iter()).enumerate() {
        if let Some(resolved) = space.resolved_index() {
            log::debug!(
                "verifier {} ({}) resolved: {}",
                index,
                verifier.public_description(),
                verifier.describe_possibility(resolved)
            );
        }
    }
    let fully_determined = spaces.iter().all(InterpretationSpace::is_resolved);

    stats.solver_calls = backend.calls() - calls_before;
    stats.time_elapsed_ms = start_time.elapsed().as_millis() as u64;

    Ok(Selection {
        code,
        fully_determined,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VarisatBackend;
    use crate::verifier::Rule;

    fn build(rules: &[Rule]) -> Vec<Verifier> {
        rules
            .iter()
            .map(|&rule| Verifier::new(3, rule).unwrap())
            .collect()
    }

    fn scenario() -> Vec<Verifier> {
        build(&[
            Rule::LessThanConstant { position: 0, value: 3 },
            Rule::EvenOdd { position: 0, even: true },
            Rule::IsMinimum { position: 1 },
            Rule::EqualsValue { position: 2, value: 2 },
        ])
    }

    fn full_spaces(verifiers: &[Verifier]) -> Vec<InterpretationSpace> {
        verifiers
            .iter()
            .map(|v| InterpretationSpace::full(v.possibility_count()))
            .collect()
    }

    #[test]
    fn test_combinations_odometer() {
        let all: Vec<Vec<usize>> = Combinations::new(vec![2, 3]).collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![0, 0]);
        assert_eq!(all[1], vec![0, 1]);
        assert_eq!(all[5], vec![1, 2]);

        assert_eq!(Combinations::new(vec![2, 0]).count(), 0);
        assert_eq!(Combinations::new(vec![]).count(), 1);
    }

    #[test]
    fn test_first_round_guess_is_consistent() {
        let verifiers = scenario();
        let mut backend = VarisatBackend::new();
        let mut spaces = full_spaces(&verifiers);

        let selection = select_guess(
            &mut backend,
            &verifiers,
            3,
            &History::new(),
            &mut spaces,
            &SelectorConfig::default(),
        )
        .unwrap();

        assert_eq!(selection.code.len(), 3);
        assert!(selection.code.validate(3).is_ok());
        assert!(!selection.fully_determined);
        assert_eq!(selection.stats.combinations, 81);
        assert_eq!(selection.stats.eliminated, 0);
        assert!(selection.stats.forbidden > 0);
        assert!(spaces.iter().all(|s| s.remaining() == s.len()));
    }

    #[test]
    fn test_guess_avoids_history() {
        let verifiers = scenario();
        let mut backend = VarisatBackend::new();
        let mut spaces = full_spaces(&verifiers);

        let tried = Code::new(&[4, 1, 1]);
        let mut history = History::new();
        let responses = verifiers
            .iter()
            .map(|v| v.evaluate(&tried).unwrap())
            .collect();
        history.record(tried.clone(), responses);

        let selection = select_guess(
            &mut backend,
            &verifiers,
            3,
            &history,
            &mut spaces,
            &SelectorConfig::default(),
        )
        .unwrap();
        assert_ne!(selection.code, tried);
        assert!(!selection.stats.repeat_fallback);
        assert!(selection.stats.eliminated > 0);
    }

    #[test]
    fn test_repeat_fallback_when_only_history_remains() {
        // With every interpretation pinned, only (2, 1, 2) is consistent
        let verifiers = scenario();
        let mut spaces = full_spaces(&verifiers);
        for (space, verifier) in spaces.iter_mut().zip(&verifiers) {
            for index in 0..space.len() {
                if index != verifier.hidden_index() {
                    space.eliminate(index);
                }
            }
        }

        let solution = Code::new(&[2, 1, 2]);
        let mut history = History::new();
        let responses = verifiers
            .iter()
            .map(|v| v.evaluate(&solution).unwrap())
            .collect();
        history.record(solution.clone(), responses);

        let mut backend = VarisatBackend::new();
        let selection = select_guess(
            &mut backend,
            &verifiers,
            3,
            &history,
            &mut spaces,
            &SelectorConfig::default(),
        )
        .unwrap();

        assert!(selection.stats.repeat_fallback);
        assert!(selection.fully_determined);
        assert_eq!(selection.code, solution);
    }

    #[test]
    fn test_combination_cap() {
        let verifiers = scenario();
        let mut backend = VarisatBackend::new();
        let mut spaces = full_spaces(&verifiers);
        let config = SelectorConfig {
            max_combinations: 80,
            ..Default::default()
        };

        let err = select_guess(
            &mut backend,
            &verifiers,
            3,
            &History::new(),
            &mut spaces,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, Error::BudgetExceeded(_)));
    }

    #[test]
    fn test_unbounded_timeout() {
        let verifiers = scenario();
        let mut backend = VarisatBackend::new();
        let mut spaces = full_spaces(&verifiers);
        let config = SelectorConfig {
            timeout: Duration::MAX,
            ..Default::default()
        };

        let selection = select_guess(
            &mut backend,
            &verifiers,
            3,
            &History::new(),
            &mut spaces,
            &config,
        )
        .unwrap();
        assert!(selection.code.validate(3).is_ok());
    }

    #[test]
    fn test_zero_timeout_exceeds_budget() {
        let verifiers = scenario();
        let mut backend = VarisatBackend::new();
        let mut spaces = full_spaces(&verifiers);
        let config = SelectorConfig {
            timeout: Duration::ZERO,
            ..Default::default()
        };

        // The deadline is the start instant, so some trial runs past it
        let result = select_guess(
            &mut backend,
            &verifiers,
            3,
            &History::new(),
            &mut spaces,
            &config,
        );
        assert!(matches!(result, Err(Error::BudgetExceeded(_))));
    }

    #[test]
    fn test_mismatched_spaces_rejected() {
        let verifiers = scenario();
        let mut backend = VarisatBackend::new();

        let mut short = full_spaces(&verifiers);
        short.pop();
        let err = select_guess(
            &mut backend,
            &verifiers,
            3,
            &History::new(),
            &mut short,
            &SelectorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let mut wrong_size = full_spaces(&verifiers);
        wrong_size[2] = InterpretationSpace::full(2);
        let err = select_guess(
            &mut backend,
            &verifiers,
            3,
            &History::new(),
            &mut wrong_size,
            &SelectorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let mut spaces = full_spaces(&verifiers);
        let err = select_guess(
            &mut backend,
            &verifiers,
            4,
            &History::new(),
            &mut spaces,
            &SelectorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn test_unsatisfiable_round_is_contradiction() {
        // No code makes position 0 the strict minimum while equal to 5
        let verifiers = build(&[
            Rule::IsMinimum { position: 0 },
            Rule::EqualsValue { position: 0, value: 5 },
        ]);
        let mut spaces = full_spaces(&verifiers);
        for index in 1..3 {
            spaces[0].eliminate(index);
            spaces[1].eliminate(index);
        }

        let mut backend = VarisatBackend::new();
        let err = select_guess(
            &mut backend,
            &verifiers,
            3,
            &History::new(),
            &mut spaces,
            &SelectorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Contradiction { .. }));
    }
}
