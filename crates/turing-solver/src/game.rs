//! The game loop: pick a code, hear the verifiers out, repeat.
//!
//! The loop owns everything that survives between rounds: the history of
//! observations and the per-verifier interpretation spaces. Both are handed
//! to the selector by reference each round.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::code::{Code, DEFAULT_NUM_DIGITS};
use crate::eliminator::InterpretationSpace;
use crate::error::{Error, Result};
use crate::history::History;
use crate::selector::{select_guess, RoundStats, SelectorConfig};
use crate::verifier::{Rule, Verifier};

/// Configuration for a whole game
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    /// Digits per code
    pub num_digits: usize,
    /// Rounds played before giving up
    pub max_rounds: usize,
    pub selector: SelectorConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            num_digits: DEFAULT_NUM_DIGITS,
            max_rounds: 100,
            selector: SelectorConfig::default(),
        }
    }
}

/// Where the game stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    Playing,
    Solved,
    Failed,
}

/// What happened in one round
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecord {
    /// 1-based round number
    pub round: usize,
    pub code: Code,
    /// Responses in verifier order; empty when the round only declared the solution
    pub responses: Vec<bool>,
    /// Open interpretations per verifier after this round's elimination
    pub remaining: Vec<usize>,
    /// Verifiers down to a single interpretation
    pub resolved: Vec<usize>,
    pub fully_determined: bool,
    pub stats: RoundStats,
}

/// Final report of a game
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOutcome {
    pub state: GameState,
    pub rounds: Vec<RoundRecord>,
    /// Code declared as the solution, if the game was solved
    pub solution: Option<Code>,
    /// The declared solution passes every verifier
    pub valid: bool,
    /// Codes actually submitted to the verifiers
    pub guesses: usize,
    pub solver_calls: usize,
    pub time_elapsed_ms: u64,
}

/// The reference setup: the solution is `(2, 1, 2)`
pub fn default_scenario() -> Vec<Rule> {
    vec![
        Rule::LessThanConstant { position: 0, value: 3 },
        Rule::EvenOdd { position: 0, even: true },
        Rule::IsMinimum { position: 1 },
        Rule::EqualsValue { position: 2, value: 2 },
    ]
}

/// A game in progress
#[derive(Debug, Clone)]
pub struct Game {
    verifiers: Vec<Verifier>,
    config: GameConfig,
    history: History,
    spaces: Vec<InterpretationSpace>,
    state: GameState,
}

impl Game {
    /// Set up a game over already-built verifiers
    pub fn new(verifiers: Vec<Verifier>, config: GameConfig) -> Result<Self> {
        if verifiers.is_empty() {
            return Err(Error::Configuration(
                "a game needs at least one verifier".to_string(),
            ));
        }
        if let Some(bad) = verifiers
            .iter()
            .find(|v| v.num_digits() != config.num_digits)
        {
            return Err(Error::Configuration(format!(
                "verifier {} expects {} digits but the game uses {}",
                bad,
                bad.num_digits(),
                config.num_digits
            )));
        }

        let spaces = verifiers
            .iter()
            .map(|v| InterpretationSpace::full(v.possibility_count()))
            .collect();

        Ok(Self {
            verifiers,
            config,
            history: History::new(),
            spaces,
            state: GameState::Playing,
        })
    }

    /// Set up a game from rules, checking each against the code length
    pub fn from_rules(rules: &[Rule], config: GameConfig) -> Result<Self> {
        let verifiers = rules
            .iter()
            .map(|&rule| Verifier::new(config.num_digits, rule))
            .collect::<Result<Vec<_>>>()?;
        Self::new(verifiers, config)
    }

    pub fn verifiers(&self) -> &[Verifier] {
        &self.verifiers
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn spaces(&self) -> &[InterpretationSpace] {
        &self.spaces
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Public card descriptions, one line per verifier
    pub fn public_report(&self) -> Vec<String> {
        self.verifiers
            .iter()
            .enumerate()
            .map(|(index, v)| format!("Verifier {}: {}", index, v.public_description()))
            .collect()
    }

    /// Hidden parameters, one line per verifier
    pub fn hidden_report(&self) -> Vec<String> {
        self.verifiers
            .iter()
            .enumerate()
            .map(|(index, v)| format!("Verifier {}: {}", index, v))
            .collect()
    }

    /// Ask every verifier about a code
    pub fn respond(&self, code: &Code) -> Result<Vec<bool>> {
        self.verifiers.iter().map(|v| v.evaluate(code)).collect()
    }

    /// Play one round. Returns the record and moves the state on.
    pub fn play_round<B: Backend>(&mut self, backend: &mut B, round: usize) -> Result<RoundRecord> {
        let selection = select_guess(
            backend,
            &self.verifiers,
            self.config.num_digits,
            &self.history,
            &mut self.spaces,
            &self.config.selector,
        )?;

        let mut responses = Vec::new();
        if selection.fully_determined {
            self.state = GameState::Solved;
        } else {
            responses = self.respond(&selection.code)?;
            self.history
                .record(selection.code.clone(), responses.clone());
            if responses.iter().all(|&r| r) {
                self.state = GameState::Solved;
            }
        }

        Ok(RoundRecord {
            round,
            code: selection.code,
            responses,
            remaining: self.spaces.iter().map(InterpretationSpace::remaining).collect(),
            resolved: self
                .spaces
                .iter()
                .enumerate()
                .filter(|(_, space)| space.is_resolved())
                .map(|(index, _)| index)
                .collect(),
            fully_determined: selection.fully_determined,
            stats: selection.stats,
        })
    }

    /// Play until solved or out of rounds
    pub fn run<B: Backend>(&mut self, backend: &mut B) -> Result<GameOutcome> {
        let start_time = Instant::now();
        let calls_before = backend.calls();
        let mut rounds = Vec::new();

        for round in 1..=self.config.max_rounds {
            let record = self.play_round(backend, round)?;
            log::info!(
                "round {}: {} -> {:?} (open interpretations {:?})",
                round,
                record.code,
                record.responses,
                record.remaining
            );
            rounds.push(record);

            if self.state == GameState::Solved {
                break;
            }
        }

        let mut solution = None;
        let mut valid = false;
        if self.state == GameState::Solved {
            if let Some(last) = rounds.last() {
                valid = self.respond(&last.code)?.iter().all(|&r| r);
                solution = Some(last.code.clone());
            }
            if !valid {
                log::error!("declared solution fails re-evaluation");
            }
        } else {
            log::warn!(
                "no solution after {} rounds",
                self.config.max_rounds
            );
            self.state = GameState::Failed;
        }

        Ok(GameOutcome {
            state: self.state,
            guesses: self.history.len(),
            rounds,
            solution,
            valid,
            solver_calls: backend.calls() - calls_before,
            time_elapsed_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VarisatBackend;
    use crate::eliminator::EvidenceMode;

    fn config_with(evidence: EvidenceMode) -> GameConfig {
        GameConfig {
            selector: SelectorConfig {
                evidence,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn play(rules: &[Rule], config: GameConfig) -> GameOutcome {
        let mut game = Game::from_rules(rules, config).unwrap();
        let mut backend = VarisatBackend::new();
        game.run(&mut backend).unwrap()
    }

    #[test]
    fn test_scenario_solved_in_both_modes() {
        for mode in [EvidenceMode::Biconditional, EvidenceMode::Implication] {
            let outcome = play(&default_scenario(), config_with(mode));

            assert_eq!(outcome.state, GameState::Solved, "{}", mode);
            assert!(outcome.valid, "{}", mode);
            assert_eq!(outcome.solution, Some(Code::new(&[2, 1, 2])), "{}", mode);
            assert!(outcome.rounds.len() <= 100);
        }
    }

    #[test]
    fn test_interpretation_counts_never_grow() {
        let rules = [
            Rule::DuplicateCount { digit: 3, count: 2 },
            Rule::IsMinimum { position: 2 },
            Rule::LessThanConstant { position: 2, value: 2 },
        ];
        let outcome = play(&rules, GameConfig::default());

        assert_eq!(outcome.state, GameState::Solved);
        assert!(outcome.valid);
        assert_eq!(outcome.solution, Some(Code::new(&[3, 3, 1])));
        let last = outcome.rounds.last().unwrap();
        if last.fully_determined {
            assert_eq!(last.resolved, vec![0, 1, 2]);
        }
        for pair in outcome.rounds.windows(2) {
            for (before, after) in pair[0].remaining.iter().zip(&pair[1].remaining) {
                assert!(after <= before);
            }
        }
    }

    #[test]
    fn test_positional_game_solved() {
        let rules = [
            Rule::PositionalLessThan { first: 0, second: 1 },
            Rule::EqualsValue { position: 0, value: 4 },
            Rule::EvenOdd { position: 1, even: false },
            Rule::LessThanConstant { position: 2, value: 2 },
        ];
        let outcome = play(&rules, GameConfig::default());

        assert_eq!(outcome.state, GameState::Solved);
        assert!(outcome.valid);
        assert_eq!(outcome.solution, Some(Code::new(&[4, 5, 1])));
    }

    #[test]
    fn test_submitted_codes_are_distinct() {
        let outcome = play(&default_scenario(), GameConfig::default());
        let submitted: Vec<&Code> = outcome
            .rounds
            .iter()
            .filter(|r| !r.responses.is_empty())
            .map(|r| &r.code)
            .collect();
        for (i, a) in submitted.iter().enumerate() {
            for b in &submitted[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_round_cap_fails() {
        let config = GameConfig {
            max_rounds: 0,
            ..Default::default()
        };
        let outcome = play(&default_scenario(), config);

        assert_eq!(outcome.state, GameState::Failed);
        assert!(outcome.solution.is_none());
        assert!(!outcome.valid);
    }

    #[test]
    fn test_bad_position_rejected_before_play() {
        let rules = [Rule::PositionalLessThan { first: 3, second: 0 }];
        let err = Game::from_rules(&rules, GameConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_mismatched_digit_count_rejected() {
        let verifier = Verifier::new(4, Rule::IsMinimum { position: 3 }).unwrap();
        let err = Game::new(vec![verifier], GameConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_reports() {
        let game = Game::from_rules(&default_scenario(), GameConfig::default()).unwrap();
        assert_eq!(game.public_report()[1], "Verifier 1: EvenOdd(even)");
        assert_eq!(
            game.hidden_report()[2],
            "Verifier 2: IsMinimum(position=1)"
        );
    }
}
