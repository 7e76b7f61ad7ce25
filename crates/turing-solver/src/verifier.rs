//! Verifier rules: ground-truth evaluation and the possibility generator.
//!
//! A verifier knows its hidden parameters and can judge any code. The
//! possibility generator is what the player works with: it lists one
//! predicate per way the hidden parameters could be set, over the whole
//! parameter space of the rule kind, without revealing which one is real.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::code::{in_domain, Code, MAX_DIGIT, MIN_DIGIT};
use crate::constraint::{Formula, Term};
use crate::error::{Error, Result};

/// Rule kind plus hidden parameters - matches the JSON game file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    /// Digit at `position` equals `value`; the value is public
    EqualsValue { position: usize, value: u8 },
    /// `digit` appears exactly `count` times; the digit is public
    DuplicateCount { digit: u8, count: usize },
    /// Digit at `position` is below `value`; the value is public
    LessThanConstant { position: usize, value: u8 },
    /// Digit at `position` is even (or odd); the parity is public
    EvenOdd { position: usize, even: bool },
    /// Digit at `first` is below the digit at `second`
    PositionalLessThan { first: usize, second: usize },
    /// Digit at `position` is strictly below every other digit
    IsMinimum { position: usize },
}

/// A verifier with fixed hidden parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Verifier {
    num_digits: usize,
    rule: Rule,
}

fn check_position(name: &str, position: usize, num_digits: usize) -> Result<()> {
    if position >= num_digits {
        return Err(Error::Configuration(format!(
            "{} must be in range [0, {}) but it's {}",
            name, num_digits, position
        )));
    }
    Ok(())
}

fn check_digit(name: &str, value: u8) -> Result<()> {
    if !in_domain(value) {
        return Err(Error::Configuration(format!(
            "{} must be in range [{}, {}] but it's {}",
            name, MIN_DIGIT, MAX_DIGIT, value
        )));
    }
    Ok(())
}

impl Verifier {
    /// Build a verifier, rejecting parameters outside the code shape
    pub fn new(num_digits: usize, rule: Rule) -> Result<Self> {
        if num_digits == 0 {
            return Err(Error::Configuration(
                "codes must have at least one digit".to_string(),
            ));
        }

        match rule {
            Rule::EqualsValue { position, value } => {
                check_position("position", position, num_digits)?;
                check_digit("value", value)?;
            }
            Rule::DuplicateCount { digit, count } => {
                check_digit("digit", digit)?;
                if count > num_digits {
                    return Err(Error::Configuration(format!(
                        "count must be in range [0, {}] but it's {}",
                        num_digits, count
                    )));
                }
            }
            Rule::LessThanConstant { position, .. } | Rule::EvenOdd { position, .. } => {
                check_position("position", position, num_digits)?;
            }
            Rule::PositionalLessThan { first, second } => {
                check_position("position1", first, num_digits)?;
                check_position("position2", second, num_digits)?;
                if first == second {
                    return Err(Error::Configuration(format!(
                        "positions must differ but both are {}",
                        first
                    )));
                }
            }
            Rule::IsMinimum { position } => {
                check_position("position", position, num_digits)?;
            }
        }

        Ok(Self { num_digits, rule })
    }

    pub fn rule(&self) -> Rule {
        self.rule
    }

    pub fn num_digits(&self) -> usize {
        self.num_digits
    }

    /// Judge a code with the hidden parameters
    pub fn evaluate(&self, code: &Code) -> Result<bool> {
        code.validate(self.num_digits)?;
        let digits = code.digits();

        let result = match self.rule {
            Rule::EqualsValue { position, value } => digits[position] == value,
            Rule::DuplicateCount { digit, count } => code.occurrences(digit) == count,
            Rule::LessThanConstant { position, value } => digits[position] < value,
            Rule::EvenOdd { position, even } => (digits[position] % 2 == 0) == even,
            Rule::PositionalLessThan { first, second } => digits[first] < digits[second],
            Rule::IsMinimum { position } => (0..self.num_digits)
                .filter(|&other| other != position)
                .all(|other| digits[position] < digits[other]),
        };
        Ok(result)
    }

    /// One predicate per candidate parameterization, in a fixed order
    pub fn possibilities(&self, code: &[Term]) -> Vec<Formula> {
        let n = code.len();
        match self.rule {
            Rule::EqualsValue { value, .. } => {
                code.iter().map(|&digit| Formula::eq(digit, value)).collect()
            }
            Rule::DuplicateCount { digit, .. } => (0..=n)
                .map(|target| {
                    Formula::exactly(code.iter().map(|&d| Formula::eq(d, digit)), target)
                })
                .collect(),
            Rule::LessThanConstant { value, .. } => {
                code.iter().map(|&digit| Formula::lt(digit, value)).collect()
            }
            Rule::EvenOdd { even, .. } => code
                .iter()
                .map(|&digit| Formula::parity(digit, even))
                .collect(),
            Rule::PositionalLessThan { .. } => ordered_pairs(n)
                .map(|(first, second)| Formula::lt(code[first], code[second]))
                .collect(),
            Rule::IsMinimum { .. } => (0..n)
                .map(|target| {
                    Formula::and(
                        (0..n)
                            .filter(|&other| other != target)
                            .map(|other| Formula::lt(code[target], code[other])),
                    )
                })
                .collect(),
        }
    }

    /// Length of the list `possibilities` returns
    pub fn possibility_count(&self) -> usize {
        let n = self.num_digits;
        match self.rule {
            Rule::DuplicateCount { .. } => n + 1,
            Rule::PositionalLessThan { .. } => n * (n - 1),
            _ => n,
        }
    }

    /// Index of the possibility that matches the hidden parameters
    pub fn hidden_index(&self) -> usize {
        match self.rule {
            Rule::EqualsValue { position, .. }
            | Rule::LessThanConstant { position, .. }
            | Rule::EvenOdd { position, .. }
            | Rule::IsMinimum { position } => position,
            Rule::DuplicateCount { count, .. } => count,
            Rule::PositionalLessThan { first, second } => {
                let column = if second > first { second - 1 } else { second };
                first * (self.num_digits - 1) + column
            }
        }
    }

    /// What a player sees on the card: the kind plus any public parameter
    pub fn public_description(&self) -> String {
        match self.rule {
            Rule::EqualsValue { value, .. } => format!("EqualsValue({})", value),
            Rule::DuplicateCount { digit, .. } => format!("DuplicateCount({})", digit),
            Rule::LessThanConstant { value, .. } => format!("LessThanConstant({})", value),
            Rule::EvenOdd { even, .. } => {
                format!("EvenOdd({})", if even { "even" } else { "odd" })
            }
            Rule::PositionalLessThan { .. } => "PositionalLessThan".to_string(),
            Rule::IsMinimum { .. } => "IsMinimum".to_string(),
        }
    }

    /// Describe one possibility in terms of the hidden parameters it stands for
    pub fn describe_possibility(&self, index: usize) -> String {
        match self.rule {
            Rule::EqualsValue { value, .. } => format!("code[{}] == {}", index, value),
            Rule::DuplicateCount { digit, .. } => format!("{} appears {} times", digit, index),
            Rule::LessThanConstant { value, .. } => format!("code[{}] < {}", index, value),
            Rule::EvenOdd { even, .. } => {
                format!("code[{}] is {}", index, if even { "even" } else { "odd" })
            }
            Rule::PositionalLessThan { .. } => match ordered_pairs(self.num_digits).nth(index) {
                Some((first, second)) => format!("code[{}] < code[{}]", first, second),
                None => format!("possibility {}", index),
            },
            Rule::IsMinimum { .. } => format!("code[{}] is the minimum", index),
        }
    }
}

/// Ordered pairs of distinct positions, row-major
fn ordered_pairs(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n).flat_map(move |first| {
        (0..n)
            .filter(move |&second| second != first)
            .map(move |second| (first, second))
    })
}

impl fmt::Display for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rule {
            Rule::EqualsValue { position, value } => {
                write!(f, "EqualsValue(position={}, value={})", position, value)
            }
            Rule::DuplicateCount { digit, count } => {
                write!(f, "DuplicateCount(digit={}, count={})", digit, count)
            }
            Rule::LessThanConstant { position, value } => {
                write!(f, "LessThanConstant(position={}, value={})", position, value)
            }
            Rule::EvenOdd { position, even } => write!(
                f,
                "EvenOdd(position={}, {})",
                position,
                if even { "even" } else { "odd" }
            ),
            Rule::PositionalLessThan { first, second } => {
                write!(f, "PositionalLessThan(position1={}, position2={})", first, second)
            }
            Rule::IsMinimum { position } => write!(f, "IsMinimum(position={})", position),
        }
    }
}
