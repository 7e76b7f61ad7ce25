//! Code representation and the digit domain.
//!
//! A code is the fixed-length sequence of digits a player submits. Codes are
//! small, so they live inline in a `SmallVec`.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Smallest digit a code may contain
pub const MIN_DIGIT: u8 = 1;

/// Largest digit a code may contain
pub const MAX_DIGIT: u8 = 5;

/// Number of digits in a code when the game does not say otherwise
pub const DEFAULT_NUM_DIGITS: usize = 3;

/// Check if a value lies in the digit domain
pub fn in_domain(value: u8) -> bool {
    (MIN_DIGIT..=MAX_DIGIT).contains(&value)
}

/// A submitted code - matches the JSON array form `[2, 1, 2]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Code(SmallVec<[u8; 4]>);

impl Code {
    /// Build a code without checking it
    pub fn new(digits: &[u8]) -> Self {
        Self(SmallVec::from_slice(digits))
    }

    /// Build a code and check it against the domain and expected length
    pub fn parse(digits: &[u8], num_digits: usize) -> Result<Self> {
        let code = Self::new(digits);
        code.validate(num_digits)?;
        Ok(code)
    }

    /// Check the length and every digit
    pub fn validate(&self, num_digits: usize) -> Result<()> {
        if self.0.len() != num_digits {
            return Err(Error::Validation(format!(
                "code must have {} digits but it has {}",
                num_digits,
                self.0.len()
            )));
        }

        for (index, &digit) in self.0.iter().enumerate() {
            if !in_domain(digit) {
                return Err(Error::Validation(format!(
                    "code[{}] must be in range [{}, {}] but it's {}",
                    index, MIN_DIGIT, MAX_DIGIT, digit
                )));
            }
        }

        Ok(())
    }

    pub fn digits(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Digit at a position
    pub fn get(&self, position: usize) -> Option<u8> {
        self.0.get(position).copied()
    }

    /// Count how often a digit appears
    pub fn occurrences(&self, digit: u8) -> usize {
        self.0.iter().filter(|&&d| d == digit).count()
    }

    /// Every code of the given length, in lexicographic order
    pub fn all(num_digits: usize) -> Vec<Code> {
        let mut codes = vec![Code(SmallVec::new())];
        for _ in 0..num_digits {
            let mut next = Vec::with_capacity(codes.len() * usize::from(MAX_DIGIT));
            for code in &codes {
                for digit in MIN_DIGIT..=MAX_DIGIT {
                    let mut extended = code.clone();
                    extended.0.push(digit);
                    next.push(extended);
                }
            }
            codes = next;
        }
        codes
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (index, digit) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", digit)?;
        }
        write!(f, ")")
    }
}
