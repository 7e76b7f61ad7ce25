//! Symbolic constraint language and the immutable constraint store.
//!
//! Formulas are built over two kinds of variables: bounded digit variables
//! (one per code position) and boolean selection variables. A
//! [`ConstraintStore`] is a value: cloning it is cheap, and assertions added
//! to a clone never show up in the store it was derived from. This is what
//! makes every solver trial side-effect free.

use std::fmt;
use std::sync::Arc;

use crate::code::{Code, MAX_DIGIT, MIN_DIGIT};

/// A boolean variable (selection flags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoolVar(u32);

impl BoolVar {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A digit variable ranging over `[MIN_DIGIT, MAX_DIGIT]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DigitVar(u32);

impl DigitVar {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A digit-valued term: either a symbolic digit or a constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Term {
    Var(DigitVar),
    Const(u8),
}

impl Term {
    /// Evaluate under a model. `None` if the variable is unassigned.
    pub fn eval(self, model: &Model) -> Option<u8> {
        match self {
            Term::Var(var) => model.digit(var),
            Term::Const(value) => Some(value),
        }
    }

    /// Values this term can take
    pub fn domain(self) -> Vec<u8> {
        match self {
            Term::Var(_) => (MIN_DIGIT..=MAX_DIGIT).collect(),
            Term::Const(value) => vec![value],
        }
    }
}

impl From<u8> for Term {
    fn from(value: u8) -> Self {
        Term::Const(value)
    }
}

impl From<DigitVar> for Term {
    fn from(var: DigitVar) -> Self {
        Term::Var(var)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(var) => write!(f, "d{}", var.0),
            Term::Const(value) => write!(f, "{}", value),
        }
    }
}

/// A code as seen by the constraint layer, one term per position
pub type SymbolicCode = Vec<Term>;

/// Lift a concrete code into constant terms
pub fn concrete(code: &Code) -> SymbolicCode {
    code.digits().iter().map(|&digit| Term::Const(digit)).collect()
}

/// Comparison between two digit terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Lt,
}

impl CmpOp {
    pub fn apply(self, lhs: u8, rhs: u8) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Lt => lhs < rhs,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Lt => "<",
        }
    }
}

/// A boolean formula over digit and selection variables
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Const(bool),
    Var(BoolVar),
    Cmp(CmpOp, Term, Term),
    /// Parity of a digit; `even == true` means divisible by two
    Parity { term: Term, even: bool },
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Implies(Box<Formula>, Box<Formula>),
    Iff(Box<Formula>, Box<Formula>),
    /// Exactly `k` of the operands hold
    Exactly(Vec<Formula>, usize),
}

impl Formula {
    pub fn var(var: BoolVar) -> Self {
        Formula::Var(var)
    }

    pub fn eq(lhs: impl Into<Term>, rhs: impl Into<Term>) -> Self {
        Formula::Cmp(CmpOp::Eq, lhs.into(), rhs.into())
    }

    pub fn lt(lhs: impl Into<Term>, rhs: impl Into<Term>) -> Self {
        Formula::Cmp(CmpOp::Lt, lhs.into(), rhs.into())
    }

    pub fn parity(term: impl Into<Term>, even: bool) -> Self {
        Formula::Parity {
            term: term.into(),
            even,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(formula: Formula) -> Self {
        Formula::Not(Box::new(formula))
    }

    pub fn and(operands: impl IntoIterator<Item = Formula>) -> Self {
        Formula::And(operands.into_iter().collect())
    }

    pub fn or(operands: impl IntoIterator<Item = Formula>) -> Self {
        Formula::Or(operands.into_iter().collect())
    }

    pub fn implies(premise: Formula, conclusion: Formula) -> Self {
        Formula::Implies(Box::new(premise), Box::new(conclusion))
    }

    pub fn iff(lhs: Formula, rhs: Formula) -> Self {
        Formula::Iff(Box::new(lhs), Box::new(rhs))
    }

    pub fn exactly(operands: impl IntoIterator<Item = Formula>, k: usize) -> Self {
        Formula::Exactly(operands.into_iter().collect(), k)
    }

    /// Exactly one of the given selection variables holds
    pub fn exactly_one(vars: &[BoolVar]) -> Self {
        Formula::exactly(vars.iter().map(|&var| Formula::Var(var)), 1)
    }

    /// The symbolic code differs from `code` in at least one position
    pub fn differs(symbolic: &[Term], code: &Code) -> Self {
        Formula::or(
            symbolic
                .iter()
                .zip(code.digits())
                .map(|(&term, &digit)| Formula::not(Formula::eq(term, digit))),
        )
    }

    /// Evaluate under a model. `None` if a referenced variable is unassigned.
    pub fn eval(&self, model: &Model) -> Option<bool> {
        match self {
            Formula::Const(value) => Some(*value),
            Formula::Var(var) => model.bool(*var),
            Formula::Cmp(op, lhs, rhs) => Some(op.apply(lhs.eval(model)?, rhs.eval(model)?)),
            Formula::Parity { term, even } => Some((term.eval(model)? % 2 == 0) == *even),
            Formula::Not(inner) => Some(!inner.eval(model)?),
            Formula::And(operands) => {
                let mut result = true;
                for operand in operands {
                    result &= operand.eval(model)?;
                }
                Some(result)
            }
            Formula::Or(operands) => {
                let mut result = false;
                for operand in operands {
                    result |= operand.eval(model)?;
                }
                Some(result)
            }
            Formula::Implies(premise, conclusion) => {
                Some(!premise.eval(model)? || conclusion.eval(model)?)
            }
            Formula::Iff(lhs, rhs) => Some(lhs.eval(model)? == rhs.eval(model)?),
            Formula::Exactly(operands, k) => {
                let mut count = 0;
                for operand in operands {
                    if operand.eval(model)? {
                        count += 1;
                    }
                }
                Some(count == *k)
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, operands: &[Formula], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (index, operand) in operands.iter().enumerate() {
        if index > 0 {
            write!(f, " {} ", sep)?;
        }
        write!(f, "{}", operand)?;
    }
    write!(f, ")")
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Const(value) => write!(f, "{}", value),
            Formula::Var(var) => write!(f, "s{}", var.0),
            Formula::Cmp(op, lhs, rhs) => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            Formula::Parity { term, even } => {
                write!(f, "{} % 2 == {}", term, if *even { 0 } else { 1 })
            }
            Formula::Not(inner) => write!(f, "!({})", inner),
            Formula::And(operands) => write_joined(f, operands, "&"),
            Formula::Or(operands) => write_joined(f, operands, "|"),
            Formula::Implies(premise, conclusion) => write!(f, "({} -> {})", premise, conclusion),
            Formula::Iff(lhs, rhs) => write!(f, "({} <-> {})", lhs, rhs),
            Formula::Exactly(operands, k) => {
                write!(f, "exactly {} of ", k)?;
                write_joined(f, operands, ",")
            }
        }
    }
}

/// An assignment of every declared variable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    digits: Vec<u8>,
    bools: Vec<bool>,
}

impl Model {
    pub fn new(digits: Vec<u8>, bools: Vec<bool>) -> Self {
        Self { digits, bools }
    }

    pub fn digit(&self, var: DigitVar) -> Option<u8> {
        self.digits.get(var.index()).copied()
    }

    pub fn bool(&self, var: BoolVar) -> Option<bool> {
        self.bools.get(var.index()).copied()
    }

    /// Read a concrete code out of the model
    pub fn code(&self, symbolic: &[Term]) -> Option<Code> {
        let digits: Option<Vec<u8>> = symbolic.iter().map(|term| term.eval(self)).collect();
        digits.map(|d| Code::new(&d))
    }
}

/// Outcome of a satisfiability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Sat(Model),
    Unsat,
}

impl Verdict {
    pub fn is_sat(&self) -> bool {
        matches!(self, Verdict::Sat(_))
    }
}

/// One link of the shared assertion list
#[derive(Debug)]
struct Node {
    formula: Formula,
    next: Option<Arc<Node>>,
}

/// Immutable set of assertions plus variable declarations.
///
/// Assertions form a persistent list that is shared between a store and every
/// store derived from it; `assert` on a clone only prepends to the clone.
#[derive(Debug, Clone, Default)]
pub struct ConstraintStore {
    head: Option<Arc<Node>>,
    len: usize,
    digit_count: u32,
    bool_count: u32,
}

impl ConstraintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a fresh digit variable
    pub fn new_digit(&mut self) -> DigitVar {
        let var = DigitVar(self.digit_count);
        self.digit_count += 1;
        var
    }

    /// Declare one fresh digit per position
    pub fn new_code(&mut self, num_digits: usize) -> SymbolicCode {
        (0..num_digits).map(|_| Term::Var(self.new_digit())).collect()
    }

    /// Declare a fresh boolean variable
    pub fn new_bool(&mut self) -> BoolVar {
        let var = BoolVar(self.bool_count);
        self.bool_count += 1;
        var
    }

    /// Declare `count` fresh boolean variables
    pub fn new_bools(&mut self, count: usize) -> Vec<BoolVar> {
        (0..count).map(|_| self.new_bool()).collect()
    }

    pub fn assert(&mut self, formula: Formula) {
        let next = self.head.take();
        self.head = Some(Arc::new(Node { formula, next }));
        self.len += 1;
    }

    /// Derive a new store with one more assertion
    pub fn with(&self, formula: Formula) -> Self {
        let mut derived = self.clone();
        derived.assert(formula);
        derived
    }

    /// Derive a new store with several more assertions
    pub fn with_all(&self, formulas: impl IntoIterator<Item = Formula>) -> Self {
        let mut derived = self.clone();
        for formula in formulas {
            derived.assert(formula);
        }
        derived
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn digit_count(&self) -> usize {
        self.digit_count as usize
    }

    pub fn bool_count(&self) -> usize {
        self.bool_count as usize
    }

    /// Assertions in the order they were added
    pub fn assertions(&self) -> Vec<&Formula> {
        let mut formulas = Vec::with_capacity(self.len);
        let mut cursor = self.head.as_deref();
        while let Some(node) = cursor {
            formulas.push(&node.formula);
            cursor = node.next.as_deref();
        }
        formulas.reverse();
        formulas
    }

    /// Human-readable dump of every assertion
    pub fn render(&self) -> Vec<String> {
        self.assertions().iter().map(|f| f.to_string()).collect()
    }
}

impl Drop for ConstraintStore {
    fn drop(&mut self) {
        // Unlink iteratively so long lists don't recurse on drop
        let mut cursor = self.head.take();
        while let Some(node) = cursor {
            match Arc::try_unwrap(node) {
                Ok(mut node) => cursor = node.next.take(),
                Err(_) => break,
            }
        }
    }
}
