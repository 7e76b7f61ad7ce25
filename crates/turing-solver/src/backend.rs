//! Satisfiability backends.
//!
//! The core only talks to [`Backend`]: hand it a [`ConstraintStore`] and get
//! back a [`Verdict`]. [`VarisatBackend`] lowers the store to CNF and runs the
//! `varisat` CDCL solver on a fresh instance per check, so no state leaks
//! between trials.
//!
//! Lowering:
//! - every digit variable becomes a one-hot group of literals, one per domain
//!   value, with an exactly-one constraint (this is the `[1,5]` bound)
//! - connectives use Tseitin gates with full equivalence, so any subformula
//!   can sit under a negation
//! - `Exactly` uses a unary counter ladder built from the same gates

use varisat::{CnfFormula, ExtendFormula, Lit, Solver};

use crate::code::{MAX_DIGIT, MIN_DIGIT};
use crate::constraint::{CmpOp, ConstraintStore, Formula, Model, Term, Verdict};
use crate::error::{Error, Result};

/// A satisfiability engine
pub trait Backend {
    /// Decide the store; on success the model assigns every declared variable
    fn check(&mut self, store: &ConstraintStore) -> Result<Verdict>;

    /// Number of checks performed so far
    fn calls(&self) -> usize;
}

/// Default backend built on `varisat`
#[derive(Debug, Default)]
pub struct VarisatBackend {
    calls: usize,
}

impl VarisatBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for VarisatBackend {
    fn check(&mut self, store: &ConstraintStore) -> Result<Verdict> {
        self.calls += 1;

        let mut encoder = Encoder::new(store.digit_count(), store.bool_count());
        for formula in store.assertions() {
            encoder.assert(formula);
        }
        if encoder.trivially_unsat {
            return Ok(Verdict::Unsat);
        }

        let mut solver = Solver::new();
        solver.add_formula(&encoder.formula);

        let sat = solver.solve().map_err(|e| Error::Solver(e.to_string()))?;
        if !sat {
            return Ok(Verdict::Unsat);
        }

        let assignment = solver
            .model()
            .ok_or_else(|| Error::Solver("solver reported sat without a model".to_string()))?;
        Ok(Verdict::Sat(encoder.decode(&assignment)))
    }

    fn calls(&self) -> usize {
        self.calls
    }
}

/// Result of lowering a subformula: a literal, or a constant after folding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lowered {
    Const(bool),
    Lit(Lit),
}

impl Lowered {
    fn negate(self) -> Self {
        match self {
            Lowered::Const(value) => Lowered::Const(!value),
            Lowered::Lit(lit) => Lowered::Lit(!lit),
        }
    }
}

/// Translates formulas into a CNF formula
struct Encoder {
    formula: CnfFormula,
    /// One-hot literals per digit variable, indexed by `value - MIN_DIGIT`
    digits: Vec<Vec<Lit>>,
    bools: Vec<Lit>,
    trivially_unsat: bool,
}

impl Encoder {
    fn new(digit_count: usize, bool_count: usize) -> Self {
        let mut formula = CnfFormula::new();

        let mut digits = Vec::with_capacity(digit_count);
        for _ in 0..digit_count {
            let group: Vec<Lit> = (MIN_DIGIT..=MAX_DIGIT)
                .map(|_| Lit::from_var(formula.new_var(), true))
                .collect();

            // At least one value, pairwise at most one
            formula.add_clause(&group);
            for i in 0..group.len() {
                for j in (i + 1)..group.len() {
                    formula.add_clause(&[!group[i], !group[j]]);
                }
            }
            digits.push(group);
        }

        let bools = (0..bool_count)
            .map(|_| Lit::from_var(formula.new_var(), true))
            .collect();

        Self {
            formula,
            digits,
            bools,
            trivially_unsat: false,
        }
    }

    fn fresh(&mut self) -> Lit {
        Lit::from_var(self.formula.new_var(), true)
    }

    /// Add a top-level assertion, turning easy shapes straight into clauses
    fn assert(&mut self, formula: &Formula) {
        match formula {
            Formula::And(operands) => {
                for operand in operands {
                    self.assert(operand);
                }
            }
            Formula::Or(operands) => {
                let lowered: Vec<Lowered> = operands.iter().map(|op| self.lower(op)).collect();
                self.add_disjunction(&lowered);
            }
            Formula::Implies(premise, conclusion) => {
                let lowered = [self.lower(premise).negate(), self.lower(conclusion)];
                self.add_disjunction(&lowered);
            }
            other => {
                let lowered = self.lower(other);
                self.add_disjunction(&[lowered]);
            }
        }
    }

    fn add_disjunction(&mut self, operands: &[Lowered]) {
        let mut clause = Vec::with_capacity(operands.len());
        for operand in operands {
            match *operand {
                Lowered::Const(true) => return,
                Lowered::Const(false) => {}
                Lowered::Lit(lit) => clause.push(lit),
            }
        }
        if clause.is_empty() {
            self.trivially_unsat = true;
        } else {
            self.formula.add_clause(&clause);
        }
    }

    fn lower(&mut self, formula: &Formula) -> Lowered {
        match formula {
            Formula::Const(value) => Lowered::Const(*value),
            Formula::Var(var) => Lowered::Lit(self.bools[var.index()]),
            Formula::Cmp(op, lhs, rhs) => self.lower_cmp(*op, *lhs, *rhs),
            Formula::Parity { term, even } => {
                let matching: Vec<Lowered> = term
                    .domain()
                    .into_iter()
                    .filter(|value| (value % 2 == 0) == *even)
                    .map(|value| self.value_lit(*term, value))
                    .collect();
                self.or_gate(matching)
            }
            Formula::Not(inner) => self.lower(inner).negate(),
            Formula::And(operands) => {
                let lowered = operands.iter().map(|op| self.lower(op)).collect();
                self.and_gate(lowered)
            }
            Formula::Or(operands) => {
                let lowered = operands.iter().map(|op| self.lower(op)).collect();
                self.or_gate(lowered)
            }
            Formula::Implies(premise, conclusion) => {
                let lowered = vec![self.lower(premise).negate(), self.lower(conclusion)];
                self.or_gate(lowered)
            }
            Formula::Iff(lhs, rhs) => {
                let lhs = self.lower(lhs);
                let rhs = self.lower(rhs);
                self.iff_gate(lhs, rhs)
            }
            Formula::Exactly(operands, k) => {
                let lowered = operands.iter().map(|op| self.lower(op)).collect();
                self.exactly_gate(lowered, *k)
            }
        }
    }

    /// Literal for `term == value`
    fn value_lit(&self, term: Term, value: u8) -> Lowered {
        match term {
            Term::Const(constant) => Lowered::Const(constant == value),
            Term::Var(var) => {
                if (MIN_DIGIT..=MAX_DIGIT).contains(&value) {
                    Lowered::Lit(self.digits[var.index()][usize::from(value - MIN_DIGIT)])
                } else {
                    Lowered::Const(false)
                }
            }
        }
    }

    /// Expand a comparison over the finite domains of both sides
    fn lower_cmp(&mut self, op: CmpOp, lhs: Term, rhs: Term) -> Lowered {
        let mut cases = Vec::new();
        for a in lhs.domain() {
            for b in rhs.domain() {
                if op.apply(a, b) {
                    let pair = vec![self.value_lit(lhs, a), self.value_lit(rhs, b)];
                    cases.push(self.and_gate(pair));
                }
            }
        }
        self.or_gate(cases)
    }

    fn and_gate(&mut self, operands: Vec<Lowered>) -> Lowered {
        let mut lits = Vec::with_capacity(operands.len());
        for operand in operands {
            match operand {
                Lowered::Const(false) => return Lowered::Const(false),
                Lowered::Const(true) => {}
                Lowered::Lit(lit) => lits.push(lit),
            }
        }
        match lits.len() {
            0 => Lowered::Const(true),
            1 => Lowered::Lit(lits[0]),
            _ => {
                let gate = self.fresh();
                let mut back = Vec::with_capacity(lits.len() + 1);
                back.push(gate);
                for &lit in &lits {
                    self.formula.add_clause(&[!gate, lit]);
                    back.push(!lit);
                }
                self.formula.add_clause(&back);
                Lowered::Lit(gate)
            }
        }
    }

    fn or_gate(&mut self, operands: Vec<Lowered>) -> Lowered {
        let negated = operands.into_iter().map(Lowered::negate).collect();
        self.and_gate(negated).negate()
    }

    fn iff_gate(&mut self, lhs: Lowered, rhs: Lowered) -> Lowered {
        match (lhs, rhs) {
            (Lowered::Const(a), Lowered::Const(b)) => Lowered::Const(a == b),
            (Lowered::Const(true), other) | (other, Lowered::Const(true)) => other,
            (Lowered::Const(false), other) | (other, Lowered::Const(false)) => other.negate(),
            (Lowered::Lit(a), Lowered::Lit(b)) => {
                let gate = self.fresh();
                self.formula.add_clause(&[!gate, !a, b]);
                self.formula.add_clause(&[!gate, a, !b]);
                self.formula.add_clause(&[gate, a, b]);
                self.formula.add_clause(&[gate, !a, !b]);
                Lowered::Lit(gate)
            }
        }
    }

    /// Exactly `k` operands hold.
    ///
    /// `at_least[j]` tracks "at least j of the operands seen so far", defined
    /// by `at_least'[j] = at_least[j] | (at_least[j-1] & x)`.
    fn exactly_gate(&mut self, operands: Vec<Lowered>, k: usize) -> Lowered {
        let forced = operands
            .iter()
            .filter(|op| **op == Lowered::Const(true))
            .count();
        if forced > k {
            return Lowered::Const(false);
        }
        let k = k - forced;

        let lits: Vec<Lowered> = operands
            .into_iter()
            .filter(|op| matches!(op, Lowered::Lit(_)))
            .collect();
        if k > lits.len() {
            return Lowered::Const(false);
        }

        let mut at_least = vec![Lowered::Const(false); k + 2];
        at_least[0] = Lowered::Const(true);

        for x in lits {
            let mut next = at_least.clone();
            for j in 1..at_least.len() {
                let carried = self.and_gate(vec![at_least[j - 1], x]);
                next[j] = self.or_gate(vec![at_least[j], carried]);
            }
            at_least = next;
        }

        let exceeded = at_least[k + 1].negate();
        self.and_gate(vec![at_least[k], exceeded])
    }

    fn decode(&self, assignment: &[Lit]) -> Model {
        let var_count = self.formula.var_count();
        let mut truth = vec![false; var_count];
        for lit in assignment {
            let index = lit.var().index();
            if index < var_count {
                truth[index] = lit.is_positive();
            }
        }

        let digits = self
            .digits
            .iter()
            .map(|group| {
                group
                    .iter()
                    .position(|lit| truth[lit.var().index()])
                    .map_or(MIN_DIGIT, |offset| MIN_DIGIT + offset as u8)
            })
            .collect();
        let bools = self
            .bools
            .iter()
            .map(|lit| truth[lit.var().index()])
            .collect();

        Model::new(digits, bools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Code;
    use crate::constraint::concrete;

    fn solve(store: &ConstraintStore) -> Verdict {
        VarisatBackend::new().check(store).unwrap()
    }

    #[test]
    fn test_digit_domain() {
        let mut store = ConstraintStore::new();
        let code = store.new_code(1);
        store.assert(Formula::lt(code[0], 1u8));
        assert_eq!(solve(&store), Verdict::Unsat);

        let mut store = ConstraintStore::new();
        let code = store.new_code(1);
        store.assert(Formula::lt(5u8, code[0]));
        assert_eq!(solve(&store), Verdict::Unsat);
    }

    #[test]
    fn test_model_satisfies_assertions() {
        let mut store = ConstraintStore::new();
        let code = store.new_code(3);
        store.assert(Formula::lt(code[0], code[1]));
        store.assert(Formula::lt(code[1], code[2]));
        store.assert(Formula::parity(code[1], true));
        store.assert(Formula::eq(code[0], 1u8));

        let Verdict::Sat(model) = solve(&store) else {
            panic!("expected sat");
        };
        for formula in store.assertions() {
            assert_eq!(formula.eval(&model), Some(true), "violated: {}", formula);
        }
        let found = model.code(&code).unwrap();
        assert_eq!(found.get(0), Some(1));
        assert!(found.get(1) == Some(2) || found.get(1) == Some(4));
    }

    #[test]
    fn test_exactly_counts() {
        for k in 0..=4 {
            let mut store = ConstraintStore::new();
            let code = store.new_code(3);
            store.assert(Formula::exactly(
                code.iter().map(|&t| Formula::eq(t, 3u8)),
                k,
            ));
            let verdict = solve(&store);
            if k <= 3 {
                let Verdict::Sat(model) = verdict else {
                    panic!("expected sat for k = {}", k);
                };
                assert_eq!(model.code(&code).unwrap().occurrences(3), k);
            } else {
                assert_eq!(verdict, Verdict::Unsat);
            }
        }
    }

    #[test]
    fn test_negated_exactly() {
        let mut store = ConstraintStore::new();
        let code = store.new_code(2);
        store.assert(Formula::not(Formula::exactly(
            code.iter().map(|&t| Formula::eq(t, 2u8)),
            1,
        )));
        store.assert(Formula::eq(code[0], 2u8));

        let Verdict::Sat(model) = solve(&store) else {
            panic!("expected sat");
        };
        assert_eq!(model.code(&code), Some(Code::new(&[2, 2])));
    }

    #[test]
    fn test_iff_and_selection() {
        let mut store = ConstraintStore::new();
        let code = store.new_code(1);
        let flags = store.new_bools(2);
        store.assert(Formula::exactly_one(&flags));
        store.assert(Formula::iff(
            Formula::var(flags[0]),
            Formula::eq(code[0], 4u8),
        ));
        store.assert(Formula::not(Formula::var(flags[1])));

        let Verdict::Sat(model) = solve(&store) else {
            panic!("expected sat");
        };
        assert_eq!(model.bool(flags[0]), Some(true));
        assert_eq!(model.bool(flags[1]), Some(false));
        assert_eq!(model.code(&code), Some(Code::new(&[4])));
    }

    #[test]
    fn test_lowering_agrees_with_eval() {
        // Pin the digits, then ask whether each formula can hold and fail
        let formulas = |code: &[Term]| {
            vec![
                Formula::lt(code[0], code[2]),
                Formula::parity(code[1], false),
                Formula::and((1..3).map(|d| Formula::lt(code[0], code[d]))),
                Formula::exactly(code.iter().map(|&t| Formula::eq(t, 1u8)), 2),
                Formula::implies(Formula::eq(code[0], 1u8), Formula::lt(code[1], 3u8)),
            ]
        };

        for digits in [[1u8, 1, 5], [3, 2, 4], [5, 5, 1], [2, 3, 3]] {
            let expected = Code::new(&digits);
            let constants = concrete(&expected);
            let mut base = ConstraintStore::new();
            let code = base.new_code(3);
            for (&term, &digit) in code.iter().zip(&digits) {
                base.assert(Formula::eq(term, digit));
            }

            for (symbolic, constant) in formulas(&code[..]).into_iter().zip(formulas(&constants[..])) {
                let truth = constant.eval(&Model::default()).unwrap();
                assert_eq!(solve(&base.with(symbolic.clone())).is_sat(), truth);
                assert_eq!(solve(&base.with(Formula::not(symbolic))).is_sat(), !truth);
            }
        }
    }

    #[test]
    fn test_trivially_false_assertion() {
        let mut store = ConstraintStore::new();
        store.assert(Formula::Const(false));
        assert_eq!(solve(&store), Verdict::Unsat);
    }

    #[test]
    fn test_calls_counted() {
        let mut backend = VarisatBackend::new();
        let store = ConstraintStore::new();
        backend.check(&store).unwrap();
        backend.check(&store).unwrap();
        assert_eq!(backend.calls(), 2);
    }
}
