//! Built-in decision procedure
//!
//! DPLL over the boolean atom skeleton: pick an innermost atom,
//! branch by substituting it with true/false (the smart constructors
//! fold the formulas), and hand each fully decided branch to the
//! theory layer. The theory layer turns decided comparison atoms into
//! `<= 0` linear constraints, refutes via interval propagation, and
//! searches interval corners for a candidate model which is then
//! verified against the original assertions by evaluation. Candidate
//! search failure yields `Unknown`, never an unsound verdict.

use rustc_hash::FxHashMap;

use crate::features::smt::domain::{Sort, Term, TermId, Value};

use super::context::SmtContext;
use super::linear::{propagate, Interval, LeZero, LinearSum};

/// Variable assignment model
pub type Model = FxHashMap<String, Value>;

/// Result of a `check`
#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Sat(Model),
    Unsat,
    Unknown,
}

impl SatResult {
    pub fn is_sat(&self) -> bool {
        matches!(self, SatResult::Sat(_))
    }
}

/// Bound on interval-corner combinations tried per branch
const MAX_CANDIDATES: usize = 4096;

pub(crate) fn solve(smt: &mut SmtContext, assertions: &[TermId], node_budget: usize) -> SatResult {
    let mut formulas = Vec::new();
    for &assertion in assertions {
        match smt.bool_literal(assertion) {
            Some(true) => {}
            Some(false) => return SatResult::Unsat,
            None => formulas.push(assertion),
        }
    }
    if formulas.is_empty() {
        return SatResult::Sat(Model::default());
    }
    let mut search = Search {
        assertions: assertions.to_vec(),
        nodes: 0,
        node_budget,
        saw_unknown: false,
    };
    match search.dpll(smt, formulas, &mut Vec::new()) {
        Some(model) => SatResult::Sat(model),
        None if search.saw_unknown => SatResult::Unknown,
        None => SatResult::Unsat,
    }
}

struct Search {
    assertions: Vec<TermId>,
    nodes: usize,
    node_budget: usize,
    saw_unknown: bool,
}

impl Search {
    fn dpll(
        &mut self,
        smt: &mut SmtContext,
        formulas: Vec<TermId>,
        decided: &mut Vec<(TermId, bool)>,
    ) -> Option<Model> {
        self.nodes += 1;
        if self.nodes > self.node_budget {
            self.saw_unknown = true;
            return None;
        }

        let mut open = Vec::new();
        for &formula in &formulas {
            match smt.bool_literal(formula) {
                Some(true) => {}
                Some(false) => return None,
                None => open.push(formula),
            }
        }
        if open.is_empty() {
            return self.theory_check(smt, decided);
        }

        let atom = match open.iter().find_map(|&f| find_atom(smt, f)) {
            Some(atom) => atom,
            None => {
                // no branchable atom left although the formulas are
                // not decided, e.g. purely nondeterministic structure
                self.saw_unknown = true;
                return None;
            }
        };

        for value in [true, false] {
            let literal = smt.mk_bool(value);
            let substituted: Vec<_> = open
                .iter()
                .map(|&f| smt.substitute(f, atom, literal))
                .collect();
            decided.push((atom, value));
            if let Some(model) = self.dpll(smt, substituted, decided) {
                decided.pop();
                return Some(model);
            }
            decided.pop();
        }
        None
    }

    /// All boolean atoms are decided; check the conjunction of the
    /// induced theory literals and look for a verified model.
    fn theory_check(
        &mut self,
        smt: &mut SmtContext,
        decided: &[(TermId, bool)],
    ) -> Option<Model> {
        let mut model = Model::default();
        let mut constraints: Vec<LeZero> = Vec::new();

        for (index, &(atom, value)) in decided.iter().enumerate() {
            // inner decisions may occur inside this atom's operands
            let mut resolved = atom;
            for &(earlier, earlier_value) in &decided[..index] {
                let literal = smt.mk_bool(earlier_value);
                resolved = smt.substitute(resolved, earlier, literal);
            }
            match smt.term(resolved).clone() {
                Term::Literal(Value::Bool(folded)) => {
                    if folded != value {
                        return None;
                    }
                }
                Term::Constant {
                    name,
                    sort: Sort::Bool,
                } => {
                    if let Some(previous) = model.insert(name, Value::Bool(value)) {
                        debug_assert_eq!(previous, Value::Bool(value));
                    }
                }
                Term::Eq(a, b) if smt.sort_of(a) == Sort::Int => {
                    match (LinearSum::from_term(smt, a), LinearSum::from_term(smt, b)) {
                        (Some(left), Some(right)) if value => {
                            // a = b becomes a - b <= 0 and b - a <= 0
                            let difference = left.sub(&right);
                            constraints.push(LeZero(difference.clone()));
                            constraints.push(LeZero(difference.negated()));
                        }
                        (Some(_), Some(_)) => {
                            // disequality only participates in the
                            // verification step
                        }
                        _ => {}
                    }
                }
                Term::Lt(a, b) => match (LinearSum::from_term(smt, a), LinearSum::from_term(smt, b))
                {
                    (Some(left), Some(right)) => {
                        if value {
                            // a < b: a - b + 1 <= 0
                            constraints.push(LeZero(left.sub(&right).offset(1)));
                        } else {
                            // not (a < b): b - a <= 0
                            constraints.push(LeZero(right.sub(&left)));
                        }
                    }
                    _ => {}
                },
                Term::Le(a, b) => match (LinearSum::from_term(smt, a), LinearSum::from_term(smt, b))
                {
                    (Some(left), Some(right)) => {
                        if value {
                            constraints.push(LeZero(left.sub(&right)));
                        } else {
                            // not (a <= b): b - a + 1 <= 0
                            constraints.push(LeZero(right.sub(&left).offset(1)));
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        let mut intervals: FxHashMap<String, Interval> = FxHashMap::default();
        if !propagate(&constraints, &mut intervals) {
            // an included subset of the literals is infeasible, the
            // whole branch is
            return None;
        }

        // every integer constant of the query participates in the
        // candidate search
        let assertions = self.assertions.clone();
        let mut integer_names = Vec::new();
        for &assertion in &assertions {
            for (name, sort) in smt.uninterpreted_constants(assertion).iter() {
                if *sort == Sort::Int && !integer_names.contains(name) {
                    integer_names.push(name.clone());
                }
                if *sort == Sort::Bool && !model.contains_key(name) {
                    model.insert(name.clone(), Value::Bool(false));
                }
            }
        }

        let candidates: Vec<Vec<i64>> = integer_names
            .iter()
            .map(|name| candidate_values(intervals.get(name).copied()))
            .collect();

        let mut combinations: usize = 1;
        for candidate in &candidates {
            combinations = combinations.saturating_mul(candidate.len());
        }
        if combinations == 0 {
            // an interval collapsed below the i32 range
            return None;
        }
        if combinations > MAX_CANDIDATES {
            self.saw_unknown = true;
            return None;
        }

        for mut combination in 0..combinations {
            let mut attempt = model.clone();
            for (slot, name) in integer_names.iter().enumerate() {
                let values = &candidates[slot];
                let value = values[combination % values.len()];
                combination /= values.len();
                attempt.insert(name.clone(), Value::Int(value as i32));
            }
            if self.verify(smt, &attempt) {
                return Some(attempt);
            }
        }

        // the corner search is incomplete; failing to find a witness
        // proves nothing
        self.saw_unknown = true;
        None
    }

    fn verify(&self, smt: &SmtContext, model: &Model) -> bool {
        self.assertions.iter().all(|&assertion| {
            smt.eval(assertion, &|name, _| model.get(name).copied())
                == Some(Value::Bool(true))
        })
    }
}

/// Innermost-leftmost branchable atom of a formula, or `None` when
/// the formula contains none (post-order search).
fn find_atom(smt: &SmtContext, term: TermId) -> Option<TermId> {
    let node = smt.term(term);
    for child in node.children() {
        if let Some(atom) = find_atom(smt, child) {
            return Some(atom);
        }
    }
    match node {
        Term::Constant {
            sort: Sort::Bool, ..
        } => Some(term),
        Term::Eq(a, _) if smt.sort_of(*a) == Sort::Int => Some(term),
        Term::Lt(_, _) | Term::Le(_, _) => Some(term),
        _ => None,
    }
}

/// Candidate values drawn from an interval: both corners, their
/// immediate neighbours, and zero when contained.
fn candidate_values(interval: Option<Interval>) -> Vec<i64> {
    let interval = interval.unwrap_or(Interval::FULL);
    let lo = interval.lo.max(i32::MIN as i64);
    let hi = interval.hi.min(i32::MAX as i64);
    if lo > hi {
        return vec![];
    }
    if let Some(value) = interval.singleton() {
        return vec![value];
    }
    let mut candidates = vec![lo, hi, lo + 1, hi - 1];
    if lo <= 0 && 0 <= hi {
        candidates.push(0);
    }
    if lo <= 1 && 1 <= hi {
        candidates.push(1);
    }
    if lo <= -1 && -1 <= hi {
        candidates.push(-1);
    }
    candidates.sort_unstable();
    candidates.dedup();
    candidates.retain(|&c| lo <= c && c <= hi);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_int(result: &SatResult, name: &str) -> i32 {
        match result {
            SatResult::Sat(model) => model[name].as_int().unwrap(),
            other => panic!("expected sat, got {:?}", other),
        }
    }

    #[test]
    fn test_sat_simple_bound() {
        let mut smt = SmtContext::new(0);
        let a = smt.mk_integer_constant("a");
        let zero = smt.mk_int(0);
        let formula = smt.mk_lt(zero, a);
        let result = smt.check(&[formula]);
        assert!(model_int(&result, "a") > 0);
    }

    #[test]
    fn test_unsat_contradiction() {
        let mut smt = SmtContext::new(0);
        let a = smt.mk_integer_constant("a");
        let zero = smt.mk_int(0);
        let positive = smt.mk_lt(zero, a);
        let negative = smt.mk_lt(a, zero);
        assert_eq!(smt.check(&[positive, negative]), SatResult::Unsat);
    }

    #[test]
    fn test_sat_boundary() {
        // a <= 0 and not (a < 0) forces a = 0
        let mut smt = SmtContext::new(0);
        let a = smt.mk_integer_constant("a");
        let zero = smt.mk_int(0);
        let le = smt.mk_le(a, zero);
        let lt = smt.mk_lt(a, zero);
        let not_lt = smt.mk_not(lt);
        let result = smt.check(&[le, not_lt]);
        assert_eq!(model_int(&result, "a"), 0);
    }

    #[test]
    fn test_sat_boolean_skeleton() {
        let mut smt = SmtContext::new(0);
        let p = smt.mk_boolean_constant("p");
        let q = smt.mk_boolean_constant("q");
        let not_q = smt.mk_not(q);
        let formula = smt.mk_and([p, not_q]);
        match smt.check(&[formula]) {
            SatResult::Sat(model) => {
                assert_eq!(model["p"], Value::Bool(true));
                assert_eq!(model["q"], Value::Bool(false));
            }
            other => panic!("expected sat, got {:?}", other),
        }
    }

    #[test]
    fn test_unsat_boolean() {
        let mut smt = SmtContext::new(0);
        let p = smt.mk_boolean_constant("p");
        let not_p = smt.mk_not(p);
        assert_eq!(smt.check(&[p, not_p]), SatResult::Unsat);
    }

    #[test]
    fn test_sat_equation_chain() {
        // x = a + 1 and x > 5 and a < 7
        let mut smt = SmtContext::new(0);
        let a = smt.mk_integer_constant("a");
        let x = smt.mk_integer_constant("x");
        let one = smt.mk_int(1);
        let five = smt.mk_int(5);
        let seven = smt.mk_int(7);
        let sum = smt.mk_add(a, one);
        let definition = smt.mk_eq(x, sum);
        let above = smt.mk_gt(x, five);
        let below = smt.mk_lt(a, seven);
        let result = smt.check(&[definition, above, below]);
        match &result {
            SatResult::Sat(model) => {
                let a = model["a"].as_int().unwrap();
                let x = model["x"].as_int().unwrap();
                assert_eq!(x, a.wrapping_add(1));
                assert!(x > 5 && a < 7);
            }
            other => panic!("expected sat, got {:?}", other),
        }
    }

    #[test]
    fn test_ite_condition_is_branched() {
        // ite(p, 1, 2) = 2 forces p false
        let mut smt = SmtContext::new(0);
        let p = smt.mk_boolean_constant("p");
        let one = smt.mk_int(1);
        let two = smt.mk_int(2);
        let ite = smt.mk_ite(p, one, two);
        let formula = smt.mk_eq(ite, two);
        match smt.check(&[formula]) {
            SatResult::Sat(model) => assert_eq!(model["p"], Value::Bool(false)),
            other => panic!("expected sat, got {:?}", other),
        }
    }
}
