//! Linear forms over integer terms
//!
//! Extraction of `sum(coeff * var) + constant` shapes from the term
//! pool plus the interval arithmetic used by the solver's propagation
//! pass. Coefficients and bounds are widened to i64 so propagation
//! never wraps; models are clamped back to the i32 value range before
//! verification.

use rustc_hash::FxHashMap;

use crate::features::smt::domain::{Term, TermId, Value};

use super::context::SmtContext;

/// `sum(coefficients[var] * var) + constant`
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct LinearSum {
    pub coefficients: FxHashMap<String, i64>,
    pub constant: i64,
}

impl LinearSum {
    fn constant(value: i64) -> Self {
        Self {
            coefficients: FxHashMap::default(),
            constant: value,
        }
    }

    fn variable(name: String) -> Self {
        let mut coefficients = FxHashMap::default();
        coefficients.insert(name, 1);
        Self {
            coefficients,
            constant: 0,
        }
    }

    fn add(mut self, other: &LinearSum) -> Self {
        for (name, coefficient) in &other.coefficients {
            *self.coefficients.entry(name.clone()).or_insert(0) += coefficient;
        }
        self.constant += other.constant;
        self.coefficients.retain(|_, c| *c != 0);
        self
    }

    /// `self - other`
    pub fn sub(&self, other: &LinearSum) -> Self {
        self.clone().add(&other.clone().scale(-1))
    }

    /// `-self`
    pub fn negated(&self) -> Self {
        self.clone().scale(-1)
    }

    /// `self + amount`
    pub fn offset(mut self, amount: i64) -> Self {
        self.constant += amount;
        self
    }

    fn scale(mut self, factor: i64) -> Self {
        for coefficient in self.coefficients.values_mut() {
            *coefficient *= factor;
        }
        self.constant *= factor;
        self.coefficients.retain(|_, c| *c != 0);
        self
    }

    /// Extract a linear sum from an integer term; `None` when the
    /// term is not linear (multiplication of variables, division,
    /// ite, casts of undecided booleans).
    pub fn from_term(smt: &SmtContext, term: TermId) -> Option<Self> {
        match smt.term(term) {
            Term::Literal(Value::Int(value)) => Some(Self::constant(*value as i64)),
            Term::Constant { name, .. } => Some(Self::variable(name.clone())),
            Term::Add(a, b) => {
                Some(Self::from_term(smt, *a)?.add(&Self::from_term(smt, *b)?))
            }
            Term::Sub(a, b) => {
                Some(Self::from_term(smt, *a)?.add(&Self::from_term(smt, *b)?.scale(-1)))
            }
            Term::Neg(a) => Some(Self::from_term(smt, *a)?.scale(-1)),
            Term::Mul(a, b) => {
                if let Term::Literal(Value::Int(factor)) = smt.term(*a) {
                    Some(Self::from_term(smt, *b)?.scale(*factor as i64))
                } else if let Term::Literal(Value::Int(factor)) = smt.term(*b) {
                    Some(Self::from_term(smt, *a)?.scale(*factor as i64))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// Closed interval over i64 with the i32 value range as top
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Interval {
    pub lo: i64,
    pub hi: i64,
}

impl Interval {
    pub const FULL: Interval = Interval {
        lo: i32::MIN as i64,
        hi: i32::MAX as i64,
    };

    pub fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    pub fn singleton(&self) -> Option<i64> {
        (self.lo == self.hi).then_some(self.lo)
    }

    fn tighten_upper(&mut self, bound: i64) -> bool {
        if bound < self.hi {
            self.hi = bound;
            true
        } else {
            false
        }
    }

    fn tighten_lower(&mut self, bound: i64) -> bool {
        if bound > self.lo {
            self.lo = bound;
            true
        } else {
            false
        }
    }
}

/// `sum + constant <= 0`
#[derive(Debug, Clone)]
pub(crate) struct LeZero(pub LinearSum);

/// Propagate a set of `<= 0` constraints over variable intervals to a
/// fixpoint (bounded). Returns false when some interval becomes
/// empty, i.e. the constraint set is unsatisfiable.
pub(crate) fn propagate(
    constraints: &[LeZero],
    intervals: &mut FxHashMap<String, Interval>,
) -> bool {
    const MAX_ROUNDS: usize = 64;
    for constraint in constraints {
        for name in constraint.0.coefficients.keys() {
            intervals.entry(name.clone()).or_insert(Interval::FULL);
        }
    }
    for _ in 0..MAX_ROUNDS {
        let mut changed = false;
        for LeZero(sum) in constraints {
            for (name, &coefficient) in &sum.coefficients {
                // coefficient * name <= -constant - sum(min of others)
                let mut bound = -sum.constant;
                for (other, &other_coefficient) in &sum.coefficients {
                    if other == name {
                        continue;
                    }
                    let interval = intervals[other];
                    let minimum = if other_coefficient > 0 {
                        other_coefficient.saturating_mul(interval.lo)
                    } else {
                        other_coefficient.saturating_mul(interval.hi)
                    };
                    bound = bound.saturating_sub(minimum);
                }
                let interval = intervals.get_mut(name).expect("interval seeded above");
                if coefficient > 0 {
                    changed |= interval.tighten_upper(div_floor(bound, coefficient));
                } else {
                    changed |= interval.tighten_lower(div_ceil(bound, coefficient));
                }
                if interval.is_empty() {
                    return false;
                }
            }
        }
        if !changed {
            break;
        }
    }
    true
}

pub(crate) fn div_floor(a: i64, b: i64) -> i64 {
    let quotient = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        quotient - 1
    } else {
        quotient
    }
}

pub(crate) fn div_ceil(a: i64, b: i64) -> i64 {
    let quotient = a / b;
    if (a % b != 0) && ((a < 0) == (b < 0)) {
        quotient + 1
    } else {
        quotient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_extraction() {
        let mut smt = SmtContext::new(0);
        let x = smt.mk_integer_constant("x");
        let y = smt.mk_integer_constant("y");
        let two = smt.mk_int(2);
        let scaled = smt.mk_mul(two, x);
        let sum = smt.mk_add(scaled, y);
        let linear = LinearSum::from_term(&smt, sum).unwrap();
        assert_eq!(linear.coefficients.get("x"), Some(&2));
        assert_eq!(linear.coefficients.get("y"), Some(&1));
        assert_eq!(linear.constant, 0);
    }

    #[test]
    fn test_nonlinear_extraction_fails() {
        let mut smt = SmtContext::new(0);
        let x = smt.mk_integer_constant("x");
        let y = smt.mk_integer_constant("y");
        let product = smt.mk_mul(x, y);
        assert!(LinearSum::from_term(&smt, product).is_none());
    }

    #[test]
    fn test_propagation_refutes() {
        // x <= -1 and -x <= -1 (x >= 1) has no solution
        let mut intervals = FxHashMap::default();
        let mut le = LinearSum::variable("x".to_string());
        le.constant = 1; // x + 1 <= 0, x <= -1
        let mut ge = LinearSum::variable("x".to_string()).scale(-1);
        ge.constant = 1; // -x + 1 <= 0, x >= 1
        assert!(!propagate(&[LeZero(le), LeZero(ge)], &mut intervals));
    }

    #[test]
    fn test_propagation_tightens() {
        // x + y <= 5, y >= 3 implies x <= 2
        let mut intervals = FxHashMap::default();
        intervals.insert("y".to_string(), Interval { lo: 3, hi: 3 });
        let mut sum = LinearSum::variable("x".to_string())
            .add(&LinearSum::variable("y".to_string()));
        sum.constant = -5;
        assert!(propagate(&[LeZero(sum)], &mut intervals));
        assert_eq!(intervals["x"].hi, 2);
    }

    #[test]
    fn test_div_floor_ceil() {
        assert_eq!(div_floor(7, 2), 3);
        assert_eq!(div_floor(-7, 2), -4);
        assert_eq!(div_ceil(7, 2), 4);
        assert_eq!(div_ceil(-7, 2), -3);
    }
}
