//! SMT context
//!
//! Owns the hash-consed term pool, the fresh-name factory, and the
//! seeded RNG used for havoc and random input valuations. One context
//! is created per engine instance and lives for the engine's
//! lifetime.

use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::features::smt::domain::{Sort, Term, TermId, Value};
use crate::shared::models::{Constant, DataType};

use super::solver::{self, Model, SatResult};

/// Upper bound on decision nodes a single `check` may explore
const DEFAULT_SOLVER_NODE_BUDGET: usize = 1 << 16;

pub struct SmtContext {
    terms: Vec<Term>,
    sorts: Vec<Sort>,
    intern: FxHashMap<Term, TermId>,
    constants_cache: FxHashMap<TermId, Rc<Vec<(String, Sort)>>>,
    rng: StdRng,
    fresh_counter: u64,
    solver_node_budget: usize,
}

impl SmtContext {
    pub fn new(seed: u64) -> Self {
        Self {
            terms: Vec::new(),
            sorts: Vec::new(),
            intern: FxHashMap::default(),
            constants_cache: FxHashMap::default(),
            rng: StdRng::seed_from_u64(seed),
            fresh_counter: 0,
            solver_node_budget: DEFAULT_SOLVER_NODE_BUDGET,
        }
    }

    pub fn term(&self, id: TermId) -> &Term {
        &self.terms[id.index()]
    }

    pub fn sort_of(&self, id: TermId) -> Sort {
        self.sorts[id.index()]
    }

    fn intern(&mut self, term: Term, sort: Sort) -> TermId {
        if let Some(&id) = self.intern.get(&term) {
            return id;
        }
        let id = TermId(self.terms.len() as u32);
        self.terms.push(term.clone());
        self.sorts.push(sort);
        self.intern.insert(term, id);
        id
    }

    /// Fresh globally unique name derived from a hint
    pub fn fresh(&mut self, name_hint: &str) -> String {
        let name = format!("{}_{}", name_hint, self.fresh_counter);
        self.fresh_counter += 1;
        name
    }

    // Value builders

    pub fn mk_bool(&mut self, value: bool) -> TermId {
        self.intern(Term::Literal(Value::Bool(value)), Sort::Bool)
    }

    pub fn mk_int(&mut self, value: i32) -> TermId {
        self.intern(Term::Literal(Value::Int(value)), Sort::Int)
    }

    pub fn mk_literal(&mut self, value: Value) -> TermId {
        match value {
            Value::Bool(b) => self.mk_bool(b),
            Value::Int(i) => self.mk_int(i),
        }
    }

    /// Default value per data type: false, 0, T#0ms, first ordinal
    pub fn default_value(&self, data_type: &DataType) -> Value {
        match data_type {
            DataType::Bool => Value::Bool(false),
            DataType::Int | DataType::Time | DataType::Enumeration { .. } => Value::Int(0),
            DataType::Derived { .. } => {
                panic!("derived types have no scalar default; flatten first")
            }
        }
    }

    /// Seeded random value per data type, used for havoc
    pub fn random_value(&mut self, data_type: &DataType) -> Value {
        match data_type {
            DataType::Bool => Value::Bool(self.rng.gen()),
            DataType::Int => Value::Int(self.rng.gen_range(i32::MIN..=i32::MAX)),
            DataType::Time => Value::Int(self.rng.gen_range(0..=60_000)),
            DataType::Enumeration { values, .. } => {
                Value::Int(self.rng.gen_range(0..values.len().max(1) as i32))
            }
            DataType::Derived { .. } => {
                panic!("derived types have no scalar value; flatten first")
            }
        }
    }

    /// Value of an initialisation constant
    pub fn constant_value(&self, constant: &Constant) -> Value {
        match constant {
            Constant::Bool(value) => Value::Bool(*value),
            Constant::Int(value) | Constant::Time(value) => Value::Int(*value),
            Constant::Enumerated { ordinal, .. } => Value::Int(*ordinal),
        }
    }

    // Constant builders

    pub fn mk_boolean_constant(&mut self, name: &str) -> TermId {
        self.intern(
            Term::Constant {
                name: name.to_string(),
                sort: Sort::Bool,
            },
            Sort::Bool,
        )
    }

    pub fn mk_integer_constant(&mut self, name: &str) -> TermId {
        self.intern(
            Term::Constant {
                name: name.to_string(),
                sort: Sort::Int,
            },
            Sort::Int,
        )
    }

    /// Constant of an explicit sort
    pub fn mk_sorted_constant(&mut self, name: &str, sort: Sort) -> TermId {
        match sort {
            Sort::Bool => self.mk_boolean_constant(name),
            Sort::Int => self.mk_integer_constant(name),
        }
    }

    /// Constant dispatched by data type
    pub fn mk_constant(&mut self, name: &str, data_type: &DataType) -> TermId {
        match data_type {
            DataType::Bool => self.mk_boolean_constant(name),
            DataType::Int | DataType::Time | DataType::Enumeration { .. } => {
                self.mk_integer_constant(name)
            }
            DataType::Derived { .. } => {
                panic!("derived types have no scalar constant; flatten first")
            }
        }
    }

    // Boolean operators

    pub fn mk_not(&mut self, a: TermId) -> TermId {
        match self.term(a) {
            Term::Literal(Value::Bool(value)) => {
                let value = !*value;
                self.mk_bool(value)
            }
            Term::Not(inner) => *inner,
            _ => self.intern(Term::Not(a), Sort::Bool),
        }
    }

    pub fn mk_and(&mut self, items: impl IntoIterator<Item = TermId>) -> TermId {
        let mut kept = Vec::new();
        for item in items {
            match self.term(item) {
                Term::Literal(Value::Bool(true)) => {}
                Term::Literal(Value::Bool(false)) => return self.mk_bool(false),
                _ => {
                    if !kept.contains(&item) {
                        kept.push(item);
                    }
                }
            }
        }
        match kept.len() {
            0 => self.mk_bool(true),
            1 => kept[0],
            _ => self.intern(Term::And(kept), Sort::Bool),
        }
    }

    pub fn mk_or(&mut self, items: impl IntoIterator<Item = TermId>) -> TermId {
        let mut kept = Vec::new();
        for item in items {
            match self.term(item) {
                Term::Literal(Value::Bool(false)) => {}
                Term::Literal(Value::Bool(true)) => return self.mk_bool(true),
                _ => {
                    if !kept.contains(&item) {
                        kept.push(item);
                    }
                }
            }
        }
        match kept.len() {
            0 => self.mk_bool(false),
            1 => kept[0],
            _ => self.intern(Term::Or(kept), Sort::Bool),
        }
    }

    pub fn mk_xor(&mut self, a: TermId, b: TermId) -> TermId {
        match (self.term(a).clone(), self.term(b).clone()) {
            (Term::Literal(Value::Bool(x)), Term::Literal(Value::Bool(y))) => self.mk_bool(x ^ y),
            (Term::Literal(Value::Bool(false)), _) => b,
            (_, Term::Literal(Value::Bool(false))) => a,
            (Term::Literal(Value::Bool(true)), _) => self.mk_not(b),
            (_, Term::Literal(Value::Bool(true))) => self.mk_not(a),
            _ => self.intern(Term::Xor(a, b), Sort::Bool),
        }
    }

    pub fn mk_implies(&mut self, a: TermId, b: TermId) -> TermId {
        let not_a = self.mk_not(a);
        self.mk_or([not_a, b])
    }

    // Comparisons

    pub fn mk_eq(&mut self, a: TermId, b: TermId) -> TermId {
        debug_assert_eq!(self.sort_of(a), self.sort_of(b), "equality over mixed sorts");
        if a == b {
            return self.mk_bool(true);
        }
        if let (Term::Literal(x), Term::Literal(y)) = (self.term(a), self.term(b)) {
            let equal = x == y;
            return self.mk_bool(equal);
        }
        // canonical operand order keeps hash-consing effective
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        self.intern(Term::Eq(a, b), Sort::Bool)
    }

    pub fn mk_ne(&mut self, a: TermId, b: TermId) -> TermId {
        let eq = self.mk_eq(a, b);
        self.mk_not(eq)
    }

    pub fn mk_lt(&mut self, a: TermId, b: TermId) -> TermId {
        if let (Some(x), Some(y)) = (self.int_literal(a), self.int_literal(b)) {
            return self.mk_bool(x < y);
        }
        self.intern(Term::Lt(a, b), Sort::Bool)
    }

    pub fn mk_le(&mut self, a: TermId, b: TermId) -> TermId {
        if let (Some(x), Some(y)) = (self.int_literal(a), self.int_literal(b)) {
            return self.mk_bool(x <= y);
        }
        self.intern(Term::Le(a, b), Sort::Bool)
    }

    pub fn mk_gt(&mut self, a: TermId, b: TermId) -> TermId {
        self.mk_lt(b, a)
    }

    pub fn mk_ge(&mut self, a: TermId, b: TermId) -> TermId {
        self.mk_le(b, a)
    }

    // Arithmetic, signed 32-bit two's-complement

    pub fn mk_add(&mut self, a: TermId, b: TermId) -> TermId {
        if let (Some(x), Some(y)) = (self.int_literal(a), self.int_literal(b)) {
            return self.mk_int(x.wrapping_add(y));
        }
        self.intern(Term::Add(a, b), Sort::Int)
    }

    pub fn mk_sub(&mut self, a: TermId, b: TermId) -> TermId {
        if let (Some(x), Some(y)) = (self.int_literal(a), self.int_literal(b)) {
            return self.mk_int(x.wrapping_sub(y));
        }
        self.intern(Term::Sub(a, b), Sort::Int)
    }

    pub fn mk_mul(&mut self, a: TermId, b: TermId) -> TermId {
        if let (Some(x), Some(y)) = (self.int_literal(a), self.int_literal(b)) {
            return self.mk_int(x.wrapping_mul(y));
        }
        self.intern(Term::Mul(a, b), Sort::Int)
    }

    pub fn mk_div(&mut self, a: TermId, b: TermId) -> TermId {
        if let (Some(x), Some(y)) = (self.int_literal(a), self.int_literal(b)) {
            if y != 0 {
                return self.mk_int(x.wrapping_div(y));
            }
        }
        self.intern(Term::Div(a, b), Sort::Int)
    }

    pub fn mk_rem(&mut self, a: TermId, b: TermId) -> TermId {
        if let (Some(x), Some(y)) = (self.int_literal(a), self.int_literal(b)) {
            if y != 0 {
                return self.mk_int(x.wrapping_rem(y));
            }
        }
        self.intern(Term::Rem(a, b), Sort::Int)
    }

    pub fn mk_neg(&mut self, a: TermId) -> TermId {
        if let Some(x) = self.int_literal(a) {
            return self.mk_int(x.wrapping_neg());
        }
        self.intern(Term::Neg(a), Sort::Int)
    }

    // Mixed

    pub fn mk_ite(&mut self, condition: TermId, then_term: TermId, else_term: TermId) -> TermId {
        debug_assert_eq!(self.sort_of(then_term), self.sort_of(else_term));
        match self.term(condition) {
            Term::Literal(Value::Bool(true)) => return then_term,
            Term::Literal(Value::Bool(false)) => return else_term,
            _ => {}
        }
        if then_term == else_term {
            return then_term;
        }
        let sort = self.sort_of(then_term);
        self.intern(Term::Ite(condition, then_term, else_term), sort)
    }

    /// false maps to 0, true maps to 1
    pub fn mk_bool_to_int(&mut self, a: TermId) -> TermId {
        match self.term(a) {
            Term::Literal(Value::Bool(value)) => {
                let value = i32::from(*value);
                self.mk_int(value)
            }
            _ => self.intern(Term::BoolToInt(a), Sort::Int),
        }
    }

    /// Reverse cast is `x != 0`
    pub fn mk_int_to_bool(&mut self, a: TermId) -> TermId {
        let zero = self.mk_int(0);
        self.mk_ne(a, zero)
    }

    fn int_literal(&self, id: TermId) -> Option<i32> {
        match self.term(id) {
            Term::Literal(Value::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn bool_literal(&self, id: TermId) -> Option<bool> {
        match self.term(id) {
            Term::Literal(Value::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn literal(&self, id: TermId) -> Option<Value> {
        match self.term(id) {
            Term::Literal(value) => Some(*value),
            _ => None,
        }
    }

    /// Substitute every occurrence of `from` within `term` by `to`
    pub fn substitute(&mut self, term: TermId, from: TermId, to: TermId) -> TermId {
        let mut memo = FxHashMap::default();
        self.substitute_rec(term, from, to, &mut memo)
    }

    fn substitute_rec(
        &mut self,
        term: TermId,
        from: TermId,
        to: TermId,
        memo: &mut FxHashMap<TermId, TermId>,
    ) -> TermId {
        if term == from {
            return to;
        }
        if let Some(&mapped) = memo.get(&term) {
            return mapped;
        }
        let node = self.term(term).clone();
        let rebuilt = match node {
            Term::Literal(_) | Term::Constant { .. } => term,
            Term::Not(a) => {
                let a = self.substitute_rec(a, from, to, memo);
                self.mk_not(a)
            }
            Term::And(items) => {
                let items: Vec<_> = items
                    .into_iter()
                    .map(|i| self.substitute_rec(i, from, to, memo))
                    .collect();
                self.mk_and(items)
            }
            Term::Or(items) => {
                let items: Vec<_> = items
                    .into_iter()
                    .map(|i| self.substitute_rec(i, from, to, memo))
                    .collect();
                self.mk_or(items)
            }
            Term::Xor(a, b) => {
                let a = self.substitute_rec(a, from, to, memo);
                let b = self.substitute_rec(b, from, to, memo);
                self.mk_xor(a, b)
            }
            Term::Eq(a, b) => {
                let a = self.substitute_rec(a, from, to, memo);
                let b = self.substitute_rec(b, from, to, memo);
                self.mk_eq(a, b)
            }
            Term::Lt(a, b) => {
                let a = self.substitute_rec(a, from, to, memo);
                let b = self.substitute_rec(b, from, to, memo);
                self.mk_lt(a, b)
            }
            Term::Le(a, b) => {
                let a = self.substitute_rec(a, from, to, memo);
                let b = self.substitute_rec(b, from, to, memo);
                self.mk_le(a, b)
            }
            Term::Add(a, b) => {
                let a = self.substitute_rec(a, from, to, memo);
                let b = self.substitute_rec(b, from, to, memo);
                self.mk_add(a, b)
            }
            Term::Sub(a, b) => {
                let a = self.substitute_rec(a, from, to, memo);
                let b = self.substitute_rec(b, from, to, memo);
                self.mk_sub(a, b)
            }
            Term::Mul(a, b) => {
                let a = self.substitute_rec(a, from, to, memo);
                let b = self.substitute_rec(b, from, to, memo);
                self.mk_mul(a, b)
            }
            Term::Div(a, b) => {
                let a = self.substitute_rec(a, from, to, memo);
                let b = self.substitute_rec(b, from, to, memo);
                self.mk_div(a, b)
            }
            Term::Rem(a, b) => {
                let a = self.substitute_rec(a, from, to, memo);
                let b = self.substitute_rec(b, from, to, memo);
                self.mk_rem(a, b)
            }
            Term::Neg(a) => {
                let a = self.substitute_rec(a, from, to, memo);
                self.mk_neg(a)
            }
            Term::Ite(c, t, e) => {
                let c = self.substitute_rec(c, from, to, memo);
                let t = self.substitute_rec(t, from, to, memo);
                let e = self.substitute_rec(e, from, to, memo);
                self.mk_ite(c, t, e)
            }
            Term::BoolToInt(a) => {
                let a = self.substitute_rec(a, from, to, memo);
                self.mk_bool_to_int(a)
            }
        };
        memo.insert(term, rebuilt);
        rebuilt
    }

    /// Uninterpreted constants occurring in a term, memoized
    pub fn uninterpreted_constants(&mut self, term: TermId) -> Rc<Vec<(String, Sort)>> {
        if let Some(cached) = self.constants_cache.get(&term) {
            return Rc::clone(cached);
        }
        let mut names = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![term];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            match self.term(id) {
                Term::Constant { name, sort } => names.push((name.clone(), *sort)),
                node => stack.extend(node.children()),
            }
        }
        let names = Rc::new(names);
        self.constants_cache.insert(term, Rc::clone(&names));
        names
    }

    /// Evaluate a term under a constant valuation. `None` signals an
    /// unassigned constant or a division by zero.
    pub fn eval<F>(&self, term: TermId, lookup: &F) -> Option<Value>
    where
        F: Fn(&str, Sort) -> Option<Value>,
    {
        match self.term(term) {
            Term::Literal(value) => Some(*value),
            Term::Constant { name, sort } => lookup(name, *sort),
            Term::Not(a) => Some(Value::Bool(!self.eval(*a, lookup)?.as_bool()?)),
            Term::And(items) => {
                let mut result = true;
                for item in items {
                    result &= self.eval(*item, lookup)?.as_bool()?;
                }
                Some(Value::Bool(result))
            }
            Term::Or(items) => {
                let mut result = false;
                for item in items {
                    result |= self.eval(*item, lookup)?.as_bool()?;
                }
                Some(Value::Bool(result))
            }
            Term::Xor(a, b) => Some(Value::Bool(
                self.eval(*a, lookup)?.as_bool()? ^ self.eval(*b, lookup)?.as_bool()?,
            )),
            Term::Eq(a, b) => Some(Value::Bool(self.eval(*a, lookup)? == self.eval(*b, lookup)?)),
            Term::Lt(a, b) => Some(Value::Bool(
                self.eval(*a, lookup)?.as_int()? < self.eval(*b, lookup)?.as_int()?,
            )),
            Term::Le(a, b) => Some(Value::Bool(
                self.eval(*a, lookup)?.as_int()? <= self.eval(*b, lookup)?.as_int()?,
            )),
            Term::Add(a, b) => Some(Value::Int(
                self.eval(*a, lookup)?
                    .as_int()?
                    .wrapping_add(self.eval(*b, lookup)?.as_int()?),
            )),
            Term::Sub(a, b) => Some(Value::Int(
                self.eval(*a, lookup)?
                    .as_int()?
                    .wrapping_sub(self.eval(*b, lookup)?.as_int()?),
            )),
            Term::Mul(a, b) => Some(Value::Int(
                self.eval(*a, lookup)?
                    .as_int()?
                    .wrapping_mul(self.eval(*b, lookup)?.as_int()?),
            )),
            Term::Div(a, b) => {
                let divisor = self.eval(*b, lookup)?.as_int()?;
                if divisor == 0 {
                    return None;
                }
                Some(Value::Int(
                    self.eval(*a, lookup)?.as_int()?.wrapping_div(divisor),
                ))
            }
            Term::Rem(a, b) => {
                let divisor = self.eval(*b, lookup)?.as_int()?;
                if divisor == 0 {
                    return None;
                }
                Some(Value::Int(
                    self.eval(*a, lookup)?.as_int()?.wrapping_rem(divisor),
                ))
            }
            Term::Neg(a) => Some(Value::Int(self.eval(*a, lookup)?.as_int()?.wrapping_neg())),
            Term::Ite(c, t, e) => {
                if self.eval(*c, lookup)?.as_bool()? {
                    self.eval(*t, lookup)
                } else {
                    self.eval(*e, lookup)
                }
            }
            Term::BoolToInt(a) => Some(Value::Int(i32::from(self.eval(*a, lookup)?.as_bool()?))),
        }
    }

    /// Check satisfiability of the conjunction of `assertions`
    pub fn check(&mut self, assertions: &[TermId]) -> SatResult {
        let budget = self.solver_node_budget;
        solver::solve(self, assertions, budget)
    }

    /// Render a term for diagnostics
    pub fn display(&self, term: TermId) -> String {
        match self.term(term) {
            Term::Literal(value) => value.to_string(),
            Term::Constant { name, .. } => name.clone(),
            Term::Not(a) => format!("(not {})", self.display(*a)),
            Term::And(items) => self.display_nary("and", items),
            Term::Or(items) => self.display_nary("or", items),
            Term::Xor(a, b) => format!("(xor {} {})", self.display(*a), self.display(*b)),
            Term::Eq(a, b) => format!("(= {} {})", self.display(*a), self.display(*b)),
            Term::Lt(a, b) => format!("(< {} {})", self.display(*a), self.display(*b)),
            Term::Le(a, b) => format!("(<= {} {})", self.display(*a), self.display(*b)),
            Term::Add(a, b) => format!("(+ {} {})", self.display(*a), self.display(*b)),
            Term::Sub(a, b) => format!("(- {} {})", self.display(*a), self.display(*b)),
            Term::Mul(a, b) => format!("(* {} {})", self.display(*a), self.display(*b)),
            Term::Div(a, b) => format!("(div {} {})", self.display(*a), self.display(*b)),
            Term::Rem(a, b) => format!("(rem {} {})", self.display(*a), self.display(*b)),
            Term::Neg(a) => format!("(- {})", self.display(*a)),
            Term::Ite(c, t, e) => format!(
                "(ite {} {} {})",
                self.display(*c),
                self.display(*t),
                self.display(*e)
            ),
            Term::BoolToInt(a) => format!("(bool_to_int {})", self.display(*a)),
        }
    }

    fn display_nary(&self, op: &str, items: &[TermId]) -> String {
        let rendered: Vec<_> = items.iter().map(|i| self.display(*i)).collect();
        format!("({} {})", op, rendered.join(" "))
    }

    /// Complete a model with values for `names` missing from it
    pub fn complete_model(&self, model: &mut Model, names: &[(String, Sort)]) {
        for (name, sort) in names {
            model.entry(name.clone()).or_insert(match sort {
                Sort::Bool => Value::Bool(false),
                Sort::Int => Value::Int(0),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_consing_shares_ids() {
        let mut smt = SmtContext::new(0);
        let a = smt.mk_integer_constant("a");
        let one = smt.mk_int(1);
        let x = smt.mk_add(a, one);
        let y = smt.mk_add(a, one);
        assert_eq!(x, y);
    }

    #[test]
    fn test_constant_folding() {
        let mut smt = SmtContext::new(0);
        let two = smt.mk_int(2);
        let three = smt.mk_int(3);
        let five = smt.mk_add(two, three);
        assert_eq!(smt.literal(five), Some(Value::Int(5)));

        let t = smt.mk_bool(true);
        let f = smt.mk_bool(false);
        assert_eq!(smt.mk_and([t, f]), smt.mk_bool(false));
        assert_eq!(smt.mk_or([f, t]), smt.mk_bool(true));
    }

    #[test]
    fn test_wrapping_arithmetic() {
        let mut smt = SmtContext::new(0);
        let max = smt.mk_int(i32::MAX);
        let one = smt.mk_int(1);
        let wrapped = smt.mk_add(max, one);
        assert_eq!(smt.literal(wrapped), Some(Value::Int(i32::MIN)));
    }

    #[test]
    fn test_division_by_zero_literal_is_kept() {
        let mut smt = SmtContext::new(0);
        let one = smt.mk_int(1);
        let zero = smt.mk_int(0);
        let division = smt.mk_div(one, zero);
        assert_eq!(smt.literal(division), None);
        assert_eq!(smt.eval(division, &|_, _| None), None);
    }

    #[test]
    fn test_substitute() {
        let mut smt = SmtContext::new(0);
        let a = smt.mk_integer_constant("a");
        let one = smt.mk_int(1);
        let sum = smt.mk_add(a, one);
        let two = smt.mk_int(2);
        let lowered = smt.substitute(sum, a, two);
        assert_eq!(smt.literal(lowered), Some(Value::Int(3)));
    }

    #[test]
    fn test_uninterpreted_constants() {
        let mut smt = SmtContext::new(0);
        let a = smt.mk_integer_constant("a");
        let b = smt.mk_boolean_constant("b");
        let i = smt.mk_bool_to_int(b);
        let sum = smt.mk_add(a, i);
        let zero = smt.mk_int(0);
        let formula = smt.mk_lt(zero, sum);
        let mut names: Vec<_> = smt
            .uninterpreted_constants(formula)
            .iter()
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_int_to_bool_cast() {
        let mut smt = SmtContext::new(0);
        let zero = smt.mk_int(0);
        let cast = smt.mk_int_to_bool(zero);
        assert_eq!(smt.literal(cast), Some(Value::Bool(false)));
        let seven = smt.mk_int(7);
        let cast = smt.mk_int_to_bool(seven);
        assert_eq!(smt.literal(cast), Some(Value::Bool(true)));
    }

    #[test]
    fn test_random_value_is_deterministic_per_seed() {
        let mut smt_1 = SmtContext::new(42);
        let mut smt_2 = SmtContext::new(42);
        for _ in 0..16 {
            assert_eq!(
                smt_1.random_value(&DataType::Int),
                smt_2.random_value(&DataType::Int)
            );
        }
    }
}
