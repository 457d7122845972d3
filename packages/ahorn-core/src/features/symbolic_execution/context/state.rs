//! Symbolic state
//!
//! Two stores keyed by contextualized name: the concrete store maps
//! to values, the symbolic store to terms. Both carry the same key
//! set at every program point; `bind` writes them atomically and
//! asserts the invariant. Shadow mode adds a second concrete store
//! for the new program version and a shadow store relating shadow
//! constants to their old/new encodings. The verification-condition
//! tables (assumption literals, assumptions, hard constraints,
//! unknown over-approximating summary literals) are only populated
//! when the engine encodes VCs.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::features::flow_graph::Label;
use crate::features::smt::{Sort, SmtContext, TermId, Value};

use super::super::name::{AssumptionLiteral, ContextualizedName};

#[derive(Debug, Clone)]
pub struct State {
    label: Label,
    concrete_enabled: bool,
    shadow_enabled: bool,
    concrete: BTreeMap<ContextualizedName, Value>,
    /// Concrete store of the new program version, shadow mode only
    concrete_new: BTreeMap<ContextualizedName, Value>,
    symbolic: BTreeMap<ContextualizedName, TermId>,
    path_constraint: Vec<TermId>,
    /// Path constraint of the new program version, shadow mode only
    path_constraint_new: Vec<TermId>,
    /// Highest version per flattened name within the current cycle
    versions: FxHashMap<String, u32>,
    /// Shadow constant name to (old encoding, new encoding)
    shadow: BTreeMap<String, (TermId, TermId)>,

    // VC-generation tables
    assumption_literal: Option<AssumptionLiteral>,
    assumption_literals: BTreeMap<AssumptionLiteral, Vec<AssumptionLiteral>>,
    assumptions: BTreeMap<AssumptionLiteral, Vec<TermId>>,
    hard_constraints: BTreeMap<AssumptionLiteral, BTreeMap<ContextualizedName, TermId>>,
    unknown_summary_literals: BTreeMap<AssumptionLiteral, AssumptionLiteral>,
}

impl State {
    pub fn new(label: Label, concrete_enabled: bool, shadow_enabled: bool) -> Self {
        Self {
            label,
            concrete_enabled,
            shadow_enabled,
            concrete: BTreeMap::new(),
            concrete_new: BTreeMap::new(),
            symbolic: BTreeMap::new(),
            path_constraint: Vec::new(),
            path_constraint_new: Vec::new(),
            versions: FxHashMap::default(),
            shadow: BTreeMap::new(),
            assumption_literal: None,
            assumption_literals: BTreeMap::new(),
            assumptions: BTreeMap::new(),
            hard_constraints: BTreeMap::new(),
            unknown_summary_literals: BTreeMap::new(),
        }
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn set_label(&mut self, label: Label) {
        self.label = label;
    }

    pub fn concrete_enabled(&self) -> bool {
        self.concrete_enabled
    }

    pub fn shadow_enabled(&self) -> bool {
        self.shadow_enabled
    }

    // Stores

    /// Write one variable instance into both stores. `new_value` is
    /// the concrete value under the new program version and only
    /// meaningful in shadow mode.
    pub fn bind(
        &mut self,
        name: ContextualizedName,
        symbolic: TermId,
        concrete: Option<Value>,
        new_value: Option<Value>,
    ) {
        debug_assert_eq!(
            concrete.is_some(),
            self.concrete_enabled,
            "concrete and symbolic stores must carry the same names"
        );
        if let Some(value) = concrete {
            self.concrete.insert(name.clone(), value);
        }
        if self.shadow_enabled {
            let value = new_value.or(concrete);
            if let Some(value) = value {
                self.concrete_new.insert(name.clone(), value);
            }
        }
        if name.version > self.highest_version(&name.flattened) || name.version == 0 {
            self.versions.insert(name.flattened.clone(), name.version);
        }
        self.symbolic.insert(name, symbolic);
    }

    pub fn symbolic_expression(&self, name: &ContextualizedName) -> Option<TermId> {
        self.symbolic.get(name).copied()
    }

    pub fn concrete_value(&self, name: &ContextualizedName) -> Option<Value> {
        self.concrete.get(name).copied()
    }

    pub fn concrete_value_new(&self, name: &ContextualizedName) -> Option<Value> {
        self.concrete_new.get(name).copied()
    }

    pub fn set_concrete_value(&mut self, name: ContextualizedName, value: Value) {
        self.concrete.insert(name, value);
    }

    pub fn set_concrete_value_new(&mut self, name: ContextualizedName, value: Value) {
        self.concrete_new.insert(name, value);
    }

    pub fn symbolic_store(&self) -> &BTreeMap<ContextualizedName, TermId> {
        &self.symbolic
    }

    pub fn concrete_store(&self) -> &BTreeMap<ContextualizedName, Value> {
        &self.concrete
    }

    /// Highest version of a flattened name in the current cycle
    pub fn highest_version(&self, flattened: &str) -> u32 {
        self.versions.get(flattened).copied().unwrap_or(0)
    }

    pub fn versions(&self) -> &FxHashMap<String, u32> {
        &self.versions
    }

    pub(crate) fn reset_versions(&mut self) {
        for version in self.versions.values_mut() {
            *version = 0;
        }
    }

    /// Lowest version of a flattened name present in the concrete
    /// store for a cycle
    pub fn lowest_version_in_cycle(&self, flattened: &str, cycle: u32) -> Option<u32> {
        self.symbolic
            .keys()
            .filter(|n| n.cycle == cycle && n.flattened == flattened)
            .map(|n| n.version)
            .min()
    }

    pub fn highest_version_in_cycle(&self, flattened: &str, cycle: u32) -> Option<u32> {
        self.symbolic
            .keys()
            .filter(|n| n.cycle == cycle && n.flattened == flattened)
            .map(|n| n.version)
            .max()
    }

    /// Drop all intermediate versions of `cycle`, keeping the
    /// version-0 bindings the per-cycle inputs of a test case are
    /// derived from
    pub fn remove_intermediate_versions(&mut self, cycle: u32) {
        let keep = |name: &ContextualizedName| name.cycle != cycle || name.version == 0;
        self.concrete.retain(|name, _| keep(name));
        self.concrete_new.retain(|name, _| keep(name));
        self.symbolic.retain(|name, _| keep(name));
    }

    // Path constraints

    pub fn path_constraint(&self) -> &[TermId] {
        &self.path_constraint
    }

    pub fn path_constraint_new(&self) -> &[TermId] {
        &self.path_constraint_new
    }

    pub fn push_path_constraint(&mut self, constraint: TermId) {
        self.path_constraint.push(constraint);
    }

    pub fn push_path_constraint_new(&mut self, constraint: TermId) {
        self.path_constraint_new.push(constraint);
    }

    pub fn clear_path_constraint(&mut self) {
        self.path_constraint.clear();
        self.path_constraint_new.clear();
    }

    pub(crate) fn set_path_constraint(&mut self, constraint: Vec<TermId>) {
        self.path_constraint = constraint;
    }

    // Shadow store

    pub fn shadow_store(&self) -> &BTreeMap<String, (TermId, TermId)> {
        &self.shadow
    }

    pub fn set_shadow_expression(&mut self, name: String, old: TermId, new: TermId) {
        self.shadow.insert(name, (old, new));
    }

    pub fn shadow_expression(&self, name: &str) -> Option<(TermId, TermId)> {
        self.shadow.get(name).copied()
    }

    pub(crate) fn merge_shadow_store(&mut self, other: &BTreeMap<String, (TermId, TermId)>) {
        for (name, pair) in other {
            self.shadow.insert(name.clone(), *pair);
        }
    }

    // VC tables

    pub fn assumption_literal(&self) -> Option<&AssumptionLiteral> {
        self.assumption_literal.as_ref()
    }

    pub fn set_assumption_literal(&mut self, literal: AssumptionLiteral) {
        self.assumption_literal = Some(literal);
    }

    pub fn assumption_literals(&self) -> &BTreeMap<AssumptionLiteral, Vec<AssumptionLiteral>> {
        &self.assumption_literals
    }

    /// Record `predecessor` as one of the literals that can reach
    /// `literal`
    pub fn push_assumption_literal(
        &mut self,
        literal: AssumptionLiteral,
        predecessor: AssumptionLiteral,
    ) {
        let predecessors = self.assumption_literals.entry(literal).or_default();
        if !predecessors.contains(&predecessor) {
            predecessors.push(predecessor);
        }
    }

    pub fn assumptions(&self) -> &BTreeMap<AssumptionLiteral, Vec<TermId>> {
        &self.assumptions
    }

    pub fn push_assumption(&mut self, literal: AssumptionLiteral, assumption: TermId) {
        let assumptions = self.assumptions.entry(literal).or_default();
        if !assumptions.contains(&assumption) {
            assumptions.push(assumption);
        }
    }

    pub fn hard_constraints(
        &self,
    ) -> &BTreeMap<AssumptionLiteral, BTreeMap<ContextualizedName, TermId>> {
        &self.hard_constraints
    }

    pub fn push_hard_constraint(
        &mut self,
        literal: AssumptionLiteral,
        name: ContextualizedName,
        definition: TermId,
    ) {
        self.hard_constraints
            .entry(literal)
            .or_default()
            .insert(name, definition);
    }

    pub fn unknown_summary_literals(&self) -> &BTreeMap<AssumptionLiteral, AssumptionLiteral> {
        &self.unknown_summary_literals
    }

    pub fn push_unknown_summary_literal(
        &mut self,
        caller: AssumptionLiteral,
        callee_exit: AssumptionLiteral,
    ) {
        self.unknown_summary_literals.insert(caller, callee_exit);
    }

    pub(crate) fn absorb_vc_tables(&mut self, other: &State) {
        for (literal, predecessors) in &other.assumption_literals {
            for predecessor in predecessors {
                self.push_assumption_literal(literal.clone(), predecessor.clone());
            }
        }
        for (literal, assumptions) in &other.assumptions {
            for assumption in assumptions {
                self.push_assumption(literal.clone(), *assumption);
            }
        }
        for (literal, constraints) in &other.hard_constraints {
            for (name, definition) in constraints {
                self.push_hard_constraint(literal.clone(), name.clone(), *definition);
            }
        }
        for (caller, callee_exit) in &other.unknown_summary_literals {
            self.push_unknown_summary_literal(caller.clone(), callee_exit.clone());
        }
    }

    // Lowering

    /// The minimal expression of a term: substitute every
    /// contextualized constant by its definition in the symbolic
    /// store, recursively, stopping at self-referential constants
    /// (whole-program inputs, havoced values) and shadow constants.
    pub fn lower(
        &self,
        smt: &mut SmtContext,
        term: TermId,
        memo: &mut FxHashMap<TermId, TermId>,
    ) -> TermId {
        self.lower_bounded(smt, term, memo, 0)
    }

    fn lower_bounded(
        &self,
        smt: &mut SmtContext,
        term: TermId,
        memo: &mut FxHashMap<TermId, TermId>,
        depth: usize,
    ) -> TermId {
        const MAX_DEPTH: usize = 64;
        if depth > MAX_DEPTH {
            return term;
        }
        if let Some(&lowered) = memo.get(&term) {
            return lowered;
        }
        let constants = smt.uninterpreted_constants(term);
        let mut lowered = term;
        for (name, sort) in constants.iter() {
            let contextualized = match ContextualizedName::parse(name) {
                Some(contextualized) => contextualized,
                None => continue, // shadow or nondet constant
            };
            let definition = match self.symbolic.get(&contextualized) {
                Some(&definition) => definition,
                None => continue,
            };
            let constant = match sort {
                Sort::Bool => smt.mk_boolean_constant(name),
                Sort::Int => smt.mk_integer_constant(name),
            };
            if definition == constant {
                continue; // self-referential
            }
            let definition = self.lower_bounded(smt, definition, memo, depth + 1);
            lowered = smt.substitute(lowered, constant, definition);
        }
        memo.insert(term, lowered);
        lowered
    }

    /// Whether the term depends, transitively through the symbolic
    /// store, on an unconstrained constant (a whole-program input or
    /// a havoced value, both bound to themselves)
    pub fn contains_unconstrained_constant(&self, smt: &mut SmtContext, term: TermId) -> bool {
        let mut stack = vec![term];
        let mut seen: Vec<TermId> = Vec::new();
        while let Some(term) = stack.pop() {
            if seen.contains(&term) {
                continue;
            }
            seen.push(term);
            for (name, sort) in smt.uninterpreted_constants(term).iter() {
                let contextualized = match ContextualizedName::parse(name) {
                    Some(contextualized) => contextualized,
                    None => return true, // shadow and nondet constants are unconstrained
                };
                match self.symbolic.get(&contextualized) {
                    Some(&definition) => {
                        let constant = match sort {
                            Sort::Bool => smt.mk_boolean_constant(name),
                            Sort::Int => smt.mk_integer_constant(name),
                        };
                        if definition == constant {
                            return true;
                        }
                        stack.push(definition);
                    }
                    None => continue,
                }
            }
        }
        false
    }

    /// The set of defining equations a lowered expression still
    /// depends on: constants that are neither self-referential nor
    /// shadow constants contribute `constant = definition`.
    pub fn necessary_hard_constraints(&self, smt: &mut SmtContext, term: TermId) -> Vec<TermId> {
        let mut equations = Vec::new();
        let mut stack = vec![term];
        let mut seen: Vec<String> = Vec::new();
        while let Some(term) = stack.pop() {
            for (name, sort) in smt.uninterpreted_constants(term).iter() {
                if seen.contains(name) {
                    continue;
                }
                seen.push(name.clone());
                let contextualized = match ContextualizedName::parse(name) {
                    Some(contextualized) => contextualized,
                    None => continue,
                };
                let definition = match self.symbolic.get(&contextualized) {
                    Some(&definition) => definition,
                    None => continue,
                };
                let constant = match sort {
                    Sort::Bool => smt.mk_boolean_constant(name),
                    Sort::Int => smt.mk_integer_constant(name),
                };
                if definition == constant {
                    continue;
                }
                equations.push(smt.mk_eq(constant, definition));
                stack.push(definition);
            }
        }
        equations
    }

    /// Evaluate a lowered term under the concrete values of the
    /// unconstrained constants, preferring `overrides`
    pub fn evaluate_lowered(
        &self,
        smt: &SmtContext,
        term: TermId,
        overrides: &FxHashMap<String, Value>,
        new_version: bool,
    ) -> Option<Value> {
        smt.eval(term, &|name, _| {
            if let Some(value) = overrides.get(name) {
                return Some(*value);
            }
            let contextualized = ContextualizedName::parse(name)?;
            if new_version {
                self.concrete_new
                    .get(&contextualized)
                    .or_else(|| self.concrete.get(&contextualized))
                    .copied()
            } else {
                self.concrete.get(&contextualized).copied()
            }
        })
    }

    /// Re-evaluate every concrete binding after the model of a fork
    /// changed unconstrained constants
    pub fn reevaluate_concrete(&mut self, smt: &mut SmtContext, model: &FxHashMap<String, Value>) {
        let mut memo = FxHashMap::default();
        let names: Vec<ContextualizedName> = self.symbolic.keys().cloned().collect();
        let mut updated = BTreeMap::new();
        let mut updated_new = BTreeMap::new();
        for name in names {
            let definition = self.symbolic[&name];
            let lowered = self.lower(smt, definition, &mut memo);
            match self.evaluate_lowered(smt, lowered, model, false) {
                Some(value) => {
                    updated.insert(name.clone(), value);
                }
                None => {
                    if let Some(value) = self.concrete.get(&name) {
                        updated.insert(name.clone(), *value);
                    }
                }
            }
            if self.shadow_enabled {
                match self.evaluate_lowered(smt, lowered, model, true) {
                    Some(value) => {
                        updated_new.insert(name.clone(), value);
                    }
                    None => {
                        if let Some(value) = self.concrete_new.get(&name) {
                            updated_new.insert(name.clone(), *value);
                        }
                    }
                }
            }
        }
        if self.concrete_enabled {
            self.concrete = updated;
        }
        if self.shadow_enabled {
            self.concrete_new = updated_new;
        }
    }

    /// Turn a shadow-mode state into a plain state following the new
    /// program version: the new-version concrete store and path
    /// constraint become primary, the shadow bookkeeping is dropped.
    /// The second shadow phase explores divergent contexts this way.
    pub fn promote_new_version(&mut self) {
        if !self.shadow_enabled {
            return;
        }
        let mut promoted = std::mem::take(&mut self.concrete_new);
        for (name, value) in &self.concrete {
            promoted.entry(name.clone()).or_insert(*value);
        }
        self.concrete = promoted;
        self.path_constraint = std::mem::take(&mut self.path_constraint_new);
        self.shadow.clear();
        self.shadow_enabled = false;
    }

    /// Union the stores and version cache of another state into this
    /// one, keeping existing bindings; the merger unions prior
    /// versions this way
    pub(crate) fn union_stores(&mut self, other: &State) {
        for (name, term) in &other.symbolic {
            self.symbolic.entry(name.clone()).or_insert(*term);
        }
        for (name, value) in &other.concrete {
            self.concrete.entry(name.clone()).or_insert(*value);
        }
        for (name, value) in &other.concrete_new {
            self.concrete_new.entry(name.clone()).or_insert(*value);
        }
        for (name, &version) in &other.versions {
            let entry = self.versions.entry(name.clone()).or_insert(0);
            *entry = (*entry).max(version);
        }
    }

    /// Debug check of the store key-set invariant
    pub fn assert_stores_agree(&self) {
        if self.concrete_enabled {
            debug_assert_eq!(
                self.concrete.len(),
                self.symbolic.len(),
                "concrete and symbolic stores diverged"
            );
        }
    }

    /// Render the state for diagnostics
    pub fn display(&self, smt: &SmtContext) -> String {
        let mut out = String::new();
        out.push_str(&format!("state at {}\n", self.label));
        for (name, term) in &self.symbolic {
            let concrete = self
                .concrete
                .get(name)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "  {} = {} (concrete {})\n",
                name,
                smt.display(*term),
                concrete
            ));
        }
        for constraint in &self.path_constraint {
            out.push_str(&format!("  pc {}\n", smt.display(*constraint)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_updates_versions() {
        let mut state = State::new(0, true, false);
        let mut smt = SmtContext::new(0);
        let term = smt.mk_int(1);
        state.bind(
            ContextualizedName::new("P.x", 0, 0),
            term,
            Some(Value::Int(1)),
            None,
        );
        let term = smt.mk_int(2);
        state.bind(
            ContextualizedName::new("P.x", 3, 0),
            term,
            Some(Value::Int(2)),
            None,
        );
        assert_eq!(state.highest_version("P.x"), 3);
        state.assert_stores_agree();
    }

    #[test]
    fn test_lowering_stops_at_inputs() {
        let mut state = State::new(0, true, false);
        let mut smt = SmtContext::new(0);
        // P.a_0__0 is a whole-program input bound to itself
        let input = ContextualizedName::new("P.a", 0, 0);
        let input_term = smt.mk_integer_constant(&input.to_string());
        state.bind(input.clone(), input_term, Some(Value::Int(5)), None);
        // P.x_1__0 = P.a_0__0 + 1
        let x = ContextualizedName::new("P.x", 1, 0);
        let one = smt.mk_int(1);
        let sum = smt.mk_add(input_term, one);
        state.bind(x.clone(), sum, Some(Value::Int(6)), None);
        // P.y_1__0 = P.x_1__0 * 2
        let y = ContextualizedName::new("P.y", 1, 0);
        let x_term = smt.mk_integer_constant(&x.to_string());
        let two = smt.mk_int(2);
        let product = smt.mk_mul(x_term, two);
        state.bind(y.clone(), product, Some(Value::Int(12)), None);

        let mut memo = FxHashMap::default();
        let lowered = state.lower(&mut smt, product, &mut memo);
        // the lowered expression only mentions the input
        let constants = smt.uninterpreted_constants(lowered);
        assert_eq!(constants.len(), 1);
        assert_eq!(constants[0].0, input.to_string());

        assert!(state.contains_unconstrained_constant(&mut smt, product));
    }

    #[test]
    fn test_remove_intermediate_versions_keeps_version_zero() {
        let mut state = State::new(0, true, false);
        let mut smt = SmtContext::new(0);
        for version in 0..4 {
            let term = smt.mk_int(version as i32);
            state.bind(
                ContextualizedName::new("P.x", version, 0),
                term,
                Some(Value::Int(version as i32)),
                None,
            );
        }
        state.remove_intermediate_versions(0);
        assert_eq!(state.symbolic_store().len(), 1);
        assert!(state
            .symbolic_expression(&ContextualizedName::new("P.x", 0, 0))
            .is_some());
    }
}
