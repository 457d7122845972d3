//! SSA pass over a CFG

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::Result;
use crate::features::flow_graph::{
    patch_branch_goto_targets, Cfg, CfgRef, Edge, EdgeKind, Label, Vertex,
};
use crate::features::lowering::{max_label, merge_arena, reachable_callee_first};
use crate::shared::models::{Expression, Instruction, VariableReference};

/// Strip the SSA version suffix of a renamed variable, e.g.
/// `fb.x_3` yields `fb.x`
pub fn ssa_base_name(name: &str) -> &str {
    match name.rfind('_') {
        Some(position) if name[position + 1..].chars().all(|c| c.is_ascii_digit()) => {
            &name[..position]
        }
        _ => name,
    }
}

/// A phi candidate: placed on demand, completed on sealing, removed
/// eagerly when trivial
#[derive(Debug, Clone)]
struct PhiCandidate {
    name: String,
    label: Label,
    value: i32,
    operands: Vec<i32>,
    users: Vec<i32>,
    removed: bool,
}

pub struct SsaPass {
    next_label: Label,
    value: i32,
    value_to_name: FxHashMap<i32, String>,
    current_definitions: FxHashMap<(String, Label), i32>,
    phi_candidates: FxHashMap<i32, PhiCandidate>,
    substitutions: FxHashMap<i32, i32>,
    filled: FxHashSet<Label>,
    sealed: FxHashSet<Label>,
    incomplete: FxHashMap<Label, Vec<i32>>,
}

impl SsaPass {
    pub fn new() -> Self {
        Self {
            next_label: 0,
            value: 0,
            value_to_name: FxHashMap::default(),
            current_definitions: FxHashMap::default(),
            phi_candidates: FxHashMap::default(),
            substitutions: FxHashMap::default(),
            filled: FxHashSet::default(),
            sealed: FxHashSet::default(),
            incomplete: FxHashMap::default(),
        }
    }

    pub fn apply(&mut self, program: &Cfg) -> Result<CfgRef> {
        self.next_label = max_label(program) + 1;
        let mut rebuilt = FxHashMap::default();
        for callee in reachable_callee_first(program) {
            let cfg = self.rewrite(&callee, &rebuilt)?;
            rebuilt.insert(callee.name().to_string(), cfg);
        }
        self.rewrite(program, &rebuilt)
    }

    fn reset(&mut self) {
        self.current_definitions.clear();
        self.phi_candidates.clear();
        self.substitutions.clear();
        self.filled.clear();
        self.sealed.clear();
        self.incomplete.clear();
    }

    fn rewrite(
        &mut self,
        cfg: &Cfg,
        rebuilt: &FxHashMap<String, CfgRef>,
    ) -> Result<CfgRef> {
        self.reset();

        let order = reverse_post_order(cfg);
        self.sealed.insert(cfg.entry_label());
        self.filled.insert(cfg.entry_label());

        // rename while walking; placeholders carry the value id until
        // all trivial phis are resolved
        let mut rewritten: FxHashMap<Label, Instruction> = FxHashMap::default();
        for &label in &order {
            let vertex = cfg.vertex(label)?;
            if let Some(instruction) = vertex.instruction() {
                let renamed = self.rename_instruction(cfg, instruction, label);
                rewritten.insert(label, renamed);
            }
            self.filled.insert(label);
            self.seal_where_possible(cfg, &order);
        }
        self.seal_where_possible(cfg, &order);

        // materialize
        let mut vertices: BTreeMap<Label, Vertex> = BTreeMap::new();
        let mut edges: Vec<Edge> = cfg.edges().cloned().collect();
        for vertex in cfg.vertices() {
            let label = vertex.label();
            match rewritten.get(&label) {
                Some(instruction) => {
                    let mut vertex = vertex.clone();
                    vertex.set_instruction(self.materialize_instruction(instruction));
                    vertices.insert(label, vertex);
                }
                None => {
                    vertices.insert(label, vertex.clone());
                }
            }
        }

        // phi assignments become a vertex chain in front of their
        // block; every incoming edge, back edges included, re-targets
        // the head of the chain
        let mut phis_per_label: FxHashMap<Label, Vec<PhiCandidate>> = FxHashMap::default();
        for candidate in self.phi_candidates.values() {
            if !candidate.removed {
                phis_per_label
                    .entry(candidate.label)
                    .or_default()
                    .push(candidate.clone());
            }
        }
        for (label, mut candidates) in phis_per_label {
            candidates.sort_by_key(|c| c.value);
            let chain: Vec<Label> = candidates.iter().map(|_| self.fresh_label()).collect();
            let head = chain[0];
            for edge in edges.iter_mut() {
                if edge.target == label && edge.kind != EdgeKind::InterproceduralReturn {
                    edge.target = head;
                }
            }
            for (i, candidate) in candidates.iter().enumerate() {
                let operands = candidate
                    .operands
                    .iter()
                    .map(|&operand| {
                        Expression::access(self.versioned_name(self.resolve(operand)))
                    })
                    .collect();
                let instruction = Instruction::assign(
                    self.versioned_name(candidate.value),
                    Expression::Phi {
                        name: candidate.name.clone(),
                        operands,
                    },
                );
                vertices.insert(chain[i], Vertex::regular(chain[i], instruction));
                let next = chain.get(i + 1).copied().unwrap_or(label);
                edges.push(Edge::new(chain[i], next, EdgeKind::Intraprocedural));
            }
        }

        patch_branch_goto_targets(&mut vertices, &edges);

        let cfg = Cfg::new(
            cfg.kind(),
            cfg.name(),
            cfg.interface().clone(),
            vertices,
            edges,
            cfg.entry_label(),
            cfg.exit_label(),
            merge_arena(cfg, rebuilt),
        )?;
        Ok(CfgRef::new(cfg))
    }

    fn fresh_label(&mut self) -> Label {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    fn fresh_value(&mut self, name: &str) -> i32 {
        let value = self.value;
        self.value += 1;
        self.value_to_name.insert(value, name.to_string());
        value
    }

    fn versioned_name(&self, value: i32) -> String {
        let base = self
            .value_to_name
            .get(&value)
            .expect("every value has an owning variable");
        format!("{}_{}", base, value)
    }

    fn resolve(&self, mut value: i32) -> i32 {
        while let Some(&next) = self.substitutions.get(&value) {
            value = next;
        }
        value
    }

    fn write_variable(&mut self, name: &str, label: Label, value: i32) {
        self.current_definitions
            .insert((name.to_string(), label), value);
    }

    fn read_variable(&mut self, cfg: &Cfg, name: &str, label: Label) -> i32 {
        if let Some(&value) = self.current_definitions.get(&(name.to_string(), label)) {
            return self.resolve(value);
        }
        self.read_variable_recursive(cfg, name, label)
    }

    fn read_variable_recursive(&mut self, cfg: &Cfg, name: &str, label: Label) -> i32 {
        let value;
        if !self.sealed.contains(&label) {
            // incomplete CFG part: place an operand-less phi candidate
            value = self.place_operandless_phi(name, label);
            self.incomplete.entry(label).or_default().push(value);
        } else if label == cfg.entry_label() {
            // undefined on entry: the incoming value of the variable
            value = self.fresh_value(name);
        } else {
            let predecessors = cfg.preceding_labels(label);
            if predecessors.len() == 1 {
                value = self.read_variable(cfg, name, predecessors[0]);
            } else {
                let phi = self.place_operandless_phi(name, label);
                self.write_variable(name, label, phi);
                value = self.add_phi_operands(cfg, name, phi);
            }
        }
        self.write_variable(name, label, value);
        value
    }

    fn place_operandless_phi(&mut self, name: &str, label: Label) -> i32 {
        let value = self.fresh_value(name);
        self.phi_candidates.insert(
            value,
            PhiCandidate {
                name: name.to_string(),
                label,
                value,
                operands: Vec::new(),
                users: Vec::new(),
                removed: false,
            },
        );
        value
    }

    fn add_phi_operands(&mut self, cfg: &Cfg, name: &str, phi: i32) -> i32 {
        let label = self.phi_candidates[&phi].label;
        let predecessors = cfg.preceding_labels(label);
        for predecessor in predecessors {
            let operand = self.read_variable(cfg, name, predecessor);
            if let Some(candidate) = self.phi_candidates.get_mut(&phi) {
                candidate.operands.push(operand);
            }
            if let Some(used) = self.phi_candidates.get_mut(&operand) {
                used.users.push(phi);
            }
        }
        self.try_remove_trivial_phi(phi)
    }

    /// A phi with a single distinct operand value (besides itself) is
    /// trivial; remove it and rewrite its users, which may become
    /// trivial in turn
    fn try_remove_trivial_phi(&mut self, phi: i32) -> i32 {
        let candidate = self.phi_candidates[&phi].clone();
        let mut same: Option<i32> = None;
        for &operand in &candidate.operands {
            let operand = self.resolve(operand);
            if operand == phi || Some(operand) == same {
                continue;
            }
            if same.is_some() {
                return phi; // two distinct operands, not trivial
            }
            same = Some(operand);
        }
        let same = match same {
            Some(value) => value,
            None => self.fresh_value(&candidate.name), // unreachable or self-referential only
        };
        self.substitutions.insert(phi, same);
        if let Some(candidate) = self.phi_candidates.get_mut(&phi) {
            candidate.removed = true;
        }
        for user in candidate.users {
            if user != phi && !self.phi_candidates[&user].removed {
                self.try_remove_trivial_phi(user);
            }
        }
        same
    }

    fn seal_where_possible(&mut self, cfg: &Cfg, order: &[Label]) {
        for &label in order {
            if self.sealed.contains(&label) {
                continue;
            }
            let predecessors = cfg.preceding_labels(label);
            if predecessors.iter().all(|p| self.filled.contains(p)) {
                self.seal_block(cfg, label);
            }
        }
    }

    fn seal_block(&mut self, cfg: &Cfg, label: Label) {
        self.sealed.insert(label);
        if let Some(incomplete) = self.incomplete.remove(&label) {
            for phi in incomplete {
                let name = self.phi_candidates[&phi].name.clone();
                self.add_phi_operands(cfg, &name, phi);
            }
        }
    }

    // Renaming

    fn rename_instruction(
        &mut self,
        cfg: &Cfg,
        instruction: &Instruction,
        label: Label,
    ) -> Instruction {
        match instruction {
            Instruction::Assignment {
                variable,
                expression,
            } => {
                let expression = self.rename_expression(cfg, expression, label);
                let name = variable.path();
                let value = self.fresh_value(&name);
                self.write_variable(&name, label, value);
                Instruction::assign(placeholder(value), expression)
            }
            Instruction::Havoc { variable } => {
                let name = variable.path();
                let value = self.fresh_value(&name);
                self.write_variable(&name, label, value);
                Instruction::Havoc {
                    variable: VariableReference::Variable(placeholder(value)),
                }
            }
            Instruction::If {
                condition,
                then_branch,
                else_branch,
            } => Instruction::If {
                condition: self.rename_expression(cfg, condition, label),
                then_branch: then_branch.clone(),
                else_branch: else_branch.clone(),
            },
            Instruction::While { condition, body } => Instruction::While {
                condition: self.rename_expression(cfg, condition, label),
                body: body.clone(),
            },
            Instruction::Sequence(instructions) => Instruction::Sequence(
                instructions
                    .iter()
                    .map(|i| self.rename_instruction(cfg, i, label))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn rename_expression(
        &mut self,
        cfg: &Cfg,
        expression: &Expression,
        label: Label,
    ) -> Expression {
        match expression {
            Expression::Access(reference) => {
                let name = reference.path();
                let value = self.read_variable(cfg, &name, label);
                Expression::access(placeholder(value))
            }
            Expression::Unary { operator, operand } => Expression::unary(
                *operator,
                self.rename_expression(cfg, operand, label),
            ),
            Expression::Binary {
                operator,
                left,
                right,
            } => Expression::binary(
                *operator,
                self.rename_expression(cfg, left, label),
                self.rename_expression(cfg, right, label),
            ),
            Expression::BooleanToInteger(operand) => Expression::BooleanToInteger(Box::new(
                self.rename_expression(cfg, operand, label),
            )),
            Expression::IntegerToBoolean(operand) => Expression::IntegerToBoolean(Box::new(
                self.rename_expression(cfg, operand, label),
            )),
            Expression::Change { old, new } => Expression::change(
                self.rename_expression(cfg, old, label),
                self.rename_expression(cfg, new, label),
            ),
            other => other.clone(),
        }
    }

    /// Replace value placeholders by final versioned names once all
    /// substitutions are known
    fn materialize_instruction(&self, instruction: &Instruction) -> Instruction {
        match instruction {
            Instruction::Assignment {
                variable,
                expression,
            } => Instruction::assign(
                self.materialize_name(&variable.path()),
                self.materialize_expression(expression),
            ),
            Instruction::Havoc { variable } => Instruction::Havoc {
                variable: VariableReference::Variable(self.materialize_name(&variable.path())),
            },
            Instruction::If {
                condition,
                then_branch,
                else_branch,
            } => Instruction::If {
                condition: self.materialize_expression(condition),
                then_branch: then_branch.clone(),
                else_branch: else_branch.clone(),
            },
            Instruction::While { condition, body } => Instruction::While {
                condition: self.materialize_expression(condition),
                body: body.clone(),
            },
            Instruction::Sequence(instructions) => Instruction::Sequence(
                instructions
                    .iter()
                    .map(|i| self.materialize_instruction(i))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn materialize_expression(&self, expression: &Expression) -> Expression {
        match expression {
            Expression::Access(reference) => {
                Expression::access(self.materialize_name(&reference.path()))
            }
            Expression::Unary { operator, operand } => {
                Expression::unary(*operator, self.materialize_expression(operand))
            }
            Expression::Binary {
                operator,
                left,
                right,
            } => Expression::binary(
                *operator,
                self.materialize_expression(left),
                self.materialize_expression(right),
            ),
            Expression::BooleanToInteger(operand) => {
                Expression::BooleanToInteger(Box::new(self.materialize_expression(operand)))
            }
            Expression::IntegerToBoolean(operand) => {
                Expression::IntegerToBoolean(Box::new(self.materialize_expression(operand)))
            }
            Expression::Change { old, new } => Expression::change(
                self.materialize_expression(old),
                self.materialize_expression(new),
            ),
            other => other.clone(),
        }
    }

    fn materialize_name(&self, name: &str) -> String {
        match name.strip_prefix('@') {
            Some(value) => {
                let value: i32 = value.parse().expect("placeholder carries a value id");
                self.versioned_name(self.resolve(value))
            }
            None => name.to_string(),
        }
    }
}

impl Default for SsaPass {
    fn default() -> Self {
        Self::new()
    }
}

fn placeholder(value: i32) -> String {
    format!("@{}", value)
}

/// Reverse post-order over intraprocedural edges from the entry
fn reverse_post_order(cfg: &Cfg) -> Vec<Label> {
    let mut order = Vec::new();
    let mut visited = FxHashSet::default();
    post_order(cfg, cfg.entry_label(), &mut visited, &mut order);
    order.reverse();
    order
}

fn post_order(cfg: &Cfg, label: Label, visited: &mut FxHashSet<Label>, order: &mut Vec<Label>) {
    if !visited.insert(label) {
        return;
    }
    for successor in cfg.succeeding_labels(label) {
        post_order(cfg, successor, visited, order);
    }
    order.push(label);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::Builder;
    use crate::shared::models::{
        BinaryOperator, DataType, Interface, Module, ModuleKind, Project, Section, Variable,
    };

    fn assignments(cfg: &Cfg) -> Vec<(String, Expression)> {
        cfg.vertices()
            .filter_map(|v| match v.instruction() {
                Some(Instruction::Assignment {
                    variable,
                    expression,
                }) => Some((variable.path(), expression.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_versions_increase_along_straight_line() {
        let interface = Interface::new(vec![Variable::new("x", DataType::Int, Section::Local)]);
        let body = vec![
            Instruction::assign("x", Expression::IntegerConstant(1)),
            Instruction::assign(
                "x",
                Expression::binary(
                    BinaryOperator::Add,
                    Expression::access("x"),
                    Expression::IntegerConstant(1),
                ),
            ),
        ];
        let project = Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)]);
        let cfg = Builder::new(&project).build().unwrap();
        let ssa = SsaPass::new().apply(&cfg).unwrap();
        let assignments = assignments(&ssa);
        assert_eq!(assignments.len(), 2);
        let (first, _) = &assignments[0];
        let (second, rhs) = &assignments[1];
        assert_ne!(first, second);
        assert_eq!(ssa_base_name(first), "x");
        assert_eq!(ssa_base_name(second), "x");
        // the second assignment reads the first definition
        match rhs {
            Expression::Binary { left, .. } => {
                assert_eq!(**left, Expression::access(first.clone()));
            }
            other => panic!("expected binary, got {}", other),
        }
    }

    #[test]
    fn test_join_inserts_phi() {
        let interface = Interface::new(vec![
            Variable::new("a", DataType::Bool, Section::Input),
            Variable::new("y", DataType::Int, Section::Local),
            Variable::new("z", DataType::Int, Section::Local),
        ]);
        let body = vec![
            Instruction::if_then_else(
                Expression::access("a"),
                vec![Instruction::assign("y", Expression::IntegerConstant(1))],
                vec![Instruction::assign("y", Expression::IntegerConstant(2))],
            ),
            Instruction::assign("z", Expression::access("y")),
        ];
        let project = Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)]);
        let cfg = Builder::new(&project).build().unwrap();
        let ssa = SsaPass::new().apply(&cfg).unwrap();
        ssa.validate().unwrap();

        let phis: Vec<_> = ssa
            .vertices()
            .filter(|v| {
                matches!(
                    v.instruction(),
                    Some(Instruction::Assignment {
                        expression: Expression::Phi { .. },
                        ..
                    })
                )
            })
            .collect();
        assert_eq!(phis.len(), 1);
        match phis[0].instruction() {
            Some(Instruction::Assignment {
                expression: Expression::Phi { name, operands },
                ..
            }) => {
                assert_eq!(name, "y");
                assert_eq!(operands.len(), 2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_no_trivial_phi_without_join() {
        let interface = Interface::new(vec![
            Variable::new("a", DataType::Bool, Section::Input),
            Variable::new("y", DataType::Int, Section::Local),
        ]);
        // y is only assigned in one branch; the phi at the join merges
        // the incoming definition with the branch definition and is
        // not trivial; x is never conditionally assigned, so no phi
        // exists for it
        let body = vec![
            Instruction::assign("y", Expression::IntegerConstant(0)),
            Instruction::if_then_else(
                Expression::access("a"),
                vec![Instruction::assign("y", Expression::IntegerConstant(1))],
                vec![],
            ),
            Instruction::assign("y", Expression::access("y")),
        ];
        let project = Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)]);
        let cfg = Builder::new(&project).build().unwrap();
        let ssa = SsaPass::new().apply(&cfg).unwrap();

        let phi_count = ssa
            .vertices()
            .filter(|v| {
                matches!(
                    v.instruction(),
                    Some(Instruction::Assignment {
                        expression: Expression::Phi { .. },
                        ..
                    })
                )
            })
            .count();
        assert_eq!(phi_count, 1);
    }
}
