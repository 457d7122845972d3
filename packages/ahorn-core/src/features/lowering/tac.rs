//! Three-address code pass
//!
//! Introduces a fresh temporary local for every proper sub-expression
//! so that every assignment's right-hand side is a literal, a
//! variable access, a unary or cast of one access, or a binary of two
//! accesses. The pass is context-insensitive and preserves operand
//! order; `if` and `while` conditions deeper than one binary are
//! hoisted into a boolean temporary.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::features::flow_graph::{
    patch_branch_goto_targets, Cfg, CfgRef, Edge, EdgeKind, Label, Vertex,
};
use crate::shared::models::{
    DataType, Expression, Instruction, Section, UnaryOperator, Variable, VariableReference,
};

use super::basic_block::merge_arena;
use super::{max_label, reachable_callee_first};

const TEMPORARY_PREFIX: &str = "tac";

pub struct TacPass {
    next_label: Label,
    next_temporary: u32,
}

impl TacPass {
    pub fn new() -> Self {
        Self {
            next_label: 0,
            next_temporary: 0,
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

    fn fresh_label(&mut self) -> Label {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    fn fresh_temporary(&mut self, data_type: DataType, temporaries: &mut Vec<Variable>) -> String {
        let name = format!("{}{}", TEMPORARY_PREFIX, self.next_temporary);
        self.next_temporary += 1;
        temporaries.push(Variable::new(name.clone(), data_type, Section::Local));
        name
    }

    fn rewrite(&mut self, cfg: &Cfg, rebuilt: &FxHashMap<String, CfgRef>) -> Result<CfgRef> {
        let mut temporaries: Vec<Variable> = Vec::new();
        let mut vertices: BTreeMap<Label, Vertex> = BTreeMap::new();
        let mut edges: Vec<Edge> = cfg.edges().cloned().collect();

        for vertex in cfg.vertices() {
            let label = vertex.label();
            let mut prefix: Vec<Instruction> = Vec::new();
            let instruction = match vertex.instruction() {
                Some(Instruction::Assignment {
                    variable,
                    expression,
                }) => {
                    let expression =
                        self.flatten_rhs(cfg, expression, &mut prefix, &mut temporaries);
                    Some(Instruction::Assignment {
                        variable: variable.clone(),
                        expression,
                    })
                }
                Some(Instruction::Sequence(instructions)) => {
                    let mut rewritten = Vec::new();
                    for instruction in instructions {
                        if let Instruction::Assignment {
                            variable,
                            expression,
                        } = instruction
                        {
                            let expression = self.flatten_rhs(
                                cfg,
                                expression,
                                &mut rewritten,
                                &mut temporaries,
                            );
                            rewritten.push(Instruction::Assignment {
                                variable: variable.clone(),
                                expression,
                            });
                        } else {
                            rewritten.push(instruction.clone());
                        }
                    }
                    Some(Instruction::Sequence(rewritten))
                }
                Some(Instruction::If {
                    condition,
                    then_branch,
                    else_branch,
                }) => {
                    let condition =
                        self.flatten_condition(cfg, condition, &mut prefix, &mut temporaries);
                    Some(Instruction::If {
                        condition,
                        then_branch: then_branch.clone(),
                        else_branch: else_branch.clone(),
                    })
                }
                Some(Instruction::While { condition, body }) => {
                    let condition =
                        self.flatten_condition(cfg, condition, &mut prefix, &mut temporaries);
                    Some(Instruction::While {
                        condition,
                        body: body.clone(),
                    })
                }
                other => other.cloned(),
            };

            if prefix.is_empty() {
                let mut vertex = vertex.clone();
                if let Some(instruction) = instruction {
                    vertex.set_instruction(instruction);
                }
                vertices.insert(label, vertex);
            } else {
                // hoisted temporaries become a vertex chain in front
                // of the rewritten vertex; incoming edges re-target
                // the head of the chain
                let chain: Vec<Label> = prefix.iter().map(|_| self.fresh_label()).collect();
                let head = chain[0];
                for edge in edges.iter_mut() {
                    if edge.target == label {
                        edge.target = head;
                    }
                }
                for (i, hoisted) in prefix.into_iter().enumerate() {
                    vertices.insert(chain[i], Vertex::regular(chain[i], hoisted));
                    let next = chain.get(i + 1).copied().unwrap_or(label);
                    edges.push(Edge::new(chain[i], next, EdgeKind::Intraprocedural));
                }
                let mut vertex = vertex.clone();
                if let Some(instruction) = instruction {
                    vertex.set_instruction(instruction);
                }
                vertices.insert(label, vertex);
            }
        }

        patch_branch_goto_targets(&mut vertices, &edges);

        let mut interface = cfg.interface().clone();
        for temporary in temporaries {
            interface.push(temporary);
        }
        // while loops re-enter their header; the condition chain sits
        // before the header, so back edges already pass through it
        let entry_label = cfg.entry_label();
        let cfg = Cfg::new(
            cfg.kind(),
            cfg.name(),
            interface,
            vertices,
            edges,
            entry_label,
            cfg.exit_label(),
            merge_arena(cfg, rebuilt),
        )?;
        Ok(CfgRef::new(cfg))
    }

    /// Flatten an assignment right-hand side to depth two or less
    fn flatten_rhs(
        &mut self,
        cfg: &Cfg,
        expression: &Expression,
        prefix: &mut Vec<Instruction>,
        temporaries: &mut Vec<Variable>,
    ) -> Expression {
        match expression {
            Expression::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.atomize(cfg, left, prefix, temporaries);
                let right = self.atomize(cfg, right, prefix, temporaries);
                Expression::Binary {
                    operator: *operator,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            Expression::Unary { operator, operand } => {
                let operand = self.atomize(cfg, operand, prefix, temporaries);
                Expression::Unary {
                    operator: *operator,
                    operand: Box::new(operand),
                }
            }
            Expression::BooleanToInteger(operand) => {
                let operand = self.atomize(cfg, operand, prefix, temporaries);
                Expression::BooleanToInteger(Box::new(operand))
            }
            Expression::IntegerToBoolean(operand) => {
                let operand = self.atomize(cfg, operand, prefix, temporaries);
                Expression::IntegerToBoolean(Box::new(operand))
            }
            Expression::Change { old, new } => {
                let old = self.atomize(cfg, old, prefix, temporaries);
                let new = self.atomize(cfg, new, prefix, temporaries);
                Expression::change(old, new)
            }
            atom => atom.clone(),
        }
    }

    /// Reduce a sub-expression to a literal or access, hoisting it
    /// into a temporary otherwise
    fn atomize(
        &mut self,
        cfg: &Cfg,
        expression: &Expression,
        prefix: &mut Vec<Instruction>,
        temporaries: &mut Vec<Variable>,
    ) -> Expression {
        if is_atom(expression) {
            return expression.clone();
        }
        let flattened = self.flatten_rhs(cfg, expression, prefix, temporaries);
        let data_type = infer_type(cfg, &flattened);
        let name = self.fresh_temporary(data_type, temporaries);
        prefix.push(Instruction::assign(name.clone(), flattened));
        Expression::access(name)
    }

    /// Conditions stay branch instructions; anything deeper than one
    /// binary over atoms is hoisted into a boolean temporary
    fn flatten_condition(
        &mut self,
        cfg: &Cfg,
        condition: &Expression,
        prefix: &mut Vec<Instruction>,
        temporaries: &mut Vec<Variable>,
    ) -> Expression {
        if condition.depth() <= 2 {
            return condition.clone();
        }
        let flattened = self.flatten_rhs(cfg, condition, prefix, temporaries);
        let name = self.fresh_temporary(DataType::Bool, temporaries);
        prefix.push(Instruction::assign(name.clone(), flattened));
        Expression::access(name)
    }
}

impl Default for TacPass {
    fn default() -> Self {
        Self::new()
    }
}

fn is_atom(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::BooleanConstant(_)
            | Expression::IntegerConstant(_)
            | Expression::TimeConstant(_)
            | Expression::EnumeratedValue { .. }
            | Expression::Undefined
            | Expression::Nondeterministic
            | Expression::Access(_)
    )
}

/// Result type of an expression, resolved against the flattened
/// interface of the owning CFG
fn infer_type(cfg: &Cfg, expression: &Expression) -> DataType {
    match expression {
        Expression::BooleanConstant(_) => DataType::Bool,
        Expression::IntegerConstant(_) => DataType::Int,
        Expression::TimeConstant(_) => DataType::Time,
        Expression::EnumeratedValue { .. } => DataType::Int,
        Expression::Undefined | Expression::Nondeterministic => DataType::Int,
        Expression::Access(reference) => resolve_type(cfg, reference),
        Expression::Unary { operator, operand } => match operator {
            UnaryOperator::Not => DataType::Bool,
            UnaryOperator::Negate => infer_type(cfg, operand),
        },
        Expression::Binary { operator, left, .. } => {
            if operator.is_relational() {
                DataType::Bool
            } else {
                match operator {
                    crate::shared::models::BinaryOperator::And
                    | crate::shared::models::BinaryOperator::Or
                    | crate::shared::models::BinaryOperator::Xor => infer_type(cfg, left),
                    _ => DataType::Int,
                }
            }
        }
        Expression::BooleanToInteger(_) => DataType::Int,
        Expression::IntegerToBoolean(_) => DataType::Bool,
        Expression::Change { old, .. } => infer_type(cfg, old),
        Expression::Phi { operands, .. } => operands
            .first()
            .map(|o| infer_type(cfg, o))
            .unwrap_or(DataType::Int),
    }
}

fn resolve_type(cfg: &Cfg, reference: &VariableReference) -> DataType {
    let path = reference.path();
    cfg.flattened_variable(&path)
        .map(|v| v.data_type.clone())
        .unwrap_or(DataType::Int)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::Builder;
    use crate::shared::models::{
        BinaryOperator, Interface, Module, ModuleKind, Project,
    };

    fn max_rhs_depth(cfg: &Cfg) -> usize {
        cfg.vertices()
            .filter_map(|v| match v.instruction() {
                Some(Instruction::Assignment { expression, .. }) => Some(expression.depth()),
                Some(Instruction::Sequence(instructions)) => instructions
                    .iter()
                    .filter_map(|i| match i {
                        Instruction::Assignment { expression, .. } => Some(expression.depth()),
                        _ => None,
                    })
                    .max(),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_deep_rhs_is_flattened() {
        let interface = Interface::new(vec![
            Variable::new("a", DataType::Int, Section::Input),
            Variable::new("b", DataType::Int, Section::Input),
            Variable::new("c", DataType::Int, Section::Input),
            Variable::new("x", DataType::Int, Section::Output),
        ]);
        // x := (a + b) * (b + c)
        let body = vec![Instruction::assign(
            "x",
            Expression::binary(
                BinaryOperator::Multiply,
                Expression::binary(
                    BinaryOperator::Add,
                    Expression::access("a"),
                    Expression::access("b"),
                ),
                Expression::binary(
                    BinaryOperator::Add,
                    Expression::access("b"),
                    Expression::access("c"),
                ),
            ),
        )];
        let project = Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)]);
        let cfg = Builder::new(&project).build().unwrap();
        assert_eq!(max_rhs_depth(&cfg), 3);

        let tac = TacPass::new().apply(&cfg).unwrap();
        tac.validate().unwrap();
        assert!(max_rhs_depth(&tac) <= 2);
        // two temporaries were introduced
        assert_eq!(tac.interface().len(), 6);
        // operand order is preserved: the first temporary holds a + b
        let first_temporary = tac
            .vertices()
            .filter_map(|v| match v.instruction() {
                Some(Instruction::Assignment {
                    variable,
                    expression,
                }) if variable.path().starts_with(TEMPORARY_PREFIX) => Some(expression.clone()),
                _ => None,
            })
            .next()
            .unwrap();
        match first_temporary {
            Expression::Binary { left, .. } => {
                assert_eq!(*left, Expression::access("a"));
            }
            other => panic!("expected binary, got {}", other),
        }
    }

    #[test]
    fn test_shallow_condition_is_kept() {
        let interface = Interface::new(vec![Variable::new("a", DataType::Int, Section::Input)]);
        let body = vec![Instruction::if_then_else(
            Expression::binary(
                BinaryOperator::GreaterThan,
                Expression::access("a"),
                Expression::IntegerConstant(0),
            ),
            vec![],
            vec![],
        )];
        let project = Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)]);
        let cfg = Builder::new(&project).build().unwrap();
        let tac = TacPass::new().apply(&cfg).unwrap();
        assert_eq!(tac.vertices().count(), cfg.vertices().count());
    }
}
