//! Change-annotation collection
//!
//! Collects the labels of all vertices, across the program CFG and
//! its callees, whose instruction carries a change annotation. The
//! shadow engine uses the set to select change-traversing test cases.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;

use crate::features::flow_graph::{Cfg, Label};

pub struct ChangeAnnotationCollectionPass;

impl ChangeAnnotationCollectionPass {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&self, program: &Cfg) -> BTreeSet<Label> {
        let mut labels = BTreeSet::new();
        let mut visited = FxHashSet::default();
        collect(program, &mut labels, &mut visited);
        labels
    }
}

impl Default for ChangeAnnotationCollectionPass {
    fn default() -> Self {
        Self::new()
    }
}

fn collect(cfg: &Cfg, labels: &mut BTreeSet<Label>, visited: &mut FxHashSet<String>) {
    if !visited.insert(cfg.name().to_string()) {
        return;
    }
    for vertex in cfg.vertices() {
        if let Some(instruction) = vertex.instruction() {
            if instruction.contains_change() {
                labels.insert(vertex.label());
            }
        }
    }
    for callee in cfg.callees() {
        collect(&callee, labels, visited);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::Builder;
    use crate::shared::models::{
        BinaryOperator, DataType, Expression, Instruction, Interface, Module, ModuleKind,
        Project, Section, Variable,
    };

    #[test]
    fn test_change_annotated_if_is_collected() {
        let interface = Interface::new(vec![
            Variable::new("a", DataType::Int, Section::Input),
            Variable::new("x", DataType::Int, Section::Output),
        ]);
        // old: a < 0, new: a <= 0
        let condition = Expression::change(
            Expression::binary(
                BinaryOperator::LessThan,
                Expression::access("a"),
                Expression::IntegerConstant(0),
            ),
            Expression::binary(
                BinaryOperator::LessThanOrEqual,
                Expression::access("a"),
                Expression::IntegerConstant(0),
            ),
        );
        let body = vec![Instruction::if_then_else(
            condition,
            vec![Instruction::assign("x", Expression::IntegerConstant(0))],
            vec![Instruction::assign("x", Expression::IntegerConstant(1))],
        )];
        let project = Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)]);
        let cfg = Builder::new(&project).build().unwrap();
        let labels = ChangeAnnotationCollectionPass::new().apply(&cfg);
        assert_eq!(labels.len(), 1);
        let vertex = cfg.vertex(*labels.iter().next().unwrap()).unwrap();
        assert!(matches!(vertex.instruction(), Some(Instruction::If { .. })));
    }
}
