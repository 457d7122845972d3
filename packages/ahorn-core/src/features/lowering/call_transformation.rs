//! Call-transformation pass
//!
//! Makes the procedure interface explicit at call sites: actual-to-
//! formal argument copying is hoisted onto the call-to-return
//! predecessor side of the call vertex, formal-to-actual result
//! copying onto the return-edge successor side. Afterwards every call
//! vertex is a bare `call(callee_access)` the executor and summarizer
//! can align values over.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::features::flow_graph::{Cfg, CfgRef, Edge, EdgeKind, Label, Vertex};
use crate::shared::models::{CallArguments, Expression, Instruction, VariableReference};

use super::basic_block::merge_arena;
use super::{max_label, reachable_callee_first};

pub struct CallTransformationPass {
    next_label: Label,
}

impl CallTransformationPass {
    pub fn new() -> Self {
        Self { next_label: 0 }
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

    fn rewrite(&mut self, cfg: &Cfg, rebuilt: &FxHashMap<String, CfgRef>) -> Result<CfgRef> {
        let mut vertices: BTreeMap<Label, Vertex> = BTreeMap::new();
        let mut edges: Vec<Edge> = cfg.edges().cloned().collect();

        for vertex in cfg.vertices() {
            let label = vertex.label();
            let (callee, arguments) = match vertex.instruction() {
                Some(Instruction::Call { callee, arguments }) if !arguments.is_empty() => {
                    (callee.clone(), arguments.clone())
                }
                _ => {
                    vertices.insert(label, vertex.clone());
                    continue;
                }
            };

            let callee_path = callee.path();

            // actual-to-formal copies in front of the call
            let input_copies: Vec<Instruction> = arguments
                .inputs
                .iter()
                .map(|(formal, actual)| {
                    Instruction::assignment(
                        VariableReference::Field {
                            record: callee_path.clone(),
                            name: formal.clone(),
                        },
                        actual.clone(),
                    )
                })
                .collect();
            if !input_copies.is_empty() {
                let chain: Vec<Label> = input_copies.iter().map(|_| self.fresh_label()).collect();
                let head = chain[0];
                for edge in edges.iter_mut() {
                    if edge.target == label && edge.kind != EdgeKind::InterproceduralReturn {
                        edge.target = head;
                    }
                }
                for (i, copy) in input_copies.into_iter().enumerate() {
                    vertices.insert(chain[i], Vertex::regular(chain[i], copy));
                    let next = chain.get(i + 1).copied().unwrap_or(label);
                    edges.push(Edge::new(chain[i], next, EdgeKind::Intraprocedural));
                }
            }

            // formal-to-actual copies on the return side: both the
            // call-to-return edge and the interprocedural return edge
            // re-target the head of the copy chain
            let output_copies: Vec<Instruction> = arguments
                .outputs
                .iter()
                .map(|(formal, actual)| {
                    Instruction::assignment(
                        actual.clone(),
                        Expression::Access(VariableReference::Field {
                            record: callee_path.clone(),
                            name: formal.clone(),
                        }),
                    )
                })
                .collect();
            if !output_copies.is_empty() {
                let return_site = cfg.call_to_return_edge(label)?.target;
                let chain: Vec<Label> = output_copies.iter().map(|_| self.fresh_label()).collect();
                let head = chain[0];
                for edge in edges.iter_mut() {
                    let is_this_call_to_return = edge.source == label
                        && edge.kind == EdgeKind::IntraproceduralCallToReturn;
                    let is_this_return = edge.kind == EdgeKind::InterproceduralReturn
                        && edge.target == return_site
                        && edge.call_label == Some(label);
                    if is_this_call_to_return || is_this_return {
                        edge.target = head;
                    }
                }
                for (i, copy) in output_copies.into_iter().enumerate() {
                    vertices.insert(chain[i], Vertex::regular(chain[i], copy));
                    let next = chain.get(i + 1).copied().unwrap_or(return_site);
                    edges.push(Edge::new(chain[i], next, EdgeKind::Intraprocedural));
                }
            }

            vertices.insert(
                label,
                Vertex::regular(
                    label,
                    Instruction::Call {
                        callee,
                        arguments: CallArguments::default(),
                    },
                ),
            );
        }

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
}

impl Default for CallTransformationPass {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::Builder;
    use crate::shared::models::{
        DataType, Interface, Module, ModuleKind, Project, Section, Variable,
    };

    #[test]
    fn test_arguments_are_hoisted() {
        let fb = Module::new(
            ModuleKind::FunctionBlock,
            "Inc",
            Interface::new(vec![
                Variable::new("x", DataType::Int, Section::Input),
                Variable::new("y", DataType::Int, Section::Output),
            ]),
            vec![Instruction::assign(
                "y",
                Expression::binary(
                    crate::shared::models::BinaryOperator::Add,
                    Expression::access("x"),
                    Expression::IntegerConstant(1),
                ),
            )],
        );
        let program = Module::new(
            ModuleKind::Program,
            "P",
            Interface::new(vec![
                Variable::new("a", DataType::Int, Section::Input),
                Variable::new("r", DataType::Int, Section::Output),
                Variable::new(
                    "inc",
                    DataType::Derived {
                        type_name: "Inc".to_string(),
                    },
                    Section::Local,
                ),
            ]),
            vec![Instruction::Call {
                callee: VariableReference::Variable("inc".to_string()),
                arguments: CallArguments {
                    inputs: vec![("x".to_string(), Expression::access("a"))],
                    outputs: vec![(
                        "y".to_string(),
                        VariableReference::Variable("r".to_string()),
                    )],
                },
            }],
        );
        let project = Project::new(vec![fb, program]);
        let cfg = Builder::new(&project).build().unwrap();
        let transformed = CallTransformationPass::new().apply(&cfg).unwrap();
        transformed.validate().unwrap();

        // the call itself lost its arguments
        let call = transformed
            .vertices()
            .find(|v| matches!(v.instruction(), Some(Instruction::Call { .. })))
            .unwrap();
        match call.instruction() {
            Some(Instruction::Call { arguments, .. }) => assert!(arguments.is_empty()),
            _ => unreachable!(),
        }

        // an inc.x := a copy precedes the call
        let call_label = call.label();
        let predecessor = transformed.preceding_labels(call_label)[0];
        match transformed.vertex(predecessor).unwrap().instruction() {
            Some(Instruction::Assignment { variable, .. }) => {
                assert_eq!(variable.path(), "inc.x");
            }
            other => panic!("expected input copy, got {:?}", other),
        }

        // an r := inc.y copy follows on the return side
        let return_target = transformed.call_to_return_edge(call_label).unwrap().target;
        match transformed.vertex(return_target).unwrap().instruction() {
            Some(Instruction::Assignment {
                variable,
                expression,
            }) => {
                assert_eq!(variable.path(), "r");
                assert_eq!(
                    *expression,
                    Expression::Access(VariableReference::Field {
                        record: "inc".to_string(),
                        name: "y".to_string(),
                    })
                );
            }
            other => panic!("expected output copy, got {:?}", other),
        }
        // the interprocedural return edge follows the copy chain too
        let return_edge = transformed
            .interprocedural_return_edge(return_target)
            .unwrap();
        assert_eq!(return_edge.call_label, Some(call_label));
    }
}
