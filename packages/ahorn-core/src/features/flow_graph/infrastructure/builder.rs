//! IR to CFG lowering
//!
//! Walks each module body and emits vertices and edges: `sequence`
//! concatenates children, `if` produces an if-vertex with two branch
//! edges and a merge label, `while` a header with a true edge into
//! the body, a back edge, and a false edge past the loop, `call` a
//! call vertex with a call-to-return edge and an interprocedural call
//! edge; the symmetric return edge is created once the callee CFG is
//! known. Labels are dense integers assigned in emission order and
//! unique across the whole build.

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use rustc_hash::FxHashMap;

use crate::errors::{AhornError, Result};
use crate::features::flow_graph::domain::{
    Cfg, CfgKind, CfgRef, Edge, EdgeKind, Label, Vertex,
};
use crate::shared::models::{DataType, Instruction, Module, ModuleKind, Project};

pub struct Builder<'p> {
    project: &'p Project,
    next_label: Label,
    cfgs: FxHashMap<String, CfgRef>,
}

/// Sources waiting to be connected to the next emitted vertex
type Pending = Vec<(Label, EdgeKind)>;

struct ModuleEmission {
    vertices: BTreeMap<Label, Vertex>,
    edges: Vec<Edge>,
    /// (call label, callee type-representative name)
    calls: Vec<(Label, String)>,
}

impl<'p> Builder<'p> {
    pub fn new(project: &'p Project) -> Self {
        Self {
            project,
            next_label: 0,
            cfgs: FxHashMap::default(),
        }
    }

    /// Build the program CFG with all callee CFGs linked by name
    pub fn build(mut self) -> Result<CfgRef> {
        let order = self.callee_first_order()?;
        let mut program = None;
        for name in order {
            let module = self
                .project
                .module(&name)
                .ok_or_else(|| AhornError::ir_malformed(format!("no module named {}", name)))?;
            let cfg = self.build_module(module)?;
            if module.kind == ModuleKind::Program {
                program = Some(cfg);
            }
        }
        program.ok_or_else(|| AhornError::ir_malformed("project has no program module"))
    }

    /// Topological order of the call graph, callees first. A cyclic
    /// call graph means recursion, which the engine rejects.
    fn callee_first_order(&self) -> Result<Vec<String>> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut nodes = FxHashMap::default();
        for module in &self.project.modules {
            let node = graph.add_node(module.name.as_str());
            nodes.insert(module.name.as_str(), node);
        }
        for module in &self.project.modules {
            for variable in module.interface.variables() {
                if let DataType::Derived { type_name } = &variable.data_type {
                    let callee = nodes.get(type_name.as_str()).ok_or_else(|| {
                        AhornError::ir_malformed(format!(
                            "module {} references unknown module {}",
                            module.name, type_name
                        ))
                    })?;
                    graph.add_edge(nodes[module.name.as_str()], *callee, ());
                }
            }
        }
        let sorted = toposort(&graph, None)
            .map_err(|_| AhornError::ir_malformed("recursive call graph"))?;
        // toposort yields callers first; reverse for callees first
        Ok(sorted
            .into_iter()
            .rev()
            .map(|n| graph[n].to_string())
            .collect())
    }

    fn fresh_label(&mut self) -> Label {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    fn build_module(&mut self, module: &Module) -> Result<CfgRef> {
        let mut emission = ModuleEmission {
            vertices: BTreeMap::new(),
            edges: Vec::new(),
            calls: Vec::new(),
        };

        let entry_label = self.fresh_label();
        emission
            .vertices
            .insert(entry_label, Vertex::entry(entry_label));
        let mut pending: Pending = vec![(entry_label, EdgeKind::Intraprocedural)];

        for instruction in &module.body {
            self.emit(module, instruction, &mut pending, &mut emission)?;
        }

        let exit_label = self.fresh_label();
        emission
            .vertices
            .insert(exit_label, Vertex::exit(exit_label));
        connect(&mut emission.edges, &pending, exit_label);

        // interprocedural edges, now that every callee CFG is final
        for (call_label, callee_name) in &emission.calls {
            let callee = self.cfgs.get(callee_name).ok_or_else(|| {
                AhornError::ir_malformed(format!("no cfg named {}", callee_name))
            })?;
            emission.edges.push(Edge::new(
                *call_label,
                callee.entry_label(),
                EdgeKind::InterproceduralCall,
            ));
            let return_site = emission
                .edges
                .iter()
                .find(|e| {
                    e.source == *call_label && e.kind == EdgeKind::IntraproceduralCallToReturn
                })
                .map(|e| e.target)
                .expect("call vertex emitted with call-to-return edge");
            emission.edges.push(Edge::interprocedural_return(
                callee.exit_label(),
                return_site,
                module.name.clone(),
                *call_label,
            ));
        }

        patch_branch_goto_targets(&mut emission.vertices, &emission.edges);

        let kind = match module.kind {
            ModuleKind::Program => CfgKind::Program,
            ModuleKind::FunctionBlock => CfgKind::FunctionBlock,
            ModuleKind::Function => CfgKind::Function,
        };
        let cfg = Cfg::new(
            kind,
            module.name.clone(),
            module.interface.clone(),
            emission.vertices,
            emission.edges,
            entry_label,
            exit_label,
            self.cfgs.clone(),
        )?;
        let cfg = CfgRef::new(cfg);
        // register in the project-wide arena of every later cfg
        self.cfgs.insert(module.name.clone(), cfg.clone());
        Ok(cfg)
    }

    fn emit(
        &mut self,
        module: &Module,
        instruction: &Instruction,
        pending: &mut Pending,
        emission: &mut ModuleEmission,
    ) -> Result<()> {
        match instruction {
            Instruction::Sequence(instructions) => {
                for instruction in instructions {
                    self.emit(module, instruction, pending, emission)?;
                }
            }
            Instruction::Assignment { .. } | Instruction::Havoc { .. } => {
                let label = self.fresh_label();
                emission
                    .vertices
                    .insert(label, Vertex::regular(label, instruction.clone()));
                connect(&mut emission.edges, pending, label);
                *pending = vec![(label, EdgeKind::Intraprocedural)];
            }
            Instruction::Call { callee, .. } => {
                let label = self.fresh_label();
                emission
                    .vertices
                    .insert(label, Vertex::regular(label, instruction.clone()));
                connect(&mut emission.edges, pending, label);
                let callee_type = match module.interface.variable(&callee.path()) {
                    Some(variable) => match &variable.data_type {
                        DataType::Derived { type_name } => type_name.clone(),
                        other => {
                            return Err(AhornError::ir_malformed(format!(
                                "callee {} of {} has non-derived type {}",
                                callee, module.name, other
                            )))
                        }
                    },
                    None => {
                        return Err(AhornError::ir_malformed(format!(
                            "no callee variable {} in {}",
                            callee, module.name
                        )))
                    }
                };
                emission.calls.push((label, callee_type));
                *pending = vec![(label, EdgeKind::IntraproceduralCallToReturn)];
            }
            Instruction::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let label = self.fresh_label();
                // the branch goto targets are patched in a fixup pass
                // once the merge label exists
                emission.vertices.insert(
                    label,
                    Vertex::regular(
                        label,
                        Instruction::If {
                            condition: condition.clone(),
                            then_branch: Box::new(Instruction::Goto(0)),
                            else_branch: Box::new(Instruction::Goto(0)),
                        },
                    ),
                );
                connect(&mut emission.edges, pending, label);

                let mut then_pending: Pending = vec![(label, EdgeKind::TrueBranch)];
                self.emit(module, then_branch, &mut then_pending, emission)?;
                let mut else_pending: Pending = vec![(label, EdgeKind::FalseBranch)];
                self.emit(module, else_branch, &mut else_pending, emission)?;

                then_pending.extend(else_pending);
                *pending = then_pending;
            }
            Instruction::While { condition, body } => {
                let label = self.fresh_label();
                emission.vertices.insert(
                    label,
                    Vertex::regular(
                        label,
                        Instruction::While {
                            condition: condition.clone(),
                            body: Box::new(Instruction::Goto(0)),
                        },
                    ),
                );
                connect(&mut emission.edges, pending, label);

                let mut body_pending: Pending = vec![(label, EdgeKind::TrueBranch)];
                self.emit(module, body, &mut body_pending, emission)?;
                // back edge into the loop header
                connect(&mut emission.edges, &body_pending, label);
                *pending = vec![(label, EdgeKind::FalseBranch)];
            }
            Instruction::Goto(target) => {
                connect(&mut emission.edges, pending, *target);
                *pending = Vec::new();
            }
        }
        Ok(())
    }
}

fn connect(edges: &mut Vec<Edge>, pending: &Pending, target: Label) {
    for (source, kind) in pending {
        edges.push(Edge::new(*source, target, *kind));
    }
}

/// Patch the goto slots of if and while vertices to the actual branch
/// edge targets
pub(crate) fn patch_branch_goto_targets(vertices: &mut BTreeMap<Label, Vertex>, edges: &[Edge]) {
    let mut targets: FxHashMap<Label, (Option<Label>, Option<Label>)> = FxHashMap::default();
    for edge in edges {
        let entry = targets.entry(edge.source).or_default();
        match edge.kind {
            EdgeKind::TrueBranch => entry.0 = Some(edge.target),
            EdgeKind::FalseBranch => entry.1 = Some(edge.target),
            _ => {}
        }
    }
    for vertex in vertices.values_mut() {
        let label = vertex.label();
        let patched = match vertex.instruction() {
            Some(Instruction::If { condition, .. }) => {
                let (then_target, else_target) = targets.get(&label).copied().unwrap_or_default();
                match (then_target, else_target) {
                    (Some(then_target), Some(else_target)) => Some(Instruction::If {
                        condition: condition.clone(),
                        then_branch: Box::new(Instruction::Goto(then_target)),
                        else_branch: Box::new(Instruction::Goto(else_target)),
                    }),
                    _ => None,
                }
            }
            Some(Instruction::While { condition, .. }) => {
                let (then_target, _) = targets.get(&label).copied().unwrap_or_default();
                then_target.map(|body_target| Instruction::While {
                    condition: condition.clone(),
                    body: Box::new(Instruction::Goto(body_target)),
                })
            }
            _ => None,
        };
        if let Some(patched) = patched {
            vertex.set_instruction(patched);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{
        BinaryOperator, Expression, Interface, Section, Variable,
    };

    fn toy_project() -> Project {
        // P: x := 1; if (x > 0) y := 2 else y := 3; z := y + x
        let interface = Interface::new(vec![
            Variable::new("x", DataType::Int, Section::Local),
            Variable::new("y", DataType::Int, Section::Local),
            Variable::new("z", DataType::Int, Section::Output),
        ]);
        let body = vec![
            Instruction::assign("x", Expression::IntegerConstant(1)),
            Instruction::if_then_else(
                Expression::binary(
                    BinaryOperator::GreaterThan,
                    Expression::access("x"),
                    Expression::IntegerConstant(0),
                ),
                vec![Instruction::assign("y", Expression::IntegerConstant(2))],
                vec![Instruction::assign("y", Expression::IntegerConstant(3))],
            ),
            Instruction::assign(
                "z",
                Expression::binary(
                    BinaryOperator::Add,
                    Expression::access("y"),
                    Expression::access("x"),
                ),
            ),
        ];
        Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)])
    }

    #[test]
    fn test_if_produces_branches_and_merge() {
        let project = toy_project();
        let cfg = Builder::new(&project).build().unwrap();
        cfg.validate().unwrap();

        // entry, x := 1, if, y := 2, y := 3, z := y + x, exit
        assert_eq!(cfg.vertices().count(), 7);
        let if_label = cfg
            .vertices()
            .find(|v| matches!(v.instruction(), Some(Instruction::If { .. })))
            .unwrap()
            .label();
        let true_target = cfg.true_edge(if_label).unwrap().target;
        let false_target = cfg.false_edge(if_label).unwrap().target;
        assert_ne!(true_target, false_target);
        // both branches merge at the final assignment
        let merge_true = cfg.succeeding_labels(true_target);
        let merge_false = cfg.succeeding_labels(false_target);
        assert_eq!(merge_true, merge_false);
    }

    #[test]
    fn test_recursion_is_rejected() {
        let interface = Interface::new(vec![Variable::new(
            "this",
            DataType::Derived {
                type_name: "Fb".to_string(),
            },
            Section::Local,
        )]);
        let module = Module::new(
            ModuleKind::FunctionBlock,
            "Fb",
            interface,
            vec![Instruction::call("this")],
        );
        let program = Module::new(
            ModuleKind::Program,
            "P",
            Interface::new(vec![Variable::new(
                "fb",
                DataType::Derived {
                    type_name: "Fb".to_string(),
                },
                Section::Local,
            )]),
            vec![Instruction::call("fb")],
        );
        let project = Project::new(vec![module, program]);
        let result = Builder::new(&project).build();
        assert!(matches!(result, Err(AhornError::IrMalformed(_))));
    }

    #[test]
    fn test_while_has_back_edge() {
        let interface = Interface::new(vec![Variable::new("i", DataType::Int, Section::Local)]);
        let body = vec![Instruction::while_loop(
            Expression::binary(
                BinaryOperator::LessThan,
                Expression::access("i"),
                Expression::IntegerConstant(10),
            ),
            vec![Instruction::assign(
                "i",
                Expression::binary(
                    BinaryOperator::Add,
                    Expression::access("i"),
                    Expression::IntegerConstant(1),
                ),
            )],
        )];
        let project = Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)]);
        let cfg = Builder::new(&project).build().unwrap();
        cfg.validate().unwrap();

        let header = cfg
            .vertices()
            .find(|v| matches!(v.instruction(), Some(Instruction::While { .. })))
            .unwrap()
            .label();
        let body_label = cfg.true_edge(header).unwrap().target;
        assert!(cfg.succeeding_labels(body_label).contains(&header));
        assert_eq!(cfg.false_edge(header).unwrap().target, cfg.exit_label());
    }
}
