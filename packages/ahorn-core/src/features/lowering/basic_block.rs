//! Basic-block grouping pass
//!
//! Coalesces maximal chains of regular vertices with exactly one
//! predecessor and one successor (and neither call nor branch
//! instruction) into a single vertex whose instruction is a
//! `sequence`. Branch targets, call sites, and return sites keep
//! their labels.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::features::flow_graph::{Cfg, CfgRef, Edge, EdgeKind, Label, Vertex, VertexKind};
use crate::shared::models::Instruction;

use super::reachable_callee_first;

pub struct BasicBlockPass;

impl BasicBlockPass {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&self, program: &Cfg) -> Result<CfgRef> {
        let mut rebuilt = FxHashMap::default();
        for callee in reachable_callee_first(program) {
            let cfg = group(&callee, &rebuilt)?;
            rebuilt.insert(callee.name().to_string(), cfg);
        }
        group(program, &rebuilt)
    }
}

impl Default for BasicBlockPass {
    fn default() -> Self {
        Self::new()
    }
}

fn is_simple(vertex: &Vertex) -> bool {
    vertex.kind() == VertexKind::Regular
        && matches!(
            vertex.instruction(),
            Some(Instruction::Assignment { .. })
                | Some(Instruction::Havoc { .. })
                | Some(Instruction::Sequence(_))
        )
}

fn group(cfg: &Cfg, rebuilt: &FxHashMap<String, CfgRef>) -> Result<CfgRef> {
    // map each coalesced label onto its chain representative
    let mut representative: FxHashMap<Label, Label> = FxHashMap::default();
    let mut chains: Vec<Vec<Label>> = Vec::new();

    for vertex in cfg.vertices() {
        let label = vertex.label();
        if !is_simple(vertex) || representative.contains_key(&label) {
            continue;
        }
        // only chain heads start a chain: a head is not extendable
        // backwards over a single intraprocedural edge
        let predecessors = cfg.preceding_labels(label);
        let extendable_backwards = predecessors.len() == 1
            && cfg
                .vertex(predecessors[0])
                .map(|p| {
                    is_simple(p)
                        && cfg.succeeding_labels(predecessors[0]).len() == 1
                        && cfg
                            .outgoing_edges(predecessors[0])
                            .iter()
                            .any(|e| e.target == label && e.kind == EdgeKind::Intraprocedural)
                })
                .unwrap_or(false);
        if extendable_backwards {
            continue;
        }

        let mut chain = vec![label];
        let mut current = label;
        loop {
            let successors = cfg.succeeding_labels(current);
            if successors.len() != 1 {
                break;
            }
            let next = successors[0];
            let via_intraprocedural = cfg
                .outgoing_edges(current)
                .iter()
                .any(|e| e.target == next && e.kind == EdgeKind::Intraprocedural);
            let next_vertex = cfg.vertex(next)?;
            if !via_intraprocedural
                || !is_simple(next_vertex)
                || cfg.preceding_labels(next).len() != 1
            {
                break;
            }
            chain.push(next);
            current = next;
        }
        for &member in &chain {
            representative.insert(member, label);
        }
        chains.push(chain);
    }

    let mut vertices: BTreeMap<Label, Vertex> = BTreeMap::new();
    for vertex in cfg.vertices() {
        let label = vertex.label();
        match representative.get(&label) {
            Some(&head) if head != label => {} // merged away
            Some(&head) => {
                let chain = chains
                    .iter()
                    .find(|c| c[0] == head)
                    .expect("chain recorded for its head");
                if chain.len() == 1 {
                    vertices.insert(label, vertex.clone());
                } else {
                    let mut instructions = Vec::new();
                    for &member in chain {
                        match cfg.vertex(member)?.instruction() {
                            Some(Instruction::Sequence(nested)) => {
                                instructions.extend(nested.iter().cloned())
                            }
                            Some(instruction) => instructions.push(instruction.clone()),
                            None => {}
                        }
                    }
                    vertices.insert(
                        label,
                        Vertex::regular(label, Instruction::Sequence(instructions)),
                    );
                }
            }
            None => {
                vertices.insert(label, vertex.clone());
            }
        }
    }

    let map = |label: Label| representative.get(&label).copied().unwrap_or(label);
    let mut edges: Vec<Edge> = Vec::new();
    for edge in cfg.edges() {
        let source_head = map(edge.source);
        let target_head = map(edge.target);
        // drop chain-internal edges
        if edge.kind == EdgeKind::Intraprocedural
            && source_head == target_head
            && edge.source != edge.target
        {
            continue;
        }
        // edges out of a merged vertex originate from its tail member;
        // re-anchor on the representative
        let mut relinked = edge.clone();
        relinked.source = if vertices.contains_key(&edge.source) {
            edge.source
        } else {
            source_head
        };
        relinked.target = if vertices.contains_key(&edge.target) {
            edge.target
        } else {
            target_head
        };
        if !edges.contains(&relinked) {
            edges.push(relinked);
        }
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

/// Arena for the rebuilt CFG: rebuilt callees where available, the
/// previous arena entries otherwise
pub(crate) fn merge_arena(
    cfg: &Cfg,
    rebuilt: &FxHashMap<String, CfgRef>,
) -> FxHashMap<String, CfgRef> {
    let mut arena = cfg.cfgs().clone();
    for (name, new_cfg) in rebuilt {
        arena.insert(name.clone(), new_cfg.clone());
    }
    arena
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::Builder;
    use crate::shared::models::{
        BinaryOperator, DataType, Expression, Interface, Module, ModuleKind, Project, Section,
        Variable,
    };

    #[test]
    fn test_straight_line_code_collapses() {
        let interface = Interface::new(vec![
            Variable::new("x", DataType::Int, Section::Local),
            Variable::new("y", DataType::Int, Section::Local),
        ]);
        let body = vec![
            Instruction::assign("x", Expression::IntegerConstant(1)),
            Instruction::assign("y", Expression::IntegerConstant(2)),
            Instruction::assign(
                "x",
                Expression::binary(
                    BinaryOperator::Add,
                    Expression::access("x"),
                    Expression::access("y"),
                ),
            ),
        ];
        let project = Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)]);
        let cfg = Builder::new(&project).build().unwrap();
        assert_eq!(cfg.vertices().count(), 5);

        let grouped = BasicBlockPass::new().apply(&cfg).unwrap();
        // entry, one basic block, exit
        assert_eq!(grouped.vertices().count(), 3);
        grouped.validate().unwrap();
        let block = grouped
            .vertices()
            .find(|v| v.kind() == VertexKind::Regular)
            .unwrap();
        match block.instruction() {
            Some(Instruction::Sequence(instructions)) => assert_eq!(instructions.len(), 3),
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_branches_are_not_grouped_across() {
        let interface = Interface::new(vec![
            Variable::new("a", DataType::Bool, Section::Input),
            Variable::new("y", DataType::Int, Section::Local),
        ]);
        let body = vec![Instruction::if_then_else(
            Expression::access("a"),
            vec![Instruction::assign("y", Expression::IntegerConstant(1))],
            vec![Instruction::assign("y", Expression::IntegerConstant(2))],
        )];
        let project = Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)]);
        let cfg = Builder::new(&project).build().unwrap();
        let grouped = BasicBlockPass::new().apply(&cfg).unwrap();
        grouped.validate().unwrap();
        // entry, if, then, else, exit survive untouched
        assert_eq!(grouped.vertices().count(), cfg.vertices().count());
    }
}
