//! CFG arena
//!
//! CFGs reference their callee CFGs by type-representative name and
//! resolve by lookup; no back-pointers. Every CFG carries the full
//! name-to-cfg map of the project, so nested lookups stay cheap Rc
//! clones. CFGs are immutable during analysis; passes produce new
//! CFGs.

use std::collections::BTreeMap;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::errors::{AhornError, Result};
use crate::shared::models::{Constant, DataType, Instruction, Interface, Section, VariableReference};

use super::edge::{Edge, EdgeKind};
use super::vertex::{Vertex, VertexKind};

pub type Label = u32;
pub type CfgRef = Rc<Cfg>;

/// Kind of a CFG; mirrors the module kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgKind {
    Program,
    FunctionBlock,
    Function,
}

/// One entry of a flattened interface: the dot-separated path of a
/// variable reachable through composite locals, relative to the
/// owning CFG
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedVariable {
    pub path: String,
    pub data_type: DataType,
    pub section: Section,
    pub initialization: Option<Constant>,
    /// Whether the variable is declared at the top level of the
    /// owning interface (as opposed to inside a composite local)
    pub top_level: bool,
}

#[derive(Debug)]
pub struct Cfg {
    kind: CfgKind,
    name: String,
    interface: Interface,
    vertices: BTreeMap<Label, Vertex>,
    edges: Vec<Edge>,
    entry_label: Label,
    exit_label: Label,
    cfgs: FxHashMap<String, CfgRef>,
    flattened: Vec<FlattenedVariable>,
}

impl Cfg {
    /// Construct a CFG; the flattened interface is expanded eagerly
    /// through `cfgs`.
    pub fn new(
        kind: CfgKind,
        name: impl Into<String>,
        interface: Interface,
        vertices: BTreeMap<Label, Vertex>,
        edges: Vec<Edge>,
        entry_label: Label,
        exit_label: Label,
        cfgs: FxHashMap<String, CfgRef>,
    ) -> Result<Self> {
        let flattened = flatten_interface(&interface, &cfgs)?;
        Ok(Self {
            kind,
            name: name.into(),
            interface,
            vertices,
            edges,
            entry_label,
            exit_label,
            cfgs,
            flattened,
        })
    }

    pub fn kind(&self) -> CfgKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    /// Flattened interface in declaration order
    pub fn flattened_interface(&self) -> &[FlattenedVariable] {
        &self.flattened
    }

    pub fn flattened_variable(&self, path: &str) -> Option<&FlattenedVariable> {
        self.flattened.iter().find(|v| v.path == path)
    }

    pub fn entry_label(&self) -> Label {
        self.entry_label
    }

    pub fn exit_label(&self) -> Label {
        self.exit_label
    }

    pub fn entry(&self) -> &Vertex {
        &self.vertices[&self.entry_label]
    }

    pub fn exit(&self) -> &Vertex {
        &self.vertices[&self.exit_label]
    }

    pub fn vertex(&self, label: Label) -> Result<&Vertex> {
        self.vertices
            .get(&label)
            .ok_or_else(|| AhornError::ir_malformed(format!("no vertex {} in {}", label, self.name)))
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.vertices.keys().copied()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Retrieves a type-representative CFG given its name, from the
    /// project-wide arena
    pub fn cfg(&self, name: &str) -> Result<CfgRef> {
        self.cfgs
            .get(name)
            .cloned()
            .ok_or_else(|| AhornError::ir_malformed(format!("no cfg named {}", name)))
    }

    pub fn cfgs(&self) -> &FxHashMap<String, CfgRef> {
        &self.cfgs
    }

    /// Direct callee CFGs of this CFG, deduplicated by
    /// type-representative name, in label order
    pub fn callees(&self) -> Vec<CfgRef> {
        let mut callees: Vec<CfgRef> = Vec::new();
        for vertex in self.vertices.values() {
            if let Some(Instruction::Call { .. }) = vertex.instruction() {
                if let Ok(callee) = self.callee(vertex.label()) {
                    if !callees.iter().any(|c| c.name() == callee.name()) {
                        callees.push(callee);
                    }
                }
            }
        }
        callees
    }

    /// Callee CFG of the call at `label`
    pub fn callee(&self, label: Label) -> Result<CfgRef> {
        let vertex = self.vertex(label)?;
        let callee = match vertex.instruction() {
            Some(Instruction::Call { callee, .. }) => callee,
            _ => {
                return Err(AhornError::ir_malformed(format!(
                    "vertex {} of {} is not a call",
                    label, self.name
                )))
            }
        };
        self.callee_of_reference(callee)
    }

    /// Resolve the type-representative CFG of a callee instance
    /// reference through the interface
    pub fn callee_of_reference(&self, callee: &VariableReference) -> Result<CfgRef> {
        let name = callee.path();
        let variable = self.flattened_or_interface_type(&name).ok_or_else(|| {
            AhornError::ir_malformed(format!("no callee variable {} in {}", name, self.name))
        })?;
        match variable {
            DataType::Derived { type_name } => self.cfg(&type_name),
            other => Err(AhornError::ir_malformed(format!(
                "callee {} of {} has non-derived type {}",
                name, self.name, other
            ))),
        }
    }

    fn flattened_or_interface_type(&self, path: &str) -> Option<DataType> {
        if let Some(variable) = self.interface.variable(path) {
            return Some(variable.data_type.clone());
        }
        // nested instance, e.g. fb.inner
        let (head, rest) = path.split_once('.')?;
        let head_type = self.interface.variable(head)?;
        if let DataType::Derived { type_name } = &head_type.data_type {
            let callee = self.cfgs.get(type_name)?;
            callee.flattened_or_interface_type(rest)
        } else {
            None
        }
    }

    /// Labels of all calls whose callee is the named
    /// type-representative CFG
    pub fn call_labels(&self, type_representative_name: &str) -> Vec<Label> {
        self.vertices
            .values()
            .filter(|v| matches!(v.instruction(), Some(Instruction::Call { .. })))
            .filter(|v| {
                self.callee(v.label())
                    .map(|c| c.name() == type_representative_name)
                    .unwrap_or(false)
            })
            .map(|v| v.label())
            .collect()
    }

    // Edge lookups

    fn edge_from(&self, label: Label, kind: EdgeKind) -> Result<&Edge> {
        self.edges
            .iter()
            .find(|e| e.source == label && e.kind == kind)
            .ok_or_else(|| {
                AhornError::ir_malformed(format!(
                    "no {:?} edge from {} in {}",
                    kind, label, self.name
                ))
            })
    }

    pub fn true_edge(&self, label: Label) -> Result<&Edge> {
        self.edge_from(label, EdgeKind::TrueBranch)
    }

    pub fn false_edge(&self, label: Label) -> Result<&Edge> {
        self.edge_from(label, EdgeKind::FalseBranch)
    }

    pub fn intraprocedural_edge(&self, label: Label) -> Result<&Edge> {
        self.edge_from(label, EdgeKind::Intraprocedural)
    }

    pub fn call_to_return_edge(&self, label: Label) -> Result<&Edge> {
        self.edge_from(label, EdgeKind::IntraproceduralCallToReturn)
    }

    pub fn interprocedural_call_edge(&self, label: Label) -> Result<&Edge> {
        self.edge_from(label, EdgeKind::InterproceduralCall)
    }

    /// The return edge pointing at `return_label`
    pub fn interprocedural_return_edge(&self, return_label: Label) -> Result<&Edge> {
        self.edges
            .iter()
            .find(|e| e.kind == EdgeKind::InterproceduralReturn && e.target == return_label)
            .ok_or_else(|| {
                AhornError::ir_malformed(format!(
                    "no return edge to {} in {}",
                    return_label, self.name
                ))
            })
    }

    pub fn outgoing_edges(&self, label: Label) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source == label).collect()
    }

    pub fn incoming_edges(&self, label: Label) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.target == label).collect()
    }

    /// Intraprocedural successor labels (excludes interprocedural
    /// edges; the call-to-return edge represents the local flow of a
    /// call)
    pub fn succeeding_labels(&self, label: Label) -> Vec<Label> {
        self.edges
            .iter()
            .filter(|e| e.source == label && !e.kind.is_interprocedural())
            .map(|e| e.target)
            .collect()
    }

    pub fn preceding_labels(&self, label: Label) -> Vec<Label> {
        self.edges
            .iter()
            .filter(|e| e.target == label && !e.kind.is_interprocedural())
            .map(|e| e.source)
            .collect()
    }

    /// Check the structural invariants of this CFG
    pub fn validate(&self) -> Result<()> {
        let entries = self
            .vertices
            .values()
            .filter(|v| v.kind() == VertexKind::Entry)
            .count();
        let exits = self
            .vertices
            .values()
            .filter(|v| v.kind() == VertexKind::Exit)
            .count();
        if entries != 1 || exits != 1 {
            return Err(AhornError::ir_malformed(format!(
                "{} has {} entries and {} exits",
                self.name, entries, exits
            )));
        }
        for vertex in self.vertices.values() {
            let label = vertex.label();
            if vertex.kind() == VertexKind::Regular {
                if self.preceding_labels(label).is_empty() {
                    return Err(AhornError::ir_malformed(format!(
                        "vertex {} of {} has no predecessor",
                        label, self.name
                    )));
                }
                if self.succeeding_labels(label).is_empty() {
                    return Err(AhornError::ir_malformed(format!(
                        "vertex {} of {} has no successor",
                        label, self.name
                    )));
                }
            }
            match vertex.instruction() {
                Some(Instruction::If { .. }) | Some(Instruction::While { .. }) => {
                    self.true_edge(label)?;
                    self.false_edge(label)?;
                    let branches = self
                        .outgoing_edges(label)
                        .iter()
                        .filter(|e| {
                            matches!(e.kind, EdgeKind::TrueBranch | EdgeKind::FalseBranch)
                        })
                        .count();
                    if branches != 2 {
                        return Err(AhornError::ir_malformed(format!(
                            "branch vertex {} of {} has {} branch edges",
                            label, self.name, branches
                        )));
                    }
                }
                Some(Instruction::Call { .. }) => {
                    let call_edge = self.interprocedural_call_edge(label)?;
                    let return_site = self.call_to_return_edge(label)?.target;
                    let return_edge = self.interprocedural_return_edge(return_site)?;
                    if return_edge.call_label != Some(label)
                        || return_edge.caller.as_deref() != Some(self.name.as_str())
                    {
                        return Err(AhornError::ir_malformed(format!(
                            "return edge of call {} in {} does not repeat caller and call label",
                            label, self.name
                        )));
                    }
                    let callee = self.callee(label)?;
                    if call_edge.target != callee.entry_label() {
                        return Err(AhornError::ir_malformed(format!(
                            "call edge of {} in {} does not reach the callee entry",
                            label, self.name
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Cfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ({:?})", self.name, self.kind)?;
        for vertex in self.vertices.values() {
            writeln!(f, "  {}", vertex)?;
        }
        for edge in &self.edges {
            writeln!(f, "  {:?} {}", edge.kind, edge)?;
        }
        Ok(())
    }
}

/// Fixed-point expansion of composite locals into dotted paths
fn flatten_interface(
    interface: &Interface,
    cfgs: &FxHashMap<String, CfgRef>,
) -> Result<Vec<FlattenedVariable>> {
    let mut flattened = Vec::new();
    for variable in interface.variables() {
        match &variable.data_type {
            DataType::Derived { type_name } => {
                let callee = cfgs.get(type_name).ok_or_else(|| {
                    AhornError::ir_malformed(format!(
                        "variable {} references unknown module {}",
                        variable.name, type_name
                    ))
                })?;
                for nested in callee.flattened_interface() {
                    flattened.push(FlattenedVariable {
                        path: format!("{}.{}", variable.name, nested.path),
                        data_type: nested.data_type.clone(),
                        section: nested.section,
                        initialization: nested.initialization.clone(),
                        top_level: false,
                    });
                }
            }
            scalar => flattened.push(FlattenedVariable {
                path: variable.name.clone(),
                data_type: scalar.clone(),
                section: variable.section,
                initialization: variable.initialization.clone(),
                top_level: true,
            }),
        }
    }
    Ok(flattened)
}
