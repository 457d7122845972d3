//! Call-stack frames

use crate::features::flow_graph::{CfgRef, Label};
use crate::features::smt::TermId;

/// One frame of a context's call stack: the CFG being executed, the
/// scope prefix of its variable instances, the label execution
/// resumes at in the caller, and the local path constraint that is
/// reset on procedure exit.
#[derive(Debug, Clone)]
pub struct Frame {
    cfg: CfgRef,
    scope: String,
    return_label: Label,
    local_path_constraints: Vec<TermId>,
}

impl Frame {
    pub fn new(cfg: CfgRef, scope: impl Into<String>, return_label: Label) -> Self {
        Self {
            cfg,
            scope: scope.into(),
            return_label,
            local_path_constraints: Vec::new(),
        }
    }

    pub fn cfg(&self) -> &CfgRef {
        &self.cfg
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn return_label(&self) -> Label {
        self.return_label
    }

    pub fn local_path_constraints(&self) -> &[TermId] {
        &self.local_path_constraints
    }

    pub fn push_local_path_constraint(&mut self, constraint: TermId) {
        self.local_path_constraints.push(constraint);
    }

    pub fn clear_local_path_constraints(&mut self) {
        self.local_path_constraints.clear();
    }

    pub(crate) fn set_local_path_constraints(&mut self, constraints: Vec<TermId>) {
        self.local_path_constraints = constraints;
    }
}
