//! Explorer
//!
//! The sole scheduler of the engine: a deque of pending contexts and
//! the coverage map over the static CFG. The exploration heuristic
//! decides whether the deque is popped depth-first or breadth-first;
//! breadth-first yields deterministic topological merging.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::config::ExplorationHeuristic;
use crate::features::flow_graph::{Cfg, Label};
use crate::shared::models::Instruction;

use super::super::context::Context;

/// Statement and branch coverage over the static CFG
#[derive(Debug, Clone, Default)]
pub struct Coverage {
    covered_statements: FxHashMap<Label, bool>,
    /// per branch vertex: (true branch covered, false branch covered)
    covered_branches: FxHashMap<Label, (bool, bool)>,
}

impl Coverage {
    pub fn statement_coverage(&self) -> f64 {
        if self.covered_statements.is_empty() {
            return 1.0;
        }
        let covered = self.covered_statements.values().filter(|c| **c).count();
        covered as f64 / self.covered_statements.len() as f64
    }

    pub fn branch_coverage(&self) -> f64 {
        if self.covered_branches.is_empty() {
            return 1.0;
        }
        let covered = self
            .covered_branches
            .values()
            .map(|(t, f)| usize::from(*t) + usize::from(*f))
            .sum::<usize>();
        covered as f64 / (2 * self.covered_branches.len()) as f64
    }

    pub fn is_complete(&self) -> bool {
        self.statement_coverage() >= 1.0 && self.branch_coverage() >= 1.0
    }
}

pub struct Explorer {
    contexts: VecDeque<Context>,
    heuristic: ExplorationHeuristic,
    coverage: Coverage,
}

impl Explorer {
    pub fn new(heuristic: ExplorationHeuristic) -> Self {
        Self {
            contexts: VecDeque::new(),
            heuristic,
            coverage: Coverage::default(),
        }
    }

    /// Seed the coverage map from the static CFG, dropping labels and
    /// branch directions the value-set pre-pass proved unreachable
    pub fn initialize(
        &mut self,
        cfg: &Cfg,
        unreachable_labels: &[Label],
        unreachable_branches: &[(Label, bool)],
    ) {
        self.contexts.clear();
        self.coverage = Coverage::default();
        let mut visited = FxHashSet::default();
        self.initialize_coverage(cfg, &mut visited);
        for label in unreachable_labels {
            self.coverage.covered_statements.remove(label);
            self.coverage.covered_branches.remove(label);
        }
        for (label, direction) in unreachable_branches {
            if let Some(entry) = self.coverage.covered_branches.get_mut(label) {
                if *direction {
                    entry.0 = true;
                } else {
                    entry.1 = true;
                }
            }
        }
    }

    fn initialize_coverage(&mut self, cfg: &Cfg, visited: &mut FxHashSet<String>) {
        if !visited.insert(cfg.name().to_string()) {
            return;
        }
        for vertex in cfg.vertices() {
            match vertex.instruction() {
                Some(Instruction::If { .. }) | Some(Instruction::While { .. }) => {
                    self.coverage
                        .covered_statements
                        .insert(vertex.label(), false);
                    self.coverage
                        .covered_branches
                        .insert(vertex.label(), (false, false));
                }
                Some(_) => {
                    self.coverage
                        .covered_statements
                        .insert(vertex.label(), false);
                }
                None => {}
            }
        }
        for callee in cfg.callees() {
            self.initialize_coverage(&callee, visited);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn push(&mut self, context: Context) {
        self.contexts.push_back(context);
    }

    pub fn pop(&mut self) -> Option<Context> {
        match self.heuristic {
            ExplorationHeuristic::DepthFirst => self.contexts.pop_back(),
            ExplorationHeuristic::BreadthFirst => self.contexts.pop_front(),
        }
    }

    pub fn coverage(&self) -> &Coverage {
        &self.coverage
    }

    /// Record that `label` was executed and that the context moved on
    /// to its current vertex. Returns whether a statement and whether
    /// a branch was newly covered.
    pub fn update_coverage(
        &mut self,
        cfg: &Cfg,
        label: Label,
        context: &Context,
    ) -> (bool, bool) {
        let mut statement_newly_covered = false;
        if let Some(covered) = self.coverage.covered_statements.get_mut(&label) {
            if !*covered {
                *covered = true;
                statement_newly_covered = true;
            }
        }
        let mut branch_newly_covered = false;
        if let Some(entry) = self.coverage.covered_branches.get_mut(&label) {
            let next = context.state().label();
            let true_target = cfg.true_edge(label).map(|e| e.target).ok();
            let false_target = cfg.false_edge(label).map(|e| e.target).ok();
            if Some(next) == true_target && !entry.0 {
                entry.0 = true;
                branch_newly_covered = true;
            }
            if Some(next) == false_target && !entry.1 {
                entry.1 = true;
                branch_newly_covered = true;
            }
        }
        if statement_newly_covered || branch_newly_covered {
            trace!(
                label,
                statement = self.coverage.statement_coverage(),
                branch = self.coverage.branch_coverage(),
                "coverage increased"
            );
        }
        (statement_newly_covered, branch_newly_covered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExplorationHeuristic;
    use crate::features::flow_graph::Builder;
    use crate::features::symbolic_execution::context::{Frame, State};
    use crate::shared::models::{
        BinaryOperator, DataType, Expression, Interface, Module, ModuleKind, Project, Section,
        Variable,
    };

    fn branchy_cfg() -> crate::features::flow_graph::CfgRef {
        let interface = Interface::new(vec![
            Variable::new("a", DataType::Int, Section::Input),
            Variable::new("y", DataType::Int, Section::Local),
        ]);
        let body = vec![Instruction::if_then_else(
            Expression::binary(
                BinaryOperator::LessThan,
                Expression::access("a"),
                Expression::IntegerConstant(0),
            ),
            vec![Instruction::assign("y", Expression::IntegerConstant(1))],
            vec![Instruction::assign("y", Expression::IntegerConstant(2))],
        )];
        let project = Project::new(vec![Module::new(ModuleKind::Program, "P", interface, body)]);
        Builder::new(&project).build().unwrap()
    }

    #[test]
    fn test_coverage_ratios() {
        let cfg = branchy_cfg();
        let mut explorer = Explorer::new(ExplorationHeuristic::BreadthFirst);
        explorer.initialize(&cfg, &[], &[]);
        assert_eq!(explorer.coverage().statement_coverage(), 0.0);

        let if_label = cfg
            .vertices()
            .find(|v| matches!(v.instruction(), Some(Instruction::If { .. })))
            .unwrap()
            .label();
        let true_target = cfg.true_edge(if_label).unwrap().target;

        let mut state = State::new(true_target, true, false);
        state.set_label(true_target);
        let context = Context::new(0, state, Frame::new(cfg.clone(), "P", cfg.entry_label()));
        let (stmt, branch) = explorer.update_coverage(&cfg, if_label, &context);
        assert!(stmt && branch);
        assert_eq!(explorer.coverage().branch_coverage(), 0.5);
    }

    #[test]
    fn test_unreachable_branch_seeding() {
        let cfg = branchy_cfg();
        let if_label = cfg
            .vertices()
            .find(|v| matches!(v.instruction(), Some(Instruction::If { .. })))
            .unwrap()
            .label();
        let mut explorer = Explorer::new(ExplorationHeuristic::BreadthFirst);
        explorer.initialize(&cfg, &[], &[(if_label, false)]);
        assert_eq!(explorer.coverage().branch_coverage(), 0.5);
    }

    #[test]
    fn test_heuristics() {
        let cfg = branchy_cfg();
        let make = |label| {
            let state = State::new(label, true, false);
            Context::new(0, state, Frame::new(cfg.clone(), "P", cfg.entry_label()))
        };
        let mut dfs = Explorer::new(ExplorationHeuristic::DepthFirst);
        dfs.push(make(1));
        dfs.push(make(2));
        assert_eq!(dfs.pop().unwrap().state().label(), 2);

        let mut bfs = Explorer::new(ExplorationHeuristic::BreadthFirst);
        bfs.push(make(1));
        bfs.push(make(2));
        assert_eq!(bfs.pop().unwrap().state().label(), 1);
    }
}
