//! Mode-parameterised engine
//!
//! Single-threaded and cooperative: the explorer is the only
//! scheduler. One context is popped, the executor runs it to
//! completion, successors are pushed back. Merging is a synchronous
//! step performed when the queue empties for the current cycle. A
//! per-engine time-out and the cycle bound terminate the outer loop;
//! arithmetic faults terminate the offending context only and are
//! recorded as failing test cases.

use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::config::{Configuration, EngineMode};
use crate::errors::{AhornError, Result};
use crate::features::flow_graph::CfgRef;
use crate::features::lowering::CallTransformationPass;
use crate::features::smt::{SatResult, SmtContext, TermId};
use crate::features::symbolic_execution::context::Context;
use crate::features::symbolic_execution::exploration::Explorer;
use crate::features::symbolic_execution::execution::Executor;
use crate::features::symbolic_execution::merger::Merger;
use crate::features::symbolic_execution::test_case::TestCase;
use crate::features::symbolic_execution::test_suite::TestSuite;

/// Why the engine stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    TimeOut,
    CycleBound,
    CoverageReached,
    QueueExhausted,
}

/// Outcome of the one cbmc-style check at the cycle budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Reachable,
    Unreachable,
    Unknown,
}

/// Statistics reported on termination
#[derive(Debug)]
pub struct Report {
    pub termination: Termination,
    pub completed_cycles: u32,
    pub statement_coverage: f64,
    pub branch_coverage: f64,
    pub derived_test_cases: usize,
    pub failing_test_cases: usize,
    pub elapsed_ms: u128,
    pub check_outcome: Option<CheckOutcome>,
}

pub struct Engine {
    config: Configuration,
    smt: SmtContext,
    executor: Executor,
    explorer: Explorer,
    merger: Merger,
    test_suite: TestSuite,
    failing: usize,
}

impl Engine {
    pub fn new(config: Configuration) -> Self {
        let smt = SmtContext::new(config.rng_seed);
        let executor = Executor::new(config.summarization);
        let explorer = Explorer::new(config.exploration_heuristic);
        let merger = Merger::new(config.merge_strategy);
        Self {
            config,
            smt,
            executor,
            explorer,
            merger,
            test_suite: TestSuite::new(),
            failing: 0,
        }
    }

    pub fn test_suite(&self) -> &TestSuite {
        &self.test_suite
    }

    pub fn smt(&mut self) -> &mut SmtContext {
        &mut self.smt
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Run the engine on a program CFG
    pub fn run(&mut self, cfg: &CfgRef) -> Result<Report> {
        let begin = Instant::now();
        // the executor requires explicit call interfaces
        let cfg = CallTransformationPass::new().apply(cfg)?;
        info!(program = cfg.name(), mode = ?self.config.engine_mode, "engine started");

        self.explorer.initialize(
            &cfg,
            &self.config.unreachable_labels,
            &self.config.unreachable_branches,
        );
        self.merger.initialize(&cfg);
        let initial = self
            .executor
            .initial_context(&mut self.smt, &self.config, &cfg);
        self.explorer.push(initial);

        let mut completed_cycles = 0u32;
        let mut final_contexts: Vec<Context> = Vec::new();
        let merging = self.config.engine_mode != EngineMode::Baseline;

        let termination = loop {
            if begin.elapsed().as_millis() >= self.config.time_out_ms as u128 {
                break Termination::TimeOut;
            }
            if self.explorer.coverage().is_complete() {
                break Termination::CoverageReached;
            }

            let context = match self.explorer.pop() {
                Some(context) => {
                    if merging && self.merger.reached_merge_point(&context) {
                        self.merger.push(context);
                        continue;
                    }
                    context
                }
                None if merging && !self.merger.is_empty() => {
                    match self.merger.merge(&mut self.smt, &mut self.executor)? {
                        Some(merged) => merged,
                        None => break Termination::QueueExhausted,
                    }
                }
                None => {
                    if final_contexts.is_empty() {
                        break Termination::QueueExhausted;
                    }
                    break Termination::CycleBound;
                }
            };

            let label = context.state().label();
            let frame_cfg = context.frame().cfg().clone();
            let before_fault = context.clone();

            let execution = match self.executor.execute(&mut self.smt, &self.config, context) {
                Ok(execution) => execution,
                Err(AhornError::Arithmetic(message)) => {
                    // a property of the analysed program: record a
                    // failing test case and terminate this context
                    warn!(%message, "arithmetic fault, terminating context");
                    self.failing += 1;
                    if self.config.concrete_execution() {
                        self.test_suite
                            .push(TestCase::from_context(&before_fault, &cfg));
                    }
                    continue;
                }
                Err(other) => return Err(other),
            };

            for successor in execution.contexts {
                let (statement, branch) =
                    self.explorer
                        .update_coverage(&frame_cfg, label, &successor);
                if (statement || branch) && self.config.concrete_execution() {
                    let test_case = TestCase::from_context(&successor, &cfg);
                    self.test_suite.push(test_case);
                }
                if successor.cycle() > completed_cycles {
                    completed_cycles = successor.cycle();
                }
                if successor.cycle() >= self.config.cycle_bound {
                    trace!("context reached the cycle bound");
                    final_contexts.push(successor);
                } else {
                    self.explorer.push(successor);
                }
            }
        };

        let check_outcome = if self.config.engine_mode == EngineMode::CycleBoundedEncoding {
            final_contexts
                .first()
                .map(|context| self.check_encoding(context))
        } else {
            None
        };

        if let Some(directory) = self.config.generate_test_suite.clone() {
            self.test_suite.store(&directory)?;
        }

        let report = Report {
            termination,
            completed_cycles,
            statement_coverage: self.explorer.coverage().statement_coverage(),
            branch_coverage: self.explorer.coverage().branch_coverage(),
            derived_test_cases: self.test_suite.len(),
            failing_test_cases: self.failing,
            elapsed_ms: begin.elapsed().as_millis(),
            check_outcome,
        };
        info!(
            termination = ?report.termination,
            statement = report.statement_coverage,
            branch = report.branch_coverage,
            test_cases = report.derived_test_cases,
            "engine finished"
        );
        Ok(report)
    }

    /// One check over the global assumption-literal encoding: every
    /// literal implies the disjunction of its predecessors, its
    /// assumptions, and its hard constraints; the entry literal of
    /// cycle 0 is asserted together with the final literal.
    fn check_encoding(&mut self, context: &Context) -> CheckOutcome {
        let state = context.state();
        let mut formula: Vec<TermId> = Vec::new();

        for (literal, predecessors) in state.assumption_literals() {
            let guard = self.smt.mk_boolean_constant(&literal.to_string());
            let disjuncts: Vec<TermId> = predecessors
                .iter()
                .map(|p| self.smt.mk_boolean_constant(&p.to_string()))
                .collect();
            let reachable = self.smt.mk_or(disjuncts);
            formula.push(self.smt.mk_implies(guard, reachable));
        }
        for (literal, assumptions) in state.assumptions() {
            let guard = self.smt.mk_boolean_constant(&literal.to_string());
            for &assumption in assumptions {
                formula.push(self.smt.mk_implies(guard, assumption));
            }
        }
        for (literal, constraints) in state.hard_constraints() {
            let guard = self.smt.mk_boolean_constant(&literal.to_string());
            for (name, definition) in constraints {
                let sort = self.smt.sort_of(*definition);
                let constant = self.smt.mk_sorted_constant(&name.to_string(), sort);
                let equation = self.smt.mk_eq(constant, *definition);
                formula.push(self.smt.mk_implies(guard, equation));
            }
        }
        for (caller, callee_exit) in state.unknown_summary_literals() {
            let caller = self.smt.mk_boolean_constant(&caller.to_string());
            let callee_exit = self.smt.mk_boolean_constant(&callee_exit.to_string());
            formula.push(self.smt.mk_implies(caller, callee_exit));
        }

        let program = context.main_frame();
        let entry = crate::features::symbolic_execution::name::AssumptionLiteral::new(
            program.scope(),
            program.cfg().entry_label(),
            0,
        );
        formula.push(self.smt.mk_boolean_constant(&entry.to_string()));
        if let Some(literal) = state.assumption_literal() {
            formula.push(self.smt.mk_boolean_constant(&literal.to_string()));
        }

        debug!(clauses = formula.len(), "checking cycle-bounded encoding");
        match self.smt.check(&formula) {
            SatResult::Sat(_) => CheckOutcome::Reachable,
            SatResult::Unsat => CheckOutcome::Unreachable,
            SatResult::Unknown => CheckOutcome::Unknown,
        }
    }
}
