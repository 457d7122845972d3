//! Shadow engine
//!
//! Two phases over a change-annotated program. Phase 1 replays every
//! change-traversing test case concolically with the divergence
//! executor and collects divergence-exposing contexts. Phase 2 runs a
//! bounded symbolic execution from each divergent context on the new
//! program version, deriving fresh test cases whenever new branches
//! are covered. A final simulator pass compares the outputs of the
//! divergent test cases between the old and the new version.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, trace};

use crate::config::{Configuration, EngineMode, ForkPolicy, ShadowProcessingMode};
use crate::errors::{AhornError, Result};
use crate::features::flow_graph::CfgRef;
use crate::features::lowering::{CallTransformationPass, ChangeAnnotationCollectionPass};
use crate::features::smt::{SmtContext, Value};
use crate::features::symbolic_execution::context::Context;
use crate::features::symbolic_execution::exploration::Explorer;
use crate::features::symbolic_execution::execution::{
    DivergenceExecutor, ExecutionStatus,
};
use crate::features::symbolic_execution::test_case::TestCase;
use crate::features::symbolic_execution::test_suite::TestSuite;

use super::simulator::Simulator;

/// One externally observable difference between the program versions
#[derive(Debug, Clone)]
pub struct OutputDifference {
    pub test_case_index: usize,
    pub cycle: u32,
    pub variable: String,
    pub old: Value,
    pub new: Value,
}

#[derive(Debug)]
pub struct ShadowReport {
    pub change_annotated_labels: usize,
    pub change_traversing_test_cases: usize,
    pub divergent_contexts: usize,
    pub derived_test_cases: usize,
    pub differences: Vec<OutputDifference>,
    pub elapsed_ms: u128,
}

pub struct ShadowEngine {
    config: Configuration,
    smt: SmtContext,
}

impl ShadowEngine {
    pub fn new(config: Configuration) -> Self {
        let smt = SmtContext::new(config.rng_seed);
        Self { config, smt }
    }

    pub fn run(&mut self, cfg: &CfgRef, test_suite_path: &Path) -> Result<ShadowReport> {
        let begin = Instant::now();
        let cfg = CallTransformationPass::new().apply(cfg)?;
        let change_labels = ChangeAnnotationCollectionPass::new().apply(&cfg);
        info!(
            program = cfg.name(),
            change_labels = change_labels.len(),
            "shadow engine started"
        );

        let change_traversing =
            self.collect_change_traversing_test_cases(&cfg, test_suite_path, &change_labels)?;
        info!(
            count = change_traversing.len(),
            "collected change-traversing test cases"
        );

        // Phase 1: find divergent contexts along each test case
        let mut divergent: Vec<(Context, TestCase)> = Vec::new();
        for test_case in &change_traversing {
            for context in self.find_divergent_contexts(&cfg, test_case)? {
                divergent.push((context, test_case.clone()));
            }
        }
        info!(count = divergent.len(), "phase 1 found divergent contexts");
        let divergent_count = divergent.len();

        // Phase 2: bounded symbolic execution on the new version
        let mut derived = TestSuite::new();
        for (context, _) in divergent {
            self.bounded_execution(&cfg, context, &mut derived)?;
        }
        info!(count = derived.len(), "phase 2 derived divergent test cases");

        // Final simulator pass: compare outputs between versions
        let differences = self.check_for_output_differences(&cfg, &derived)?;
        info!(count = differences.len(), "difference-revealing test cases");

        if let Some(directory) = self.config.generate_test_suite.clone() {
            derived.store(&directory)?;
        }

        Ok(ShadowReport {
            change_annotated_labels: change_labels.len(),
            change_traversing_test_cases: change_traversing.len(),
            divergent_contexts: divergent_count,
            derived_test_cases: derived.len(),
            differences,
            elapsed_ms: begin.elapsed().as_millis(),
        })
    }

    /// Load the suite, augment missing valuations with defaults, and
    /// keep the test cases whose old-version replay visits at least
    /// one change-annotated label
    fn collect_change_traversing_test_cases(
        &mut self,
        cfg: &CfgRef,
        path: &Path,
        change_labels: &std::collections::BTreeSet<crate::features::flow_graph::Label>,
    ) -> Result<Vec<TestCase>> {
        let suite = TestSuite::load(path)?;
        let scope = cfg.name().to_string();
        let simulator = Simulator::new(ShadowProcessingMode::Old);

        let mut change_traversing = Vec::new();
        for test_case in suite.test_cases() {
            let mut test_case = test_case.clone();

            // augment with default values for state variables and
            // per-cycle inputs the file left out
            let last_cycle = test_case.last_cycle();
            for variable in cfg.flattened_interface() {
                let flattened = format!("{}.{}", scope, variable.path);
                let is_input = variable.section == crate::shared::models::Section::Input
                    && variable.top_level;
                if is_input {
                    for cycle in 0..=last_cycle {
                        test_case
                            .inputs
                            .entry(cycle)
                            .or_default()
                            .entry(flattened.clone())
                            .or_insert_with(|| self.smt.default_value(&variable.data_type));
                    }
                } else {
                    let value = match &variable.initialization {
                        Some(constant) => self.smt.constant_value(constant),
                        None => self.smt.default_value(&variable.data_type),
                    };
                    test_case
                        .initialization
                        .entry(flattened.clone())
                        .or_insert(value);
                }
            }

            let result = simulator.run(&mut self.smt, cfg, &test_case)?;
            test_case.execution_history = result.execution_history;
            test_case.outputs = result.outputs;
            if test_case.touches(change_labels) {
                change_traversing.push(test_case);
            } else {
                trace!("test case does not touch the change, skipped");
            }
        }
        Ok(change_traversing)
    }

    /// Phase 1: concolic replay of one test case on both versions
    fn find_divergent_contexts(
        &mut self,
        cfg: &CfgRef,
        test_case: &TestCase,
    ) -> Result<Vec<Context>> {
        let mut config = self.config.clone();
        config.engine_mode = EngineMode::Shadow;
        // the concolic phase follows the test case; only divergent
        // forks are taken
        config.fork_policy_override = Some(ForkPolicy::Never);

        let mut executor = DivergenceExecutor::new();
        let mut context = executor.initial_context(&mut self.smt, &config, cfg, test_case);
        let mut divergent = Vec::new();
        let last_cycle = test_case.last_cycle();

        loop {
            if context.cycle() > last_cycle {
                break;
            }
            let execution = match executor.execute(&mut self.smt, &config, context) {
                Ok(execution) => execution,
                Err(AhornError::Arithmetic(message)) => {
                    debug!(%message, "arithmetic fault during replay");
                    break;
                }
                Err(other) => return Err(other),
            };
            divergent.extend(execution.divergent);
            match execution.status {
                ExecutionStatus::Divergent => break,
                ExecutionStatus::Expected | ExecutionStatus::PotentialDivergent => {}
            }
            context = match execution.contexts.into_iter().next() {
                Some(mut context) => {
                    // entering the next cycle consumes the next
                    // stimulus of the test case
                    if context.state().label() == context.main_frame().cfg().entry_label()
                        && context.depth() == 1
                    {
                        let cycle = context.cycle();
                        crate::features::symbolic_execution::execution::apply_cycle_inputs(
                            context.state_mut(),
                            test_case,
                            cycle,
                        );
                    }
                    context
                }
                None => break,
            };
        }
        Ok(divergent)
    }

    /// Phase 2: bounded symbolic execution of one divergent context
    /// on the new program version, deriving a test case for every
    /// newly covered statement or branch
    fn bounded_execution(
        &mut self,
        cfg: &CfgRef,
        mut context: Context,
        derived: &mut TestSuite,
    ) -> Result<()> {
        let mut config = self.config.clone();
        config.engine_mode = EngineMode::Shadow;
        config.shadow_processing_mode = ShadowProcessingMode::New;
        config.fork_policy_override = None;

        context.state_mut().promote_new_version();
        // the divergent stimulus itself is a test case
        derived.push(TestCase::from_context(&context, cfg));

        let mut executor = DivergenceExecutor::new();
        executor.executor_mut().initialize(cfg);
        // continue the version numbering of the divergent context so
        // fresh bindings never collide with names its store references
        for (name, &version) in context.state().versions().clone().iter() {
            if executor.executor_mut().version(name) < version {
                executor.executor_mut().set_version(name, version);
            }
        }
        let mut explorer = Explorer::new(self.config.exploration_heuristic);
        explorer.initialize(
            cfg,
            &self.config.unreachable_labels,
            &self.config.unreachable_branches,
        );
        explorer.push(context);

        let begin = Instant::now();
        while let Some(context) = explorer.pop() {
            if begin.elapsed().as_millis() >= self.config.time_out_ms as u128 {
                break;
            }
            let label = context.state().label();
            let frame_cfg = context.frame().cfg().clone();
            let execution =
                match executor
                    .executor_mut()
                    .execute(&mut self.smt, &config, context)
                {
                    Ok(execution) => execution,
                    Err(AhornError::Arithmetic(message)) => {
                        debug!(%message, "arithmetic fault during bounded execution");
                        continue;
                    }
                    Err(other) => return Err(other),
                };
            for successor in execution.contexts {
                let (statement, branch) = explorer.update_coverage(&frame_cfg, label, &successor);
                if statement || branch {
                    derived.push(TestCase::from_context(&successor, cfg));
                }
                if successor.cycle() < self.config.cycle_bound {
                    explorer.push(successor);
                }
            }
        }
        Ok(())
    }

    /// Replay each divergent test case on both versions and report
    /// output valuations that differ
    fn check_for_output_differences(
        &mut self,
        cfg: &CfgRef,
        derived: &TestSuite,
    ) -> Result<Vec<OutputDifference>> {
        let old_simulator = Simulator::new(ShadowProcessingMode::Old);
        let new_simulator = Simulator::new(ShadowProcessingMode::New);
        let mut differences = Vec::new();
        for (index, test_case) in derived.test_cases().iter().enumerate() {
            let old = old_simulator.run(&mut self.smt, cfg, test_case)?;
            let new = new_simulator.run(&mut self.smt, cfg, test_case)?;
            for (cycle, old_outputs) in &old.outputs {
                let empty = BTreeMap::new();
                let new_outputs = new.outputs.get(cycle).unwrap_or(&empty);
                for (variable, old_value) in old_outputs {
                    if let Some(new_value) = new_outputs.get(variable) {
                        if old_value != new_value {
                            differences.push(OutputDifference {
                                test_case_index: index,
                                cycle: *cycle,
                                variable: variable.clone(),
                                old: *old_value,
                                new: *new_value,
                            });
                        }
                    }
                }
            }
        }
        Ok(differences)
    }
}
