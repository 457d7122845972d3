//! Executor
//!
//! Consumes one context and returns the succeeding context plus, at
//! feasible branches, one forked context. Dispatch is by vertex kind;
//! the per-instruction sequence is encode, evaluate, mutate state,
//! maybe fork, advance the vertex, and maybe update the VC tables.
//! No suspension occurs within that sequence.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::config::{Configuration, EngineMode, ForkPolicy, ShadowProcessingMode};
use crate::errors::{AhornError, Result};
use crate::features::flow_graph::{Cfg, CfgKind, CfgRef, Label, VertexKind};
use crate::features::smt::{SatResult, SmtContext, TermId, Value};
use crate::shared::models::{Expression, Instruction, Section};

use super::super::context::{Context, Frame, State};
use super::super::name::{AssumptionLiteral, ContextualizedName};
use super::super::summarizer::{Summarizer, SummaryProbe};
use super::{encode, evaluate};

/// Status of one execution step; divergence statuses only occur in
/// shadow mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Expected,
    Divergent,
    PotentialDivergent,
}

/// Result of one execution step; `divergent` carries the contexts a
/// potential divergence forked off for the second shadow phase
#[derive(Debug)]
pub struct Execution {
    pub status: ExecutionStatus,
    pub contexts: Vec<Context>,
    pub divergent: Vec<Context>,
}

impl Execution {
    pub fn expected(contexts: Vec<Context>) -> Self {
        Self {
            status: ExecutionStatus::Expected,
            contexts,
            divergent: Vec::new(),
        }
    }
}

pub struct Executor {
    /// Globally managed variable versioning for implicit SSA form;
    /// shared by all contexts so forks never collide on names
    versions: FxHashMap<String, u32>,
    whole_program_inputs: FxHashSet<String>,
    summarizer: Option<Summarizer>,
}

impl Executor {
    pub fn new(summarization: bool) -> Self {
        Self {
            versions: FxHashMap::default(),
            whole_program_inputs: FxHashSet::default(),
            summarizer: summarization.then(Summarizer::new),
        }
    }

    pub fn summarizer(&self) -> Option<&Summarizer> {
        self.summarizer.as_ref()
    }

    /// Register the whole-program inputs of the program CFG
    pub fn initialize(&mut self, cfg: &Cfg) {
        self.whole_program_inputs.clear();
        for variable in cfg.flattened_interface() {
            if variable.section == Section::Input && variable.top_level {
                self.whole_program_inputs
                    .insert(format!("{}.{}", cfg.name(), variable.path));
            }
        }
    }

    pub fn is_whole_program_input(&self, flattened: &str) -> bool {
        self.whole_program_inputs.contains(flattened)
    }

    pub fn version(&self, flattened: &str) -> u32 {
        self.versions.get(flattened).copied().unwrap_or(0)
    }

    pub fn set_version(&mut self, flattened: &str, version: u32) {
        self.versions.insert(flattened.to_string(), version);
    }

    fn next_version(&mut self, flattened: &str) -> u32 {
        let version = self.version(flattened) + 1;
        self.set_version(flattened, version);
        version
    }

    /// The context of cycle 0: state variables at their
    /// initialisation constants, inputs as fresh symbolic constants
    pub fn initial_context(
        &mut self,
        smt: &mut SmtContext,
        config: &Configuration,
        cfg: &CfgRef,
    ) -> Context {
        self.initialize(cfg);
        let scope = cfg.name().to_string();
        let mut state = State::new(
            cfg.entry_label(),
            config.concrete_execution(),
            config.engine_mode == EngineMode::Shadow,
        );
        for variable in cfg.flattened_interface() {
            let flattened = format!("{}.{}", scope, variable.path);
            let name = ContextualizedName::new(flattened.clone(), 0, 0);
            let value = match &variable.initialization {
                Some(constant) => smt.constant_value(constant),
                None => smt.default_value(&variable.data_type),
            };
            let symbolic = if self.is_whole_program_input(&flattened) {
                smt.mk_constant(&name.to_string(), &variable.data_type)
            } else {
                smt.mk_literal(value)
            };
            let concrete = config.concrete_execution().then_some(value);
            state.bind(name, symbolic, concrete, None);
        }
        if config.vc_encoding() {
            state.set_assumption_literal(AssumptionLiteral::new(
                scope.clone(),
                cfg.entry_label(),
                0,
            ));
        }
        let frame = Frame::new(cfg.clone(), scope, cfg.entry_label());
        Context::new(0, state, frame)
    }

    /// Execute the instruction at the context's current vertex
    pub fn execute(
        &mut self,
        smt: &mut SmtContext,
        config: &Configuration,
        mut context: Context,
    ) -> Result<Execution> {
        let cfg = context.frame().cfg().clone();
        let label = context.state().label();
        let vertex = cfg.vertex(label)?;
        trace!(cfg = cfg.name(), label, "executing");

        match vertex.kind() {
            VertexKind::Entry => {
                self.handle_entry(smt, config, &cfg, &mut context)?;
                Ok(Execution::expected(vec![context]))
            }
            VertexKind::Regular => self.handle_regular(smt, config, &cfg, context),
            VertexKind::Exit => match cfg.kind() {
                CfgKind::Program => {
                    self.handle_program_exit(smt, config, &cfg, &mut context)?;
                    Ok(Execution::expected(vec![context]))
                }
                CfgKind::FunctionBlock | CfgKind::Function => {
                    self.handle_procedure_exit(smt, config, &mut context)?;
                    Ok(Execution::expected(vec![context]))
                }
            },
        }
    }

    fn handle_entry(
        &mut self,
        _smt: &mut SmtContext,
        config: &Configuration,
        cfg: &Cfg,
        context: &mut Context,
    ) -> Result<()> {
        let label = context.state().label();
        let successors = cfg.succeeding_labels(label);
        debug_assert_eq!(successors.len(), 1, "an entry has exactly one successor");
        let next_label = successors[0];
        context.state_mut().set_label(next_label);
        if config.vc_encoding() {
            self.advance_assumption_literal(context, next_label, context.cycle());
        }
        Ok(())
    }

    fn handle_regular(
        &mut self,
        smt: &mut SmtContext,
        config: &Configuration,
        cfg: &CfgRef,
        mut context: Context,
    ) -> Result<Execution> {
        let label = context.state().label();
        let instruction = cfg
            .vertex(label)?
            .instruction()
            .cloned()
            .ok_or_else(|| AhornError::ir_malformed("regular vertex without instruction"))?;

        match instruction {
            Instruction::Assignment {
                variable,
                expression,
            } => {
                self.execute_assignment(smt, config, &mut context, &variable, &expression)?;
                self.advance_intraprocedural(config, cfg, &mut context)?;
                Ok(Execution::expected(vec![context]))
            }
            Instruction::Havoc { variable } => {
                self.execute_havoc(smt, config, &mut context, &variable)?;
                self.advance_intraprocedural(config, cfg, &mut context)?;
                Ok(Execution::expected(vec![context]))
            }
            Instruction::Sequence(instructions) => {
                for instruction in &instructions {
                    match instruction {
                        Instruction::Assignment {
                            variable,
                            expression,
                        } => self.execute_assignment(
                            smt,
                            config,
                            &mut context,
                            variable,
                            expression,
                        )?,
                        Instruction::Havoc { variable } => {
                            self.execute_havoc(smt, config, &mut context, variable)?
                        }
                        other => {
                            return Err(AhornError::unsupported(format!(
                                "instruction {} inside a basic block",
                                other
                            )))
                        }
                    }
                }
                self.advance_intraprocedural(config, cfg, &mut context)?;
                Ok(Execution::expected(vec![context]))
            }
            Instruction::If { condition, .. } | Instruction::While { condition, .. } => {
                self.execute_branch(smt, config, cfg, context, &condition)
            }
            Instruction::Call { callee, arguments } => {
                if !arguments.is_empty() {
                    return Err(AhornError::unsupported(
                        "calls with argument bindings; run the call-transformation pass first",
                    ));
                }
                self.execute_call(smt, config, cfg, &mut context, &callee)?;
                Ok(Execution::expected(vec![context]))
            }
            Instruction::Goto(_) => {
                self.advance_intraprocedural(config, cfg, &mut context)?;
                Ok(Execution::expected(vec![context]))
            }
        }
    }

    fn shadow_mode(&self, config: &Configuration, state: &State) -> ShadowProcessingMode {
        if state.shadow_enabled() {
            ShadowProcessingMode::Both
        } else {
            config.shadow_processing_mode
        }
    }

    pub(crate) fn execute_assignment(
        &mut self,
        smt: &mut SmtContext,
        config: &Configuration,
        context: &mut Context,
        variable: &crate::shared::models::VariableReference,
        expression: &Expression,
    ) -> Result<()> {
        let cycle = context.cycle();
        let mode = self.shadow_mode(config, context.state());
        let frame = context.frame().clone();

        let encoded = encode(smt, context.state_mut(), &frame, cycle, mode, expression)?;

        let concrete = if config.concrete_execution() {
            Some(evaluate(
                smt,
                context.state(),
                &frame,
                cycle,
                ShadowProcessingMode::Old,
                expression,
            )?)
        } else {
            None
        };
        let new_value = if context.state().shadow_enabled() {
            Some(evaluate(
                smt,
                context.state(),
                &frame,
                cycle,
                ShadowProcessingMode::New,
                expression,
            )?)
        } else {
            None
        };

        let path = variable.path();
        let flattened = context.flattened_name(&path);
        let version = self.next_version(&flattened);
        let name = ContextualizedName::new(flattened, version, cycle);

        context
            .state_mut()
            .bind(name.clone(), encoded, concrete, new_value);
        context.state().assert_stores_agree();

        if config.vc_encoding() {
            if let Some(literal) = context.state().assumption_literal().cloned() {
                context
                    .state_mut()
                    .push_hard_constraint(literal, name, encoded);
            }
        }
        Ok(())
    }

    pub(crate) fn execute_havoc(
        &mut self,
        smt: &mut SmtContext,
        config: &Configuration,
        context: &mut Context,
        variable: &crate::shared::models::VariableReference,
    ) -> Result<()> {
        let cycle = context.cycle();
        let path = variable.path();
        let data_type = context
            .frame()
            .cfg()
            .flattened_variable(&path)
            .map(|v| v.data_type.clone())
            .ok_or_else(|| {
                AhornError::ir_malformed(format!("havoc of undeclared variable {}", path))
            })?;
        let flattened = context.flattened_name(&path);
        let version = self.next_version(&flattened);
        let name = ContextualizedName::new(flattened, version, cycle);

        // unconstrained symbolic value, seeded random concrete value
        let symbolic = smt.mk_constant(&name.to_string(), &data_type);
        let concrete = config
            .concrete_execution()
            .then(|| smt.random_value(&data_type));
        context.state_mut().bind(name, symbolic, concrete, concrete);
        Ok(())
    }

    /// Advance over the single intraprocedural out-edge and, in VC
    /// mode, chain the assumption literal
    fn advance_intraprocedural(
        &mut self,
        config: &Configuration,
        cfg: &Cfg,
        context: &mut Context,
    ) -> Result<()> {
        let label = context.state().label();
        let next_label = cfg.intraprocedural_edge(label)?.target;
        context.state_mut().set_label(next_label);
        if config.vc_encoding() {
            self.advance_assumption_literal(context, next_label, context.cycle());
        }
        Ok(())
    }

    fn advance_assumption_literal(&self, context: &mut Context, label: Label, cycle: u32) {
        let scope = context.frame().scope().to_string();
        let next = AssumptionLiteral::new(scope, label, cycle);
        if let Some(current) = context.state().assumption_literal().cloned() {
            context
                .state_mut()
                .push_assumption_literal(next.clone(), current);
        }
        context.state_mut().set_assumption_literal(next);
    }

    fn execute_branch(
        &mut self,
        smt: &mut SmtContext,
        config: &Configuration,
        cfg: &CfgRef,
        mut context: Context,
        condition: &Expression,
    ) -> Result<Execution> {
        let cycle = context.cycle();
        let label = context.state().label();
        let true_target = cfg.true_edge(label)?.target;
        let false_target = cfg.false_edge(label)?.target;
        let frame = context.frame().clone();

        let mode = self.shadow_mode(config, context.state());
        let encoded = encode(smt, context.state_mut(), &frame, cycle, mode, condition)?;
        let negated = smt.mk_not(encoded);

        match config.fork_policy() {
            ForkPolicy::Never | ForkPolicy::Check => {
                let value = evaluate(
                    smt,
                    context.state(),
                    &frame,
                    cycle,
                    ShadowProcessingMode::Old,
                    condition,
                )?;
                let taken = value.as_bool().ok_or_else(|| {
                    AhornError::ir_malformed("branch condition is not boolean")
                })?;
                let (followed_label, other_label, followed_term, other_term) = if taken {
                    (true_target, false_target, encoded, negated)
                } else {
                    (false_target, true_target, negated, encoded)
                };

                let mut forked = None;
                if config.fork_policy() == ForkPolicy::Check {
                    forked = self.try_fork(smt, &context, other_term, other_label)?;
                }

                let mut memo = FxHashMap::default();
                let lowered = context.state().lower(smt, followed_term, &mut memo);
                context.state_mut().push_path_constraint(lowered);
                if context.state().shadow_enabled() {
                    // the condition carries no shadow expression here,
                    // so both versions share the constraint
                    context.state_mut().push_path_constraint_new(lowered);
                }
                context.push_local_path_constraint(followed_term);
                context.state_mut().set_label(followed_label);

                if config.vc_encoding() {
                    let current = context.state().assumption_literal().cloned();
                    if let Some(current) = current {
                        let scope = context.frame().scope().to_string();
                        let followed_literal =
                            AssumptionLiteral::new(scope.clone(), followed_label, cycle);
                        context
                            .state_mut()
                            .push_assumption_literal(followed_literal.clone(), current.clone());
                        // the branch effect is pushed into the
                        // succeeding block
                        context
                            .state_mut()
                            .push_assumption(followed_literal.clone(), followed_term);
                        context.state_mut().set_assumption_literal(followed_literal);
                        if let Some(forked) = forked.as_mut() {
                            let other_literal =
                                AssumptionLiteral::new(scope, other_label, cycle);
                            forked
                                .state_mut()
                                .push_assumption_literal(other_literal.clone(), current);
                            forked
                                .state_mut()
                                .push_assumption(other_literal.clone(), other_term);
                            forked.state_mut().set_assumption_literal(other_literal);
                        }
                    }
                }

                let mut contexts = vec![context];
                contexts.extend(forked);
                Ok(Execution::expected(contexts))
            }
            ForkPolicy::Both => {
                let mut contexts = Vec::new();
                for (target, term) in [(true_target, encoded), (false_target, negated)] {
                    let mut successor = context.clone();
                    let mut memo = FxHashMap::default();
                    let lowered = successor.state().lower(smt, term, &mut memo);
                    if config.engine_mode == EngineMode::OverApproximating {
                        // feasibility filter; unknown is kept, the
                        // engine over-approximates
                        let mut query = successor.state().path_constraint().to_vec();
                        query.push(lowered);
                        if matches!(smt.check(&query), SatResult::Unsat) {
                            continue;
                        }
                    }
                    successor.state_mut().push_path_constraint(lowered);
                    successor.push_local_path_constraint(term);
                    successor.state_mut().set_label(target);
                    if config.vc_encoding() {
                        let current = successor.state().assumption_literal().cloned();
                        if let Some(current) = current {
                            let scope = successor.frame().scope().to_string();
                            let literal = AssumptionLiteral::new(scope, target, cycle);
                            successor
                                .state_mut()
                                .push_assumption_literal(literal.clone(), current);
                            successor.state_mut().push_assumption(literal.clone(), term);
                            successor.state_mut().set_assumption_literal(literal);
                        }
                    }
                    contexts.push(successor);
                }
                Ok(Execution::expected(contexts))
            }
        }
    }

    /// Fork policy: no fork is attempted unless the negated branch
    /// depends on an unconstrained constant; otherwise the negation
    /// is lowered to its minimal expression, the necessary defining
    /// equations are collected, inputs of completed cycles are pinned
    /// to their concrete values, and the conjunction is checked.
    pub(crate) fn try_fork(
        &mut self,
        smt: &mut SmtContext,
        context: &Context,
        negation: TermId,
        target: Label,
    ) -> Result<Option<Context>> {
        let state = context.state();
        if !state.contains_unconstrained_constant(smt, negation) {
            trace!("no unconstrained constant in the negated branch, no fork");
            return Ok(None);
        }

        let mut memo = FxHashMap::default();
        let lowered = state.lower(smt, negation, &mut memo);

        let mut constraints: Vec<TermId> = state.path_constraint().to_vec();
        constraints.push(lowered);
        constraints.extend(state.necessary_hard_constraints(smt, lowered));
        self.pin_completed_cycles(smt, context, &constraints.clone(), &mut constraints);

        match smt.check(&constraints) {
            SatResult::Sat(model) => {
                trace!("branch is feasible, forking");
                let mut forked = context.fork(smt, &model);
                forked.state_mut().push_path_constraint(lowered);
                if forked.state().shadow_enabled() {
                    forked.state_mut().push_path_constraint_new(lowered);
                }
                forked.push_local_path_constraint(negation);
                forked.state_mut().set_label(target);
                Ok(Some(forked))
            }
            SatResult::Unsat => {
                trace!("negated branch and path constraint are unsat, no fork");
                Ok(None)
            }
            SatResult::Unknown => {
                // a property of the analysed program, not an engine
                // bug: terminate the fork attempt only
                trace!("solver returned unknown, no fork");
                Ok(None)
            }
        }
    }

    /// Inputs of completed cycles are part of the reached state; pin
    /// them to their concrete values so a fork cannot rewrite history
    pub(crate) fn pin_completed_cycles(
        &self,
        smt: &mut SmtContext,
        context: &Context,
        terms: &[TermId],
        constraints: &mut Vec<TermId>,
    ) {
        let state = context.state();
        let mut pinned: FxHashSet<String> = FxHashSet::default();
        for &term in terms {
            for (name, sort) in smt.uninterpreted_constants(term).iter() {
                let contextualized = match ContextualizedName::parse(name) {
                    Some(contextualized) => contextualized,
                    None => continue,
                };
                if contextualized.cycle >= context.cycle() || !pinned.insert(name.clone()) {
                    continue;
                }
                if let Some(value) = state.concrete_value(&contextualized) {
                    let constant = match sort {
                        crate::features::smt::Sort::Bool => smt.mk_boolean_constant(name),
                        crate::features::smt::Sort::Int => smt.mk_integer_constant(name),
                    };
                    let literal = smt.mk_literal(value);
                    let equation = smt.mk_eq(constant, literal);
                    constraints.push(equation);
                }
            }
        }
    }

    fn execute_call(
        &mut self,
        smt: &mut SmtContext,
        config: &Configuration,
        cfg: &CfgRef,
        context: &mut Context,
        callee: &crate::shared::models::VariableReference,
    ) -> Result<()> {
        let cycle = context.cycle();
        let label = context.state().label();
        let return_label = cfg.call_to_return_edge(label)?.target;
        let callee_cfg = cfg.callee(label)?;
        let scope = format!("{}.{}", context.frame().scope(), callee.path());

        if let Some(summarizer) = self.summarizer.as_mut() {
            match summarizer.find_applicable(smt, context.state(), &callee_cfg, &scope, cycle)? {
                SummaryProbe::Applicable(outputs) => {
                    trace!(callee = callee_cfg.name(), "summary hit, skipping callee");
                    for (path, value) in outputs {
                        let flattened = format!("{}.{}", scope, path);
                        let version = self.version(&flattened) + 1;
                        self.set_version(&flattened, version);
                        let name = ContextualizedName::new(flattened, version, cycle);
                        let symbolic = smt.mk_literal(value);
                        let concrete = config.concrete_execution().then_some(value);
                        context.state_mut().bind(name, symbolic, concrete, None);
                    }
                    context.state_mut().set_label(return_label);
                    if config.vc_encoding() {
                        self.advance_assumption_literal(context, return_label, cycle);
                    }
                    return Ok(());
                }
                SummaryProbe::NotApplicable | SummaryProbe::Unknown => {}
            }
        }

        let frame = Frame::new(callee_cfg.clone(), scope, return_label);
        context.push_frame(frame);
        let entry_label = callee_cfg.entry_label();
        context.state_mut().set_label(entry_label);
        if config.vc_encoding() {
            self.advance_assumption_literal(context, entry_label, cycle);
        }
        Ok(())
    }

    fn handle_procedure_exit(
        &mut self,
        smt: &mut SmtContext,
        config: &Configuration,
        context: &mut Context,
    ) -> Result<()> {
        if let Some(summarizer) = self.summarizer.as_mut() {
            summarizer.summarize(smt, context)?;
        }

        let callee_exit_literal = context.state().assumption_literal().cloned();
        let popped = context.pop_frame();
        let next_label = popped.return_label();
        let caller_cfg = context.frame().cfg().clone();
        context.state_mut().set_label(next_label);

        if config.vc_encoding() {
            let cycle = context.cycle();
            let scope = context.frame().scope().to_string();
            let return_edge = caller_cfg.interprocedural_return_edge(next_label)?;
            let call_label = return_edge
                .call_label
                .ok_or_else(|| AhornError::ir_malformed("return edge without call label"))?;
            let caller_call_literal = AssumptionLiteral::new(scope.clone(), call_label, cycle);
            let next_literal = AssumptionLiteral::new(scope, next_label, cycle);
            // the intraprocedural call-to-return flow
            context
                .state_mut()
                .push_assumption_literal(next_literal.clone(), caller_call_literal);
            // the effect of the call ties the callee exit literal to
            // the caller return point
            if let Some(callee_exit_literal) = callee_exit_literal {
                context
                    .state_mut()
                    .push_unknown_summary_literal(next_literal.clone(), callee_exit_literal);
            }
            context.state_mut().set_assumption_literal(next_literal);
        }
        Ok(())
    }

    /// Cycle rollover: copy the minimal symbolic expression of every
    /// flattened variable to a fresh cycle-0 name, drop intermediate
    /// versions, clear the path constraint, reset local constraints,
    /// and give inputs fresh uninterpreted constants
    fn handle_program_exit(
        &mut self,
        smt: &mut SmtContext,
        config: &Configuration,
        cfg: &Cfg,
        context: &mut Context,
    ) -> Result<()> {
        let cycle = context.cycle();
        let next_cycle = cycle + 1;
        let scope = context.frame().scope().to_string();

        let mut memo = FxHashMap::default();
        let mut bindings: Vec<(ContextualizedName, TermId, Option<Value>, Option<Value>)> =
            Vec::new();
        for variable in cfg.flattened_interface() {
            let flattened = format!("{}.{}", scope, variable.path);
            let highest = context.state().highest_version(&flattened);
            let old_name = ContextualizedName::new(flattened.clone(), highest, cycle);
            let new_name = ContextualizedName::new(flattened.clone(), 0, next_cycle);

            let definition = context
                .state()
                .symbolic_expression(&old_name)
                .ok_or_else(|| {
                    AhornError::ir_malformed(format!("no symbolic valuation for {}", old_name))
                })?;
            let symbolic = if self.is_whole_program_input(&flattened) {
                smt.mk_constant(&new_name.to_string(), &variable.data_type)
            } else {
                context.state().lower(smt, definition, &mut memo)
            };
            let concrete = if config.concrete_execution() {
                Some(context.state().concrete_value(&old_name).ok_or_else(|| {
                    AhornError::ir_malformed(format!("no concrete valuation for {}", old_name))
                })?)
            } else {
                None
            };
            let new_value = context.state().concrete_value_new(&old_name);
            bindings.push((new_name, symbolic, concrete, new_value));
        }
        for (name, symbolic, concrete, new_value) in bindings {
            context.state_mut().bind(name, symbolic, concrete, new_value);
        }

        context.state_mut().remove_intermediate_versions(cycle);
        context.state_mut().reset_versions();
        context.state_mut().clear_path_constraint();
        context.frame_mut().clear_local_path_constraints();

        let entry_label = context.frame().return_label();
        context.state_mut().set_label(entry_label);
        context.set_cycle(next_cycle);

        if config.vc_encoding() {
            self.advance_assumption_literal(context, entry_label, next_cycle);
        }
        Ok(())
    }
}
