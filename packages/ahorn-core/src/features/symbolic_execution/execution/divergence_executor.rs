//! Divergence executor
//!
//! Extends the executor with an old/new path constraint pair and the
//! shadow store. At every branch whose encoded condition depends on a
//! shadow expression the old and new encodings are evaluated
//! separately: agreeing sides with no feasible opposite split
//! continue as expected, agreeing sides with a feasible opposite
//! split fork divergent contexts and continue with the common one,
//! and concretely disagreeing sides stop with the divergent context.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::config::{Configuration, ShadowProcessingMode};
use crate::errors::{AhornError, Result};
use crate::features::flow_graph::CfgRef;
use crate::features::smt::{SatResult, SmtContext, TermId};
use crate::shared::models::Instruction;

use super::super::context::{Context, State};
use super::super::name::ContextualizedName;
use super::super::test_case::TestCase;
use super::executor::{Execution, ExecutionStatus, Executor};
use super::{encode, evaluate};

pub struct DivergenceExecutor {
    executor: Executor,
}

impl DivergenceExecutor {
    pub fn new() -> Self {
        Self {
            executor: Executor::new(false),
        }
    }

    pub fn executor_mut(&mut self) -> &mut Executor {
        &mut self.executor
    }

    /// Seed the cycle-0 context of a concolic replay from a test
    /// case: state variables take the initialization valuations,
    /// inputs the cycle-0 stimulus
    pub fn initial_context(
        &mut self,
        smt: &mut SmtContext,
        config: &Configuration,
        cfg: &CfgRef,
        test_case: &TestCase,
    ) -> Context {
        let mut context = self.executor.initial_context(smt, config, cfg);
        apply_initialization(smt, context.state_mut(), test_case);
        apply_cycle_inputs(context.state_mut(), test_case, 0);
        context
    }

    pub fn execute(
        &mut self,
        smt: &mut SmtContext,
        config: &Configuration,
        context: Context,
    ) -> Result<Execution> {
        let cfg = context.frame().cfg().clone();
        let label = context.state().label();
        let vertex = cfg.vertex(label)?;

        let condition = match vertex.instruction() {
            Some(Instruction::If { condition, .. })
            | Some(Instruction::While { condition, .. }) => condition.clone(),
            _ => return self.executor.execute(smt, config, context),
        };

        // only conditions that transitively depend on a shadow
        // expression are handled here
        let mut probe = context.clone();
        let frame = probe.frame().clone();
        let cycle = probe.cycle();
        let encoded = encode(
            smt,
            probe.state_mut(),
            &frame,
            cycle,
            ShadowProcessingMode::Both,
            &condition,
        )?;
        if !contains_shadow_expression(smt, probe.state(), encoded) {
            return self.executor.execute(smt, config, context);
        }
        drop(probe);

        let mut context = context;
        let cycle = context.cycle();
        let frame = context.frame().clone();
        let old_value = evaluate(
            smt,
            context.state(),
            &frame,
            cycle,
            ShadowProcessingMode::Old,
            &condition,
        )?
        .as_bool()
        .ok_or_else(|| AhornError::ir_malformed("branch condition is not boolean"))?;
        let new_value = evaluate(
            smt,
            context.state(),
            &frame,
            cycle,
            ShadowProcessingMode::New,
            &condition,
        )?
        .as_bool()
        .ok_or_else(|| AhornError::ir_malformed("branch condition is not boolean"))?;

        if old_value != new_value {
            // the input exposes the divergence; stop and emit
            trace!(label, old_value, new_value, "divergent behavior");
            return Ok(Execution {
                status: ExecutionStatus::Divergent,
                contexts: Vec::new(),
                divergent: vec![context],
            });
        }

        // both versions agree; check whether the opposite split is
        // feasible on at least one version
        let old_encoded = encode(
            smt,
            context.state_mut(),
            &frame,
            cycle,
            ShadowProcessingMode::Old,
            &condition,
        )?;
        let new_encoded = encode(
            smt,
            context.state_mut(),
            &frame,
            cycle,
            ShadowProcessingMode::New,
            &condition,
        )?;
        let label = context.state().label();
        let cfg = frame.cfg();
        let true_target = cfg.true_edge(label)?.target;
        let false_target = cfg.false_edge(label)?.target;

        let mut divergent = Vec::new();
        for (old_sign, new_sign) in [(old_value, !new_value), (!old_value, new_value)] {
            if let Some(forked) = self.try_divergent_fork(
                smt,
                &context,
                old_encoded,
                new_encoded,
                old_sign,
                new_sign,
                if new_sign { true_target } else { false_target },
            )? {
                divergent.push(forked);
            }
        }

        // continue with the common context along the agreed branch
        let followed = if old_value { true_target } else { false_target };
        let followed_old = if old_value {
            old_encoded
        } else {
            smt.mk_not(old_encoded)
        };
        let followed_new = if new_value {
            new_encoded
        } else {
            smt.mk_not(new_encoded)
        };
        let mut memo = FxHashMap::default();
        let lowered_old = context.state().lower(smt, followed_old, &mut memo);
        let lowered_new = context.state().lower(smt, followed_new, &mut memo);
        context.state_mut().push_path_constraint(lowered_old);
        context.state_mut().push_path_constraint_new(lowered_new);
        context.push_local_path_constraint(followed_old);
        context.state_mut().set_label(followed);

        let status = if divergent.is_empty() {
            ExecutionStatus::Expected
        } else {
            trace!(label, "potential divergent behavior");
            ExecutionStatus::PotentialDivergent
        };
        Ok(Execution {
            status,
            contexts: vec![context],
            divergent,
        })
    }

    /// Check feasibility of one old/new sign combination and fork a
    /// divergent context following the new version's branch
    #[allow(clippy::too_many_arguments)]
    fn try_divergent_fork(
        &mut self,
        smt: &mut SmtContext,
        context: &Context,
        old_encoded: TermId,
        new_encoded: TermId,
        old_sign: bool,
        new_sign: bool,
        target: crate::features::flow_graph::Label,
    ) -> Result<Option<Context>> {
        let state = context.state();
        let old_term = if old_sign {
            old_encoded
        } else {
            smt.mk_not(old_encoded)
        };
        let new_term = if new_sign {
            new_encoded
        } else {
            smt.mk_not(new_encoded)
        };

        let mut memo = FxHashMap::default();
        let lowered_old = state.lower(smt, old_term, &mut memo);
        let lowered_new = state.lower(smt, new_term, &mut memo);

        let mut constraints: Vec<TermId> = state.path_constraint().to_vec();
        constraints.extend(state.path_constraint_new().iter().copied());
        constraints.push(lowered_old);
        constraints.push(lowered_new);
        constraints.extend(state.necessary_hard_constraints(smt, lowered_old));
        constraints.extend(state.necessary_hard_constraints(smt, lowered_new));
        self.executor
            .pin_completed_cycles(smt, context, &constraints.clone(), &mut constraints);

        match smt.check(&constraints) {
            SatResult::Sat(model) => {
                let mut forked = context.fork(smt, &model);
                forked.state_mut().push_path_constraint(lowered_old);
                forked.state_mut().push_path_constraint_new(lowered_new);
                forked.state_mut().set_label(target);
                Ok(Some(forked))
            }
            SatResult::Unsat => Ok(None),
            SatResult::Unknown => {
                trace!("solver returned unknown during divergent fork, skipping");
                Ok(None)
            }
        }
    }
}

impl Default for DivergenceExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a term depends on a shadow constant, transitively through
/// the symbolic store
fn contains_shadow_expression(smt: &mut SmtContext, state: &State, term: TermId) -> bool {
    let mut stack = vec![term];
    let mut seen: Vec<TermId> = Vec::new();
    while let Some(term) = stack.pop() {
        if seen.contains(&term) {
            continue;
        }
        seen.push(term);
        for (name, _) in smt.uninterpreted_constants(term).iter() {
            match ContextualizedName::parse(name) {
                Some(contextualized) => {
                    if let Some(definition) = state.symbolic_expression(&contextualized) {
                        stack.push(definition);
                    }
                }
                None => {
                    if name.starts_with("shadow") {
                        return true;
                    }
                }
            }
        }
    }
    false
}

/// Overwrite the initial state valuations with a test case's
/// initialization
pub(crate) fn apply_initialization(
    smt: &mut SmtContext,
    state: &mut State,
    test_case: &TestCase,
) {
    for (flattened, value) in &test_case.initialization {
        let name = ContextualizedName::new(flattened.clone(), 0, 0);
        if state.symbolic_expression(&name).is_some() {
            let literal = smt.mk_literal(*value);
            state.bind(name, literal, Some(*value), Some(*value));
        }
    }
}

/// Install the concrete stimulus of one cycle into the input
/// valuations; the symbolic constants stay fresh
pub(crate) fn apply_cycle_inputs(state: &mut State, test_case: &TestCase, cycle: u32) {
    if let Some(inputs) = test_case.inputs.get(&cycle) {
        for (flattened, value) in inputs {
            let name = ContextualizedName::new(flattened.clone(), 0, cycle);
            if state.symbolic_expression(&name).is_some() {
                state.set_concrete_value(name.clone(), *value);
                if state.shadow_enabled() {
                    state.set_concrete_value_new(name, *value);
                }
            }
        }
    }
}

impl std::fmt::Debug for DivergenceExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DivergenceExecutor").finish()
    }
}
