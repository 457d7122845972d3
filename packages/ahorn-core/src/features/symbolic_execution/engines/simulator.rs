//! Simulator
//!
//! Concrete replay of a test case on one program version: reads the
//! per-cycle inputs, interprets the CFG with a plain value
//! environment, and records the visited labels and the output
//! valuations of every cycle. The shadow engine uses replays to
//! detect change-traversing test cases and to compare the outputs of
//! the old and new version.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::config::ShadowProcessingMode;
use crate::errors::{AhornError, Result};
use crate::features::flow_graph::{Cfg, CfgRef, Label, VertexKind};
use crate::features::smt::{SmtContext, Value};
use crate::shared::models::{
    BinaryOperator, Expression, Instruction, Section, UnaryOperator,
};

use super::super::test_case::TestCase;

/// Steps one cycle may take before the replay is aborted; protects
/// against unbounded loops, which the engine does not claim to handle
const STEP_BUDGET_PER_CYCLE: usize = 100_000;

#[derive(Debug, Clone, Default)]
pub struct SimulationResult {
    pub execution_history: BTreeMap<u32, Vec<Label>>,
    pub outputs: BTreeMap<u32, BTreeMap<String, Value>>,
}

pub struct Simulator {
    mode: ShadowProcessingMode,
}

impl Simulator {
    pub fn new(mode: ShadowProcessingMode) -> Self {
        Self { mode }
    }

    pub fn run(
        &self,
        smt: &mut SmtContext,
        cfg: &CfgRef,
        test_case: &TestCase,
    ) -> Result<SimulationResult> {
        let scope = cfg.name().to_string();
        let mut env: FxHashMap<String, Value> = FxHashMap::default();
        for variable in cfg.flattened_interface() {
            let flattened = format!("{}.{}", scope, variable.path);
            let value = match &variable.initialization {
                Some(constant) => smt.constant_value(constant),
                None => smt.default_value(&variable.data_type),
            };
            env.insert(flattened, value);
        }
        for (flattened, value) in &test_case.initialization {
            env.insert(flattened.clone(), *value);
        }

        let mut result = SimulationResult::default();
        for cycle in 0..=test_case.last_cycle() {
            if let Some(inputs) = test_case.inputs.get(&cycle) {
                for (flattened, value) in inputs {
                    env.insert(flattened.clone(), *value);
                }
            }
            let visited = result.execution_history.entry(cycle).or_default();
            self.run_cycle(smt, cfg, &scope, &mut env, visited)?;

            let outputs = result.outputs.entry(cycle).or_default();
            for variable in cfg.flattened_interface() {
                if variable.section == Section::Output && variable.top_level {
                    let flattened = format!("{}.{}", scope, variable.path);
                    if let Some(value) = env.get(&flattened) {
                        outputs.insert(flattened, *value);
                    }
                }
            }
            trace!(cycle, "simulated cycle");
        }
        Ok(result)
    }

    fn run_cycle(
        &self,
        smt: &mut SmtContext,
        program: &CfgRef,
        program_scope: &str,
        env: &mut FxHashMap<String, Value>,
        visited: &mut Vec<Label>,
    ) -> Result<()> {
        // frames of (cfg, scope, return label)
        let mut frames: Vec<(CfgRef, String, Label)> = Vec::new();
        let mut cfg = program.clone();
        let mut frame_scope = program_scope.to_string();
        let mut label = cfg.entry_label();
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > STEP_BUDGET_PER_CYCLE {
                return Err(AhornError::unsupported(
                    "simulation exceeded the per-cycle step budget; unbounded loop?",
                ));
            }
            let vertex = cfg.vertex(label)?;
            match vertex.kind() {
                VertexKind::Entry => {
                    label = cfg.succeeding_labels(label)[0];
                }
                VertexKind::Exit => {
                    match frames.pop() {
                        Some((caller, caller_scope, return_label)) => {
                            cfg = caller;
                            frame_scope = caller_scope;
                            label = return_label;
                        }
                        None => return Ok(()), // program exit, cycle done
                    }
                }
                VertexKind::Regular => {
                    visited.push(label);
                    let instruction = vertex.instruction().cloned().ok_or_else(|| {
                        AhornError::ir_malformed("regular vertex without instruction")
                    })?;
                    match instruction {
                        Instruction::Assignment {
                            variable,
                            expression,
                        } => {
                            let value =
                                self.eval(smt, &cfg, &frame_scope, env, &expression)?;
                            env.insert(format!("{}.{}", frame_scope, variable.path()), value);
                            label = cfg.intraprocedural_edge(label)?.target;
                        }
                        Instruction::Havoc { variable } => {
                            let data_type = cfg
                                .flattened_variable(&variable.path())
                                .map(|v| v.data_type.clone())
                                .ok_or_else(|| {
                                    AhornError::ir_malformed("havoc of undeclared variable")
                                })?;
                            let value = smt.random_value(&data_type);
                            env.insert(format!("{}.{}", frame_scope, variable.path()), value);
                            label = cfg.intraprocedural_edge(label)?.target;
                        }
                        Instruction::Sequence(instructions) => {
                            for instruction in &instructions {
                                if let Instruction::Assignment {
                                    variable,
                                    expression,
                                } = instruction
                                {
                                    let value =
                                        self.eval(smt, &cfg, &frame_scope, env, expression)?;
                                    env.insert(
                                        format!("{}.{}", frame_scope, variable.path()),
                                        value,
                                    );
                                }
                            }
                            label = cfg.intraprocedural_edge(label)?.target;
                        }
                        Instruction::If { condition, .. }
                        | Instruction::While { condition, .. } => {
                            let value = self.eval(smt, &cfg, &frame_scope, env, &condition)?;
                            let taken = value.as_bool().ok_or_else(|| {
                                AhornError::ir_malformed("branch condition is not boolean")
                            })?;
                            label = if taken {
                                cfg.true_edge(label)?.target
                            } else {
                                cfg.false_edge(label)?.target
                            };
                        }
                        Instruction::Call { callee, .. } => {
                            let return_label = cfg.call_to_return_edge(label)?.target;
                            let callee_cfg = cfg.callee(label)?;
                            let callee_scope =
                                format!("{}.{}", frame_scope, callee.path());
                            frames.push((cfg.clone(), frame_scope.clone(), return_label));
                            label = callee_cfg.entry_label();
                            cfg = callee_cfg;
                            frame_scope = callee_scope;
                        }
                        Instruction::Goto(_) => {
                            label = cfg.intraprocedural_edge(label)?.target;
                        }
                    }
                }
            }
        }
    }

    fn eval(
        &self,
        smt: &mut SmtContext,
        cfg: &Cfg,
        scope: &str,
        env: &FxHashMap<String, Value>,
        expression: &Expression,
    ) -> Result<Value> {
        let _ = cfg;
        match expression {
            Expression::BooleanConstant(value) => Ok(Value::Bool(*value)),
            Expression::IntegerConstant(value) | Expression::TimeConstant(value) => {
                Ok(Value::Int(*value))
            }
            Expression::EnumeratedValue { ordinal, .. } => Ok(Value::Int(*ordinal)),
            Expression::Undefined => Err(AhornError::unsupported("undefined expression")),
            Expression::Nondeterministic => Ok(smt.random_value(
                &crate::shared::models::DataType::Int,
            )),
            Expression::Access(reference) => {
                let flattened = format!("{}.{}", scope, reference.path());
                env.get(&flattened).copied().ok_or_else(|| {
                    AhornError::ir_malformed(format!("no valuation for {}", flattened))
                })
            }
            Expression::Unary { operator, operand } => {
                let operand = self.eval(smt, cfg, scope, env, operand)?;
                match (operator, operand) {
                    (UnaryOperator::Not, Value::Bool(value)) => Ok(Value::Bool(!value)),
                    (UnaryOperator::Negate, Value::Int(value)) => {
                        Ok(Value::Int(value.wrapping_neg()))
                    }
                    _ => Err(AhornError::ir_malformed("ill-typed unary expression")),
                }
            }
            Expression::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.eval(smt, cfg, scope, env, left)?;
                let right = self.eval(smt, cfg, scope, env, right)?;
                binary(*operator, left, right)
            }
            Expression::BooleanToInteger(operand) => {
                match self.eval(smt, cfg, scope, env, operand)? {
                    Value::Bool(value) => Ok(Value::Int(i32::from(value))),
                    _ => Err(AhornError::ir_malformed("ill-typed cast")),
                }
            }
            Expression::IntegerToBoolean(operand) => {
                match self.eval(smt, cfg, scope, env, operand)? {
                    Value::Int(value) => Ok(Value::Bool(value != 0)),
                    _ => Err(AhornError::ir_malformed("ill-typed cast")),
                }
            }
            Expression::Change { old, new } => match self.mode {
                ShadowProcessingMode::Old => self.eval(smt, cfg, scope, env, old),
                ShadowProcessingMode::New => self.eval(smt, cfg, scope, env, new),
                ShadowProcessingMode::Both => Err(AhornError::unsupported(
                    "the simulator replays one version at a time",
                )),
            },
            Expression::Phi { .. } => Err(AhornError::unsupported(
                "phi expressions only occur in SSA-form CFGs",
            )),
        }
    }
}

fn binary(operator: BinaryOperator, left: Value, right: Value) -> Result<Value> {
    use Value::{Bool, Int};
    Ok(match (operator, left, right) {
        (BinaryOperator::Add, Int(a), Int(b)) => Int(a.wrapping_add(b)),
        (BinaryOperator::Subtract, Int(a), Int(b)) => Int(a.wrapping_sub(b)),
        (BinaryOperator::Multiply, Int(a), Int(b)) => Int(a.wrapping_mul(b)),
        (BinaryOperator::Divide, Int(a), Int(b)) => {
            if b == 0 {
                return Err(AhornError::arithmetic("division by zero"));
            }
            Int(a.wrapping_div(b))
        }
        (BinaryOperator::Modulo, Int(a), Int(b)) => {
            if b == 0 {
                return Err(AhornError::arithmetic("modulo by zero"));
            }
            Int(a.wrapping_rem(b))
        }
        (BinaryOperator::And, Bool(a), Bool(b)) => Bool(a && b),
        (BinaryOperator::Or, Bool(a), Bool(b)) => Bool(a || b),
        (BinaryOperator::Xor, Bool(a), Bool(b)) => Bool(a ^ b),
        (BinaryOperator::Equal, a, b) => Bool(a == b),
        (BinaryOperator::NotEqual, a, b) => Bool(a != b),
        (BinaryOperator::LessThan, Int(a), Int(b)) => Bool(a < b),
        (BinaryOperator::LessThanOrEqual, Int(a), Int(b)) => Bool(a <= b),
        (BinaryOperator::GreaterThan, Int(a), Int(b)) => Bool(a > b),
        (BinaryOperator::GreaterThanOrEqual, Int(a), Int(b)) => Bool(a >= b),
        _ => return Err(AhornError::ir_malformed("ill-typed binary expression")),
    })
}
