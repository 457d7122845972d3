//! Encoder
//!
//! Walks an expression bottom-up and emits an SMT term over the
//! current symbolic valuations. In shadow processing mode `Both` a
//! change-annotation expression produces
//! `ite(fresh_shadow, old_encoding, new_encoding)` and the fresh
//! shadow constant is recorded in the shadow store.

use crate::config::ShadowProcessingMode;
use crate::errors::{AhornError, Result};
use crate::features::smt::{SmtContext, TermId};
use crate::shared::models::{BinaryOperator, Expression, UnaryOperator};

use super::super::context::{Frame, State};
use super::super::name::ContextualizedName;

pub fn encode(
    smt: &mut SmtContext,
    state: &mut State,
    frame: &Frame,
    cycle: u32,
    mode: ShadowProcessingMode,
    expression: &Expression,
) -> Result<TermId> {
    match expression {
        Expression::BooleanConstant(value) => Ok(smt.mk_bool(*value)),
        Expression::IntegerConstant(value) => Ok(smt.mk_int(*value)),
        Expression::TimeConstant(value) => Ok(smt.mk_int(*value)),
        Expression::EnumeratedValue { ordinal, .. } => Ok(smt.mk_int(*ordinal)),
        Expression::Undefined => Err(AhornError::unsupported("undefined expression")),
        Expression::Nondeterministic => {
            let name = smt.fresh("nondet");
            Ok(smt.mk_integer_constant(&name))
        }
        Expression::Access(reference) => {
            let path = reference.path();
            let flattened = format!("{}.{}", frame.scope(), path);
            let variable = frame.cfg().flattened_variable(&path).ok_or_else(|| {
                AhornError::ir_malformed(format!(
                    "access to undeclared variable {} in {}",
                    path,
                    frame.cfg().name()
                ))
            })?;
            let version = state.highest_version(&flattened);
            let name = ContextualizedName::new(flattened, version, cycle);
            Ok(smt.mk_constant(&name.to_string(), &variable.data_type))
        }
        Expression::Unary { operator, operand } => {
            let operand = encode(smt, state, frame, cycle, mode, operand)?;
            match operator {
                UnaryOperator::Not => Ok(smt.mk_not(operand)),
                UnaryOperator::Negate => Ok(smt.mk_neg(operand)),
            }
        }
        Expression::Binary {
            operator,
            left,
            right,
        } => {
            let left = encode(smt, state, frame, cycle, mode, left)?;
            let right = encode(smt, state, frame, cycle, mode, right)?;
            Ok(match operator {
                BinaryOperator::Add => smt.mk_add(left, right),
                BinaryOperator::Subtract => smt.mk_sub(left, right),
                BinaryOperator::Multiply => smt.mk_mul(left, right),
                BinaryOperator::Divide | BinaryOperator::Modulo => {
                    // a symbolic divisor contributes the assumption
                    // that it is non-zero
                    if smt.literal(right).is_none() {
                        let zero = smt.mk_int(0);
                        let non_zero = smt.mk_ne(right, zero);
                        state.push_path_constraint(non_zero);
                        if state.shadow_enabled() {
                            state.push_path_constraint_new(non_zero);
                        }
                    }
                    if *operator == BinaryOperator::Divide {
                        smt.mk_div(left, right)
                    } else {
                        smt.mk_rem(left, right)
                    }
                }
                BinaryOperator::And => smt.mk_and([left, right]),
                BinaryOperator::Or => smt.mk_or([left, right]),
                BinaryOperator::Xor => smt.mk_xor(left, right),
                BinaryOperator::Equal => smt.mk_eq(left, right),
                BinaryOperator::NotEqual => smt.mk_ne(left, right),
                BinaryOperator::LessThan => smt.mk_lt(left, right),
                BinaryOperator::LessThanOrEqual => smt.mk_le(left, right),
                BinaryOperator::GreaterThan => smt.mk_gt(left, right),
                BinaryOperator::GreaterThanOrEqual => smt.mk_ge(left, right),
            })
        }
        Expression::BooleanToInteger(operand) => {
            let operand = encode(smt, state, frame, cycle, mode, operand)?;
            Ok(smt.mk_bool_to_int(operand))
        }
        Expression::IntegerToBoolean(operand) => {
            let operand = encode(smt, state, frame, cycle, mode, operand)?;
            Ok(smt.mk_int_to_bool(operand))
        }
        Expression::Change { old, new } => match mode {
            ShadowProcessingMode::Old => encode(smt, state, frame, cycle, mode, old),
            ShadowProcessingMode::New => encode(smt, state, frame, cycle, mode, new),
            ShadowProcessingMode::Both => {
                let old = encode(smt, state, frame, cycle, ShadowProcessingMode::Old, old)?;
                let new = encode(smt, state, frame, cycle, ShadowProcessingMode::New, new)?;
                let name = smt.fresh("shadow");
                let shadow = smt.mk_boolean_constant(&name);
                state.set_shadow_expression(name, old, new);
                Ok(smt.mk_ite(shadow, old, new))
            }
        },
        Expression::Phi { .. } => Err(AhornError::unsupported(
            "phi expressions only occur in SSA-form CFGs",
        )),
    }
}
