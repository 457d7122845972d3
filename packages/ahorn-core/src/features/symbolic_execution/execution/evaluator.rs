//! Evaluator
//!
//! Walks an expression bottom-up substituting the current concrete
//! valuation for each variable access, folding to a value. Branch
//! decisions of concrete and concolic execution are taken on its
//! results.

use crate::config::ShadowProcessingMode;
use crate::errors::{AhornError, Result};
use crate::features::smt::{SmtContext, Value};
use crate::shared::models::{BinaryOperator, DataType, Expression, UnaryOperator};

use super::super::context::{Frame, State};
use super::super::name::ContextualizedName;

pub fn evaluate(
    smt: &mut SmtContext,
    state: &State,
    frame: &Frame,
    cycle: u32,
    mode: ShadowProcessingMode,
    expression: &Expression,
) -> Result<Value> {
    match expression {
        Expression::BooleanConstant(value) => Ok(Value::Bool(*value)),
        Expression::IntegerConstant(value) | Expression::TimeConstant(value) => {
            Ok(Value::Int(*value))
        }
        Expression::EnumeratedValue { ordinal, .. } => Ok(Value::Int(*ordinal)),
        Expression::Undefined => Err(AhornError::unsupported("undefined expression")),
        Expression::Nondeterministic => Ok(smt.random_value(&DataType::Int)),
        Expression::Access(reference) => {
            let path = reference.path();
            let flattened = format!("{}.{}", frame.scope(), path);
            let version = state.highest_version(&flattened);
            let name = ContextualizedName::new(flattened, version, cycle);
            let value = match mode {
                ShadowProcessingMode::New => state
                    .concrete_value_new(&name)
                    .or_else(|| state.concrete_value(&name)),
                _ => state.concrete_value(&name),
            };
            value.ok_or_else(|| {
                AhornError::ir_malformed(format!("no concrete valuation for {}", name))
            })
        }
        Expression::Unary { operator, operand } => {
            let operand = evaluate(smt, state, frame, cycle, mode, operand)?;
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
            let left = evaluate(smt, state, frame, cycle, mode, left)?;
            let right = evaluate(smt, state, frame, cycle, mode, right)?;
            evaluate_binary(*operator, left, right)
        }
        Expression::BooleanToInteger(operand) => {
            match evaluate(smt, state, frame, cycle, mode, operand)? {
                Value::Bool(value) => Ok(Value::Int(i32::from(value))),
                Value::Int(_) => Err(AhornError::ir_malformed("cast of an integer to integer")),
            }
        }
        Expression::IntegerToBoolean(operand) => {
            match evaluate(smt, state, frame, cycle, mode, operand)? {
                Value::Int(value) => Ok(Value::Bool(value != 0)),
                Value::Bool(_) => Err(AhornError::ir_malformed("cast of a boolean to boolean")),
            }
        }
        Expression::Change { old, new } => match mode {
            ShadowProcessingMode::Old => evaluate(smt, state, frame, cycle, mode, old),
            ShadowProcessingMode::New => evaluate(smt, state, frame, cycle, mode, new),
            ShadowProcessingMode::Both => Err(AhornError::unsupported(
                "a change expression has no single concrete value; evaluate old and new",
            )),
        },
        Expression::Phi { .. } => Err(AhornError::unsupported(
            "phi expressions only occur in SSA-form CFGs",
        )),
    }
}

fn evaluate_binary(operator: BinaryOperator, left: Value, right: Value) -> Result<Value> {
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
