//! IR expressions
//!
//! One tagged sum for the whole expression family; consumers dispatch
//! by `match`. The `Change` variant carries the old and new rendition
//! of a change-annotated sub-expression for shadow execution; `Phi`
//! only occurs in SSA-form CFGs.

use serde::{Deserialize, Serialize};

/// Reference to a variable on the left-hand side of an assignment or
/// inside an expression. Field accesses use dot-separated paths into
/// nested module instances, e.g. record `fb` and field `a` for
/// `fb.a`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableReference {
    Variable(String),
    Field { record: String, name: String },
}

impl VariableReference {
    /// The dotted path of this reference relative to its scope
    pub fn path(&self) -> String {
        match self {
            VariableReference::Variable(name) => name.clone(),
            VariableReference::Field { record, name } => format!("{}.{}", record, name),
        }
    }

    /// Name of the root variable the reference enters through
    pub fn root(&self) -> &str {
        match self {
            VariableReference::Variable(name) => name,
            VariableReference::Field { record, .. } => match record.split_once('.') {
                Some((root, _)) => root,
                None => record,
            },
        }
    }
}

impl std::fmt::Display for VariableReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Xor,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl BinaryOperator {
    /// Whether the operator produces a boolean result
    pub fn is_relational(&self) -> bool {
        use BinaryOperator::*;
        matches!(
            self,
            Equal | NotEqual | LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual
        )
    }
}

/// IR expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    BooleanConstant(bool),
    IntegerConstant(i32),
    /// Milliseconds
    TimeConstant(i32),
    /// Front-end resolved ordinal of an enumerated value
    EnumeratedValue { value: String, ordinal: i32 },
    /// Value left open by the front-end
    Undefined,
    /// Nondeterministic choice, e.g. from an unsupported intrinsic
    Nondeterministic,
    Access(VariableReference),
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    BooleanToInteger(Box<Expression>),
    IntegerToBoolean(Box<Expression>),
    /// Change annotation: old and new rendition of a sub-expression
    Change {
        old: Box<Expression>,
        new: Box<Expression>,
    },
    /// SSA phi over versioned accesses; only valid in SSA-form CFGs
    Phi {
        name: String,
        operands: Vec<Expression>,
    },
}

impl Expression {
    pub fn access(name: impl Into<String>) -> Self {
        Expression::Access(VariableReference::Variable(name.into()))
    }

    pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(operator: UnaryOperator, operand: Expression) -> Self {
        Expression::Unary {
            operator,
            operand: Box::new(operand),
        }
    }

    pub fn change(old: Expression, new: Expression) -> Self {
        Expression::Change {
            old: Box::new(old),
            new: Box::new(new),
        }
    }

    /// Nesting depth; a literal or access has depth 1
    pub fn depth(&self) -> usize {
        match self {
            Expression::Unary { operand, .. }
            | Expression::BooleanToInteger(operand)
            | Expression::IntegerToBoolean(operand) => 1 + operand.depth(),
            Expression::Binary { left, right, .. } => 1 + left.depth().max(right.depth()),
            Expression::Change { old, new } => 1 + old.depth().max(new.depth()),
            Expression::Phi { operands, .. } => {
                1 + operands.iter().map(Expression::depth).max().unwrap_or(0)
            }
            _ => 1,
        }
    }

    /// Whether any change annotation occurs in this expression
    pub fn contains_change(&self) -> bool {
        match self {
            Expression::Change { .. } => true,
            Expression::Unary { operand, .. }
            | Expression::BooleanToInteger(operand)
            | Expression::IntegerToBoolean(operand) => operand.contains_change(),
            Expression::Binary { left, right, .. } => {
                left.contains_change() || right.contains_change()
            }
            Expression::Phi { operands, .. } => operands.iter().any(Expression::contains_change),
            _ => false,
        }
    }

    /// All variable references occurring in this expression, in
    /// left-to-right order
    pub fn references(&self) -> Vec<&VariableReference> {
        let mut references = Vec::new();
        self.collect_references(&mut references);
        references
    }

    fn collect_references<'a>(&'a self, into: &mut Vec<&'a VariableReference>) {
        match self {
            Expression::Access(reference) => into.push(reference),
            Expression::Unary { operand, .. }
            | Expression::BooleanToInteger(operand)
            | Expression::IntegerToBoolean(operand) => operand.collect_references(into),
            Expression::Binary { left, right, .. } => {
                left.collect_references(into);
                right.collect_references(into);
            }
            Expression::Change { old, new } => {
                old.collect_references(into);
                new.collect_references(into);
            }
            Expression::Phi { operands, .. } => {
                for operand in operands {
                    operand.collect_references(into);
                }
            }
            _ => {}
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::BooleanConstant(value) => write!(f, "{}", value),
            Expression::IntegerConstant(value) => write!(f, "{}", value),
            Expression::TimeConstant(value) => write!(f, "T#{}ms", value),
            Expression::EnumeratedValue { value, .. } => write!(f, "{}", value),
            Expression::Undefined => write!(f, "undefined"),
            Expression::Nondeterministic => write!(f, "nondet"),
            Expression::Access(reference) => write!(f, "{}", reference),
            Expression::Unary { operator, operand } => match operator {
                UnaryOperator::Not => write!(f, "not ({})", operand),
                UnaryOperator::Negate => write!(f, "-({})", operand),
            },
            Expression::Binary {
                operator,
                left,
                right,
            } => {
                let symbol = match operator {
                    BinaryOperator::Add => "+",
                    BinaryOperator::Subtract => "-",
                    BinaryOperator::Multiply => "*",
                    BinaryOperator::Divide => "/",
                    BinaryOperator::Modulo => "mod",
                    BinaryOperator::And => "and",
                    BinaryOperator::Or => "or",
                    BinaryOperator::Xor => "xor",
                    BinaryOperator::Equal => "=",
                    BinaryOperator::NotEqual => "<>",
                    BinaryOperator::LessThan => "<",
                    BinaryOperator::LessThanOrEqual => "<=",
                    BinaryOperator::GreaterThan => ">",
                    BinaryOperator::GreaterThanOrEqual => ">=",
                };
                write!(f, "({} {} {})", left, symbol, right)
            }
            Expression::BooleanToInteger(operand) => write!(f, "bool_to_int({})", operand),
            Expression::IntegerToBoolean(operand) => write!(f, "int_to_bool({})", operand),
            Expression::Change { old, new } => write!(f, "change({}, {})", old, new),
            Expression::Phi { name, operands } => {
                write!(f, "phi_{}(", name)?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", operand)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth() {
        // x + (y * 2) has depth 3
        let expression = Expression::binary(
            BinaryOperator::Add,
            Expression::access("x"),
            Expression::binary(
                BinaryOperator::Multiply,
                Expression::access("y"),
                Expression::IntegerConstant(2),
            ),
        );
        assert_eq!(expression.depth(), 3);
    }

    #[test]
    fn test_contains_change() {
        let expression = Expression::unary(
            UnaryOperator::Not,
            Expression::change(
                Expression::access("a"),
                Expression::BooleanConstant(false),
            ),
        );
        assert!(expression.contains_change());
        assert!(!Expression::access("a").contains_change());
    }

    #[test]
    fn test_field_access_root() {
        let reference = VariableReference::Field {
            record: "fb".to_string(),
            name: "a".to_string(),
        };
        assert_eq!(reference.path(), "fb.a");
        assert_eq!(reference.root(), "fb");
    }
}
