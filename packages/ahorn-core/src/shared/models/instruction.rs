//! IR instructions
//!
//! The same tagged sum serves two forms. In a module body `If` and
//! `While` carry structured branch instructions; after CFG
//! construction the branch slots hold `Goto`s to the branch target
//! labels and each regular vertex carries exactly one instruction.

use serde::{Deserialize, Serialize};

use super::expression::{Expression, VariableReference};

/// Argument bindings of a call before the call-transformation pass:
/// `inputs` assign an actual expression to a formal input of the
/// callee instance, `outputs` copy a formal output back into a caller
/// variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArguments {
    pub inputs: Vec<(String, Expression)>,
    pub outputs: Vec<(String, VariableReference)>,
}

impl CallArguments {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}

/// IR instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Assignment {
        variable: VariableReference,
        expression: Expression,
    },
    Call {
        callee: VariableReference,
        #[serde(default)]
        arguments: CallArguments,
    },
    If {
        condition: Expression,
        then_branch: Box<Instruction>,
        else_branch: Box<Instruction>,
    },
    Sequence(Vec<Instruction>),
    While {
        condition: Expression,
        body: Box<Instruction>,
    },
    Goto(u32),
    Havoc {
        variable: VariableReference,
    },
}

impl Instruction {
    pub fn assignment(variable: VariableReference, expression: Expression) -> Self {
        Instruction::Assignment {
            variable,
            expression,
        }
    }

    pub fn assign(name: impl Into<String>, expression: Expression) -> Self {
        Instruction::Assignment {
            variable: VariableReference::Variable(name.into()),
            expression,
        }
    }

    pub fn call(callee: impl Into<String>) -> Self {
        Instruction::Call {
            callee: VariableReference::Variable(callee.into()),
            arguments: CallArguments::default(),
        }
    }

    pub fn if_then_else(
        condition: Expression,
        then_branch: Vec<Instruction>,
        else_branch: Vec<Instruction>,
    ) -> Self {
        Instruction::If {
            condition,
            then_branch: Box::new(Instruction::Sequence(then_branch)),
            else_branch: Box::new(Instruction::Sequence(else_branch)),
        }
    }

    pub fn while_loop(condition: Expression, body: Vec<Instruction>) -> Self {
        Instruction::While {
            condition,
            body: Box::new(Instruction::Sequence(body)),
        }
    }

    /// Whether any expression of this instruction carries a change
    /// annotation
    pub fn contains_change(&self) -> bool {
        match self {
            Instruction::Assignment { expression, .. } => expression.contains_change(),
            Instruction::If {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.contains_change()
                    || then_branch.contains_change()
                    || else_branch.contains_change()
            }
            Instruction::While { condition, body } => {
                condition.contains_change() || body.contains_change()
            }
            Instruction::Sequence(instructions) => {
                instructions.iter().any(Instruction::contains_change)
            }
            Instruction::Call { arguments, .. } => arguments
                .inputs
                .iter()
                .any(|(_, expression)| expression.contains_change()),
            Instruction::Goto(_) | Instruction::Havoc { .. } => false,
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Assignment {
                variable,
                expression,
            } => write!(f, "{} := {}", variable, expression),
            Instruction::Call { callee, .. } => write!(f, "{}()", callee),
            Instruction::If { condition, .. } => write!(f, "if {}", condition),
            Instruction::Sequence(instructions) => {
                for (i, instruction) in instructions.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", instruction)?;
                }
                Ok(())
            }
            Instruction::While { condition, .. } => write!(f, "while {}", condition),
            Instruction::Goto(label) => write!(f, "goto {}", label),
            Instruction::Havoc { variable } => write!(f, "havoc {}", variable),
        }
    }
}
