//! Modules of a project

use serde::{Deserialize, Serialize};

use super::instruction::Instruction;
use super::interface::Interface;

/// Kind of a module; the kind of the CFG built from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    Program,
    FunctionBlock,
    Function,
}

/// One parsed module: interface plus structured body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub kind: ModuleKind,
    pub name: String,
    pub interface: Interface,
    pub body: Vec<Instruction>,
}

impl Module {
    pub fn new(
        kind: ModuleKind,
        name: impl Into<String>,
        interface: Interface,
        body: Vec<Instruction>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            interface,
            body,
        }
    }
}
