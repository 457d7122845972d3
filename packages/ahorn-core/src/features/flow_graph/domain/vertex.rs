//! CFG vertices

use crate::shared::models::Instruction;

use super::cfg::Label;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    Entry,
    Regular,
    Exit,
}

/// One vertex; regular vertices carry exactly one instruction
#[derive(Debug, Clone)]
pub struct Vertex {
    label: Label,
    kind: VertexKind,
    instruction: Option<Instruction>,
}

impl Vertex {
    pub fn entry(label: Label) -> Self {
        Self {
            label,
            kind: VertexKind::Entry,
            instruction: None,
        }
    }

    pub fn exit(label: Label) -> Self {
        Self {
            label,
            kind: VertexKind::Exit,
            instruction: None,
        }
    }

    pub fn regular(label: Label, instruction: Instruction) -> Self {
        Self {
            label,
            kind: VertexKind::Regular,
            instruction: Some(instruction),
        }
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn kind(&self) -> VertexKind {
        self.kind
    }

    pub fn instruction(&self) -> Option<&Instruction> {
        self.instruction.as_ref()
    }

    pub fn set_instruction(&mut self, instruction: Instruction) {
        debug_assert_eq!(self.kind, VertexKind::Regular);
        self.instruction = Some(instruction);
    }
}

impl std::fmt::Display for Vertex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.kind, &self.instruction) {
            (VertexKind::Entry, _) => write!(f, "{}: entry", self.label),
            (VertexKind::Exit, _) => write!(f, "{}: exit", self.label),
            (VertexKind::Regular, Some(instruction)) => {
                write!(f, "{}: {}", self.label, instruction)
            }
            (VertexKind::Regular, None) => write!(f, "{}: skip", self.label),
        }
    }
}
