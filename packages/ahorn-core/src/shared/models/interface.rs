//! Module interfaces

use serde::{Deserialize, Serialize};

use super::variable::{Section, Variable};

/// Ordered sequence of input, output, and local variable declarations
/// of one module. Declaration order is preserved; it determines label
/// assignment of the builder and the canonical order of flattened
/// interfaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    variables: Vec<Variable>,
}

impl Interface {
    pub fn new(variables: Vec<Variable>) -> Self {
        Self { variables }
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(|v| v.section == Section::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(|v| v.section == Section::Output)
    }

    pub fn locals(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(|v| v.section == Section::Local)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn push(&mut self, variable: Variable) {
        self.variables.push(variable);
    }

    pub fn remove(&mut self, name: &str) {
        self.variables.retain(|v| v.name != name);
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::DataType;

    #[test]
    fn test_sections() {
        let interface = Interface::new(vec![
            Variable::new("a", DataType::Bool, Section::Input),
            Variable::new("q", DataType::Bool, Section::Output),
            Variable::new("x", DataType::Int, Section::Local),
        ]);
        assert_eq!(interface.inputs().count(), 1);
        assert_eq!(interface.outputs().count(), 1);
        assert_eq!(interface.locals().count(), 1);
        assert!(interface.variable("q").is_some());
    }
}
