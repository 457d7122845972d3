//! Projects: the unit handed over by the front-end

use serde::{Deserialize, Serialize};

use crate::errors::{AhornError, Result};

use super::module::{Module, ModuleKind};

/// A fully parsed project of modules with exactly one program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub modules: Vec<Module>,
}

impl Project {
    pub fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    /// The program module of the project
    pub fn program(&self) -> Result<&Module> {
        let mut programs = self
            .modules
            .iter()
            .filter(|m| m.kind == ModuleKind::Program);
        let program = programs
            .next()
            .ok_or_else(|| AhornError::ir_malformed("project has no program module"))?;
        if programs.next().is_some() {
            return Err(AhornError::ir_malformed(
                "project has more than one program module",
            ));
        }
        Ok(program)
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Parse a project from its JSON rendition
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::Interface;

    #[test]
    fn test_program_lookup() {
        let project = Project::new(vec![Module::new(
            ModuleKind::Program,
            "P",
            Interface::default(),
            vec![],
        )]);
        assert_eq!(project.program().unwrap().name, "P");
    }

    #[test]
    fn test_missing_program_is_malformed() {
        let project = Project::new(vec![]);
        assert!(project.program().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let project = Project::new(vec![Module::new(
            ModuleKind::Program,
            "P",
            Interface::default(),
            vec![],
        )]);
        let json = project.to_json().unwrap();
        let parsed = Project::from_json(&json).unwrap();
        assert_eq!(project, parsed);
    }
}
