//! Variable declarations

use serde::{Deserialize, Serialize};

use super::data_type::{Constant, DataType};

/// Interface section a variable is declared in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    Input,
    Output,
    Local,
}

/// One variable declaration of a module interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub data_type: DataType,
    pub section: Section,
    pub initialization: Option<Constant>,
}

impl Variable {
    pub fn new(name: impl Into<String>, data_type: DataType, section: Section) -> Self {
        Self {
            name: name.into(),
            data_type,
            section,
            initialization: None,
        }
    }

    pub fn with_initialization(mut self, constant: Constant) -> Self {
        self.initialization = Some(constant);
        self
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.data_type)?;
        if let Some(initialization) = &self.initialization {
            write!(f, " := {}", initialization)?;
        }
        Ok(())
    }
}
