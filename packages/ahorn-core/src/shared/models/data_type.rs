//! Data types and constants of the IR

use serde::{Deserialize, Serialize};

/// Data type of a variable declaration.
///
/// `Derived` names another module (a function block or structured
/// type); its interface is expanded transitively when a CFG computes
/// its flattened interface. Time is carried in milliseconds and
/// enumerations by the ordinal the front-end resolved, so both map
/// onto the integer theory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int,
    Time,
    Enumeration { type_name: String, values: Vec<String> },
    Derived { type_name: String },
}

impl DataType {
    /// Whether values of this type are encoded in the boolean theory
    pub fn is_boolean(&self) -> bool {
        matches!(self, DataType::Bool)
    }

    /// Whether this type denotes a nested module instance
    pub fn is_derived(&self) -> bool {
        matches!(self, DataType::Derived { .. })
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Bool => write!(f, "BOOL"),
            DataType::Int => write!(f, "INT"),
            DataType::Time => write!(f, "TIME"),
            DataType::Enumeration { type_name, .. } => write!(f, "{}", type_name),
            DataType::Derived { type_name } => write!(f, "{}", type_name),
        }
    }
}

/// Initialisation constant of a variable declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constant {
    Bool(bool),
    Int(i32),
    /// Milliseconds
    Time(i32),
    /// Enumerated value with the ordinal resolved by the front-end
    Enumerated { value: String, ordinal: i32 },
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Bool(value) => write!(f, "{}", value),
            Constant::Int(value) => write!(f, "{}", value),
            Constant::Time(value) => write!(f, "T#{}ms", value),
            Constant::Enumerated { value, .. } => write!(f, "{}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_type() {
        let data_type = DataType::Derived {
            type_name: "Fb".to_string(),
        };
        assert!(data_type.is_derived());
        assert!(!data_type.is_boolean());
        assert_eq!(data_type.to_string(), "Fb");
    }

    #[test]
    fn test_constant_display() {
        assert_eq!(Constant::Bool(true).to_string(), "true");
        assert_eq!(Constant::Time(500).to_string(), "T#500ms");
    }
}
