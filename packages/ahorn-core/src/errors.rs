//! Error types for ahorn-core
//!
//! Errors that indicate a property of the program under analysis
//! (arithmetic faults, solver limits) are isolated to the offending
//! execution context by the engines; errors that indicate a logic bug
//! in the engine itself abort via `panic!` at the site of detection.

use thiserror::Error;

/// Main error type for ahorn-core operations
#[derive(Debug, Error)]
pub enum AhornError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed project input (front-end interface)
    #[error("malformed project: {0}")]
    Json(#[from] serde_json::Error),

    /// Test-suite persistence error
    #[error("test suite error: {0}")]
    TestSuite(String),

    /// Internal invariant of the parsed IR violated; indicates a
    /// front-end bug, no recovery
    #[error("malformed IR: {0}")]
    IrMalformed(String),

    /// Construct recognised but not implemented
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// Concrete arithmetic fault in the program under analysis,
    /// e.g. division by zero
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// The solver returned unknown where a definite answer was needed
    #[error("solver returned unknown: {0}")]
    SolverUnknown(String),

    /// Bad command line
    #[error("usage error: {0}")]
    Usage(String),
}

impl AhornError {
    /// Create an ir-malformed error
    pub fn ir_malformed(msg: impl Into<String>) -> Self {
        AhornError::IrMalformed(msg.into())
    }

    /// Create an unsupported-construct error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        AhornError::Unsupported(msg.into())
    }

    /// Create an arithmetic error
    pub fn arithmetic(msg: impl Into<String>) -> Self {
        AhornError::Arithmetic(msg.into())
    }

    /// Create a test-suite persistence error
    pub fn test_suite(msg: impl Into<String>) -> Self {
        AhornError::TestSuite(msg.into())
    }
}

/// Result type alias for ahorn-core operations
pub type Result<T> = std::result::Result<T, AhornError>;
