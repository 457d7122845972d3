//! Feature modules
//!
//! Dependency order, leaves first: smt, flow_graph, lowering, ssa,
//! value_set, symbolic_execution.

pub mod flow_graph;
pub mod lowering;
pub mod smt;
pub mod ssa;
pub mod symbolic_execution;
pub mod value_set;
