//! Ahorn analysis core
//!
//! A symbolic-execution and program-analysis engine for cyclic,
//! PLC-style control programs. Three layers: the IR is lowered into
//! an interprocedural control flow graph with SSA-form variable
//! versioning, forward symbolic execution runs over that graph
//! against an SMT theory of booleans and integers with path forking,
//! merging at join points, procedure summaries and per-cycle state
//! rollover, and a shadow mode compares an old and a new program
//! version to find divergence-exposing inputs.
//!
//! Feature-first layout:
//! - `shared/`   : IR data model (the front-end hands a `Project` over)
//! - `features/` : vertical slices (smt, flow_graph, lowering, ssa,
//!   value_set, symbolic_execution)

pub mod config;
pub mod errors;
pub mod features;
pub mod shared;

pub use config::{Configuration, EngineMode};
pub use errors::{AhornError, Result};

pub use features::flow_graph::{to_dot, Builder, Cfg, CfgRef};
pub use features::symbolic_execution::engines::{Engine, Report, ShadowEngine, ShadowReport};
