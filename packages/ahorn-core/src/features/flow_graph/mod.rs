//! Control flow graphs
//!
//! One CFG per module with interprocedural call/return edges linking
//! callee CFGs by name. The builder lowers the structured IR into
//! vertices and edges; callee CFGs are built first and recursion is
//! rejected up front.

pub mod domain;
pub mod infrastructure;

pub use domain::{Cfg, CfgKind, CfgRef, Edge, EdgeKind, FlattenedVariable, Label, Vertex, VertexKind};
pub use infrastructure::{to_dot, Builder};

pub(crate) use infrastructure::patch_branch_goto_targets;
