//! Code-improving CFG passes
//!
//! All passes consume a CFG and produce a new CFG arena by cloning
//! vertices, rewriting instructions, and re-linking edges; the
//! original is left untouched. Callee CFGs are rebuilt first so the
//! new arena is closed under the callee relation.

mod arena;
mod basic_block;
mod call_transformation;
mod change_annotation;
mod tac;

pub use basic_block::BasicBlockPass;
pub use call_transformation::CallTransformationPass;
pub use change_annotation::ChangeAnnotationCollectionPass;
pub use tac::TacPass;

pub(crate) use arena::{max_label, reachable_callee_first};
pub(crate) use basic_block::merge_arena;
