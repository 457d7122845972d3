mod builder;
mod dot;

pub use builder::Builder;
pub use dot::to_dot;

pub(crate) use builder::patch_branch_goto_targets;
