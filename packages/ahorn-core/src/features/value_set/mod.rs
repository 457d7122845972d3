//! Value-set pre-pass
//!
//! Top-down interprocedural forward analysis over an interval domain.
//! The only output the engines consume is the list of unreachable
//! labels and unreachable branches, which seed the explorer's
//! coverage map.

mod analyzer;
mod interval;

pub use analyzer::{Analyzer, ValueSetResult};
pub use interval::AbstractInterval;
