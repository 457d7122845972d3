mod context;
mod linear;
mod solver;

pub use context::SmtContext;
pub use solver::{Model, SatResult};
