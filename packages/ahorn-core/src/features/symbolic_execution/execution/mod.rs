mod divergence_executor;
mod encoder;
mod evaluator;
mod executor;

pub use divergence_executor::DivergenceExecutor;
pub(crate) use divergence_executor::apply_cycle_inputs;
pub use encoder::encode;
pub use evaluator::evaluate;
pub use executor::{Execution, ExecutionStatus, Executor};
