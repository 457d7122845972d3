mod context;
mod frame;
mod state;

pub use context::Context;
pub use frame::Frame;
pub use state::State;
