mod explorer;

pub use explorer::{Coverage, Explorer};
