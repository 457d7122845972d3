mod term;

pub use term::{Sort, Term, TermId, Value};
