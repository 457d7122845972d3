//! SMT façade
//!
//! A thin wrapper over a first-order theory of booleans and signed
//! 32-bit integers. Terms are hash-consed into a pool, so structural
//! equality is id equality. The built-in decision procedure combines
//! DPLL over the boolean atom skeleton with interval propagation over
//! linear integer atoms; `Sat` answers are model-verified by
//! evaluation, non-conclusive outcomes surface as `Unknown`.

pub mod domain;
pub mod infrastructure;

pub use domain::{Sort, Term, TermId, Value};
pub use infrastructure::{Model, SatResult, SmtContext};
