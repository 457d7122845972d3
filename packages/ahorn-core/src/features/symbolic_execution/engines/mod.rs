//! Top-level engines
//!
//! Five engines differing only in wiring: baseline (single-path
//! concrete plus symbolic), compositional (executor, explorer,
//! merger, summarizer, VC generation), cbmc-style (global
//! assumption-literal encoding, one check at the budget),
//! over-approximating (symbolic only), and shadow (two-phase
//! divergence finding plus a simulator comparison).

mod engine;
mod shadow;
mod simulator;

pub use engine::{CheckOutcome, Engine, Report, Termination};
pub use shadow::{OutputDifference, ShadowEngine, ShadowReport};
pub use simulator::{SimulationResult, Simulator};
