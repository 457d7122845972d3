//! SSA construction
//!
//! On-the-fly SSA after Braun et al., "Simple and Efficient
//! Construction of Static Single Assignment Form" (2013): variables
//! are renamed while walking the CFG, operand-less phi candidates are
//! placed into unsealed blocks and completed on sealing, and trivial
//! phis are removed eagerly, rewriting their users.

mod ssa_pass;

pub use ssa_pass::{ssa_base_name, SsaPass};
