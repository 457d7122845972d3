//! Procedure summaries
//!
//! A summary captures one realizable path through a procedure: the
//! entry and exit assumption literals, the chain of intermediate
//! literals, the assumptions and hard constraints implied by each,
//! and a re-versioned variable naming where every flattened name
//! starts at version 0 on entry and increments per assignment along
//! the path.

use std::collections::BTreeMap;

use crate::features::smt::TermId;

use super::name::AssumptionLiteral;

/// Scope-independent re-versioned constant name of a summary
pub fn reversioned_name(relative_path: &str, version: u32) -> String {
    format!("sum::{}::{}", relative_path, version)
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub entry_literal: AssumptionLiteral,
    pub exit_literal: AssumptionLiteral,
    /// Entry-to-exit literal chain, including both ends
    pub literals: Vec<AssumptionLiteral>,
    pub assumptions: BTreeMap<AssumptionLiteral, Vec<TermId>>,
    /// Re-versioned name and definition per literal, in path order
    pub hard_constraints: BTreeMap<AssumptionLiteral, Vec<(String, TermId)>>,
    /// Entry reads: relative path and its version-0 constant name
    pub inputs: Vec<(String, String)>,
    /// Outputs: relative path and its final constant name
    pub outputs: Vec<(String, String)>,
}

impl Summary {
    /// Whether the summary involves the given literal; pruning drops
    /// every summary sharing a failing literal
    pub fn involves(&self, literal: &AssumptionLiteral) -> bool {
        self.literals.contains(literal)
    }
}
