//! Test cases
//!
//! A test case is an initial valuation of the program state plus one
//! input valuation per cycle for the whole-program inputs. The
//! simulator fills in output valuations and the execution history
//! when it replays a test case.

use std::collections::BTreeMap;

use crate::features::flow_graph::{Cfg, Label};
use crate::features::smt::Value;
use crate::shared::models::Section;

use super::context::Context;
use super::name::ContextualizedName;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCase {
    /// Initial valuations of the flattened state variables
    pub initialization: BTreeMap<String, Value>,
    /// Per-cycle valuations of the whole-program inputs
    pub inputs: BTreeMap<u32, BTreeMap<String, Value>>,
    /// Per-cycle output valuations, filled by the simulator
    pub outputs: BTreeMap<u32, BTreeMap<String, Value>>,
    /// Per-cycle visited labels, filled by the simulator
    pub execution_history: BTreeMap<u32, Vec<Label>>,
}

impl TestCase {
    /// Highest cycle for which inputs exist
    pub fn last_cycle(&self) -> u32 {
        self.inputs.keys().next_back().copied().unwrap_or(0)
    }

    /// Whether the replayed execution visited any of the given labels
    pub fn touches(&self, labels: &std::collections::BTreeSet<Label>) -> bool {
        self.execution_history
            .values()
            .any(|visited| visited.iter().any(|label| labels.contains(label)))
    }

    /// Same stimulus, ignoring replay artefacts
    pub fn same_stimulus(&self, other: &TestCase) -> bool {
        self.initialization == other.initialization && self.inputs == other.inputs
    }

    /// Derive a test case from a context: the minimum-version
    /// concrete valuation of every whole-program input, per cycle up
    /// to the context's cycle, plus the initial state valuations
    pub fn from_context(context: &Context, program: &Cfg) -> Self {
        let scope = program.name();
        let state = context.state();
        let mut test_case = TestCase::default();

        for variable in program.flattened_interface() {
            let flattened = format!("{}.{}", scope, variable.path);
            let is_input = variable.section == Section::Input && variable.top_level;
            if is_input {
                for cycle in 0..=context.cycle() {
                    let version = state
                        .lowest_version_in_cycle(&flattened, cycle)
                        .unwrap_or(0);
                    let name = ContextualizedName::new(flattened.clone(), version, cycle);
                    if let Some(value) = state.concrete_value(&name) {
                        test_case
                            .inputs
                            .entry(cycle)
                            .or_default()
                            .insert(flattened.clone(), value);
                    }
                }
            } else {
                let name = ContextualizedName::new(flattened.clone(), 0, 0);
                if let Some(value) = state.concrete_value(&name) {
                    test_case.initialization.insert(flattened.clone(), value);
                }
            }
        }
        test_case
    }
}
