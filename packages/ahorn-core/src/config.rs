//! Engine configuration

use std::path::PathBuf;

use crate::features::flow_graph::Label;

/// Which top-level engine is wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Per-cycle single-path concrete and symbolic execution
    Baseline,
    /// Executor, explorer, merger, summarizer, and VC generation
    Compositional,
    /// Global assumption-literal encoding, one check at the budget
    CycleBoundedEncoding,
    /// Symbolic only, no concrete store
    OverApproximating,
    /// Two-phase divergence-finding over two program versions
    Shadow,
}

/// How the executor decides at branch vertices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkPolicy {
    /// Follow the concrete side only
    Never,
    /// Follow the concrete side, fork the other when satisfiable
    Check,
    /// Enqueue every feasible side, no concrete guidance
    Both,
}

/// Shadow processing mode of encoder and evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowProcessingMode {
    #[default]
    Old,
    New,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExplorationHeuristic {
    DepthFirst,
    #[default]
    BreadthFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    #[default]
    AtAllJoinPoints,
    OnlyAtCycleEnd,
}

/// Engine configuration; defaults mirror the CLI defaults
#[derive(Debug, Clone)]
pub struct Configuration {
    pub engine_mode: EngineMode,
    pub cycle_bound: u32,
    pub time_out_ms: u64,
    pub exploration_heuristic: ExplorationHeuristic,
    pub merge_strategy: MergeStrategy,
    /// Enable verification-condition tables and summaries
    pub summarization: bool,
    pub shadow_processing_mode: ShadowProcessingMode,
    pub rng_seed: u64,
    pub unreachable_labels: Vec<Label>,
    /// (label, direction), `true` names the true branch
    pub unreachable_branches: Vec<(Label, bool)>,
    /// Directory receiving one XML file per derived test case
    pub generate_test_suite: Option<PathBuf>,
    /// Overrides the mode-derived fork policy; the shadow engine's
    /// concolic phase follows the test case only
    pub fork_policy_override: Option<ForkPolicy>,
}

impl Configuration {
    pub fn new(engine_mode: EngineMode) -> Self {
        Self {
            engine_mode,
            cycle_bound: 10,
            time_out_ms: 10_000,
            exploration_heuristic: ExplorationHeuristic::default(),
            merge_strategy: MergeStrategy::default(),
            summarization: engine_mode == EngineMode::Compositional,
            shadow_processing_mode: ShadowProcessingMode::default(),
            rng_seed: 0,
            unreachable_labels: Vec::new(),
            unreachable_branches: Vec::new(),
            generate_test_suite: None,
            fork_policy_override: None,
        }
    }

    /// Whether verification-condition tables are maintained
    pub fn vc_encoding(&self) -> bool {
        matches!(
            self.engine_mode,
            EngineMode::Compositional | EngineMode::CycleBoundedEncoding
        )
    }

    /// Whether a concrete store drives branch decisions
    pub fn concrete_execution(&self) -> bool {
        self.engine_mode != EngineMode::OverApproximating
    }

    pub fn fork_policy(&self) -> ForkPolicy {
        if let Some(policy) = self.fork_policy_override {
            return policy;
        }
        match self.engine_mode {
            EngineMode::Baseline => ForkPolicy::Never,
            EngineMode::Compositional | EngineMode::Shadow => ForkPolicy::Check,
            EngineMode::CycleBoundedEncoding | EngineMode::OverApproximating => ForkPolicy::Both,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_wiring() {
        let cse = Configuration::new(EngineMode::Compositional);
        assert!(cse.vc_encoding());
        assert!(cse.summarization);
        assert_eq!(cse.fork_policy(), ForkPolicy::Check);

        let baseline = Configuration::new(EngineMode::Baseline);
        assert!(!baseline.vc_encoding());
        assert_eq!(baseline.fork_policy(), ForkPolicy::Never);

        let oa = Configuration::new(EngineMode::OverApproximating);
        assert!(!oa.concrete_execution());
    }
}
