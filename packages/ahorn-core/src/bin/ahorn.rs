//! Ahorn command-line driver
//!
//! One input file (a JSON-serialized project handed over by the
//! front-end) and one analysis family: `sa` runs the value-set
//! pre-pass over the SSA-form CFG, `cse` compositional symbolic
//! execution, `sse` shadow symbolic execution over a test suite, and
//! `cbmc` the cycle-bounded encoding.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ahorn_core::config::{Configuration, EngineMode, ExplorationHeuristic};
use ahorn_core::errors::{AhornError, Result};
use ahorn_core::features::flow_graph::{to_dot, Builder, CfgRef};
use ahorn_core::features::lowering::{BasicBlockPass, CallTransformationPass, TacPass};
use ahorn_core::features::ssa::SsaPass;
use ahorn_core::features::symbolic_execution::engines::{Engine, ShadowEngine};
use ahorn_core::features::value_set::Analyzer;
use ahorn_core::shared::models::Project;

#[derive(Parser)]
#[command(name = "ahorn", about = "Symbolic execution for cyclic control programs")]
struct Cli {
    /// Input file: a JSON project produced by the front-end
    input_file: PathBuf,

    /// Write a dot rendition of the CFG to this path
    #[arg(long = "to-dot")]
    to_dot: Option<PathBuf>,

    /// Cycle bound of the outer loop
    #[arg(long = "cycle-bound", default_value_t = 10)]
    cycle_bound: u32,

    /// Wall-clock time-out in milliseconds
    #[arg(long = "time-out", default_value_t = 10_000)]
    time_out: u64,

    /// Labels the value-set pre-pass proved unreachable
    #[arg(long = "unreachable-labels", num_args = 0.., value_delimiter = ',')]
    unreachable_labels: Vec<u32>,

    /// Unreachable branches as label_tt or label_ff
    #[arg(long = "unreachable-branches", num_args = 0.., value_delimiter = ',')]
    unreachable_branches: Vec<String>,

    /// Diagnostic verbosity: trace or info
    #[arg(long)]
    verbose: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Value-set analysis over the SSA-form CFG
    Sa,
    /// Compositional symbolic execution
    Cse {
        /// Exploration strategy: depth-first or breadth-first
        #[arg(long = "exploration-strategy")]
        exploration_strategy: Option<String>,
        /// Directory receiving one XML file per derived test case
        #[arg(long = "generate-test-suite")]
        generate_test_suite: Option<PathBuf>,
    },
    /// Shadow symbolic execution over a test suite
    Sse {
        /// Path to the test-suite directory
        #[arg(long = "test-suite")]
        test_suite: PathBuf,
    },
    /// Cycle-bounded model-checking encoding
    Cbmc,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose.as_deref() {
        Some("trace") => "ahorn_core=trace",
        Some("info") => "ahorn_core=info",
        Some(other) => {
            eprintln!("invalid verbosity level: {}", other);
            return ExitCode::FAILURE;
        }
        None => "off",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", error);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let source = std::fs::read_to_string(&cli.input_file)?;
    let project = Project::from_json(&source)?;
    let cfg = Builder::new(&project).build()?;

    if let Some(path) = &cli.to_dot {
        std::fs::write(path, to_dot(&cfg))?;
    }

    match &cli.command {
        Command::Sa => value_set_analysis(&cfg),
        Command::Cse {
            exploration_strategy,
            generate_test_suite,
        } => {
            let mut config = configuration(&cli, EngineMode::Compositional)?;
            if let Some(strategy) = exploration_strategy {
                config.exploration_heuristic = match strategy.as_str() {
                    "depth-first" => ExplorationHeuristic::DepthFirst,
                    "breadth-first" => ExplorationHeuristic::BreadthFirst,
                    other => {
                        return Err(AhornError::Usage(format!(
                            "invalid exploration strategy: {}",
                            other
                        )))
                    }
                };
            }
            config.generate_test_suite = generate_test_suite.clone();
            let mut engine = Engine::new(config);
            let report = engine.run(&cfg)?;
            print_report(&report);
            Ok(())
        }
        Command::Sse { test_suite } => {
            let config = configuration(&cli, EngineMode::Shadow)?;
            let mut engine = ShadowEngine::new(config);
            let report = engine.run(&cfg, test_suite)?;
            println!(
                "phase 1: {} divergent contexts from {} change-traversing test cases",
                report.divergent_contexts, report.change_traversing_test_cases
            );
            println!("phase 2: {} derived test cases", report.derived_test_cases);
            for difference in &report.differences {
                println!(
                    "output {} differs in cycle {}: old = {}, new = {}",
                    difference.variable, difference.cycle, difference.old, difference.new
                );
            }
            println!("elapsed: {}ms", report.elapsed_ms);
            Ok(())
        }
        Command::Cbmc => {
            let config = configuration(&cli, EngineMode::CycleBoundedEncoding)?;
            let mut engine = Engine::new(config);
            let report = engine.run(&cfg)?;
            print_report(&report);
            Ok(())
        }
    }
}

fn value_set_analysis(cfg: &CfgRef) -> Result<()> {
    let grouped = BasicBlockPass::new().apply(cfg)?;
    let tac = TacPass::new().apply(&grouped)?;
    let transformed = CallTransformationPass::new().apply(&tac)?;
    let ssa = SsaPass::new().apply(&transformed)?;
    let result = Analyzer::new().analyze(&ssa)?;
    println!("unreachable labels:");
    for label in &result.unreachable_labels {
        println!("  {}", label);
    }
    println!("unreachable branches:");
    for (label, direction) in &result.unreachable_branches {
        println!("  {}_{}", label, if *direction { "tt" } else { "ff" });
    }
    Ok(())
}

fn configuration(cli: &Cli, engine_mode: EngineMode) -> Result<Configuration> {
    let mut config = Configuration::new(engine_mode);
    config.cycle_bound = cli.cycle_bound;
    config.time_out_ms = cli.time_out;
    config.unreachable_labels = cli.unreachable_labels.clone();
    for branch in &cli.unreachable_branches {
        let (label, direction) = branch.rsplit_once('_').ok_or_else(|| {
            AhornError::Usage(format!("invalid unreachable branch: {}", branch))
        })?;
        let label = label
            .parse::<u32>()
            .map_err(|_| AhornError::Usage(format!("invalid unreachable branch: {}", branch)))?;
        let direction = match direction {
            "tt" => true,
            "ff" => false,
            _ => {
                return Err(AhornError::Usage(format!(
                    "invalid unreachable branch: {}",
                    branch
                )))
            }
        };
        config.unreachable_branches.push((label, direction));
    }
    Ok(config)
}

fn print_report(report: &ahorn_core::features::symbolic_execution::engines::Report) {
    println!("termination: {:?}", report.termination);
    println!("completed cycles: {}", report.completed_cycles);
    println!(
        "coverage: statements {:.2}, branches {:.2}",
        report.statement_coverage, report.branch_coverage
    );
    println!(
        "test cases: {} derived, {} failing",
        report.derived_test_cases, report.failing_test_cases
    );
    if let Some(outcome) = &report.check_outcome {
        println!("encoding check: {:?}", outcome);
    }
    println!("elapsed: {}ms", report.elapsed_ms);
}
