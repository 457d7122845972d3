//! End-to-end scenarios over the engines

mod common;

use ahorn_core::config::{Configuration, EngineMode};
use ahorn_core::features::smt::Value;
use ahorn_core::features::symbolic_execution::engines::{Engine, ShadowEngine, Termination};
use ahorn_core::features::symbolic_execution::{ContextualizedName, TestCase, TestSuite};
use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;

use common::*;

fn lowered_value(
    harness: &mut Harness,
    context: &ahorn_core::features::symbolic_execution::Context,
    name: &ContextualizedName,
    inputs: &[(&str, Value)],
) -> Option<Value> {
    let term = context.state().symbolic_expression(name)?;
    let mut memo = FxHashMap::default();
    let lowered = context.state().lower(&mut harness.smt, term, &mut memo);
    harness.smt.eval(lowered, &|constant, _| {
        inputs
            .iter()
            .find(|(n, _)| *n == constant)
            .map(|(_, v)| *v)
    })
}

#[test]
fn s1_constant_propagation() {
    let project = constant_propagation_project();
    let cfg = build(&project);

    // only the feasible path is executed
    let mut config = Configuration::new(EngineMode::Compositional);
    config.cycle_bound = 1;
    let mut harness = explore(&cfg, &config, 1);
    assert_eq!(harness.finished.len(), 1);
    let context = harness.finished.remove(0);

    // (x, y, z) = (1, 2, 3) at the end of cycle 0, rolled over to
    // the version-0 names of cycle 1
    for (variable, expected) in [("P.x", 1), ("P.y", 2), ("P.z", 3)] {
        let name = ContextualizedName::new(variable, 0, 1);
        assert_eq!(
            context.state().concrete_value(&name),
            Some(Value::Int(expected)),
            "unexpected value of {}",
            variable
        );
    }

    // the if-false branch is infeasible: branch coverage 0.5
    let mut config = Configuration::new(EngineMode::Compositional);
    config.cycle_bound = 1;
    let mut engine = Engine::new(config);
    let report = engine.run(&cfg).unwrap();
    assert_eq!(report.branch_coverage, 0.5);
    assert_eq!(report.termination, Termination::CycleBound);
}

#[test]
fn s2_kuchta_toy_divergence() {
    let project = kuchta_toy_project();
    let cfg = build(&project);

    // seed suite: a = 1, not divergence-exposing by itself
    let directory = tempfile::tempdir().unwrap();
    let mut seed = TestCase::default();
    seed.inputs
        .entry(0)
        .or_default()
        .insert("P.a".to_string(), Value::Int(1));
    let mut suite = TestSuite::new();
    suite.push(seed);
    suite.store(directory.path()).unwrap();

    let mut config = Configuration::new(EngineMode::Shadow);
    config.cycle_bound = 1;
    let mut engine = ShadowEngine::new(config);
    let report = engine.run(&cfg, directory.path()).unwrap();

    // phase 1 finds the divergent input a = 0
    assert_eq!(report.change_traversing_test_cases, 1);
    assert!(report.divergent_contexts >= 1);
    assert!(report.derived_test_cases >= 1);

    // the final comparison reports that x differs: old 1, new 0
    let difference = report
        .differences
        .iter()
        .find(|d| d.variable == "P.x")
        .expect("an output difference on P.x");
    assert_eq!(difference.old, Value::Int(1));
    assert_eq!(difference.new, Value::Int(0));
}

#[test]
fn s3_antivalent_function_block() {
    let project = antivalent_project();
    let cfg = build(&project);

    // cycle 1: q is a and not b, checked semantically over all four
    // input combinations of the merged symbolic store
    let mut config = Configuration::new(EngineMode::Compositional);
    config.cycle_bound = 1;
    let mut harness = explore(&cfg, &config, 1);
    assert_eq!(harness.finished.len(), 1, "all paths merge at the exit");
    let context = harness.finished.remove(0);
    let q = ContextualizedName::new("P.q", 0, 1);
    for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
        let value = lowered_value(
            &mut harness,
            &context,
            &q,
            &[
                ("P.a_0__0", Value::Bool(a)),
                ("P.b_0__0", Value::Bool(b)),
            ],
        );
        assert_eq!(
            value,
            Some(Value::Bool(a && !b)),
            "q must equal a and not b for a = {}, b = {}",
            a,
            b
        );
    }

    // three cycles reach full branch coverage
    let mut config = Configuration::new(EngineMode::Compositional);
    config.cycle_bound = 3;
    let mut engine = Engine::new(config);
    let report = engine.run(&cfg).unwrap();
    assert_eq!(report.branch_coverage, 1.0);
    assert_eq!(report.statement_coverage, 1.0);
}

#[test]
fn s4_summary_reuse() {
    let project = summary_reuse_project();
    let cfg = build(&project);

    let mut config = Configuration::new(EngineMode::Compositional);
    config.cycle_bound = 1;
    let mut harness = explore(&cfg, &config, 1);
    assert_eq!(harness.finished.len(), 1);
    let context = harness.finished.remove(0);

    // one summary was cached after the first call and reused by the
    // second, which yields the same valuations the body would
    let summarizer = harness.executor.summarizer().expect("summarization is on");
    assert_eq!(summarizer.summary_count("Inc"), 1);
    assert_eq!(
        context
            .state()
            .concrete_value(&ContextualizedName::new("P.r1", 0, 1)),
        Some(Value::Int(1))
    );
    assert_eq!(
        context
            .state()
            .concrete_value(&ContextualizedName::new("P.r2", 0, 1)),
        Some(Value::Int(2))
    );
}

#[test]
fn s5_merge_at_join() {
    let project = merge_at_join_project();
    let cfg = build(&project);

    let mut config = Configuration::new(EngineMode::Compositional);
    config.cycle_bound = 1;
    let mut harness = explore(&cfg, &config, 1);
    assert_eq!(harness.finished.len(), 1);
    let context = harness.finished.remove(0);

    // after the merge, z carries ite(a, 1, 2) semantics
    let z = ContextualizedName::new("P.z", 0, 1);
    for a in [true, false] {
        let value = lowered_value(
            &mut harness,
            &context,
            &z,
            &[("P.a_0__0", Value::Bool(a))],
        );
        assert_eq!(value, Some(Value::Int(if a { 1 } else { 2 })));
    }

    // y carries the same merged expression
    let y = ContextualizedName::new("P.y", 0, 1);
    for a in [true, false] {
        let y_value = lowered_value(
            &mut harness,
            &context,
            &y,
            &[("P.a_0__0", Value::Bool(a))],
        );
        let z_value = lowered_value(
            &mut harness,
            &context,
            &z,
            &[("P.a_0__0", Value::Bool(a))],
        );
        assert_eq!(y_value, z_value);
    }
}

#[test]
fn s6_havoc_forks_both_branches() {
    let project = havoc_project();
    let cfg = build(&project);

    let mut config = Configuration::new(EngineMode::Compositional);
    config.cycle_bound = 1;
    config.rng_seed = 11;
    let mut engine = Engine::new(config);
    let report = engine.run(&cfg).unwrap();
    // both branches are feasible under a havoced x
    assert_eq!(report.branch_coverage, 1.0);

    // the concrete values of x in the two contexts lie in distinct
    // half-planes
    let mut config = Configuration::new(EngineMode::Compositional);
    config.cycle_bound = 1;
    config.rng_seed = 11;
    let harness = explore_with(&cfg, &config, 1, false);
    let mut positive = 0;
    let mut non_positive = 0;
    for context in &harness.finished {
        let p = context
            .state()
            .concrete_value(&ContextualizedName::new("P.p", 0, 1));
        match p {
            Some(Value::Bool(true)) => positive += 1,
            Some(Value::Bool(false)) => non_positive += 1,
            other => panic!("unexpected valuation of p: {:?}", other),
        }
    }
    assert!(positive >= 1, "a context with x > 0 exists");
    assert!(non_positive >= 1, "a context with x <= 0 exists");
}
