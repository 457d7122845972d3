//! Summarizer
//!
//! On procedure exit, all realizable paths are reconstructed by
//! walking backwards from the exit literal through the
//! predecessor-literal sets; each path yields one candidate summary.
//! On procedure entry, a cached summary is probed for applicability
//! under the concretised input valuations; a satisfiable probe reuses
//! the summary and installs its outputs, an unsatisfiable one prunes
//! the summary and every other summary sharing the failing literal.

use std::num::NonZeroUsize;

use lru::LruCache;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::errors::Result;
use crate::features::flow_graph::Cfg;
use crate::features::smt::{SatResult, SmtContext, TermId, Value};
use crate::shared::models::Section;

use super::context::{Context, State};
use super::name::{AssumptionLiteral, ContextualizedName};
use super::summary::{reversioned_name, Summary};

/// Result of an applicability probe
#[derive(Debug)]
pub enum SummaryProbe {
    NotApplicable,
    /// Output valuations to install, relative path and value
    Applicable(Vec<(String, Value)>),
    Unknown,
}

const CACHE_CAPACITY: usize = 64;
const MAX_PATHS_PER_EXIT: usize = 8;
const MAX_SUMMARIES_PER_PROCEDURE: usize = 16;

pub struct Summarizer {
    summaries: LruCache<String, Vec<Summary>>,
}

impl Summarizer {
    pub fn new() -> Self {
        Self {
            summaries: LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("capacity is non-zero"),
            ),
        }
    }

    pub fn summary_count(&self, type_representative_name: &str) -> usize {
        self.summaries
            .peek(type_representative_name)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Probe the cached summaries of a callee under the current
    /// concrete entry valuations
    pub fn find_applicable(
        &mut self,
        smt: &mut SmtContext,
        state: &State,
        callee: &Cfg,
        scope: &str,
        cycle: u32,
    ) -> Result<SummaryProbe> {
        let summaries = match self.summaries.get(callee.name()) {
            Some(summaries) if !summaries.is_empty() => summaries.clone(),
            _ => return Ok(SummaryProbe::NotApplicable),
        };

        // concretised entry valuations of the callee instance
        let mut entry_values: FxHashMap<String, Value> = FxHashMap::default();
        for variable in callee.flattened_interface() {
            let flattened = format!("{}.{}", scope, variable.path);
            let version = state.highest_version(&flattened);
            let name = ContextualizedName::new(flattened, version, cycle);
            if let Some(value) = state.concrete_value(&name) {
                entry_values.insert(variable.path.clone(), value);
            }
        }

        let mut pruned: Vec<AssumptionLiteral> = Vec::new();
        for summary in &summaries {
            if pruned.iter().any(|literal| summary.involves(literal)) {
                continue;
            }
            let query = self.applicability_query(smt, summary, &entry_values);
            match smt.check(&query) {
                SatResult::Sat(model) => {
                    trace!(callee = callee.name(), "summary applicable");
                    let mut outputs = Vec::new();
                    for (path, constant) in &summary.outputs {
                        if let Some(value) = model.get(constant) {
                            outputs.push((path.clone(), *value));
                        } else if let Some(value) = entry_values.get(path) {
                            outputs.push((path.clone(), *value));
                        }
                    }
                    return Ok(SummaryProbe::Applicable(outputs));
                }
                SatResult::Unsat => {
                    if let Some(literal) = self.failing_literal(smt, summary, &entry_values) {
                        trace!(
                            callee = callee.name(),
                            literal = %literal,
                            "pruning summaries sharing the failing literal"
                        );
                        pruned.push(literal);
                    }
                }
                SatResult::Unknown => return Ok(SummaryProbe::Unknown),
            }
        }

        if !pruned.is_empty() {
            if let Some(cached) = self.summaries.get_mut(callee.name()) {
                cached.retain(|summary| {
                    !pruned.iter().any(|literal| summary.involves(literal))
                });
            }
        }
        Ok(SummaryProbe::NotApplicable)
    }

    /// Encode the control-flow chain, each assumption and each hard
    /// constraint as implications from their literals, concretise the
    /// inputs, and assert the exit literal
    fn applicability_query(
        &self,
        smt: &mut SmtContext,
        summary: &Summary,
        entry_values: &FxHashMap<String, Value>,
    ) -> Vec<TermId> {
        let mut query = Vec::new();
        for window in summary.literals.windows(2) {
            let previous = smt.mk_boolean_constant(&window[0].to_string());
            let next = smt.mk_boolean_constant(&window[1].to_string());
            query.push(smt.mk_implies(next, previous));
        }
        for (literal, assumptions) in &summary.assumptions {
            let guard = smt.mk_boolean_constant(&literal.to_string());
            for &assumption in assumptions {
                query.push(smt.mk_implies(guard, assumption));
            }
        }
        for (literal, constraints) in &summary.hard_constraints {
            let guard = smt.mk_boolean_constant(&literal.to_string());
            for (name, definition) in constraints {
                let sort = smt.sort_of(*definition);
                let constant = smt.mk_sorted_constant(name, sort);
                let equation = smt.mk_eq(constant, *definition);
                query.push(smt.mk_implies(guard, equation));
            }
        }
        for (path, constant_name) in &summary.inputs {
            if let Some(value) = entry_values.get(path) {
                let literal = smt.mk_literal(*value);
                let constant = smt.mk_sorted_constant(constant_name, value.sort());
                query.push(smt.mk_eq(constant, literal));
            }
        }
        let exit = smt.mk_boolean_constant(&summary.exit_literal.to_string());
        query.push(exit);
        query
    }

    /// First literal along the chain whose assumptions alone
    /// contradict the entry valuations
    fn failing_literal(
        &self,
        smt: &mut SmtContext,
        summary: &Summary,
        entry_values: &FxHashMap<String, Value>,
    ) -> Option<AssumptionLiteral> {
        let mut query: Vec<TermId> = Vec::new();
        for (path, constant_name) in &summary.inputs {
            if let Some(value) = entry_values.get(path) {
                let literal = smt.mk_literal(*value);
                let constant = smt.mk_sorted_constant(constant_name, value.sort());
                query.push(smt.mk_eq(constant, literal));
            }
        }
        for literal in &summary.literals {
            if let Some(constraints) = summary.hard_constraints.get(literal) {
                for (name, definition) in constraints {
                    let sort = smt.sort_of(*definition);
                    let constant = smt.mk_sorted_constant(name, sort);
                    query.push(smt.mk_eq(constant, *definition));
                }
            }
            if let Some(assumptions) = summary.assumptions.get(literal) {
                query.extend(assumptions.iter().copied());
            }
            if matches!(smt.check(&query), SatResult::Unsat) {
                return Some(literal.clone());
            }
        }
        None
    }

    /// Construct and cache the summaries of the procedure the context
    /// is about to leave
    pub fn summarize(&mut self, smt: &mut SmtContext, context: &Context) -> Result<()> {
        let frame = context.frame();
        let cfg = frame.cfg().clone();
        let scope = frame.scope().to_string();
        let cycle = context.cycle();
        let state = context.state();

        let entry_literal = AssumptionLiteral::new(scope.clone(), cfg.entry_label(), cycle);
        let exit_literal = match state.assumption_literal() {
            Some(literal) => literal.clone(),
            None => return Ok(()), // no VC tables, nothing to summarize
        };

        let paths = literal_paths(state, &entry_literal, &exit_literal, &scope, cycle);
        for path in paths {
            let summary = self.summarize_path(smt, state, &cfg, &scope, &path);
            if self.summaries.get(cfg.name()).is_none() {
                self.summaries.put(cfg.name().to_string(), Vec::new());
            }
            let cached = self
                .summaries
                .get_mut(cfg.name())
                .expect("summary list present");
            let duplicate = cached.iter().any(|existing| {
                existing.entry_literal == summary.entry_literal
                    && existing.exit_literal == summary.exit_literal
                    && existing.literals == summary.literals
            });
            if !duplicate && cached.len() < MAX_SUMMARIES_PER_PROCEDURE {
                trace!(procedure = cfg.name(), "caching summary");
                cached.push(summary);
            }
        }
        Ok(())
    }

    /// Re-version one path into a scope-independent summary
    fn summarize_path(
        &self,
        smt: &mut SmtContext,
        state: &State,
        cfg: &Cfg,
        scope: &str,
        path: &[AssumptionLiteral],
    ) -> Summary {
        let prefix = format!("{}.", scope);
        // relative path -> current re-version and constant
        let mut versions: FxHashMap<String, u32> = FxHashMap::default();
        let mut mapping: FxHashMap<String, TermId> = FxHashMap::default();
        let mut inputs: Vec<(String, String)> = Vec::new();
        let mut last_constant: FxHashMap<String, String> = FxHashMap::default();

        let mut assumptions = std::collections::BTreeMap::new();
        let mut hard_constraints = std::collections::BTreeMap::new();

        for literal in path {
            if let Some(terms) = state.assumptions().get(literal) {
                let rewritten: Vec<TermId> = terms
                    .iter()
                    .map(|&term| {
                        rewrite(
                            smt,
                            term,
                            &prefix,
                            &mut versions,
                            &mut mapping,
                            &mut inputs,
                            &mut last_constant,
                        )
                    })
                    .collect();
                if !rewritten.is_empty() {
                    assumptions.insert(literal.clone(), rewritten);
                }
            }
            if let Some(constraints) = state.hard_constraints().get(literal) {
                let mut rewritten: Vec<(String, TermId)> = Vec::new();
                for (name, &definition) in constraints {
                    if !name.flattened.starts_with(&prefix) {
                        continue;
                    }
                    let definition = rewrite(
                        smt,
                        definition,
                        &prefix,
                        &mut versions,
                        &mut mapping,
                        &mut inputs,
                        &mut last_constant,
                    );
                    let relative = name.flattened[prefix.len()..].to_string();
                    let version = versions.entry(relative.clone()).or_insert(0);
                    *version += 1;
                    let fresh = reversioned_name(&relative, *version);
                    let sort = smt.sort_of(definition);
                    let constant = smt.mk_sorted_constant(&fresh, sort);
                    mapping.insert(name.to_string(), constant);
                    last_constant.insert(relative, fresh.clone());
                    rewritten.push((fresh, definition));
                }
                if !rewritten.is_empty() {
                    hard_constraints.insert(literal.clone(), rewritten);
                }
            }
        }

        let outputs = cfg
            .flattened_interface()
            .iter()
            .filter(|v| v.section == Section::Output)
            .filter_map(|v| {
                last_constant
                    .get(&v.path)
                    .map(|constant| (v.path.clone(), constant.clone()))
            })
            .collect();

        Summary {
            entry_literal: path.first().cloned().expect("paths are non-empty"),
            exit_literal: path.last().cloned().expect("paths are non-empty"),
            literals: path.to_vec(),
            assumptions,
            hard_constraints,
            inputs,
            outputs,
        }
    }
}

impl Default for Summarizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite a term into the summary namespace: every contextualized
/// constant of the summarized scope maps onto its re-versioned
/// constant; first reads become version-0 inputs
#[allow(clippy::too_many_arguments)]
fn rewrite(
    smt: &mut SmtContext,
    term: TermId,
    prefix: &str,
    versions: &mut FxHashMap<String, u32>,
    mapping: &mut FxHashMap<String, TermId>,
    inputs: &mut Vec<(String, String)>,
    last_constant: &mut FxHashMap<String, String>,
) -> TermId {
    let constants = smt.uninterpreted_constants(term);
    let mut rewritten = term;
    for (name, sort) in constants.iter() {
        let contextualized = match ContextualizedName::parse(name) {
            Some(contextualized) => contextualized,
            None => continue,
        };
        if !contextualized.flattened.starts_with(prefix) {
            continue;
        }
        let replacement = match mapping.get(name) {
            Some(&replacement) => replacement,
            None => {
                // an entry read: version 0 of the relative name
                let relative = contextualized.flattened[prefix.len()..].to_string();
                versions.entry(relative.clone()).or_insert(0);
                let fresh = reversioned_name(&relative, 0);
                let constant = smt.mk_sorted_constant(&fresh, *sort);
                inputs.push((relative.clone(), fresh.clone()));
                last_constant.entry(relative).or_insert(fresh);
                mapping.insert(name.clone(), constant);
                constant
            }
        };
        let original = smt.mk_sorted_constant(name, *sort);
        rewritten = smt.substitute(rewritten, original, replacement);
    }
    rewritten
}

/// All literal paths from entry to exit within one scope and cycle,
/// reconstructed backwards through the predecessor sets
fn literal_paths(
    state: &State,
    entry: &AssumptionLiteral,
    exit: &AssumptionLiteral,
    scope: &str,
    cycle: u32,
) -> Vec<Vec<AssumptionLiteral>> {
    let mut paths = Vec::new();
    let mut stack = vec![vec![exit.clone()]];
    while let Some(path) = stack.pop() {
        if paths.len() >= MAX_PATHS_PER_EXIT {
            break;
        }
        let current = path.last().expect("paths are non-empty");
        if current == entry {
            let mut forward = path.clone();
            forward.reverse();
            paths.push(forward);
            continue;
        }
        let predecessors = match state.assumption_literals().get(current) {
            Some(predecessors) => predecessors,
            None => continue,
        };
        for predecessor in predecessors {
            if predecessor.scope != scope || predecessor.cycle != cycle {
                continue;
            }
            if path.contains(predecessor) {
                continue; // cycle in the literal graph
            }
            let mut extended = path.clone();
            extended.push(predecessor.clone());
            stack.push(extended);
        }
    }
    paths
}
