//! Merger
//!
//! Owns the set of merge points, tuples of scope, depth, label, and
//! return label, computed statically from the CFG: every vertex with
//! more than one incoming intraprocedural edge plus every procedure
//! exit. Queued contexts of the deepest non-empty bucket are folded
//! pairwise: the merged path constraint is the disjunction, and every
//! flattened variable whose highest symbolic expressions differ gets
//! a fresh version bound to `ite(pc1, v1, v2)`.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::config::MergeStrategy;
use crate::errors::{AhornError, Result};
use crate::features::flow_graph::{Cfg, Label};
use crate::features::smt::SmtContext;

use super::context::Context;
use super::execution::Executor;
use super::name::ContextualizedName;

/// (depth, scope, label, return label); ordering puts the deepest
/// buckets last so `merge` can pop them first
type MergePoint = (usize, String, Label, Label);

pub struct Merger {
    strategy: MergeStrategy,
    merge_points: FxHashSet<MergePoint>,
    pending: BTreeMap<MergePoint, Vec<Context>>,
}

impl Merger {
    pub fn new(strategy: MergeStrategy) -> Self {
        Self {
            strategy,
            merge_points: FxHashSet::default(),
            pending: BTreeMap::new(),
        }
    }

    /// Compute the merge points of the program CFG and all callees
    pub fn initialize(&mut self, cfg: &Cfg) {
        self.merge_points.clear();
        self.pending.clear();
        let mut visited = FxHashSet::default();
        self.initialize_merge_points(cfg, cfg.name(), 1, cfg.entry_label(), &mut visited);
    }

    fn initialize_merge_points(
        &mut self,
        cfg: &Cfg,
        scope: &str,
        depth: usize,
        return_label: Label,
        visited: &mut FxHashSet<String>,
    ) {
        if !visited.insert(scope.to_string()) {
            return;
        }
        for vertex in cfg.vertices() {
            let label = vertex.label();
            let incoming = cfg
                .incoming_edges(label)
                .iter()
                .filter(|e| !e.kind.is_interprocedural())
                .count();
            if incoming > 1 || label == cfg.exit_label() {
                self.merge_points
                    .insert((depth, scope.to_string(), label, return_label));
            }
        }
        for vertex in cfg.vertices() {
            if let Some(crate::shared::models::Instruction::Call { callee, .. }) =
                vertex.instruction()
            {
                if let (Ok(callee_cfg), Ok(edge)) = (
                    cfg.callee(vertex.label()),
                    cfg.call_to_return_edge(vertex.label()),
                ) {
                    let callee_scope = format!("{}.{}", scope, callee.path());
                    self.initialize_merge_points(
                        &callee_cfg,
                        &callee_scope,
                        depth + 1,
                        edge.target,
                        visited,
                    );
                }
            }
        }
    }

    fn merge_point_of(&self, context: &Context) -> MergePoint {
        (
            context.depth(),
            context.frame().scope().to_string(),
            context.state().label(),
            context.frame().return_label(),
        )
    }

    /// Constant-time membership test
    pub fn reached_merge_point(&self, context: &Context) -> bool {
        if self.strategy == MergeStrategy::OnlyAtCycleEnd {
            let exit = context.frame().cfg().exit_label();
            return context.state().label() == exit;
        }
        self.merge_points.contains(&self.merge_point_of(context))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.values().all(Vec::is_empty)
    }

    pub fn push(&mut self, context: Context) {
        let point = self.merge_point_of(&context);
        self.pending.entry(point).or_default().push(context);
    }

    /// Fold the deepest non-empty bucket into one context
    pub fn merge(&mut self, smt: &mut SmtContext, executor: &mut Executor) -> Result<Option<Context>> {
        let point = match self
            .pending
            .iter()
            .rev()
            .find(|(_, contexts)| !contexts.is_empty())
            .map(|(point, _)| point.clone())
        {
            Some(point) => point,
            None => return Ok(None),
        };
        let mut contexts = self.pending.remove(&point).unwrap_or_default();
        trace!(
            scope = %point.1,
            label = point.2,
            count = contexts.len(),
            "merging contexts"
        );
        let mut merged = contexts.remove(0);
        for context in contexts {
            merged = merge_pair(smt, executor, merged, context)?;
        }
        Ok(Some(merged))
    }
}

impl Merger {
    /// Merge two contexts directly; the queue-driven `merge` folds
    /// buckets through this
    pub fn merge_contexts(
        smt: &mut SmtContext,
        executor: &mut Executor,
        first: Context,
        second: Context,
    ) -> Result<Context> {
        merge_pair(smt, executor, first, second)
    }
}

/// Merge two contexts queued at the same merge point
fn merge_pair(
    smt: &mut SmtContext,
    executor: &mut Executor,
    first: Context,
    second: Context,
) -> Result<Context> {
    // frame stacks must agree on scope and return label at every depth
    if first.depth() != second.depth() {
        return Err(AhornError::ir_malformed(
            "merge of contexts at different call depths",
        ));
    }
    for (frame_1, frame_2) in first.frames().iter().zip(second.frames().iter()) {
        if frame_1.scope() != frame_2.scope() || frame_1.return_label() != frame_2.return_label()
        {
            return Err(AhornError::ir_malformed(
                "merge of contexts with incompatible frame stacks",
            ));
        }
    }
    debug_assert_eq!(first.state().label(), second.state().label());
    debug_assert_eq!(first.cycle(), second.cycle());

    // merging two non-empty shadow stores has no defined semantics
    if !first.state().shadow_store().is_empty() && !second.state().shadow_store().is_empty() {
        return Err(AhornError::unsupported(
            "merge of two contexts with non-empty shadow stores",
        ));
    }

    let cycle = first.cycle();
    let pc_1 = smt.mk_and(first.state().path_constraint().iter().copied());
    let pc_2 = smt.mk_and(second.state().path_constraint().iter().copied());

    // the per-branch highest versions, before the union below widens
    // the caches
    let versions_1 = first.state().versions().clone();
    let versions_2 = second.state().versions().clone();

    let mut merged = first;

    // union stores: versions are globally unique, so bindings of the
    // two states never collide on a name with different terms
    merged.state_mut().union_stores(second.state());

    // per flattened variable, keep structurally equal expressions and
    // bind differing ones to a fresh ite version
    let mut names: Vec<String> = versions_1.keys().cloned().collect();
    for name in versions_2.keys() {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names.sort();
    for flattened in names {
        let version_1 = versions_1.get(&flattened).copied().unwrap_or(0);
        let version_2 = versions_2.get(&flattened).copied().unwrap_or(0);
        let name_1 = ContextualizedName::new(flattened.clone(), version_1, cycle);
        let name_2 = ContextualizedName::new(flattened.clone(), version_2, cycle);
        let term_1 = merged.state().symbolic_expression(&name_1);
        let term_2 = second.state().symbolic_expression(&name_2);
        let (term_1, term_2) = match (term_1, term_2) {
            (Some(term_1), Some(term_2)) => (term_1, term_2),
            _ => continue,
        };
        if term_1 == term_2 && version_1 == version_2 {
            // structurally equal in the hash-consed pool
            continue;
        }
        if executor.is_whole_program_input(&flattened) {
            trace!(variable = %flattened, "skipping the merge of a whole-program input");
            continue;
        }
        let sort = smt.sort_of(term_1);
        let constant_1 = smt.mk_sorted_constant(&name_1.to_string(), sort);
        let constant_2 = smt.mk_sorted_constant(&name_2.to_string(), sort);
        let combined = smt.mk_ite(pc_1, constant_1, constant_2);

        let version = executor.version(&flattened) + 1;
        executor.set_version(&flattened, version);
        let fresh = ContextualizedName::new(flattened.clone(), version, cycle);
        // the concrete store defaults to the first branch
        let concrete = merged.state().concrete_value(&name_1);
        let new_value = merged.state().concrete_value_new(&name_1);
        merged
            .state_mut()
            .bind(fresh, combined, concrete, new_value);
    }

    // merged path constraint is the disjunction
    let disjunction = smt.mk_or([pc_1, pc_2]);
    let constraint = if smt.bool_literal(disjunction) == Some(true) {
        Vec::new()
    } else {
        vec![disjunction]
    };
    merged.state_mut().set_path_constraint(constraint);

    // local path constraints are disjoined per frame
    let locals: Vec<Vec<_>> = merged
        .frames()
        .iter()
        .zip(second.frames().iter())
        .map(|(frame_1, frame_2)| {
            let left = smt.mk_and(frame_1.local_path_constraints().iter().copied());
            let right = smt.mk_and(frame_2.local_path_constraints().iter().copied());
            let disjoined = smt.mk_or([left, right]);
            if smt.bool_literal(disjoined) == Some(true) {
                Vec::new()
            } else {
                vec![disjoined]
            }
        })
        .collect();
    for (frame, local) in merged.frames_mut().iter_mut().zip(locals) {
        frame.set_local_path_constraints(local);
    }

    // shadow stores, VC tables and unknown-summary tables are unioned
    merged.state_mut().merge_shadow_store(second.state().shadow_store());
    let second_state = second.state().clone();
    merged.state_mut().absorb_vc_tables(&second_state);

    Ok(merged)
}

