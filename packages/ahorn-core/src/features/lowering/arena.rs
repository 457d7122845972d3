//! Arena traversal shared by the passes

use rustc_hash::FxHashSet;

use crate::features::flow_graph::{Cfg, CfgRef, Label};
use crate::shared::models::DataType;

/// CFGs reachable from `program` through derived-type interface
/// variables, callees before callers; the program itself is last and
/// not part of the returned refs (it is the argument).
pub(crate) fn reachable_callee_first(program: &Cfg) -> Vec<CfgRef> {
    let mut order = Vec::new();
    let mut visited = FxHashSet::default();
    visited.insert(program.name().to_string());
    visit(program, &mut order, &mut visited);
    order
}

fn visit(cfg: &Cfg, order: &mut Vec<CfgRef>, visited: &mut FxHashSet<String>) {
    for variable in cfg.interface().variables() {
        if let DataType::Derived { type_name } = &variable.data_type {
            if visited.insert(type_name.clone()) {
                if let Ok(callee) = cfg.cfg(type_name) {
                    visit(&callee, order, visited);
                    order.push(callee);
                }
            }
        }
    }
}

/// Highest label in use across the program CFG and all reachable
/// callees; fresh labels of a pass start above it.
pub(crate) fn max_label(program: &Cfg) -> Label {
    let mut max = program.labels().max().unwrap_or(0);
    for callee in reachable_callee_first(program) {
        max = max.max(callee.labels().max().unwrap_or(0));
    }
    max
}
