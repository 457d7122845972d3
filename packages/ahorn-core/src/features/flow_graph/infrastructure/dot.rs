//! Graphviz dot dump of a CFG and its callees

use std::collections::BTreeSet;

use crate::features::flow_graph::domain::{Cfg, EdgeKind, VertexKind};

/// Render the CFG and all transitively referenced callee CFGs as one
/// digraph with a subgraph per CFG. Nodes are labelled
/// `<label>: <instruction>`, edges styled by type.
pub fn to_dot(cfg: &Cfg) -> String {
    let mut out = String::from("digraph {\n");
    let mut visited = BTreeSet::new();
    subgraph(cfg, &mut out, &mut visited);
    out.push_str("}\n");
    out
}

fn subgraph(cfg: &Cfg, out: &mut String, visited: &mut BTreeSet<String>) {
    if !visited.insert(cfg.name().to_string()) {
        return;
    }
    out.push_str(&format!("  subgraph \"cluster_{}\" {{\n", cfg.name()));
    out.push_str(&format!("    label=\"{}\";\n", cfg.name()));
    for vertex in cfg.vertices() {
        let shape = match vertex.kind() {
            VertexKind::Entry | VertexKind::Exit => "ellipse",
            VertexKind::Regular => "box",
        };
        let text = escape(&vertex.to_string());
        out.push_str(&format!(
            "    {} [shape={}, label=\"{}\"];\n",
            vertex.label(),
            shape,
            text
        ));
    }
    out.push_str("  }\n");
    for edge in cfg.edges() {
        let style = match edge.kind {
            EdgeKind::Intraprocedural => "",
            EdgeKind::IntraproceduralCallToReturn => " [style=dotted]",
            EdgeKind::InterproceduralCall | EdgeKind::InterproceduralReturn => " [style=dashed]",
            EdgeKind::TrueBranch => " [label=\"tt\"]",
            EdgeKind::FalseBranch => " [label=\"ff\"]",
        };
        out.push_str(&format!("  {} -> {}{};\n", edge.source, edge.target, style));
    }
    for callee in cfg.callees() {
        subgraph(&callee, out, visited);
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::Builder;
    use crate::shared::models::{
        Expression, Instruction, Interface, Module, ModuleKind, Project,
    };

    #[test]
    fn test_dot_contains_subgraph_and_labels() {
        let project = Project::new(vec![Module::new(
            ModuleKind::Program,
            "P",
            Interface::default(),
            vec![Instruction::assign("x", Expression::IntegerConstant(1))],
        )]);
        let cfg = Builder::new(&project).build().unwrap();
        let dot = to_dot(&cfg);
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("cluster_P"));
        assert!(dot.contains("x := 1"));
    }
}
