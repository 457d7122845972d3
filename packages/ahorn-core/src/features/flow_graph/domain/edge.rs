//! CFG edges

use super::cfg::Label;

/// Closed set of edge types. An interprocedural return edge names the
/// caller and the label of the originating call so that returns are
/// realizable-path-exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Intraprocedural,
    IntraproceduralCallToReturn,
    InterproceduralCall,
    InterproceduralReturn,
    TrueBranch,
    FalseBranch,
}

impl EdgeKind {
    pub fn is_interprocedural(&self) -> bool {
        matches!(
            self,
            EdgeKind::InterproceduralCall | EdgeKind::InterproceduralReturn
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: Label,
    pub target: Label,
    pub kind: EdgeKind,
    /// Caller CFG name, return edges only
    pub caller: Option<String>,
    /// Label of the originating call in the caller, return edges only
    pub call_label: Option<Label>,
}

impl Edge {
    pub fn new(source: Label, target: Label, kind: EdgeKind) -> Self {
        Self {
            source,
            target,
            kind,
            caller: None,
            call_label: None,
        }
    }

    pub fn interprocedural_return(
        source: Label,
        target: Label,
        caller: impl Into<String>,
        call_label: Label,
    ) -> Self {
        Self {
            source,
            target,
            kind: EdgeKind::InterproceduralReturn,
            caller: Some(caller.into()),
            call_label: Some(call_label),
        }
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}
