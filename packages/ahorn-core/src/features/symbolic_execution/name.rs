//! Contextualized names and assumption literals
//!
//! During symbolic execution every variable instance is named
//! `<flattened>_<version>__<cycle>`. Parsing anchors on the rightmost
//! separators, so flattened names may themselves contain underscores.

use crate::features::flow_graph::Label;

/// Globally unique name of one SSA value in one cycle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextualizedName {
    pub flattened: String,
    pub version: u32,
    pub cycle: u32,
}

impl ContextualizedName {
    pub fn new(flattened: impl Into<String>, version: u32, cycle: u32) -> Self {
        Self {
            flattened: flattened.into(),
            version,
            cycle,
        }
    }

    /// Parse from the textual form; `None` if the text is not a
    /// contextualized name (e.g. a shadow constant)
    pub fn parse(text: &str) -> Option<Self> {
        let (head, cycle) = text.rsplit_once("__")?;
        let cycle: u32 = cycle.parse().ok()?;
        let (flattened, version) = head.rsplit_once('_')?;
        let version: u32 = version.parse().ok()?;
        if flattened.is_empty() {
            return None;
        }
        Some(Self {
            flattened: flattened.to_string(),
            version,
            cycle,
        })
    }

    /// Count of enclosing scopes
    pub fn scope_depth(&self) -> usize {
        self.flattened.matches('.').count()
    }
}

impl std::fmt::Display for ContextualizedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}__{}", self.flattened, self.version, self.cycle)
    }
}

/// Canonical comparator order: cycle, scope depth, flattened name,
/// version
impl Ord for ContextualizedName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cycle
            .cmp(&other.cycle)
            .then_with(|| self.scope_depth().cmp(&other.scope_depth()))
            .then_with(|| self.flattened.cmp(&other.flattened))
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for ContextualizedName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A fresh boolean naming the reachability of one vertex in one
/// cycle; the textual form is `b_<scope>_<label>__<cycle>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssumptionLiteral {
    pub scope: String,
    pub label: Label,
    pub cycle: u32,
}

impl AssumptionLiteral {
    pub fn new(scope: impl Into<String>, label: Label, cycle: u32) -> Self {
        Self {
            scope: scope.into(),
            label,
            cycle,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.strip_prefix("b_")?;
        let (head, cycle) = rest.rsplit_once("__")?;
        let cycle: u32 = cycle.parse().ok()?;
        let (scope, label) = head.rsplit_once('_')?;
        let label: Label = label.parse().ok()?;
        Some(Self {
            scope: scope.to_string(),
            label,
            cycle,
        })
    }
}

impl std::fmt::Display for AssumptionLiteral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b_{}_{}__{}", self.scope, self.label, self.cycle)
    }
}

impl Ord for AssumptionLiteral {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cycle
            .cmp(&other.cycle)
            .then_with(|| self.label.cmp(&other.label))
            .then_with(|| self.scope.cmp(&other.scope))
    }
}

impl PartialOrd for AssumptionLiteral {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let name = ContextualizedName::new("P.fb.a", 3, 2);
        assert_eq!(name.to_string(), "P.fb.a_3__2");
        assert_eq!(ContextualizedName::parse("P.fb.a_3__2"), Some(name));
    }

    #[test]
    fn test_underscores_in_flattened_names() {
        let name = ContextualizedName::parse("P.my_var_1__0").unwrap();
        assert_eq!(name.flattened, "P.my_var");
        assert_eq!(name.version, 1);
        assert_eq!(name.cycle, 0);
    }

    #[test]
    fn test_shadow_constants_do_not_parse() {
        assert_eq!(ContextualizedName::parse("shadow_7"), None);
        assert_eq!(ContextualizedName::parse("nondet_0"), None);
    }

    #[test]
    fn test_canonical_order() {
        let mut names = vec![
            ContextualizedName::new("P.b", 0, 1),
            ContextualizedName::new("P.fb.a", 0, 0),
            ContextualizedName::new("P.a", 2, 0),
            ContextualizedName::new("P.a", 1, 0),
        ];
        names.sort();
        assert_eq!(
            names
                .iter()
                .map(ContextualizedName::to_string)
                .collect::<Vec<_>>(),
            vec!["P.a_1__0", "P.a_2__0", "P.fb.a_0__0", "P.b_0__1"]
        );
    }

    #[test]
    fn test_assumption_literal_round_trip() {
        let literal = AssumptionLiteral::new("P.fb", 7, 1);
        assert_eq!(literal.to_string(), "b_P.fb_7__1");
        assert_eq!(AssumptionLiteral::parse("b_P.fb_7__1"), Some(literal));
    }
}
