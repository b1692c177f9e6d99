//! bom::query
//!
//! Read-only queries over a resolved tree.
//!
//! All queries walk the node set (each identity once) and return nodes in
//! first-seen pre-order, deduplicated by identity.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

use super::flatten::{flatten, unique_nodes};
use super::node::ConfigNode;
use crate::core::naming::MutabilityClass;
use crate::core::types::{ConfigId, Location};

/// Errors from building queries.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid {field} pattern '{pattern}': {source}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Regex criteria for [`search`].
///
/// Patterns are unanchored. Without a libtype pattern only composites match;
/// with one only leaves match.
///
/// # Example
///
/// ```
/// use bomtree::bom::SearchCriteria;
///
/// let criteria = SearchCriteria::new()
///     .variant("^cpu")
///     .unwrap()
///     .libtype("rtl|lint")
///     .unwrap();
/// assert!(!criteria.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    project: Option<Regex>,
    variant: Option<Regex>,
    libtype: Option<Regex>,
}

fn compile(field: &'static str, pattern: &str) -> Result<Regex, QueryError> {
    Regex::new(pattern).map_err(|source| QueryError::InvalidPattern {
        field,
        pattern: pattern.to_string(),
        source,
    })
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(mut self, pattern: &str) -> Result<Self, QueryError> {
        self.project = Some(compile("project", pattern)?);
        Ok(self)
    }

    pub fn variant(mut self, pattern: &str) -> Result<Self, QueryError> {
        self.variant = Some(compile("variant", pattern)?);
        Ok(self)
    }

    /// Match leaves whose libtype matches `pattern`. An empty pattern
    /// matches every leaf.
    pub fn libtype(mut self, pattern: &str) -> Result<Self, QueryError> {
        self.libtype = Some(compile("libtype", pattern)?);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.project.is_none() && self.variant.is_none() && self.libtype.is_none()
    }

    fn matches(&self, id: &ConfigId) -> bool {
        let hit = |re: &Option<Regex>, value: &str| {
            re.as_ref().map_or(true, |r| r.is_match(value))
        };

        if !hit(&self.project, id.project()) || !hit(&self.variant, id.variant()) {
            return false;
        }
        match (&self.libtype, id.libtype()) {
            (None, None) => true,
            (Some(re), Some(lt)) => re.is_match(lt),
            _ => false,
        }
    }
}

/// Nodes matching `criteria`.
///
/// Empty criteria match nothing.
pub fn search(root: &Arc<ConfigNode>, criteria: &SearchCriteria) -> Vec<Arc<ConfigNode>> {
    if criteria.is_empty() {
        tracing::warn!(root = %root.id(), "search called with no criteria");
        return Vec::new();
    }
    unique_nodes(root)
        .into_iter()
        .filter(|n| criteria.matches(n.id()))
        .collect()
}

/// Composites that directly reference `target`.
///
/// Placeholder parents are skipped unless `include_placeholders` is set.
pub fn parents_of(
    root: &Arc<ConfigNode>,
    target: &ConfigId,
    include_placeholders: bool,
) -> Vec<Arc<ConfigNode>> {
    unique_nodes(root)
        .into_iter()
        .filter(|n| n.children().iter().any(|c| c.id() == target))
        .filter(|n| include_placeholders || n.mutability() != MutabilityClass::Placeholder)
        .collect()
}

/// Whether `node` and everything below it satisfy `pred`.
fn whole_tree(node: &ConfigNode, pred: fn(MutabilityClass) -> bool) -> bool {
    flatten(node).iter().all(|e| pred(e.node.mutability()))
}

fn collect_ready(
    node: &Arc<ConfigNode>,
    pred: fn(MutabilityClass) -> bool,
    seen: &mut HashSet<ConfigId>,
    out: &mut Vec<Arc<ConfigNode>>,
) {
    if !node.is_composite() {
        return;
    }
    let mut include_self = true;
    for child in node.children() {
        if !whole_tree(child, pred) {
            include_self = false;
            collect_ready(child, pred, seen, out);
        }
    }
    if include_self && !pred(node.mutability()) && seen.insert(node.id().clone()) {
        out.push(Arc::clone(node));
    }
}

fn is_release(class: MutabilityClass) -> bool {
    class == MutabilityClass::Release
}

fn is_prerelease(class: MutabilityClass) -> bool {
    matches!(class, MutabilityClass::Release | MutabilityClass::Prerelease)
}

/// Composites that are not yet REL but whose whole subtrees below are REL.
///
/// Results are bottom-up: a composite is listed after the composites below it.
pub fn configs_ready_for_release(root: &Arc<ConfigNode>) -> Vec<Arc<ConfigNode>> {
    let mut out = Vec::new();
    collect_ready(root, is_release, &mut HashSet::new(), &mut out);
    out
}

/// Like [`configs_ready_for_release`], with PREL counting as released.
pub fn configs_ready_for_prerelease(root: &Arc<ConfigNode>) -> Vec<Arc<ConfigNode>> {
    let mut out = Vec::new();
    collect_ready(root, is_prerelease, &mut HashSet::new(), &mut out);
    out
}

/// Mutable composites all of whose composite children are immutable.
pub fn configs_ready_for_snap(root: &Arc<ConfigNode>) -> Vec<Arc<ConfigNode>> {
    fn walk(
        node: &Arc<ConfigNode>,
        seen: &mut HashSet<ConfigId>,
        out: &mut Vec<Arc<ConfigNode>>,
    ) {
        let mut include_self = true;
        for child in node.children() {
            if child.is_composite() && child.mutability().is_mutable() {
                include_self = false;
                walk(child, seen, out);
            }
        }
        if include_self && node.mutability().is_mutable() && seen.insert(node.id().clone()) {
            out.push(Arc::clone(node));
        }
    }

    let mut out = Vec::new();
    if root.is_composite() {
        walk(root, &mut HashSet::new(), &mut out);
    }
    out
}

/// Composites with no children.
pub fn empty_composites(root: &Arc<ConfigNode>) -> Vec<Arc<ConfigNode>> {
    unique_nodes(root)
        .into_iter()
        .filter(|n| n.is_composite() && n.children().is_empty())
        .collect()
}

/// Nodes grouped by location.
///
/// More than one node at a location means the tree references the same
/// variant (or libtype) under different configuration names.
pub fn objects_by_location(root: &Arc<ConfigNode>) -> BTreeMap<Location, Vec<Arc<ConfigNode>>> {
    let mut out: BTreeMap<Location, Vec<Arc<ConfigNode>>> = BTreeMap::new();
    for node in unique_nodes(root) {
        out.entry(node.id().location()).or_default().push(node);
    }
    out
}

/// Graphviz edge lines between composites, sorted and deduplicated.
pub fn dot_edges(root: &ConfigNode) -> Vec<String> {
    let edges: BTreeSet<String> = flatten(root)
        .iter()
        .filter(|e| e.node.is_composite())
        .filter_map(|e| e.parent.map(|p| format!("\"{}\" -> \"{}\";", p, e.node.id())))
        .collect();
    edges.into_iter().collect()
}

/// Graphviz document for the composite structure of `root`.
pub fn to_dot(root: &ConfigNode) -> String {
    let mut out = String::from("digraph bom {\n");
    for edge in dot_edges(root) {
        out.push_str("    ");
        out.push_str(&edge);
        out.push('\n');
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bom::node::tests::{composite, id, leaf};

    fn ids(nodes: &[Arc<ConfigNode>]) -> Vec<String> {
        nodes.iter().map(|n| n.id().to_string()).collect()
    }

    fn release_tree() -> Arc<ConfigNode> {
        let a = composite("P/a/REL1", vec![leaf("P/a/rtl/REL1", "@1")]);
        let b = composite(
            "P/b/dev",
            vec![a.clone(), composite("P/c/REL1", vec![leaf("P/c/rtl/REL1", "@2")])],
        );
        let d = composite("P/d/dev", vec![leaf("P/d/rtl/dev", "@3"), a]);
        composite("P/top/dev", vec![b, d, leaf("P/top/spec/REL2", "@4")])
    }

    #[test]
    fn search_composites_and_leaves() {
        let tree = release_tree();

        let criteria = SearchCriteria::new().variant("^[ab]$").unwrap();
        assert_eq!(ids(&search(&tree, &criteria)), vec!["P/b/dev", "P/a/REL1"]);

        let criteria = SearchCriteria::new().libtype("rtl").unwrap();
        assert_eq!(
            ids(&search(&tree, &criteria)),
            vec!["P/a/rtl/REL1", "P/c/rtl/REL1", "P/d/rtl/dev"]
        );

        let every_leaf = SearchCriteria::new().libtype("").unwrap();
        assert_eq!(search(&tree, &every_leaf).len(), 4);

        assert!(search(&tree, &SearchCriteria::new()).is_empty());
    }

    #[test]
    fn invalid_pattern() {
        let err = SearchCriteria::new().project("(").unwrap_err();
        assert!(err.to_string().starts_with("invalid project pattern '('"));
    }

    #[test]
    fn parents_skip_placeholders_by_default() {
        let shared = leaf("P/x/rtl/dev", "@1");
        let tree = composite(
            "P/top/dev",
            vec![
                composite("P/x/dev", vec![shared.clone()]),
                composite("P/x/tnr-placeholder-x-rtl-3", vec![shared]),
            ],
        );

        assert_eq!(
            ids(&parents_of(&tree, &id("P/x/rtl/dev"), false)),
            vec!["P/x/dev"]
        );
        assert_eq!(
            ids(&parents_of(&tree, &id("P/x/rtl/dev"), true)),
            vec!["P/x/dev", "P/x/tnr-placeholder-x-rtl-3"]
        );
    }

    #[test]
    fn ready_for_release() {
        let tree = release_tree();
        // b has only REL children; d has a dev leaf; top has non-REL children
        assert_eq!(ids(&configs_ready_for_release(&tree)), vec!["P/b/dev"]);
    }

    #[test]
    fn ready_for_prerelease_accepts_prel() {
        let tree = composite(
            "P/top/dev",
            vec![
                composite("P/a/PREL1", vec![leaf("P/a/rtl/PREL1", "@1")]),
                leaf("P/top/rtl/REL1", "@2"),
            ],
        );
        assert!(configs_ready_for_release(&tree).is_empty());
        assert_eq!(ids(&configs_ready_for_prerelease(&tree)), vec!["P/top/dev"]);
    }

    #[test]
    fn ready_for_snap() {
        let tree = release_tree();
        // d and b only hold immutable composites; top holds mutable ones
        assert_eq!(ids(&configs_ready_for_snap(&tree)), vec!["P/b/dev", "P/d/dev"]);
    }

    #[test]
    fn empty_and_by_location() {
        let tree = composite(
            "P/top/dev",
            vec![
                composite("P/a/dev", vec![]),
                composite("P/b/dev", vec![composite("P/a/REL1", vec![])]),
            ],
        );

        assert_eq!(
            ids(&empty_composites(&tree)),
            vec!["P/a/dev", "P/a/REL1"]
        );

        let by_location = objects_by_location(&tree);
        let a = by_location
            .iter()
            .find(|(loc, _)| loc.to_string() == "P/a")
            .map(|(_, nodes)| ids(nodes));
        assert_eq!(a, Some(vec!["P/a/dev".to_string(), "P/a/REL1".to_string()]));
        assert_eq!(by_location.len(), 3);
    }

    #[test]
    fn dot_output() {
        let tree = release_tree();
        assert_eq!(
            dot_edges(&tree),
            vec![
                "\"P/b/dev\" -> \"P/a/REL1\";",
                "\"P/b/dev\" -> \"P/c/REL1\";",
                "\"P/d/dev\" -> \"P/a/REL1\";",
                "\"P/top/dev\" -> \"P/b/dev\";",
                "\"P/top/dev\" -> \"P/d/dev\";",
            ]
        );
        assert!(to_dot(&tree).starts_with("digraph bom {\n    \"P/b/dev\""));
    }
}
