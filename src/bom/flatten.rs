//! bom::flatten
//!
//! Path-preserving linearization of a configuration tree.
//!
//! # Ordering
//!
//! Pre-order depth-first: a node precedes its children, children appear in
//! declaration order. A node reachable through two parents is emitted once
//! per path. Traversal uses an explicit stack.

use std::collections::HashSet;
use std::sync::Arc;

use super::node::ConfigNode;
use crate::core::types::ConfigId;

/// One path through the tree.
#[derive(Debug, Clone, Copy)]
pub struct FlatEntry<'a> {
    pub node: &'a ConfigNode,
    /// Distance from the root (root is 0).
    pub depth: usize,
    /// Identity of the composite this path came through; `None` for the root.
    pub parent: Option<&'a ConfigId>,
}

/// Flatten `root` into one entry per path.
///
/// # Example
///
/// ```
/// use bomtree::bom::{flatten, Resolver};
/// use bomtree::core::types::ConfigId;
/// use bomtree::store::mock::MockStore;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let a = ConfigId::parse("P/A/dev").unwrap();
/// let b = ConfigId::parse("P/B/dev").unwrap();
/// let c = ConfigId::parse("P/C/dev").unwrap();
/// let d = ConfigId::parse("P/D/rtl/dev").unwrap();
/// let store = MockStore::new()
///     .with_composite(a.clone(), vec![b.clone(), c.clone()])
///     .with_composite(b, vec![d.clone()])
///     .with_composite(c, vec![d.clone()])
///     .with_leaf(d.clone(), "@1");
///
/// let tree = Resolver::with_defaults(Arc::new(store)).resolve(&a).await.unwrap();
/// let paths = flatten(&tree);
/// assert_eq!(paths.len(), 5);
/// assert_eq!(paths.iter().filter(|e| e.node.id() == &d).count(), 2);
/// # });
/// ```
pub fn flatten(root: &ConfigNode) -> Vec<FlatEntry<'_>> {
    let mut out = Vec::new();
    let mut stack = vec![FlatEntry {
        node: root,
        depth: 0,
        parent: None,
    }];

    while let Some(entry) = stack.pop() {
        let children = entry.node.children();
        // Reverse push so the first child pops first.
        for child in children.iter().rev() {
            stack.push(FlatEntry {
                node: child,
                depth: entry.depth + 1,
                parent: Some(entry.node.id()),
            });
        }
        out.push(entry);
    }

    out
}

/// Like [`flatten`], keeping only leaf entries.
pub fn flatten_leaves_only(root: &ConfigNode) -> Vec<FlatEntry<'_>> {
    flatten(root)
        .into_iter()
        .filter(|e| e.node.is_leaf())
        .collect()
}

/// Distinct nodes in first-seen pre-order.
///
/// Nodes are deduplicated by identity, so a shared sub-variant is listed once.
pub fn unique_nodes(root: &Arc<ConfigNode>) -> Vec<Arc<ConfigNode>> {
    let mut seen: HashSet<&ConfigId> = HashSet::new();
    let mut out = Vec::new();
    let mut stack: Vec<&Arc<ConfigNode>> = vec![root];

    while let Some(node) = stack.pop() {
        if !seen.insert(node.id()) {
            continue;
        }
        out.push(Arc::clone(node));
        stack.extend(node.children().iter().rev());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bom::node::tests::{composite, id, leaf};

    fn shared_tree() -> Arc<ConfigNode> {
        let d = composite("P/D/dev", vec![leaf("P/D/rtl/dev", "@4")]);
        let b = composite("P/B/dev", vec![d.clone(), leaf("P/B/spec/dev", "@2")]);
        let c = composite("P/C/dev", vec![d]);
        composite("P/A/dev", vec![b, c])
    }

    fn names<'a>(entries: &[FlatEntry<'a>]) -> Vec<(usize, String)> {
        entries
            .iter()
            .map(|e| (e.depth, e.node.id().to_string()))
            .collect()
    }

    #[test]
    fn preorder_with_repeated_shared_paths() {
        let tree = shared_tree();
        let entries = flatten(&tree);

        assert_eq!(
            names(&entries),
            vec![
                (0, "P/A/dev".to_string()),
                (1, "P/B/dev".to_string()),
                (2, "P/D/dev".to_string()),
                (3, "P/D/rtl/dev".to_string()),
                (2, "P/B/spec/dev".to_string()),
                (1, "P/C/dev".to_string()),
                (2, "P/D/dev".to_string()),
                (3, "P/D/rtl/dev".to_string()),
            ]
        );
    }

    #[test]
    fn parents_follow_the_path() {
        let tree = shared_tree();
        let entries = flatten(&tree);

        assert_eq!(entries[0].parent, None);
        let d_parents: Vec<_> = entries
            .iter()
            .filter(|e| e.node.id() == &id("P/D/dev"))
            .map(|e| e.parent.map(ToString::to_string))
            .collect();
        assert_eq!(
            d_parents,
            vec![Some("P/B/dev".to_string()), Some("P/C/dev".to_string())]
        );
    }

    #[test]
    fn shared_entries_point_at_one_node() {
        let tree = shared_tree();
        let entries = flatten(&tree);
        let shared: Vec<_> = entries
            .iter()
            .filter(|e| e.node.id() == &id("P/D/dev"))
            .collect();

        assert_eq!(shared.len(), 2);
        assert!(std::ptr::eq(shared[0].node, shared[1].node));
    }

    #[test]
    fn leaves_only_keeps_relative_order() {
        let tree = shared_tree();
        let leaves = flatten_leaves_only(&tree);

        assert_eq!(
            names(&leaves),
            vec![
                (3, "P/D/rtl/dev".to_string()),
                (2, "P/B/spec/dev".to_string()),
                (3, "P/D/rtl/dev".to_string()),
            ]
        );
    }

    #[test]
    fn unique_nodes_first_seen_order() {
        let tree = shared_tree();
        let nodes: Vec<String> = unique_nodes(&tree)
            .iter()
            .map(|n| n.id().to_string())
            .collect();

        assert_eq!(
            nodes,
            vec!["P/A/dev", "P/B/dev", "P/D/dev", "P/D/rtl/dev", "P/B/spec/dev", "P/C/dev"]
        );
    }

    #[test]
    fn single_leaf() {
        let tree = leaf("P/V/rtl/dev", "@1");
        let entries = flatten(&tree);
        assert_eq!(entries.len(), 1);
        assert_eq!(flatten_leaves_only(&tree).len(), 1);
    }

    #[test]
    fn deep_chain_does_not_recurse() {
        let mut node = leaf("P/V0/rtl/dev", "@1");
        for i in 1..20_000 {
            node = composite(&format!("P/V{i}/dev"), vec![node]);
        }
        let entries = flatten(&node);
        assert_eq!(entries.len(), 20_000);
        assert_eq!(entries.last().map(|e| e.depth), Some(19_999));
        drop(entries);
        drop(node);
    }
}
