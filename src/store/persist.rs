//! store::persist
//!
//! Writes an in-memory tree to a store, children before parents.

use std::collections::HashSet;

use super::traits::{ConfigStore, StoreError, StoreRecord};
use crate::bom::ConfigNode;

/// Options for [`persist_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOptions {
    /// Treat `AlreadyExists` as success and keep the stored record.
    pub reuse_existing: bool,
}

/// Outcome of a persist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub created: usize,
    pub reused: usize,
}

/// Write every distinct node of `root` to `store`.
///
/// Equivalent to [`persist_with`] with default options: any existing
/// identity is an error.
pub async fn persist(store: &dyn ConfigStore, root: &ConfigNode) -> Result<usize, StoreError> {
    let report = persist_with(store, root, PersistOptions::default()).await?;
    Ok(report.created)
}

/// Write every distinct node of `root` to `store`.
///
/// Nodes are created in post-order so every composite's children exist
/// before the composite itself. A shared node is written once. The first
/// failure stops the write; records created before it stay in the store.
pub async fn persist_with(
    store: &dyn ConfigStore,
    root: &ConfigNode,
    options: PersistOptions,
) -> Result<PersistReport, StoreError> {
    let order = creation_order(root);

    let mut report = PersistReport::default();
    for node in order {
        let record = match node {
            ConfigNode::Leaf(leaf) => StoreRecord::Leaf {
                artifact: leaf.artifact().cloned(),
            },
            ConfigNode::Composite(composite) => StoreRecord::composite(
                composite
                    .children()
                    .iter()
                    .map(|c| c.id().clone())
                    .collect(),
            ),
        };

        tracing::debug!(id = %node.id(), store = store.name(), "create");
        match store.create(node.id(), &record).await {
            Ok(()) => report.created += 1,
            Err(StoreError::AlreadyExists(_)) if options.reuse_existing => {
                tracing::debug!(id = %node.id(), "reusing existing configuration");
                report.reused += 1;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        root = %root.id(),
        created = report.created,
        reused = report.reused,
        "persisted configuration tree"
    );
    Ok(report)
}

/// Distinct nodes of `root` in post-order, children before parents.
fn creation_order(root: &ConfigNode) -> Vec<&ConfigNode> {
    let mut seen = HashSet::from([root.id()]);
    let mut out = Vec::new();
    let mut stack: Vec<(&ConfigNode, usize)> = vec![(root, 0)];

    while let Some((node, next)) = stack.last_mut() {
        let node: &ConfigNode = *node;
        if let Some(child) = node.children().get(*next) {
            *next += 1;
            if seen.insert(child.id()) {
                stack.push((child.as_ref(), 0));
            }
        } else {
            stack.pop();
            out.push(node);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bom::node::tests::{composite, id, leaf};
    use crate::store::mock::{MockOperation, MockStore};

    #[tokio::test]
    async fn writes_children_first_once() {
        let d = composite("P/D/bx__dev", vec![leaf("P/D/rtl/bx__dev", "@1")]);
        let tree = composite(
            "P/A/bx__dev",
            vec![
                composite("P/B/bx__dev", vec![d.clone()]),
                composite("P/C/bx__dev", vec![d]),
            ],
        );
        let store = MockStore::new();

        let created = persist(&store, &tree).await.unwrap();

        assert_eq!(created, 5);
        let created_ids: Vec<String> = store
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                MockOperation::Create { id, .. } => Some(id.to_string()),
                MockOperation::Lookup { .. } => None,
            })
            .collect();
        assert_eq!(
            created_ids,
            vec![
                "P/D/rtl/bx__dev",
                "P/D/bx__dev",
                "P/B/bx__dev",
                "P/C/bx__dev",
                "P/A/bx__dev"
            ]
        );
        assert_eq!(
            store.record(&id("P/A/bx__dev")),
            Some(StoreRecord::composite(vec![
                id("P/B/bx__dev"),
                id("P/C/bx__dev")
            ]))
        );
    }

    #[tokio::test]
    async fn existing_identity_fails_unless_reused() {
        let tree = composite("P/A/bx__dev", vec![leaf("P/A/rtl/bx__dev", "@1")]);
        let store = MockStore::new().with_leaf(id("P/A/rtl/bx__dev"), "@0");

        assert_eq!(
            persist(&store, &tree).await,
            Err(StoreError::AlreadyExists("P/A/rtl/bx__dev".into()))
        );

        let options = PersistOptions {
            reuse_existing: true,
        };
        let report = persist_with(&store, &tree, options).await.unwrap();
        assert_eq!(
            report,
            PersistReport {
                created: 1,
                reused: 1
            }
        );
        // Existing record is untouched
        assert_eq!(
            store.record(&id("P/A/rtl/bx__dev")),
            Some(StoreRecord::leaf(
                crate::core::types::ArtifactRef::new("@0").unwrap()
            ))
        );
    }

    #[tokio::test]
    async fn deep_chain_persists_bottom_up() {
        const DEPTH: usize = 15_000;
        let mut node = leaf("P/V0/rtl/bx__dev", "@1");
        for i in 1..DEPTH {
            node = composite(&format!("P/V{i}/bx__dev"), vec![node]);
        }
        let store = MockStore::new();

        let created = persist(&store, &node).await.unwrap();

        assert_eq!(created, DEPTH);
        let first = store.operations().into_iter().next();
        assert_eq!(
            first,
            Some(MockOperation::Create {
                id: id("P/V0/rtl/bx__dev"),
                record: StoreRecord::leaf(crate::core::types::ArtifactRef::new("@1").unwrap()),
            })
        );
        drop(node);
    }
}
