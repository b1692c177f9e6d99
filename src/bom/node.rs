//! bom::node
//!
//! The configuration node model.
//!
//! # Design
//!
//! A node is exactly one of:
//! - [`CompositeNode`]: a variant-level configuration composed of other
//!   configurations, children in declaration order
//! - [`LeafNode`]: one libtype pinned to an artifact reference
//!
//! Nodes are immutable and shared through `Arc`. Within one resolution
//! session a given identity maps to a single allocation, so a sub-variant
//! referenced by two parents is one node referenced twice.
//!
//! Construction is crate-private: only the resolver and the cloner create
//! nodes.
//!
//! # Invariants
//!
//! - A leaf identity always carries a libtype
//! - A composite identity never carries a libtype

use std::sync::Arc;

use thiserror::Error;

use super::flatten::flatten;
use crate::core::naming::MutabilityClass;
use crate::core::types::{ArtifactRef, ConfigId, Fingerprint};

/// Node construction rejected because the identity has the wrong shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("leaf configuration {0} has no libtype")]
    LeafWithoutLibtype(ConfigId),

    #[error("composite configuration {0} cannot carry a libtype")]
    CompositeWithLibtype(ConfigId),
}

/// A variant-level configuration composed of other configurations.
#[derive(Debug, PartialEq, Eq)]
pub struct CompositeNode {
    id: ConfigId,
    children: Vec<Arc<ConfigNode>>,
}

impl CompositeNode {
    pub fn id(&self) -> &ConfigId {
        &self.id
    }

    /// Children in declaration order.
    pub fn children(&self) -> &[Arc<ConfigNode>] {
        &self.children
    }
}

// Chains of composites can be far deeper than the call stack allows for a
// recursive drop. Detach children and release the ones this node uniquely
// owns from a worklist.
impl Drop for CompositeNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(child) = pending.pop() {
            if let Ok(ConfigNode::Composite(mut inner)) = Arc::try_unwrap(child) {
                pending.append(&mut inner.children);
            }
        }
    }
}

/// One libtype pinned to an artifact.
#[derive(Debug, PartialEq, Eq)]
pub struct LeafNode {
    id: ConfigId,
    libtype: String,
    artifact: Option<ArtifactRef>,
}

impl LeafNode {
    pub fn id(&self) -> &ConfigId {
        &self.id
    }

    pub fn libtype(&self) -> &str {
        &self.libtype
    }

    /// Pinned artifact; `None` for an empty-branch placeholder.
    pub fn artifact(&self) -> Option<&ArtifactRef> {
        self.artifact.as_ref()
    }
}

/// A node in a resolved configuration tree.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigNode {
    Composite(CompositeNode),
    Leaf(LeafNode),
}

/// Options for [`ConfigNode::render_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Number of tabs prefixed to the root line.
    pub indent: usize,
    /// Use the legacy `project/variant[:libtype]@config` form.
    pub legacy_format: bool,
    /// Include leaf lines.
    pub show_leaves: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            indent: 0,
            legacy_format: false,
            show_leaves: true,
        }
    }
}

impl ConfigNode {
    pub(crate) fn composite(
        id: ConfigId,
        children: Vec<Arc<ConfigNode>>,
    ) -> Result<Self, ShapeError> {
        if id.is_leaf() {
            return Err(ShapeError::CompositeWithLibtype(id));
        }
        Ok(ConfigNode::Composite(CompositeNode { id, children }))
    }

    pub(crate) fn leaf(id: ConfigId, artifact: Option<ArtifactRef>) -> Result<Self, ShapeError> {
        let Some(libtype) = id.libtype().map(str::to_string) else {
            return Err(ShapeError::LeafWithoutLibtype(id));
        };
        Ok(ConfigNode::Leaf(LeafNode {
            id,
            libtype,
            artifact,
        }))
    }

    pub fn id(&self) -> &ConfigId {
        match self {
            ConfigNode::Composite(c) => &c.id,
            ConfigNode::Leaf(l) => &l.id,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, ConfigNode::Composite(_))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, ConfigNode::Leaf(_))
    }

    /// Children in declaration order; empty for leaves.
    pub fn children(&self) -> &[Arc<ConfigNode>] {
        match self {
            ConfigNode::Composite(c) => &c.children,
            ConfigNode::Leaf(_) => &[],
        }
    }

    /// Libtype of a leaf; `None` for composites.
    pub fn libtype(&self) -> Option<&str> {
        match self {
            ConfigNode::Composite(_) => None,
            ConfigNode::Leaf(l) => Some(&l.libtype),
        }
    }

    /// Pinned artifact of a leaf.
    pub fn artifact(&self) -> Option<&ArtifactRef> {
        match self {
            ConfigNode::Composite(_) => None,
            ConfigNode::Leaf(l) => l.artifact.as_ref(),
        }
    }

    pub fn mutability(&self) -> MutabilityClass {
        self.id().mutability()
    }

    /// Canonical nested text report.
    ///
    /// One line per path through the tree in pre-order, tab-indented by
    /// depth, each terminated by `\n`.
    ///
    /// # Example
    ///
    /// ```
    /// use bomtree::bom::Resolver;
    /// use bomtree::core::types::ConfigId;
    /// use bomtree::store::mock::MockStore;
    /// use std::sync::Arc;
    ///
    /// # tokio_test::block_on(async {
    /// let root = ConfigId::parse("P/V/REL1.0").unwrap();
    /// let spec = ConfigId::parse("P/V/ipspec/REL1.0").unwrap();
    /// let store = MockStore::new()
    ///     .with_composite(root.clone(), vec![spec.clone()])
    ///     .with_leaf(spec, "@7");
    ///
    /// let tree = Resolver::with_defaults(Arc::new(store)).resolve(&root).await.unwrap();
    /// assert_eq!(tree.render(), "P/V/REL1.0\n\tP/V/ipspec/REL1.0\n");
    /// # });
    /// ```
    pub fn render(&self) -> String {
        self.render_with(&RenderOptions::default())
    }

    /// Render with the root line prefixed by `indent` tabs.
    pub fn render_indented(&self, indent: usize) -> String {
        self.render_with(&RenderOptions {
            indent,
            ..RenderOptions::default()
        })
    }

    pub fn render_with(&self, options: &RenderOptions) -> String {
        let mut out = String::new();
        for entry in flatten(self) {
            if entry.node.is_leaf() && !options.show_leaves {
                continue;
            }
            for _ in 0..options.indent + entry.depth {
                out.push('\t');
            }
            let id = entry.node.id();
            if options.legacy_format {
                out.push_str(&id.legacy_name());
            } else {
                out.push_str(&id.to_string());
            }
            out.push('\n');
        }
        out
    }

    /// Content hash over every path: depth, identity and pinned artifact.
    pub fn fingerprint(&self) -> Fingerprint {
        let entries = flatten(self);
        Fingerprint::compute(
            entries
                .iter()
                .map(|e| (e.depth, e.node.id(), e.node.artifact())),
        )
    }
}
