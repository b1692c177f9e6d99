//! bom::clone
//!
//! Structural clone of a configuration tree under a new name.
//!
//! # Design
//!
//! The clone has the shape and child order of the source. Every node keeps
//! its project, variant and libtype and takes the new configuration name.
//! Nodes shared in the source stay shared in the clone.
//!
//! Cloning is a pure in-memory transform. Writing the result to a store is
//! the job of [`crate::store::persist`].

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::flatten::flatten_leaves_only;
use super::node::{ConfigNode, ShapeError};
use crate::core::naming::{classify, MutabilityClass};
use crate::core::types::{ConfigId, LibtypeFilter};

/// Errors from cloning a tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CloneError {
    #[error("invalid configuration name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("refusing to clone into {class} configuration '{name}'")]
    ImmutableTarget {
        name: String,
        class: MutabilityClass,
    },

    #[error("libtype filter {filter} matches no leaf in {root}")]
    FilterMatchesNothing {
        root: ConfigId,
        filter: LibtypeFilter,
    },

    #[error("{first} and {second} would both become {target}")]
    IdentityClash {
        target: ConfigId,
        first: ConfigId,
        second: ConfigId,
    },

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Options controlling [`clone_tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOptions {
    /// Configuration name given to every cloned node.
    pub new_name: String,
    /// Keep only leaves of these libtypes.
    pub libtype_filter: Option<LibtypeFilter>,
    /// Produce an empty branch: leaves carry no artifact, and composites
    /// left without leaves by the filter are kept with no children.
    pub empty_branch: bool,
    /// Refuse REL, PREL and snap- target names.
    pub refuse_immutable_name: bool,
}

impl CloneOptions {
    pub fn new(new_name: impl Into<String>) -> Self {
        Self {
            new_name: new_name.into(),
            libtype_filter: None,
            empty_branch: false,
            refuse_immutable_name: false,
        }
    }

    pub fn with_filter(mut self, filter: LibtypeFilter) -> Self {
        self.libtype_filter = Some(filter);
        self
    }

    pub fn empty_branch(mut self) -> Self {
        self.empty_branch = true;
        self
    }

    /// Fail with `ImmutableTarget` instead of cloning into a release or
    /// snapshot name.
    pub fn refuse_immutable_name(mut self) -> Self {
        self.refuse_immutable_name = true;
        self
    }
}

/// Clone `root` under `options.new_name`.
///
/// The root is never pruned, even if the filter leaves it without children.
///
/// # Errors
///
/// - `InvalidName` if the new name is not a valid identity component
/// - `ImmutableTarget` if the new name is immutable and the options refuse it
/// - `FilterMatchesNothing` if no source leaf passes the filter
/// - `IdentityClash` if two source identities map onto one target identity
///
/// # Example
///
/// ```
/// use bomtree::bom::{clone_tree, flatten, CloneOptions, Resolver};
/// use bomtree::core::types::ConfigId;
/// use bomtree::store::mock::MockStore;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let root = ConfigId::parse("P/V/REL1.0").unwrap();
/// let rtl = ConfigId::parse("P/V/rtl/REL1.0").unwrap();
/// let store = MockStore::new()
///     .with_composite(root.clone(), vec![rtl.clone()])
///     .with_leaf(rtl, "@9");
/// let tree = Resolver::with_defaults(Arc::new(store)).resolve(&root).await.unwrap();
///
/// let branch = clone_tree(&tree, &CloneOptions::new("bfix__dev")).unwrap();
/// assert_eq!(branch.render(), "P/V/bfix__dev\n\tP/V/rtl/bfix__dev\n");
/// assert_eq!(flatten(&branch).len(), flatten(&tree).len());
/// # });
/// ```
pub fn clone_tree(
    root: &Arc<ConfigNode>,
    options: &CloneOptions,
) -> Result<Arc<ConfigNode>, CloneError> {
    root.id()
        .with_name(&options.new_name)
        .map_err(|e| CloneError::InvalidName {
            name: options.new_name.clone(),
            reason: e.to_string(),
        })?;

    let class = classify(&options.new_name);
    if class.is_immutable() && options.refuse_immutable_name {
        return Err(CloneError::ImmutableTarget {
            name: options.new_name.clone(),
            class,
        });
    }

    if let Some(filter) = &options.libtype_filter {
        let any_match = flatten_leaves_only(root)
            .iter()
            .any(|e| e.node.libtype().is_some_and(|lt| filter.matches(lt)));
        if !any_match {
            return Err(CloneError::FilterMatchesNothing {
                root: root.id().clone(),
                filter: filter.clone(),
            });
        }
    }

    let mut cloner = Cloner {
        options,
        memo: HashMap::new(),
        targets: HashMap::new(),
    };
    let cloned = match cloner.run(root)? {
        Some(node) => node,
        // The root is never pruned.
        None => return Err(ShapeError::CompositeWithLibtype(root.id().clone()).into()),
    };

    tracing::info!(
        source = %root.id(),
        target = %cloned.id(),
        nodes = cloner.targets.len(),
        empty_branch = options.empty_branch,
        "cloned configuration tree"
    );
    Ok(cloned)
}

struct Cloner<'a> {
    options: &'a CloneOptions,
    /// Source identity to cloned node; `None` if pruned.
    memo: HashMap<ConfigId, Option<Arc<ConfigNode>>>,
    /// Target identity to the source identity it came from.
    targets: HashMap<ConfigId, ConfigId>,
}

/// A source composite whose children are being cloned.
struct Frame<'t> {
    source: &'t Arc<ConfigNode>,
    next: usize,
    children: Vec<Arc<ConfigNode>>,
}

enum Step {
    Done(Option<Arc<ConfigNode>>),
    Descended,
}

impl<'o> Cloner<'o> {
    fn run(&mut self, root: &Arc<ConfigNode>) -> Result<Option<Arc<ConfigNode>>, CloneError> {
        let mut frames = Vec::new();
        if let Step::Done(node) = self.visit(root, &mut frames)? {
            return Ok(node);
        }

        while let Some(frame) = frames.last_mut() {
            let source = frame.source;
            if let Some(child) = source.children().get(frame.next) {
                frame.next += 1;
                if let Step::Done(Some(node)) = self.visit(child, &mut frames)? {
                    if let Some(parent) = frames.last_mut() {
                        parent.children.push(node);
                    }
                }
                continue;
            }

            let Some(done) = frames.pop() else { break };
            let node = self.finish(done, frames.is_empty())?;
            match frames.last_mut() {
                Some(parent) => parent.children.extend(node),
                None => return Ok(node),
            }
        }

        Ok(None)
    }

    fn visit<'t>(
        &mut self,
        source: &'t Arc<ConfigNode>,
        frames: &mut Vec<Frame<'t>>,
    ) -> Result<Step, CloneError> {
        if let Some(done) = self.memo.get(source.id()) {
            return Ok(Step::Done(done.clone()));
        }

        let ConfigNode::Leaf(leaf) = source.as_ref() else {
            frames.push(Frame {
                source,
                next: 0,
                children: Vec::with_capacity(source.children().len()),
            });
            return Ok(Step::Descended);
        };

        let keep = self
            .options
            .libtype_filter
            .as_ref()
            .map_or(true, |f| f.matches(leaf.libtype()));
        let cloned = if keep {
            let target = self.claim(source.id())?;
            let artifact = if self.options.empty_branch {
                None
            } else {
                leaf.artifact().cloned()
            };
            let node = Arc::new(ConfigNode::leaf(target, artifact)?);
            tracing::debug!(source = %source.id(), target = %node.id(), "cloned");
            Some(node)
        } else {
            None
        };
        self.memo.insert(source.id().clone(), cloned.clone());
        Ok(Step::Done(cloned))
    }

    fn finish(
        &mut self,
        frame: Frame<'_>,
        is_root: bool,
    ) -> Result<Option<Arc<ConfigNode>>, CloneError> {
        let source = frame.source;
        let pruned = self.options.libtype_filter.is_some()
            && frame.children.is_empty()
            && !self.options.empty_branch
            && !is_root;

        let cloned = if pruned {
            tracing::debug!(source = %source.id(), "pruned: no retained leaves");
            None
        } else {
            let target = self.claim(source.id())?;
            let node = Arc::new(ConfigNode::composite(target, frame.children)?);
            tracing::debug!(source = %source.id(), target = %node.id(), "cloned");
            Some(node)
        };
        self.memo.insert(source.id().clone(), cloned.clone());
        Ok(cloned)
    }

    /// Reserve the target identity for `source`.
    fn claim(&mut self, source: &ConfigId) -> Result<ConfigId, CloneError> {
        let target = source
            .with_name(&self.options.new_name)
            .map_err(|e| CloneError::InvalidName {
                name: self.options.new_name.clone(),
                reason: e.to_string(),
            })?;

        match self.targets.entry(target.clone()) {
            Entry::Occupied(entry) if entry.get() != source => Err(CloneError::IdentityClash {
                target,
                first: entry.get().clone(),
                second: source.clone(),
            }),
            Entry::Occupied(_) => Ok(target),
            Entry::Vacant(entry) => {
                entry.insert(source.clone());
                Ok(target)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bom::flatten::flatten;
    use crate::bom::node::tests::{composite, id, leaf};

    fn deliverables() -> Arc<ConfigNode> {
        let sub = composite(
            "P/sub/dev",
            vec![leaf("P/sub/spec/dev", "@1"), leaf("P/sub/lint/dev", "@2")],
        );
        composite(
            "P/top/dev",
            vec![
                leaf("P/top/spec/dev", "@3"),
                leaf("P/top/rtl/dev", "@4"),
                leaf("P/top/lint/dev", "@5"),
                sub,
            ],
        )
    }

    #[test]
    fn renames_every_node() {
        let tree = deliverables();
        let cloned = clone_tree(&tree, &CloneOptions::new("bx__dev")).unwrap();

        assert_eq!(
            cloned.render(),
            "P/top/bx__dev\n\
             \tP/top/spec/bx__dev\n\
             \tP/top/rtl/bx__dev\n\
             \tP/top/lint/bx__dev\n\
             \tP/sub/bx__dev\n\
             \t\tP/sub/spec/bx__dev\n\
             \t\tP/sub/lint/bx__dev\n"
        );
        // Artifacts are carried over
        assert_eq!(
            cloned.children()[1].artifact().map(|a| a.as_str()),
            Some("@4")
        );
    }

    #[test]
    fn filter_prunes_empty_composites() {
        let tree = deliverables();
        let options = CloneOptions::new("bx__dev").with_filter(LibtypeFilter::new(["rtl"]));
        let cloned = clone_tree(&tree, &options).unwrap();

        assert_eq!(cloned.render(), "P/top/bx__dev\n\tP/top/rtl/bx__dev\n");
    }

    #[test]
    fn empty_branch_keeps_composites_and_drops_artifacts() {
        let tree = deliverables();
        let options = CloneOptions::new("bx__dev")
            .with_filter(LibtypeFilter::new(["rtl"]))
            .empty_branch();
        let cloned = clone_tree(&tree, &options).unwrap();

        assert_eq!(
            cloned.render(),
            "P/top/bx__dev\n\tP/top/rtl/bx__dev\n\tP/sub/bx__dev\n"
        );
        assert!(flatten(&cloned).iter().all(|e| e.node.artifact().is_none()));
    }

    #[test]
    fn root_survives_filter() {
        let tree = composite(
            "P/top/dev",
            vec![
                composite("P/a/dev", vec![leaf("P/a/spec/dev", "@1")]),
                leaf("P/top/rtl/dev", "@2"),
            ],
        );
        let inner = composite("P/a/dev", vec![leaf("P/a/rtl/dev", "@1")]);
        let nested = composite("P/top/dev", vec![composite("P/b/dev", vec![inner])]);

        let options = CloneOptions::new("bx__dev").with_filter(LibtypeFilter::new(["rtl"]));
        assert_eq!(
            clone_tree(&tree, &options).unwrap().render(),
            "P/top/bx__dev\n\tP/top/rtl/bx__dev\n"
        );
        assert_eq!(
            clone_tree(&nested, &options).unwrap().render(),
            "P/top/bx__dev\n\tP/b/bx__dev\n\t\tP/a/bx__dev\n\t\t\tP/a/rtl/bx__dev\n"
        );
    }

    #[test]
    fn filter_matching_nothing_is_an_error() {
        let tree = deliverables();
        let options = CloneOptions::new("bx__dev").with_filter(LibtypeFilter::new(["oa"]));

        assert_eq!(
            clone_tree(&tree, &options),
            Err(CloneError::FilterMatchesNothing {
                root: id("P/top/dev"),
                filter: LibtypeFilter::new(["oa"]),
            })
        );
    }

    #[test]
    fn invalid_names() {
        let tree = deliverables();

        assert!(matches!(
            clone_tree(&tree, &CloneOptions::new("bad name")),
            Err(CloneError::InvalidName { .. })
        ));
        assert!(matches!(
            clone_tree(&tree, &CloneOptions::new("")),
            Err(CloneError::InvalidName { .. })
        ));
    }

    #[test]
    fn immutable_names_clone_unless_refused() {
        let tree = deliverables();

        let released = clone_tree(&tree, &CloneOptions::new("REL2.0")).unwrap();
        assert_eq!(released.id(), &id("P/top/REL2.0"));
        assert_eq!(flatten(&released).len(), flatten(&tree).len());
        assert!(clone_tree(&tree, &CloneOptions::new("snap-x__21ww101a")).is_ok());

        assert_eq!(
            clone_tree(&tree, &CloneOptions::new("REL2.0").refuse_immutable_name()),
            Err(CloneError::ImmutableTarget {
                name: "REL2.0".into(),
                class: MutabilityClass::Release,
            })
        );
        assert!(matches!(
            clone_tree(
                &tree,
                &CloneOptions::new("snap-x__21ww101a").refuse_immutable_name()
            ),
            Err(CloneError::ImmutableTarget { .. })
        ));
        assert!(clone_tree(&tree, &CloneOptions::new("bx__dev").refuse_immutable_name()).is_ok());
    }

    #[test]
    fn shared_nodes_stay_shared() {
        let d = composite("P/D/dev", vec![leaf("P/D/rtl/dev", "@1")]);
        let tree = composite(
            "P/A/dev",
            vec![
                composite("P/B/dev", vec![d.clone()]),
                composite("P/C/dev", vec![d]),
            ],
        );

        let cloned = clone_tree(&tree, &CloneOptions::new("bx__dev")).unwrap();
        let via_b = &cloned.children()[0].children()[0];
        let via_c = &cloned.children()[1].children()[0];
        assert!(Arc::ptr_eq(via_b, via_c));
    }

    #[test]
    fn mixed_names_clash() {
        let tree = composite(
            "P/A/dev",
            vec![
                composite("P/B/dev", vec![leaf("P/B/rtl/dev", "@1")]),
                composite("P/B/REL1.0", vec![leaf("P/B/rtl/REL1.0", "@1")]),
            ],
        );

        let err = clone_tree(&tree, &CloneOptions::new("bx__dev")).unwrap_err();
        assert_eq!(
            err,
            CloneError::IdentityClash {
                target: id("P/B/rtl/bx__dev"),
                first: id("P/B/rtl/dev"),
                second: id("P/B/rtl/REL1.0"),
            }
        );
    }

    #[test]
    fn deep_chain_clones_without_recursion() {
        let mut node = leaf("P/V0/rtl/dev", "@1");
        for i in 1..20_000 {
            node = composite(&format!("P/V{i}/dev"), vec![node]);
        }

        let options = CloneOptions::new("bx__dev").with_filter(LibtypeFilter::new(["rtl"]));
        let cloned = clone_tree(&node, &options).unwrap();

        let entries = flatten(&cloned);
        assert_eq!(entries.len(), 20_000);
        assert_eq!(entries.last().map(|e| e.node.id()), Some(&id("P/V0/rtl/bx__dev")));
        drop(entries);
        drop(cloned);
        drop(node);
    }

    #[test]
    fn deterministic() {
        let tree = deliverables();
        let options = CloneOptions::new("bx__dev").with_filter(LibtypeFilter::new(["lint", "spec"]));

        let a = clone_tree(&tree, &options).unwrap();
        let b = clone_tree(&tree, &options).unwrap();
        assert_eq!(a.render(), b.render());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
