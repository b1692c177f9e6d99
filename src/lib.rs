//! bomtree - Hierarchical configuration (BOM) resolution engine
//!
//! A configuration names how a design unit ("variant") is assembled from
//! other configurations and from pinned deliverable artifacts ("libtypes").
//! bomtree resolves such configurations from a backing store into immutable
//! trees, refuses cycles, flattens trees deterministically for reporting,
//! and clones them under new names for branch creation.
//!
//! # Architecture
//!
//! The codebase is layered leaf-first:
//!
//! - [`core`] - Identities, name classification, settings
//! - [`store`] - The backing store trait, an in-memory mock and a snapshot store
//! - [`bom`] - Node model, resolver, flattener, cloner and queries
//!
//! # Correctness Invariants
//!
//! bomtree maintains the following invariants:
//!
//! 1. No resolved tree contains an identity cycle
//! 2. Within one resolver session an identity maps to exactly one node
//! 3. Resolution errors abort the build; partial trees are never returned
//! 4. Flatten and render order is the store's declaration order
//!
//! # Example
//!
//! ```
//! use bomtree::bom::{clone_tree, flatten, CloneOptions, Resolver};
//! use bomtree::core::types::{ConfigId, LibtypeFilter};
//! use bomtree::store::mock::MockStore;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let cpu = ConfigId::parse("i10/cpu/dev").unwrap();
//! let alu = ConfigId::parse("i10/alu/REL2.0").unwrap();
//! let cpu_rtl = ConfigId::parse("i10/cpu/rtl/dev").unwrap();
//! let alu_rtl = ConfigId::parse("i10/alu/rtl/REL2.0").unwrap();
//! let store = MockStore::new()
//!     .with_composite(cpu.clone(), vec![cpu_rtl.clone(), alu.clone()])
//!     .with_composite(alu, vec![alu_rtl.clone()])
//!     .with_leaf(cpu_rtl, "@100")
//!     .with_leaf(alu_rtl, "@42");
//!
//! let resolver = Resolver::with_defaults(Arc::new(store));
//! let tree = resolver.resolve(&cpu).await?;
//! assert_eq!(flatten(&tree).len(), 4);
//!
//! let options = CloneOptions::new("bfeature__dev").with_filter(LibtypeFilter::new(["rtl"]));
//! let branch = clone_tree(&tree, &options)?;
//! assert!(branch.render().starts_with("i10/cpu/bfeature__dev\n"));
//! # Ok::<(), bomtree::Error>(())
//! # }).unwrap();
//! ```

pub mod bom;
pub mod core;
pub mod store;

use thiserror::Error;

/// Any error produced by bomtree.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Type(#[from] crate::core::types::TypeError),

    #[error(transparent)]
    Config(#[from] crate::core::config::ConfigError),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Snapshot(#[from] crate::store::snapshot::SnapshotError),

    #[error(transparent)]
    Resolve(#[from] crate::bom::ResolveError),

    #[error(transparent)]
    Clone(#[from] crate::bom::CloneError),

    #[error(transparent)]
    Query(#[from] crate::bom::QueryError),
}

/// Result alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
