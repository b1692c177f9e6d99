//! bom
//!
//! Configuration trees: model, resolution, and transforms.
//!
//! # Modules
//!
//! - [`node`] - Immutable composite/leaf node model and text report
//! - [`resolver`] - Builds a tree from a store with caching and cycle detection
//! - [`flatten`] - Path-preserving pre-order linearization
//! - [`clone`] - Structural clone under a new configuration name
//! - [`query`] - Search, parents, readiness and location queries

pub mod clone;
pub mod flatten;
pub mod node;
pub mod query;
pub mod resolver;

pub use clone::{clone_tree, CloneError, CloneOptions};
pub use flatten::{flatten, flatten_leaves_only, unique_nodes, FlatEntry};
pub use node::{CompositeNode, ConfigNode, LeafNode, RenderOptions, ShapeError};
pub use query::{QueryError, SearchCriteria};
pub use resolver::{ResolveError, Resolver};
