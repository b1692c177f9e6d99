//! store
//!
//! Backing configuration store abstraction.
//!
//! # Architecture
//!
//! The store is the authority on what a configuration contains. The core
//! only consumes it through the [`ConfigStore`] trait:
//!
//! - [`traits`] - `ConfigStore` trait, records and errors
//! - [`mock`] - In-memory store for deterministic tests
//! - [`snapshot`] - Store backed by a JSON or TOML snapshot file
//! - [`persist()`] - Writes a cloned tree through `ConfigStore::create`

pub mod mock;
mod persist;
pub mod snapshot;
pub mod traits;

pub use persist::{persist, persist_with, PersistOptions, PersistReport};
pub use traits::{ConfigStore, StoreError, StoreRecord};
