//! store::traits
//!
//! Backing store trait definition.
//!
//! # Design
//!
//! The `ConfigStore` trait is async because store operations involve
//! network I/O. All methods return `Result` to handle store failures.
//!
//! The resolver treats the store as authoritative for whether an identity
//! is a composite or a leaf. `lookup` must be idempotent and free of side
//! effects from the resolver's point of view. Retry and request timeout
//! policy belongs to the implementation, never to the resolver.
//!
//! # Example
//!
//! ```no_run
//! use bomtree::store::{ConfigStore, StoreError, StoreRecord};
//! use bomtree::core::types::ConfigId;
//!
//! async fn children(store: &dyn ConfigStore, id: &ConfigId) -> Result<usize, StoreError> {
//!     match store.lookup(id).await? {
//!         StoreRecord::Composite { children } => Ok(children.len()),
//!         StoreRecord::Leaf { .. } => Ok(0),
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{ArtifactRef, ConfigId};

/// Errors from store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The requested configuration does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store did not answer within its request timeout.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The store could not be reached or failed transiently.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A configuration with this identity already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),
}

impl StoreError {
    /// Whether the caller may retry the operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }
}

/// What the store knows about one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreRecord {
    /// A configuration composed of other configurations, in declaration order.
    Composite { children: Vec<ConfigId> },
    /// A configuration pinned to one artifact. `None` marks a declared but
    /// not yet populated placeholder.
    Leaf {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact: Option<ArtifactRef>,
    },
}

impl StoreRecord {
    /// Convenience constructor for a populated leaf.
    pub fn leaf(artifact: ArtifactRef) -> Self {
        StoreRecord::Leaf {
            artifact: Some(artifact),
        }
    }

    pub fn composite(children: Vec<ConfigId>) -> Self {
        StoreRecord::Composite { children }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, StoreRecord::Composite { .. })
    }
}

/// The backing configuration store.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so one store handle can serve the
/// concurrent lookups of a resolution session.
///
/// # Error Handling
///
/// - `NotFound`: the identity does not exist
/// - `Timeout` / `Unavailable`: transient, the caller may retry
/// - `AlreadyExists`: `create` on an existing identity
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Get the store name (e.g., "mock", "snapshot").
    fn name(&self) -> &'static str;

    /// Look up one configuration.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the identity does not exist
    /// - `Timeout` / `Unavailable` on transport failure
    async fn lookup(&self, id: &ConfigId) -> Result<StoreRecord, StoreError>;

    /// Create one configuration.
    ///
    /// Children referenced by a composite record must already exist.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the identity is taken
    /// - `NotFound` if a referenced child does not exist
    async fn create(&self, id: &ConfigId, record: &StoreRecord) -> Result<(), StoreError>;
}
