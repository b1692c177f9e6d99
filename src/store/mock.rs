//! store::mock
//!
//! Mock store implementation for deterministic testing.
//!
//! # Design
//!
//! The mock store provides a deterministic implementation of the
//! `ConfigStore` trait. It keeps records in memory, records every call,
//! allows configuring failure scenarios, and can delay lookups to exercise
//! concurrent resolution.
//!
//! # Example
//!
//! ```
//! use bomtree::store::mock::MockStore;
//! use bomtree::store::{ConfigStore, StoreRecord};
//! use bomtree::core::types::ConfigId;
//!
//! # tokio_test::block_on(async {
//! let root = ConfigId::parse("P/V/dev").unwrap();
//! let rtl = ConfigId::parse("P/V/rtl/dev").unwrap();
//!
//! let store = MockStore::new()
//!     .with_composite(root.clone(), vec![rtl.clone()])
//!     .with_leaf(rtl.clone(), "@100");
//!
//! let record = store.lookup(&root).await.unwrap();
//! assert_eq!(record, StoreRecord::composite(vec![rtl]));
//! assert_eq!(store.lookup_count(&root), 1);
//! # });
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::traits::{ConfigStore, StoreError, StoreRecord};
use crate::core::types::{ArtifactRef, ConfigId};

/// Mock store for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MockStore {
    inner: Arc<Mutex<MockStoreInner>>,
}

#[derive(Debug, Default)]
struct MockStoreInner {
    /// Stored records by identity.
    records: HashMap<ConfigId, StoreRecord>,
    /// Failure configuration.
    fail_on: Vec<FailOn>,
    /// Recorded operations for verification.
    operations: Vec<MockOperation>,
    /// Artificial delay applied to every lookup.
    latency: Option<Duration>,
    /// Lookups currently awaiting their delay.
    in_flight: usize,
    /// Highest `in_flight` value observed.
    peak_in_flight: usize,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail every lookup with the given error.
    Lookup(StoreError),
    /// Fail lookups of one identity with the given error.
    LookupOf(ConfigId, StoreError),
    /// Fail every create with the given error.
    Create(StoreError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Lookup { id: ConfigId },
    Create { id: ConfigId, record: StoreRecord },
}

impl MockStore {
    /// Create a new empty mock store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockStoreInner::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockStoreInner> {
        // A panicking test thread must not cascade into unrelated assertions.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a record.
    pub fn with_record(self, id: ConfigId, record: StoreRecord) -> Self {
        self.insert(id, record);
        self
    }

    /// Add a composite record with children in declaration order.
    pub fn with_composite(self, id: ConfigId, children: Vec<ConfigId>) -> Self {
        self.with_record(id, StoreRecord::Composite { children })
    }

    /// Add a leaf record pinned to `artifact`.
    ///
    /// # Panics
    ///
    /// Panics if `artifact` is empty.
    pub fn with_leaf(self, id: ConfigId, artifact: &str) -> Self {
        let artifact = ArtifactRef::new(artifact).unwrap_or_else(|e| panic!("{e}"));
        self.with_record(id, StoreRecord::leaf(artifact))
    }

    /// Delay every lookup by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Configure the mock to fail on an operation. May be called repeatedly.
    ///
    /// # Example
    ///
    /// ```
    /// use bomtree::store::mock::{MockStore, FailOn};
    /// use bomtree::store::StoreError;
    ///
    /// let store = MockStore::new()
    ///     .fail_on(FailOn::Lookup(StoreError::Unavailable("down".into())));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.lock().fail_on.push(fail_on);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.lock().fail_on.clear();
    }

    /// Insert or replace a record.
    ///
    /// Simulates the store changing between two resolution sessions.
    pub fn insert(&self, id: ConfigId, record: StoreRecord) {
        self.lock().records.insert(id, record);
    }

    /// Get a record (for test verification).
    pub fn record(&self, id: &ConfigId) -> Option<StoreRecord> {
        self.lock().records.get(id).cloned()
    }

    /// Get the count of records.
    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Number of lookups issued for `id`.
    pub fn lookup_count(&self, id: &ConfigId) -> usize {
        self.lock()
            .operations
            .iter()
            .filter(|op| matches!(op, MockOperation::Lookup { id: looked } if looked == id))
            .count()
    }

    /// Total number of lookups issued.
    pub fn total_lookups(&self) -> usize {
        self.lock()
            .operations
            .iter()
            .filter(|op| matches!(op, MockOperation::Lookup { .. }))
            .count()
    }

    /// Highest number of lookups that were in flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.lock().peak_in_flight
    }

    fn lookup_failure(&self, id: &ConfigId) -> Option<StoreError> {
        self.lock().fail_on.iter().find_map(|f| match f {
            FailOn::Lookup(e) => Some(e.clone()),
            FailOn::LookupOf(target, e) if target == id => Some(e.clone()),
            _ => None,
        })
    }

    fn create_failure(&self) -> Option<StoreError> {
        self.lock().fail_on.iter().find_map(|f| match f {
            FailOn::Create(e) => Some(e.clone()),
            _ => None,
        })
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for MockStore {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn lookup(&self, id: &ConfigId) -> Result<StoreRecord, StoreError> {
        let latency = {
            let mut inner = self.lock();
            inner.operations.push(MockOperation::Lookup { id: id.clone() });
            inner.in_flight += 1;
            inner.peak_in_flight = inner.peak_in_flight.max(inner.in_flight);
            inner.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.lock().in_flight -= 1;

        if let Some(err) = self.lookup_failure(id) {
            return Err(err);
        }

        let record = self.lock().records.get(id).cloned();
        record.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn create(&self, id: &ConfigId, record: &StoreRecord) -> Result<(), StoreError> {
        self.lock().operations.push(MockOperation::Create {
            id: id.clone(),
            record: record.clone(),
        });

        if let Some(err) = self.create_failure() {
            return Err(err);
        }

        let mut inner = self.lock();
        if inner.records.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        if let StoreRecord::Composite { children } = record {
            if let Some(missing) = children.iter().find(|c| !inner.records.contains_key(*c)) {
                return Err(StoreError::NotFound(missing.to_string()));
            }
        }
        inner.records.insert(id.clone(), record.clone());
        Ok(())
    }
}
