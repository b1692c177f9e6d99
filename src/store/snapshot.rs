//! store::snapshot
//!
//! Store backed by a snapshot file of store records.
//!
//! # Design
//!
//! A snapshot is a point-in-time export of the records reachable from one or
//! more roots. It is loaded fully into memory; `create` adds records in
//! memory and [`SnapshotStore::save`] writes them back atomically.
//!
//! # Format
//!
//! JSON or TOML, selected by file extension:
//!
//! ```toml
//! [records."i10/cpu/dev"]
//! kind = "composite"
//! children = ["i10/cpu/rtl/dev", "i10/alu/dev"]
//!
//! [records."i10/cpu/rtl/dev"]
//! kind = "leaf"
//! artifact = "@1234"
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

use super::traits::{ConfigStore, StoreError, StoreRecord};
use crate::core::types::ConfigId;

/// Errors from reading or writing snapshot files.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse snapshot '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("failed to write snapshot '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unsupported snapshot format for '{0}' (expected .json or .toml)")]
    UnsupportedFormat(PathBuf),

    #[error("failed to serialize snapshot: {0}")]
    Serialize(String),
}

/// Snapshot file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Toml,
}

impl SnapshotFormat {
    /// Detect the format from a file extension.
    ///
    /// # Example
    ///
    /// ```
    /// use bomtree::store::snapshot::SnapshotFormat;
    /// use std::path::Path;
    ///
    /// assert_eq!(SnapshotFormat::detect(Path::new("bom.json")), Some(SnapshotFormat::Json));
    /// assert_eq!(SnapshotFormat::detect(Path::new("bom.TOML")), Some(SnapshotFormat::Toml));
    /// assert_eq!(SnapshotFormat::detect(Path::new("bom.yaml")), None);
    /// ```
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "json" => Some(SnapshotFormat::Json),
            "toml" => Some(SnapshotFormat::Toml),
            _ => None,
        }
    }
}

/// On-disk snapshot document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub records: BTreeMap<ConfigId, StoreRecord>,
}

/// A `ConfigStore` serving records from a snapshot.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    records: RwLock<BTreeMap<ConfigId, StoreRecord>>,
}

impl SnapshotStore {
    /// Create a store from an in-memory document.
    pub fn from_document(document: SnapshotDocument) -> Self {
        Self {
            records: RwLock::new(document.records),
        }
    }

    /// Load a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has an unknown
    /// extension, or does not parse.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let format = SnapshotFormat::detect(path)
            .ok_or_else(|| SnapshotError::UnsupportedFormat(path.to_path_buf()))?;

        let contents = fs::read_to_string(path).map_err(|e| SnapshotError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let parse_error = |message: String| SnapshotError::Parse {
            path: path.to_path_buf(),
            message,
        };
        let document: SnapshotDocument = match format {
            SnapshotFormat::Json => {
                serde_json::from_str(&contents).map_err(|e| parse_error(e.to_string()))?
            }
            SnapshotFormat::Toml => {
                toml::from_str(&contents).map_err(|e| parse_error(e.to_string()))?
            }
        };

        tracing::debug!(
            path = %path.display(),
            records = document.records.len(),
            "loaded snapshot"
        );
        Ok(Self::from_document(document))
    }

    /// Export the current records.
    pub fn document(&self) -> SnapshotDocument {
        let records = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        SnapshotDocument { records }
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the current records atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let format = SnapshotFormat::detect(path)
            .ok_or_else(|| SnapshotError::UnsupportedFormat(path.to_path_buf()))?;
        let document = self.document();

        let contents = match format {
            SnapshotFormat::Json => serde_json::to_string_pretty(&document)
                .map_err(|e| SnapshotError::Serialize(e.to_string()))?,
            SnapshotFormat::Toml => toml::to_string_pretty(&document)
                .map_err(|e| SnapshotError::Serialize(e.to_string()))?,
        };

        let write_error = |p: &Path, e: std::io::Error| SnapshotError::Write {
            path: p.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_error(path, e))?;
        }

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| write_error(&temp_path, e))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| write_error(&temp_path, e))?;
        file.sync_all().map_err(|e| write_error(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| write_error(path, e))?;

        Ok(())
    }
}

#[async_trait]
impl ConfigStore for SnapshotStore {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn lookup(&self, id: &ConfigId) -> Result<StoreRecord, StoreError> {
        tracing::debug!(%id, "snapshot lookup");
        let record = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        record.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn create(&self, id: &ConfigId, record: &StoreRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        if let StoreRecord::Composite { children } = record {
            if let Some(missing) = children.iter().find(|c| !records.contains_key(*c)) {
                return Err(StoreError::NotFound(missing.to_string()));
            }
        }
        tracing::debug!(%id, "snapshot create");
        records.insert(id.clone(), record.clone());
        Ok(())
    }
}
