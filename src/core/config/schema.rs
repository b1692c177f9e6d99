//! core::config::schema
//!
//! Configuration schema types.
//!
//! The same file schema is used for both scopes. Global config is located at
//! (in order of precedence):
//! 1. `$BOMTREE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/bomtree/config.toml`
//! 3. `~/.bomtree/config.toml` (canonical write location)
//!
//! Project config lives at `<project dir>/.bomtree/config.toml`.
//!
//! # Validation
//!
//! Config values are validated after parsing to ensure they are in range
//! (e.g., concurrency must be at least one).

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// A configuration file (either scope).
///
/// # Example
///
/// ```toml
/// [resolver]
/// max_concurrency = 16
/// deadline_secs = 120
///
/// [reports]
/// include_placeholders = false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Resolution settings
    pub resolver: Option<ResolverSection>,

    /// Report defaults
    pub reports: Option<ReportsSection>,
}

impl ConfigFile {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(resolver) = &self.resolver {
            resolver.validate()?;
        }
        Ok(())
    }
}

/// `[resolver]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSection {
    /// Maximum number of concurrent store lookups
    pub max_concurrency: Option<usize>,

    /// Deadline for one whole tree resolution, in seconds
    pub deadline_secs: Option<u64>,
}

impl ResolverSection {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::Invalid(
                "resolver.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.deadline_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "resolver.deadline_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[reports]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReportsSection {
    /// Include `tnr-placeholder` configurations in parent reports
    pub include_placeholders: Option<bool>,
}
