//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! bomtree has two configuration scopes:
//! - **Global**: User-level settings
//! - **Project**: Overrides kept next to the tooling that drives resolution
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Project config file
//! 4. Explicit caller overrides (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$BOMTREE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/bomtree/config.toml`
//! 3. `~/.bomtree/config.toml` (canonical write location)
//!
//! # Project Config Locations
//!
//! Searched in order:
//! 1. `<dir>/.bomtree/config.toml` (canonical)
//! 2. `<dir>/.bomtree.toml` (compatibility, warns)
//!
//! # Example
//!
//! ```no_run
//! use bomtree::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(Some(Path::new("/path/to/project"))).unwrap();
//! let settings = result.config.resolver_settings();
//! println!("max concurrency: {}", settings.max_concurrency);
//! ```

pub mod schema;

pub use schema::{ConfigFile, ReportsSection, ResolverSection};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Default number of concurrent store lookups.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Errors from loading or writing settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read settings file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse settings file '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("cannot write settings file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid setting: {0}")]
    Invalid(String),

    #[error("cannot locate the home directory")]
    NoHome,
}

/// Non-fatal problem found while loading settings.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    /// The warning message.
    pub message: String,
    /// The path that triggered the warning.
    pub path: PathBuf,
}

/// Settings plus any warnings raised while loading them.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Any warnings generated during loading.
    pub warnings: Vec<ConfigWarning>,
}

/// Runtime settings for a resolution session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Maximum number of concurrent store lookups (at least 1).
    pub max_concurrency: usize,
    /// Deadline for one whole `resolve` call.
    pub deadline: Option<Duration>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            deadline: None,
        }
    }
}

/// Merged configuration from all sources.
///
/// Accessor methods apply precedence rules automatically: project config
/// overrides global config.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: ConfigFile,
    /// Project configuration (if found)
    pub project: Option<ConfigFile>,
    global_path: Option<PathBuf>,
    project_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `project_dir` is provided, also loads project-specific config.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed.
    /// Missing config files are not an error (defaults are used).
    pub fn load(project_dir: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let global_path = Self::find_global();
        Self::load_from(global_path.as_deref(), project_dir)
    }

    /// Load configuration from an explicit global file and project directory.
    pub fn load_from(
        global_path: Option<&Path>,
        project_dir: Option<&Path>,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let mut warnings = Vec::new();

        let global = match global_path {
            Some(path) if path.exists() => Self::read_config(path)?,
            _ => ConfigFile::default(),
        };
        let global_path = global_path.filter(|p| p.exists()).map(Path::to_path_buf);

        let (project, project_path) = match project_dir {
            Some(dir) => Self::load_project(dir, &mut warnings)?,
            None => (None, None),
        };

        global.validate()?;
        if let Some(ref p) = project {
            p.validate()?;
        }

        for warning in &warnings {
            tracing::warn!(path = %warning.path.display(), "{}", warning.message);
        }

        Ok(ConfigLoadResult {
            config: Config {
                global,
                project,
                global_path,
                project_path,
            },
            warnings,
        })
    }

    /// Locate the global config file, if any.
    fn find_global() -> Option<PathBuf> {
        // 1. Check $BOMTREE_CONFIG
        if let Ok(path) = std::env::var("BOMTREE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check $XDG_CONFIG_HOME/bomtree/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("bomtree/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Check ~/.bomtree/config.toml
        dirs::home_dir()
            .map(|home| home.join(".bomtree/config.toml"))
            .filter(|path| path.exists())
    }

    /// Load project configuration from standard locations.
    fn load_project(
        dir: &Path,
        warnings: &mut Vec<ConfigWarning>,
    ) -> Result<(Option<ConfigFile>, Option<PathBuf>), ConfigError> {
        let canonical = Self::project_config_path(dir);
        if canonical.exists() {
            let config = Self::read_config(&canonical)?;
            return Ok((Some(config), Some(canonical)));
        }

        let compat = dir.join(".bomtree.toml");
        if compat.exists() {
            warnings.push(ConfigWarning {
                message: format!(
                    "Using deprecated config location. Please move to '{}'",
                    canonical.display()
                ),
                path: compat.clone(),
            });
            let config = Self::read_config(&compat)?;
            return Ok((Some(config), Some(compat)));
        }

        Ok((None, None))
    }

    /// Read and parse a config file.
    fn read_config(path: &Path) -> Result<ConfigFile, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the canonical path for global config.
    ///
    /// Returns `~/.bomtree/config.toml`.
    pub fn global_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
        Ok(home.join(".bomtree/config.toml"))
    }

    /// Get the canonical path for project config.
    pub fn project_config_path(dir: &Path) -> PathBuf {
        dir.join(".bomtree/config.toml")
    }

    /// Write project config atomically.
    pub fn write_project(dir: &Path, config: &ConfigFile) -> Result<PathBuf, ConfigError> {
        config.validate()?;
        let path = Self::project_config_path(dir);
        Self::write_config_atomic(&path, config)?;
        Ok(path)
    }

    /// Write a config file atomically (temp file, then rename).
    fn write_config_atomic(path: &Path, config: &ConfigFile) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::Write {
            path: temp_path.clone(),
            source: e,
        })?;

        file.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::Write {
                path: temp_path.clone(),
                source: e,
            })?;

        file.sync_all().map_err(|e| ConfigError::Write {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    // Accessors: project values win over global ones.

    fn resolver_value<T>(&self, get: impl Fn(&ResolverSection) -> Option<T>) -> Option<T> {
        self.project
            .as_ref()
            .and_then(|p| p.resolver.as_ref())
            .and_then(&get)
            .or_else(|| self.global.resolver.as_ref().and_then(&get))
    }

    /// Maximum concurrent store lookups.
    ///
    /// Defaults to [`DEFAULT_MAX_CONCURRENCY`] if not configured.
    pub fn max_concurrency(&self) -> usize {
        self.resolver_value(|r| r.max_concurrency)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
    }

    /// Deadline for a whole resolution. `None` means no deadline.
    pub fn deadline(&self) -> Option<Duration> {
        self.resolver_value(|r| r.deadline_secs)
            .map(Duration::from_secs)
    }

    /// Whether parent reports include `tnr-placeholder` configurations.
    ///
    /// Defaults to `false` if not configured.
    pub fn include_placeholders(&self) -> bool {
        self.project
            .as_ref()
            .and_then(|p| p.reports.as_ref())
            .and_then(|r| r.include_placeholders)
            .or_else(|| {
                self.global
                    .reports
                    .as_ref()
                    .and_then(|r| r.include_placeholders)
            })
            .unwrap_or(false)
    }

    /// Runtime settings for a [`Resolver`](crate::bom::Resolver) session.
    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            max_concurrency: self.max_concurrency(),
            deadline: self.deadline(),
        }
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded project config file.
    pub fn project_config_loaded_from(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }
}
