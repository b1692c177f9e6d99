//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`ConfigId`] - Address of a configuration: project, variant, name and optional libtype
//! - [`ArtifactRef`] - Opaque pinned artifact version owned by the backing store
//! - [`LibtypeFilter`] - Set of libtypes used to restrict resolution and cloning
//! - [`Fingerprint`] - Content hash of a resolved tree
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use bomtree::core::types::ConfigId;
//!
//! // Valid constructions
//! let composite = ConfigId::new("i10", "cpu", "dev").unwrap();
//! let leaf = ConfigId::leaf("i10", "cpu", "rtl", "REL1.0").unwrap();
//! assert_eq!(composite.to_string(), "i10/cpu/dev");
//! assert_eq!(leaf.to_string(), "i10/cpu/rtl/REL1.0");
//!
//! // Invalid constructions fail at creation time
//! assert!(ConfigId::new("i10", "", "dev").is_err());
//! assert!(ConfigId::new("i10", "cpu", "has space").is_err());
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::naming::{classify, MutabilityClass};

/// Errors from type validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid {field}: {reason}")]
    InvalidComponent { field: &'static str, reason: String },

    #[error("invalid configuration name '{0}': expected project/variant/config or project/variant/libtype/config")]
    InvalidFullName(String),

    #[error("invalid artifact reference: {0}")]
    InvalidArtifactRef(String),
}

/// Characters that separate components in full-name forms.
const SEPARATORS: [char; 3] = ['/', '@', ':'];

/// Validate a single identity component (project, variant, name or libtype).
fn validate_component(field: &'static str, value: &str) -> Result<(), TypeError> {
    if value.is_empty() {
        return Err(TypeError::InvalidComponent {
            field,
            reason: "cannot be empty".into(),
        });
    }

    for c in SEPARATORS {
        if value.contains(c) {
            return Err(TypeError::InvalidComponent {
                field,
                reason: format!("'{value}' cannot contain '{c}'"),
            });
        }
    }

    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(TypeError::InvalidComponent {
            field,
            reason: format!("'{value}' cannot contain whitespace or control characters"),
        });
    }

    Ok(())
}

/// Address of a configuration in the backing store.
///
/// A composite (variant-level) configuration has no libtype; a leaf
/// configuration pins one libtype. Equality is structural.
///
/// # Example
///
/// ```
/// use bomtree::core::types::ConfigId;
///
/// let id = ConfigId::parse("i10/cpu/ipspec/REL1.0").unwrap();
/// assert_eq!(id.project(), "i10");
/// assert_eq!(id.variant(), "cpu");
/// assert_eq!(id.libtype(), Some("ipspec"));
/// assert_eq!(id.name(), "REL1.0");
///
/// // Legacy form is accepted too
/// let legacy = ConfigId::parse("i10/cpu:ipspec@REL1.0").unwrap();
/// assert_eq!(id, legacy);
/// assert_eq!(legacy.legacy_name(), "i10/cpu:ipspec@REL1.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigId {
    project: String,
    variant: String,
    libtype: Option<String>,
    name: String,
}

impl ConfigId {
    /// Create a composite (variant-level) configuration identity.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidComponent` if any component is empty or
    /// contains a separator or whitespace.
    pub fn new(
        project: impl Into<String>,
        variant: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, TypeError> {
        Self::build(project.into(), variant.into(), None, name.into())
    }

    /// Create a leaf (libtype-level) configuration identity.
    pub fn leaf(
        project: impl Into<String>,
        variant: impl Into<String>,
        libtype: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, TypeError> {
        Self::build(
            project.into(),
            variant.into(),
            Some(libtype.into()),
            name.into(),
        )
    }

    fn build(
        project: String,
        variant: String,
        libtype: Option<String>,
        name: String,
    ) -> Result<Self, TypeError> {
        validate_component("project", &project)?;
        validate_component("variant", &variant)?;
        if let Some(lt) = &libtype {
            validate_component("libtype", lt)?;
        }
        validate_component("config name", &name)?;
        Ok(Self {
            project,
            variant,
            libtype,
            name,
        })
    }

    /// Parse a full configuration name.
    ///
    /// Accepted forms:
    /// - `project/variant/config`
    /// - `project/variant/libtype/config`
    /// - `project/variant@config` (legacy)
    /// - `project/variant:libtype@config` (legacy)
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidFullName` if the string matches none of the
    /// forms, or a component error if a component is invalid.
    pub fn parse(full_name: &str) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidFullName(full_name.to_string());

        if let Some((location, name)) = full_name.split_once('@') {
            let (project, rest) = location.split_once('/').ok_or_else(invalid)?;
            return match rest.split_once(':') {
                Some((variant, libtype)) => Self::leaf(project, variant, libtype, name),
                None => Self::new(project, rest, name),
            };
        }

        let parts: Vec<&str> = full_name.split('/').collect();
        match parts.as_slice() {
            [project, variant, name] => Self::new(*project, *variant, *name),
            [project, variant, libtype, name] => Self::leaf(*project, *variant, *libtype, *name),
            _ => Err(invalid()),
        }
    }

    /// Project (organizational scope).
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Variant (design unit) name.
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Libtype, present only for leaf identities.
    pub fn libtype(&self) -> Option<&str> {
        self.libtype.as_deref()
    }

    /// Configuration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this identity addresses a libtype-level configuration.
    pub fn is_leaf(&self) -> bool {
        self.libtype.is_some()
    }

    /// Mutability class derived from the configuration name.
    pub fn mutability(&self) -> MutabilityClass {
        classify(&self.name)
    }

    /// The same location addressed under a different configuration name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidComponent` if `name` is not a valid component.
    pub fn with_name(&self, name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_component("config name", &name)?;
        Ok(Self {
            project: self.project.clone(),
            variant: self.variant.clone(),
            libtype: self.libtype.clone(),
            name,
        })
    }

    /// Location key ignoring the configuration name.
    pub fn location(&self) -> Location {
        Location {
            project: self.project.clone(),
            variant: self.variant.clone(),
            libtype: self.libtype.clone(),
        }
    }

    /// Full name in the legacy `project/variant[:libtype]@config` form.
    pub fn legacy_name(&self) -> String {
        match &self.libtype {
            Some(lt) => format!("{}/{}:{}@{}", self.project, self.variant, lt, self.name),
            None => format!("{}/{}@{}", self.project, self.variant, self.name),
        }
    }
}

impl TryFrom<String> for ConfigId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ConfigId> for String {
    fn from(id: ConfigId) -> Self {
        id.to_string()
    }
}

impl std::str::FromStr for ConfigId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ConfigId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.libtype {
            Some(lt) => write!(f, "{}/{}/{}/{}", self.project, self.variant, lt, self.name),
            None => write!(f, "{}/{}/{}", self.project, self.variant, self.name),
        }
    }
}

/// Location of a configuration in the store hierarchy, ignoring its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub project: String,
    pub variant: String,
    pub libtype: Option<String>,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.libtype {
            Some(lt) => write!(f, "{}/{}/{}", self.project, self.variant, lt),
            None => write!(f, "{}/{}", self.project, self.variant),
        }
    }
}

/// Opaque pinned artifact version (changelist, library/release path, ...).
///
/// The core never interprets the value; it is owned by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactRef(String);

impl ArtifactRef {
    /// Create a new artifact reference.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidArtifactRef` if the value is empty.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(TypeError::InvalidArtifactRef(
                "artifact reference cannot be empty".into(),
            ));
        }
        Ok(Self(value))
    }

    /// Get the reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ArtifactRef {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ArtifactRef> for String {
    fn from(r: ArtifactRef) -> Self {
        r.0
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A set of libtypes restricting which leaves are relevant.
///
/// # Example
///
/// ```
/// use bomtree::core::types::LibtypeFilter;
///
/// let filter = LibtypeFilter::new(["rtl", "lint"]);
/// assert!(filter.matches("rtl"));
/// assert!(!filter.matches("spec"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibtypeFilter(BTreeSet<String>);

impl LibtypeFilter {
    /// Build a filter from libtype names.
    pub fn new<I, S>(libtypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(libtypes.into_iter().map(Into::into).collect())
    }

    /// Whether `libtype` is in the filter.
    pub fn matches(&self, libtype: &str) -> bool {
        self.0.contains(libtype)
    }

    /// Whether a child identity should be visited under this filter.
    ///
    /// Composite identities always pass; only leaves are filtered.
    pub fn admits(&self, id: &ConfigId) -> bool {
        id.libtype().map_or(true, |lt| self.matches(lt))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl std::fmt::Display for LibtypeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{{{}}}", joined.join(", "))
    }
}

/// Content hash of a resolved tree.
///
/// Two trees with equal fingerprints render identically and pin the same
/// artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint from ordered `(depth, identity, artifact)` rows.
    ///
    /// Unlike a set hash, row order is significant: declaration order is
    /// part of a configuration's content.
    pub fn compute<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (usize, &'a ConfigId, Option<&'a ArtifactRef>)>,
    {
        let mut hasher = Sha256::new();
        for (depth, id, artifact) in rows {
            hasher.update(depth.to_le_bytes());
            hasher.update(b"\0");
            hasher.update(id.to_string().as_bytes());
            hasher.update(b"\0");
            if let Some(artifact) = artifact {
                hasher.update(artifact.as_str().as_bytes());
            }
            hasher.update(b"\n");
        }

        let result = hasher.finalize();
        Self(hex::encode(result))
    }

    /// Get the fingerprint as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod config_id {
        use super::*;

        #[test]
        fn valid_identities() {
            assert!(ConfigId::new("i10", "cpu", "dev").is_ok());
            assert!(ConfigId::new("i10", "cpu", "REL1.0").is_ok());
            assert!(ConfigId::new("i10", "cpu", "snap-cpu__21ww101a").is_ok());
            assert!(ConfigId::leaf("i10", "cpu", "rtl", "dev").is_ok());
        }

        #[test]
        fn empty_component_rejected() {
            assert!(ConfigId::new("", "cpu", "dev").is_err());
            assert!(ConfigId::new("i10", "", "dev").is_err());
            assert!(ConfigId::new("i10", "cpu", "").is_err());
            assert!(ConfigId::leaf("i10", "cpu", "", "dev").is_err());
        }

        #[test]
        fn separators_rejected() {
            assert!(ConfigId::new("i10", "cpu/core", "dev").is_err());
            assert!(ConfigId::new("i10", "cpu", "dev@1").is_err());
            assert!(ConfigId::leaf("i10", "cpu", "rtl:x", "dev").is_err());
        }

        #[test]
        fn whitespace_rejected() {
            let err = ConfigId::new("i10", "cpu", "my config").unwrap_err();
            assert!(matches!(
                err,
                TypeError::InvalidComponent {
                    field: "config name",
                    ..
                }
            ));
        }

        #[test]
        fn display_forms() {
            let composite = ConfigId::new("P", "V", "REL1.0").unwrap();
            let leaf = ConfigId::leaf("P", "V", "ipspec", "REL1.0").unwrap();
            assert_eq!(composite.to_string(), "P/V/REL1.0");
            assert_eq!(leaf.to_string(), "P/V/ipspec/REL1.0");
            assert_eq!(composite.legacy_name(), "P/V@REL1.0");
            assert_eq!(leaf.legacy_name(), "P/V:ipspec@REL1.0");
        }

        #[test]
        fn parse_slash_forms() {
            let composite = ConfigId::parse("P/V/dev").unwrap();
            assert_eq!(composite, ConfigId::new("P", "V", "dev").unwrap());
            assert!(!composite.is_leaf());

            let leaf = ConfigId::parse("P/V/rtl/dev").unwrap();
            assert_eq!(leaf, ConfigId::leaf("P", "V", "rtl", "dev").unwrap());
            assert!(leaf.is_leaf());
        }

        #[test]
        fn parse_legacy_forms() {
            assert_eq!(
                ConfigId::parse("P/V@dev").unwrap(),
                ConfigId::new("P", "V", "dev").unwrap()
            );
            assert_eq!(
                ConfigId::parse("P/V:rtl@dev").unwrap(),
                ConfigId::leaf("P", "V", "rtl", "dev").unwrap()
            );
        }

        #[test]
        fn parse_rejects_malformed() {
            assert!(matches!(
                ConfigId::parse("P/V"),
                Err(TypeError::InvalidFullName(_))
            ));
            assert!(ConfigId::parse("P/V/a/b/c").is_err());
            assert!(ConfigId::parse("PV@dev").is_err());
            assert!(ConfigId::parse("").is_err());
        }

        #[test]
        fn with_name_keeps_location() {
            let leaf = ConfigId::leaf("P", "V", "rtl", "dev").unwrap();
            let renamed = leaf.with_name("bfoo__dev").unwrap();
            assert_eq!(renamed.location(), leaf.location());
            assert_eq!(renamed.name(), "bfoo__dev");
            assert!(leaf.with_name("bad name").is_err());
        }

        #[test]
        fn serde_uses_full_name() {
            let leaf = ConfigId::leaf("P", "V", "rtl", "dev").unwrap();
            let json = serde_json::to_string(&leaf).unwrap();
            assert_eq!(json, "\"P/V/rtl/dev\"");
            let parsed: ConfigId = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, leaf);
        }
    }

    mod artifact_ref {
        use super::*;

        #[test]
        fn empty_rejected() {
            assert!(ArtifactRef::new("").is_err());
            assert!(ArtifactRef::new("   ").is_err());
            assert_eq!(ArtifactRef::new("@1234").unwrap().as_str(), "@1234");
        }
    }

    mod libtype_filter {
        use super::*;

        #[test]
        fn admits_composites_and_matching_leaves() {
            let filter = LibtypeFilter::new(["rtl"]);
            assert!(filter.admits(&ConfigId::new("P", "V", "dev").unwrap()));
            assert!(filter.admits(&ConfigId::leaf("P", "V", "rtl", "dev").unwrap()));
            assert!(!filter.admits(&ConfigId::leaf("P", "V", "lint", "dev").unwrap()));
        }

        #[test]
        fn display_is_sorted() {
            let filter = LibtypeFilter::new(["rtl", "lint", "spec"]);
            assert_eq!(filter.to_string(), "{lint, rtl, spec}");
        }
    }

    mod fingerprint {
        use super::*;

        #[test]
        fn order_is_significant() {
            let a = ConfigId::new("P", "A", "dev").unwrap();
            let b = ConfigId::new("P", "B", "dev").unwrap();

            let fp1 = Fingerprint::compute([(0, &a, None), (1, &b, None)]);
            let fp2 = Fingerprint::compute([(0, &a, None), (1, &b, None)]);
            let fp3 = Fingerprint::compute([(0, &b, None), (1, &a, None)]);

            assert_eq!(fp1, fp2);
            assert_ne!(fp1, fp3);
            assert_eq!(fp1.as_str().len(), 64);
        }

        #[test]
        fn artifact_changes_fingerprint() {
            let leaf = ConfigId::leaf("P", "V", "rtl", "dev").unwrap();
            let r1 = ArtifactRef::new("@100").unwrap();
            let r2 = ArtifactRef::new("@101").unwrap();

            assert_ne!(
                Fingerprint::compute([(0, &leaf, Some(&r1))]),
                Fingerprint::compute([(0, &leaf, Some(&r2))])
            );
        }
    }
}
