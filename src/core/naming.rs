//! core::naming
//!
//! Configuration naming rules.
//!
//! # Features
//!
//! - Classify a configuration name into its mutability class
//! - Parse the structured release, branch, snapshot and WIP name forms
//! - Normalize names for embedding into other names
//!
//! Every decision that depends on whether a configuration is a release,
//! snapshot, placeholder or mutable head goes through [`classify`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Name prefix of certified releases.
pub const RELEASE_PREFIX: &str = "REL";
/// Name prefix of pre-releases.
pub const PRERELEASE_PREFIX: &str = "PREL";
/// Name prefix of snapshots.
pub const SNAPSHOT_PREFIX: &str = "snap-";
/// Name prefix of transient pipeline marker configurations.
pub const PLACEHOLDER_PREFIX: &str = "tnr-placeholder";

/// Mutability class encoded in a configuration name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutabilityClass {
    /// Mutable head; any name without a recognized prefix.
    Dev,
    /// Immutable certified release (`REL...`).
    Release,
    /// Immutable pre-release (`PREL...`).
    Prerelease,
    /// Immutable snapshot (`snap-...`).
    Snapshot,
    /// Disposable marker used by automated pipelines (`tnr-placeholder...`).
    Placeholder,
}

impl MutabilityClass {
    /// Whether resolved content under this name can never change.
    pub fn is_immutable(self) -> bool {
        matches!(
            self,
            MutabilityClass::Release | MutabilityClass::Prerelease | MutabilityClass::Snapshot
        )
    }

    pub fn is_mutable(self) -> bool {
        !self.is_immutable()
    }
}

impl std::fmt::Display for MutabilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutabilityClass::Dev => write!(f, "dev"),
            MutabilityClass::Release => write!(f, "release"),
            MutabilityClass::Prerelease => write!(f, "prerelease"),
            MutabilityClass::Snapshot => write!(f, "snapshot"),
            MutabilityClass::Placeholder => write!(f, "placeholder"),
        }
    }
}

/// Classify a configuration name.
///
/// # Example
///
/// ```
/// use bomtree::core::naming::{classify, MutabilityClass};
///
/// assert_eq!(classify("dev"), MutabilityClass::Dev);
/// assert_eq!(classify("REL1.0"), MutabilityClass::Release);
/// assert_eq!(classify("PREL1.0"), MutabilityClass::Prerelease);
/// assert_eq!(classify("snap-cpu__21ww101a"), MutabilityClass::Snapshot);
/// assert_eq!(classify("tnr-placeholder-cpu-rtl-3"), MutabilityClass::Placeholder);
/// assert!(classify("REL1.0").is_immutable());
/// ```
pub fn classify(name: &str) -> MutabilityClass {
    if name.starts_with(RELEASE_PREFIX) {
        MutabilityClass::Release
    } else if name.starts_with(PRERELEASE_PREFIX) {
        MutabilityClass::Prerelease
    } else if name.starts_with(SNAPSHOT_PREFIX) {
        MutabilityClass::Snapshot
    } else if name.starts_with(PLACEHOLDER_PREFIX) {
        MutabilityClass::Placeholder
    } else {
        MutabilityClass::Dev
    }
}

/// Structured naming scheme a configuration name follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameScheme {
    Release,
    Branch,
    Snapshot,
    Wip,
}

impl std::fmt::Display for NameScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameScheme::Release => write!(f, "RELEASE"),
            NameScheme::Branch => write!(f, "BRANCH"),
            NameScheme::Snapshot => write!(f, "SNAP"),
            NameScheme::Wip => write!(f, "WIP"),
        }
    }
}

/// A configuration name parsed against the naming schemes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    /// The scheme that matched.
    pub scheme: NameScheme,
    /// Named fields captured by the scheme (milestone, thread, rev, label,
    /// year, ww, day, index, norm_ic, branch_id, wipname).
    pub fields: BTreeMap<String, String>,
}

impl ParsedName {
    /// Get a captured field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

const TIMESTAMP: &str = r"(?P<year>\d\d)ww(?P<ww>\d\d)(?P<day>\d)(?P<index>[a-z])";
const WORD: &str = r"[a-zA-Z]([_-]?[a-zA-Z0-9])*";

fn compile(pattern: String) -> Regex {
    // Patterns are compile-time constants covered by tests.
    Regex::new(&pattern).unwrap_or_else(|e| panic!("invalid naming pattern: {e}"))
}

static SCHEMES: LazyLock<Vec<(NameScheme, Regex)>> = LazyLock::new(|| {
    vec![
        (
            NameScheme::Release,
            compile(format!(
                r"^REL(?P<milestone>\d\.\d)(?P<thread>[A-Z]+\d*)rev(?P<rev>[A-Z]\d*(P[0-9]+)?)(--(?P<label>{WORD}))?__{TIMESTAMP}$"
            )),
        ),
        (
            NameScheme::Branch,
            compile(r"^b(?P<norm_ic>.+?)__(?P<branch_id>[a-zA-Z]([_-]?[a-zA-Z0-9])*)__dev$".to_string()),
        ),
        (
            NameScheme::Snapshot,
            compile(format!(r"^snap-(?P<norm_ic>.+)__{TIMESTAMP}$")),
        ),
        (
            NameScheme::Wip,
            compile(format!(r"^(?P<wipname>{WORD})__{TIMESTAMP}$")),
        ),
    ]
});

/// Parse a configuration name against the known schemes, in the order
/// release, branch, snapshot, WIP.
///
/// Returns `None` if the name follows none of them.
///
/// # Example
///
/// ```
/// use bomtree::core::naming::{parse_name, NameScheme};
///
/// let parsed = parse_name("REL4.5ND5revA--SECTOR-f1_and-f2__16ww072a").unwrap();
/// assert_eq!(parsed.scheme, NameScheme::Release);
/// assert_eq!(parsed.field("milestone"), Some("4.5"));
/// assert_eq!(parsed.field("thread"), Some("ND5"));
/// assert_eq!(parsed.field("label"), Some("SECTOR-f1_and-f2"));
///
/// assert!(parse_name("dev").is_none());
/// ```
pub fn parse_name(name: &str) -> Option<ParsedName> {
    SCHEMES.iter().find_map(|(scheme, re)| {
        let caps = re.captures(name)?;
        let fields = re
            .capture_names()
            .flatten()
            .filter_map(|field| {
                caps.name(field)
                    .map(|m| (field.to_string(), m.as_str().to_string()))
            })
            .collect();
        Some(ParsedName {
            scheme: *scheme,
            fields,
        })
    })
}

/// Normalize a name by collapsing `--` and `__` separators into `-`.
///
/// # Example
///
/// ```
/// use bomtree::core::naming::normalize;
///
/// assert_eq!(normalize("REL4.5ND5revA--SECTOR__16ww072a"), "REL4.5ND5revA-SECTOR-16ww072a");
/// ```
pub fn normalize(name: &str) -> String {
    name.replace("--", "-").replace("__", "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prefixes() {
        assert_eq!(classify("dev"), MutabilityClass::Dev);
        assert_eq!(classify("bfoo__dev"), MutabilityClass::Dev);
        assert_eq!(classify("RELX"), MutabilityClass::Release);
        assert_eq!(classify("PREL2.0"), MutabilityClass::Prerelease);
        assert_eq!(classify("snap-1"), MutabilityClass::Snapshot);
        assert_eq!(classify("tnr-placeholder-a-b-1"), MutabilityClass::Placeholder);
    }

    #[test]
    fn classify_is_case_sensitive() {
        assert_eq!(classify("rel1.0"), MutabilityClass::Dev);
        assert_eq!(classify("Snap-1"), MutabilityClass::Dev);
    }

    #[test]
    fn placeholder_is_mutable() {
        assert!(MutabilityClass::Placeholder.is_mutable());
        assert!(MutabilityClass::Dev.is_mutable());
        assert!(MutabilityClass::Snapshot.is_immutable());
        assert!(MutabilityClass::Prerelease.is_immutable());
    }

    #[test]
    fn parse_release() {
        let parsed = parse_name("REL4.5ND5revA__16ww072a").unwrap();
        assert_eq!(parsed.scheme, NameScheme::Release);
        assert_eq!(parsed.field("rev"), Some("A"));
        assert_eq!(parsed.field("year"), Some("16"));
        assert_eq!(parsed.field("ww"), Some("07"));
        assert_eq!(parsed.field("day"), Some("2"));
        assert_eq!(parsed.field("index"), Some("a"));
        assert_eq!(parsed.field("label"), None);
    }

    #[test]
    fn parse_branch() {
        let parsed =
            parse_name("bREL4.5ND5revA-SECTOR-f1-and-f2-16ww072a__this-is-branch-id__dev").unwrap();
        assert_eq!(parsed.scheme, NameScheme::Branch);
        assert_eq!(
            parsed.field("norm_ic"),
            Some("REL4.5ND5revA-SECTOR-f1-and-f2-16ww072a")
        );
        assert_eq!(parsed.field("branch_id"), Some("this-is-branch-id"));
    }

    #[test]
    fn parse_snapshot() {
        let parsed = parse_name("snap-REL4.5ND5revA-SECTOR-f1-and-f2-16ww072a__17ww234c").unwrap();
        assert_eq!(parsed.scheme, NameScheme::Snapshot);
        assert_eq!(
            parsed.field("norm_ic"),
            Some("REL4.5ND5revA-SECTOR-f1-and-f2-16ww072a")
        );
        assert_eq!(parsed.field("ww"), Some("23"));
    }

    #[test]
    fn parse_wip() {
        let parsed = parse_name("some-normal-texts__17ww234c").unwrap();
        assert_eq!(parsed.scheme, NameScheme::Wip);
        assert_eq!(parsed.field("wipname"), Some("some-normal-texts"));
    }

    #[test]
    fn parse_unstructured() {
        assert!(parse_name("dev").is_none());
        assert!(parse_name("REL1.0").is_none());
        assert!(parse_name("tnr-placeholder-cpu-rtl-1").is_none());
    }

    #[test]
    fn normalize_separators() {
        assert_eq!(normalize("a--b__c"), "a-b-c");
        assert_eq!(normalize("plain"), "plain");
    }
}
