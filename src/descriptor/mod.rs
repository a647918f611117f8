//! Parsed, immutable module metadata.
//!
//! A [`ModuleDescriptor`] is the identity and contract of one module: who it
//! is ([`crate::core::ModuleId`]), how it versions ([`Status`], package
//! version, optional semantic version, host compatibility bounds), what it
//! depends on ([`DependencyRef`]), and what it ships (extensions, scan rules,
//! files, visibility rules).
//!
//! Descriptors come from two places:
//!
//! - **Archive file names** of the form `<id>-<status>-<packageVersion>.<ext>`
//!   provide identity, status, and package version ([`ArchiveFileName`]).
//! - **The embedded metadata document** provides everything else
//!   ([`metadata::MetadataDocument`]).
//!
//! The descriptor is immutable once built. Runtime-only state (backing
//! archive, install status, cached artifact instances) lives on
//! [`crate::catalog::Module`], which wraps a descriptor.

pub mod metadata;
mod visibility;

pub use metadata::{DependencyEntry, ExtensionEntry, MetadataDocument, METADATA_ENTRY};
pub use visibility::ComponentVisibility;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::{HostInfo, ModuleId, RuntimeError};
use crate::version::{FileVersionRange, VersionBounds};

/// File extension of module archives.
pub const MODULE_EXTENSION: &str = "sap";

/// Maturity status of a module.
///
/// The declaration order defines the ordinal used for version tie-breaking in
/// the catalog: when two archives share an id and neither has a greater
/// package version, the higher status wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Early development quality.
    Alpha,
    /// Feature complete, still stabilizing.
    Beta,
    /// Weekly snapshot quality.
    Weekly,
    /// Release quality.
    Release,
    /// Demonstration material, not meant for production scans.
    Example,
}

impl Status {
    /// Parse a status from its lowercase document form.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "alpha" => Some(Self::Alpha),
            "beta" => Some(Self::Beta),
            "weekly" => Some(Self::Weekly),
            "release" => Some(Self::Release),
            "example" => Some(Self::Example),
            _ => None,
        }
    }

    /// The lowercase name used in file names and documents.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alpha => "alpha",
            Self::Beta => "beta",
            Self::Weekly => "weekly",
            Self::Release => "release",
            Self::Example => "example",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static ARCHIVE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)-([^-]+)-(\d+)\.([^.]+)$").expect("valid archive name regex"));

/// Identity fields parsed from an archive file name.
///
/// A name parses iff it splits into at least three dash-separated fields
/// before the extension, the second-to-last field names a known [`Status`],
/// and the last field is an integer package version. Anything else is not a
/// module archive, reported as `None` rather than an error so directory scans
/// can skip foreign files silently.
///
/// # Examples
///
/// ```rust
/// use strobe_addons::descriptor::{ArchiveFileName, Status};
///
/// let parsed = ArchiveFileName::parse("request-logger-release-3.sap").unwrap();
/// assert_eq!(parsed.id.as_str(), "request-logger");
/// assert_eq!(parsed.status, Status::Release);
/// assert_eq!(parsed.package_version, 3);
///
/// assert!(ArchiveFileName::parse("notes.txt").is_none());
/// assert!(ArchiveFileName::parse("only-two.sap").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFileName {
    /// Module identity, everything before the status field.
    pub id: ModuleId,
    /// Parsed status field.
    pub status: Status,
    /// Parsed integer package version.
    pub package_version: u32,
}

impl ArchiveFileName {
    /// Parse a file name, returning `None` when it is not a module archive.
    #[must_use]
    pub fn parse(file_name: &str) -> Option<Self> {
        let captures = ARCHIVE_NAME.captures(file_name)?;
        let status = Status::from_name(&captures[2])?;
        let package_version = captures[3].parse().ok()?;
        Some(Self {
            id: ModuleId::new(&captures[1]),
            status,
            package_version,
        })
    }

    /// Whether `file_name` looks like a module archive with the expected
    /// extension. Used by directory scans to pre-filter candidates.
    #[must_use]
    pub fn is_module_file_name(file_name: &str) -> bool {
        file_name.ends_with(&format!(".{MODULE_EXTENSION}"))
            && Self::parse(file_name).is_some()
    }
}

/// A constraint on another module, owned by exactly one descriptor or one of
/// its versioned extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    target: ModuleId,
    file_version: FileVersionRange,
    min_semver: Option<Version>,
}

impl DependencyRef {
    /// Create a reference to `target` constrained by the given bounds.
    pub fn new(target: ModuleId, file_version: FileVersionRange, min_semver: Option<Version>) -> Self {
        Self {
            target,
            file_version,
            min_semver,
        }
    }

    /// Id of the module this reference targets.
    #[must_use]
    pub fn target(&self) -> &ModuleId {
        &self.target
    }

    /// Package version bounds on the target.
    #[must_use]
    pub fn file_version(&self) -> &FileVersionRange {
        &self.file_version
    }

    /// Minimum semantic version of the target, if constrained.
    #[must_use]
    pub fn min_semver(&self) -> Option<&Version> {
        self.min_semver.as_ref()
    }
}

/// A declared extension, plain or carrying its own dependency set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDecl {
    classname: String,
    dependencies: Vec<DependencyRef>,
}

impl ExtensionDecl {
    /// An extension with no dependencies of its own.
    pub fn plain(classname: String) -> Self {
        Self {
            classname,
            dependencies: Vec::new(),
        }
    }

    /// A versioned extension with its own dependency references.
    pub fn with_dependencies(classname: String, dependencies: Vec<DependencyRef>) -> Self {
        Self {
            classname,
            dependencies,
        }
    }

    /// Component name of the extension.
    #[must_use]
    pub fn classname(&self) -> &str {
        &self.classname
    }

    /// The extension's own dependency references. Empty for plain extensions.
    #[must_use]
    pub fn dependencies(&self) -> &[DependencyRef] {
        &self.dependencies
    }

    /// Whether this is a versioned extension with its own dependencies.
    #[must_use]
    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }
}

/// Parsed, immutable metadata for one module.
///
/// See the module documentation for construction paths. Two descriptors
/// describe the same module iff their ids are equal; use
/// [`ModuleDescriptor::is_update_to`] to compare versions of the same module.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    id: ModuleId,
    status: Status,
    package_version: u32,
    semantic_version: Option<Version>,
    name: String,
    description: String,
    author: String,
    url: Option<String>,
    change_notes: Option<String>,
    core_bounds: VersionBounds,
    minimum_runtime_version: Option<u32>,
    dependencies: Vec<DependencyRef>,
    extensions: Vec<ExtensionDecl>,
    active_rules: Vec<String>,
    passive_rules: Vec<String>,
    files: Vec<String>,
    visibility: ComponentVisibility,
}

impl ModuleDescriptor {
    /// Build a descriptor from parsed file name fields and a metadata
    /// document. `archive` names the source for error reporting.
    pub fn from_metadata(
        file_name: ArchiveFileName,
        doc: &MetadataDocument,
        archive: &str,
    ) -> Result<Self, RuntimeError> {
        let dependencies = doc.validated_dependencies(archive)?;
        let extensions = doc.validated_extensions(archive)?;
        Ok(Self {
            name: doc.name.clone().unwrap_or_else(|| file_name.id.to_string()),
            description: doc.description.clone().unwrap_or_default(),
            author: doc.author.clone().unwrap_or_default(),
            url: doc.url.clone(),
            change_notes: doc.changes.clone(),
            semantic_version: doc.semver.clone(),
            core_bounds: VersionBounds::new(
                doc.not_before_version.clone(),
                doc.not_from_version.clone(),
            ),
            minimum_runtime_version: doc.minimum_runtime_version(),
            dependencies,
            extensions,
            active_rules: MetadataDocument::validated_string_list(
                &doc.ascanrules,
                "ascanrules",
                archive,
            ),
            passive_rules: MetadataDocument::validated_string_list(
                &doc.pscanrules,
                "pscanrules",
                archive,
            ),
            files: MetadataDocument::validated_string_list(&doc.files, "files", archive),
            visibility: doc.classnames.clone(),
            id: file_name.id,
            status: file_name.status,
            package_version: file_name.package_version,
        })
    }

    /// Module identity.
    #[must_use]
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Maturity status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Legacy integer package version, the primary ordering key.
    #[must_use]
    pub fn package_version(&self) -> u32 {
        self.package_version
    }

    /// Optional semantic version.
    #[must_use]
    pub fn semantic_version(&self) -> Option<&Version> {
        self.semantic_version.as_ref()
    }

    /// Human readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Module author.
    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Project or documentation URL.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Change notes for this version.
    #[must_use]
    pub fn change_notes(&self) -> Option<&str> {
        self.change_notes.as_deref()
    }

    /// Host version bounds this module may load under.
    #[must_use]
    pub fn core_bounds(&self) -> &VersionBounds {
        &self.core_bounds
    }

    /// Minimum host runtime feature version, if declared.
    #[must_use]
    pub fn minimum_runtime_version(&self) -> Option<u32> {
        self.minimum_runtime_version
    }

    /// Module-level dependency references, in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[DependencyRef] {
        &self.dependencies
    }

    /// Declared extensions.
    #[must_use]
    pub fn extensions(&self) -> &[ExtensionDecl] {
        &self.extensions
    }

    /// Declared active scan rule component names.
    #[must_use]
    pub fn active_rules(&self) -> &[String] {
        &self.active_rules
    }

    /// Declared passive scan rule component names.
    #[must_use]
    pub fn passive_rules(&self) -> &[String] {
        &self.passive_rules
    }

    /// Relative paths of shipped files.
    #[must_use]
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Component visibility rules for the module's own archive.
    #[must_use]
    pub fn visibility(&self) -> &ComponentVisibility {
        &self.visibility
    }

    /// Whether the module can load under the given host version.
    #[must_use]
    pub fn can_load_in_version(&self, host: &HostInfo) -> bool {
        self.core_bounds.contains(host.version())
    }

    /// Whether the module declares any dynamically installable artifacts.
    ///
    /// Static modules (nothing but metadata) cannot be added or removed while
    /// the host is running.
    #[must_use]
    pub fn is_dynamically_installable(&self) -> bool {
        !self.extensions.is_empty()
            || !self.active_rules.is_empty()
            || !self.passive_rules.is_empty()
            || !self.files.is_empty()
    }

    /// Whether this descriptor supersedes `other` in the catalog.
    ///
    /// A greater package version always wins. When the package version does
    /// not win, a higher status still does, even if the package version is
    /// lower: a release build replaces a higher-versioned beta of the same
    /// add-on.
    ///
    /// # Panics
    ///
    /// Panics when the descriptors do not share an id; comparing different
    /// modules is a programming error.
    #[must_use]
    pub fn is_update_to(&self, other: &ModuleDescriptor) -> bool {
        assert_eq!(
            self.id, other.id,
            "version precedence is only defined between descriptors of the same module"
        );
        if self.package_version > other.package_version {
            return true;
        }
        self.status > other.status
    }

    /// Ids referenced by module-level and extension-level dependencies, in
    /// declaration order, extension references after module references.
    pub fn all_dependency_targets(&self) -> impl Iterator<Item = &ModuleId> {
        self.dependencies
            .iter()
            .map(DependencyRef::target)
            .chain(
                self.extensions
                    .iter()
                    .flat_map(|e| e.dependencies().iter().map(DependencyRef::target)),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, status: Status, package_version: u32) -> ModuleDescriptor {
        ModuleDescriptor::from_metadata(
            ArchiveFileName {
                id: ModuleId::new(id),
                status,
                package_version,
            },
            &MetadataDocument::default(),
            "test.sap",
        )
        .unwrap()
    }

    #[test]
    fn parses_valid_archive_names() {
        for (name, id, status, version) in [
            ("commons-release-7.sap", "commons", Status::Release, 7),
            ("request-logger-beta-12.sap", "request-logger", Status::Beta, 12),
            ("a-b-c-alpha-1.sap", "a-b-c", Status::Alpha, 1),
        ] {
            let parsed = ArchiveFileName::parse(name).unwrap();
            assert_eq!(parsed.id.as_str(), id);
            assert_eq!(parsed.status, status);
            assert_eq!(parsed.package_version, version);
        }
    }

    #[test]
    fn rejects_names_that_are_not_modules() {
        // Fewer than three dash separated fields.
        assert!(ArchiveFileName::parse("commons-7.sap").is_none());
        // Unknown status.
        assert!(ArchiveFileName::parse("commons-stable-7.sap").is_none());
        // Non-integer version.
        assert!(ArchiveFileName::parse("commons-release-x.sap").is_none());
        // No extension.
        assert!(ArchiveFileName::parse("commons-release-7").is_none());
    }

    #[test]
    fn status_ordering_matches_ordinals() {
        assert!(Status::Alpha < Status::Beta);
        assert!(Status::Beta < Status::Weekly);
        assert!(Status::Weekly < Status::Release);
        assert!(Status::Release < Status::Example);
    }

    #[test]
    fn greater_package_version_is_update() {
        let older = descriptor("foo", Status::Release, 2);
        let newer = descriptor("foo", Status::Release, 3);
        assert!(newer.is_update_to(&older));
        assert!(!older.is_update_to(&newer));
    }

    #[test]
    fn status_tiebreak_fires_even_with_lower_version() {
        // Documented precedence rule: release v1 supersedes beta v2.
        let beta_v2 = descriptor("foo", Status::Beta, 2);
        let release_v1 = descriptor("foo", Status::Release, 1);
        assert!(release_v1.is_update_to(&beta_v2));
    }

    #[test]
    #[should_panic(expected = "same module")]
    fn comparing_different_modules_panics() {
        let a = descriptor("a", Status::Release, 1);
        let b = descriptor("b", Status::Release, 1);
        let _ = a.is_update_to(&b);
    }

    #[test]
    fn static_module_is_not_dynamically_installable() {
        let desc = descriptor("static", Status::Release, 1);
        assert!(!desc.is_dynamically_installable());
    }
}
