//! The module metadata document embedded in every archive.
//!
//! Each module archive carries an `addon.toml` document at its root
//! describing the module: display metadata, compatibility bounds,
//! dependencies, declared artifacts, and component visibility rules. The same
//! schema (minus the file name derived fields) is reused by the entries of a
//! remote catalog document, so the serde types here are format-agnostic and
//! deserialize from both TOML and JSON.
//!
//! # Document Layout
//!
//! ```toml
//! name = "Request Logger"
//! version = 3
//! semver = "1.2.0"
//! description = "Logs proxied requests"
//! author = "Strobe Project"
//! url = "https://example.org/request-logger"
//! changes = "Fixed header handling"
//! not-before-version = "2.0.0"
//! not-from-version = "3.0.0"
//!
//! [dependencies]
//! runtime-version = 17
//!
//! [[dependencies.addons]]
//! id = "commons"
//! not-before-version = 5
//! semver = "1.1.0"
//!
//! extensions = [
//!     "ext.logger.LogPanel",
//!     { classname = "ext.logger.Sync", dependencies = [{ id = "sync-core" }] },
//! ]
//! ascanrules = ["rules.active.HeaderProbe"]
//! pscanrules = ["rules.passive.CookieAudit"]
//! files = ["payloads/headers.txt"]
//!
//! [classnames]
//! allowed = ["ext.logger", "rules"]
//! restricted = ["ext.logger.internal"]
//! ```
//!
//! # Validation
//!
//! Deserialization is lenient where the original format is lenient and strict
//! where it is strict:
//!
//! - a dependency reference without an `id`, or with an empty one, is a hard
//!   parse error rejecting the whole module;
//! - an extension-with-dependencies block with an empty `classname` or an
//!   empty dependency list is a hard parse error;
//! - empty strings in plain artifact lists are dropped with a warning.

use semver::Version;
use serde::Deserialize;
use tracing::warn;

use crate::core::RuntimeError;
use crate::version::FileVersionRange;

use super::{DependencyRef, ExtensionDecl, ComponentVisibility};

/// Name of the metadata document entry inside a module archive.
pub const METADATA_ENTRY: &str = "addon.toml";

/// Raw deserialized form of the metadata document.
///
/// Field names follow the document's kebab-case keys. Convert into descriptor
/// building blocks with the `validated_*` methods, which apply the
/// drop-with-warning and hard-error rules described in the module docs.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataDocument {
    /// Human readable module name.
    pub name: Option<String>,
    /// Legacy integer package version.
    pub version: Option<u32>,
    /// Optional semantic version, richer than the package version.
    pub semver: Option<Version>,
    /// Free-form description.
    pub description: Option<String>,
    /// Module author.
    pub author: Option<String>,
    /// Project or documentation URL.
    pub url: Option<String>,
    /// Change notes for the current version.
    pub changes: Option<String>,
    /// Host versions before this one cannot load the module (inclusive bound).
    pub not_before_version: Option<Version>,
    /// Host versions from this one on cannot load the module (exclusive bound).
    pub not_from_version: Option<Version>,
    /// Dependency declarations.
    pub dependencies: Option<DependenciesSection>,
    /// Declared extensions, plain or with their own dependency sets.
    #[serde(default)]
    pub extensions: Vec<ExtensionEntry>,
    /// Declared active scan rule component names.
    #[serde(default)]
    pub ascanrules: Vec<String>,
    /// Declared passive scan rule component names.
    #[serde(default)]
    pub pscanrules: Vec<String>,
    /// Relative paths of files shipped by the module.
    #[serde(default)]
    pub files: Vec<String>,
    /// Component-name visibility rules for the module's own archive.
    #[serde(default)]
    pub classnames: ComponentVisibility,
}

/// The `[dependencies]` section of the document.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DependenciesSection {
    /// Minimum host runtime feature version, if any.
    pub runtime_version: Option<u32>,
    /// References to other modules.
    #[serde(default)]
    pub addons: Vec<DependencyEntry>,
}

/// One raw dependency reference.
///
/// `id` is mandatory at the serde level; a document omitting it fails to
/// deserialize, which matches the hard-error rule for missing ids.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DependencyEntry {
    /// Id of the target module.
    pub id: String,
    /// Inclusive lower package version bound on the target.
    pub not_before_version: Option<u32>,
    /// Exclusive upper package version bound on the target.
    pub not_from_version: Option<u32>,
    /// Minimum semantic version of the target.
    pub semver: Option<Version>,
}

/// One entry of the `extensions` list.
///
/// Plain entries are bare component names. Versioned entries carry their own
/// dependency set and are evaluated separately from the parent module's
/// dependencies.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ExtensionEntry {
    /// A bare extension component name.
    Name(String),
    /// An extension with its own dependency declarations.
    Versioned(VersionedExtensionEntry),
}

/// An extension block carrying its own dependencies.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VersionedExtensionEntry {
    /// Component name of the extension.
    pub classname: String,
    /// The extension's own dependency references.
    #[serde(default)]
    pub dependencies: Vec<DependencyEntry>,
}

impl MetadataDocument {
    /// Parse a TOML metadata document.
    pub fn parse_toml(text: &str, archive: &str) -> Result<Self, RuntimeError> {
        toml::from_str(text).map_err(|e| RuntimeError::MalformedMetadata {
            archive: archive.to_string(),
            reason: e.to_string(),
        })
    }

    /// Convert the raw dependency section into validated [`DependencyRef`]s.
    ///
    /// An empty target id is a hard error.
    pub fn validated_dependencies(&self, archive: &str) -> Result<Vec<DependencyRef>, RuntimeError> {
        match &self.dependencies {
            Some(section) => validate_dependency_entries(&section.addons, archive),
            None => Ok(Vec::new()),
        }
    }

    /// Convert the raw extension list into validated [`ExtensionDecl`]s.
    ///
    /// Plain empty names are dropped with a warning. A versioned block with an
    /// empty classname or no dependencies is a hard error.
    pub fn validated_extensions(&self, archive: &str) -> Result<Vec<ExtensionDecl>, RuntimeError> {
        let mut extensions = Vec::with_capacity(self.extensions.len());
        for entry in &self.extensions {
            match entry {
                ExtensionEntry::Name(name) => {
                    if name.is_empty() {
                        warn!(archive, "dropping empty extension entry");
                        continue;
                    }
                    extensions.push(ExtensionDecl::plain(name.clone()));
                }
                ExtensionEntry::Versioned(block) => {
                    if block.classname.is_empty() {
                        return Err(RuntimeError::MalformedMetadata {
                            archive: archive.to_string(),
                            reason: "extension block with dependencies has an empty classname"
                                .to_string(),
                        });
                    }
                    if block.dependencies.is_empty() {
                        return Err(RuntimeError::MalformedMetadata {
                            archive: archive.to_string(),
                            reason: format!(
                                "extension block '{}' declares no dependencies",
                                block.classname
                            ),
                        });
                    }
                    let deps = validate_dependency_entries(&block.dependencies, archive)?;
                    extensions.push(ExtensionDecl::with_dependencies(block.classname.clone(), deps));
                }
            }
        }
        Ok(extensions)
    }

    /// The scan rule and file lists with empty entries dropped.
    pub fn validated_string_list(list: &[String], kind: &str, archive: &str) -> Vec<String> {
        let mut out = Vec::with_capacity(list.len());
        for entry in list {
            if entry.is_empty() {
                warn!(archive, kind, "dropping empty list entry");
                continue;
            }
            out.push(entry.clone());
        }
        out
    }

    /// Minimum host runtime feature version, if declared.
    #[must_use]
    pub fn minimum_runtime_version(&self) -> Option<u32> {
        self.dependencies.as_ref().and_then(|d| d.runtime_version)
    }
}

fn validate_dependency_entries(
    entries: &[DependencyEntry],
    archive: &str,
) -> Result<Vec<DependencyRef>, RuntimeError> {
    let mut refs = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.id.is_empty() {
            return Err(RuntimeError::MalformedMetadata {
                archive: archive.to_string(),
                reason: "dependency reference with an empty id".to_string(),
            });
        }
        refs.push(DependencyRef::new(
            entry.id.as_str().into(),
            FileVersionRange::new(entry.not_before_version, entry.not_from_version),
            entry.semver.clone(),
        ));
    }
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let doc = MetadataDocument::parse_toml(
            r#"
            name = "Request Logger"
            version = 3
            semver = "1.2.0"
            description = "Logs proxied requests"
            author = "Strobe Project"
            not-before-version = "2.0.0"

            [dependencies]
            runtime-version = 17

            [[dependencies.addons]]
            id = "commons"
            not-before-version = 5
            semver = "1.1.0"

            extensions = [
                "ext.logger.LogPanel",
                { classname = "ext.logger.Sync", dependencies = [{ id = "sync-core" }] },
            ]
            ascanrules = ["rules.active.HeaderProbe"]
            files = ["payloads/headers.txt"]
            "#,
            "test.sap",
        )
        .unwrap();

        assert_eq!(doc.name.as_deref(), Some("Request Logger"));
        assert_eq!(doc.version, Some(3));
        assert_eq!(doc.minimum_runtime_version(), Some(17));

        let deps = doc.validated_dependencies("test.sap").unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].target().as_str(), "commons");
        assert_eq!(deps[0].file_version().not_before(), Some(5));

        let extensions = doc.validated_extensions("test.sap").unwrap();
        assert_eq!(extensions.len(), 2);
        assert!(!extensions[0].has_dependencies());
        assert!(extensions[1].has_dependencies());
    }

    #[test]
    fn missing_dependency_id_is_hard_error() {
        let result = MetadataDocument::parse_toml(
            r#"
            [[dependencies.addons]]
            not-before-version = 5
            "#,
            "broken.sap",
        );
        assert!(matches!(result, Err(RuntimeError::MalformedMetadata { .. })));
    }

    #[test]
    fn empty_dependency_id_is_hard_error() {
        let doc = MetadataDocument::parse_toml(
            r#"
            [[dependencies.addons]]
            id = ""
            "#,
            "broken.sap",
        )
        .unwrap();
        let result = doc.validated_dependencies("broken.sap");
        assert!(matches!(result, Err(RuntimeError::MalformedMetadata { .. })));
    }

    #[test]
    fn versioned_extension_with_empty_classname_is_hard_error() {
        let doc = MetadataDocument::parse_toml(
            r#"
            extensions = [{ classname = "", dependencies = [{ id = "x" }] }]
            "#,
            "broken.sap",
        )
        .unwrap();
        let result = doc.validated_extensions("broken.sap");
        assert!(matches!(result, Err(RuntimeError::MalformedMetadata { .. })));
    }

    #[test]
    fn versioned_extension_without_dependencies_is_hard_error() {
        let doc = MetadataDocument::parse_toml(
            r#"
            extensions = [{ classname = "ext.X", dependencies = [] }]
            "#,
            "broken.sap",
        )
        .unwrap();
        let result = doc.validated_extensions("broken.sap");
        assert!(matches!(result, Err(RuntimeError::MalformedMetadata { .. })));
    }

    #[test]
    fn empty_plain_entries_are_dropped_not_fatal() {
        let doc = MetadataDocument::parse_toml(
            r#"
            extensions = ["", "ext.Keep"]
            ascanrules = ["", "rules.Keep"]
            "#,
            "lenient.sap",
        )
        .unwrap();
        let extensions = doc.validated_extensions("lenient.sap").unwrap();
        assert_eq!(extensions.len(), 1);
        assert_eq!(extensions[0].classname(), "ext.Keep");
        let rules =
            MetadataDocument::validated_string_list(&doc.ascanrules, "ascanrules", "lenient.sap");
        assert_eq!(rules, vec!["rules.Keep".to_string()]);
    }

    #[test]
    fn empty_document_is_valid() {
        let doc = MetadataDocument::parse_toml("", "empty.sap").unwrap();
        assert!(doc.validated_dependencies("empty.sap").unwrap().is_empty());
        assert!(doc.validated_extensions("empty.sap").unwrap().is_empty());
        assert!(doc.minimum_runtime_version().is_none());
    }
}
