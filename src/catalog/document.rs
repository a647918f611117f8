//! The remote catalog document.
//!
//! A catalog document is a flat JSON collection of module entries, assumed
//! pre-deduplicated upstream, plus an optional host-release entry describing
//! the host application itself. Entries share the dependency and extension
//! schema of the embedded metadata document
//! ([`crate::descriptor::MetadataDocument`]); fetching the document is the
//! host's business, this module only parses it.

use semver::Version;
use serde::Deserialize;

use crate::core::{Result, RuntimeError};
use crate::descriptor::{ArchiveFileName, MetadataDocument, ModuleDescriptor, Status};

use super::module::Module;

/// A parsed catalog document.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CatalogDocument {
    /// The host application's own release, if the document carries one.
    pub host: Option<HostReleaseEntry>,
    /// Flat list of module entries.
    #[serde(default)]
    pub addons: Vec<CatalogEntry>,
}

/// The host application release described by a catalog document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HostReleaseEntry {
    /// Version of the host release.
    pub version: Version,
    /// Download URL for the current platform.
    pub url: Option<String>,
    /// File name of the release artifact.
    pub file: Option<String>,
    /// Size of the release artifact in bytes.
    pub size: Option<u64>,
    /// Checksum of the release artifact.
    pub hash: Option<String>,
    /// Release notes.
    pub notes: Option<String>,
}

/// One module entry of a catalog document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CatalogEntry {
    /// Module identity.
    pub id: String,
    /// Maturity status.
    pub status: Status,
    /// Archive file name for the entry.
    pub file: String,
    /// Archive size in bytes.
    pub size: u64,
    /// Informational URL for the module.
    pub info_url: Option<String>,
    /// Archive checksum in `sha256:<hex>` form.
    pub hash: Option<String>,
    /// Shared metadata schema: name, version, semver, dependencies,
    /// extensions, scan rules, files.
    #[serde(flatten)]
    pub metadata: MetadataDocument,
}

impl CatalogDocument {
    /// Parse a JSON catalog document.
    pub fn parse_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl CatalogEntry {
    /// Build a [`Module`] in `Available` state from this entry.
    ///
    /// The entry must carry a package version in its shared metadata; a
    /// missing one is a malformed document.
    pub(crate) fn into_module(self) -> Result<Module> {
        let package_version = self.metadata.version.ok_or_else(|| {
            RuntimeError::MalformedMetadata {
                archive: self.file.clone(),
                reason: format!("catalog entry '{}' has no package version", self.id),
            }
        })?;
        let descriptor = ModuleDescriptor::from_metadata(
            ArchiveFileName {
                id: self.id.as_str().into(),
                status: self.status,
                package_version,
            },
            &self.metadata,
            &self.file,
        )?;
        Ok(Module::available(descriptor, self.size, self.hash, self.info_url))
    }
}
