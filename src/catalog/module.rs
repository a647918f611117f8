//! A module as tracked by the runtime: descriptor plus runtime-only state.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::archive::ModuleArchive;
use crate::core::{ModuleId, Result, RuntimeError};
use crate::descriptor::{ArchiveFileName, MetadataDocument, ModuleDescriptor};
use crate::registry::{ActiveScanRule, PassiveScanRule};

/// Installation status of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    /// Known from a catalog document, not installed locally.
    Available,
    /// Installed in the running host.
    Installed,
}

/// A module: the immutable [`ModuleDescriptor`] plus the runtime-only fields
/// tracked alongside it.
///
/// The runtime-only fields are the backing archive path, archive size, the
/// declared catalog hash, the installation status, a failure flag, and the
/// cached scan rule instances. Scan rule instantiation is idempotent: the
/// first caller's instances are cached per module and every later caller
/// observes the same set, guarded so concurrent lookups never
/// double-instantiate.
///
/// Modules are shared as `Arc<Module>` between the catalog and the loader
/// graph. Two modules are the same module iff their ids are equal; use
/// [`Module::same_module`] rather than pointer identity.
pub struct Module {
    descriptor: ModuleDescriptor,
    archive_path: Option<PathBuf>,
    size: u64,
    declared_hash: Option<String>,
    info_url: Option<String>,
    install_status: RwLock<InstallStatus>,
    failed: AtomicBool,
    active_rules: OnceLock<Vec<(String, Arc<dyn ActiveScanRule>)>>,
    passive_rules: OnceLock<Vec<(String, Arc<dyn PassiveScanRule>)>>,
}

impl Module {
    /// Load a module from an archive file on disk.
    ///
    /// The file name must parse as `<id>-<status>-<version>.<ext>`; a name
    /// that does not is [`RuntimeError::MalformedArchiveName`]. Directory
    /// scans pre-filter names and never hit that error; the explicit add path
    /// surfaces it. A missing metadata document is treated as empty, a
    /// malformed one rejects the module.
    pub fn from_archive(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RuntimeError::MalformedArchiveName {
                name: path.display().to_string(),
            })?;
        let parsed = ArchiveFileName::parse(file_name).ok_or_else(|| {
            RuntimeError::MalformedArchiveName {
                name: file_name.to_string(),
            }
        })?;

        let archive = ModuleArchive::open(path)?;
        let doc = match archive.read_metadata_text()? {
            Some(text) => MetadataDocument::parse_toml(&text, file_name)?,
            None => MetadataDocument::default(),
        };
        let descriptor = ModuleDescriptor::from_metadata(parsed, &doc, file_name)?;

        Ok(Self {
            descriptor,
            archive_path: Some(path.to_path_buf()),
            size: archive.size(),
            declared_hash: None,
            info_url: None,
            install_status: RwLock::new(InstallStatus::Installed),
            failed: AtomicBool::new(false),
            active_rules: OnceLock::new(),
            passive_rules: OnceLock::new(),
        })
    }

    /// Create an available module from catalog document fields.
    pub(crate) fn available(
        descriptor: ModuleDescriptor,
        size: u64,
        declared_hash: Option<String>,
        info_url: Option<String>,
    ) -> Self {
        Self {
            descriptor,
            archive_path: None,
            size,
            declared_hash,
            info_url,
            install_status: RwLock::new(InstallStatus::Available),
            failed: AtomicBool::new(false),
            active_rules: OnceLock::new(),
            passive_rules: OnceLock::new(),
        }
    }

    /// The parsed descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    /// Module identity, shorthand for `descriptor().id()`.
    #[must_use]
    pub fn id(&self) -> &ModuleId {
        self.descriptor.id()
    }

    /// Whether `other` describes the same module, regardless of version.
    #[must_use]
    pub fn same_module(&self, other: &Module) -> bool {
        self.id() == other.id()
    }

    /// Path of the backing archive, absent for catalog-only modules.
    #[must_use]
    pub fn archive_path(&self) -> Option<&Path> {
        self.archive_path.as_deref()
    }

    /// Size of the archive in bytes, as measured or as declared.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Archive hash declared by the catalog entry, if any.
    #[must_use]
    pub fn declared_hash(&self) -> Option<&str> {
        self.declared_hash.as_deref()
    }

    /// Info URL declared by the catalog entry, if any.
    #[must_use]
    pub fn info_url(&self) -> Option<&str> {
        self.info_url.as_deref()
    }

    /// Current installation status.
    #[must_use]
    pub fn install_status(&self) -> InstallStatus {
        *self.install_status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_install_status(&self, status: InstallStatus) {
        *self.install_status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Whether a lifecycle operation on this module has failed.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }

    /// Open the backing archive.
    ///
    /// Fails for catalog-only modules without a local archive.
    pub fn open_archive(&self) -> Result<ModuleArchive> {
        let path = self.archive_path.as_deref().ok_or_else(|| RuntimeError::FileSystemError {
            operation: "open module archive".to_string(),
            path: format!("<no local archive for '{}'>", self.id()),
        })?;
        ModuleArchive::open(path)
    }

    /// The cached active scan rule instances with their declared component
    /// names, instantiating through `init` on first use. Concurrent callers
    /// all observe the first set produced.
    pub(crate) fn active_rules_cached<F>(&self, init: F) -> &[(String, Arc<dyn ActiveScanRule>)]
    where
        F: FnOnce() -> Vec<(String, Arc<dyn ActiveScanRule>)>,
    {
        self.active_rules.get_or_init(init)
    }

    /// The cached passive scan rule instances with their declared component
    /// names, instantiating through `init` on first use.
    pub(crate) fn passive_rules_cached<F>(&self, init: F) -> &[(String, Arc<dyn PassiveScanRule>)]
    where
        F: FnOnce() -> Vec<(String, Arc<dyn PassiveScanRule>)>,
    {
        self.passive_rules.get_or_init(init)
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", self.id())
            .field("status", &self.descriptor.status())
            .field("package_version", &self.descriptor.package_version())
            .field("install_status", &self.install_status())
            .finish_non_exhaustive()
    }
}
