//! The deduplicated collection of modules known to the runtime.
//!
//! A [`ModuleCatalog`] maps each module id to exactly one winning
//! [`Module`], plus an optional host-release descriptor. Catalogs are built
//! two ways with different dedup rules:
//!
//! - **Scanning local directories** ([`ModuleCatalog::scan_directories`]):
//!   every recognized archive is parsed; when two archives share an id the
//!   existing entry is replaced iff the new one is an update
//!   ([`crate::descriptor::ModuleDescriptor::is_update_to`]) *and* can load
//!   under the current host version. An update that is incompatible with the
//!   host is rejected with a warning and the existing entry is kept.
//! - **Parsing a catalog document** ([`ModuleCatalog::from_document`]): the
//!   flat entry list is assumed pre-deduplicated upstream and inserted by id
//!   with no conflict resolution; entries incompatible with the host version
//!   are dropped during load.
//!
//! Catalogs support diffing against another catalog (`updated_modules`,
//! `new_modules`) and pruning of modules whose run requirements are not met.

mod document;
mod module;

pub use document::{CatalogDocument, CatalogEntry, HostReleaseEntry};
pub use module::{InstallStatus, Module};

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::{HostInfo, ModuleId, Result};
use crate::descriptor::{ArchiveFileName, Status};
use crate::resolver::{DependencyIssue, RunRequirements};

/// A module removed by pruning, with the requirements that disqualified it.
#[derive(Debug)]
pub struct PrunedModule {
    /// The removed module.
    pub module: Arc<Module>,
    /// The failed requirements, for reporting.
    pub requirements: RunRequirements,
}

/// Deduplicated mapping from module id to the winning module.
#[derive(Debug, Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<ModuleId, Arc<Module>>,
    host_release: Option<HostReleaseEntry>,
}

impl ModuleCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog by scanning directories for module archives.
    ///
    /// Files whose names do not parse as module archives are skipped
    /// silently. Archives whose id is on `blocked` are skipped without being
    /// opened. Archives with malformed metadata are skipped with a warning;
    /// one broken archive never aborts the scan.
    #[must_use]
    pub fn scan_directories(
        dirs: &[impl AsRef<Path>],
        host: &HostInfo,
        blocked: &BTreeSet<ModuleId>,
    ) -> Self {
        let mut catalog = Self::new();
        for dir in dirs {
            catalog.scan_directory(dir.as_ref(), host, blocked);
        }
        catalog
    }

    fn scan_directory(&mut self, dir: &Path, host: &HostInfo, blocked: &BTreeSet<ModuleId>) {
        for entry in WalkDir::new(dir).max_depth(1).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str() else {
                continue;
            };
            if !ArchiveFileName::is_module_file_name(file_name) {
                continue;
            }
            // The name parse is repeated inside Module::from_archive; doing it
            // here first keeps blocked archives from being opened at all.
            let Some(parsed) = ArchiveFileName::parse(file_name) else {
                continue;
            };
            if blocked.contains(&parsed.id) {
                debug!(module_id = %parsed.id, "skipping blocked module archive");
                continue;
            }
            match Module::from_archive(entry.path()) {
                Ok(module) => {
                    self.add_scanned(Arc::new(module), host);
                }
                Err(e) => {
                    warn!(archive = %entry.path().display(), error = %e,
                        "skipping unreadable module archive");
                }
            }
        }
    }

    /// Build a catalog from a parsed catalog document.
    ///
    /// Entries that cannot load under the current host version are dropped.
    pub fn from_document(doc: CatalogDocument, host: &HostInfo) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.host_release = doc.host;
        for entry in doc.addons {
            let module = Arc::new(entry.into_module()?);
            if !module.descriptor().can_load_in_version(host) {
                debug!(module_id = %module.id(),
                    "dropping catalog entry incompatible with host version");
                continue;
            }
            catalog.modules.insert(module.id().clone(), module);
        }
        Ok(catalog)
    }

    /// Add a scanned module under the directory-scan precedence rule.
    ///
    /// Returns whether the module ended up in the catalog. An update that is
    /// incompatible with the host version is rejected and the existing entry
    /// kept, with a warning.
    pub fn add_scanned(&mut self, module: Arc<Module>, host: &HostInfo) -> bool {
        match self.modules.get(module.id()) {
            None => {
                self.modules.insert(module.id().clone(), module);
                true
            }
            Some(existing) => {
                if !module.descriptor().is_update_to(existing.descriptor()) {
                    debug!(module_id = %module.id(),
                        "keeping existing module, scanned archive is not an update");
                    return false;
                }
                if !module.descriptor().can_load_in_version(host) {
                    warn!(module_id = %module.id(),
                        package_version = module.descriptor().package_version(),
                        "ignoring updated module archive incompatible with host version");
                    return false;
                }
                self.modules.insert(module.id().clone(), module);
                true
            }
        }
    }

    /// Insert a module without precedence handling. Returns `false` and
    /// leaves the catalog unchanged when the id is already present.
    pub fn insert(&mut self, module: Arc<Module>) -> bool {
        if self.modules.contains_key(module.id()) {
            return false;
        }
        self.modules.insert(module.id().clone(), module);
        true
    }

    /// Remove and return the module with the given id.
    pub fn remove(&mut self, id: &ModuleId) -> Option<Arc<Module>> {
        self.modules.remove(id)
    }

    /// The module registered under `id`.
    #[must_use]
    pub fn module(&self, id: &str) -> Option<&Arc<Module>> {
        self.modules.get(id)
    }

    /// Whether a module with the given id is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    /// All modules, in id order.
    pub fn modules(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.modules.values()
    }

    /// The modules carrying the given status, in id order.
    pub fn modules_with_status(&self, status: Status) -> impl Iterator<Item = &Arc<Module>> {
        self.modules.values().filter(move |m| m.descriptor().status() == status)
    }

    /// A snapshot of all modules, usable as a resolver candidate set.
    #[must_use]
    pub fn candidates(&self) -> Vec<Arc<Module>> {
        self.modules.values().cloned().collect()
    }

    /// Number of modules in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// The host release carried by the source catalog document, if any.
    #[must_use]
    pub fn host_release(&self) -> Option<&HostReleaseEntry> {
        self.host_release.as_ref()
    }

    /// Modules in `other` that are updates to same-id modules in this
    /// catalog.
    #[must_use]
    pub fn updated_modules(&self, other: &ModuleCatalog) -> Vec<Arc<Module>> {
        other
            .modules()
            .filter(|candidate| {
                self.modules
                    .get(candidate.id())
                    .is_some_and(|mine| candidate.descriptor().is_update_to(mine.descriptor()))
            })
            .cloned()
            .collect()
    }

    /// Modules in `other` whose id is absent from this catalog.
    #[must_use]
    pub fn new_modules(&self, other: &ModuleCatalog) -> Vec<Arc<Module>> {
        other
            .modules()
            .filter(|candidate| !self.modules.contains_key(candidate.id()))
            .cloned()
            .collect()
    }

    /// Remove every module with a dependency issue or an extension-level
    /// issue, repeatedly, until the remaining set is clean.
    ///
    /// Every member of a dependency cycle reports the cyclic issue itself, so
    /// a whole cyclic set disappears in a single pass instead of being
    /// reprocessed pair by pair. Removing a module can invalidate its
    /// dependents, hence the repetition until a pass removes nothing.
    pub fn prune_unrunnable(&mut self, host: &HostInfo) -> Vec<PrunedModule> {
        let mut pruned = Vec::new();
        loop {
            let candidates = self.candidates();
            let mut removed_this_pass = Vec::new();
            for module in &candidates {
                let requirements = RunRequirements::calculate(module, &candidates, host);
                if requirements.dependency_issue().is_some()
                    || !requirements.extension_issues().is_empty()
                {
                    removed_this_pass.push(PrunedModule {
                        module: Arc::clone(module),
                        requirements,
                    });
                }
            }
            if removed_this_pass.is_empty() {
                return pruned;
            }
            for entry in &removed_this_pass {
                self.modules.remove(entry.module.id());
                match entry.requirements.dependency_issue() {
                    Some(DependencyIssue::Cyclic { members }) => {
                        let cycle: Vec<&str> = members.iter().map(ModuleId::as_str).collect();
                        warn!(module_id = %entry.module.id(), ?cycle,
                            "removing module, part of a dependency cycle");
                    }
                    Some(issue) => {
                        warn!(module_id = %entry.module.id(), %issue,
                            "removing module with unmet dependencies");
                    }
                    None => {
                        warn!(module_id = %entry.module.id(),
                            "removing module with unrunnable extensions");
                    }
                }
            }
            pruned.extend(removed_this_pass);
        }
    }
}
