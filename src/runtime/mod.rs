//! The runtime orchestrator: scan, load, add, remove.
//!
//! [`ModuleRuntime`] owns the shared mutable state of the module system: the
//! catalog, the loader map, and the persisted block list. All mutation runs
//! on a single control path serialized by the host (`&mut self` enforces
//! this); only loader lookups are meant for arbitrary concurrent threads.
//!
//! # Startup
//!
//! [`ModuleRuntime::start`] performs the startup sequence:
//!
//! 1. load the block list from the persisted config,
//! 2. scan the module directories into a catalog (blocked ids are filtered
//!    before they ever reach the catalog),
//! 3. prune modules with unmet requirements (unless configured to keep them),
//! 4. create a loader for every module that can load under the current host
//!    version, then wire dependency loaders by id in a second phase,
//! 5. append legacy flat archives to the host loader's aggregate search
//!    path,
//! 6. install every loadable module's artifacts, copying only shipped files
//!    that are not already present; startup never overwrites existing files.
//!
//! # Runtime add and remove
//!
//! [`ModuleRuntime::add_module`] hard-rejects version-incompatible archives,
//! treats an already-present id as "not added", reinstates blocked ids, and
//! only builds a loader and installs artifacts for dynamically installable
//! modules. [`ModuleRuntime::remove_module`] uninstalls, closes the loader
//! cascade, deletes the backing archive, and records undeletable archives on
//! the block list unless the removal is part of an upgrade.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive::ModuleArchive;
use crate::catalog::{InstallStatus, Module, ModuleCatalog, PrunedModule};
use crate::config::RuntimeConfig;
use crate::core::{HostInfo, ModuleId, RuntimeError};
use crate::installer::LifecycleInstaller;
use crate::loader::{HostLoader, ModuleLoader};
use crate::registry::{FactoryRegistry, HostCollaborators};
use crate::resolver::RunRequirements;

/// File extension of legacy flat archives appended to the host's aggregate
/// search path.
pub const LEGACY_EXTENSION: &str = "zip";

/// The add-on module runtime.
pub struct ModuleRuntime {
    host: HostInfo,
    home: PathBuf,
    module_dirs: Vec<PathBuf>,
    config: RuntimeConfig,
    catalog: ModuleCatalog,
    loaders: HashMap<ModuleId, Arc<ModuleLoader>>,
    host_loader: Arc<HostLoader>,
    installer: LifecycleInstaller,
    collaborators: HostCollaborators,
    pruned: Vec<PrunedModule>,
}

impl ModuleRuntime {
    /// Run the startup sequence and return the running runtime.
    ///
    /// `allow_modules_with_dependency_issues` keeps modules with unmet
    /// requirements in the catalog (reported, not loadable pruning); the
    /// default posture of the host is `false`.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        host: HostInfo,
        home: PathBuf,
        module_dirs: Vec<PathBuf>,
        host_loader: Arc<HostLoader>,
        factories: Arc<FactoryRegistry>,
        collaborators: HostCollaborators,
        allow_modules_with_dependency_issues: bool,
    ) -> Result<Self> {
        let config = RuntimeConfig::load(&home).context("failed to load runtime config")?;

        let mut catalog = ModuleCatalog::scan_directories(&module_dirs, &host, config.blocked());
        let pruned = if allow_modules_with_dependency_issues {
            Vec::new()
        } else {
            catalog.prune_unrunnable(&host)
        };

        let installer =
            LifecycleInstaller::new(factories, collaborators.clone(), home.clone());
        let mut runtime = Self {
            host,
            home,
            module_dirs,
            config,
            catalog,
            loaders: HashMap::new(),
            host_loader,
            installer,
            collaborators,
            pruned,
        };

        runtime.build_loaders();
        runtime.register_legacy_archives();
        runtime.install_startup_artifacts();

        info!(
            modules = runtime.catalog.len(),
            loaders = runtime.loaders.len(),
            pruned = runtime.pruned.len(),
            "module runtime started"
        );
        Ok(runtime)
    }

    /// Create loaders for every loadable module, then wire dependencies by id.
    ///
    /// The two phases matter: a dependency loader may be created after its
    /// dependent during the same scan, so linking is deferred until all
    /// loaders exist.
    fn build_loaders(&mut self) {
        for module in self.catalog.modules() {
            if !module.descriptor().can_load_in_version(&self.host) {
                debug!(module_id = %module.id(),
                    "not building loader, module incompatible with host version");
                continue;
            }
            if module.archive_path().is_none() {
                continue;
            }
            match ModuleLoader::new(Arc::clone(module), Arc::clone(&self.host_loader)) {
                Ok(loader) => {
                    self.loaders.insert(module.id().clone(), loader);
                }
                Err(e) => {
                    warn!(module_id = %module.id(), error = %e,
                        "failed to open module archive, module not loadable");
                    module.mark_failed();
                }
            }
        }

        for (id, loader) in &self.loaders {
            let mut seen = HashSet::new();
            for target in loader.module().descriptor().all_dependency_targets() {
                if !seen.insert(target.clone()) {
                    continue;
                }
                match self.loaders.get(target) {
                    Some(dependency) => ModuleLoader::link(loader, dependency),
                    None => debug!(module_id = %id, dependency = %target,
                        "dependency has no loader, lookups will not delegate to it"),
                }
            }
        }
    }

    /// Append legacy flat archives found in the module directories to the
    /// host loader's aggregate search path. Legacy archives have no
    /// dependency graph and no descriptor.
    fn register_legacy_archives(&mut self) {
        for dir in &self.module_dirs {
            for entry in WalkDir::new(dir).max_depth(1).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let is_legacy = entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(LEGACY_EXTENSION));
                if !is_legacy {
                    continue;
                }
                match ModuleArchive::open(entry.path()) {
                    Ok(archive) => {
                        debug!(archive = %entry.path().display(), "registered legacy archive");
                        self.host_loader.append_legacy_archive(archive);
                    }
                    Err(e) => {
                        warn!(archive = %entry.path().display(), error = %e,
                            "skipping unreadable legacy archive");
                    }
                }
            }
        }
    }

    /// Hand every loadable module's artifacts to the host collaborators.
    /// Shipped files already present on disk are left untouched.
    fn install_startup_artifacts(&self) {
        for (id, loader) in &self.loaders {
            let summary = self.installer.install_at_startup(loader, loader.module());
            debug!(module_id = %id, extensions = summary.extensions,
                active_rules = summary.active_rules, passive_rules = summary.passive_rules,
                files = summary.files, "installed module artifacts at startup");
        }
    }

    /// The running host's version information.
    #[must_use]
    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    /// The current catalog.
    #[must_use]
    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// The loader of a loadable module.
    #[must_use]
    pub fn loader(&self, id: &ModuleId) -> Option<&Arc<ModuleLoader>> {
        self.loaders.get(id)
    }

    /// The host loader.
    #[must_use]
    pub fn host_loader(&self) -> &Arc<HostLoader> {
        &self.host_loader
    }

    /// Modules removed during the startup prune, with the requirements that
    /// disqualified them, for reporting to the user.
    #[must_use]
    pub fn pruned_modules(&self) -> &[PrunedModule] {
        &self.pruned
    }

    /// Ids currently on the persisted block list.
    #[must_use]
    pub fn blocked_ids(&self) -> Vec<ModuleId> {
        self.config.blocked().iter().cloned().collect()
    }

    /// Evaluate the run requirements of a cataloged module against the
    /// current catalog.
    #[must_use]
    pub fn run_requirements(&self, id: &ModuleId) -> Option<RunRequirements> {
        let module = self.catalog.module(id.as_str())?;
        Some(RunRequirements::calculate(module, &self.catalog.candidates(), &self.host))
    }

    /// Add a module from an archive file while the host is running.
    ///
    /// Returns `Ok(false)` without touching anything when a module with the
    /// same id is already present. A version-incompatible archive is a hard
    /// error, unlike the lenient startup scan. Adding a blocked id
    /// reinstates it: the id comes off the block list immediately.
    pub fn add_module(&mut self, archive: &Path) -> Result<bool> {
        self.add_module_verified(archive, None)
    }

    /// Like [`ModuleRuntime::add_module`], additionally verifying the
    /// archive checksum against the hash a catalog entry declared for it.
    pub fn add_module_verified(
        &mut self,
        archive: &Path,
        expected_hash: Option<&str>,
    ) -> Result<bool> {
        let module = Arc::new(Module::from_archive(archive)?);

        if !module.descriptor().can_load_in_version(&self.host) {
            return Err(RuntimeError::VersionIncompatible {
                id: module.id().to_string(),
                host_version: self.host.version().to_string(),
            }
            .into());
        }
        if let Some(expected) = expected_hash {
            let actual = module.open_archive()?.checksum()?;
            if actual != expected {
                return Err(RuntimeError::ChecksumMismatch {
                    id: module.id().to_string(),
                    expected: expected.to_string(),
                    actual,
                }
                .into());
            }
        }
        if self.catalog.contains(module.id().as_str()) {
            debug!(module_id = %module.id(), "module already present, not added");
            return Ok(false);
        }

        self.catalog.insert(Arc::clone(&module));
        // An explicit add of a blocked id reinstates it.
        self.config
            .unblock(module.id())
            .context("failed to persist block list update")?;

        if !module.descriptor().is_dynamically_installable() {
            info!(module_id = %module.id(), "added static module");
            return Ok(true);
        }

        let loader = ModuleLoader::new(Arc::clone(&module), Arc::clone(&self.host_loader))?;
        let mut seen = HashSet::new();
        for target in module.descriptor().all_dependency_targets() {
            if seen.insert(target.clone())
                && let Some(dependency) = self.loaders.get(target)
            {
                ModuleLoader::link(&loader, dependency);
            }
        }
        self.loaders.insert(module.id().clone(), Arc::clone(&loader));

        self.installer.install(&loader, &module);
        module.set_install_status(InstallStatus::Installed);
        info!(module_id = %module.id(), "added module");

        if let Some(ui) = &self.collaborators.ui {
            ui.modules_changed();
        }
        Ok(true)
    }

    /// Remove a module while the host is running.
    ///
    /// `upgrading` marks the removal as part of an upgrade sequence, which
    /// suppresses block-list recording when the backing archive cannot be
    /// deleted (the replacement archive is about to take its place).
    ///
    /// Returns whether every uninstall sub-step and the archive deletion
    /// succeeded. Static modules and absent ids are hard errors.
    pub fn remove_module(&mut self, id: &ModuleId, upgrading: bool) -> Result<bool> {
        let module = self
            .catalog
            .module(id.as_str())
            .cloned()
            .ok_or_else(|| RuntimeError::ModuleNotPresent { id: id.to_string() })?;
        if !module.descriptor().is_dynamically_installable() {
            return Err(RuntimeError::ModuleNotDynamic { id: id.to_string() }.into());
        }

        let mut success = self.installer.uninstall(&module);
        self.catalog.remove(id);

        if let Some(loader) = self.loaders.remove(id) {
            let closed = loader.close();
            let order: Vec<&str> = closed.iter().map(ModuleId::as_str).collect();
            debug!(module_id = %id, ?order, "closed loader cascade");
            // Dependents were force-closed with their dependency; drop their
            // loader map entries so no lookup reaches a closed loader.
            for closed_id in &closed {
                self.loaders.remove(closed_id);
            }
        }

        if let Some(path) = module.archive_path() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(module_id = %id, archive = %path.display(), error = %e,
                    "failed to delete module archive");
                success = false;
                if !upgrading {
                    self.config
                        .block(id.clone())
                        .context("failed to persist block list")?;
                }
            }
        }

        module.set_install_status(InstallStatus::Available);
        info!(module_id = %id, success, "removed module");
        Ok(success)
    }

    /// Close every loader, dependents before dependencies, and return the
    /// ids in close order. Called once at host shutdown.
    pub fn shutdown(&mut self) -> Vec<ModuleId> {
        let mut order = Vec::new();
        for loader in self.loaders.values() {
            order.extend(loader.close());
        }
        self.loaders.clear();
        info!(closed = order.len(), "module runtime shut down");
        order
    }
}

impl std::fmt::Debug for ModuleRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRuntime")
            .field("modules", &self.catalog.len())
            .field("loaders", &self.loaders.len())
            .field("home", &self.home)
            .finish_non_exhaustive()
    }
}
