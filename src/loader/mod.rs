//! The per-module code-loading delegation graph.
//!
//! Every loadable module gets exactly one [`ModuleLoader`]. A loader resolves
//! component definitions and resources in a fixed order, stopping at the
//! first success:
//!
//! 1. the module's own archive, gated for components by the module's
//!    allow/restrict visibility rules;
//! 2. the host loader ([`HostLoader`]), which serves the host application's
//!    built-in components and any legacy flat archives appended to its
//!    aggregate search path;
//! 3. the loaders of the module's declared dependencies, in declaration
//!    order, recursively.
//!
//! Resolution never ascends to a dependent loader; the dependency graph is
//! acyclic by the time loaders are built (cycles are pruned upstream), so
//! delegation terminates. A miss anywhere falls through silently to the next
//! source; only the exhausted chain reports not-found, and it does so with
//! `None` rather than an error, because host-wide lookups routinely probe
//! many loaders.
//!
//! Lookups are safe for concurrent callers: the only shared mutable state is
//! the loader-internal result cache (a [`DashMap`]) and the archive handle
//! behind its lock.
//!
//! Closing a loader cascades to its dependents first, recursively, and only
//! then releases the module's own archive handle. Dependents hold already
//! resolved definitions that originate from this loader's archive; releasing
//! the archive first would leave them dangling.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use dashmap::DashMap;
use tracing::debug;

use crate::archive::{component_entry_path, ModuleArchive};
use crate::catalog::Module;
use crate::core::{ModuleId, Result};

/// Where a resolved component definition came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionOrigin {
    /// A built-in component of the host application.
    Host,
    /// The archive of the named module.
    Module(ModuleId),
    /// A legacy flat archive on the host's aggregate search path.
    LegacyArchive(PathBuf),
}

/// A resolved component definition.
#[derive(Debug, Clone)]
pub struct ComponentDef {
    name: String,
    bytes: Vec<u8>,
    origin: DefinitionOrigin,
}

impl ComponentDef {
    /// Create a definition. Hosts use this to register built-ins.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, origin: DefinitionOrigin) -> Self {
        Self {
            name: name.into(),
            bytes,
            origin,
        }
    }

    /// The component name the definition resolves.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw definition bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Which source produced the definition.
    #[must_use]
    pub fn origin(&self) -> &DefinitionOrigin {
        &self.origin
    }
}

/// The host application's own loader.
///
/// Serves the process-scoped registry of built-in component definitions,
/// constructed once at startup, plus the aggregate search path of legacy flat
/// archives (old-style modules without a dependency graph) appended during
/// directory scans.
#[derive(Debug, Default)]
pub struct HostLoader {
    builtin: std::collections::HashMap<String, Arc<ComponentDef>>,
    legacy: RwLock<Vec<Arc<ModuleArchive>>>,
}

impl HostLoader {
    /// An empty host loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built-in component definition. Call before the runtime
    /// starts; the built-in registry is immutable afterwards.
    pub fn register_component(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        let def = ComponentDef::new(name.clone(), bytes, DefinitionOrigin::Host);
        self.builtin.insert(name, Arc::new(def));
    }

    /// Append a legacy flat archive to the aggregate search path.
    pub fn append_legacy_archive(&self, archive: ModuleArchive) {
        self.legacy.write().unwrap_or_else(PoisonError::into_inner).push(Arc::new(archive));
    }

    /// Number of legacy archives on the aggregate search path.
    #[must_use]
    pub fn legacy_archive_count(&self) -> usize {
        self.legacy.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Resolve a component from the built-ins, then the legacy archives in
    /// append order.
    #[must_use]
    pub fn find_component(&self, name: &str) -> Option<Arc<ComponentDef>> {
        if let Some(def) = self.builtin.get(name) {
            return Some(Arc::clone(def));
        }
        let entry = component_entry_path(name);
        let legacy = self.legacy.read().unwrap_or_else(PoisonError::into_inner);
        for archive in legacy.iter() {
            if let Some(bytes) = archive.entry_bytes(&entry) {
                return Some(Arc::new(ComponentDef::new(
                    name,
                    bytes,
                    DefinitionOrigin::LegacyArchive(archive.path().to_path_buf()),
                )));
            }
        }
        None
    }

    /// Resolve a resource from the legacy archives in append order.
    #[must_use]
    pub fn find_resource(&self, path: &str) -> Option<Vec<u8>> {
        let legacy = self.legacy.read().unwrap_or_else(PoisonError::into_inner);
        legacy.iter().find_map(|archive| archive.entry_bytes(path))
    }
}

/// The loader of one module.
///
/// See the module documentation for the resolution order and the closing
/// cascade. Loaders are created unlinked and wired to their dependency
/// loaders by [`ModuleLoader::link`] once all loaders of the
/// accepted module set exist.
pub struct ModuleLoader {
    module: Arc<Module>,
    host: Arc<HostLoader>,
    archive: Mutex<Option<ModuleArchive>>,
    dependencies: RwLock<Vec<Arc<ModuleLoader>>>,
    dependents: RwLock<Vec<Weak<ModuleLoader>>>,
    cache: DashMap<String, Arc<ComponentDef>>,
}

impl ModuleLoader {
    /// Create a loader for `module`, opening its backing archive.
    pub fn new(module: Arc<Module>, host: Arc<HostLoader>) -> Result<Arc<Self>> {
        let archive = module.open_archive()?;
        Ok(Arc::new(Self {
            module,
            host,
            archive: Mutex::new(Some(archive)),
            dependencies: RwLock::new(Vec::new()),
            dependents: RwLock::new(Vec::new()),
            cache: DashMap::new(),
        }))
    }

    /// The module this loader belongs to.
    #[must_use]
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    /// Wire `dependency` as the next dependency loader of `dependent` and
    /// register `dependent` with it for the closing cascade.
    pub fn link(dependent: &Arc<ModuleLoader>, dependency: &Arc<ModuleLoader>) {
        dependent
            .dependencies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(dependency));
        dependency
            .dependents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(dependent));
    }

    /// Ids of the wired dependency loaders, in resolution order.
    #[must_use]
    pub fn dependency_ids(&self) -> Vec<ModuleId> {
        self.dependencies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|loader| loader.module.id().clone())
            .collect()
    }

    /// Whether the loader has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.archive.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Resolve a component definition through the delegation chain.
    #[must_use]
    pub fn find_component(&self, name: &str) -> Option<Arc<ComponentDef>> {
        if let Some(cached) = self.cache.get(name) {
            return Some(Arc::clone(cached.value()));
        }
        let resolved = self.resolve_component(name)?;
        self.cache.insert(name.to_string(), Arc::clone(&resolved));
        Some(resolved)
    }

    fn resolve_component(&self, name: &str) -> Option<Arc<ComponentDef>> {
        // Own archive first, so a module's copy shadows a same-named host
        // component. The visibility rules only gate this step.
        if self.module.descriptor().visibility().is_permitted(name) {
            let entry = component_entry_path(name);
            let guard = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(archive) = guard.as_ref()
                && let Some(bytes) = archive.entry_bytes(&entry)
            {
                return Some(Arc::new(ComponentDef::new(
                    name,
                    bytes,
                    DefinitionOrigin::Module(self.module.id().clone()),
                )));
            }
        } else {
            debug!(module_id = %self.module.id(), component = name,
                "component not visible in own archive");
        }

        if let Some(def) = self.host.find_component(name) {
            return Some(def);
        }

        let dependencies = self.dependencies.read().unwrap_or_else(PoisonError::into_inner);
        dependencies.iter().find_map(|loader| loader.find_component(name))
    }

    /// Read a resource from the module's own archive only, without
    /// delegation. Shipped-file installation uses this; a file declared by
    /// this module must come from this module's archive.
    #[must_use]
    pub fn own_resource(&self, path: &str) -> Option<Vec<u8>> {
        let guard = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().and_then(|archive| archive.entry_bytes(path))
    }

    /// Resolve a resource through the delegation chain. Resources are not
    /// subject to the component visibility rules.
    #[must_use]
    pub fn find_resource(&self, path: &str) -> Option<Vec<u8>> {
        {
            let guard = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(archive) = guard.as_ref()
                && let Some(bytes) = archive.entry_bytes(path)
            {
                return Some(bytes);
            }
        }
        if let Some(bytes) = self.host.find_resource(path) {
            return Some(bytes);
        }
        let dependencies = self.dependencies.read().unwrap_or_else(PoisonError::into_inner);
        dependencies.iter().find_map(|loader| loader.find_resource(path))
    }

    /// Close this loader, cascading to dependents first.
    ///
    /// Returns the ids of all loaders closed by the cascade, dependents
    /// before dependencies, this loader last. Closing twice is a no-op that
    /// returns an empty list.
    pub fn close(&self) -> Vec<ModuleId> {
        let mut order = Vec::new();
        self.close_cascading(&mut order);
        order
    }

    fn close_cascading(&self, order: &mut Vec<ModuleId>) {
        let dependents =
            std::mem::take(&mut *self.dependents.write().unwrap_or_else(PoisonError::into_inner));
        for weak in dependents {
            if let Some(dependent) = weak.upgrade() {
                dependent.close_cascading(order);
            }
        }
        let released = self.archive.lock().unwrap_or_else(PoisonError::into_inner).take();
        if released.is_some() {
            self.cache.clear();
            self.dependencies.write().unwrap_or_else(PoisonError::into_inner).clear();
            debug!(module_id = %self.module.id(), "closed module loader");
            order.push(self.module.id().clone());
        }
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("module", self.module.id())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
