//! Install and uninstall of a module's declared artifacts.
//!
//! Given a resolved module and its loader, the [`LifecycleInstaller`]
//! instantiates and installs the module's declared extensions and scan rules
//! and copies its shipped files; on uninstall it reverses all of it.
//!
//! # Failure Policy
//!
//! Per-artifact failures never abort the batch. A component that does not
//! resolve through the loader, has no registered factory, or is registered
//! with the wrong capability is logged and skipped; a shipped file that fails
//! to copy or delete is logged and folded into the result. `install` reports
//! counts, `uninstall` reports a single aggregate boolean that is `true` only
//! when every sub-step succeeded.
//!
//! # Ordering
//!
//! Install registers extensions in hint order (explicitly hinted extensions
//! first, ascending, declaration order for ties and for hintless ones), with
//! duplicate hints logged, then scan rules, then files, and finally runs the
//! post-install hook of every started extension. Uninstall unregisters scan
//! rules first (active, then passive), then deletes shipped files, and
//! unloads extensions last, because earlier artifacts may still depend on
//! extension-provided resources while they are being torn down.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::Module;
use crate::core::ModuleId;
use crate::loader::ModuleLoader;
use crate::registry::{
    ActiveScanRule, Extension, FactoryRegistry, HostCollaborators, PassiveScanRule,
};
use crate::utils::fs::{ensure_dir, remove_empty_parents};

/// Counts of successfully installed artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallSummary {
    /// Extensions registered and started.
    pub extensions: usize,
    /// Active scan rules registered.
    pub active_rules: usize,
    /// Passive scan rules registered.
    pub passive_rules: usize,
    /// Shipped files copied.
    pub files: usize,
}

/// Installs and uninstalls module artifacts against the host collaborators.
pub struct LifecycleInstaller {
    factories: Arc<FactoryRegistry>,
    collaborators: HostCollaborators,
    home: PathBuf,
}

impl LifecycleInstaller {
    /// Create an installer operating under the given home directory.
    pub fn new(
        factories: Arc<FactoryRegistry>,
        collaborators: HostCollaborators,
        home: PathBuf,
    ) -> Self {
        Self {
            factories,
            collaborators,
            home,
        }
    }

    /// Install every artifact the module declares, overwriting shipped files
    /// that already exist. Used on the dynamic add path.
    pub fn install(&self, loader: &Arc<ModuleLoader>, module: &Arc<Module>) -> InstallSummary {
        self.install_inner(loader, module, true)
    }

    /// Install every artifact the module declares, copying only shipped
    /// files that are not already present. Used at startup, which never
    /// overwrites existing files.
    pub fn install_at_startup(
        &self,
        loader: &Arc<ModuleLoader>,
        module: &Arc<Module>,
    ) -> InstallSummary {
        self.install_inner(loader, module, false)
    }

    fn install_inner(
        &self,
        loader: &Arc<ModuleLoader>,
        module: &Arc<Module>,
        overwrite_files: bool,
    ) -> InstallSummary {
        let extensions = self.install_extensions(loader, module);
        let active_rules = self.install_active_rules(loader, module);
        let passive_rules = self.install_passive_rules(loader, module);
        let files = self.copy_shipped_files(loader, module, overwrite_files);

        for extension in &extensions {
            if let Err(e) = extension.post_install() {
                warn!(module_id = %module.id(), extension = extension.name(), error = %e,
                    "post-install hook failed");
            }
        }

        info!(module_id = %module.id(), extensions = extensions.len(),
            active_rules, passive_rules, files, "installed module artifacts");
        InstallSummary {
            extensions: extensions.len(),
            active_rules,
            passive_rules,
            files,
        }
    }

    /// Uninstall every artifact the module declared.
    ///
    /// Returns `true` only if every sub-step succeeded; individual failures
    /// are logged and folded into the flag, never raised.
    pub fn uninstall(&self, module: &Arc<Module>) -> bool {
        let mut success = true;

        for (name, _) in module.active_rules_cached(Vec::new) {
            if !self.collaborators.active_rules.remove_rule(name) {
                warn!(module_id = %module.id(), rule = name.as_str(),
                    "active scan rule was not registered at uninstall");
                success = false;
            }
        }
        for (name, _) in module.passive_rules_cached(Vec::new) {
            if !self.collaborators.passive_rules.remove_rule(name) {
                warn!(module_id = %module.id(), rule = name.as_str(),
                    "passive scan rule was not registered at uninstall");
                success = false;
            }
        }

        if !self.delete_shipped_files(module) {
            success = false;
        }

        // Extensions go last; the artifacts above may reference resources the
        // extensions still provide while being torn down.
        let extensions = self.collaborators.extensions.remove_extensions(module.id());
        for extension in extensions {
            debug!(module_id = %module.id(), extension = extension.name(), "stopping extension");
            extension.stop();
        }

        if !success {
            module.mark_failed();
        }
        info!(module_id = %module.id(), success, "uninstalled module artifacts");
        success
    }

    fn install_extensions(
        &self,
        loader: &Arc<ModuleLoader>,
        module: &Arc<Module>,
    ) -> Vec<Arc<dyn Extension>> {
        let mut instantiated: Vec<Arc<dyn Extension>> = Vec::new();
        for decl in module.descriptor().extensions() {
            let Some(extension) =
                self.instantiate_extension(loader, module.id(), decl.classname())
            else {
                continue;
            };
            if !extension.is_enabled() {
                debug!(module_id = %module.id(), extension = decl.classname(),
                    "extension disabled, not registering");
                continue;
            }
            instantiated.push(extension);
        }

        sort_by_order_hints(module.id(), &mut instantiated);

        let mut started = Vec::with_capacity(instantiated.len());
        for extension in instantiated {
            self.collaborators.extensions.add_extension(module.id(), Arc::clone(&extension));
            match extension.start() {
                Ok(()) => started.push(extension),
                Err(e) => {
                    warn!(module_id = %module.id(), extension = extension.name(), error = %e,
                        "extension failed to start");
                }
            }
        }
        started
    }

    fn instantiate_extension(
        &self,
        loader: &Arc<ModuleLoader>,
        module_id: &ModuleId,
        classname: &str,
    ) -> Option<Arc<dyn Extension>> {
        if loader.find_component(classname).is_none() {
            warn!(module_id = %module_id, component = classname,
                "extension definition not found through the loader");
            return None;
        }
        match self.factories.instantiate_extension(classname) {
            Ok(extension) => Some(extension),
            Err(e) => {
                warn!(module_id = %module_id, component = classname, error = %e,
                    "skipping extension");
                None
            }
        }
    }

    fn install_active_rules(&self, loader: &Arc<ModuleLoader>, module: &Arc<Module>) -> usize {
        let rules = module.active_rules_cached(|| {
            let mut rules: Vec<(String, Arc<dyn ActiveScanRule>)> = Vec::new();
            for name in module.descriptor().active_rules() {
                if loader.find_component(name).is_none() {
                    warn!(module_id = %module.id(), component = name.as_str(),
                        "active scan rule definition not found through the loader");
                    continue;
                }
                match self.factories.instantiate_active_rule(name) {
                    Ok(rule) => rules.push((name.clone(), rule)),
                    Err(e) => {
                        warn!(module_id = %module.id(), component = name.as_str(), error = %e,
                            "skipping active scan rule");
                    }
                }
            }
            rules
        });
        for (name, rule) in rules {
            self.collaborators.active_rules.add_rule(name, Arc::clone(rule));
        }
        rules.len()
    }

    fn install_passive_rules(&self, loader: &Arc<ModuleLoader>, module: &Arc<Module>) -> usize {
        let rules = module.passive_rules_cached(|| {
            let mut rules: Vec<(String, Arc<dyn PassiveScanRule>)> = Vec::new();
            for name in module.descriptor().passive_rules() {
                if loader.find_component(name).is_none() {
                    warn!(module_id = %module.id(), component = name.as_str(),
                        "passive scan rule definition not found through the loader");
                    continue;
                }
                match self.factories.instantiate_passive_rule(name) {
                    Ok(rule) => rules.push((name.clone(), rule)),
                    Err(e) => {
                        warn!(module_id = %module.id(), component = name.as_str(), error = %e,
                            "skipping passive scan rule");
                    }
                }
            }
            rules
        });
        for (name, rule) in rules {
            self.collaborators.passive_rules.add_rule(name, Arc::clone(rule));
        }
        rules.len()
    }

    fn copy_shipped_files(
        &self,
        loader: &Arc<ModuleLoader>,
        module: &Arc<Module>,
        overwrite: bool,
    ) -> usize {
        let mut copied = 0;
        for declared in module.descriptor().files() {
            let Some(destination) = self.shipped_file_destination(module.id(), declared) else {
                module.mark_failed();
                continue;
            };
            if !overwrite && destination.exists() {
                debug!(module_id = %module.id(), file = declared.as_str(),
                    "shipped file already present, not overwriting");
                continue;
            }
            let Some(bytes) = loader.own_resource(declared) else {
                warn!(module_id = %module.id(), file = declared.as_str(),
                    "shipped file missing from module archive");
                module.mark_failed();
                continue;
            };
            let result = destination
                .parent()
                .map_or(Ok(()), ensure_dir)
                .and_then(|()| std::fs::write(&destination, &bytes).map_err(Into::into));
            match result {
                Ok(()) => {
                    debug!(module_id = %module.id(), file = declared.as_str(), "copied shipped file");
                    copied += 1;
                }
                Err(e) => {
                    warn!(module_id = %module.id(), file = declared.as_str(), error = %e,
                        "failed to copy shipped file");
                    module.mark_failed();
                }
            }
        }
        copied
    }

    fn delete_shipped_files(&self, module: &Arc<Module>) -> bool {
        let mut success = true;
        for declared in module.descriptor().files() {
            let Some(destination) = self.shipped_file_destination(module.id(), declared) else {
                success = false;
                continue;
            };
            if destination.exists()
                && let Err(e) = std::fs::remove_file(&destination)
            {
                warn!(module_id = %module.id(), file = declared.as_str(), error = %e,
                    "failed to delete shipped file");
                success = false;
                continue;
            }
            if let Err(e) = remove_empty_parents(&destination, &self.home) {
                warn!(module_id = %module.id(), file = declared.as_str(), error = %e,
                    "failed to clean up empty directories");
                success = false;
            }
        }
        success
    }

    /// Resolve a declared relative path against the home directory, refusing
    /// paths that would escape it.
    fn shipped_file_destination(&self, module_id: &ModuleId, declared: &str) -> Option<PathBuf> {
        let relative = Path::new(declared);
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir));
        if escapes {
            warn!(module_id = %module_id, file = declared,
                "shipped file path escapes the home directory");
            return None;
        }
        Some(self.home.join(relative))
    }
}

/// Order extensions by their explicit hints: hinted extensions first in
/// ascending hint order, declaration order for equal hints and for hintless
/// extensions (which all sort last). Duplicate hints are logged, not fatal.
fn sort_by_order_hints(module_id: &ModuleId, extensions: &mut [Arc<dyn Extension>]) {
    let mut seen = std::collections::HashMap::new();
    for extension in extensions.iter() {
        if let Some(hint) = extension.order_hint()
            && let Some(previous) = seen.insert(hint, extension.name().to_string())
        {
            warn!(module_id = %module_id, hint,
                first = previous.as_str(), second = extension.name(),
                "extensions declare the same order hint");
        }
    }
    extensions.sort_by_key(|e| e.order_hint().unwrap_or(u32::MAX));
}

impl std::fmt::Debug for LifecycleInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleInstaller").field("home", &self.home).finish_non_exhaustive()
    }
}
