//! Host collaborator contracts and the component factory registry.
//!
//! The runtime hands fully resolved module artifacts to the host through the
//! narrow traits in this module and receives constructors for component names
//! through [`FactoryRegistry`]:
//!
//! - [`Extension`], [`ActiveScanRule`], [`PassiveScanRule`] are the artifact
//!   capabilities a module can declare.
//! - [`ExtensionRegistry`], [`ActiveRuleRegistry`], [`PassiveRuleRegistry`]
//!   are the host-side registries artifacts are installed into.
//! - [`UiRefreshHook`] is the fire-and-forget notification invoked after a
//!   module is dynamically added, only when a UI is present.
//! - [`FactoryRegistry`] is the process-scoped mapping from component names
//!   to zero-argument constructors, built once at startup and passed by
//!   reference to the runtime. Instantiation is capability-checked: asking
//!   for an extension by a name registered as a scan rule is a
//!   [`FactoryError::WrongCapability`], which install paths log and skip.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::core::ModuleId;

/// An installable extension artifact.
///
/// Extensions are started when their module is installed and stopped when it
/// is unloaded. Ordering hints control the registration order relative to
/// other extensions; hintless extensions keep their declaration order after
/// all hinted ones.
pub trait Extension: Send + Sync {
    /// Stable name of the extension, unique within the host.
    fn name(&self) -> &str;

    /// Whether the extension should be started on install. Disabled
    /// extensions are instantiated but neither started nor registered.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Explicit ordering hint. Lower values register earlier.
    fn order_hint(&self) -> Option<u32> {
        None
    }

    /// Start the extension. Called once after registration.
    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Stop the extension. Called during unload; must not fail.
    fn stop(&self) {}

    /// Hook invoked after the owning module finished installing. A failure
    /// here is logged and does not affect the other extensions' hooks.
    fn post_install(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// An active scan rule artifact, keyed by its declared component name.
pub trait ActiveScanRule: Send + Sync {
    /// Stable name of the rule.
    fn name(&self) -> &str;
}

/// A passive scan rule artifact, keyed by its declared component name.
pub trait PassiveScanRule: Send + Sync {
    /// Stable name of the rule.
    fn name(&self) -> &str;
}

/// Host registry receiving installed extensions.
pub trait ExtensionRegistry: Send + Sync {
    /// Register a started extension for `module`.
    fn add_extension(&self, module: &ModuleId, extension: Arc<dyn Extension>);

    /// Remove and return every extension registered for `module`.
    fn remove_extensions(&self, module: &ModuleId) -> Vec<Arc<dyn Extension>>;
}

/// Host registry receiving active scan rules.
pub trait ActiveRuleRegistry: Send + Sync {
    /// Register a rule under its component name.
    fn add_rule(&self, name: &str, rule: Arc<dyn ActiveScanRule>);

    /// Remove the rule registered under `name`. Returns whether one existed.
    fn remove_rule(&self, name: &str) -> bool;
}

/// Host registry receiving passive scan rules.
pub trait PassiveRuleRegistry: Send + Sync {
    /// Register a rule under its component name.
    fn add_rule(&self, name: &str, rule: Arc<dyn PassiveScanRule>);

    /// Remove the rule registered under `name`. Returns whether one existed.
    fn remove_rule(&self, name: &str) -> bool;
}

/// Fire-and-forget UI notification, present only when the host runs a UI.
pub trait UiRefreshHook: Send + Sync {
    /// Invoked after a module was dynamically added.
    fn modules_changed(&self);
}

/// The host collaborators the runtime installs artifacts into.
#[derive(Clone)]
pub struct HostCollaborators {
    /// Extension registry.
    pub extensions: Arc<dyn ExtensionRegistry>,
    /// Active scan rule registry.
    pub active_rules: Arc<dyn ActiveRuleRegistry>,
    /// Passive scan rule registry.
    pub passive_rules: Arc<dyn PassiveRuleRegistry>,
    /// UI refresh hook, absent in headless hosts.
    pub ui: Option<Arc<dyn UiRefreshHook>>,
}

impl fmt::Debug for HostCollaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCollaborators")
            .field("ui", &self.ui.is_some())
            .finish_non_exhaustive()
    }
}

/// The capability a component name was registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Constructs [`Extension`] instances.
    Extension,
    /// Constructs [`ActiveScanRule`] instances.
    ActiveRule,
    /// Constructs [`PassiveScanRule`] instances.
    PassiveRule,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extension => "extension",
            Self::ActiveRule => "active scan rule",
            Self::PassiveRule => "passive scan rule",
        };
        f.write_str(name)
    }
}

/// Why a component could not be instantiated.
///
/// These are the per-component failures install paths log and skip; they
/// never abort an install batch.
#[derive(Error, Debug)]
pub enum FactoryError {
    /// No factory is registered under the component name.
    #[error("no factory registered for component '{name}'")]
    NotRegistered {
        /// The unresolved component name.
        name: String,
    },

    /// A factory exists but constructs a different capability.
    #[error("component '{name}' is registered as {found}, not {expected}")]
    WrongCapability {
        /// The requested component name.
        name: String,
        /// The capability the caller asked for.
        expected: Capability,
        /// The capability the name is registered with.
        found: Capability,
    },
}

type ExtensionCtor = Arc<dyn Fn() -> Arc<dyn Extension> + Send + Sync>;
type ActiveRuleCtor = Arc<dyn Fn() -> Arc<dyn ActiveScanRule> + Send + Sync>;
type PassiveRuleCtor = Arc<dyn Fn() -> Arc<dyn PassiveScanRule> + Send + Sync>;

#[derive(Clone)]
enum ComponentFactory {
    Extension(ExtensionCtor),
    ActiveRule(ActiveRuleCtor),
    PassiveRule(PassiveRuleCtor),
}

impl ComponentFactory {
    fn capability(&self) -> Capability {
        match self {
            Self::Extension(_) => Capability::Extension,
            Self::ActiveRule(_) => Capability::ActiveRule,
            Self::PassiveRule(_) => Capability::PassiveRule,
        }
    }
}

/// Process-scoped mapping from component names to constructors.
///
/// Built once during host startup, before the runtime starts, and never
/// mutated afterwards; the runtime holds it behind an [`Arc`] and looks
/// factories up during install.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, ComponentFactory>,
}

impl FactoryRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension constructor under `name`.
    pub fn register_extension<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn() -> Arc<dyn Extension> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), ComponentFactory::Extension(Arc::new(ctor)));
    }

    /// Register an active scan rule constructor under `name`.
    pub fn register_active_rule<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn() -> Arc<dyn ActiveScanRule> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), ComponentFactory::ActiveRule(Arc::new(ctor)));
    }

    /// Register a passive scan rule constructor under `name`.
    pub fn register_passive_rule<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn() -> Arc<dyn PassiveScanRule> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), ComponentFactory::PassiveRule(Arc::new(ctor)));
    }

    /// The capability `name` is registered with, if any.
    #[must_use]
    pub fn capability(&self, name: &str) -> Option<Capability> {
        self.factories.get(name).map(ComponentFactory::capability)
    }

    /// Construct an extension instance for `name`.
    pub fn instantiate_extension(&self, name: &str) -> Result<Arc<dyn Extension>, FactoryError> {
        match self.lookup(name, Capability::Extension)? {
            ComponentFactory::Extension(ctor) => Ok(ctor()),
            _ => unreachable!("lookup checked the capability"),
        }
    }

    /// Construct an active scan rule instance for `name`.
    pub fn instantiate_active_rule(
        &self,
        name: &str,
    ) -> Result<Arc<dyn ActiveScanRule>, FactoryError> {
        match self.lookup(name, Capability::ActiveRule)? {
            ComponentFactory::ActiveRule(ctor) => Ok(ctor()),
            _ => unreachable!("lookup checked the capability"),
        }
    }

    /// Construct a passive scan rule instance for `name`.
    pub fn instantiate_passive_rule(
        &self,
        name: &str,
    ) -> Result<Arc<dyn PassiveScanRule>, FactoryError> {
        match self.lookup(name, Capability::PassiveRule)? {
            ComponentFactory::PassiveRule(ctor) => Ok(ctor()),
            _ => unreachable!("lookup checked the capability"),
        }
    }

    fn lookup(&self, name: &str, expected: Capability) -> Result<&ComponentFactory, FactoryError> {
        let factory = self.factories.get(name).ok_or_else(|| FactoryError::NotRegistered {
            name: name.to_string(),
        })?;
        let found = factory.capability();
        if found != expected {
            return Err(FactoryError::WrongCapability {
                name: name.to_string(),
                expected,
                found,
            });
        }
        Ok(factory)
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry").field("factories", &self.factories.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedExtension(&'static str);

    impl Extension for NamedExtension {
        fn name(&self) -> &str {
            self.0
        }
    }

    struct NamedRule(&'static str);

    impl ActiveScanRule for NamedRule {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn instantiates_registered_extension() {
        let mut registry = FactoryRegistry::new();
        registry.register_extension("ext.A", || Arc::new(NamedExtension("A")));
        let ext = registry.instantiate_extension("ext.A").unwrap();
        assert_eq!(ext.name(), "A");
    }

    #[test]
    fn unregistered_name_reports_not_registered() {
        let registry = FactoryRegistry::new();
        let Err(err) = registry.instantiate_extension("ext.Missing") else {
            panic!("expected instantiation to fail");
        };
        assert!(matches!(err, FactoryError::NotRegistered { .. }));
    }

    #[test]
    fn capability_mismatch_is_reported() {
        let mut registry = FactoryRegistry::new();
        registry.register_active_rule("rules.Probe", || Arc::new(NamedRule("probe")));
        let Err(err) = registry.instantiate_extension("rules.Probe") else {
            panic!("expected instantiation to fail");
        };
        match err {
            FactoryError::WrongCapability {
                expected, found, ..
            } => {
                assert_eq!(expected, Capability::Extension);
                assert_eq!(found, Capability::ActiveRule);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
