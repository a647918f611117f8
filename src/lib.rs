//! Strobe add-on module runtime.
//!
//! The Strobe security-testing proxy delivers almost all of its functionality
//! through independently versioned, installable add-on modules. This crate is
//! the module runtime: it discovers module archives on disk, resolves their
//! inter-dependencies and version constraints, builds a delegating
//! code-loading graph per module, and drives the install/uninstall lifecycle
//! while the host keeps running.
//!
//! # Architecture Overview
//!
//! Data flows bottom-up through the crate:
//!
//! 1. Module directories are scanned for archives named
//!    `<id>-<status>-<packageVersion>.sap`; each archive's embedded
//!    `addon.toml` document parses into an immutable
//!    [`descriptor::ModuleDescriptor`].
//! 2. Descriptors assemble into a [`catalog::ModuleCatalog`], deduplicated by
//!    id under a version/status precedence rule.
//! 3. [`resolver::RunRequirements`] evaluates each module against the
//!    catalog: host runtime version, dependency presence, file version
//!    bounds, semantic minimums, and graph-wide cycle detection. Modules
//!    with unmet requirements are pruned from the runnable set.
//! 4. Each accepted module gets a [`loader::ModuleLoader`], a node in a
//!    delegation graph mirroring the dependency graph: lookups try the
//!    module's own archive, then the host, then the dependency loaders.
//! 5. The [`installer::LifecycleInstaller`] instantiates declared artifacts
//!    through the [`registry::FactoryRegistry`] and hands them to the host's
//!    registries; shipped files are copied under the home directory.
//! 6. The [`runtime::ModuleRuntime`] orchestrates all of it and maintains
//!    the persisted block list of modules whose archives could not be
//!    deleted at uninstall time.
//!
//! # Core Modules
//!
//! - [`core`] - module identity, host version info, the error taxonomy
//! - [`descriptor`] - parsed module metadata and archive name parsing
//! - [`version`] - version bound evaluation
//! - [`catalog`] - the deduplicated module collection, diffing, pruning
//! - [`resolver`] - run-requirement evaluation and cycle detection
//! - [`archive`] - zip-backed module archive access
//! - [`loader`] - the per-module delegation graph
//! - [`registry`] - host collaborator traits and the component factory
//!   registry
//! - [`installer`] - artifact install/uninstall lifecycle
//! - [`runtime`] - the orchestrator and its persisted state
//! - [`config`] - the persisted block list
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use semver::Version;
//! use strobe_addons::core::HostInfo;
//! use strobe_addons::loader::HostLoader;
//! use strobe_addons::registry::{FactoryRegistry, HostCollaborators};
//! use strobe_addons::runtime::ModuleRuntime;
//!
//! # fn collaborators() -> HostCollaborators { unimplemented!() }
//! # fn main() -> anyhow::Result<()> {
//! let host = HostInfo::new(Version::new(2, 4, 0), 17);
//! let factories = Arc::new(FactoryRegistry::new());
//! let host_loader = Arc::new(HostLoader::new());
//!
//! let mut runtime = ModuleRuntime::start(
//!     host,
//!     PathBuf::from("/var/lib/strobe"),
//!     vec![PathBuf::from("/var/lib/strobe/addons")],
//!     host_loader,
//!     factories,
//!     collaborators(),
//!     false,
//! )?;
//!
//! for module in runtime.catalog().modules() {
//!     println!("{} v{}", module.id(), module.descriptor().package_version());
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod catalog;
pub mod config;
pub mod core;
pub mod descriptor;
pub mod installer;
pub mod loader;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod utils;
pub mod version;
