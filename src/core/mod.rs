//! Core types for the add-on runtime.
//!
//! This module provides the foundation shared by every other part of the
//! runtime:
//!
//! - [`ModuleId`] - the identity key for modules; two descriptors describe
//!   the same module iff their ids are equal, regardless of version.
//! - [`HostInfo`] - the running host's own version and runtime feature
//!   version, against which compatibility bounds are evaluated.
//! - [`RuntimeError`] - the typed error taxonomy (see [`error`]).
//!
//! # Design Principles
//!
//! Identity is deliberately a newtype rather than a bare `String`: catalog
//! maps, loader registries, and the persisted block list all key on
//! [`ModuleId`], and the type keeps accidental mixing with component names or
//! file names out of the API.

pub mod error;

pub use error::{Result, RuntimeError};

use std::borrow::Borrow;
use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

/// Unique identity of a module.
///
/// Parsed from the archive file name or a catalog entry and immutable from
/// then on. Ordering is lexical, which gives catalogs and block lists a
/// deterministic iteration order.
///
/// # Examples
///
/// ```rust
/// use strobe_addons::core::ModuleId;
///
/// let id = ModuleId::new("request-logger");
/// assert_eq!(id.as_str(), "request-logger");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Create a module id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ModuleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Version information about the running host application.
///
/// Modules declare compatibility bounds against the host's semantic version
/// (`not-before-version` / `not-from-version`) and a minimum runtime feature
/// version. Both are evaluated against this struct, which the host constructs
/// once at startup and passes by reference into the runtime.
#[derive(Debug, Clone)]
pub struct HostInfo {
    version: Version,
    runtime_feature_version: u32,
}

impl HostInfo {
    /// Create host information from the host's own version and the runtime
    /// feature version it is executing on.
    pub fn new(version: Version, runtime_feature_version: u32) -> Self {
        Self {
            version,
            runtime_feature_version,
        }
    }

    /// The host application's semantic version.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The feature version of the runtime the host is executing on.
    #[must_use]
    pub fn runtime_feature_version(&self) -> u32 {
        self.runtime_feature_version
    }
}
