//! Persisted runtime state under the home directory.
//!
//! The runtime persists one piece of external state: the **block list**, the
//! set of module ids that were uninstalled but whose backing archive could
//! not be deleted. The invariant it protects: a blocked id is never scanned
//! back into the catalog from disk, even though its archive file still
//! physically exists.
//!
//! The block list is stored in `runtime.toml` in the home directory as a
//! comma-joined string under a single key:
//!
//! ```toml
//! blocked-modules = "stale-addon,locked-addon"
//! ```
//!
//! Mutations persist immediately; the block list must survive a host crash
//! right after the failed deletion, or the half-removed module would come
//! back on the next scan.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::ModuleId;
use crate::utils::fs::atomic_write;

/// File name of the persisted runtime config inside the home directory.
pub const CONFIG_FILE: &str = "runtime.toml";

/// The default home directory, `~/.strobe`, when the host does not configure
/// one explicitly.
#[must_use]
pub fn default_home() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".strobe"))
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    #[serde(default)]
    blocked_modules: String,
}

/// The persisted runtime configuration.
#[derive(Debug)]
pub struct RuntimeConfig {
    path: PathBuf,
    blocked: BTreeSet<ModuleId>,
}

impl RuntimeConfig {
    /// Load the configuration from `home`, starting empty when no config
    /// file exists yet.
    pub fn load(home: &Path) -> Result<Self> {
        let path = home.join(CONFIG_FILE);
        let raw = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read runtime config: {}", path.display()))?;
            toml::from_str::<RawConfig>(&text)
                .with_context(|| format!("failed to parse runtime config: {}", path.display()))?
        } else {
            RawConfig::default()
        };

        let blocked: BTreeSet<ModuleId> = raw
            .blocked_modules
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ModuleId::from)
            .collect();
        if !blocked.is_empty() {
            debug!(count = blocked.len(), "loaded block list");
        }
        Ok(Self { path, blocked })
    }

    /// The blocked module ids.
    #[must_use]
    pub fn blocked(&self) -> &BTreeSet<ModuleId> {
        &self.blocked
    }

    /// Whether `id` is on the block list.
    #[must_use]
    pub fn is_blocked(&self, id: &ModuleId) -> bool {
        self.blocked.contains(id)
    }

    /// Add `id` to the block list and persist immediately.
    pub fn block(&mut self, id: ModuleId) -> Result<()> {
        if self.blocked.insert(id.clone()) {
            info!(module_id = %id, "added module to block list");
            self.save()?;
        }
        Ok(())
    }

    /// Remove `id` from the block list and persist immediately. Returns
    /// whether the id was blocked.
    pub fn unblock(&mut self, id: &ModuleId) -> Result<bool> {
        let removed = self.blocked.remove(id);
        if removed {
            info!(module_id = %id, "removed module from block list");
            self.save()?;
        }
        Ok(removed)
    }

    fn save(&self) -> Result<()> {
        let raw = RawConfig {
            blocked_modules: self
                .blocked
                .iter()
                .map(ModuleId::as_str)
                .collect::<Vec<_>>()
                .join(","),
        };
        let text = toml::to_string(&raw).context("failed to serialize runtime config")?;
        atomic_write(&self.path, text.as_bytes())
            .with_context(|| format!("failed to persist runtime config: {}", self.path.display()))
    }
}
