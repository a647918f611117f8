//! File system helpers for install and uninstall paths.
//!
//! All operations are synchronous and blocking. Failures carry path context
//! through [`anyhow::Context`]; the lifecycle code decides per call site
//! whether a failure is fatal or folded into an aggregate result.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Ensure a directory exists, creating it and all parents if necessary.
///
/// Returns an error when the path exists but is not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        anyhow::bail!("path exists but is not a directory: {}", path.display());
    }
    Ok(())
}

/// Atomically write bytes to a file using a write-then-rename strategy.
///
/// The content is written to a sibling temporary file first and renamed over
/// the target, so readers never observe a partial write.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)
        .with_context(|| format!("failed to write temporary file: {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", tmp.display()))?;
    Ok(())
}

/// Remove the empty parent directories of `path`, walking upwards.
///
/// Stops at the first non-empty directory and never touches `boundary`
/// itself or anything outside it. Directories outside the boundary are a
/// hard stop, not an error; shipped files always live under the home
/// directory, and cleanup must never escape it.
pub fn remove_empty_parents(path: &Path, boundary: &Path) -> Result<()> {
    let mut current = path.parent();
    while let Some(dir) = current {
        if !dir.starts_with(boundary) || dir == boundary {
            break;
        }
        if !dir.exists() {
            current = dir.parent();
            continue;
        }
        let is_empty = fs::read_dir(dir)
            .with_context(|| format!("failed to read directory: {}", dir.display()))?
            .next()
            .is_none();
        if !is_empty {
            break;
        }
        fs::remove_dir(dir)
            .with_context(|| format!("failed to remove directory: {}", dir.display()))?;
        debug!(dir = %dir.display(), "removed empty directory");
        current = dir.parent();
    }
    Ok(())
}
