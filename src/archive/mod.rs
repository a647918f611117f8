//! Zip-backed access to module archives.
//!
//! A module archive is an ordinary zip file. Its entries are the module's
//! component definitions (one entry per component, at the path derived by
//! [`component_entry_path`]), the shipped files it declares, and the embedded
//! metadata document at [`crate::descriptor::METADATA_ENTRY`].
//!
//! [`ModuleArchive`] keeps the archive open for the lifetime of the owning
//! loader and serves concurrent lookups: the entry name index is immutable
//! after open, and the underlying zip reader sits behind a lock because entry
//! reads seek. Dropping the archive releases the file handle, which is how a
//! loader "closes" its module.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use sha2::{Digest, Sha256};
use tracing::debug;
use zip::ZipArchive;

use crate::core::{Result, RuntimeError};
use crate::descriptor::METADATA_ENTRY;

/// Archive entry path for a component name.
///
/// Component names are dotted (`ext.logger.LogPanel`); their definitions live
/// in the archive at the slash-separated path with a `.def` suffix
/// (`ext/logger/LogPanel.def`).
#[must_use]
pub fn component_entry_path(name: &str) -> String {
    let mut path = name.replace('.', "/");
    path.push_str(".def");
    path
}

/// An open module archive.
pub struct ModuleArchive {
    path: PathBuf,
    size: u64,
    names: HashSet<String>,
    archive: Mutex<ZipArchive<File>>,
}

impl ModuleArchive {
    /// Open an archive and index its entry names.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let archive = ZipArchive::new(file)?;
        let names = archive.file_names().map(str::to_string).collect();
        Ok(Self {
            path: path.to_path_buf(),
            size,
            names,
            archive: Mutex::new(archive),
        })
    }

    /// Path of the backing archive file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the backing archive file in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the archive contains an entry with the exact name.
    #[must_use]
    pub fn has_entry(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Read an entry's bytes, `Ok(None)` when the entry does not exist.
    pub fn read_entry(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if !self.names.contains(name) {
            return Ok(None);
        }
        let mut archive = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entry = archive.by_name(name)?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }

    /// Read an entry's bytes for a delegated lookup.
    ///
    /// Lookup misses and read failures both resolve to `None` so the caller
    /// can fall through to the next source in its delegation chain; failures
    /// are logged at debug level.
    #[must_use]
    pub fn entry_bytes(&self, name: &str) -> Option<Vec<u8>> {
        match self.read_entry(name) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(archive = %self.path.display(), entry = name, error = %e,
                    "entry read failed during lookup");
                None
            }
        }
    }

    /// Read the embedded metadata document, `Ok(None)` when absent.
    pub fn read_metadata_text(&self) -> Result<Option<String>> {
        match self.read_entry(METADATA_ENTRY)? {
            Some(bytes) => {
                let text = String::from_utf8(bytes).map_err(|e| RuntimeError::MalformedMetadata {
                    archive: self.path.display().to_string(),
                    reason: format!("metadata document is not valid UTF-8: {e}"),
                })?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    /// SHA-256 checksum of the backing archive file, lowercase hex with a
    /// `sha256:` prefix, matching the hash format of catalog documents.
    pub fn checksum(&self) -> Result<String> {
        let mut file = File::open(&self.path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
    }
}

impl std::fmt::Debug for ModuleArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleArchive")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("entries", &self.names.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn write_archive(dir: &Path, name: &str, entries: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        let mut writer = ZipWriter::new(file);
        for (entry_name, content) in entries {
            writer.start_file(*entry_name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn component_paths_use_slashes_and_def_suffix() {
        assert_eq!(component_entry_path("ext.logger.LogPanel"), "ext/logger/LogPanel.def");
        assert_eq!(component_entry_path("Single"), "Single.def");
    }

    #[test]
    fn reads_entries_and_reports_misses() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(
            dir.path(),
            "commons-release-1.sap",
            &[("addon.toml", "name = \"Commons\""), ("payloads/list.txt", "data")],
        );
        let archive = ModuleArchive::open(&path).unwrap();

        assert!(archive.has_entry("payloads/list.txt"));
        let bytes = archive.read_entry("payloads/list.txt").unwrap().unwrap();
        assert_eq!(bytes, b"data");
        assert!(archive.read_entry("missing.txt").unwrap().is_none());
        assert!(archive.entry_bytes("missing.txt").is_none());

        let text = archive.read_metadata_text().unwrap().unwrap();
        assert!(text.contains("Commons"));
    }

    #[test]
    fn checksum_is_stable_and_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(dir.path(), "a-release-1.sap", &[("addon.toml", "")]);
        let archive = ModuleArchive::open(&path).unwrap();
        let first = archive.checksum().unwrap();
        let second = archive.checksum().unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("sha256:"));
    }
}
