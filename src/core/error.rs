//! Error handling for the add-on runtime.
//!
//! The runtime pairs a strongly-typed error enum ([`RuntimeError`]) with
//! [`anyhow`] for context-rich propagation in orchestration code. The typed
//! variants cover the failure taxonomy of the module lifecycle:
//!
//! - **Parsing**: [`RuntimeError::MalformedArchiveName`],
//!   [`RuntimeError::MalformedMetadata`] are fatal to the affected module's
//!   parse, never to the surrounding scan.
//! - **Compatibility**: [`RuntimeError::VersionIncompatible`] is a hard
//!   rejection on the runtime add path; during startup scans incompatible
//!   modules are merely skipped.
//! - **Lifecycle**: [`RuntimeError::ModuleNotPresent`] and
//!   [`RuntimeError::ModuleNotDynamic`] are contract violations raised by
//!   `remove_module`.
//! - **I/O**: per-file install/uninstall failures are logged and folded into
//!   aggregate results by the caller; only whole-operation failures surface as
//!   [`RuntimeError::FileSystemError`] or converted [`std::io::Error`]s.
//!
//! Conversions from [`std::io::Error`], [`toml::de::Error`],
//! [`serde_json::Error`], [`semver::Error`], and [`zip::result::ZipError`] are
//! provided so `?` works across the parsing and archive layers.

use thiserror::Error;

/// The error type for add-on runtime operations.
///
/// Each variant carries enough detail (offending id, required vs. found
/// version) for the host to report the failure to a user without consulting
/// the log. See the module documentation for the propagation policy.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// An archive file name does not follow `<id>-<status>-<version>.<ext>`.
    ///
    /// Directory scans skip such files silently; this error is only raised
    /// when a caller explicitly asks the runtime to load a specific file.
    #[error("not a module archive name: {name}")]
    MalformedArchiveName {
        /// The file name that failed to parse.
        name: String,
    },

    /// The embedded metadata document of an archive could not be parsed or
    /// failed validation. Fatal to that module; the whole module is rejected.
    #[error("malformed metadata document in {archive}: {reason}")]
    MalformedMetadata {
        /// Archive the document was read from.
        archive: String,
        /// Specific reason for the failure.
        reason: String,
    },

    /// The module cannot run under the current host version.
    ///
    /// Raised by `add_module`; startup scans handle incompatibility leniently
    /// by keeping or skipping the module instead.
    #[error("module '{id}' is not compatible with host version {host_version}")]
    VersionIncompatible {
        /// Id of the incompatible module.
        id: String,
        /// The running host version.
        host_version: String,
    },

    /// A runtime operation referenced a module that is not in the catalog.
    #[error("module '{id}' is not present in the runtime")]
    ModuleNotPresent {
        /// Id of the missing module.
        id: String,
    },

    /// The module declares no dynamically installable artifacts and cannot be
    /// added or removed while the host is running.
    #[error("module '{id}' has no dynamically installable artifacts")]
    ModuleNotDynamic {
        /// Id of the static module.
        id: String,
    },

    /// An archive's checksum does not match the catalog entry it was
    /// downloaded for.
    #[error("checksum mismatch for module '{id}'")]
    ChecksumMismatch {
        /// Id of the module whose archive failed verification.
        id: String,
        /// Checksum declared by the catalog entry.
        expected: String,
        /// Checksum computed from the archive on disk.
        actual: String,
    },

    /// A file system operation failed with path context.
    #[error("file system error during {operation}: {path}")]
    FileSystemError {
        /// The operation that failed (e.g. "copy shipped file").
        operation: String,
        /// Path the operation was acting on.
        path: String,
    },

    /// IO error from the standard library.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parsing error from an embedded metadata document.
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error from a catalog document.
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Semantic version parsing error.
    #[error("semantic version error: {0}")]
    SemverError(#[from] semver::Error),

    /// Zip archive error.
    #[error("archive error: {0}")]
    ZipError(#[from] zip::result::ZipError),
}

/// A specialized `Result` type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
