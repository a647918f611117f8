//! Version bound evaluation for module compatibility checks.
//!
//! Modules carry two different kinds of version constraint:
//!
//! - **Core version bounds** ([`VersionBounds`]) restrict which host versions
//!   a module may load under, expressed as semantic versions. The lower bound
//!   is inclusive and the upper bound is exclusive.
//! - **File version ranges** ([`FileVersionRange`]) restrict which package
//!   versions of a *dependency* satisfy a reference, expressed as the legacy
//!   monotonically increasing integer. The same inclusive/exclusive rule
//!   applies.
//!
//! Semantic minimum-version checks on dependencies use [`semver::Version`]
//! ordering directly and live with the run-requirement evaluation in
//! [`crate::resolver`].

use semver::Version;

/// Inclusive lower / exclusive upper semantic version bounds.
///
/// An absent bound never restricts. Used for the `not-before-version` and
/// `not-from-version` fields a module declares against the host application.
///
/// # Examples
///
/// ```rust
/// use semver::Version;
/// use strobe_addons::version::VersionBounds;
///
/// let bounds = VersionBounds::new(
///     Some(Version::new(2, 0, 0)),
///     Some(Version::new(3, 0, 0)),
/// );
/// assert!(bounds.contains(&Version::new(2, 5, 0)));
/// assert!(!bounds.contains(&Version::new(3, 0, 0)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionBounds {
    not_before: Option<Version>,
    not_from: Option<Version>,
}

impl VersionBounds {
    /// Create bounds from optional `not-before` and `not-from` versions.
    pub fn new(not_before: Option<Version>, not_from: Option<Version>) -> Self {
        Self {
            not_before,
            not_from,
        }
    }

    /// Bounds that admit every version.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// The inclusive lower bound, if declared.
    #[must_use]
    pub fn not_before(&self) -> Option<&Version> {
        self.not_before.as_ref()
    }

    /// The exclusive upper bound, if declared.
    #[must_use]
    pub fn not_from(&self) -> Option<&Version> {
        self.not_from.as_ref()
    }

    /// Whether `version` is at or past the lower bound and strictly below the
    /// upper bound, treating absent bounds as unrestricted.
    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        if let Some(not_before) = &self.not_before
            && version < not_before
        {
            return false;
        }
        if let Some(not_from) = &self.not_from
            && version >= not_from
        {
            return false;
        }
        true
    }
}

/// The result of checking a package version against a [`FileVersionRange`].
///
/// Violations carry the bound that was violated so callers can report
/// required versus found versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileVersionCheck {
    /// The version satisfies the range.
    Satisfied,
    /// The version is below the inclusive lower bound.
    BelowNotBefore(u32),
    /// The version is at or past the exclusive upper bound.
    AtOrPastNotFrom(u32),
}

/// Inclusive lower / exclusive upper bounds over legacy package versions.
///
/// Dependency references use these to pin a dependency to a file version
/// window. The lower bound is checked first, matching the declaration order
/// of the constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileVersionRange {
    not_before: Option<u32>,
    not_from: Option<u32>,
}

impl FileVersionRange {
    /// Create a range from optional bounds.
    pub fn new(not_before: Option<u32>, not_from: Option<u32>) -> Self {
        Self {
            not_before,
            not_from,
        }
    }

    /// The inclusive lower bound, if declared.
    #[must_use]
    pub fn not_before(&self) -> Option<u32> {
        self.not_before
    }

    /// The exclusive upper bound, if declared.
    #[must_use]
    pub fn not_from(&self) -> Option<u32> {
        self.not_from
    }

    /// Whether any bound is declared at all.
    #[must_use]
    pub fn is_constrained(&self) -> bool {
        self.not_before.is_some() || self.not_from.is_some()
    }

    /// Check a found package version against the range.
    #[must_use]
    pub fn check(&self, package_version: u32) -> FileVersionCheck {
        if let Some(not_before) = self.not_before
            && package_version < not_before
        {
            return FileVersionCheck::BelowNotBefore(not_before);
        }
        if let Some(not_from) = self.not_from
            && package_version >= not_from
        {
            return FileVersionCheck::AtOrPastNotFrom(not_from);
        }
        FileVersionCheck::Satisfied
    }
}
