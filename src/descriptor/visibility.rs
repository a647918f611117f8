//! Component-name visibility rules for a module's own archive.
//!
//! A module may declare an allow-list and a restrict-list of component-name
//! prefixes. The rules govern which components may be resolved directly from
//! the module's own archive; delegated lookups to the host or to dependency
//! loaders are never filtered by them.

use serde::{Deserialize, Serialize};

/// Allow/restrict prefix rules governing direct archive resolution.
///
/// Evaluation order:
///
/// 1. A name matching any restricted prefix is always denied.
/// 2. If an allow-list is present, only names matching one of its prefixes
///    are permitted.
/// 3. Absent both lists, every name is permitted.
///
/// # Examples
///
/// ```rust
/// use strobe_addons::descriptor::ComponentVisibility;
///
/// let rules = ComponentVisibility::new(
///     vec!["ext.scanner".to_string()],
///     vec!["ext.scanner.internal".to_string()],
/// );
/// assert!(rules.is_permitted("ext.scanner.Sql"));
/// assert!(!rules.is_permitted("ext.scanner.internal.Raw"));
/// assert!(!rules.is_permitted("ext.other.Thing"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentVisibility {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    allowed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    restricted: Vec<String>,
}

impl ComponentVisibility {
    /// Create visibility rules from explicit prefix lists.
    pub fn new(allowed: Vec<String>, restricted: Vec<String>) -> Self {
        Self {
            allowed,
            restricted,
        }
    }

    /// Rules that permit every component name.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// The allow-list prefixes. Empty means no allow filtering.
    #[must_use]
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// The restrict-list prefixes.
    #[must_use]
    pub fn restricted(&self) -> &[String] {
        &self.restricted
    }

    /// Whether `name` may be resolved from the module's own archive.
    #[must_use]
    pub fn is_permitted(&self, name: &str) -> bool {
        if self.restricted.iter().any(|prefix| name.starts_with(prefix.as_str())) {
            return false;
        }
        if self.allowed.is_empty() {
            return true;
        }
        self.allowed.iter().any(|prefix| name.starts_with(prefix.as_str()))
    }
}
