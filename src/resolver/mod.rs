//! Run-requirement evaluation for modules against a candidate set.
//!
//! Whether a module can actually run is a derived verdict, not stored state:
//! given the module and the full candidate set (usually the catalog), the
//! evaluation produces a transient [`RunRequirements`] report covering the
//! host runtime version check, the module-level dependency verdict, and a
//! separate verdict per versioned extension.
//!
//! # Evaluation Rules
//!
//! - The runtime version check is independent of dependency evaluation; both
//!   can fail at once and both are reported.
//! - Dependency references are evaluated in declaration order and the first
//!   failing reference decides the module-level issue. Per reference the
//!   checks run missing, then cyclic, then the file version bounds, then the
//!   semantic minimum; the structural failures are checked before the simpler
//!   version mismatches.
//! - Cycle detection is graph-wide (see [`graph::cyclic_sets`]): every member
//!   of a dependency cycle reports the same member set, so pruning can drop
//!   the whole set at once.
//! - A module can stay runnable while one of its versioned extensions cannot
//!   run; extension verdicts are therefore a separate list and do not feed
//!   the module-level issue.
//!
//! The [`DependencyIssue::OlderVersion`] variant is part of the reported
//! taxonomy for catalog consumers but is never produced by this evaluation;
//! it belongs to the update-check path, which operates on remote catalogs.

pub mod graph;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use semver::Version;

use crate::catalog::Module;
use crate::core::{HostInfo, ModuleId};
use crate::descriptor::DependencyRef;
use crate::version::FileVersionCheck;

/// Why a dependency reference could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyIssue {
    /// The module participates in a dependency cycle; `members` is the full
    /// cyclic set, identical for every member of the cycle.
    Cyclic {
        /// Ids of all modules in the cycle.
        members: BTreeSet<ModuleId>,
    },
    /// The reference is satisfied only by an older version of the target
    /// than the one required. Reported by update tooling against remote
    /// catalogs; never produced by [`RunRequirements::calculate`].
    OlderVersion {
        /// Id of the outdated target.
        target: ModuleId,
    },
    /// The target id is absent from the candidate set.
    Missing {
        /// Id of the absent target.
        target: ModuleId,
    },
    /// The target's package version is below the reference's inclusive lower
    /// bound.
    VersionNotBefore {
        /// Id of the target.
        target: ModuleId,
        /// Required lower bound.
        required: u32,
        /// Package version actually found.
        found: u32,
    },
    /// The target's package version is at or past the reference's exclusive
    /// upper bound.
    VersionNotFrom {
        /// Id of the target.
        target: ModuleId,
        /// Exclusive upper bound.
        bound: u32,
        /// Package version actually found.
        found: u32,
    },
    /// The target's semantic version is absent or below the required
    /// minimum.
    SemverTooLow {
        /// Id of the target.
        target: ModuleId,
        /// Required minimum semantic version.
        required: Version,
        /// Semantic version actually found, if the target declares one.
        found: Option<Version>,
    },
}

impl fmt::Display for DependencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cyclic { members } => {
                let ids: Vec<&str> = members.iter().map(ModuleId::as_str).collect();
                write!(f, "dependency cycle involving [{}]", ids.join(", "))
            }
            Self::OlderVersion { target } => {
                write!(f, "only an older version of '{target}' is available")
            }
            Self::Missing { target } => write!(f, "required module '{target}' is missing"),
            Self::VersionNotBefore {
                target,
                required,
                found,
            } => write!(
                f,
                "module '{target}' has package version {found}, required at least {required}"
            ),
            Self::VersionNotFrom {
                target,
                bound,
                found,
            } => write!(
                f,
                "module '{target}' has package version {found}, required below {bound}"
            ),
            Self::SemverTooLow {
                target,
                required,
                found,
            } => match found {
                Some(found) => write!(
                    f,
                    "module '{target}' has version {found}, required at least {required}"
                ),
                None => write!(
                    f,
                    "module '{target}' declares no semantic version, required at least {required}"
                ),
            },
        }
    }
}

/// The host runtime is older than a module requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeVersionIssue {
    /// Minimum runtime feature version the module declares.
    pub required: u32,
    /// Feature version the host is running on.
    pub found: u32,
}

/// A versioned extension that cannot run, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRunIssue {
    /// Component name of the affected extension.
    pub extension: String,
    /// Why its dependencies are not satisfied.
    pub issue: DependencyIssue,
}

/// The computed compatibility and dependency verdict for one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequirements {
    runtime_version_issue: Option<RuntimeVersionIssue>,
    dependency_issue: Option<DependencyIssue>,
    extension_issues: Vec<ExtensionRunIssue>,
}

impl RunRequirements {
    /// Evaluate `module` against `candidates` under the given host.
    ///
    /// `candidates` is the full candidate set and normally contains `module`
    /// itself; cycle detection needs the evaluated module's own edges.
    #[must_use]
    pub fn calculate(module: &Module, candidates: &[Arc<Module>], host: &HostInfo) -> Self {
        let by_id: HashMap<&ModuleId, &Arc<Module>> =
            candidates.iter().map(|m| (m.id(), m)).collect();
        let cycles = graph::cyclic_sets(candidates);

        let runtime_version_issue =
            module.descriptor().minimum_runtime_version().and_then(|required| {
                let found = host.runtime_feature_version();
                (required > found).then_some(RuntimeVersionIssue { required, found })
            });

        let dependency_issue =
            evaluate_refs(module.id(), module.descriptor().dependencies(), &by_id, &cycles);

        let extension_issues = module
            .descriptor()
            .extensions()
            .iter()
            .filter(|ext| ext.has_dependencies())
            .filter_map(|ext| {
                evaluate_refs(module.id(), ext.dependencies(), &by_id, &cycles).map(|issue| {
                    ExtensionRunIssue {
                        extension: ext.classname().to_string(),
                        issue,
                    }
                })
            })
            .collect();

        Self {
            runtime_version_issue,
            dependency_issue,
            extension_issues,
        }
    }

    /// The runtime version issue, if any.
    #[must_use]
    pub fn runtime_version_issue(&self) -> Option<&RuntimeVersionIssue> {
        self.runtime_version_issue.as_ref()
    }

    /// The module-level dependency issue, if any.
    #[must_use]
    pub fn dependency_issue(&self) -> Option<&DependencyIssue> {
        self.dependency_issue.as_ref()
    }

    /// Verdicts for versioned extensions that cannot run.
    #[must_use]
    pub fn extension_issues(&self) -> &[ExtensionRunIssue] {
        &self.extension_issues
    }

    /// Whether the module itself can run. Extension issues do not make a
    /// module unrunnable.
    #[must_use]
    pub fn is_runnable(&self) -> bool {
        self.runtime_version_issue.is_none() && self.dependency_issue.is_none()
    }

    /// Whether anything at all is wrong, extension issues included. Pruning
    /// removes modules for which this is true.
    #[must_use]
    pub fn has_issues(&self) -> bool {
        !self.is_runnable() || !self.extension_issues.is_empty()
    }
}

fn evaluate_refs(
    owner: &ModuleId,
    refs: &[DependencyRef],
    by_id: &HashMap<&ModuleId, &Arc<Module>>,
    cycles: &HashMap<ModuleId, BTreeSet<ModuleId>>,
) -> Option<DependencyIssue> {
    for dep in refs {
        let Some(found) = by_id.get(dep.target()) else {
            return Some(DependencyIssue::Missing {
                target: dep.target().clone(),
            });
        };

        if let Some(members) = cycles.get(owner)
            && members.contains(dep.target())
        {
            return Some(DependencyIssue::Cyclic {
                members: members.clone(),
            });
        }

        let found_version = found.descriptor().package_version();
        match dep.file_version().check(found_version) {
            FileVersionCheck::Satisfied => {}
            FileVersionCheck::BelowNotBefore(required) => {
                return Some(DependencyIssue::VersionNotBefore {
                    target: dep.target().clone(),
                    required,
                    found: found_version,
                });
            }
            FileVersionCheck::AtOrPastNotFrom(bound) => {
                return Some(DependencyIssue::VersionNotFrom {
                    target: dep.target().clone(),
                    bound,
                    found: found_version,
                });
            }
        }

        if let Some(required) = dep.min_semver() {
            let found_semver = found.descriptor().semantic_version();
            if found_semver.is_none_or(|v| v < required) {
                return Some(DependencyIssue::SemverTooLow {
                    target: dep.target().clone(),
                    required: required.clone(),
                    found: found_semver.cloned(),
                });
            }
        }
    }
    None
}
