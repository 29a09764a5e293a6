//! Decision records.
//!
//! Pure data produced by the decision engine and consumed by the plan
//! builder. None of these types hold graph state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::plan::stage::Stage;
use crate::resource::{Resource, ResourceMeta};

/// Install verdict for one desired resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceInstallType {
    /// Live object already matches.
    None,
    /// Object does not exist.
    Create,
    /// Object exists and differs.
    Update,
    /// Dry-run failed; apply blindly.
    Apply,
    /// Delete and create again.
    Recreate,
}

impl fmt::Display for ResourceInstallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Create => "create",
            Self::Update => "update",
            Self::Apply => "apply",
            Self::Recreate => "recreate",
        };
        write!(f, "{s}")
    }
}

/// A desired resource placed in a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedResource {
    /// The resource.
    pub resource: Resource,
    /// Where it is deployed.
    pub stage: Stage,
}

/// Decision record of a resource to install.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallableResourceInfo {
    /// The desired resource.
    pub resource: Resource,
    /// Repetition index of this resource within the plan.
    pub iteration: u32,
    /// Stage the resource is deployed in.
    pub stage: Stage,
    /// Live object, after managed-field migration.
    pub live: Option<serde_json::Value>,
    /// Result of the dry-run apply.
    pub dry_apply: Option<serde_json::Value>,
    /// Error of the dry-run apply, if it failed.
    pub dry_apply_error: Option<String>,
    /// Verdict.
    pub install_type: ResourceInstallType,
    /// Track readiness after deploying.
    pub must_track_readiness: bool,
    /// Delete again once deployed (and tracked) successfully.
    pub must_delete_on_success: bool,
    /// Delete if tracking fails.
    pub must_delete_on_failed_install: bool,
}

impl InstallableResourceInfo {
    /// Identity of the resource.
    #[must_use]
    pub const fn meta(&self) -> &ResourceMeta {
        &self.resource.spec.meta
    }
}

/// Decision record of an obsolete resource.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletableResourceInfo {
    /// Identity of the resource.
    pub meta: ResourceMeta,
    /// Live object, if it still exists.
    pub live: Option<serde_json::Value>,
    /// Delete it.
    pub must_delete: bool,
    /// Wait for it to disappear after deleting.
    pub must_track_absence: bool,
}
