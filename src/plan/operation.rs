//! Plan operations.
//!
//! The configuration of an operation is a closed tagged enum; the operation
//! type and category are derived from the variant and cannot disagree with it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cluster::PropagationPolicy;
use crate::release::Release;
use crate::resource::{ReadinessPolicy, ResourceMeta, ResourceSpec};

use super::dag::Vertex;
use super::stage::Stage;

/// Current version of every operation config.
pub const OPERATION_VERSION: u32 = 1;

/// What an operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    /// Create a resource.
    Create,
    /// Create a resource again once its deletion was observed.
    Recreate,
    /// Update a resource with a server-side apply.
    Update,
    /// Apply a resource whose dry-run failed.
    Apply,
    /// Delete a resource.
    Delete,
    /// Wait for a resource to become ready.
    TrackReadiness,
    /// Wait for a resource to exist.
    TrackPresence,
    /// Wait for a resource to disappear.
    TrackAbsence,
    /// Record a new release revision.
    CreateRelease,
    /// Overwrite a release revision.
    UpdateRelease,
    /// Delete a release revision.
    DeleteRelease,
    /// Ordering-only operation.
    Noop,
}

impl OperationType {
    /// Name used in operation IDs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Recreate => "recreate",
            Self::Update => "update",
            Self::Apply => "apply",
            Self::Delete => "delete",
            Self::TrackReadiness => "track-readiness",
            Self::TrackPresence => "track-presence",
            Self::TrackAbsence => "track-absence",
            Self::CreateRelease => "create-release",
            Self::UpdateRelease => "update-release",
            Self::DeleteRelease => "delete-release",
            Self::Noop => "noop",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Broad class of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationCategory {
    /// Mutates a cluster resource.
    Resource,
    /// Observes a cluster resource.
    Track,
    /// Mutates release history.
    Release,
    /// Ordering only.
    Meta,
}

/// Execution state of an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Not scheduled yet.
    #[default]
    Unknown,
    /// Dispatched to a worker.
    Pending,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl OperationStatus {
    /// Returns true for completed and failed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Which side of a (sub-)stage a boundary sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// Opens the stage.
    Start,
    /// Closes the stage.
    End,
}

/// Typed configuration of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OperationConfig {
    /// Create a resource.
    CreateResource {
        /// Desired object.
        spec: ResourceSpec,
    },
    /// Create half of a recreate; runs after the delete and its absence
    /// tracking.
    RecreateResource {
        /// Desired object.
        spec: ResourceSpec,
    },
    /// Server-side apply of a resource with a clean dry-run.
    UpdateResource {
        /// Desired object.
        spec: ResourceSpec,
    },
    /// Server-side apply of a resource whose dry-run failed.
    ApplyResource {
        /// Desired object.
        spec: ResourceSpec,
        /// Dry-run error kept for operators.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dry_apply_error: Option<String>,
    },
    /// Delete a resource.
    DeleteResource {
        /// Resource to delete.
        meta: ResourceMeta,
        /// How dependents are handled.
        propagation: PropagationPolicy,
        /// Clears the way for a recreate of the same resource.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        before_recreate: bool,
    },
    /// Wait for readiness.
    TrackReadiness {
        /// Tracked resource.
        meta: ResourceMeta,
        /// Tracking timeout.
        timeout_secs: u64,
        /// Tracker options.
        policy: ReadinessPolicy,
        /// Remove the resource if this tracking fails.
        delete_on_failed: bool,
    },
    /// Wait for presence.
    TrackPresence {
        /// Tracked resource.
        meta: ResourceMeta,
        /// Tracking timeout.
        timeout_secs: u64,
    },
    /// Wait for absence.
    TrackAbsence {
        /// Tracked resource.
        meta: ResourceMeta,
        /// Tracking timeout.
        timeout_secs: u64,
        /// Gates a recreate of the same resource.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        before_recreate: bool,
    },
    /// Record a new release revision.
    CreateRelease {
        /// Revision to record.
        release: Release,
        /// Record the revision as failed if the deploy fails.
        fail_on_failed_deploy: bool,
    },
    /// Overwrite a release revision.
    UpdateRelease {
        /// New content of the revision.
        release: Release,
    },
    /// Delete a release revision.
    DeleteRelease {
        /// Release name.
        name: String,
        /// Release namespace.
        namespace: String,
        /// Revision to delete.
        revision: u32,
    },
    /// Stage or sub-stage boundary.
    Noop {
        /// Stage.
        stage: Stage,
        /// Sub-stage weight; `None` for the stage itself.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weight: Option<i32>,
        /// Start or end.
        boundary: Boundary,
    },
}

impl OperationConfig {
    /// Operation type implied by the variant.
    #[must_use]
    pub const fn operation_type(&self) -> OperationType {
        match self {
            Self::CreateResource { .. } => OperationType::Create,
            Self::RecreateResource { .. } => OperationType::Recreate,
            Self::UpdateResource { .. } => OperationType::Update,
            Self::ApplyResource { .. } => OperationType::Apply,
            Self::DeleteResource { .. } => OperationType::Delete,
            Self::TrackReadiness { .. } => OperationType::TrackReadiness,
            Self::TrackPresence { .. } => OperationType::TrackPresence,
            Self::TrackAbsence { .. } => OperationType::TrackAbsence,
            Self::CreateRelease { .. } => OperationType::CreateRelease,
            Self::UpdateRelease { .. } => OperationType::UpdateRelease,
            Self::DeleteRelease { .. } => OperationType::DeleteRelease,
            Self::Noop { .. } => OperationType::Noop,
        }
    }

    /// Operation category implied by the variant.
    #[must_use]
    pub const fn category(&self) -> OperationCategory {
        match self {
            Self::CreateResource { .. }
            | Self::RecreateResource { .. }
            | Self::UpdateResource { .. }
            | Self::ApplyResource { .. }
            | Self::DeleteResource { .. } => OperationCategory::Resource,
            Self::TrackReadiness { .. } | Self::TrackPresence { .. } | Self::TrackAbsence { .. } => {
                OperationCategory::Track
            }
            Self::CreateRelease { .. } | Self::UpdateRelease { .. } | Self::DeleteRelease { .. } => {
                OperationCategory::Release
            }
            Self::Noop { .. } => OperationCategory::Meta,
        }
    }

    /// Resource the operation acts on, if any.
    #[must_use]
    pub const fn meta(&self) -> Option<&ResourceMeta> {
        match self {
            Self::CreateResource { spec }
            | Self::RecreateResource { spec, .. }
            | Self::UpdateResource { spec }
            | Self::ApplyResource { spec, .. } => Some(&spec.meta),
            Self::DeleteResource { meta, .. }
            | Self::TrackReadiness { meta, .. }
            | Self::TrackPresence { meta, .. }
            | Self::TrackAbsence { meta, .. } => Some(meta),
            Self::CreateRelease { .. }
            | Self::UpdateRelease { .. }
            | Self::DeleteRelease { .. }
            | Self::Noop { .. } => None,
        }
    }

    /// Identity of the operation target, unique within a type.
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::CreateRelease { release, .. } | Self::UpdateRelease { release } => release.id(),
            Self::DeleteRelease {
                name,
                namespace,
                revision,
            } => format!("release:{namespace}:{name}:{revision}"),
            Self::Noop {
                stage,
                weight,
                boundary,
            } => {
                let side = match boundary {
                    Boundary::Start => "start",
                    Boundary::End => "end",
                };
                match weight {
                    Some(w) => format!("stage:{stage}:{w}:{side}"),
                    None => format!("stage:{stage}:{side}"),
                }
            }
            Self::DeleteResource {
                meta,
                before_recreate: true,
                ..
            }
            | Self::TrackAbsence {
                meta,
                before_recreate: true,
                ..
            } => format!("{}:before-recreate", meta.id()),
            other => other.meta().map(ResourceMeta::id).unwrap_or_default(),
        }
    }

    /// Short human description.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::CreateRelease { release, .. } => format!("create release {release}"),
            Self::UpdateRelease { release } => {
                format!("mark release {release} as {}", release.status)
            }
            Self::DeleteRelease {
                name,
                namespace,
                revision,
            } => format!("delete release {namespace}/{name} revision {revision}"),
            Self::Noop { .. } => self.id(),
            other => match other.meta() {
                Some(meta) => format!("{} {}", other.operation_type(), meta.id_human()),
                None => other.operation_type().to_string(),
            },
        }
    }
}

/// One vertex of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// What to do.
    pub config: OperationConfig,
    /// Config format version.
    pub version: u32,
    /// Repetition index of the same resource within one plan.
    pub iteration: u32,
    /// Execution state.
    #[serde(default)]
    pub status: OperationStatus,
}

impl Operation {
    /// Creates an operation with the current config version.
    #[must_use]
    pub const fn new(config: OperationConfig, iteration: u32) -> Self {
        Self {
            config,
            version: OPERATION_VERSION,
            iteration,
            status: OperationStatus::Unknown,
        }
    }

    /// Creates a stage boundary.
    #[must_use]
    pub const fn boundary(stage: Stage, weight: Option<i32>, boundary: Boundary) -> Self {
        Self::new(
            OperationConfig::Noop {
                stage,
                weight,
                boundary,
            },
            0,
        )
    }

    /// Operation type.
    #[must_use]
    pub const fn operation_type(&self) -> OperationType {
        self.config.operation_type()
    }

    /// Operation category.
    #[must_use]
    pub const fn category(&self) -> OperationCategory {
        self.config.category()
    }

    /// Globally unique ID: `{type}/v{version}/{iteration}/{config id}`.
    #[must_use]
    pub fn id(&self) -> String {
        format!(
            "{}/v{}/{}/{}",
            self.operation_type(),
            self.version,
            self.iteration,
            self.config.id()
        )
    }
}

impl Vertex for Operation {
    fn key(&self) -> String {
        self.id()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.config.describe())
    }
}
