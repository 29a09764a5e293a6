//! Release revision types.
//!
//! A release is one revision of a named deployment. The history of a release
//! is the ordered list of its revisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of deployment being planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployType {
    /// First revision of a release.
    Install,
    /// New revision on top of a deployed one.
    Upgrade,
    /// New revision restoring an older one.
    Rollback,
    /// Removal of the release.
    Uninstall,
}

impl fmt::Display for DeployType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Upgrade => write!(f, "upgrade"),
            Self::Rollback => write!(f, "rollback"),
            Self::Uninstall => write!(f, "uninstall"),
        }
    }
}

/// Status of a release revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    /// Being deployed.
    Pending,
    /// Successfully deployed; the current revision.
    Deployed,
    /// Deployment failed.
    Failed,
    /// Replaced by a newer revision.
    Superseded,
    /// Being uninstalled.
    Uninstalling,
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Deployed => write!(f, "deployed"),
            Self::Failed => write!(f, "failed"),
            Self::Superseded => write!(f, "superseded"),
            Self::Uninstalling => write!(f, "uninstalling"),
        }
    }
}

/// One revision of a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    /// Release name.
    pub name: String,
    /// Release namespace.
    pub namespace: String,
    /// Revision number, starting at 1.
    pub revision: u32,
    /// Status of this revision.
    pub status: ReleaseStatus,
    /// How this revision was deployed.
    pub deploy_type: DeployType,
    /// When the revision was created.
    pub created_at: DateTime<Utc>,
    /// When the revision was last written.
    pub updated_at: DateTime<Utc>,
    /// Desired objects of this revision.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<serde_json::Value>,
}

impl Release {
    /// Creates a pending revision.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        revision: u32,
        deploy_type: DeployType,
        manifests: Vec<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            namespace: namespace.into(),
            revision,
            status: ReleaseStatus::Pending,
            deploy_type,
            created_at: now,
            updated_at: now,
            manifests,
        }
    }

    /// Returns a copy with another status.
    #[must_use]
    pub fn with_status(&self, status: ReleaseStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Identity of the revision, stable across status changes.
    #[must_use]
    pub fn id(&self) -> String {
        format!("release:{}:{}:{}", self.namespace, self.name, self.revision)
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} revision {}", self.namespace, self.name, self.revision)
    }
}

/// Change a plan must apply to a release revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseTransition {
    /// Record a new first revision.
    Install,
    /// Record a new revision on top of the deployed one.
    Upgrade,
    /// Record a new revision restoring an older one.
    Rollback,
    /// Mark a previous revision superseded.
    Supersede,
    /// Mark the revision uninstalling, then delete it.
    Uninstall,
    /// Delete the revision record.
    Delete,
    /// Leave the revision untouched.
    None,
}

/// A release revision together with the transition the plan applies to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// The revision.
    pub release: Release,
    /// What to do with it.
    pub transition: ReleaseTransition,
    /// Record the revision as failed if the deploy fails.
    pub must_fail_on_failed_deploy: bool,
}

/// Returns the newest revision of a history sorted by revision.
#[must_use]
pub fn latest(history: &[Release]) -> Option<&Release> {
    history.iter().max_by_key(|r| r.revision)
}

/// Returns the newest revision in `deployed` status.
#[must_use]
pub fn last_deployed(history: &[Release]) -> Option<&Release> {
    history
        .iter()
        .filter(|r| r.status == ReleaseStatus::Deployed)
        .max_by_key(|r| r.revision)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn revision(n: u32, status: ReleaseStatus) -> Release {
        Release::new("web", "prod", n, DeployType::Upgrade, Vec::new()).with_status(status)
    }

    #[test]
    fn test_release_id_ignores_status() {
        let pending = revision(3, ReleaseStatus::Pending);
        let deployed = pending.with_status(ReleaseStatus::Deployed);
        assert_eq!(pending.id(), deployed.id());
        assert_eq!(pending.id(), "release:prod:web:3");
    }

    #[test]
    fn test_history_helpers() {
        let history = vec![
            revision(1, ReleaseStatus::Superseded),
            revision(2, ReleaseStatus::Deployed),
            revision(3, ReleaseStatus::Failed),
        ];

        assert_eq!(latest(&history).map(|r| r.revision), Some(3));
        assert_eq!(last_deployed(&history).map(|r| r.revision), Some(2));
        assert!(last_deployed(&[]).is_none());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ReleaseStatus::Uninstalling).expect("serializes");
        assert_eq!(json, "\"uninstalling\"");
    }
}
