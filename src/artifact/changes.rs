//! Human-readable changes section of a plan artifact.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decision::normalize::unified_diff;
use crate::decision::{DeletableResourceInfo, InstallableResourceInfo, ResourceInstallType};

/// What happens to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// Created from scratch.
    Create,
    /// Updated in place.
    Update,
    /// Applied without a comparable live object.
    Apply,
    /// Deleted and created again.
    Recreate,
    /// Removed.
    Delete,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Apply => "apply",
            Self::Recreate => "recreate",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// One entry of the changes section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    /// Display identity of the resource.
    pub resource: String,
    /// Planned action.
    pub action: ChangeAction,
    /// Iteration of the resource in the plan.
    pub iteration: u32,
    /// Unified YAML diff, secrets redacted.
    pub diff: String,
}

/// Builds the changes section from the decision records.
///
/// Unchanged resources are omitted. The "after" side of a change is the
/// dry-run result when there is one, the desired object otherwise.
#[must_use]
pub fn build_changes(
    installable: &[InstallableResourceInfo],
    deletable: &[DeletableResourceInfo],
) -> Vec<ResourceChange> {
    let mut changes = Vec::new();

    for info in installable {
        let action = match info.install_type {
            ResourceInstallType::None => continue,
            ResourceInstallType::Create => ChangeAction::Create,
            ResourceInstallType::Update => ChangeAction::Update,
            ResourceInstallType::Apply => ChangeAction::Apply,
            ResourceInstallType::Recreate => ChangeAction::Recreate,
        };
        let label = info.meta().id_human();
        let after = info.dry_apply.as_ref().unwrap_or(&info.resource.spec.object);
        changes.push(ResourceChange {
            diff: unified_diff(info.live.as_ref(), Some(after), &label),
            resource: label,
            action,
            iteration: info.iteration,
        });
    }

    for info in deletable.iter().filter(|d| d.must_delete) {
        let label = info.meta.id_human();
        changes.push(ResourceChange {
            diff: unified_diff(info.live.as_ref(), None, &label),
            resource: label,
            action: ChangeAction::Delete,
            iteration: 0,
        });
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Stage;
    use crate::resource::{GroupVersionKind, Resource, ResourceMeta};
    use serde_json::json;

    fn installable(object: serde_json::Value, live: Option<serde_json::Value>, install_type: ResourceInstallType) -> InstallableResourceInfo {
        let resource = Resource::from_object(object, "prod", "").expect("resource");
        InstallableResourceInfo {
            resource,
            iteration: 0,
            stage: Stage::Resources,
            live,
            dry_apply: None,
            dry_apply_error: None,
            install_type,
            must_track_readiness: false,
            must_delete_on_success: false,
            must_delete_on_failed_install: false,
        }
    }

    #[test]
    fn test_unchanged_resources_are_omitted() {
        let obj = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "cm"}});
        let changes = build_changes(&[installable(obj, None, ResourceInstallType::None)], &[]);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_secret_values_never_reach_the_diff() {
        let desired = json!({
            "apiVersion": "v1", "kind": "Secret",
            "metadata": {"name": "creds"},
            "data": {"password": "aHVudGVyMg=="}
        });
        let live = json!({
            "apiVersion": "v1", "kind": "Secret",
            "metadata": {"name": "creds", "namespace": "prod", "uid": "x"},
            "data": {"password": "b2xk"}
        });

        let changes = build_changes(&[installable(desired, Some(live), ResourceInstallType::Update)], &[]);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, ChangeAction::Update);
        assert!(!changes[0].diff.contains("aHVudGVyMg=="));
        assert!(!changes[0].diff.contains("b2xk"));
        assert!(changes[0].diff.contains("sha256:"));
    }

    #[test]
    fn test_deletions_are_listed() {
        let meta = ResourceMeta::new("old", "prod", GroupVersionKind::new("", "v1", "ConfigMap"));
        let deletable = vec![DeletableResourceInfo {
            meta,
            live: Some(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "old"}, "data": {"k": "v"}})),
            must_delete: true,
            must_track_absence: true,
        }];

        let changes = build_changes(&[], &deletable);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, ChangeAction::Delete);
        assert!(changes[0].diff.contains("-  k: v"));
    }
}
