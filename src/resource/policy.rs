//! Per-resource deployment policy read from annotations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ConfigError;

use super::dependency::{
    parse_external_dependency, parse_internal_dependency, ExternalDependency, InternalDependency,
};

/// Prefix shared by every policy annotation.
pub const ANNOTATION_PREFIX: &str = "rollplan.io/";

/// Ordering weight inside a stage.
pub const ANNOTATION_WEIGHT: &str = "rollplan.io/weight";
/// Hook phases the resource runs in.
pub const ANNOTATION_HOOK: &str = "rollplan.io/hook";
/// Deletion policy list.
pub const ANNOTATION_DELETE_POLICY: &str = "rollplan.io/delete-policy";
/// Recreate when an update hits immutable fields.
pub const ANNOTATION_RECREATE_ON_IMMUTABLE: &str = "rollplan.io/recreate-on-immutable";
/// `keep` protects the resource from deletion.
pub const ANNOTATION_RESOURCE_POLICY: &str = "rollplan.io/resource-policy";
/// `false` makes the resource non-blocking.
pub const ANNOTATION_TRACK_READINESS: &str = "rollplan.io/track-readiness";
/// Failures tolerated per replica while tracking readiness.
pub const ANNOTATION_FAILURES_ALLOWED: &str = "rollplan.io/failures-allowed-per-replica";
/// Skip container logs while tracking readiness.
pub const ANNOTATION_SKIP_LOGS: &str = "rollplan.io/skip-logs";
/// Show service messages while tracking readiness.
pub const ANNOTATION_SHOW_SERVICE_MESSAGES: &str = "rollplan.io/show-service-messages";
/// Prefix of internal dependency annotations.
pub const ANNOTATION_DEPLOY_DEPENDENCY_PREFIX: &str = "rollplan.io/deploy-dependency-";
/// Prefix of external dependency annotations.
pub const ANNOTATION_EXTERNAL_DEPENDENCY_PREFIX: &str = "rollplan.io/external-dependency-";

/// Lifecycle phase a hook resource is deployed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookPhase {
    /// Before install.
    PreInstall,
    /// After install.
    PostInstall,
    /// Before upgrade.
    PreUpgrade,
    /// After upgrade.
    PostUpgrade,
    /// Before rollback.
    PreRollback,
    /// After rollback.
    PostRollback,
    /// Before uninstall.
    PreDelete,
    /// After uninstall.
    PostDelete,
}

impl HookPhase {
    fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "pre-install" => Self::PreInstall,
            "post-install" => Self::PostInstall,
            "pre-upgrade" => Self::PreUpgrade,
            "post-upgrade" => Self::PostUpgrade,
            "pre-rollback" => Self::PreRollback,
            "post-rollback" => Self::PostRollback,
            "pre-delete" => Self::PreDelete,
            "post-delete" => Self::PostDelete,
            _ => return None,
        })
    }

    /// Returns true for the `pre-*` phases.
    #[must_use]
    pub const fn is_pre(self) -> bool {
        matches!(
            self,
            Self::PreInstall | Self::PreUpgrade | Self::PreRollback | Self::PreDelete
        )
    }
}

/// Options handed to the readiness tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    /// Failures tolerated per replica before the resource counts as failed.
    pub failures_allowed_per_replica: u32,
    /// Do not stream container logs.
    pub skip_logs: bool,
    /// Print service messages (events, conditions) while waiting.
    pub show_service_messages: bool,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            failures_allowed_per_replica: 1,
            skip_logs: false,
            show_service_messages: false,
        }
    }
}

/// Declarative deployment policy of one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    /// Ordering weight; `None` attaches to the stage boundaries directly.
    pub weight: Option<i32>,
    /// Hook phases; empty for regular resources.
    pub hooks: Vec<HookPhase>,
    /// Delete and create again instead of updating (`before-creation`).
    pub recreate: bool,
    /// Recreate when a dry-run reports an immutable field change.
    pub recreate_on_immutable: bool,
    /// Delete once deployed and tracked successfully (`succeeded`).
    pub delete_on_succeeded: bool,
    /// Delete when the install failed (`failed`).
    pub delete_on_failed: bool,
    /// Never delete.
    pub keep: bool,
    /// Non-blocking resources are never tracked for readiness.
    pub non_blocking: bool,
    /// Readiness tracker options.
    pub readiness: ReadinessPolicy,
    /// Dependencies on resources of the same plan.
    pub internal_dependencies: Vec<InternalDependency>,
    /// Dependencies on resources outside the plan.
    pub external_dependencies: Vec<ExternalDependency>,
}

impl ResourcePolicy {
    /// Parses the policy from a resource's annotations.
    ///
    /// Unknown `rollplan.io/` annotations are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidAnnotation` for malformed values.
    pub fn from_annotations(
        annotations: &BTreeMap<String, String>,
        namespace: &str,
        resource: &str,
    ) -> Result<Self, ConfigError> {
        let invalid = |key: &str, value: &str, reason: String| ConfigError::InvalidAnnotation {
            resource: resource.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason,
        };

        let mut policy = Self::default();

        for (key, value) in annotations {
            let value = value.trim();
            match key.as_str() {
                ANNOTATION_WEIGHT => {
                    let weight = value
                        .parse::<i32>()
                        .map_err(|e| invalid(key, value, e.to_string()))?;
                    policy.weight = Some(weight);
                }
                ANNOTATION_HOOK => {
                    for phase in list(value) {
                        let parsed = HookPhase::parse(phase)
                            .ok_or_else(|| invalid(key, value, format!("unknown hook phase {phase:?}")))?;
                        if !policy.hooks.contains(&parsed) {
                            policy.hooks.push(parsed);
                        }
                    }
                }
                ANNOTATION_DELETE_POLICY => {
                    for item in list(value) {
                        match item {
                            "before-creation" => policy.recreate = true,
                            "succeeded" => policy.delete_on_succeeded = true,
                            "failed" => policy.delete_on_failed = true,
                            other => {
                                return Err(invalid(key, value, format!("unknown delete policy {other:?}")));
                            }
                        }
                    }
                }
                ANNOTATION_RECREATE_ON_IMMUTABLE => {
                    policy.recreate_on_immutable = parse_bool(value).map_err(|r| invalid(key, value, r))?;
                }
                ANNOTATION_RESOURCE_POLICY => match value {
                    "keep" => policy.keep = true,
                    "" => {}
                    other => return Err(invalid(key, value, format!("unknown resource policy {other:?}"))),
                },
                ANNOTATION_TRACK_READINESS => {
                    policy.non_blocking = !parse_bool(value).map_err(|r| invalid(key, value, r))?;
                }
                ANNOTATION_FAILURES_ALLOWED => {
                    policy.readiness.failures_allowed_per_replica = value
                        .parse::<u32>()
                        .map_err(|e| invalid(key, value, e.to_string()))?;
                }
                ANNOTATION_SKIP_LOGS => {
                    policy.readiness.skip_logs = parse_bool(value).map_err(|r| invalid(key, value, r))?;
                }
                ANNOTATION_SHOW_SERVICE_MESSAGES => {
                    policy.readiness.show_service_messages =
                        parse_bool(value).map_err(|r| invalid(key, value, r))?;
                }
                k if k.starts_with(ANNOTATION_DEPLOY_DEPENDENCY_PREFIX) => {
                    let dep = parse_internal_dependency(value, namespace).map_err(|r| invalid(key, value, r))?;
                    policy.internal_dependencies.push(dep);
                }
                k if k.starts_with(ANNOTATION_EXTERNAL_DEPENDENCY_PREFIX) => {
                    let dep = parse_external_dependency(value, namespace).map_err(|r| invalid(key, value, r))?;
                    policy.external_dependencies.push(dep);
                }
                _ => {}
            }
        }

        Ok(policy)
    }

    /// Returns true if the resource has at least one hook phase.
    #[must_use]
    pub const fn is_hook(&self) -> bool {
        !self.hooks.is_empty()
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PreInstall => "pre-install",
            Self::PostInstall => "post-install",
            Self::PreUpgrade => "pre-upgrade",
            Self::PostUpgrade => "post-upgrade",
            Self::PreRollback => "pre-rollback",
            Self::PostRollback => "post-rollback",
            Self::PreDelete => "pre-delete",
            Self::PostDelete => "post-delete",
        };
        write!(f, "{s}")
    }
}

fn list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("expected true or false, got {other:?}")),
    }
}
