//! Resource decision engine.
//!
//! For every desired resource the engine looks up the live object, migrates
//! managed fields, dry-runs the apply and turns the outcome into exactly one
//! install verdict plus the tracking and deletion flags of the resource.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cluster::ClusterClient;
use crate::error::{ClusterError, DecisionError};
use crate::resource::policy::ANNOTATION_RESOURCE_POLICY;
use crate::resource::{Resource, ResourceMeta, ResourcePolicy};

use super::info::{
    DeletableResourceInfo, InstallableResourceInfo, ResourceInstallType, StagedResource,
};
use super::managed_fields::{reconcile_managed_fields, FieldManagerOptions};
use super::normalize::equivalent;

/// Outcome of a dry-run apply against an existing object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DryApplyOutcome {
    /// The result equals the live object once normalized.
    Matches,
    /// The result differs from the live object.
    Differs,
    /// The cluster rejected a change to immutable fields.
    Immutable(String),
    /// Any other dry-run failure.
    Failed(String),
}

/// What the engine observed for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// No live object.
    Absent,
    /// A live object exists; the dry-run produced this outcome.
    Present(DryApplyOutcome),
}

/// Maps an observation to an install verdict.
///
/// # Errors
///
/// Returns `DecisionError::ImmutableFieldChange` when immutable fields change
/// on a resource that may not be recreated.
pub fn decide(
    resource: &str,
    observation: &Observation,
    policy: &ResourcePolicy,
) -> Result<ResourceInstallType, DecisionError> {
    let outcome = match observation {
        Observation::Absent => return Ok(ResourceInstallType::Create),
        Observation::Present(outcome) => outcome,
    };

    if let DryApplyOutcome::Immutable(message) = outcome {
        return if policy.recreate || policy.recreate_on_immutable {
            Ok(ResourceInstallType::Recreate)
        } else {
            Err(DecisionError::ImmutableFieldChange {
                resource: resource.to_string(),
                message: message.clone(),
            })
        };
    }

    if policy.recreate {
        return Ok(ResourceInstallType::Recreate);
    }

    Ok(match outcome {
        DryApplyOutcome::Failed(_) => ResourceInstallType::Apply,
        DryApplyOutcome::Matches => ResourceInstallType::None,
        DryApplyOutcome::Differs | DryApplyOutcome::Immutable(_) => ResourceInstallType::Update,
    })
}

/// Returns true if readiness must be tracked after the verdict.
#[must_use]
pub fn must_track_readiness(
    resource: &Resource,
    install_type: ResourceInstallType,
    previous_release_failed: bool,
) -> bool {
    if resource.policy.non_blocking || resource.spec.meta.gvk.is_crd() {
        return false;
    }
    install_type != ResourceInstallType::None || previous_release_failed
}

/// Engine options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionOptions {
    /// Field manager reconciliation options.
    pub field_manager: FieldManagerOptions,
    /// The previous release attempt failed; unchanged resources are tracked
    /// for readiness again.
    pub previous_release_failed: bool,
}

/// Decides verdicts for desired and obsolete resources.
pub struct DecisionEngine {
    client: Arc<dyn ClusterClient>,
    options: DecisionOptions,
}

impl DecisionEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>, options: DecisionOptions) -> Self {
        Self { client, options }
    }

    /// Builds installable infos in input order.
    ///
    /// Repeated resources (same identity) get increasing iterations. An
    /// iteration following one that deletes the resource on success is
    /// always created, without looking at the cluster.
    ///
    /// # Errors
    ///
    /// Returns the first lookup or immutable-field error.
    pub async fn build_installable_infos(
        &self,
        resources: &[StagedResource],
    ) -> Result<Vec<InstallableResourceInfo>, DecisionError> {
        let mut infos: Vec<InstallableResourceInfo> = Vec::with_capacity(resources.len());
        let mut seen: HashMap<String, usize> = HashMap::new();

        for staged in resources {
            let id = staged.resource.spec.meta.id();
            let previous = seen.get(&id).map(|&i| &infos[i]);
            let iteration = previous.map_or(0, |p| p.iteration + 1);
            let forced_create = previous.is_some_and(|p| p.must_delete_on_success);

            let info = if forced_create {
                debug!(
                    "{} iteration {iteration} follows a delete-on-success, creating",
                    staged.resource.meta().id_human()
                );
                self.with_flags(staged, iteration, None, None, None, ResourceInstallType::Create)
            } else {
                self.decide_resource(staged, iteration).await?
            };

            seen.insert(id, infos.len());
            infos.push(info);
        }

        let changed = infos
            .iter()
            .filter(|i| i.install_type != ResourceInstallType::None)
            .count();
        info!("Decided {} resources, {changed} to change", infos.len());
        Ok(infos)
    }

    /// Builds deletable infos for resources that left the desired set.
    ///
    /// # Errors
    ///
    /// Returns lookup errors other than "not found".
    pub async fn build_deletable_infos(
        &self,
        obsolete: &[ResourceMeta],
    ) -> Result<Vec<DeletableResourceInfo>, DecisionError> {
        let mut infos = Vec::with_capacity(obsolete.len());

        for meta in obsolete {
            let live = match self.client.get(meta).await {
                Ok(live) => Some(live),
                Err(e) if e.is_absent() => None,
                Err(source) => return Err(lookup("get", meta, source)),
            };

            let keep = live.as_ref().is_some_and(|l| {
                l.pointer("/metadata/annotations")
                    .and_then(|a| a.get(ANNOTATION_RESOURCE_POLICY))
                    .and_then(serde_json::Value::as_str)
                    == Some("keep")
            });
            if keep {
                info!("Keeping {} (resource policy keep)", meta.id_human());
            }

            let must_delete = live.is_some() && !keep;
            infos.push(DeletableResourceInfo {
                meta: meta.clone(),
                live,
                must_delete,
                must_track_absence: must_delete,
            });
        }

        Ok(infos)
    }

    async fn decide_resource(
        &self,
        staged: &StagedResource,
        iteration: u32,
    ) -> Result<InstallableResourceInfo, DecisionError> {
        let resource = &staged.resource;
        let meta = resource.meta();

        let live = match self.client.get(meta).await {
            Ok(live) => live,
            Err(e) if e.is_absent() => {
                debug!("{} not found, creating", meta.id_human());
                return Ok(self.with_flags(staged, iteration, None, None, None, ResourceInstallType::Create));
            }
            Err(source) => return Err(lookup("get", meta, source)),
        };

        let live = self.migrate_managed_fields(meta, live).await?;

        let (dry_apply, dry_apply_error, outcome) = match self.client.apply(&resource.spec, true).await {
            Ok(result) => {
                let outcome = if equivalent(&live, &result) {
                    DryApplyOutcome::Matches
                } else {
                    DryApplyOutcome::Differs
                };
                (Some(result), None, outcome)
            }
            Err(ClusterError::Immutable { message, .. }) => {
                (None, Some(message.clone()), DryApplyOutcome::Immutable(message))
            }
            Err(e) => {
                warn!("Dry-run apply of {} failed: {e}", meta.id_human());
                (None, Some(e.to_string()), DryApplyOutcome::Failed(e.to_string()))
            }
        };

        let install_type = decide(&meta.id_human(), &Observation::Present(outcome), &resource.policy)?;
        debug!("{} -> {install_type}", meta.id_human());

        Ok(self.with_flags(staged, iteration, Some(live), dry_apply, dry_apply_error, install_type))
    }

    async fn migrate_managed_fields(
        &self,
        meta: &ResourceMeta,
        live: serde_json::Value,
    ) -> Result<serde_json::Value, DecisionError> {
        let Some(patch) = reconcile_managed_fields(&live, &self.options.field_manager) else {
            return Ok(live);
        };

        debug!("Migrating managed fields of {}", meta.id_human());
        match self.client.merge_patch(meta, &patch).await {
            Ok(patched) => Ok(patched),
            Err(e) if e.is_not_found() => Ok(live),
            Err(source) => Err(lookup("managed fields patch", meta, source)),
        }
    }

    fn with_flags(
        &self,
        staged: &StagedResource,
        iteration: u32,
        live: Option<serde_json::Value>,
        dry_apply: Option<serde_json::Value>,
        dry_apply_error: Option<String>,
        install_type: ResourceInstallType,
    ) -> InstallableResourceInfo {
        let policy = &staged.resource.policy;
        InstallableResourceInfo {
            resource: staged.resource.clone(),
            iteration,
            stage: staged.stage,
            live,
            dry_apply,
            dry_apply_error,
            install_type,
            must_track_readiness: must_track_readiness(
                &staged.resource,
                install_type,
                self.options.previous_release_failed,
            ),
            must_delete_on_success: policy.delete_on_succeeded && !policy.keep,
            must_delete_on_failed_install: policy.delete_on_failed && !policy.keep,
        }
    }
}

fn lookup(action: &'static str, meta: &ResourceMeta, source: ClusterError) -> DecisionError {
    DecisionError::Lookup {
        action,
        resource: meta.id_human(),
        source,
    }
}
