//! Install plan construction.
//!
//! The builder turns decision records and release transitions into a plan:
//! a line of stages, weighted sub-stages inside each stage, one operation
//! chain per resource, dependency edges, and finally an optimization pass.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

use crate::cluster::PropagationPolicy;
use crate::decision::{DeletableResourceInfo, InstallableResourceInfo, ResourceInstallType};
use crate::error::{GraphError, PlanError};
use crate::release::{DeployType, ReleaseInfo, ReleaseStatus, ReleaseTransition};
use crate::resource::{DependencyState, ResourceMeta};

use super::operation::{Boundary, Operation, OperationConfig};
use super::stage::Stage;
use super::Plan;

/// Per-category tracking timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingTimeouts {
    /// Readiness tracking.
    pub readiness_secs: u64,
    /// Presence tracking.
    pub creation_secs: u64,
    /// Absence tracking.
    pub deletion_secs: u64,
}

impl Default for TrackingTimeouts {
    fn default() -> Self {
        Self {
            readiness_secs: 300,
            creation_secs: 60,
            deletion_secs: 120,
        }
    }
}

/// Operation chain of one resource iteration.
#[derive(Debug)]
struct Chain<'a> {
    info: &'a InstallableResourceInfo,
    deploy: Option<String>,
    readiness: Option<String>,
    first: String,
    last: String,
}

impl Chain<'_> {
    /// Operation dependencies are attached to.
    fn target(&self) -> &str {
        self.deploy.as_deref().unwrap_or(&self.first)
    }

    fn meta(&self) -> &ResourceMeta {
        self.info.meta()
    }
}

/// Builds install, upgrade, rollback and uninstall plans.
#[derive(Debug, Clone)]
pub struct InstallPlanBuilder<'a> {
    deploy_type: DeployType,
    installable: &'a [InstallableResourceInfo],
    deletable: &'a [DeletableResourceInfo],
    releases: &'a [ReleaseInfo],
    timeouts: TrackingTimeouts,
}

impl<'a> InstallPlanBuilder<'a> {
    /// Creates a builder for a deploy type.
    #[must_use]
    pub fn new(deploy_type: DeployType) -> Self {
        Self {
            deploy_type,
            installable: &[],
            deletable: &[],
            releases: &[],
            timeouts: TrackingTimeouts::default(),
        }
    }

    /// Sets the resources to install.
    #[must_use]
    pub const fn with_installable(mut self, infos: &'a [InstallableResourceInfo]) -> Self {
        self.installable = infos;
        self
    }

    /// Sets the obsolete resources.
    #[must_use]
    pub const fn with_deletable(mut self, infos: &'a [DeletableResourceInfo]) -> Self {
        self.deletable = infos;
        self
    }

    /// Sets the release transitions.
    #[must_use]
    pub const fn with_releases(mut self, infos: &'a [ReleaseInfo]) -> Self {
        self.releases = infos;
        self
    }

    /// Sets the tracking timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: TrackingTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Builds and optimizes the plan.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::DependencyCycle` when a declared dependency
    /// contradicts the stage ordering, `PlanError::Insert` when two
    /// different operations collide on one ID, and `PlanError::EmptyChain`
    /// if a resource yields nothing to chain.
    pub fn build(self) -> Result<Plan, PlanError> {
        let mut plan = Plan::new();

        self.add_stages(&mut plan)?;
        self.add_release_operations(&mut plan)?;
        let chains = self.add_resource_chains(&mut plan)?;
        self.add_deletions(&mut plan)?;
        self.add_external_dependencies(&mut plan, &chains)?;
        Self::add_internal_dependencies(&mut plan, &chains)?;
        Self::order_iterations(&mut plan, &chains)?;

        let before = plan.len();
        plan.optimize().map_err(|source| PlanError::Insert {
            operation: String::from("plan optimization"),
            source,
        })?;

        info!(
            "Built {} plan: {} operations ({} before optimization), {} edges",
            self.deploy_type,
            plan.len(),
            before,
            plan.dag().edge_count()
        );
        Ok(plan)
    }

    fn add_stages(&self, plan: &mut Plan) -> Result<(), PlanError> {
        let mut weights: BTreeMap<Stage, BTreeSet<i32>> = BTreeMap::new();
        for info in self.installable {
            if let Some(weight) = info.resource.policy.weight {
                weights.entry(info.stage).or_default().insert(weight);
            }
        }
        add_stage_line(plan, Stage::sequence(self.deploy_type), &weights)
    }

    fn add_release_operations(&self, plan: &mut Plan) -> Result<(), PlanError> {
        for info in self.releases {
            let release = &info.release;
            match info.transition {
                ReleaseTransition::Install | ReleaseTransition::Upgrade | ReleaseTransition::Rollback => {
                    add_anchored(
                        plan,
                        Stage::Init,
                        OperationConfig::CreateRelease {
                            release: release.with_status(ReleaseStatus::Pending),
                            fail_on_failed_deploy: info.must_fail_on_failed_deploy,
                        },
                    )?;
                    add_anchored(
                        plan,
                        Stage::Final,
                        OperationConfig::UpdateRelease {
                            release: release.with_status(ReleaseStatus::Deployed),
                        },
                    )?;
                }
                ReleaseTransition::Supersede => {
                    add_anchored(
                        plan,
                        Stage::Final,
                        OperationConfig::UpdateRelease {
                            release: release.with_status(ReleaseStatus::Superseded),
                        },
                    )?;
                }
                ReleaseTransition::Uninstall => {
                    add_anchored(
                        plan,
                        Stage::Init,
                        OperationConfig::UpdateRelease {
                            release: release.with_status(ReleaseStatus::Uninstalling),
                        },
                    )?;
                    add_anchored(plan, Stage::Final, delete_release(info))?;
                }
                ReleaseTransition::Delete => {
                    add_anchored(plan, Stage::Final, delete_release(info))?;
                }
                ReleaseTransition::None => {}
            }
        }
        Ok(())
    }

    fn add_resource_chains(&self, plan: &mut Plan) -> Result<Vec<Chain<'a>>, PlanError> {
        let mut chains = Vec::new();

        for info in self.installable {
            let meta = info.meta();
            let spec = info.resource.spec.clone();
            let iteration = info.iteration;

            let deploy = match info.install_type {
                ResourceInstallType::None => None,
                ResourceInstallType::Create => Some(OperationConfig::CreateResource { spec }),
                ResourceInstallType::Update => Some(OperationConfig::UpdateResource { spec }),
                ResourceInstallType::Apply => Some(OperationConfig::ApplyResource {
                    spec,
                    dry_apply_error: info.dry_apply_error.clone(),
                }),
                ResourceInstallType::Recreate => Some(OperationConfig::RecreateResource { spec }),
            };
            let readiness = info.must_track_readiness.then(|| OperationConfig::TrackReadiness {
                meta: meta.clone(),
                timeout_secs: self.timeouts.readiness_secs,
                policy: info.resource.policy.readiness.clone(),
                delete_on_failed: info.must_delete_on_failed_install,
            });

            if deploy.is_none() && readiness.is_none() {
                debug!("{} unchanged, no operations", meta.id_human());
                continue;
            }

            let mut ids = Vec::new();
            if info.install_type == ResourceInstallType::Recreate {
                ids.extend(self.add_deletion(plan, meta, iteration, true)?);
            }
            let deploy = deploy
                .map(|config| plan.add_operation(Operation::new(config, iteration)))
                .transpose()?;
            ids.extend(deploy.clone());
            let readiness = readiness
                .map(|config| plan.add_operation(Operation::new(config, iteration)))
                .transpose()?;
            ids.extend(readiness.clone());

            if info.must_delete_on_success {
                ids.extend(self.add_deletion(plan, meta, iteration, false)?);
            }

            let (Some(first), Some(last)) = (ids.first().cloned(), ids.last().cloned()) else {
                return Err(PlanError::EmptyChain {
                    resource: meta.id_human(),
                });
            };
            let (start, end) = anchors(info.stage, info.resource.policy.weight);
            connect(plan, &start, &first)?;
            for pair in ids.windows(2) {
                connect(plan, &pair[0], &pair[1])?;
            }
            connect(plan, &last, &end)?;

            chains.push(Chain {
                info,
                deploy,
                readiness,
                first,
                last,
            });
        }

        Ok(chains)
    }

    /// Foreground delete followed by absence tracking, returned in chain order.
    fn add_deletion(
        &self,
        plan: &mut Plan,
        meta: &ResourceMeta,
        iteration: u32,
        before_recreate: bool,
    ) -> Result<[String; 2], PlanError> {
        let delete = plan.add_operation(Operation::new(
            OperationConfig::DeleteResource {
                meta: meta.clone(),
                propagation: PropagationPolicy::Foreground,
                before_recreate,
            },
            iteration,
        ))?;
        let absence = plan.add_operation(Operation::new(
            OperationConfig::TrackAbsence {
                meta: meta.clone(),
                timeout_secs: self.timeouts.deletion_secs,
                before_recreate,
            },
            iteration,
        ))?;
        Ok([delete, absence])
    }

    fn add_deletions(&self, plan: &mut Plan) -> Result<(), PlanError> {
        for info in self.deletable.iter().filter(|d| d.must_delete) {
            let delete = plan.add_operation(Operation::new(
                OperationConfig::DeleteResource {
                    meta: info.meta.clone(),
                    propagation: PropagationPolicy::Foreground,
                    before_recreate: false,
                },
                0,
            ))?;
            let (start, end) = anchors(Stage::Uninstall, None);
            connect(plan, &start, &delete)?;

            let last = if info.must_track_absence {
                let absence = plan.add_operation(Operation::new(
                    OperationConfig::TrackAbsence {
                        meta: info.meta.clone(),
                        timeout_secs: self.timeouts.deletion_secs,
                        before_recreate: false,
                    },
                    0,
                ))?;
                connect(plan, &delete, &absence)?;
                absence
            } else {
                delete
            };
            connect(plan, &last, &end)?;
        }
        Ok(())
    }

    fn add_external_dependencies(&self, plan: &mut Plan, chains: &[Chain<'_>]) -> Result<(), PlanError> {
        for chain in chains {
            for dependency in &chain.info.resource.policy.external_dependencies {
                let config = OperationConfig::TrackPresence {
                    meta: dependency.meta.clone(),
                    timeout_secs: self.timeouts.creation_secs,
                };
                // Declarations differing only in API version share one tracker.
                let existing = Operation::new(config.clone(), 0).id();
                let presence = if plan.operation(&existing).is_some() {
                    existing
                } else {
                    add_anchored(plan, Stage::Init, config)?
                };
                plan.connect(&presence, chain.target())
                    .map_err(|source| PlanError::DependencyCycle {
                        dependent: chain.meta().id_human(),
                        dependency: dependency.meta.id_human(),
                        source,
                    })?;
            }
        }
        Ok(())
    }

    fn add_internal_dependencies(plan: &mut Plan, chains: &[Chain<'_>]) -> Result<(), PlanError> {
        for chain in chains {
            for dependency in &chain.info.resource.policy.internal_dependencies {
                let matches = chains.iter().filter(|candidate| {
                    candidate.info.iteration == 0
                        && !candidate.meta().same_resource(chain.meta())
                        && dependency.matcher.matches(candidate.meta())
                });

                for candidate in matches {
                    let source = match dependency.state {
                        DependencyState::Present => candidate.deploy.as_deref(),
                        DependencyState::Ready => candidate.readiness.as_deref(),
                    };
                    let Some(source) = source else {
                        continue;
                    };

                    debug!(
                        "{} depends on {} being {:?}",
                        chain.meta().id_human(),
                        candidate.meta().id_human(),
                        dependency.state
                    );
                    plan.connect(source, chain.target())
                        .map_err(|e| PlanError::DependencyCycle {
                            dependent: chain.meta().id_human(),
                            dependency: candidate.meta().id_human(),
                            source: e,
                        })?;
                }
            }
        }
        Ok(())
    }

    fn order_iterations(plan: &mut Plan, chains: &[Chain<'_>]) -> Result<(), PlanError> {
        let mut last_by_resource: HashMap<String, &Chain<'_>> = HashMap::new();

        for chain in chains {
            let id = chain.meta().id();
            if let Some(previous) = last_by_resource.get(&id) {
                plan.connect(&previous.last, &chain.first)
                    .map_err(|source| PlanError::DependencyCycle {
                        dependent: format!("{} (iteration {})", chain.meta().id_human(), chain.info.iteration),
                        dependency: format!(
                            "{} (iteration {})",
                            previous.meta().id_human(),
                            previous.info.iteration
                        ),
                        source,
                    })?;
            }
            last_by_resource.insert(id, chain);
        }
        Ok(())
    }
}

/// Chains the boundaries of `stages`, with one sub-stage per weight inside
/// each stage in ascending weight order.
pub(super) fn add_stage_line(
    plan: &mut Plan,
    stages: &[Stage],
    weights: &BTreeMap<Stage, BTreeSet<i32>>,
) -> Result<(), PlanError> {
    let mut previous_end: Option<String> = None;
    for &stage in stages {
        let start = plan.add_operation(Operation::boundary(stage, None, Boundary::Start))?;
        let end = plan.add_operation(Operation::boundary(stage, None, Boundary::End))?;
        connect(plan, &start, &end)?;
        if let Some(prev) = &previous_end {
            connect(plan, prev, &start)?;
        }

        let mut cursor = start;
        for &weight in weights.get(&stage).into_iter().flatten() {
            let sub_start = plan.add_operation(Operation::boundary(stage, Some(weight), Boundary::Start))?;
            let sub_end = plan.add_operation(Operation::boundary(stage, Some(weight), Boundary::End))?;
            connect(plan, &cursor, &sub_start)?;
            connect(plan, &sub_start, &sub_end)?;
            cursor = sub_end;
        }
        connect(plan, &cursor, &end)?;

        previous_end = Some(end);
    }
    Ok(())
}

/// Boundary IDs a resource with this weight attaches to.
pub(super) fn anchors(stage: Stage, weight: Option<i32>) -> (String, String) {
    (
        Operation::boundary(stage, weight, Boundary::Start).id(),
        Operation::boundary(stage, weight, Boundary::End).id(),
    )
}

/// Inserts an operation between the boundaries of a stage.
pub(super) fn add_anchored(plan: &mut Plan, stage: Stage, config: OperationConfig) -> Result<String, PlanError> {
    let id = plan.add_operation(Operation::new(config, 0))?;
    let (start, end) = anchors(stage, None);
    connect(plan, &start, &id)?;
    connect(plan, &id, &end)?;
    Ok(id)
}

pub(super) fn connect(plan: &mut Plan, from: &str, to: &str) -> Result<(), PlanError> {
    plan.connect(from, to).map_err(|source: GraphError| PlanError::Insert {
        operation: format!("{from} -> {to}"),
        source,
    })
}

fn delete_release(info: &ReleaseInfo) -> OperationConfig {
    OperationConfig::DeleteRelease {
        name: info.release.name.clone(),
        namespace: info.release.namespace.clone(),
        revision: info.release.revision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::operation::OperationType;
    use crate::release::Release;
    use crate::resource::{GroupVersionKind, Resource};
    use serde_json::json;

    fn resource(kind: &str, name: &str, annotations: serde_json::Value) -> Resource {
        let api_version = if kind == "ConfigMap" { "v1" } else { "apps/v1" };
        Resource::from_object(
            json!({
                "apiVersion": api_version,
                "kind": kind,
                "metadata": {"name": name, "annotations": annotations}
            }),
            "prod",
            "",
        )
        .expect("valid resource")
    }

    fn info(resource: Resource, install_type: ResourceInstallType, readiness: bool) -> InstallableResourceInfo {
        InstallableResourceInfo {
            must_delete_on_success: resource.policy.delete_on_succeeded,
            must_delete_on_failed_install: resource.policy.delete_on_failed,
            resource,
            iteration: 0,
            stage: Stage::Resources,
            live: None,
            dry_apply: None,
            dry_apply_error: None,
            install_type,
            must_track_readiness: readiness,
        }
    }

    fn ids_of(plan: &Plan, kind: OperationType) -> Vec<String> {
        plan.operations()
            .filter(|op| op.operation_type() == kind)
            .map(Operation::id)
            .collect()
    }

    fn release_infos() -> Vec<ReleaseInfo> {
        let new = Release::new("web", "prod", 2, DeployType::Upgrade, Vec::new());
        let old = Release::new("web", "prod", 1, DeployType::Install, Vec::new())
            .with_status(ReleaseStatus::Deployed);
        vec![
            ReleaseInfo {
                release: new,
                transition: ReleaseTransition::Upgrade,
                must_fail_on_failed_deploy: true,
            },
            ReleaseInfo {
                release: old,
                transition: ReleaseTransition::Supersede,
                must_fail_on_failed_deploy: false,
            },
        ]
    }

    #[test]
    fn test_empty_plan_collapses() {
        let plan = InstallPlanBuilder::new(DeployType::Install).build().expect("plan");
        assert!(plan.is_empty());
    }

    #[test]
    fn test_release_operations_frame_resources() {
        let releases = release_infos();
        let infos = vec![info(resource("Deployment", "web", json!({})), ResourceInstallType::Update, true)];

        let plan = InstallPlanBuilder::new(DeployType::Upgrade)
            .with_installable(&infos)
            .with_releases(&releases)
            .build()
            .expect("plan");

        let create_release = &ids_of(&plan, OperationType::CreateRelease)[0];
        let update = &ids_of(&plan, OperationType::Update)[0];
        let readiness = &ids_of(&plan, OperationType::TrackReadiness)[0];
        let update_releases = ids_of(&plan, OperationType::UpdateRelease);

        assert_eq!(update_releases.len(), 2);
        assert!(plan.dag().has_path(create_release, update));
        assert!(plan.dag().has_edge(update, readiness));
        for id in &update_releases {
            assert!(plan.dag().has_path(readiness, id));
        }
    }

    #[test]
    fn test_weighted_substages_run_in_order() {
        let infos = vec![
            info(resource("ConfigMap", "late", json!({"rollplan.io/weight": "10"})), ResourceInstallType::Create, false),
            info(resource("ConfigMap", "early", json!({"rollplan.io/weight": "-1"})), ResourceInstallType::Create, false),
            info(resource("ConfigMap", "free", json!({})), ResourceInstallType::Create, false),
        ];

        let plan = InstallPlanBuilder::new(DeployType::Install)
            .with_installable(&infos)
            .build()
            .expect("plan");

        let create = |name: &str| {
            Operation::new(
                OperationConfig::CreateResource {
                    spec: infos.iter().find(|i| i.meta().name == name).expect("info").resource.spec.clone(),
                },
                0,
            )
            .id()
        };

        assert!(plan.dag().has_path(&create("early"), &create("late")));
        assert!(!plan.dag().has_path(&create("free"), &create("late")));
        assert!(!plan.dag().has_path(&create("late"), &create("free")));
    }

    #[test]
    fn test_delete_on_success_chain() {
        let hook = resource("ConfigMap", "hook", json!({"rollplan.io/delete-policy": "succeeded"}));
        let infos = vec![info(hook, ResourceInstallType::Create, true)];

        let plan = InstallPlanBuilder::new(DeployType::Install)
            .with_installable(&infos)
            .build()
            .expect("plan");

        let create = &ids_of(&plan, OperationType::Create)[0];
        let readiness = &ids_of(&plan, OperationType::TrackReadiness)[0];
        let delete = &ids_of(&plan, OperationType::Delete)[0];
        let absence = &ids_of(&plan, OperationType::TrackAbsence)[0];

        assert!(plan.dag().has_edge(create, readiness));
        assert!(plan.dag().has_edge(readiness, delete));
        assert!(plan.dag().has_edge(delete, absence));
    }

    #[test]
    fn test_unchanged_resource_only_tracks_readiness() {
        let infos = vec![
            info(resource("Deployment", "a", json!({})), ResourceInstallType::None, true),
            info(resource("Deployment", "b", json!({})), ResourceInstallType::None, false),
        ];

        let plan = InstallPlanBuilder::new(DeployType::Upgrade)
            .with_installable(&infos)
            .build()
            .expect("plan");

        let non_meta: Vec<_> = plan.operations().filter(|op| op.config.meta().is_some()).collect();
        assert_eq!(non_meta.len(), 1);
        assert_eq!(non_meta[0].operation_type(), OperationType::TrackReadiness);
    }

    #[test]
    fn test_internal_dependencies() {
        let db = resource("Deployment", "db", json!({}));
        let app = resource(
            "Deployment",
            "app",
            json!({"rollplan.io/deploy-dependency-db": "state=ready,kind=Deployment,name=db"}),
        );
        let infos = vec![
            info(db, ResourceInstallType::Create, true),
            info(app, ResourceInstallType::Create, true),
        ];

        let plan = InstallPlanBuilder::new(DeployType::Install)
            .with_installable(&infos)
            .build()
            .expect("plan");

        let db_ready = Operation::new(
            OperationConfig::TrackReadiness {
                meta: infos[0].meta().clone(),
                timeout_secs: 300,
                policy: infos[0].resource.policy.readiness.clone(),
                delete_on_failed: false,
            },
            0,
        )
        .id();
        let app_create = Operation::new(
            OperationConfig::CreateResource {
                spec: infos[1].resource.spec.clone(),
            },
            0,
        )
        .id();

        assert!(plan.dag().has_edge(&db_ready, &app_create));
    }

    #[test]
    fn test_dependency_against_stage_order_is_a_cycle() {
        let late = resource("ConfigMap", "late", json!({}));
        let early = resource(
            "ConfigMap",
            "early",
            json!({"rollplan.io/deploy-dependency-x": "kind=ConfigMap,name=late"}),
        );
        let mut early_info = info(early, ResourceInstallType::Create, false);
        early_info.stage = Stage::PreHooks;
        let infos = vec![info(late, ResourceInstallType::Create, false), early_info];

        let err = InstallPlanBuilder::new(DeployType::Install)
            .with_installable(&infos)
            .build()
            .unwrap_err();

        match err {
            PlanError::DependencyCycle { dependent, dependency, .. } => {
                assert!(dependent.contains("early"));
                assert!(dependency.contains("late"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unmatched_dependency_is_skipped() {
        let app = resource(
            "Deployment",
            "app",
            json!({"rollplan.io/deploy-dependency-db": "kind=StatefulSet,name=db"}),
        );
        let infos = vec![info(app, ResourceInstallType::Create, false)];

        assert!(InstallPlanBuilder::new(DeployType::Install)
            .with_installable(&infos)
            .build()
            .is_ok());
    }

    #[test]
    fn test_external_dependencies_are_deduplicated() {
        let annotations = json!({"rollplan.io/external-dependency-s": "kind=Secret,name=creds"});
        let infos = vec![
            info(resource("Deployment", "a", annotations.clone()), ResourceInstallType::Create, false),
            info(resource("Deployment", "b", annotations), ResourceInstallType::Create, false),
        ];

        let plan = InstallPlanBuilder::new(DeployType::Install)
            .with_installable(&infos)
            .build()
            .expect("plan");

        let presence = ids_of(&plan, OperationType::TrackPresence);
        assert_eq!(presence.len(), 1);
        for create in ids_of(&plan, OperationType::Create) {
            assert!(plan.dag().has_path(&presence[0], &create));
        }
    }

    #[test]
    fn test_external_dependencies_differing_in_version_share_a_tracker() {
        let infos = vec![
            info(
                resource(
                    "Deployment",
                    "a",
                    json!({"rollplan.io/external-dependency-x": "kind=Deployment,group=apps,version=v1,name=db"}),
                ),
                ResourceInstallType::Create,
                false,
            ),
            info(
                resource(
                    "Deployment",
                    "b",
                    json!({"rollplan.io/external-dependency-x": "kind=Deployment,group=apps,version=v1beta2,name=db"}),
                ),
                ResourceInstallType::Create,
                false,
            ),
        ];

        let plan = InstallPlanBuilder::new(DeployType::Install)
            .with_installable(&infos)
            .build()
            .expect("plan");

        let presence = ids_of(&plan, OperationType::TrackPresence);
        assert_eq!(presence.len(), 1);
        let creates = ids_of(&plan, OperationType::Create);
        assert_eq!(creates.len(), 2);
        for create in &creates {
            assert!(plan.dag().has_path(&presence[0], create));
        }
    }

    #[test]
    fn test_recreate_waits_for_absence() {
        let job = resource("Deployment", "migrate", json!({"rollplan.io/delete-policy": "succeeded"}));
        let infos = vec![info(job, ResourceInstallType::Recreate, true)];

        let plan = InstallPlanBuilder::new(DeployType::Upgrade)
            .with_installable(&infos)
            .build()
            .expect("plan");

        let recreate = &ids_of(&plan, OperationType::Recreate)[0];
        let readiness = &ids_of(&plan, OperationType::TrackReadiness)[0];
        let deletes = ids_of(&plan, OperationType::Delete);
        let absences = ids_of(&plan, OperationType::TrackAbsence);
        assert_eq!(deletes.len(), 2);
        assert_eq!(absences.len(), 2);

        let pre_delete = deletes.iter().find(|id| id.ends_with(":before-recreate")).expect("pre delete");
        let pre_absence = absences.iter().find(|id| id.ends_with(":before-recreate")).expect("pre absence");
        let post_delete = deletes.iter().find(|id| *id != pre_delete).expect("post delete");

        assert!(plan.dag().has_edge(pre_delete, pre_absence));
        assert!(plan.dag().has_edge(pre_absence, recreate));
        assert!(plan.dag().has_edge(recreate, readiness));
        assert!(plan.dag().has_path(readiness, post_delete));
        assert!(matches!(
            plan.operation(pre_absence).map(|op| &op.config),
            Some(OperationConfig::TrackAbsence { timeout_secs: 120, before_recreate: true, .. })
        ));
    }

    #[test]
    fn test_iterations_are_chained() {
        let hook = resource("ConfigMap", "hook", json!({"rollplan.io/delete-policy": "succeeded"}));
        let mut second = info(hook.clone(), ResourceInstallType::Create, false);
        second.iteration = 1;
        let infos = vec![info(hook, ResourceInstallType::Create, false), second];

        let plan = InstallPlanBuilder::new(DeployType::Install)
            .with_installable(&infos)
            .build()
            .expect("plan");

        let creates = ids_of(&plan, OperationType::Create);
        assert_eq!(creates.len(), 2);
        let first_absence = ids_of(&plan, OperationType::TrackAbsence)
            .into_iter()
            .find(|id| id.contains("/0/"))
            .expect("iteration 0 absence");
        let second_create = creates.iter().find(|id| id.contains("/1/")).expect("iteration 1");
        assert!(plan.dag().has_edge(&first_absence, second_create));
    }

    #[test]
    fn test_deletions_land_in_uninstall_stage() {
        let meta = ResourceMeta::new("old", "prod", GroupVersionKind::new("", "v1", "ConfigMap"));
        let deletable = vec![
            DeletableResourceInfo {
                meta: meta.clone(),
                live: Some(json!({})),
                must_delete: true,
                must_track_absence: true,
            },
            DeletableResourceInfo {
                meta: ResourceMeta::new("kept", "prod", GroupVersionKind::new("", "v1", "ConfigMap")),
                live: Some(json!({})),
                must_delete: false,
                must_track_absence: false,
            },
        ];
        let infos = vec![info(resource("ConfigMap", "new", json!({})), ResourceInstallType::Create, false)];

        let plan = InstallPlanBuilder::new(DeployType::Upgrade)
            .with_installable(&infos)
            .with_deletable(&deletable)
            .build()
            .expect("plan");

        let deletes = ids_of(&plan, OperationType::Delete);
        assert_eq!(deletes.len(), 1);
        assert!(deletes[0].ends_with(&meta.id()));
        assert!(plan.dag().has_path(&ids_of(&plan, OperationType::Create)[0], &deletes[0]));
    }

    #[test]
    fn test_uninstall_release_operations() {
        let release = Release::new("web", "prod", 3, DeployType::Upgrade, Vec::new());
        let releases = vec![ReleaseInfo {
            release,
            transition: ReleaseTransition::Uninstall,
            must_fail_on_failed_deploy: false,
        }];

        let plan = InstallPlanBuilder::new(DeployType::Uninstall)
            .with_releases(&releases)
            .build()
            .expect("plan");

        let update = &ids_of(&plan, OperationType::UpdateRelease)[0];
        let delete = &ids_of(&plan, OperationType::DeleteRelease)[0];
        assert!(plan.dag().has_path(update, delete));
        assert!(matches!(
            plan.operation(update).map(|op| &op.config),
            Some(OperationConfig::UpdateRelease { release }) if release.status == ReleaseStatus::Uninstalling
        ));
    }
}
