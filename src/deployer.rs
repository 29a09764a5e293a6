//! End-to-end release deployments.
//!
//! The deployer wires the engine together for one release: it locks the
//! release, reads its history, decides every resource, builds and executes
//! the plan, and runs the remediation plan when execution fails.

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::artifact::{build_changes, PlanArtifact, ResourceChange};
use crate::cluster::{ClusterClient, TrackerFactory};
use crate::config::EngineConfig;
use crate::decision::{
    DecisionEngine, DecisionOptions, DeletableResourceInfo, FieldManagerOptions, InstallableResourceInfo,
    StagedResource,
};
use crate::error::{ReleaseError, Result};
use crate::plan::builder::TrackingTimeouts;
use crate::plan::{build_failure_plan, InstallPlanBuilder, Plan, PlanExecutor, ProgressEvent, ProgressSnapshot};
use crate::release::{
    generate_holder_id, last_deployed, latest, DeployType, Release, ReleaseInfo, ReleaseStatus, ReleaseStore,
    ReleaseTransition,
};
use crate::resource::{Resource, ResourceMeta};

/// Where and how to save plan artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactOptions {
    /// Output file.
    pub path: PathBuf,
    /// Validity window in seconds.
    pub lifetime_secs: u64,
    /// Passphrase encrypting the graph section.
    pub key: Option<String>,
}

/// Deployment settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    /// Operations run at once.
    pub parallelism: usize,
    /// Tracking timeouts.
    pub timeouts: TrackingTimeouts,
    /// Field manager reconciliation.
    pub field_manager: FieldManagerOptions,
    /// Save an artifact of every built plan.
    pub artifact: Option<ArtifactOptions>,
    /// Build (and save) plans without executing them.
    pub plan_only: bool,
}

impl From<&EngineConfig> for DeployOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            parallelism: config.parallelism,
            timeouts: TrackingTimeouts {
                readiness_secs: config.timeouts.readiness_secs,
                creation_secs: config.timeouts.creation_secs,
                deletion_secs: config.timeouts.deletion_secs,
            },
            field_manager: FieldManagerOptions {
                field_manager: config.field_manager.clone(),
                discard_manual_changes: config.discard_manual_changes,
            },
            artifact: config.artifact.path.clone().map(|path| ArtifactOptions {
                path,
                lifetime_secs: config.artifact.lifetime_secs,
                key: config.artifact.key(),
            }),
            plan_only: false,
        }
    }
}

/// Outcome of a deployment.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    /// Release name.
    pub release: String,
    /// Release namespace.
    pub namespace: String,
    /// Revision written by this deployment.
    pub revision: u32,
    /// Deploy type.
    pub deploy_type: DeployType,
    /// Planned resource changes.
    pub changes: Vec<ResourceChange>,
    /// Operation counts, `None` when the plan was not executed.
    pub executed: Option<ProgressSnapshot>,
    /// Saved artifact.
    pub artifact: Option<PathBuf>,
}

/// Deploys, rolls back and uninstalls releases.
pub struct Deployer {
    client: Arc<dyn ClusterClient>,
    trackers: Arc<dyn TrackerFactory>,
    releases: Arc<dyn ReleaseStore>,
    options: DeployOptions,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
    holder: String,
}

/// Everything a plan is built from.
struct PlanInputs {
    deploy_type: DeployType,
    release: Release,
    installable: Vec<InstallableResourceInfo>,
    deletable: Vec<DeletableResourceInfo>,
    releases: Vec<ReleaseInfo>,
}

impl Deployer {
    /// Creates a deployer.
    #[must_use]
    pub fn new(
        client: Arc<dyn ClusterClient>,
        trackers: Arc<dyn TrackerFactory>,
        releases: Arc<dyn ReleaseStore>,
        options: DeployOptions,
    ) -> Self {
        Self {
            client,
            trackers,
            releases,
            options,
            progress: None,
            holder: generate_holder_id(),
        }
    }

    /// Forwards execution progress to a channel.
    #[must_use]
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Installs or upgrades a release to the given objects.
    ///
    /// # Errors
    ///
    /// Returns lock, manifest, decision, planning and execution errors. On
    /// execution failure the remediation plan runs before the error returns.
    pub async fn deploy(&self, name: &str, namespace: &str, manifests: Vec<Value>) -> Result<DeployReport> {
        self.locked(name, namespace, async {
            let history = self.releases.releases(name, namespace).await?;
            let deploy_type = if last_deployed(&history).is_some() {
                DeployType::Upgrade
            } else {
                DeployType::Install
            };
            self.deploy_revision(name, namespace, manifests, deploy_type, &history)
                .await
        })
        .await
    }

    /// Redeploys the objects of an earlier revision as a new revision.
    ///
    /// Without an explicit revision, the last successful revision before
    /// the current one is used.
    ///
    /// # Errors
    ///
    /// Returns `ReleaseError::NotFound` if there is nothing to roll back to,
    /// and the errors of [`Self::deploy`].
    pub async fn rollback(&self, name: &str, namespace: &str, revision: Option<u32>) -> Result<DeployReport> {
        self.locked(name, namespace, async {
            let history = self.releases.releases(name, namespace).await?;
            let current = last_deployed(&history).map_or(u32::MAX, |r| r.revision);

            let target = match revision {
                Some(revision) => history.iter().find(|r| r.revision == revision),
                None => history
                    .iter()
                    .rev()
                    .find(|r| r.revision < current && r.status == ReleaseStatus::Superseded),
            }
            .ok_or_else(|| ReleaseError::NotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
                revision: revision.unwrap_or(0),
            })?;

            info!("Rolling back {namespace}/{name} to revision {}", target.revision);
            self.deploy_revision(name, namespace, target.manifests.clone(), DeployType::Rollback, &history)
                .await
        })
        .await
    }

    /// Removes a release: runs delete hooks, deletes its resources and
    /// drops its history.
    ///
    /// # Errors
    ///
    /// Returns `ReleaseError::NotFound` for an unknown release, and the
    /// errors of [`Self::deploy`].
    pub async fn uninstall(&self, name: &str, namespace: &str) -> Result<DeployReport> {
        self.locked(name, namespace, async {
            let history = self.releases.releases(name, namespace).await?;
            let current = latest(&history).ok_or_else(|| ReleaseError::NotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
                revision: 0,
            })?;
            let source = last_deployed(&history).unwrap_or(current);

            let resources = parse_resources(&source.manifests, namespace)?;
            let staged = staged_resources(&resources, DeployType::Uninstall);
            let obsolete: Vec<ResourceMeta> = resources
                .iter()
                .filter(|r| !r.policy.is_hook())
                .map(|r| r.meta().clone())
                .collect();

            let engine = self.decision_engine(false);
            let installable = engine.build_installable_infos(&staged).await?;
            let deletable = engine.build_deletable_infos(&obsolete).await?;

            let releases = history
                .iter()
                .map(|r| ReleaseInfo {
                    release: r.clone(),
                    transition: if r.revision == current.revision {
                        ReleaseTransition::Uninstall
                    } else {
                        ReleaseTransition::Delete
                    },
                    must_fail_on_failed_deploy: false,
                })
                .collect();

            self.run(PlanInputs {
                deploy_type: DeployType::Uninstall,
                release: current.clone(),
                installable,
                deletable,
                releases,
            })
            .await
        })
        .await
    }

    async fn locked<T>(&self, name: &str, namespace: &str, work: impl Future<Output = Result<T>>) -> Result<T> {
        let lock = self.releases.acquire_lock(name, namespace, &self.holder).await?;
        debug!("Acquired lock {} on {namespace}/{name}", lock.lock_id);

        let result = work.await;

        if let Err(e) = self.releases.release_lock(name, namespace, &lock.lock_id).await {
            warn!("Failed to release lock on {namespace}/{name}: {e}");
        }
        result
    }

    fn decision_engine(&self, previous_release_failed: bool) -> DecisionEngine {
        DecisionEngine::new(
            Arc::clone(&self.client),
            DecisionOptions {
                field_manager: self.options.field_manager.clone(),
                previous_release_failed,
            },
        )
    }

    async fn deploy_revision(
        &self,
        name: &str,
        namespace: &str,
        manifests: Vec<Value>,
        deploy_type: DeployType,
        history: &[Release],
    ) -> Result<DeployReport> {
        let revision = latest(history).map_or(1, |r| r.revision + 1);
        let previous = last_deployed(history);
        let previous_failed = latest(history).is_some_and(|r| r.status == ReleaseStatus::Failed);
        info!("Deploying {namespace}/{name} revision {revision} ({deploy_type})");

        let resources = parse_resources(&manifests, namespace)?;
        let staged = staged_resources(&resources, deploy_type);

        let obsolete = match previous {
            Some(previous) => parse_resources(&previous.manifests, namespace)?
                .into_iter()
                .filter(|old| {
                    !old.policy.is_hook() && !resources.iter().any(|r| r.meta().same_resource(old.meta()))
                })
                .map(|old| old.spec.meta)
                .collect(),
            None => Vec::new(),
        };

        let engine = self.decision_engine(previous_failed);
        let installable = engine.build_installable_infos(&staged).await?;
        let deletable = engine.build_deletable_infos(&obsolete).await?;

        let release = Release::new(name, namespace, revision, deploy_type, manifests);
        let transition = match deploy_type {
            DeployType::Install => ReleaseTransition::Install,
            DeployType::Rollback => ReleaseTransition::Rollback,
            DeployType::Upgrade | DeployType::Uninstall => ReleaseTransition::Upgrade,
        };
        let mut releases = vec![ReleaseInfo {
            release: release.clone(),
            transition,
            must_fail_on_failed_deploy: true,
        }];
        if let Some(previous) = previous {
            releases.push(ReleaseInfo {
                release: previous.clone(),
                transition: ReleaseTransition::Supersede,
                must_fail_on_failed_deploy: false,
            });
        }

        self.run(PlanInputs {
            deploy_type,
            release,
            installable,
            deletable,
            releases,
        })
        .await
    }

    async fn run(&self, inputs: PlanInputs) -> Result<DeployReport> {
        let mut plan = InstallPlanBuilder::new(inputs.deploy_type)
            .with_installable(&inputs.installable)
            .with_deletable(&inputs.deletable)
            .with_releases(&inputs.releases)
            .with_timeouts(self.options.timeouts)
            .build()?;
        let changes = build_changes(&inputs.installable, &inputs.deletable);

        let mut report = DeployReport {
            release: inputs.release.name.clone(),
            namespace: inputs.release.namespace.clone(),
            revision: inputs.release.revision,
            deploy_type: inputs.deploy_type,
            changes,
            executed: None,
            artifact: None,
        };

        if let Some(options) = &self.options.artifact {
            let mut artifact =
                PlanArtifact::new(&inputs.release, inputs.deploy_type, &plan, report.changes.clone())
                    .with_lifetime(options.lifetime_secs);
            if let Some(key) = &options.key {
                artifact = artifact.encrypt(key)?;
            }
            artifact.save(&options.path).await?;
            report.artifact = Some(options.path.clone());
        }

        if self.options.plan_only {
            info!("Plan built with {} operations, not executing", plan.len());
            return Ok(report);
        }

        let summary = self.execute(&mut plan).await?;
        report.executed = Some(summary);
        info!(
            "Release {}/{} revision {} done: {} operations",
            report.namespace, report.release, report.revision, summary.completed
        );
        Ok(report)
    }

    async fn execute(&self, plan: &mut Plan) -> Result<ProgressSnapshot> {
        let executor = self.executor();
        match executor.execute(plan).await {
            Ok(summary) => Ok(summary.snapshot),
            Err(failure) => {
                error!("Plan execution failed: {failure}");
                self.remediate(plan).await;
                Err(failure)
            }
        }
    }

    /// Runs the remediation plan of a failed execution. Its own failures are
    /// logged; the original error is what the caller sees.
    async fn remediate(&self, executed: &Plan) {
        let mut remediation = match build_failure_plan(executed, self.options.timeouts) {
            Ok(plan) => plan,
            Err(e) => {
                error!("Failed to build remediation plan: {e}");
                return;
            }
        };
        if remediation.is_empty() {
            debug!("Nothing to remediate");
            return;
        }

        warn!("Running remediation plan with {} operations", remediation.len());
        if let Err(e) = self.executor().execute(&mut remediation).await {
            error!("Remediation failed: {e}");
        }
    }

    fn executor(&self) -> PlanExecutor {
        let executor = PlanExecutor::new(
            Arc::clone(&self.client),
            Arc::clone(&self.trackers),
            Arc::clone(&self.releases),
        )
        .with_parallelism(self.options.parallelism);
        match &self.progress {
            Some(sender) => executor.with_progress(sender.clone()),
            None => executor,
        }
    }
}

fn parse_resources(manifests: &[Value], namespace: &str) -> Result<Vec<Resource>> {
    manifests
        .iter()
        .map(|object| Resource::from_object(object.clone(), namespace, "").map_err(Into::into))
        .collect()
}

/// Places resources in their stages, in stage order. The sort is stable, so
/// resources keep their input order within a stage.
fn staged_resources(resources: &[Resource], deploy_type: DeployType) -> Vec<StagedResource> {
    let mut staged: Vec<StagedResource> = resources
        .iter()
        .flat_map(|resource| {
            resource.stages(deploy_type).into_iter().map(|stage| StagedResource {
                resource: resource.clone(),
                stage,
            })
        })
        .collect();
    staged.sort_by_key(|s| s.stage);
    staged
}
