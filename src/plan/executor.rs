//! Concurrent plan execution.
//!
//! Operations run as soon as all their predecessors completed, with at most
//! `parallelism` workers in flight. The first failure cancels the shared
//! [`CancelScope`]: no new operation is dispatched, running trackers stop,
//! and the executor drains the workers before returning.

use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cancel::CancelScope;
use crate::cluster::{ClusterClient, PropagationPolicy, TrackerFactory};
use crate::error::{ClusterError, ExecutionError, Result, RollplanError};
use crate::release::{Release, ReleaseStore};
use crate::resource::ResourceMeta;

use super::operation::{Operation, OperationCategory, OperationConfig, OperationStatus};
use super::progress::{ProgressEvent, ProgressSnapshot};
use super::Plan;

/// Default number of operations run at once.
pub const DEFAULT_PARALLELISM: usize = 10;

/// Result of one plan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Final operation counts.
    pub snapshot: ProgressSnapshot,
    /// Wall-clock duration.
    pub duration: Duration,
}

/// Collaborators the operations act on.
struct Services {
    client: Arc<dyn ClusterClient>,
    trackers: Arc<dyn TrackerFactory>,
    releases: Arc<dyn ReleaseStore>,
}

/// Runs plans against a cluster and a release store.
pub struct PlanExecutor {
    services: Arc<Services>,
    parallelism: usize,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl PlanExecutor {
    /// Creates an executor with the default parallelism.
    #[must_use]
    pub fn new(
        client: Arc<dyn ClusterClient>,
        trackers: Arc<dyn TrackerFactory>,
        releases: Arc<dyn ReleaseStore>,
    ) -> Self {
        Self {
            services: Arc::new(Services {
                client,
                trackers,
                releases,
            }),
            parallelism: DEFAULT_PARALLELISM,
            progress: None,
        }
    }

    /// Sets the worker limit (at least one).
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Sends progress events to a channel.
    #[must_use]
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Executes a plan, recording each operation's status in it.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::OperationFailed` for the first failed
    /// operation, `ExecutionError::WorkerPanicked` if a worker died, and
    /// `ExecutionError::Stalled` if operations remain that can never run.
    pub async fn execute(&self, plan: &mut Plan) -> Result<ExecutionSummary> {
        let started = Instant::now();
        info!(
            "Executing plan: {} operations, parallelism {}",
            plan.len(),
            self.parallelism
        );

        let mut blocked: HashMap<String, HashSet<String>> = plan.dag().predecessor_map();
        let mut initial: Vec<String> = blocked
            .iter()
            .filter(|(_, preds)| preds.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        initial.sort();
        for id in &initial {
            blocked.remove(id);
        }
        let mut ready: VecDeque<String> = initial.into();

        let cancel = CancelScope::new();
        let mut workers: JoinSet<(String, Result<()>)> = JoinSet::new();
        let mut failure: Option<(String, RollplanError)> = None;
        let mut panicked: Option<String> = None;

        loop {
            while failure.is_none() && panicked.is_none() && workers.len() < self.parallelism {
                let Some(id) = ready.pop_front() else {
                    break;
                };
                let Some(op) = plan.operation(&id).cloned() else {
                    continue;
                };

                if op.category() == OperationCategory::Meta {
                    plan.set_status(&id, OperationStatus::Completed);
                    unblock(plan, &id, &mut blocked, &mut ready);
                    continue;
                }

                debug!("Dispatching {}", op);
                plan.set_status(&id, OperationStatus::Pending);
                self.emit(ProgressEvent::Started {
                    id: id.clone(),
                    description: op.config.describe(),
                });

                let services = Arc::clone(&self.services);
                let scope = cancel.clone();
                workers.spawn(async move {
                    let result = run_operation(&services, &op, &scope).await;
                    (id, result)
                });
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };

            match joined {
                Ok((id, Ok(()))) => {
                    debug!("Completed {}", id);
                    plan.set_status(&id, OperationStatus::Completed);
                    self.emit(ProgressEvent::Completed { id: id.clone() });
                    unblock(plan, &id, &mut blocked, &mut ready);
                }
                Ok((id, Err(e))) => {
                    plan.set_status(&id, OperationStatus::Failed);
                    self.emit(ProgressEvent::Failed {
                        id: id.clone(),
                        error: e.to_string(),
                    });
                    if e.is_cancellation() {
                        debug!("Operation {} stopped: {}", id, e);
                    } else if failure.is_none() {
                        error!("Operation {} failed: {}", id, e);
                        cancel.cancel(format!("operation {id} failed"));
                        failure = Some((id, e));
                    } else {
                        warn!("Operation {} also failed: {}", id, e);
                    }
                }
                Err(join_error) => {
                    error!("Worker task died: {}", join_error);
                    cancel.cancel("worker task died");
                    panicked.get_or_insert_with(|| join_error.to_string());
                }
            }
        }

        // Only a dead worker leaves operations pending.
        let orphaned: Vec<String> = plan
            .operations()
            .filter(|op| op.status == OperationStatus::Pending)
            .map(Operation::id)
            .collect();
        for id in &orphaned {
            plan.set_status(id, OperationStatus::Failed);
        }

        let snapshot = ProgressSnapshot::of(plan);
        self.emit(ProgressEvent::Finished { snapshot });
        let summary = ExecutionSummary {
            snapshot,
            duration: started.elapsed(),
        };

        if let Some(message) = panicked {
            return Err(ExecutionError::WorkerPanicked { message }.into());
        }
        if let Some((operation, source)) = failure {
            return Err(ExecutionError::OperationFailed {
                operation,
                source: Box::new(source),
            }
            .into());
        }
        if !blocked.is_empty() {
            return Err(ExecutionError::Stalled {
                remaining: blocked.len(),
            }
            .into());
        }

        info!(
            "Plan executed: {} operations completed in {:.1}s",
            snapshot.completed,
            summary.duration.as_secs_f64()
        );
        Ok(summary)
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.progress {
            // receiver gone
            let _ = sender.send(event);
        }
    }
}

/// Removes a completed operation from its successors' predecessor sets and
/// queues the successors that became runnable.
fn unblock(
    plan: &Plan,
    id: &str,
    blocked: &mut HashMap<String, HashSet<String>>,
    ready: &mut VecDeque<String>,
) {
    for successor in plan.dag().successors(id) {
        let runnable = blocked.get_mut(&successor).is_some_and(|preds| {
            preds.remove(id);
            preds.is_empty()
        });
        if runnable {
            blocked.remove(&successor);
            ready.push_back(successor);
        }
    }
}

async fn run_operation(services: &Services, op: &Operation, cancel: &CancelScope) -> Result<()> {
    if let Some(cause) = cancel.cause() {
        return Err(ClusterError::Cancelled { cause }.into());
    }

    match &op.config {
        OperationConfig::CreateResource { spec } | OperationConfig::RecreateResource { spec } => {
            services.client.create(spec).await?;
        }
        OperationConfig::UpdateResource { spec } | OperationConfig::ApplyResource { spec, .. } => {
            services.client.apply(spec, false).await?;
        }
        OperationConfig::DeleteResource { meta, propagation, .. } => {
            delete_if_present(services, meta, *propagation).await?;
        }
        OperationConfig::TrackReadiness {
            meta,
            timeout_secs,
            policy,
            ..
        } => {
            services
                .trackers
                .readiness(meta, Duration::from_secs(*timeout_secs), policy)
                .track(cancel)
                .await?;
        }
        OperationConfig::TrackPresence { meta, timeout_secs } => {
            services
                .trackers
                .presence(meta, Duration::from_secs(*timeout_secs))
                .track(cancel)
                .await?;
        }
        OperationConfig::TrackAbsence { meta, timeout_secs, .. } => {
            services
                .trackers
                .absence(meta, Duration::from_secs(*timeout_secs))
                .track(cancel)
                .await?;
        }
        OperationConfig::CreateRelease { release, .. } => {
            services.releases.create_release(&touched(release)).await?;
        }
        OperationConfig::UpdateRelease { release } => {
            services.releases.update_release(&touched(release)).await?;
        }
        OperationConfig::DeleteRelease {
            name,
            namespace,
            revision,
        } => {
            services.releases.delete_release(name, namespace, *revision).await?;
        }
        OperationConfig::Noop { .. } => {}
    }
    Ok(())
}

async fn delete_if_present(
    services: &Services,
    meta: &ResourceMeta,
    propagation: PropagationPolicy,
) -> Result<()> {
    match services.client.delete(meta, propagation).await {
        Err(e) if e.is_not_found() => {
            debug!("{} already gone", meta.id_human());
            Ok(())
        }
        other => other.map_err(Into::into),
    }
}

fn touched(release: &Release) -> Release {
    let mut release = release.clone();
    release.updated_at = Utc::now();
    release
}
