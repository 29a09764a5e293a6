//! Remediation plans for failed executions.

use std::collections::{BTreeMap, HashSet};
use tracing::info;

use crate::cluster::PropagationPolicy;
use crate::error::PlanError;
use crate::release::ReleaseStatus;

use super::builder::{add_anchored, add_stage_line, anchors, connect, TrackingTimeouts};
use super::operation::{Operation, OperationConfig, OperationStatus};
use super::stage::Stage;
use super::Plan;

/// Builds the plan that cleans up after a failed execution.
///
/// Resources whose readiness tracking failed and that ask for deletion on
/// failure are deleted, unless a delete of the same resource already
/// completed. Releases created with `fail_on_failed_deploy` are marked
/// failed.
///
/// # Errors
///
/// Returns `PlanError::Insert` if the remediation graph cannot be built.
pub fn build_failure_plan(executed: &Plan, timeouts: TrackingTimeouts) -> Result<Plan, PlanError> {
    let mut plan = Plan::new();
    add_stage_line(&mut plan, Stage::remediation_sequence(), &BTreeMap::new())?;

    let deleted: HashSet<String> = executed
        .operations()
        .filter(|op| op.status == OperationStatus::Completed)
        .filter_map(|op| match &op.config {
            OperationConfig::DeleteResource {
                meta,
                before_recreate: false,
                ..
            } => Some(meta.id()),
            _ => None,
        })
        .collect();

    for op in executed.operations() {
        match &op.config {
            OperationConfig::TrackReadiness {
                meta,
                delete_on_failed: true,
                ..
            } if op.status == OperationStatus::Failed && !deleted.contains(&meta.id()) => {
                let delete = plan.add_operation(Operation::new(
                    OperationConfig::DeleteResource {
                        meta: meta.clone(),
                        propagation: PropagationPolicy::Foreground,
                        before_recreate: false,
                    },
                    op.iteration,
                ))?;
                let absence = plan.add_operation(Operation::new(
                    OperationConfig::TrackAbsence {
                        meta: meta.clone(),
                        timeout_secs: timeouts.deletion_secs,
                        before_recreate: false,
                    },
                    op.iteration,
                ))?;
                let (start, end) = anchors(Stage::Uninstall, None);
                connect(&mut plan, &start, &delete)?;
                connect(&mut plan, &delete, &absence)?;
                connect(&mut plan, &absence, &end)?;
            }
            OperationConfig::CreateRelease {
                release,
                fail_on_failed_deploy: true,
            } if op.status == OperationStatus::Completed => {
                add_anchored(
                    &mut plan,
                    Stage::Final,
                    OperationConfig::UpdateRelease {
                        release: release.with_status(ReleaseStatus::Failed),
                    },
                )?;
            }
            _ => {}
        }
    }

    plan.optimize().map_err(|source| PlanError::Insert {
        operation: String::from("plan optimization"),
        source,
    })?;

    info!("Built failure plan: {} operations", plan.len());
    Ok(plan)
}
