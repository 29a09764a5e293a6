//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::artifact::{ChangeAction, PlanArtifact, ResourceChange};
use crate::config::{EngineConfig, ValidationResult};
use crate::plan::{Operation, OperationCategory, Plan};
use crate::release::{Release, ReleaseStatus};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Operation row for table display.
#[derive(Tabled)]
struct OperationRow {
    #[tabled(rename = "Step")]
    step: usize,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Target")]
    target: String,
}

/// Change row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Iteration")]
    iteration: u32,
}

/// Revision row for table display.
#[derive(Tabled)]
struct RevisionRow {
    #[tabled(rename = "Revision")]
    revision: u32,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Type")]
    deploy_type: String,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Resources")]
    resources: usize,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a loaded artifact and the plan it carries.
    #[must_use]
    pub fn format_artifact(&self, artifact: &PlanArtifact, plan: &Plan, show_diff: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&ArtifactJson::new(artifact, plan)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_artifact_text(artifact, plan, show_diff),
        }
    }

    fn format_artifact_text(artifact: &PlanArtifact, plan: &Plan, show_diff: bool) -> String {
        let mut output = String::new();
        let release = &artifact.release;

        let _ = writeln!(
            output,
            "\nPlan: {} {}/{} revision {}",
            artifact.deploy_type.to_string().bold(),
            release.namespace,
            release.name,
            release.revision
        );
        let _ = writeln!(output, "   Created: {}", artifact.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
        if let Some(expires_at) = artifact.expires_at() {
            let _ = writeln!(output, "   Expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        let _ = writeln!(
            output,
            "   Graph: {}\n",
            if artifact.is_encrypted() { "encrypted" } else { "plain" }
        );

        if plan.is_noop() {
            let _ = writeln!(output, "{} No changes required - release is up to date.", "✓".green());
            return output;
        }

        let rows = operation_rows(plan);
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if !artifact.changes.is_empty() {
            output.push('\n');
            let rows: Vec<ChangeRow> = artifact
                .changes
                .iter()
                .map(|c| ChangeRow {
                    action: Self::format_action(c.action),
                    resource: c.resource.clone(),
                    iteration: c.iteration,
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let _ = writeln!(output, "\n{}", Self::summary(&artifact.changes));

        if show_diff {
            for change in artifact.changes.iter().filter(|c| !c.diff.is_empty()) {
                let _ = writeln!(output, "\n{}", change.resource.bold());
                for line in change.diff.lines() {
                    let _ = writeln!(output, "{}", Self::color_diff_line(line));
                }
            }
        }

        output
    }

    /// Formats the dependency graph of a plan.
    #[must_use]
    pub fn format_graph(&self, plan: &Plan, dot: bool) -> String {
        if dot {
            return plan.to_dot();
        }
        match self.format {
            OutputFormat::Json => {
                let edges: Vec<EdgeJson> = plan
                    .dag()
                    .edges()
                    .into_iter()
                    .map(|(from, to)| EdgeJson { from, to })
                    .collect();
                serde_json::to_string_pretty(&edges).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                for (from, to) in plan.dag().edges() {
                    let _ = writeln!(output, "{from} {} {to}", "->".dimmed());
                }
                output
            }
        }
    }

    /// Formats the revision history of a release, newest first.
    #[must_use]
    pub fn format_history(&self, history: &[Release], max: usize) -> String {
        let mut recent: Vec<&Release> = history.iter().collect();
        recent.sort_by(|a, b| b.revision.cmp(&a.revision));
        recent.truncate(max);

        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&recent).unwrap_or_default(),
            OutputFormat::Text => {
                if recent.is_empty() {
                    return String::from("No revisions found.\n");
                }
                let rows: Vec<RevisionRow> = recent
                    .iter()
                    .map(|r| RevisionRow {
                        revision: r.revision,
                        status: Self::format_status(r.status),
                        deploy_type: r.deploy_type.to_string(),
                        updated: r.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                        resources: r.manifests.len(),
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats a validation result and a short configuration summary.
    #[must_use]
    pub fn format_validation(&self, config: &EngineConfig, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                    "config": config,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Configuration is valid!", "✓".green());
                } else {
                    let _ = writeln!(output, "{} Configuration is invalid:", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                if show_warnings && !result.warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                let _ = writeln!(output, "\nConfiguration summary:");
                let _ = writeln!(output, "   Parallelism: {}", config.parallelism);
                let _ = writeln!(output, "   Field manager: {}", config.field_manager);
                let _ = writeln!(
                    output,
                    "   Timeouts: readiness {}s, creation {}s, deletion {}s",
                    config.timeouts.readiness_secs, config.timeouts.creation_secs, config.timeouts.deletion_secs
                );
                let _ = writeln!(output, "   Release store: {}", config.release_store.path.display());
                output
            }
        }
    }

    fn summary(changes: &[ResourceChange]) -> String {
        let count = |action: ChangeAction| changes.iter().filter(|c| c.action == action).count();
        let updates = count(ChangeAction::Update) + count(ChangeAction::Apply);
        format!(
            "Changes: {} to create, {} to update, {} to recreate, {} to delete",
            count(ChangeAction::Create).to_string().green(),
            updates.to_string().yellow(),
            count(ChangeAction::Recreate).to_string().yellow(),
            count(ChangeAction::Delete).to_string().red()
        )
    }

    /// Formats a change action with color.
    fn format_action(action: ChangeAction) -> String {
        match action {
            ChangeAction::Create => "+create".green().to_string(),
            ChangeAction::Update => "~update".yellow().to_string(),
            ChangeAction::Apply => "~apply".yellow().to_string(),
            ChangeAction::Recreate => "±recreate".yellow().to_string(),
            ChangeAction::Delete => "-delete".red().to_string(),
        }
    }

    /// Formats a release status with color.
    fn format_status(status: ReleaseStatus) -> String {
        match status {
            ReleaseStatus::Deployed => "deployed".green().to_string(),
            ReleaseStatus::Pending | ReleaseStatus::Uninstalling => status.to_string().yellow().to_string(),
            ReleaseStatus::Failed => "failed".red().to_string(),
            ReleaseStatus::Superseded => "superseded".dimmed().to_string(),
        }
    }

    fn color_diff_line(line: &str) -> String {
        if line.starts_with("+++") || line.starts_with("---") {
            line.bold().to_string()
        } else if line.starts_with('+') {
            line.green().to_string()
        } else if line.starts_with('-') {
            line.red().to_string()
        } else if line.starts_with("@@") {
            line.cyan().to_string()
        } else {
            line.to_string()
        }
    }
}

/// Step of every operation: the length of the longest chain of
/// predecessors leading to it.
fn steps(plan: &Plan) -> HashMap<String, usize> {
    let dag = plan.dag();
    let mut remaining: HashMap<String, usize> = dag
        .predecessor_map()
        .into_iter()
        .map(|(id, preds)| (id, preds.len()))
        .collect();
    let mut queue: VecDeque<String> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| id.clone())
        .collect();
    let mut steps: HashMap<String, usize> = queue.iter().map(|id| (id.clone(), 0)).collect();

    while let Some(id) = queue.pop_front() {
        let step = steps.get(&id).copied().unwrap_or_default();
        for next in dag.successors(&id) {
            let entry = steps.entry(next.clone()).or_default();
            *entry = (*entry).max(step + 1);
            if let Some(count) = remaining.get_mut(&next) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    queue.push_back(next);
                }
            }
        }
    }
    steps
}

/// Non-meta operations grouped by step, renumbered from 1.
fn ordered_operations(plan: &Plan) -> Vec<(usize, &Operation)> {
    let steps = steps(plan);
    let mut by_step: BTreeMap<usize, Vec<&Operation>> = BTreeMap::new();
    for op in plan.operations().filter(|op| op.category() != OperationCategory::Meta) {
        let step = steps.get(&op.id()).copied().unwrap_or_default();
        by_step.entry(step).or_default().push(op);
    }

    by_step
        .into_values()
        .enumerate()
        .flat_map(|(index, mut ops)| {
            ops.sort_by_key(|op| op.id());
            ops.into_iter().map(move |op| (index + 1, op))
        })
        .collect()
}

fn operation_rows(plan: &Plan) -> Vec<OperationRow> {
    ordered_operations(plan)
        .into_iter()
        .map(|(step, op)| OperationRow {
            step,
            operation: op.operation_type().to_string(),
            target: op.to_string(),
        })
        .collect()
}

// JSON serialization helpers

#[derive(Serialize)]
struct EdgeJson {
    from: String,
    to: String,
}

#[derive(Serialize)]
struct ArtifactJson<'a> {
    release: &'a str,
    namespace: &'a str,
    revision: u32,
    deploy_type: String,
    created_at: String,
    expires_at: Option<String>,
    encrypted: bool,
    operations: Vec<OperationJson>,
    changes: &'a [ResourceChange],
}

#[derive(Serialize)]
struct OperationJson {
    step: usize,
    id: String,
    description: String,
}

impl<'a> ArtifactJson<'a> {
    fn new(artifact: &'a PlanArtifact, plan: &Plan) -> Self {
        Self {
            release: &artifact.release.name,
            namespace: &artifact.release.namespace,
            revision: artifact.release.revision,
            deploy_type: artifact.deploy_type.to_string(),
            created_at: artifact.created_at.to_rfc3339(),
            expires_at: artifact.expires_at().map(|t| t.to_rfc3339()),
            encrypted: artifact.is_encrypted(),
            operations: ordered_operations(plan)
                .into_iter()
                .map(|(step, op)| OperationJson {
                    step,
                    id: op.id(),
                    description: op.to_string(),
                })
                .collect(),
            changes: &artifact.changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Boundary, Stage};
    use crate::release::DeployType;

    fn chain_plan() -> Plan {
        let mut plan = Plan::new();
        let release = Release::new("web", "prod", 1, DeployType::Install, Vec::new());
        let start = plan
            .add_operation(Operation::boundary(Stage::Init, None, Boundary::Start))
            .expect("start");
        let create = plan
            .add_operation(Operation::new(
                crate::plan::OperationConfig::CreateRelease {
                    release: release.clone(),
                    fail_on_failed_deploy: true,
                },
                0,
            ))
            .expect("create");
        let update = plan
            .add_operation(Operation::new(
                crate::plan::OperationConfig::UpdateRelease {
                    release: release.with_status(ReleaseStatus::Deployed),
                },
                0,
            ))
            .expect("update");
        plan.connect(&start, &create).expect("edge");
        plan.connect(&create, &update).expect("edge");
        plan
    }

    #[test]
    fn test_steps_skip_meta_operations() {
        let plan = chain_plan();
        let ordered = ordered_operations(&plan);

        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0].0, 1);
        assert_eq!(ordered[1].0, 2);
        assert!(ordered[0].1.to_string().starts_with("create release"));
    }

    #[test]
    fn test_history_is_newest_first_and_truncated() {
        let history: Vec<Release> = (1..=4)
            .map(|rev| Release::new("web", "prod", rev, DeployType::Upgrade, Vec::new()))
            .collect();
        let formatter = OutputFormatter::new(OutputFormat::Json);

        let output = formatter.format_history(&history, 2);
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&output).expect("json");
        let revisions: Vec<u64> = parsed.iter().filter_map(|r| r["revision"].as_u64()).collect();
        assert_eq!(revisions, vec![4, 3]);
    }

    #[test]
    fn test_graph_edge_list() {
        let plan = chain_plan();
        let formatter = OutputFormatter::new(OutputFormat::Json);

        let parsed: Vec<serde_json::Value> =
            serde_json::from_str(&formatter.format_graph(&plan, false)).expect("json");
        assert_eq!(parsed.len(), 2);
        assert!(formatter.format_graph(&plan, true).starts_with("digraph plan"));
    }

    #[test]
    fn test_validation_text_lists_errors() {
        colored::control::set_override(false);
        let result = ValidationResult {
            errors: vec![crate::config::ValidationError {
                field: String::from("field_manager"),
                message: String::from("bad"),
            }],
            warnings: Vec::new(),
        };
        let formatter = OutputFormatter::new(OutputFormat::Text);

        let output = formatter.format_validation(&EngineConfig::default(), &result, true);
        assert!(output.contains("Configuration is invalid"));
        assert!(output.contains("field_manager: bad"));
    }
}
