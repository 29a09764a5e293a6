//! Deployment plans.
//!
//! This module provides:
//! - The operation model and the plan DAG
//! - Graph optimization
//! - Plan builders for installs and failure remediation
//! - The concurrent plan executor

pub mod builder;
pub mod dag;
pub mod executor;
pub mod failure;
pub mod operation;
pub mod optimize;
pub mod progress;
pub mod stage;

use std::fmt::Write as _;

use crate::error::{GraphError, PlanError};

pub use builder::InstallPlanBuilder;
pub use dag::{Dag, Vertex};
pub use executor::{ExecutionSummary, PlanExecutor};
pub use failure::build_failure_plan;
pub use operation::{
    Boundary, Operation, OperationCategory, OperationConfig, OperationStatus, OperationType,
};
pub use progress::{ProgressEvent, ProgressSnapshot};
pub use stage::Stage;

/// A DAG of operations. An edge `a -> b` means `b` starts only after `a`
/// completed.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    dag: Dag<Operation>,
}

impl Plan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing graph.
    #[must_use]
    pub const fn from_dag(dag: Dag<Operation>) -> Self {
        Self { dag }
    }

    /// Inserts an operation and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::Insert` if a different operation has the same ID.
    pub fn add_operation(&mut self, operation: Operation) -> Result<String, PlanError> {
        let id = operation.id();
        let description = operation.config.describe();
        self.dag
            .add_vertex(operation)
            .map_err(|source| PlanError::Insert {
                operation: description,
                source,
            })?;
        Ok(id)
    }

    /// Orders `to` after `from`.
    ///
    /// # Errors
    ///
    /// Returns a graph error for unknown IDs or if the edge would close a cycle.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        self.dag.add_edge(from, to)
    }

    /// Returns the operation with this ID.
    #[must_use]
    pub fn operation(&self, id: &str) -> Option<&Operation> {
        self.dag.vertex(id)
    }

    /// All operations in insertion order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.dag.vertices()
    }

    /// Sets the status of an operation. Terminal statuses are never left.
    pub fn set_status(&mut self, id: &str, status: OperationStatus) {
        if let Some(op) = self.dag.vertex_mut(id)
            && !op.status.is_terminal()
        {
            op.status = status;
        }
    }

    /// Underlying graph.
    #[must_use]
    pub const fn dag(&self) -> &Dag<Operation> {
        &self.dag
    }

    /// Number of operations, boundaries included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dag.len()
    }

    /// Returns true if the plan has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dag.is_empty()
    }

    /// Returns true if the plan contains only ordering operations.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.operations().all(|op| op.category() == OperationCategory::Meta)
    }

    /// Runs transitive reduction and boundary squashing to a fixed point.
    ///
    /// # Errors
    ///
    /// Returns a graph error only if the graph invariants were already broken.
    pub fn optimize(&mut self) -> Result<(), GraphError> {
        optimize::optimize(&mut self.dag).map(|_| ())
    }

    /// Renders the plan in Graphviz DOT format.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph plan {\n  rankdir=LR;\n");
        let mut ids: Vec<String> = self.operations().map(Operation::id).collect();
        ids.sort();
        for id in &ids {
            let shape = match self.operation(id).map(Operation::category) {
                Some(OperationCategory::Meta) => "point",
                _ => "box",
            };
            let _ = writeln!(dot, "  \"{id}\" [shape={shape}];");
        }
        for (from, to) in self.dag.edges() {
            let _ = writeln!(dot, "  \"{from}\" -> \"{to}\";");
        }
        dot.push_str("}\n");
        dot
    }
}
