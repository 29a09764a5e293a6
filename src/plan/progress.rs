//! Execution progress reporting.

use serde::Serialize;

use super::operation::{OperationCategory, OperationStatus};
use super::Plan;

/// Event emitted by the executor while a plan runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ProgressEvent {
    /// An operation was dispatched.
    Started {
        /// Operation ID.
        id: String,
        /// Human description.
        description: String,
    },
    /// An operation completed.
    Completed {
        /// Operation ID.
        id: String,
    },
    /// An operation failed.
    Failed {
        /// Operation ID.
        id: String,
        /// Error message.
        error: String,
    },
    /// The executor stopped.
    Finished {
        /// Final counts.
        snapshot: ProgressSnapshot,
    },
}

/// Operation counts by status, meta operations excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Operations counted.
    pub total: usize,
    /// Not started.
    pub unknown: usize,
    /// Running.
    pub pending: usize,
    /// Completed.
    pub completed: usize,
    /// Failed.
    pub failed: usize,
}

impl ProgressSnapshot {
    /// Counts the operations of a plan.
    #[must_use]
    pub fn of(plan: &Plan) -> Self {
        plan.operations()
            .filter(|op| op.category() != OperationCategory::Meta)
            .fold(Self::default(), |mut snapshot, op| {
                snapshot.total += 1;
                match op.status {
                    OperationStatus::Unknown => snapshot.unknown += 1,
                    OperationStatus::Pending => snapshot.pending += 1,
                    OperationStatus::Completed => snapshot.completed += 1,
                    OperationStatus::Failed => snapshot.failed += 1,
                }
                snapshot
            })
    }

    /// Percentage of terminal operations.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_done(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed + self.failed) as f64 * 100.0 / self.total as f64
    }
}
