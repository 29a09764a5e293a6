//! Resource decision engine.
//!
//! This module provides:
//! - Install verdicts for desired resources and deletion decisions for
//!   obsolete ones
//! - Managed-field migration before dry-runs
//! - Object normalization, redaction and diffs

pub mod engine;
pub mod info;
pub mod managed_fields;
pub mod normalize;

pub use engine::{decide, DecisionEngine, DecisionOptions, DryApplyOutcome, Observation};
pub use info::{
    DeletableResourceInfo, InstallableResourceInfo, ResourceInstallType, StagedResource,
};
pub use managed_fields::FieldManagerOptions;
