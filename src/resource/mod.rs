//! Managed resources and their deployment policy.
//!
//! This module provides:
//! - Resource identity (`ResourceMeta`, `GroupVersionKind`)
//! - Desired resources parsed from unstructured objects
//! - Annotation-driven deployment policy
//! - The internal/external dependency model

pub mod dependency;
pub mod meta;
pub mod policy;
pub mod spec;

pub use dependency::{
    DependencyState, ExternalDependency, InternalDependency, ResourceMatcher,
};
pub use meta::{GroupVersionKind, ResourceMeta};
pub use policy::{HookPhase, ReadinessPolicy, ResourcePolicy};
pub use spec::{Resource, ResourceSpec};
