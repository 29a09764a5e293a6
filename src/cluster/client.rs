//! Cluster API client interface.
//!
//! The engine never talks to a concrete control plane; it consumes this
//! trait. Implementations own their transport, authentication and field
//! manager name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ClusterError;
use crate::resource::{ResourceMeta, ResourceSpec};

/// How dependents are handled when a resource is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagationPolicy {
    /// Dependents are deleted before the owner disappears.
    #[default]
    Foreground,
    /// The owner disappears first, dependents are collected later.
    Background,
    /// Dependents are left behind.
    Orphan,
}

impl fmt::Display for PropagationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Foreground => write!(f, "Foreground"),
            Self::Background => write!(f, "Background"),
            Self::Orphan => write!(f, "Orphan"),
        }
    }
}

/// Operations the engine needs from the cluster control plane.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Reads the live object.
    ///
    /// Returns `ClusterError::NotFound` or `ClusterError::NoSuchKind` when the
    /// resource does not exist.
    async fn get(&self, meta: &ResourceMeta) -> Result<serde_json::Value, ClusterError>;

    /// Server-side applies the desired object. With `dry_run` nothing is
    /// persisted and the would-be result is returned.
    async fn apply(
        &self,
        spec: &ResourceSpec,
        dry_run: bool,
    ) -> Result<serde_json::Value, ClusterError>;

    /// Creates the object; fails if it already exists.
    async fn create(&self, spec: &ResourceSpec) -> Result<serde_json::Value, ClusterError>;

    /// Deletes the object.
    async fn delete(
        &self,
        meta: &ResourceMeta,
        propagation: PropagationPolicy,
    ) -> Result<(), ClusterError>;

    /// Sends a JSON merge patch.
    async fn merge_patch(
        &self,
        meta: &ResourceMeta,
        patch: &serde_json::Value,
    ) -> Result<serde_json::Value, ClusterError>;
}
