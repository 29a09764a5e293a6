//! Release history storage interface.

use async_trait::async_trait;

use crate::error::Result;

use super::lock::LockInfo;
use super::types::Release;

/// Storage of release revisions.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Stores a new revision; fails if it already exists.
    async fn create_release(&self, release: &Release) -> Result<()>;

    /// Overwrites an existing revision.
    async fn update_release(&self, release: &Release) -> Result<()>;

    /// Deletes a revision. Deleting a missing revision is not an error.
    async fn delete_release(&self, name: &str, namespace: &str, revision: u32) -> Result<()>;

    /// Returns every revision of a release, ordered by revision.
    async fn releases(&self, name: &str, namespace: &str) -> Result<Vec<Release>>;

    /// Locks a release for one deployment.
    async fn acquire_lock(&self, name: &str, namespace: &str, holder: &str) -> Result<LockInfo>;

    /// Releases a lock; a lock held by someone else is left alone.
    async fn release_lock(&self, name: &str, namespace: &str, lock_id: &str) -> Result<()>;

    /// Backend name for display.
    fn backend_type(&self) -> &'static str;
}
