//! Local file-based release storage.
//!
//! Layout under the base directory:
//! `<namespace>/<name>/v<revision>.json` per revision and
//! `<namespace>/<name>/release.lock` while a deployment runs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{ReleaseError, Result, RollplanError};

use super::lock::{generate_holder_id, LockInfo, LOCK_EXPIRY_SECS};
use super::store::ReleaseStore;
use super::types::Release;

/// Default storage directory, relative to the working directory.
pub const DEFAULT_RELEASE_DIR: &str = ".rollplan/releases";

/// Lock file name.
const LOCK_FILE: &str = "release.lock";

/// Local file-based release store.
#[derive(Debug)]
pub struct LocalReleaseStore {
    base_dir: PathBuf,
}

impl LocalReleaseStore {
    /// Creates a store rooted at `.rollplan/releases` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| RollplanError::internal(format!("Cannot determine current directory: {e}")))?
            .join(DEFAULT_RELEASE_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a store rooted at a custom directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn release_dir(&self, name: &str, namespace: &str) -> PathBuf {
        let namespace = if namespace.is_empty() { "_cluster" } else { namespace };
        self.base_dir.join(namespace).join(name)
    }

    fn revision_path(&self, name: &str, namespace: &str, revision: u32) -> PathBuf {
        self.release_dir(name, namespace).join(format!("v{revision}.json"))
    }

    fn lock_path(&self, name: &str, namespace: &str) -> PathBuf {
        self.release_dir(name, namespace).join(LOCK_FILE)
    }

    async fn write_atomic(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            debug!("Creating release directory: {}", parent.display());
            fs::create_dir_all(parent).await.map_err(|e| {
                ReleaseError::write_failed(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            ReleaseError::write_failed(format!("Failed to create {}: {e}", temp_path.display()))
        })?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| ReleaseError::write_failed(format!("Failed to write {}: {e}", temp_path.display())))?;
        file.sync_all()
            .await
            .map_err(|e| ReleaseError::write_failed(format!("Failed to sync {}: {e}", temp_path.display())))?;

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| ReleaseError::write_failed(format!("Failed to rename {}: {e}", path.display())))?;
        Ok(())
    }

    async fn write_release(&self, release: &Release) -> Result<()> {
        let content = serde_json::to_string_pretty(release)
            .map_err(|e| ReleaseError::write_failed(format!("Failed to serialize release: {e}")))?;
        let path = self.revision_path(&release.name, &release.namespace, release.revision);
        Self::write_atomic(&path, &content).await
    }

    async fn read_lock_file(&self, path: &Path) -> Result<Option<LockInfo>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ReleaseError::corrupted(format!("Failed to read lock file: {e}")))?;
        let lock = serde_json::from_str(&content)
            .map_err(|e| ReleaseError::corrupted(format!("Failed to parse lock file: {e}")))?;
        Ok(Some(lock))
    }
}

#[async_trait]
impl ReleaseStore for LocalReleaseStore {
    async fn create_release(&self, release: &Release) -> Result<()> {
        let path = self.revision_path(&release.name, &release.namespace, release.revision);
        if path.exists() {
            return Err(ReleaseError::AlreadyExists {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
                revision: release.revision,
            }
            .into());
        }

        info!("Recording release {release} ({})", release.status);
        self.write_release(release).await
    }

    async fn update_release(&self, release: &Release) -> Result<()> {
        let path = self.revision_path(&release.name, &release.namespace, release.revision);
        if !path.exists() {
            return Err(ReleaseError::NotFound {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
                revision: release.revision,
            }
            .into());
        }

        info!("Updating release {release} to {}", release.status);
        self.write_release(release).await
    }

    async fn delete_release(&self, name: &str, namespace: &str, revision: u32) -> Result<()> {
        let path = self.revision_path(name, namespace, revision);
        if path.exists() {
            info!("Deleting release {namespace}/{name} revision {revision}");
            fs::remove_file(&path)
                .await
                .map_err(|e| ReleaseError::write_failed(format!("Failed to delete {}: {e}", path.display())))?;
        }
        Ok(())
    }

    async fn releases(&self, name: &str, namespace: &str) -> Result<Vec<Release>> {
        let dir = self.release_dir(name, namespace);
        if !dir.exists() {
            debug!("No release history at {}", dir.display());
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| ReleaseError::corrupted(format!("Failed to list {}: {e}", dir.display())))?;

        let mut history = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ReleaseError::corrupted(format!("Failed to list {}: {e}", dir.display())))?
        {
            let path = entry.path();
            let is_revision = path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|f| f.to_str())
                    .is_some_and(|f| f.starts_with('v'));
            if !is_revision {
                continue;
            }

            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| ReleaseError::corrupted(format!("Failed to read {}: {e}", path.display())))?;
            let release: Release = serde_json::from_str(&content)
                .map_err(|e| ReleaseError::corrupted(format!("Failed to parse {}: {e}", path.display())))?;
            history.push(release);
        }

        history.sort_by_key(|r| r.revision);
        Ok(history)
    }

    async fn acquire_lock(&self, name: &str, namespace: &str, holder: &str) -> Result<LockInfo> {
        let path = self.lock_path(name, namespace);

        if let Some(existing) = self.read_lock_file(&path).await? {
            if !existing.is_expired() {
                return Err(ReleaseError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }
                .into());
            }
            debug!("Expired lock found, taking over");
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock = LockInfo::new(&holder_id, &format!("{namespace}/{name}"));
        let content = serde_json::to_string_pretty(&lock).map_err(|e| ReleaseError::LockFailed {
            message: format!("Failed to serialize lock: {e}"),
        })?;
        Self::write_atomic(&path, &content).await?;

        info!(
            "Acquired release lock: {} (expires in {}s)",
            lock.lock_id, LOCK_EXPIRY_SECS
        );
        Ok(lock)
    }

    async fn release_lock(&self, name: &str, namespace: &str, lock_id: &str) -> Result<()> {
        let path = self.lock_path(name, namespace);
        match self.read_lock_file(&path).await? {
            Some(existing) if existing.lock_id == lock_id => {
                fs::remove_file(&path).await.map_err(|e| ReleaseError::LockFailed {
                    message: format!("Failed to delete lock file: {e}"),
                })?;
                info!("Released release lock: {lock_id}");
            }
            Some(existing) => {
                debug!("Lock ID mismatch: expected {lock_id}, found {}", existing.lock_id);
            }
            None => {}
        }
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}
