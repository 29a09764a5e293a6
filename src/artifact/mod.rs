//! Persisted plan artifacts.
//!
//! An artifact captures a built plan so it can be inspected, reviewed and
//! executed later. It carries:
//! - A scheme tag and a validity window
//! - The release identity and deploy type
//! - The plan graph, optionally encrypted
//! - A redacted changes section for reviewers

pub mod changes;
pub mod crypto;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{ArtifactError, Result};
use crate::plan::{Dag, Operation, Plan};
use crate::release::{DeployType, Release};

pub use changes::{build_changes, ChangeAction, ResourceChange};
pub use crypto::Sealed;

/// Scheme tag of the supported artifact format.
pub const ARTIFACT_SCHEME: &str = "rollplan.io/plan/v1";

/// Default validity window.
pub const DEFAULT_ARTIFACT_LIFETIME_SECS: u64 = 2 * 60 * 60;

/// Release a plan was built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRelease {
    /// Release name.
    pub name: String,
    /// Release namespace.
    pub namespace: String,
    /// Revision the plan deploys.
    pub revision: u32,
}

/// An operation together with the ID it had when saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOperation {
    /// ID at save time.
    pub id: String,
    /// The operation.
    pub operation: Operation,
}

/// Serialized plan graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactGraph {
    /// Operations sorted by ID.
    pub operations: Vec<StoredOperation>,
    /// Edges sorted by (from, to).
    pub edges: Vec<(String, String)>,
}

impl ArtifactGraph {
    /// Captures a plan.
    #[must_use]
    pub fn from_plan(plan: &Plan) -> Self {
        let mut operations: Vec<StoredOperation> = plan
            .operations()
            .map(|op| StoredOperation {
                id: op.id(),
                operation: op.clone(),
            })
            .collect();
        operations.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            operations,
            edges: plan.dag().edges(),
        }
    }

    /// Rebuilds the plan, checking every stored ID against its operation.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactError::IdMismatch` if an operation was altered and
    /// `ArtifactError::InvalidGraph` if the graph is inconsistent.
    pub fn to_plan(&self) -> std::result::Result<Plan, ArtifactError> {
        let mut dag: Dag<Operation> = Dag::new();
        for stored in &self.operations {
            let computed = stored.operation.id();
            if computed != stored.id {
                return Err(ArtifactError::IdMismatch {
                    stored: stored.id.clone(),
                    computed,
                });
            }
            dag.add_vertex(stored.operation.clone())
                .map_err(|source| ArtifactError::InvalidGraph { source })?;
        }
        for (from, to) in &self.edges {
            dag.add_edge(from, to)
                .map_err(|source| ArtifactError::InvalidGraph { source })?;
        }
        Ok(Plan::from_dag(dag))
    }
}

/// Graph section, plain or encrypted as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "kebab-case")]
pub enum DagSection {
    /// Readable graph.
    Plain(ArtifactGraph),
    /// AES-256-GCM sealed JSON of the graph.
    Encrypted(Sealed),
}

/// A saved plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanArtifact {
    /// Format tag.
    pub scheme: String,
    /// Target release.
    pub release: ArtifactRelease,
    /// Deploy type of the plan.
    pub deploy_type: DeployType,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Validity window in seconds.
    pub lifetime_secs: u64,
    /// Plan graph.
    pub dag: DagSection,
    /// Per-resource changes.
    pub changes: Vec<ResourceChange>,
}

impl PlanArtifact {
    /// Captures a plan for a release revision.
    #[must_use]
    pub fn new(release: &Release, deploy_type: DeployType, plan: &Plan, changes: Vec<ResourceChange>) -> Self {
        Self {
            scheme: ARTIFACT_SCHEME.to_string(),
            release: ArtifactRelease {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
                revision: release.revision,
            },
            deploy_type,
            created_at: Utc::now(),
            lifetime_secs: DEFAULT_ARTIFACT_LIFETIME_SECS,
            dag: DagSection::Plain(ArtifactGraph::from_plan(plan)),
            changes,
        }
    }

    /// Sets the validity window.
    #[must_use]
    pub const fn with_lifetime(mut self, lifetime_secs: u64) -> Self {
        self.lifetime_secs = lifetime_secs;
        self
    }

    /// Encrypts the graph section. Already encrypted artifacts are returned
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph cannot be serialized or encrypted.
    pub fn encrypt(mut self, passphrase: &str) -> std::result::Result<Self, ArtifactError> {
        if let DagSection::Plain(graph) = &self.dag {
            let plaintext = serde_json::to_vec(graph).map_err(|e| ArtifactError::serialization(e.to_string()))?;
            self.dag = DagSection::Encrypted(crypto::seal(&plaintext, passphrase)?);
        }
        Ok(self)
    }

    /// Returns true if the graph section is encrypted.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        matches!(self.dag, DagSection::Encrypted(_))
    }

    /// End of the validity window, `None` if it does not fit a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.lifetime_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| self.created_at.checked_add_signed(lifetime))
    }

    /// Rejects the artifact once its validity window has passed.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactError::Stale` if `now` is past the expiry.
    pub fn check_fresh(&self, now: DateTime<Utc>) -> std::result::Result<(), ArtifactError> {
        match self.expires_at() {
            Some(expired_at) if now > expired_at => Err(ArtifactError::Stale {
                created_at: self.created_at.to_rfc3339(),
                expired_at: expired_at.to_rfc3339(),
            }),
            _ => Ok(()),
        }
    }

    /// Decodes the graph section.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactError::KeyRequired` for an encrypted graph without a
    /// key, and a decryption or serialization error if it cannot be read.
    pub fn graph(&self, key: Option<&str>) -> std::result::Result<ArtifactGraph, ArtifactError> {
        match &self.dag {
            DagSection::Plain(graph) => Ok(graph.clone()),
            DagSection::Encrypted(sealed) => {
                let key = key.ok_or(ArtifactError::KeyRequired)?;
                let plaintext = crypto::open(sealed, key)?;
                serde_json::from_slice(&plaintext).map_err(|e| ArtifactError::serialization(e.to_string()))
            }
        }
    }

    /// Rebuilds the plan.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::graph`] and [`ArtifactGraph::to_plan`].
    pub fn plan(&self, key: Option<&str>) -> std::result::Result<Plan, ArtifactError> {
        self.graph(key)?.to_plan()
    }

    /// Serializes to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactError::Serialization` on failure.
    pub fn to_json(&self) -> std::result::Result<String, ArtifactError> {
        serde_json::to_string_pretty(self).map_err(|e| ArtifactError::serialization(e.to_string()))
    }

    /// Parses JSON, rejecting unknown schemes before anything else.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactError::UnsupportedScheme` or
    /// `ArtifactError::Serialization`.
    pub fn from_json(content: &str) -> std::result::Result<Self, ArtifactError> {
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|e| ArtifactError::serialization(e.to_string()))?;

        let scheme = value.get("scheme").and_then(serde_json::Value::as_str).unwrap_or_default();
        if scheme != ARTIFACT_SCHEME {
            return Err(ArtifactError::UnsupportedScheme {
                found: scheme.to_string(),
                expected: ARTIFACT_SCHEME.to_string(),
            });
        }

        serde_json::from_value(value).map_err(|e| ArtifactError::serialization(e.to_string()))
    }

    /// Writes the artifact to a file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, self.to_json()?).await?;
        info!(
            "Saved plan artifact for {}/{} revision {} to {}",
            self.release.namespace,
            self.release.name,
            self.release.revision,
            path.display()
        );
        Ok(())
    }

    /// Reads an artifact and checks that it is still fresh.
    ///
    /// # Errors
    ///
    /// Returns an IO error, or any error of [`Self::from_json`] and
    /// [`Self::check_fresh`].
    pub async fn load(path: &Path) -> Result<Self> {
        debug!("Loading plan artifact from {}", path.display());
        let content = fs::read_to_string(path).await?;
        let artifact = Self::from_json(&content)?;
        artifact.check_fresh(Utc::now())?;
        Ok(artifact)
    }
}
