//! Error types for the rollplan deployment engine.
//!
//! This module provides the error hierarchy for every phase of a deployment:
//! configuration, cluster access, per-resource decisions, plan construction,
//! plan execution, release history and plan artifacts.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the rollplan engine.
#[derive(Debug, Error)]
pub enum RollplanError {
    /// Configuration and policy errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cluster API errors.
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Resource decision errors.
    #[error("Decision error: {0}")]
    Decision(#[from] DecisionError),

    /// Plan graph invariant violations.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Plan construction errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Plan execution errors.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Release history errors.
    #[error("Release error: {0}")]
    Release(#[from] ReleaseError),

    /// Plan artifact errors.
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// A resource manifest is malformed.
    #[error("Invalid manifest{}: {message}", location_suffix(.file_path))]
    InvalidManifest {
        /// Origin file of the manifest, if known.
        file_path: Option<String>,
        /// Description of the problem.
        message: String,
    },

    /// A policy annotation carries an invalid value.
    #[error("Invalid annotation {key}={value:?} on {resource}: {reason}")]
    InvalidAnnotation {
        /// Resource carrying the annotation.
        resource: String,
        /// Annotation key.
        key: String,
        /// Annotation value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Errors returned by the cluster API collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    /// The resource does not exist.
    #[error("{resource} not found")]
    NotFound {
        /// Human-readable resource identity.
        resource: String,
    },

    /// The cluster does not know the resource kind.
    #[error("resource kind {kind} is not served by the cluster")]
    NoSuchKind {
        /// The unknown kind (group/version/kind).
        kind: String,
    },

    /// The requested change touches immutable fields.
    #[error("immutable field change on {resource}: {message}")]
    Immutable {
        /// Human-readable resource identity.
        resource: String,
        /// Message returned by the cluster.
        message: String,
    },

    /// Any other request failure.
    #[error("request for {resource} failed: {message}")]
    Request {
        /// Human-readable resource identity.
        resource: String,
        /// Message returned by the cluster.
        message: String,
    },

    /// A tracker gave up waiting.
    #[error("timed out after {timeout_secs}s waiting for {resource} to become {expected_state}")]
    Timeout {
        /// Human-readable resource identity.
        resource: String,
        /// State that was not reached.
        expected_state: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// A tracked resource reached a terminal failure.
    #[error("{resource} failed: {reason}")]
    ResourceFailed {
        /// Human-readable resource identity.
        resource: String,
        /// Failure reason reported by the readiness rules.
        reason: String,
    },

    /// The surrounding plan execution was cancelled.
    #[error("cancelled: {cause}")]
    Cancelled {
        /// Cause of the cancellation.
        cause: String,
    },
}

/// Errors from the resource decision engine.
#[derive(Debug, Error)]
pub enum DecisionError {
    /// An immutable field changed on a resource that may not be recreated.
    #[error(
        "{resource} cannot be updated because immutable fields changed and the resource is not marked for recreation: {message}"
    )]
    ImmutableFieldChange {
        /// Human-readable resource identity.
        resource: String,
        /// Dry-run error message.
        message: String,
    },

    /// A cluster call made while deciding failed.
    #[error("{action} for {resource} failed: {source}")]
    Lookup {
        /// What was attempted.
        action: &'static str,
        /// Human-readable resource identity.
        resource: String,
        /// The underlying cluster error.
        source: ClusterError,
    },
}

/// Plan graph invariant violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The edge would close a cycle.
    #[error("edge {from} -> {to} would create a cycle")]
    Cycle {
        /// Edge source.
        from: String,
        /// Edge target.
        to: String,
    },

    /// A vertex lookup failed.
    #[error("vertex {id} not found")]
    VertexNotFound {
        /// Missing vertex ID.
        id: String,
    },

    /// A different vertex with the same ID already exists.
    #[error("vertex {id} already exists with different content")]
    ConflictingVertex {
        /// Conflicting vertex ID.
        id: String,
    },
}

/// Plan construction errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A declared dependency contradicts the stage ordering.
    #[error("dependency of {dependent} on {dependency} contradicts plan ordering: {source}")]
    DependencyCycle {
        /// Resource declaring the dependency.
        dependent: String,
        /// Resource (or operation) depended upon.
        dependency: String,
        /// The graph error raised.
        source: GraphError,
    },

    /// An operation could not be inserted into the plan.
    #[error("failed to insert {operation}: {source}")]
    Insert {
        /// Description of the operation.
        operation: String,
        /// The graph error raised.
        source: GraphError,
    },

    /// A resource produced no operations to chain.
    #[error("no operations to chain for {resource}")]
    EmptyChain {
        /// Resource being planned.
        resource: String,
    },
}

/// Plan execution errors.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// An operation failed.
    #[error("operation {operation} failed: {source}")]
    OperationFailed {
        /// ID of the failed operation.
        operation: String,
        /// The error returned by the operation.
        source: Box<RollplanError>,
    },

    /// A worker task panicked.
    #[error("worker task panicked: {message}")]
    WorkerPanicked {
        /// Panic or join error message.
        message: String,
    },

    /// Operations are left but none can run.
    #[error("execution stalled with {remaining} operations blocked")]
    Stalled {
        /// Number of blocked operations.
        remaining: usize,
    },
}

/// Release history errors.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// The requested revision does not exist.
    #[error("release {namespace}/{name} revision {revision} not found")]
    NotFound {
        /// Release name.
        name: String,
        /// Release namespace.
        namespace: String,
        /// Release revision.
        revision: u32,
    },

    /// The revision already exists.
    #[error("release {namespace}/{name} revision {revision} already exists")]
    AlreadyExists {
        /// Release name.
        name: String,
        /// Release namespace.
        namespace: String,
        /// Release revision.
        revision: u32,
    },

    /// Stored release data is unreadable.
    #[error("release storage is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Writing release data failed.
    #[error("release storage write failed: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// The release lock is held by another process.
    #[error("release is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Lock acquisition or release failed.
    #[error("failed to manage release lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },
}

/// Plan artifact errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The artifact scheme tag is not supported.
    #[error("unsupported plan artifact scheme {found:?}, expected {expected:?}")]
    UnsupportedScheme {
        /// Scheme found in the artifact.
        found: String,
        /// Supported scheme.
        expected: String,
    },

    /// The artifact outlived its validity window.
    #[error("plan artifact created at {created_at} expired at {expired_at}")]
    Stale {
        /// Creation timestamp.
        created_at: String,
        /// Expiry timestamp.
        expired_at: String,
    },

    /// The artifact is encrypted and no key was supplied.
    #[error("plan artifact is encrypted, a key is required")]
    KeyRequired,

    /// Encryption failed.
    #[error("failed to encrypt plan artifact: {message}")]
    Encryption {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed.
    #[error("failed to decrypt plan artifact: {message}")]
    Decryption {
        /// Description of the failure.
        message: String,
    },

    /// A stored operation ID does not match its decoded config.
    #[error("operation ID mismatch: stored {stored}, computed {computed}")]
    IdMismatch {
        /// ID stored in the artifact.
        stored: String,
        /// ID recomputed from the decoded operation.
        computed: String,
    },

    /// The artifact could not be (de)serialized.
    #[error("plan artifact serialization failed: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// The DAG section is not a valid plan graph.
    #[error("plan artifact graph is invalid: {source}")]
    InvalidGraph {
        /// The graph error raised while rebuilding.
        source: GraphError,
    },
}

/// Result type alias for rollplan operations.
pub type Result<T> = std::result::Result<T, RollplanError>;

fn location_suffix(file_path: &Option<String>) -> String {
    file_path
        .as_ref()
        .map_or_else(String::new, |p| format!(" in {p}"))
}

impl RollplanError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error was caused by plan cancellation rather than
    /// by the operation itself.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cluster(ClusterError::Cancelled { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl ClusterError {
    /// Creates a generic request error.
    #[must_use]
    pub fn request(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Returns true for "resource does not exist".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true when the lookup means the resource is absent: not found,
    /// or the kind is not served at all.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NoSuchKind { .. })
    }

    /// Returns true for immutable field rejections.
    #[must_use]
    pub const fn is_immutable(&self) -> bool {
        matches!(self, Self::Immutable { .. })
    }
}

impl ReleaseError {
    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}

impl ArtifactError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_classification() {
        let not_found = ClusterError::NotFound {
            resource: String::from("ConfigMap/cm1"),
        };
        let no_kind = ClusterError::NoSuchKind {
            kind: String::from("example.com/v1/Widget"),
        };
        let other = ClusterError::request("ConfigMap/cm1", "boom");

        assert!(not_found.is_absent());
        assert!(not_found.is_not_found());
        assert!(no_kind.is_absent());
        assert!(!no_kind.is_not_found());
        assert!(!other.is_absent());
    }

    #[test]
    fn test_cancellation_detection() {
        let err = RollplanError::from(ClusterError::Cancelled {
            cause: String::from("sibling failed"),
        });
        assert!(err.is_cancellation());
        assert!(!RollplanError::internal("x").is_cancellation());
    }

    #[test]
    fn test_manifest_message_includes_location() {
        let err = ConfigError::InvalidManifest {
            file_path: Some(String::from("templates/cm.yaml")),
            message: String::from("missing metadata.name"),
        };
        assert_eq!(
            err.to_string(),
            "Invalid manifest in templates/cm.yaml: missing metadata.name"
        );
    }
}
