//! Engine configuration types.
//!
//! These structs map to `rollplan.yaml`. Every field has a default, so an
//! empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use crate::release::local::DEFAULT_RELEASE_DIR;

/// Default environment variable holding the artifact passphrase.
pub const DEFAULT_ARTIFACT_KEY_ENV: &str = "ROLLPLAN_PLAN_KEY";

/// Root configuration of the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct EngineConfig {
    /// Operations executed at once.
    #[validate(range(min = 1, max = 256))]
    pub parallelism: usize,
    /// Field manager used for applies.
    #[validate(length(min = 1, max = 128))]
    pub field_manager: String,
    /// Take over fields that were edited by hand.
    pub discard_manual_changes: bool,
    /// Tracking timeouts.
    #[validate(nested)]
    pub timeouts: TimeoutConfig,
    /// Interval between tracker polls.
    #[validate(range(min = 100, max = 60_000))]
    pub poll_interval_ms: u64,
    /// Plan artifact settings.
    #[validate(nested)]
    pub artifact: ArtifactConfig,
    /// Release history storage.
    pub release_store: ReleaseStoreConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 10,
            field_manager: String::from("rollplan"),
            discard_manual_changes: false,
            timeouts: TimeoutConfig::default(),
            poll_interval_ms: 2000,
            artifact: ArtifactConfig::default(),
            release_store: ReleaseStoreConfig::default(),
        }
    }
}

/// Per-category tracking timeouts, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Waiting for readiness.
    #[validate(range(min = 1))]
    pub readiness_secs: u64,
    /// Waiting for presence.
    #[validate(range(min = 1))]
    pub creation_secs: u64,
    /// Waiting for absence.
    #[validate(range(min = 1))]
    pub deletion_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            readiness_secs: 300,
            creation_secs: 60,
            deletion_secs: 120,
        }
    }
}

/// Plan artifact settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Validity window of saved artifacts.
    #[validate(range(min = 1))]
    pub lifetime_secs: u64,
    /// Environment variable holding the encryption passphrase.
    pub key_env: String,
    /// Save every built plan here.
    pub path: Option<PathBuf>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: crate::artifact::DEFAULT_ARTIFACT_LIFETIME_SECS,
            key_env: DEFAULT_ARTIFACT_KEY_ENV.to_string(),
            path: None,
        }
    }
}

impl ArtifactConfig {
    /// Passphrase from the configured environment variable, if set.
    #[must_use]
    pub fn key(&self) -> Option<String> {
        if self.key_env.is_empty() {
            return None;
        }
        std::env::var(&self.key_env).ok().filter(|k| !k.is_empty())
    }
}

/// Release history storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReleaseStoreConfig {
    /// Base directory of the local store.
    pub path: PathBuf,
}

impl Default for ReleaseStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_RELEASE_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.release_store.path, PathBuf::from(".rollplan/releases"));
    }

    #[test]
    fn test_range_violations() {
        let mut config = EngineConfig::default();
        config.parallelism = 0;
        config.timeouts.readiness_secs = 0;

        let errors = config.validate().unwrap_err();
        let fields = errors.errors();
        assert!(fields.contains_key("parallelism"));
        assert!(fields.contains_key("timeouts"));
    }

    #[test]
    fn test_empty_key_env_disables_encryption() {
        let artifact = ArtifactConfig {
            key_env: String::new(),
            ..ArtifactConfig::default()
        };
        assert!(artifact.key().is_none());
    }
}
