//! Configuration module for the rollplan engine.
//!
//! This module handles all configuration-related functionality:
//! - Parsing `rollplan.yaml` with `ROLLPLAN_*` overrides
//! - Range checks and cross-field validation

mod parser;
mod settings;
mod validator;

pub use parser::{find_config_file, user_config_file, ConfigParser, DEFAULT_CONFIG_FILES};
pub use settings::{
    ArtifactConfig, EngineConfig, ReleaseStoreConfig, TimeoutConfig, DEFAULT_ARTIFACT_KEY_ENV,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
