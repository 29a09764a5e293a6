//! Semantic validation of engine configuration.
//!
//! Range checks come from the `validator` derives on the settings types;
//! this module adds the cross-field rules and the non-fatal warnings.

use crate::error::{ConfigError, Result, RollplanError};
use tracing::debug;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use super::settings::EngineConfig;

/// Parallelism above this is accepted but flagged.
const HIGH_PARALLELISM: usize = 64;

/// Validator for engine configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates an engine configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found; warnings never fail validation.
    pub fn validate(&self, config: &EngineConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!(warnings = result.warnings.len(), "Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(RollplanError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )))
        }
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &EngineConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if let Err(errors) = config.validate() {
            collect_derive_errors("", &errors, &mut result);
        }
        Self::validate_field_manager(&config.field_manager, &mut result);
        Self::validate_timing(config, &mut result);
        Self::validate_artifact(config, &mut result);

        result
    }

    fn validate_field_manager(field_manager: &str, result: &mut ValidationResult) {
        if field_manager.chars().any(char::is_whitespace) {
            result.errors.push(ValidationError {
                field: String::from("field_manager"),
                message: format!("Field manager '{field_manager}' must not contain whitespace"),
            });
        }
    }

    fn validate_timing(config: &EngineConfig, result: &mut ValidationResult) {
        let timeouts = config.timeouts;
        let shortest = timeouts
            .readiness_secs
            .min(timeouts.creation_secs)
            .min(timeouts.deletion_secs);

        if config.poll_interval_ms >= shortest.saturating_mul(1000) {
            result.warnings.push(format!(
                "poll_interval_ms: {}ms is not shorter than the {shortest}s timeout, trackers get a single poll",
                config.poll_interval_ms
            ));
        }

        if config.parallelism > HIGH_PARALLELISM {
            result.warnings.push(format!(
                "parallelism: {} concurrent operations may overload the API server",
                config.parallelism
            ));
        }
    }

    fn validate_artifact(config: &EngineConfig, result: &mut ValidationResult) {
        let artifact = &config.artifact;

        if !artifact.key_env.is_empty() && !is_valid_env_name(&artifact.key_env) {
            result.errors.push(ValidationError {
                field: String::from("artifact.key_env"),
                message: format!("'{}' is not a valid environment variable name", artifact.key_env),
            });
            return;
        }

        if artifact.path.is_some() && artifact.key().is_none() {
            result.warnings.push(String::from(
                "artifact.path: plans will be saved unencrypted, live objects may be readable",
            ));
        }
    }
}

fn collect_derive_errors(prefix: &str, errors: &ValidationErrors, result: &mut ValidationResult) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map_or_else(|| format!("{path} failed the '{}' check", error.code), ToString::to_string);
                    result.errors.push(ValidationError {
                        field: path.clone(),
                        message,
                    });
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_derive_errors(&path, nested, result),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_derive_errors(&format!("{path}[{index}]"), nested, result);
                }
            }
        }
    }
}

/// Environment variable names: ASCII letters, digits and underscores, not
/// starting with a digit.
fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
