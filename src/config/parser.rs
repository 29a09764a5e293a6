//! Configuration parser for loading engine configuration.
//!
//! Configuration comes from `rollplan.yaml`, then `ROLLPLAN_*` environment
//! variables override individual fields.

use crate::error::{ConfigError, Result, RollplanError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use validator::Validate;

use super::settings::EngineConfig;

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["rollplan.yaml", "rollplan.yml"];

/// Configuration parser for loading engine configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving `.env`.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<EngineConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(RollplanError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses and range-checks configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or a value is out of range.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<EngineConfig> {
        debug!("Parsing YAML configuration");

        let config: EngineConfig = if content.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })?
        };

        check_ranges(&config)?;
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Recognized variables: `ROLLPLAN_PARALLELISM`, `ROLLPLAN_FIELD_MANAGER`,
    /// `ROLLPLAN_DISCARD_MANUAL_CHANGES`, `ROLLPLAN_READINESS_TIMEOUT`,
    /// `ROLLPLAN_CREATION_TIMEOUT`, `ROLLPLAN_DELETION_TIMEOUT`,
    /// `ROLLPLAN_POLL_INTERVAL_MS`, `ROLLPLAN_ARTIFACT_PATH` and
    /// `ROLLPLAN_RELEASE_DIR`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or an override is
    /// malformed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<EngineConfig> {
        let mut config = self.load_file(path)?;
        apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        check_ranges(&config)?;
        Ok(config)
    }

    /// Searches for a configuration file from `start_dir` upwards and loads
    /// it with overrides. Without a file, defaults plus overrides are used.
    ///
    /// # Errors
    ///
    /// Returns an error if a found file is invalid.
    pub fn discover(&self, start_dir: impl AsRef<Path>) -> Result<EngineConfig> {
        match find_config_file(start_dir) {
            Ok(path) => self.load_with_env(path),
            Err(RollplanError::Config(ConfigError::FileNotFound { .. })) => {
                debug!("No configuration file found, using defaults");
                let mut config = EngineConfig::default();
                apply_overrides(&mut config, |name| std::env::var(name).ok())?;
                check_ranges(&config)?;
                Ok(config)
            }
            Err(e) => Err(e),
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

fn check_ranges(config: &EngineConfig) -> Result<()> {
    config.validate().map_err(|errors| {
        let field = errors.field_errors().keys().next().map(ToString::to_string);
        RollplanError::Config(ConfigError::ValidationError {
            message: errors.to_string(),
            field,
        })
    })
}

/// Applies `ROLLPLAN_*` overrides read through `lookup`.
fn apply_overrides(config: &mut EngineConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    fn parsed<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        value.trim().parse().map_err(|e: T::Err| {
            RollplanError::Config(ConfigError::ParseError {
                message: format!("Invalid value {value:?}: {e}"),
                location: Some(name.to_string()),
            })
        })
    }

    if let Some(value) = lookup("ROLLPLAN_PARALLELISM") {
        debug!("Overriding parallelism from environment");
        config.parallelism = parsed("ROLLPLAN_PARALLELISM", &value)?;
    }
    if let Some(value) = lookup("ROLLPLAN_FIELD_MANAGER") {
        debug!("Overriding field_manager from environment");
        config.field_manager = value;
    }
    if let Some(value) = lookup("ROLLPLAN_DISCARD_MANUAL_CHANGES") {
        debug!("Overriding discard_manual_changes from environment");
        config.discard_manual_changes = parsed("ROLLPLAN_DISCARD_MANUAL_CHANGES", &value)?;
    }
    if let Some(value) = lookup("ROLLPLAN_READINESS_TIMEOUT") {
        debug!("Overriding timeouts.readiness_secs from environment");
        config.timeouts.readiness_secs = parsed("ROLLPLAN_READINESS_TIMEOUT", &value)?;
    }
    if let Some(value) = lookup("ROLLPLAN_CREATION_TIMEOUT") {
        debug!("Overriding timeouts.creation_secs from environment");
        config.timeouts.creation_secs = parsed("ROLLPLAN_CREATION_TIMEOUT", &value)?;
    }
    if let Some(value) = lookup("ROLLPLAN_DELETION_TIMEOUT") {
        debug!("Overriding timeouts.deletion_secs from environment");
        config.timeouts.deletion_secs = parsed("ROLLPLAN_DELETION_TIMEOUT", &value)?;
    }
    if let Some(value) = lookup("ROLLPLAN_POLL_INTERVAL_MS") {
        debug!("Overriding poll_interval_ms from environment");
        config.poll_interval_ms = parsed("ROLLPLAN_POLL_INTERVAL_MS", &value)?;
    }
    if let Some(value) = lookup("ROLLPLAN_ARTIFACT_PATH") {
        debug!("Overriding artifact.path from environment");
        config.artifact.path = Some(PathBuf::from(value));
    }
    if let Some(value) = lookup("ROLLPLAN_RELEASE_DIR") {
        debug!("Overriding release_store.path from environment");
        config.release_store.path = PathBuf::from(value);
    }
    Ok(())
}

/// Per-user configuration, e.g. `~/.config/rollplan/rollplan.yaml`.
#[must_use]
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rollplan").join(DEFAULT_CONFIG_FILES[0]))
}

/// Finds the configuration file in the given directory or its parents,
/// falling back to the per-user file.
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    if let Some(user_config) = user_config_file()
        && user_config.exists()
    {
        info!("Using user configuration file: {}", user_config.display());
        return Ok(user_config);
    }

    Err(RollplanError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_config() {
        let config = ConfigParser::new().parse_yaml("", None).expect("defaults");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_parse_partial_config() {
        let yaml = r"
parallelism: 4
timeouts:
  readiness_secs: 600
artifact:
  path: plans/web.json
";
        let config = ConfigParser::new().parse_yaml(yaml, None).expect("config");
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.timeouts.readiness_secs, 600);
        assert_eq!(config.timeouts.deletion_secs, 120);
        assert_eq!(config.artifact.path, Some(PathBuf::from("plans/web.json")));
        assert_eq!(config.field_manager, "rollplan");
    }

    #[test]
    fn test_out_of_range_value_is_rejected() {
        let err = ConfigParser::new().parse_yaml("parallelism: 0\n", None).unwrap_err();
        assert!(matches!(
            err,
            RollplanError::Config(ConfigError::ValidationError { field: Some(ref f), .. }) if f == "parallelism"
        ));
    }

    #[test]
    fn test_unknown_yaml_shape_is_a_parse_error() {
        let err = ConfigParser::new()
            .parse_yaml("parallelism: [1, 2]\n", Some(Path::new("rollplan.yaml")))
            .unwrap_err();
        assert!(matches!(
            err,
            RollplanError::Config(ConfigError::ParseError { location: Some(_), .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ROLLPLAN_PARALLELISM", "3"),
            ("ROLLPLAN_DISCARD_MANUAL_CHANGES", "true"),
            ("ROLLPLAN_RELEASE_DIR", "/var/lib/rollplan"),
        ]);
        let mut config = EngineConfig::default();
        apply_overrides(&mut config, |k| env.get(k).map(ToString::to_string)).expect("overrides");

        assert_eq!(config.parallelism, 3);
        assert!(config.discard_manual_changes);
        assert_eq!(config.release_store.path, PathBuf::from("/var/lib/rollplan"));
    }

    #[test]
    fn test_malformed_override() {
        let mut config = EngineConfig::default();
        let err = apply_overrides(&mut config, |k| (k == "ROLLPLAN_PARALLELISM").then(|| String::from("many")))
            .unwrap_err();
        assert!(err.to_string().contains("many"));
    }

    #[test]
    fn test_find_config_in_parent() {
        let dir = TempDir::new().expect("temp dir");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(dir.path().join("rollplan.yaml"), "parallelism: 2\n").expect("write");

        let found = find_config_file(&nested).expect("found");
        assert_eq!(found, dir.path().join("rollplan.yaml"));

        let config = ConfigParser::new().load_file(&found).expect("load");
        assert_eq!(config.parallelism, 2);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().expect("temp dir");
        let err = ConfigParser::new().load_file(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, RollplanError::Config(ConfigError::FileNotFound { .. })));
    }
}
