//! Rollplan CLI entrypoint.
//!
//! This is the main entrypoint for the rollplan command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use rollplan::cli::{Cli, Commands, OutputFormatter};
use rollplan::config::{ConfigParser, ConfigValidator, EngineConfig};
use rollplan::error::{ConfigError, Result, RollplanError};
use rollplan::release::{LocalReleaseStore, ReleaseStore};
use rollplan::PlanArtifact;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Inspect { artifact, key_env, diff } => {
            cmd_inspect(cli.config.as_ref(), &artifact, key_env.as_deref(), diff, &formatter).await
        }
        Commands::Graph { artifact, key_env, dot } => {
            cmd_graph(cli.config.as_ref(), &artifact, key_env.as_deref(), dot, &formatter).await
        }
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::History { release, namespace, max } => {
            cmd_history(cli.config.as_ref(), &release, &namespace, max, &formatter).await
        }
    }
}

/// Show a saved plan.
async fn cmd_inspect(
    config_path: Option<&PathBuf>,
    artifact_path: &Path,
    key_env: Option<&str>,
    show_diff: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let key = artifact_key(&config, key_env)?;

    info!("Inspecting plan artifact: {}", artifact_path.display());
    let artifact = PlanArtifact::load(artifact_path).await?;
    let plan = artifact.plan(key.as_deref())?;
    debug!(operations = plan.len(), "Artifact graph verified");

    emit(&formatter.format_artifact(&artifact, &plan, show_diff))
}

/// Print the dependency graph of a saved plan.
async fn cmd_graph(
    config_path: Option<&PathBuf>,
    artifact_path: &Path,
    key_env: Option<&str>,
    dot: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let key = artifact_key(&config, key_env)?;

    let artifact = PlanArtifact::load(artifact_path).await?;
    let plan = artifact.plan(key.as_deref())?;

    emit(&formatter.format_graph(&plan, dot))
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    let config = read_config(config_path)?;
    let result = ConfigValidator::new().check(&config);

    emit(&formatter.format_validation(&config, &result, show_warnings))?;

    match result.errors.first() {
        None => Ok(()),
        Some(first) => Err(RollplanError::Config(ConfigError::validation(
            first.message.clone(),
            first.field.clone(),
        ))),
    }
}

/// Show release history.
async fn cmd_history(
    config_path: Option<&PathBuf>,
    release: &str,
    namespace: &str,
    max: usize,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = LocalReleaseStore::with_base_dir(&config.release_store.path);

    let history = store.releases(release, namespace).await?;
    debug!(revisions = history.len(), "Loaded release history");

    emit(&formatter.format_history(&history, max))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Reads configuration without cross-field validation.
fn read_config(config_path: Option<&PathBuf>) -> Result<EngineConfig> {
    let base = config_path
        .and_then(|p| p.parent())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let parser = ConfigParser::new().with_base_path(&base);
    parser.load_dotenv()?;

    match config_path {
        Some(path) => parser.load_with_env(path),
        None => parser.discover("."),
    }
}

/// Reads and validates configuration.
fn load_config(config_path: Option<&PathBuf>) -> Result<EngineConfig> {
    let config = read_config(config_path)?;
    ConfigValidator::new().validate(&config)?;
    Ok(config)
}

/// Passphrase from `--key-env`, or from the configured variable.
fn artifact_key(config: &EngineConfig, key_env: Option<&str>) -> Result<Option<String>> {
    match key_env {
        Some(name) => std::env::var(name)
            .map(Some)
            .map_err(|_| RollplanError::Config(ConfigError::MissingEnvVar { name: name.to_string() })),
        None => Ok(config.artifact.key()),
    }
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
