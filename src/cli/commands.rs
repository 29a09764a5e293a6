//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rollplan - Dependency-ordered deployment plans.
#[derive(Parser, Debug)]
#[command(name = "rollplan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "ROLLPLAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a saved plan and show its operations and changes.
    Inspect {
        /// Artifact file.
        artifact: PathBuf,

        /// Environment variable holding the decryption passphrase.
        #[arg(long)]
        key_env: Option<String>,

        /// Show the diff of every change.
        #[arg(short, long)]
        diff: bool,
    },

    /// Print the dependency graph of a saved plan.
    Graph {
        /// Artifact file.
        artifact: PathBuf,

        /// Environment variable holding the decryption passphrase.
        #[arg(long)]
        key_env: Option<String>,

        /// Render Graphviz DOT instead of an edge list.
        #[arg(long)]
        dot: bool,
    },

    /// Validate the engine configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show the revision history of a release.
    History {
        /// Release name.
        release: String,

        /// Release namespace.
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Number of most recent revisions to show.
        #[arg(long, default_value = "10")]
        max: usize,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_history() {
        let cli = Cli::try_parse_from(["rollplan", "history", "web", "-n", "prod", "--output", "json"])
            .expect("parse");
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::History { ref release, ref namespace, max: 10 } if release == "web" && namespace == "prod"
        ));
    }

    #[test]
    fn test_parse_graph_dot() {
        let cli = Cli::try_parse_from(["rollplan", "-v", "graph", "plan.json", "--dot"]).expect("parse");
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Graph { dot: true, key_env: None, .. }));
    }

    #[test]
    fn test_command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
