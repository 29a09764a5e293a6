//! CLI module for the rollplan tool.
//!
//! This module provides the command-line interface for inspecting plan
//! artifacts, validating configuration and reading release history.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
