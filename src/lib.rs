// ============================================================================
// Linting
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Rollplan
//!
//! Dependency-ordered deployment plans for cluster releases.
//!
//! ## Overview
//!
//! Given the desired objects of a release, rollplan:
//!
//! - Decides per resource whether to create, update, recreate, apply or skip
//! - Builds a DAG of operations honoring stages, weights and dependencies
//! - Executes the DAG concurrently with bounded parallelism
//! - Remediates partial failures with a second, smaller plan
//! - Records every release revision and saves plans as reviewable artifacts
//!
//! ## Architecture
//!
//! 1. **Decision**: [`decision`] compares desired objects with live state
//! 2. **Planning**: [`plan`] turns decisions into an optimized operation DAG
//! 3. **Execution**: [`plan::PlanExecutor`] runs the DAG against a
//!    [`cluster::ClusterClient`] and a [`release::ReleaseStore`]
//! 4. **Orchestration**: [`deployer::Deployer`] ties it together per release
//!
//! ## Modules
//!
//! - [`resource`]: Resource model and annotation policy
//! - [`cluster`]: Cluster client seam and trackers
//! - [`decision`]: Per-resource decision engine
//! - [`plan`]: Plan DAG, builders, optimizer and executor
//! - [`release`]: Release revisions and storage
//! - [`artifact`]: Saved plans
//! - [`deployer`]: Install, upgrade, rollback and uninstall
//! - [`config`]: Configuration parsing and validation
//! - [`cli`]: Command-line interface

// ============================================================================
// Modules
// ============================================================================

pub mod artifact;
pub mod cancel;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod decision;
pub mod deployer;
pub mod error;
pub mod plan;
pub mod release;
pub mod resource;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use artifact::PlanArtifact;
pub use cancel::CancelScope;
pub use cli::{Cli, Commands, OutputFormatter};
pub use cluster::{ClusterClient, PollingTrackerFactory, TrackerFactory};
pub use config::{ConfigParser, ConfigValidator, EngineConfig};
pub use decision::DecisionEngine;
pub use deployer::{DeployOptions, DeployReport, Deployer};
pub use error::{Result, RollplanError};
pub use plan::{InstallPlanBuilder, Plan, PlanExecutor};
pub use release::{LocalReleaseStore, Release, ReleaseStore};
pub use resource::Resource;
