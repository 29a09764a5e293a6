//! Cluster-facing collaborators.
//!
//! This module provides:
//! - The `ClusterClient` trait consumed by the decision engine and executor
//! - Trackers waiting for presence, absence and readiness
//! - Generic readiness rules used by the polling trackers

pub mod client;
pub mod readiness;
pub mod tracker;

pub use client::{ClusterClient, PropagationPolicy};
pub use readiness::Readiness;
pub use tracker::{PollingTrackerFactory, Tracker, TrackerFactory};
