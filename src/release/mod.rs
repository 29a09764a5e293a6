//! Release history management.
//!
//! This module provides:
//! - Release revision types and transitions
//! - The `ReleaseStore` trait
//! - A local file-based store with release locking

pub mod local;
pub mod lock;
pub mod store;
pub mod types;

pub use local::LocalReleaseStore;
pub use lock::{generate_holder_id, LockInfo};
pub use store::ReleaseStore;
pub use types::{
    last_deployed, latest, DeployType, Release, ReleaseInfo, ReleaseStatus, ReleaseTransition,
};
