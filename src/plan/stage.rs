//! Plan stages.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::release::DeployType;

/// A named phase of a plan. Every stage is bracketed by a start and an end
/// boundary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Release bookkeeping and external dependency checks.
    Init,
    /// Custom resource definitions.
    StandaloneDefinitions,
    /// Pre-deploy hooks.
    PreHooks,
    /// Regular resources.
    Resources,
    /// Removal of obsolete resources.
    Uninstall,
    /// Post-deploy hooks.
    PostHooks,
    /// Final release bookkeeping.
    Final,
}

const DEPLOY_SEQUENCE: &[Stage] = &[
    Stage::Init,
    Stage::StandaloneDefinitions,
    Stage::PreHooks,
    Stage::Resources,
    Stage::Uninstall,
    Stage::PostHooks,
    Stage::Final,
];

const UNINSTALL_SEQUENCE: &[Stage] = &[
    Stage::Init,
    Stage::PreHooks,
    Stage::Uninstall,
    Stage::PostHooks,
    Stage::Final,
];

const REMEDIATION_SEQUENCE: &[Stage] = &[Stage::Uninstall, Stage::Final];

impl Stage {
    /// Stable name used in operation IDs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::StandaloneDefinitions => "standalone-definitions",
            Self::PreHooks => "pre-hooks",
            Self::Resources => "resources",
            Self::Uninstall => "uninstall",
            Self::PostHooks => "post-hooks",
            Self::Final => "final",
        }
    }

    /// Ordered stages of a plan for a deploy type.
    #[must_use]
    pub const fn sequence(deploy_type: DeployType) -> &'static [Self] {
        match deploy_type {
            DeployType::Install | DeployType::Upgrade | DeployType::Rollback => DEPLOY_SEQUENCE,
            DeployType::Uninstall => UNINSTALL_SEQUENCE,
        }
    }

    /// Ordered stages of a failure remediation plan.
    #[must_use]
    pub const fn remediation_sequence() -> &'static [Self] {
        REMEDIATION_SEQUENCE
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
