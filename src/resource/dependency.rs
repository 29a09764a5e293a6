//! Dependency model between resources.
//!
//! Internal dependencies point at other resources of the same plan through a
//! matcher; external dependencies name a fully resolved resource that lives
//! outside the plan and only has to be present.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::meta::{GroupVersionKind, ResourceMeta};

/// State a dependency must reach before the dependent may be deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyState {
    /// The dependency must exist.
    Present,
    /// The dependency must be ready.
    Ready,
}

/// Matches resources by any subset of name, namespace, group, version, kind.
///
/// Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMatcher {
    /// Resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// API group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// API version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ResourceMatcher {
    /// Returns true if the meta satisfies every set field.
    #[must_use]
    pub fn matches(&self, meta: &ResourceMeta) -> bool {
        let field = |want: &Option<String>, have: &str| want.as_deref().is_none_or(|w| w == have);

        field(&self.name, &meta.name)
            && field(&self.namespace, &meta.namespace)
            && field(&self.group, &meta.gvk.group)
            && field(&self.version, &meta.gvk.version)
            && field(&self.kind, &meta.gvk.kind)
    }
}

impl fmt::Display for ResourceMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            ("kind", &self.kind),
            ("name", &self.name),
            ("namespace", &self.namespace),
            ("group", &self.group),
            ("version", &self.version),
        ]
        .iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| format!("{k}={v}")))
        .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Ordering constraint on another resource of the same plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalDependency {
    /// Which resources are depended upon.
    pub matcher: ResourceMatcher,
    /// State they must reach.
    pub state: DependencyState,
}

/// Ordering constraint on a resource outside the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDependency {
    /// Fully resolved identity of the external resource.
    pub meta: ResourceMeta,
}

impl ExternalDependency {
    /// The required state is always presence.
    #[must_use]
    pub const fn state(&self) -> DependencyState {
        DependencyState::Present
    }
}

/// Key/value pairs of a dependency annotation, e.g.
/// `state=ready,kind=Deployment,name=db`.
#[derive(Debug, Default)]
struct DependencyFields {
    state: Option<String>,
    matcher: ResourceMatcher,
}

impl FromStr for DependencyFields {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = Self::default();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got {pair:?}"))?;
            let value = Some(value.trim().to_string());
            match key.trim() {
                "state" => fields.state = value,
                "name" => fields.matcher.name = value,
                "namespace" => fields.matcher.namespace = value,
                "group" => fields.matcher.group = value,
                "version" => fields.matcher.version = value,
                "kind" => fields.matcher.kind = value,
                other => return Err(format!("unknown field {other:?}")),
            }
        }
        Ok(fields)
    }
}

/// Parses an internal dependency annotation value.
///
/// The namespace defaults to `default_namespace`; the state defaults to
/// `present`.
///
/// # Errors
///
/// Returns a reason string if the value is malformed.
pub fn parse_internal_dependency(
    value: &str,
    default_namespace: &str,
) -> Result<InternalDependency, String> {
    let mut fields: DependencyFields = value.parse()?;

    let state = match fields.state.as_deref() {
        None | Some("present") => DependencyState::Present,
        Some("ready") => DependencyState::Ready,
        Some(other) => return Err(format!("unknown state {other:?}, expected present or ready")),
    };

    if fields.matcher.kind.is_none() && fields.matcher.name.is_none() {
        return Err(String::from("at least one of kind or name is required"));
    }

    if fields.matcher.namespace.is_none() && !default_namespace.is_empty() {
        fields.matcher.namespace = Some(default_namespace.to_string());
    }

    Ok(InternalDependency {
        matcher: fields.matcher,
        state,
    })
}

/// Parses an external dependency annotation value.
///
/// `kind` and `name` are required; `version` may be omitted only for the
/// core group, where it defaults to `v1`.
///
/// # Errors
///
/// Returns a reason string if the value is malformed or incomplete.
pub fn parse_external_dependency(
    value: &str,
    default_namespace: &str,
) -> Result<ExternalDependency, String> {
    let fields: DependencyFields = value.parse()?;
    if fields.state.is_some() {
        return Err(String::from("external dependencies are always tracked for presence"));
    }

    let m = fields.matcher;
    let kind = m.kind.ok_or_else(|| String::from("kind is required"))?;
    let name = m.name.ok_or_else(|| String::from("name is required"))?;
    let group = m.group.unwrap_or_default();
    let version = match (m.version, group.is_empty()) {
        (Some(v), _) => v,
        (None, true) => String::from("v1"),
        (None, false) => return Err(format!("version is required for group {group:?}")),
    };

    let gvk = GroupVersionKind::new(group, version, kind);
    let namespace = if gvk.is_cluster_scoped() {
        String::new()
    } else {
        m.namespace.unwrap_or_else(|| default_namespace.to_string())
    };

    Ok(ExternalDependency {
        meta: ResourceMeta::new(name, namespace, gvk),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(name: &str, namespace: &str) -> ResourceMeta {
        ResourceMeta::new(name, namespace, GroupVersionKind::new("apps", "v1", "Deployment"))
    }

    #[test]
    fn test_matcher_partial_fields() {
        let matcher = ResourceMatcher {
            kind: Some(String::from("Deployment")),
            namespace: Some(String::from("prod")),
            ..ResourceMatcher::default()
        };

        assert!(matcher.matches(&deployment("a", "prod")));
        assert!(matcher.matches(&deployment("b", "prod")));
        assert!(!matcher.matches(&deployment("a", "staging")));
    }

    #[test]
    fn test_parse_internal_defaults() {
        let dep = parse_internal_dependency("kind=Deployment,name=db", "prod").expect("valid");

        assert_eq!(dep.state, DependencyState::Present);
        assert_eq!(dep.matcher.namespace.as_deref(), Some("prod"));
        assert!(dep.matcher.matches(&deployment("db", "prod")));
    }

    #[test]
    fn test_parse_internal_ready_state() {
        let dep = parse_internal_dependency("state=ready, name=db", "prod").expect("valid");
        assert_eq!(dep.state, DependencyState::Ready);
    }

    #[test]
    fn test_parse_internal_rejects_garbage() {
        assert!(parse_internal_dependency("state=gone,name=db", "ns").is_err());
        assert!(parse_internal_dependency("namespace=x", "ns").is_err());
        assert!(parse_internal_dependency("colour=blue,name=db", "ns").is_err());
    }

    #[test]
    fn test_parse_external_core_group_version_default() {
        let dep = parse_external_dependency("kind=Secret,name=creds,namespace=shared", "prod")
            .expect("valid");

        assert_eq!(dep.meta.gvk, GroupVersionKind::new("", "v1", "Secret"));
        assert_eq!(dep.meta.namespace, "shared");
        assert_eq!(dep.state(), DependencyState::Present);
    }

    #[test]
    fn test_parse_external_requires_version_for_named_group() {
        let err = parse_external_dependency("kind=Deployment,group=apps,name=db", "prod").unwrap_err();
        assert!(err.contains("version"));
    }
}
