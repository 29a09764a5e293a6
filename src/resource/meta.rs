//! Resource identity types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ConfigError;

/// Kinds that never live in a namespace.
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "MutatingWebhookConfiguration",
    "Namespace",
    "PersistentVolume",
    "PriorityClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

/// A (group, version, kind) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionKind {
    /// API group, empty for the core group.
    #[serde(default)]
    pub group: String,
    /// API version.
    pub version: String,
    /// Kind.
    pub kind: String,
}

impl GroupVersionKind {
    /// Creates a new GVK.
    #[must_use]
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Parses an `apiVersion` string (`apps/v1` or `v1`) together with a kind.
    #[must_use]
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    /// Returns the `apiVersion` string.
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Returns true if objects of this kind are cluster-scoped.
    #[must_use]
    pub fn is_cluster_scoped(&self) -> bool {
        CLUSTER_SCOPED_KINDS.contains(&self.kind.as_str())
    }

    /// Returns true for `CustomResourceDefinition`.
    #[must_use]
    pub fn is_crd(&self) -> bool {
        self.group == "apiextensions.k8s.io" && self.kind == "CustomResourceDefinition"
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Identity and metadata of a managed resource.
///
/// Two metas refer to the same logical resource when name, namespace, group
/// and kind match. The version is not part of the identity since a resource
/// cannot exist at two versions at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    /// Resource name.
    pub name: String,
    /// Namespace, empty for cluster-scoped resources.
    #[serde(default)]
    pub namespace: String,
    /// Group, version and kind.
    pub gvk: GroupVersionKind,
    /// File the manifest was rendered from.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_path: String,
    /// Annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ResourceMeta {
    /// Creates a meta with no annotations, labels or file path.
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, gvk: GroupVersionKind) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            gvk,
            file_path: String::new(),
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }

    /// Reads the meta of an unstructured object.
    ///
    /// An empty namespace falls back to `default_namespace` unless the kind
    /// is cluster-scoped.
    ///
    /// # Errors
    ///
    /// Returns an error if `apiVersion`, `kind` or `metadata.name` is missing.
    pub fn from_object(
        object: &serde_json::Value,
        default_namespace: &str,
        file_path: &str,
    ) -> Result<Self, ConfigError> {
        let field = |pointer: &str| object.pointer(pointer).and_then(serde_json::Value::as_str);
        let missing = |what: &str| ConfigError::InvalidManifest {
            file_path: (!file_path.is_empty()).then(|| file_path.to_string()),
            message: format!("missing {what}"),
        };

        let api_version = field("/apiVersion").ok_or_else(|| missing("apiVersion"))?;
        let kind = field("/kind").ok_or_else(|| missing("kind"))?;
        let name = field("/metadata/name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| missing("metadata.name"))?;

        let gvk = GroupVersionKind::from_api_version(api_version, kind);
        let namespace = if gvk.is_cluster_scoped() {
            String::new()
        } else {
            field("/metadata/namespace")
                .filter(|ns| !ns.is_empty())
                .unwrap_or(default_namespace)
                .to_string()
        };

        Ok(Self {
            name: name.to_string(),
            namespace,
            gvk,
            file_path: file_path.to_string(),
            annotations: string_map(object.pointer("/metadata/annotations")),
            labels: string_map(object.pointer("/metadata/labels")),
        })
    }

    /// Canonical identity string, stable across versions.
    #[must_use]
    pub fn id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.namespace, self.gvk.group, self.gvk.kind, self.name
        )
    }

    /// Identity for display only.
    #[must_use]
    pub fn id_human(&self) -> String {
        if self.namespace.is_empty() {
            format!("{}/{}", self.gvk.kind, self.name)
        } else {
            format!("{}/{} (namespace: {})", self.gvk.kind, self.name, self.namespace)
        }
    }

    /// Returns true if both metas refer to the same logical resource.
    #[must_use]
    pub fn same_resource(&self, other: &Self) -> bool {
        self.name == other.name
            && self.namespace == other.namespace
            && self.gvk.group == other.gvk.group
            && self.gvk.kind == other.gvk.kind
    }
}

impl fmt::Display for ResourceMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id_human())
    }
}

fn string_map(value: Option<&serde_json::Value>) -> BTreeMap<String, String> {
    value
        .and_then(serde_json::Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
