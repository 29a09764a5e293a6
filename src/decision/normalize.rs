//! Object normalization, redaction and diffs.
//!
//! Live objects and dry-run results carry server-populated fields that never
//! appear in a desired object. Both sides are normalized before comparison.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use similar::TextDiff;

/// Release name provenance annotation.
pub const ANNOTATION_RELEASE_NAME: &str = "rollplan.io/release-name";
/// Release namespace provenance annotation.
pub const ANNOTATION_RELEASE_NAMESPACE: &str = "rollplan.io/release-namespace";
/// Client-side apply bookkeeping annotation.
pub const ANNOTATION_LAST_APPLIED: &str = "kubectl.kubernetes.io/last-applied-configuration";

const SERVER_METADATA: &[&str] = &[
    "managedFields",
    "resourceVersion",
    "uid",
    "generation",
    "creationTimestamp",
    "selfLink",
];

const IGNORED_ANNOTATIONS: &[&str] = &[
    ANNOTATION_RELEASE_NAME,
    ANNOTATION_RELEASE_NAMESPACE,
    ANNOTATION_LAST_APPLIED,
];

/// Returns a copy without server-populated fields and provenance annotations.
#[must_use]
pub fn normalize(object: &Value) -> Value {
    let mut object = object.clone();
    let Some(root) = object.as_object_mut() else {
        return object;
    };

    root.remove("status");

    if let Some(metadata) = root.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in SERVER_METADATA {
            metadata.remove(*field);
        }

        let empty = metadata
            .get_mut("annotations")
            .and_then(Value::as_object_mut)
            .is_some_and(|annotations| {
                for key in IGNORED_ANNOTATIONS {
                    annotations.remove(*key);
                }
                annotations.is_empty()
            });
        if empty {
            metadata.remove("annotations");
        }
    }

    object
}

/// Returns true if both objects are equal once normalized.
#[must_use]
pub fn equivalent(live: &Value, desired: &Value) -> bool {
    normalize(live) == normalize(desired)
}

/// Replaces the values of `Secret` data with SHA-256 digests.
#[must_use]
pub fn redact(object: &Value) -> Value {
    let mut object = object.clone();
    if object.get("kind").and_then(Value::as_str) != Some("Secret") {
        return object;
    }

    for section in ["data", "stringData"] {
        if let Some(data) = object.get_mut(section).and_then(Value::as_object_mut) {
            let redacted: Map<String, Value> = data
                .iter()
                .map(|(k, v)| {
                    let raw = v.as_str().map_or_else(|| v.to_string(), str::to_string);
                    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
                    (k.clone(), Value::String(format!("sha256:{digest}")))
                })
                .collect();
            *data = redacted;
        }
    }
    object
}

/// Unified diff of two (optional) objects, normalized and redacted, as YAML.
#[must_use]
pub fn unified_diff(before: Option<&Value>, after: Option<&Value>, label: &str) -> String {
    let render = |object: Option<&Value>| {
        object
            .map(|o| serde_yaml::to_string(&redact(&normalize(o))).unwrap_or_default())
            .unwrap_or_default()
    };
    let (old, new) = (render(before), render(after));

    TextDiff::from_lines(&old, &new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{label}"), &format!("b/{label}"))
        .to_string()
}
