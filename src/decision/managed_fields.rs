//! Field-manager reconciliation.
//!
//! Fields owned by legacy managers (client-side apply, older tooling, our own
//! non-apply updates) are moved into our server-side apply entry so that later
//! applies can take them over or prune them. Fields owned by manual-edit
//! managers move only when manual changes are to be discarded.

use serde_json::{json, Map, Value};

/// Managers whose fields are always migrated.
const LEGACY_MANAGERS: &[&str] = &["helm", "kubectl-client-side-apply", "before-first-apply"];

/// Managers of manual edits, migrated only on request.
const MANUAL_MANAGERS: &[&str] = &[
    "kubectl-edit",
    "kubectl-patch",
    "kubectl-label",
    "kubectl-annotate",
    "kubectl-scale",
    "kubectl-set",
];

/// Options of the reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldManagerOptions {
    /// Our field manager name.
    pub field_manager: String,
    /// Take over fields edited by hand.
    pub discard_manual_changes: bool,
}

/// Computes the merge patch rewriting `metadata.managedFields` of a live
/// object, or `None` when nothing needs to move.
#[must_use]
pub fn reconcile_managed_fields(live: &Value, options: &FieldManagerOptions) -> Option<Value> {
    let entries = live.pointer("/metadata/managedFields")?.as_array()?;

    let mut kept: Vec<Value> = Vec::with_capacity(entries.len());
    let mut migrated = Value::Object(Map::new());
    let mut moved = false;

    for entry in entries {
        if should_migrate(entry, options) {
            if let Some(fields) = entry.get("fieldsV1") {
                merge_fields(&mut migrated, fields);
            }
            moved = true;
        } else {
            kept.push(entry.clone());
        }
    }

    if !moved {
        return None;
    }

    let own_apply = kept.iter_mut().find(|e| {
        field(e, "manager") == Some(options.field_manager.as_str())
            && field(e, "operation") == Some("Apply")
            && is_main_resource(e)
    });

    match own_apply {
        Some(entry) => {
            let fields = entry
                .as_object_mut()
                .map(|o| o.entry("fieldsV1").or_insert_with(|| Value::Object(Map::new())));
            if let Some(fields) = fields {
                merge_fields(fields, &migrated);
            }
        }
        None => kept.push(json!({
            "manager": options.field_manager,
            "operation": "Apply",
            "apiVersion": live.get("apiVersion").cloned().unwrap_or(Value::Null),
            "fieldsType": "FieldsV1",
            "fieldsV1": migrated,
        })),
    }

    Some(json!({"metadata": {"managedFields": kept}}))
}

fn field<'a>(entry: &'a Value, name: &str) -> Option<&'a str> {
    entry.get(name).and_then(Value::as_str)
}

fn is_main_resource(entry: &Value) -> bool {
    field(entry, "subresource").is_none_or(str::is_empty)
}

fn should_migrate(entry: &Value, options: &FieldManagerOptions) -> bool {
    if !is_main_resource(entry) {
        return false;
    }
    let Some(manager) = field(entry, "manager") else {
        return false;
    };

    let own_update = manager == options.field_manager && field(entry, "operation") == Some("Update");
    let legacy = LEGACY_MANAGERS.contains(&manager);
    let manual = options.discard_manual_changes && MANUAL_MANAGERS.contains(&manager);

    own_update || legacy || manual
}

/// Deep union of two `fieldsV1` trees.
fn merge_fields(target: &mut Value, source: &Value) {
    let (Some(target), Some(source)) = (target.as_object_mut(), source.as_object()) else {
        return;
    };
    for (key, value) in source {
        match target.get_mut(key) {
            Some(existing) if existing.is_object() && value.is_object() => merge_fields(existing, value),
            Some(_) => {}
            None => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(discard: bool) -> FieldManagerOptions {
        FieldManagerOptions {
            field_manager: String::from("rollplan"),
            discard_manual_changes: discard,
        }
    }

    fn live(entries: Value) -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "managedFields": entries}
        })
    }

    #[test]
    fn test_no_patch_when_nothing_to_migrate() {
        let obj = live(json!([
            {"manager": "rollplan", "operation": "Apply", "fieldsV1": {"f:spec": {}}},
            {"manager": "kube-controller-manager", "operation": "Update", "subresource": "status"}
        ]));
        assert!(reconcile_managed_fields(&obj, &options(true)).is_none());
        assert!(reconcile_managed_fields(&json!({"metadata": {}}), &options(true)).is_none());
    }

    #[test]
    fn test_legacy_fields_merge_into_own_apply_entry() {
        let obj = live(json!([
            {"manager": "rollplan", "operation": "Apply", "fieldsV1": {"f:spec": {"f:replicas": {}}}},
            {"manager": "kubectl-client-side-apply", "operation": "Update",
             "fieldsV1": {"f:spec": {"f:template": {}}, "f:metadata": {"f:labels": {}}}},
            {"manager": "rollplan", "operation": "Update", "fieldsV1": {"f:data": {}}}
        ]));

        let patch = reconcile_managed_fields(&obj, &options(false)).expect("patch");
        let entries = patch["metadata"]["managedFields"].as_array().expect("array");

        assert_eq!(entries.len(), 1);
        let fields = &entries[0]["fieldsV1"];
        assert!(fields["f:spec"].get("f:replicas").is_some());
        assert!(fields["f:spec"].get("f:template").is_some());
        assert!(fields.get("f:metadata").is_some());
        assert!(fields.get("f:data").is_some());
    }

    #[test]
    fn test_manual_managers_only_when_discarding() {
        let obj = live(json!([
            {"manager": "kubectl-edit", "operation": "Update", "fieldsV1": {"f:spec": {}}}
        ]));

        assert!(reconcile_managed_fields(&obj, &options(false)).is_none());

        let patch = reconcile_managed_fields(&obj, &options(true)).expect("patch");
        let entries = patch["metadata"]["managedFields"].as_array().expect("array");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["manager"], "rollplan");
        assert_eq!(entries[0]["operation"], "Apply");
        assert_eq!(entries[0]["apiVersion"], "apps/v1");
    }

    #[test]
    fn test_status_subresource_entries_are_left_alone() {
        let obj = live(json!([
            {"manager": "helm", "operation": "Update", "subresource": "status", "fieldsV1": {"f:status": {}}}
        ]));
        assert!(reconcile_managed_fields(&obj, &options(true)).is_none());
    }
}
