//! Generic readiness rules for live objects.

use serde_json::Value;

use crate::resource::ReadinessPolicy;

/// Readiness verdict for one observation of a live object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The object reached its desired state.
    Ready,
    /// Not there yet; carries a short progress message.
    Pending(String),
    /// Terminal failure; carries the reason.
    Failed(String),
}

/// Evaluates the readiness of an object by kind.
///
/// Kinds without a dedicated rule fall back to their `Ready` condition and
/// count as ready when they have none.
#[must_use]
pub fn evaluate(object: &Value, policy: &ReadinessPolicy) -> Readiness {
    let kind = object.get("kind").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "Deployment" => deployment(object),
        "StatefulSet" => stateful_set(object),
        "DaemonSet" => daemon_set(object),
        "Job" => job(object, policy),
        "Pod" => pod(object, policy),
        "PersistentVolumeClaim" => pvc(object),
        _ => ready_condition(object),
    }
}

fn int(object: &Value, pointer: &str) -> Option<i64> {
    object.pointer(pointer).and_then(Value::as_i64)
}

fn condition<'a>(object: &'a Value, kind: &str) -> Option<&'a Value> {
    object
        .pointer("/status/conditions")
        .and_then(Value::as_array)?
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(kind))
}

fn condition_true(object: &Value, kind: &str) -> bool {
    condition(object, kind).and_then(|c| c.get("status")).and_then(Value::as_str) == Some("True")
}

fn observed_current(object: &Value) -> bool {
    match (int(object, "/metadata/generation"), int(object, "/status/observedGeneration")) {
        (Some(generation), Some(observed)) => observed >= generation,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

fn deployment(object: &Value) -> Readiness {
    if let Some(progressing) = condition(object, "Progressing")
        && progressing.get("reason").and_then(Value::as_str) == Some("ProgressDeadlineExceeded")
    {
        return Readiness::Failed(String::from("progress deadline exceeded"));
    }
    if !observed_current(object) {
        return Readiness::Pending(String::from("waiting for the controller to observe the spec"));
    }

    let desired = int(object, "/spec/replicas").unwrap_or(1);
    let updated = int(object, "/status/updatedReplicas").unwrap_or(0);
    let available = int(object, "/status/availableReplicas").unwrap_or(0);

    if updated >= desired && available >= desired {
        Readiness::Ready
    } else {
        Readiness::Pending(format!("{available}/{desired} replicas available, {updated} updated"))
    }
}

fn stateful_set(object: &Value) -> Readiness {
    if !observed_current(object) {
        return Readiness::Pending(String::from("waiting for the controller to observe the spec"));
    }

    let desired = int(object, "/spec/replicas").unwrap_or(1);
    let ready = int(object, "/status/readyReplicas").unwrap_or(0);
    let on_delete = object.pointer("/spec/updateStrategy/type").and_then(Value::as_str) == Some("OnDelete");
    let updated = if on_delete {
        desired
    } else {
        int(object, "/status/updatedReplicas").unwrap_or(0)
    };

    if ready >= desired && updated >= desired {
        Readiness::Ready
    } else {
        Readiness::Pending(format!("{ready}/{desired} replicas ready, {updated} updated"))
    }
}

fn daemon_set(object: &Value) -> Readiness {
    if !observed_current(object) {
        return Readiness::Pending(String::from("waiting for the controller to observe the spec"));
    }

    let desired = int(object, "/status/desiredNumberScheduled").unwrap_or(0);
    let ready = int(object, "/status/numberReady").unwrap_or(0);
    let updated = int(object, "/status/updatedNumberScheduled").unwrap_or(0);

    if ready >= desired && updated >= desired {
        Readiness::Ready
    } else {
        Readiness::Pending(format!("{ready}/{desired} pods ready, {updated} updated"))
    }
}

fn job(object: &Value, policy: &ReadinessPolicy) -> Readiness {
    if condition_true(object, "Complete") {
        return Readiness::Ready;
    }
    if condition_true(object, "Failed") {
        let reason = condition(object, "Failed")
            .and_then(|c| c.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("job failed");
        return Readiness::Failed(reason.to_string());
    }

    let parallelism = int(object, "/spec/parallelism").unwrap_or(1).max(1);
    let allowed = i64::from(policy.failures_allowed_per_replica) * parallelism;
    let failed = int(object, "/status/failed").unwrap_or(0);
    if failed > allowed {
        return Readiness::Failed(format!("{failed} pod failures, {allowed} allowed"));
    }

    let succeeded = int(object, "/status/succeeded").unwrap_or(0);
    Readiness::Pending(format!("{succeeded} succeeded, {failed} failed"))
}

fn pod(object: &Value, policy: &ReadinessPolicy) -> Readiness {
    let phase = object.pointer("/status/phase").and_then(Value::as_str).unwrap_or("Pending");
    match phase {
        "Succeeded" => return Readiness::Ready,
        "Failed" => return Readiness::Failed(String::from("pod failed")),
        _ => {}
    }

    let restarts: i64 = object
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .map(|statuses| {
            statuses
                .iter()
                .filter_map(|s| s.get("restartCount").and_then(Value::as_i64))
                .sum()
        })
        .unwrap_or(0);
    if restarts > i64::from(policy.failures_allowed_per_replica) {
        return Readiness::Failed(format!("containers restarted {restarts} times"));
    }

    if phase == "Running" && condition_true(object, "Ready") {
        Readiness::Ready
    } else {
        Readiness::Pending(format!("pod is {phase}"))
    }
}

fn pvc(object: &Value) -> Readiness {
    match object.pointer("/status/phase").and_then(Value::as_str) {
        Some("Bound") => Readiness::Ready,
        Some("Lost") => Readiness::Failed(String::from("claim lost its volume")),
        other => Readiness::Pending(format!("claim is {}", other.unwrap_or("Pending"))),
    }
}

fn ready_condition(object: &Value) -> Readiness {
    match condition(object, "Ready") {
        None => Readiness::Ready,
        Some(_) if condition_true(object, "Ready") => Readiness::Ready,
        Some(c) => Readiness::Pending(
            c.get("message")
                .and_then(Value::as_str)
                .unwrap_or("not ready")
                .to_string(),
        ),
    }
}
