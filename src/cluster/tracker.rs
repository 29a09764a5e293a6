//! Resource state trackers.
//!
//! A tracker waits until a resource reaches a state (present, absent, ready)
//! or fails with a timeout, a terminal resource failure or a cancellation.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cancel::CancelScope;
use crate::error::ClusterError;
use crate::resource::{ReadinessPolicy, ResourceMeta};

use super::client::ClusterClient;
use super::readiness::{evaluate, Readiness};

/// Default interval between two polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Waits for one resource to reach a state.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Runs until the state is reached, the tracker times out or the scope
    /// is cancelled.
    async fn track(&self, cancel: &CancelScope) -> Result<(), ClusterError>;
}

/// Builds trackers for the executor.
pub trait TrackerFactory: Send + Sync {
    /// Tracker resolving once the resource exists.
    fn presence(&self, meta: &ResourceMeta, timeout: Duration) -> Box<dyn Tracker>;

    /// Tracker resolving once the resource is gone.
    fn absence(&self, meta: &ResourceMeta, timeout: Duration) -> Box<dyn Tracker>;

    /// Tracker resolving once the resource is ready.
    fn readiness(
        &self,
        meta: &ResourceMeta,
        timeout: Duration,
        policy: &ReadinessPolicy,
    ) -> Box<dyn Tracker>;
}

#[derive(Debug, Clone)]
enum Goal {
    Presence,
    Absence,
    Readiness(ReadinessPolicy),
}

impl Goal {
    const fn describe(&self) -> &'static str {
        match self {
            Self::Presence => "present",
            Self::Absence => "absent",
            Self::Readiness(_) => "ready",
        }
    }
}

/// Trackers that poll the cluster client.
pub struct PollingTrackerFactory {
    client: Arc<dyn ClusterClient>,
    interval: Duration,
}

impl PollingTrackerFactory {
    /// Creates a factory polling every `interval`.
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>, interval: Duration) -> Self {
        Self { client, interval }
    }

    fn tracker(&self, meta: &ResourceMeta, timeout: Duration, goal: Goal) -> Box<dyn Tracker> {
        Box::new(PollingTracker {
            client: Arc::clone(&self.client),
            meta: meta.clone(),
            timeout,
            interval: self.interval,
            goal,
        })
    }
}

impl TrackerFactory for PollingTrackerFactory {
    fn presence(&self, meta: &ResourceMeta, timeout: Duration) -> Box<dyn Tracker> {
        self.tracker(meta, timeout, Goal::Presence)
    }

    fn absence(&self, meta: &ResourceMeta, timeout: Duration) -> Box<dyn Tracker> {
        self.tracker(meta, timeout, Goal::Absence)
    }

    fn readiness(
        &self,
        meta: &ResourceMeta,
        timeout: Duration,
        policy: &ReadinessPolicy,
    ) -> Box<dyn Tracker> {
        self.tracker(meta, timeout, Goal::Readiness(policy.clone()))
    }
}

struct PollingTracker {
    client: Arc<dyn ClusterClient>,
    meta: ResourceMeta,
    timeout: Duration,
    interval: Duration,
    goal: Goal,
}

impl PollingTracker {
    async fn poll(&self) -> Result<(), ClusterError> {
        let resource = self.meta.id_human();

        loop {
            match (&self.goal, self.client.get(&self.meta).await) {
                (Goal::Presence, Ok(_)) => return Ok(()),
                (Goal::Absence, Err(e)) if e.is_absent() => return Ok(()),
                (Goal::Readiness(policy), Ok(object)) => match evaluate(&object, policy) {
                    Readiness::Ready => return Ok(()),
                    Readiness::Failed(reason) => {
                        return Err(ClusterError::ResourceFailed { resource, reason });
                    }
                    Readiness::Pending(message) if policy.show_service_messages => {
                        info!("{resource}: {message}");
                    }
                    Readiness::Pending(message) => debug!("{resource}: {message}"),
                },
                (_, Err(e)) if !e.is_absent() => return Err(e),
                _ => {}
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

#[async_trait]
impl Tracker for PollingTracker {
    async fn track(&self, cancel: &CancelScope) -> Result<(), ClusterError> {
        debug!(
            "Tracking {} until {} (timeout {}s)",
            self.meta.id_human(),
            self.goal.describe(),
            self.timeout.as_secs()
        );

        tokio::select! {
            biased;
            cause = cancel.cancelled() => Err(ClusterError::Cancelled { cause }),
            result = tokio::time::timeout(self.timeout, self.poll()) => {
                result.unwrap_or_else(|_| {
                    Err(ClusterError::Timeout {
                        resource: self.meta.id_human(),
                        expected_state: self.goal.describe().to_string(),
                        timeout_secs: self.timeout.as_secs(),
                    })
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::client::MockClusterClient;
    use crate::resource::GroupVersionKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn meta() -> ResourceMeta {
        ResourceMeta::new("web", "prod", GroupVersionKind::new("apps", "v1", "Deployment"))
    }

    fn factory(mock: MockClusterClient) -> PollingTrackerFactory {
        PollingTrackerFactory::new(Arc::new(mock), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_presence_resolves_when_found() {
        let mut mock = MockClusterClient::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        mock.expect_get().returning(move |m| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ClusterError::NotFound { resource: m.id_human() })
            } else {
                Ok(json!({"kind": "Deployment"}))
            }
        });

        let tracker = factory(mock).presence(&meta(), Duration::from_secs(5));
        tracker.track(&CancelScope::new()).await.expect("present");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_absence_times_out() {
        let mut mock = MockClusterClient::new();
        mock.expect_get().returning(|_| Ok(json!({"kind": "Deployment"})));

        let tracker = factory(mock).absence(&meta(), Duration::from_millis(30));
        let err = tracker.track(&CancelScope::new()).await.unwrap_err();
        assert!(matches!(err, ClusterError::Timeout { ref expected_state, .. } if expected_state == "absent"));
    }

    #[tokio::test]
    async fn test_readiness_failure_is_terminal() {
        let mut mock = MockClusterClient::new();
        mock.expect_get().returning(|_| {
            Ok(json!({
                "kind": "Job",
                "status": {"conditions": [{"type": "Failed", "status": "True", "message": "backoff"}]}
            }))
        });

        let tracker = factory(mock).readiness(&meta(), Duration::from_secs(5), &ReadinessPolicy::default());
        let err = tracker.track(&CancelScope::new()).await.unwrap_err();
        assert_eq!(
            err,
            ClusterError::ResourceFailed {
                resource: meta().id_human(),
                reason: String::from("backoff"),
            }
        );
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_tracking() {
        let mut mock = MockClusterClient::new();
        mock.expect_get().returning(|_| Ok(json!({"kind": "Deployment"})));

        let scope = CancelScope::new();
        scope.cancel("sibling failed");
        let tracker = factory(mock).absence(&meta(), Duration::from_secs(5));

        let err = tracker.track(&scope).await.unwrap_err();
        assert_eq!(
            err,
            ClusterError::Cancelled {
                cause: String::from("sibling failed"),
            }
        );
    }

    #[tokio::test]
    async fn test_lookup_errors_propagate() {
        let mut mock = MockClusterClient::new();
        mock.expect_get()
            .returning(|m| Err(ClusterError::request(m.id_human(), "forbidden")));

        let tracker = factory(mock).presence(&meta(), Duration::from_secs(5));
        assert!(matches!(
            tracker.track(&CancelScope::new()).await,
            Err(ClusterError::Request { .. })
        ));
    }
}
