//! In-memory collaborators for tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cancel::CancelScope;
use crate::cluster::{ClusterClient, PropagationPolicy, Tracker, TrackerFactory};
use crate::error::{ClusterError, ReleaseError, Result};
use crate::release::{LockInfo, Release, ReleaseStore};
use crate::resource::{ReadinessPolicy, ResourceMeta, ResourceSpec};

/// Cluster holding objects in a map keyed by resource ID.
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<HashMap<String, serde_json::Value>>,
    failures: Mutex<HashMap<String, ClusterError>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, meta: &ResourceMeta, object: serde_json::Value) {
        self.objects.lock().unwrap().insert(meta.id(), object);
    }

    pub fn contains(&self, meta: &ResourceMeta) -> bool {
        self.objects.lock().unwrap().contains_key(&meta.id())
    }

    /// Makes `action` ("get", "apply", "create", "delete") fail for a resource.
    pub fn fail_on(&self, action: &str, meta: &ResourceMeta, error: ClusterError) {
        self.failures
            .lock()
            .unwrap()
            .insert(format!("{action} {}", meta.id()), error);
    }

    /// Recorded mutating calls, as `"{action} {resource id}"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn check(&self, action: &str, meta: &ResourceMeta) -> std::result::Result<(), ClusterError> {
        match self.failures.lock().unwrap().get(&format!("{action} {}", meta.id())) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn record(&self, action: &str, meta: &ResourceMeta) {
        self.calls.lock().unwrap().push(format!("{action} {}", meta.id()));
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get(&self, meta: &ResourceMeta) -> std::result::Result<serde_json::Value, ClusterError> {
        self.check("get", meta)?;
        self.objects
            .lock()
            .unwrap()
            .get(&meta.id())
            .cloned()
            .ok_or_else(|| ClusterError::NotFound { resource: meta.id_human() })
    }

    async fn apply(
        &self,
        spec: &ResourceSpec,
        dry_run: bool,
    ) -> std::result::Result<serde_json::Value, ClusterError> {
        self.check("apply", &spec.meta)?;
        if !dry_run {
            self.record("apply", &spec.meta);
            self.insert(&spec.meta, spec.object.clone());
        }
        Ok(spec.object.clone())
    }

    async fn create(&self, spec: &ResourceSpec) -> std::result::Result<serde_json::Value, ClusterError> {
        self.check("create", &spec.meta)?;
        self.record("create", &spec.meta);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&spec.meta.id()) {
            return Err(ClusterError::request(spec.meta.id_human(), "already exists"));
        }
        objects.insert(spec.meta.id(), spec.object.clone());
        Ok(spec.object.clone())
    }

    async fn delete(
        &self,
        meta: &ResourceMeta,
        _propagation: PropagationPolicy,
    ) -> std::result::Result<(), ClusterError> {
        self.check("delete", meta)?;
        self.record("delete", meta);
        self.objects
            .lock()
            .unwrap()
            .remove(&meta.id())
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound { resource: meta.id_human() })
    }

    async fn merge_patch(
        &self,
        meta: &ResourceMeta,
        patch: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ClusterError> {
        self.record("patch", meta);
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&meta.id())
            .ok_or_else(|| ClusterError::NotFound { resource: meta.id_human() })?;
        if let Some(fields) = patch.pointer("/metadata/managedFields")
            && let Some(metadata) = object.get_mut("metadata").and_then(|m| m.as_object_mut())
        {
            metadata.insert(String::from("managedFields"), fields.clone());
        }
        Ok(object.clone())
    }
}

/// Trackers answering from a [`FakeCluster`].
pub struct FakeTrackers {
    cluster: Arc<FakeCluster>,
    readiness_delay: Duration,
    failing: HashSet<String>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeTrackers {
    pub fn new(cluster: Arc<FakeCluster>) -> Self {
        Self {
            cluster,
            readiness_delay: Duration::ZERO,
            failing: HashSet::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub const fn with_readiness_delay(mut self, delay: Duration) -> Self {
        self.readiness_delay = delay;
        self
    }

    /// Readiness tracking of this resource fails.
    pub fn failing(mut self, meta: &ResourceMeta) -> Self {
        self.failing.insert(meta.id());
        self
    }

    /// Highest number of readiness trackers running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

enum FakeGoal {
    Presence,
    Absence,
    Readiness { delay: Duration, fail: bool },
}

struct FakeTracker {
    cluster: Arc<FakeCluster>,
    meta: ResourceMeta,
    goal: FakeGoal,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl Tracker for FakeTracker {
    async fn track(&self, cancel: &CancelScope) -> std::result::Result<(), ClusterError> {
        let resource = self.meta.id_human();
        match self.goal {
            FakeGoal::Presence if self.cluster.contains(&self.meta) => Ok(()),
            FakeGoal::Absence if !self.cluster.contains(&self.meta) => Ok(()),
            FakeGoal::Presence | FakeGoal::Absence => Err(ClusterError::Timeout {
                resource,
                expected_state: String::from("present or absent"),
                timeout_secs: 0,
            }),
            FakeGoal::Readiness { delay, fail } => {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);

                let result = tokio::select! {
                    cause = cancel.cancelled() => Err(ClusterError::Cancelled { cause }),
                    () = tokio::time::sleep(delay) => {
                        if fail {
                            Err(ClusterError::ResourceFailed { resource, reason: String::from("crash loop") })
                        } else {
                            Ok(())
                        }
                    }
                };

                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                result
            }
        }
    }
}

impl FakeTrackers {
    fn tracker(&self, meta: &ResourceMeta, goal: FakeGoal) -> Box<dyn Tracker> {
        Box::new(FakeTracker {
            cluster: Arc::clone(&self.cluster),
            meta: meta.clone(),
            goal,
            in_flight: Arc::clone(&self.in_flight),
            peak: Arc::clone(&self.peak),
        })
    }
}

impl TrackerFactory for FakeTrackers {
    fn presence(&self, meta: &ResourceMeta, _timeout: Duration) -> Box<dyn Tracker> {
        self.tracker(meta, FakeGoal::Presence)
    }

    fn absence(&self, meta: &ResourceMeta, _timeout: Duration) -> Box<dyn Tracker> {
        self.tracker(meta, FakeGoal::Absence)
    }

    fn readiness(
        &self,
        meta: &ResourceMeta,
        _timeout: Duration,
        _policy: &ReadinessPolicy,
    ) -> Box<dyn Tracker> {
        let goal = FakeGoal::Readiness {
            delay: self.readiness_delay,
            fail: self.failing.contains(&meta.id()),
        };
        self.tracker(meta, goal)
    }
}

/// Release store in memory.
#[derive(Default)]
pub struct InMemoryReleaseStore {
    releases: Mutex<BTreeMap<(String, String, u32), Release>>,
    lock: Mutex<Option<LockInfo>>,
}

impl InMemoryReleaseStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, name: &str, namespace: &str, revision: u32) -> Option<Release> {
        self.releases
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string(), revision))
            .cloned()
    }

    fn key(release: &Release) -> (String, String, u32) {
        (release.namespace.clone(), release.name.clone(), release.revision)
    }
}

#[async_trait]
impl ReleaseStore for InMemoryReleaseStore {
    async fn create_release(&self, release: &Release) -> Result<()> {
        let mut releases = self.releases.lock().unwrap();
        if releases.contains_key(&Self::key(release)) {
            return Err(ReleaseError::AlreadyExists {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
                revision: release.revision,
            }
            .into());
        }
        releases.insert(Self::key(release), release.clone());
        Ok(())
    }

    async fn update_release(&self, release: &Release) -> Result<()> {
        let mut releases = self.releases.lock().unwrap();
        match releases.get_mut(&Self::key(release)) {
            Some(existing) => {
                *existing = release.clone();
                Ok(())
            }
            None => Err(ReleaseError::NotFound {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
                revision: release.revision,
            }
            .into()),
        }
    }

    async fn delete_release(&self, name: &str, namespace: &str, revision: u32) -> Result<()> {
        self.releases
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string(), revision));
        Ok(())
    }

    async fn releases(&self, name: &str, namespace: &str) -> Result<Vec<Release>> {
        Ok(self
            .releases
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.name == name && r.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn acquire_lock(&self, name: &str, namespace: &str, holder: &str) -> Result<LockInfo> {
        let mut lock = self.lock.lock().unwrap();
        if let Some(existing) = lock.as_ref()
            && !existing.is_expired()
        {
            return Err(ReleaseError::LockedByOther {
                holder: existing.holder.clone(),
                since: existing.acquired_at.to_rfc3339(),
            }
            .into());
        }
        let info = LockInfo::new(holder, &format!("{namespace}/{name}"));
        *lock = Some(info.clone());
        Ok(info)
    }

    async fn release_lock(&self, _name: &str, _namespace: &str, lock_id: &str) -> Result<()> {
        let mut lock = self.lock.lock().unwrap();
        if lock.as_ref().is_some_and(|l| l.lock_id == lock_id) {
            *lock = None;
        }
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

/// A fixed timestamp keeps release values comparable in assertions.
pub fn fixed_release(name: &str, namespace: &str, revision: u32) -> Release {
    let mut release = Release::new(
        name,
        namespace,
        revision,
        crate::release::DeployType::Install,
        Vec::new(),
    );
    let at = Utc::now();
    release.created_at = at;
    release.updated_at = at;
    release
}
