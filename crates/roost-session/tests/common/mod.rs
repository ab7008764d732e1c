//! Common test utilities for integration tests.
//!
//! [`RecordingConnector`] wraps a [`LocalConnector`] so that every mutex the
//! cache (or a decoded entry) obtains is instrumented: each lock name has a
//! [`HoldCounter`] counting how many threads are inside its critical section at
//! once.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use roost_cluster::local::LocalConnector;
use roost_cluster::{
    Cluster, ClusterConfig, ClusterConnector, DistributedMap, DistributedMutex, EntryListener,
    ListenerId, Result as ClusterResult,
};
use roost_session::{
    Cache, CacheConfig, CacheListener, ClusterRegistry, SessionInstance, StatefulCache,
};

pub type Instance = SessionInstance<u32>;
pub type TestCache = StatefulCache<String, Instance>;

// ─────────────────────────────────────────────────────────────────────────────
// Instrumented mutex
// ─────────────────────────────────────────────────────────────────────────────

/// Overlap counters for one lock name.
#[derive(Default)]
pub struct HoldCounter {
    holds: Mutex<HashMap<ThreadId, usize>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    entries: AtomicUsize,
}

impl HoldCounter {
    fn enter(&self) {
        let mut holds = self.holds.lock();
        let depth = holds.entry(thread::current().id()).or_insert(0);
        *depth += 1;
        if *depth == 1 {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            self.entries.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn exit(&self) {
        let mut holds = self.holds.lock();
        let id = thread::current().id();
        if let Some(depth) = holds.get_mut(&id) {
            *depth -= 1;
            if *depth == 0 {
                holds.remove(&id);
                self.active.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    /// Most threads ever inside the critical section at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Number of outermost acquisitions.
    pub fn entries(&self) -> usize {
        self.entries.load(Ordering::SeqCst)
    }
}

struct RecordingMutex {
    inner: Arc<dyn DistributedMutex>,
    counter: Arc<HoldCounter>,
}

impl DistributedMutex for RecordingMutex {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn lock(&self) {
        self.inner.lock();
        self.counter.enter();
        // Widen the window for a second holder to show up.
        thread::yield_now();
    }

    fn unlock(&self) -> ClusterResult<()> {
        if self.inner.is_held_by_current_thread() {
            self.counter.exit();
        }
        self.inner.unlock()
    }

    fn try_lock(&self) -> bool {
        let acquired = self.inner.try_lock();
        if acquired {
            self.counter.enter();
        }
        acquired
    }

    fn try_lock_for(&self, timeout: Duration) -> bool {
        let acquired = self.inner.try_lock_for(timeout);
        if acquired {
            self.counter.enter();
        }
        acquired
    }

    fn is_held_by_current_thread(&self) -> bool {
        self.inner.is_held_by_current_thread()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instrumented cluster
// ─────────────────────────────────────────────────────────────────────────────

/// Counters shared by every cluster a [`RecordingConnector`] hands out.
#[derive(Default)]
pub struct HoldCounters {
    by_name: Mutex<HashMap<String, Arc<HoldCounter>>>,
}

impl HoldCounters {
    pub fn get(&self, name: &str) -> Arc<HoldCounter> {
        Arc::clone(self.by_name.lock().entry(name.to_string()).or_default())
    }

    pub fn names(&self) -> Vec<String> {
        self.by_name.lock().keys().cloned().collect()
    }
}

struct RecordingCluster {
    inner: Arc<dyn Cluster>,
    counters: Arc<HoldCounters>,
    sticky_remove_if: bool,
}

impl Cluster for RecordingCluster {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn map(&self, name: &str) -> ClusterResult<Arc<dyn DistributedMap>> {
        let inner = self.inner.map(name)?;
        if self.sticky_remove_if {
            Ok(Arc::new(StickyMap { inner }))
        } else {
            Ok(inner)
        }
    }

    fn lock(&self, name: &str) -> Arc<dyn DistributedMutex> {
        Arc::new(RecordingMutex {
            inner: self.inner.lock(name),
            counter: self.counters.get(name),
        })
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    fn shutdown(&self) {
        self.inner.shutdown();
    }
}

/// Map whose `remove_if` never removes anything.
struct StickyMap {
    inner: Arc<dyn DistributedMap>,
}

impl DistributedMap for StickyMap {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get(&self, key: &[u8]) -> ClusterResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&self, key: Vec<u8>, value: Vec<u8>, ttl: Option<Duration>) -> ClusterResult<()> {
        self.inner.set(key, value, ttl)
    }

    fn remove(&self, key: &[u8]) -> ClusterResult<Option<Vec<u8>>> {
        self.inner.remove(key)
    }

    fn remove_if(&self, _key: &[u8], _expected: &[u8]) -> ClusterResult<bool> {
        Ok(false)
    }

    fn replace_if(
        &self,
        key: &[u8],
        expected: &[u8],
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> ClusterResult<bool> {
        self.inner.replace_if(key, expected, value, ttl)
    }

    fn values(&self) -> ClusterResult<Vec<Vec<u8>>> {
        self.inner.values()
    }

    fn len(&self) -> ClusterResult<usize> {
        self.inner.len()
    }

    fn add_entry_listener(&self, listener: Arc<dyn EntryListener>) -> ClusterResult<ListenerId> {
        self.inner.add_entry_listener(listener)
    }

    fn remove_entry_listener(&self, id: ListenerId) -> ClusterResult<bool> {
        self.inner.remove_entry_listener(id)
    }
}

/// Connector returning instrumented clusters.
pub struct RecordingConnector {
    inner: LocalConnector,
    pub counters: Arc<HoldCounters>,
    sticky_remove_if: AtomicBool,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self {
            inner: LocalConnector::new(),
            counters: Arc::new(HoldCounters::default()),
            sticky_remove_if: AtomicBool::new(false),
        }
    }

    /// Make `remove_if` on handed-out maps a no-op.
    pub fn with_sticky_remove_if(self) -> Self {
        self.sticky_remove_if.store(true, Ordering::SeqCst);
        self
    }
}

impl ClusterConnector for RecordingConnector {
    fn connect(&self, config: &ClusterConfig) -> ClusterResult<Arc<dyn Cluster>> {
        Ok(Arc::new(RecordingCluster {
            inner: self.inner.connect(config)?,
            counters: Arc::clone(&self.counters),
            sticky_remove_if: self.sticky_remove_if.load(Ordering::SeqCst),
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Cache configuration with its own cluster instance.
pub fn config(name: &str) -> CacheConfig {
    CacheConfig::new().with_cache_id(name).with_cluster(
        ClusterConfig::new()
            .with_instance_name(name)
            .with_reap_interval(Duration::from_millis(20)),
    )
}

/// An initialized cache over a plain local cluster.
pub fn local_cache(name: &str) -> TestCache {
    let cache = StatefulCache::new(
        config(name),
        Arc::new(LocalConnector::new()),
        Arc::new(ClusterRegistry::new()),
    );
    cache.init().unwrap();
    cache
}

pub fn instance(id: &str, state: u32) -> Instance {
    SessionInstance::new(state).with_id(id)
}

/// Listener collecting timed out instances.
#[derive(Default)]
pub struct Collect {
    pub timed_out: Mutex<Vec<Instance>>,
}

impl CacheListener<Instance> for Collect {
    fn timed_out(&self, instance: Instance) {
        self.timed_out.lock().push(instance);
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
