//! In-process cluster: named maps, named mutexes and an expiry reaper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::map::LocalMap;
use super::mutex::LockTable;
use crate::cluster::{Cluster, ClusterConfig, ClusterConnector};
use crate::error::{ClusterError, Result};
use crate::map::DistributedMap;
use crate::mutex::DistributedMutex;

/// URL scheme accepted by [`LocalConnector`].
pub const LOCAL_URL_SCHEME: &str = "local://";

/// State shared between the cluster handle and its reaper thread.
struct Shared {
    name: String,
    running: Arc<AtomicBool>,
    maps: Mutex<HashMap<String, Arc<LocalMap>>>,
    stop: Mutex<bool>,
    wake: Condvar,
}

/// A single-process cluster.
///
/// Every map and mutex lives in this process; "cluster-wide" means shared by
/// every handle obtained from the same `LocalCluster`.
pub struct LocalCluster {
    shared: Arc<Shared>,
    config: ClusterConfig,
    locks: Arc<LockTable>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl LocalCluster {
    /// Bootstrap a cluster and start its reaper.
    pub fn start(config: ClusterConfig) -> Result<Arc<Self>> {
        if let Some(url) = &config.url
            && !url.starts_with(LOCAL_URL_SCHEME)
        {
            return Err(ClusterError::Bootstrap(format!(
                "unsupported cluster url '{}' (expected {}...)",
                url, LOCAL_URL_SCHEME
            )));
        }

        let shared = Arc::new(Shared {
            name: config.instance_name.clone(),
            running: Arc::new(AtomicBool::new(true)),
            maps: Mutex::new(HashMap::new()),
            stop: Mutex::new(false),
            wake: Condvar::new(),
        });
        let locks = Arc::new(LockTable::default());

        let reaper = {
            let shared = Arc::clone(&shared);
            let locks = Arc::clone(&locks);
            let interval = config.reap_interval;
            thread::Builder::new()
                .name(format!("roost-reaper-{}", config.instance_name))
                .spawn(move || {
                    let mut stop = shared.stop.lock();
                    while !*stop {
                        shared.wake.wait_for(&mut stop, interval);
                        if *stop {
                            break;
                        }
                        drop(stop);
                        let maps: Vec<Arc<LocalMap>> =
                            shared.maps.lock().values().cloned().collect();
                        for map in maps {
                            map.evict_expired();
                        }
                        locks.prune();
                        stop = shared.stop.lock();
                    }
                    debug!(cluster = %shared.name, "Reaper stopped");
                })
                .map_err(|e| ClusterError::Bootstrap(e.to_string()))?
        };

        info!(
            cluster = %config.instance_name,
            reap_interval_ms = config.reap_interval.as_millis() as u64,
            "Local cluster started"
        );

        Ok(Arc::new(Self {
            shared,
            config,
            locks,
            reaper: Mutex::new(Some(reaper)),
        }))
    }

    /// Configuration the cluster was started with.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Typed access to a map, for callers that need [`LocalMap`] extras.
    pub fn local_map(&self, name: &str) -> Result<Arc<LocalMap>> {
        if !self.is_running() {
            return Err(ClusterError::ShutDown(self.shared.name.clone()));
        }
        let mut maps = self.shared.maps.lock();
        let map = maps.entry(name.to_string()).or_insert_with(|| {
            debug!(cluster = %self.shared.name, map = %name, "Creating map");
            Arc::new(LocalMap::new(
                name,
                &self.shared.name,
                Arc::clone(&self.shared.running),
                self.config.max_entries,
            ))
        });
        Ok(Arc::clone(map))
    }

    fn stop_reaper(&self) {
        *self.shared.stop.lock() = true;
        self.shared.wake.notify_all();

        if let Some(handle) = self.reaper.lock().take() {
            if handle.thread().id() == thread::current().id() {
                // Shutdown triggered from a listener running on the reaper.
                return;
            }
            if handle.join().is_err() {
                warn!(cluster = %self.shared.name, "Reaper thread panicked");
            }
        }
    }
}

impl Cluster for LocalCluster {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn map(&self, name: &str) -> Result<Arc<dyn DistributedMap>> {
        let map: Arc<dyn DistributedMap> = self.local_map(name)?;
        Ok(map)
    }

    fn lock(&self, name: &str) -> Arc<dyn DistributedMutex> {
        Arc::new(self.locks.get(name))
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.stop_reaper();
        for map in self.shared.maps.lock().drain().map(|(_, map)| map) {
            map.clear();
        }
        info!(cluster = %self.shared.name, "Local cluster shut down");
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Connector handing out [`LocalCluster`]s by instance name.
///
/// A running cluster is reused for every connect with the same name; a shut
/// down one is replaced.
#[derive(Default)]
pub struct LocalConnector {
    clusters: Mutex<HashMap<String, Weak<LocalCluster>>>,
}

impl LocalConnector {
    /// Create a connector with no running clusters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed variant of [`ClusterConnector::connect`].
    pub fn connect_local(&self, config: &ClusterConfig) -> Result<Arc<LocalCluster>> {
        let mut clusters = self.clusters.lock();
        if let Some(existing) = clusters
            .get(&config.instance_name)
            .and_then(Weak::upgrade)
            .filter(|cluster| cluster.is_running())
        {
            debug!(cluster = %config.instance_name, "Reusing running cluster");
            return Ok(existing);
        }

        let cluster = LocalCluster::start(config.clone())?;
        clusters.insert(config.instance_name.clone(), Arc::downgrade(&cluster));
        Ok(cluster)
    }

    /// Number of clusters still running.
    pub fn running(&self) -> usize {
        self.clusters
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .filter(|cluster| cluster.is_running())
            .count()
    }
}

impl ClusterConnector for LocalConnector {
    fn connect(&self, config: &ClusterConfig) -> Result<Arc<dyn Cluster>> {
        let cluster: Arc<dyn Cluster> = self.connect_local(config)?;
        Ok(cluster)
    }
}
