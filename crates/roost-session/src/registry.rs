//! Cache id to cluster registry.
//!
//! A serialized entry carries only its cache id and lock name. Whoever
//! decodes it looks the cache id up here to obtain the cluster that owns the
//! lock. Caches register at `init` and unregister at `destroy`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use roost_cluster::Cluster;
use tracing::{debug, warn};

/// Registry of live cluster connections keyed by cache id.
#[derive(Default)]
pub struct ClusterRegistry {
    clusters: RwLock<HashMap<String, Arc<dyn Cluster>>>,
}

impl ClusterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `cache_id` to `cluster` unless it is already bound.
    ///
    /// Returns `true` if this call created the binding.
    pub fn register(&self, cache_id: &str, cluster: Arc<dyn Cluster>) -> bool {
        let mut clusters = self.clusters.write();
        if let Some(existing) = clusters.get(cache_id) {
            if existing.name() != cluster.name() {
                warn!(
                    cache_id = %cache_id,
                    registered = %existing.name(),
                    ignored = %cluster.name(),
                    "Cache id already bound to another cluster"
                );
            }
            return false;
        }
        debug!(cache_id = %cache_id, cluster = %cluster.name(), "Cluster registered");
        clusters.insert(cache_id.to_string(), cluster);
        true
    }

    /// Remove the binding for `cache_id`.
    pub fn unregister(&self, cache_id: &str) -> Option<Arc<dyn Cluster>> {
        let removed = self.clusters.write().remove(cache_id);
        if removed.is_some() {
            debug!(cache_id = %cache_id, "Cluster unregistered");
        }
        removed
    }

    /// The cluster bound to `cache_id`.
    pub fn lookup(&self, cache_id: &str) -> Option<Arc<dyn Cluster>> {
        self.clusters.read().get(cache_id).cloned()
    }

    /// Number of bound cache ids.
    pub fn len(&self) -> usize {
        self.clusters.read().len()
    }

    /// Whether no cache id is bound.
    pub fn is_empty(&self) -> bool {
        self.clusters.read().is_empty()
    }
}
