//! Bridge from cluster eviction events to the cache's timeout listener.

use std::marker::PhantomData;
use std::sync::Arc;

use roost_cluster::{EntryEvent, EntryListener, lock_owned};
use tracing::{debug, error};

use crate::entry::Entry;
use crate::instance::{CacheKey, StatefulInstance};
use crate::registry::ClusterRegistry;

/// Receives notice of entries the cluster dropped on its own.
pub trait CacheListener<V>: Send + Sync {
    /// `instance` was evicted (idle timeout or capacity). Called while the
    /// entry's lock is held.
    fn timed_out(&self, instance: V);
}

/// Map listener that turns evictions into [`CacheListener::timed_out`] calls.
///
/// Added, updated and removed events are ignored: only the cluster's own
/// removals matter to the container's lifecycle hooks.
pub struct EvictionBridge<K, V> {
    registry: Arc<ClusterRegistry>,
    delegate: Arc<dyn CacheListener<V>>,
    _key: PhantomData<fn() -> K>,
}

impl<K, V> EvictionBridge<K, V> {
    pub fn new(registry: Arc<ClusterRegistry>, delegate: Arc<dyn CacheListener<V>>) -> Self {
        Self {
            registry,
            delegate,
            _key: PhantomData,
        }
    }
}

impl<K: CacheKey, V: StatefulInstance> EntryListener for EvictionBridge<K, V> {
    fn entry_evicted(&self, event: &EntryEvent) {
        let Some(bytes) = &event.value else {
            return;
        };

        let entry = match Entry::<K, V>::decode(bytes, &self.registry) {
            Ok(entry) => entry,
            Err(e) => {
                error!(map = %event.map_name, error = %e, "Could not decode evicted entry");
                return;
            }
        };

        let _guard = lock_owned(entry.lock_handle());
        let instance_id = entry.instance_id().to_string();
        match entry.into_value() {
            Ok(value) => {
                debug!(map = %event.map_name, instance_id = %instance_id, "Entry timed out");
                self.delegate.timed_out(value);
            }
            Err(e) => {
                error!(instance_id = %instance_id, error = %e, "Evicted entry unreadable");
            }
        }
    }
}
