//! Distributed stateful cache.
//!
//! Maps caller-visible keys to [`Entry`]s stored in a cluster map. Every read
//! or write of an entry happens under that entry's cluster lock; operations
//! on different keys never share a lock and never hold two at once.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use roost_cluster::{
    Cluster, ClusterConnector, DistributedMap, ListenerId, OwnedMutexGuard, lock_owned,
};
use tracing::{debug, error, info, trace, warn};

use crate::config::CacheConfig;
use crate::entry::{Entry, EntryState, encode_key, entry_lock_name};
use crate::error::{CacheError, Result};
use crate::eviction::{CacheListener, EvictionBridge};
use crate::instance::{CacheKey, StatefulInstance};
use crate::lock::InstanceLockFactory;
use crate::registry::ClusterRegistry;

/// Selects payloads for [`Cache::remove_all`].
pub trait CacheFilter<V> {
    fn matches(&self, instance: &V) -> bool;
}

impl<V, F> CacheFilter<V> for F
where
    F: Fn(&V) -> bool,
{
    fn matches(&self, instance: &V) -> bool {
        self(instance)
    }
}

/// Cache contract consumed by a stateful container.
pub trait Cache<K, V>: Send + Sync {
    /// Store a freshly created instance under `key`, checked out.
    fn add(&self, key: K, value: V) -> Result<()>;

    /// Claim the instance for `key`. `Ok(None)` means not found.
    ///
    /// Nothing is loaded from secondary storage, so `load_if_not_found` does
    /// not change the outcome for an absent key.
    fn check_out(&self, key: &K, load_if_not_found: bool) -> Result<Option<V>>;

    /// Release the instance for `key`. A no-op for absent keys.
    fn check_in(&self, key: &K) -> Result<()>;

    /// Remove `key`, returning its instance for teardown.
    fn remove(&self, key: &K) -> Result<Option<V>>;

    /// Remove every resident instance matching `filter`, returning them.
    fn remove_all(&self, filter: &dyn CacheFilter<V>) -> Result<Vec<V>>;

    /// The registered timeout listener.
    fn listener(&self) -> Option<Arc<dyn CacheListener<V>>>;

    /// Replace the timeout listener.
    fn set_listener(&self, listener: Arc<dyn CacheListener<V>>) -> Result<()>;

    /// Connect to the cluster and bind the backing map. Idempotent.
    fn init(&self) -> Result<()>;

    /// Shut down the cluster connection and forget this cache id.
    fn destroy(&self) -> Result<()>;
}

/// Cluster handles held while the cache is initialized.
#[derive(Clone)]
struct Binding {
    cluster: Arc<dyn Cluster>,
    map: Arc<dyn DistributedMap>,
}

struct ListenerSlot<V> {
    listener: Option<Arc<dyn CacheListener<V>>>,
    registration: Option<ListenerId>,
}

/// Outcome of locking the entry currently stored under a key.
enum Locked<K, V> {
    /// No entry under the key.
    Absent,
    /// Lock held and the entry re-read under it, with its stored bytes.
    Held(OwnedMutexGuard, Entry<K, V>, Vec<u8>),
    /// The key was rebound to an entry with a different lock meanwhile.
    Moved,
}

/// Cache of stateful instances backed by a cluster map.
pub struct StatefulCache<K, V> {
    config: CacheConfig,
    connector: Arc<dyn ClusterConnector>,
    registry: Arc<ClusterRegistry>,
    binding: RwLock<Option<Binding>>,
    listener: Mutex<ListenerSlot<V>>,
    _key: PhantomData<fn() -> K>,
}

impl<K: CacheKey, V: StatefulInstance> StatefulCache<K, V> {
    /// Create an uninitialized cache. Call [`Cache::init`] before use.
    pub fn new(
        config: CacheConfig,
        connector: Arc<dyn ClusterConnector>,
        registry: Arc<ClusterRegistry>,
    ) -> Self {
        Self {
            config,
            connector,
            registry,
            binding: RwLock::new(None),
            listener: Mutex::new(ListenerSlot {
                listener: None,
                registration: None,
            }),
            _key: PhantomData,
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The registry entries are decoded against.
    pub fn registry(&self) -> &Arc<ClusterRegistry> {
        &self.registry
    }

    /// The cluster this cache is bound to.
    pub fn cluster(&self) -> Result<Arc<dyn Cluster>> {
        Ok(self.binding()?.cluster)
    }

    /// Lock factory sharing this cache's cluster.
    pub fn lock_factory(&self) -> Result<InstanceLockFactory> {
        Ok(InstanceLockFactory::new(self.cluster()?))
    }

    /// Number of resident entries.
    pub fn len(&self) -> Result<usize> {
        Ok(self.binding()?.map.len()?)
    }

    /// Whether no entries are resident.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Cache statistics.
    pub fn stats(&self) -> Result<CacheStats> {
        let binding = self.binding()?;
        Ok(CacheStats {
            cache_id: self.config.cache_id.clone(),
            map_name: self.config.map_name.clone(),
            cluster: binding.cluster.name().to_string(),
            resident: binding.map.len()?,
            listener_registered: self.listener.lock().registration.is_some(),
        })
    }

    fn binding(&self) -> Result<Binding> {
        self.binding
            .read()
            .clone()
            .ok_or_else(|| CacheError::NotInitialized(self.config.cache_id.clone()))
    }

    fn fetch(&self, binding: &Binding, key: &[u8]) -> Result<Option<(Entry<K, V>, Vec<u8>)>> {
        match binding.map.get(key)? {
            Some(bytes) => Ok(Some((Entry::decode(&bytes, &self.registry)?, bytes))),
            None => Ok(None),
        }
    }

    /// Insert a new entry, arming its idle timeout.
    fn store(&self, binding: &Binding, key: &[u8], entry: &Entry<K, V>) -> Result<()> {
        binding
            .map
            .set(key.to_vec(), entry.encode()?, entry.timeout())?;
        Ok(())
    }

    /// Write `entry` back over `stored`, re-arming its idle timeout.
    ///
    /// Returns `false` when the key no longer holds `stored`, which under the
    /// entry lock means it expired (and was handed to the listener) after the
    /// re-read. The entry is then gone and must not be revived.
    fn write_back(
        &self,
        binding: &Binding,
        key: &[u8],
        stored: &[u8],
        entry: &Entry<K, V>,
    ) -> Result<bool> {
        Ok(binding
            .map
            .replace_if(key, stored, entry.encode()?, entry.timeout())?)
    }

    /// Lock the entry stored under `key` and re-read it under the lock.
    ///
    /// The first read only tells us which lock to take; the copy it returned
    /// may be stale by the time the lock is ours.
    fn lock_current(&self, binding: &Binding, key: &[u8]) -> Result<Locked<K, V>> {
        let Some((snapshot, _)) = self.fetch(binding, key)? else {
            return Ok(Locked::Absent);
        };
        let guard = lock_owned(snapshot.lock_handle());

        match self.fetch(binding, key)? {
            None => Ok(Locked::Absent),
            Some((current, bytes)) if current.lock().name() == guard.name() => {
                Ok(Locked::Held(guard, current, bytes))
            }
            Some(_) => Ok(Locked::Moved),
        }
    }

    /// [`lock_current`](Self::lock_current), retrying while the key moves.
    fn lock_resident(
        &self,
        binding: &Binding,
        key: &K,
        key_bytes: &[u8],
    ) -> Result<Option<(OwnedMutexGuard, Entry<K, V>, Vec<u8>)>> {
        let attempts = self.config.max_checkout_attempts;
        for _ in 0..attempts {
            match self.lock_current(binding, key_bytes)? {
                Locked::Absent => return Ok(None),
                Locked::Held(guard, entry, stored) => return Ok(Some((guard, entry, stored))),
                Locked::Moved => trace!(key = ?key, "Entry rebound while locking, retrying"),
            }
        }
        Err(CacheError::Contended {
            key: format!("{key:?}"),
            attempts,
        })
    }

    /// Purge `key` after exhausting checkout attempts.
    fn purge_corrupted(&self, binding: &Binding, key: &K, key_bytes: &[u8]) -> Result<CacheError> {
        let attempts = self.config.max_checkout_attempts;
        if let Some(bytes) = binding.map.remove(key_bytes)? {
            match Entry::<K, V>::decode(&bytes, &self.registry) {
                Ok(mut entry) => {
                    let _guard = lock_owned(entry.lock_handle());
                    entry.set_state(EntryState::Removed)?;
                }
                Err(e) => warn!(key = ?key, error = %e, "Purged entry could not be decoded"),
            }
        }
        error!(
            cache_id = %self.config.cache_id,
            key = ?key,
            attempts,
            "Cache is corrupted, entry purged"
        );
        Ok(CacheError::Corrupted {
            key: format!("{key:?}"),
            attempts,
        })
    }

    fn register_listener(&self, binding: &Binding, slot: &mut ListenerSlot<V>) -> Result<()> {
        let Some(listener) = slot.listener.clone() else {
            return Ok(());
        };
        if let Some(previous) = slot.registration.take() {
            binding.map.remove_entry_listener(previous)?;
        }

        let bridge = EvictionBridge::<K, V>::new(Arc::clone(&self.registry), listener);
        let id = binding.map.add_entry_listener(Arc::new(bridge))?;
        slot.registration = Some(id);
        debug!(cache_id = %self.config.cache_id, listener = %id, "Timeout listener registered");
        Ok(())
    }
}

impl<K: CacheKey, V: StatefulInstance> Cache<K, V> for StatefulCache<K, V> {
    fn add(&self, key: K, value: V) -> Result<()> {
        let binding = self.binding()?;
        let key_bytes = encode_key(&key)?;

        if let Some((_guard, existing, _)) = self.lock_resident(&binding, &key, &key_bytes)? {
            if existing.state()? != EntryState::Removed {
                return Err(CacheError::AlreadyExists {
                    key: format!("{key:?}"),
                });
            }
            debug!(key = ?key, "Purging stale removed entry");
            binding.map.remove(&key_bytes)?;
        }

        // The new lock is unreachable by other threads until the entry is stored.
        let lock = binding.cluster.lock(&entry_lock_name(value.instance_id()));
        let entry = Entry::new(
            self.config.cache_id.clone(),
            key,
            value,
            EntryState::CheckedOut,
            lock,
        );
        self.store(&binding, &key_bytes, &entry)?;
        debug!(
            cache_id = %self.config.cache_id,
            instance_id = %entry.instance_id(),
            "Entry added"
        );
        Ok(())
    }

    fn check_out(&self, key: &K, _load_if_not_found: bool) -> Result<Option<V>> {
        let binding = self.binding()?;
        let key_bytes = encode_key(key)?;

        for attempt in 1..=self.config.max_checkout_attempts {
            let (_guard, mut entry, stored) = match self.lock_current(&binding, &key_bytes)? {
                Locked::Absent => return Ok(None),
                Locked::Moved => continue,
                Locked::Held(guard, entry, stored) => (guard, entry, stored),
            };

            match entry.state()? {
                EntryState::Available => {
                    entry.set_state(EntryState::CheckedOut)?;
                    if !self.write_back(&binding, &key_bytes, &stored, &entry)? {
                        trace!(key = ?key, "Entry expired before check-out");
                        return Ok(None);
                    }
                    trace!(key = ?key, "Entry checked out");
                    return Ok(Some(entry.into_value()?));
                }
                EntryState::CheckedOut => {
                    if !self.write_back(&binding, &key_bytes, &stored, &entry)? {
                        trace!(key = ?key, "Entry expired before check-out");
                        return Ok(None);
                    }
                    trace!(key = ?key, "Entry re-entered while checked out");
                    return Ok(Some(entry.into_value()?));
                }
                EntryState::Passivated => {
                    warn!(key = ?key, attempt, "Stale passivated entry, removing and retrying");
                    binding.map.remove_if(&key_bytes, &stored)?;
                }
                EntryState::Removed => return Ok(None),
            }
        }

        Err(self.purge_corrupted(&binding, key, &key_bytes)?)
    }

    fn check_in(&self, key: &K) -> Result<()> {
        let binding = self.binding()?;
        let key_bytes = encode_key(key)?;

        let Some((_guard, mut entry, stored)) = self.lock_resident(&binding, key, &key_bytes)?
        else {
            trace!(key = ?key, "Check-in of absent entry ignored");
            return Ok(());
        };

        match entry.state()? {
            EntryState::Passivated => Err(CacheError::NotCheckedOut {
                key: format!("{key:?}"),
            }),
            EntryState::Removed => Ok(()),
            EntryState::Available | EntryState::CheckedOut => {
                entry.set_state(EntryState::Available)?;
                if self.write_back(&binding, &key_bytes, &stored, &entry)? {
                    trace!(key = ?key, "Entry checked in");
                } else {
                    trace!(key = ?key, "Entry expired before check-in");
                }
                Ok(())
            }
        }
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        let binding = self.binding()?;
        let key_bytes = encode_key(key)?;

        let Some((_guard, mut entry, stored)) = self.lock_resident(&binding, key, &key_bytes)?
        else {
            return Ok(None);
        };

        // Lost to expiry after the re-read: the listener already has it.
        if !binding.map.remove_if(&key_bytes, &stored)? {
            return Ok(None);
        }
        entry.set_state(EntryState::Removed)?;
        debug!(cache_id = %self.config.cache_id, key = ?key, "Entry removed");
        Ok(Some(entry.into_value()?))
    }

    fn remove_all(&self, filter: &dyn CacheFilter<V>) -> Result<Vec<V>> {
        let binding = self.binding()?;
        let mut removed = Vec::new();

        for bytes in binding.map.values()? {
            let snapshot = match Entry::<K, V>::decode(&bytes, &self.registry) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        cache_id = %self.config.cache_id,
                        error = %e,
                        "Skipping undecodable entry"
                    );
                    continue;
                }
            };
            let _guard = lock_owned(snapshot.lock_handle());
            let key_bytes = encode_key(snapshot.key()?)?;

            // Skip keys that vanished or were rebound since the snapshot.
            let Some((mut current, stored)) = self.fetch(&binding, &key_bytes)? else {
                continue;
            };
            if current.lock().name() != snapshot.lock().name() {
                continue;
            }

            if filter.matches(current.value()?) && binding.map.remove_if(&key_bytes, &stored)? {
                current.set_state(EntryState::Removed)?;
                removed.push(current.into_value()?);
            }
        }

        if !removed.is_empty() {
            debug!(
                cache_id = %self.config.cache_id,
                count = removed.len(),
                "Removed matching entries"
            );
        }
        Ok(removed)
    }

    fn listener(&self) -> Option<Arc<dyn CacheListener<V>>> {
        self.listener.lock().listener.clone()
    }

    fn set_listener(&self, listener: Arc<dyn CacheListener<V>>) -> Result<()> {
        // Binding before slot, the same order `init` takes them in.
        let bound = self.binding.read();
        let mut slot = self.listener.lock();
        slot.listener = Some(listener);
        // Before init the listener is only remembered.
        match bound.as_ref() {
            Some(binding) => self.register_listener(binding, &mut slot),
            None => Ok(()),
        }
    }

    fn init(&self) -> Result<()> {
        let mut bound = self.binding.write();
        if bound.as_ref().is_some_and(|b| b.cluster.is_running()) {
            return Ok(());
        }

        let cache_id = &self.config.cache_id;
        let cluster = self
            .connector
            .connect(&self.config.cluster)
            .map_err(|source| CacheError::Init {
                cache_id: cache_id.clone(),
                source,
            })?;
        let map = cluster
            .map(&self.config.map_name)
            .map_err(|source| CacheError::Init {
                cache_id: cache_id.clone(),
                source,
            })?;

        if let Some(existing) = self.registry.lookup(cache_id)
            && !existing.is_running()
        {
            debug!(cache_id = %cache_id, "Replacing stopped cluster registration");
            self.registry.unregister(cache_id);
        }
        self.registry.register(cache_id, Arc::clone(&cluster));
        let binding = Binding { cluster, map };

        {
            let mut slot = self.listener.lock();
            slot.registration = None;
            self.register_listener(&binding, &mut slot)?;
        }

        info!(
            cache_id = %cache_id,
            cluster = %binding.cluster.name(),
            map = %self.config.map_name,
            "Stateful cache initialized"
        );
        *bound = Some(binding);
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        let Some(binding) = self.binding.write().take() else {
            return Ok(());
        };

        self.listener.lock().registration = None;
        self.registry.unregister(&self.config.cache_id);
        binding.cluster.shutdown();
        info!(cache_id = %self.config.cache_id, "Stateful cache destroyed");
        Ok(())
    }
}

impl<K, V> fmt::Debug for StatefulCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatefulCache")
            .field("cache_id", &self.config.cache_id)
            .field("map_name", &self.config.map_name)
            .field("initialized", &self.binding.read().is_some())
            .finish()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Logical cache id.
    pub cache_id: String,

    /// Backing map name.
    pub map_name: String,

    /// Cluster instance name.
    pub cluster: String,

    /// Number of resident entries.
    pub resident: usize,

    /// Whether a timeout listener is registered with the map.
    pub listener_registered: bool,
}
