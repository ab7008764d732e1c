//! Cache entries and their wire format.
//!
//! An [`Entry`] binds a key to a stateful payload and tracks its lifecycle
//! state. Key, value and state are only reachable while the current thread
//! holds the entry's cluster lock; every accessor checks this and fails with
//! [`CacheError::EntryNotLocked`] otherwise.
//!
//! The entry does not own its lock. It keeps a handle to a mutex named after
//! the payload's instance id, and on the wire it carries only that name. The
//! decoder resolves the handle again through the [`ClusterRegistry`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use roost_cluster::{DistributedMutex, MutexHandle};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::instance::{CacheKey, StatefulInstance};
use crate::registry::ClusterRegistry;

/// Prefix of entry lock names.
pub const ENTRY_LOCK_PREFIX: &str = "roost-stateful-lock-";

/// Name of the lock guarding entries for `instance_id`.
pub fn entry_lock_name(instance_id: &str) -> String {
    format!("{ENTRY_LOCK_PREFIX}{instance_id}")
}

/// Lifecycle state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryState {
    /// Resident and not in use.
    Available,
    /// In use by a call.
    CheckedOut,
    /// Reserved for passivation, which this cache never performs. Observing
    /// it means the entry is stale.
    Passivated,
    /// Terminal: the key no longer resolves to this entry.
    Removed,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryState::Available => write!(f, "AVAILABLE"),
            EntryState::CheckedOut => write!(f, "CHECKED_OUT"),
            EntryState::Passivated => write!(f, "PASSIVATED"),
            EntryState::Removed => write!(f, "REMOVED"),
        }
    }
}

/// A resident cache entry.
pub struct Entry<K, V> {
    cache_id: String,
    instance_id: String,
    key: K,
    value: V,
    state: EntryState,
    lock: MutexHandle,
}

impl<K: CacheKey, V: StatefulInstance> Entry<K, V> {
    /// Create an entry.
    pub fn new(
        cache_id: impl Into<String>,
        key: K,
        value: V,
        state: EntryState,
        lock: MutexHandle,
    ) -> Self {
        Self {
            cache_id: cache_id.into(),
            instance_id: value.instance_id().to_string(),
            key,
            value,
            state,
            lock,
        }
    }

    /// Id of the cache that created the entry.
    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }

    /// Id of the payload instance.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The entry's lock.
    pub fn lock(&self) -> &dyn DistributedMutex {
        self.lock.as_ref()
    }

    /// Shared handle to the entry's lock.
    pub fn lock_handle(&self) -> MutexHandle {
        Arc::clone(&self.lock)
    }

    /// The payload's idle timeout. Readable without the lock: it is fixed at
    /// creation and needed to write the entry back.
    pub fn timeout(&self) -> Option<Duration> {
        self.value.timeout()
    }

    /// The cache key. Fails with `EntryNotLocked` unless the lock is held.
    pub fn key(&self) -> Result<&K> {
        self.assert_locked()?;
        Ok(&self.key)
    }

    /// The payload. Fails with `EntryNotLocked` unless the lock is held.
    pub fn value(&self) -> Result<&V> {
        self.assert_locked()?;
        Ok(&self.value)
    }

    /// Consume the entry, returning its payload.
    pub fn into_value(self) -> Result<V> {
        self.assert_locked()?;
        Ok(self.value)
    }

    /// Current lifecycle state. Fails with `EntryNotLocked` unless the lock is held.
    pub fn state(&self) -> Result<EntryState> {
        self.assert_locked()?;
        Ok(self.state)
    }

    /// Move to `state`. Fails with `EntryNotLocked` unless the lock is held.
    pub fn set_state(&mut self, state: EntryState) -> Result<()> {
        self.assert_locked()?;
        self.state = state;
        Ok(())
    }

    fn assert_locked(&self) -> Result<()> {
        if self.lock.is_held_by_current_thread() {
            Ok(())
        } else {
            Err(CacheError::EntryNotLocked)
        }
    }

    /// Serialize the entry.
    ///
    /// Field order: instance id, cache id, lock name, key, value, state.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let wire = WireEntryRef {
            instance_id: &self.instance_id,
            cache_id: &self.cache_id,
            lock_name: self.lock.name(),
            key: &self.key,
            value: &self.value,
            state: self.state,
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Deserialize an entry, resolving its lock through `registry`.
    pub fn decode(bytes: &[u8], registry: &ClusterRegistry) -> Result<Self> {
        let wire: WireEntry<K, V> = serde_json::from_slice(bytes)?;
        let cluster = registry
            .lookup(&wire.cache_id)
            .ok_or_else(|| CacheError::UnknownCache(wire.cache_id.clone()))?;
        let lock = cluster.lock(&wire.lock_name);

        Ok(Self {
            cache_id: wire.cache_id,
            instance_id: wire.instance_id,
            key: wire.key,
            value: wire.value,
            state: wire.state,
            lock,
        })
    }
}

impl<K, V> fmt::Debug for Entry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key, value and state stay behind the lock.
        f.debug_struct("Entry")
            .field("cache_id", &self.cache_id)
            .field("instance_id", &self.instance_id)
            .field("lock", &self.lock.name())
            .finish_non_exhaustive()
    }
}

/// Serialize a key for use as a map key.
pub fn encode_key<K: CacheKey>(key: &K) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(key)?)
}

#[derive(Serialize)]
struct WireEntryRef<'a, K, V> {
    instance_id: &'a str,
    cache_id: &'a str,
    lock_name: &'a str,
    key: &'a K,
    value: &'a V,
    state: EntryState,
}

#[derive(Deserialize)]
struct WireEntry<K, V> {
    instance_id: String,
    cache_id: String,
    lock_name: String,
    key: K,
    value: V,
    state: EntryState,
}
