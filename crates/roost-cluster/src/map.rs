//! Distributed map contract and entry lifecycle events.
//!
//! Keys and values cross this boundary as serialized bytes, the same way
//! they travel between members of a partitioned map. Typed views are built
//! on top by callers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Identifier returned when registering an [`EntryListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Kind of change an [`EntryEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryEventKind {
    /// A key was inserted for the first time.
    Added,
    /// An existing key was overwritten.
    Updated,
    /// A key was removed explicitly.
    Removed,
    /// A key was removed by the cluster (expiry or capacity pressure).
    Evicted,
}

impl fmt::Display for EntryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryEventKind::Added => write!(f, "added"),
            EntryEventKind::Updated => write!(f, "updated"),
            EntryEventKind::Removed => write!(f, "removed"),
            EntryEventKind::Evicted => write!(f, "evicted"),
        }
    }
}

/// A change to a single map entry.
#[derive(Debug, Clone)]
pub struct EntryEvent {
    /// Name of the map the entry belongs to.
    pub map_name: String,
    /// What happened.
    pub kind: EntryEventKind,
    /// Serialized key.
    pub key: Vec<u8>,
    /// Serialized value involved in the change. For removals and evictions
    /// this is the value that left the map.
    pub value: Option<Vec<u8>>,
    /// Previous value for updates.
    pub old_value: Option<Vec<u8>>,
}

/// Callbacks for entry lifecycle events. All methods default to no-ops.
pub trait EntryListener: Send + Sync {
    fn entry_added(&self, _event: &EntryEvent) {}

    fn entry_updated(&self, _event: &EntryEvent) {}

    fn entry_removed(&self, _event: &EntryEvent) {}

    fn entry_evicted(&self, _event: &EntryEvent) {}
}

/// Route `event` to the matching listener callback.
pub fn dispatch(listener: &dyn EntryListener, event: &EntryEvent) {
    match event.kind {
        EntryEventKind::Added => listener.entry_added(event),
        EntryEventKind::Updated => listener.entry_updated(event),
        EntryEventKind::Removed => listener.entry_removed(event),
        EntryEventKind::Evicted => listener.entry_evicted(event),
    }
}

/// A key/value mapping replicated or partitioned across the cluster.
pub trait DistributedMap: Send + Sync {
    /// Name of this map within its cluster.
    fn name(&self) -> &str;

    /// Current value for `key`, if resident.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`. With `ttl`, the entry is evicted once it
    /// has not been written for that long; `None` means no expiry.
    fn set(&self, key: Vec<u8>, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Remove `key`, returning the value it held.
    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Remove `key` only if it currently maps to `expected`.
    fn remove_if(&self, key: &[u8], expected: &[u8]) -> Result<bool>;

    /// Overwrite `key` with `value` only if it currently maps to `expected`.
    /// Never inserts, so an expired or removed key stays absent.
    fn replace_if(
        &self,
        key: &[u8],
        expected: &[u8],
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool>;

    /// Snapshot of all resident values.
    fn values(&self) -> Result<Vec<Vec<u8>>>;

    /// Number of resident entries.
    fn len(&self) -> Result<usize>;

    /// Whether the map holds no resident entries.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Register a listener for entry events on this map.
    fn add_entry_listener(&self, listener: Arc<dyn EntryListener>) -> Result<ListenerId>;

    /// Deregister a listener. Returns `false` if it was not registered.
    fn remove_entry_listener(&self, id: ListenerId) -> Result<bool>;
}
