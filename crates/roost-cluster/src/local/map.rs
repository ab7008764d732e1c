//! In-process distributed map with TTL expiry and LRU capacity eviction.

use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::error::{ClusterError, Result};
use crate::map::{DistributedMap, EntryEvent, EntryEventKind, EntryListener, ListenerId, dispatch};

/// Stored value plus its expiry deadline.
#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

struct MapInner {
    entries: LruCache<Vec<u8>, Slot>,
    listeners: Vec<(ListenerId, Arc<dyn EntryListener>)>,
}

/// Events produced while the map lock was held, delivered after release.
struct Pending {
    events: Vec<EntryEvent>,
    listeners: Vec<Arc<dyn EntryListener>>,
}

impl Pending {
    fn deliver(self) {
        for event in &self.events {
            for listener in &self.listeners {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| dispatch(listener.as_ref(), event)));
                if outcome.is_err() {
                    error!(
                        map = %event.map_name,
                        kind = %event.kind,
                        "Entry listener panicked"
                    );
                }
            }
        }
    }
}

/// A map owned by a [`LocalCluster`](super::LocalCluster).
pub struct LocalMap {
    name: String,
    cluster_name: String,
    running: Arc<AtomicBool>,
    next_listener: AtomicU64,
    inner: Mutex<MapInner>,
}

impl LocalMap {
    pub(crate) fn new(
        name: &str,
        cluster_name: &str,
        running: Arc<AtomicBool>,
        max_entries: Option<usize>,
    ) -> Self {
        let entries = match max_entries.and_then(NonZeroUsize::new) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };

        Self {
            name: name.to_string(),
            cluster_name: cluster_name.to_string(),
            running,
            next_listener: AtomicU64::new(1),
            inner: Mutex::new(MapInner {
                entries,
                listeners: Vec::new(),
            }),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ClusterError::ShutDown(self.cluster_name.clone()))
        }
    }

    fn event(
        &self,
        kind: EntryEventKind,
        key: Vec<u8>,
        value: Option<Vec<u8>>,
        old_value: Option<Vec<u8>>,
    ) -> EntryEvent {
        EntryEvent {
            map_name: self.name.clone(),
            kind,
            key,
            value,
            old_value,
        }
    }

    fn pending(&self, inner: &MapInner, events: Vec<EntryEvent>) -> Pending {
        let listeners = if events.is_empty() {
            Vec::new()
        } else {
            inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        Pending { events, listeners }
    }

    /// Pop `key` if its deadline has passed, recording an eviction.
    fn evict_if_expired(&self, inner: &mut MapInner, key: &[u8], events: &mut Vec<EntryEvent>) {
        let expired = inner
            .entries
            .peek(key)
            .is_some_and(|slot| slot.is_expired(Instant::now()));
        if expired && let Some(slot) = inner.entries.pop(key) {
            trace!(map = %self.name, "Entry expired on access");
            events.push(self.event(EntryEventKind::Evicted, key.to_vec(), Some(slot.value), None));
        }
    }

    fn drain_expired(&self, inner: &mut MapInner) -> Vec<EntryEvent> {
        let now = Instant::now();
        let expired: Vec<Vec<u8>> = inner
            .entries
            .iter()
            .filter(|(_, slot)| slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| {
                let slot = inner.entries.pop(&key)?;
                Some(self.event(EntryEventKind::Evicted, key, Some(slot.value), None))
            })
            .collect()
    }

    /// Evict every expired entry. Returns the number evicted.
    pub fn evict_expired(&self) -> usize {
        if !self.running.load(Ordering::Acquire) {
            return 0;
        }
        let pending = {
            let mut inner = self.inner.lock();
            let events = self.drain_expired(&mut inner);
            self.pending(&inner, events)
        };
        let count = pending.events.len();
        if count > 0 {
            debug!(map = %self.name, count, "Evicted expired entries");
        }
        pending.deliver();
        count
    }

    /// Drop every entry and listener without emitting events.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.listeners.clear();
    }
}

impl DistributedMap for LocalMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_running()?;
        let mut events = Vec::new();
        let (value, pending) = {
            let mut inner = self.inner.lock();
            self.evict_if_expired(&mut inner, key, &mut events);
            let value = inner.entries.get(key).map(|slot| slot.value.clone());
            (value, self.pending(&inner, events))
        };
        pending.deliver();
        Ok(value)
    }

    fn set(&self, key: Vec<u8>, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.ensure_running()?;
        let mut events = Vec::new();
        let pending = {
            let mut inner = self.inner.lock();
            self.evict_if_expired(&mut inner, &key, &mut events);

            let slot = Slot::new(value.clone(), ttl);
            match inner.entries.push(key.clone(), slot) {
                Some((old_key, old)) if old_key == key => {
                    events.push(self.event(
                        EntryEventKind::Updated,
                        key,
                        Some(value),
                        Some(old.value),
                    ));
                }
                Some((evicted_key, evicted)) => {
                    debug!(map = %self.name, "Evicting least recently used entry at capacity");
                    events.push(self.event(EntryEventKind::Added, key, Some(value), None));
                    events.push(self.event(
                        EntryEventKind::Evicted,
                        evicted_key,
                        Some(evicted.value),
                        None,
                    ));
                }
                None => {
                    events.push(self.event(EntryEventKind::Added, key, Some(value), None));
                }
            }
            self.pending(&inner, events)
        };
        pending.deliver();
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_running()?;
        let mut events = Vec::new();
        let (removed, pending) = {
            let mut inner = self.inner.lock();
            self.evict_if_expired(&mut inner, key, &mut events);
            let removed = inner.entries.pop(key).map(|slot| slot.value);
            if let Some(value) = &removed {
                events.push(self.event(
                    EntryEventKind::Removed,
                    key.to_vec(),
                    Some(value.clone()),
                    None,
                ));
            }
            (removed, self.pending(&inner, events))
        };
        pending.deliver();
        Ok(removed)
    }

    fn remove_if(&self, key: &[u8], expected: &[u8]) -> Result<bool> {
        self.ensure_running()?;
        let mut events = Vec::new();
        let (removed, pending) = {
            let mut inner = self.inner.lock();
            self.evict_if_expired(&mut inner, key, &mut events);
            let matches = inner
                .entries
                .peek(key)
                .is_some_and(|slot| slot.value == expected);
            if matches && let Some(slot) = inner.entries.pop(key) {
                events.push(self.event(
                    EntryEventKind::Removed,
                    key.to_vec(),
                    Some(slot.value),
                    None,
                ));
            }
            (matches, self.pending(&inner, events))
        };
        pending.deliver();
        Ok(removed)
    }

    fn replace_if(
        &self,
        key: &[u8],
        expected: &[u8],
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        self.ensure_running()?;
        let mut events = Vec::new();
        let (replaced, pending) = {
            let mut inner = self.inner.lock();
            self.evict_if_expired(&mut inner, key, &mut events);
            let replaced = match inner.entries.get_mut(key) {
                Some(slot) if slot.value == expected => {
                    let old = std::mem::replace(slot, Slot::new(value.clone(), ttl));
                    events.push(self.event(
                        EntryEventKind::Updated,
                        key.to_vec(),
                        Some(value),
                        Some(old.value),
                    ));
                    true
                }
                _ => false,
            };
            (replaced, self.pending(&inner, events))
        };
        pending.deliver();
        Ok(replaced)
    }

    fn values(&self) -> Result<Vec<Vec<u8>>> {
        self.ensure_running()?;
        let (values, pending) = {
            let mut inner = self.inner.lock();
            let events = self.drain_expired(&mut inner);
            let values = inner
                .entries
                .iter()
                .map(|(_, slot)| slot.value.clone())
                .collect();
            (values, self.pending(&inner, events))
        };
        pending.deliver();
        Ok(values)
    }

    fn len(&self) -> Result<usize> {
        self.ensure_running()?;
        let now = Instant::now();
        let inner = self.inner.lock();
        Ok(inner
            .entries
            .iter()
            .filter(|(_, slot)| !slot.is_expired(now))
            .count())
    }

    fn add_entry_listener(&self, listener: Arc<dyn EntryListener>) -> Result<ListenerId> {
        self.ensure_running()?;
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.lock().listeners.push((id, listener));
        debug!(map = %self.name, listener = %id, "Entry listener registered");
        Ok(id)
    }

    fn remove_entry_listener(&self, id: ListenerId) -> Result<bool> {
        self.ensure_running()?;
        let mut inner = self.inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(existing, _)| *existing != id);
        Ok(inner.listeners.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(EntryEventKind, Vec<u8>)>>,
    }

    impl Recorder {
        fn kinds(&self) -> Vec<EntryEventKind> {
            self.events.lock().iter().map(|(kind, _)| *kind).collect()
        }
    }

    impl EntryListener for Recorder {
        fn entry_added(&self, event: &EntryEvent) {
            self.events.lock().push((event.kind, event.key.clone()));
        }

        fn entry_updated(&self, event: &EntryEvent) {
            self.events.lock().push((event.kind, event.key.clone()));
        }

        fn entry_removed(&self, event: &EntryEvent) {
            self.events.lock().push((event.kind, event.key.clone()));
        }

        fn entry_evicted(&self, event: &EntryEvent) {
            self.events.lock().push((event.kind, event.key.clone()));
        }
    }

    fn map(max_entries: Option<usize>) -> LocalMap {
        LocalMap::new("sessions", "test", Arc::new(AtomicBool::new(true)), max_entries)
    }

    #[test]
    fn test_set_get_remove() {
        let map = map(None);
        map.set(b"k1".to_vec(), b"v1".to_vec(), None).unwrap();

        assert_eq!(map.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(map.len().unwrap(), 1);
        assert_eq!(map.remove(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(map.get(b"k1").unwrap(), None);
        assert!(map.is_empty().unwrap());
    }

    #[test]
    fn test_remove_if_compares_value() {
        let map = map(None);
        map.set(b"k1".to_vec(), b"v1".to_vec(), None).unwrap();

        assert!(!map.remove_if(b"k1", b"other").unwrap());
        assert!(map.remove_if(b"k1", b"v1").unwrap());
        assert!(!map.remove_if(b"k1", b"v1").unwrap());
    }

    #[test]
    fn test_replace_if_compares_value() {
        let map = map(None);
        map.set(b"k1".to_vec(), b"v1".to_vec(), None).unwrap();

        assert!(!map.replace_if(b"k1", b"other", b"v2".to_vec(), None).unwrap());
        assert!(map.replace_if(b"k1", b"v1", b"v2".to_vec(), None).unwrap());
        assert_eq!(map.get(b"k1").unwrap(), Some(b"v2".to_vec()));
        assert!(!map.replace_if(b"absent", b"v1", b"v2".to_vec(), None).unwrap());
        assert_eq!(map.get(b"absent").unwrap(), None);
    }

    #[test]
    fn test_replace_if_does_not_revive_expired_entry() {
        let map = map(None);
        let recorder = Arc::new(Recorder::default());
        map.add_entry_listener(recorder.clone()).unwrap();

        map.set(b"k1".to_vec(), b"v1".to_vec(), Some(Duration::from_millis(5)))
            .unwrap();
        thread::sleep(Duration::from_millis(20));

        let ttl = Some(Duration::from_secs(60));
        assert!(!map.replace_if(b"k1", b"v1", b"v2".to_vec(), ttl).unwrap());
        assert_eq!(map.get(b"k1").unwrap(), None);
        assert_eq!(
            recorder.kinds(),
            vec![EntryEventKind::Added, EntryEventKind::Evicted]
        );
    }

    #[test]
    fn test_replace_if_at_capacity_evicts_nothing() {
        let map = map(Some(2));
        let recorder = Arc::new(Recorder::default());
        map.set(b"a".to_vec(), b"1".to_vec(), None).unwrap();
        map.set(b"b".to_vec(), b"2".to_vec(), None).unwrap();
        map.add_entry_listener(recorder.clone()).unwrap();

        assert!(map.replace_if(b"a", b"1", b"3".to_vec(), None).unwrap());
        assert_eq!(map.len().unwrap(), 2);
        assert_eq!(recorder.kinds(), vec![EntryEventKind::Updated]);
    }

    #[test]
    fn test_events_by_kind() {
        let map = map(None);
        let recorder = Arc::new(Recorder::default());
        map.add_entry_listener(recorder.clone()).unwrap();

        map.set(b"k1".to_vec(), b"v1".to_vec(), None).unwrap();
        map.set(b"k1".to_vec(), b"v2".to_vec(), None).unwrap();
        map.remove(b"k1").unwrap();

        assert_eq!(
            recorder.kinds(),
            vec![
                EntryEventKind::Added,
                EntryEventKind::Updated,
                EntryEventKind::Removed
            ]
        );
    }

    #[test]
    fn test_expired_entry_evicted_on_access() {
        let map = map(None);
        let recorder = Arc::new(Recorder::default());
        map.add_entry_listener(recorder.clone()).unwrap();

        map.set(b"k1".to_vec(), b"v1".to_vec(), Some(Duration::from_millis(10)))
            .unwrap();
        thread::sleep(Duration::from_millis(25));

        assert_eq!(map.len().unwrap(), 0);
        assert_eq!(map.get(b"k1").unwrap(), None);
        assert_eq!(recorder.kinds().last(), Some(&EntryEventKind::Evicted));
    }

    #[test]
    fn test_set_resets_deadline() {
        let map = map(None);
        let ttl = Some(Duration::from_millis(60));
        map.set(b"k1".to_vec(), b"v1".to_vec(), ttl).unwrap();

        thread::sleep(Duration::from_millis(35));
        map.set(b"k1".to_vec(), b"v1".to_vec(), ttl).unwrap();
        thread::sleep(Duration::from_millis(35));

        assert!(map.get(b"k1").unwrap().is_some());
    }

    #[test]
    fn test_evict_expired_sweeps_all() {
        let map = map(None);
        for i in 0..3u8 {
            map.set(vec![i], vec![i], Some(Duration::from_millis(5)))
                .unwrap();
        }
        map.set(b"forever".to_vec(), b"v".to_vec(), None).unwrap();
        thread::sleep(Duration::from_millis(20));

        assert_eq!(map.evict_expired(), 3);
        assert_eq!(map.values().unwrap(), vec![b"v".to_vec()]);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let map = map(Some(2));
        let recorder = Arc::new(Recorder::default());
        map.add_entry_listener(recorder.clone()).unwrap();

        map.set(b"a".to_vec(), b"1".to_vec(), None).unwrap();
        map.set(b"b".to_vec(), b"2".to_vec(), None).unwrap();
        map.get(b"a").unwrap();
        map.set(b"c".to_vec(), b"3".to_vec(), None).unwrap();

        assert_eq!(map.get(b"b").unwrap(), None);
        assert!(map.get(b"a").unwrap().is_some());
        let evicted: Vec<Vec<u8>> = recorder
            .events
            .lock()
            .iter()
            .filter(|(kind, _)| *kind == EntryEventKind::Evicted)
            .map(|(_, key)| key.clone())
            .collect();
        assert_eq!(evicted, vec![b"b".to_vec()]);
    }

    #[test]
    fn test_remove_listener() {
        let map = map(None);
        let recorder = Arc::new(Recorder::default());
        let id = map.add_entry_listener(recorder.clone()).unwrap();

        assert!(map.remove_entry_listener(id).unwrap());
        assert!(!map.remove_entry_listener(id).unwrap());
        map.set(b"k1".to_vec(), b"v1".to_vec(), None).unwrap();
        assert!(recorder.kinds().is_empty());
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        struct Panics;
        impl EntryListener for Panics {
            fn entry_added(&self, _event: &EntryEvent) {
                panic!("listener failure");
            }
        }

        let map = map(None);
        let recorder = Arc::new(Recorder::default());
        map.add_entry_listener(Arc::new(Panics)).unwrap();
        map.add_entry_listener(recorder.clone()).unwrap();

        map.set(b"k1".to_vec(), b"v1".to_vec(), None).unwrap();
        assert_eq!(recorder.kinds(), vec![EntryEventKind::Added]);
    }

    #[test]
    fn test_stopped_map_rejects_operations() {
        let running = Arc::new(AtomicBool::new(true));
        let map = LocalMap::new("sessions", "test", running.clone(), None);
        running.store(false, Ordering::Release);

        assert!(matches!(map.get(b"k"), Err(ClusterError::ShutDown(_))));
        assert!(matches!(
            map.set(b"k".to_vec(), b"v".to_vec(), None),
            Err(ClusterError::ShutDown(_))
        ));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone)]
    enum Op {
        Set(u8, u8),
        Remove(u8),
        RemoveIf(u8, u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8, any::<u8>()).prop_map(|(k, v)| Op::Set(k, v)),
            (0u8..8).prop_map(Op::Remove),
            (0u8..8, any::<u8>()).prop_map(|(k, v)| Op::RemoveIf(k, v)),
        ]
    }

    proptest! {
        /// Property: without TTL or capacity the map behaves like a plain hash map.
        #[test]
        fn matches_hash_map_model(ops in prop::collection::vec(op_strategy(), 1..64)) {
            let map = LocalMap::new("model", "test", Arc::new(AtomicBool::new(true)), None);
            let mut model: HashMap<u8, u8> = HashMap::new();

            for op in ops {
                match op {
                    Op::Set(k, v) => {
                        map.set(vec![k], vec![v], None).unwrap();
                        model.insert(k, v);
                    }
                    Op::Remove(k) => {
                        let removed = map.remove(&[k]).unwrap();
                        prop_assert_eq!(removed, model.remove(&k).map(|v| vec![v]));
                    }
                    Op::RemoveIf(k, v) => {
                        let removed = map.remove_if(&[k], &[v]).unwrap();
                        let expected = model.get(&k) == Some(&v);
                        if expected {
                            model.remove(&k);
                        }
                        prop_assert_eq!(removed, expected);
                    }
                }
            }

            prop_assert_eq!(map.len().unwrap(), model.len());
            for (k, v) in &model {
                prop_assert_eq!(map.get(&[*k]).unwrap(), Some(vec![*v]));
            }
        }
    }
}
