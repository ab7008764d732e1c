//! Instance-access locks sharing the cache's cluster.
//!
//! The container serializes concurrent calls into one instance with these
//! locks. They live in the same cluster as the entry locks but under their
//! own name prefix, so the two never collide.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use roost_cluster::{Cluster, MutexHandle};

use crate::error::Result;

/// Prefix of instance-access lock names.
pub const INSTANCE_LOCK_PREFIX: &str = "roost-stateful-instance-lock-";

/// Lock contract the container uses for instance access.
pub trait StatefulLock: Send + Sync {
    fn lock(&self);

    fn unlock(&self) -> Result<()>;

    fn try_lock(&self) -> bool;

    fn try_lock_for(&self, timeout: Duration) -> bool;

    fn is_held_by_current_thread(&self) -> bool;
}

/// Produces [`InstanceLock`]s bound to one cluster.
#[derive(Clone)]
pub struct InstanceLockFactory {
    cluster: Arc<dyn Cluster>,
}

impl InstanceLockFactory {
    /// Bind a factory to `cluster`.
    ///
    /// Usually obtained from [`StatefulCache::lock_factory`](crate::StatefulCache::lock_factory)
    /// so the locks share the cache's cluster.
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self { cluster }
    }

    /// Lock for the instance-access name `name`.
    pub fn new_lock(&self, name: &str) -> InstanceLock {
        InstanceLock {
            delegate: self.cluster.lock(&instance_lock_name(name)),
        }
    }
}

impl fmt::Debug for InstanceLockFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceLockFactory")
            .field("cluster", &self.cluster.name())
            .finish()
    }
}

/// Full cluster lock name for an instance-access lock.
pub fn instance_lock_name(name: &str) -> String {
    format!("{INSTANCE_LOCK_PREFIX}{name}")
}

/// A cluster mutex used for instance access.
#[derive(Clone)]
pub struct InstanceLock {
    delegate: MutexHandle,
}

impl InstanceLock {
    /// Full cluster name of the underlying mutex.
    pub fn name(&self) -> &str {
        self.delegate.name()
    }
}

impl fmt::Debug for InstanceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceLock")
            .field("name", &self.delegate.name())
            .finish()
    }
}

impl StatefulLock for InstanceLock {
    fn lock(&self) {
        self.delegate.lock();
    }

    fn unlock(&self) -> Result<()> {
        Ok(self.delegate.unlock()?)
    }

    fn try_lock(&self) -> bool {
        self.delegate.try_lock()
    }

    fn try_lock_for(&self, timeout: Duration) -> bool {
        self.delegate.try_lock_for(timeout)
    }

    fn is_held_by_current_thread(&self) -> bool {
        self.delegate.is_held_by_current_thread()
    }
}
