//! Cluster-wide named mutexes.
//!
//! A [`DistributedMutex`] is identified purely by name: two handles obtained
//! for the same name anywhere in the cluster refer to the same logical lock.
//! Ownership is tracked per thread and acquisition is re-entrant.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// A named, re-entrant, thread-owned mutual exclusion handle.
pub trait DistributedMutex: Send + Sync {
    /// The cluster-wide name of this mutex.
    fn name(&self) -> &str;

    /// Block the calling thread until the mutex is acquired.
    fn lock(&self);

    /// Release one hold of the mutex.
    ///
    /// Fails with [`ClusterError::NotLockOwner`](crate::ClusterError::NotLockOwner)
    /// if the current thread does not hold it.
    fn unlock(&self) -> Result<()>;

    /// Acquire the mutex if it is free (or already held by this thread).
    fn try_lock(&self) -> bool;

    /// Acquire the mutex, waiting at most `timeout`.
    fn try_lock_for(&self, timeout: Duration) -> bool;

    /// Whether the calling thread currently holds the mutex.
    fn is_held_by_current_thread(&self) -> bool;
}

/// Scoped hold on a [`DistributedMutex`].
///
/// The mutex is released when the guard is dropped, including during
/// unwinding.
pub struct MutexGuard<'a> {
    mutex: &'a dyn DistributedMutex,
}

impl MutexGuard<'_> {
    /// Name of the held mutex.
    pub fn name(&self) -> &str {
        self.mutex.name()
    }
}

impl fmt::Debug for MutexGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexGuard")
            .field("name", &self.mutex.name())
            .finish()
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.mutex.unlock() {
            warn!(lock = %self.mutex.name(), error = %e, "Failed to release scoped lock");
        }
    }
}

/// Acquire `mutex` and return a guard that releases it on drop.
pub fn lock_scoped(mutex: &dyn DistributedMutex) -> MutexGuard<'_> {
    mutex.lock();
    MutexGuard { mutex }
}

/// Shared handle to a distributed mutex.
pub type MutexHandle = Arc<dyn DistributedMutex>;

/// Scoped hold that owns its mutex handle, so the value the handle came from
/// can be replaced or consumed while the lock stays held.
pub struct OwnedMutexGuard {
    mutex: MutexHandle,
}

impl OwnedMutexGuard {
    /// Name of the held mutex.
    pub fn name(&self) -> &str {
        self.mutex.name()
    }
}

impl fmt::Debug for OwnedMutexGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedMutexGuard")
            .field("name", &self.mutex.name())
            .finish()
    }
}

impl Drop for OwnedMutexGuard {
    fn drop(&mut self) {
        if let Err(e) = self.mutex.unlock() {
            warn!(lock = %self.mutex.name(), error = %e, "Failed to release scoped lock");
        }
    }
}

/// Acquire `mutex` and return a guard owning the handle.
pub fn lock_owned(mutex: MutexHandle) -> OwnedMutexGuard {
    mutex.lock();
    OwnedMutexGuard { mutex }
}
