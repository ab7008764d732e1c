//! Re-entrant named mutexes for the in-process cluster.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::{ClusterError, Result};
use crate::mutex::DistributedMutex;

#[derive(Debug, Default)]
struct HoldState {
    owner: Option<ThreadId>,
    holds: u32,
}

impl HoldState {
    /// Take one hold for `me` if the lock is free or already ours.
    fn try_acquire(&mut self, me: ThreadId) -> bool {
        match self.owner {
            None => {
                self.owner = Some(me);
                self.holds = 1;
                true
            }
            Some(owner) if owner == me => {
                self.holds += 1;
                true
            }
            Some(_) => false,
        }
    }
}

#[derive(Debug)]
struct MutexCell {
    name: String,
    state: Mutex<HoldState>,
    released: Condvar,
}

/// Handle to a named lock owned by a [`LocalCluster`](super::LocalCluster).
#[derive(Debug, Clone)]
pub struct LocalMutex {
    cell: Arc<MutexCell>,
}

impl DistributedMutex for LocalMutex {
    fn name(&self) -> &str {
        &self.cell.name
    }

    fn lock(&self) {
        let me = thread::current().id();
        let mut state = self.cell.state.lock();
        while !state.try_acquire(me) {
            self.cell.released.wait(&mut state);
        }
        trace!(lock = %self.cell.name, holds = state.holds, "Lock acquired");
    }

    fn unlock(&self) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.cell.state.lock();
        if state.owner != Some(me) {
            return Err(ClusterError::NotLockOwner {
                name: self.cell.name.clone(),
            });
        }

        state.holds -= 1;
        if state.holds == 0 {
            state.owner = None;
            drop(state);
            self.cell.released.notify_one();
            trace!(lock = %self.cell.name, "Lock released");
        }
        Ok(())
    }

    fn try_lock(&self) -> bool {
        self.cell.state.lock().try_acquire(thread::current().id())
    }

    fn try_lock_for(&self, timeout: Duration) -> bool {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = self.cell.state.lock();
        loop {
            if state.try_acquire(me) {
                return true;
            }
            if self
                .cell
                .released
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.try_acquire(me);
            }
        }
    }

    fn is_held_by_current_thread(&self) -> bool {
        self.cell.state.lock().owner == Some(thread::current().id())
    }
}

/// Name to lock table.
///
/// Cells are held weakly: a lock with no live handle cannot be held, so its
/// slot is reclaimed and recreated on the next lookup.
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    cells: Mutex<HashMap<String, Weak<MutexCell>>>,
}

impl LockTable {
    pub(crate) fn get(&self, name: &str) -> LocalMutex {
        let mut cells = self.cells.lock();
        if let Some(cell) = cells.get(name).and_then(Weak::upgrade) {
            return LocalMutex { cell };
        }

        let cell = Arc::new(MutexCell {
            name: name.to_string(),
            state: Mutex::new(HoldState::default()),
            released: Condvar::new(),
        });
        cells.insert(name.to_string(), Arc::downgrade(&cell));
        LocalMutex { cell }
    }

    /// Drop slots whose locks have no remaining handles.
    pub(crate) fn prune(&self) -> usize {
        let mut cells = self.cells.lock();
        let before = cells.len();
        cells.retain(|_, cell| cell.strong_count() > 0);
        before - cells.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.lock().len()
    }
}
