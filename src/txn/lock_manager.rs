use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::core::errors::StrataError;
use crate::core::lock_stats::{LockHold, LockStatKind};
use crate::storage::TableId;

use super::lock::{Lock, LockHandle, LockMode, Lockable};

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
}

/// Shared/exclusive lock for one table. Acquisition blocks without timeout.
#[derive(Debug)]
pub struct TableLock {
    id: TableId,
    state: Mutex<LockState>,
    available: Condvar,
}

impl TableLock {
    fn new(id: TableId) -> Self {
        Self {
            id,
            state: Mutex::new(LockState::default()),
            available: Condvar::new(),
        }
    }

    fn acquire(&self, mode: LockMode) {
        let mut state = self.state.lock();
        match mode {
            LockMode::Shared => {
                while state.writer {
                    self.available.wait(&mut state);
                }
                state.readers += 1;
            }
            LockMode::Exclusive => {
                while state.writer || state.readers > 0 {
                    self.available.wait(&mut state);
                }
                state.writer = true;
            }
        }
    }
}

impl Lockable for TableLock {
    fn lock_id(&self) -> TableId {
        self.id
    }

    fn release(&self, mode: LockMode) {
        let mut state = self.state.lock();
        match mode {
            LockMode::Shared => state.readers = state.readers.saturating_sub(1),
            LockMode::Exclusive => state.writer = false,
        }
        drop(state);
        self.available.notify_all();
    }
}

#[derive(Debug, Default)]
pub struct LockManager {
    tables: Mutex<HashMap<TableId, Arc<TableLock>>>,
}

impl LockManager {
    fn table_lock(&self, id: TableId) -> Arc<TableLock> {
        self.tables
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(TableLock::new(id)))
            .clone()
    }

    /// Drop the lock state of tables that left the catalog. Handles still
    /// holding one of these locks keep it alive until they release it.
    pub(crate) fn forget(&self, ids: &[TableId]) {
        if ids.is_empty() {
            return;
        }
        self.tables.lock().retain(|id, _| !ids.contains(id));
    }

    pub fn tracked_tables(&self) -> usize {
        self.tables.lock().len()
    }

    /// Lock the given tables in ascending id order. A table named in both
    /// lists is locked once, exclusively.
    pub fn lock_tables(&self, read: &[TableId], write: &[TableId]) -> Result<LockHandle, StrataError> {
        let mut requests: BTreeMap<TableId, LockMode> = BTreeMap::new();
        for id in read {
            requests.entry(*id).or_insert(LockMode::Shared);
        }
        for id in write {
            requests.insert(*id, LockMode::Exclusive);
        }

        let mut handle = LockHandle::new(requests.len());
        for (id, mode) in requests {
            let lock = self.table_lock(id);
            let wait_start = Instant::now();
            lock.acquire(mode);
            let hold = LockHold::acquired(LockStatKind::TableLock, wait_start);
            handle.add_lock(Lock::new(lock, mode).with_hold(hold))?;
        }
        debug!(locks = handle.lock_count(), "acquired table locks");
        Ok(handle)
    }
}
