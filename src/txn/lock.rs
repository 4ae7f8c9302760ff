use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::core::errors::StrataError;
use crate::core::lock_stats::LockHold;
use crate::storage::TableId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Something a lock can be taken on. Identity is the table id.
pub trait Lockable: Send + Sync + fmt::Debug {
    fn lock_id(&self) -> TableId;

    /// Give back one previously acquired hold in `mode`.
    fn release(&self, mode: LockMode);
}

/// One acquired hold on a lockable.
#[derive(Debug)]
pub struct Lock {
    lockable: Arc<dyn Lockable>,
    mode: LockMode,
    hold: Option<LockHold>,
}

impl Lock {
    /// Wrap a hold that has already been acquired on `lockable`.
    pub fn new(lockable: Arc<dyn Lockable>, mode: LockMode) -> Self {
        Self {
            lockable,
            mode,
            hold: None,
        }
    }

    /// Attach the timer started when the hold was acquired; it stops on release.
    pub fn with_hold(mut self, hold: LockHold) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn lockable_id(&self) -> TableId {
        self.lockable.lock_id()
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn check_access(&self, access: AccessType) -> Result<(), StrataError> {
        match (access, self.mode) {
            (AccessType::Write, LockMode::Shared) => Err(StrataError::AccessDenied {
                table: self.lockable_id(),
                access,
            }),
            _ => Ok(()),
        }
    }

    fn release(&mut self) {
        self.lockable.release(self.mode);
        self.hold = None;
    }
}

/// The fixed-size set of locks one operation holds, released together in
/// reverse acquisition order.
#[derive(Debug)]
pub struct LockHandle {
    locks: Vec<Lock>,
    capacity: usize,
    unlocked: bool,
}

impl LockHandle {
    pub fn new(lock_count: usize) -> Self {
        Self {
            locks: Vec::with_capacity(lock_count),
            capacity: lock_count,
            unlocked: false,
        }
    }

    pub fn add_lock(&mut self, lock: Lock) -> Result<(), StrataError> {
        if self.unlocked {
            return Err(StrataError::InvalidState("lock handle is already released".into()));
        }
        if self.locks.len() == self.capacity {
            // The lock is dropped without release; the caller still owns the hold.
            return Err(StrataError::LockCountMismatch {
                expected: self.capacity,
                actual: self.capacity + 1,
            });
        }
        self.locks.push(lock);
        Ok(())
    }

    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    fn ensure_complete(&self) -> Result<(), StrataError> {
        if self.locks.len() != self.capacity {
            return Err(StrataError::LockCountMismatch {
                expected: self.capacity,
                actual: self.locks.len(),
            });
        }
        Ok(())
    }

    pub fn check_access(&self, table: TableId, access: AccessType) -> Result<(), StrataError> {
        self.ensure_complete()?;
        if self.unlocked {
            return Err(StrataError::InvalidState("lock handle is already released".into()));
        }
        self.locks
            .iter()
            .rev()
            .find(|lock| lock.lockable_id() == table)
            .ok_or(StrataError::LockNotFound(table))?
            .check_access(access)
    }

    /// Release every lock, last acquired first. A second call is a no-op.
    pub fn release(&mut self) -> Result<(), StrataError> {
        if self.unlocked {
            return Ok(());
        }
        self.ensure_complete()?;
        self.release_all();
        Ok(())
    }

    fn release_all(&mut self) {
        for lock in self.locks.iter_mut().rev() {
            lock.release();
        }
        self.unlocked = true;
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if !self.unlocked {
            warn!(
                locks = self.locks.len(),
                "lock handle dropped without an explicit release"
            );
            self.release_all();
        }
    }
}
