use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::lock_stats::{timed, LockStatKind, TimedGuard};
use crate::core::name::TableName;
use crate::storage::{MasterTable, TableId};

use super::commit::{CommitListener, TableCommitInfo};
use super::lock_manager::LockManager;
use super::transaction::{Transaction, TxnOptions, TxnServices};
use super::{TxnId, TXN_NONE};

/// State shared by every transaction of one database: id allocation, the
/// active set, the committed table catalog and the commit gate.
pub struct GlobalTxnState {
    current_txn_id: AtomicU64,
    active_txns: RwLock<Vec<TxnId>>,
    // Cached oldest active transaction ID
    oldest_active_txn_id: AtomicU64,
    next_table_id: AtomicU32,
    catalog: RwLock<Vec<Arc<MasterTable>>>,
    // Readers open transactions; a committing transaction takes it exclusively
    // so nobody snapshots a half-applied multi-table commit.
    commit_gate: RwLock<()>,
    locks: LockManager,
    listeners: RwLock<Vec<Arc<dyn CommitListener>>>,
}

impl std::fmt::Debug for GlobalTxnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalTxnState")
            .field("current_txn_id", &self.current_txn_id)
            .field("active_txns", &self.active_txns)
            .field("tables", &self.catalog.read().len())
            .finish()
    }
}

impl Default for GlobalTxnState {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalTxnState {
    pub fn new() -> Self {
        Self {
            current_txn_id: AtomicU64::new(TXN_NONE),
            active_txns: RwLock::new(Vec::new()),
            oldest_active_txn_id: AtomicU64::new(TXN_NONE),
            next_table_id: AtomicU32::new(1),
            catalog: RwLock::new(Vec::new()),
            commit_gate: RwLock::new(()),
            locks: LockManager::default(),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Get the oldest active transaction ID, or the next ID to be issued when
    /// nothing is active.
    pub fn oldest_active_txn_id(&self) -> TxnId {
        let cached = self.oldest_active_txn_id.load(Ordering::Acquire);
        if cached == TXN_NONE {
            self.current_txn_id.load(Ordering::Acquire) + 1
        } else {
            cached
        }
    }

    fn recalculate_oldest(&self) {
        let oldest = self.active_txns.read().iter().copied().min();
        self.oldest_active_txn_id
            .store(oldest.unwrap_or(TXN_NONE), Ordering::Release);
    }

    pub fn allocate_txn_id(&self) -> TxnId {
        self.current_txn_id.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn register_active(&self, txn_id: TxnId) {
        let mut guard = self.active_txns.write();
        let was_empty = guard.is_empty();
        guard.push(txn_id);
        drop(guard);

        if was_empty {
            self.oldest_active_txn_id.store(txn_id, Ordering::Release);
        }
    }

    pub fn unregister_active(&self, txn_id: TxnId) {
        let mut guard = self.active_txns.write();
        let was_oldest = guard.iter().min().copied() == Some(txn_id);
        guard.retain(|id| *id != txn_id);
        drop(guard);

        if was_oldest {
            self.recalculate_oldest();
        }
    }

    pub fn active_count(&self) -> usize {
        self.active_txns.read().len()
    }

    pub fn has_active_transactions(&self) -> bool {
        !self.active_txns.read().is_empty()
    }

    pub fn allocate_table_id(&self) -> TableId {
        TableId(self.next_table_id.fetch_add(1, Ordering::AcqRel))
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Register a table directly in the committed catalog, bypassing any
    /// transaction. Used to bootstrap system tables.
    pub fn install_table(&self, master: Arc<MasterTable>) {
        let _gate = self.gate_write();
        self.catalog.write().push(master);
    }

    pub fn committed_tables(&self) -> Vec<Arc<MasterTable>> {
        self.catalog.read().clone()
    }

    pub fn find_committed(&self, name: &TableName) -> Option<Arc<MasterTable>> {
        self.catalog
            .read()
            .iter()
            .find(|master| master.name() == name)
            .cloned()
    }

    pub(crate) fn is_committed(&self, id: TableId) -> bool {
        self.catalog.read().iter().any(|master| master.id() == id)
    }

    pub(crate) fn apply_catalog_changes(&self, created: Vec<Arc<MasterTable>>, dropped: &[TableId]) {
        let mut catalog = self.catalog.write();
        catalog.retain(|master| !dropped.contains(&master.id()));
        catalog.extend(created);
        self.locks.forget(dropped);
    }

    pub fn add_commit_listener(&self, listener: Arc<dyn CommitListener>) {
        self.listeners.write().push(listener);
    }

    pub(crate) fn notify_commit(&self, info: &TableCommitInfo) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_commit(info);
        }
    }

    pub(crate) fn gate_read(&self) -> TimedGuard<RwLockReadGuard<'_, ()>> {
        timed(LockStatKind::CommitGate, || self.commit_gate.read())
    }

    pub(crate) fn gate_write(&self) -> TimedGuard<RwLockWriteGuard<'_, ()>> {
        timed(LockStatKind::CommitGate, || self.commit_gate.write())
    }

    /// Open a transaction over the currently committed catalog. Every visible
    /// table starts from a leased copy of its master's baseline index.
    pub fn begin_txn(self: &Arc<Self>, services: TxnServices, options: TxnOptions) -> Transaction {
        let txn_id = self.allocate_txn_id();
        self.register_active(txn_id);

        let mut txn = Transaction::new(txn_id, self.clone(), services, &options);
        {
            let _gate = self.gate_read();
            for master in self.catalog.read().iter() {
                let index = master.current_index();
                txn.push_visible(master.clone(), index);
            }
        }
        if options.read_only {
            txn.set_read_only();
        }
        txn
    }
}
