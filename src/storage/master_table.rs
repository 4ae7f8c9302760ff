use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use im::OrdSet;
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::core::errors::{StorageError, StrataError};
use crate::core::lock_stats::{timed, LockStatKind, TimedGuard};
use crate::core::name::TableName;
use crate::core::value::Value;
use crate::storage::index_set::IndexSet;
use crate::storage::table::{column_out_of_range, TableInfo};
use crate::storage::{RowId, TableId};

#[derive(Debug, Default)]
struct Baseline {
    version: u64,
    rows: OrdSet<RowId>,
}

/// The durable, shared table: physical rows plus the committed index.
///
/// Rows are append-only; a row becomes visible to new transactions only once a
/// commit puts its number into the baseline. Uncommitted rows are physically
/// present but unreachable through any committed index.
#[derive(Debug)]
pub struct MasterTable {
    info: TableInfo,
    rows: RwLock<Vec<Vec<Value>>>,
    baseline: RwLock<Baseline>,
    commit_lock: Mutex<()>,
    unique_id: AtomicI64,
    outstanding: AtomicUsize,
}

impl MasterTable {
    pub fn new(info: TableInfo) -> Self {
        Self {
            info,
            rows: RwLock::new(Vec::new()),
            baseline: RwLock::new(Baseline::default()),
            commit_lock: Mutex::new(()),
            unique_id: AtomicI64::new(0),
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> TableId {
        self.info.id()
    }

    pub fn name(&self) -> &TableName {
        self.info.name()
    }

    pub fn info(&self) -> &TableInfo {
        &self.info
    }

    /// Version of the committed baseline; bumped by every commit.
    pub fn version(&self) -> u64 {
        self.baseline.read().version
    }

    /// A leased copy of the committed index. Each lease is counted until it is
    /// handed back through `release_index`.
    pub fn current_index(&self) -> IndexSet {
        let baseline = self.baseline.read();
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        IndexSet::from_baseline(self.id(), baseline.version, baseline.rows.clone(), true)
    }

    /// Committed row numbers, for callers that do not hold a transaction.
    pub fn committed_rows(&self) -> Vec<RowId> {
        self.baseline.read().rows.iter().copied().collect()
    }

    pub fn is_committed_row(&self, row: RowId) -> bool {
        self.baseline.read().rows.contains(&row)
    }

    /// Number of leased indices not yet released.
    pub fn outstanding_indices(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Dispose an index issued for this table. The index is disposed even when
    /// it turns out to belong to a different table; the mismatch is still an error.
    pub fn release_index(&self, index: &mut IndexSet) -> Result<(), StrataError> {
        let leased = index.is_leased();
        let owner = index.table_id();
        let was_live = index.dispose();
        if owner != self.id() {
            return Err(StrataError::InvalidState(format!(
                "index of table {owner} released through table {}",
                self.id()
            )));
        }
        if was_live && leased {
            let previous = self
                .outstanding
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
            if previous.is_err() {
                return Err(StrataError::InvalidState(format!(
                    "table {} released more indices than it issued",
                    self.name()
                )));
            }
        }
        Ok(())
    }

    /// Store a physical row. It stays invisible until committed into the baseline.
    pub fn append_row(&self, values: Vec<Value>) -> Result<RowId, StrataError> {
        self.info.validate_row(&values)?;
        let mut rows = self.rows.write();
        let row = rows.len() as RowId;
        rows.push(values);
        Ok(row)
    }

    pub fn cell(&self, row: RowId, column: usize) -> Result<Value, StrataError> {
        let rows = self.rows.read();
        let stored = rows
            .get(row as usize)
            .ok_or_else(|| StorageError(format!("row {row} is not stored in table {}", self.name())))?;
        stored
            .get(column)
            .cloned()
            .ok_or_else(|| column_out_of_range(self.name(), column))
    }

    /// Enter the single-writer commit section for this table.
    pub fn begin_commit(&self) -> CommitGuard<'_> {
        CommitGuard {
            table: self,
            _guard: timed(LockStatKind::Commit, || self.commit_lock.lock()),
        }
    }

    /// Replace the baseline with `index`, serialized against other commits.
    pub fn commit(&self, index: &IndexSet) -> Result<(), StrataError> {
        self.begin_commit().commit(index)
    }

    pub fn next_unique_id(&self) -> i64 {
        self.unique_id.fetch_add(1, Ordering::AcqRel)
    }

    pub fn current_unique_id(&self) -> i64 {
        self.unique_id.load(Ordering::Acquire) - 1
    }

    /// Move the counter forward. Values already handed out are never reissued,
    /// so a smaller id is ignored.
    pub fn set_unique_id(&self, id: i64) {
        self.unique_id.fetch_max(id, Ordering::AcqRel);
    }
}

/// Held while a transaction validates and installs a new baseline.
pub struct CommitGuard<'a> {
    table: &'a MasterTable,
    _guard: TimedGuard<MutexGuard<'a, ()>>,
}

impl CommitGuard<'_> {
    pub fn table(&self) -> &MasterTable {
        self.table
    }

    pub fn version(&self) -> u64 {
        self.table.baseline.read().version
    }

    pub fn current_rows(&self) -> OrdSet<RowId> {
        self.table.baseline.read().rows.clone()
    }

    pub fn commit(&self, index: &IndexSet) -> Result<(), StrataError> {
        if index.table_id() != self.table.id() {
            return Err(StrataError::InvalidState(format!(
                "index of table {} committed to table {}",
                index.table_id(),
                self.table.id()
            )));
        }
        let rows = index.rows()?;
        let mut baseline = self.table.baseline.write();
        baseline.version += 1;
        baseline.rows = rows;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::DataType;
    use crate::storage::ColumnInfo;

    fn table() -> MasterTable {
        MasterTable::new(TableInfo::new(
            TableId(3),
            TableName::new("APP", "t"),
            vec![ColumnInfo::new("v", DataType::Integer)],
        ))
    }

    #[test]
    fn commit_replaces_baseline_and_bumps_version() {
        let t = table();
        let mut index = t.current_index();
        for v in 0..3 {
            let row = t.append_row(vec![Value::Integer(v)]).unwrap();
            index.add(row).unwrap();
        }
        assert!(t.committed_rows().is_empty());

        t.commit(&index).unwrap();
        assert_eq!(t.committed_rows(), vec![0, 1, 2]);
        assert_eq!(t.version(), 1);

        let stale = t.current_index();
        index.remove(1).unwrap();
        t.commit(&index).unwrap();
        assert_eq!(stale.row_ids().unwrap(), vec![0, 1, 2]);
        assert_eq!(t.committed_rows(), vec![0, 2]);
    }

    #[test]
    fn leases_are_counted_and_released_once() {
        let t = table();
        let mut a = t.current_index();
        let mut b = t.current_index();
        assert_eq!(t.outstanding_indices(), 2);

        t.release_index(&mut a).unwrap();
        t.release_index(&mut a).unwrap();
        assert_eq!(t.outstanding_indices(), 1);

        let mut copy = b.snapshot().unwrap();
        t.release_index(&mut copy).unwrap();
        assert_eq!(t.outstanding_indices(), 1);

        t.release_index(&mut b).unwrap();
        assert_eq!(t.outstanding_indices(), 0);
    }

    #[test]
    fn foreign_index_is_disposed_but_reported() {
        let t = table();
        let mut foreign = IndexSet::new(TableId(99));
        assert!(t.release_index(&mut foreign).is_err());
        assert!(foreign.is_disposed());
        assert!(t.commit(&IndexSet::new(TableId(99))).is_err());
    }

    #[test]
    fn unique_ids_are_monotonic() {
        let t = table();
        assert_eq!(t.next_unique_id(), 0);
        assert_eq!(t.next_unique_id(), 1);
        assert_eq!(t.current_unique_id(), 1);
        t.set_unique_id(10);
        assert_eq!(t.next_unique_id(), 10);
        t.set_unique_id(2);
        assert_eq!(t.next_unique_id(), 11);
    }
}
