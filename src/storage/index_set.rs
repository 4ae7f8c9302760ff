use im::OrdSet;

use crate::core::errors::StrataError;
use crate::storage::{RowId, TableId};

/// A point-in-time set of row numbers for one table.
///
/// The backing `OrdSet` is a persistent tree, so `snapshot` shares structure
/// with the source and costs O(1); later mutations copy only the touched path.
/// Every operation on a disposed or retired set fails with `InvalidState`.
#[derive(Debug)]
pub struct IndexSet {
    table_id: TableId,
    version: u64,
    rows: Option<OrdSet<RowId>>,
    // Issued by `MasterTable::current_index` and counted there until released.
    leased: bool,
    // Replaced in its transaction; kept only until it is released.
    retired: bool,
}

impl IndexSet {
    /// An empty, unleased index for a table with no committed rows yet.
    pub fn new(table_id: TableId) -> Self {
        Self {
            table_id,
            version: 0,
            rows: Some(OrdSet::new()),
            leased: false,
            retired: false,
        }
    }

    pub(crate) fn from_baseline(table_id: TableId, version: u64, rows: OrdSet<RowId>, leased: bool) -> Self {
        Self {
            table_id,
            version,
            rows: Some(rows),
            leased,
            retired: false,
        }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// The baseline version of the master table this index was derived from.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_disposed(&self) -> bool {
        self.rows.is_none()
    }

    pub(crate) fn is_leased(&self) -> bool {
        self.leased
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Stop serving reads and writes while keeping the lease until release.
    pub(crate) fn retire(&mut self) {
        self.retired = true;
    }

    fn unavailable(&self) -> StrataError {
        let state = if self.retired && self.rows.is_some() { "retired" } else { "disposed" };
        StrataError::InvalidState(format!("index set of table {} is {state}", self.table_id))
    }

    fn live(&self) -> Result<&OrdSet<RowId>, StrataError> {
        match &self.rows {
            Some(rows) if !self.retired => Ok(rows),
            _ => Err(self.unavailable()),
        }
    }

    fn live_mut(&mut self) -> Result<&mut OrdSet<RowId>, StrataError> {
        if self.retired {
            return Err(self.unavailable());
        }
        let table_id = self.table_id;
        self.rows.as_mut().ok_or_else(|| {
            StrataError::InvalidState(format!("index set of table {table_id} is disposed"))
        })
    }

    /// Independent copy of this index. Mutating either side never affects the other.
    pub fn snapshot(&self) -> Result<IndexSet, StrataError> {
        let rows = self.live()?.clone();
        Ok(Self::from_baseline(self.table_id, self.version, rows, false))
    }

    /// Returns false if the row was already present.
    pub fn add(&mut self, row: RowId) -> Result<bool, StrataError> {
        Ok(self.live_mut()?.insert(row).is_none())
    }

    /// Returns false if the row was not present.
    pub fn remove(&mut self, row: RowId) -> Result<bool, StrataError> {
        Ok(self.live_mut()?.remove(&row).is_some())
    }

    pub fn contains(&self, row: RowId) -> Result<bool, StrataError> {
        Ok(self.live()?.contains(&row))
    }

    pub fn len(&self) -> Result<usize, StrataError> {
        Ok(self.live()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StrataError> {
        Ok(self.live()?.is_empty())
    }

    /// Row numbers in ascending order.
    pub fn row_ids(&self) -> Result<Vec<RowId>, StrataError> {
        Ok(self.live()?.iter().copied().collect())
    }

    pub(crate) fn rows(&self) -> Result<OrdSet<RowId>, StrataError> {
        Ok(self.live()?.clone())
    }

    /// Rows present here but absent from `other`.
    pub(crate) fn rows_not_in(&self, other: &OrdSet<RowId>) -> Result<Vec<RowId>, StrataError> {
        Ok(self
            .live()?
            .iter()
            .filter(|row| !other.contains(row))
            .copied()
            .collect())
    }

    /// Drops the shared backing reference. Returns true on the first call only.
    pub fn dispose(&mut self) -> bool {
        self.rows.take().is_some()
    }
}
