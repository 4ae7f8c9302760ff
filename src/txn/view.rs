use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::errors::StrataError;
use crate::core::name::TableName;
use crate::core::value::Value;
use crate::storage::{IndexSet, MasterTable, MutableTable, ResolvedColumn, RowId, Table};

/// A transaction's private index for one visible table, shared with the views
/// the transaction hands out.
pub type SharedIndex = Arc<RwLock<IndexSet>>;

/// Builds the per-transaction view through which staged row changes overlay
/// the transaction's index. Chosen from the isolation level.
pub trait ViewStrategy: Send + Sync + fmt::Debug {
    fn create_view(&self, master: Arc<MasterTable>, index: SharedIndex, read_only: bool) -> Arc<dyn MutableTable>;
}

/// Views that read and write the transaction's own snapshot index directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotViews;

impl ViewStrategy for SnapshotViews {
    fn create_view(&self, master: Arc<MasterTable>, index: SharedIndex, read_only: bool) -> Arc<dyn MutableTable> {
        Arc::new(TableView::new(master, index, read_only))
    }
}

pub struct TableView {
    master: Arc<MasterTable>,
    index: SharedIndex,
    columns: Vec<ResolvedColumn>,
    read_only: bool,
}

impl TableView {
    pub fn new(master: Arc<MasterTable>, index: SharedIndex, read_only: bool) -> Self {
        let columns = master.info().resolved_columns();
        Self {
            master,
            index,
            columns,
            read_only,
        }
    }

    pub fn master(&self) -> &Arc<MasterTable> {
        &self.master
    }

    fn ensure_writable(&self) -> Result<(), StrataError> {
        if self.read_only {
            return Err(StrataError::ReadOnlyViolation);
        }
        Ok(())
    }
}

impl fmt::Debug for TableView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableView")
            .field("table", self.master.name())
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl Table for TableView {
    fn name(&self) -> &TableName {
        self.master.name()
    }

    fn columns(&self) -> &[ResolvedColumn] {
        &self.columns
    }

    fn row_count(&self) -> Result<usize, StrataError> {
        self.index.read().len()
    }

    fn row_ids(&self) -> Result<Vec<RowId>, StrataError> {
        self.index.read().row_ids()
    }

    fn cell(&self, row: RowId, column: usize) -> Result<Value, StrataError> {
        if !self.index.read().contains(row)? {
            return Err(StrataError::RowNotFound {
                table: self.name().clone(),
                row,
            });
        }
        self.master.cell(row, column)
    }
}

impl MutableTable for TableView {
    fn add_row(&self, values: Vec<Value>) -> Result<RowId, StrataError> {
        self.ensure_writable()?;
        let mut index = self.index.write();
        if index.is_disposed() {
            return Err(StrataError::InvalidState(format!(
                "view of table {} outlived its transaction",
                self.name()
            )));
        }
        if index.is_retired() {
            return Err(StrataError::InvalidState(format!(
                "view of table {} was replaced by a newer index",
                self.name()
            )));
        }
        let row = self.master.append_row(values)?;
        index.add(row)?;
        Ok(row)
    }

    fn remove_row(&self, row: RowId) -> Result<(), StrataError> {
        self.ensure_writable()?;
        if !self.index.write().remove(row)? {
            return Err(StrataError::RowNotFound {
                table: self.name().clone(),
                row,
            });
        }
        Ok(())
    }

    fn as_table(self: Arc<Self>) -> Arc<dyn Table> {
        self
    }
}
