use std::fmt;

use crate::core::name::TableName;
use crate::storage::RowId;

/// Row-level changes one commit made to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCommitInfo {
    pub table_name: TableName,
    pub added_rows: Vec<RowId>,
    pub removed_rows: Vec<RowId>,
}

impl TableCommitInfo {
    pub fn has_changes(&self) -> bool {
        !self.added_rows.is_empty() || !self.removed_rows.is_empty()
    }
}

/// Database-wide observer of committed changes. Called after the new
/// baselines are installed, once per changed table.
pub trait CommitListener: Send + Sync + fmt::Debug {
    fn on_commit(&self, info: &TableCommitInfo);
}

/// Transaction-local commit hook registered with `Transaction::register_on_commit`.
pub type CommitCallback = Box<dyn FnMut(&TableCommitInfo) + Send>;
