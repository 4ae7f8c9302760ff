mod core;
mod engine;
mod storage;

pub mod query;
pub mod txn;

pub use crate::core::errors::{StorageError, StrataError};
pub use crate::core::lock_stats::{
    lock_stats_enabled, reset_lock_stats, set_lock_stats_enabled, snapshot_lock_stats, LockCounterSnapshot,
    LockStatKind, LockStatsSnapshot,
};
pub use crate::core::name::{ColumnRef, TableName};
pub use crate::core::value::{DataType, Value};
pub use crate::engine::{Database, DatabaseConfig, ViewManager};
pub use crate::query::{Expr, FunctionColumn, QueryContext, QueryPlanNode};
pub use crate::storage::{
    ColumnInfo, CommitGuard, IndexSet, MasterTable, MutableTable, ResolvedColumn, RowId, Table, TableId, TableInfo,
};
pub use crate::txn::{
    AccessType, GlobalTxnState, IsolationLevel, LockHandle, Transaction, TxnId, TxnOptions, TxnState,
};

pub type Result<T> = std::result::Result<T, StrataError>;
