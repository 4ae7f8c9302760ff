use thiserror::Error;

use crate::core::name::TableName;
use crate::storage::TableId;
use crate::txn::{AccessType, CursorState};

#[derive(Debug, Error)]
pub enum StrataError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("transaction is read-only")]
    ReadOnlyViolation,

    #[error("table '{0}' not found")]
    TableNotFound(TableName),

    #[error("table '{0}' already exists")]
    TableAlreadyExists(TableName),

    #[error("table '{0}' is not mutable")]
    NotMutable(TableName),

    #[error("ambiguous reference: {0}")]
    AmbiguousReference(String),

    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("row {row} not found in table '{table}'")]
    RowNotFound { table: TableName, row: u64 },

    #[error("invalid row for table '{table}': {reason}")]
    InvalidRow { table: TableName, reason: String },

    #[error("sequence '{0}' not found")]
    SequenceNotFound(TableName),

    #[error("current value for sequence '{0}' is not available")]
    SequenceNotInitialized(TableName),

    #[error("sequence '{0}' is exhausted")]
    SequenceExhausted(TableName),

    #[error("sequence operations are not permitted")]
    SequencesDisabled,

    #[error("cursor '{0}' was already declared")]
    DuplicateCursor(TableName),

    #[error("cursor '{0}' was not declared")]
    CursorNotFound(TableName),

    #[error("cursor '{name}' is in state {state:?}")]
    InvalidCursorState { name: TableName, state: CursorState },

    #[error("variable '{0}' was already declared")]
    DuplicateVariable(String),

    #[error("variable '{0}' not found")]
    VariableNotFound(String),

    #[error("variable '{0}' is constant")]
    ConstantVariable(String),

    #[error("table {0} was not found in the lock list for this handle")]
    LockNotFound(TableId),

    #[error("lock handle holds {actual} of {expected} locks")]
    LockCountMismatch { expected: usize, actual: usize },

    #[error("{access:?} access to table {table} is not permitted by the held lock")]
    AccessDenied { table: TableId, access: AccessType },

    #[error("incompatible union: {0}")]
    IncompatibleUnion(String),

    #[error("view '{0}' not found")]
    ViewNotFound(TableName),

    #[error("view '{0}' refers to itself")]
    RecursiveView(TableName),

    #[error("routine '{0}' not found")]
    RoutineNotFound(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("commit conflict on table '{table}': {reason}")]
    CommitConflict { table: TableName, reason: String },
}

impl StrataError {
    /// Whether the whole transaction may be retried after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StrataError::CommitConflict { .. })
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct StorageError(pub String);
