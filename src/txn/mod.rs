pub mod commit;
pub mod cursor;
pub mod dynamic;
pub mod global_txn;
pub mod lock;
pub mod lock_manager;
pub mod sequence;
pub mod transaction;
pub mod variables;
pub mod view;

pub use commit::{CommitCallback, CommitListener, TableCommitInfo};
pub use cursor::{Cursor, CursorAttributes, CursorState};
pub use dynamic::{DynamicTables, StaticTable, StaticTables};
pub use global_txn::GlobalTxnState;
pub use lock::{AccessType, Lock, LockHandle, LockMode, Lockable};
pub use lock_manager::{LockManager, TableLock};
pub use sequence::{InMemorySequences, SequenceInfo, SequenceManager};
pub use transaction::{IsolationLevel, Transaction, TxnOptions, TxnServices, TxnState};
pub use variables::{Variable, VariableManager};
pub use view::{SharedIndex, SnapshotViews, TableView, ViewStrategy};

pub type TxnId = u64;
pub const TXN_NONE: TxnId = 0;
