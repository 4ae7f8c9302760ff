pub mod index_set;
pub mod master_table;
pub mod table;

pub use index_set::IndexSet;
pub use master_table::{CommitGuard, MasterTable};
pub use table::{ColumnInfo, MutableTable, ResolvedColumn, RowId, Table, TableId, TableInfo};
