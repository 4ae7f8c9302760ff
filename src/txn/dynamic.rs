use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::errors::StrataError;
use crate::core::name::TableName;
use crate::core::value::Value;
use crate::storage::table::column_out_of_range;
use crate::storage::{ColumnInfo, ResolvedColumn, RowId, Table, TableId, TableInfo};

/// Virtual tables that are resolvable by name but not backed by a master
/// table, such as system information tables. They are never mutable.
pub trait DynamicTables: Send + Sync + fmt::Debug {
    fn table_names(&self) -> Vec<TableName>;

    fn is_dynamic(&self, name: &TableName) -> bool {
        self.table_names().iter().any(|n| n == name)
    }

    fn table(&self, name: &TableName) -> Result<Arc<dyn Table>, StrataError>;

    fn table_info(&self, name: &TableName) -> Result<TableInfo, StrataError>;

    /// Type reported for the table, e.g. `"SYSTEM TABLE"`.
    fn table_type(&self, name: &TableName) -> Result<String, StrataError>;
}

/// A read-only table with rows fixed at registration.
#[derive(Debug)]
pub struct StaticTable {
    info: TableInfo,
    columns: Vec<ResolvedColumn>,
    rows: Vec<Vec<Value>>,
}

impl Table for StaticTable {
    fn name(&self) -> &TableName {
        self.info.name()
    }

    fn columns(&self) -> &[ResolvedColumn] {
        &self.columns
    }

    fn row_count(&self) -> Result<usize, StrataError> {
        Ok(self.rows.len())
    }

    fn row_ids(&self) -> Result<Vec<RowId>, StrataError> {
        Ok((0..self.rows.len() as RowId).collect())
    }

    fn cell(&self, row: RowId, column: usize) -> Result<Value, StrataError> {
        let values = self
            .rows
            .get(row as usize)
            .ok_or_else(|| StrataError::RowNotFound {
                table: self.name().clone(),
                row,
            })?;
        values
            .get(column)
            .cloned()
            .ok_or_else(|| column_out_of_range(self.name(), column))
    }
}

#[derive(Debug)]
struct Entry {
    table: Arc<StaticTable>,
    table_type: String,
}

/// Registry of named static tables. Ids are drawn downwards from `u32::MAX`
/// so they never collide with master table ids.
#[derive(Debug)]
pub struct StaticTables {
    entries: RwLock<Vec<Entry>>,
    next_id: AtomicU32,
}

impl Default for StaticTables {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(u32::MAX),
        }
    }
}

impl StaticTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: TableName,
        table_type: impl Into<String>,
        columns: Vec<ColumnInfo>,
        rows: Vec<Vec<Value>>,
    ) -> Result<(), StrataError> {
        let id = TableId(self.next_id.fetch_sub(1, Ordering::AcqRel));
        let info = TableInfo::new(id, name, columns);
        for row in &rows {
            info.validate_row(row)?;
        }

        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.table.name() == info.name()) {
            return Err(StrataError::TableAlreadyExists(info.name().clone()));
        }
        let columns = info.resolved_columns();
        entries.push(Entry {
            table: Arc::new(StaticTable { info, columns, rows }),
            table_type: table_type.into(),
        });
        Ok(())
    }

    fn find<T>(&self, name: &TableName, f: impl FnOnce(&Entry) -> T) -> Result<T, StrataError> {
        self.entries
            .read()
            .iter()
            .find(|e| e.table.name() == name)
            .map(f)
            .ok_or_else(|| StrataError::TableNotFound(name.clone()))
    }
}

impl DynamicTables for StaticTables {
    fn table_names(&self) -> Vec<TableName> {
        self.entries
            .read()
            .iter()
            .map(|e| e.table.name().clone())
            .collect()
    }

    fn table(&self, name: &TableName) -> Result<Arc<dyn Table>, StrataError> {
        self.find(name, |e| e.table.clone() as Arc<dyn Table>)
    }

    fn table_info(&self, name: &TableName) -> Result<TableInfo, StrataError> {
        self.find(name, |e| e.table.info.clone())
    }

    fn table_type(&self, name: &TableName) -> Result<String, StrataError> {
        self.find(name, |e| e.table_type.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::DataType;

    #[test]
    fn registered_tables_are_readable() {
        let tables = StaticTables::new();
        let name = TableName::new("SYSTEM", "info");
        tables
            .register(
                name.clone(),
                "SYSTEM TABLE",
                vec![ColumnInfo::new("key", DataType::Text)],
                vec![vec![Value::from("a")], vec![Value::from("b")]],
            )
            .unwrap();

        assert!(tables.is_dynamic(&name));
        assert_eq!(tables.table_type(&name).unwrap(), "SYSTEM TABLE");
        let table = tables.table(&name).unwrap();
        assert_eq!(table.row_count().unwrap(), 2);
        assert_eq!(table.cell(1, 0).unwrap(), Value::from("b"));
        assert!(tables.table_info(&name).unwrap().id().0 > 1_000_000);

        assert!(matches!(
            tables.register(name, "SYSTEM TABLE", Vec::new(), Vec::new()),
            Err(StrataError::TableAlreadyExists(_))
        ));
        assert!(matches!(
            tables.table(&TableName::new("SYSTEM", "missing")),
            Err(StrataError::TableNotFound(_))
        ));
    }
}
