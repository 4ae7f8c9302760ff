use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::errors::StrataError;
use crate::core::name::{ColumnRef, TableName};
use crate::core::value::{DataType, Value};

/// Identity of a master table. Visible-table and lock lookups compare on this,
/// never on object addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type RowId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Schema of a master table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    id: TableId,
    name: TableName,
    columns: Vec<ColumnInfo>,
}

impl TableInfo {
    pub fn new(id: TableId, name: TableName, columns: Vec<ColumnInfo>) -> Self {
        Self { id, name, columns }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub(crate) fn resolved_columns(&self) -> Vec<ResolvedColumn> {
        self.columns
            .iter()
            .map(|column| ResolvedColumn {
                table: self.name.clone(),
                column: column.clone(),
            })
            .collect()
    }

    /// Checks arity, types and nullability of a row about to be stored.
    pub fn validate_row(&self, values: &[Value]) -> Result<(), StrataError> {
        if values.len() != self.columns.len() {
            return Err(StrataError::InvalidRow {
                table: self.name.clone(),
                reason: format!("expected {} values, got {}", self.columns.len(), values.len()),
            });
        }
        for (column, value) in self.columns.iter().zip(values) {
            if value.is_null() && !column.nullable {
                return Err(StrataError::InvalidRow {
                    table: self.name.clone(),
                    reason: format!("column '{}' is not nullable", column.name),
                });
            }
            if !value.fits(column.data_type) {
                return Err(StrataError::InvalidRow {
                    table: self.name.clone(),
                    reason: format!(
                        "value {value} does not fit column '{}' of type {:?}",
                        column.name, column.data_type
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A column together with the table name it resolves against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub table: TableName,
    pub column: ColumnInfo,
}

impl ResolvedColumn {
    fn matches(&self, reference: &ColumnRef) -> bool {
        if self.column.name != reference.name {
            return false;
        }
        match &reference.table {
            Some(table) => *table == self.table,
            None => true,
        }
    }
}

/// The read capability shared by master-table views and every virtual table
/// produced by query-plan evaluation.
pub trait Table: Send + Sync + fmt::Debug {
    fn name(&self) -> &TableName;

    fn columns(&self) -> &[ResolvedColumn];

    fn row_count(&self) -> Result<usize, StrataError>;

    /// Row ids in table order. Virtual tables number their rows `0..row_count`.
    fn row_ids(&self) -> Result<Vec<RowId>, StrataError>;

    fn cell(&self, row: RowId, column: usize) -> Result<Value, StrataError>;

    fn column_count(&self) -> usize {
        self.columns().len()
    }

    fn resolve_column(&self, reference: &ColumnRef) -> Result<usize, StrataError> {
        resolve_column(self.columns(), reference)
    }

    fn row_values(&self, row: RowId) -> Result<Vec<Value>, StrataError> {
        (0..self.column_count())
            .map(|column| self.cell(row, column))
            .collect()
    }
}

/// A table whose rows can be staged by the owning transaction.
pub trait MutableTable: Table {
    fn add_row(&self, values: Vec<Value>) -> Result<RowId, StrataError>;

    fn remove_row(&self, row: RowId) -> Result<(), StrataError>;

    /// Rows are immutable once stored, so an update stages a remove plus an add.
    fn update_row(&self, row: RowId, values: Vec<Value>) -> Result<RowId, StrataError> {
        self.remove_row(row)?;
        self.add_row(values)
    }

    fn as_table(self: Arc<Self>) -> Arc<dyn Table>;
}

pub(crate) fn resolve_column(columns: &[ResolvedColumn], reference: &ColumnRef) -> Result<usize, StrataError> {
    let mut found = None;
    for (i, column) in columns.iter().enumerate() {
        if column.matches(reference) {
            if found.is_some() {
                return Err(StrataError::AmbiguousReference(reference.to_string()));
            }
            found = Some(i);
        }
    }
    found.ok_or_else(|| StrataError::ColumnNotFound(reference.to_string()))
}

pub(crate) fn column_out_of_range(table: &TableName, column: usize) -> StrataError {
    StrataError::ColumnNotFound(format!("{table}[{column}]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> TableInfo {
        TableInfo::new(
            TableId(1),
            TableName::new("APP", "people"),
            vec![
                ColumnInfo::new("id", DataType::Integer).not_null(),
                ColumnInfo::new("name", DataType::Text),
                ColumnInfo::new("score", DataType::Float),
            ],
        )
    }

    #[test]
    fn validate_row_checks_arity_types_and_nulls() {
        let info = info();
        assert!(info
            .validate_row(&[Value::Integer(1), Value::Null, Value::Integer(3)])
            .is_ok());
        assert!(info.validate_row(&[Value::Integer(1)]).is_err());
        assert!(info
            .validate_row(&[Value::Null, Value::Null, Value::Null])
            .is_err());
        assert!(info
            .validate_row(&[Value::Text("x".into()), Value::Null, Value::Null])
            .is_err());
    }

    #[test]
    fn resolve_column_honours_qualifier_and_ambiguity() {
        let mut columns = info().resolved_columns();
        assert_eq!(resolve_column(&columns, &ColumnRef::new("name")).unwrap(), 1);

        columns.push(ResolvedColumn {
            table: TableName::new("APP", "other"),
            column: ColumnInfo::new("name", DataType::Text),
        });
        assert!(matches!(
            resolve_column(&columns, &ColumnRef::new("name")),
            Err(StrataError::AmbiguousReference(_))
        ));
        let qualified = ColumnRef::qualified(TableName::new("APP", "other"), "name");
        assert_eq!(resolve_column(&columns, &qualified).unwrap(), 3);
        assert!(matches!(
            resolve_column(&columns, &ColumnRef::new("missing")),
            Err(StrataError::ColumnNotFound(_))
        ));
    }
}
