use std::collections::HashSet;
use std::sync::Arc;

use crate::core::errors::StrataError;
use crate::core::name::TableName;
use crate::core::value::{DataType, Value};
use crate::storage::table::column_out_of_range;
use crate::storage::{ColumnInfo, ResolvedColumn, RowId, Table};

use super::context::QueryContext;
use super::node::FunctionColumn;

fn row_out_of_range(table: &TableName, row: RowId) -> StrataError {
    StrataError::RowNotFound {
        table: table.clone(),
        row,
    }
}

/// The same rows as `inner`, known under a different name.
#[derive(Debug)]
pub struct ReferenceTable {
    inner: Arc<dyn Table>,
    name: TableName,
    columns: Vec<ResolvedColumn>,
}

impl ReferenceTable {
    pub fn new(inner: Arc<dyn Table>, name: TableName) -> Self {
        let columns = inner
            .columns()
            .iter()
            .map(|c| ResolvedColumn {
                table: name.clone(),
                column: c.column.clone(),
            })
            .collect();
        Self { inner, name, columns }
    }
}

impl Table for ReferenceTable {
    fn name(&self) -> &TableName {
        &self.name
    }

    fn columns(&self) -> &[ResolvedColumn] {
        &self.columns
    }

    fn row_count(&self) -> Result<usize, StrataError> {
        self.inner.row_count()
    }

    fn row_ids(&self) -> Result<Vec<RowId>, StrataError> {
        self.inner.row_ids()
    }

    fn cell(&self, row: RowId, column: usize) -> Result<Value, StrataError> {
        self.inner.cell(row, column)
    }
}

/// The columns of a child table plus computed columns, one output row per
/// child row in child order. Computed values are materialized up front.
#[derive(Debug)]
pub struct FunctionTable {
    child: Arc<dyn Table>,
    columns: Vec<ResolvedColumn>,
    child_rows: Vec<RowId>,
    computed: Vec<Vec<Value>>,
}

impl FunctionTable {
    pub fn new(child: Arc<dyn Table>, functions: &[FunctionColumn], ctx: &dyn QueryContext) -> Result<Self, StrataError> {
        let child_rows = child.row_ids()?;
        let mut computed = Vec::with_capacity(child_rows.len());
        for row in &child_rows {
            let values = functions
                .iter()
                .map(|f| f.expr.evaluate(child.as_ref(), *row, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            computed.push(values);
        }

        let mut columns = child.columns().to_vec();
        for (i, function) in functions.iter().enumerate() {
            // Typed by the first non-null result; all-null columns report Text.
            let data_type = computed
                .iter()
                .find_map(|values| values[i].data_type())
                .unwrap_or(DataType::Text);
            columns.push(ResolvedColumn {
                table: child.name().clone(),
                column: ColumnInfo::new(function.name.clone(), data_type),
            });
        }

        Ok(Self {
            child,
            columns,
            child_rows,
            computed,
        })
    }
}

impl Table for FunctionTable {
    fn name(&self) -> &TableName {
        self.child.name()
    }

    fn columns(&self) -> &[ResolvedColumn] {
        &self.columns
    }

    fn row_count(&self) -> Result<usize, StrataError> {
        Ok(self.child_rows.len())
    }

    fn row_ids(&self) -> Result<Vec<RowId>, StrataError> {
        Ok((0..self.child_rows.len() as RowId).collect())
    }

    fn cell(&self, row: RowId, column: usize) -> Result<Value, StrataError> {
        let child_row = *self
            .child_rows
            .get(row as usize)
            .ok_or_else(|| row_out_of_range(self.name(), row))?;
        let child_columns = self.child.column_count();
        if column < child_columns {
            return self.child.cell(child_row, column);
        }
        self.computed[row as usize]
            .get(column - child_columns)
            .cloned()
            .ok_or_else(|| column_out_of_range(self.name(), column))
    }
}

/// Rows of `left x right` whose same-named columns hold equal non-null values.
/// Shared columns appear once, taken from the left side.
#[derive(Debug)]
pub struct JoinTable {
    name: TableName,
    left: Arc<dyn Table>,
    right: Arc<dyn Table>,
    columns: Vec<ResolvedColumn>,
    // Output column index -> right column index, for columns past the left ones.
    right_columns: Vec<usize>,
    rows: Vec<(RowId, RowId)>,
}

impl JoinTable {
    pub fn natural_join(left: Arc<dyn Table>, right: Arc<dyn Table>) -> Result<Self, StrataError> {
        let mut shared = Vec::new();
        let mut right_columns = Vec::new();
        for (r, right_column) in right.columns().iter().enumerate() {
            match left
                .columns()
                .iter()
                .position(|l| l.column.name == right_column.column.name)
            {
                Some(l) => shared.push((l, r)),
                None => right_columns.push(r),
            }
        }

        let left_rows = left.row_ids()?;
        let right_rows = right.row_ids()?;
        let mut rows = Vec::new();
        for l in &left_rows {
            let left_keys = shared
                .iter()
                .map(|(lc, _)| left.cell(*l, *lc))
                .collect::<Result<Vec<_>, _>>()?;
            if left_keys.iter().any(Value::is_null) {
                continue;
            }
            for r in &right_rows {
                let mut matched = true;
                for ((_, rc), key) in shared.iter().zip(&left_keys) {
                    if right.cell(*r, *rc)? != *key {
                        matched = false;
                        break;
                    }
                }
                if matched {
                    rows.push((*l, *r));
                }
            }
        }

        let mut columns = left.columns().to_vec();
        columns.extend(right_columns.iter().map(|r| right.columns()[*r].clone()));
        Ok(Self {
            name: left.name().clone(),
            left,
            right,
            columns,
            right_columns,
            rows,
        })
    }
}

impl Table for JoinTable {
    fn name(&self) -> &TableName {
        &self.name
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
        let (l, r) = *self
            .rows
            .get(row as usize)
            .ok_or_else(|| row_out_of_range(&self.name, row))?;
        let left_columns = self.left.column_count();
        if column < left_columns {
            return self.left.cell(l, column);
        }
        let right_column = self
            .right_columns
            .get(column - left_columns)
            .ok_or_else(|| column_out_of_range(&self.name, column))?;
        self.right.cell(r, *right_column)
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Distinct rows of `left` followed by the distinct rows of `right` not
/// already present. Columns are those of `left`.
#[derive(Debug)]
pub struct UnionTable {
    left: Arc<dyn Table>,
    right: Arc<dyn Table>,
    rows: Vec<(Side, RowId)>,
}

impl UnionTable {
    pub fn union(left: Arc<dyn Table>, right: Arc<dyn Table>) -> Result<Self, StrataError> {
        check_union_compatible(left.as_ref(), right.as_ref())?;

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for (side, table) in [(Side::Left, &left), (Side::Right, &right)] {
            for row in table.row_ids()? {
                if seen.insert(table.row_values(row)?) {
                    rows.push((side, row));
                }
            }
        }
        Ok(Self { left, right, rows })
    }
}

fn check_union_compatible(left: &dyn Table, right: &dyn Table) -> Result<(), StrataError> {
    if left.column_count() != right.column_count() {
        return Err(StrataError::IncompatibleUnion(format!(
            "{} has {} columns, {} has {}",
            left.name(),
            left.column_count(),
            right.name(),
            right.column_count()
        )));
    }
    for (l, r) in left.columns().iter().zip(right.columns()) {
        if l.column.data_type != r.column.data_type {
            return Err(StrataError::IncompatibleUnion(format!(
                "column '{}' is {:?} but '{}' is {:?}",
                l.column.name, l.column.data_type, r.column.name, r.column.data_type
            )));
        }
    }
    Ok(())
}

impl Table for UnionTable {
    fn name(&self) -> &TableName {
        self.left.name()
    }

    fn columns(&self) -> &[ResolvedColumn] {
        self.left.columns()
    }

    fn row_count(&self) -> Result<usize, StrataError> {
        Ok(self.rows.len())
    }

    fn row_ids(&self) -> Result<Vec<RowId>, StrataError> {
        Ok((0..self.rows.len() as RowId).collect())
    }

    fn cell(&self, row: RowId, column: usize) -> Result<Value, StrataError> {
        match self.rows.get(row as usize) {
            Some((Side::Left, source)) => self.left.cell(*source, column),
            Some((Side::Right, source)) => self.right.cell(*source, column),
            None => Err(row_out_of_range(self.name(), row)),
        }
    }
}
