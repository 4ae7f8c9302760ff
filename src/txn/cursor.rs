use std::sync::Arc;

use crate::core::errors::StrataError;
use crate::core::name::TableName;
use crate::core::value::Value;
use crate::query::{QueryContext, QueryPlanNode};
use crate::storage::{RowId, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorAttributes {
    pub read_only: bool,
    pub scrollable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Declared,
    Open,
    Closed,
    /// Evaluating the plan failed; the cursor can no longer be used.
    Broken,
}

/// A named, transaction-scoped iterator over the result of a query plan.
#[derive(Debug)]
pub struct Cursor {
    name: TableName,
    plan: QueryPlanNode,
    attributes: CursorAttributes,
    state: CursorState,
    result: Option<Arc<dyn Table>>,
    rows: Vec<RowId>,
    position: usize,
}

impl Cursor {
    pub fn new(name: TableName, plan: QueryPlanNode, attributes: CursorAttributes) -> Self {
        Self {
            name,
            plan,
            attributes,
            state: CursorState::Declared,
            result: None,
            rows: Vec::new(),
            position: 0,
        }
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    pub fn plan(&self) -> &QueryPlanNode {
        &self.plan
    }

    pub fn attributes(&self) -> CursorAttributes {
        self.attributes
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn is_broken(&self) -> bool {
        self.state == CursorState::Broken
    }

    fn invalid_state(&self) -> StrataError {
        StrataError::InvalidCursorState {
            name: self.name.clone(),
            state: self.state,
        }
    }

    /// Evaluate the plan and position before the first row. A closed cursor
    /// may be reopened; a failed evaluation breaks the cursor.
    pub fn open(&mut self, ctx: &dyn QueryContext) -> Result<(), StrataError> {
        if !matches!(self.state, CursorState::Declared | CursorState::Closed) {
            return Err(self.invalid_state());
        }
        let evaluated = self.plan.evaluate(ctx).and_then(|table| {
            let rows = table.row_ids()?;
            Ok((table, rows))
        });
        match evaluated {
            Ok((table, rows)) => {
                self.result = Some(table);
                self.rows = rows;
                self.position = 0;
                self.state = CursorState::Open;
                Ok(())
            }
            Err(err) => {
                self.state = CursorState::Broken;
                Err(err)
            }
        }
    }

    fn open_result(&self) -> Result<&Arc<dyn Table>, StrataError> {
        match (&self.state, &self.result) {
            (CursorState::Open, Some(table)) => Ok(table),
            _ => Err(self.invalid_state()),
        }
    }

    /// Columns of the evaluated result.
    pub fn result(&self) -> Result<Arc<dyn Table>, StrataError> {
        self.open_result().cloned()
    }

    pub fn fetch_next(&mut self) -> Result<Option<Vec<Value>>, StrataError> {
        let table = self.open_result()?.clone();
        let Some(row) = self.rows.get(self.position).copied() else {
            return Ok(None);
        };
        let values = self.read_row(&table, row)?;
        self.position += 1;
        Ok(Some(values))
    }

    /// Fetch the row at zero-based `offset`; the next `fetch_next` continues
    /// after it. Only scrollable cursors may move backwards or skip.
    pub fn fetch_absolute(&mut self, offset: usize) -> Result<Option<Vec<Value>>, StrataError> {
        if !self.attributes.scrollable {
            return Err(StrataError::InvalidState(format!(
                "cursor {} is not scrollable",
                self.name
            )));
        }
        let table = self.open_result()?.clone();
        let Some(row) = self.rows.get(offset).copied() else {
            self.position = self.rows.len();
            return Ok(None);
        };
        let values = self.read_row(&table, row)?;
        self.position = offset + 1;
        Ok(Some(values))
    }

    fn read_row(&mut self, table: &Arc<dyn Table>, row: RowId) -> Result<Vec<Value>, StrataError> {
        table.row_values(row).map_err(|err| {
            self.state = CursorState::Broken;
            self.result = None;
            err
        })
    }

    pub fn close(&mut self) -> Result<(), StrataError> {
        if self.state != CursorState::Open {
            return Err(self.invalid_state());
        }
        self.result = None;
        self.rows.clear();
        self.position = 0;
        self.state = CursorState::Closed;
        Ok(())
    }
}
