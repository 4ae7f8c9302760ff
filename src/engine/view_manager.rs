use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::core::errors::StrataError;
use crate::core::name::TableName;
use crate::core::value::{DataType, Value};
use crate::query::{QueryContext, QueryPlanNode, ViewPlanSource};
use crate::storage::{ColumnInfo, MasterTable, RowId, Table, TableId, TableInfo};
use crate::txn::{CommitListener, TableCommitInfo, Transaction};

const SCHEMA_COLUMN: usize = 0;
const NAME_COLUMN: usize = 1;
const QUERY_COLUMN: usize = 2;
const PLAN_COLUMN: usize = 3;

/// Stores view definitions in `SYSTEM.views` and caches their decoded plans
/// by row. Only committed rows are cached; commits that touch the view table
/// evict the affected rows.
#[derive(Debug)]
pub struct ViewManager {
    master: Arc<MasterTable>,
    plans: Mutex<HashMap<RowId, QueryPlanNode>>,
}

impl ViewManager {
    /// `master` is the committed `SYSTEM.views` table.
    pub fn new(master: Arc<MasterTable>) -> Self {
        Self {
            master,
            plans: Mutex::new(HashMap::new()),
        }
    }

    pub fn table_name() -> TableName {
        TableName::new("SYSTEM", "views")
    }

    pub(crate) fn table_info(id: TableId) -> TableInfo {
        TableInfo::new(
            id,
            Self::table_name(),
            vec![
                ColumnInfo::new("schema", DataType::Text).not_null(),
                ColumnInfo::new("name", DataType::Text).not_null(),
                ColumnInfo::new("query", DataType::Text),
                ColumnInfo::new("plan", DataType::Text).not_null(),
            ],
        )
    }

    fn find_row<T: Table + ?Sized>(table: &T, name: &TableName) -> Result<Option<RowId>, StrataError> {
        for row in table.row_ids()? {
            if table.cell(row, SCHEMA_COLUMN)?.as_text() == Some(name.schema())
                && table.cell(row, NAME_COLUMN)?.as_text() == Some(name.name())
            {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn stored_plan<T: Table + ?Sized>(table: &T, row: RowId, name: &TableName) -> Result<QueryPlanNode, StrataError> {
        let blob = table.cell(row, PLAN_COLUMN)?;
        let text = blob
            .as_text()
            .ok_or_else(|| StrataError::InvalidState(format!("view {name} has no stored plan")))?;
        Ok(serde_json::from_str(text)?)
    }

    /// Fails if expanding `plan` through the stored views reaches `name`.
    fn check_not_recursive<T: Table + ?Sized>(
        table: &T,
        name: &TableName,
        plan: &QueryPlanNode,
    ) -> Result<(), StrataError> {
        let mut pending = plan.referenced_views();
        let mut seen = HashSet::new();
        while let Some(view) = pending.pop() {
            if view == *name {
                return Err(StrataError::RecursiveView(name.clone()));
            }
            if !seen.insert(view.clone()) {
                continue;
            }
            if let Some(row) = Self::find_row(table, &view)? {
                pending.extend(Self::stored_plan(table, row, &view)?.referenced_views());
            }
        }
        Ok(())
    }

    /// Store a view, replacing any existing definition of the same name. A
    /// plan that would expand back into the view itself is rejected.
    pub fn define_view(
        &self,
        txn: &Transaction,
        name: &TableName,
        query: &str,
        plan: &QueryPlanNode,
    ) -> Result<(), StrataError> {
        let table = txn.get_mutable_table(&Self::table_name())?;
        Self::check_not_recursive(table.as_ref(), name, plan)?;
        if let Some(row) = Self::find_row(table.as_ref(), name)? {
            table.remove_row(row)?;
        }
        table.add_row(vec![
            Value::from(name.schema()),
            Value::from(name.name()),
            Value::from(query),
            Value::Text(serde_json::to_string(plan)?),
        ])?;
        debug!(view = %name, "view defined");
        Ok(())
    }

    pub fn view_exists(&self, txn: &Transaction, name: &TableName) -> Result<bool, StrataError> {
        let table = txn.get_table(&Self::table_name())?;
        Ok(Self::find_row(table.as_ref(), name)?.is_some())
    }

    /// Returns false if no such view was defined.
    pub fn drop_view(&self, txn: &Transaction, name: &TableName) -> Result<bool, StrataError> {
        let table = txn.get_mutable_table(&Self::table_name())?;
        match Self::find_row(table.as_ref(), name)? {
            Some(row) => {
                table.remove_row(row)?;
                debug!(view = %name, "view dropped");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn view_names(&self, txn: &Transaction) -> Result<Vec<TableName>, StrataError> {
        let table = txn.get_table(&Self::table_name())?;
        let mut names = Vec::new();
        for row in table.row_ids()? {
            let schema = table.cell(row, SCHEMA_COLUMN)?;
            let name = table.cell(row, NAME_COLUMN)?;
            if let (Some(schema), Some(name)) = (schema.as_text(), name.as_text()) {
                names.push(TableName::new(schema, name));
            }
        }
        Ok(names)
    }

    /// The query text a view was defined with.
    pub fn view_query(&self, txn: &Transaction, name: &TableName) -> Result<Option<String>, StrataError> {
        let table = txn.get_table(&Self::table_name())?;
        let row = Self::find_row(table.as_ref(), name)?.ok_or_else(|| StrataError::ViewNotFound(name.clone()))?;
        Ok(table.cell(row, QUERY_COLUMN)?.as_text().map(str::to_string))
    }

    pub fn cached_plan_count(&self) -> usize {
        self.plans.lock().len()
    }
}

impl ViewPlanSource for ViewManager {
    fn view_plan(&self, ctx: &dyn QueryContext, name: &TableName) -> Result<QueryPlanNode, StrataError> {
        let table = ctx.get_table(&Self::table_name())?;
        let row = Self::find_row(table.as_ref(), name)?.ok_or_else(|| StrataError::ViewNotFound(name.clone()))?;
        if let Some(plan) = self.plans.lock().get(&row) {
            return Ok(plan.clone());
        }

        let plan = Self::stored_plan(table.as_ref(), row, name)?;
        // Rows staged by an open transaction may never commit.
        if self.master.is_committed_row(row) {
            self.plans.lock().insert(row, plan.clone());
        }
        Ok(plan)
    }
}

impl CommitListener for ViewManager {
    fn on_commit(&self, info: &TableCommitInfo) {
        if info.table_name != Self::table_name() {
            return;
        }
        let mut plans = self.plans.lock();
        for row in info.removed_rows.iter().chain(&info.added_rows) {
            plans.remove(row);
        }
        debug!(
            added = info.added_rows.len(),
            removed = info.removed_rows.len(),
            "view cache invalidated"
        );
    }
}
