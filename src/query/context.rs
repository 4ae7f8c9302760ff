use std::sync::Arc;

use crate::core::errors::StrataError;
use crate::core::name::TableName;
use crate::core::value::Value;
use crate::storage::Table;

use super::node::QueryPlanNode;

/// What a plan needs from its surroundings while it is evaluated.
pub trait QueryContext {
    fn get_table(&self, name: &TableName) -> Result<Arc<dyn Table>, StrataError>;

    fn get_view_plan(&self, name: &TableName) -> Result<QueryPlanNode, StrataError>;

    fn invoke_routine(&self, name: &str, args: &[Value]) -> Result<Value, StrataError>;
}

/// Looks up the stored plan of a view, reading view definitions through `ctx`.
pub trait ViewPlanSource: Send + Sync + std::fmt::Debug {
    fn view_plan(&self, ctx: &dyn QueryContext, name: &TableName) -> Result<QueryPlanNode, StrataError>;
}
