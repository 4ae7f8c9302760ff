use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::errors::StrataError;
use crate::core::name::TableName;
use crate::storage::Table;

use super::context::QueryContext;
use super::expr::Expr;
use super::virtual_table::{FunctionTable, JoinTable, ReferenceTable, UnionTable};

/// A named computed column added by `CreateFunctions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionColumn {
    pub name: String,
    pub expr: Expr,
}

impl FunctionColumn {
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }
}

/// Immutable plan tree. Evaluation never changes the tree; each call builds a
/// fresh table from the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryPlanNode {
    FetchTable {
        table: TableName,
        alias: Option<TableName>,
    },
    FetchView {
        view: TableName,
        alias: Option<TableName>,
    },
    CreateFunctions {
        child: Box<QueryPlanNode>,
        functions: Vec<FunctionColumn>,
    },
    NaturalJoin {
        left: Box<QueryPlanNode>,
        right: Box<QueryPlanNode>,
    },
    LogicalUnion {
        left: Box<QueryPlanNode>,
        right: Box<QueryPlanNode>,
    },
}

impl QueryPlanNode {
    pub fn fetch_table(table: TableName) -> Self {
        QueryPlanNode::FetchTable { table, alias: None }
    }

    pub fn fetch_view(view: TableName) -> Self {
        QueryPlanNode::FetchView { view, alias: None }
    }

    /// Alias a leaf. Other nodes are returned unchanged.
    pub fn with_alias(self, name: TableName) -> Self {
        match self {
            QueryPlanNode::FetchTable { table, .. } => QueryPlanNode::FetchTable {
                table,
                alias: Some(name),
            },
            QueryPlanNode::FetchView { view, .. } => QueryPlanNode::FetchView {
                view,
                alias: Some(name),
            },
            other => other,
        }
    }

    pub fn create_functions(child: QueryPlanNode, functions: Vec<FunctionColumn>) -> Self {
        QueryPlanNode::CreateFunctions {
            child: Box::new(child),
            functions,
        }
    }

    pub fn natural_join(left: QueryPlanNode, right: QueryPlanNode) -> Self {
        QueryPlanNode::NaturalJoin {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn logical_union(left: QueryPlanNode, right: QueryPlanNode) -> Self {
        QueryPlanNode::LogicalUnion {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn children(&self) -> Vec<&QueryPlanNode> {
        match self {
            QueryPlanNode::FetchTable { .. } | QueryPlanNode::FetchView { .. } => Vec::new(),
            QueryPlanNode::CreateFunctions { child, .. } => vec![child.as_ref()],
            QueryPlanNode::NaturalJoin { left, right } | QueryPlanNode::LogicalUnion { left, right } => {
                vec![left.as_ref(), right.as_ref()]
            }
        }
    }

    /// Names of every table and view the plan reads, leaves in left-to-right order.
    pub fn discover_table_names(&self) -> Vec<TableName> {
        match self {
            QueryPlanNode::FetchTable { table, .. } => vec![table.clone()],
            QueryPlanNode::FetchView { view, .. } => vec![view.clone()],
            _ => self
                .children()
                .into_iter()
                .flat_map(|child| child.discover_table_names())
                .collect(),
        }
    }

    /// Views fetched anywhere in the plan, leaves in left-to-right order.
    pub fn referenced_views(&self) -> Vec<TableName> {
        match self {
            QueryPlanNode::FetchTable { .. } => Vec::new(),
            QueryPlanNode::FetchView { view, .. } => vec![view.clone()],
            _ => self
                .children()
                .into_iter()
                .flat_map(|child| child.referenced_views())
                .collect(),
        }
    }

    /// Branch nodes evaluate the left child fully, then the right, then combine.
    pub fn evaluate(&self, ctx: &dyn QueryContext) -> Result<Arc<dyn Table>, StrataError> {
        self.evaluate_expanding(ctx, &mut Vec::new())
    }

    // `expanding` holds the views whose plans are being evaluated above this node.
    fn evaluate_expanding(
        &self,
        ctx: &dyn QueryContext,
        expanding: &mut Vec<TableName>,
    ) -> Result<Arc<dyn Table>, StrataError> {
        match self {
            QueryPlanNode::FetchTable { table, alias } => {
                let fetched = ctx.get_table(table)?;
                Ok(aliased(fetched, alias))
            }
            QueryPlanNode::FetchView { view, alias } => {
                if expanding.contains(view) {
                    return Err(StrataError::RecursiveView(view.clone()));
                }
                let plan = ctx.get_view_plan(view)?;
                expanding.push(view.clone());
                let evaluated = plan.evaluate_expanding(ctx, expanding);
                expanding.pop();
                Ok(aliased(evaluated?, alias))
            }
            QueryPlanNode::CreateFunctions { child, functions } => {
                let child = child.evaluate_expanding(ctx, expanding)?;
                Ok(Arc::new(FunctionTable::new(child, functions, ctx)?))
            }
            QueryPlanNode::NaturalJoin { left, right } => {
                let left = left.evaluate_expanding(ctx, expanding)?;
                let right = right.evaluate_expanding(ctx, expanding)?;
                Ok(Arc::new(JoinTable::natural_join(left, right)?))
            }
            QueryPlanNode::LogicalUnion { left, right } => {
                let left = left.evaluate_expanding(ctx, expanding)?;
                let right = right.evaluate_expanding(ctx, expanding)?;
                Ok(Arc::new(UnionTable::union(left, right)?))
            }
        }
    }
}

fn aliased(table: Arc<dyn Table>, alias: &Option<TableName>) -> Arc<dyn Table> {
    match alias {
        Some(name) => Arc::new(ReferenceTable::new(table, name.clone())),
        None => table,
    }
}
