pub mod context;
pub mod expr;
pub mod node;
pub mod routines;
pub mod virtual_table;

pub use context::{QueryContext, ViewPlanSource};
pub use expr::{BinaryOp, Expr};
pub use node::{FunctionColumn, QueryPlanNode};
pub use routines::{BuiltinRoutines, RoutineResolver};
pub use virtual_table::{FunctionTable, JoinTable, ReferenceTable, UnionTable};
