use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::core::errors::StrataError;
use crate::core::name::ColumnRef;
use crate::core::value::{compare_integer_float, Value};
use crate::storage::{RowId, Table};

use super::context::QueryContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
    Concat,
}

/// Scalar expression evaluated against one row of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Constant(Value),
    Column(ColumnRef),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::new(name))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn evaluate(&self, table: &dyn Table, row: RowId, ctx: &dyn QueryContext) -> Result<Value, StrataError> {
        match self {
            Expr::Constant(value) => Ok(value.clone()),
            Expr::Column(reference) => {
                let column = table.resolve_column(reference)?;
                table.cell(row, column)
            }
            Expr::Binary { op, left, right } => {
                let left = left.evaluate(table, row, ctx)?;
                let right = right.evaluate(table, row, ctx)?;
                apply_binary(*op, &left, &right)
            }
            Expr::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(table, row, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                ctx.invoke_routine(name, &args)
            }
        }
    }
}

fn type_error(op: BinaryOp, left: &Value, right: &Value) -> StrataError {
    StrataError::Evaluation(format!("cannot apply {op:?} to {left} and {right}"))
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, StrataError> {
    use BinaryOp::*;

    if let (And | Or, Value::Boolean(a), Value::Boolean(b)) = (op, left, right) {
        return Ok(Value::Boolean(if op == And { *a && *b } else { *a || *b }));
    }
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    match op {
        Add | Subtract | Multiply | Divide => arithmetic(op, left, right),
        Equal | NotEqual | Less | LessOrEqual | Greater | GreaterOrEqual => {
            let ordering = compare(left, right).ok_or_else(|| type_error(op, left, right))?;
            let result = match op {
                Equal => ordering == Ordering::Equal,
                NotEqual => ordering != Ordering::Equal,
                Less => ordering == Ordering::Less,
                LessOrEqual => ordering != Ordering::Greater,
                Greater => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Boolean(result))
        }
        Concat => Ok(Value::Text(format!("{left}{right}"))),
        And | Or => Err(type_error(op, left, right)),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, StrataError> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Subtract => a.checked_sub(*b),
                BinaryOp::Multiply => a.checked_mul(*b),
                _ => a.checked_div(*b),
            };
            result
                .map(Value::Integer)
                .ok_or_else(|| StrataError::Evaluation(format!("integer overflow or division by zero in {a} {op:?} {b}")))
        }
        _ => {
            let (Some(a), Some(b)) = (as_float(left), as_float(right)) else {
                return Err(type_error(op, left, right));
            };
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                _ => a / b,
            };
            Ok(Value::Float(result))
        }
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        _ => None,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (Value::Binary(a), Value::Binary(b)) => Some(a.cmp(b)),
        (Value::Integer(a), Value::Float(b)) => compare_integer_float(*a, *b),
        (Value::Float(a), Value::Integer(b)) => compare_integer_float(*b, *a).map(Ordering::reverse),
        _ => as_float(left)?.partial_cmp(&as_float(right)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_promotes_and_checks() {
        assert_eq!(
            apply_binary(BinaryOp::Add, &Value::Integer(2), &Value::Integer(3)).unwrap(),
            Value::Integer(5)
        );
        assert_eq!(
            apply_binary(BinaryOp::Multiply, &Value::Integer(2), &Value::Float(1.5)).unwrap(),
            Value::Float(3.0)
        );
        assert!(apply_binary(BinaryOp::Divide, &Value::Integer(1), &Value::Integer(0)).is_err());
        assert!(apply_binary(BinaryOp::Add, &Value::Text("a".into()), &Value::Integer(1)).is_err());
        assert_eq!(
            apply_binary(BinaryOp::Subtract, &Value::Null, &Value::Integer(1)).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn comparison_and_concat() {
        assert_eq!(
            apply_binary(BinaryOp::Less, &Value::Integer(1), &Value::Float(1.5)).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            apply_binary(BinaryOp::Equal, &Value::from("x"), &Value::from("x")).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            apply_binary(BinaryOp::Concat, &Value::from("id-"), &Value::Integer(7)).unwrap(),
            Value::from("id-7")
        );
        assert_eq!(
            apply_binary(BinaryOp::Or, &Value::Boolean(false), &Value::Boolean(true)).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn equality_agrees_with_value_equality() {
        let pairs = [
            (Value::Integer(1), Value::Float(1.0)),
            (Value::Integer(1), Value::Float(1.5)),
            (Value::Float(-0.0), Value::Integer(0)),
            (Value::Integer(9_007_199_254_740_993), Value::Float(9_007_199_254_740_992.0)),
        ];
        for (left, right) in pairs {
            assert_eq!(
                apply_binary(BinaryOp::Equal, &left, &right).unwrap(),
                Value::Boolean(left == right),
                "{left} = {right}"
            );
        }
    }
}
