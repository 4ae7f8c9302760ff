use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    Text,
    Binary,
}

/// A single cell value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Integer(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Float),
            Value::Text(_) => Some(DataType::Text),
            Value::Binary(_) => Some(DataType::Binary),
        }
    }

    /// Null fits every column type; integers are accepted by float columns.
    pub fn fits(&self, data_type: DataType) -> bool {
        match self.data_type() {
            None => true,
            Some(DataType::Integer) if data_type == DataType::Float => true,
            Some(own) => own == data_type,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }
}

// 2^63 as a float; every finite float strictly below it and at or above its
// negation converts to an i64 without saturating.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn exact_integer(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&f)).then_some(f as i64)
}

/// Orders an integer against a float by mathematical value. `None` for NaN.
pub(crate) fn compare_integer_float(a: i64, b: f64) -> Option<Ordering> {
    if b.is_nan() {
        return None;
    }
    if let Some(whole) = exact_integer(b) {
        return Some(a.cmp(&whole));
    }
    if b >= I64_BOUND {
        return Some(Ordering::Less);
    }
    if b < -I64_BOUND {
        return Some(Ordering::Greater);
    }
    // A fractional float in range is below 2^52, where the cast is exact
    // enough to order correctly and never ties.
    (a as f64).partial_cmp(&b)
}

// Numbers compare by value across integer and float, the same way expression
// comparison does. NaN equals NaN so rows stay hashable for distinct unions.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                compare_integer_float(*a, *b) == Some(Ordering::Equal)
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Float(f) => match exact_integer(*f) {
                Some(whole) => Value::Integer(whole).hash(state),
                None if f.is_nan() => {
                    std::mem::discriminant(self).hash(state);
                    f64::NAN.to_bits().hash(state);
                }
                None => {
                    std::mem::discriminant(self).hash(state);
                    f.to_bits().hash(state);
                }
            },
            _ => {
                std::mem::discriminant(self).hash(state);
                match self {
                    Value::Boolean(b) => b.hash(state),
                    Value::Integer(i) => i.hash(state),
                    Value::Text(s) => s.hash(state),
                    Value::Binary(b) => b.hash(state),
                    Value::Null | Value::Float(_) => {}
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn integers_and_floats_of_equal_value_are_one_value() {
        assert_eq!(Value::Integer(1), Value::Float(1.0));
        assert_eq!(Value::Float(-0.0), Value::Integer(0));
        assert_ne!(Value::Integer(1), Value::Float(1.5));
        assert_ne!(Value::Integer(i64::MAX), Value::Float(9_223_372_036_854_775_808.0));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));

        let distinct: HashSet<Value> = [Value::Integer(2), Value::Float(2.0), Value::Float(2.5)]
            .into_iter()
            .collect();
        assert_eq!(distinct.len(), 2);
    }

    #[test]
    fn integer_float_ordering_is_exact() {
        assert_eq!(compare_integer_float(1, 1.5), Some(Ordering::Less));
        assert_eq!(compare_integer_float(2, 1.5), Some(Ordering::Greater));
        assert_eq!(compare_integer_float(-2, -1.5), Some(Ordering::Less));
        assert_eq!(compare_integer_float(i64::MAX, 1e19), Some(Ordering::Less));
        assert_eq!(compare_integer_float(0, f64::NAN), None);
    }
}
