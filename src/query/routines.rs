use std::fmt;

use crate::core::errors::StrataError;
use crate::core::value::Value;

/// Resolves and runs routine invocations found in plan expressions.
pub trait RoutineResolver: Send + Sync + fmt::Debug {
    fn routine_exists(&self, name: &str) -> bool;

    fn invoke(&self, name: &str, args: &[Value]) -> Result<Value, StrataError>;
}

const BUILTINS: &[&str] = &["abs", "upper", "lower", "length", "coalesce"];

/// The scalar functions every database provides. Names are case-insensitive.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinRoutines;

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), StrataError> {
    if args.len() != expected {
        return Err(StrataError::Evaluation(format!(
            "{name} expects {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn text_arg<'a>(name: &str, value: &'a Value) -> Result<&'a str, StrataError> {
    value
        .as_text()
        .ok_or_else(|| StrataError::Evaluation(format!("{name} expects text, got {value}")))
}

impl RoutineResolver for BuiltinRoutines {
    fn routine_exists(&self, name: &str) -> bool {
        BUILTINS.iter().any(|b| b.eq_ignore_ascii_case(name))
    }

    fn invoke(&self, name: &str, args: &[Value]) -> Result<Value, StrataError> {
        if !self.routine_exists(name) {
            return Err(StrataError::RoutineNotFound(name.to_string()));
        }
        let routine = name.to_ascii_lowercase();
        // Single-argument builtins are null-in, null-out.
        if routine != "coalesce" && args.first().is_some_and(Value::is_null) {
            arity(&routine, args, 1)?;
            return Ok(Value::Null);
        }
        match routine.as_str() {
            "abs" => {
                arity(&routine, args, 1)?;
                match &args[0] {
                    Value::Integer(v) => v
                        .checked_abs()
                        .map(Value::Integer)
                        .ok_or_else(|| StrataError::Evaluation(format!("abs({v}) overflows"))),
                    Value::Float(v) => Ok(Value::Float(v.abs())),
                    other => Err(StrataError::Evaluation(format!("abs expects a number, got {other}"))),
                }
            }
            "upper" => {
                arity(&routine, args, 1)?;
                Ok(Value::Text(text_arg(&routine, &args[0])?.to_uppercase()))
            }
            "lower" => {
                arity(&routine, args, 1)?;
                Ok(Value::Text(text_arg(&routine, &args[0])?.to_lowercase()))
            }
            "length" => {
                arity(&routine, args, 1)?;
                let len = match &args[0] {
                    Value::Binary(b) => b.len(),
                    other => text_arg(&routine, other)?.chars().count(),
                };
                Ok(Value::Integer(len as i64))
            }
            "coalesce" => Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
            _ => Err(StrataError::RoutineNotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_evaluate() {
        let r = BuiltinRoutines;
        assert_eq!(r.invoke("ABS", &[Value::Integer(-4)]).unwrap(), Value::Integer(4));
        assert_eq!(r.invoke("upper", &[Value::from("ab")]).unwrap(), Value::from("AB"));
        assert_eq!(r.invoke("length", &[Value::from("héllo")]).unwrap(), Value::Integer(5));
        assert_eq!(r.invoke("lower", &[Value::Null]).unwrap(), Value::Null);
        assert_eq!(
            r.invoke("coalesce", &[Value::Null, Value::Integer(2), Value::Integer(3)]).unwrap(),
            Value::Integer(2)
        );
    }

    #[test]
    fn bad_calls_are_errors() {
        let r = BuiltinRoutines;
        assert!(matches!(r.invoke("nope", &[]), Err(StrataError::RoutineNotFound(_))));
        assert!(matches!(r.invoke("abs", &[]), Err(StrataError::Evaluation(_))));
        assert!(matches!(r.invoke("upper", &[Value::Integer(1)]), Err(StrataError::Evaluation(_))));
        assert!(r.routine_exists("Coalesce"));
    }
}
