use std::{cmp::Ordering, fmt::Display, rc::Rc};

use crate::{ast::InfixOperator, bytecode::FunctionEntry, tree_walk_interpreter::Closure};

/// A runtime value, shared by the tree-walking interpreter and the VM so both
/// engines agree on operator semantics and printed output.
#[derive(Debug, Clone)]
pub enum Value {
    Number(i64),
    String(Rc<str>),
    Boolean(bool),
    Function(Rc<Closure>),
    /// A function compiled into a chunk, as bound by the VM.
    CompiledFunction(Rc<FunctionEntry>),
    None,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::None, Value::None) => true,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.into())
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Function(c) => write!(f, "<function {}>", c.name()),
            Value::CompiledFunction(entry) => write!(f, "<function {}>", entry.name),
            Value::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("Type error: unsupported operand types for {op}: {left} and {right}")]
    InvalidOperands {
        op: InfixOperator,
        left: &'static str,
        right: &'static str,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow in {0}")]
    Overflow(InfixOperator),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0,
            Value::String(s) => !s.is_empty(),
            Value::Boolean(b) => *b,
            Value::Function(_) | Value::CompiledFunction(_) => true,
            Value::None => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Function(_) | Value::CompiledFunction(_) => "function",
            Value::None => "none",
        }
    }

    /// Applies an infix operator. `/` is floor division.
    pub fn binary(op: InfixOperator, left: Value, right: Value) -> Result<Value, OperationError> {
        let invalid = |left: &Value, right: &Value| OperationError::InvalidOperands {
            op,
            left: left.type_name(),
            right: right.type_name(),
        };

        match op {
            InfixOperator::Eq => Ok(Value::Boolean(left == right)),
            InfixOperator::Ne => Ok(Value::Boolean(left != right)),
            InfixOperator::Lt | InfixOperator::Gt | InfixOperator::Le | InfixOperator::Ge => {
                let ordering = match (&left, &right) {
                    (Value::Number(a), Value::Number(b)) => a.cmp(b),
                    (Value::String(a), Value::String(b)) => a.cmp(b),
                    _ => return Err(invalid(&left, &right)),
                };
                Ok(Value::Boolean(match op {
                    InfixOperator::Lt => ordering == Ordering::Less,
                    InfixOperator::Gt => ordering == Ordering::Greater,
                    InfixOperator::Le => ordering != Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }))
            }
            InfixOperator::Add => match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a
                    .checked_add(*b)
                    .map(Value::Number)
                    .ok_or(OperationError::Overflow(op)),
                (Value::String(a), Value::String(b)) => {
                    Ok(Value::String(format!("{}{}", a, b).into()))
                }
                _ => Err(invalid(&left, &right)),
            },
            InfixOperator::Sub | InfixOperator::Mult | InfixOperator::Div => {
                let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
                    return Err(invalid(&left, &right));
                };
                let result = match op {
                    InfixOperator::Sub => a.checked_sub(*b),
                    InfixOperator::Mult => a.checked_mul(*b),
                    _ => return floor_div(*a, *b).map(Value::Number),
                };
                result.map(Value::Number).ok_or(OperationError::Overflow(op))
            }
        }
    }
}

fn floor_div(a: i64, b: i64) -> Result<i64, OperationError> {
    if b == 0 {
        return Err(OperationError::DivisionByZero);
    }
    let quotient = a
        .checked_div(b)
        .ok_or(OperationError::Overflow(InfixOperator::Div))?;
    if a % b != 0 && (a < 0) != (b < 0) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(op: InfixOperator, a: i64, b: i64) -> Result<Value, OperationError> {
        Value::binary(op, Value::Number(a), Value::Number(b))
    }

    #[test]
    fn test_floor_division() {
        assert_eq!(number(InfixOperator::Div, -7, 2), Ok(Value::Number(-4)));
        assert_eq!(number(InfixOperator::Div, 7, 2), Ok(Value::Number(3)));
        assert_eq!(number(InfixOperator::Div, 7, -2), Ok(Value::Number(-4)));
        assert_eq!(number(InfixOperator::Div, -8, 2), Ok(Value::Number(-4)));
        assert_eq!(
            number(InfixOperator::Div, 1, 0),
            Err(OperationError::DivisionByZero)
        );
        assert_eq!(
            number(InfixOperator::Div, i64::MIN, -1),
            Err(OperationError::Overflow(InfixOperator::Div))
        );
    }

    #[test]
    fn test_overflow() {
        assert_eq!(
            number(InfixOperator::Add, i64::MAX, 1),
            Err(OperationError::Overflow(InfixOperator::Add))
        );
        assert_eq!(
            number(InfixOperator::Mult, i64::MAX, 2),
            Err(OperationError::Overflow(InfixOperator::Mult))
        );
    }

    #[test]
    fn test_string_operations() {
        assert_eq!(
            Value::binary(InfixOperator::Add, "foo".into(), "bar".into()),
            Ok("foobar".into())
        );
        assert_eq!(
            Value::binary(InfixOperator::Lt, "abc".into(), "abd".into()),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            Value::binary(InfixOperator::Sub, "a".into(), Value::Number(1)),
            Err(OperationError::InvalidOperands {
                op: InfixOperator::Sub,
                left: "string",
                right: "number",
            })
        );
    }

    #[test]
    fn test_equality_across_types() {
        assert_eq!(
            Value::binary(InfixOperator::Eq, Value::Number(1), "1".into()),
            Ok(Value::Boolean(false))
        );
        assert_eq!(
            Value::binary(InfixOperator::Ne, Value::None, Value::None),
            Ok(Value::Boolean(false))
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(number(InfixOperator::Le, 2, 2), Ok(Value::Boolean(true)));
        assert_eq!(number(InfixOperator::Ge, 1, 2), Ok(Value::Boolean(false)));
        assert_eq!(number(InfixOperator::Gt, 3, 2), Ok(Value::Boolean(true)));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Number(0).is_truthy());
        assert!(Value::Number(-1).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::None.is_truthy());
    }
}
