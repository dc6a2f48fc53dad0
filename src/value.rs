//! Runtime values
//!
//! Every cell of the operand stack and of the call stack holds a [`Value`].
//! Numbers are copied by value. Strings own their buffer: the cell holding a
//! string is its only owner, and the buffer is released as soon as the cell is
//! popped, swept or truncated away.

use std::fmt;

/// Discriminant of a [`Value`]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ValueKind {
    Int,
    Float,
    Str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f64),
    Str(String),
}

/// Operands of a binary numeric operation after promotion
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Promoted {
    Ints(i32, i32),
    Floats(f64, f64),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
        }
    }

    /// Build the constant for an integer literal. Literals that do not fit
    /// in 32 bits become floats.
    pub fn from_integer_literal(literal: &str) -> Option<Self> {
        match literal.parse::<i32>() {
            Ok(number) => Some(Value::Int(number)),
            Err(_) => literal.parse::<f64>().ok().map(Value::Float),
        }
    }

    /// Numeric view of the value, promoting integers
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Value::Int(number) => Some(number as f64),
            Value::Float(number) => Some(number),
            Value::Str(_) => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(number) => *number != 0,
            Value::Float(number) => *number != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    pub fn from_bool(b: bool) -> Self {
        Value::Int(b as i32)
    }

    /// Apply the int/int vs promote-to-float rule to a pair of operands.
    /// `None` if either side is not a number.
    pub fn promote(lhs: &Value, rhs: &Value) -> Option<Promoted> {
        match (lhs, rhs) {
            (Value::Int(l), Value::Int(r)) => Some(Promoted::Ints(*l, *r)),
            _ => Some(Promoted::Floats(lhs.as_float()?, rhs.as_float()?)),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Int(0)
    }
}

impl From<i32> for Value {
    fn from(number: i32) -> Self {
        Value::Int(number)
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Value::Float(number)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "string",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(number) => write!(f, "{}", number),
            Value::Float(number) => write!(f, "{:?}", number),
            Value::Str(s) => f.write_str(s),
        }
    }
}
