//! Typed variable values.

use std::fmt;

/// A variable value as returned by [`VariableStore::get`](super::VariableStore::get).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Text value.
    Str(String),
    /// Integer value (lengths, counts, flags).
    Int(i64),
    /// Collection members as `(name, value)`, in order.
    Collection(Vec<(String, String)>),
}

impl Value {
    /// The value as text; a collection yields its first member.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Int(n) => Some(n.to_string()),
            Value::Collection(items) => items.first().map(|(_, v)| v.clone()),
        }
    }

    /// The value as an integer, if it is one or parses as one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Collection(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Collection(items) => {
                for (i, (k, v)) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}
