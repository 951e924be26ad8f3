//! The value model shared by the normalizer and the encoder.
//!
//! Logging call sites pass loosely typed arguments; [`Value`] is the closed
//! set of shapes those arguments can take. Composite variants contribute
//! their own key/value pairs when flattened, everything else is a scalar.

use std::collections::BTreeMap;
use std::fmt;

/// Boxed error type accepted everywhere a call site passes an error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Ordered map of keys to values. `BTreeMap` keeps expansion order
/// deterministic.
pub type Map = BTreeMap<String, Value>;

/// One argument to a logging call.
pub enum Value {
    /// Absent value.
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    /// Plain text.
    Str(String),
    /// Raw bytes; invalid UTF-8 is carried through unmodified.
    Bytes(Vec<u8>),
    /// Error-typed value.
    Error(BoxError),
    /// Any other scalar with a textual representation.
    Display(Box<dyn fmt::Display + Send + Sync>),
    /// An explicit key/value pair; contributes itself when flattened.
    Pair(String, Box<Value>),
    /// A map; contributes all its entries when flattened.
    Map(Map),
    /// A nested argument list; flattened recursively.
    Seq(Vec<Value>),
}

/// Transient classification used while flattening. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Class {
    /// Produces its own pairs (`Pair`, `Map`, `Seq`).
    Composite,
    /// Plain text (`Str`).
    Text,
    /// Error-typed.
    Error,
    /// Any other scalar.
    Other,
}

impl Value {
    /// Shorthand for wrapping an error value.
    pub fn error(err: impl Into<BoxError>) -> Self {
        Value::Error(err.into())
    }

    /// Shorthand for wrapping any displayable scalar.
    pub fn display(value: impl fmt::Display + Send + Sync + 'static) -> Self {
        Value::Display(Box::new(value))
    }

    pub(crate) fn class(&self) -> Class {
        match self {
            Value::Pair(..) | Value::Map(_) | Value::Seq(_) => Class::Composite,
            Value::Str(_) => Class::Text,
            Value::Error(_) => Class::Error,
            _ => Class::Other,
        }
    }

    /// The string contents, for values usable as keys.
    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Build an explicit key/value pair.
pub fn pair(key: impl Into<String>, value: impl Into<Value>) -> Value {
    Value::Pair(key.into(), Box::new(value.into()))
}

impl fmt::Display for Value {
    /// Scalars render bare; composites render as their `key=value` pairs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
            Value::Bytes(v) => f.write_str(&String::from_utf8_lossy(v)),
            Value::Error(v) => write!(f, "{v}"),
            Value::Display(v) => write!(f, "{v}"),
            composite => {
                let mut buf = Vec::new();
                crate::logfmt::write_pairs(&mut buf, &crate::flatten::flatten(vec![composite.clone()]));
                f.write_str(&String::from_utf8_lossy(&buf))
            }
        }
    }
}

impl Clone for Value {
    /// Trait-object variants clone by capturing their rendered text; the
    /// classification of the value is preserved.
    fn clone(&self) -> Self {
        match self {
            Value::Null => Value::Null,
            Value::Bool(v) => Value::Bool(*v),
            Value::Int(v) => Value::Int(*v),
            Value::Uint(v) => Value::Uint(*v),
            Value::Float(v) => Value::Float(*v),
            Value::Str(v) => Value::Str(v.clone()),
            Value::Bytes(v) => Value::Bytes(v.clone()),
            Value::Error(v) => Value::Error(v.to_string().into()),
            Value::Display(v) => Value::Display(Box::new(v.to_string())),
            Value::Pair(k, v) => Value::Pair(k.clone(), v.clone()),
            Value::Map(m) => Value::Map(m.clone()),
            Value::Seq(s) => Value::Seq(s.clone()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Uint(v) => write!(f, "Uint({v})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Str(v) => write!(f, "Str({v:?})"),
            Value::Bytes(v) => write!(f, "Bytes({v:?})"),
            Value::Error(v) => write!(f, "Error({v})"),
            Value::Display(v) => write!(f, "Display({v})"),
            Value::Pair(k, v) => write!(f, "Pair({k:?}, {v:?})"),
            Value::Map(m) => write!(f, "Map({m:?})"),
            Value::Seq(s) => write!(f, "Seq({s:?})"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            // Trait objects compare by their rendered text.
            (Value::Error(a), Value::Error(b)) => a.to_string() == b.to_string(),
            (Value::Display(a), Value::Display(b)) => a.to_string() == b.to_string(),
            (Value::Pair(ak, av), Value::Pair(bk, bv)) => ak == bk && av == bv,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint(u64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Uint(v as u64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<BoxError> for Value {
    fn from(v: BoxError) -> Self {
        Value::Error(v)
    }
}
