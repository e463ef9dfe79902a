//! Column values exchanged with connection providers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::StorageError;

/// A value that can be bound to a statement parameter or read from a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Strings(Vec<String>),
    Datetime(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Strings(_) => "string array",
            Value::Datetime(_) => "datetime",
            Value::Json(_) => "json",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<i16> for Value {
    fn from(n: i16) -> Self {
        Value::Int(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::Strings(v)
    }
}

impl From<&[String]> for Value {
    fn from(v: &[String]) -> Self {
        Value::Strings(v.to_vec())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::Datetime(dt)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
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

/// Conversion from a row value into a record field.
///
/// `Null` becomes the field's zero value; `Option` fields become `None`.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, StorageError>;
}

fn mismatch<T>(value: &Value, expected: &str) -> Result<T, StorageError> {
    Err(StorageError::Mapping(format!(
        "expected {}, found {} value",
        expected,
        value.kind()
    )))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(b),
            other => mismatch(&other, "bool"),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Null => Ok(0),
            Value::Int(n) => Ok(n),
            other => mismatch(&other, "int"),
        }
    }
}

macro_rules! narrow_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, StorageError> {
                    let n = i64::from_value(value)?;
                    <$ty>::try_from(n).map_err(|_| {
                        StorageError::Mapping(format!(
                            "{} out of range for {}",
                            n,
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

narrow_int!(i16, i32, u32);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Null => Ok(0.0),
            Value::Float(n) => Ok(n),
            Value::Int(n) => Ok(n as f64),
            other => mismatch(&other, "float"),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        f64::from_value(value).map(|n| n as f32)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s),
            other => mismatch(&other, "string"),
        }
    }
}

impl FromValue for Vec<String> {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Strings(v) => Ok(v),
            other => mismatch(&other, "string array"),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Null => Ok(DateTime::<Utc>::default()),
            Value::Datetime(dt) => Ok(dt),
            Value::String(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StorageError::Mapping(format!("Invalid datetime: {}", e))),
            other => mismatch(&other, "datetime"),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Null => Ok(serde_json::Value::Null),
            Value::Json(v) => Ok(v),
            Value::String(s) => Ok(serde_json::Value::String(s)),
            other => mismatch(&other, "json"),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
