//! Row identity keys
//!
//! Flat joined rows repeat parent columns once per child. The row assembler
//! groups them by the primary key of each joined alias, which can be an
//! integer, text or uuid column.

use sea_orm::Value;
use std::fmt;
use uuid::Uuid;

use crate::codec::{self, FieldValue};

/// Primary key value of one joined row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    Int(i64),
    String(String),
    Uuid(Uuid),
}

impl RowKey {
    /// Key of a raw column value. `None` for NULL, which is how a LEFT JOIN
    /// reports a missing related row.
    pub fn from_db_value(value: &Value) -> Option<Self> {
        if codec::is_null(value) {
            return None;
        }
        if let Some(i) = codec::value_as_i64(value) {
            return Some(Self::Int(i));
        }
        match value {
            Value::Uuid(Some(u)) => Some(Self::Uuid(**u)),
            Value::String(Some(s)) => Some(Self::String(s.to_string())),
            Value::Char(Some(c)) => Some(Self::String(c.to_string())),
            Value::Bytes(Some(b)) => match Uuid::from_slice(b) {
                Ok(u) => Some(Self::Uuid(u)),
                Err(_) => Some(Self::String(String::from_utf8_lossy(b).into_owned())),
            },
            other => Some(Self::String(format!("{:?}", other))),
        }
    }

    /// Key of a decoded value
    pub fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => None,
            FieldValue::SmallInt(i) => Some(Self::Int(*i as i64)),
            FieldValue::Int(i) => Some(Self::Int(*i as i64)),
            FieldValue::BigInt(i) => Some(Self::Int(*i)),
            FieldValue::Uuid(u) => Some(Self::Uuid(*u)),
            FieldValue::String(s) => Some(Self::String(s.clone())),
            other => Some(Self::String(other.to_string())),
        }
    }

    pub fn to_db_value(&self) -> Value {
        match self {
            Self::Int(value) => Value::from(*value),
            Self::String(value) => Value::from(value.clone()),
            Self::Uuid(value) => Value::from(*value),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{}", value),
            Self::String(value) => write!(f, "{}", value),
            Self::Uuid(value) => write!(f, "{}", value),
        }
    }
}

impl From<i32> for RowKey {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<i64> for RowKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for RowKey {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<Uuid> for RowKey {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}
