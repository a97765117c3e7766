//! Core Database Backend Traits
//!
//! The relationship engine never talks to a database driver directly. It hands
//! a [`QueryBuilder`] to a [`QueryExecutor`] and receives plain rows back.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ModelResult;
use crate::query::QueryBuilder;

/// One result row: column name to value
pub type Row = HashMap<String, DatabaseValue>;

/// Executes built queries against a backing store
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute a SELECT query and return every result row, in result order
    async fn fetch_all(&self, query: &QueryBuilder) -> ModelResult<Vec<Row>>;
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Integer view of the value, widening Int32
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int32(i) => Some(i64::from(*i)),
            DatabaseValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Normalised join key, `None` for nulls
    ///
    /// Int32 and Int64 collapse into one variant so a foreign key stored as
    /// `INT4` still matches a primary key read back as `INT8`.
    pub fn to_key(&self) -> Option<RecordKey> {
        match self {
            DatabaseValue::Null => None,
            DatabaseValue::Bool(b) => Some(RecordKey::Bool(*b)),
            DatabaseValue::Int32(i) => Some(RecordKey::Int(i64::from(*i))),
            DatabaseValue::Int64(i) => Some(RecordKey::Int(*i)),
            // -0.0 and 0.0 are the same key
            DatabaseValue::Float64(f) => Some(RecordKey::Float((f + 0.0).to_bits())),
            DatabaseValue::String(s) => Some(RecordKey::Text(s.clone())),
            DatabaseValue::Uuid(u) => Some(RecordKey::Uuid(*u)),
            DatabaseValue::DateTime(dt) => Some(RecordKey::DateTime(*dt)),
            DatabaseValue::Date(d) => Some(RecordKey::Date(*d)),
            DatabaseValue::Json(j) => Some(RecordKey::Json(j.to_string())),
        }
    }

    /// Compare two values of compatible types
    pub fn compare(&self, other: &DatabaseValue) -> Option<Ordering> {
        match (self, other) {
            (DatabaseValue::Null, _) | (_, DatabaseValue::Null) => None,
            (DatabaseValue::Bool(a), DatabaseValue::Bool(b)) => Some(a.cmp(b)),
            (DatabaseValue::Float64(a), DatabaseValue::Float64(b)) => a.partial_cmp(b),
            (DatabaseValue::Float64(a), b) => b.as_i64().and_then(|b| a.partial_cmp(&(b as f64))),
            (a, DatabaseValue::Float64(b)) => a.as_i64().and_then(|a| (a as f64).partial_cmp(b)),
            (DatabaseValue::String(a), DatabaseValue::String(b)) => Some(a.cmp(b)),
            (DatabaseValue::Uuid(a), DatabaseValue::Uuid(b)) => Some(a.cmp(b)),
            (DatabaseValue::DateTime(a), DatabaseValue::DateTime(b)) => Some(a.cmp(b)),
            (DatabaseValue::Date(a), DatabaseValue::Date(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => None,
            },
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Int64(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Date(d) => JsonValue::String(d.to_string()),
            DatabaseValue::Json(j) => j.clone(),
        }
    }
}

impl From<RecordKey> for DatabaseValue {
    fn from(key: RecordKey) -> Self {
        match key {
            RecordKey::Bool(b) => DatabaseValue::Bool(b),
            RecordKey::Int(i) => DatabaseValue::Int64(i),
            RecordKey::Float(bits) => DatabaseValue::Float64(f64::from_bits(bits)),
            RecordKey::Text(s) => DatabaseValue::String(s),
            RecordKey::Uuid(u) => DatabaseValue::Uuid(u),
            RecordKey::DateTime(dt) => DatabaseValue::DateTime(dt),
            RecordKey::Date(d) => DatabaseValue::Date(d),
            RecordKey::Json(j) => serde_json::from_str(&j)
                .map(DatabaseValue::Json)
                .unwrap_or(DatabaseValue::String(j)),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<uuid::Uuid> for DatabaseValue {
    fn from(value: uuid::Uuid) -> Self {
        DatabaseValue::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DatabaseValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<chrono::NaiveDate> for DatabaseValue {
    fn from(value: chrono::NaiveDate) -> Self {
        DatabaseValue::Date(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::Json(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// Hashable join key derived from a non-null [`DatabaseValue`]
///
/// Only the two integer widths share a variant. Keys of different value
/// kinds never match, so `String("1")` does not join `Float64(1.0)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Bool(bool),
    Int(i64),
    /// IEEE-754 bit pattern
    Float(u64),
    Text(String),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    /// Compact JSON text
    Json(String),
}
