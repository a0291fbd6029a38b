//! Dynamically-typed SQL values and rows.
//!
//! Rows keep their engine-native representation from the moment they are
//! fetched until they are marshaled into the target engine's parameter
//! encoding at insert time.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Type hint for NULL values.
///
/// Postgres parameter binding needs a cast even for NULLs, so the column
/// type observed at fetch time is carried along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    Text,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

/// SQL value enum for type-safe row handling across engines.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with a type hint for correct parameter encoding.
    Null(SqlNullType),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Decimal(Decimal),
    /// Timestamp without timezone.
    DateTime(NaiveDateTime),
    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Convert to a JSON value for row previews and API responses.
    ///
    /// Binary data is rendered in hex with a `\x` prefix (PostgreSQL text
    /// format); decimals are rendered as strings to preserve precision.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            SqlValue::Null(_) => Json::Null,
            SqlValue::Bool(b) => Json::Bool(*b),
            SqlValue::I16(n) => Json::from(*n),
            SqlValue::I32(n) => Json::from(*n),
            SqlValue::I64(n) => Json::from(*n),
            SqlValue::F32(n) => serde_json::Number::from_f64(f64::from(*n))
                .map(Json::Number)
                .unwrap_or(Json::Null),
            SqlValue::F64(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            SqlValue::Text(s) => Json::String(s.clone()),
            SqlValue::Bytes(b) => Json::String(format!("\\x{}", hex::encode(b))),
            SqlValue::Uuid(u) => Json::String(u.to_string()),
            SqlValue::Decimal(d) => Json::String(d.to_string()),
            SqlValue::DateTime(dt) => Json::String(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
            SqlValue::DateTimeOffset(dt) => Json::String(dt.to_rfc3339()),
            SqlValue::Date(d) => Json::String(d.to_string()),
            SqlValue::Time(t) => Json::String(t.to_string()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

/// One fetched row: an ordered mapping from column name to value.
///
/// Column order is the order the source engine returned them in; the
/// migration engine derives the target column list from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Render as a JSON object, preserving column order.
    pub fn to_json_object(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.columns.len());
        for (name, value) in self.columns.iter().zip(&self.values) {
            map.insert(name.clone(), value.to_json());
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_null() {
        assert!(SqlValue::Null(SqlNullType::Text).is_null());
        assert!(!SqlValue::I32(42).is_null());
    }

    #[test]
    fn json_scalars() {
        assert_eq!(SqlValue::I64(7).to_json(), serde_json::json!(7));
        assert_eq!(SqlValue::Bool(true).to_json(), serde_json::json!(true));
        assert_eq!(
            SqlValue::Text("hi".into()).to_json(),
            serde_json::json!("hi")
        );
        assert_eq!(
            SqlValue::Null(SqlNullType::I64).to_json(),
            serde_json::Value::Null
        );
        assert_eq!(
            SqlValue::Bytes(vec![0xde, 0xad]).to_json(),
            serde_json::json!("\\xdead")
        );
    }

    #[test]
    fn json_nan_is_null() {
        assert_eq!(SqlValue::F64(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn row_json_preserves_column_order() {
        let row = Row::new(
            vec!["id".into(), "name".into()],
            vec![SqlValue::I64(1), SqlValue::Text("a".into())],
        );
        let json = row.to_json_object();
        let obj = json.as_object().unwrap();
        let keys: Vec<_> = obj.keys().collect();
        assert_eq!(keys, vec!["id", "name"]);
        assert_eq!(obj["id"], serde_json::json!(1));
    }
}
