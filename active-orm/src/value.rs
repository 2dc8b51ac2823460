//! # Value Module
//!
//! Dynamic SQL values carried by records, statement parameters and generic
//! query results.
//!
//! Every attribute of an entity and every positional parameter of a statement
//! is a [`Value`]. Conversions exist from the Rust primitives, `Option<T>`,
//! `uuid::Uuid` and the chrono temporal types; the reverse direction goes
//! through the [`FromValue`] trait.
//!
//! ## Example
//!
//! ```rust,ignore
//! use active_orm::{params, Value};
//!
//! let params = params![42, "alice", None::<i64>];
//! assert_eq!(params[0], Value::Int(42));
//! assert!(params[2].is_null());
//! ```

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::{errors::Result, temporal, Error};

// ============================================================================
// Value Enum
// ============================================================================

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL `NULL`. An attribute holding `Null` counts as unset.
    #[default]
    Null,
    Bool(bool),
    /// Every integer width is widened to `i64`.
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Timestamp with time zone, bound in the driver's preferred format.
    Timestamp(DateTime<Utc>),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl Value {
    /// Whether this value is SQL `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value.
    ///
    /// Text is parsed, which is how scalar results of `COUNT` statements are
    /// read back on drivers that report them as strings.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Bool(v) => Ok(i64::from(*v)),
            Value::Float(v) if v.fract() == 0.0 => Ok(*v as i64),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|e| Error::Conversion(format!("Failed to parse i64 from '{}': {}", s, e))),
            other => Err(Error::Conversion(format!("Cannot read {:?} as i64", other))),
        }
    }

    /// Floating point view of the value.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| Error::Conversion(format!("Failed to parse f64 from '{}': {}", s, e))),
            other => Err(Error::Conversion(format!("Cannot read {:?} as f64", other))),
        }
    }

    /// Boolean view of the value. Integers are accepted (`0` is false).
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(v) => Ok(*v),
            Value::Int(v) => Ok(*v != 0),
            Value::Text(s) => s
                .parse::<bool>()
                .map_err(|e| Error::Conversion(format!("Failed to parse bool from '{}': {}", s, e))),
            other => Err(Error::Conversion(format!("Cannot read {:?} as bool", other))),
        }
    }

    /// Borrowed text view; only `Text` values qualify.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Timestamp(v) => f.write_str(&v.to_rfc3339()),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Text(v) => serializer.serialize_str(v),
            Value::Bytes(v) => serializer.serialize_bytes(v),
            other => serializer.collect_str(other),
        }
    }
}

// ============================================================================
// Conversions Into Value
// ============================================================================

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
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

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

// ============================================================================
// Conversions Out Of Value
// ============================================================================

/// Typed extraction from a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64()
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let v = value.as_i64()?;
        i32::try_from(v).map_err(|_| Error::Conversion(format!("{} does not fit in i32", v)))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64()
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Err(Error::conversion("Cannot read null as String")),
            Value::Bytes(b) => String::from_utf8(b.clone())
                .map_err(|e| Error::Conversion(format!("Invalid UTF-8 text: {}", e))),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            other => Err(Error::Conversion(format!("Cannot read {:?} as bytes", other))),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => s.parse().map_err(|e| Error::Conversion(format!("Failed to parse UUID: {}", e))),
            Value::Bytes(b) => Uuid::from_slice(b).map_err(|e| Error::Conversion(format!("Failed to read UUID: {}", e))),
            other => Err(Error::Conversion(format!("Cannot read {:?} as UUID", other))),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Timestamp(v) => Ok(*v),
            Value::DateTime(v) => Ok(v.and_utc()),
            Value::Text(s) => temporal::parse_datetime_utc(s),
            other => Err(Error::Conversion(format!("Cannot read {:?} as DateTime<Utc>", other))),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::DateTime(v) => Ok(*v),
            Value::Timestamp(v) => Ok(v.naive_utc()),
            Value::Text(s) => temporal::parse_naive_datetime(s),
            other => Err(Error::Conversion(format!("Cannot read {:?} as NaiveDateTime", other))),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Date(v) => Ok(*v),
            Value::Text(s) => temporal::parse_naive_date(s),
            other => Err(Error::Conversion(format!("Cannot read {:?} as NaiveDate", other))),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Time(v) => Ok(*v),
            Value::Text(s) => temporal::parse_naive_time(s),
            other => Err(Error::Conversion(format!("Cannot read {:?} as NaiveTime", other))),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() { Ok(None) } else { T::from_value(value).map(Some) }
    }
}

// ============================================================================
// Query Rows
// ============================================================================

/// One row of a generic query.
///
/// One-column results produce `Single`, wider results produce `Multi` with the
/// values in column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryRow {
    Single(Value),
    Multi(Vec<Value>),
}

impl QueryRow {
    /// The value of a one-column row, or the first column of a wider row.
    pub fn first(&self) -> Option<&Value> {
        match self {
            QueryRow::Single(v) => Some(v),
            QueryRow::Multi(values) => values.first(),
        }
    }

    /// All values of the row in column order.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            QueryRow::Single(v) => vec![v],
            QueryRow::Multi(values) => values,
        }
    }
}

// ============================================================================
// Parameter Macro
// ============================================================================

/// Builds a positional parameter list (`Vec<Value>`) from heterogeneous values.
///
/// ```rust,ignore
/// let users = session.model::<User>().find_by("age > ? AND name <> ?", &params![18, "root"]).await?;
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($value)),+]
    };
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_macro_converts_in_order() {
        let params = params![1, "two", 3.5, true, None::<i32>];
        assert_eq!(
            params,
            vec![Value::Int(1), Value::Text("two".into()), Value::Float(3.5), Value::Bool(true), Value::Null]
        );
        assert!(params![].is_empty());
    }

    #[test]
    fn test_count_scalars_read_from_text_and_int() {
        assert_eq!(Value::Int(23).as_i64().unwrap(), 23);
        assert_eq!(Value::Text(" 42".into()).as_i64().unwrap(), 42);
        assert!(Value::Text("x".into()).as_i64().is_err());
        assert!(Value::Null.as_i64().is_err());
    }

    #[test]
    fn test_typed_extraction() {
        let id = Uuid::new_v4();
        assert_eq!(Uuid::from_value(&Value::from(id)).unwrap(), id);
        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(i32::from_value(&Value::Int(7)).unwrap(), 7);
        assert!(i32::from_value(&Value::Int(i64::MAX)).is_err());

        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(NaiveDate::from_value(&Value::Text("2024-02-29".into())).unwrap(), date);
    }

    #[test]
    fn test_query_row_accessors() {
        let single = QueryRow::Single(Value::Int(3));
        assert_eq!(single.first(), Some(&Value::Int(3)));

        let multi = QueryRow::Multi(vec![Value::Int(1), Value::Text("a".into())]);
        assert_eq!(multi.first(), Some(&Value::Int(1)));
        assert_eq!(multi.into_values().len(), 2);
    }
}
