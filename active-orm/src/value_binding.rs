//! # Value Binding Module
//!
//! Moves [`Value`]s across the sqlx `Any` driver boundary: positional
//! parameters into [`AnyArguments`], and result columns of an [`AnyRow`] back
//! into [`Value`]s.
//!
//! The `Any` driver only transports a handful of primitive types, so temporal
//! values are bound as text formatted for the target driver (see
//! [`temporal`]), and columns are decoded by trying the primitive types in
//! turn.

use sqlx::{
    any::{AnyArguments, AnyRow},
    Arguments, Column, Row, ValueRef,
};

use crate::{database::Drivers, temporal, Error, Result, Value};

// ============================================================================
// Parameter Binding
// ============================================================================

/// Extension trait for binding [`Value`]s to `AnyArguments`.
pub trait ValueBinder {
    /// Binds one value with driver-specific handling of temporal types.
    fn bind_value(&mut self, value: &Value, driver: &Drivers) -> Result<()>;
}

impl ValueBinder for AnyArguments<'_> {
    fn bind_value(&mut self, value: &Value, driver: &Drivers) -> Result<()> {
        let added = match value {
            Value::Null => self.add(None::<String>),
            Value::Bool(v) => self.add(*v),
            Value::Int(v) => self.add(*v),
            Value::Float(v) => self.add(*v),
            Value::Text(v) => self.add(v.clone()),
            Value::Bytes(v) => self.add(v.clone()),
            Value::Timestamp(v) => self.add(temporal::format_datetime_utc(v, driver)),
            Value::DateTime(v) => self.add(temporal::format_naive_datetime(v, driver)),
            Value::Date(v) => self.add(temporal::format_naive_date(v)),
            Value::Time(v) => self.add(temporal::format_naive_time(v)),
        };
        added.map_err(|e| Error::Storage(sqlx::Error::Encode(e)))
    }
}

/// Builds the argument list of a statement from positional values.
pub fn bind_values<'q>(values: &[Value], driver: &Drivers) -> Result<AnyArguments<'q>> {
    let mut args = AnyArguments::default();
    for value in values {
        args.bind_value(value, driver)?;
    }
    Ok(args)
}

// ============================================================================
// Row Decoding
// ============================================================================

/// Decodes column `index` of `row`.
pub fn decode_column(row: &AnyRow, index: usize) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Ok(Value::Int(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Ok(Value::Float(v));
    }
    if let Ok(v) = row.try_get::<f32, _>(index) {
        return Ok(Value::Float(f64::from(v)));
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return Ok(Value::Bool(v));
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Ok(Value::Text(v));
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return Ok(Value::Bytes(v));
    }

    let name = row.columns().get(index).map_or("?", |c| c.name());
    Err(Error::Mapping(format!("Unsupported type in column '{}' (index {})", name, index)))
}

/// Decodes every column of `row` as `(column name, value)` pairs, in order.
pub fn decode_row(row: &AnyRow) -> Result<Vec<(String, Value)>> {
    row.columns()
        .iter()
        .map(|column| Ok((column.name().to_string(), decode_column(row, column.ordinal())?)))
        .collect()
}

/// Decodes every column of `row` as values, in order.
pub fn decode_values(row: &AnyRow) -> Result<Vec<Value>> {
    (0..row.columns().len()).map(|i| decode_column(row, i)).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sqlx::any::AnyPoolOptions;

    #[tokio::test]
    async fn test_decode_sqlite_row() {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let values = [Value::Int(7), Value::from("seven"), Value::Null, Value::Date(date)];
        let args = bind_values(&values, &Drivers::SQLite).unwrap();
        let row = sqlx::query_with("SELECT ? AS n, ? AS name, ? AS nothing, 1.5 AS ratio, ? AS day", args)
            .fetch_one(&pool)
            .await
            .unwrap();

        let decoded = decode_row(&row).unwrap();
        assert_eq!(decoded[0], ("n".to_string(), Value::Int(7)));
        assert_eq!(decoded[1], ("name".to_string(), Value::Text("seven".into())));
        assert_eq!(decoded[2].1, Value::Null);
        assert_eq!(decoded[3].1, Value::Float(1.5));
        assert_eq!(decoded[4].1, Value::Text("2024-01-15".into()));
    }
}
