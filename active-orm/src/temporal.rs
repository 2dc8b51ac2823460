//! # Temporal Type Conversion Module
//!
//! Driver-specific handling of the temporal [`Value`](crate::Value) variants.
//!
//! Values are stored driver-independently in records; the format is only
//! chosen when a value is bound to a statement:
//!
//! - **PostgreSQL**: RFC 3339 for timestamps with time zone, microsecond
//!   precision for naive timestamps
//! - **MySQL**: `YYYY-MM-DD HH:MM:SS.ffffff` (MySQL rejects the `T` separator
//!   and offsets)
//! - **SQLite**: text, RFC 3339 for timestamps with time zone
//!
//! Values read back from text columns are parsed with the `parse_*` helpers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::{database::Drivers, Error};

// ============================================================================
// Formatting
// ============================================================================

/// Formats a `DateTime<Utc>` for binding on the given driver.
pub fn format_datetime_utc(value: &DateTime<Utc>, driver: &Drivers) -> String {
    match driver {
        Drivers::Postgres | Drivers::SQLite => value.to_rfc3339(),
        Drivers::MySQL => value.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
    }
}

/// Formats a `NaiveDateTime` for binding on the given driver.
pub fn format_naive_datetime(value: &NaiveDateTime, driver: &Drivers) -> String {
    match driver {
        Drivers::Postgres | Drivers::MySQL => value.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        Drivers::SQLite => value.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
    }
}

/// Formats a `NaiveDate`. Identical on every driver.
pub fn format_naive_date(value: &NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

/// Formats a `NaiveTime`. Identical on every driver.
pub fn format_naive_time(value: &NaiveTime) -> String {
    value.format("%H:%M:%S%.6f").to_string()
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses a timestamp with time zone. Falls back to a naive timestamp
/// interpreted as UTC, which is what MySQL and SQLite hand back.
pub fn parse_datetime_utc(value: &str) -> Result<DateTime<Utc>, Error> {
    if let Ok(v) = DateTime::parse_from_rfc3339(value) {
        return Ok(v.with_timezone(&Utc));
    }
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| parse_naive_datetime(value).map(|v| v.and_utc()))
        .map_err(|_| Error::Conversion(format!("Failed to parse DateTime<Utc>: {}", value)))
}

/// Parses a naive timestamp, with either a `T` or a space separator.
pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime, Error> {
    value
        .parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| Error::Conversion(format!("Failed to parse NaiveDateTime: {}", e)))
}

/// Parses a date in `YYYY-MM-DD` form.
pub fn parse_naive_date(value: &str) -> Result<NaiveDate, Error> {
    value.parse::<NaiveDate>().map_err(|e| Error::Conversion(format!("Failed to parse NaiveDate: {}", e)))
}

/// Parses a time of day.
pub fn parse_naive_time(value: &str) -> Result<NaiveTime, Error> {
    value.parse::<NaiveTime>().map_err(|e| Error::Conversion(format!("Failed to parse NaiveTime: {}", e)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_mysql_format_has_no_offset() {
        let value = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(format_datetime_utc(&value, &Drivers::MySQL), "2024-01-15 10:30:00.000000");
        assert_eq!(format_datetime_utc(&value, &Drivers::Postgres), "2024-01-15T10:30:00+00:00");
    }

    #[test]
    fn test_parse_accepts_space_separated_naive_timestamps() {
        let parsed = parse_datetime_utc("2024-01-15 10:30:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());

        let naive = parse_naive_datetime("2024-01-15T10:30:00").unwrap();
        assert_eq!(naive.and_utc(), parsed);
    }

    #[test]
    fn test_parse_errors_are_conversion_errors() {
        assert!(matches!(parse_naive_date("15/01/2024"), Err(Error::Conversion(_))));
        assert!(matches!(parse_naive_time("25:99"), Err(Error::Conversion(_))));
    }
}
