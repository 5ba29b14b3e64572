//! Timestamp rendering for the record time field
//!
//! Numeric formats render as JSON numbers, everything else as strings. A
//! custom strftime string that chrono cannot format falls back to Unix
//! seconds instead of failing.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::str::FromStr;

/// Timestamp format options for the record time field
///
/// # Examples
///
/// ```
/// use bulk_log_shipper::core::TimestampFormat;
/// use chrono::{TimeZone, Utc};
///
/// let at = Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45).unwrap();
/// let format: TimestampFormat = "%Y-%m-%d".parse().unwrap();
/// assert_eq!(format.render(&at), serde_json::json!("2025-01-08"));
/// assert_eq!(TimestampFormat::Unix.render(&at), serde_json::json!(1736332245));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TimestampFormat {
    /// ISO 8601 with milliseconds: `2025-01-08T10:30:45.123Z`
    Iso8601,

    /// ISO 8601 with microseconds: `2025-01-08T10:30:45.123456Z`
    Iso8601Micros,

    /// RFC 3339 with offset: `2025-01-08T10:30:45.123456+00:00`
    Rfc3339,

    /// Unix seconds, the fallback for absent or unusable formats
    #[default]
    Unix,

    UnixMillis,

    UnixMicros,

    /// Any strftime string
    Custom(String),
}

impl TimestampFormat {
    /// Render `datetime` as the JSON value stored in the record.
    #[must_use]
    pub fn render(&self, datetime: &DateTime<Utc>) -> serde_json::Value {
        match self {
            TimestampFormat::Iso8601 => {
                datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string().into()
            }
            TimestampFormat::Iso8601Micros => {
                datetime.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string().into()
            }
            TimestampFormat::Rfc3339 => datetime.to_rfc3339().into(),
            TimestampFormat::Unix => datetime.timestamp().into(),
            TimestampFormat::UnixMillis => datetime.timestamp_millis().into(),
            TimestampFormat::UnixMicros => datetime.timestamp_micros().into(),
            TimestampFormat::Custom(pattern) => match try_format(datetime, pattern) {
                Some(text) if !pattern.is_empty() => text.into(),
                _ => TimestampFormat::Unix.render(datetime),
            },
        }
    }

    /// Whether this format renders as configured, without falling back.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            TimestampFormat::Custom(pattern) => !pattern.is_empty() && is_valid_strftime(pattern),
            _ => true,
        }
    }
}

impl FromStr for TimestampFormat {
    type Err = std::convert::Infallible;

    /// Named formats are matched case-insensitively; anything else is taken
    /// as a strftime pattern.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "iso8601" => TimestampFormat::Iso8601,
            "iso8601_micros" => TimestampFormat::Iso8601Micros,
            "rfc3339" => TimestampFormat::Rfc3339,
            "unix" | "" => TimestampFormat::Unix,
            "unix_millis" => TimestampFormat::UnixMillis,
            "unix_micros" => TimestampFormat::UnixMicros,
            _ => TimestampFormat::Custom(s.to_string()),
        })
    }
}

/// True when chrono understands every specifier in `pattern`.
pub fn is_valid_strftime(pattern: &str) -> bool {
    !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}

/// Format without panicking on bad specifiers.
pub fn try_format(datetime: &DateTime<Utc>, pattern: &str) -> Option<String> {
    if !is_valid_strftime(pattern) {
        return None;
    }
    let mut out = String::new();
    write!(out, "{}", datetime.format(pattern)).ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_datetime() -> DateTime<Utc> {
        // 2025-01-08 10:30:45.123456 UTC
        Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45)
            .single()
            .expect("valid datetime")
            + chrono::Duration::microseconds(123456)
    }

    #[test]
    fn test_iso8601_format() {
        let result = TimestampFormat::Iso8601.render(&fixed_datetime());
        assert_eq!(result, json!("2025-01-08T10:30:45.123Z"));
    }

    #[test]
    fn test_iso8601_micros_format() {
        let result = TimestampFormat::Iso8601Micros.render(&fixed_datetime());
        assert_eq!(result, json!("2025-01-08T10:30:45.123456Z"));
    }

    #[test]
    fn test_numeric_formats_are_numbers() {
        let at = fixed_datetime();
        assert_eq!(TimestampFormat::Unix.render(&at), json!(1736332245));
        assert_eq!(TimestampFormat::UnixMillis.render(&at), json!(1736332245123i64));
        assert_eq!(TimestampFormat::UnixMicros.render(&at), json!(1736332245123456i64));
    }

    #[test]
    fn test_custom_format() {
        let format = TimestampFormat::Custom("%Y-%m-%dT%H:%M:%S%.6f".to_string());
        assert_eq!(format.render(&fixed_datetime()), json!("2025-01-08T10:30:45.123456"));
    }

    #[test]
    fn test_invalid_custom_format_falls_back_to_unix() {
        let format = TimestampFormat::Custom("%Y-%Q".to_string());
        assert!(!format.is_valid());
        assert_eq!(format.render(&fixed_datetime()), json!(1736332245));
    }

    #[test]
    fn test_empty_custom_format_falls_back_to_unix() {
        let format = TimestampFormat::Custom(String::new());
        assert!(!format.is_valid());
        assert_eq!(format.render(&fixed_datetime()), json!(1736332245));
    }

    #[test]
    fn test_parse_named_and_custom() {
        assert_eq!("RFC3339".parse::<TimestampFormat>().unwrap(), TimestampFormat::Rfc3339);
        assert_eq!("".parse::<TimestampFormat>().unwrap(), TimestampFormat::Unix);
        assert_eq!(
            "%s".parse::<TimestampFormat>().unwrap(),
            TimestampFormat::Custom("%s".to_string())
        );
    }

    #[test]
    fn test_try_format_rejects_bad_specifier() {
        assert!(try_format(&fixed_datetime(), "%Q").is_none());
        assert_eq!(try_format(&fixed_datetime(), "%Y").as_deref(), Some("2025"));
    }
}
