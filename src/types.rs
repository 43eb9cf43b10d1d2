use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Values that can be stored in a database row or used as query parameters.
///
/// The same enum is used for bound parameters and for fetched columns:
/// ```rust
/// use pg_sql_utils::RowValues;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Arbitrary-precision decimal, kept as exact text (`"12.50"`, `"NaN"`)
    Numeric(String),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp without time zone
    Timestamp(NaiveDateTime),
    /// Timestamp with time zone, normalised to UTC
    TimestampTz(DateTime<Utc>),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            RowValues::Timestamp(value) => Some(*value),
            RowValues::TimestampTz(value) => Some(value.naive_utc()),
            RowValues::Text(s) => {
                // Try "YYYY-MM-DD HH:MM:SS"
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                    return Some(dt);
                }
                // Try "YYYY-MM-DD HH:MM:SS.SSS"
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S.%3f").ok()
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RowValues::Date(value) => Some(*value),
            RowValues::Timestamp(value) => Some(value.date()),
            RowValues::TimestampTz(value) => Some(value.date_naive()),
            _ => None,
        }
    }

    /// Numeric columns parse to the nearest `f64`; use [`RowValues::as_numeric`] for the
    /// exact digits.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            RowValues::Numeric(text) => text.parse().ok(),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_numeric(&self) -> Option<&str> {
        if let RowValues::Numeric(text) = self {
            Some(text)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        if let RowValues::JSON(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

impl Serialize for RowValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowValues::Int(i) => serializer.serialize_i64(*i),
            RowValues::Float(f) => serializer.serialize_f64(*f),
            RowValues::Numeric(s) | RowValues::Text(s) => serializer.serialize_str(s),
            RowValues::Bool(b) => serializer.serialize_bool(*b),
            RowValues::Timestamp(dt) => {
                serializer.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            RowValues::TimestampTz(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            RowValues::Date(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            RowValues::Time(t) => serializer.serialize_str(&t.format("%H:%M:%S%.f").to_string()),
            RowValues::Null => serializer.serialize_none(),
            RowValues::JSON(value) => value.serialize(serializer),
            RowValues::Blob(bytes) => bytes.serialize(serializer),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bool_accepts_integer_flags() {
        assert_eq!(RowValues::Int(1).as_bool(), Some(&true));
        assert_eq!(RowValues::Int(0).as_bool(), Some(&false));
        assert_eq!(RowValues::Int(7).as_bool(), None);
    }

    #[test]
    fn timestamp_parses_text() {
        let parsed = RowValues::Text("2024-03-01 12:30:00".into()).as_timestamp();
        assert_eq!(
            parsed,
            NaiveDate::from_ymd_opt(2024, 3, 1).and_then(|d| d.and_hms_opt(12, 30, 0))
        );
        assert_eq!(RowValues::Text("not a date".into()).as_timestamp(), None);
    }

    #[test]
    fn serializes_to_plain_json() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let values = vec![
            RowValues::Int(3),
            RowValues::Text("x".into()),
            RowValues::Null,
            RowValues::Date(date),
            RowValues::JSON(json!({"a": 1})),
        ];
        let encoded = serde_json::to_value(&values).unwrap();
        assert_eq!(encoded, json!([3, "x", null, "2024-03-01", {"a": 1}]));
    }

    #[test]
    fn numeric_keeps_exact_digits() {
        let total = RowValues::Numeric("12345678901234567890.05".into());
        assert_eq!(total.as_numeric(), Some("12345678901234567890.05"));
        assert_eq!(RowValues::Numeric("1.5".into()).as_float(), Some(1.5));
        assert!(RowValues::Numeric("NaN".into()).as_float().unwrap().is_nan());
        assert_eq!(
            serde_json::to_value(&total).unwrap(),
            json!("12345678901234567890.05")
        );
    }

    #[test]
    fn option_maps_none_to_null() {
        let none: Option<i64> = None;
        assert!(RowValues::from(none).is_null());
        assert_eq!(RowValues::from(Some("a")), RowValues::Text("a".into()));
    }
}
