//! Column types and type-aware coercion of filter values

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

/// The coarse column type a store reports for a physical column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Date,
    Decimal,
    Integer,
    Boolean,
    Other,
}

/// A filter value after coercion to its column's type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Null,
}

impl FieldValue {
    /// Get the value as a string if possible
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Coerce a raw filter value for a column of the given type
    ///
    /// Temporal values without an explicit offset are read in `zone`.
    pub fn coerce(raw: &Value, column_type: ColumnType, zone: FixedOffset) -> Result<Self, String> {
        if raw.is_null() {
            return Ok(FieldValue::Null);
        }
        let text = match raw {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };

        match column_type {
            ColumnType::Date => parse_datetime(&text, zone)
                .map(FieldValue::DateTime)
                .ok_or_else(|| "not a recognizable date or time".to_string()),
            ColumnType::Decimal => text
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| "not a decimal number".to_string()),
            ColumnType::Integer => {
                if let Ok(i) = text.parse::<i64>() {
                    return Ok(FieldValue::Integer(i));
                }
                let f = text
                    .parse::<f64>()
                    .map_err(|_| "not an integer".to_string())?;
                if f.fract() == 0.0 {
                    Ok(FieldValue::Integer(f as i64))
                } else {
                    Ok(FieldValue::Float(f))
                }
            }
            ColumnType::Boolean => parse_bool(&text)
                .map(FieldValue::Boolean)
                .ok_or_else(|| "not a boolean".to_string()),
            ColumnType::Other => Ok(match raw {
                Value::Bool(b) => FieldValue::Boolean(*b),
                Value::Number(n) => n
                    .as_i64()
                    .map(FieldValue::Integer)
                    .unwrap_or_else(|| FieldValue::Float(n.as_f64().unwrap_or_default())),
                _ => FieldValue::String(text),
            }),
        }
    }

    /// Convert back to a JSON value (timestamps as RFC 3339)
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            FieldValue::Null => Value::Null,
        }
    }

    /// Order a stored JSON value relative to this value
    ///
    /// Returns `None` when the two are not comparable (e.g. text vs. number).
    pub fn compare_stored(&self, stored: &Value) -> Option<Ordering> {
        match (self, stored) {
            (FieldValue::Null, Value::Null) => Some(Ordering::Equal),
            (FieldValue::Null, _) | (_, Value::Null) => None,
            (FieldValue::Integer(i), Value::Number(n)) => n.as_f64()?.partial_cmp(&(*i as f64)),
            (FieldValue::Float(f), Value::Number(n)) => n.as_f64()?.partial_cmp(f),
            (FieldValue::Boolean(b), Value::Bool(s)) => Some(s.cmp(b)),
            (FieldValue::Boolean(b), Value::Number(n)) => {
                Some(n.as_i64()?.cmp(&if *b { 1 } else { 0 }))
            }
            (FieldValue::DateTime(dt), Value::String(s)) => {
                let stored = parse_datetime(s, FixedOffset::east_opt(0)?)?;
                Some(stored.cmp(dt))
            }
            (FieldValue::String(a), Value::String(s)) => Some(s.as_str().cmp(a.as_str())),
            (FieldValue::String(a), other) => Some(other.to_string().as_str().cmp(a.as_str())),
            _ => None,
        }
    }
}

impl ColumnType {
    /// Order two stored values of a column of this type
    ///
    /// Values are normalized to the column's type first (numeric text in a
    /// decimal column, timestamps in a date column) and then ordered by
    /// [`compare_values`]. Values that do not normalize keep their JSON kind.
    pub fn compare(self, a: &Value, b: &Value) -> Ordering {
        compare_values(&self.sort_key(a), &self.sort_key(b))
    }

    fn sort_key<'v>(self, value: &'v Value) -> Cow<'v, Value> {
        let converted = match (self, value) {
            (ColumnType::Integer | ColumnType::Decimal, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::from),
            (ColumnType::Date, Value::String(s)) => {
                FixedOffset::east_opt(0)
                    .and_then(|utc| parse_datetime(s, utc))
                    .map(|dt| Value::from(dt.timestamp_micros()))
            }
            (ColumnType::Boolean, Value::String(s)) => parse_bool(s).map(Value::Bool),
            (ColumnType::Boolean, Value::Number(n)) => match n.as_i64() {
                Some(0) => Some(Value::Bool(false)),
                Some(1) => Some(Value::Bool(true)),
                _ => None,
            },
            _ => None,
        };
        converted.map_or(Cow::Borrowed(value), Cow::Owned)
    }
}

/// Total order over JSON values for sorting
///
/// Kinds rank null, boolean, number, text, then arrays and objects. Numbers
/// compare with `f64::total_cmp` and text lexically, so `"10"` sorts before
/// `"9"` and a number never compares against text.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(f64::NAN)
            .total_cmp(&y.as_f64().unwrap_or(f64::NAN)),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(_) | Value::Object(_), Value::Array(_) | Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Parse `true`/`false` style words
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a timestamp, reading offset-less forms in `zone`
pub fn parse_datetime(text: &str, zone: FixedOffset) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return zone
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    zone.from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a UTC offset such as `-05:00`, `+0530`, `Z` or `UTC`
pub fn parse_utc_offset(text: &str) -> Option<FixedOffset> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("z") || text.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match text.chars().next()? {
        '+' => (1, &text[1..]),
        '-' => (-1, &text[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
