//! Runtime scalar values

use crate::types::DataType;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single scalar value.
///
/// Equality and hashing are total (floats compare by bit pattern after
/// normalizing NaN and negative zero) so values can key hash tables.
/// SQL comparison semantics live in [`Value::sql_cmp`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal {
        #[serde(with = "i128_text")]
        value: i128,
        scale: u8,
    },
    Varchar(String),
    Blob(Vec<u8>),
    Date(i32),
    Timestamp(i64),
}

/// 128-bit integers travel as strings so they survive buffered (tagged) deserialization.
mod i128_text {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i128, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

pub fn pow10(exp: u8) -> Option<i128> {
    10i128.checked_pow(exp as u32)
}

fn float_key(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Natural type of the value. Decimals report the smallest precision holding them.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Boolean(_) => DataType::Boolean,
            Value::Int8(_) => DataType::Int8,
            Value::Int16(_) => DataType::Int16,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::Float32(_) => DataType::Float32,
            Value::Float64(_) => DataType::Float64,
            Value::Decimal { value, scale } => {
                let digits = value.unsigned_abs().to_string().len() as u8;
                DataType::Decimal {
                    precision: digits.max(*scale).max(1),
                    scale: *scale,
                }
            }
            Value::Varchar(_) => DataType::Varchar,
            Value::Blob(_) => DataType::Blob,
            Value::Date(_) => DataType::Date,
            Value::Timestamp(_) => DataType::Timestamp,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int8(v) => Some(*v as i64),
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Decimal { value, scale } => {
                pow10(*scale).map(|p| *value as f64 / p as f64)
            }
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Scaled integer representation at `scale`, for integers and decimals.
    pub fn as_scaled(&self, scale: u8) -> Option<i128> {
        match self {
            Value::Decimal { value, scale: s } => {
                if *s <= scale {
                    value.checked_mul(pow10(scale - s)?)
                } else {
                    let divisor = pow10(s - scale)?;
                    let q = value / divisor;
                    let r = value % divisor;
                    // round half away from zero
                    if r.abs() * 2 >= divisor {
                        Some(q + value.signum())
                    } else {
                        Some(q)
                    }
                }
            }
            other => (other.as_i64()? as i128).checked_mul(pow10(scale)?),
        }
    }

    /// SQL ordering between two non-null values of comparable types.
    ///
    /// Returns `None` if either side is NULL or the families differ.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        use Value::*;

        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Varchar(a), Varchar(b)) => Some(a.cmp(b)),
            (Blob(a), Blob(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            (Date(d), Timestamp(t)) => Some((*d as i64 * MICROS_PER_DAY).cmp(t)),
            (Timestamp(t), Date(d)) => Some(t.cmp(&(*d as i64 * MICROS_PER_DAY))),
            (Float32(_) | Float64(_), _) | (_, Float32(_) | Float64(_)) => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                Some(a.total_cmp(&b))
            }
            (Decimal { .. }, _) | (_, Decimal { .. }) => {
                let scale = match (self, other) {
                    (Decimal { scale: a, .. }, Decimal { scale: b, .. }) => (*a).max(*b),
                    (Decimal { scale, .. }, _) | (_, Decimal { scale, .. }) => *scale,
                    _ => 0,
                };
                match (self.as_scaled(scale), other.as_scaled(scale)) {
                    (Some(a), Some(b)) => Some(a.cmp(&b)),
                    _ => Some(self.as_f64()?.total_cmp(&other.as_f64()?)),
                }
            }
            (a, b) => Some(a.as_i64()?.cmp(&b.as_i64()?)),
        }
    }
}

pub const MICROS_PER_DAY: i64 = 86_400_000_000;

pub fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Render days since the epoch as `YYYY-MM-DD`.
pub fn format_date(days: i32) -> String {
    match epoch().checked_add_signed(Duration::days(days as i64)) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => format!("{} days", days),
    }
}

/// Render microseconds since the epoch as `YYYY-MM-DD HH:MM:SS[.ffffff]`.
pub fn format_timestamp(micros: i64) -> String {
    match DateTime::from_timestamp_micros(micros) {
        Some(ts) if micros % 1_000_000 == 0 => ts.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string(),
        Some(ts) => ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        None => format!("{} us", micros),
    }
}

/// Parse `YYYY-MM-DD` into days since the epoch.
pub fn parse_date(text: &str) -> Option<i32> {
    let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()?;
    i32::try_from(date.signed_duration_since(epoch()).num_days()).ok()
}

/// Parse a timestamp (or a bare date) into microseconds since the epoch.
pub fn parse_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|ts| ts.and_utc().timestamp_micros())
}

pub fn format_decimal(value: i128, scale: u8) -> String {
    if scale == 0 {
        return value.to_string();
    }
    let digits = value.unsigned_abs().to_string();
    let scale = scale as usize;
    let padded = if digits.len() <= scale {
        format!("{}{}", "0".repeat(scale - digits.len() + 1), digits)
    } else {
        digits
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    let sign = if value < 0 { "-" } else { "" };
    format!("{}{}.{}", sign, int_part, frac_part)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal { value, scale } => write!(f, "{}", format_decimal(*value, *scale)),
            Value::Varchar(s) => write!(f, "{}", s),
            Value::Blob(bytes) => {
                for b in bytes {
                    if b.is_ascii_graphic() && *b != b'\\' {
                        write!(f, "{}", *b as char)?;
                    } else {
                        write!(f, "\\x{:02X}", b)?;
                    }
                }
                Ok(())
            }
            Value::Date(d) => write!(f, "{}", format_date(*d)),
            Value::Timestamp(t) => write!(f, "{}", format_timestamp(*t)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;

        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Int8(a), Int8(b)) => a == b,
            (Int16(a), Int16(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Float32(a), Float32(b)) => float_key(*a as f64) == float_key(*b as f64),
            (Float64(a), Float64(b)) => float_key(*a) == float_key(*b),
            (Decimal { value: a, scale: sa }, Decimal { value: b, scale: sb }) => a == b && sa == sb,
            (Varchar(a), Varchar(b)) => a == b,
            (Blob(a), Blob(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int8(v) => v.hash(state),
            Value::Int16(v) => v.hash(state),
            Value::Int32(v) => v.hash(state),
            Value::Int64(v) => v.hash(state),
            Value::Float32(v) => float_key(*v as f64).hash(state),
            Value::Float64(v) => float_key(*v).hash(state),
            Value::Decimal { value, scale } => {
                value.hash(state);
                scale.hash(state);
            }
            Value::Varchar(s) => s.hash(state),
            Value::Blob(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Timestamp(t) => t.hash(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_display() {
        assert_eq!(Value::Decimal { value: 12000000, scale: 2 }.to_string(), "120000.00");
        assert_eq!(Value::Decimal { value: -5, scale: 2 }.to_string(), "-0.05");
        assert_eq!(Value::Decimal { value: 42, scale: 0 }.to_string(), "42");
    }

    #[test]
    fn test_cross_scale_comparison() {
        let salary = Value::Decimal { value: 8000000, scale: 2 };
        let bound = Value::Int32(80000);
        assert_eq!(salary.sql_cmp(&bound), Some(Ordering::Equal));
        assert_eq!(Value::Null.sql_cmp(&bound), None);
    }

    #[test]
    fn test_date_rendering() {
        assert_eq!(Value::Date(0).to_string(), "1970-01-01");
        assert_eq!(Value::Date(19723).to_string(), "2024-01-01");
        assert_eq!(Value::Timestamp(MICROS_PER_DAY).to_string(), "1970-01-02 00:00:00");
    }

    #[test]
    fn test_parse_temporal_text() {
        assert_eq!(parse_date("2024-01-01"), Some(19723));
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_timestamp("1970-01-02 00:00:00"), Some(MICROS_PER_DAY));
        assert_eq!(parse_timestamp("1970-01-01"), Some(0));
    }

    #[test]
    fn test_float_equality_is_total() {
        assert_eq!(Value::Float64(f64::NAN), Value::Float64(f64::NAN));
        assert_eq!(Value::Float64(0.0), Value::Float64(-0.0));
    }
}
