use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, hash::Hash, str::FromStr};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    String(String),
    Boolean(bool),
    Json(serde_json::Value),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
    TimestampNaive(NaiveDateTime),
    Null,
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        use Value::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Int(v) => v.hash(state),
            Float(v) => v.to_bits().hash(state),
            Decimal(v) => v.normalized().to_string().hash(state),
            String(v) => v.hash(state),
            Boolean(v) => v.hash(state),
            Json(v) => v.to_string().hash(state),
            Uuid(v) => v.hash(state),
            Bytes(v) => v.hash(state),
            Date(v) => v.hash(state),
            Time(v) => v.hash(state),
            Timestamp(v) => v.hash(state),
            TimestampNaive(v) => v.hash(state),
            Null => {}
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Decimal(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Decimal(v) => v.to_string().parse::<f64>().ok(),
            Value::String(v) => v.trim().parse::<f64>().ok(),
            Value::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Json(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Decimal(v) if v.is_integer() => v.to_string().parse::<i64>().ok(),
            Value::String(v) => v.trim().parse::<i64>().ok(),
            Value::Boolean(v) => Some(i64::from(*v)),
            Value::Json(v) => v.as_i64(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<BigDecimal> {
        match self {
            Value::Int(v) => Some(BigDecimal::from(*v)),
            Value::Float(v) if v.is_finite() => BigDecimal::from_str(&v.to_string()).ok(),
            Value::Decimal(v) => Some(v.clone()),
            Value::String(v) => BigDecimal::from_str(v.trim()).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Int(v) => Some(*v != 0),
            Value::Float(v) => Some(*v != 0.0),
            Value::String(v) => match v.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" | "yes" | "y" => Some(true),
                "false" | "f" | "0" | "no" | "n" => Some(false),
                _ => None,
            },
            Value::Boolean(v) => Some(*v),
            Value::Json(v) => v.as_bool(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Canonical text of the value, used for fingerprints and loose comparisons.
    /// `None` for [`Value::Null`].
    pub fn key_text(&self) -> Option<String> {
        match self {
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => Some(if v.is_finite() && v.fract() == 0.0 {
                format!("{v:.0}")
            } else {
                v.to_string()
            }),
            Value::Decimal(v) => Some(v.normalized().to_string()),
            Value::String(v) => Some(v.clone()),
            Value::Boolean(v) => Some(v.to_string()),
            Value::Json(serde_json::Value::String(s)) => Some(s.clone()),
            Value::Json(v) => Some(v.to_string()),
            Value::Uuid(v) => Some(v.to_string()),
            Value::Bytes(v) => Some(v.iter().map(|b| format!("{b:02x}")).collect()),
            Value::Date(v) => Some(v.to_string()),
            Value::Time(v) => Some(v.to_string()),
            Value::Timestamp(v) => Some(v.naive_utc().to_string()),
            Value::TimestampNaive(v) => Some(v.to_string()),
            Value::Null => None,
        }
    }

    /// Loose equality between a freshly parsed value and one read back from the
    /// database. Numbers compare numerically, booleans by truthiness, and
    /// everything else by canonical text.
    pub fn matches(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Null, _) | (_, Null) => false,
            (Boolean(a), b) | (b, Boolean(a)) => b.as_bool() == Some(*a),
            (a, b) if a.is_numeric() || b.is_numeric() => match (a.as_decimal(), b.as_decimal()) {
                (Some(x), Some(y)) => x == y,
                _ => a.key_text() == b.key_text(),
            },
            (Timestamp(a), String(s)) | (String(s), Timestamp(a)) => {
                parse_naive_timestamp(s).is_some_and(|t| t == a.naive_utc())
            }
            (TimestampNaive(a), String(s)) | (String(s), TimestampNaive(a)) => {
                parse_naive_timestamp(s).is_some_and(|t| t == *a)
            }
            (Date(a), String(s)) | (String(s), Date(a)) => {
                NaiveDate::from_str(s.trim()).is_ok_and(|d| d == *a)
            }
            (Uuid(a), String(s)) | (String(s), Uuid(a)) => {
                uuid::Uuid::parse_str(s.trim()).is_ok_and(|u| u == *a)
            }
            (a, b) => a.key_text() == b.key_text(),
        }
    }

    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.as_decimal().zip(b.as_decimal()).map(|(x, y)| x.cmp(&y))
            }
            (String(a), String(b)) => Some(a.cmp(b)),
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (Time(a), Time(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            (TimestampNaive(a), TimestampNaive(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Json(_) => "json",
            Value::Uuid(_) => "uuid",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamptz",
            Value::TimestampNaive(_) => "timestamp",
            Value::Null => "null",
        }
    }
}

fn parse_naive_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];
    let s = s.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|t| t.naive_utc()))
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Value::Null => write!(f, "NULL"),
            other => match other.key_text() {
                Some(text) => write!(f, "{text}"),
                None => write!(f, "NULL"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_match_across_representations() {
        assert!(Value::String("42".into()).matches(&Value::Int(42)));
        assert!(Value::Float(1.5).matches(&Value::String("1.50".into())));
        assert!(Value::Decimal(BigDecimal::from(7)).matches(&Value::Int(7)));
        assert!(!Value::String("42".into()).matches(&Value::Int(41)));
    }

    #[test]
    fn null_only_matches_null() {
        assert!(Value::Null.matches(&Value::Null));
        assert!(!Value::Null.matches(&Value::String(String::new())));
        assert!(!Value::Int(0).matches(&Value::Null));
    }

    #[test]
    fn booleans_and_timestamps_match_their_text_forms() {
        assert!(Value::Boolean(true).matches(&Value::String("t".into())));
        assert!(!Value::Boolean(false).matches(&Value::String("yes".into())));

        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(10, 30, 0))
            .map(Value::TimestampNaive)
            .unwrap();
        assert!(ts.matches(&Value::String("2024-03-01 10:30:00".into())));
        assert!(ts.matches(&Value::String("2024-03-01T10:30:00".into())));
    }

    #[test]
    fn key_text_is_stable_for_whole_floats() {
        assert_eq!(Value::Float(3.0).key_text().as_deref(), Some("3"));
        assert_eq!(Value::Int(3).key_text().as_deref(), Some("3"));
        assert_eq!(Value::Null.key_text(), None);
    }
}
