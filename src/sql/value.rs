//! Column and parameter values exchanged with the store.

use std::fmt;

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// A single value bound to a statement or read back from a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Normalize driver output: text that looks numeric becomes `Integer`
    /// or `Real`; everything else passes through unchanged.
    pub fn normalize(self) -> SqlValue {
        match self {
            SqlValue::Text(text) => match parse_numeric(&text) {
                Some(number) => number,
                None => SqlValue::Text(text),
            },
            other => other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(value) => Some(*value),
            SqlValue::Real(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer(value) => Some(*value as f64),
            SqlValue::Real(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

/// Accepts `[+-]digits[.digits][(e|E)[+-]digits]` and `[+-].digits...`.
/// Rejects `inf`, `NaN`, surrounding whitespace and the empty string, which
/// `str::parse::<f64>` would otherwise let through.
fn parse_numeric(text: &str) -> Option<SqlValue> {
    let bytes = text.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_digits = i - int_start;
    let mut frac_digits = 0;
    let mut is_real = false;
    if i < bytes.len() && bytes[i] == b'.' {
        is_real = true;
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        frac_digits = i - frac_start;
    }
    if int_digits + frac_digits == 0 {
        return None;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        is_real = true;
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return None;
        }
    }
    if i != bytes.len() {
        return None;
    }

    if !is_real {
        if let Ok(value) = text.parse::<i64>() {
            return Some(SqlValue::Integer(value));
        }
    }
    text.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(SqlValue::Real)
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(value) => write!(f, "{}", value),
            SqlValue::Real(value) => write!(f, "{}", value),
            SqlValue::Text(value) => write!(f, "{:?}", value),
            SqlValue::Blob(value) => write!(f, "<{} bytes>", value.len()),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            SqlValue::Null => ValueRef::Null,
            SqlValue::Integer(value) => ValueRef::Integer(*value),
            SqlValue::Real(value) => ValueRef::Real(*value),
            SqlValue::Text(value) => ValueRef::Text(value.as_bytes()),
            SqlValue::Blob(value) => ValueRef::Blob(value),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(value) => SqlValue::Integer(value),
            ValueRef::Real(value) => SqlValue::Real(value),
            ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
        }
    }
}

macro_rules! from_integer {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    SqlValue::Integer(i64::from(value))
                }
            }
        )+
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<f32> for SqlValue {
    fn from(value: f32) -> Self {
        SqlValue::Real(f64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Blob(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => SqlValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_text_is_normalized() {
        assert_eq!(SqlValue::from("42").normalize(), SqlValue::Integer(42));
        assert_eq!(SqlValue::from("-7").normalize(), SqlValue::Integer(-7));
        assert_eq!(SqlValue::from("12.50").normalize(), SqlValue::Real(12.5));
        assert_eq!(SqlValue::from(".5").normalize(), SqlValue::Real(0.5));
        assert_eq!(SqlValue::from("1e3").normalize(), SqlValue::Real(1000.0));
    }

    #[test]
    fn non_numeric_text_passes_through() {
        for text in ["", "abc", "12abc", " 12", "inf", "NaN", "1e", ".", "-", "1.2.3"] {
            assert_eq!(
                SqlValue::from(text).normalize(),
                SqlValue::Text(text.to_string()),
                "{:?} should stay text",
                text
            );
        }
    }

    #[test]
    fn integer_overflow_falls_back_to_real() {
        let normalized = SqlValue::from("99999999999999999999").normalize();
        assert_eq!(normalized, SqlValue::Real(1e20));
    }

    #[test]
    fn other_variants_are_untouched() {
        assert_eq!(SqlValue::Null.normalize(), SqlValue::Null);
        assert_eq!(SqlValue::Integer(3).normalize(), SqlValue::Integer(3));
        assert_eq!(
            SqlValue::Blob(b"12".to_vec()).normalize(),
            SqlValue::Blob(b"12".to_vec())
        );
    }

    #[test]
    fn option_and_bool_conversions() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
        assert_eq!(SqlValue::from(true), SqlValue::Integer(1));
    }

    #[test]
    fn accessors() {
        assert_eq!(SqlValue::Real(4.0).as_i64(), Some(4));
        assert_eq!(SqlValue::Real(4.5).as_i64(), None);
        assert_eq!(SqlValue::Integer(2).as_f64(), Some(2.0));
        assert_eq!(SqlValue::Text("a".into()).as_str(), Some("a"));
        assert!(SqlValue::Null.is_null());
    }

    #[test]
    fn deserializes_untagged_json() {
        let values: Vec<SqlValue> = serde_json::from_str(r#"[null, 1, 2.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                SqlValue::Null,
                SqlValue::Integer(1),
                SqlValue::Real(2.5),
                SqlValue::Text("x".into())
            ]
        );
    }
}
