//! Row values carried between the source reader and the target writer.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

/// A single decoded field.
///
/// Values are owned: a chunk is fully read before it is written, so nothing
/// borrows from the source driver's buffers.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Exact numerics, and unsigned bigints beyond `i64::MAX`.
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// One row in column ordinal order.
pub type Row = Vec<SqlValue>;

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Strip embedded NUL characters from string values.
    ///
    /// PostgreSQL text types cannot store `\0`. Every other variant is
    /// returned untouched.
    pub fn sanitize(self) -> SqlValue {
        match self {
            SqlValue::Text(s) if s.contains('\0') => SqlValue::Text(s.replace('\0', "")),
            other => other,
        }
    }
}

/// Sanitize every field of every row in a chunk.
pub fn sanitize_rows(rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter()
        .map(|row| row.into_iter().map(SqlValue::sanitize).collect())
        .collect()
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::I16(v) => write!(f, "{}", v),
            SqlValue::I32(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::F32(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
            SqlValue::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
            SqlValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            SqlValue::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_nul_from_text() {
        let v = SqlValue::Text("a\0b\0\0c".to_string()).sanitize();
        assert_eq!(v, SqlValue::Text("abc".to_string()));
    }

    #[test]
    fn test_sanitize_leaves_other_values_untouched() {
        let bytes = SqlValue::Bytes(vec![0, 1, 0, 2]);
        assert_eq!(bytes.clone().sanitize(), bytes);

        let f = SqlValue::F64(f64::from_bits(0x7ff8_0000_0000_0001));
        match f.sanitize() {
            SqlValue::F64(v) => assert_eq!(v.to_bits(), 0x7ff8_0000_0000_0001),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(SqlValue::Null.sanitize(), SqlValue::Null);
        assert_eq!(SqlValue::I64(-7).sanitize(), SqlValue::I64(-7));
    }

    #[test]
    fn test_sanitize_rows() {
        let rows = vec![vec![SqlValue::I32(1), SqlValue::from("x\0y")]];
        let clean = sanitize_rows(rows);
        assert_eq!(clean[0][1], SqlValue::from("xy"));
        assert_eq!(clean[0][0], SqlValue::I32(1));
    }

    #[test]
    fn test_display() {
        assert_eq!(SqlValue::Null.to_string(), "NULL");
        assert_eq!(SqlValue::Bytes(vec![0xde, 0xad]).to_string(), "0xdead");
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(SqlValue::Date(d).to_string(), "2024-02-29");
    }
}
