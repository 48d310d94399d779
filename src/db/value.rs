use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Text that stands for SQL NULL in rendered cells and user input.
pub const NULL_SENTINEL: &str = "NULL";

/// A single cell as stored in SQLite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// TEXT whose bytes are not valid UTF-8, kept as stored so it still matches its row.
    RawText(Vec<u8>),
    Blob(Vec<u8>),
}

/// One row of cells, positionally matching the table's columns.
pub type Row = Vec<Value>;

impl Value {
    /// Converts text typed by the user into a cell value.
    ///
    /// The exact text `NULL` becomes SQL NULL. Everything else is kept as text and
    /// left to SQLite's column affinity, so `"42"` lands as an integer in an
    /// `INTEGER` column and stays text in a `TEXT` column.
    pub fn from_input(input: &str) -> Value {
        if input == NULL_SENTINEL {
            Value::Null
        } else {
            Value::Text(input.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str(NULL_SENTINEL),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => f.write_str(s),
            Value::RawText(b) => f.write_str(&String::from_utf8_lossy(b)),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value_ref = match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Real(r) => ValueRef::Real(*r),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
            Value::RawText(b) => ValueRef::Text(b),
            Value::Blob(b) => ValueRef::Blob(b),
        };
        Ok(ToSqlOutput::Borrowed(value_ref))
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(s) => match std::str::from_utf8(s) {
                Ok(text) => Value::Text(text.to_string()),
                Err(_) => Value::RawText(s.to_vec()),
            },
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        })
    }
}
