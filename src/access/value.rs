use crate::error::{DbError, DbResult};
use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Default width of a string column, in bytes of payload.
pub const STRING_LEN: usize = 128;

/// Column types. Every type has a fixed on-disk width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int32,
    /// Fixed-width string: a 4-byte length followed by exactly `N` bytes.
    Char(usize),
}

impl DataType {
    /// String column with the default width.
    pub fn string() -> Self {
        DataType::Char(STRING_LEN)
    }

    /// Bytes this type occupies inside a tuple slot.
    pub fn width(&self) -> usize {
        match self {
            DataType::Int32 => 4,
            DataType::Char(n) => 4 + n,
        }
    }

    /// Parses a schema-file type name (`int` / `string`).
    pub fn from_name(name: &str) -> DbResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "int" => Ok(DataType::Int32),
            "string" => Ok(DataType::string()),
            other => Err(DbError::InvalidSchema(format!("unknown type {}", other))),
        }
    }

    /// Parses a textual value of this type.
    pub fn parse_value(&self, text: &str) -> DbResult<Value> {
        match self {
            DataType::Int32 => text
                .trim()
                .parse::<i32>()
                .map(Value::Int32)
                .map_err(|e| DbError::InvalidSchema(format!("bad int {:?}: {}", text, e))),
            DataType::Char(n) => Ok(Value::string(text.trim(), *n)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int32 => write!(f, "INT"),
            DataType::Char(n) => write!(f, "STRING({})", n),
        }
    }
}

/// Comparison operators understood by `Value::compare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEq,
    GreaterThan,
    GreaterThanOrEq,
    Like,
}

/// A single field of a tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Int32(i32),
    String(String),
}

impl Value {
    /// Builds a string value, truncated to at most `max_len` bytes.
    pub fn string(s: &str, max_len: usize) -> Self {
        let mut end = s.len().min(max_len);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        Value::String(s[..end].to_string())
    }

    /// Check if this value can be stored in a column of the given type
    pub fn is_compatible_with(&self, data_type: DataType) -> bool {
        matches!(
            (self, data_type),
            (Value::Int32(_), DataType::Int32) | (Value::String(_), DataType::Char(_))
        )
    }

    /// Evaluates `self <op> other`. Values of different kinds never match.
    ///
    /// `Like` is substring containment for strings and equality for integers.
    pub fn compare(&self, op: Op, other: &Value) -> bool {
        match (self, other) {
            (Value::Int32(a), Value::Int32(b)) => match op {
                Op::Like => a == b,
                _ => Self::holds(op, a.cmp(b)),
            },
            (Value::String(a), Value::String(b)) => match op {
                Op::Like => a.contains(b.as_str()),
                _ => Self::holds(op, a.cmp(b)),
            },
            _ => false,
        }
    }

    fn holds(op: Op, ordering: Ordering) -> bool {
        match op {
            Op::Equals => ordering == Ordering::Equal,
            Op::NotEquals => ordering != Ordering::Equal,
            Op::LessThan => ordering == Ordering::Less,
            Op::LessThanOrEq => ordering != Ordering::Greater,
            Op::GreaterThan => ordering == Ordering::Greater,
            Op::GreaterThanOrEq => ordering != Ordering::Less,
            Op::Like => ordering == Ordering::Equal,
        }
    }

    /// Appends exactly `data_type.width()` bytes to `buf`.
    pub fn serialize_into(&self, data_type: DataType, buf: &mut Vec<u8>) -> DbResult<()> {
        match (self, data_type) {
            (Value::Int32(i), DataType::Int32) => {
                let mut bytes = [0u8; 4];
                BigEndian::write_i32(&mut bytes, *i);
                buf.extend_from_slice(&bytes);
            }
            (Value::String(s), DataType::Char(n)) => {
                let mut end = s.len().min(n);
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                let bytes = &s.as_bytes()[..end];
                let mut len = [0u8; 4];
                BigEndian::write_u32(&mut len, bytes.len() as u32);
                buf.extend_from_slice(&len);
                buf.extend_from_slice(bytes);
                buf.resize(buf.len() + (n - bytes.len()), 0);
            }
            _ => {
                return Err(DbError::SchemaMismatch {
                    expected: data_type.to_string(),
                    found: format!("{:?}", self),
                })
            }
        }
        Ok(())
    }

    /// Reads a value of `data_type` from the front of `data`.
    pub fn deserialize(data_type: DataType, data: &[u8]) -> DbResult<Self> {
        if data.len() < data_type.width() {
            return Err(DbError::InvalidSchema(format!(
                "{} needs {} bytes, got {}",
                data_type,
                data_type.width(),
                data.len()
            )));
        }
        match data_type {
            DataType::Int32 => Ok(Value::Int32(BigEndian::read_i32(data))),
            DataType::Char(n) => {
                let len = (BigEndian::read_u32(data) as usize).min(n);
                let s = String::from_utf8_lossy(&data[4..4 + len]).into_owned();
                Ok(Value::String(s))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}
