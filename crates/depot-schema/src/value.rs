//! Dynamically typed values and records.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::column::ColumnType;

// =============================================================================
// Value
// =============================================================================

/// A single column value.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// UTF-8 string.
    Str(String),
    /// Opaque bytes.
    Bytes(Bytes),
}

impl Value {
    /// Returns the zero value of a column type.
    #[must_use]
    pub fn zero(ty: ColumnType) -> Self {
        match ty {
            ColumnType::Int32 => Self::Int32(0),
            ColumnType::Int64 => Self::Int64(0),
            ColumnType::String => Self::Str(String::new()),
            ColumnType::Bytes => Self::Bytes(Bytes::new()),
        }
    }

    /// Returns the runtime type of this value.
    #[must_use]
    pub const fn column_type(&self) -> ColumnType {
        match self {
            Self::Int32(_) => ColumnType::Int32,
            Self::Int64(_) => ColumnType::Int64,
            Self::Str(_) => ColumnType::String,
            Self::Bytes(_) => ColumnType::Bytes,
        }
    }

    /// Returns the value as an `i32`, if it is one.
    #[must_use]
    pub const fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as an `i64`, if it is one.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a string slice, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as bytes, if it is one.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32(v) => write!(f, "Int32({v})"),
            Self::Int64(v) => write!(f, "Int64({v})"),
            Self::Str(v) => write!(f, "Str({v:?})"),
            Self::Bytes(v) => write!(f, "Bytes({})", HexBytes(v)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => write!(f, "{}", HexBytes(v)),
        }
    }
}

struct HexBytes<'a>(&'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Self::Bytes(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(v))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(v))
    }
}

// =============================================================================
// Record
// =============================================================================

/// A row: column name to value.
///
/// Columns a record leaves out take the zero value of their declared type
/// when the record is encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column and returns the record.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a column, returning the previous value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(column.into(), value.into())
    }

    /// Removes a column, returning its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.values.remove(column)
    }

    /// Returns a column's value, if present.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Returns an `int32` column.
    #[must_use]
    pub fn get_i32(&self, column: &str) -> Option<i32> {
        self.get(column).and_then(Value::as_i32)
    }

    /// Returns an `int64` column.
    #[must_use]
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    /// Returns a `string` column.
    #[must_use]
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    /// Returns a `bytes` column.
    #[must_use]
    pub fn get_bytes(&self, column: &str) -> Option<&Bytes> {
        self.get(column).and_then(Value::as_bytes)
    }

    /// Returns true if the column is set.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Number of set columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no column is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates set columns in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.values.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values() {
        assert_eq!(Value::zero(ColumnType::Int32), Value::Int32(0));
        assert_eq!(Value::zero(ColumnType::Int64), Value::Int64(0));
        assert_eq!(Value::zero(ColumnType::String), Value::Str(String::new()));
        assert_eq!(Value::zero(ColumnType::Bytes), Value::Bytes(Bytes::new()));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(7).to_string(), "7");
        assert_eq!(Value::from(-7i64).to_string(), "-7");
        assert_eq!(Value::from("//depot/a").to_string(), "\"//depot/a\"");
        assert_eq!(Value::from(vec![0x00u8, 0xab]).to_string(), "0x00ab");
        assert_eq!(format!("{:?}", Value::from(vec![1u8])), "Bytes(0x01)");
    }

    #[test]
    fn test_record_accessors() {
        let mut record = Record::new()
            .with("depotFile", "//depot/a")
            .with("depotRev", 3)
            .with("size", 1024i64)
            .with("digest", vec![1u8, 2, 3]);

        assert_eq!(record.get_str("depotFile"), Some("//depot/a"));
        assert_eq!(record.get_i32("depotRev"), Some(3));
        assert_eq!(record.get_i64("size"), Some(1024));
        assert_eq!(record.get_bytes("digest").map(|b| b.len()), Some(3));
        assert_eq!(record.get_i32("size"), None);
        assert_eq!(record.len(), 4);

        let previous = record.set("depotRev", 4);
        assert_eq!(previous, Some(Value::Int32(3)));
        assert_eq!(record.remove("digest").map(|v| v.column_type()), Some(ColumnType::Bytes));
        assert!(!record.contains("digest"));

        let names: Vec<_> = record.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, ["depotFile", "depotRev", "size"]);
    }

    #[test]
    fn test_from_iterator() {
        let record: Record = [("a", Value::from(1)), ("b", Value::from("x"))]
            .into_iter()
            .collect();
        assert_eq!(record, Record::new().with("a", 1).with("b", "x"));
    }
}
