//! Order-preserving row keys.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use depot_common::constants::MAX_KEY_SIZE;
use depot_common::{DepotError, DepotResult};
use depot_schema::{ColumnDef, ColumnType, Extractor, IndexDef, Record, TableSchema, Value};

/// Sign bit of an `i32` in its big-endian encoding.
const SIGN_32: u32 = 0x8000_0000;
/// Sign bit of an `i64` in its big-endian encoding.
const SIGN_64: u64 = 0x8000_0000_0000_0000;

const STRING_TERMINATOR: u8 = 0x00;
const BYTES_ESCAPE: u8 = 0x00;
const BYTES_ESCAPED_NUL: u8 = 0xFF;
const BYTES_TERMINATOR: u8 = 0x01;

// =============================================================================
// RowKey
// =============================================================================

/// Encoded row identifier.
///
/// Byte-wise comparison of two row keys of the same table equals comparison
/// of the key-column tuples they encode.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RowKey(Bytes);

impl RowKey {
    /// Wraps already-encoded key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// The encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Consumes the key, returning the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for RowKey {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8]> for RowKey {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for RowKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for RowKey {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<RowKey> for Bytes {
    fn from(key: RowKey) -> Self {
        key.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowKey({self})")
    }
}

// =============================================================================
// KeyPrefix
// =============================================================================

/// Leading key values selecting a contiguous key range.
///
/// A prefix may end with a partial string for the next string column, so
/// `("//depot/a/" ...)` matches every path underneath that directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPrefix {
    values: Vec<Value>,
    partial: Option<String>,
}

impl KeyPrefix {
    /// The empty prefix, matching every key.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Prefix of complete leading values.
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            partial: None,
        }
    }

    /// Prefix of a partial first string column.
    pub fn partial(partial: impl Into<String>) -> Self {
        Self::all().with_partial(partial)
    }

    /// Appends a complete value.
    #[must_use]
    pub fn then(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Adds a partial string for the column after the complete values.
    #[must_use]
    pub fn with_partial(mut self, partial: impl Into<String>) -> Self {
        self.partial = Some(partial.into());
        self
    }

    /// Complete leading values.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Trailing partial string, if any.
    #[must_use]
    pub fn partial_str(&self) -> Option<&str> {
        self.partial.as_deref()
    }

    /// Returns true if the prefix matches every key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.partial.is_none()
    }
}

impl From<Vec<Value>> for KeyPrefix {
    fn from(values: Vec<Value>) -> Self {
        Self {
            values,
            partial: None,
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

fn encode_value(table: &str, value: &Value, buf: &mut BytesMut) -> DepotResult<()> {
    match value {
        Value::Int32(v) => buf.put_u32((*v as u32) ^ SIGN_32),
        Value::Int64(v) => buf.put_u64((*v as u64) ^ SIGN_64),
        Value::Str(s) => {
            encode_partial(table, s, buf)?;
            buf.put_u8(STRING_TERMINATOR);
        }
        Value::Bytes(b) => {
            for &byte in b.iter() {
                if byte == BYTES_ESCAPE {
                    buf.put_u8(BYTES_ESCAPE);
                    buf.put_u8(BYTES_ESCAPED_NUL);
                } else {
                    buf.put_u8(byte);
                }
            }
            buf.put_u8(BYTES_ESCAPE);
            buf.put_u8(BYTES_TERMINATOR);
        }
    }
    Ok(())
}

fn encode_partial(table: &str, s: &str, buf: &mut BytesMut) -> DepotResult<()> {
    if s.as_bytes().contains(&STRING_TERMINATOR) {
        return Err(DepotError::invalid_key(table, "key string contains NUL"));
    }
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn check_type(table: &str, column: &ColumnDef, value: &Value) -> DepotResult<()> {
    if value.column_type() == column.ty {
        Ok(())
    } else {
        Err(DepotError::TypeMismatch {
            table: table.to_owned(),
            column: column.name.clone(),
            expected: column.ty.to_string(),
            actual: value.column_type().to_string(),
        })
    }
}

fn check_size(table: &str, buf: &BytesMut) -> DepotResult<()> {
    if buf.len() > MAX_KEY_SIZE {
        return Err(DepotError::invalid_key(
            table,
            format!("encoded key of {} bytes exceeds {MAX_KEY_SIZE}", buf.len()),
        ));
    }
    Ok(())
}

/// Encodes the key columns of a record. Absent key columns take their zero
/// value.
pub fn encode_key(schema: &TableSchema, record: &Record) -> DepotResult<RowKey> {
    let values: Vec<Value> = schema
        .key_positions()
        .iter()
        .map(|&i| schema.value_or_zero(record, i))
        .collect();
    encode_key_values(schema, &values)
}

/// Encodes a complete tuple of key values.
pub fn encode_key_values(schema: &TableSchema, values: &[Value]) -> DepotResult<RowKey> {
    let table = schema.name();
    if values.len() != schema.key_positions().len() {
        return Err(DepotError::invalid_key(
            table,
            format!(
                "expected {} key values, got {}",
                schema.key_positions().len(),
                values.len()
            ),
        ));
    }
    let mut buf = BytesMut::with_capacity(64);
    for (column, value) in schema.key_columns().zip(values) {
        check_type(table, column, value)?;
        encode_value(table, value, &mut buf)?;
    }
    check_size(table, &buf)?;
    Ok(RowKey(buf.freeze()))
}

/// Encodes a scan prefix over a table's key columns.
pub fn encode_prefix(schema: &TableSchema, prefix: &KeyPrefix) -> DepotResult<Bytes> {
    let columns: Vec<&ColumnDef> = schema.key_columns().collect();
    encode_typed_prefix(schema.name(), &columns, prefix)
}

/// Encodes a scan prefix over an index's alternate key.
///
/// Column indexes check each value against its declared column type. A
/// custom extractor declares no types, so its prefix is encoded as given.
pub fn encode_index_prefix(
    schema: &TableSchema,
    index: &IndexDef,
    prefix: &KeyPrefix,
) -> DepotResult<Bytes> {
    match index.extractor() {
        Extractor::Columns(names) => {
            let columns = names
                .iter()
                .map(|name| {
                    schema.column(name).ok_or_else(|| DepotError::UnknownColumn {
                        table: schema.name().to_owned(),
                        column: name.clone(),
                    })
                })
                .collect::<DepotResult<Vec<_>>>()?;
            encode_typed_prefix(schema.name(), &columns, prefix)
        }
        Extractor::Custom(_) => encode_values_prefix(schema.name(), prefix),
    }
}

fn encode_typed_prefix(
    table: &str,
    columns: &[&ColumnDef],
    prefix: &KeyPrefix,
) -> DepotResult<Bytes> {
    let needed = prefix.values.len() + usize::from(prefix.partial.is_some());
    if needed > columns.len() {
        return Err(DepotError::invalid_key(
            table,
            format!("prefix of {needed} values exceeds {} key columns", columns.len()),
        ));
    }

    let mut buf = BytesMut::with_capacity(64);
    for (column, value) in columns.iter().zip(&prefix.values) {
        check_type(table, column, value)?;
        encode_value(table, value, &mut buf)?;
    }
    if let Some(partial) = &prefix.partial {
        let column = columns[prefix.values.len()];
        if column.ty != ColumnType::String {
            return Err(DepotError::TypeMismatch {
                table: table.to_owned(),
                column: column.name.clone(),
                expected: column.ty.to_string(),
                actual: ColumnType::String.to_string(),
            });
        }
        encode_partial(table, partial, &mut buf)?;
    }
    check_size(table, &buf)?;
    Ok(buf.freeze())
}

/// Encodes an untyped tuple, each value by its own type.
pub fn encode_values(table: &str, values: &[Value]) -> DepotResult<Bytes> {
    let mut buf = BytesMut::with_capacity(64);
    for value in values {
        encode_value(table, value, &mut buf)?;
    }
    check_size(table, &buf)?;
    Ok(buf.freeze())
}

/// Encodes an untyped prefix, as used for index scans.
pub fn encode_values_prefix(table: &str, prefix: &KeyPrefix) -> DepotResult<Bytes> {
    let mut buf = BytesMut::with_capacity(64);
    for value in &prefix.values {
        encode_value(table, value, &mut buf)?;
    }
    if let Some(partial) = &prefix.partial {
        encode_partial(table, partial, &mut buf)?;
    }
    check_size(table, &buf)?;
    Ok(buf.freeze())
}

/// Encodes a secondary index entry key: the alternate key values followed by
/// the primary row key, which keeps entries unique for duplicate alternate
/// keys.
///
/// The size limit applies to the alternate key alone. The row key was held
/// to the same limit when it was encoded, so an entry may reach twice
/// `MAX_KEY_SIZE`.
pub fn encode_index_entry(table: &str, values: &[Value], row_key: &RowKey) -> DepotResult<Bytes> {
    let mut buf = BytesMut::with_capacity(64 + row_key.len());
    for value in values {
        encode_value(table, value, &mut buf)?;
    }
    check_size(table, &buf)?;
    buf.put_slice(row_key);
    Ok(buf.freeze())
}

// =============================================================================
// Decoding
// =============================================================================

/// Decodes a row key back into its key values.
pub fn decode_key(schema: &TableSchema, key: &[u8]) -> DepotResult<Vec<Value>> {
    let table = schema.name();
    let malformed = |reason: &str| DepotError::invalid_key(table, reason.to_owned());
    let mut buf = key;
    let mut values = Vec::with_capacity(schema.key_positions().len());

    for column in schema.key_columns() {
        let value = match column.ty {
            ColumnType::Int32 => {
                if buf.remaining() < 4 {
                    return Err(malformed("truncated int32"));
                }
                Value::Int32((buf.get_u32() ^ SIGN_32) as i32)
            }
            ColumnType::Int64 => {
                if buf.remaining() < 8 {
                    return Err(malformed("truncated int64"));
                }
                Value::Int64((buf.get_u64() ^ SIGN_64) as i64)
            }
            ColumnType::String => {
                let end = buf
                    .iter()
                    .position(|&b| b == STRING_TERMINATOR)
                    .ok_or_else(|| malformed("unterminated string"))?;
                let s = std::str::from_utf8(&buf[..end])
                    .map_err(|_| malformed("string is not UTF-8"))?;
                let value = Value::Str(s.to_owned());
                buf.advance(end + 1);
                value
            }
            ColumnType::Bytes => {
                let mut out = Vec::new();
                loop {
                    if !buf.has_remaining() {
                        return Err(malformed("unterminated bytes"));
                    }
                    let byte = buf.get_u8();
                    if byte != BYTES_ESCAPE {
                        out.push(byte);
                        continue;
                    }
                    if !buf.has_remaining() {
                        return Err(malformed("truncated bytes escape"));
                    }
                    match buf.get_u8() {
                        BYTES_ESCAPED_NUL => out.push(BYTES_ESCAPE),
                        BYTES_TERMINATOR => break,
                        _ => return Err(malformed("invalid bytes escape")),
                    }
                }
                Value::Bytes(Bytes::from(out))
            }
        };
        values.push(value);
    }

    if buf.has_remaining() {
        return Err(malformed("trailing bytes after key"));
    }
    Ok(values)
}

// =============================================================================
// Rendering
// =============================================================================

/// Renders a key tuple for messages, e.g. `("//depot/a", 1)`.
#[must_use]
pub fn render_values(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

/// Renders a row key as its value tuple, or as hex if it does not decode.
#[must_use]
pub fn render_key(schema: &TableSchema, key: &[u8]) -> String {
    match decode_key(schema, key) {
        Ok(values) => render_values(&values),
        Err(_) => RowKey(Bytes::copy_from_slice(key)).to_string(),
    }
}
