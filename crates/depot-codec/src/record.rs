//! Record body encoding.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use depot_common::constants::{RECORD_FORMAT_VERSION, RECORD_HEADER_SIZE, RECORD_MAGIC};
use depot_common::{DepotError, DepotResult};
use depot_schema::{ColumnType, Record, TableSchema, Value};

/// Encodes a record under a schema.
///
/// Every declared column is written in declared order; absent columns are
/// written as their zero value.
pub fn encode_record(schema: &TableSchema, record: &Record) -> DepotResult<Bytes> {
    schema.validate(record)?;

    let mut buf = BytesMut::with_capacity(RECORD_HEADER_SIZE + 16 * schema.columns().len());
    buf.put_u8(RECORD_MAGIC);
    buf.put_u8(RECORD_FORMAT_VERSION);
    buf.put_u64(schema.fingerprint());
    buf.put_u16(schema.columns().len() as u16);

    for position in 0..schema.columns().len() {
        let value = schema.value_or_zero(record, position);
        buf.put_u8(value.column_type().tag());
        match &value {
            Value::Int32(v) => buf.put_i32(*v),
            Value::Int64(v) => buf.put_i64(*v),
            Value::Str(s) => {
                buf.put_u32(payload_len(schema, position, s.len())?);
                buf.put_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                buf.put_u32(payload_len(schema, position, b.len())?);
                buf.put_slice(b);
            }
        }
    }
    Ok(buf.freeze())
}

/// Length prefix of a variable-size column payload.
fn payload_len(schema: &TableSchema, position: usize, len: usize) -> DepotResult<u32> {
    u32::try_from(len).map_err(|_| {
        DepotError::corrupt_record(
            schema.name(),
            format!(
                "column '{}' payload of {len} bytes exceeds {} bytes",
                schema.columns()[position].name,
                u32::MAX
            ),
        )
    })
}

/// Reads the schema fingerprint of an encoded body without decoding it.
#[must_use]
pub fn peek_fingerprint(body: &[u8]) -> Option<u64> {
    if body.len() < RECORD_HEADER_SIZE || body[0] != RECORD_MAGIC {
        return None;
    }
    let mut fingerprint = [0u8; 8];
    fingerprint.copy_from_slice(&body[2..10]);
    Some(u64::from_be_bytes(fingerprint))
}

/// Decodes a record body.
pub fn decode_record(schema: &TableSchema, body: &[u8]) -> DepotResult<Record> {
    let table = schema.name();
    let corrupt = |reason: String| DepotError::corrupt_record(table, reason);
    let mut buf = body;

    if buf.remaining() < RECORD_HEADER_SIZE {
        return Err(corrupt(format!("body of {} bytes is shorter than the header", body.len())));
    }
    let magic = buf.get_u8();
    if magic != RECORD_MAGIC {
        return Err(corrupt(format!("bad magic {magic:#04x}")));
    }
    let format = buf.get_u8();
    if format != RECORD_FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format {format}")));
    }
    let fingerprint = buf.get_u64();
    if fingerprint != schema.fingerprint() {
        return Err(DepotError::SchemaMismatch {
            table: table.to_owned(),
            expected: schema.fingerprint(),
            found: fingerprint,
        });
    }
    let count = buf.get_u16() as usize;
    if count != schema.columns().len() {
        return Err(corrupt(format!(
            "column count {count}, schema declares {}",
            schema.columns().len()
        )));
    }

    let mut record = Record::new();
    for column in schema.columns() {
        if !buf.has_remaining() {
            return Err(corrupt(format!("truncated before column '{}'", column.name)));
        }
        let tag = buf.get_u8();
        if ColumnType::from_tag(tag) != Some(column.ty) {
            return Err(corrupt(format!("tag {tag} for {} column '{}'", column.ty, column.name)));
        }
        let value = match column.ty {
            ColumnType::Int32 => {
                if buf.remaining() < 4 {
                    return Err(corrupt(format!("truncated column '{}'", column.name)));
                }
                Value::Int32(buf.get_i32())
            }
            ColumnType::Int64 => {
                if buf.remaining() < 8 {
                    return Err(corrupt(format!("truncated column '{}'", column.name)));
                }
                Value::Int64(buf.get_i64())
            }
            ColumnType::String | ColumnType::Bytes => {
                if buf.remaining() < 4 {
                    return Err(corrupt(format!("truncated length of '{}'", column.name)));
                }
                let len = buf.get_u32() as usize;
                if buf.remaining() < len {
                    return Err(corrupt(format!("truncated column '{}'", column.name)));
                }
                let raw = &buf[..len];
                let value = if column.ty == ColumnType::String {
                    let s = std::str::from_utf8(raw)
                        .map_err(|_| corrupt(format!("column '{}' is not UTF-8", column.name)))?;
                    Value::Str(s.to_owned())
                } else {
                    Value::Bytes(Bytes::copy_from_slice(raw))
                };
                buf.advance(len);
                value
            }
        };
        record.set(column.name.clone(), value);
    }

    if buf.has_remaining() {
        return Err(corrupt(format!("{} trailing bytes", buf.remaining())));
    }
    Ok(record)
}
