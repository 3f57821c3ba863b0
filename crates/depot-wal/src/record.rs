//! Commit records and frames.
//!
//! Payload layout (all integers big-endian):
//!
//! ```text
//! version u64 | mutation count u32 | mutations...
//! mutation: table_len u16 | table | key_len u32 | key | op u8 | body_len u32 | body
//! ```
//!
//! `op` is 1 for put and 2 for delete; deletes carry an empty body.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use depot_common::constants::WAL_FRAME_HEADER_SIZE;
use depot_common::Version;

use crate::error::{WalError, WalResult};

/// Kind of a logged mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MutationOp {
    /// Insert or replace.
    Put = 1,
    /// Delete.
    Delete = 2,
}

impl MutationOp {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One keyspace mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Keyspace name (a table, or `table#index`).
    pub keyspace: String,
    /// Encoded key.
    pub key: Bytes,
    /// Operation.
    pub op: MutationOp,
    /// Encoded body; empty for deletes.
    pub body: Bytes,
}

impl Mutation {
    /// A put.
    pub fn put(keyspace: impl Into<String>, key: Bytes, body: Bytes) -> Self {
        Self {
            keyspace: keyspace.into(),
            key,
            op: MutationOp::Put,
            body,
        }
    }

    /// A delete.
    pub fn delete(keyspace: impl Into<String>, key: Bytes) -> Self {
        Self {
            keyspace: keyspace.into(),
            key,
            op: MutationOp::Delete,
            body: Bytes::new(),
        }
    }

    /// The body to install: `None` for a delete.
    #[must_use]
    pub fn install_body(&self) -> Option<Bytes> {
        match self.op {
            MutationOp::Put => Some(self.body.clone()),
            MutationOp::Delete => None,
        }
    }

    fn encoded_len(&self) -> usize {
        2 + self.keyspace.len() + 4 + self.key.len() + 1 + 4 + self.body.len()
    }
}

/// All mutations of one committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Commit version.
    pub version: Version,
    /// Mutations in application order.
    pub mutations: Vec<Mutation>,
}

impl CommitRecord {
    /// Creates a record.
    pub fn new(version: Version, mutations: Vec<Mutation>) -> Self {
        Self { version, mutations }
    }

    /// Encoded payload size.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        12 + self.mutations.iter().map(Mutation::encoded_len).sum::<usize>()
    }

    /// Serializes the payload.
    pub fn encode(&self) -> WalResult<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u64(self.version.as_u64());
        buf.put_u32(len_u32(self.mutations.len(), "mutation count")?);
        for m in &self.mutations {
            let table_len = u16::try_from(m.keyspace.len())
                .map_err(|_| WalError::serialization_error("keyspace name too long"))?;
            buf.put_u16(table_len);
            buf.put_slice(m.keyspace.as_bytes());
            buf.put_u32(len_u32(m.key.len(), "key")?);
            buf.put_slice(&m.key);
            buf.put_u8(m.op as u8);
            buf.put_u32(len_u32(m.body.len(), "body")?);
            buf.put_slice(&m.body);
        }
        Ok(buf.freeze())
    }

    /// Deserializes a payload.
    pub fn decode(payload: &[u8]) -> WalResult<Self> {
        let mut buf = payload;
        need(&buf, 12, "record header")?;
        let version = Version::new(buf.get_u64());
        let count = buf.get_u32() as usize;

        // each mutation takes at least 11 bytes
        if count > buf.remaining() / 11 {
            return Err(WalError::deserialization_error(format!(
                "mutation count {count} exceeds payload"
            )));
        }
        let mut mutations = Vec::with_capacity(count);
        for _ in 0..count {
            need(&buf, 2, "keyspace length")?;
            let table_len = buf.get_u16() as usize;
            need(&buf, table_len, "keyspace")?;
            let keyspace = std::str::from_utf8(&buf[..table_len])
                .map_err(|_| WalError::deserialization_error("keyspace is not UTF-8"))?
                .to_owned();
            buf.advance(table_len);

            need(&buf, 4, "key length")?;
            let key_len = buf.get_u32() as usize;
            need(&buf, key_len, "key")?;
            let key = Bytes::copy_from_slice(&buf[..key_len]);
            buf.advance(key_len);

            need(&buf, 5, "op")?;
            let op_byte = buf.get_u8();
            let op = MutationOp::from_u8(op_byte).ok_or_else(|| {
                WalError::deserialization_error(format!("unknown op {op_byte}"))
            })?;
            let body_len = buf.get_u32() as usize;
            need(&buf, body_len, "body")?;
            let body = Bytes::copy_from_slice(&buf[..body_len]);
            buf.advance(body_len);

            mutations.push(Mutation {
                keyspace,
                key,
                op,
                body,
            });
        }
        if buf.has_remaining() {
            return Err(WalError::deserialization_error(format!(
                "{} trailing bytes",
                buf.remaining()
            )));
        }
        Ok(Self { version, mutations })
    }
}

fn need(buf: &[u8], n: usize, what: &str) -> WalResult<()> {
    if buf.len() < n {
        return Err(WalError::deserialization_error(format!("truncated {what}")));
    }
    Ok(())
}

fn len_u32(len: usize, what: &str) -> WalResult<u32> {
    u32::try_from(len).map_err(|_| WalError::serialization_error(format!("{what} too long")))
}

/// CRC-32 of a frame payload.
#[must_use]
pub fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Wraps a payload in a length- and checksum-prefixed frame.
#[must_use]
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(WAL_FRAME_HEADER_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_u32(checksum(payload));
    buf.put_slice(payload);
    buf.freeze()
}
