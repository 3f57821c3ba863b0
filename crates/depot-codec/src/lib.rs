//! # depot-codec
//!
//! Binary encodings for DepotDB.
//!
//! ## Record bodies
//!
//! ```text
//! +-------+--------+------------------+--------------+-----------------------+
//! | magic | format | fingerprint      | column count | columns (tag+payload) |
//! | u8    | u8     | u64 BE           | u16 BE       | ...                   |
//! +-------+--------+------------------+--------------+-----------------------+
//! ```
//!
//! Columns appear in declared order. Payloads are `i32 BE`, `i64 BE`, or a
//! `u32 BE` length followed by the bytes. The fingerprint ties a body to the
//! exact column layout it was written with.
//!
//! ## Row keys
//!
//! Key columns are concatenated in declared order using an encoding whose
//! byte order equals tuple order:
//!
//! - integers: sign bit flipped, big-endian
//! - strings: UTF-8 followed by `0x00` (NUL is not allowed in key strings)
//! - bytes: `0x00` escaped as `0x00 0xFF`, terminated by `0x00 0x01`

#![warn(missing_docs)]
#![warn(clippy::all)]

mod key;
mod record;

pub use key::{
    decode_key, encode_index_entry, encode_index_prefix, encode_key, encode_key_values,
    encode_prefix, encode_values, encode_values_prefix, render_key, render_values, KeyPrefix,
    RowKey,
};
pub use record::{decode_record, encode_record, peek_fingerprint};
