//! System-wide constants for DepotDB.

// =============================================================================
// Record Format
// =============================================================================

/// Leading marker byte of every encoded record body.
pub const RECORD_MAGIC: u8 = 0xD5;

/// Current record body format version.
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Size of the fixed record body header:
/// magic (1) + format (1) + fingerprint (8) + column count (2).
pub const RECORD_HEADER_SIZE: usize = 12;

/// Maximum number of columns in one table.
pub const MAX_COLUMNS: usize = u16::MAX as usize;

/// Maximum encoded RowKey size in bytes (16 KB).
pub const MAX_KEY_SIZE: usize = 16 * 1024;

// =============================================================================
// Commit Log
// =============================================================================

/// Magic number at the start of every log segment ("DPWL" in ASCII).
pub const WAL_MAGIC: u32 = 0x4450_574C;

/// Current log segment format version.
pub const WAL_FORMAT_VERSION: u32 = 1;

/// Segment header size: magic (4) + format (4) + base version (8).
pub const WAL_SEGMENT_HEADER_SIZE: usize = 16;

/// Frame header size: payload length (4) + CRC32 (4).
pub const WAL_FRAME_HEADER_SIZE: usize = 8;

/// Default log segment size (64 MB).
pub const DEFAULT_WAL_SEGMENT_SIZE: usize = 64 * 1024 * 1024;

/// Maximum size of a single commit record (16 MB).
pub const MAX_WAL_RECORD_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// Transactions and Scans
// =============================================================================

/// Separator between a table name and an index name in index keyspaces.
pub const INDEX_KEYSPACE_SEPARATOR: char = '#';

/// Default number of rows fetched per scan batch.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 256;

/// Default number of attempts for conflict-retrying transaction closures.
pub const DEFAULT_MAX_COMMIT_RETRIES: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_is_ascii() {
        assert_eq!(&WAL_MAGIC.to_be_bytes(), b"DPWL");
    }

    #[test]
    fn test_header_sizes() {
        assert_eq!(RECORD_HEADER_SIZE, 1 + 1 + 8 + 2);
        assert_eq!(WAL_SEGMENT_HEADER_SIZE, 4 + 4 + 8);
        assert!(MAX_WAL_RECORD_SIZE < DEFAULT_WAL_SEGMENT_SIZE);
    }
}
