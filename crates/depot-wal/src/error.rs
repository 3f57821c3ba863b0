//! WAL error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use depot_common::{DepotError, Version};

/// Result type for WAL operations.
pub type WalResult<T> = Result<T, WalError>;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// I/O error during WAL operations.
    #[error("WAL I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: io::Error,
    },

    /// Invalid segment magic number.
    #[error("Invalid WAL segment magic in {path}: expected {expected:#010x}, found {found:#010x}")]
    InvalidMagic {
        /// Segment file.
        path: PathBuf,
        /// Expected magic.
        expected: u32,
        /// Magic found on disk.
        found: u32,
    },

    /// Unsupported segment format version.
    #[error("Unsupported WAL format in {path}: expected {expected}, found {found}")]
    UnsupportedVersion {
        /// Segment file.
        path: PathBuf,
        /// Supported format.
        expected: u32,
        /// Format found on disk.
        found: u32,
    },

    /// Segment is damaged somewhere other than a recoverable tail.
    #[error("WAL segment {path} corrupted at offset {offset}: {reason}")]
    SegmentCorrupted {
        /// Segment file.
        path: PathBuf,
        /// Byte offset of the damaged frame.
        offset: u64,
        /// What is wrong.
        reason: String,
    },

    /// Versions in the log are not contiguous.
    #[error("WAL version gap: expected {expected}, found {found}")]
    VersionGap {
        /// Next version replay expected.
        expected: Version,
        /// Version found in the log.
        found: Version,
    },

    /// Commit record too large.
    #[error("WAL record too large: {size} bytes exceeds maximum {max} bytes")]
    RecordTooLarge {
        /// Encoded size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A failed append could not be rolled back; the log refuses writes.
    #[error("WAL is poisoned after an unrecoverable append failure")]
    Poisoned,

    /// Commit record payload is malformed.
    #[error("Failed to deserialize WAL record: {reason}")]
    DeserializationError {
        /// What is malformed.
        reason: String,
    },

    /// Commit record cannot be serialized.
    #[error("Failed to serialize WAL record: {reason}")]
    SerializationError {
        /// Reason.
        reason: String,
    },

    /// Replay callback rejected a record.
    #[error("Failed to apply WAL record {version}: {reason}")]
    ApplyFailed {
        /// Record version.
        version: Version,
        /// Reason.
        reason: String,
    },

    /// Configuration error.
    #[error("WAL configuration error: {reason}")]
    ConfigError {
        /// Reason.
        reason: String,
    },
}

impl WalError {
    /// Creates a segment corrupted error.
    pub fn segment_corrupted(path: impl Into<PathBuf>, offset: u64, reason: impl Into<String>) -> Self {
        Self::SegmentCorrupted {
            path: path.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a deserialization error.
    pub fn deserialization_error(reason: impl Into<String>) -> Self {
        Self::DeserializationError {
            reason: reason.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization_error(reason: impl Into<String>) -> Self {
        Self::SerializationError {
            reason: reason.into(),
        }
    }

    /// Creates a config error.
    pub fn config_error(reason: impl Into<String>) -> Self {
        Self::ConfigError {
            reason: reason.into(),
        }
    }

    /// Returns true if this is a corruption error.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::SegmentCorrupted { .. }
                | Self::InvalidMagic { .. }
                | Self::UnsupportedVersion { .. }
                | Self::VersionGap { .. }
                | Self::DeserializationError { .. }
                | Self::ApplyFailed { .. }
        )
    }
}

impl From<WalError> for DepotError {
    fn from(err: WalError) -> Self {
        match err {
            WalError::Io { source } => DepotError::Io { source },
            WalError::ConfigError { reason } => DepotError::config(reason),
            other => DepotError::corruption(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_common::ErrorCode;

    #[test]
    fn test_error_classification() {
        let err = WalError::segment_corrupted("/wal/wal_0000000000000001.log", 16, "bad frame");
        assert!(err.is_corruption());
        assert_eq!(DepotError::from(err).code(), ErrorCode::Corruption);

        let err = WalError::RecordTooLarge { size: 10, max: 5 };
        assert!(!err.is_corruption());
        assert!(err.to_string().contains("10 bytes"));

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let wal_err: WalError = io_err.into();
        assert!(matches!(wal_err, WalError::Io { .. }));
        assert_eq!(DepotError::from(wal_err).code(), ErrorCode::Io);
    }
}
