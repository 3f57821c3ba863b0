//! Engine error types.
//!
//! Every failing call returns a distinguishable error kind plus the
//! offending table and row where applicable.

use std::fmt;
use thiserror::Error;

use crate::types::Version;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0000,
    /// Invalid configuration.
    Config = 0x0001,
    /// Operation invalid in the current state.
    InvalidState = 0x0002,

    // I/O errors (0x0100 - 0x01FF)
    /// General I/O error.
    Io = 0x0100,
    /// On-disk corruption detected.
    Corruption = 0x0101,

    // Schema errors (0x0200 - 0x02FF)
    /// Table is not registered.
    UnknownTable = 0x0200,
    /// Table is already registered.
    DuplicateTable = 0x0201,
    /// Schema declaration is invalid.
    InvalidSchema = 0x0202,
    /// Column is not declared by the schema.
    UnknownColumn = 0x0203,
    /// Index is not declared by the schema.
    UnknownIndex = 0x0204,

    // Record errors (0x0300 - 0x03FF)
    /// Value type disagrees with the column type.
    TypeMismatch = 0x0300,
    /// Required column is absent.
    MissingColumn = 0x0301,
    /// Key values cannot form a RowKey.
    InvalidKey = 0x0302,
    /// Encoded record belongs to a different schema.
    SchemaMismatch = 0x0303,
    /// Encoded record is malformed.
    CorruptRecord = 0x0304,

    // Transaction errors (0x0400 - 0x04FF)
    /// Row not found.
    NotFound = 0x0400,
    /// Write-write or read-write conflict.
    Conflict = 0x0401,
    /// Durability write failed.
    Failed = 0x0402,
    /// Secondary index disagrees with its table.
    IndexInconsistent = 0x0403,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "I/O",
            0x02 => "Schema",
            0x03 => "Record",
            0x04 => "Transaction",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for DepotDB.
///
/// Row identifiers are carried pre-rendered (`key`) so callers can log or
/// react without access to schemas or the engine's internals.
#[derive(Debug, Error)]
pub enum DepotError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Operation not valid for the transaction's current state.
    #[error("transaction {txn} is {state}, expected {expected}")]
    InvalidState {
        /// Transaction identifier.
        txn: u64,
        /// Current state.
        state: String,
        /// Expected state.
        expected: &'static str,
    },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// On-disk corruption detected outside a recoverable torn tail.
    #[error("data corruption detected: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    // ==========================================================================
    // Schema Errors
    // ==========================================================================
    /// Table is not registered.
    #[error("unknown table '{table}'")]
    UnknownTable {
        /// The table name.
        table: String,
    },

    /// Table is already registered.
    #[error("table '{table}' is already registered")]
    DuplicateTable {
        /// The table name.
        table: String,
    },

    /// Schema declaration is invalid.
    #[error("invalid schema for table '{table}': {reason}")]
    InvalidSchema {
        /// The table name.
        table: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Column is not declared by the table's schema.
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn {
        /// The table name.
        table: String,
        /// The column name.
        column: String,
    },

    /// Index is not declared by the table's schema.
    #[error("unknown index '{index}' on table '{table}'")]
    UnknownIndex {
        /// The table name.
        table: String,
        /// The index name.
        index: String,
    },

    // ==========================================================================
    // Record Errors
    // ==========================================================================
    /// Value type disagrees with the declared column type.
    #[error("type mismatch for '{table}.{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// The table name.
        table: String,
        /// The column name.
        column: String,
        /// Declared type.
        expected: String,
        /// Runtime type.
        actual: String,
    },

    /// A non-defaultable column is absent.
    #[error("missing column '{column}' in record for table '{table}'")]
    MissingColumn {
        /// The table name.
        table: String,
        /// The column name.
        column: String,
    },

    /// Key values cannot be turned into a RowKey.
    #[error("invalid key for table '{table}': {reason}")]
    InvalidKey {
        /// The table name.
        table: String,
        /// What is wrong with the key.
        reason: String,
    },

    /// Encoded record carries a different schema fingerprint.
    #[error(
        "schema mismatch for table '{table}': record fingerprint {found:#018x}, schema fingerprint {expected:#018x}"
    )]
    SchemaMismatch {
        /// The table name.
        table: String,
        /// Fingerprint of the schema used for decoding.
        expected: u64,
        /// Fingerprint embedded in the record.
        found: u64,
    },

    /// Encoded record is malformed.
    #[error("corrupt record in table '{table}': {reason}")]
    CorruptRecord {
        /// The table name.
        table: String,
        /// What is malformed.
        reason: String,
    },

    // ==========================================================================
    // Transaction Errors
    // ==========================================================================
    /// Row not found.
    #[error("row {key} not found in table '{table}'")]
    NotFound {
        /// The table name.
        table: String,
        /// Rendered row key.
        key: String,
    },

    /// A concurrently committed transaction touched the same row.
    #[error("conflict on row {key} in table '{table}': committed at {committed}")]
    Conflict {
        /// The table name.
        table: String,
        /// Rendered row key.
        key: String,
        /// Version of the conflicting commit.
        committed: Version,
    },

    /// The durability write failed; nothing was applied.
    #[error("commit of {version} failed: {reason}")]
    Failed {
        /// Version the commit would have received.
        version: Version,
        /// Reason for failure.
        reason: String,
    },

    /// Secondary index disagrees with its primary table.
    #[error("index '{index}' on table '{table}' is inconsistent: {reason}")]
    IndexInconsistent {
        /// The table name.
        table: String,
        /// The index name.
        index: String,
        /// Description of the first inconsistency.
        reason: String,
    },
}

impl DepotError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::Config { .. } => ErrorCode::Config,
            Self::InvalidState { .. } => ErrorCode::InvalidState,
            Self::Io { .. } => ErrorCode::Io,
            Self::Corruption { .. } => ErrorCode::Corruption,
            Self::UnknownTable { .. } => ErrorCode::UnknownTable,
            Self::DuplicateTable { .. } => ErrorCode::DuplicateTable,
            Self::InvalidSchema { .. } => ErrorCode::InvalidSchema,
            Self::UnknownColumn { .. } => ErrorCode::UnknownColumn,
            Self::UnknownIndex { .. } => ErrorCode::UnknownIndex,
            Self::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            Self::MissingColumn { .. } => ErrorCode::MissingColumn,
            Self::InvalidKey { .. } => ErrorCode::InvalidKey,
            Self::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            Self::CorruptRecord { .. } => ErrorCode::CorruptRecord,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Conflict { .. } => ErrorCode::Conflict,
            Self::Failed { .. } => ErrorCode::Failed,
            Self::IndexInconsistent { .. } => ErrorCode::IndexInconsistent,
        }
    }

    /// Returns true if re-running the transaction against a fresh snapshot
    /// may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true if this is a row-not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the table this error refers to, if any.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::UnknownTable { table }
            | Self::DuplicateTable { table }
            | Self::InvalidSchema { table, .. }
            | Self::UnknownColumn { table, .. }
            | Self::UnknownIndex { table, .. }
            | Self::TypeMismatch { table, .. }
            | Self::MissingColumn { table, .. }
            | Self::InvalidKey { table, .. }
            | Self::SchemaMismatch { table, .. }
            | Self::CorruptRecord { table, .. }
            | Self::NotFound { table, .. }
            | Self::Conflict { table, .. }
            | Self::IndexInconsistent { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    #[must_use]
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid schema error.
    #[must_use]
    pub fn invalid_schema(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Creates a corrupt record error.
    #[must_use]
    pub fn corrupt_record(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid key error.
    #[must_use]
    pub fn invalid_key(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            key: key.into(),
        }
    }
}
