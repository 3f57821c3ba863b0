//! # depot-wal
//!
//! Durable commit log for DepotDB.
//!
//! Every committed transaction is appended as one record keyed by its commit
//! version, then synced, before any of its mutations become visible. On open
//! the log is replayed in version order to rebuild the in-memory keyspaces.
//!
//! # Architecture
//!
//! The log is a directory of segment files named after the first version
//! they hold (`wal_{version:016x}.log`). Segments rotate once they pass the
//! configured size.
//!
//! ## Segment Format
//!
//! ```text
//! +-----------+------------+------------------+
//! | magic (4) | format (4) | base version (8) |   segment header
//! +-----------+------------+------------------+
//! | len (4) | crc32 (4) | payload (len)       |   frame, repeated
//! +---------+-----------+---------------------+
//! ```
//!
//! A frame's payload is one [`CommitRecord`]. A torn or checksum-failing
//! frame at the end of the newest segment is the trace of an interrupted
//! append: replay truncates it away. Damage anywhere else is reported as
//! corruption.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;

/// Commit record encoding.
pub mod record;

/// Segment files.
pub mod segment;

/// Appending to the log.
pub mod writer;

/// Replaying the log.
pub mod reader;

/// Log facade.
pub mod wal;

pub use config::{SyncPolicy, WalConfig};
pub use error::{WalError, WalResult};
pub use reader::ReplaySummary;
pub use record::{CommitRecord, Mutation, MutationOp};
pub use wal::{Wal, WalStatsSnapshot};
