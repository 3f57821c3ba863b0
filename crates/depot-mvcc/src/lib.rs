//! # depot-mvcc
//!
//! Multi-version storage for DepotDB.
//!
//! This crate implements:
//! - Version chains: per-key ascending lists of committed versions
//! - Keyspaces: ordered maps of key to version chain with snapshot reads
//!   and batched range scans
//! - Snapshot tracking for the garbage-collection watermark
//! - Key ranges and scan directions

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Version chains.
pub mod chain;

/// Ordered versioned keyspaces.
pub mod keyspace;

/// Key ranges.
pub mod range;

/// Snapshot isolation levels and active snapshot tracking.
pub mod snapshot;

pub use chain::VersionChain;
pub use keyspace::{GcStats, Keyspace, Keyspaces};
pub use range::{KeyRange, ScanDirection};
pub use snapshot::{IsolationLevel, SnapshotPin, SnapshotTracker};
