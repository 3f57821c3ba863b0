//! # depot-txn
//!
//! Transaction manager for DepotDB.
//!
//! - **Transaction Lifecycle**: owned [`Transaction`] handles buffer writes
//!   across keyspaces and commit or abort them atomically. Dropping an
//!   active transaction aborts it.
//!
//! - **Isolation Levels**: Read Committed, Snapshot Isolation (default),
//!   and Serializable (snapshot isolation plus read-set and scan-range
//!   validation at commit).
//!
//! - **Conflicts**: first committer wins, per key. A commit fails with
//!   `Conflict` if any key it writes was committed by someone else after
//!   its snapshot.
//!
//! - **Durability**: with a commit log attached, every commit is appended
//!   and synced before it becomes visible. On open the log is replayed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 TransactionManager                   │
//! │                                                      │
//! │  commit section (mutex)   committed version (atomic) │
//! │        │                                             │
//! │        ├──▶ validate ──▶ Wal::append ──▶ install     │
//! │        │                                   │         │
//! │        ▼                                   ▼         │
//! │  SnapshotTracker                      Keyspaces      │
//! └──────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod format;
mod manager;
mod transaction;

pub use format::{HexKeys, KeyFormatter};
pub use manager::{
    TransactionManager, TransactionManagerConfig, TransactionStats, TransactionStatsSnapshot,
};
pub use transaction::{Transaction, TransactionState};

pub use depot_mvcc::{GcStats, IsolationLevel, KeyRange, ScanDirection};
