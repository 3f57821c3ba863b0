//! # depot-engine
//!
//! Transactional multi-table record store for source-control metadata.
//!
//! An [`Engine`] opens over a [`SchemaRegistry`](depot_schema::SchemaRegistry)
//! and gives every table an ordered, versioned keyspace, plus one keyspace per
//! secondary index. All reads and writes happen inside a [`Txn`]:
//!
//! - **Point operations**: `get`, `try_get`, `put` (upsert), `delete`,
//!   `delete_if_exists`
//! - **Scans**: lazy, batched, prefix-bounded, ascending or descending, with
//!   a resumable cursor
//! - **Indexes**: maintained synchronously by `put` and `delete`, scanned
//!   with `index_scan` and resolved back to rows
//!
//! A commit is atomic across tables and indexes. With a data directory
//! configured it is appended to the commit log before it becomes visible,
//! and the log is replayed on the next open.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                       Engine                         │
//! │   SchemaRegistry ──▶ Txn (table store + indexes)     │
//! │                        │        │                    │
//! │                  depot-codec    ▼                    │
//! │                       TransactionManager             │
//! │                        │               │             │
//! │                     Keyspaces      commit log        │
//! └──────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod engine;
mod index;
mod scan;
mod table;

pub use config::EngineConfig;
pub use engine::{Engine, EngineStats};
pub use index::{IndexProblem, IndexReport, ProblemKind};
pub use scan::{IndexScan, RecordScan};
pub use table::Txn;

pub use depot_codec::{KeyPrefix, RowKey};
pub use depot_txn::{IsolationLevel, ScanDirection, TransactionState};
pub use depot_wal::SyncPolicy;
