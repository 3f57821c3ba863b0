//! Transaction manager for coordinating transaction lifecycle.
//!
//! # Transaction States
//!
//! ```text
//! ┌───────┐    begin()    ┌────────┐
//! │ Start │──────────────▶│ Active │
//! └───────┘               └────────┘
//!                              │
//!                    ┌─────────┴─────────┐
//!                    │                   │
//!               commit()             abort()
//!                    │                   │
//!                    ▼                   ▼
//!             ┌────────────┐       ┌──────────┐
//!             │ Committing │──────▶│ Aborted  │ (conflict)
//!             └────────────┘       └──────────┘
//!                │       │
//!                ▼       ▼
//!     ┌───────────┐  ┌────────┐
//!     │ Committed │  │ Failed │ (log append failed)
//!     └───────────┘  └────────┘
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use depot_common::{DepotError, DepotResult, TxnId, Version};
use depot_mvcc::{GcStats, IsolationLevel, KeyRange, Keyspace, Keyspaces, SnapshotTracker};
use depot_wal::{CommitRecord, Mutation, ReplaySummary, Wal, WalConfig, WalError, WalStatsSnapshot};

use crate::format::{HexKeys, KeyFormatter};
use crate::transaction::Transaction;

/// Buffered writes: keyspace → key → body (`None` deletes).
pub(crate) type WriteSet = BTreeMap<String, BTreeMap<Bytes, Option<Bytes>>>;

/// Configuration for the transaction manager.
#[derive(Debug, Clone, Default)]
pub struct TransactionManagerConfig {
    /// Default isolation level for new transactions.
    pub default_isolation: IsolationLevel,
}

impl TransactionManagerConfig {
    /// Sets the default isolation level.
    #[must_use]
    pub fn with_default_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.default_isolation = isolation;
        self
    }
}

/// Statistics about the transaction manager.
#[derive(Debug, Default)]
pub struct TransactionStats {
    /// Total transactions started.
    pub started: AtomicU64,
    /// Total transactions committed.
    pub committed: AtomicU64,
    /// Total transactions aborted, conflicts included.
    pub aborted: AtomicU64,
    /// Total conflicts detected.
    pub conflicts: AtomicU64,
    /// Commits that failed to reach the log.
    pub failed: AtomicU64,
    /// Currently active transactions.
    pub active: AtomicU64,
}

impl TransactionStats {
    /// Creates new stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the counters.
    pub fn snapshot(&self) -> TransactionStatsSnapshot {
        TransactionStatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TransactionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStatsSnapshot {
    /// Total transactions started.
    pub started: u64,
    /// Total transactions committed.
    pub committed: u64,
    /// Total transactions aborted, conflicts included.
    pub aborted: u64,
    /// Total conflicts detected.
    pub conflicts: u64,
    /// Commits that failed to reach the log.
    pub failed: u64,
    /// Currently active transactions.
    pub active: u64,
}

/// The transaction manager coordinates all transaction operations.
pub struct TransactionManager {
    /// Versioned storage, fixed at construction.
    keyspaces: Keyspaces,
    /// Newest published commit version.
    committed: AtomicU64,
    /// Serializes validation, log append and install.
    commit_lock: Mutex<()>,
    /// Open snapshots, for the GC watermark.
    snapshots: SnapshotTracker,
    /// Commit log; `None` for in-memory operation.
    wal: Option<Wal>,
    /// Renders keys in error messages.
    formatter: Box<dyn KeyFormatter>,
    /// Configuration.
    config: TransactionManagerConfig,
    /// Statistics.
    stats: TransactionStats,
    /// Next transaction ID.
    next_txn_id: AtomicU64,
}

impl TransactionManager {
    /// Creates an in-memory transaction manager over `keyspaces`.
    pub fn new(keyspaces: Keyspaces, config: TransactionManagerConfig) -> Self {
        Self::assemble(keyspaces, config, None, Version::ZERO)
    }

    /// Opens a durable transaction manager, replaying the commit log in
    /// `wal_config.dir` into `keyspaces`.
    pub fn open(
        keyspaces: Keyspaces,
        config: TransactionManagerConfig,
        wal_config: WalConfig,
    ) -> DepotResult<(Self, ReplaySummary)> {
        let (wal, summary) = Wal::open(wal_config, Version::ZERO, |record| {
            apply_record(&keyspaces, record)
        })?;
        info!(
            version = %summary.last_version,
            applied = summary.records_applied,
            truncated_bytes = summary.truncated_bytes,
            "Recovered committed state from commit log"
        );
        let last = summary.last_version;
        Ok((Self::assemble(keyspaces, config, Some(wal), last), summary))
    }

    fn assemble(
        keyspaces: Keyspaces,
        config: TransactionManagerConfig,
        wal: Option<Wal>,
        committed: Version,
    ) -> Self {
        Self {
            keyspaces,
            committed: AtomicU64::new(committed.as_u64()),
            commit_lock: Mutex::new(()),
            snapshots: SnapshotTracker::new(),
            wal,
            formatter: Box::new(HexKeys),
            config,
            stats: TransactionStats::new(),
            next_txn_id: AtomicU64::new(TxnId::MIN.as_u64()),
        }
    }

    /// Replaces the key renderer used in error messages.
    #[must_use]
    pub fn with_key_formatter(mut self, formatter: impl KeyFormatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    /// Begins a new transaction with the default isolation level.
    pub fn begin(&self) -> Transaction<'_> {
        self.begin_with_isolation(self.config.default_isolation)
    }

    /// Begins a new transaction with a specific isolation level.
    pub fn begin_with_isolation(&self, isolation: IsolationLevel) -> Transaction<'_> {
        let id = TxnId::new(self.next_txn_id.fetch_add(1, Ordering::Relaxed));
        let pin = self.snapshots.pin_with(|| self.committed_version());

        self.stats.started.fetch_add(1, Ordering::Relaxed);
        self.stats.active.fetch_add(1, Ordering::Relaxed);

        Transaction::new(self, id, isolation, pin)
    }

    /// Newest published commit version.
    pub fn committed_version(&self) -> Version {
        Version::new(self.committed.load(Ordering::Acquire))
    }

    /// Looks up a keyspace.
    pub fn keyspace(&self, name: &str) -> DepotResult<&Arc<Keyspace>> {
        self.keyspaces.get(name).ok_or_else(|| DepotError::UnknownTable {
            table: name.to_owned(),
        })
    }

    /// All keyspaces.
    pub fn keyspaces(&self) -> &Keyspaces {
        &self.keyspaces
    }

    /// Prunes versions older than every open snapshot.
    pub fn collect_garbage(&self) -> GcStats {
        let current = self.committed_version();
        let watermark = self.snapshots.watermark(current);
        let stats = self.keyspaces.prune(watermark);
        debug!(
            watermark = %watermark,
            pruned = stats.versions_pruned,
            removed = stats.keys_removed,
            "Collected garbage"
        );
        stats
    }

    /// Counter snapshot.
    pub fn stats(&self) -> TransactionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Commit log counters, if a log is attached.
    pub fn wal_stats(&self) -> Option<WalStatsSnapshot> {
        self.wal.as_ref().map(Wal::stats)
    }

    /// Returns true if commits are logged.
    pub fn is_durable(&self) -> bool {
        self.wal.is_some()
    }

    /// Number of transactions not yet ended.
    pub fn active_count(&self) -> usize {
        self.stats.active.load(Ordering::Relaxed) as usize
    }

    /// Configuration.
    pub fn config(&self) -> &TransactionManagerConfig {
        &self.config
    }

    pub(crate) fn counters(&self) -> &TransactionStats {
        &self.stats
    }

    pub(crate) fn format_key(&self, keyspace: &str, key: &[u8]) -> String {
        self.formatter.format_key(keyspace, key)
    }

    /// Validates and applies a transaction's writes at the next version.
    pub(crate) fn commit_writes(
        &self,
        id: TxnId,
        snapshot: Version,
        isolation: IsolationLevel,
        writes: &WriteSet,
        reads: &BTreeSet<(String, Bytes)>,
        scanned: &[(String, KeyRange)],
    ) -> DepotResult<Version> {
        let _section = self.commit_lock.lock();

        for (name, entries) in writes {
            let space = self.keyspace(name)?;
            for key in entries.keys() {
                if let Some(committed) = space.latest_version(key).filter(|v| *v > snapshot) {
                    return Err(self.conflict(id, name, key, committed));
                }
            }
        }

        if isolation == IsolationLevel::Serializable {
            for (name, key) in reads {
                let space = self.keyspace(name)?;
                if let Some(committed) = space.latest_version(key).filter(|v| *v > snapshot) {
                    return Err(self.conflict(id, name, key, committed));
                }
            }
            for (name, range) in scanned {
                let space = self.keyspace(name)?;
                if let Some((key, committed)) = space.first_modified_after(range, snapshot) {
                    return Err(self.conflict(id, name, &key, committed));
                }
            }
        }

        let version = self.committed_version().next();
        if let Some(wal) = &self.wal {
            let mutations = writes
                .iter()
                .flat_map(|(name, entries)| {
                    entries.iter().map(move |(key, body)| match body {
                        Some(body) => Mutation::put(name.clone(), key.clone(), body.clone()),
                        None => Mutation::delete(name.clone(), key.clone()),
                    })
                })
                .collect();
            if let Err(e) = wal.append(&CommitRecord::new(version, mutations)) {
                error!(txn = %id, version = %version, error = %e, "Commit failed to reach the log");
                return Err(DepotError::Failed {
                    version,
                    reason: e.to_string(),
                });
            }
        }

        for (name, entries) in writes {
            self.keyspace(name)?.install(
                version,
                entries.iter().map(|(key, body)| (key.clone(), body.clone())),
            );
        }
        self.committed.store(version.as_u64(), Ordering::Release);
        Ok(version)
    }

    fn conflict(&self, id: TxnId, keyspace: &str, key: &[u8], committed: Version) -> DepotError {
        let key = self.format_key(keyspace, key);
        debug!(txn = %id, keyspace, key = %key, committed = %committed, "Write conflict");
        DepotError::Conflict {
            table: keyspace.to_owned(),
            key,
            committed,
        }
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("committed", &self.committed_version())
            .field("keyspaces", &self.keyspaces.len())
            .field("durable", &self.wal.is_some())
            .field("config", &self.config)
            .finish()
    }
}

fn apply_record(keyspaces: &Keyspaces, record: CommitRecord) -> Result<(), WalError> {
    let version = record.version;
    for mutation in record.mutations {
        let space = keyspaces
            .get(&mutation.keyspace)
            .ok_or_else(|| WalError::ApplyFailed {
                version,
                reason: format!("unknown keyspace '{}'", mutation.keyspace),
            })?;
        let body = mutation.install_body();
        space.install(version, [(mutation.key, body)]);
    }
    Ok(())
}
