//! Transaction handles.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use tracing::{debug, trace};

use depot_common::{DepotError, DepotResult, TxnId, Version};
use depot_mvcc::{IsolationLevel, KeyRange, ScanDirection, SnapshotPin};

use crate::manager::{TransactionManager, WriteSet};

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction is validating and logging its writes.
    Committing,
    /// Transaction has committed.
    Committed,
    /// Transaction was aborted, by request or by a conflict.
    Aborted,
    /// The commit could not be made durable; nothing was applied.
    Failed,
}

impl TransactionState {
    /// Returns true if the transaction can perform operations.
    pub fn is_active(&self) -> bool {
        *self == TransactionState::Active
    }

    /// Returns true if the transaction has ended.
    pub fn is_ended(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted | TransactionState::Failed
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Active => write!(f, "Active"),
            TransactionState::Committing => write!(f, "Committing"),
            TransactionState::Committed => write!(f, "Committed"),
            TransactionState::Aborted => write!(f, "Aborted"),
            TransactionState::Failed => write!(f, "Failed"),
        }
    }
}

/// A transaction over the manager's keyspaces.
///
/// Writes are buffered until [`commit`](Self::commit) and are visible to
/// this transaction's own reads and scans. Dropping an active transaction
/// aborts it.
pub struct Transaction<'m> {
    manager: &'m TransactionManager,
    id: TxnId,
    state: TransactionState,
    isolation: IsolationLevel,
    snapshot: Version,
    /// Released when the transaction ends.
    pin: Option<SnapshotPin<'m>>,
    writes: WriteSet,
    /// Point reads, tracked under Serializable only.
    reads: BTreeSet<(String, Bytes)>,
    /// Scanned ranges, tracked under Serializable only.
    scanned: Vec<(String, KeyRange)>,
}

impl<'m> Transaction<'m> {
    pub(crate) fn new(
        manager: &'m TransactionManager,
        id: TxnId,
        isolation: IsolationLevel,
        pin: SnapshotPin<'m>,
    ) -> Self {
        let snapshot = pin.version();
        trace!(txn = %id, snapshot = %snapshot, isolation = %isolation, "Transaction started");
        Self {
            manager,
            id,
            state: TransactionState::Active,
            isolation,
            snapshot,
            pin: Some(pin),
            writes: WriteSet::new(),
            reads: BTreeSet::new(),
            scanned: Vec::new(),
        }
    }

    /// Transaction ID.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Isolation level.
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Committed version this transaction started from.
    pub fn snapshot(&self) -> Version {
        self.snapshot
    }

    /// Returns true if nothing has been written.
    pub fn is_read_only(&self) -> bool {
        self.writes.values().all(BTreeMap::is_empty)
    }

    /// Number of buffered writes.
    pub fn write_count(&self) -> usize {
        self.writes.values().map(BTreeMap::len).sum()
    }

    /// The manager this transaction belongs to.
    pub fn manager(&self) -> &'m TransactionManager {
        self.manager
    }

    /// Version reads are served from.
    fn read_version(&self) -> Version {
        match self.isolation {
            IsolationLevel::ReadCommitted => self.manager.committed_version(),
            IsolationLevel::SnapshotIsolation | IsolationLevel::Serializable => self.snapshot,
        }
    }

    fn ensure_active(&self) -> DepotResult<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(DepotError::InvalidState {
                txn: self.id.as_u64(),
                state: self.state.to_string(),
                expected: "Active",
            })
        }
    }

    /// Reads `key`, seeing this transaction's own writes first.
    pub fn get(&mut self, keyspace: &str, key: &[u8]) -> DepotResult<Option<Bytes>> {
        self.ensure_active()?;
        let space = self.manager.keyspace(keyspace)?;

        if let Some(buffered) = self.writes.get(keyspace).and_then(|w| w.get(key)) {
            return Ok(buffered.clone());
        }
        if self.isolation == IsolationLevel::Serializable {
            self.reads
                .insert((keyspace.to_owned(), Bytes::copy_from_slice(key)));
        }
        Ok(space.get_at(key, self.read_version()))
    }

    /// Buffers a put.
    pub fn put(&mut self, keyspace: &str, key: Bytes, body: Bytes) -> DepotResult<()> {
        self.buffer(keyspace, key, Some(body))
    }

    /// Buffers a delete.
    pub fn delete(&mut self, keyspace: &str, key: Bytes) -> DepotResult<()> {
        self.buffer(keyspace, key, None)
    }

    fn buffer(&mut self, keyspace: &str, key: Bytes, body: Option<Bytes>) -> DepotResult<()> {
        self.ensure_active()?;
        self.manager.keyspace(keyspace)?;
        self.writes
            .entry(keyspace.to_owned())
            .or_default()
            .insert(key, body);
        Ok(())
    }

    /// Returns the next batch of up to `limit` live entries in `range`.
    ///
    /// Committed entries visible to this transaction are merged with its
    /// buffered writes. A short batch does not mean the range is exhausted;
    /// resume with [`KeyRange::resume_after`] on the last key returned. An
    /// empty batch means the scan is over.
    pub fn scan_batch(
        &mut self,
        keyspace: &str,
        range: &KeyRange,
        direction: ScanDirection,
        limit: usize,
    ) -> DepotResult<Vec<(Bytes, Bytes)>> {
        self.ensure_active()?;
        let space = self.manager.keyspace(keyspace)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        if self.isolation == IsolationLevel::Serializable {
            self.scanned.push((keyspace.to_owned(), range.clone()));
        }

        let read_version = self.read_version();
        let buffered = self.writes.get(keyspace);
        let mut range = range.clone();
        loop {
            if range.is_empty() {
                return Ok(Vec::new());
            }
            let committed = space.scan_at(&range, read_version, direction, limit);
            // when the committed batch is full, buffered writes past its
            // last key belong to a later batch
            let boundary = (committed.len() == limit)
                .then(|| committed.last().map(|(key, _)| key.clone()))
                .flatten();
            let within = |key: &Bytes| match (&boundary, direction) {
                (None, _) => true,
                (Some(b), ScanDirection::Forward) => key <= b,
                (Some(b), ScanDirection::Backward) => key >= b,
            };

            let mut merged: BTreeMap<Bytes, Option<Bytes>> = committed
                .into_iter()
                .map(|(key, body)| (key, Some(body)))
                .collect();
            if let Some(buffered) = buffered {
                for (key, body) in buffered.range::<[u8], _>(range.as_slices()) {
                    if within(key) {
                        merged.insert(key.clone(), body.clone());
                    }
                }
            }

            let live = merged
                .into_iter()
                .filter_map(|(key, body)| body.map(|body| (key, body)));
            let batch: Vec<_> = match direction {
                ScanDirection::Forward => live.take(limit).collect(),
                ScanDirection::Backward => live.rev().take(limit).collect(),
            };

            match boundary {
                // every entry of a full committed batch was deleted here
                Some(last) if batch.is_empty() => range = range.resume_after(last, direction),
                _ => return Ok(batch),
            }
        }
    }

    /// Commits the buffered writes.
    ///
    /// Returns the new committed version, or the snapshot version for a
    /// transaction that wrote nothing. On `Conflict` the transaction is
    /// aborted; on `Failed` nothing was applied.
    pub fn commit(&mut self) -> DepotResult<Version> {
        self.ensure_active()?;
        self.state = TransactionState::Committing;
        let stats = self.manager.counters();

        if self.is_read_only() {
            self.finish(TransactionState::Committed);
            stats.committed.fetch_add(1, Ordering::Relaxed);
            return Ok(self.snapshot);
        }

        let writes = self.write_count();
        let result = self.manager.commit_writes(
            self.id,
            self.snapshot,
            self.isolation,
            &self.writes,
            &self.reads,
            &self.scanned,
        );
        match &result {
            Ok(version) => {
                self.finish(TransactionState::Committed);
                stats.committed.fetch_add(1, Ordering::Relaxed);
                debug!(txn = %self.id, version = %version, writes, "Transaction committed");
            }
            Err(DepotError::Failed { .. }) => {
                self.finish(TransactionState::Failed);
                stats.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                if e.is_retryable() {
                    stats.conflicts.fetch_add(1, Ordering::Relaxed);
                }
                self.finish(TransactionState::Aborted);
                stats.aborted.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Aborts the transaction, discarding its writes. Aborting an ended
    /// transaction does nothing.
    pub fn abort(&mut self) {
        if self.state.is_ended() {
            return;
        }
        self.finish(TransactionState::Aborted);
        self.manager
            .counters()
            .aborted
            .fetch_add(1, Ordering::Relaxed);
        debug!(txn = %self.id, "Transaction aborted");
    }

    fn finish(&mut self, state: TransactionState) {
        self.state = state;
        self.pin = None;
        self.writes.clear();
        self.reads.clear();
        self.scanned.clear();
        self.manager
            .counters()
            .active
            .fetch_sub(1, Ordering::Relaxed);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.abort();
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("isolation", &self.isolation)
            .field("snapshot", &self.snapshot)
            .field("writes", &self.write_count())
            .finish()
    }
}
