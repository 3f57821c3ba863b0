//! Isolation levels and active snapshot tracking.
//!
//! # Read Visibility Rules
//!
//! A transaction reading at snapshot `S` sees, for every key, the newest
//! committed version `<= S`. It always sees its own buffered writes.
//!
//! The tracker counts open snapshots so garbage collection never prunes a
//! version some open transaction can still observe.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use depot_common::Version;

/// Isolation level for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read committed: each read sees the latest committed data. Write
    /// conflicts are still checked against the begin snapshot.
    ReadCommitted,
    /// Snapshot isolation: sees data as of transaction start.
    #[default]
    SnapshotIsolation,
    /// Snapshot isolation plus validation of the read set and scanned
    /// ranges at commit.
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadCommitted => "read_committed",
            Self::SnapshotIsolation => "snapshot_isolation",
            Self::Serializable => "serializable",
        };
        f.write_str(name)
    }
}

/// Reference counts of open snapshots.
#[derive(Debug, Default)]
pub struct SnapshotTracker {
    active: Mutex<BTreeMap<Version, usize>>,
}

impl SnapshotTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an open snapshot. The snapshot is released when the
    /// returned pin is dropped.
    pub fn pin(&self, version: Version) -> SnapshotPin<'_> {
        self.pin_with(|| version)
    }

    /// Registers the snapshot returned by `current`, read while the tracker
    /// is locked so a concurrent [`watermark`](Self::watermark) cannot pass it.
    pub fn pin_with(&self, current: impl FnOnce() -> Version) -> SnapshotPin<'_> {
        let mut active = self.active.lock();
        let version = current();
        *active.entry(version).or_insert(0) += 1;
        SnapshotPin {
            tracker: self,
            version,
        }
    }

    fn release(&self, version: Version) {
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(&version) {
            *count -= 1;
            if *count == 0 {
                active.remove(&version);
            }
        }
    }

    /// Oldest open snapshot, if any.
    #[must_use]
    pub fn oldest(&self) -> Option<Version> {
        self.active.lock().keys().next().copied()
    }

    /// Garbage-collection watermark: the oldest open snapshot, or `current`
    /// when none is open. `current` must be read before calling.
    #[must_use]
    pub fn watermark(&self, current: Version) -> Version {
        self.oldest().map_or(current, |oldest| oldest.min(current))
    }

    /// Number of open snapshots.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.lock().values().sum()
    }
}

/// RAII registration of an open snapshot.
pub struct SnapshotPin<'a> {
    tracker: &'a SnapshotTracker,
    version: Version,
}

impl SnapshotPin<'_> {
    /// The pinned version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }
}

impl fmt::Debug for SnapshotPin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SnapshotPin").field(&self.version).finish()
    }
}

impl Drop for SnapshotPin<'_> {
    fn drop(&mut self) {
        self.tracker.release(self.version);
    }
}
