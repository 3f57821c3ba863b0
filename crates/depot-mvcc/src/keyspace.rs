//! Ordered versioned keyspaces.
//!
//! A keyspace maps encoded keys to [`VersionChain`]s. Tables and secondary
//! indexes each own one. Readers take the read lock for the duration of a
//! lookup or one scan batch; the commit path takes the write lock while
//! installing a transaction's mutations.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use depot_common::Version;

use crate::chain::VersionChain;
use crate::range::{KeyRange, ScanDirection};

/// Result of one garbage-collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Version entries dropped.
    pub versions_pruned: u64,
    /// Keys whose chains became empty and were removed.
    pub keys_removed: u64,
}

impl GcStats {
    /// Adds another pass's counts.
    pub fn merge(&mut self, other: GcStats) {
        self.versions_pruned += other.versions_pruned;
        self.keys_removed += other.keys_removed;
    }
}

/// One ordered, versioned keyspace.
#[derive(Debug)]
pub struct Keyspace {
    name: String,
    rows: RwLock<BTreeMap<Bytes, VersionChain>>,
    installs: AtomicU64,
}

impl Keyspace {
    /// Creates an empty keyspace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: RwLock::new(BTreeMap::new()),
            installs: AtomicU64::new(0),
        }
    }

    /// Keyspace name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads the body visible at `snapshot`.
    #[must_use]
    pub fn get_at(&self, key: &[u8], snapshot: Version) -> Option<Bytes> {
        self.rows
            .read()
            .get(key)
            .and_then(|chain| chain.visible_at(snapshot))
            .cloned()
    }

    /// Version of the newest committed entry for `key`, tombstones included.
    #[must_use]
    pub fn latest_version(&self, key: &[u8]) -> Option<Version> {
        self.rows.read().get(key).and_then(VersionChain::latest_version)
    }

    /// Returns up to `limit` live entries visible at `snapshot` within
    /// `range`, in `direction` order.
    #[must_use]
    pub fn scan_at(
        &self,
        range: &KeyRange,
        snapshot: Version,
        direction: ScanDirection,
        limit: usize,
    ) -> Vec<(Bytes, Bytes)> {
        if range.is_empty() || limit == 0 {
            return Vec::new();
        }
        let rows = self.rows.read();
        let iter = rows.range::<[u8], _>(range.as_slices());
        let visible = |(key, chain): (&Bytes, &VersionChain)| {
            chain
                .visible_at(snapshot)
                .map(|body| (key.clone(), body.clone()))
        };
        match direction {
            ScanDirection::Forward => iter.filter_map(visible).take(limit).collect(),
            ScanDirection::Backward => iter.rev().filter_map(visible).take(limit).collect(),
        }
    }

    /// First key in `range` with an entry committed after `snapshot`.
    #[must_use]
    pub fn first_modified_after(
        &self,
        range: &KeyRange,
        snapshot: Version,
    ) -> Option<(Bytes, Version)> {
        if range.is_empty() {
            return None;
        }
        self.rows
            .read()
            .range::<[u8], _>(range.as_slices())
            .find_map(|(key, chain)| {
                chain
                    .latest_version()
                    .filter(|v| *v > snapshot)
                    .map(|v| (key.clone(), v))
            })
    }

    /// Installs a batch of committed entries at `version`.
    pub fn install<I>(&self, version: Version, entries: I)
    where
        I: IntoIterator<Item = (Bytes, Option<Bytes>)>,
    {
        let mut rows = self.rows.write();
        let mut count = 0;
        for (key, body) in entries {
            rows.entry(key).or_default().push(version, body);
            count += 1;
        }
        self.installs.fetch_add(count, Ordering::Relaxed);
    }

    /// Prunes versions no snapshot at or above `watermark` can observe.
    pub fn prune(&self, watermark: Version) -> GcStats {
        let mut stats = GcStats::default();
        let mut rows = self.rows.write();
        rows.retain(|_, chain| {
            stats.versions_pruned += chain.prune(watermark) as u64;
            if chain.is_empty() {
                stats.keys_removed += 1;
                false
            } else {
                true
            }
        });
        if stats.versions_pruned > 0 {
            debug!(
                keyspace = %self.name,
                watermark = %watermark,
                pruned = stats.versions_pruned,
                removed = stats.keys_removed,
                "Pruned versions"
            );
        }
        stats
    }

    /// Number of keys with at least one entry, tombstones included.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Number of version entries across all chains.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.rows.read().values().map(VersionChain::len).sum()
    }

    /// Total entries installed since creation.
    #[must_use]
    pub fn installs(&self) -> u64 {
        self.installs.load(Ordering::Relaxed)
    }
}

/// The fixed set of keyspaces of one engine, created at open.
#[derive(Debug, Default)]
pub struct Keyspaces {
    spaces: HashMap<String, Arc<Keyspace>>,
}

impl Keyspaces {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a keyspace, or returns the existing one of that name.
    pub fn create(&mut self, name: &str) -> Arc<Keyspace> {
        Arc::clone(
            self.spaces
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(Keyspace::new(name))),
        )
    }

    /// Looks up a keyspace.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Keyspace>> {
        self.spaces.get(name)
    }

    /// Iterates keyspaces in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Keyspace>> + '_ {
        self.spaces.values()
    }

    /// Number of keyspaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    /// Returns true if there are no keyspaces.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Prunes every keyspace.
    pub fn prune(&self, watermark: Version) -> GcStats {
        let mut total = GcStats::default();
        for space in self.spaces.values() {
            total.merge(space.prune(watermark));
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &'static [u8]) -> Bytes {
        Bytes::from_static(s)
    }

    fn populated() -> Keyspace {
        let space = Keyspace::new("rev");
        space.install(
            Version::new(1),
            [(b(b"a"), Some(b(b"a1"))), (b(b"b"), Some(b(b"b1"))), (b(b"c"), Some(b(b"c1")))],
        );
        space.install(Version::new(2), [(b(b"b"), None), (b(b"d"), Some(b(b"d2")))]);
        space
    }

    #[test]
    fn test_get_at() {
        let space = populated();
        assert_eq!(space.get_at(b"a", Version::ZERO), None);
        assert_eq!(space.get_at(b"b", Version::new(1)), Some(b(b"b1")));
        assert_eq!(space.get_at(b"b", Version::new(2)), None);
        assert_eq!(space.latest_version(b"b"), Some(Version::new(2)));
        assert_eq!(space.latest_version(b"z"), None);
        assert_eq!(space.installs(), 5);
    }

    #[test]
    fn test_scan_at() {
        let space = populated();
        let keys = |entries: Vec<(Bytes, Bytes)>| -> Vec<Bytes> {
            entries.into_iter().map(|(k, _)| k).collect()
        };

        let v1 = space.scan_at(&KeyRange::all(), Version::new(1), ScanDirection::Forward, 10);
        assert_eq!(keys(v1), [b(b"a"), b(b"b"), b(b"c")]);

        let v2 = space.scan_at(&KeyRange::all(), Version::new(2), ScanDirection::Forward, 10);
        assert_eq!(keys(v2), [b(b"a"), b(b"c"), b(b"d")]);

        let back = space.scan_at(&KeyRange::all(), Version::new(2), ScanDirection::Backward, 2);
        assert_eq!(keys(back), [b(b"d"), b(b"c")]);

        let resumed = KeyRange::all().resume_after(b(b"a"), ScanDirection::Forward);
        let page = space.scan_at(&resumed, Version::new(2), ScanDirection::Forward, 1);
        assert_eq!(keys(page), [b(b"c")]);

        let empty = KeyRange::new(b(b"c"), b(b"c"));
        assert!(space.scan_at(&empty, Version::new(2), ScanDirection::Forward, 10).is_empty());
    }

    #[test]
    fn test_first_modified_after() {
        let space = populated();
        assert_eq!(
            space.first_modified_after(&KeyRange::all(), Version::new(1)),
            Some((b(b"b"), Version::new(2)))
        );
        assert_eq!(space.first_modified_after(&KeyRange::all(), Version::new(2)), None);
        assert_eq!(
            space.first_modified_after(&KeyRange::prefix(b(b"c")), Version::new(1)),
            None
        );
    }

    #[test]
    fn test_prune() {
        let space = populated();
        assert_eq!(space.version_count(), 5);

        let stats = space.prune(Version::new(2));
        assert_eq!(stats.versions_pruned, 2);
        assert_eq!(stats.keys_removed, 1);
        assert_eq!(space.key_count(), 3);
        assert_eq!(space.get_at(b"a", Version::new(2)), Some(b(b"a1")));
        assert_eq!(space.prune(Version::new(2)), GcStats::default());
    }

    #[test]
    fn test_keyspaces() {
        let mut spaces = Keyspaces::new();
        let rev = spaces.create("rev");
        let again = spaces.create("rev");
        assert!(Arc::ptr_eq(&rev, &again));
        spaces.create("rev#by_change");
        assert_eq!(spaces.len(), 2);
        assert!(spaces.get("rev#by_change").is_some());
        assert!(spaces.get("change").is_none());

        rev.install(Version::new(1), [(b(b"k"), Some(b(b"v")))]);
        rev.install(Version::new(2), [(b(b"k"), Some(b(b"w")))]);
        assert_eq!(spaces.prune(Version::new(2)).versions_pruned, 1);
    }
}
