//! Version chains.
//!
//! ```text
//! key "//depot/a\0\x80\0\0\x01"
//! ┌───────────┬───────────┬───────────┐
//! │ v3: body  │ v7: None  │ v9: body  │   oldest → newest
//! └───────────┴───────────┴───────────┘
//! read_at(v8) → None (tombstone), read_at(v5) → v3 body
//! ```

use bytes::Bytes;

use depot_common::Version;

/// Committed versions of one key, oldest first.
///
/// `None` is a tombstone: the key was deleted at that version.
#[derive(Debug, Clone, Default)]
pub struct VersionChain {
    entries: Vec<(Version, Option<Bytes>)>,
}

impl VersionChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry visible at `snapshot`: the newest with version
    /// `<= snapshot`. The inner `Option` is `None` for a tombstone.
    #[must_use]
    pub fn read_at(&self, snapshot: Version) -> Option<&Option<Bytes>> {
        self.entries
            .iter()
            .rev()
            .find(|(v, _)| *v <= snapshot)
            .map(|(_, body)| body)
    }

    /// Returns the visible body at `snapshot`, treating tombstones as absent.
    #[must_use]
    pub fn visible_at(&self, snapshot: Version) -> Option<&Bytes> {
        self.read_at(snapshot).and_then(Option::as_ref)
    }

    /// Version of the newest entry.
    #[must_use]
    pub fn latest_version(&self) -> Option<Version> {
        self.entries.last().map(|(v, _)| *v)
    }

    /// Appends a committed entry.
    ///
    /// Versions are installed in commit order; re-installing the newest
    /// version replaces it.
    pub fn push(&mut self, version: Version, body: Option<Bytes>) {
        match self.entries.last_mut() {
            Some((last, slot)) if *last == version => *slot = body,
            _ => {
                debug_assert!(self.latest_version().map_or(true, |last| last < version));
                self.entries.push((version, body));
            }
        }
    }

    /// Drops entries no snapshot at or above `watermark` can observe.
    ///
    /// Keeps the newest entry `<= watermark` plus everything newer; that
    /// entry is dropped too if it is a tombstone. Returns the number of
    /// entries removed.
    pub fn prune(&mut self, watermark: Version) -> usize {
        let Some(newest_visible) = self.entries.iter().rposition(|(v, _)| *v <= watermark) else {
            return 0;
        };
        let mut cut = newest_visible;
        if self.entries[newest_visible].1.is_none() {
            cut += 1;
        }
        self.entries.drain(..cut);
        cut
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the chain holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
