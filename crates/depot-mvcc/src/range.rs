//! Key ranges and scan directions.

use std::ops::Bound;

use bytes::Bytes;

/// Direction of a range scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    /// Ascending key order.
    #[default]
    Forward,
    /// Descending key order.
    Backward,
}

/// Range bounds over encoded keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Start bound.
    pub start: Bound<Bytes>,
    /// End bound.
    pub end: Bound<Bytes>,
}

impl KeyRange {
    /// Creates a range covering all keys.
    #[must_use]
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// Creates a range from start (inclusive) to end (exclusive).
    #[must_use]
    pub fn new(start: Bytes, end: Bytes) -> Self {
        Self {
            start: Bound::Included(start),
            end: Bound::Excluded(end),
        }
    }

    /// Creates a range with a prefix (all keys starting with the prefix).
    #[must_use]
    pub fn prefix(prefix: Bytes) -> Self {
        if prefix.is_empty() {
            return Self::all();
        }
        let end = match successor(&prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        Self {
            start: Bound::Included(prefix),
            end,
        }
    }

    /// Narrows the range to keys strictly past `key` in scan order.
    #[must_use]
    pub fn resume_after(&self, key: Bytes, direction: ScanDirection) -> Self {
        match direction {
            ScanDirection::Forward => {
                let start = if self.is_before_start(&key) {
                    self.start.clone()
                } else {
                    Bound::Excluded(key)
                };
                Self {
                    start,
                    end: self.end.clone(),
                }
            }
            ScanDirection::Backward => {
                let end = if self.is_after_end(&key) {
                    self.end.clone()
                } else {
                    Bound::Excluded(key)
                };
                Self {
                    start: self.start.clone(),
                    end,
                }
            }
        }
    }

    /// Checks if a key is within the range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        !self.is_before_start(key) && !self.is_after_end(key)
    }

    /// Checks if a key is before the start of the range.
    #[must_use]
    pub fn is_before_start(&self, key: &[u8]) -> bool {
        match &self.start {
            Bound::Included(start) => key < &start[..],
            Bound::Excluded(start) => key <= &start[..],
            Bound::Unbounded => false,
        }
    }

    /// Checks if a key is after the end of the range.
    #[must_use]
    pub fn is_after_end(&self, key: &[u8]) -> bool {
        match &self.end {
            Bound::Included(end) => key > &end[..],
            Bound::Excluded(end) => key >= &end[..],
            Bound::Unbounded => false,
        }
    }

    /// Borrowed bounds, usable with `BTreeMap::range`.
    #[must_use]
    pub fn as_slices(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        (as_slice(&self.start), as_slice(&self.end))
    }

    /// Returns true if no key can fall in the range.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s), Bound::Excluded(e))
            | (Bound::Excluded(s), Bound::Included(e))
            | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
            _ => false,
        }
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}

fn as_slice(bound: &Bound<Bytes>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(b) => Bound::Included(&b[..]),
        Bound::Excluded(b) => Bound::Excluded(&b[..]),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Smallest key greater than every key starting with `prefix`, or `None`
/// if no such key exists (the prefix is all `0xFF`).
fn successor(prefix: &[u8]) -> Option<Bytes> {
    let mut bytes = prefix.to_vec();
    while let Some(last) = bytes.pop() {
        if last < 0xFF {
            bytes.push(last + 1);
            return Some(Bytes::from(bytes));
        }
    }
    None
}
