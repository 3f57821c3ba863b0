//! Lazy scans over tables and indexes.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;

use depot_codec::{decode_record, RowKey};
use depot_common::DepotResult;
use depot_schema::{Record, TableSchema};
use depot_txn::{KeyRange, ScanDirection, Transaction};

/// Pulls entries of one keyspace from a transaction in batches.
pub(crate) struct BatchCursor<'t, 'e> {
    txn: &'t mut Transaction<'e>,
    keyspace: String,
    range: KeyRange,
    direction: ScanDirection,
    batch_size: usize,
    buffer: VecDeque<(Bytes, Bytes)>,
    last: Option<Bytes>,
    done: bool,
}

impl<'t, 'e> BatchCursor<'t, 'e> {
    pub(crate) fn new(
        txn: &'t mut Transaction<'e>,
        keyspace: String,
        range: KeyRange,
        direction: ScanDirection,
        batch_size: usize,
    ) -> Self {
        Self {
            txn,
            keyspace,
            range,
            direction,
            batch_size,
            buffer: VecDeque::new(),
            last: None,
            done: false,
        }
    }

    /// Key of the entry most recently returned.
    pub(crate) fn last_key(&self) -> Option<&Bytes> {
        self.last.as_ref()
    }

    pub(crate) fn next_entry(&mut self) -> Option<DepotResult<(Bytes, Bytes)>> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.refill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        let entry = self.buffer.pop_front()?;
        self.last = Some(entry.0.clone());
        Some(Ok(entry))
    }

    fn refill(&mut self) -> DepotResult<()> {
        let batch = self
            .txn
            .scan_batch(&self.keyspace, &self.range, self.direction, self.batch_size)?;
        match batch.last() {
            Some((key, _)) => self.range = self.range.resume_after(key.clone(), self.direction),
            None => self.done = true,
        }
        self.buffer.extend(batch);
        Ok(())
    }
}

/// Lazy iterator over the records of a table, in row key order.
///
/// Records are decoded as they are pulled; a decode failure is yielded as
/// an error and the scan can continue past it.
pub struct RecordScan<'t, 'e> {
    cursor: BatchCursor<'t, 'e>,
    schema: Arc<TableSchema>,
}

impl<'t, 'e> RecordScan<'t, 'e> {
    pub(crate) fn new(cursor: BatchCursor<'t, 'e>, schema: Arc<TableSchema>) -> Self {
        Self { cursor, schema }
    }

    /// Row key of the last record returned. Pass it to `scan_from` to
    /// resume strictly after it.
    pub fn cursor(&self) -> Option<RowKey> {
        self.cursor.last_key().cloned().map(RowKey::from_bytes)
    }
}

impl Iterator for RecordScan<'_, '_> {
    type Item = DepotResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.cursor.next_entry()?;
        Some(entry.and_then(|(_, body)| decode_record(&self.schema, &body)))
    }
}

/// Lazy iterator over the primary row keys an index points at, in index
/// order.
pub struct IndexScan<'t, 'e> {
    cursor: BatchCursor<'t, 'e>,
}

impl<'t, 'e> IndexScan<'t, 'e> {
    pub(crate) fn new(cursor: BatchCursor<'t, 'e>) -> Self {
        Self { cursor }
    }

    /// Encoded index entry most recently returned. Pass it to
    /// `index_scan_from` to resume strictly after it.
    pub fn cursor(&self) -> Option<Bytes> {
        self.cursor.last_key().cloned()
    }
}

impl Iterator for IndexScan<'_, '_> {
    type Item = DepotResult<RowKey>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.cursor.next_entry()?;
        Some(entry.map(|(_, row_key)| RowKey::from_bytes(row_key)))
    }
}
