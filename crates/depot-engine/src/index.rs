//! Secondary index maintenance and verification.
//!
//! An index entry's key is the extracted alternate key followed by the
//! primary row key; its body is the primary row key. Entries live in the
//! keyspace `{table}#{index}` and are written through the same transaction
//! as the row they describe.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use tracing::{debug, warn};

use depot_codec::{decode_record, encode_index_entry, render_key, RowKey};
use depot_common::{DepotError, DepotResult};
use depot_schema::{IndexDef, Record, TableSchema};
use depot_txn::{KeyRange, ScanDirection, Transaction};

use crate::scan::BatchCursor;

/// Keeps a table's indexes in step with its rows.
pub(crate) struct IndexMaintainer<'a> {
    schema: &'a TableSchema,
}

impl<'a> IndexMaintainer<'a> {
    pub(crate) fn new(schema: &'a TableSchema) -> Self {
        Self { schema }
    }

    fn entry(&self, index: &IndexDef, record: &Record, row_key: &RowKey) -> DepotResult<Bytes> {
        encode_index_entry(
            self.schema.name(),
            &index.extract(self.schema, record),
            row_key,
        )
    }

    /// Replaces `old`'s entries with `new`'s.
    pub(crate) fn on_put(
        &self,
        txn: &mut Transaction<'_>,
        row_key: &RowKey,
        old: Option<&Record>,
        new: &Record,
    ) -> DepotResult<()> {
        for index in self.schema.indexes() {
            let keyspace = self.schema.index_keyspace(index.name());
            let added = self.entry(index, new, row_key)?;
            if let Some(old) = old {
                let removed = self.entry(index, old, row_key)?;
                if removed == added {
                    continue;
                }
                txn.delete(&keyspace, removed)?;
            }
            txn.put(&keyspace, added, row_key.as_bytes().clone())?;
        }
        Ok(())
    }

    /// Removes `old`'s entries.
    pub(crate) fn on_delete(
        &self,
        txn: &mut Transaction<'_>,
        row_key: &RowKey,
        old: &Record,
    ) -> DepotResult<()> {
        for index in self.schema.indexes() {
            let keyspace = self.schema.index_keyspace(index.name());
            txn.delete(&keyspace, self.entry(index, old, row_key)?)?;
        }
        Ok(())
    }
}

// =============================================================================
// Verification
// =============================================================================

/// How an index disagrees with its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    /// A row has no entry in the index.
    Missing,
    /// An entry has no matching row.
    Orphaned,
    /// An entry's body is not the row key it is filed under.
    Mismatched,
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemKind::Missing => write!(f, "missing entry"),
            ProblemKind::Orphaned => write!(f, "orphaned entry"),
            ProblemKind::Mismatched => write!(f, "mismatched entry"),
        }
    }
}

/// One disagreement found by [`Engine::verify_indexes`](crate::Engine::verify_indexes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexProblem {
    /// Table name.
    pub table: String,
    /// Index name.
    pub index: String,
    /// What is wrong.
    pub kind: ProblemKind,
    /// Rendered primary row key.
    pub row: String,
}

impl fmt::Display for IndexProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in {}#{} for row {}",
            self.kind, self.table, self.index, self.row
        )
    }
}

/// Result of checking every index against committed rows.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    /// Indexes checked.
    pub indexes_checked: usize,
    /// Rows visited.
    pub rows_checked: usize,
    /// Index entries visited.
    pub entries_checked: usize,
    /// Disagreements found.
    pub problems: Vec<IndexProblem>,
}

impl IndexReport {
    /// Returns true if no problems were found.
    pub fn is_consistent(&self) -> bool {
        self.problems.is_empty()
    }

    /// Converts the first problem into an `IndexInconsistent` error.
    pub fn into_result(self) -> DepotResult<Self> {
        match self.problems.first() {
            None => Ok(self),
            Some(problem) => Err(DepotError::IndexInconsistent {
                table: problem.table.clone(),
                index: problem.index.clone(),
                reason: format!(
                    "{} for row {} ({} problems in total)",
                    problem.kind,
                    problem.row,
                    self.problems.len()
                ),
            }),
        }
    }
}

/// Checks every index of `schema` against its rows, as seen by `txn`.
pub(crate) fn verify_table(
    txn: &mut Transaction<'_>,
    schema: &TableSchema,
    batch_size: usize,
    report: &mut IndexReport,
) -> DepotResult<()> {
    if schema.indexes().is_empty() {
        return Ok(());
    }
    let maintainer = IndexMaintainer::new(schema);
    let problems_before = report.problems.len();

    // expected entries per index: entry key -> row key
    let mut expected: Vec<BTreeMap<Bytes, RowKey>> = vec![BTreeMap::new(); schema.indexes().len()];
    let mut rows = BatchCursor::new(
        txn,
        schema.name().to_owned(),
        KeyRange::all(),
        ScanDirection::Forward,
        batch_size,
    );
    while let Some(entry) = rows.next_entry() {
        let (key, body) = entry?;
        let record = decode_record(schema, &body)?;
        let row_key = RowKey::from_bytes(key);
        for (index, entries) in schema.indexes().iter().zip(expected.iter_mut()) {
            entries.insert(maintainer.entry(index, &record, &row_key)?, row_key.clone());
        }
        report.rows_checked += 1;
    }

    for (index, mut entries) in schema.indexes().iter().zip(expected) {
        let problem = |kind, row: &[u8]| IndexProblem {
            table: schema.name().to_owned(),
            index: index.name().to_owned(),
            kind,
            row: render_key(schema, row),
        };
        let mut found = BatchCursor::new(
            txn,
            schema.index_keyspace(index.name()),
            KeyRange::all(),
            ScanDirection::Forward,
            batch_size,
        );
        let mut count = 0usize;
        while let Some(entry) = found.next_entry() {
            let (key, body) = entry?;
            count += 1;
            match entries.remove(&key) {
                Some(row_key) if row_key.as_bytes() == &body => {}
                Some(row_key) => report
                    .problems
                    .push(problem(ProblemKind::Mismatched, &row_key[..])),
                None => report.problems.push(problem(ProblemKind::Orphaned, &body[..])),
            }
        }
        for row_key in entries.into_values() {
            report.problems.push(problem(ProblemKind::Missing, &row_key[..]));
        }
        report.entries_checked += count;
        report.indexes_checked += 1;
        debug!(
            table = schema.name(),
            index = index.name(),
            entries = count,
            "Verified index"
        );
    }

    let found = report.problems.len() - problems_before;
    if found > 0 {
        warn!(table = schema.name(), problems = found, "Index problems found");
    }
    Ok(())
}
