//! Typed table operations inside a transaction.

use std::sync::Arc;

use bytes::Bytes;

use depot_codec::{
    decode_record, encode_index_prefix, encode_key, encode_key_values, encode_prefix,
    encode_record, render_key, render_values, KeyPrefix, RowKey,
};
use depot_common::{DepotError, DepotResult, TxnId, Version};
use depot_schema::{Record, TableSchema, Value};
use depot_txn::{IsolationLevel, KeyRange, ScanDirection, Transaction, TransactionState};

use crate::engine::Engine;
use crate::index::IndexMaintainer;
use crate::scan::{BatchCursor, IndexScan, RecordScan};

/// A transaction over the engine's tables.
///
/// Reads see the transaction's snapshot plus its own writes. Writes,
/// including the index entries they imply, stay private until
/// [`commit`](Self::commit). Dropping a `Txn` without committing aborts it.
pub struct Txn<'e> {
    engine: &'e Engine,
    inner: Transaction<'e>,
}

impl<'e> Txn<'e> {
    pub(crate) fn new(engine: &'e Engine, inner: Transaction<'e>) -> Self {
        Self { engine, inner }
    }

    /// Transaction ID.
    pub fn id(&self) -> TxnId {
        self.inner.id()
    }

    /// Current state.
    pub fn state(&self) -> TransactionState {
        self.inner.state()
    }

    /// Isolation level.
    pub fn isolation(&self) -> IsolationLevel {
        self.inner.isolation()
    }

    /// Committed version this transaction reads from.
    pub fn snapshot(&self) -> Version {
        self.inner.snapshot()
    }

    /// Returns true if nothing has been written.
    pub fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    fn schema(&self, table: &str) -> DepotResult<Arc<TableSchema>> {
        self.engine.registry().lookup(table).map(Arc::clone)
    }

    fn load(&mut self, schema: &TableSchema, row_key: &RowKey) -> DepotResult<Option<Record>> {
        match self.inner.get(schema.name(), row_key)? {
            Some(body) => decode_record(schema, &body).map(Some),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Point operations
    // =========================================================================

    /// Reads the row with the given key values.
    ///
    /// Fails with `NotFound` if there is no such row.
    pub fn get(&mut self, table: &str, key: &[Value]) -> DepotResult<Record> {
        self.try_get(table, key)?
            .ok_or_else(|| DepotError::not_found(table, render_values(key)))
    }

    /// Reads the row with the given key values, if present.
    pub fn try_get(&mut self, table: &str, key: &[Value]) -> DepotResult<Option<Record>> {
        let schema = self.schema(table)?;
        let row_key = encode_key_values(&schema, key)?;
        self.load(&schema, &row_key)
    }

    /// Reads the row stored under an encoded row key, such as one yielded
    /// by an index scan.
    pub fn resolve(&mut self, table: &str, row_key: &RowKey) -> DepotResult<Record> {
        let schema = self.schema(table)?;
        self.load(&schema, row_key)?
            .ok_or_else(|| DepotError::not_found(table, render_key(&schema, row_key)))
    }

    /// Inserts or replaces a row, keyed by its key columns.
    ///
    /// Columns the record leaves out are stored as their zero value.
    pub fn put(&mut self, table: &str, record: Record) -> DepotResult<RowKey> {
        let schema = self.schema(table)?;
        schema.validate(&record)?;
        let record = complete(&schema, record);
        let row_key = encode_key(&schema, &record)?;
        let body = encode_record(&schema, &record)?;

        let old = if schema.indexes().is_empty() {
            None
        } else {
            self.load(&schema, &row_key)?
        };
        self.inner
            .put(schema.name(), row_key.as_bytes().clone(), body)?;
        IndexMaintainer::new(&schema).on_put(&mut self.inner, &row_key, old.as_ref(), &record)?;
        Ok(row_key)
    }

    /// Deletes the row with the given key values.
    ///
    /// With `strict_delete` on, deleting an absent row fails with
    /// `NotFound`; otherwise it does nothing.
    pub fn delete(&mut self, table: &str, key: &[Value]) -> DepotResult<()> {
        let deleted = self.delete_if_exists(table, key)?;
        if !deleted && self.engine.config().strict_delete {
            return Err(DepotError::not_found(table, render_values(key)));
        }
        Ok(())
    }

    /// Deletes the row with the given key values, returning whether it
    /// existed.
    pub fn delete_if_exists(&mut self, table: &str, key: &[Value]) -> DepotResult<bool> {
        let schema = self.schema(table)?;
        let row_key = encode_key_values(&schema, key)?;
        let Some(old) = self.load(&schema, &row_key)? else {
            return Ok(false);
        };
        self.inner.delete(schema.name(), row_key.as_bytes().clone())?;
        IndexMaintainer::new(&schema).on_delete(&mut self.inner, &row_key, &old)?;
        Ok(true)
    }

    // =========================================================================
    // Scans
    // =========================================================================

    /// Scans the rows whose key starts with `prefix`, in key order.
    pub fn scan(
        &mut self,
        table: &str,
        prefix: impl Into<KeyPrefix>,
        direction: ScanDirection,
    ) -> DepotResult<RecordScan<'_, 'e>> {
        self.scan_range(table, &prefix.into(), direction, None)
    }

    /// Resumes a scan strictly after `cursor`.
    pub fn scan_from(
        &mut self,
        table: &str,
        prefix: impl Into<KeyPrefix>,
        direction: ScanDirection,
        cursor: &RowKey,
    ) -> DepotResult<RecordScan<'_, 'e>> {
        self.scan_range(table, &prefix.into(), direction, Some(cursor))
    }

    fn scan_range(
        &mut self,
        table: &str,
        prefix: &KeyPrefix,
        direction: ScanDirection,
        cursor: Option<&RowKey>,
    ) -> DepotResult<RecordScan<'_, 'e>> {
        let schema = self.schema(table)?;
        let mut range = KeyRange::prefix(encode_prefix(&schema, prefix)?);
        if let Some(cursor) = cursor {
            range = range.resume_after(cursor.as_bytes().clone(), direction);
        }
        let batch_size = self.engine.config().scan_batch_size;
        let cursor = BatchCursor::new(
            &mut self.inner,
            schema.name().to_owned(),
            range,
            direction,
            batch_size,
        );
        Ok(RecordScan::new(cursor, schema))
    }

    /// Scans an index for entries whose alternate key starts with `prefix`,
    /// yielding primary row keys in index order.
    pub fn index_scan(
        &mut self,
        table: &str,
        index: &str,
        prefix: impl Into<KeyPrefix>,
        direction: ScanDirection,
    ) -> DepotResult<IndexScan<'_, 'e>> {
        self.index_scan_range(table, index, &prefix.into(), direction, None)
    }

    /// Resumes an index scan strictly after the entry `cursor`.
    pub fn index_scan_from(
        &mut self,
        table: &str,
        index: &str,
        prefix: impl Into<KeyPrefix>,
        direction: ScanDirection,
        cursor: &[u8],
    ) -> DepotResult<IndexScan<'_, 'e>> {
        self.index_scan_range(table, index, &prefix.into(), direction, Some(cursor))
    }

    fn index_scan_range(
        &mut self,
        table: &str,
        index: &str,
        prefix: &KeyPrefix,
        direction: ScanDirection,
        cursor: Option<&[u8]>,
    ) -> DepotResult<IndexScan<'_, 'e>> {
        let schema = self.schema(table)?;
        let index_def = schema.index(index)?;
        let mut range = KeyRange::prefix(encode_index_prefix(&schema, index_def, prefix)?);
        if let Some(cursor) = cursor {
            range = range.resume_after(Bytes::copy_from_slice(cursor), direction);
        }
        let batch_size = self.engine.config().scan_batch_size;
        let cursor = BatchCursor::new(
            &mut self.inner,
            schema.index_keyspace(index),
            range,
            direction,
            batch_size,
        );
        Ok(IndexScan::new(cursor))
    }

    /// Reads every row an index files under `prefix`, in index order.
    pub fn index_lookup(
        &mut self,
        table: &str,
        index: &str,
        prefix: impl Into<KeyPrefix>,
    ) -> DepotResult<Vec<Record>> {
        let row_keys = self
            .index_scan(table, index, prefix, ScanDirection::Forward)?
            .collect::<DepotResult<Vec<_>>>()?;
        row_keys
            .iter()
            .map(|row_key| self.resolve(table, row_key))
            .collect()
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Commits the transaction, returning the new committed version (or the
    /// snapshot version if nothing was written).
    pub fn commit(mut self) -> DepotResult<Version> {
        self.inner.commit()
    }

    /// Aborts the transaction, discarding its writes.
    pub fn abort(mut self) {
        self.inner.abort();
    }
}

impl std::fmt::Debug for Txn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Txn").field(&self.inner).finish()
    }
}

/// Fills in absent columns with their zero value.
fn complete(schema: &TableSchema, mut record: Record) -> Record {
    for column in schema.columns() {
        if !record.contains(&column.name) {
            record.set(column.name.clone(), Value::zero(column.ty));
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;
    use depot_common::ErrorCode;
    use depot_schema::{ColumnType, IndexDef, SchemaRegistry};

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                TableSchema::builder("rev")
                    .key("depotFile", ColumnType::String)
                    .key("depotRev", ColumnType::Int32)
                    .column("change", ColumnType::Int32)
                    .column("digest", ColumnType::Bytes)
                    .index(IndexDef::columns("by_change", ["change"]))
                    .build(),
            )
            .unwrap();
        registry
            .register(
                TableSchema::builder("user")
                    .key("user", ColumnType::String)
                    .column("email", ColumnType::String)
                    .index(IndexDef::custom("by_domain", |record: &Record| {
                        let email = record.get_str("email").unwrap_or_default();
                        let domain = email.rsplit_once('@').map_or("", |(_, d)| d);
                        vec![Value::from(domain.to_ascii_lowercase())]
                    }))
                    .build(),
            )
            .unwrap();
        registry
    }

    fn engine() -> Engine {
        Engine::open(EngineConfig::new().with_scan_batch_size(2), registry()).unwrap()
    }

    fn rev(file: &str, rev: i32, change: i32) -> Record {
        Record::new()
            .with("depotFile", file)
            .with("depotRev", rev)
            .with("change", change)
    }

    fn key(file: &str, rev: i32) -> Vec<Value> {
        vec![Value::from(file), Value::from(rev)]
    }

    fn files(records: &[Record]) -> Vec<(String, i32)> {
        records
            .iter()
            .map(|r| {
                (
                    r.get_str("depotFile").unwrap_or_default().to_owned(),
                    r.get_i32("depotRev").unwrap_or_default(),
                )
            })
            .collect()
    }

    fn seed(engine: &Engine) {
        let mut txn = engine.begin();
        for (file, r, change) in [
            ("//depot/a", 1, 100),
            ("//depot/a", 2, 101),
            ("//depot/ab", 1, 102),
            ("//depot/b/x", 1, 101),
            ("//depot/b/y", 3, 103),
        ] {
            txn.put("rev", rev(file, r, change)).unwrap();
        }
        txn.commit().unwrap();
    }

    #[test]
    fn test_put_get_and_zero_defaults() {
        let engine = engine();
        let mut txn = engine.begin();
        txn.put("rev", rev("//depot/a", 1, 100)).unwrap();
        assert_eq!(txn.commit().unwrap(), Version::new(1));

        let mut txn = engine.begin();
        let got = txn.get("rev", &key("//depot/a", 1)).unwrap();
        assert_eq!(got.get_i32("change"), Some(100));
        assert_eq!(got.get_bytes("digest").map(|b| b.len()), Some(0));

        let err = txn.get("rev", &key("//depot/a", 2)).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("(\"//depot/a\", 2)"));
        assert!(txn.try_get("rev", &key("//depot/a", 2)).unwrap().is_none());
    }

    #[test]
    fn test_put_validates() {
        let engine = engine();
        let mut txn = engine.begin();

        let err = txn
            .put("rev", rev("//depot/a", 1, 1).with("bogus", 1))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownColumn);

        let err = txn
            .put("rev", rev("//depot/a", 1, 1).with("change", 1i64))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);

        let err = txn.put("rev", rev("//depot/\0a", 1, 1)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidKey);

        let err = txn.put("nope", Record::new()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownTable);
        assert!(txn.is_read_only());
    }

    #[test]
    fn test_delete_strict_and_lenient() {
        let engine = engine();
        seed(&engine);

        let mut txn = engine.begin();
        let err = txn.delete("rev", &key("//depot/zzz", 1)).unwrap_err();
        assert!(err.is_not_found());
        txn.delete("rev", &key("//depot/a", 1)).unwrap();
        assert!(!txn.delete_if_exists("rev", &key("//depot/a", 1)).unwrap());
        assert!(txn.try_get("rev", &key("//depot/a", 1)).unwrap().is_none());
        txn.commit().unwrap();

        let lenient = Engine::open(EngineConfig::new().with_strict_delete(false), registry()).unwrap();
        let mut txn = lenient.begin();
        txn.delete("rev", &key("//depot/zzz", 1)).unwrap();
        assert!(txn.is_read_only());
    }

    #[test]
    fn test_scan_prefixes() {
        let engine = engine();
        seed(&engine);
        let mut txn = engine.begin();

        let all: Vec<Record> = txn
            .scan("rev", KeyPrefix::all(), ScanDirection::Forward)
            .unwrap()
            .collect::<DepotResult<_>>()
            .unwrap();
        assert_eq!(all.len(), 5);

        let exact: Vec<Record> = txn
            .scan("rev", KeyPrefix::new(["//depot/a"]), ScanDirection::Forward)
            .unwrap()
            .collect::<DepotResult<_>>()
            .unwrap();
        assert_eq!(
            files(&exact),
            vec![("//depot/a".to_owned(), 1), ("//depot/a".to_owned(), 2)]
        );

        let tree: Vec<Record> = txn
            .scan("rev", KeyPrefix::partial("//depot/b/"), ScanDirection::Backward)
            .unwrap()
            .collect::<DepotResult<_>>()
            .unwrap();
        assert_eq!(
            files(&tree),
            vec![("//depot/b/y".to_owned(), 3), ("//depot/b/x".to_owned(), 1)]
        );

        let err = txn
            .scan("rev", KeyPrefix::new([Value::from(1)]), ScanDirection::Forward)
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
    }

    #[test]
    fn test_scan_sees_own_writes_and_resumes() {
        let engine = engine();
        seed(&engine);
        let mut txn = engine.begin();
        txn.put("rev", rev("//depot/aa", 1, 200)).unwrap();
        txn.delete("rev", &key("//depot/a", 2)).unwrap();

        let mut scan = txn
            .scan("rev", KeyPrefix::all(), ScanDirection::Forward)
            .unwrap();
        let first: Vec<Record> = scan.by_ref().take(2).collect::<DepotResult<_>>().unwrap();
        let cursor = scan.cursor().unwrap();
        assert_eq!(
            files(&first),
            vec![("//depot/a".to_owned(), 1), ("//depot/aa".to_owned(), 1)]
        );

        let rest: Vec<Record> = txn
            .scan_from("rev", KeyPrefix::all(), ScanDirection::Forward, &cursor)
            .unwrap()
            .collect::<DepotResult<_>>()
            .unwrap();
        assert_eq!(
            files(&rest),
            vec![
                ("//depot/ab".to_owned(), 1),
                ("//depot/b/x".to_owned(), 1),
                ("//depot/b/y".to_owned(), 3),
            ]
        );
    }

    #[test]
    fn test_index_follows_updates_and_deletes() {
        let engine = engine();
        seed(&engine);

        let mut txn = engine.begin();
        let by_101 = txn.index_lookup("rev", "by_change", KeyPrefix::new([101])).unwrap();
        assert_eq!(
            files(&by_101),
            vec![("//depot/a".to_owned(), 2), ("//depot/b/x".to_owned(), 1)]
        );

        txn.put("rev", rev("//depot/a", 2, 150)).unwrap();
        txn.delete("rev", &key("//depot/b/x", 1)).unwrap();
        assert!(txn.index_lookup("rev", "by_change", KeyPrefix::new([101])).unwrap().is_empty());
        assert_eq!(txn.index_lookup("rev", "by_change", KeyPrefix::new([150])).unwrap().len(), 1);
        txn.commit().unwrap();

        let report = engine.verify_indexes().unwrap();
        assert!(report.is_consistent(), "{:?}", report.problems);
        assert_eq!(report.rows_checked, 4);
        assert_eq!(report.entries_checked, 4);
    }

    #[test]
    fn test_index_scan_order_and_cursor() {
        let engine = engine();
        seed(&engine);
        let mut txn = engine.begin();

        let mut scan = txn
            .index_scan("rev", "by_change", KeyPrefix::all(), ScanDirection::Backward)
            .unwrap();
        let newest = scan.next().unwrap().unwrap();
        let cursor = scan.cursor().unwrap();
        drop(scan);
        assert_eq!(
            txn.resolve("rev", &newest).unwrap().get_i32("change"),
            Some(103)
        );

        let rest = txn
            .index_scan_from("rev", "by_change", KeyPrefix::all(), ScanDirection::Backward, &cursor)
            .unwrap()
            .count();
        assert_eq!(rest, 4);

        let err = txn
            .index_scan("rev", "by_user", KeyPrefix::all(), ScanDirection::Forward)
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::UnknownIndex);
    }

    #[test]
    fn test_index_prefix_type_mismatch() {
        let engine = engine();
        seed(&engine);
        let mut txn = engine.begin();

        assert_eq!(
            txn.index_lookup("rev", "by_change", KeyPrefix::new([100])).unwrap().len(),
            1
        );
        let err = txn
            .index_lookup("rev", "by_change", KeyPrefix::new([100i64]))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
        let err = txn
            .index_scan("rev", "by_change", KeyPrefix::partial("1"), ScanDirection::Forward)
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
        assert!(txn
            .index_lookup("user", "by_domain", KeyPrefix::new(["example.com"]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_custom_extractor_index() {
        let engine = engine();
        let mut txn = engine.begin();
        for (user, email) in [
            ("alice", "alice@Example.com"),
            ("bob", "bob@other.org"),
            ("carol", "carol@example.com"),
        ] {
            txn.put("user", Record::new().with("user", user).with("email", email))
                .unwrap();
        }
        txn.commit().unwrap();

        let mut txn = engine.begin();
        let users: Vec<String> = txn
            .index_lookup("user", "by_domain", KeyPrefix::new(["example.com"]))
            .unwrap()
            .iter()
            .filter_map(|r| r.get_str("user").map(str::to_owned))
            .collect();
        assert_eq!(users, vec!["alice", "carol"]);
        assert!(engine.verify_indexes().unwrap().is_consistent());
    }

    #[test]
    fn test_conflict_renders_row_key() {
        let engine = engine();
        let mut t1 = engine.begin();
        let mut t2 = engine.begin();
        t1.put("rev", rev("//depot/a", 1, 1)).unwrap();
        t2.put("rev", rev("//depot/a", 1, 2)).unwrap();
        t1.commit().unwrap();

        let err = t2.commit().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(
            err.to_string(),
            "conflict on row (\"//depot/a\", 1) in table 'rev': committed at v1"
        );
    }

    #[test]
    fn test_run_retries_conflicts() {
        let engine = engine();
        seed(&engine);
        let mut attempts = 0;

        let change = engine
            .run(|txn| {
                attempts += 1;
                let current = txn.get("rev", &key("//depot/a", 1))?;
                let next = current.get_i32("change").unwrap_or_default() + 1;
                if attempts == 1 {
                    let mut other = engine.begin();
                    other.put("rev", rev("//depot/a", 1, 500))?;
                    other.commit()?;
                }
                txn.put("rev", rev("//depot/a", 1, next))?;
                Ok(next)
            })
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(change, 501);
        assert_eq!(engine.stats().transactions.conflicts, 1);
    }

    #[test]
    fn test_run_gives_up() {
        let engine =
            Engine::open(EngineConfig::new().with_max_commit_retries(2), registry()).unwrap();
        let mut attempts = 0;
        let err = engine
            .run(|txn| {
                attempts += 1;
                txn.put("rev", rev("//depot/a", 1, attempts))?;
                let mut other = engine.begin();
                other.put("rev", rev("//depot/a", 1, -1))?;
                other.commit()?;
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(attempts, 2);

        let err = engine
            .run(|txn| txn.get("rev", &key("//depot/none", 1)))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
