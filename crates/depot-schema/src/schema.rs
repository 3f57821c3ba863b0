//! Table schemas and secondary index declarations.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

use siphasher::sip::SipHasher13;

use depot_common::constants::{INDEX_KEYSPACE_SEPARATOR, MAX_COLUMNS};
use depot_common::{DepotError, DepotResult};

use crate::column::{ColumnDef, ColumnType};
use crate::value::{Record, Value};

/// Fixed SipHash keys for schema fingerprints. Changing these invalidates
/// every stored record.
const FINGERPRINT_K0: u64 = 0x6465_706f_7464_6221;
const FINGERPRINT_K1: u64 = 0x7265_636f_7264_7331;

// =============================================================================
// Index Declarations
// =============================================================================

/// Custom alternate-key function.
pub type ExtractFn = dyn Fn(&Record) -> Vec<Value> + Send + Sync;

/// How an index derives its alternate key from a record.
#[derive(Clone)]
pub enum Extractor {
    /// Ordered list of column names; absent columns contribute their zero value.
    Columns(Vec<String>),
    /// Arbitrary function registered in code.
    Custom(Arc<ExtractFn>),
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Columns(columns) => f.debug_tuple("Columns").field(columns).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A secondary index declaration.
#[derive(Debug, Clone)]
pub struct IndexDef {
    name: String,
    extractor: Extractor,
}

impl IndexDef {
    /// Declares an index over an ordered list of columns.
    pub fn columns<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            extractor: Extractor::Columns(columns.into_iter().map(Into::into).collect()),
        }
    }

    /// Declares an index with a custom extractor.
    pub fn custom<F>(name: impl Into<String>, extract: F) -> Self
    where
        F: Fn(&Record) -> Vec<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            extractor: Extractor::Custom(Arc::new(extract)),
        }
    }

    /// Index name, unique within its table.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The extractor.
    #[must_use]
    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Computes the alternate key of a record.
    #[must_use]
    pub fn extract(&self, schema: &TableSchema, record: &Record) -> Vec<Value> {
        match &self.extractor {
            Extractor::Columns(columns) => columns
                .iter()
                .map(|name| match record.get(name) {
                    Some(value) => value.clone(),
                    None => schema
                        .column(name)
                        .map_or(Value::Int32(0), |c| Value::zero(c.ty)),
                })
                .collect(),
            Extractor::Custom(f) => f(record),
        }
    }
}

// =============================================================================
// Table Schema
// =============================================================================

/// Declaration of one table.
///
/// Derived lookups (key positions, name index, fingerprint) are computed on
/// construction; schemas are immutable afterwards.
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    description: Option<String>,
    columns: Vec<ColumnDef>,
    indexes: Vec<IndexDef>,
    key_positions: Vec<usize>,
    by_name: HashMap<String, usize>,
    fingerprint: u64,
}

impl TableSchema {
    /// Creates a schema from its parts.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>, indexes: Vec<IndexDef>) -> Self {
        let key_positions = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.key)
            .map(|(i, _)| i)
            .collect();
        let mut by_name = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            by_name.entry(column.name.clone()).or_insert(i);
        }
        let fingerprint = fingerprint(&columns);
        Self {
            name: name.into(),
            description: None,
            columns,
            indexes,
            key_positions,
            by_name,
            fingerprint,
        }
    }

    /// Starts a builder.
    pub fn builder(name: impl Into<String>) -> TableSchemaBuilder {
        TableSchemaBuilder {
            name: name.into(),
            description: None,
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form description from the manifest.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// All columns in declared order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.by_name.get(name).map(|&i| &self.columns[i])
    }

    /// Position of a column in declared order.
    #[must_use]
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Positions of the key columns in declared order.
    #[must_use]
    pub fn key_positions(&self) -> &[usize] {
        &self.key_positions
    }

    /// Key columns in declared order.
    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnDef> + '_ {
        self.key_positions.iter().map(move |&i| &self.columns[i])
    }

    /// Declared secondary indexes.
    #[must_use]
    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    /// Looks up an index by name.
    pub fn index(&self, name: &str) -> DepotResult<&IndexDef> {
        self.indexes
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| DepotError::UnknownIndex {
                table: self.name.clone(),
                index: name.to_owned(),
            })
    }

    /// Name of the keyspace holding an index's entries.
    #[must_use]
    pub fn index_keyspace(&self, index: &str) -> String {
        format!("{}{INDEX_KEYSPACE_SEPARATOR}{index}", self.name)
    }

    /// 64-bit digest of the ordered column definitions.
    #[must_use]
    pub const fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Returns a record's value for a column, or the column's zero value.
    #[must_use]
    pub fn value_or_zero(&self, record: &Record, position: usize) -> Value {
        let column = &self.columns[position];
        record
            .get(&column.name)
            .cloned()
            .unwrap_or_else(|| Value::zero(column.ty))
    }

    /// Checks the declaration itself.
    pub fn validate_definition(&self) -> DepotResult<()> {
        let invalid = |reason: String| DepotError::invalid_schema(self.name.clone(), reason);

        if self.name.is_empty() {
            return Err(invalid("table name is empty".into()));
        }
        if self.name.contains(INDEX_KEYSPACE_SEPARATOR) {
            return Err(invalid(format!(
                "table name must not contain '{INDEX_KEYSPACE_SEPARATOR}'"
            )));
        }
        if self.columns.len() > MAX_COLUMNS {
            return Err(invalid(format!("{} columns exceed the limit", self.columns.len())));
        }
        if self.key_positions.is_empty() {
            return Err(invalid("no key column".into()));
        }
        if self.by_name.len() != self.columns.len() {
            let mut seen = HashSet::new();
            let duplicate = self
                .columns
                .iter()
                .find(|c| !seen.insert(c.name.as_str()))
                .map_or("?", |c| c.name.as_str());
            return Err(invalid(format!("duplicate column '{duplicate}'")));
        }
        if let Some(position) = self.columns.iter().position(|c| c.name.is_empty()) {
            return Err(invalid(format!("empty column name at position {position}")));
        }

        let mut index_names = HashSet::new();
        for index in &self.indexes {
            if index.name.is_empty() || index.name.contains(INDEX_KEYSPACE_SEPARATOR) {
                return Err(invalid(format!("invalid index name '{}'", index.name)));
            }
            if !index_names.insert(index.name.as_str()) {
                return Err(invalid(format!("duplicate index '{}'", index.name)));
            }
            if let Extractor::Columns(columns) = &index.extractor {
                if columns.is_empty() {
                    return Err(invalid(format!("index '{}' has no columns", index.name)));
                }
                if let Some(missing) = columns.iter().find(|c| !self.by_name.contains_key(*c)) {
                    return Err(invalid(format!(
                        "index '{}' names unknown column '{missing}'",
                        index.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Checks a record's column names and value types.
    pub fn validate(&self, record: &Record) -> DepotResult<()> {
        for (name, value) in record {
            let column = self.column(name).ok_or_else(|| DepotError::UnknownColumn {
                table: self.name.clone(),
                column: name.clone(),
            })?;
            if value.column_type() != column.ty {
                return Err(DepotError::TypeMismatch {
                    table: self.name.clone(),
                    column: name.clone(),
                    expected: column.ty.to_string(),
                    actual: value.column_type().to_string(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }
}

fn fingerprint(columns: &[ColumnDef]) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(FINGERPRINT_K0, FINGERPRINT_K1);
    for column in columns {
        hasher.write(column.name.as_bytes());
        hasher.write_u8(0);
        hasher.write_u8(column.ty.tag());
        hasher.write_u8(u8::from(column.key));
    }
    hasher.finish()
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`TableSchema`].
#[derive(Debug)]
pub struct TableSchemaBuilder {
    name: String,
    description: Option<String>,
    columns: Vec<ColumnDef>,
    indexes: Vec<IndexDef>,
}

impl TableSchemaBuilder {
    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a key column.
    #[must_use]
    pub fn key(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(ColumnDef::key(name, ty));
        self
    }

    /// Appends a non-key column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(ColumnDef::new(name, ty));
        self
    }

    /// Appends a column definition.
    #[must_use]
    pub fn column_def(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Declares a secondary index.
    #[must_use]
    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Builds the schema. Validation happens on registration.
    #[must_use]
    pub fn build(self) -> TableSchema {
        let mut schema = TableSchema::new(self.name, self.columns, self.indexes);
        schema.set_description(self.description);
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_common::ErrorCode;

    fn rev() -> TableSchema {
        TableSchema::builder("rev")
            .description("file revisions")
            .key("depotFile", ColumnType::String)
            .key("depotRev", ColumnType::Int32)
            .column("change", ColumnType::Int32)
            .column("size", ColumnType::Int64)
            .column("digest", ColumnType::Bytes)
            .index(IndexDef::columns("by_change", ["change"]))
            .build()
    }

    #[test]
    fn test_derived_lookups() {
        let schema = rev();
        assert_eq!(schema.name(), "rev");
        assert_eq!(schema.description(), Some("file revisions"));
        assert_eq!(schema.key_positions(), &[0, 1]);
        let keys: Vec<_> = schema.key_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(keys, ["depotFile", "depotRev"]);
        assert_eq!(schema.column_position("size"), Some(3));
        assert_eq!(schema.column("digest").map(|c| c.ty), Some(ColumnType::Bytes));
        assert!(schema.column("nope").is_none());
        assert_eq!(schema.index_keyspace("by_change"), "rev#by_change");
        assert!(schema.validate_definition().is_ok());
    }

    #[test]
    fn test_fingerprint_tracks_columns_not_indexes() {
        let a = rev();
        let b = TableSchema::builder("other")
            .key("depotFile", ColumnType::String)
            .key("depotRev", ColumnType::Int32)
            .column("change", ColumnType::Int32)
            .column("size", ColumnType::Int64)
            .column("digest", ColumnType::Bytes)
            .build();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = TableSchema::builder("rev")
            .key("depotFile", ColumnType::String)
            .key("depotRev", ColumnType::Int64)
            .column("change", ColumnType::Int32)
            .column("size", ColumnType::Int64)
            .column("digest", ColumnType::Bytes)
            .build();
        assert_ne!(a.fingerprint(), c.fingerprint());

        let d = TableSchema::builder("rev")
            .key("depotFile", ColumnType::String)
            .column("depotRev", ColumnType::Int32)
            .column("change", ColumnType::Int32)
            .column("size", ColumnType::Int64)
            .column("digest", ColumnType::Bytes)
            .build();
        assert_ne!(a.fingerprint(), d.fingerprint());
    }

    #[test]
    fn test_invalid_definitions() {
        let cases = [
            TableSchema::builder("t").column("a", ColumnType::Int32).build(),
            TableSchema::builder("t")
                .key("a", ColumnType::Int32)
                .column("a", ColumnType::String)
                .build(),
            TableSchema::builder("t#x").key("a", ColumnType::Int32).build(),
            TableSchema::builder("t")
                .key("a", ColumnType::Int32)
                .index(IndexDef::columns("i", ["missing"]))
                .build(),
            TableSchema::builder("t")
                .key("a", ColumnType::Int32)
                .index(IndexDef::columns("i", ["a"]))
                .index(IndexDef::columns("i", ["a"]))
                .build(),
            TableSchema::builder("t")
                .key("a", ColumnType::Int32)
                .index(IndexDef::columns("i", Vec::<String>::new()))
                .build(),
        ];
        for schema in cases {
            let err = schema.validate_definition().unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidSchema, "{err}");
        }
    }

    #[test]
    fn test_validate_record() {
        let schema = rev();
        let ok = Record::new().with("depotFile", "//depot/a").with("depotRev", 1);
        assert!(schema.validate(&ok).is_ok());

        let unknown = ok.clone().with("bogus", 1);
        assert!(matches!(
            schema.validate(&unknown),
            Err(DepotError::UnknownColumn { column, .. }) if column == "bogus"
        ));

        let wrong = ok.with("size", 1);
        assert!(matches!(
            schema.validate(&wrong),
            Err(DepotError::TypeMismatch { column, .. }) if column == "size"
        ));
    }

    #[test]
    fn test_extractors() {
        let schema = rev();
        let record = Record::new().with("depotFile", "//depot/a").with("depotRev", 1);
        let by_change = schema.index("by_change").unwrap();
        assert_eq!(by_change.extract(&schema, &record), vec![Value::Int32(0)]);

        let custom = IndexDef::custom("by_name", |r: &Record| {
            let path = r.get_str("depotFile").unwrap_or_default();
            let base = path.rsplit('/').next().unwrap_or_default();
            vec![Value::from(base)]
        });
        assert_eq!(custom.extract(&schema, &record), vec![Value::from("a")]);
        assert_eq!(format!("{:?}", custom.extractor()), "Custom(..)");

        assert!(matches!(
            schema.index("nope"),
            Err(DepotError::UnknownIndex { .. })
        ));
    }
}
