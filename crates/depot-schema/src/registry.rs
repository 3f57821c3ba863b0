//! The schema registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use depot_common::{DepotError, DepotResult};

use crate::manifest::Manifest;
use crate::naming::NamingStrategy;
use crate::schema::TableSchema;
use crate::value::Record;

/// Catalog of registered tables.
///
/// Built mutably during initialization, then shared immutably
/// (`Arc<SchemaRegistry>`); lookups take no locks.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    tables: BTreeMap<String, Arc<TableSchema>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from every table in a manifest.
    pub fn from_manifest(manifest: &Manifest) -> DepotResult<Self> {
        let mut registry = Self::new();
        for schema in manifest.to_schemas()? {
            registry.register(schema)?;
        }
        Ok(registry)
    }

    /// Registers a table.
    pub fn register(&mut self, schema: TableSchema) -> DepotResult<Arc<TableSchema>> {
        if self.tables.contains_key(schema.name()) {
            return Err(DepotError::DuplicateTable {
                table: schema.name().to_owned(),
            });
        }
        schema.validate_definition()?;

        debug!(
            table = schema.name(),
            columns = schema.columns().len(),
            indexes = schema.indexes().len(),
            fingerprint = format_args!("{:#018x}", schema.fingerprint()),
            "Registered table"
        );
        let schema = Arc::new(schema);
        self.tables.insert(schema.name().to_owned(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Looks up a table by canonical name.
    pub fn lookup(&self, name: &str) -> DepotResult<&Arc<TableSchema>> {
        self.tables.get(name).ok_or_else(|| DepotError::UnknownTable {
            table: name.to_owned(),
        })
    }

    /// Looks up a table spelled under a deployment naming scheme.
    pub fn lookup_qualified(
        &self,
        name: &str,
        naming: &NamingStrategy,
    ) -> DepotResult<&Arc<TableSchema>> {
        let canonical = naming
            .canonicalize(name)
            .ok_or_else(|| DepotError::UnknownTable {
                table: name.to_owned(),
            })?;
        self.lookup(canonical)
    }

    /// Validates a record against a registered table.
    pub fn validate(&self, table: &str, record: &Record) -> DepotResult<()> {
        self.lookup(table)?.validate(record)
    }

    /// Returns true if a table is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Number of registered tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterates schemas in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TableSchema>> + '_ {
        self.tables.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;
    use crate::schema::IndexDef;

    fn change() -> TableSchema {
        TableSchema::builder("change")
            .key("change", ColumnType::Int32)
            .column("user", ColumnType::String)
            .index(IndexDef::columns("by_user", ["user", "change"]))
            .build()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = SchemaRegistry::new();
        assert!(registry.is_empty());
        registry.register(change()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("change"));
        assert_eq!(registry.lookup("change").unwrap().name(), "change");
        assert!(matches!(
            registry.lookup("rev"),
            Err(DepotError::UnknownTable { table }) if table == "rev"
        ));
    }

    #[test]
    fn test_duplicate_and_invalid() {
        let mut registry = SchemaRegistry::new();
        registry.register(change()).unwrap();
        assert!(matches!(
            registry.register(change()),
            Err(DepotError::DuplicateTable { .. })
        ));

        let keyless = TableSchema::builder("counters")
            .column("name", ColumnType::String)
            .build();
        assert!(matches!(
            registry.register(keyless),
            Err(DepotError::InvalidSchema { .. })
        ));
        assert!(!registry.contains("counters"));
    }

    #[test]
    fn test_lookup_qualified() {
        let mut registry = SchemaRegistry::new();
        registry.register(change()).unwrap();

        let perforce = NamingStrategy::schema_qualified("perforce");
        assert!(registry.lookup_qualified("perforce.change", &perforce).is_ok());
        assert!(registry.lookup_qualified("change", &perforce).is_err());
        assert!(registry
            .lookup_qualified("db.change", &NamingStrategy::dotted_prefix("db"))
            .is_ok());
    }

    #[test]
    fn test_validate() {
        let mut registry = SchemaRegistry::new();
        registry.register(change()).unwrap();
        let record = Record::new().with("change", 1).with("user", "alice");
        assert!(registry.validate("change", &record).is_ok());
        assert!(registry.validate("change", &record.clone().with("client", "ws")).is_err());
        assert!(registry.validate("rev", &record).is_err());
    }
}
