//! Declarative table-definition manifest.
//!
//! Tables are data, not code: a TOML document lists `[[table]]` entries with
//! their columns and optional `[[table.index]]` declarations. A representative
//! subset of the depot metadata catalog ships with the crate and is available
//! through [`Manifest::depot_catalog`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use depot_common::{DepotError, DepotResult};

use crate::column::{ColumnDef, ColumnType};
use crate::schema::{IndexDef, TableSchema};

const DEPOT_CATALOG: &str = include_str!("../catalog/depot.toml");

/// A parsed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Table declarations in document order.
    #[serde(default, rename = "table")]
    pub tables: Vec<TableDecl>,
}

/// One `[[table]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDecl {
    /// Canonical table name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Columns in declared order.
    pub columns: Vec<ColumnDecl>,
    /// Secondary indexes.
    #[serde(default, rename = "index", skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDecl>,
}

/// One column of a [`TableDecl`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDecl {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub ty: ColumnType,
    /// Part of the row identifier.
    #[serde(default)]
    pub key: bool,
}

/// One `[[table.index]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexDecl {
    /// Index name.
    pub name: String,
    /// Alternate-key columns in order.
    pub columns: Vec<String>,
}

impl Manifest {
    /// Parses a manifest from TOML text.
    pub fn parse(text: &str) -> DepotResult<Self> {
        toml::from_str(text).map_err(|e| DepotError::config(format!("invalid manifest: {e}")))
    }

    /// Reads and parses a manifest file.
    pub fn from_file(path: &Path) -> DepotResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Serializes the manifest to TOML.
    pub fn to_toml(&self) -> DepotResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DepotError::config(format!("cannot serialize manifest: {e}")))
    }

    /// The bundled depot catalog subset.
    pub fn depot_catalog() -> DepotResult<Self> {
        Self::parse(DEPOT_CATALOG)
    }

    /// Looks up a declaration by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableDecl> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Converts every declaration into a validated schema.
    pub fn to_schemas(&self) -> DepotResult<Vec<TableSchema>> {
        self.tables.iter().map(TableDecl::to_schema).collect()
    }
}

impl TableDecl {
    /// Converts the declaration into a validated schema.
    pub fn to_schema(&self) -> DepotResult<TableSchema> {
        let mut builder = TableSchema::builder(self.name.clone());
        if let Some(description) = &self.description {
            builder = builder.description(description.clone());
        }
        for column in &self.columns {
            builder = builder.column_def(ColumnDef {
                name: column.name.clone(),
                ty: column.ty,
                key: column.key,
            });
        }
        for index in &self.indexes {
            builder = builder.index(IndexDef::columns(index.name.clone(), index.columns.clone()));
        }
        let schema = builder.build();
        schema.validate_definition()?;
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SchemaRegistry;

    const SAMPLE: &str = r#"
[[table]]
name = "have"
description = "Client have list"
columns = [
    { name = "clientFile", type = "text", key = true },
    { name = "depotFile", type = "string" },
    { name = "haveRev", type = "int" },
    { name = "time", type = "bigint" },
    { name = "digest", type = "binary" },
]

[[table.index]]
name = "by_depot_file"
columns = ["depotFile"]

[[table]]
name = "counters"
columns = [
    { name = "name", type = "string", key = true },
    { name = "value", type = "string" },
]
"#;

    #[test]
    fn test_parse_with_aliases() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.tables.len(), 2);

        let have = manifest.table("have").unwrap();
        let types: Vec<_> = have.columns.iter().map(|c| c.ty).collect();
        assert_eq!(
            types,
            [
                ColumnType::String,
                ColumnType::String,
                ColumnType::Int32,
                ColumnType::Int64,
                ColumnType::Bytes
            ]
        );
        assert!(have.columns[0].key);
        assert!(!have.columns[1].key);
        assert_eq!(have.indexes.len(), 1);

        let schema = have.to_schema().unwrap();
        assert_eq!(schema.description(), Some("Client have list"));
        assert!(schema.index("by_depot_file").is_ok());
    }

    #[test]
    fn test_rejects_bad_documents() {
        assert!(Manifest::parse("[[table]]\nname = 1").is_err());
        assert!(Manifest::parse(
            r#"
[[table]]
name = "t"
columns = [{ name = "a", type = "float", key = true }]
"#
        )
        .is_err());

        let keyless = Manifest::parse(
            r#"
[[table]]
name = "t"
columns = [{ name = "a", type = "int32" }]
"#,
        )
        .unwrap();
        assert!(matches!(
            keyless.to_schemas(),
            Err(DepotError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_depot_catalog() {
        let manifest = Manifest::depot_catalog().unwrap();
        let registry = SchemaRegistry::from_manifest(&manifest).unwrap();
        assert_eq!(registry.len(), manifest.tables.len());

        let rev = registry.lookup("rev").unwrap();
        let keys: Vec<_> = rev.key_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(keys, ["depotFile", "depotRev"]);
        assert!(rev.index("by_change").is_ok());

        let integed = registry.lookup("integed").unwrap();
        assert!(integed.key_positions().len() > 2);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("catalog.toml");
        let manifest = Manifest::parse(SAMPLE).unwrap();
        fs::write(&path, manifest.to_toml().unwrap()).unwrap();
        assert_eq!(Manifest::from_file(&path).unwrap(), manifest);
    }
}
