//! # depot-schema
//!
//! Typed table schemas for DepotDB.
//!
//! This crate holds the data model the rest of the engine is generic over:
//!
//! - [`ColumnType`], [`ColumnDef`], [`TableSchema`]: per-table declarations,
//!   including secondary index declarations ([`IndexDef`])
//! - [`Value`] and [`Record`]: the dynamically typed row representation
//! - [`SchemaRegistry`]: the process-wide table catalog, built during a
//!   single-threaded initialization phase and shared immutably afterwards
//! - [`Manifest`]: the declarative TOML table-definition manifest
//! - [`NamingStrategy`]: deployment naming schemes (`perforce.rev`, `db.rev`)
//!
//! ## Example
//!
//! ```rust
//! use depot_schema::{ColumnType, Record, SchemaRegistry, TableSchema};
//!
//! let mut registry = SchemaRegistry::new();
//! registry
//!     .register(
//!         TableSchema::builder("rev")
//!             .key("depotFile", ColumnType::String)
//!             .key("depotRev", ColumnType::Int32)
//!             .column("change", ColumnType::Int32)
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let schema = registry.lookup("rev").unwrap();
//! let record = Record::new()
//!     .with("depotFile", "//depot/a")
//!     .with("depotRev", 1)
//!     .with("change", 100);
//! assert!(schema.validate(&record).is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod column;
mod manifest;
mod naming;
mod registry;
mod schema;
mod value;

pub use column::{ColumnDef, ColumnType};
pub use manifest::{ColumnDecl, IndexDecl, Manifest, TableDecl};
pub use naming::NamingStrategy;
pub use registry::SchemaRegistry;
pub use schema::{Extractor, IndexDef, TableSchema, TableSchemaBuilder};
pub use value::{Record, Value};
