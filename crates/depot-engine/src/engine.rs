//! The engine facade.

use std::sync::Arc;

use tracing::{debug, info, warn};

use depot_codec::render_key;
use depot_common::constants::INDEX_KEYSPACE_SEPARATOR;
use depot_common::{DepotError, DepotResult, Version};
use depot_mvcc::Keyspaces;
use depot_schema::{Manifest, SchemaRegistry, TableSchema};
use depot_txn::{
    GcStats, HexKeys, IsolationLevel, KeyFormatter, TransactionManager, TransactionManagerConfig,
    TransactionStatsSnapshot,
};
use depot_wal::{ReplaySummary, WalStatsSnapshot};

use crate::config::EngineConfig;
use crate::index::{self, IndexReport};
use crate::table::Txn;

/// Renders table keys as value tuples in error messages.
struct SchemaKeys {
    registry: Arc<SchemaRegistry>,
}

impl KeyFormatter for SchemaKeys {
    fn format_key(&self, keyspace: &str, key: &[u8]) -> String {
        if keyspace.contains(INDEX_KEYSPACE_SEPARATOR) {
            return HexKeys.format_key(keyspace, key);
        }
        match self.registry.lookup(keyspace) {
            Ok(schema) => render_key(schema, key),
            Err(_) => HexKeys.format_key(keyspace, key),
        }
    }
}

/// Engine-wide counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Newest committed version.
    pub committed_version: Version,
    /// Registered tables.
    pub tables: usize,
    /// Transaction counters.
    pub transactions: TransactionStatsSnapshot,
    /// Commit log counters, when durable.
    pub wal: Option<WalStatsSnapshot>,
}

/// A transactional multi-table record store.
///
/// # Example
///
/// ```rust
/// use depot_engine::{Engine, EngineConfig};
/// use depot_schema::{ColumnType, Record, SchemaRegistry, TableSchema, Value};
///
/// let mut registry = SchemaRegistry::new();
/// registry
///     .register(
///         TableSchema::builder("rev")
///             .key("depotFile", ColumnType::String)
///             .key("depotRev", ColumnType::Int32)
///             .column("change", ColumnType::Int32)
///             .build(),
///     )
///     .unwrap();
/// let engine = Engine::open(EngineConfig::new(), registry).unwrap();
///
/// let mut txn = engine.begin();
/// txn.put(
///     "rev",
///     Record::new()
///         .with("depotFile", "//depot/a")
///         .with("depotRev", 1)
///         .with("change", 100),
/// )
/// .unwrap();
/// txn.commit().unwrap();
///
/// let mut txn = engine.begin();
/// let rev = txn.get("rev", &[Value::from("//depot/a"), Value::from(1)]).unwrap();
/// assert_eq!(rev.get_i32("change"), Some(100));
/// ```
pub struct Engine {
    registry: Arc<SchemaRegistry>,
    manager: TransactionManager,
    config: EngineConfig,
    recovery: Option<ReplaySummary>,
}

impl Engine {
    /// Opens an engine over the tables in `registry`.
    ///
    /// With a data directory configured, the commit log under it is
    /// replayed before the engine is returned.
    pub fn open(config: EngineConfig, registry: SchemaRegistry) -> DepotResult<Self> {
        config.validate().map_err(DepotError::config)?;
        let registry = Arc::new(registry);

        let mut keyspaces = Keyspaces::new();
        for schema in registry.iter() {
            keyspaces.create(schema.name());
            for index in schema.indexes() {
                keyspaces.create(&schema.index_keyspace(index.name()));
            }
        }

        let txn_config =
            TransactionManagerConfig::default().with_default_isolation(config.default_isolation);
        let (manager, recovery) = match config.wal_config() {
            Some(wal_config) => {
                let (manager, summary) =
                    TransactionManager::open(keyspaces, txn_config, wal_config)?;
                (manager, Some(summary))
            }
            None => (TransactionManager::new(keyspaces, txn_config), None),
        };
        let manager = manager.with_key_formatter(SchemaKeys {
            registry: Arc::clone(&registry),
        });

        info!(
            tables = registry.len(),
            durable = recovery.is_some(),
            version = %manager.committed_version(),
            "Engine opened"
        );
        Ok(Self {
            registry,
            manager,
            config,
            recovery,
        })
    }

    /// Opens an engine over the tables declared in a manifest.
    pub fn open_manifest(config: EngineConfig, manifest: &Manifest) -> DepotResult<Self> {
        Self::open(config, SchemaRegistry::from_manifest(manifest)?)
    }

    /// Begins a transaction with the configured default isolation level.
    pub fn begin(&self) -> Txn<'_> {
        Txn::new(self, self.manager.begin())
    }

    /// Begins a transaction with a specific isolation level.
    pub fn begin_with_isolation(&self, isolation: IsolationLevel) -> Txn<'_> {
        Txn::new(self, self.manager.begin_with_isolation(isolation))
    }

    /// Runs `body` in a transaction and commits it, retrying on a fresh
    /// snapshot when the commit conflicts.
    ///
    /// `body` may run up to `max_commit_retries` times. Errors other than
    /// `Conflict` are returned at once.
    pub fn run<T, F>(&self, mut body: F) -> DepotResult<T>
    where
        F: FnMut(&mut Txn<'_>) -> DepotResult<T>,
    {
        let attempts = self.config.max_commit_retries;
        let mut attempt = 1;
        loop {
            let mut txn = self.begin();
            let result = match body(&mut txn) {
                Ok(value) => txn.commit().map(|_| value),
                Err(e) => {
                    txn.abort();
                    Err(e)
                }
            };
            match result {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    debug!(attempt, error = %e, "Retrying after conflict");
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    warn!(attempts, error = %e, "Giving up after repeated conflicts");
                    return Err(e);
                }
                other => return other,
            }
        }
    }

    /// Prunes row versions no open transaction can see.
    pub fn collect_garbage(&self) -> GcStats {
        self.manager.collect_garbage()
    }

    /// Checks every secondary index against committed rows.
    pub fn verify_indexes(&self) -> DepotResult<IndexReport> {
        let mut txn = self.manager.begin();
        let mut report = IndexReport::default();
        for schema in self.registry.iter() {
            index::verify_table(&mut txn, schema, self.config.scan_batch_size, &mut report)?;
        }
        txn.abort();
        info!(
            indexes = report.indexes_checked,
            rows = report.rows_checked,
            problems = report.problems.len(),
            "Verified indexes"
        );
        Ok(report)
    }

    /// Engine-wide counters.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            committed_version: self.manager.committed_version(),
            tables: self.registry.len(),
            transactions: self.manager.stats(),
            wal: self.manager.wal_stats(),
        }
    }

    /// Newest committed version.
    pub fn committed_version(&self) -> Version {
        self.manager.committed_version()
    }

    /// The table catalog.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Looks up a table.
    pub fn schema(&self, table: &str) -> DepotResult<&Arc<TableSchema>> {
        self.registry.lookup(table)
    }

    /// Configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// What replaying the commit log found on open, when durable.
    pub fn recovery(&self) -> Option<&ReplaySummary> {
        self.recovery.as_ref()
    }

    /// Returns true if commits are logged.
    pub fn is_durable(&self) -> bool {
        self.manager.is_durable()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tables", &self.registry.len())
            .field("manager", &self.manager)
            .field("config", &self.config)
            .finish()
    }
}
