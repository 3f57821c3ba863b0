//! Fixtures shared by the integration tests.

use std::path::Path;
use std::sync::Once;

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use depot_common::DepotResult;
use depot_engine::{Engine, EngineConfig};
use depot_schema::{Manifest, Record, SchemaRegistry};

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Registry holding the bundled depot catalog.
pub fn catalog() -> SchemaRegistry {
    let manifest = Manifest::depot_catalog().expect("bundled catalog parses");
    SchemaRegistry::from_manifest(&manifest).expect("bundled catalog registers")
}

/// An in-memory engine over the depot catalog.
pub fn memory_engine() -> Engine {
    init_tracing();
    Engine::open(EngineConfig::new(), catalog()).expect("open in-memory engine")
}

/// A `rev` row.
pub fn rev(depot_file: &str, depot_rev: i32, change: i32) -> Record {
    Record::new()
        .with("depotFile", depot_file)
        .with("depotRev", depot_rev)
        .with("change", change)
}

/// An on-disk engine that can be closed and reopened over the same
/// directory.
pub struct DurableEngine {
    dir: TempDir,
    config: EngineConfig,
}

impl DurableEngine {
    /// Creates a fresh data directory.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Creates a fresh data directory with an adjusted configuration.
    pub fn with_config(adjust: impl FnOnce(EngineConfig) -> EngineConfig) -> Self {
        init_tracing();
        let dir = TempDir::new().expect("create temp dir");
        let config = adjust(EngineConfig::durable(dir.path()));
        Self { dir, config }
    }

    /// Opens (or reopens) the engine.
    pub fn open(&self) -> DepotResult<Engine> {
        Engine::open(self.config.clone(), catalog())
    }

    /// Data directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Commit log directory.
    pub fn wal_dir(&self) -> std::path::PathBuf {
        self.config
            .wal_config()
            .map(|wal| wal.dir)
            .unwrap_or_else(|| self.dir.path().join("wal"))
    }

    /// Log segment files, oldest first.
    pub fn segments(&self) -> Vec<std::path::PathBuf> {
        let mut files: Vec<_> = std::fs::read_dir(self.wal_dir())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| p.extension().is_some_and(|ext| ext == "log"))
                    .collect()
            })
            .unwrap_or_default();
        files.sort();
        files
    }
}

impl Default for DurableEngine {
    fn default() -> Self {
        Self::new()
    }
}
