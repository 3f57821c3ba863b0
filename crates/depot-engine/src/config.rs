//! Engine configuration.
//!
//! Loads and saves engine configuration from TOML files.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use depot_common::constants::{
    DEFAULT_MAX_COMMIT_RETRIES, DEFAULT_SCAN_BATCH_SIZE, DEFAULT_WAL_SEGMENT_SIZE,
    MAX_WAL_RECORD_SIZE,
};
use depot_mvcc::IsolationLevel;
use depot_wal::{SyncPolicy, WalConfig};

/// Name of the commit log directory under `data_dir`.
const WAL_DIR_NAME: &str = "wal";

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Data directory. `None` runs in memory without a commit log.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// When commit log appends are synced.
    #[serde(default)]
    pub sync_mode: SyncPolicy,

    /// Size past which a log segment is rotated.
    #[serde(default = "default_segment_size")]
    pub segment_size: usize,

    /// Largest encoded commit accepted by the log.
    #[serde(default = "default_max_record_size")]
    pub max_record_size: usize,

    /// Fail deletes of absent rows with `NotFound`.
    #[serde(default = "default_strict_delete")]
    pub strict_delete: bool,

    /// Isolation level of transactions started with `begin()`.
    #[serde(default)]
    pub default_isolation: IsolationLevel,

    /// Rows pulled from the store per scan batch.
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,

    /// Attempts made by `Engine::run` before giving up on conflicts.
    #[serde(default = "default_max_commit_retries")]
    pub max_commit_retries: usize,
}

fn default_segment_size() -> usize {
    DEFAULT_WAL_SEGMENT_SIZE
}

fn default_max_record_size() -> usize {
    MAX_WAL_RECORD_SIZE
}

fn default_strict_delete() -> bool {
    true
}

fn default_scan_batch_size() -> usize {
    DEFAULT_SCAN_BATCH_SIZE
}

fn default_max_commit_retries() -> usize {
    DEFAULT_MAX_COMMIT_RETRIES
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sync_mode: SyncPolicy::default(),
            segment_size: default_segment_size(),
            max_record_size: default_max_record_size(),
            strict_delete: default_strict_delete(),
            default_isolation: IsolationLevel::default(),
            scan_batch_size: default_scan_batch_size(),
            max_commit_retries: default_max_commit_retries(),
        }
    }
}

impl EngineConfig {
    /// Creates an in-memory configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a durable configuration rooted at `dir`.
    pub fn durable(dir: impl Into<PathBuf>) -> Self {
        Self::default().with_data_dir(dir)
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets the sync mode.
    #[must_use]
    pub fn with_sync_mode(mut self, mode: SyncPolicy) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Sets the segment size.
    #[must_use]
    pub fn with_segment_size(mut self, size: usize) -> Self {
        self.segment_size = size;
        self
    }

    /// Sets the maximum commit record size.
    #[must_use]
    pub fn with_max_record_size(mut self, size: usize) -> Self {
        self.max_record_size = size;
        self
    }

    /// Sets strict delete.
    #[must_use]
    pub fn with_strict_delete(mut self, strict: bool) -> Self {
        self.strict_delete = strict;
        self
    }

    /// Sets the default isolation level.
    #[must_use]
    pub fn with_default_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.default_isolation = isolation;
        self
    }

    /// Sets the scan batch size.
    #[must_use]
    pub fn with_scan_batch_size(mut self, size: usize) -> Self {
        self.scan_batch_size = size;
        self
    }

    /// Sets the conflict retry limit.
    #[must_use]
    pub fn with_max_commit_retries(mut self, retries: usize) -> Self {
        self.max_commit_retries = retries;
        self
    }

    /// Commit log configuration, if the engine is durable.
    pub fn wal_config(&self) -> Option<WalConfig> {
        self.data_dir.as_ref().map(|dir| {
            WalConfig::new(dir.join(WAL_DIR_NAME))
                .with_segment_size(self.segment_size)
                .with_max_record_size(self.max_record_size)
                .with_sync_policy(self.sync_mode)
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.scan_batch_size == 0 {
            return Err("scan_batch_size must be > 0".into());
        }
        if self.max_commit_retries == 0 {
            return Err("max_commit_retries must be > 0".into());
        }
        match self.wal_config() {
            Some(wal) => wal.validate(),
            None => Ok(()),
        }
    }

    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}
