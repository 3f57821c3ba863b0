//! WAL configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use depot_common::constants::{DEFAULT_WAL_SEGMENT_SIZE, MAX_WAL_RECORD_SIZE};

/// Smallest accepted segment size.
const MIN_SEGMENT_SIZE: usize = 4 * 1024;

/// Sync policy for log appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Sync after every commit record.
    #[default]
    EveryCommit,
    /// Never sync (unsafe - for testing and bulk loads only).
    Never,
}

/// Configuration for the commit log.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Directory where segments are stored.
    pub dir: PathBuf,

    /// Size past which the active segment is rotated.
    pub segment_size: usize,

    /// Maximum encoded size of one commit record.
    pub max_record_size: usize,

    /// Sync policy for durability.
    pub sync_policy: SyncPolicy,
}

impl WalConfig {
    /// Creates a new configuration for the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            segment_size: DEFAULT_WAL_SEGMENT_SIZE,
            max_record_size: MAX_WAL_RECORD_SIZE,
            sync_policy: SyncPolicy::default(),
        }
    }

    /// Sets the segment size.
    #[must_use]
    pub fn with_segment_size(mut self, size: usize) -> Self {
        self.segment_size = size;
        self
    }

    /// Sets the maximum record size.
    #[must_use]
    pub fn with_max_record_size(mut self, size: usize) -> Self {
        self.max_record_size = size;
        self
    }

    /// Sets the sync policy.
    #[must_use]
    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.segment_size < MIN_SEGMENT_SIZE {
            return Err(format!(
                "Segment size must be at least {MIN_SEGMENT_SIZE} bytes"
            ));
        }

        if self.max_record_size == 0 {
            return Err("Max record size must be positive".to_string());
        }

        if self.max_record_size > MAX_WAL_RECORD_SIZE {
            return Err(format!(
                "Max record size must be at most {MAX_WAL_RECORD_SIZE} bytes"
            ));
        }

        Ok(())
    }

    /// Returns the segment file path for a segment's base version.
    pub fn segment_path(&self, base_version: u64) -> PathBuf {
        self.dir.join(format!("wal_{base_version:016x}.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_validate() {
        let config = WalConfig::new("/tmp/wal")
            .with_segment_size(8192)
            .with_max_record_size(1024)
            .with_sync_policy(SyncPolicy::Never);
        assert!(config.validate().is_ok());
        assert_eq!(config.sync_policy, SyncPolicy::Never);

        assert!(config.clone().with_segment_size(100).validate().is_err());
        assert!(config.clone().with_max_record_size(0).validate().is_err());
        assert!(config
            .with_max_record_size(MAX_WAL_RECORD_SIZE + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_segment_path() {
        let config = WalConfig::new("/data/wal");
        assert_eq!(
            config.segment_path(0x2a),
            PathBuf::from("/data/wal/wal_000000000000002a.log")
        );
    }
}
