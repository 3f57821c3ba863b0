//! Main WAL manager.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::info;

use depot_common::Version;

use crate::config::WalConfig;
use crate::error::{WalError, WalResult};
use crate::reader::{self, ReplaySummary};
use crate::record::CommitRecord;
use crate::segment::WalSegment;
use crate::writer::WalWriter;

/// Point-in-time copy of the log's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalStatsSnapshot {
    /// Total bytes written.
    pub bytes_written: u64,
    /// Total records written.
    pub records_written: u64,
    /// Number of segment rotations.
    pub segment_rotations: u64,
    /// Number of syncs performed.
    pub syncs: u64,
    /// Appends rolled back after an I/O error.
    pub rollbacks: u64,
}

/// The commit log.
pub struct Wal {
    config: Arc<WalConfig>,
    writer: WalWriter,
}

impl Wal {
    /// Opens the log in `config.dir`, replaying every record newer than
    /// `applied` through `apply` before accepting appends.
    pub fn open<F>(config: WalConfig, applied: Version, apply: F) -> WalResult<(Self, ReplaySummary)>
    where
        F: FnMut(CommitRecord) -> WalResult<()>,
    {
        config.validate().map_err(WalError::config_error)?;
        std::fs::create_dir_all(&config.dir)?;

        let (summary, tail) = reader::replay(&config, applied, apply)?;
        let segment = match tail {
            Some(tail) => Some(WalSegment::open(tail.path, tail.base_version, tail.write_pos)?),
            None => None,
        };

        info!(
            dir = %config.dir.display(),
            segments = summary.segments,
            applied = summary.records_applied,
            skipped = summary.records_skipped,
            last_version = %summary.last_version,
            "Opened commit log"
        );

        let config = Arc::new(config);
        let writer = WalWriter::new(Arc::clone(&config), segment, summary.last_version);
        Ok((Self { config, writer }, summary))
    }

    /// Appends a commit record; it is durable when this returns `Ok` under
    /// [`SyncPolicy::EveryCommit`](crate::SyncPolicy::EveryCommit).
    pub fn append(&self, record: &CommitRecord) -> WalResult<()> {
        self.writer.append(record)
    }

    /// Forces a sync of the active segment.
    pub fn sync(&self) -> WalResult<()> {
        self.writer.sync()
    }

    /// Last appended (or replayed) version.
    pub fn last_version(&self) -> Version {
        self.writer.last_version()
    }

    /// Returns true once a failed append could not be rolled back.
    pub fn is_poisoned(&self) -> bool {
        self.writer.is_poisoned()
    }

    /// The configuration.
    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    /// Counter snapshot.
    pub fn stats(&self) -> WalStatsSnapshot {
        let stats = self.writer.stats();
        WalStatsSnapshot {
            bytes_written: stats.bytes_written.load(Ordering::Relaxed),
            records_written: stats.records_written.load(Ordering::Relaxed),
            segment_rotations: stats.segment_rotations.load(Ordering::Relaxed),
            syncs: stats.syncs.load(Ordering::Relaxed),
            rollbacks: stats.rollbacks.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("dir", &self.config.dir)
            .field("last_version", &self.last_version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, OpenOptions};
    use std::io::Write;

    use bytes::Bytes;
    use tempfile::TempDir;

    use crate::record::Mutation;
    use crate::segment::list_segments;
    use crate::SyncPolicy;

    fn record(version: u64) -> CommitRecord {
        CommitRecord::new(
            Version::new(version),
            vec![Mutation::put(
                "rev",
                Bytes::from(format!("key{version:04}")),
                Bytes::from(vec![version as u8; 32]),
            )],
        )
    }

    fn open(config: &WalConfig, applied: u64) -> (Wal, ReplaySummary, Vec<CommitRecord>) {
        let mut seen = Vec::new();
        let (wal, summary) = Wal::open(config.clone(), Version::new(applied), |r| {
            seen.push(r);
            Ok(())
        })
        .unwrap();
        (wal, summary, seen)
    }

    #[test]
    fn test_append_and_replay() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path());

        let (wal, summary, seen) = open(&config, 0);
        assert_eq!(summary, ReplaySummary::default());
        assert!(seen.is_empty());
        for v in 1..=3 {
            wal.append(&record(v)).unwrap();
        }
        assert_eq!(wal.last_version(), Version::new(3));
        assert_eq!(wal.stats().records_written, 3);
        assert_eq!(wal.stats().syncs, 3);
        drop(wal);

        let (wal, summary, seen) = open(&config, 0);
        assert_eq!(summary.records_applied, 3);
        assert_eq!(summary.last_version, Version::new(3));
        assert_eq!(seen, vec![record(1), record(2), record(3)]);

        // appends continue after the replayed tail
        wal.append(&record(4)).unwrap();
        drop(wal);
        let (_, summary, _) = open(&config, 0);
        assert_eq!(summary.records_applied, 4);
    }

    #[test]
    fn test_replay_skips_applied_versions() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path());
        let (wal, _, _) = open(&config, 0);
        for v in 1..=4 {
            wal.append(&record(v)).unwrap();
        }
        drop(wal);

        let (_, summary, seen) = open(&config, 2);
        assert_eq!(summary.records_skipped, 2);
        assert_eq!(summary.records_applied, 2);
        assert_eq!(seen, vec![record(3), record(4)]);
    }

    #[test]
    fn test_rejects_out_of_order_append() {
        let dir = TempDir::new().unwrap();
        let (wal, _, _) = open(&WalConfig::new(dir.path()), 0);
        assert!(matches!(
            wal.append(&record(2)),
            Err(WalError::VersionGap { .. })
        ));
        wal.append(&record(1)).unwrap();
    }

    #[test]
    fn test_record_too_large_leaves_log_untouched() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path()).with_max_record_size(64);
        let (wal, _, _) = open(&config, 0);
        assert!(matches!(
            wal.append(&record(1)),
            Err(WalError::RecordTooLarge { .. })
        ));
        assert_eq!(wal.last_version(), Version::ZERO);
        assert!(!wal.is_poisoned());
        drop(wal);

        let (_, summary, seen) = open(&config, 0);
        assert_eq!(summary.records_applied, 0);
        assert!(seen.is_empty());
    }

    #[test]
    fn test_segment_rotation() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path())
            .with_segment_size(4096)
            .with_sync_policy(SyncPolicy::Never);
        let (wal, _, _) = open(&config, 0);
        for v in 1..=100 {
            wal.append(&record(v)).unwrap();
        }
        assert!(wal.stats().segment_rotations > 0);
        assert_eq!(wal.stats().syncs, wal.stats().segment_rotations);
        drop(wal);

        let segments = list_segments(dir.path()).unwrap();
        assert!(segments.len() > 1);
        assert_eq!(segments[0].0, 1);

        let (_, summary, seen) = open(&config, 0);
        assert_eq!(summary.segments, segments.len());
        assert_eq!(seen.len(), 100);
        assert!(seen.iter().enumerate().all(|(i, r)| r.version.as_u64() == i as u64 + 1));
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path());
        let (wal, _, _) = open(&config, 0);
        wal.append(&record(1)).unwrap();
        wal.append(&record(2)).unwrap();
        drop(wal);

        let path = config.segment_path(1);
        let full_len = fs::metadata(&path).unwrap().len();
        // drop the last few bytes of record 2
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(full_len - 5)
            .unwrap();

        let (wal, summary, seen) = open(&config, 0);
        assert_eq!(seen, vec![record(1)]);
        assert!(summary.truncated_bytes > 0);
        assert_eq!(wal.last_version(), Version::new(1));

        // the next commit reuses version 2
        wal.append(&record(2)).unwrap();
        drop(wal);
        let (_, _, seen) = open(&config, 0);
        assert_eq!(seen, vec![record(1), record(2)]);
    }

    #[test]
    fn test_garbage_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path());
        let (wal, _, _) = open(&config, 0);
        wal.append(&record(1)).unwrap();
        drop(wal);

        let path = config.segment_path(1);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0x00, 0x00, 0x00, 0x10, 0xde, 0xad, 0xbe, 0xef, 1, 2, 3]).unwrap();
        drop(file);

        let (_, summary, seen) = open(&config, 0);
        assert_eq!(seen.len(), 1);
        assert_eq!(summary.truncated_bytes, 11);
    }

    #[test]
    fn test_corruption_in_sealed_segment_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path())
            .with_segment_size(4096)
            .with_sync_policy(SyncPolicy::Never);
        let (wal, _, _) = open(&config, 0);
        for v in 1..=100 {
            wal.append(&record(v)).unwrap();
        }
        drop(wal);

        let first = config.segment_path(1);
        let mut bytes = fs::read(&first).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&first, bytes).unwrap();

        let err = Wal::open(config, Version::ZERO, |_| Ok(())).unwrap_err();
        assert!(err.is_corruption(), "{err}");
    }

    #[test]
    fn test_apply_error_stops_replay() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path());
        let (wal, _, _) = open(&config, 0);
        wal.append(&record(1)).unwrap();
        drop(wal);

        let err = Wal::open(config, Version::ZERO, |r| {
            Err(WalError::ApplyFailed {
                version: r.version,
                reason: "unknown keyspace".into(),
            })
        })
        .unwrap_err();
        assert!(matches!(err, WalError::ApplyFailed { .. }));
    }
}
