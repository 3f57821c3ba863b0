//! WAL writer for appending commit records.
//!
//! An append either leaves a complete, synced frame at the end of the log
//! or leaves the log exactly as it was. If the rollback itself fails the
//! writer is poisoned and refuses further appends.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use depot_common::Version;

use crate::config::{SyncPolicy, WalConfig};
use crate::error::{WalError, WalResult};
use crate::record::{encode_frame, CommitRecord};
use crate::segment::WalSegment;

/// WAL writer statistics.
#[derive(Debug, Default)]
pub struct WriterStats {
    /// Total bytes written.
    pub bytes_written: AtomicU64,
    /// Total records written.
    pub records_written: AtomicU64,
    /// Number of segment rotations.
    pub segment_rotations: AtomicU64,
    /// Number of syncs performed.
    pub syncs: AtomicU64,
    /// Appends rolled back after an I/O error.
    pub rollbacks: AtomicU64,
}

struct WriterState {
    segment: Option<WalSegment>,
    last_version: Version,
}

/// Appends commit records to the active segment.
pub struct WalWriter {
    config: Arc<WalConfig>,
    state: Mutex<WriterState>,
    poisoned: AtomicBool,
    stats: WriterStats,
}

impl WalWriter {
    /// Creates a writer positioned after `last_version`, appending to
    /// `segment` if one is open.
    pub fn new(config: Arc<WalConfig>, segment: Option<WalSegment>, last_version: Version) -> Self {
        Self {
            config,
            state: Mutex::new(WriterState {
                segment,
                last_version,
            }),
            poisoned: AtomicBool::new(false),
            stats: WriterStats::default(),
        }
    }

    /// Appends and (per policy) syncs a commit record.
    ///
    /// The record's version must directly follow the last appended one.
    pub fn append(&self, record: &CommitRecord) -> WalResult<()> {
        if self.poisoned.load(Ordering::Acquire) {
            return Err(WalError::Poisoned);
        }

        let payload = record.encode()?;
        if payload.len() > self.config.max_record_size {
            return Err(WalError::RecordTooLarge {
                size: payload.len(),
                max: self.config.max_record_size,
            });
        }
        let frame = encode_frame(&payload);

        let mut state = self.state.lock();
        let expected = state.last_version.next();
        if record.version != expected {
            return Err(WalError::VersionGap {
                expected,
                found: record.version,
            });
        }

        let mut segment = match state.segment.take() {
            Some(current) if !self.should_rotate(&current, frame.len()) => current,
            previous => {
                if let Some(mut old) = previous {
                    old.sync()?;
                    self.stats.syncs.fetch_add(1, Ordering::Relaxed);
                    self.stats.segment_rotations.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        segment = %old.path().display(),
                        size = old.write_pos(),
                        next = %record.version,
                        "Rotating commit log segment"
                    );
                }
                WalSegment::create(&self.config, record.version)?
            }
        };

        let start = segment.write_pos();
        let written = segment.append(&frame).and_then(|()| match self.config.sync_policy {
            SyncPolicy::EveryCommit => {
                self.stats.syncs.fetch_add(1, Ordering::Relaxed);
                segment.sync()
            }
            SyncPolicy::Never => Ok(()),
        });

        if let Err(e) = written {
            self.stats.rollbacks.fetch_add(1, Ordering::Relaxed);
            if let Err(rollback) = segment.truncate(start) {
                self.poisoned.store(true, Ordering::Release);
                error!(
                    segment = %segment.path().display(),
                    offset = start,
                    error = %rollback,
                    "Failed to roll back commit log append; log is poisoned"
                );
            }
            state.segment = Some(segment);
            return Err(e.into());
        }

        state.segment = Some(segment);
        state.last_version = record.version;
        self.stats
            .bytes_written
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
        self.stats.records_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn should_rotate(&self, segment: &WalSegment, frame_len: usize) -> bool {
        segment.has_records()
            && segment.write_pos() + frame_len as u64 > self.config.segment_size as u64
    }

    /// Syncs the active segment regardless of policy.
    pub fn sync(&self) -> WalResult<()> {
        let mut state = self.state.lock();
        if let Some(segment) = state.segment.as_mut() {
            segment.sync()?;
            self.stats.syncs.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Last appended version.
    pub fn last_version(&self) -> Version {
        self.state.lock().last_version
    }

    /// Returns true once a failed append could not be rolled back.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Writer statistics.
    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }
}
