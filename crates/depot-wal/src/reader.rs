//! WAL replay.
//!
//! Segments are read in base-version order. Each frame is checked for
//! length and checksum; the first damaged frame of the newest segment marks
//! the end of the log and everything from it on is truncated. Records at or
//! below the already-applied version are skipped, so replaying twice is
//! harmless.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use bytes::Buf;
use tracing::{debug, warn};

use depot_common::constants::{MAX_WAL_RECORD_SIZE, WAL_FRAME_HEADER_SIZE, WAL_SEGMENT_HEADER_SIZE};
use depot_common::Version;

use crate::config::WalConfig;
use crate::error::{WalError, WalResult};
use crate::record::{checksum, CommitRecord};
use crate::segment::{list_segments, SegmentHeader};

/// What a replay found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Segment files read.
    pub segments: usize,
    /// Records handed to the apply callback.
    pub records_applied: u64,
    /// Records at or below the applied version.
    pub records_skipped: u64,
    /// Newest version in the log (or the applied version if newer).
    pub last_version: Version,
    /// Bytes cut from a torn tail.
    pub truncated_bytes: u64,
}

/// The newest segment after replay, ready for appending.
#[derive(Debug)]
pub(crate) struct Tail {
    pub path: PathBuf,
    pub base_version: Version,
    pub write_pos: u64,
}

/// Replays every record newer than `applied` through `apply`.
pub(crate) fn replay<F>(
    config: &WalConfig,
    applied: Version,
    mut apply: F,
) -> WalResult<(ReplaySummary, Option<Tail>)>
where
    F: FnMut(CommitRecord) -> WalResult<()>,
{
    let segments = list_segments(&config.dir)?;
    let mut summary = ReplaySummary {
        segments: segments.len(),
        last_version: applied,
        ..ReplaySummary::default()
    };
    let mut last_seen: Option<Version> = None;
    let mut tail = None;

    for (index, (id, path)) in segments.iter().enumerate() {
        let is_last = index + 1 == segments.len();
        let data = fs::read(path)?;

        if data.len() < WAL_SEGMENT_HEADER_SIZE {
            if is_last {
                warn!(segment = %path.display(), len = data.len(), "Removing segment with torn header");
                fs::remove_file(path)?;
                summary.truncated_bytes += data.len() as u64;
                summary.segments -= 1;
                break;
            }
            return Err(WalError::segment_corrupted(path, 0, "truncated segment header"));
        }
        let header = SegmentHeader::from_bytes(path, &data)?;
        if header.base_version.as_u64() != *id {
            return Err(WalError::segment_corrupted(
                path,
                0,
                format!("header base version {} does not match file name", header.base_version),
            ));
        }

        let mut pos = WAL_SEGMENT_HEADER_SIZE;
        let mut first_in_segment = true;
        while pos < data.len() {
            let torn = match frame_at(&data, pos) {
                Ok(payload) => {
                    let record = CommitRecord::decode(payload).map_err(|e| {
                        WalError::segment_corrupted(path, pos as u64, e.to_string())
                    })?;
                    if first_in_segment && record.version != header.base_version {
                        return Err(WalError::segment_corrupted(
                            path,
                            pos as u64,
                            format!(
                                "first record {} does not match segment base {}",
                                record.version, header.base_version
                            ),
                        ));
                    }
                    check_sequence(last_seen, applied, record.version)?;
                    first_in_segment = false;
                    last_seen = Some(record.version);
                    pos += WAL_FRAME_HEADER_SIZE + payload.len();

                    if record.version <= applied {
                        summary.records_skipped += 1;
                    } else {
                        let version = record.version;
                        apply(record).map_err(|e| match e {
                            WalError::ApplyFailed { .. } => e,
                            other => WalError::ApplyFailed {
                                version,
                                reason: other.to_string(),
                            },
                        })?;
                        summary.records_applied += 1;
                    }
                    continue;
                }
                Err(reason) => reason,
            };

            if !is_last {
                return Err(WalError::segment_corrupted(path, pos as u64, torn));
            }
            let cut = (data.len() - pos) as u64;
            warn!(
                segment = %path.display(),
                offset = pos,
                bytes = cut,
                reason = torn,
                "Truncating torn tail of commit log"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(pos as u64)?;
            file.sync_all()?;
            summary.truncated_bytes += cut;
            break;
        }

        debug!(segment = %path.display(), end = pos, "Replayed segment");
        if is_last {
            tail = Some(Tail {
                path: path.clone(),
                base_version: header.base_version,
                write_pos: pos as u64,
            });
        }
    }

    if let Some(last) = last_seen {
        summary.last_version = summary.last_version.max(last);
    }
    Ok((summary, tail))
}

/// Returns the payload of the frame at `pos`, or why the frame is torn.
fn frame_at(data: &[u8], pos: usize) -> Result<&[u8], &'static str> {
    let mut header = &data[pos..];
    if header.remaining() < WAL_FRAME_HEADER_SIZE {
        return Err("truncated frame header");
    }
    let len = header.get_u32() as usize;
    let crc = header.get_u32();
    if len > MAX_WAL_RECORD_SIZE {
        return Err("frame length out of range");
    }
    let start = pos + WAL_FRAME_HEADER_SIZE;
    let payload = data.get(start..start + len).ok_or("truncated frame payload")?;
    if checksum(payload) != crc {
        return Err("checksum mismatch");
    }
    Ok(payload)
}

fn check_sequence(last_seen: Option<Version>, applied: Version, found: Version) -> WalResult<()> {
    let ok = match last_seen {
        Some(last) => found == last.next(),
        None => found <= applied.next(),
    };
    if ok {
        Ok(())
    } else {
        Err(WalError::VersionGap {
            expected: last_seen.unwrap_or(applied).next(),
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_sequence() {
        let v = Version::new;
        assert!(check_sequence(None, v(0), v(1)).is_ok());
        assert!(check_sequence(None, v(5), v(3)).is_ok());
        assert!(check_sequence(None, v(0), v(2)).is_err());
        assert!(check_sequence(Some(v(3)), v(0), v(4)).is_ok());
        assert!(matches!(
            check_sequence(Some(v(3)), v(0), v(6)),
            Err(WalError::VersionGap { .. })
        ));
        assert!(check_sequence(Some(v(3)), v(0), v(3)).is_err());
    }

    #[test]
    fn test_frame_at() {
        let frame = crate::record::encode_frame(b"abc");
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&frame);
        assert_eq!(frame_at(&data, 4), Ok(&b"abc"[..]));
        assert_eq!(frame_at(&data[..data.len() - 1], 4), Err("truncated frame payload"));
        assert_eq!(frame_at(&data[..8], 4), Err("truncated frame header"));

        let mut flipped = data.clone();
        let last = flipped.len() - 1;
        flipped[last] ^= 0xff;
        assert_eq!(frame_at(&flipped, 4), Err("checksum mismatch"));
    }
}
