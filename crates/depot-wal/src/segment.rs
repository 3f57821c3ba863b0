//! WAL segment files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut};

use depot_common::constants::{WAL_FORMAT_VERSION, WAL_MAGIC, WAL_SEGMENT_HEADER_SIZE};
use depot_common::Version;

use crate::config::WalConfig;
use crate::error::{WalError, WalResult};

/// Header at the start of every segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Version of the first record the segment holds.
    pub base_version: Version,
}

impl SegmentHeader {
    /// Serializes the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; WAL_SEGMENT_HEADER_SIZE] {
        let mut bytes = [0u8; WAL_SEGMENT_HEADER_SIZE];
        let mut buf = &mut bytes[..];
        buf.put_u32(WAL_MAGIC);
        buf.put_u32(WAL_FORMAT_VERSION);
        buf.put_u64(self.base_version.as_u64());
        bytes
    }

    /// Parses and validates a header.
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> WalResult<Self> {
        if bytes.len() < WAL_SEGMENT_HEADER_SIZE {
            return Err(WalError::segment_corrupted(path, 0, "truncated segment header"));
        }
        let mut buf = bytes;
        let magic = buf.get_u32();
        if magic != WAL_MAGIC {
            return Err(WalError::InvalidMagic {
                path: path.to_path_buf(),
                expected: WAL_MAGIC,
                found: magic,
            });
        }
        let format = buf.get_u32();
        if format != WAL_FORMAT_VERSION {
            return Err(WalError::UnsupportedVersion {
                path: path.to_path_buf(),
                expected: WAL_FORMAT_VERSION,
                found: format,
            });
        }
        Ok(Self {
            base_version: Version::new(buf.get_u64()),
        })
    }
}

/// Parses a segment's base version from its file name.
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let hex = stem.strip_prefix("wal_")?;
    if path.extension()? != "log" {
        return None;
    }
    u64::from_str_radix(hex, 16).ok()
}

/// Lists segment files in base-version order.
pub fn list_segments(dir: &Path) -> WalResult<Vec<(u64, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut segments: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter_map(|p| parse_segment_id(&p).map(|id| (id, p)))
        .collect();
    segments.sort_by_key(|(id, _)| *id);
    Ok(segments)
}

/// The segment currently being appended to.
#[derive(Debug)]
pub struct WalSegment {
    path: PathBuf,
    base_version: Version,
    file: File,
    write_pos: u64,
}

impl WalSegment {
    /// Creates a new segment whose first record will be `base_version`.
    pub fn create(config: &WalConfig, base_version: Version) -> WalResult<Self> {
        fs::create_dir_all(&config.dir)?;
        let path = config.segment_path(base_version.as_u64());
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let header = SegmentHeader { base_version };
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;
        sync_dir(&config.dir)?;

        Ok(Self {
            path,
            base_version,
            file,
            write_pos: WAL_SEGMENT_HEADER_SIZE as u64,
        })
    }

    /// Reopens a replayed segment for appending at `write_pos`.
    pub fn open(path: PathBuf, base_version: Version, write_pos: u64) -> WalResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self {
            path,
            base_version,
            file,
            write_pos,
        })
    }

    /// Appends bytes at the write position.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(self.write_pos))?;
        self.file.write_all(bytes)?;
        self.write_pos += bytes.len() as u64;
        Ok(())
    }

    /// Flushes file contents to stable storage.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    /// Cuts the file back to `pos`.
    pub fn truncate(&mut self, pos: u64) -> io::Result<()> {
        self.file.set_len(pos)?;
        self.file.sync_all()?;
        self.write_pos = pos;
        Ok(())
    }

    /// Segment file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Version of the first record in the segment.
    #[must_use]
    pub fn base_version(&self) -> Version {
        self.base_version
    }

    /// Current end of valid data.
    #[must_use]
    pub fn write_pos(&self) -> u64 {
        self.write_pos
    }

    /// Returns true if any frame follows the header.
    #[must_use]
    pub fn has_records(&self) -> bool {
        self.write_pos > WAL_SEGMENT_HEADER_SIZE as u64
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_header_roundtrip() {
        let header = SegmentHeader {
            base_version: Version::new(17),
        };
        let bytes = header.to_bytes();
        assert_eq!(SegmentHeader::from_bytes(Path::new("x"), &bytes).unwrap(), header);

        let mut bad = bytes;
        bad[0] = 0;
        assert!(matches!(
            SegmentHeader::from_bytes(Path::new("x"), &bad),
            Err(WalError::InvalidMagic { .. })
        ));
        let mut format = bytes;
        format[7] = 9;
        assert!(matches!(
            SegmentHeader::from_bytes(Path::new("x"), &format),
            Err(WalError::UnsupportedVersion { .. })
        ));
        assert!(SegmentHeader::from_bytes(Path::new("x"), &bytes[..8]).is_err());
    }

    #[test]
    fn test_parse_segment_id() {
        assert_eq!(parse_segment_id(Path::new("/d/wal_000000000000000a.log")), Some(10));
        assert_eq!(parse_segment_id(Path::new("/d/wal_zz.log")), None);
        assert_eq!(parse_segment_id(Path::new("/d/wal_0a.tmp")), None);
        assert_eq!(parse_segment_id(Path::new("/d/other.log")), None);
    }

    #[test]
    fn test_create_append_truncate() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path());
        let mut segment = WalSegment::create(&config, Version::new(5)).unwrap();
        assert!(!segment.has_records());
        assert_eq!(segment.base_version(), Version::new(5));

        segment.append(b"frame").unwrap();
        segment.sync().unwrap();
        assert!(segment.has_records());
        assert_eq!(
            fs::metadata(segment.path()).unwrap().len(),
            WAL_SEGMENT_HEADER_SIZE as u64 + 5
        );

        segment.truncate(WAL_SEGMENT_HEADER_SIZE as u64).unwrap();
        assert!(!segment.has_records());

        let listed = list_segments(dir.path()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, 5);
    }
}
