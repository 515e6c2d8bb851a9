//! Physical segment files: one `.vlog` data file plus its `.hint` sidecar.
//!
//! A segment is a dumb byte store. It appends and positionally reads raw
//! bytes; block semantics live a layer up in the manager. Both file handles
//! are opened create-if-absent in read-write append mode, and the write
//! cursor is initialised from the data file's on-disk length so reopening a
//! segment resumes exactly where the previous process stopped.

use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Prefix shared by all segment file names.
pub const SEGMENT_FILE_PREFIX: &str = "seg-";

/// Extension of segment data files.
pub const DATA_FILE_SUFFIX: &str = ".vlog";

/// Extension of segment hint sidecar files.
pub const HINT_FILE_SUFFIX: &str = ".hint";

/// Builds the path of a segment file, zero-padding the id to six digits.
///
/// Fixed-width names make lexicographic directory order equal creation
/// order, which hint replay relies on.
pub fn segment_path(dir: &Path, id: u32, suffix: &str) -> PathBuf {
    dir.join(format!("{}{:06}{}", SEGMENT_FILE_PREFIX, id, suffix))
}

struct SegmentFiles {
    data: File,
    hint: File,
    write_offset: i64,
}

/// An append-only data file paired with its hint sidecar.
///
/// Writers are exclusive, readers shared. Positional reads may run
/// concurrently with appends because they never touch the shared cursor.
pub struct Segment {
    id: u32,
    files: RwLock<SegmentFiles>,
}

impl Segment {
    /// Opens or creates the segment file pair for `id` inside `dir`.
    pub fn open(dir: &Path, id: u32) -> Result<Self> {
        let data = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(segment_path(dir, id, DATA_FILE_SUFFIX))?;
        let hint = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(segment_path(dir, id, HINT_FILE_SUFFIX))?;

        let write_offset = data.metadata()?.len() as i64;

        Ok(Self {
            id,
            files: RwLock::new(SegmentFiles {
                data,
                hint,
                write_offset,
            }),
        })
    }

    /// Returns the segment id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Appends raw bytes to the data file, returning the pre-write offset.
    pub fn append_data(&self, data: &[u8]) -> Result<i64> {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());

        let offset = files.write_offset;
        files.data.write_all(data)?;
        files.write_offset += data.len() as i64;

        Ok(offset)
    }

    /// Appends one record to the hint sidecar.
    pub fn append_hint(&self, record: &[u8]) -> Result<()> {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.hint.write_all(record)?;
        Ok(())
    }

    /// Reads `size` bytes at `offset` from the data file.
    pub fn read_at(&self, offset: i64, size: u32) -> Result<Vec<u8>> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());

        let mut buf = vec![0u8; size as usize];
        files.data.read_exact_at(&mut buf, offset as u64)?;

        Ok(buf)
    }

    /// Current write cursor, equal to the data file length.
    pub fn size(&self) -> i64 {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files.write_offset
    }

    /// Forces both files' page-cache contents to disk.
    pub fn sync(&self) -> Result<()> {
        let files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.data.sync_all()?;
        files.hint.sync_all()?;
        Ok(())
    }
}
