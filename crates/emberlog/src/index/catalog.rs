//! The series catalog: durable `name ⇄ id` mapping and series lookup.
//!
//! Sensor names are free-form strings; on disk and in hint records a series
//! is identified by a compact `u32`. The catalog file records every
//! assignment as an append-only sequence of variable-length records:
//!
//! ```text
//! id: u32 (big-endian) | name_len: u16 (big-endian) | name bytes (UTF-8)
//! ```
//!
//! A record is appended *before* the new series becomes visible to other
//! threads, so any id a hint file can mention was persisted first. On
//! startup the catalog is replayed before hint files for the same reason.

use crate::error::{EngineError, Result};
use crate::index::series::Series;
use crate::storage::block::BlockMeta;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Name of the catalog file inside the data directory.
pub const CATALOG_FILE_NAME: &str = "catalog.idx";

/// Fixed-size prefix of a catalog record (id + name length).
pub const CATALOG_HEADER_SIZE: usize = 6;

/// Serialises one catalog record.
pub fn encode_catalog_record(id: u32, name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CATALOG_HEADER_SIZE + name.len());
    buf.extend_from_slice(&id.to_be_bytes());
    buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf
}

/// Reads the next catalog record, or `None` at end of valid data.
///
/// A short read, in the header or in the name bytes, means the process died
/// mid-append; the partial record is discarded and replay stops. Name bytes
/// that are not UTF-8 are treated as corruption and abort startup.
pub fn read_catalog_record(
    reader: &mut impl Read,
    path: &Path,
) -> Result<Option<(u32, String)>> {
    let mut header = [0u8; CATALOG_HEADER_SIZE];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let id = u32::from_be_bytes(header[0..4].try_into().unwrap());
    let name_len = u16::from_be_bytes(header[4..6].try_into().unwrap()) as usize;

    let mut name_buf = vec![0u8; name_len];
    match reader.read_exact(&mut name_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let name = String::from_utf8(name_buf).map_err(|_| EngineError::Corruption {
        file: path.to_path_buf(),
        reason: format!("series {} has a non-UTF-8 name", id),
    })?;

    Ok(Some((id, name)))
}

struct IndexState {
    series_by_name: HashMap<String, Arc<Series>>,
    name_by_id: HashMap<u32, String>,
    next_id: u32,
    catalog: File,
}

/// In-memory series index backed by the catalog file.
///
/// One reader-writer lock guards both maps, the id counter, and catalog
/// appends, so a series can never be observed without its record being on
/// its way to disk.
pub struct Index {
    path: PathBuf,
    block_max_points: usize,
    force_flush_interval: Duration,
    state: RwLock<IndexState>,
}

impl Index {
    /// Opens the catalog inside `dir` and replays it into memory.
    ///
    /// Every recorded series is recreated empty (hint replay attaches its
    /// blocks afterwards) and `next_id` resumes past the highest seen id.
    pub fn open(dir: &Path, block_max_points: usize, force_flush_interval: Duration) -> Result<Self> {
        let path = dir.join(CATALOG_FILE_NAME);
        let catalog = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut series_by_name = HashMap::new();
        let mut name_by_id = HashMap::new();
        let mut max_id = 0u32;
        let mut valid_len = 0u64;

        let mut reader = BufReader::new(File::open(&path)?);
        while let Some((id, name)) = read_catalog_record(&mut reader, &path)? {
            valid_len += (CATALOG_HEADER_SIZE + name.len()) as u64;
            let series = Arc::new(Series::new(id, block_max_points, force_flush_interval));
            name_by_id.insert(id, name.clone());
            series_by_name.insert(name, series);
            max_id = max_id.max(id);
        }

        // A torn trailing record marks an id that was allocated but never
        // used. Drop it so later appends stay record-aligned; the id is
        // reassigned as the counter advances past it.
        if catalog.metadata()?.len() > valid_len {
            warn!(path = %path.display(), valid_len, "truncating torn catalog tail");
            catalog.set_len(valid_len)?;
        }

        if !series_by_name.is_empty() {
            debug!(series = series_by_name.len(), max_id, "catalog replayed");
        }

        Ok(Self {
            path,
            block_max_points,
            force_flush_interval,
            state: RwLock::new(IndexState {
                series_by_name,
                name_by_id,
                next_id: max_id + 1,
                catalog,
            }),
        })
    }

    /// Looks up a series by name, registering it on first sight.
    ///
    /// Registration appends the catalog record before the series is
    /// inserted into the maps; if that append fails, the id allocation is
    /// rolled back and the error surfaces to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SensorNameTooLong`] when the name does not
    /// fit the on-disk u16 length field.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<Series>> {
        if name.len() > u16::MAX as usize {
            return Err(EngineError::SensorNameTooLong(name.len()));
        }

        // Fast path: almost every call finds the series already registered.
        {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            if let Some(series) = state.series_by_name.get(name) {
                return Ok(Arc::clone(series));
            }
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        // Double check: another thread may have registered it meanwhile.
        if let Some(series) = state.series_by_name.get(name) {
            return Ok(Arc::clone(series));
        }

        let id = state.next_id;
        state.catalog.write_all(&encode_catalog_record(id, name))?;
        state.next_id += 1;

        let series = Arc::new(Series::new(
            id,
            self.block_max_points,
            self.force_flush_interval,
        ));
        state.name_by_id.insert(id, name.to_string());
        state
            .series_by_name
            .insert(name.to_string(), Arc::clone(&series));

        Ok(series)
    }

    /// Attaches a recovered block to the series owning `sensor_id`.
    ///
    /// Returns `false` when the id is unknown to the catalog, which means
    /// the hint record is an orphan and should be skipped.
    pub fn attach_block(&self, sensor_id: u32, meta: BlockMeta) -> bool {
        let series = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            let Some(name) = state.name_by_id.get(&sensor_id) else {
                return false;
            };
            match state.series_by_name.get(name) {
                Some(series) => Arc::clone(series),
                None => return false,
            }
        };

        series.add_block_meta(meta);
        true
    }

    /// Snapshot of all registered sensor names, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.series_by_name.keys().cloned().collect()
    }

    /// Snapshot of all series handles.
    ///
    /// Only pointers are copied under the lock; the background worker
    /// iterates the snapshot at leisure while registrations continue.
    pub fn all_series(&self) -> Vec<Arc<Series>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.series_by_name.values().cloned().collect()
    }

    /// Forces the catalog file contents to disk.
    pub fn sync(&self) -> Result<()> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.catalog.sync_all()?;
        Ok(())
    }

    /// Number of registered series.
    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.series_by_name.len()
    }

    /// True when no series has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the backing catalog file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn next_id(&self) -> u32 {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.next_id
    }
}
