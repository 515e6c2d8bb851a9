//! Segment manager: routes block writes to the active segment and rotates
//! it under a size bound.
//!
//! Exactly one segment accepts appends at any time. When the next block
//! would push the active segment past the size bound, the manager syncs it,
//! demotes it to the read-only set, and installs a fresh segment with the
//! next id. Segment ids are therefore dense from zero up to the active id.
//!
//! The rotation predicate uses the encoded length of the incoming block so
//! that a block is never split across two segments. A block larger than the
//! bound still lands whole in a fresh segment, which then exceeds the bound
//! by at most one block.

use crate::error::{EngineError, Result};
use crate::storage::block::{Block, BlockMeta};
use crate::storage::hint::encode_hint;
use crate::storage::segment::{Segment, DATA_FILE_SUFFIX, SEGMENT_FILE_PREFIX};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Default maximum segment size (256 MiB).
pub const DEFAULT_MAX_SEGMENT_SIZE: i64 = 256 * 1024 * 1024;

struct ManagerState {
    active: Arc<Segment>,
    older: HashMap<u32, Arc<Segment>>,
}

/// Owns the active segment and all read-only older segments.
pub struct SegmentManager {
    dir: PathBuf,
    max_segment_size: i64,
    state: RwLock<ManagerState>,
}

impl SegmentManager {
    /// Opens the manager over `dir`, loading any existing segments.
    ///
    /// The highest-id segment becomes active; all others are read-only. An
    /// empty directory gets a fresh segment 0. A non-positive
    /// `max_segment_size` selects the default bound.
    pub fn open(dir: &Path, max_segment_size: i64) -> Result<Self> {
        let max_segment_size = if max_segment_size <= 0 {
            DEFAULT_MAX_SEGMENT_SIZE
        } else {
            max_segment_size
        };

        let mut ids = list_segment_ids(dir)?;
        ids.sort_unstable();

        let mut older = HashMap::new();
        let active = match ids.last().copied() {
            None => Arc::new(Segment::open(dir, 0)?),
            Some(last) => {
                for &id in &ids[..ids.len() - 1] {
                    older.insert(id, Arc::new(Segment::open(dir, id)?));
                }
                Arc::new(Segment::open(dir, last)?)
            }
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            max_segment_size,
            state: RwLock::new(ManagerState { active, older }),
        })
    }

    /// Serialises `block`, appends it to the active segment (rotating first
    /// if it would overflow), mirrors it into the hint sidecar, and returns
    /// the resulting meta.
    pub fn write_block(&self, block: &Block) -> Result<BlockMeta> {
        if block.points.is_empty() {
            return Err(EngineError::EmptyBlock);
        }
        // The hint record's count field is 16-bit; refuse anything it
        // cannot represent before a single byte lands on disk.
        if block.points.len() > u16::MAX as usize {
            return Err(EngineError::BlockTooLarge(block.points.len()));
        }

        // Encode outside every lock; rotation decisions need the length.
        let encoded = block.encode();

        let active = self.active_for(encoded.len() as i64)?;
        let offset = active.append_data(&encoded)?;

        let meta = block
            .to_meta(active.id(), offset, encoded.len() as u32)
            .ok_or(EngineError::EmptyBlock)?;
        active.append_hint(&encode_hint(block.sensor_id, &meta))?;

        Ok(meta)
    }

    /// Returns the segment the next `incoming`-byte append should go to,
    /// rotating the active segment when it would overflow.
    fn active_for(&self, incoming: i64) -> Result<Arc<Segment>> {
        let observed = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            Arc::clone(&state.active)
        };

        if observed.size() + incoming <= self.max_segment_size {
            return Ok(observed);
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        // Another writer may have rotated between the shared observation and
        // this exclusive section; if so, the fresh active segment is used
        // as-is.
        if !Arc::ptr_eq(&state.active, &observed) {
            return Ok(Arc::clone(&state.active));
        }

        observed.sync()?;
        let next_id = observed.id() + 1;
        let fresh = Arc::new(Segment::open(&self.dir, next_id)?);
        debug!(
            from = observed.id(),
            to = next_id,
            size = observed.size(),
            "rotating segment"
        );

        state.older.insert(observed.id(), observed);
        state.active = Arc::clone(&fresh);
        Ok(fresh)
    }

    /// Reads and decodes the block described by `meta`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SegmentNotFound`] when `meta.file_id` matches
    /// neither the active segment nor any older one.
    pub fn read_block(&self, meta: &BlockMeta) -> Result<Block> {
        let segment = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            if state.active.id() == meta.file_id {
                Arc::clone(&state.active)
            } else {
                state
                    .older
                    .get(&meta.file_id)
                    .cloned()
                    .ok_or(EngineError::SegmentNotFound(meta.file_id))?
            }
        };

        let data = segment.read_at(meta.offset, meta.size)?;
        Block::decode(&data)
    }

    /// Fsyncs the active segment and all older segments.
    pub fn sync(&self) -> Result<()> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.active.sync()?;
        for segment in state.older.values() {
            segment.sync()?;
        }
        Ok(())
    }

    /// Syncs everything; file handles are released when the manager drops.
    pub fn close(&self) -> Result<()> {
        self.sync()
    }

    /// Id of the segment currently accepting appends.
    pub fn active_segment_id(&self) -> u32 {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.active.id()
    }

    /// Number of segments currently loaded, the active one included.
    pub fn segment_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.older.len() + 1
    }
}

/// Parses segment ids out of the `seg-NNNNNN.vlog` files in `dir`.
fn list_segment_ids(dir: &Path) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name
            .strip_prefix(SEGMENT_FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(DATA_FILE_SUFFIX))
        else {
            continue;
        };
        if let Ok(id) = stem.parse::<u32>() {
            ids.push(id);
        }
    }
    Ok(ids)
}
