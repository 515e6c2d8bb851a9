//! The storage engine facade.
//!
//! The engine wires the index, the series buffers, and the segment manager
//! into the public write/query surface and owns the background force-flush
//! worker.
//!
//! # Write path
//!
//! ```text
//! write(name, t, v) → Index.get_or_create → Series.append
//!                                             │ buffer full: steal
//!                                             ▼
//!                        Block → SegmentManager.write_block (+ hint record)
//!                                             ▼
//!                                   Series.add_block_meta
//! ```
//!
//! # Query path
//!
//! Cold blocks whose time bounds intersect the range are read and filtered
//! point-by-point, then the hot buffer snapshot is filtered the same way.
//! Results are cold-then-hot and not globally sorted; callers needing
//! sorted output sort themselves.
//!
//! # Recovery
//!
//! Startup replays `catalog.idx` first (restoring the `name ⇄ id` maps and
//! the id counter), then every `.hint` file in ascending segment order,
//! attaching each recovered block to its series. Data files are never
//! scanned. Hint records whose id is missing from the catalog are orphans
//! from a torn shutdown and are skipped.

use crate::error::{EngineError, Result};
use crate::index::Index;
use crate::index::Series;
use crate::storage::block::{Block, Point};
use crate::storage::manager::SegmentManager;
use crate::storage::hint::{read_hint_file, HINT_RECORD_SIZE};
use crate::storage::segment::{HINT_FILE_SUFFIX, SEGMENT_FILE_PREFIX};
use std::fs;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Default number of buffered points that triggers a flush.
pub const DEFAULT_BLOCK_MAX_POINTS: usize = 1000;

/// Default maximum time a non-empty buffer may sit unflushed.
pub const DEFAULT_FORCE_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// How often the background worker sweeps the series for stale buffers.
const WORKER_TICK: Duration = Duration::from_secs(1);

/// Configuration for [`Engine::open`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Data directory, created if absent.
    pub dir_path: PathBuf,
    /// Maximum segment size in bytes; 0 selects the 256 MiB default.
    pub max_segment_size: i64,
    /// Maximum time a non-empty buffer may sit unflushed.
    pub force_flush_interval: Duration,
    /// Number of buffered points that triggers a flush. At most 65535,
    /// the ceiling of the on-disk per-block count field.
    pub block_max_points: usize,
}

impl EngineConfig {
    /// Creates a configuration with default thresholds for `dir_path`.
    pub fn new(dir_path: impl Into<PathBuf>) -> Self {
        Self {
            dir_path: dir_path.into(),
            max_segment_size: 0,
            force_flush_interval: DEFAULT_FORCE_FLUSH_INTERVAL,
            block_max_points: DEFAULT_BLOCK_MAX_POINTS,
        }
    }

    /// Sets the maximum segment size in bytes.
    ///
    /// A negative size is meaningless and falls back to the default bound,
    /// the same as passing 0.
    pub fn with_max_segment_size(mut self, size: i64) -> Self {
        if size < 0 {
            warn!(size, "negative max_segment_size, using the default bound");
            self.max_segment_size = 0;
        } else {
            self.max_segment_size = size;
        }
        self
    }

    /// Sets the force-flush interval.
    pub fn with_force_flush_interval(mut self, interval: Duration) -> Self {
        self.force_flush_interval = interval;
        self
    }

    /// Sets the per-block point threshold.
    ///
    /// The on-disk block descriptor counts points in 16 bits, so values
    /// above 65535 are clamped to it.
    pub fn with_block_max_points(mut self, max_points: usize) -> Self {
        if max_points > u16::MAX as usize {
            warn!(max_points, "block_max_points exceeds 65535, clamping");
            self.block_max_points = u16::MAX as usize;
        } else {
            self.block_max_points = max_points;
        }
        self
    }
}

struct WorkerHandle {
    stop: mpsc::Sender<()>,
    thread: thread::JoinHandle<()>,
}

/// Append-only time-series storage engine.
///
/// One instance is shared by every caller; all methods take `&self` and the
/// engine is `Send + Sync`. Points buffered in memory are not durable until
/// their block flushes; a crash loses at most one buffer per series (see
/// the crate docs). [`Engine::close`] drains every buffer, so a graceful
/// shutdown loses nothing.
pub struct Engine {
    manager: Arc<SegmentManager>,
    index: Arc<Index>,
    worker: Mutex<Option<WorkerHandle>>,
    closed: AtomicBool,
}

impl Engine {
    /// Opens the engine over `config.dir_path`, recovering any existing
    /// state and starting the background flush worker.
    pub fn open(config: EngineConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir_path)?;

        let manager = Arc::new(SegmentManager::open(
            &config.dir_path,
            config.max_segment_size,
        )?);

        // Catalog before hints: hint records resolve ids through the
        // catalog maps.
        let index = Arc::new(Index::open(
            &config.dir_path,
            config.block_max_points,
            config.force_flush_interval,
        )?);
        replay_hints(&config.dir_path, &index)?;

        let worker = spawn_worker(Arc::clone(&index), Arc::clone(&manager))?;

        Ok(Self {
            manager,
            index,
            worker: Mutex::new(Some(worker)),
            closed: AtomicBool::new(false),
        })
    }

    /// Appends one sample to the named series, registering the series on
    /// first sight.
    ///
    /// When the series buffer reaches its point threshold, the whole batch
    /// is flushed before this call returns. A flush failure drops the
    /// batch; the error carries the cause.
    pub fn write(&self, name: &str, timestamp: i64, value: f64) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }

        let series = self.index.get_or_create(name)?;
        if let Some(batch) = series.append(Point::new(timestamp, value)) {
            flush_batch(&self.manager, &series, batch)?;
        }
        Ok(())
    }

    /// Returns every sample of the named series with `start <= t <= end`.
    ///
    /// Unknown names yield an empty result. Ordering is cold blocks first
    /// (in index order), then the hot buffer; not globally sorted.
    pub fn query(&self, name: &str, start: i64, end: i64) -> Result<Vec<Point>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }

        let series = self.index.get_or_create(name)?;
        let mut result = Vec::new();

        for meta in series.find_blocks(start, end) {
            let block = self.manager.read_block(&meta)?;
            result.extend(
                block
                    .points
                    .iter()
                    .filter(|p| p.time >= start && p.time <= end),
            );
        }

        result.extend(
            series
                .hot_data()
                .into_iter()
                .filter(|p| p.time >= start && p.time <= end),
        );

        Ok(result)
    }

    /// Snapshot of all known sensor names, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.index.keys()
    }

    /// Flushes every non-empty series buffer to disk.
    pub fn flush_all(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }
        self.drain_buffers()
    }

    /// Forces all segment and catalog contents to disk.
    pub fn sync(&self) -> Result<()> {
        self.manager.sync()?;
        self.index.sync()
    }

    /// Shuts the engine down: stops the worker, drains every buffer, and
    /// syncs all files. Idempotent; later calls return `Ok` immediately.
    ///
    /// The first error encountered is returned, but teardown always runs
    /// to completion.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(handle) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            drop(handle.stop);
            if handle.thread.join().is_err() {
                error!("flush worker panicked");
            }
        }

        let mut first_error = None;
        if let Err(e) = self.drain_buffers() {
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.manager.close() {
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.index.sync() {
            first_error.get_or_insert(e);
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    fn drain_buffers(&self) -> Result<()> {
        let mut first_error = None;
        for series in self.index.all_series() {
            if let Some(batch) = series.take_buffer() {
                if let Err(e) = flush_batch(&self.manager, &series, batch) {
                    error!(series = series.id(), %e, "drain flush failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Best effort: callers should close() and inspect the result.
        if let Err(e) = self.close() {
            warn!(%e, "failed to close engine on drop");
        }
    }
}

/// Persists a stolen batch and registers the resulting meta.
///
/// The batch is owned by the caller at this point; no series lock is held
/// across the segment write.
fn flush_batch(manager: &SegmentManager, series: &Series, batch: Vec<Point>) -> Result<()> {
    let block = Block::new(series.id(), batch);
    let meta = manager.write_block(&block)?;
    series.add_block_meta(meta);
    Ok(())
}

/// Replays every hint file in `dir` in ascending segment order.
fn replay_hints(dir: &Path, index: &Index) -> Result<()> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(SEGMENT_FILE_PREFIX) && n.ends_with(HINT_FILE_SUFFIX))
                .unwrap_or(false)
        })
        .collect();

    // Fixed-width zero-padded names: lexicographic order is id order, and
    // per-series block lists come back in the order they were written.
    paths.sort();

    for path in paths {
        let records = read_hint_file(&path)?;

        // A torn trailing record would misalign every record appended
        // after it. Drop the partial bytes before the segment takes new
        // appends.
        let valid_len = (records.len() * HINT_RECORD_SIZE) as u64;
        if fs::metadata(&path)?.len() > valid_len {
            warn!(path = %path.display(), valid_len, "truncating torn hint tail");
            OpenOptions::new().write(true).open(&path)?.set_len(valid_len)?;
        }

        let mut attached = 0usize;
        for (sensor_id, meta) in records {
            if index.attach_block(sensor_id, meta) {
                attached += 1;
            } else {
                warn!(sensor_id, path = %path.display(), "orphan hint record skipped");
            }
        }
        if attached > 0 {
            debug!(path = %path.display(), blocks = attached, "hint file replayed");
        }
    }

    Ok(())
}

/// Starts the ticker thread that force-flushes stale buffers.
///
/// Flush failures are logged and the sweep continues; the stolen batch is
/// dropped, matching the write path's no-WAL durability contract.
fn spawn_worker(index: Arc<Index>, manager: Arc<SegmentManager>) -> Result<WorkerHandle> {
    let (stop, stop_rx) = mpsc::channel::<()>();

    let thread = thread::Builder::new()
        .name("emberlog-flush".to_string())
        .spawn(move || loop {
            match stop_rx.recv_timeout(WORKER_TICK) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {}
            }

            for series in index.all_series() {
                if let Some(batch) = series.check_for_flush() {
                    let count = batch.len();
                    match flush_batch(&manager, &series, batch) {
                        Ok(()) => {
                            debug!(series = series.id(), points = count, "force-flushed buffer");
                        }
                        Err(e) => {
                            error!(series = series.id(), %e, "background flush failed");
                        }
                    }
                }
            }
        })?;

    Ok(WorkerHandle { stop, thread })
}
