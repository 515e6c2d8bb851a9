//! Per-sensor series state: the hot write buffer and the cold block index.
//!
//! The write path must not hold the series lock across disk I/O. When a
//! buffer fills up (or goes stale), it is *stolen*: the full vector is
//! detached and handed to the caller, a fresh pre-reserved vector takes its
//! place, and the caller persists the batch entirely outside the series
//! lock. New appends proceed against the fresh buffer concurrently with the
//! flush.

use crate::storage::block::{BlockMeta, Point};
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct SeriesState {
    active_buffer: Vec<Point>,
    blocks: Vec<BlockMeta>,
    last_flush: Instant,
}

/// A named, append-only stream of points with a stable numeric id.
///
/// All mutable state sits behind one reader-writer lock. The id is assigned
/// by the catalog on first sight and never changes.
pub struct Series {
    id: u32,
    block_max_points: usize,
    force_flush_interval: Duration,
    state: RwLock<SeriesState>,
}

impl Series {
    /// Creates an empty series with the given flush thresholds.
    pub fn new(id: u32, block_max_points: usize, force_flush_interval: Duration) -> Self {
        Self {
            id,
            block_max_points,
            force_flush_interval,
            state: RwLock::new(SeriesState {
                active_buffer: Vec::with_capacity(block_max_points),
                blocks: Vec::new(),
                last_flush: Instant::now(),
            }),
        }
    }

    /// Returns the stable numeric id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Appends a point to the hot buffer.
    ///
    /// When the buffer reaches its point threshold the full batch is stolen
    /// and returned; the caller owns it and is responsible for persisting
    /// it. Otherwise returns `None`.
    pub fn append(&self, point: Point) -> Option<Vec<Point>> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        state.active_buffer.push(point);
        if state.active_buffer.len() >= self.block_max_points {
            return Some(self.steal_locked(&mut state));
        }
        None
    }

    /// Steals the buffer when it is non-empty and has not been flushed for
    /// at least the force-flush interval. Called by the background worker.
    pub fn check_for_flush(&self) -> Option<Vec<Point>> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        if !state.active_buffer.is_empty()
            && state.last_flush.elapsed() >= self.force_flush_interval
        {
            return Some(self.steal_locked(&mut state));
        }
        None
    }

    /// Unconditionally steals a non-empty buffer, regardless of thresholds.
    ///
    /// Used by the close-time drain so graceful shutdown leaves nothing
    /// behind in memory.
    pub fn take_buffer(&self) -> Option<Vec<Point>> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        if state.active_buffer.is_empty() {
            return None;
        }
        Some(self.steal_locked(&mut state))
    }

    fn steal_locked(&self, state: &mut SeriesState) -> Vec<Point> {
        let stolen = std::mem::replace(
            &mut state.active_buffer,
            Vec::with_capacity(self.block_max_points),
        );
        state.last_flush = Instant::now();
        stolen
    }

    /// Returns a copy of the hot buffer, safe to iterate while appends and
    /// steals continue.
    pub fn hot_data(&self) -> Vec<Point> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.active_buffer.clone()
    }

    /// Returns every block whose time bounds intersect `[start, end]`.
    ///
    /// This is a coarse filter: callers still filter individual points
    /// after reading the block.
    pub fn find_blocks(&self, start: i64, end: i64) -> Vec<BlockMeta> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .blocks
            .iter()
            .filter(|meta| meta.overlaps(start, end))
            .copied()
            .collect()
    }

    /// Registers a persisted block. Called by the flush path after the
    /// segment write succeeds, and by hint replay on startup.
    pub fn add_block_meta(&self, meta: BlockMeta) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.blocks.push(meta);
    }

    /// Number of points currently buffered in memory.
    pub fn buffered_len(&self) -> usize {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.active_buffer.len()
    }

    /// Number of persisted blocks this series knows about.
    pub fn block_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.blocks.len()
    }

    /// Rewinds the flush clock so timing paths can be tested without
    /// waiting out the real interval.
    #[cfg(test)]
    pub(crate) fn backdate_last_flush(&self, by: Duration) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.last_flush = Instant::now() - by;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_series() -> Series {
        Series::new(1, 4, Duration::from_secs(60))
    }

    fn meta(min_time: i64, max_time: i64, offset: i64) -> BlockMeta {
        BlockMeta {
            file_id: 0,
            min_time,
            max_time,
            offset,
            size: 24,
            count: 1,
        }
    }

    #[test]
    fn test_append_below_threshold() {
        let series = small_series();

        for i in 0..3 {
            assert!(series.append(Point::new(i, 0.0)).is_none());
        }
        assert_eq!(series.buffered_len(), 3);
    }

    #[test]
    fn test_append_steals_at_threshold() {
        let series = small_series();

        for i in 0..3 {
            assert!(series.append(Point::new(i, 0.0)).is_none());
        }
        let batch = series.append(Point::new(3, 0.0)).unwrap();

        assert_eq!(batch.len(), 4);
        assert_eq!(series.buffered_len(), 0);

        // The next append lands in the fresh buffer.
        assert!(series.append(Point::new(4, 0.0)).is_none());
        assert_eq!(series.buffered_len(), 1);
    }

    #[test]
    fn test_check_for_flush_requires_stale_buffer() {
        let series = small_series();
        series.append(Point::new(1, 1.0));

        // Recently flushed: nothing to do.
        assert!(series.check_for_flush().is_none());

        series.backdate_last_flush(Duration::from_secs(61));
        let batch = series.check_for_flush().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(series.buffered_len(), 0);
    }

    #[test]
    fn test_check_for_flush_ignores_empty_buffer() {
        let series = small_series();
        series.backdate_last_flush(Duration::from_secs(3600));
        assert!(series.check_for_flush().is_none());
    }

    #[test]
    fn test_steal_resets_flush_clock() {
        let series = small_series();
        series.backdate_last_flush(Duration::from_secs(3600));

        series.append(Point::new(1, 1.0));
        series.check_for_flush().unwrap();

        // Clock was reset by the steal; a fresh point is not stale.
        series.append(Point::new(2, 2.0));
        assert!(series.check_for_flush().is_none());
    }

    #[test]
    fn test_take_buffer() {
        let series = small_series();
        assert!(series.take_buffer().is_none());

        series.append(Point::new(1, 1.0));
        series.append(Point::new(2, 2.0));

        let batch = series.take_buffer().unwrap();
        assert_eq!(batch.len(), 2);
        assert!(series.take_buffer().is_none());
    }

    #[test]
    fn test_hot_data_is_a_copy() {
        let series = small_series();
        series.append(Point::new(1, 1.0));

        let snapshot = series.hot_data();
        series.append(Point::new(2, 2.0));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(series.hot_data().len(), 2);
    }

    #[test]
    fn test_find_blocks_intersection() {
        let series = small_series();
        series.add_block_meta(meta(0, 100, 0));
        series.add_block_meta(meta(200, 300, 24));
        series.add_block_meta(meta(400, 500, 48));

        let hits = series.find_blocks(250, 450);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].offset, 24);
        assert_eq!(hits[1].offset, 48);

        // Touching endpoints count as overlap.
        assert_eq!(series.find_blocks(100, 200).len(), 2);
        assert_eq!(series.find_blocks(301, 399).len(), 0);
    }
}
