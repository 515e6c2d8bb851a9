//! Block payload encoding for `.vlog` segment files.
//!
//! A block is the unit of persistence: up to a configured number of points
//! from a single series, laid out as a contiguous little-endian byte
//! sequence. There is no per-block framing or checksum; blocks are located
//! exclusively through the offset and size recorded in their [`BlockMeta`].
//!
//! ```text
//! offset  size  field
//!   0      4    sensor_id     (little-endian u32)
//!   4      4    point_count   (little-endian u32)
//!   8    16*N   points        (each: i64 timestamp, f64 value, little-endian)
//! ```

use crate::error::{EngineError, Result};

/// On-disk size of a single encoded point.
pub const ENCODED_POINT_SIZE: usize = 16;

/// On-disk size of the block header preceding the points.
pub const BLOCK_HEADER_SIZE: usize = 8;

/// One `(timestamp, value)` sample.
///
/// Timestamps are opaque integers. The engine never interprets them against
/// wall-clock time; clients conventionally use milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Sample timestamp.
    pub time: i64,
    /// Sampled value.
    pub value: f64,
}

impl Point {
    /// Creates a new point.
    pub fn new(time: i64, value: f64) -> Self {
        Self { time, value }
    }
}

/// A batch of points from one series, the unit of persistence.
///
/// Blocks are transient: constructed during a flush, serialised into the
/// active segment, then discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Numeric id of the owning series.
    pub sensor_id: u32,
    /// Points in append order.
    pub points: Vec<Point>,
}

impl Block {
    /// Creates a block for the given series id.
    pub fn new(sensor_id: u32, points: Vec<Point>) -> Self {
        Self { sensor_id, points }
    }

    /// Serialises the block into its on-disk byte layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BLOCK_HEADER_SIZE + self.points.len() * ENCODED_POINT_SIZE);
        buf.extend_from_slice(&self.sensor_id.to_le_bytes());
        buf.extend_from_slice(&(self.points.len() as u32).to_le_bytes());
        for point in &self.points {
            buf.extend_from_slice(&point.time.to_le_bytes());
            buf.extend_from_slice(&point.value.to_le_bytes());
        }
        buf
    }

    /// Deserialises a block from the exact byte range recorded in its meta.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BlockSizeMismatch`] when the header's point
    /// count disagrees with the payload length.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < BLOCK_HEADER_SIZE {
            return Err(EngineError::BlockSizeMismatch {
                expected: BLOCK_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let sensor_id = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let count = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;

        let expected = BLOCK_HEADER_SIZE + count * ENCODED_POINT_SIZE;
        if data.len() != expected {
            return Err(EngineError::BlockSizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let mut points = Vec::with_capacity(count);
        let mut offset = BLOCK_HEADER_SIZE;
        for _ in 0..count {
            let time = i64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());
            let value = f64::from_le_bytes(data[offset + 8..offset + 16].try_into().unwrap());
            points.push(Point { time, value });
            offset += ENCODED_POINT_SIZE;
        }

        Ok(Self { sensor_id, points })
    }

    /// Builds the in-memory descriptor for this block once it has landed in
    /// a segment. Returns `None` for an empty block, or for one with more
    /// points than the descriptor's 16-bit count field can record.
    ///
    /// The time bounds are taken from the first and last point; callers are
    /// expected to append in ascending timestamp order.
    pub fn to_meta(&self, file_id: u32, offset: i64, size: u32) -> Option<BlockMeta> {
        if self.points.len() > u16::MAX as usize {
            return None;
        }
        let first = self.points.first()?;
        let last = self.points.last()?;
        Some(BlockMeta {
            file_id,
            min_time: first.time,
            max_time: last.time,
            offset,
            size,
            count: self.points.len() as u16,
        })
    }
}

/// In-memory descriptor of a persisted block.
///
/// Metas live for the lifetime of the process and are reconstructed from
/// hint files on restart. The `(file_id, offset)` pair is unique across the
/// whole data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeta {
    /// Segment file containing the block.
    pub file_id: u32,
    /// Timestamp of the block's first point.
    pub min_time: i64,
    /// Timestamp of the block's last point.
    pub max_time: i64,
    /// Byte offset of the encoded block within the segment.
    pub offset: i64,
    /// Encoded length in bytes.
    pub size: u32,
    /// Number of points in the block.
    pub count: u16,
}

impl BlockMeta {
    /// True when the block's time bounds intersect `[start, end]`.
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.max_time >= start && self.min_time <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        Block::new(
            7,
            vec![
                Point::new(1000, 1.1),
                Point::new(2000, 2.2),
                Point::new(3000, 3.3),
            ],
        )
    }

    #[test]
    fn test_encode_layout() {
        let block = Block::new(1, vec![Point::new(0x0102, 1.0)]);
        let data = block.encode();

        assert_eq!(data.len(), BLOCK_HEADER_SIZE + ENCODED_POINT_SIZE);
        assert_eq!(&data[0..4], &1u32.to_le_bytes());
        assert_eq!(&data[4..8], &1u32.to_le_bytes());
        assert_eq!(&data[8..16], &0x0102i64.to_le_bytes());
        assert_eq!(&data[16..24], &1.0f64.to_le_bytes());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let block = sample_block();
        let decoded = Block::decode(&block.encode()).unwrap();
        assert_eq!(block, decoded);
    }

    #[test]
    fn test_decode_empty_payload() {
        let block = Block::new(9, Vec::new());
        let decoded = Block::decode(&block.encode()).unwrap();
        assert_eq!(decoded.sensor_id, 9);
        assert!(decoded.points.is_empty());
    }

    #[test]
    fn test_decode_size_mismatch() {
        let mut data = sample_block().encode();
        data.truncate(data.len() - 1);

        let result = Block::decode(&data);
        assert!(matches!(
            result,
            Err(EngineError::BlockSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_short_header() {
        let result = Block::decode(&[0u8; 5]);
        assert!(matches!(
            result,
            Err(EngineError::BlockSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_to_meta_bounds_from_endpoints() {
        let block = sample_block();
        let meta = block.to_meta(10, 100, 50).unwrap();

        assert_eq!(meta.file_id, 10);
        assert_eq!(meta.min_time, 1000);
        assert_eq!(meta.max_time, 3000);
        assert_eq!(meta.offset, 100);
        assert_eq!(meta.size, 50);
        assert_eq!(meta.count, 3);
    }

    #[test]
    fn test_to_meta_single_point() {
        let block = Block::new(2, vec![Point::new(77, 7.7)]);
        let meta = block.to_meta(0, 0, 24).unwrap();

        assert_eq!(meta.min_time, 77);
        assert_eq!(meta.max_time, 77);
        assert_eq!(meta.count, 1);
    }

    #[test]
    fn test_to_meta_empty_block() {
        let block = Block::new(1, Vec::new());
        assert!(block.to_meta(0, 0, 0).is_none());
    }

    #[test]
    fn test_to_meta_refuses_uncountable_block() {
        let points = vec![Point::new(0, 0.0); u16::MAX as usize + 1];
        let block = Block::new(1, points);
        assert!(block.to_meta(0, 0, 0).is_none());

        let points = vec![Point::new(0, 0.0); u16::MAX as usize];
        let block = Block::new(1, points);
        assert_eq!(block.to_meta(0, 0, 0).unwrap().count, u16::MAX);
    }

    #[test]
    fn test_overlaps() {
        let meta = sample_block().to_meta(0, 0, 0).unwrap();

        assert!(meta.overlaps(0, 5000));
        assert!(meta.overlaps(3000, 5000));
        assert!(meta.overlaps(0, 1000));
        assert!(meta.overlaps(1500, 2500));
        assert!(!meta.overlaps(3001, 5000));
        assert!(!meta.overlaps(0, 999));
    }
}
