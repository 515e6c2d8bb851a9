//! Error and Result types for engine operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// The error type for storage engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A block referenced a segment file that is not loaded.
    #[error("segment {0} not found")]
    SegmentNotFound(u32),

    /// Decoded block header disagrees with the payload length.
    #[error("block payload size mismatch: header implies {expected} bytes, got {actual}")]
    BlockSizeMismatch {
        /// Byte length implied by the decoded point count.
        expected: usize,
        /// Actual payload length handed to the decoder.
        actual: usize,
    },

    /// A file contains garbage that cannot be interpreted as records.
    #[error("corrupt data in {file}: {reason}")]
    Corruption {
        /// File the bad bytes were read from.
        file: PathBuf,
        /// What failed to parse.
        reason: String,
    },

    /// Sensor name does not fit the on-disk u16 length field.
    #[error("sensor name is {0} bytes, exceeding the 65535 byte limit")]
    SensorNameTooLong(usize),

    /// Attempted to persist a block with no points.
    #[error("refusing to write an empty block")]
    EmptyBlock,

    /// Block holds more points than the on-disk count field can record.
    #[error("block has {0} points, exceeding the 65535 per-block limit")]
    BlockTooLarge(usize),

    /// Operation issued after the engine was closed.
    #[error("engine is closed")]
    Closed,
}
