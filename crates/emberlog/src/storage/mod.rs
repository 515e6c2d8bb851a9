//! On-disk storage: block payloads, segment files, hint sidecars, and the
//! manager that rotates segments under a size bound.
//!
//! Layering, bottom up:
//!
//! - [`block`]: the little-endian payload codec and the [`BlockMeta`]
//!   descriptor
//! - [`hint`]: the big-endian fixed-size sidecar records mirroring every
//!   persisted block
//! - [`segment`]: one `.vlog` + `.hint` file pair with raw byte append and
//!   positional read
//! - [`manager`]: active/older segment bookkeeping, rotation, and read
//!   dispatch by file id

pub mod block;
pub mod hint;
pub mod manager;
pub mod segment;

pub use block::{Block, BlockMeta, Point, BLOCK_HEADER_SIZE, ENCODED_POINT_SIZE};
pub use hint::{decode_hint, encode_hint, read_hint_file, HINT_RECORD_SIZE};
pub use manager::{SegmentManager, DEFAULT_MAX_SEGMENT_SIZE};
pub use segment::{segment_path, Segment, DATA_FILE_SUFFIX, HINT_FILE_SUFFIX};
