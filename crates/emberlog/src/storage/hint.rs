//! Fixed-size hint records, the sidecar index for segment files.
//!
//! Every block append is mirrored by one 38-byte record in the segment's
//! `.hint` file. On startup the engine replays hint files instead of
//! scanning the much larger data files, which makes recovery time
//! proportional to the number of blocks rather than the number of points.
//!
//! Records are big-endian throughout, unlike block payloads. Both layouts
//! are load-bearing on-disk contracts.
//!
//! ```text
//! offset  size  field
//!   0      4    sensor_id
//!   4      4    file_id
//!   8      8    min_time
//!  16      8    max_time
//!  24      8    offset
//!  32      4    size
//!  36      2    count
//! ```

use crate::error::Result;
use crate::storage::block::BlockMeta;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

/// On-disk size of one hint record.
pub const HINT_RECORD_SIZE: usize = 38;

/// Serialises a sensor id and block meta into one fixed-size record.
pub fn encode_hint(sensor_id: u32, meta: &BlockMeta) -> [u8; HINT_RECORD_SIZE] {
    let mut buf = [0u8; HINT_RECORD_SIZE];
    buf[0..4].copy_from_slice(&sensor_id.to_be_bytes());
    buf[4..8].copy_from_slice(&meta.file_id.to_be_bytes());
    buf[8..16].copy_from_slice(&meta.min_time.to_be_bytes());
    buf[16..24].copy_from_slice(&meta.max_time.to_be_bytes());
    buf[24..32].copy_from_slice(&meta.offset.to_be_bytes());
    buf[32..36].copy_from_slice(&meta.size.to_be_bytes());
    buf[36..38].copy_from_slice(&meta.count.to_be_bytes());
    buf
}

/// Deserialises one fixed-size record back into its sensor id and meta.
pub fn decode_hint(buf: &[u8; HINT_RECORD_SIZE]) -> (u32, BlockMeta) {
    let sensor_id = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    let meta = BlockMeta {
        file_id: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
        min_time: i64::from_be_bytes(buf[8..16].try_into().unwrap()),
        max_time: i64::from_be_bytes(buf[16..24].try_into().unwrap()),
        offset: i64::from_be_bytes(buf[24..32].try_into().unwrap()),
        size: u32::from_be_bytes(buf[32..36].try_into().unwrap()),
        count: u16::from_be_bytes(buf[36..38].try_into().unwrap()),
    };
    (sensor_id, meta)
}

/// Reads every complete record from a hint file.
///
/// A short trailing read marks the end of valid data: a crash between the
/// data append and the hint append leaves at most one partial record, which
/// is silently discarded. Anything before it was written whole.
pub fn read_hint_file(path: &Path) -> Result<Vec<(u32, BlockMeta)>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut records = Vec::new();

    loop {
        let mut buf = [0u8; HINT_RECORD_SIZE];
        match reader.read_exact(&mut buf) {
            Ok(()) => records.push(decode_hint(&buf)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(records)
}
