//! In-memory indexing: per-sensor series state and the durable catalog
//! mapping names to compact numeric ids.

pub mod catalog;
pub mod series;

pub use catalog::{
    encode_catalog_record, read_catalog_record, Index, CATALOG_FILE_NAME, CATALOG_HEADER_SIZE,
};
pub use series::Series;
