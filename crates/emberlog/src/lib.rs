//! Emberlog - append-only time-series storage engine for sensor telemetry.
//!
//! Clients identify a logical time series by a free-form sensor name and send
//! ordered `(timestamp, value)` samples; they later retrieve every sample of a
//! series whose timestamp falls in an inclusive range. The engine buffers
//! points per series in memory, batches them into fixed-layout blocks inside
//! append-only segment files, and rebuilds its entire index from sidecar hint
//! files and the series catalog on restart.
//!
//! # Components
//!
//! - [`Engine`]: the facade orchestrating the write path, the query path,
//!   startup recovery, and the background force-flush worker
//! - [`SegmentManager`] / [`Segment`]: rotated `.vlog` data files with their
//!   `.hint` sidecars
//! - [`Series`]: per-sensor hot buffer plus the cold block index
//! - [`Index`]: the `name ⇄ id` catalog and series lookup
//!
//! # Example
//!
//! ```rust,ignore
//! use emberlog::{Engine, EngineConfig};
//!
//! let engine = Engine::open(EngineConfig::new("/var/lib/emberlog"))?;
//!
//! engine.write("machine-7/temp", 1_700_000_000_000, 21.5)?;
//! let points = engine.query("machine-7/temp", 0, i64::MAX)?;
//!
//! engine.close()?;
//! ```
//!
//! # Durability
//!
//! There is no write-ahead log. A point is durable once its block has been
//! flushed, which happens when a series buffer reaches
//! [`DEFAULT_BLOCK_MAX_POINTS`](engine::DEFAULT_BLOCK_MAX_POINTS) points,
//! when the force-flush interval elapses, or on [`Engine::close`]. An abrupt
//! crash can lose at most one buffer per series.

#![deny(missing_docs)]

pub mod engine;
pub mod error;
pub mod index;
pub mod storage;

pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, Result};
pub use index::{Index, Series};
pub use storage::{Block, BlockMeta, Point, Segment, SegmentManager};
