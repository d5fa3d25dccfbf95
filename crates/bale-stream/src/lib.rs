//! # bale-stream
//!
//! Byte-stream building blocks for the bale archive engine.
//!
//! ## Adapters
//!
//! ```text
//! HashingStream  - MD5 + byte count of everything read or written through it
//! TeeReader      - two independent readers over one underlying stream
//! OffsetWindow   - a byte range of a seekable stream as its own stream
//! SpillBuffer    - memory-first buffer that moves to a temp file past a threshold
//! ```
//!
//! ## Pipeline
//!
//! [`BoundedPipeline`] fans jobs out to a fixed number of worker threads and
//! hands results back to a single consumer in completion order.

pub mod hashing;
pub mod pipeline;
pub mod spool;
pub mod tee;
pub mod window;

pub use hashing::{md5_hex, HashingStream};
pub use pipeline::{BoundedPipeline, PipelineResults};
pub use spool::SpillBuffer;
pub use tee::{tee, TeeReader};
pub use window::OffsetWindow;

use std::io::{Read, Seek};

/// Readable and seekable byte source
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}
