//! # walredact storage
//!
//! Segment file sources and sinks for walredact.
//!
//! This crate moves WAL bytes in and out of segment files. Sources and sinks
//! are **opaque byte streams** - they know how segment files are named and
//! where one file ends and the next begins, but nothing about page headers,
//! records or checksums.
//!
//! ## Design Principles
//!
//! - Purely sequential: no seeking backward, no random-access writes
//! - Positions are absolute WAL byte offsets, not file offsets
//! - A missing segment in the middle of a run is an error
//! - The core crate owns all format interpretation
//!
//! ## Available Implementations
//!
//! - [`SegmentedByteSource`] / [`SegmentWriter`] - Segment files on disk
//! - [`MemorySource`] / [`MemorySink`] - For testing
//!
//! ## Example
//!
//! ```rust
//! use walredact_storage::{MemorySink, MemorySource, WalSink, WalSource};
//!
//! let mut source = MemorySource::new(0, b"wal bytes".to_vec());
//! let mut sink = MemorySink::new(0);
//! let data = source.read(9).unwrap();
//! sink.write(&data).unwrap();
//! assert_eq!(sink.data(), b"wal bytes");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod name;

pub use backend::{WalSink, WalSource};
pub use error::{StorageError, StorageResult};
pub use file::{SegmentWriter, SegmentedByteSource};
pub use memory::{MemorySink, MemorySource};
pub use name::{segments_per_log_id, SegmentName, SEGMENT_NAME_LEN};
