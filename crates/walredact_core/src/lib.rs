//! # walredact core
//!
//! WAL format handling and the redaction filter for walredact.
//!
//! This crate provides:
//! - [`Lsn`] positions and [`WalGeometry`] segment/page sizes
//! - Page header, record header and relation id codecs
//! - [`PageFramingReader`] for reading payload with framing removed
//! - [`classify`] for splitting raw bytes into framing and payload
//! - [`RecordFilter`], the streaming redaction state machine
//! - [`WalRecordIterator`] for decoding whole records
//!
//! ## Example
//!
//! ```rust,ignore
//! use walredact_core::{filter_stream, FilterConfig, RelationId};
//! use walredact_storage::{SegmentWriter, SegmentedByteSource};
//!
//! let config = FilterConfig::new().exclude("1663,13993,16397".parse()?);
//! let source = SegmentedByteSource::open_path(&first, config.geometry.segment_size)?;
//! let sink = SegmentWriter::create(&out_dir, name, config.geometry.segment_size)?;
//! let (_, stats) = filter_stream(source, sink, config)?;
//! println!("redacted {} records", stats.redacted);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod lsn;
pub mod rmgr;
pub mod wal;

pub use config::{FilterConfig, WalGeometry, DEFAULT_PAGE_SIZE, DEFAULT_SEGMENT_SIZE};
pub use error::{CoreError, CoreResult};
pub use lsn::{Lsn, RECORD_ALIGNMENT};
pub use rmgr::ResourceManager;
pub use wal::{
    classify, filter_stream, record_checksum, BackupBlock, Chunk, ChunkKind, CopyMode,
    DecodedBlock, DecodedRecord, Expect, FilterState, FilterStats, LongPageHeader, PageHeader,
    PageFramingReader, RecordCrc, RecordFilter, RecordHeader, RelationId, WalRecordIterator,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
