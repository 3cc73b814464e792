//! WAL layout and the redaction filter.
//!
//! - [`page`] - page and segment header codec
//! - [`chunk`] - splitting raw bytes into framing and payload
//! - [`framing`] - reading payload with framing removed
//! - [`record`] - record header, relation id and checksum codec
//! - [`filter`] - the redaction state machine
//! - [`iterator`] - decoding whole records

pub mod chunk;
pub mod filter;
pub mod framing;
pub mod iterator;
pub mod page;
pub mod record;

pub use chunk::{classify, Chunk, ChunkKind, Chunks};
pub use filter::{filter_stream, CopyMode, Expect, FilterState, FilterStats, RecordFilter};
pub use framing::PageFramingReader;
pub use iterator::{DecodedBlock, DecodedRecord, WalRecordIterator};
pub use page::{
    LongPageHeader, PageHeader, DEFAULT_PAGE_MAGIC, LONG_PAGE_HEADER_LEN, SHORT_PAGE_HEADER_LEN,
    XLP_BKP_REMOVABLE, XLP_FIRST_IS_CONTRECORD, XLP_LONG_HEADER,
};
pub use record::{
    record_checksum, BackupBlock, RecordCrc, RecordHeader, RelationId,
    BACKUP_BLOCK_HEADER_LEN, DATA_BLOCK_SIZE, RECORD_CRC_OFFSET, RECORD_HEADER_LEN,
    RELATION_ID_LEN,
};
