//! Synthetic WAL construction.
//!
//! [`WalBuilder`] lays records out the way a server writes them: 8-byte
//! aligned, split across pages with continuation lengths in the page
//! headers, and followed by an end-of-WAL marker and a zero-filled rest of
//! segment.

use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use walredact_core::rmgr::{XLOG_NOOP, XLOG_SWITCH};
use walredact_core::wal::{
    DEFAULT_PAGE_MAGIC, RECORD_HEADER_LEN, XLP_FIRST_IS_CONTRECORD, XLP_LONG_HEADER,
};
use walredact_core::{
    classify, record_checksum, BackupBlock, ChunkKind, LongPageHeader, Lsn, PageHeader,
    RecordHeader, RelationId, ResourceManager, WalGeometry, RECORD_ALIGNMENT,
};
use walredact_storage::{MemorySource, SegmentName};

/// System id written into long headers.
pub const TEST_SYSTEM_ID: u64 = 0x5F3C_A1B2_0000_0001;

/// Description of one record to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSpec {
    /// Resource manager id.
    pub rmid: u8,
    /// Subtype in the high nibble; the builder sets the backup block bits.
    pub subtype: u8,
    /// Transaction id.
    pub xid: u32,
    /// Main data.
    pub main_data: Vec<u8>,
    /// Backup blocks, each with the byte its image is filled with.
    pub blocks: Vec<(BackupBlock, u8)>,
}

impl RecordSpec {
    /// A record with the given main data and no backup blocks.
    pub fn new(rm: ResourceManager, subtype: u8, main_data: Vec<u8>) -> Self {
        Self {
            rmid: rm.id(),
            subtype,
            xid: 1000,
            main_data,
            blocks: Vec::new(),
        }
    }

    /// A record under a resource manager id that has no known meaning.
    pub fn unknown(rmid: u8, main_data: Vec<u8>) -> Self {
        Self {
            rmid,
            ..Self::new(ResourceManager::Xlog, 0, main_data)
        }
    }

    /// A heap insert into `relation` carrying `row`.
    pub fn heap_insert(relation: RelationId, row: &[u8]) -> Self {
        let mut main_data = relation.encode().to_vec();
        main_data.extend_from_slice(&[0x01, 0x00, 0x00, 0x00, 0x02, 0x00]);
        main_data.extend_from_slice(row);
        Self::new(ResourceManager::Heap, 0x00, main_data)
    }

    /// A B-tree leaf insert into `relation`.
    pub fn btree_insert(relation: RelationId, tuple: &[u8]) -> Self {
        let mut main_data = relation.encode().to_vec();
        main_data.extend_from_slice(tuple);
        Self::new(ResourceManager::Btree, 0x00, main_data)
    }

    /// A transaction commit.
    pub fn commit(xid: u32) -> Self {
        Self::new(
            ResourceManager::Transaction,
            0x00,
            0x0001_D2C4_55F0_0000u64.to_le_bytes().to_vec(),
        )
        .xid(xid)
    }

    /// Sets the transaction id.
    #[must_use]
    pub fn xid(mut self, xid: u32) -> Self {
        self.xid = xid;
        self
    }

    /// Appends a backup block whose image is filled with `fill`.
    ///
    /// # Panics
    ///
    /// Panics if the record already has four backup blocks.
    #[must_use]
    pub fn with_backup_block(mut self, block: BackupBlock, fill: u8) -> Self {
        assert!(self.blocks.len() < 4, "at most four backup blocks");
        self.blocks.push((block, fill));
        self
    }

    /// Record body: main data followed by the backup blocks.
    pub fn body(&self) -> Vec<u8> {
        let mut body = self.main_data.clone();
        for (block, fill) in &self.blocks {
            body.extend_from_slice(&block.encode());
            body.resize(body.len() + block.image_len() as usize, *fill);
        }
        body
    }

    /// The header this record is written with.
    pub fn header(&self, prev: Lsn) -> RecordHeader {
        let block_bits = (1u8 << self.blocks.len()) - 1;
        RecordHeader {
            total_len: (RECORD_HEADER_LEN + self.body().len()) as u32,
            xid: self.xid,
            main_data_len: self.main_data.len() as u32,
            info: self.subtype | block_bits,
            rmid: self.rmid,
            prev,
            crc: 0,
        }
    }

    /// Relation named at the start of the main data, for records that
    /// carry one.
    pub fn relation(&self) -> Option<RelationId> {
        if !self.header(Lsn::ZERO).touches_relation() {
            return None;
        }
        RelationId::decode(Lsn::ZERO, &self.main_data).ok()
    }

    /// Encodes header and body with a valid checksum.
    pub fn encode(&self, prev: Lsn) -> Vec<u8> {
        let body = self.body();
        let mut header = self.header(prev);
        header.crc = record_checksum(&header.encode(), &body);
        let mut out = header.encode().to_vec();
        out.extend_from_slice(&body);
        out
    }
}

/// Where a record was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    /// Start of the record.
    pub lsn: Lsn,
    /// Total length of the record.
    pub total_len: u32,
    /// Resource manager id.
    pub rmid: u8,
    /// Relation the record touches, if any.
    pub relation: Option<RelationId>,
}

/// Builder for framed WAL.
#[derive(Debug, Clone)]
pub struct WalBuilder {
    geometry: WalGeometry,
    timeline: u32,
    system_id: u64,
    magic: u16,
    start: Lsn,
    bytes: Vec<u8>,
    prev: Lsn,
    records: Vec<RecordInfo>,
}

impl WalBuilder {
    /// Creates a builder starting at segment 1 of timeline 1.
    pub fn new(geometry: WalGeometry) -> Self {
        Self {
            geometry,
            timeline: 1,
            system_id: TEST_SYSTEM_ID,
            magic: DEFAULT_PAGE_MAGIC,
            start: Lsn(geometry.segment_size),
            bytes: Vec::new(),
            prev: Lsn::ZERO,
            records: Vec::new(),
        }
    }

    /// Sets the timeline.
    #[must_use]
    pub fn timeline(mut self, timeline: u32) -> Self {
        self.timeline = timeline;
        self
    }

    /// Sets the first segment number. Call before writing anything.
    #[must_use]
    pub fn start_segment(mut self, segno: u64) -> Self {
        self.start = Lsn(segno * self.geometry.segment_size);
        self
    }

    /// Sets the system id of the long headers.
    #[must_use]
    pub fn system_id(mut self, system_id: u64) -> Self {
        self.system_id = system_id;
        self
    }

    /// Sets the page magic.
    #[must_use]
    pub fn magic(mut self, magic: u16) -> Self {
        self.magic = magic;
        self
    }

    /// Position of the next byte.
    pub fn position(&self) -> Lsn {
        self.start + self.bytes.len() as u64
    }

    /// Appends a record and returns its position.
    pub fn record(&mut self, spec: &RecordSpec) -> Lsn {
        self.align();
        let lsn = self.position();
        let bytes = spec.encode(self.prev);
        self.put(&bytes);
        self.prev = lsn;
        self.records.push(RecordInfo {
            lsn,
            total_len: bytes.len() as u32,
            rmid: spec.rmid,
            relation: spec.relation(),
        });
        lsn
    }

    /// Appends a segment switch and zero-fills the rest of the segment.
    pub fn switch(&mut self) -> Lsn {
        let lsn = self.record(&RecordSpec::new(
            ResourceManager::Xlog,
            XLOG_SWITCH,
            Vec::new(),
        ));
        self.fill_segment();
        lsn
    }

    /// Appends a single no-op record sized so that the next record starts
    /// exactly at `target`.
    ///
    /// # Panics
    ///
    /// Panics if `target` is unaligned, inside a page header, or too close
    /// to the current position for a record to fit.
    pub fn fill_to(&mut self, target: Lsn) {
        self.align();
        let start = self.position();
        assert_eq!(target.padding(RECORD_ALIGNMENT), 0, "target must be aligned");
        assert!(
            target.page_offset(self.geometry.page_size) >= 24
                && target.segment_offset(self.geometry.segment_size) >= 40,
            "target inside a header"
        );
        assert!(target > start, "target behind the current position");

        let span = vec![0u8; (target - start) as usize];
        let payload: usize = classify(self.geometry, start, &span)
            .filter(|chunk| chunk.kind == ChunkKind::Data)
            .map(|chunk| chunk.bytes.len())
            .sum();
        assert!(payload >= RECORD_HEADER_LEN, "no room for a filler record");

        self.record(&RecordSpec::new(
            ResourceManager::Xlog,
            XLOG_NOOP,
            vec![0; payload - RECORD_HEADER_LEN],
        ));
        assert_eq!(self.position(), target);
    }

    /// Writes the end-of-WAL marker and zero-fills the rest of the segment.
    pub fn finish(mut self) -> BuiltWal {
        self.align();
        let end_of_wal = self.position();
        self.put(&[0u8; RECORD_HEADER_LEN]);
        self.fill_segment();
        BuiltWal {
            geometry: self.geometry,
            timeline: self.timeline,
            start: self.start,
            bytes: self.bytes,
            records: self.records,
            end_of_wal,
        }
    }

    fn at_page_start(&self) -> bool {
        self.position().page_offset(self.geometry.page_size) == 0
    }

    fn page_header(&mut self, rem_len: u32) {
        let lsn = self.position();
        let mut std = PageHeader {
            magic: self.magic,
            info: if rem_len > 0 { XLP_FIRST_IS_CONTRECORD } else { 0 },
            timeline: self.timeline,
            page_addr: lsn,
            rem_len,
        };
        if self.geometry.is_segment_start(lsn) {
            std.info |= XLP_LONG_HEADER;
            let long = LongPageHeader {
                std,
                system_id: self.system_id,
                segment_size: self.geometry.segment_size as u32,
                page_size: self.geometry.page_size as u32,
            };
            self.bytes.extend_from_slice(&long.encode());
        } else {
            self.bytes.extend_from_slice(&std.encode());
        }
    }

    /// Pads to the record alignment, writing a page header if the padding
    /// reaches a page start.
    fn align(&mut self) {
        let padding = self.position().padding(RECORD_ALIGNMENT) as usize;
        self.bytes.resize(self.bytes.len() + padding, 0);
        if self.at_page_start() {
            self.page_header(0);
        }
    }

    /// Writes payload, inserting headers whose continuation length counts
    /// the bytes still to come.
    fn put(&mut self, mut rest: &[u8]) {
        while !rest.is_empty() {
            if self.at_page_start() {
                self.page_header(rest.len() as u32);
            }
            let room = (self.geometry.page_size
                - self.position().page_offset(self.geometry.page_size))
                as usize;
            let n = room.min(rest.len());
            self.bytes.extend_from_slice(&rest[..n]);
            rest = &rest[n..];
        }
    }

    fn fill_segment(&mut self) {
        while !self.geometry.is_segment_start(self.position()) {
            if self.at_page_start() {
                self.page_header(0);
            }
            let room = self.geometry.page_size
                - self.position().page_offset(self.geometry.page_size);
            self.bytes.resize(self.bytes.len() + room as usize, 0);
        }
    }
}

/// Finished WAL image.
#[derive(Debug, Clone)]
pub struct BuiltWal {
    /// Geometry the image was built with.
    pub geometry: WalGeometry,
    /// Timeline of the segments.
    pub timeline: u32,
    /// Position of the first byte.
    pub start: Lsn,
    /// Raw bytes, a whole number of segments.
    pub bytes: Vec<u8>,
    /// Records in write order.
    pub records: Vec<RecordInfo>,
    /// Position of the end-of-WAL marker.
    pub end_of_wal: Lsn,
}

impl BuiltWal {
    /// Name of the first segment.
    pub fn first_segment(&self) -> SegmentName {
        SegmentName::containing(self.timeline, self.start.as_u64(), self.geometry.segment_size)
    }

    /// Number of segments in the image.
    pub fn segment_count(&self) -> u64 {
        self.bytes.len() as u64 / self.geometry.segment_size
    }

    /// An in-memory source over the image.
    pub fn source(&self) -> MemorySource {
        MemorySource::new(self.start.as_u64(), self.bytes.clone())
    }

    /// Writes one file per segment into `dir` and returns their paths.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be written.
    pub fn write_segments(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let segment_size = self.geometry.segment_size as usize;
        let mut name = self.first_segment();
        let mut paths = Vec::new();
        for segment in self.bytes.chunks(segment_size) {
            let path = dir.join(name.file_name(self.geometry.segment_size));
            std::fs::write(&path, segment)?;
            paths.push(path);
            name = name.next();
        }
        Ok(paths)
    }

    /// Byte ranges, as offsets into [`bytes`](Self::bytes), holding page
    /// headers.
    pub fn header_ranges(&self) -> Vec<Range<usize>> {
        classify(self.geometry, self.start, &self.bytes)
            .filter(|chunk| chunk.kind == ChunkKind::Header)
            .map(|chunk| {
                let from = (chunk.lsn - self.start) as usize;
                from..from + chunk.bytes.len()
            })
            .collect()
    }

    /// The payload bytes of `record` within `raw`, a buffer laid out like
    /// this image, with framing removed.
    pub fn record_payload(&self, raw: &[u8], record: &RecordInfo) -> Vec<u8> {
        let offset = (record.lsn - self.start) as usize;
        let mut out = Vec::with_capacity(record.total_len as usize);
        for chunk in classify(self.geometry, record.lsn, &raw[offset..]) {
            if chunk.kind == ChunkKind::Data {
                let n = (record.total_len as usize - out.len()).min(chunk.bytes.len());
                out.extend_from_slice(&chunk.bytes[..n]);
            }
            if out.len() == record.total_len as usize {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test_geometry;

    #[test]
    fn records_span_pages_with_continuation() {
        let geometry = test_geometry();
        let mut builder = WalBuilder::new(geometry);
        let relation = RelationId::new(1663, 13993, 16397);
        let first = builder.record(&RecordSpec::heap_insert(relation, &[7; 3000]));
        let wal = builder.finish();

        assert_eq!(first, Lsn(geometry.segment_size + 40));
        assert_eq!(wal.bytes.len() as u64, geometry.segment_size);

        let page = geometry.page_size as usize;
        let second = PageHeader::decode(Lsn(0), &wal.bytes[page..]).unwrap();
        assert!(second.is_continuation());
        let written = page - 40;
        assert_eq!(second.rem_len as usize, wal.records[0].total_len as usize - written);

        let payload = wal.record_payload(&wal.bytes, &wal.records[0]);
        assert_eq!(payload.len(), wal.records[0].total_len as usize);
        assert_eq!(wal.records[0].relation, Some(relation));
    }

    #[test]
    fn fill_to_places_next_record() {
        let geometry = test_geometry();
        let mut builder = WalBuilder::new(geometry);
        let target = Lsn(geometry.segment_size + 3 * geometry.page_size - 8);
        builder.fill_to(target);
        let lsn = builder.record(&RecordSpec::commit(5));
        assert_eq!(lsn, target);
    }

    #[test]
    fn switch_fills_segment() {
        let geometry = test_geometry();
        let mut builder = WalBuilder::new(geometry);
        builder.record(&RecordSpec::commit(5));
        builder.switch();
        assert!(geometry.is_segment_start(builder.position()));
        let next = builder.record(&RecordSpec::commit(6));
        assert_eq!(next, Lsn(2 * geometry.segment_size + 40));
        assert_eq!(builder.finish().segment_count(), 2);
    }
}
