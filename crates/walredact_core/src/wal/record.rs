//! Record header, relation id and backup block codec.
//!
//! ```text
//! record header (32 bytes):
//! | total len (4) | xid (4) | main len (4) | info (1) | rmid (1) | pad (2) |
//! | prev (8) | crc (4) | pad (4) |
//! ```
//!
//! The header is followed by `main len` bytes of main data and then the
//! backup blocks. Each backup block is a 24-byte header (relation id, fork,
//! block number, hole offset, hole length) followed by the block image with
//! the hole left out.

use crate::error::{CoreError, CoreResult};
use crate::lsn::Lsn;
use crate::rmgr::{ResourceManager, XLOG_FPI, XLOG_NOOP, XLOG_SWITCH};
use std::fmt;
use std::str::FromStr;

/// Length of a record header.
pub const RECORD_HEADER_LEN: usize = 32;

/// Offset of the checksum within the record header.
pub const RECORD_CRC_OFFSET: usize = 24;

/// Length of an encoded relation id.
pub const RELATION_ID_LEN: usize = 12;

/// Length of a backup block header.
pub const BACKUP_BLOCK_HEADER_LEN: usize = 24;

/// Size of the data pages that backup blocks are images of.
pub const DATA_BLOCK_SIZE: u64 = 8192;

const SUBTYPE_MASK: u8 = 0xF0;
const BACKUP_BLOCK_MASK: u8 = 0x0F;

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn u64_at(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

/// Fixed-size header at the start of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Length of the whole record including this header.
    pub total_len: u32,
    /// Transaction id.
    pub xid: u32,
    /// Length of the main data following the header.
    pub main_data_len: u32,
    /// Subtype in the high nibble, backup block flags in the low nibble.
    pub info: u8,
    /// Resource manager id.
    pub rmid: u8,
    /// Start of the previous record.
    pub prev: Lsn,
    /// Checksum over the body and the first 24 header bytes.
    pub crc: u32,
}

impl RecordHeader {
    /// Decodes a record header.
    ///
    /// Only the layout is checked here; see [`RecordHeader::validate`].
    ///
    /// # Errors
    ///
    /// Returns a truncated stream error if fewer than 32 bytes are given.
    pub fn decode(lsn: Lsn, bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < RECORD_HEADER_LEN {
            return Err(CoreError::truncated(
                lsn,
                format!("record header needs {RECORD_HEADER_LEN} bytes, got {}", bytes.len()),
            ));
        }
        Ok(Self {
            total_len: u32_at(bytes, 0),
            xid: u32_at(bytes, 4),
            main_data_len: u32_at(bytes, 8),
            info: bytes[12],
            rmid: bytes[13],
            prev: Lsn(u64_at(bytes, 16)),
            crc: u32_at(bytes, RECORD_CRC_OFFSET),
        })
    }

    /// Encodes the header. Padding bytes are zero.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_HEADER_LEN] {
        let mut buf = [0u8; RECORD_HEADER_LEN];
        buf[0..4].copy_from_slice(&self.total_len.to_le_bytes());
        buf[4..8].copy_from_slice(&self.xid.to_le_bytes());
        buf[8..12].copy_from_slice(&self.main_data_len.to_le_bytes());
        buf[12] = self.info;
        buf[13] = self.rmid;
        buf[16..24].copy_from_slice(&self.prev.as_u64().to_le_bytes());
        buf[24..28].copy_from_slice(&self.crc.to_le_bytes());
        buf
    }

    /// Record subtype: the high nibble of the info byte.
    #[must_use]
    pub const fn subtype(&self) -> u8 {
        self.info & SUBTYPE_MASK
    }

    /// Number of backup blocks, one per bit set in the low nibble of the
    /// info byte.
    #[must_use]
    pub const fn backup_block_count(&self) -> u32 {
        (self.info & BACKUP_BLOCK_MASK).count_ones()
    }

    /// Length of the record body: main data plus backup blocks.
    #[must_use]
    pub const fn body_len(&self) -> u64 {
        (self.total_len as u64).saturating_sub(RECORD_HEADER_LEN as u64)
    }

    /// Combined length of the backup blocks, or `None` if the declared main
    /// data does not fit the record.
    #[must_use]
    pub const fn backup_blocks_len(&self) -> Option<u64> {
        self.body_len().checked_sub(self.main_data_len as u64)
    }

    /// The resource manager, if the id is known.
    #[must_use]
    pub fn resource_manager(&self) -> Option<ResourceManager> {
        ResourceManager::from_id(self.rmid)
    }

    /// A zero total length marks the end of written WAL.
    #[must_use]
    pub const fn is_end_of_wal(&self) -> bool {
        self.total_len == 0
    }

    /// Returns whether this is an XLOG segment switch.
    #[must_use]
    pub const fn is_segment_switch(&self) -> bool {
        self.rmid == ResourceManager::Xlog as u8 && self.subtype() == XLOG_SWITCH
    }

    /// Returns whether the body starts with the relation id of the page the
    /// record modifies.
    ///
    /// Unknown resource managers are treated as not touching relations, so
    /// their records are never redacted.
    #[must_use]
    pub fn touches_relation(&self) -> bool {
        match self.resource_manager() {
            Some(ResourceManager::Xlog) => self.subtype() == XLOG_FPI,
            Some(rm) => rm.touches_relation(),
            None => false,
        }
    }

    /// Checks that the declared lengths are consistent.
    ///
    /// # Errors
    ///
    /// Returns a malformed record error if the total length is shorter than
    /// the header, the main data does not fit in the record, or the space
    /// left for backup blocks disagrees with the declared block count.
    pub fn validate(&self, lsn: Lsn) -> CoreResult<()> {
        if (self.total_len as usize) < RECORD_HEADER_LEN {
            return Err(CoreError::malformed(
                lsn,
                format!("total length {} is shorter than the record header", self.total_len),
            ));
        }
        let Some(blocks_len) = self.backup_blocks_len() else {
            return Err(CoreError::malformed(
                lsn,
                format!(
                    "main data length {} exceeds record body of {} bytes",
                    self.main_data_len,
                    self.body_len()
                ),
            ));
        };
        let count = u64::from(self.backup_block_count());
        if count == 0 && blocks_len > 0 {
            return Err(CoreError::malformed(
                lsn,
                format!("{blocks_len} bytes of backup blocks with none declared"),
            ));
        }
        if blocks_len < count * BACKUP_BLOCK_HEADER_LEN as u64 {
            return Err(CoreError::malformed(
                lsn,
                format!("{count} backup blocks cannot fit in {blocks_len} bytes"),
            ));
        }
        Ok(())
    }

    /// Builds the no-op record that replaces this one.
    ///
    /// The replacement keeps the total length, transaction id and previous
    /// LSN, declares the whole body as main data, and carries the checksum of
    /// an all-zero body.
    #[must_use]
    pub fn noop_replacement(&self) -> RecordHeader {
        let mut noop = RecordHeader {
            total_len: self.total_len,
            xid: self.xid,
            main_data_len: self.total_len.saturating_sub(RECORD_HEADER_LEN as u32),
            info: XLOG_NOOP,
            rmid: ResourceManager::Xlog.id(),
            prev: self.prev,
            crc: 0,
        };
        let mut crc = RecordCrc::new();
        crc.update_zeros(noop.body_len());
        crc.update(&noop.encode()[..RECORD_CRC_OFFSET]);
        noop.crc = crc.finish();
        noop
    }
}

/// A relation, identified by tablespace, database and file node.
///
/// Parses from `tablespace,database,relfilenode`.
///
/// # Example
///
/// ```rust
/// use walredact_core::RelationId;
///
/// let relation: RelationId = "1663,13993,16397".parse().unwrap();
/// assert_eq!(relation, RelationId::new(1663, 13993, 16397));
/// assert_eq!(relation.to_string(), "1663/13993/16397");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId {
    /// Tablespace oid.
    pub tablespace: u32,
    /// Database oid.
    pub database: u32,
    /// Relation file node.
    pub relfilenode: u32,
}

impl RelationId {
    /// Creates a relation id.
    #[must_use]
    pub const fn new(tablespace: u32, database: u32, relfilenode: u32) -> Self {
        Self {
            tablespace,
            database,
            relfilenode,
        }
    }

    /// Decodes the 12-byte form.
    ///
    /// # Errors
    ///
    /// Returns a truncated stream error if fewer than 12 bytes are given.
    pub fn decode(lsn: Lsn, bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < RELATION_ID_LEN {
            return Err(CoreError::truncated(lsn, "relation id needs 12 bytes"));
        }
        Ok(Self::new(u32_at(bytes, 0), u32_at(bytes, 4), u32_at(bytes, 8)))
    }

    /// Encodes the 12-byte form.
    #[must_use]
    pub fn encode(&self) -> [u8; RELATION_ID_LEN] {
        let mut buf = [0u8; RELATION_ID_LEN];
        buf[0..4].copy_from_slice(&self.tablespace.to_le_bytes());
        buf[4..8].copy_from_slice(&self.database.to_le_bytes());
        buf[8..12].copy_from_slice(&self.relfilenode.to_le_bytes());
        buf
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tablespace, self.database, self.relfilenode)
    }
}

impl FromStr for RelationId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        let [tablespace, database, relfilenode] = parts.as_slice() else {
            return Err(CoreError::invalid_config(format!(
                "relation '{s}' is not of the form tablespace,database,relfilenode"
            )));
        };
        let field = |text: &str| {
            text.trim().parse::<u32>().map_err(|_| {
                CoreError::invalid_config(format!("relation '{s}': '{text}' is not an oid"))
            })
        };
        Ok(Self::new(
            field(*tablespace)?,
            field(*database)?,
            field(*relfilenode)?,
        ))
    }
}

/// Header of one backup block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupBlock {
    /// Relation the block belongs to.
    pub relation: RelationId,
    /// Fork number.
    pub fork: u32,
    /// Block number.
    pub block: u32,
    /// Offset of the omitted hole.
    pub hole_offset: u16,
    /// Length of the omitted hole.
    pub hole_length: u16,
}

impl BackupBlock {
    /// Decodes a backup block header.
    ///
    /// # Errors
    ///
    /// Returns a malformed record error if fewer than 24 bytes are given or
    /// the hole does not fit in a data page.
    pub fn decode(lsn: Lsn, bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < BACKUP_BLOCK_HEADER_LEN {
            return Err(CoreError::malformed(
                lsn,
                format!("backup block header needs 24 bytes, {} left", bytes.len()),
            ));
        }
        let block = Self {
            relation: RelationId::decode(lsn, bytes)?,
            fork: u32_at(bytes, 12),
            block: u32_at(bytes, 16),
            hole_offset: u16_at(bytes, 20),
            hole_length: u16_at(bytes, 22),
        };
        if u64::from(block.hole_offset) + u64::from(block.hole_length) > DATA_BLOCK_SIZE {
            return Err(CoreError::malformed(
                lsn,
                format!(
                    "backup block hole {}+{} exceeds the page",
                    block.hole_offset, block.hole_length
                ),
            ));
        }
        Ok(block)
    }

    /// Encodes the 24-byte header.
    #[must_use]
    pub fn encode(&self) -> [u8; BACKUP_BLOCK_HEADER_LEN] {
        let mut buf = [0u8; BACKUP_BLOCK_HEADER_LEN];
        buf[..RELATION_ID_LEN].copy_from_slice(&self.relation.encode());
        buf[12..16].copy_from_slice(&self.fork.to_le_bytes());
        buf[16..20].copy_from_slice(&self.block.to_le_bytes());
        buf[20..22].copy_from_slice(&self.hole_offset.to_le_bytes());
        buf[22..24].copy_from_slice(&self.hole_length.to_le_bytes());
        buf
    }

    /// Length of the stored image: a data page minus the hole.
    #[must_use]
    pub fn image_len(&self) -> u64 {
        DATA_BLOCK_SIZE - u64::from(self.hole_length)
    }
}

/// Incremental record checksum.
///
/// Reflected CRC-32 with the usual initial value and final inversion. Bytes
/// are fed body first, then the header up to the checksum field.
#[derive(Debug, Clone, Default)]
pub struct RecordCrc {
    hasher: crc32fast::Hasher,
}

const ZERO_BLOCK: [u8; 4096] = [0u8; 4096];

impl RecordCrc {
    /// Starts a new checksum.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Feeds `len` zero bytes.
    pub fn update_zeros(&mut self, mut len: u64) {
        while len > 0 {
            let n = len.min(ZERO_BLOCK.len() as u64) as usize;
            self.hasher.update(&ZERO_BLOCK[..n]);
            len -= n as u64;
        }
    }

    /// Returns the checksum.
    #[must_use]
    pub fn finish(self) -> u32 {
        self.hasher.finalize()
    }
}

/// Computes the checksum of a record from its encoded header and body.
///
/// The checksum field inside `header` is not read.
#[must_use]
pub fn record_checksum(header: &[u8], body: &[u8]) -> u32 {
    let mut crc = RecordCrc::new();
    crc.update(body);
    crc.update(&header[..RECORD_CRC_OFFSET]);
    crc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rmgr::XLOG_HEAP_INIT_PAGE;

    fn heap_insert(total_len: u32, main_data_len: u32) -> RecordHeader {
        RecordHeader {
            total_len,
            xid: 1001,
            main_data_len,
            info: 0x00,
            rmid: ResourceManager::Heap.id(),
            prev: Lsn(0x0100_0028),
            crc: 0,
        }
    }

    #[test]
    fn crc_check_value() {
        let mut crc = RecordCrc::new();
        crc.update(b"123456789");
        assert_eq!(crc.finish(), 0xCBF4_3926);
    }

    #[test]
    fn zeros_match_materialized_zeros() {
        let mut fast = RecordCrc::new();
        fast.update_zeros(10_000);
        fast.update(b"tail");

        let mut slow = RecordCrc::new();
        slow.update(&vec![0u8; 10_000]);
        slow.update(b"tail");

        assert_eq!(fast.finish(), slow.finish());
    }

    #[test]
    fn header_layout() {
        let mut header = heap_insert(90, 40);
        header.crc = 0xDEAD_BEEF;
        let bytes = header.encode();
        assert_eq!(&bytes[0..4], &90u32.to_le_bytes());
        assert_eq!(bytes[13], 10);
        assert_eq!(&bytes[14..16], &[0, 0]);
        assert_eq!(&bytes[16..24], &0x0100_0028u64.to_le_bytes());
        assert_eq!(&bytes[24..28], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(RecordHeader::decode(Lsn(0), &bytes).unwrap(), header);
    }

    #[test]
    fn backup_block_count_is_popcount() {
        let mut header = heap_insert(32, 0);
        header.info = 0x05;
        assert_eq!(header.backup_block_count(), 2);
        header.info = XLOG_HEAP_INIT_PAGE | 0x0F;
        assert_eq!(header.backup_block_count(), 4);
        assert_eq!(header.subtype(), XLOG_HEAP_INIT_PAGE);
    }

    #[test]
    fn validation() {
        assert!(heap_insert(90, 58).validate(Lsn(0)).is_ok());
        assert!(matches!(
            heap_insert(20, 0).validate(Lsn(0)),
            Err(CoreError::MalformedRecord { .. })
        ));
        assert!(matches!(
            heap_insert(64, 40).validate(Lsn(0)),
            Err(CoreError::MalformedRecord { .. })
        ));
        assert_eq!(heap_insert(90, 40).backup_blocks_len(), Some(18));
    }

    #[test]
    fn backup_block_space_must_match_flags() {
        // Space left over with no block declared.
        assert!(matches!(
            heap_insert(90, 40).validate(Lsn(0)),
            Err(CoreError::MalformedRecord { .. })
        ));

        // Two blocks declared, room for less than two block headers.
        let mut two = heap_insert(32 + 12 + 40, 12);
        two.info = 0x03;
        assert!(matches!(
            two.validate(Lsn(0)),
            Err(CoreError::MalformedRecord { .. })
        ));

        let mut one = heap_insert(32 + 12 + 24 + 192, 12);
        one.info = 0x01;
        assert!(one.validate(Lsn(0)).is_ok());
    }

    #[test]
    fn relation_classification() {
        assert!(heap_insert(64, 32).touches_relation());

        let mut fpi = heap_insert(64, 32);
        fpi.rmid = ResourceManager::Xlog.id();
        fpi.info = XLOG_FPI;
        assert!(fpi.touches_relation());

        fpi.info = XLOG_SWITCH;
        assert!(!fpi.touches_relation());
        assert!(fpi.is_segment_switch());

        let mut unknown = heap_insert(64, 32);
        unknown.rmid = 42;
        assert!(!unknown.touches_relation());
    }

    #[test]
    fn noop_keeps_identity_fields() {
        let original = heap_insert(1234, 100);
        let noop = original.noop_replacement();

        assert_eq!(noop.total_len, 1234);
        assert_eq!(noop.xid, original.xid);
        assert_eq!(noop.prev, original.prev);
        assert_eq!(noop.main_data_len, 1234 - 32);
        assert_eq!(noop.backup_block_count(), 0);
        assert_eq!(noop.rmid, ResourceManager::Xlog.id());
        assert_eq!(noop.subtype(), XLOG_NOOP);

        let body = vec![0u8; 1234 - 32];
        assert_eq!(record_checksum(&noop.encode(), &body), noop.crc);
    }

    #[test]
    fn relation_text_form() {
        let relation: RelationId = "1663,13993,16397".parse().unwrap();
        assert_eq!(relation, RelationId::new(1663, 13993, 16397));
        assert_eq!(relation.to_string(), "1663/13993/16397");
        assert_eq!(
            RelationId::decode(Lsn(0), &relation.encode()).unwrap(),
            relation
        );

        assert!("1663,13993".parse::<RelationId>().is_err());
        assert!("1663,x,16397".parse::<RelationId>().is_err());
        assert!("1,2,3,4".parse::<RelationId>().is_err());
    }

    #[test]
    fn backup_block_hole() {
        let block = BackupBlock {
            relation: RelationId::new(1663, 1, 2),
            fork: 0,
            block: 7,
            hole_offset: 100,
            hole_length: 8000,
        };
        let decoded = BackupBlock::decode(Lsn(0), &block.encode()).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.image_len(), 192);

        let bad = BackupBlock {
            hole_offset: 8000,
            hole_length: 8000,
            ..block
        };
        assert!(matches!(
            BackupBlock::decode(Lsn(0), &bad.encode()),
            Err(CoreError::MalformedRecord { .. })
        ));
    }
}
