//! Page header layout.
//!
//! Every page starts with a short header; the first page of a segment
//! carries the long form:
//!
//! ```text
//! short: | magic (2) | info (2) | timeline (4) | page addr (8) | rem len (4) | pad (4) |
//! long:  | short header (24) | system id (8) | segment size (4) | page size (4) |
//! ```
//!
//! All fields are little-endian.

use crate::error::{CoreError, CoreResult};
use crate::lsn::Lsn;

/// Length of the header at the start of an ordinary page.
pub const SHORT_PAGE_HEADER_LEN: usize = 24;

/// Length of the header at the start of a segment.
pub const LONG_PAGE_HEADER_LEN: usize = 40;

/// The page starts with the continuation of a record from an earlier page.
pub const XLP_FIRST_IS_CONTRECORD: u16 = 0x0001;

/// The page carries a long header.
pub const XLP_LONG_HEADER: u16 = 0x0002;

/// Backup blocks on this page may be removed by archiving tools.
pub const XLP_BKP_REMOVABLE: u16 = 0x0004;

/// Page magic written by servers using the 32-byte record header layout.
pub const DEFAULT_PAGE_MAGIC: u16 = 0xD07E;

/// Fields common to short and long page headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Format magic.
    pub magic: u16,
    /// `XLP_*` flag bits.
    pub info: u16,
    /// Timeline of the page.
    pub timeline: u32,
    /// Position of the page start.
    pub page_addr: Lsn,
    /// Bytes of a record continued from the previous page.
    pub rem_len: u32,
}

/// Header at the start of each segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongPageHeader {
    /// The common header fields.
    pub std: PageHeader,
    /// Identifier of the cluster that wrote the WAL.
    pub system_id: u64,
    /// Segment size the cluster was built with.
    pub segment_size: u32,
    /// Page size the cluster was built with.
    pub page_size: u32,
}

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

impl PageHeader {
    /// Decodes the common fields of the header stored at `lsn`.
    ///
    /// # Errors
    ///
    /// Returns a truncated stream error if fewer than
    /// [`SHORT_PAGE_HEADER_LEN`] bytes are given.
    pub fn decode(lsn: Lsn, bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < SHORT_PAGE_HEADER_LEN {
            return Err(CoreError::truncated(
                lsn,
                format!("page header needs {SHORT_PAGE_HEADER_LEN} bytes, got {}", bytes.len()),
            ));
        }
        Ok(Self {
            magic: u16_at(bytes, 0),
            info: u16_at(bytes, 2),
            timeline: u32_at(bytes, 4),
            page_addr: Lsn(u64_at(bytes, 8)),
            rem_len: u32_at(bytes, 16),
        })
    }

    /// Encodes the header into its 24-byte form.
    #[must_use]
    pub fn encode(&self) -> [u8; SHORT_PAGE_HEADER_LEN] {
        let mut buf = [0u8; SHORT_PAGE_HEADER_LEN];
        buf[0..2].copy_from_slice(&self.magic.to_le_bytes());
        buf[2..4].copy_from_slice(&self.info.to_le_bytes());
        buf[4..8].copy_from_slice(&self.timeline.to_le_bytes());
        buf[8..16].copy_from_slice(&self.page_addr.as_u64().to_le_bytes());
        buf[16..20].copy_from_slice(&self.rem_len.to_le_bytes());
        buf
    }

    /// Returns whether the long-header flag is set.
    #[must_use]
    pub const fn is_long(&self) -> bool {
        self.info & XLP_LONG_HEADER != 0
    }

    /// Returns whether the page opens with a continued record.
    #[must_use]
    pub const fn is_continuation(&self) -> bool {
        self.info & XLP_FIRST_IS_CONTRECORD != 0
    }
}

impl LongPageHeader {
    /// Decodes the long header stored at `lsn`.
    ///
    /// # Errors
    ///
    /// Returns a truncated stream error if fewer than
    /// [`LONG_PAGE_HEADER_LEN`] bytes are given.
    pub fn decode(lsn: Lsn, bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < LONG_PAGE_HEADER_LEN {
            return Err(CoreError::truncated(
                lsn,
                format!("long page header needs {LONG_PAGE_HEADER_LEN} bytes, got {}", bytes.len()),
            ));
        }
        Ok(Self {
            std: PageHeader::decode(lsn, bytes)?,
            system_id: u64_at(bytes, 24),
            segment_size: u32_at(bytes, 32),
            page_size: u32_at(bytes, 36),
        })
    }

    /// Encodes the header into its 40-byte form.
    #[must_use]
    pub fn encode(&self) -> [u8; LONG_PAGE_HEADER_LEN] {
        let mut buf = [0u8; LONG_PAGE_HEADER_LEN];
        buf[..SHORT_PAGE_HEADER_LEN].copy_from_slice(&self.std.encode());
        buf[24..32].copy_from_slice(&self.system_id.to_le_bytes());
        buf[32..36].copy_from_slice(&self.segment_size.to_le_bytes());
        buf[36..40].copy_from_slice(&self.page_size.to_le_bytes());
        buf
    }
}
