//! Splitting raw WAL spans into framing and payload.

use crate::config::WalGeometry;
use crate::lsn::Lsn;
use crate::wal::page::{LONG_PAGE_HEADER_LEN, SHORT_PAGE_HEADER_LEN};

/// What a chunk of raw bytes holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Page or segment header bytes.
    Header,
    /// Record payload bytes.
    Data,
}

/// A run of raw bytes of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Position of the first byte.
    pub lsn: Lsn,
    /// Header or data.
    pub kind: ChunkKind,
    /// The bytes themselves.
    pub bytes: &'a [u8],
}

impl Chunk<'_> {
    /// Position just past the chunk.
    #[must_use]
    pub fn end(&self) -> Lsn {
        self.lsn + self.bytes.len() as u64
    }
}

/// Iterator returned by [`classify`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    geometry: WalGeometry,
    lsn: Lsn,
    data: &'a [u8],
}

/// Splits `data`, which starts at `lsn`, into header and data chunks.
///
/// The first 40 bytes of a segment and the first 24 bytes of every other
/// page are headers. A span may start or end anywhere, including inside a
/// header. Chunks never cross a page boundary.
///
/// # Example
///
/// ```rust
/// use walredact_core::{classify, ChunkKind, Lsn, WalGeometry};
///
/// let geometry = WalGeometry::default();
/// let data = vec![0u8; 100];
/// let kinds: Vec<_> = classify(geometry, Lsn(8192 - 10), &data)
///     .map(|chunk| (chunk.kind, chunk.bytes.len()))
///     .collect();
/// assert_eq!(
///     kinds,
///     vec![(ChunkKind::Data, 10), (ChunkKind::Header, 24), (ChunkKind::Data, 66)]
/// );
/// ```
#[must_use]
pub fn classify(geometry: WalGeometry, lsn: Lsn, data: &[u8]) -> Chunks<'_> {
    Chunks {
        geometry,
        lsn,
        data,
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        let seg_off = self.lsn.segment_offset(self.geometry.segment_size);
        let page_off = self.lsn.page_offset(self.geometry.page_size);
        let (kind, len) = if seg_off < LONG_PAGE_HEADER_LEN as u64 {
            (ChunkKind::Header, LONG_PAGE_HEADER_LEN as u64 - seg_off)
        } else if page_off < SHORT_PAGE_HEADER_LEN as u64 {
            (ChunkKind::Header, SHORT_PAGE_HEADER_LEN as u64 - page_off)
        } else {
            (ChunkKind::Data, self.geometry.page_size - page_off)
        };
        let len = len.min(self.data.len() as u64) as usize;
        let (bytes, rest) = self.data.split_at(len);
        let chunk = Chunk {
            lsn: self.lsn,
            kind,
            bytes,
        };
        self.data = rest;
        self.lsn += len as u64;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> WalGeometry {
        WalGeometry::new(64 * 1024, 8192).unwrap()
    }

    fn layout(lsn: u64, len: usize) -> Vec<(u64, ChunkKind, usize)> {
        let data = vec![0u8; len];
        classify(geometry(), Lsn(lsn), &data)
            .map(|c| (c.lsn.as_u64(), c.kind, c.bytes.len()))
            .collect()
    }

    #[test]
    fn whole_first_page() {
        assert_eq!(
            layout(0, 8192),
            vec![(0, ChunkKind::Header, 40), (40, ChunkKind::Data, 8152)]
        );
    }

    #[test]
    fn split_header() {
        assert_eq!(
            layout(8192 + 10, 20),
            vec![(8202, ChunkKind::Header, 14), (8216, ChunkKind::Data, 6)]
        );
        assert_eq!(layout(64 * 1024 + 30, 4), vec![(65566, ChunkKind::Header, 4)]);
    }

    #[test]
    fn crosses_segment() {
        let start = 64 * 1024 - 16;
        assert_eq!(
            layout(start, 100),
            vec![
                (start, ChunkKind::Data, 16),
                (64 * 1024, ChunkKind::Header, 40),
                (64 * 1024 + 40, ChunkKind::Data, 44),
            ]
        );
    }

    #[test]
    fn chunks_cover_input() {
        let data: Vec<u8> = (0..30_000u32).map(|i| i as u8).collect();
        let mut next = Lsn(5000);
        let mut joined = Vec::new();
        for chunk in classify(geometry(), Lsn(5000), &data) {
            assert_eq!(chunk.lsn, next);
            next = chunk.end();
            joined.extend_from_slice(chunk.bytes);
        }
        assert_eq!(joined, data);
    }

    #[test]
    fn empty_input() {
        assert!(layout(123, 0).is_empty());
    }
}
