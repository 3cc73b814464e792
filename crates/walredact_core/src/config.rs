//! Filter configuration.

use crate::error::{CoreError, CoreResult};
use crate::lsn::Lsn;
use crate::wal::page::{LONG_PAGE_HEADER_LEN, SHORT_PAGE_HEADER_LEN};
use crate::wal::record::RelationId;
use std::collections::HashSet;

/// Default segment file size (16 MiB).
pub const DEFAULT_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Default WAL page size (8 KiB).
pub const DEFAULT_PAGE_SIZE: u64 = 8192;

/// Largest segment size whose value fits the long page header.
const MAX_SEGMENT_SIZE: u64 = 1024 * 1024 * 1024;

/// Smallest page size that leaves room for a long header and a record header.
const MIN_PAGE_SIZE: u64 = 256;

/// Segment and page sizes of a WAL stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalGeometry {
    /// Size of each segment file.
    pub segment_size: u64,
    /// Size of each page within a segment.
    pub page_size: u64,
}

impl Default for WalGeometry {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl WalGeometry {
    /// Creates a validated geometry.
    ///
    /// # Errors
    ///
    /// Returns an error unless both sizes are powers of two, the page size is
    /// at least 256 bytes, the page divides the segment, and the segment is
    /// at most 1 GiB.
    pub fn new(segment_size: u64, page_size: u64) -> CoreResult<Self> {
        if !page_size.is_power_of_two() || page_size < MIN_PAGE_SIZE {
            return Err(CoreError::invalid_config(format!(
                "page size {page_size} must be a power of two of at least {MIN_PAGE_SIZE}"
            )));
        }
        if !segment_size.is_power_of_two()
            || segment_size < page_size
            || segment_size > MAX_SEGMENT_SIZE
        {
            return Err(CoreError::invalid_config(format!(
                "segment size {segment_size} must be a power of two between {page_size} and {MAX_SEGMENT_SIZE}"
            )));
        }
        Ok(Self {
            segment_size,
            page_size,
        })
    }

    /// Length of the page header that starts at `lsn`, or 0 if no header
    /// starts there.
    #[must_use]
    pub fn header_len_at(&self, lsn: Lsn) -> usize {
        if lsn.segment_offset(self.segment_size) == 0 {
            LONG_PAGE_HEADER_LEN
        } else if lsn.page_offset(self.page_size) == 0 {
            SHORT_PAGE_HEADER_LEN
        } else {
            0
        }
    }

    /// Returns whether `lsn` is the first byte of a segment.
    #[must_use]
    pub fn is_segment_start(&self, lsn: Lsn) -> bool {
        lsn.segment_offset(self.segment_size) == 0
    }
}

/// Configuration for a redaction run.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    /// Segment and page sizes of the input.
    pub geometry: WalGeometry,

    /// Relations whose records are replaced with no-op records.
    pub exclude: HashSet<RelationId>,

    /// Page magic every header must carry.
    ///
    /// When unset the magic of the first header read is adopted.
    pub page_magic: Option<u16>,
}

impl FilterConfig {
    /// Creates a configuration with default geometry and nothing excluded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WAL geometry.
    #[must_use]
    pub fn geometry(mut self, geometry: WalGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Adds one relation to the exclusion set.
    #[must_use]
    pub fn exclude(mut self, relation: RelationId) -> Self {
        self.exclude.insert(relation);
        self
    }

    /// Adds every relation in `relations` to the exclusion set.
    #[must_use]
    pub fn exclude_all(mut self, relations: impl IntoIterator<Item = RelationId>) -> Self {
        self.exclude.extend(relations);
        self
    }

    /// Requires a specific page magic.
    #[must_use]
    pub fn page_magic(mut self, magic: u16) -> Self {
        self.page_magic = Some(magic);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry() {
        let geometry = WalGeometry::default();
        assert_eq!(geometry.segment_size, 16 * 1024 * 1024);
        assert_eq!(geometry.page_size, 8192);
        assert_eq!(WalGeometry::new(16 * 1024 * 1024, 8192).unwrap(), geometry);
    }

    #[test]
    fn geometry_validation() {
        assert!(WalGeometry::new(64 * 1024, 8192).is_ok());
        assert!(WalGeometry::new(64 * 1024, 100).is_err());
        assert!(WalGeometry::new(4096, 8192).is_err());
        assert!(WalGeometry::new(3 * 8192, 8192).is_err());
        assert!(WalGeometry::new(2 * 1024 * 1024 * 1024, 8192).is_err());
    }

    #[test]
    fn header_lengths() {
        let geometry = WalGeometry::new(64 * 1024, 8192).unwrap();
        assert_eq!(geometry.header_len_at(Lsn(0)), 40);
        assert_eq!(geometry.header_len_at(Lsn(64 * 1024)), 40);
        assert_eq!(geometry.header_len_at(Lsn(8192)), 24);
        assert_eq!(geometry.header_len_at(Lsn(8200)), 0);
        assert!(geometry.is_segment_start(Lsn(128 * 1024)));
    }

    #[test]
    fn builder_pattern() {
        let relation = RelationId::new(1663, 13993, 16397);
        let config = FilterConfig::new()
            .exclude(relation)
            .exclude_all([RelationId::new(1663, 1, 2)])
            .page_magic(0xD07E);

        assert!(config.exclude.contains(&relation));
        assert_eq!(config.exclude.len(), 2);
        assert_eq!(config.page_magic, Some(0xD07E));
        assert_eq!(config.geometry, WalGeometry::default());
    }
}
