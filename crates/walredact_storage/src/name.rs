//! Segment file naming.
//!
//! A segment is identified by its timeline and a sequence number. The sequence
//! number is split into a "log id" and a segment-within-log part so that a
//! log id always covers 4 GiB of WAL:
//!
//! ```text
//! TTTTTTTTLLLLLLLLSSSSSSSS
//! timeline  log id  segment
//! ```
//!
//! With the default 16 MiB segments there are 256 segments per log id.

use crate::error::{StorageError, StorageResult};
use std::fmt;

/// Length of a segment file name in characters.
pub const SEGMENT_NAME_LEN: usize = 24;

/// Bytes of WAL covered by one log id.
pub(crate) const BYTES_PER_LOG_ID: u64 = 0x1_0000_0000;

/// Identifies one segment file within a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentName {
    /// Timeline the segment belongs to.
    pub timeline: u32,
    /// Sequence number of the segment; `segno * segment_size` is its base LSN.
    pub segno: u64,
}

impl SegmentName {
    /// Creates a segment name.
    #[must_use]
    pub const fn new(timeline: u32, segno: u64) -> Self {
        Self { timeline, segno }
    }

    /// Returns the segment that contains `position`.
    #[must_use]
    pub const fn containing(timeline: u32, position: u64, segment_size: u64) -> Self {
        Self {
            timeline,
            segno: position / segment_size,
        }
    }

    /// Parses a 24-character hexadecimal segment file name.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidSegmentName`] if the name is not exactly
    /// 24 hex digits or the segment part is out of range for `segment_size`.
    pub fn parse(name: &str, segment_size: u64) -> StorageResult<Self> {
        let invalid = || StorageError::InvalidSegmentName {
            name: name.to_string(),
        };

        if name.len() != SEGMENT_NAME_LEN || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let timeline = u32::from_str_radix(&name[0..8], 16).map_err(|_| invalid())?;
        let log_id = u64::from_str_radix(&name[8..16], 16).map_err(|_| invalid())?;
        let seg = u64::from_str_radix(&name[16..24], 16).map_err(|_| invalid())?;

        let per_log_id = segments_per_log_id(segment_size);
        if seg >= per_log_id {
            return Err(invalid());
        }

        Ok(Self {
            timeline,
            segno: log_id * per_log_id + seg,
        })
    }

    /// Renders the file name for this segment.
    #[must_use]
    pub fn file_name(&self, segment_size: u64) -> String {
        let per_log_id = segments_per_log_id(segment_size);
        format!(
            "{:08X}{:08X}{:08X}",
            self.timeline,
            self.segno / per_log_id,
            self.segno % per_log_id
        )
    }

    /// Returns the first byte position covered by this segment.
    #[must_use]
    pub const fn base_position(&self, segment_size: u64) -> u64 {
        self.segno * segment_size
    }

    /// Returns the following segment on the same timeline.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self {
            timeline: self.timeline,
            segno: self.segno + 1,
        }
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tli {} seg {}", self.timeline, self.segno)
    }
}

/// Number of segments sharing one log id for the given segment size.
#[must_use]
pub const fn segments_per_log_id(segment_size: u64) -> u64 {
    BYTES_PER_LOG_ID / segment_size
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEG_16M: u64 = 16 * 1024 * 1024;

    #[test]
    fn render_default_segment_size() {
        let name = SegmentName::new(1, 0x1FF);
        assert_eq!(name.file_name(SEG_16M), "0000000100000001000000FF");
    }

    #[test]
    fn parse_default_segment_size() {
        let name = SegmentName::parse("000000020000000A00000003", SEG_16M).unwrap();
        assert_eq!(name.timeline, 2);
        assert_eq!(name.segno, 0x0A * 256 + 3);
        assert_eq!(name.base_position(SEG_16M), name.segno * SEG_16M);
    }

    #[test]
    fn parse_then_render_is_stable() {
        let text = "000000010000003C000000E1";
        let name = SegmentName::parse(text, SEG_16M).unwrap();
        assert_eq!(name.file_name(SEG_16M), text);
    }

    #[test]
    fn small_segments_use_wider_segment_part() {
        let size = 64 * 1024;
        assert_eq!(segments_per_log_id(size), 0x10000);
        let name = SegmentName::new(1, 0x1_0005);
        assert_eq!(name.file_name(size), "000000010000000100000005");
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in [
            "",
            "00000001000000000000001",
            "0000000100000000000000010",
            "00000001000000000000000G",
            "000000010000000000000100",
        ] {
            assert!(
                matches!(
                    SegmentName::parse(bad, SEG_16M),
                    Err(StorageError::InvalidSegmentName { .. })
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn containing_and_next() {
        let name = SegmentName::containing(1, 3 * SEG_16M + 17, SEG_16M);
        assert_eq!(name.segno, 3);
        assert_eq!(name.next().segno, 4);
        assert_eq!(name.next().timeline, 1);
    }
}
