//! CLI command implementations.

pub mod dump;
pub mod filter;
pub mod verify;

use std::path::Path;
use walredact_core::{PageFramingReader, WalGeometry, WalRecordIterator};
use walredact_storage::SegmentedByteSource;

/// Opens a record iterator over the run of segments starting at `start_file`.
pub fn open_records(
    start_file: &Path,
    geometry: WalGeometry,
) -> Result<WalRecordIterator<SegmentedByteSource>, Box<dyn std::error::Error>> {
    let source = SegmentedByteSource::open_path(start_file, geometry.segment_size)?;
    let reader = PageFramingReader::new(source, geometry)?;
    Ok(WalRecordIterator::new(reader))
}
