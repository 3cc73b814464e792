//! Filter command implementation.

use std::path::Path;
use tracing::info;
use walredact_core::{filter_stream, FilterConfig, FilterStats, RelationId, WalGeometry};
use walredact_storage::{SegmentWriter, SegmentedByteSource};

/// Runs the filter command.
///
/// Output segments get the same names as the input segments they mirror.
pub fn run(
    start_file: &Path,
    output_dir: &Path,
    exclude: &[RelationId],
    geometry: WalGeometry,
) -> Result<FilterStats, Box<dyn std::error::Error>> {
    let source = SegmentedByteSource::open_path(start_file, geometry.segment_size)?;
    let first = source
        .current_segment()
        .ok_or("Start file could not be opened")?;
    let sink = SegmentWriter::create(output_dir, first, geometry.segment_size)?;

    for relation in exclude {
        info!(%relation, "excluding relation");
    }
    let config = FilterConfig::new()
        .geometry(geometry)
        .exclude_all(exclude.iter().copied());

    let (mut sink, stats) = filter_stream(source, sink, config)?;
    sink.finish()?;

    println!("Filtered {} into {}", start_file.display(), output_dir.display());
    println!("  Records:          {}", stats.records);
    println!("  Redacted:         {}", stats.redacted);
    println!("  Passed through:   {}", stats.passed_through());
    println!("  Segment switches: {}", stats.segment_switches);
    println!("  Bytes written:    {}", stats.bytes);
    match stats.end_of_wal {
        Some(lsn) => println!("  End of WAL:       {lsn}"),
        None => println!("  End of WAL:       not reached"),
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use walredact_testkit::prelude::*;

    #[test]
    fn filter_writes_mirrored_segments() {
        let geometry = test_geometry();
        let secret = RelationId::new(1663, 13993, 16397);
        let mut builder = WalBuilder::new(geometry);
        builder.record(&RecordSpec::heap_insert(secret, b"card number"));
        builder.record(&RecordSpec::commit(77));
        let wal = builder.finish();
        let dir = TempWalDir::write(&wal);

        let stats = run(dir.first_segment(), &dir.output_dir(), &[secret], geometry).unwrap();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.redacted, 1);

        let output = read_segments(&dir.output_dir());
        assert_eq!(output.len(), wal.bytes.len());
        assert!(!output.windows(11).any(|w| w == b"card number"));
    }

    #[test]
    fn missing_start_file() {
        let dir = tempfile::tempdir().unwrap();
        let start = dir.path().join("000000010000000000000001");
        let result = run(&start, &dir.path().join("out"), &[], test_geometry());
        assert!(result.is_err());
    }
}
