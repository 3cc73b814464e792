//! Property tests for the redaction filter.

use proptest::prelude::*;
use std::collections::HashSet;
use walredact_core::{
    filter_stream, record_checksum, FilterConfig, FilterStats, PageFramingReader,
    RecordHeader, RelationId, ResourceManager, WalRecordIterator,
};
use walredact_storage::{MemorySink, MemorySource};
use walredact_testkit::prelude::*;

fn filter(wal: &BuiltWal, input: Vec<u8>, exclude: &HashSet<RelationId>) -> (Vec<u8>, FilterStats) {
    let config = FilterConfig::new()
        .geometry(wal.geometry)
        .exclude_all(exclude.iter().copied());
    let source = MemorySource::new(wal.start.as_u64(), input);
    let (sink, stats) =
        filter_stream(source, MemorySink::new(wal.start.as_u64()), config).unwrap();
    (sink.into_inner(), stats)
}

fn is_excluded(record: &RecordInfo, exclude: &HashSet<RelationId>) -> bool {
    record.relation.is_some_and(|relation| exclude.contains(&relation))
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn empty_exclusion_is_identity(ops in wal_ops_strategy()) {
        let wal = build_wal(test_geometry(), &ops);
        let (output, stats) = filter(&wal, wal.bytes.clone(), &HashSet::new());
        prop_assert!(output == wal.bytes);
        prop_assert_eq!(stats.redacted, 0);
        prop_assert_eq!(stats.records, wal.records.len() as u64);
        prop_assert_eq!(stats.end_of_wal, Some(wal.end_of_wal));
    }

    #[test]
    fn filtering_is_idempotent(ops in wal_ops_strategy(), exclude in exclusion_strategy()) {
        let wal = build_wal(test_geometry(), &ops);
        let (once, _) = filter(&wal, wal.bytes.clone(), &exclude);
        let (twice, stats) = filter(&wal, once.clone(), &exclude);
        prop_assert!(twice == once);
        prop_assert_eq!(stats.redacted, 0);
    }

    #[test]
    fn length_and_framing_preserved(ops in wal_ops_strategy(), exclude in exclusion_strategy()) {
        let wal = build_wal(test_geometry(), &ops);
        let (output, stats) = filter(&wal, wal.bytes.clone(), &exclude);
        prop_assert_eq!(output.len(), wal.bytes.len());
        prop_assert_eq!(stats.bytes, wal.bytes.len() as u64);
        for range in wal.header_ranges() {
            prop_assert_eq!(&output[range.clone()], &wal.bytes[range]);
        }
    }

    #[test]
    fn records_redacted_exactly_when_excluded(
        ops in wal_ops_strategy(),
        exclude in exclusion_strategy(),
    ) {
        let wal = build_wal(test_geometry(), &ops);
        let (output, stats) = filter(&wal, wal.bytes.clone(), &exclude);

        let mut redacted = 0;
        for record in &wal.records {
            let before = wal.record_payload(&wal.bytes, record);
            let after = wal.record_payload(&output, record);
            if is_excluded(record, &exclude) {
                redacted += 1;
                let old = RecordHeader::decode(record.lsn, &before).unwrap();
                let new = RecordHeader::decode(record.lsn, &after).unwrap();
                prop_assert_eq!(new.total_len, old.total_len);
                prop_assert_eq!(new.xid, old.xid);
                prop_assert_eq!(new.prev, old.prev);
                prop_assert_eq!(new.rmid, ResourceManager::Xlog.id());
                prop_assert!(after[32..].iter().all(|&b| b == 0));
                prop_assert_eq!(record_checksum(&after[..32], &after[32..]), new.crc);
            } else {
                prop_assert!(after == before, "record at {} changed", record.lsn);
            }
        }
        prop_assert_eq!(stats.redacted, redacted);
    }

    #[test]
    fn iterator_sees_every_record(ops in wal_ops_strategy()) {
        let wal = build_wal(test_geometry(), &ops);
        let reader = PageFramingReader::new(wal.source(), wal.geometry).unwrap();
        let decoded: Vec<_> = WalRecordIterator::new(reader)
            .collect::<Result<_, _>>()
            .unwrap();

        prop_assert_eq!(decoded.len(), wal.records.len());
        for (record, info) in decoded.iter().zip(&wal.records) {
            prop_assert_eq!(record.lsn, info.lsn);
            prop_assert_eq!(record.header.total_len, info.total_len);
            prop_assert_eq!(record.relation(), info.relation);
            prop_assert!(record.checksum_ok());
        }
    }

    #[test]
    fn redacted_output_still_decodes(ops in wal_ops_strategy(), exclude in exclusion_strategy()) {
        let wal = build_wal(test_geometry(), &ops);
        let (output, _) = filter(&wal, wal.bytes.clone(), &exclude);
        let source = MemorySource::new(wal.start.as_u64(), output);
        let reader = PageFramingReader::new(source, wal.geometry).unwrap();
        for record in WalRecordIterator::new(reader) {
            let record = record.unwrap();
            prop_assert!(record.checksum_ok(), "bad checksum at {}", record.lsn);
        }
    }
}
