//! Property-based test generators using proptest.
//!
//! Relations are drawn from a small pool so that generated exclusion sets
//! actually hit generated records.

use crate::builder::{BuiltWal, RecordSpec, WalBuilder};
use proptest::prelude::*;
use std::collections::HashSet;
use walredact_core::{BackupBlock, RelationId, WalGeometry};

/// One step of a generated WAL.
#[derive(Debug, Clone)]
pub enum WalOp {
    /// Append a record.
    Record(RecordSpec),
    /// Append a segment switch.
    Switch,
}

/// Strategy for relations from a pool of four.
pub fn relation_strategy() -> impl Strategy<Value = RelationId> {
    (16384u32..16388).prop_map(|relfilenode| RelationId::new(1663, 13993, relfilenode))
}

/// Strategy for exclusion sets over the same pool.
pub fn exclusion_strategy() -> impl Strategy<Value = HashSet<RelationId>> {
    prop::collection::hash_set(relation_strategy(), 0..3)
}

fn backup_block_strategy() -> impl Strategy<Value = (BackupBlock, u8)> {
    (relation_strategy(), any::<u32>(), 0u16..512, 4096u16..7680, any::<u8>()).prop_map(
        |(relation, block, hole_offset, hole_length, fill)| {
            (
                BackupBlock {
                    relation,
                    fork: 0,
                    block,
                    hole_offset,
                    hole_length,
                },
                fill,
            )
        },
    )
}

/// Strategy for a single record of a mixed workload.
pub fn record_spec_strategy() -> impl Strategy<Value = RecordSpec> {
    prop_oneof![
        4 => (relation_strategy(), prop::collection::vec(any::<u8>(), 0..1500))
            .prop_map(|(relation, row)| RecordSpec::heap_insert(relation, &row)),
        2 => (relation_strategy(), prop::collection::vec(any::<u8>(), 0..64))
            .prop_map(|(relation, tuple)| RecordSpec::btree_insert(relation, &tuple)),
        2 => any::<u32>().prop_map(RecordSpec::commit),
        1 => (relation_strategy(), backup_block_strategy()).prop_map(|(relation, block)| {
            RecordSpec::heap_insert(relation, &[1, 2, 3]).with_backup_block(block.0, block.1)
        }),
        1 => (17u8..=255, prop::collection::vec(any::<u8>(), 0..40))
            .prop_map(|(rmid, data)| RecordSpec::unknown(rmid, data)),
    ]
}

/// Strategy for a sequence of steps.
pub fn wal_ops_strategy() -> impl Strategy<Value = Vec<WalOp>> {
    prop::collection::vec(
        prop_oneof![
            12 => record_spec_strategy().prop_map(WalOp::Record),
            1 => Just(WalOp::Switch),
        ],
        1..40,
    )
}

/// Builds the WAL described by `ops`.
pub fn build_wal(geometry: WalGeometry, ops: &[WalOp]) -> BuiltWal {
    let mut builder = WalBuilder::new(geometry);
    for op in ops {
        match op {
            WalOp::Record(spec) => {
                builder.record(spec);
            }
            WalOp::Switch => {
                builder.switch();
            }
        }
    }
    builder.finish()
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test_geometry;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn built_wal_is_whole_segments(ops in wal_ops_strategy()) {
            let geometry = test_geometry();
            let wal = build_wal(geometry, &ops);
            prop_assert_eq!(wal.bytes.len() as u64 % geometry.segment_size, 0);
            let records = ops.iter().filter(|op| matches!(op, WalOp::Record(_))).count();
            let switches = ops.len() - records;
            prop_assert_eq!(wal.records.len(), records + switches);
        }

        #[test]
        fn relations_come_from_pool(relation in relation_strategy()) {
            prop_assert_eq!(relation.tablespace, 1663);
            prop_assert!((16384..16388).contains(&relation.relfilenode));
        }
    }
}
