//! Resource manager and record subtype tables.
//!
//! The tables are immutable statics; nothing here changes at run time.

/// XLOG subtype of a no-op record.
pub const XLOG_NOOP: u8 = 0x20;

/// XLOG subtype of a segment switch record.
pub const XLOG_SWITCH: u8 = 0x40;

/// XLOG subtype of a standalone full-page image.
pub const XLOG_FPI: u8 = 0xA0;

/// Heap subtype flag marking a record that reinitializes its page.
pub const XLOG_HEAP_INIT_PAGE: u8 = 0x80;

/// Mask of the heap operation bits within the subtype.
const XLOG_HEAP_OPMASK: u8 = 0x70;

/// Subsystem that owns the interpretation of a record's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResourceManager {
    /// WAL control records.
    Xlog = 0,
    /// Transaction commit and abort.
    Transaction = 1,
    /// Relation file creation and truncation.
    Storage = 2,
    /// Commit log pages.
    Clog = 3,
    /// Database creation and removal.
    Database = 4,
    /// Tablespace creation and removal.
    Tablespace = 5,
    /// Multixact bookkeeping.
    MultiXact = 6,
    /// Relation mapper updates.
    RelMap = 7,
    /// Hot standby support.
    Standby = 8,
    /// Secondary heap operations.
    Heap2 = 9,
    /// Heap tuple operations.
    Heap = 10,
    /// B-tree index.
    Btree = 11,
    /// Hash index.
    Hash = 12,
    /// GIN index.
    Gin = 13,
    /// GiST index.
    Gist = 14,
    /// Sequences.
    Sequence = 15,
    /// SP-GiST index.
    SpGist = 16,
}

const ALL: [ResourceManager; 17] = [
    ResourceManager::Xlog,
    ResourceManager::Transaction,
    ResourceManager::Storage,
    ResourceManager::Clog,
    ResourceManager::Database,
    ResourceManager::Tablespace,
    ResourceManager::MultiXact,
    ResourceManager::RelMap,
    ResourceManager::Standby,
    ResourceManager::Heap2,
    ResourceManager::Heap,
    ResourceManager::Btree,
    ResourceManager::Hash,
    ResourceManager::Gin,
    ResourceManager::Gist,
    ResourceManager::Sequence,
    ResourceManager::SpGist,
];

const XLOG_SUBTYPES: &[(u8, &str)] = &[
    (0x00, "CHECKPOINT_SHUTDOWN"),
    (0x10, "CHECKPOINT_ONLINE"),
    (XLOG_NOOP, "NOOP"),
    (0x30, "NEXTOID"),
    (XLOG_SWITCH, "SWITCH"),
    (0x50, "BACKUP_END"),
    (0x60, "PARAMETER_CHANGE"),
    (0x70, "RESTORE_POINT"),
    (0x80, "FPW_CHANGE"),
    (0x90, "END_OF_RECOVERY"),
    (XLOG_FPI, "FPI"),
];

const TRANSACTION_SUBTYPES: &[(u8, &str)] = &[
    (0x00, "COMMIT"),
    (0x10, "PREPARE"),
    (0x20, "ABORT"),
    (0x30, "COMMIT_PREPARED"),
    (0x40, "ABORT_PREPARED"),
    (0x50, "ASSIGNMENT"),
    (0x60, "COMMIT_COMPACT"),
];

const STORAGE_SUBTYPES: &[(u8, &str)] = &[(0x10, "CREATE"), (0x20, "TRUNCATE")];

const CLOG_SUBTYPES: &[(u8, &str)] = &[(0x00, "ZEROPAGE"), (0x10, "TRUNCATE")];

const DATABASE_SUBTYPES: &[(u8, &str)] = &[(0x00, "CREATE"), (0x10, "DROP")];

const TABLESPACE_SUBTYPES: &[(u8, &str)] = &[(0x00, "CREATE"), (0x10, "DROP")];

const MULTIXACT_SUBTYPES: &[(u8, &str)] = &[
    (0x00, "ZERO_OFF_PAGE"),
    (0x10, "ZERO_MEM_PAGE"),
    (0x20, "CREATE_ID"),
];

const RELMAP_SUBTYPES: &[(u8, &str)] = &[(0x00, "UPDATE")];

const STANDBY_SUBTYPES: &[(u8, &str)] = &[(0x00, "LOCK"), (0x10, "RUNNING_XACTS")];

const HEAP2_SUBTYPES: &[(u8, &str)] = &[
    (0x00, "REWRITE"),
    (0x10, "CLEAN"),
    (0x20, "FREEZE_PAGE"),
    (0x30, "CLEANUP_INFO"),
    (0x40, "VISIBLE"),
    (0x50, "MULTI_INSERT"),
    (0x60, "LOCK_UPDATED"),
    (0x70, "NEW_CID"),
];

const HEAP_SUBTYPES: &[(u8, &str)] = &[
    (0x00, "INSERT"),
    (0x10, "DELETE"),
    (0x20, "UPDATE"),
    (0x40, "HOT_UPDATE"),
    (0x50, "NEWPAGE"),
    (0x60, "LOCK"),
    (0x70, "INPLACE"),
];

const BTREE_SUBTYPES: &[(u8, &str)] = &[
    (0x00, "INSERT_LEAF"),
    (0x10, "INSERT_UPPER"),
    (0x20, "INSERT_META"),
    (0x30, "SPLIT_L"),
    (0x40, "SPLIT_R"),
    (0x50, "SPLIT_L_ROOT"),
    (0x60, "SPLIT_R_ROOT"),
    (0x70, "DELETE"),
    (0x80, "UNLINK_PAGE"),
    (0x90, "UNLINK_PAGE_META"),
    (0xA0, "NEWROOT"),
    (0xB0, "MARK_PAGE_HALFDEAD"),
    (0xC0, "VACUUM"),
    (0xD0, "REUSE_PAGE"),
];

const GIN_SUBTYPES: &[(u8, &str)] = &[
    (0x00, "CREATE_INDEX"),
    (0x10, "CREATE_PTREE"),
    (0x20, "INSERT"),
    (0x30, "SPLIT"),
    (0x40, "VACUUM_PAGE"),
    (0x50, "DELETE_PAGE"),
    (0x60, "UPDATE_META_PAGE"),
    (0x70, "INSERT_LISTPAGE"),
    (0x80, "DELETE_LISTPAGE"),
    (0x90, "VACUUM_DATA_LEAF_PAGE"),
];

const GIST_SUBTYPES: &[(u8, &str)] = &[
    (0x00, "PAGE_UPDATE"),
    (0x20, "NEW_ROOT"),
    (0x30, "PAGE_SPLIT"),
    (0x40, "INSERT_COMPLETE"),
    (0x50, "CREATE_INDEX"),
    (0x60, "PAGE_DELETE"),
];

const SEQUENCE_SUBTYPES: &[(u8, &str)] = &[(0x00, "LOG")];

const SPGIST_SUBTYPES: &[(u8, &str)] = &[
    (0x00, "CREATE_INDEX"),
    (0x10, "ADD_LEAF"),
    (0x20, "MOVE_LEAFS"),
    (0x30, "ADD_NODE"),
    (0x40, "SPLIT_TUPLE"),
    (0x50, "PICKSPLIT"),
    (0x60, "VACUUM_LEAF"),
    (0x70, "VACUUM_ROOT"),
    (0x80, "VACUUM_REDIRECT"),
];

impl ResourceManager {
    /// Looks up a resource manager by id.
    ///
    /// Unknown ids return `None`.
    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        ALL.get(usize::from(id)).copied()
    }

    /// Returns the numeric id.
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Returns the display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Xlog => "XLOG",
            Self::Transaction => "Transaction",
            Self::Storage => "Storage",
            Self::Clog => "CLOG",
            Self::Database => "Database",
            Self::Tablespace => "Tablespace",
            Self::MultiXact => "MultiXact",
            Self::RelMap => "RelMap",
            Self::Standby => "Standby",
            Self::Heap2 => "Heap2",
            Self::Heap => "Heap",
            Self::Btree => "Btree",
            Self::Hash => "Hash",
            Self::Gin => "Gin",
            Self::Gist => "Gist",
            Self::Sequence => "Sequence",
            Self::SpGist => "SPGist",
        }
    }

    /// Returns whether this manager's records start with a relation id.
    ///
    /// XLOG full-page images also carry one but depend on the subtype;
    /// see [`crate::RecordHeader::touches_relation`].
    #[must_use]
    pub const fn touches_relation(self) -> bool {
        matches!(
            self,
            Self::Storage
                | Self::Heap2
                | Self::Heap
                | Self::Btree
                | Self::Gin
                | Self::Gist
                | Self::Sequence
                | Self::SpGist
        )
    }

    fn subtypes(self) -> &'static [(u8, &'static str)] {
        match self {
            Self::Xlog => XLOG_SUBTYPES,
            Self::Transaction => TRANSACTION_SUBTYPES,
            Self::Storage => STORAGE_SUBTYPES,
            Self::Clog => CLOG_SUBTYPES,
            Self::Database => DATABASE_SUBTYPES,
            Self::Tablespace => TABLESPACE_SUBTYPES,
            Self::MultiXact => MULTIXACT_SUBTYPES,
            Self::RelMap => RELMAP_SUBTYPES,
            Self::Standby => STANDBY_SUBTYPES,
            Self::Heap2 => HEAP2_SUBTYPES,
            Self::Heap => HEAP_SUBTYPES,
            Self::Btree => BTREE_SUBTYPES,
            Self::Hash => &[],
            Self::Gin => GIN_SUBTYPES,
            Self::Gist => GIST_SUBTYPES,
            Self::Sequence => SEQUENCE_SUBTYPES,
            Self::SpGist => SPGIST_SUBTYPES,
        }
    }

    /// Returns the name of a record subtype (the high nibble of the info
    /// byte), if known.
    ///
    /// For heap records the init-page flag is ignored here.
    #[must_use]
    pub fn subtype_name(self, subtype: u8) -> Option<&'static str> {
        let key = match self {
            Self::Heap => subtype & XLOG_HEAP_OPMASK,
            _ => subtype,
        };
        self.subtypes()
            .iter()
            .find(|(code, _)| *code == key)
            .map(|(_, name)| *name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for id in 0..17u8 {
            assert_eq!(ResourceManager::from_id(id).unwrap().id(), id);
        }
        assert_eq!(ResourceManager::from_id(17), None);
        assert_eq!(ResourceManager::from_id(0xFF), None);
    }

    #[test]
    fn relation_touching_managers() {
        let touching: Vec<_> = ALL.iter().filter(|rm| rm.touches_relation()).collect();
        assert_eq!(touching.len(), 8);
        assert!(!ResourceManager::Xlog.touches_relation());
        assert!(!ResourceManager::Hash.touches_relation());
        assert!(ResourceManager::Heap2.touches_relation());
    }

    #[test]
    fn subtype_names() {
        assert_eq!(ResourceManager::Xlog.subtype_name(XLOG_SWITCH), Some("SWITCH"));
        assert_eq!(ResourceManager::Heap.subtype_name(0x40), Some("HOT_UPDATE"));
        assert_eq!(
            ResourceManager::Heap.subtype_name(XLOG_HEAP_INIT_PAGE),
            Some("INSERT")
        );
        assert_eq!(ResourceManager::Database.subtype_name(0x10), Some("DROP"));
        assert_eq!(ResourceManager::Hash.subtype_name(0x00), None);
        assert_eq!(ResourceManager::Gist.subtype_name(0x10), None);
    }
}
