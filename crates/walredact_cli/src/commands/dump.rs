//! Dump command implementation.

use serde::Serialize;
use std::path::Path;
use walredact_core::{DecodedRecord, WalGeometry};

/// Backup block representation for output.
#[derive(Debug, Serialize)]
pub struct BlockDump {
    /// Relation as tablespace/database/relfilenode.
    pub relation: String,
    /// Fork number.
    pub fork: u32,
    /// Block number.
    pub block: u32,
    /// Offset of the omitted hole.
    pub hole_offset: u16,
    /// Length of the omitted hole.
    pub hole_length: u16,
}

/// WAL record representation for output.
#[derive(Debug, Serialize)]
pub struct RecordDump {
    /// Position of the record.
    pub lsn: String,
    /// Resource manager name, or its id if unknown.
    pub rmgr: String,
    /// Subtype name, or its code if unknown.
    pub subtype: String,
    /// Transaction id.
    pub xid: u32,
    /// Total record length.
    pub total_len: u32,
    /// Main data length.
    pub main_data_len: u32,
    /// Position of the previous record.
    pub prev: String,
    /// Relation the record touches, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    /// Backup blocks.
    pub blocks: Vec<BlockDump>,
    /// Whether the checksum matches.
    pub checksum_ok: bool,
}

impl From<&DecodedRecord> for RecordDump {
    fn from(record: &DecodedRecord) -> Self {
        let header = &record.header;
        let rm = header.resource_manager();
        let subtype = rm
            .and_then(|rm| rm.subtype_name(header.subtype()))
            .map_or_else(|| format!("{:#04X}", header.subtype()), str::to_string);
        Self {
            lsn: record.lsn.to_string(),
            rmgr: rm.map_or_else(|| format!("rmid {}", header.rmid), |rm| rm.name().to_string()),
            subtype,
            xid: header.xid,
            total_len: header.total_len,
            main_data_len: header.main_data_len,
            prev: header.prev.to_string(),
            relation: record.relation().map(|r| r.to_string()),
            blocks: record
                .blocks
                .iter()
                .map(|block| BlockDump {
                    relation: block.header.relation.to_string(),
                    fork: block.header.fork,
                    block: block.header.block,
                    hole_offset: block.header.hole_offset,
                    hole_length: block.header.hole_length,
                })
                .collect(),
            checksum_ok: record.checksum_ok(),
        }
    }
}

/// Runs the dump command.
pub fn run(
    start_file: &Path,
    geometry: WalGeometry,
    limit: Option<usize>,
    format: &str,
) -> Result<Vec<RecordDump>, Box<dyn std::error::Error>> {
    let records = read_records(start_file, geometry, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }

    Ok(records)
}

fn read_records(
    start_file: &Path,
    geometry: WalGeometry,
    limit: Option<usize>,
) -> Result<Vec<RecordDump>, Box<dyn std::error::Error>> {
    let max_records = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();
    for record in super::open_records(start_file, geometry)?.take(max_records) {
        records.push(RecordDump::from(&record?));
    }
    Ok(records)
}

fn print_text_output(records: &[RecordDump]) {
    println!("WAL Records ({} total)", records.len());
    println!("================");
    println!();

    for record in records {
        print!(
            "{:>17} {:>12}.{:<22} xid={} len={} prev={} data={}",
            record.lsn,
            record.rmgr,
            record.subtype,
            record.xid,
            record.total_len,
            record.prev,
            record.main_data_len
        );
        if let Some(relation) = &record.relation {
            print!(" rel={relation}");
        }
        if !record.blocks.is_empty() {
            let blocks: Vec<String> = record
                .blocks
                .iter()
                .map(|b| format!("{} blk {} hole {}+{}", b.relation, b.block, b.hole_offset, b.hole_length))
                .collect();
            print!(" blocks=[{}]", blocks.join(", "));
        }
        if !record.checksum_ok {
            print!(" CRC MISMATCH");
        }
        println!();
    }
}
