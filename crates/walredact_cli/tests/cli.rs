//! End-to-end runs of the `walredact` binary.

use std::path::Path;
use std::process::{Command, Output};
use walredact_core::RelationId;
use walredact_testkit::prelude::*;

fn walredact(args: &[&str], start: &Path, extra: &[&Path]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_walredact"));
    command.args(["--segment-size", "32768", "--page-size", "1024"]);
    command.args(args).arg(start);
    for path in extra {
        command.arg(path);
    }
    command.output().expect("Failed to run walredact")
}

fn sample_wal(secret: RelationId) -> BuiltWal {
    let mut builder = WalBuilder::new(test_geometry());
    for i in 0..30u32 {
        builder.record(&RecordSpec::heap_insert(secret, format!("secret row {i:04}").as_bytes()));
        builder.record(&RecordSpec::heap_insert(RelationId::new(1663, 13993, 1), &[7; 300]));
        builder.record(&RecordSpec::commit(i));
    }
    builder.finish()
}

#[test]
fn filter_redacts_and_output_verifies() {
    let secret = RelationId::new(1663, 13993, 16397);
    let wal = sample_wal(secret);
    let dir = TempWalDir::write(&wal);
    let output_dir = dir.output_dir();

    let output = walredact(
        &["filter", "-x", "1663,13993,16397"],
        dir.first_segment(),
        &[&output_dir],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Redacted:         30"), "{stdout}");

    let filtered = read_segments(&output_dir);
    assert_eq!(filtered.len(), wal.bytes.len());
    assert!(!filtered.windows(10).any(|w| w == b"secret row"));

    let first_output = output_dir.join(dir.first_segment().file_name().unwrap());
    let verify = walredact(&["verify"], &first_output, &[]);
    assert!(verify.status.success(), "{}", String::from_utf8_lossy(&verify.stdout));
}

#[test]
fn dump_prints_json() {
    let wal = sample_wal(RelationId::new(1663, 13993, 16397));
    let dir = TempWalDir::write(&wal);

    let output = walredact(&["dump", "--format", "json", "--limit", "3"], dir.first_segment(), &[]);
    assert!(output.status.success());
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["rmgr"], "Heap");
    assert_eq!(records[0]["relation"], "1663/13993/16397");
    assert_eq!(records[2]["subtype"], "COMMIT");
}

#[test]
fn invalid_exclusion_is_rejected() {
    let wal = sample_wal(RelationId::new(1, 2, 3));
    let dir = TempWalDir::write(&wal);
    let output_dir = dir.output_dir();

    let output = walredact(&["filter", "-x", "1663,oops"], dir.first_segment(), &[&output_dir]);
    assert!(!output.status.success());
    assert!(!output_dir.exists());
}

#[test]
fn verify_fails_on_corruption() {
    let mut wal = sample_wal(RelationId::new(1, 2, 3));
    let at = (wal.records[4].lsn - wal.start) as usize + 40;
    wal.bytes[at] ^= 0x55;
    let dir = TempWalDir::write(&wal);

    let output = walredact(&["verify"], dir.first_segment(), &[]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Corrupt:         1"));
}
