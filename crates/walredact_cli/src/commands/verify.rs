//! Verify command implementation.

use std::path::Path;
use tracing::warn;
use walredact_core::WalGeometry;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of records whose checksum matched.
    pub valid_records: usize,
    /// Number of records whose checksum did not match.
    pub corrupt_records: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.corrupt_records == 0 && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(start_file: &Path, geometry: WalGeometry) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    println!("Verifying WAL starting at {}", start_file.display());
    println!();

    let result = verify(start_file, geometry)?;

    println!("  Records checked: {}", result.records_checked);
    println!("  Valid:           {}", result.valid_records);
    println!("  Corrupt:         {}", result.corrupt_records);
    for error in &result.errors {
        println!("  Error: {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ WAL verification passed");
        Ok(result)
    } else {
        println!("✗ WAL verification failed");
        Err("Verification failed".into())
    }
}

fn verify(start_file: &Path, geometry: WalGeometry) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();
    for record in super::open_records(start_file, geometry)? {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                result.errors.push(e.to_string());
                break;
            }
        };
        result.records_checked += 1;
        if record.checksum_ok() {
            result.valid_records += 1;
        } else {
            warn!(
                lsn = %record.lsn,
                stored = format_args!("{:08X}", record.header.crc),
                computed = format_args!("{:08X}", record.computed_crc),
                "checksum mismatch"
            );
            result.corrupt_records += 1;
            result
                .errors
                .push(format!("checksum mismatch at {}", record.lsn));
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use walredact_core::RelationId;
    use walredact_testkit::prelude::*;

    fn sample() -> BuiltWal {
        let mut builder = WalBuilder::new(test_geometry());
        builder.record(&RecordSpec::heap_insert(RelationId::new(1663, 1, 2), &[5; 600]));
        builder.record(&RecordSpec::commit(3));
        builder.finish()
    }

    #[test]
    fn clean_wal_verifies() {
        let wal = sample();
        let dir = TempWalDir::write(&wal);
        let result = verify(dir.first_segment(), wal.geometry).unwrap();
        assert_eq!(result.records_checked, 2);
        assert!(result.is_ok());
    }

    #[test]
    fn flipped_byte_is_reported() {
        let mut wal = sample();
        let at = (wal.records[0].lsn - wal.start) as usize + 100;
        wal.bytes[at] ^= 0xFF;
        let dir = TempWalDir::write(&wal);

        let result = verify(dir.first_segment(), wal.geometry).unwrap();
        assert_eq!(result.corrupt_records, 1);
        assert_eq!(result.valid_records, 1);
        assert!(run(dir.first_segment(), wal.geometry).is_err());
    }
}
