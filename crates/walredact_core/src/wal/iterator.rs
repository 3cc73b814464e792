//! Decoding records from the framing-stripped stream.

use crate::error::{CoreError, CoreResult};
use crate::lsn::Lsn;
use crate::wal::framing::PageFramingReader;
use crate::wal::record::{
    BackupBlock, RecordCrc, RecordHeader, RelationId, BACKUP_BLOCK_HEADER_LEN,
    RECORD_CRC_OFFSET, RECORD_HEADER_LEN,
};
use tracing::debug;
use walredact_storage::WalSource;

/// One backup block of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    /// The block header.
    pub header: BackupBlock,
    /// The page image with the hole left out.
    pub image: Vec<u8>,
}

/// A fully read record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    /// Start of the record.
    pub lsn: Lsn,
    /// The record header.
    pub header: RecordHeader,
    /// Main data.
    pub main_data: Vec<u8>,
    /// Backup blocks.
    pub blocks: Vec<DecodedBlock>,
    /// Checksum computed over the bytes actually read.
    pub computed_crc: u32,
}

impl DecodedRecord {
    /// Returns whether the stored checksum matches the record's bytes.
    #[must_use]
    pub fn checksum_ok(&self) -> bool {
        self.computed_crc == self.header.crc
    }

    /// The relation at the start of the main data, for records that carry
    /// one.
    #[must_use]
    pub fn relation(&self) -> Option<RelationId> {
        if !self.header.touches_relation() {
            return None;
        }
        RelationId::decode(self.lsn, &self.main_data).ok()
    }
}

/// Iterator over the records of a stream.
///
/// A record continued from before the first page is skipped. Segment switch
/// records are followed to the next segment. Iteration ends at the
/// end-of-WAL marker or a clean end of input; the first error ends it too.
///
/// # Example
///
/// ```rust,ignore
/// let reader = PageFramingReader::new(source, geometry)?;
/// for record in WalRecordIterator::new(reader) {
///     let record = record?;
///     println!("{} {:?}", record.lsn, record.header.resource_manager());
/// }
/// ```
pub struct WalRecordIterator<S: WalSource> {
    reader: PageFramingReader<S>,
    started: bool,
    done: bool,
}

impl<S: WalSource> WalRecordIterator<S> {
    /// Creates an iterator reading from `reader`.
    #[must_use]
    pub fn new(reader: PageFramingReader<S>) -> Self {
        Self {
            reader,
            started: false,
            done: false,
        }
    }

    /// Returns the underlying reader.
    pub fn into_inner(self) -> PageFramingReader<S> {
        self.reader
    }

    fn skip_continuation(&mut self) -> CoreResult<()> {
        self.reader.read(0, false)?;
        if let Some(header) = self.reader.last_header() {
            if header.is_continuation() && header.rem_len > 0 {
                debug!(bytes = header.rem_len, "skipping continued record");
                self.reader.read(header.rem_len as usize, false)?;
            }
        }
        Ok(())
    }

    fn next_record(&mut self) -> CoreResult<Option<DecodedRecord>> {
        if !self.started {
            self.started = true;
            self.skip_continuation()?;
        }

        let Some((lsn, raw_header)) = self.reader.read_record_start(RECORD_HEADER_LEN)? else {
            return Ok(None);
        };
        let header = RecordHeader::decode(lsn, &raw_header)?;
        if header.is_end_of_wal() {
            debug!(%lsn, "end of WAL");
            return Ok(None);
        }
        header.validate(lsn)?;

        let main_data = self.read_payload(header.main_data_len as u64)?;
        let block_data = self.read_payload(header.backup_blocks_len().unwrap_or(0))?;

        let mut crc = RecordCrc::new();
        crc.update(&main_data);
        crc.update(&block_data);
        crc.update(&raw_header[..RECORD_CRC_OFFSET]);

        let record = DecodedRecord {
            lsn,
            header,
            blocks: decode_blocks(lsn, &header, &block_data)?,
            main_data,
            computed_crc: crc.finish(),
        };

        if header.is_segment_switch() && !self.reader.skip_to_next_segment()? {
            self.done = true;
        }
        Ok(Some(record))
    }

    fn read_payload(&mut self, len: u64) -> CoreResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        Ok(self.reader.read(len as usize, false)?.1)
    }
}

fn decode_blocks(lsn: Lsn, header: &RecordHeader, data: &[u8]) -> CoreResult<Vec<DecodedBlock>> {
    let mut blocks = Vec::new();
    let mut offset = 0usize;
    for _ in 0..header.backup_block_count() {
        let block = BackupBlock::decode(lsn, &data[offset..])?;
        let start = offset + BACKUP_BLOCK_HEADER_LEN;
        let end = start + block.image_len() as usize;
        let Some(image) = data.get(start..end) else {
            return Err(CoreError::malformed(
                lsn,
                format!(
                    "backup block image of {} bytes overruns {} bytes of block data",
                    block.image_len(),
                    data.len()
                ),
            ));
        };
        blocks.push(DecodedBlock {
            header: block,
            image: image.to_vec(),
        });
        offset = end;
    }
    if offset != data.len() {
        return Err(CoreError::malformed(
            lsn,
            format!(
                "{} backup blocks use {offset} of {} bytes",
                header.backup_block_count(),
                data.len()
            ),
        ));
    }
    Ok(blocks)
}

impl<S: WalSource> Iterator for WalRecordIterator<S> {
    type Item = CoreResult<DecodedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.next_record().transpose();
        if !matches!(result, Some(Ok(_))) {
            self.done = true;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_must_fill_their_space() {
        let header = RecordHeader {
            total_len: 32 + 12 + 24 + 192,
            xid: 1,
            main_data_len: 12,
            info: 0x01,
            rmid: 10,
            prev: Lsn(0),
            crc: 0,
        };
        let block = BackupBlock {
            relation: RelationId::new(1, 2, 3),
            fork: 0,
            block: 0,
            hole_offset: 100,
            hole_length: 8000,
        };
        let mut data = block.encode().to_vec();
        data.extend_from_slice(&[7; 192]);

        let blocks = decode_blocks(Lsn(0), &header, &data).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].image.len(), 192);

        data.push(0);
        assert!(matches!(
            decode_blocks(Lsn(0), &header, &data),
            Err(CoreError::MalformedRecord { .. })
        ));
        assert!(matches!(
            decode_blocks(Lsn(0), &header, &data[..100]),
            Err(CoreError::MalformedRecord { .. })
        ));
    }
}
