//! In-memory source and sink for testing.

use crate::backend::{WalSink, WalSource};
use crate::error::StorageResult;

/// A [`WalSource`] over an in-memory byte run.
///
/// The end of the buffer is the end of input, like a final partially
/// filled segment file.
///
/// # Example
///
/// ```rust
/// use walredact_storage::{MemorySource, WalSource};
///
/// let mut source = MemorySource::new(0x100_0000, vec![1, 2, 3]);
/// assert_eq!(source.read(2).unwrap(), vec![1, 2]);
/// assert_eq!(source.position(), 0x100_0002);
/// assert_eq!(source.read(5).unwrap(), vec![3]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
    start: u64,
    offset: usize,
}

impl MemorySource {
    /// Creates a source whose first byte sits at `start`.
    #[must_use]
    pub fn new(start: u64, data: Vec<u8>) -> Self {
        Self {
            data,
            start,
            offset: 0,
        }
    }

    /// Returns the number of bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}

impl WalSource for MemorySource {
    fn read(&mut self, len: usize) -> StorageResult<Vec<u8>> {
        let end = self.offset.saturating_add(len).min(self.data.len());
        let out = self.data[self.offset..end].to_vec();
        self.offset = end;
        Ok(out)
    }

    fn position(&self) -> u64 {
        self.start + self.offset as u64
    }
}

/// A [`WalSink`] that collects output in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    data: Vec<u8>,
    start: u64,
}

impl MemorySink {
    /// Creates a sink whose first byte sits at `start`.
    #[must_use]
    pub fn new(start: u64) -> Self {
        Self {
            data: Vec::new(),
            start,
        }
    }

    /// Returns the bytes written so far.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the sink and returns its bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl WalSink for MemorySink {
    fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn write_zeros(&mut self, len: u64) -> StorageResult<()> {
        self.data.resize(self.data.len() + len as usize, 0);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.start + self.data.len() as u64
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_reads_sequentially() {
        let mut source = MemorySource::new(100, b"hello world".to_vec());
        assert_eq!(source.read(5).unwrap(), b"hello");
        assert_eq!(source.position(), 105);
        assert_eq!(source.remaining(), 6);
        assert_eq!(source.read(6).unwrap(), b" world");
        assert!(source.read(1).unwrap().is_empty());
        assert_eq!(source.position(), 111);
    }

    #[test]
    fn memory_source_short_read_at_end() {
        let mut source = MemorySource::new(0, vec![7; 3]);
        assert_eq!(source.read(10).unwrap(), vec![7; 3]);
    }

    #[test]
    fn memory_sink_tracks_position() {
        let mut sink = MemorySink::new(8192);
        sink.write(b"abc").unwrap();
        sink.write_zeros(5).unwrap();
        assert_eq!(sink.position(), 8192 + 8);
        assert_eq!(sink.data(), b"abc\0\0\0\0\0");
    }

    #[test]
    fn default_write_zeros_spans_blocks() {
        struct Counting(u64);
        impl WalSink for Counting {
            fn write(&mut self, data: &[u8]) -> StorageResult<()> {
                assert!(data.iter().all(|&b| b == 0));
                self.0 += data.len() as u64;
                Ok(())
            }
            fn position(&self) -> u64 {
                self.0
            }
            fn flush(&mut self) -> StorageResult<()> {
                Ok(())
            }
        }

        let mut sink = Counting(0);
        sink.write_zeros(20_000).unwrap();
        assert_eq!(sink.position(), 20_000);
    }
}
