//! Source and sink trait definitions.

use crate::error::StorageResult;

/// Block of zeros shared by [`WalSink::write_zeros`].
const ZERO_BLOCK: [u8; 8192] = [0u8; 8192];

/// A sequential reader over a contiguous run of WAL bytes.
///
/// Sources are **opaque byte streams**: they know where segment files begin
/// and end, but nothing about page headers or records.
///
/// # Invariants
///
/// - `read` never seeks backward
/// - `position` equals the start position plus every byte returned so far
/// - a short read means the input ended; later reads return no bytes
///
/// # Implementors
///
/// - [`super::SegmentedByteSource`] - Segment files in a directory
/// - [`super::MemorySource`] - For testing
pub trait WalSource {
    /// Reads the next `len` logically contiguous bytes.
    ///
    /// Returns fewer than `len` bytes only when the input has ended.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The next segment of the run does not exist
    /// - An I/O error occurs
    fn read(&mut self, len: usize) -> StorageResult<Vec<u8>>;

    /// Returns the position of the next byte to be read.
    fn position(&self) -> u64;
}

/// A sequential writer for rewritten WAL bytes.
///
/// The position of every byte is implied by how many bytes were written
/// before it; sinks are never randomly addressed.
///
/// # Implementors
///
/// - [`super::SegmentWriter`] - Segment files in a directory
/// - [`super::MemorySink`] - For testing
pub trait WalSink {
    /// Appends `data` to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn write(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Appends `len` zero bytes to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn write_zeros(&mut self, len: u64) -> StorageResult<()> {
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(ZERO_BLOCK.len() as u64) as usize;
            self.write(&ZERO_BLOCK[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }

    /// Returns the position of the next byte to be written.
    fn position(&self) -> u64;

    /// Pushes buffered bytes to the operating system.
    ///
    /// No durability guarantee is implied.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn flush(&mut self) -> StorageResult<()>;
}

impl<T: WalSource + ?Sized> WalSource for &mut T {
    fn read(&mut self, len: usize) -> StorageResult<Vec<u8>> {
        (**self).read(len)
    }

    fn position(&self) -> u64 {
        (**self).position()
    }
}

impl<T: WalSink + ?Sized> WalSink for &mut T {
    fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        (**self).write(data)
    }

    fn write_zeros(&mut self, len: u64) -> StorageResult<()> {
        (**self).write_zeros(len)
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn flush(&mut self) -> StorageResult<()> {
        (**self).flush()
    }
}
