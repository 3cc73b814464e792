//! Error types for segment storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing segment files.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The next segment of a gap-free run does not exist.
    #[error("missing WAL segment: {}", path.display())]
    MissingSegment {
        /// The path that was expected to exist.
        path: PathBuf,
    },

    /// A file name is not a valid segment name.
    #[error("invalid segment file name: {name}")]
    InvalidSegmentName {
        /// The offending file name.
        name: String,
    },

    /// The segment size is not a power of two between 1 byte and 4 GiB.
    #[error("invalid segment size: {size}")]
    InvalidSegmentSize {
        /// The rejected size.
        size: u64,
    },

    /// A segment file has an impossible size or layout.
    #[error("segment corrupted: {0}")]
    Corrupted(String),

    /// A write was attempted after the sink was finished.
    #[error("segment sink is closed")]
    Closed,
}
