//! Error types for walredact core.

use crate::lsn::Lsn;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use walredact_storage::StorageError;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while reading, decoding or rewriting WAL.
///
/// Every variant is fatal to a filter run: nothing is retried and no
/// partial recovery is attempted.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage error other than a missing segment.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A page header has the wrong magic, address or layout.
    #[error("framing error at {lsn}: {message}")]
    Framing {
        /// Position of the offending header.
        lsn: Lsn,
        /// Description of the mismatch.
        message: String,
    },

    /// Input ended inside a page header or a record.
    #[error("truncated stream at {lsn}: {message}")]
    TruncatedStream {
        /// Position where input ran out.
        lsn: Lsn,
        /// What was being read.
        message: String,
    },

    /// A record declares lengths that cannot be consistent.
    #[error("malformed record at {lsn}: {message}")]
    MalformedRecord {
        /// Start of the offending record.
        lsn: Lsn,
        /// Description of the inconsistency.
        message: String,
    },

    /// The next segment file of the run does not exist.
    #[error("missing WAL segment: {}", path.display())]
    MissingSegment {
        /// The path that was expected to exist.
        path: PathBuf,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a framing error.
    pub fn framing(lsn: Lsn, message: impl Into<String>) -> Self {
        Self::Framing {
            lsn,
            message: message.into(),
        }
    }

    /// Creates a truncated stream error.
    pub fn truncated(lsn: Lsn, message: impl Into<String>) -> Self {
        Self::TruncatedStream {
            lsn,
            message: message.into(),
        }
    }

    /// Creates a malformed record error.
    pub fn malformed(lsn: Lsn, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            lsn,
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MissingSegment { path } => Self::MissingSegment { path },
            StorageError::Io(e) => Self::Io(e),
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_segment_is_lifted() {
        let err: CoreError = StorageError::MissingSegment {
            path: PathBuf::from("pg_xlog/000000010000000000000004"),
        }
        .into();
        assert!(matches!(err, CoreError::MissingSegment { .. }));
    }

    #[test]
    fn messages_carry_position() {
        let err = CoreError::framing(Lsn(0x2000), "bad magic");
        assert_eq!(err.to_string(), "framing error at 0/00002000: bad magic");
    }
}
