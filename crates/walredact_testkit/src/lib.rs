//! # walredact testkit
//!
//! Test utilities for walredact.
//!
//! This crate provides:
//! - [`WalBuilder`] for synthesizing framed WAL with valid checksums
//! - Segment directory fixtures backed by temporary directories
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use walredact_testkit::prelude::*;
//!
//! let mut builder = WalBuilder::new(test_geometry());
//! builder.record(&RecordSpec::heap_insert(relation, b"row"));
//! let wal = builder.finish();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use builder::*;
pub use fixtures::*;
pub use generators::*;
