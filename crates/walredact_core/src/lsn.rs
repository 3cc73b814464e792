//! Log sequence numbers.

use crate::error::CoreError;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

/// Alignment of every record start within the WAL.
pub const RECORD_ALIGNMENT: u64 = 8;

/// A byte position in the WAL.
///
/// LSNs are monotonic and are the single coordinate used across segment
/// files. They are displayed the way the server prints them, as two
/// hexadecimal halves: `16/B374D848`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Lsn(pub u64);

impl Lsn {
    /// The zero position.
    pub const ZERO: Lsn = Lsn(0);

    /// Creates an LSN from a raw byte position.
    #[must_use]
    pub const fn new(pos: u64) -> Self {
        Self(pos)
    }

    /// Returns the raw byte position.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Offset of this position within its segment.
    #[must_use]
    pub const fn segment_offset(self, segment_size: u64) -> u64 {
        self.0 % segment_size
    }

    /// Offset of this position within its page.
    #[must_use]
    pub const fn page_offset(self, page_size: u64) -> u64 {
        self.0 % page_size
    }

    /// Bytes needed to reach the next multiple of `alignment`.
    #[must_use]
    pub const fn padding(self, alignment: u64) -> u64 {
        let rem = self.0 % alignment;
        if rem == 0 {
            0
        } else {
            alignment - rem
        }
    }

    /// Rounds up to the record alignment.
    #[must_use]
    pub const fn align(self) -> Self {
        Self(self.0 + self.padding(RECORD_ALIGNMENT))
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:08X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

impl FromStr for Lsn {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::invalid_config(format!("invalid LSN: {s:?}"));
        let (hi, lo) = s.split_once('/').ok_or_else(invalid)?;
        let hi = u32::from_str_radix(hi, 16).map_err(|_| invalid())?;
        let lo = u32::from_str_radix(lo, 16).map_err(|_| invalid())?;
        Ok(Self((u64::from(hi) << 32) | u64::from(lo)))
    }
}

impl Add<u64> for Lsn {
    type Output = Lsn;

    fn add(self, rhs: u64) -> Lsn {
        Lsn(self.0 + rhs)
    }
}

impl AddAssign<u64> for Lsn {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl Sub<u64> for Lsn {
    type Output = Lsn;

    fn sub(self, rhs: u64) -> Lsn {
        Lsn(self.0 - rhs)
    }
}

impl Sub<Lsn> for Lsn {
    type Output = u64;

    fn sub(self, rhs: Lsn) -> u64 {
        self.0 - rhs.0
    }
}

impl From<u64> for Lsn {
    fn from(pos: u64) -> Self {
        Self(pos)
    }
}
