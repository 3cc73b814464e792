//! Reading the payload stream with page framing removed.

use crate::config::WalGeometry;
use crate::error::{CoreError, CoreResult};
use crate::lsn::{Lsn, RECORD_ALIGNMENT};
use crate::wal::page::{LongPageHeader, PageHeader, LONG_PAGE_HEADER_LEN, XLP_LONG_HEADER};
use tracing::{debug, trace};
use walredact_storage::WalSource;

/// Largest piece read at once when skipping to the next segment.
const SKIP_BLOCK: u64 = 64 * 1024;

/// Validates page headers against the position they occur at.
///
/// The magic is adopted from the first header unless one was configured.
/// The system id is adopted from the first long header.
#[derive(Debug, Clone)]
pub(crate) struct HeaderCheck {
    geometry: WalGeometry,
    magic: Option<u16>,
    system_id: Option<u64>,
}

impl HeaderCheck {
    pub(crate) fn new(geometry: WalGeometry, magic: Option<u16>) -> Self {
        Self {
            geometry,
            magic,
            system_id: None,
        }
    }

    /// Validates the complete header `bytes` found at `lsn`.
    pub(crate) fn validate(&mut self, lsn: Lsn, bytes: &[u8]) -> CoreResult<PageHeader> {
        let long = self.geometry.is_segment_start(lsn);
        let header = if long {
            let long_header = LongPageHeader::decode(lsn, bytes)?;
            self.validate_long(lsn, &long_header)?;
            long_header.std
        } else {
            let header = PageHeader::decode(lsn, bytes)?;
            if header.is_long() {
                return Err(CoreError::framing(lsn, "long header flag set inside a segment"));
            }
            header
        };

        match self.magic {
            Some(magic) if magic != header.magic => {
                return Err(CoreError::framing(
                    lsn,
                    format!("page magic {:#06X}, expected {magic:#06X}", header.magic),
                ));
            }
            Some(_) => {}
            None => {
                debug!(magic = format_args!("{:#06X}", header.magic), "adopted page magic");
                self.magic = Some(header.magic);
            }
        }

        if header.page_addr != lsn {
            return Err(CoreError::framing(
                lsn,
                format!("page address {} does not match position", header.page_addr),
            ));
        }
        trace!(%lsn, info = header.info, rem_len = header.rem_len, "page header");
        Ok(header)
    }

    fn validate_long(&mut self, lsn: Lsn, header: &LongPageHeader) -> CoreResult<()> {
        if header.std.info & XLP_LONG_HEADER == 0 {
            return Err(CoreError::framing(lsn, "segment starts without a long header"));
        }
        if u64::from(header.segment_size) != self.geometry.segment_size {
            return Err(CoreError::framing(
                lsn,
                format!(
                    "segment size {} in header, expected {}",
                    header.segment_size, self.geometry.segment_size
                ),
            ));
        }
        if u64::from(header.page_size) != self.geometry.page_size {
            return Err(CoreError::framing(
                lsn,
                format!(
                    "page size {} in header, expected {}",
                    header.page_size, self.geometry.page_size
                ),
            ));
        }
        match self.system_id {
            Some(id) if id != header.system_id => Err(CoreError::framing(
                lsn,
                format!("system id {} differs from {id}", header.system_id),
            )),
            Some(_) => Ok(()),
            None => {
                self.system_id = Some(header.system_id);
                Ok(())
            }
        }
    }
}

/// Reader that strips page and segment headers from a [`WalSource`].
///
/// Positions handed out are LSNs of the raw stream, so a payload read that
/// crosses a page boundary covers more LSN range than it returns bytes.
/// Headers are consumed and validated before the data that follows them,
/// never after the last byte of a read.
///
/// # Example
///
/// ```rust,ignore
/// let mut reader = PageFramingReader::new(source, WalGeometry::default())?;
/// let (lsn, header) = reader.read(RECORD_HEADER_LEN, true)?;
/// ```
pub struct PageFramingReader<S: WalSource> {
    source: S,
    check: HeaderCheck,
    geometry: WalGeometry,
    position: Lsn,
    last_header: Option<PageHeader>,
}

impl<S: WalSource> PageFramingReader<S> {
    /// Wraps `source`, which must be positioned at a segment start.
    ///
    /// # Errors
    ///
    /// Returns an invalid configuration error if the source does not start
    /// at a segment boundary.
    pub fn new(source: S, geometry: WalGeometry) -> CoreResult<Self> {
        let position = Lsn(source.position());
        if !geometry.is_segment_start(position) {
            return Err(CoreError::invalid_config(format!(
                "stream must start at a segment boundary, not {position}"
            )));
        }
        Ok(Self {
            source,
            check: HeaderCheck::new(geometry, None),
            geometry,
            position,
            last_header: None,
        })
    }

    /// Requires every header to carry `magic`.
    #[must_use]
    pub fn with_magic(mut self, magic: u16) -> Self {
        self.check = HeaderCheck::new(self.geometry, Some(magic));
        self
    }

    /// Position of the next raw byte.
    #[must_use]
    pub fn position(&self) -> Lsn {
        self.position
    }

    /// The geometry the reader was created with.
    #[must_use]
    pub fn geometry(&self) -> WalGeometry {
        self.geometry
    }

    /// The most recently consumed page header.
    #[must_use]
    pub fn last_header(&self) -> Option<PageHeader> {
        self.last_header
    }

    /// Returns the wrapped source.
    pub fn into_inner(self) -> S {
        self.source
    }

    /// Reads `amount` payload bytes.
    ///
    /// With `align` set the position is first advanced to the next 8-byte
    /// boundary. Returns the position of the first payload byte and the
    /// bytes with all framing removed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A header does not match its position ([`CoreError::Framing`])
    /// - The input ends first ([`CoreError::TruncatedStream`])
    /// - A segment is missing or unreadable
    pub fn read(&mut self, amount: usize, align: bool) -> CoreResult<(Lsn, Vec<u8>)> {
        match self.fill(amount, align, false)? {
            Some(read) => Ok(read),
            None => Err(CoreError::truncated(self.position, "input ended")),
        }
    }

    /// Like [`read`](Self::read) with alignment, but returns `None` if the
    /// input ends cleanly before any byte of the record.
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read), except for a clean end of input.
    pub fn read_record_start(&mut self, amount: usize) -> CoreResult<Option<(Lsn, Vec<u8>)>> {
        self.fill(amount, true, true)
    }

    /// Discards the rest of the current segment.
    ///
    /// Returns `false` if the input ended before the segment did.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails.
    pub fn skip_to_next_segment(&mut self) -> CoreResult<bool> {
        let offset = self.position.segment_offset(self.geometry.segment_size);
        if offset == 0 {
            return Ok(true);
        }
        let mut remaining = self.geometry.segment_size - offset;
        debug!(from = %self.position, bytes = remaining, "skipping to next segment");
        while remaining > 0 {
            let want = remaining.min(SKIP_BLOCK);
            let got = self.source.read(want as usize)?.len() as u64;
            self.position += got;
            remaining -= got;
            if got < want {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn fill(
        &mut self,
        amount: usize,
        align: bool,
        allow_eof: bool,
    ) -> CoreResult<Option<(Lsn, Vec<u8>)>> {
        if align {
            let pad = self.position.padding(RECORD_ALIGNMENT);
            if pad > 0 && self.raw(pad as usize)?.is_none() {
                return self.ended(allow_eof, "alignment padding");
            }
        }
        if !self.consume_header()? {
            return self.ended(allow_eof, "page header");
        }
        let start = self.position;
        // Grows a page at a time; `amount` comes from an unchecked length field.
        let mut out = Vec::with_capacity(amount.min(self.geometry.page_size as usize));
        while out.len() < amount {
            if !self.consume_header()? {
                return Err(CoreError::truncated(self.position, "input ended inside a page header"));
            }
            let room = self.geometry.page_size - self.position.page_offset(self.geometry.page_size);
            let want = room.min((amount - out.len()) as u64) as usize;
            match self.raw(want)? {
                Some(bytes) => out.extend_from_slice(&bytes),
                None if allow_eof && out.is_empty() => return Ok(None),
                None => {
                    return Err(CoreError::truncated(
                        self.position,
                        format!("input ended {} bytes into a {amount}-byte read", out.len()),
                    ))
                }
            }
        }
        Ok(Some((start, out)))
    }

    fn ended(&self, allow_eof: bool, what: &str) -> CoreResult<Option<(Lsn, Vec<u8>)>> {
        if allow_eof {
            Ok(None)
        } else {
            Err(CoreError::truncated(self.position, format!("input ended before {what}")))
        }
    }

    /// Consumes the header at the current position, if one starts here.
    /// Returns `false` on a clean end of input.
    fn consume_header(&mut self) -> CoreResult<bool> {
        let len = self.geometry.header_len_at(self.position);
        if len == 0 {
            return Ok(true);
        }
        let Some(bytes) = self.raw(len)? else {
            return Ok(false);
        };
        let at = self.position - len as u64;
        let header = self.check.validate(at, &bytes)?;
        if len == LONG_PAGE_HEADER_LEN {
            debug!(lsn = %at, "entering segment");
        }
        self.last_header = Some(header);
        Ok(true)
    }

    /// Reads exactly `len` raw bytes, `None` if the input ended cleanly.
    fn raw(&mut self, len: usize) -> CoreResult<Option<Vec<u8>>> {
        let bytes = self.source.read(len)?;
        if bytes.is_empty() && len > 0 {
            return Ok(None);
        }
        if bytes.len() < len {
            return Err(CoreError::truncated(
                self.position,
                format!("needed {len} bytes, input has {}", bytes.len()),
            ));
        }
        self.position += len as u64;
        Ok(Some(bytes))
    }
}
