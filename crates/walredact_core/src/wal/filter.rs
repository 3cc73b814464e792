//! The redaction filter.
//!
//! [`RecordFilter`] consumes raw WAL in stream order, classifies it into
//! framing and payload, and writes a same-length copy to a [`WalSink`] in
//! which every record touching an excluded relation has become a no-op.
//!
//! Only the record being decided on is buffered: the header and, for
//! relation records, the relation id after it. Once a record is decided its
//! body streams through, either verbatim or as zeros.

use crate::config::FilterConfig;
use crate::error::{CoreError, CoreResult};
use crate::lsn::{Lsn, RECORD_ALIGNMENT};
use crate::wal::chunk::{classify, Chunk, ChunkKind};
use crate::wal::framing::HeaderCheck;
use crate::wal::page::{PageHeader, LONG_PAGE_HEADER_LEN};
use crate::wal::record::{RecordHeader, RelationId, RECORD_HEADER_LEN, RELATION_ID_LEN};
use bytes::{Bytes, BytesMut};
use tracing::{debug, info, trace, warn};
use walredact_storage::{StorageError, WalSink, WalSource};

/// How bytes are emitted while copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Verbatim.
    Normal,
    /// Verbatim until the next segment's long header.
    Switch,
    /// Payload replaced by zeros; headers still verbatim.
    Zero,
}

/// What the buffer is being filled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// A record header.
    Record,
    /// The relation id following `header`.
    Relation {
        /// The already decoded record header.
        header: RecordHeader,
        /// Record bytes after the relation id.
        remaining: u64,
    },
}

impl Expect {
    /// Payload bytes the buffer must hold before a decision can be made.
    #[must_use]
    pub const fn required_len(&self) -> usize {
        match self {
            Self::Record => RECORD_HEADER_LEN,
            Self::Relation { .. } => RECORD_HEADER_LEN + RELATION_ID_LEN,
        }
    }
}

/// State of the filter between two bytes of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Emitting `pending` more payload bytes without looking at them.
    Copying {
        /// How payload is emitted.
        mode: CopyMode,
        /// Payload bytes left before the next decision.
        pending: u64,
    },
    /// Collecting the start of a record.
    Buffering {
        /// What is being collected.
        expect: Expect,
    },
    /// The end of written WAL was reached; the rest of the segment is
    /// copied verbatim.
    Finished,
}

/// Summary of a filter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Records decoded, not counting the end-of-WAL marker.
    pub records: u64,
    /// Records replaced with no-ops.
    pub redacted: u64,
    /// Segment switch records seen.
    pub segment_switches: u64,
    /// Bytes written to the sink.
    pub bytes: u64,
    /// Where the end-of-WAL marker was found, if it was.
    pub end_of_wal: Option<Lsn>,
}

impl FilterStats {
    /// Records written unchanged.
    #[must_use]
    pub const fn passed_through(&self) -> u64 {
        self.records - self.redacted
    }
}

/// Start of a record with framing removed, plus the framing that was
/// removed from within it.
#[derive(Debug, Default)]
struct RecordBuffer {
    start: Lsn,
    payload: BytesMut,
    headers: Vec<(Lsn, Bytes)>,
}

impl RecordBuffer {
    fn reset(&mut self, start: Lsn) {
        self.start = start;
        self.payload.clear();
        self.headers.clear();
    }

    fn push_header(&mut self, lsn: Lsn, bytes: &[u8]) {
        self.headers.push((lsn, Bytes::copy_from_slice(bytes)));
    }

    /// Writes the buffered payload with every header back at its original
    /// offset.
    fn flush<W: WalSink>(&mut self, sink: &mut W) -> CoreResult<()> {
        let mut offset = 0usize;
        let mut cursor = self.start;
        for (lsn, header) in self.headers.drain(..) {
            let end = offset + (lsn - cursor) as usize;
            let Some(part) = self.payload.get(offset..end) else {
                return Err(CoreError::framing(lsn, "page header beyond buffered record"));
            };
            sink.write(part)?;
            sink.write(&header)?;
            offset = end;
            cursor = lsn + header.len() as u64;
        }
        sink.write(&self.payload[offset..])?;
        self.payload.clear();
        Ok(())
    }
}

/// Streaming redaction state machine.
///
/// Feed it raw WAL with [`feed`](Self::feed) in stream order, in pieces of
/// any size, then call [`finish`](Self::finish).
///
/// # Example
///
/// ```rust,ignore
/// let config = FilterConfig::new().exclude("1663,13993,16397".parse()?);
/// let mut filter = RecordFilter::new(config, MemorySink::new(0), Lsn(0))?;
/// filter.feed(Lsn(0), &wal)?;
/// let (sink, stats) = filter.finish()?;
/// ```
pub struct RecordFilter<W: WalSink> {
    config: FilterConfig,
    sink: W,
    check: HeaderCheck,
    state: FilterState,
    buffer: RecordBuffer,
    page_header: Vec<u8>,
    page_header_lsn: Lsn,
    seen_first_header: bool,
    start: Lsn,
    position: Lsn,
    stats: FilterStats,
}

impl<W: WalSink> RecordFilter<W> {
    /// Creates a filter for a stream starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns an invalid configuration error unless `start` is the first
    /// byte of a segment.
    pub fn new(config: FilterConfig, sink: W, start: Lsn) -> CoreResult<Self> {
        if !config.geometry.is_segment_start(start) {
            return Err(CoreError::invalid_config(format!(
                "stream must start at a segment boundary, not {start}"
            )));
        }
        let check = HeaderCheck::new(config.geometry, config.page_magic);
        Ok(Self {
            config,
            sink,
            check,
            state: FilterState::Copying {
                mode: CopyMode::Normal,
                pending: 0,
            },
            buffer: RecordBuffer::default(),
            page_header: Vec::with_capacity(LONG_PAGE_HEADER_LEN),
            page_header_lsn: start,
            seen_first_header: false,
            start,
            position: start,
            stats: FilterStats::default(),
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Position of the next input byte.
    #[must_use]
    pub fn position(&self) -> Lsn {
        self.position
    }

    /// Returns whether the end-of-WAL marker has been seen.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state == FilterState::Finished
    }

    /// Statistics so far.
    #[must_use]
    pub fn stats(&self) -> FilterStats {
        FilterStats {
            bytes: self.sink.position() - self.start.as_u64(),
            ..self.stats
        }
    }

    /// Processes the raw bytes `data` starting at `lsn`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `lsn` is not where the previous call left off
    /// - A page header does not match its position
    /// - A record declares inconsistent lengths
    /// - The sink fails
    pub fn feed(&mut self, lsn: Lsn, data: &[u8]) -> CoreResult<()> {
        if lsn != self.position {
            return Err(CoreError::invalid_config(format!(
                "input at {lsn} does not continue from {}",
                self.position
            )));
        }
        for chunk in classify(self.config.geometry, lsn, data) {
            match chunk.kind {
                ChunkKind::Header => self.on_header(&chunk)?,
                ChunkKind::Data => self.on_data(chunk.lsn, chunk.bytes)?,
            }
            self.position = chunk.end();
        }
        Ok(())
    }

    /// Ends the run and returns the sink.
    ///
    /// # Errors
    ///
    /// Returns a truncated stream error if the input ended inside a record,
    /// or an error if the sink cannot be flushed.
    pub fn finish(mut self) -> CoreResult<(W, FilterStats)> {
        match self.state {
            FilterState::Finished
            | FilterState::Copying {
                mode: CopyMode::Switch,
                ..
            }
            | FilterState::Copying { pending: 0, .. } => {}
            FilterState::Copying { pending, .. } => {
                return Err(CoreError::truncated(
                    self.position,
                    format!("input ended with {pending} record bytes outstanding"),
                ));
            }
            FilterState::Buffering { .. } if self.buffer.payload.is_empty() => {
                self.buffer.flush(&mut self.sink)?;
            }
            FilterState::Buffering { .. } => {
                return Err(CoreError::truncated(
                    self.buffer.start,
                    "input ended inside a record header",
                ));
            }
        }
        self.sink.flush()?;
        let stats = self.stats();
        info!(
            records = stats.records,
            redacted = stats.redacted,
            bytes = stats.bytes,
            "filter finished"
        );
        Ok((self.sink, stats))
    }

    fn on_header(&mut self, chunk: &Chunk<'_>) -> CoreResult<()> {
        let header = self.collect_header(chunk)?;
        match self.state {
            FilterState::Buffering { .. } => self.buffer.push_header(chunk.lsn, chunk.bytes),
            FilterState::Copying { .. } | FilterState::Finished => self.sink.write(chunk.bytes)?,
        }

        if let Some(header) = header {
            if !self.seen_first_header {
                self.seen_first_header = true;
                self.skip_continuation(&header);
            }
        }

        let segment_size = self.config.geometry.segment_size;
        if let FilterState::Copying {
            mode: CopyMode::Switch,
            ..
        } = self.state
        {
            if chunk.end().segment_offset(segment_size) == LONG_PAGE_HEADER_LEN as u64 {
                self.begin_record(chunk.end());
            }
        }
        Ok(())
    }

    /// Gathers header bytes that may arrive in pieces; validates the header
    /// once it is complete.
    fn collect_header(&mut self, chunk: &Chunk<'_>) -> CoreResult<Option<PageHeader>> {
        let geometry = self.config.geometry;
        if geometry.header_len_at(chunk.lsn) != 0 {
            self.page_header_lsn = chunk.lsn;
            self.page_header.clear();
        }
        self.page_header.extend_from_slice(chunk.bytes);
        if self.page_header.len() < geometry.header_len_at(self.page_header_lsn) {
            return Ok(None);
        }

        // Pages after the end of WAL or a segment switch may never have been
        // written.
        let validate = match self.state {
            FilterState::Finished => false,
            FilterState::Copying {
                mode: CopyMode::Switch,
                ..
            } => geometry.is_segment_start(self.page_header_lsn),
            _ => true,
        };
        if !validate {
            return Ok(None);
        }
        let lsn = self.page_header_lsn;
        self.check.validate(lsn, &self.page_header).map(Some)
    }

    /// A stream may start in the middle of a record.
    fn skip_continuation(&mut self, header: &PageHeader) {
        if !header.is_continuation() {
            return;
        }
        if let FilterState::Copying {
            mode: CopyMode::Normal,
            pending: 0,
        } = self.state
        {
            debug!(
                lsn = %header.page_addr,
                bytes = header.rem_len,
                "stream starts inside a record"
            );
            self.state = FilterState::Copying {
                mode: CopyMode::Normal,
                pending: u64::from(header.rem_len),
            };
        }
    }

    fn on_data(&mut self, mut lsn: Lsn, mut rest: &[u8]) -> CoreResult<()> {
        while !rest.is_empty() {
            match self.state {
                FilterState::Finished => {
                    self.sink.write(rest)?;
                    return Ok(());
                }
                FilterState::Copying { mode, pending: 0 } => {
                    let padding = lsn.padding(RECORD_ALIGNMENT);
                    if padding > 0 && mode != CopyMode::Switch {
                        self.state = FilterState::Copying {
                            mode,
                            pending: padding,
                        };
                    } else {
                        self.begin_record(lsn);
                    }
                }
                FilterState::Copying { mode, pending } => {
                    let n = pending.min(rest.len() as u64) as usize;
                    let (now, later) = rest.split_at(n);
                    match mode {
                        CopyMode::Zero => self.sink.write_zeros(n as u64)?,
                        CopyMode::Normal | CopyMode::Switch => self.sink.write(now)?,
                    }
                    self.state = FilterState::Copying {
                        mode,
                        pending: pending - n as u64,
                    };
                    lsn += n as u64;
                    rest = later;
                }
                FilterState::Buffering { expect } => {
                    let required = expect.required_len();
                    let n = (required - self.buffer.payload.len()).min(rest.len());
                    let (now, later) = rest.split_at(n);
                    self.buffer.payload.extend_from_slice(now);
                    lsn += n as u64;
                    rest = later;
                    if self.buffer.payload.len() == required {
                        self.decide(expect)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn begin_record(&mut self, lsn: Lsn) {
        trace!(%lsn, "expecting record");
        self.buffer.reset(lsn);
        self.state = FilterState::Buffering {
            expect: Expect::Record,
        };
    }

    fn copy_rest(&mut self, mode: CopyMode, pending: u64) -> CoreResult<()> {
        self.buffer.flush(&mut self.sink)?;
        trace!(?mode, pending, "copying");
        self.state = FilterState::Copying { mode, pending };
        Ok(())
    }

    fn decide(&mut self, expect: Expect) -> CoreResult<()> {
        let start = self.buffer.start;
        match expect {
            Expect::Record => {
                let header = RecordHeader::decode(start, &self.buffer.payload)?;
                if header.is_end_of_wal() {
                    info!(lsn = %start, "end of WAL");
                    self.buffer.flush(&mut self.sink)?;
                    self.stats.end_of_wal = Some(start);
                    self.state = FilterState::Finished;
                    return Ok(());
                }
                header.validate(start)?;
                self.stats.records += 1;

                if header.is_segment_switch() {
                    info!(lsn = %start, "segment switch");
                    self.stats.segment_switches += 1;
                    self.copy_rest(CopyMode::Switch, self.config.geometry.segment_size)
                } else if header.touches_relation() {
                    let Some(remaining) = header.body_len().checked_sub(RELATION_ID_LEN as u64)
                    else {
                        return Err(CoreError::malformed(
                            start,
                            format!(
                                "record of {} bytes cannot hold a relation id",
                                header.total_len
                            ),
                        ));
                    };
                    trace!(lsn = %start, "expecting relation");
                    self.state = FilterState::Buffering {
                        expect: Expect::Relation { header, remaining },
                    };
                    Ok(())
                } else {
                    self.copy_rest(CopyMode::Normal, header.body_len())
                }
            }
            Expect::Relation { header, remaining } => {
                let relation =
                    RelationId::decode(start, &self.buffer.payload[RECORD_HEADER_LEN..])?;
                if self.config.exclude.contains(&relation) {
                    debug!(
                        lsn = %start,
                        %relation,
                        len = header.total_len,
                        "redacting record"
                    );
                    let noop = header.noop_replacement();
                    self.buffer.payload[..RECORD_HEADER_LEN].copy_from_slice(&noop.encode());
                    self.buffer.payload[RECORD_HEADER_LEN..].fill(0);
                    self.stats.redacted += 1;
                    self.copy_rest(CopyMode::Zero, remaining)
                } else {
                    self.copy_rest(CopyMode::Normal, remaining)
                }
            }
        }
    }
}

/// Filters a whole stream from `source` into `sink`.
///
/// Reads page-sized pieces until the input ends. Once the end-of-WAL marker
/// has been seen, a missing next segment ends the input cleanly; segments
/// that do exist past the marker are copied verbatim.
///
/// # Errors
///
/// Returns the first error met; bytes already written stay in the sink.
///
/// # Example
///
/// ```rust,ignore
/// let source = SegmentedByteSource::open_path(&first, geometry.segment_size)?;
/// let sink = SegmentWriter::create(&out_dir, name, geometry.segment_size)?;
/// let (_, stats) = filter_stream(source, sink, config)?;
/// ```
pub fn filter_stream<S: WalSource, W: WalSink>(
    mut source: S,
    sink: W,
    config: FilterConfig,
) -> CoreResult<(W, FilterStats)> {
    let start = Lsn(source.position());
    let page_size = config.geometry.page_size as usize;
    let segment_size = config.geometry.segment_size;
    debug!(%start, excluded = config.exclude.len(), "starting filter");
    let mut filter = RecordFilter::new(config, sink, start)?;

    loop {
        let lsn = Lsn(source.position());
        let data = match source.read(page_size) {
            Ok(data) => data,
            // Segments after the end of WAL are mirrored while they exist.
            Err(StorageError::MissingSegment { .. })
                if filter.is_finished() && lsn.segment_offset(segment_size) == 0 =>
            {
                debug!(at = %lsn, "no segments after end of WAL");
                break;
            }
            Err(StorageError::MissingSegment { path }) => {
                warn!(path = %path.display(), at = %lsn, "stopping at missing segment");
                return Err(CoreError::MissingSegment { path });
            }
            Err(e) => return Err(e.into()),
        };
        if data.is_empty() {
            break;
        }
        filter.feed(lsn, &data)?;
        if data.len() < page_size {
            break;
        }
    }
    filter.finish()
}
