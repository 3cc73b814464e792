//! Segment-file backed source and sink.

use crate::backend::{WalSink, WalSource};
use crate::error::{StorageError, StorageResult};
use crate::name::{SegmentName, BYTES_PER_LOG_ID};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Buffer size for segment file I/O.
const IO_BUFFER_SIZE: usize = 64 * 1024;

fn check_segment_size(segment_size: u64) -> StorageResult<()> {
    if !segment_size.is_power_of_two() || segment_size > BYTES_PER_LOG_ID {
        return Err(StorageError::InvalidSegmentSize { size: segment_size });
    }
    Ok(())
}

/// An input segment file that is currently open.
#[derive(Debug)]
struct OpenInput {
    name: SegmentName,
    reader: BufReader<File>,
    /// Bytes of the file not yet read.
    remaining: u64,
    /// The file is shorter than a full segment, so it ends the input.
    last: bool,
}

/// Sequential reader over a numbered, gap-free run of segment files.
///
/// Files are located by name arithmetic from the first segment and opened
/// one at a time as the read position advances. A missing file in the middle
/// of the run is an error, not end of input; only a file shorter than the
/// segment size ends the input.
///
/// # Example
///
/// ```no_run
/// use walredact_storage::{SegmentedByteSource, WalSource};
/// use std::path::Path;
///
/// let path = Path::new("pg_xlog/000000010000000000000003");
/// let mut source = SegmentedByteSource::open_path(path, 16 * 1024 * 1024).unwrap();
/// let first_page = source.read(8192).unwrap();
/// ```
#[derive(Debug)]
pub struct SegmentedByteSource {
    dir: PathBuf,
    segment_size: u64,
    next_segment: SegmentName,
    current: Option<OpenInput>,
    position: u64,
    ended: bool,
}

impl SegmentedByteSource {
    /// Opens a run of segments in `dir` starting at `first`.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment size is invalid, the first segment
    /// does not exist, or it cannot be opened.
    pub fn open(dir: &Path, first: SegmentName, segment_size: u64) -> StorageResult<Self> {
        check_segment_size(segment_size)?;

        let mut source = Self {
            dir: dir.to_path_buf(),
            segment_size,
            next_segment: first,
            current: None,
            position: first.base_position(segment_size),
            ended: false,
        };
        source.open_next()?;
        Ok(source)
    }

    /// Opens a run of segments starting at the file `path`.
    ///
    /// The directory of `path` is searched for the following segments.
    ///
    /// # Errors
    ///
    /// Returns an error if the file name is not a segment name or the file
    /// cannot be opened.
    pub fn open_path(path: &Path, segment_size: u64) -> StorageResult<Self> {
        check_segment_size(segment_size)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidSegmentName {
                name: path.display().to_string(),
            })?;
        let first = SegmentName::parse(file_name, segment_size)?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        Self::open(dir, first, segment_size)
    }

    /// Returns the segment currently being read, if any.
    #[must_use]
    pub fn current_segment(&self) -> Option<SegmentName> {
        self.current.as_ref().map(|input| input.name)
    }

    /// Returns the segment size this source was opened with.
    #[must_use]
    pub fn segment_size(&self) -> u64 {
        self.segment_size
    }

    fn open_next(&mut self) -> StorageResult<()> {
        let name = self.next_segment;
        let path = self.dir.join(name.file_name(self.segment_size));
        if !path.exists() {
            return Err(StorageError::MissingSegment { path });
        }

        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        if len > self.segment_size {
            return Err(StorageError::Corrupted(format!(
                "{} is {} bytes, larger than the segment size {}",
                path.display(),
                len,
                self.segment_size
            )));
        }

        debug!(segment = %path.display(), len, "opened input segment");
        self.current = Some(OpenInput {
            name,
            reader: BufReader::with_capacity(IO_BUFFER_SIZE, file),
            remaining: len,
            last: len < self.segment_size,
        });
        self.next_segment = name.next();
        Ok(())
    }
}

impl WalSource for SegmentedByteSource {
    fn read(&mut self, len: usize) -> StorageResult<Vec<u8>> {
        let mut out = Vec::with_capacity(len);

        while out.len() < len && !self.ended {
            if self.current.is_none() {
                self.open_next()?;
            }
            let Some(input) = self.current.as_mut() else {
                break;
            };

            if input.remaining == 0 {
                if input.last {
                    self.ended = true;
                } else {
                    debug!(segment = %input.name, "finished input segment");
                    self.current = None;
                }
                continue;
            }

            let want = ((len - out.len()) as u64).min(input.remaining) as usize;
            let start = out.len();
            out.resize(start + want, 0);
            input.reader.read_exact(&mut out[start..])?;
            input.remaining -= want as u64;
            self.position += want as u64;
        }

        Ok(out)
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// Writes a byte stream back out as same-size segment files.
///
/// A new file is started exactly when the cumulative output reaches a
/// segment-size multiple. A stream that stops mid-segment leaves the partial
/// file as written; nothing is truncated, padded or synced.
#[derive(Debug)]
pub struct SegmentWriter {
    dir: PathBuf,
    segment_size: u64,
    next_segment: SegmentName,
    current: Option<(SegmentName, BufWriter<File>)>,
    position: u64,
    closed: bool,
}

impl SegmentWriter {
    /// Creates a writer emitting segments into `dir`, starting with `first`.
    ///
    /// The directory is created if needed. No file is created until the first
    /// byte is written.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment size is invalid or the directory
    /// cannot be created.
    pub fn create(dir: &Path, first: SegmentName, segment_size: u64) -> StorageResult<Self> {
        check_segment_size(segment_size)?;
        fs::create_dir_all(dir)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            segment_size,
            next_segment: first,
            current: None,
            position: first.base_position(segment_size),
            closed: false,
        })
    }

    /// Returns the path of the file for `name` in the output directory.
    #[must_use]
    pub fn segment_path(&self, name: SegmentName) -> PathBuf {
        self.dir.join(name.file_name(self.segment_size))
    }

    /// Flushes and closes the current file. Further writes fail.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn finish(&mut self) -> StorageResult<()> {
        self.close_current()?;
        self.closed = true;
        Ok(())
    }

    fn open_next(&mut self) -> StorageResult<()> {
        let name = self.next_segment;
        let path = self.segment_path(name);
        let file = File::create(&path)?;
        debug!(segment = %path.display(), "opened output segment");
        self.current = Some((name, BufWriter::with_capacity(IO_BUFFER_SIZE, file)));
        self.next_segment = name.next();
        Ok(())
    }

    fn close_current(&mut self) -> StorageResult<()> {
        if let Some((name, mut writer)) = self.current.take() {
            writer.flush()?;
            debug!(segment = %name, "closed output segment");
        }
        Ok(())
    }
}

impl WalSink for SegmentWriter {
    fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }

        let mut rest = data;
        while !rest.is_empty() {
            if self.current.is_none() {
                self.open_next()?;
            }
            let Some((_, writer)) = self.current.as_mut() else {
                return Err(StorageError::Closed);
            };

            let room = self.segment_size - self.position % self.segment_size;
            let n = (rest.len() as u64).min(room) as usize;
            writer.write_all(&rest[..n])?;
            self.position += n as u64;
            rest = &rest[n..];

            if self.position % self.segment_size == 0 {
                self.close_current()?;
            }
        }

        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn flush(&mut self) -> StorageResult<()> {
        if let Some((_, writer)) = self.current.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        let _ = self.close_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SEG: u64 = 1024;

    fn write_segment(dir: &Path, name: SegmentName, data: &[u8]) {
        fs::write(dir.join(name.file_name(SEG)), data).unwrap();
    }

    #[test]
    fn source_reads_across_segment_files() {
        let dir = tempdir().unwrap();
        let first = SegmentName::new(1, 4);
        write_segment(dir.path(), first, &[1u8; SEG as usize]);
        write_segment(dir.path(), first.next(), &[2u8; SEG as usize]);
        write_segment(dir.path(), first.next().next(), &[3u8; 10]);

        let mut source = SegmentedByteSource::open(dir.path(), first, SEG).unwrap();
        assert_eq!(source.position(), 4 * SEG);

        let data = source.read(SEG as usize + 4).unwrap();
        assert_eq!(&data[..SEG as usize], &[1u8; SEG as usize][..]);
        assert_eq!(&data[SEG as usize..], &[2u8; 4]);
        assert_eq!(source.current_segment(), Some(first.next()));

        let rest = source.read(2 * SEG as usize).unwrap();
        assert_eq!(rest.len(), SEG as usize - 4 + 10);
        assert_eq!(source.position(), 6 * SEG + 10);
        assert!(source.read(1).unwrap().is_empty());
    }

    #[test]
    fn source_missing_next_segment_fails() {
        let dir = tempdir().unwrap();
        let first = SegmentName::new(1, 1);
        write_segment(dir.path(), first, &[0u8; SEG as usize]);

        let mut source = SegmentedByteSource::open(dir.path(), first, SEG).unwrap();
        source.read(SEG as usize).unwrap();
        let result = source.read(1);
        assert!(matches!(result, Err(StorageError::MissingSegment { .. })));
    }

    #[test]
    fn source_missing_first_segment_fails() {
        let dir = tempdir().unwrap();
        let result = SegmentedByteSource::open(dir.path(), SegmentName::new(1, 0), SEG);
        assert!(matches!(result, Err(StorageError::MissingSegment { .. })));
    }

    #[test]
    fn source_rejects_oversized_segment() {
        let dir = tempdir().unwrap();
        let first = SegmentName::new(1, 0);
        write_segment(dir.path(), first, &[0u8; SEG as usize + 1]);
        let result = SegmentedByteSource::open(dir.path(), first, SEG);
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn source_open_path_parses_name() {
        let dir = tempdir().unwrap();
        let first = SegmentName::new(3, 7);
        write_segment(dir.path(), first, &[9u8; 8]);

        let path = dir.path().join(first.file_name(SEG));
        let mut source = SegmentedByteSource::open_path(&path, SEG).unwrap();
        assert_eq!(source.position(), 7 * SEG);
        assert_eq!(source.read(16).unwrap(), vec![9u8; 8]);
    }

    #[test]
    fn invalid_segment_size_rejected() {
        let dir = tempdir().unwrap();
        let result = SegmentWriter::create(dir.path(), SegmentName::new(1, 0), 1000);
        assert!(matches!(
            result,
            Err(StorageError::InvalidSegmentSize { size: 1000 })
        ));
    }

    #[test]
    fn writer_splits_at_segment_boundaries() {
        let dir = tempdir().unwrap();
        let first = SegmentName::new(1, 2);
        let mut writer = SegmentWriter::create(dir.path(), first, SEG).unwrap();

        writer.write(&[5u8; 1000]).unwrap();
        writer.write(&[6u8; 100]).unwrap();
        writer.write_zeros(SEG - 76).unwrap();
        writer.write(b"tail").unwrap();
        writer.finish().unwrap();
        assert_eq!(writer.position(), 2 * SEG + 2 * SEG + 4);

        let seg_a = fs::read(dir.path().join(first.file_name(SEG))).unwrap();
        let seg_b = fs::read(dir.path().join(first.next().file_name(SEG))).unwrap();
        let seg_c = fs::read(dir.path().join(first.next().next().file_name(SEG))).unwrap();

        assert_eq!(seg_a.len(), SEG as usize);
        assert_eq!(&seg_a[..1000], &[5u8; 1000][..]);
        assert_eq!(&seg_a[1000..], &[6u8; 24]);
        assert_eq!(seg_b.len(), SEG as usize);
        assert_eq!(&seg_b[..76], &[6u8; 76][..]);
        assert!(seg_b[76..].iter().all(|&b| b == 0));
        assert_eq!(seg_c, b"tail");
    }

    #[test]
    fn writer_rejects_writes_after_finish() {
        let dir = tempdir().unwrap();
        let mut writer = SegmentWriter::create(dir.path(), SegmentName::new(1, 0), SEG).unwrap();
        writer.finish().unwrap();
        assert!(matches!(writer.write(b"x"), Err(StorageError::Closed)));
    }

    #[test]
    fn writer_creates_output_directory() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested").join("out");
        let mut writer = SegmentWriter::create(&out, SegmentName::new(1, 0), SEG).unwrap();
        writer.write(b"abc").unwrap();
        writer.flush().unwrap();
        assert!(writer.segment_path(SegmentName::new(1, 0)).exists());
    }
}
