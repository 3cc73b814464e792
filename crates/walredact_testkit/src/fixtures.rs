//! Segment directory fixtures.

use crate::builder::BuiltWal;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walredact_core::WalGeometry;

/// Small geometry that puts many page and segment boundaries in little data.
pub fn test_geometry() -> WalGeometry {
    WalGeometry::new(32 * 1024, 1024).expect("valid test geometry")
}

/// A WAL image written out as segment files in a temporary directory.
pub struct TempWalDir {
    dir: TempDir,
    /// Paths of the written segment files, in order.
    pub segments: Vec<PathBuf>,
}

impl TempWalDir {
    /// Writes `wal` into a fresh temporary directory.
    pub fn write(wal: &BuiltWal) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let input = dir.path().join("pg_xlog");
        std::fs::create_dir_all(&input).expect("Failed to create input directory");
        let segments = wal
            .write_segments(&input)
            .expect("Failed to write segments");
        Self { dir, segments }
    }

    /// Path of the first segment file.
    pub fn first_segment(&self) -> &Path {
        &self.segments[0]
    }

    /// Directory holding the input segments.
    pub fn input_dir(&self) -> PathBuf {
        self.dir.path().join("pg_xlog")
    }

    /// Directory for output segments; not created.
    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("filtered")
    }
}

/// Concatenates every file in `dir` in file name order.
pub fn read_segments(dir: &Path) -> Vec<u8> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .expect("Failed to read directory")
        .map(|entry| entry.expect("Failed to read entry").path())
        .collect();
    paths.sort();
    let mut out = Vec::new();
    for path in paths {
        out.extend(std::fs::read(&path).expect("Failed to read segment"));
    }
    out
}
