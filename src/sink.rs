//! Durable storage for completed persistence windows.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::buffer::Sample;
use crate::error::SinkError;

/// Destination for a completed window (adapter for different backends).
pub trait WindowSink: Send {
    /// Persist `window`, laid out as `rows` rows of `row_width` samples.
    fn write(&mut self, window: &[Sample], rows: usize, row_width: usize) -> Result<(), SinkError>;
}

/// Writes the window as CSV, one line per row. The file is rewritten on every call.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WindowSink for CsvSink {
    fn write(&mut self, window: &[Sample], rows: usize, row_width: usize) -> Result<(), SinkError> {
        let expected = rows * row_width;
        if window.len() != expected {
            return Err(SinkError::ShapeMismatch {
                expected,
                actual: window.len(),
            });
        }

        let mut out = BufWriter::new(File::create(&self.path)?);
        for row in window.chunks(row_width.max(1)) {
            let mut first = true;
            for sample in row {
                if !first {
                    out.write_all(b",")?;
                }
                write!(out, "{sample}")?;
                first = false;
            }
            out.write_all(b"\n")?;
        }
        out.flush()?;

        debug!(path = %self.path.display(), rows, row_width, "window written to csv");
        Ok(())
    }
}

/// Discards every window.
pub struct NullSink;

impl WindowSink for NullSink {
    fn write(&mut self, _window: &[Sample], _rows: usize, _row_width: usize) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_csv_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.csv");
        let mut sink = CsvSink::new(&path);

        sink.write(&[1, -2, 3, 4, 5, -128], 2, 3).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "1,-2,3\n4,5,-128\n");

        // Second write replaces the file.
        sink.write(&[0, 0], 1, 2).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0,0\n");
    }

    #[test]
    fn test_shape_mismatch() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvSink::new(dir.path().join("x.csv"));
        assert!(matches!(
            sink.write(&[1, 2, 3], 2, 2),
            Err(SinkError::ShapeMismatch { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvSink::new(dir.path().join("missing").join("dump.csv"));
        assert!(matches!(sink.write(&[1], 1, 1), Err(SinkError::Io(_))));
    }
}
