//! Batched delimited-text writer
//!
//! Lines are accumulated in memory and written to disk every `batch_size`
//! rows. Output goes to a temporary file in the destination directory and is
//! moved into place by [`CsvWriter::save`]; a writer dropped before `save`
//! leaves no file behind.

use crate::codec::{self, Dialect};
use crate::error::{Result, TableError};
use crate::record::{Record, FIELD_COUNT};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::trace;

/// Delimited-text writer with batched, all-or-nothing output
///
/// # Examples
///
/// ```no_run
/// use tabload::codec::Dialect;
/// use tabload::csv_writer::CsvWriter;
///
/// let mut writer = CsvWriter::new("students.csv", 1000, Dialect::Plain)?;
/// writer.write_header()?;
/// writer.write_row(&["1", "ANNA", "SMITH", "2004-02-01", "Class2", "71"])?;
/// writer.save()?;
/// # Ok::<(), tabload::TableError>(())
/// ```
pub struct CsvWriter {
    writer: BufWriter<File>,
    staged: NamedTempFile,
    destination: PathBuf,

    // State
    batch: String,
    pending: usize,
    row_count: u64,

    // Configuration
    batch_size: usize,
    dialect: Dialect,
}

impl CsvWriter {
    /// Create a writer that will produce `destination` on [`save`](Self::save)
    pub fn new<P: AsRef<Path>>(destination: P, batch_size: usize, dialect: Dialect) -> Result<Self> {
        if batch_size == 0 {
            return Err(TableError::WriteError("batch size must be positive".to_string()));
        }
        let destination = destination.as_ref().to_path_buf();
        let parent = match destination.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let staged = tempfile::Builder::new()
            .prefix(".tabload-")
            .suffix(".csv.part")
            .tempfile_in(&parent)?;
        let file = staged.as_file().try_clone()?;

        Ok(CsvWriter {
            writer: BufWriter::with_capacity(64 * 1024, file),
            staged,
            destination,
            batch: String::with_capacity(batch_size.min(65_536) * 64),
            pending: 0,
            row_count: 0,
            batch_size,
            dialect,
        })
    }

    /// Write the fixed header line; it is not counted as a row
    pub fn write_header(&mut self) -> Result<()> {
        self.batch.push_str(&codec::header_line());
        Ok(())
    }

    /// Write a row of text fields
    pub fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        codec::write_fields(&mut self.batch, fields, self.dialect);
        self.row_written()
    }

    /// Write five text fields followed by `score + offset`
    pub fn write_scored_row<S: AsRef<str>>(
        &mut self,
        text_fields: &[S; FIELD_COUNT - 1],
        score: i64,
        offset: i64,
    ) -> Result<()> {
        codec::write_scored_line(&mut self.batch, text_fields, score, offset, self.dialect);
        self.row_written()
    }

    /// Write a record with `offset` added to its score
    pub fn write_record(&mut self, record: &Record, offset: i64) -> Result<()> {
        codec::write_record(&mut self.batch, record, offset, self.dialect);
        self.row_written()
    }

    fn row_written(&mut self) -> Result<()> {
        self.row_count += 1;
        self.pending += 1;
        if self.pending >= self.batch_size {
            self.flush_batch()?;
        }
        Ok(())
    }

    fn flush_batch(&mut self) -> Result<()> {
        if !self.batch.is_empty() {
            self.writer.write_all(self.batch.as_bytes())?;
            trace!(rows = self.pending, total = self.row_count, "wrote text batch");
            self.batch.clear();
        }
        self.pending = 0;
        Ok(())
    }

    /// Get the number of data rows written
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Flush the final partial batch and move the file into place
    pub fn save(mut self) -> Result<PathBuf> {
        self.flush_batch()?;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| TableError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        self.staged.persist(&self.destination)?;
        Ok(self.destination)
    }
}
