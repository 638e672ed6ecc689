//! Bulk loading of delimited text into a record store
//!
//! An upload first tries the store's bulk-copy path: a producer thread reads
//! the source, applies the score offset and feeds a bounded [`pipe`] while the
//! calling thread streams the pipe into [`StoreSession::copy_in`]. If either
//! side fails, the upload falls back to re-reading the source and upserting
//! each record inside one transaction. Both paths parse lines identically, so
//! they persist the same rows.

mod pipe;
mod source;

pub use pipe::{pipe, CancelFlag, PipeReader, PipeWriter};
pub use source::UploadSource;

use std::io::BufRead;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, info_span, warn};

use crate::codec::{self, LineOutcome};
use crate::config::LoadConfig;
use crate::error::{Result, TableError};
use crate::record::Record;
use crate::store::{RecordStore, StoreSession};

/// Which path persisted the rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPath {
    BulkCopy,
    Fallback,
}

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Records persisted; skipped lines are not counted
    pub rows: u64,
    pub path: LoadPath,
    /// Bytes streamed through the pipe; 0 when the fallback path ran
    pub bytes_piped: u64,
}

/// What the producer thread hands back through its join handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Production {
    records: u64,
    bytes: u64,
}

/// Parse one input line and apply the upload score offset
///
/// Lines that are malformed, or whose adjusted score overflows, are skipped.
fn transform(line: &str, config: &LoadConfig) -> Option<Record> {
    let line = line.trim_end_matches(['\n', '\r']);
    match codec::parse_line(line, config.dialect) {
        LineOutcome::Record(record) => record.with_score_offset(config.score_offset),
        LineOutcome::Skip => None,
    }
}

/// Call `f` with every transformed record after the header line
fn for_each_record<F>(
    mut reader: Box<dyn BufRead + '_>,
    config: &LoadConfig,
    cancel: &CancelFlag,
    mut f: F,
) -> Result<u64>
where
    F: FnMut(Record) -> Result<()>,
{
    let mut line = Vec::with_capacity(128);
    let mut header_skipped = false;
    let mut records = 0u64;
    let mut skipped = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(TableError::Interrupted);
        }
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if !header_skipped {
            header_skipped = true;
            continue;
        }
        // invalid UTF-8 becomes U+FFFD rather than failing the whole load
        match transform(&String::from_utf8_lossy(&line), config) {
            Some(record) => {
                f(record)?;
                records += 1;
            }
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(skipped, "skipped malformed lines");
    }
    Ok(records)
}

/// Producer side of the bulk path; runs on its own thread
fn produce<U>(source: &U, mut pipe: PipeWriter, config: &LoadConfig, cancel: &CancelFlag) -> Result<Production>
where
    U: UploadSource + ?Sized,
{
    let reader = source.open()?;
    let mut batch = String::with_capacity(config.batch_size.min(65_536) * 64);
    let mut pending = 0usize;

    let records = for_each_record(reader, config, cancel, |record| {
        codec::write_record(&mut batch, &record, 0, config.dialect);
        pending += 1;
        if pending >= config.batch_size {
            pipe.send(std::mem::take(&mut batch).into_bytes())?;
            pending = 0;
        }
        Ok(())
    })?;

    if !batch.is_empty() {
        pipe.send(batch.into_bytes())?;
    }
    Ok(Production {
        records,
        bytes: pipe.finish(),
    })
}

/// Loads delimited text into a [`RecordStore`]
///
/// # Example
///
/// ```
/// use tabload::bulk::{BulkLoader, LoadPath};
/// use tabload::config::LoadConfig;
/// use tabload::store::MemoryStore;
///
/// let store = MemoryStore::new();
/// let loader = BulkLoader::new(store.clone(), LoadConfig::default());
/// let csv = "studentId,firstName,lastName,dob,class,score\n1,John,Doe,2005-06-15,Class1,70\n";
///
/// let report = loader.upload(csv)?;
/// assert_eq!(report.rows, 1);
/// assert_eq!(report.path, LoadPath::BulkCopy);
/// assert_eq!(store.get(1).unwrap().score, 75);
/// # Ok::<(), tabload::TableError>(())
/// ```
pub struct BulkLoader<S: RecordStore> {
    store: S,
    config: LoadConfig,
    cancel: CancelFlag,
}

impl<S: RecordStore> BulkLoader<S> {
    pub fn new(store: S, config: LoadConfig) -> Self {
        BulkLoader {
            store,
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Share an existing cancellation flag
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that stops an upload in progress
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load `source`, skipping its header line
    ///
    /// Bulk-path failures are logged and answered with the fallback; only a
    /// fallback failure or a cancellation is returned as an error.
    pub fn upload<U>(&self, source: &U) -> Result<LoadReport>
    where
        U: UploadSource + ?Sized,
    {
        let span = info_span!("upload", source = %source.describe(), table = %self.config.table);
        let _guard = span.enter();
        let started = Instant::now();

        let report = match self.bulk_copy(source) {
            Ok(report) => report,
            Err(e) if e.is_interrupted() || self.cancel.is_cancelled() => {
                warn!("upload cancelled");
                return Err(TableError::Interrupted);
            }
            Err(e) => {
                warn!(error = %e, "bulk copy failed, falling back to row upserts");
                self.fallback(source)?
            }
        };

        info!(
            rows = report.rows,
            path = ?report.path,
            bytes = report.bytes_piped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "upload completed"
        );
        Ok(report)
    }

    fn bulk_copy<U>(&self, source: &U) -> Result<LoadReport>
    where
        U: UploadSource + ?Sized,
    {
        let mut session = self.store.open_session()?;
        let (writer, reader) = pipe(self.config.pipe_capacity, self.cancel.clone());
        let config = &self.config;
        let cancel = &self.cancel;

        let (copied, produced, bytes_read) = thread::scope(|scope| {
            let producer = scope.spawn(move || produce(source, writer, config, cancel));
            // owned by the scope closure so a panicking copy still drops it
            let mut reader = reader;
            let copied = session.copy_in(&mut reader);
            let bytes_read = reader.bytes_read();
            // unblocks a producer waiting on a full pipe
            drop(reader);
            let produced = producer
                .join()
                .unwrap_or_else(|_| Err(TableError::WriteError("producer thread panicked".into())));
            (copied, produced, bytes_read)
        });

        if self.cancel.is_cancelled() {
            return Err(TableError::Interrupted);
        }
        let copied = copied?;
        let produced = produced?;

        if produced.bytes != bytes_read {
            return Err(TableError::Store(format!(
                "pipe delivered {} of {} bytes",
                bytes_read, produced.bytes
            )));
        }
        if copied != produced.records {
            return Err(TableError::Store(format!(
                "bulk copy stored {} of {} records",
                copied, produced.records
            )));
        }
        debug!(records = produced.records, bytes = produced.bytes, "bulk copy finished");

        Ok(LoadReport {
            rows: produced.records,
            path: LoadPath::BulkCopy,
            bytes_piped: produced.bytes,
        })
    }

    fn fallback<U>(&self, source: &U) -> Result<LoadReport>
    where
        U: UploadSource + ?Sized,
    {
        let mut session = self.store.open_session()?;
        session.begin()?;

        let upserted = source
            .open()
            .map_err(TableError::from)
            .and_then(|reader| {
                for_each_record(reader, &self.config, &self.cancel, |record| {
                    session.upsert(&record)
                })
            });

        match upserted {
            Ok(rows) => {
                session.commit()?;
                Ok(LoadReport {
                    rows,
                    path: LoadPath::Fallback,
                    bytes_piped: 0,
                })
            }
            Err(e) => {
                if let Err(rollback) = session.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }
}
