//! Integration tests for the bulk loader

use std::fmt::Write as _;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tabload::bulk::{BulkLoader, CancelFlag, LoadPath, UploadSource};
use tabload::config::LoadConfig;
use tabload::store::{MemoryStore, RecordStore, StoreSession};
use tabload::{Record, TableError};
use tempfile::tempdir;

const HEADER: &str = "studentId,firstName,lastName,dob,class,score\n";

fn dataset(rows: u64) -> String {
    let mut csv = String::from(HEADER);
    for id in 1..=rows {
        writeln!(csv, "{},First{},Last{},2004-03-{:02},Class{},{}", id, id, id, id % 28 + 1, id % 5 + 1, 55 + id % 21).unwrap();
    }
    csv
}

fn small_batches() -> LoadConfig {
    LoadConfig {
        batch_size: 7,
        pipe_capacity: 2,
        ..LoadConfig::default()
    }
}

#[test]
fn test_upload_adds_five() {
    let store = MemoryStore::new();
    let loader = BulkLoader::new(store.clone(), LoadConfig::default());

    let report = loader
        .upload(&format!("{HEADER}1,John,Doe,2005-06-15,Class1,70\n"))
        .unwrap();

    assert_eq!(report.rows, 1);
    assert_eq!(report.path, LoadPath::BulkCopy);
    let record = store.get(1).unwrap();
    assert_eq!(record.score, 75);
    assert_eq!(record.first_name, "John");
    assert_eq!(record.date_of_birth.to_string(), "2005-06-15");
}

#[test]
fn test_malformed_rows_are_skipped() {
    let input = format!(
        "{HEADER}1,John,Doe,2005-06-15,Class1,70\n\
         2,Jane\n\
         3,Ann,Lee,2003-02-01,Class2,65\n"
    );

    let store = MemoryStore::new();
    let report = BulkLoader::new(store.clone(), LoadConfig::default())
        .upload(&input)
        .unwrap();

    assert_eq!(report.rows, 2);
    assert_eq!(store.len(), 2);
    assert!(store.get(2).is_none());
}

#[test]
fn test_fast_and_fallback_paths_agree() {
    let input = format!(
        "{}0,Bad,Row,not-a-date,Class1,60\n,,,,,\n",
        dataset(250)
    );

    let fast_store = MemoryStore::new();
    let fast = BulkLoader::new(fast_store.clone(), small_batches())
        .upload(&input)
        .unwrap();

    let slow_store = MemoryStore::new().with_copy_failure();
    let slow = BulkLoader::new(slow_store.clone(), small_batches())
        .upload(&input)
        .unwrap();

    assert_eq!(fast.path, LoadPath::BulkCopy);
    assert_eq!(slow.path, LoadPath::Fallback);
    assert_eq!(fast.rows, 250);
    assert_eq!(slow.rows, fast.rows);
    assert_eq!(fast_store.records(), slow_store.records());
    assert_eq!(slow_store.copy_attempts(), 1);
    assert_eq!(slow_store.upserts(), 250);
}

#[test]
fn test_pipe_integrity_across_sizes() {
    for rows in [0u64, 1, 6, 7, 8, 1_000, 100_000] {
        let input = dataset(rows);
        let store = MemoryStore::new();
        let report = BulkLoader::new(store.clone(), LoadConfig::default())
            .upload(&input)
            .unwrap();

        assert_eq!(report.path, LoadPath::BulkCopy, "rows = {rows}");
        assert_eq!(report.rows, rows);
        assert_eq!(store.len() as u64, rows);
        // every piped byte reached the store
        assert_eq!(report.bytes_piped, store.bytes_copied(), "rows = {rows}");
    }
}

#[test]
fn test_file_source_and_idempotent_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("students.csv");
    std::fs::write(&path, dataset(40)).unwrap();

    let store = MemoryStore::new();
    let loader = BulkLoader::new(store.clone(), small_batches());

    let first = loader.upload(&path).unwrap();
    let second = loader.upload(&path).unwrap();

    assert_eq!(first.path, LoadPath::BulkCopy);
    assert_eq!(second.path, LoadPath::Fallback);
    assert_eq!(second.rows, 40);
    assert_eq!(store.len(), 40);
}

#[test]
fn test_cancelled_upload_is_interrupted_without_fallback() {
    let cancel = CancelFlag::new();
    let store = MemoryStore::new();
    let loader = BulkLoader::new(store.clone(), small_batches()).with_cancel_flag(cancel.clone());

    cancel.cancel();
    let err = loader.upload(&dataset(1_000)).unwrap_err();

    assert!(matches!(err, TableError::Interrupted));
    assert!(store.is_empty());
    assert_eq!(store.upserts(), 0);
}

#[test]
fn test_invalid_utf8_is_replaced_not_fatal() {
    let mut input = format!("{HEADER}1,John,Doe,2005-06-15,Class1,70\n").into_bytes();
    input.extend_from_slice(b"2,Jos\xE9,Roe,2004-02-03,Class2,60\n");
    input.extend_from_slice(b"3,Ann,Lee,2003-02-01,Class3,65\n");

    let store = MemoryStore::new();
    let report = BulkLoader::new(store.clone(), LoadConfig::default())
        .upload(&input)
        .unwrap();

    assert_eq!(report.path, LoadPath::BulkCopy);
    assert_eq!(report.rows, 3);
    assert_eq!(store.get(2).unwrap().first_name, "Jos\u{FFFD}");
    assert_eq!(store.get(3).unwrap().score, 70);
}

/// Fails partway through the first read; later reads see the whole text
struct FlakySource {
    text: String,
    opens: AtomicUsize,
}

struct BrokenTail;

impl Read for BrokenTail {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("device unplugged"))
    }
}

impl UploadSource for FlakySource {
    fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
        let bytes = self.text.as_bytes();
        if self.opens.fetch_add(1, Ordering::SeqCst) == 0 {
            let head = &bytes[..bytes.len() / 2];
            Ok(Box::new(BufReader::new(head.chain(BrokenTail))))
        } else {
            Ok(Box::new(bytes))
        }
    }
}

#[test]
fn test_producer_failure_falls_back() {
    let source = FlakySource {
        text: dataset(500),
        opens: AtomicUsize::new(0),
    };
    let store = MemoryStore::new();

    let report = BulkLoader::new(store.clone(), small_batches())
        .upload(&source)
        .unwrap();

    assert_eq!(report.path, LoadPath::Fallback);
    assert_eq!(report.rows, 500);
    assert_eq!(store.len(), 500);
    assert_eq!(store.copy_attempts(), 1);
    assert_eq!(store.upserts(), 500);
    assert_eq!(source.opens.load(Ordering::SeqCst), 2);
}

/// A store whose copy drains its input a few bytes at a time
#[derive(Clone, Default)]
struct SlowStore {
    upserts: Arc<AtomicU64>,
}

struct SlowSession {
    upserts: Arc<AtomicU64>,
}

impl RecordStore for SlowStore {
    type Session = SlowSession;

    fn open_session(&self) -> tabload::Result<SlowSession> {
        Ok(SlowSession {
            upserts: Arc::clone(&self.upserts),
        })
    }
}

impl StoreSession for SlowSession {
    fn copy_in(&mut self, data: &mut dyn Read) -> tabload::Result<u64> {
        let mut buf = [0u8; 32];
        loop {
            thread::sleep(Duration::from_millis(5));
            if data.read(&mut buf)? == 0 {
                return Ok(0);
            }
        }
    }

    fn begin(&mut self) -> tabload::Result<()> {
        Ok(())
    }

    fn upsert(&mut self, _record: &Record) -> tabload::Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn commit(&mut self) -> tabload::Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> tabload::Result<()> {
        Ok(())
    }
}

#[test]
fn test_cancel_during_copy_unblocks_both_sides() {
    let store = SlowStore::default();
    let config = LoadConfig {
        batch_size: 7,
        pipe_capacity: 1,
        ..LoadConfig::default()
    };
    let loader = BulkLoader::new(store.clone(), config);
    let cancel = loader.cancel_flag();
    let input = dataset(100_000);

    let started = Instant::now();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        cancel.cancel();
    });
    let result = loader.upload(&input);
    canceller.join().unwrap();

    assert!(matches!(result, Err(TableError::Interrupted)));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(store.upserts.load(Ordering::SeqCst), 0);
}
