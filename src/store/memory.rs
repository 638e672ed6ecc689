//! In-process store for dry runs and tests
//!
//! Behaves like a table with a primary key on `id`: a bulk copy that would
//! duplicate a key, or that contains a malformed line, fails as a whole.

use super::{RecordStore, StoreSession};
use crate::codec::{parse_line, Dialect, LineOutcome};
use crate::error::{Result, TableError};
use crate::record::Record;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<i64, Record>,
    copy_attempts: u64,
    bytes_copied: u64,
    upserts: u64,
}

/// A shared in-memory table; clones see the same rows
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    table: Arc<Mutex<Table>>,
    fail_copy: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every bulk copy without reading from the source
    pub fn with_copy_failure(mut self) -> Self {
        self.fail_copy = true;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Table>> {
        lock(&self.table)
    }

    /// Number of persisted rows
    pub fn len(&self) -> usize {
        self.lock().map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persisted row by id
    pub fn get(&self, id: i64) -> Option<Record> {
        self.lock().ok()?.rows.get(&id).cloned()
    }

    /// All persisted rows in id order
    pub fn records(&self) -> Vec<Record> {
        self.lock()
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Bulk copies attempted, failed ones included
    pub fn copy_attempts(&self) -> u64 {
        self.lock().map(|t| t.copy_attempts).unwrap_or(0)
    }

    /// Bytes read by bulk copies
    pub fn bytes_copied(&self) -> u64 {
        self.lock().map(|t| t.bytes_copied).unwrap_or(0)
    }

    /// Committed upserts
    pub fn upserts(&self) -> u64 {
        self.lock().map(|t| t.upserts).unwrap_or(0)
    }
}

fn lock(table: &Mutex<Table>) -> Result<MutexGuard<'_, Table>> {
    table
        .lock()
        .map_err(|_| TableError::Store("memory store lock poisoned".into()))
}

impl RecordStore for MemoryStore {
    type Session = MemorySession;

    fn open_session(&self) -> Result<MemorySession> {
        Ok(MemorySession {
            table: Arc::clone(&self.table),
            fail_copy: self.fail_copy,
            transaction: None,
        })
    }
}

pub struct MemorySession {
    table: Arc<Mutex<Table>>,
    fail_copy: bool,
    transaction: Option<Vec<Record>>,
}

impl StoreSession for MemorySession {
    fn copy_in(&mut self, data: &mut dyn Read) -> Result<u64> {
        lock(&self.table)?.copy_attempts += 1;
        if self.fail_copy {
            return Err(TableError::Store("bulk copy rejected".into()));
        }

        let mut staged = BTreeMap::new();
        let mut bytes = 0u64;
        let mut reader = BufReader::new(data);
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            bytes += n as u64;
            let text = line.trim_end_matches(['\n', '\r']);
            let record = match parse_line(text, Dialect::Quoted) {
                LineOutcome::Record(record) => record,
                LineOutcome::Skip => {
                    return Err(TableError::Store(format!("malformed COPY data: '{}'", text)))
                }
            };
            if staged.insert(record.id, record).is_some() {
                return Err(TableError::Store("duplicate key in COPY data".into()));
            }
        }

        let mut table = lock(&self.table)?;
        table.bytes_copied += bytes;
        if let Some(id) = staged.keys().find(|id| table.rows.contains_key(*id)) {
            return Err(TableError::Store(format!(
                "duplicate key value violates unique constraint: student_id={}",
                id
            )));
        }
        let copied = staged.len() as u64;
        table.rows.append(&mut staged);
        Ok(copied)
    }

    fn begin(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(TableError::Store("transaction already open".into()));
        }
        self.transaction = Some(Vec::new());
        Ok(())
    }

    fn upsert(&mut self, record: &Record) -> Result<()> {
        match &mut self.transaction {
            Some(pending) => pending.push(record.clone()),
            None => {
                let mut table = lock(&self.table)?;
                table.rows.insert(record.id, record.clone());
                table.upserts += 1;
            }
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let pending = self
            .transaction
            .take()
            .ok_or_else(|| TableError::Store("no transaction open".into()))?;
        let mut table = lock(&self.table)?;
        table.upserts += pending.len() as u64;
        for record in pending {
            table.rows.insert(record.id, record);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.transaction = None;
        Ok(())
    }
}
