//! Relational store seam used by the bulk loader
//!
//! A [`RecordStore`] hands out one [`StoreSession`] per upload. A session
//! offers the store's bulk-copy path (delimited text streamed from a reader)
//! and a row-level upsert path that runs inside an explicit transaction.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use self::postgres::PostgresStore;

use crate::error::Result;
use crate::record::Record;
use std::io::Read;

/// Columns of the target table, in wire order
pub const COLUMNS: [&str; 6] = ["student_id", "first_name", "last_name", "dob", "class", "score"];

/// A store that can open sessions
pub trait RecordStore {
    type Session: StoreSession;

    /// Acquire a session (a connection, for a database)
    fn open_session(&self) -> Result<Self::Session>;
}

/// One connection's worth of store operations
pub trait StoreSession {
    /// Bulk-copy comma separated lines (no header) from `data`
    ///
    /// An empty field is NULL. Returns the number of rows copied. The copy is
    /// all or nothing: on error no row is persisted.
    fn copy_in(&mut self, data: &mut dyn Read) -> Result<u64>;

    fn begin(&mut self) -> Result<()>;

    /// Insert `record`, or overwrite every column of the row with its id
    fn upsert(&mut self, record: &Record) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}

/// `COPY` statement for `table`
pub fn copy_statement(table: &str) -> String {
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, NULL '')",
        table,
        COLUMNS.join(", ")
    )
}

/// Parameterized upsert statement for `table`
pub fn upsert_statement(table: &str) -> String {
    let updates: Vec<String> = COLUMNS[1..]
        .iter()
        .map(|col| format!("{col} = EXCLUDED.{col}"))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT ({}) DO UPDATE SET {}",
        table,
        COLUMNS.join(", "),
        COLUMNS[0],
        updates.join(", ")
    )
}
