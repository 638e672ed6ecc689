//! PostgreSQL store over the blocking `postgres` client

use super::{copy_statement, upsert_statement, RecordStore, StoreSession};
use crate::error::{Result, TableError};
use crate::record::Record;
use postgres::{Client, NoTls, Statement};
use std::io::Read;
use tracing::debug;

/// Connects once per session to the given database
#[derive(Debug, Clone)]
pub struct PostgresStore {
    url: String,
    table: String,
}

impl PostgresStore {
    /// `url` is a libpq-style connection string or `postgres://` URL
    pub fn new(url: impl Into<String>, table: impl Into<String>) -> Self {
        PostgresStore {
            url: url.into(),
            table: table.into(),
        }
    }
}

impl RecordStore for PostgresStore {
    type Session = PostgresSession;

    fn open_session(&self) -> Result<PostgresSession> {
        let client = Client::connect(&self.url, NoTls)?;
        debug!(table = %self.table, "opened database session");
        Ok(PostgresSession {
            client,
            table: self.table.clone(),
            upsert: None,
        })
    }
}

pub struct PostgresSession {
    client: Client,
    table: String,
    upsert: Option<Statement>,
}

impl StoreSession for PostgresSession {
    fn copy_in(&mut self, data: &mut dyn Read) -> Result<u64> {
        let mut writer = self.client.copy_in(copy_statement(&self.table).as_str())?;
        // Dropping the writer without `finish` aborts the COPY
        std::io::copy(data, &mut writer)?;
        Ok(writer.finish()?)
    }

    fn begin(&mut self) -> Result<()> {
        self.client.batch_execute("BEGIN")?;
        Ok(())
    }

    fn upsert(&mut self, record: &Record) -> Result<()> {
        let statement = match &self.upsert {
            Some(statement) => statement.clone(),
            None => {
                let statement = self.client.prepare(&upsert_statement(&self.table))?;
                self.upsert = Some(statement.clone());
                statement
            }
        };
        let affected = self.client.execute(
            &statement,
            &[
                &record.id,
                &record.first_name,
                &record.last_name,
                &record.date_of_birth,
                &record.group_label,
                &record.score,
            ],
        )?;
        if affected != 1 {
            return Err(TableError::Store(format!(
                "upsert of id {} affected {} rows",
                record.id, affected
            )));
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.client.batch_execute("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.client.batch_execute("ROLLBACK")?;
        Ok(())
    }
}
