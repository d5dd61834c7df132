//! SQLite persistence for journals and papers.
//!
//! Every batch write runs in its own transaction: either all of a batch's
//! rows become visible or none do.

pub mod journals;
pub mod papers;
pub mod schema;
pub mod stats;

pub use papers::*;
pub use stats::*;

use anyhow::{Context, Result};
use log::debug;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What happens when a paper's key is already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Leave the stored record untouched and count the row as skipped
    CreateOnly,
    /// Overwrite every field of the stored record
    CreateOrUpdate,
}

/// Outcome of writing one batch (or the sum over several)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub rejected: u64,
}

impl BatchCounts {
    pub fn add(&mut self, other: &BatchCounts) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.rejected += other.rejected;
    }

    pub fn total(&self) -> u64 {
        self.created + self.updated + self.skipped + self.rejected
    }
}

/// Destination for keyed paper batches
pub trait PaperSink {
    /// Persist one batch atomically
    fn write_batch(&mut self, rows: &[PaperRow], mode: WriteMode) -> Result<BatchCounts>;
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        debug!("Opened database {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        schema::apply(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl PaperSink for Store {
    fn write_batch(&mut self, rows: &[PaperRow], mode: WriteMode) -> Result<BatchCounts> {
        self.write_papers(rows, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_counts_add() {
        let mut total = BatchCounts::default();
        total.add(&BatchCounts {
            created: 2,
            updated: 1,
            skipped: 0,
            rejected: 3,
        });
        total.add(&BatchCounts {
            created: 1,
            ..Default::default()
        });
        assert_eq!(total.created, 3);
        assert_eq!(total.total(), 7);
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ost.sqlite3");
        {
            let store = Store::open(&path).unwrap();
            assert_eq!(store.count_papers().unwrap(), 0);
        }
        // reopening keeps the schema
        let store = Store::open(&path).unwrap();
        assert_eq!(store.count_journals().unwrap(), 0);
    }
}
