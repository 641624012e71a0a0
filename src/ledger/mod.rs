//! SQLite ledger for plugin metadata and scan findings.
//!
//! Two tables back the ledger: `Plugins`, keyed by `(slug, version)`, and
//! `Audit`, keyed by the finding's natural key. Every write is a single
//! upsert statement, so re-running any stage against the same database is
//! safe and an interrupted run leaves at most one plugin partially written.

mod findings;
mod plugins;

pub use findings::{FindingQuery, FindingView, FindingWrite};

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use thiserror::Error;

use crate::registry::RegistryError;

const MIG_0001: &str = include_str!("migrations/0001_init.sql");

/// Schema version written to `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur while reading or writing the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error (creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry error while refreshing a record.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Handle to the ledger database.
pub struct Ledger {
    /// Database file (`None` for in-memory ledgers)
    path: Option<PathBuf>,

    conn: Connection,
}

impl Ledger {
    /// Open (or create) a ledger database file.
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        let ledger = Self { path: Some(path), conn };
        ledger.migrate()?;
        Ok(ledger)
    }

    /// Open a throwaway in-memory ledger.
    pub fn open_in_memory() -> LedgerResult<Self> {
        let ledger = Self { path: None, conn: Connection::open_in_memory()? };
        ledger.migrate()?;
        Ok(ledger)
    }

    /// Get the database file path.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn migrate(&self) -> LedgerResult<()> {
        self.conn.execute_batch(MIG_0001)?;
        let version: i64 = self.conn.query_row("PRAGMA user_version;", [], |r| r.get(0))?;
        if version < SCHEMA_VERSION {
            self.conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        }
        Ok(())
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}
