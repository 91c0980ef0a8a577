//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the tracker store.
//! - Apply schema migrations in deterministic order.
//! - Describe where the store lives (`StoreConfig`) and hand out connections.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.

use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

const DB_FILE_NAME: &str = "tasktrail.db";
const ATTACHMENTS_DIR_NAME: &str = "attachments";

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Anything that can hand out fresh, migrated store connections.
///
/// Batch workers call this once each, so every worker owns its connection
/// and its own transactions.
pub trait ConnectionSource: Sync {
    fn open_connection(&self) -> DbResult<Connection>;
}

/// Location of the relational store and the attachment storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Root directory holding `tasks/<task>/<filename>` attachment content.
    pub attachments_root: PathBuf,
}

impl StoreConfig {
    pub fn new(db_path: impl Into<PathBuf>, attachments_root: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            attachments_root: attachments_root.into(),
        }
    }

    /// Derives both locations from one data directory.
    pub fn from_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self::new(
            data_dir.join(DB_FILE_NAME),
            data_dir.join(ATTACHMENTS_DIR_NAME),
        )
    }
}

impl ConnectionSource for StoreConfig {
    fn open_connection(&self) -> DbResult<Connection> {
        open_db(&self.db_path)
    }
}
