//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for library and book stores.
//! - Apply each store's schema migrations in deterministic order.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.
//! - A library connection is never migrated with the book registry and
//!   vice versa.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_book_db, open_book_db_in_memory, open_library_db, open_library_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Kind of database file managed by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Configurations (schema templates), book catalog and notes.
    Library,
    /// One book: a copy of its schema plus instances and manuscript.
    Book,
}

impl StoreKind {
    /// Stable lowercase label used in log events and CLI arguments.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Library => "library",
            Self::Book => "book",
        }
    }
}

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        store: StoreKind,
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                store,
                db_version,
                latest_supported,
            } => write!(
                f,
                "{} database schema version {db_version} is newer than supported {latest_supported}",
                store.as_str()
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
