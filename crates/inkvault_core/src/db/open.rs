//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections for both store kinds.
//! - Configure connection pragmas required by core behavior.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have the matching store's migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbResult, StoreKind};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens (or creates) a library database file and applies pending migrations.
pub fn open_library_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with(StoreKind::Library, "file", || Connection::open(path))
}

/// Opens an in-memory library database with all migrations applied.
pub fn open_library_db_in_memory() -> DbResult<Connection> {
    open_with(StoreKind::Library, "memory", Connection::open_in_memory)
}

/// Opens (or creates) a book database file and applies pending migrations.
pub fn open_book_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with(StoreKind::Book, "file", || Connection::open(path))
}

/// Opens an in-memory book database with all migrations applied.
pub fn open_book_db_in_memory() -> DbResult<Connection> {
    open_with(StoreKind::Book, "memory", Connection::open_in_memory)
}

fn open_with<F>(store: StoreKind, mode: &'static str, connect: F) -> DbResult<Connection>
where
    F: FnOnce() -> rusqlite::Result<Connection>,
{
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start store={} mode={mode}",
        store.as_str()
    );

    let mut conn = match connect() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error store={} mode={mode} duration_ms={} error_code=db_open_failed error={}",
                store.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, store) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok store={} mode={mode} duration_ms={}",
                store.as_str(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error store={} mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                store.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, store: StoreKind) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    apply_migrations(conn, store)?;
    Ok(())
}
