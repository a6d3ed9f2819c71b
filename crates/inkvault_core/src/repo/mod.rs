//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts per aggregate.
//! - Isolate SQLite query details from service/business orchestration.
//! - Share row-parsing, ordering and sync-marking helpers.
//!
//! # Invariants
//! - Repository writes must call the model's `validate()` before persistence.
//! - Repositories are only constructed over connections migrated to the
//!   latest version of their store kind.
//! - Every mutation in a book store marks `book_info` as `local_changes`.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{DbError, StoreKind};
use crate::model::ModelValidationError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod book_repo;
pub mod instance_repo;
pub mod note_repo;
pub mod parameter_repo;
pub mod scene_repo;
pub mod schema_repo;
pub mod user_doc_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Struct-level validation failed before any SQL ran.
    Validation(ModelValidationError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target row does not exist.
    NotFound { entity: &'static str, uuid: Uuid },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        store: StoreKind,
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, uuid } => write!(f, "{entity} not found: {uuid}"),
            Self::UninitializedConnection {
                store,
                expected_version,
                actual_version,
            } => write!(
                f,
                "{} store requires schema version {expected_version}, got {actual_version}",
                store.as_str()
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound { .. } => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ModelValidationError> for RepoError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Direction for swapping an ordered row with its neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// Table plus the columns a repository reads from it.
pub(crate) struct RequiredTable {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Detects the store kind from its tables: only book stores own `book_info`.
pub fn detect_store(conn: &Connection) -> RepoResult<StoreKind> {
    if table_exists(conn, "book_info")? {
        Ok(StoreKind::Book)
    } else {
        Ok(StoreKind::Library)
    }
}

/// Verifies migration state and required tables; returns the store kind.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    required: &[RequiredTable],
) -> RepoResult<StoreKind> {
    let store = detect_store(conn)?;
    let expected_version = latest_version(store);
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            store,
            expected_version,
            actual_version,
        });
    }

    for table in required {
        if !table_exists(conn, table.name)? {
            return Err(RepoError::MissingRequiredTable(table.name));
        }
        for column in table.columns {
            if !table_has_column(conn, table.name, column)? {
                return Err(RepoError::MissingRequiredColumn {
                    table: table.name,
                    column,
                });
            }
        }
    }

    Ok(store)
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Marks the book store as locally changed. No-op for the library store.
pub(crate) fn touch_store(conn: &Connection, store: StoreKind) -> RepoResult<()> {
    if store == StoreKind::Book {
        conn.execute(
            "UPDATE book_info
             SET sync_state = 'local_changes',
                 local_updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = 1;",
            [],
        )?;
    }
    Ok(())
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_optional_uuid(
    value: Option<String>,
    column: &'static str,
) -> RepoResult<Option<Uuid>> {
    value.map(|text| parse_uuid(&text, column)).transpose()
}

pub(crate) fn optional_uuid_text(value: Option<Uuid>) -> Option<String> {
    value.map(|uuid| uuid.to_string())
}

pub(crate) fn to_json<T: Serialize>(value: &T, column: &'static str) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode {column}: {err}")))
}

pub(crate) fn optional_json<T: Serialize>(
    value: Option<&T>,
    column: &'static str,
) -> RepoResult<Option<String>> {
    value.map(|inner| to_json(inner, column)).transpose()
}

pub(crate) fn parse_optional_json<T: DeserializeOwned>(
    value: Option<String>,
    column: &'static str,
) -> RepoResult<Option<T>> {
    match value {
        None => Ok(None),
        Some(text) if text.trim().is_empty() => Ok(None),
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|err| RepoError::InvalidData(format!("invalid json in {column}: {err}"))),
    }
}

/// Next `order_number` within `scope_column = scope` of `table`.
///
/// Table and column names are compile-time constants of the calling repository.
pub(crate) fn next_order_number(
    conn: &Connection,
    table: &'static str,
    scope_column: &'static str,
    scope: Option<Uuid>,
) -> RepoResult<i64> {
    let next = match scope {
        Some(scope) => conn.query_row(
            &format!(
                "SELECT COALESCE(MAX(order_number), -1) + 1
                 FROM {table}
                 WHERE {scope_column} = ?1;"
            ),
            [scope.to_string()],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            &format!(
                "SELECT COALESCE(MAX(order_number), -1) + 1
                 FROM {table}
                 WHERE {scope_column} IS NULL;"
            ),
            [],
            |row| row.get(0),
        )?,
    };
    Ok(next)
}

/// Lists row UUIDs of one ordering scope, `order_number ASC, id ASC`.
pub(crate) fn ordered_uuids(
    conn: &Connection,
    table: &'static str,
    scope_column: &'static str,
    scope: Option<Uuid>,
) -> RepoResult<Vec<Uuid>> {
    let filter = if scope.is_some() {
        format!("{scope_column} = ?1")
    } else {
        format!("{scope_column} IS NULL")
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT uuid FROM {table} WHERE {filter} ORDER BY order_number ASC, id ASC;"
    ))?;
    let mut rows = match scope {
        Some(scope) => stmt.query([scope.to_string()])?,
        None => stmt.query([])?,
    };
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, table)?);
    }
    Ok(ids)
}

/// Rewrites `order_number` of one scope to `0..n` keeping current order.
pub(crate) fn renumber_scope(
    conn: &Connection,
    table: &'static str,
    scope_column: &'static str,
    scope: Option<Uuid>,
) -> RepoResult<()> {
    let ids = ordered_uuids(conn, table, scope_column, scope)?;
    for (index, id) in ids.into_iter().enumerate() {
        conn.execute(
            &format!("UPDATE {table} SET order_number = ?2 WHERE uuid = ?1;"),
            params![id.to_string(), index as i64],
        )?;
    }
    Ok(())
}

/// Swaps one row with its neighbour inside its scope.
///
/// Returns `false` when the row is already first (`Up`) or last (`Down`).
pub(crate) fn move_in_scope(
    conn: &Connection,
    table: &'static str,
    scope_column: &'static str,
    scope: Option<Uuid>,
    uuid: Uuid,
    direction: MoveDirection,
) -> RepoResult<bool> {
    let mut ids = ordered_uuids(conn, table, scope_column, scope)?;
    let Some(index) = ids.iter().position(|id| *id == uuid) else {
        return Ok(false);
    };
    let neighbour = match direction {
        MoveDirection::Up if index > 0 => index - 1,
        MoveDirection::Down if index + 1 < ids.len() => index + 1,
        _ => return Ok(false),
    };
    ids.swap(index, neighbour);
    for (position, id) in ids.into_iter().enumerate() {
        conn.execute(
            &format!("UPDATE {table} SET order_number = ?2 WHERE uuid = ?1;"),
            params![id.to_string(), position as i64],
        )?;
    }
    Ok(true)
}

/// Reads the scope value (`scope_column`) of one row, `None` if the row is missing.
pub(crate) fn scope_of(
    conn: &Connection,
    table: &'static str,
    scope_column: &'static str,
    uuid: Uuid,
) -> RepoResult<Option<Option<Uuid>>> {
    let value: Option<Option<String>> = conn
        .query_row(
            &format!("SELECT {scope_column} FROM {table} WHERE uuid = ?1;"),
            [uuid.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match value {
        None => Ok(None),
        Some(scope) => Ok(Some(parse_optional_uuid(scope, scope_column)?)),
    }
}

pub(crate) fn row_exists(conn: &Connection, table: &'static str, uuid: Uuid) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE uuid = ?1);"),
        [uuid.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

#[cfg(test)]
mod tests {
    use super::{int_to_bool, parse_optional_json, RepoError};
    use crate::model::block::TitleForms;

    #[test]
    fn int_to_bool_rejects_out_of_range_values() {
        assert!(!int_to_bool(0, "blocks.use_tabs").unwrap());
        assert!(int_to_bool(1, "blocks.use_tabs").unwrap());
        assert!(matches!(
            int_to_bool(2, "blocks.use_tabs"),
            Err(RepoError::InvalidData(_))
        ));
    }

    #[test]
    fn blank_json_column_reads_as_none() {
        let parsed: Option<TitleForms> =
            parse_optional_json(Some("  ".to_string()), "blocks.title_forms").unwrap();
        assert!(parsed.is_none());
        let broken: Result<Option<TitleForms>, _> =
            parse_optional_json(Some("{".to_string()), "blocks.title_forms");
        assert!(matches!(broken, Err(RepoError::InvalidData(_))));
    }
}
