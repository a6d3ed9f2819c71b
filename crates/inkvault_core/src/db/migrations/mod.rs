//! SQLite migration registries and executor.
//!
//! # Responsibility
//! - Register library and book schema migrations in strictly increasing order.
//! - Apply pending migrations atomically, including Rust data steps.
//!
//! # Invariants
//! - `version` values must remain monotonic within one registry.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - A data step runs in the same transaction as its SQL script.

use crate::db::{DbError, DbResult, StoreKind};
use log::{info, warn};
use rusqlite::{params, Connection, Transaction};
use uuid::Uuid;

type DataStep = fn(&Transaction<'_>) -> DbResult<()>;

#[derive(Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
    data_step: Option<DataStep>,
}

const SCHEMA_SQL: &str = include_str!("0001_schema.sql");
const DISPLAY_FLAGS_SQL: &str = include_str!("0004_block_display_flags.sql");
const USER_DOCS_SQL: &str = include_str!("0005_user_docs.sql");

const LIBRARY_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: SCHEMA_SQL,
        data_step: None,
    },
    Migration {
        version: 2,
        sql: include_str!("library/0002_books.sql"),
        data_step: None,
    },
    Migration {
        version: 3,
        sql: include_str!("library/0003_notes.sql"),
        data_step: None,
    },
    Migration {
        version: 4,
        sql: DISPLAY_FLAGS_SQL,
        data_step: None,
    },
    Migration {
        version: 5,
        sql: USER_DOCS_SQL,
        data_step: None,
    },
];

const BOOK_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: SCHEMA_SQL,
        data_step: None,
    },
    Migration {
        version: 2,
        sql: include_str!("book/0002_manuscript.sql"),
        data_step: None,
    },
    Migration {
        version: 3,
        sql: include_str!("book/0003_instances.sql"),
        data_step: None,
    },
    Migration {
        version: 4,
        sql: include_str!("book/0004_linked_instances.sql"),
        data_step: Some(backfill_linked_instances),
    },
    Migration {
        version: 5,
        sql: DISPLAY_FLAGS_SQL,
        data_step: None,
    },
    Migration {
        version: 6,
        sql: USER_DOCS_SQL,
        data_step: None,
    },
];

fn registry(store: StoreKind) -> &'static [Migration] {
    match store {
        StoreKind::Library => LIBRARY_MIGRATIONS,
        StoreKind::Book => BOOK_MIGRATIONS,
    }
}

/// Returns the latest migration version known by this binary for `store`.
pub fn latest_version(store: StoreKind) -> u32 {
    registry(store)
        .last()
        .map_or(0, |migration| migration.version)
}

/// Applies all pending migrations of `store` on the provided connection.
pub fn apply_migrations(conn: &mut Connection, store: StoreKind) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version(store);

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            store,
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in registry(store) {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        if let Some(step) = migration.data_step {
            step(&tx)?;
        }
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
        info!(
            "event=db_migrate module=db status=ok store={} version={}",
            store.as_str(),
            migration.version
        );
    }
    tx.commit()?;

    Ok(())
}

/// Reads `PRAGMA user_version` of an open connection.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Copies UUID-shaped `value`s of link parameters into `linked_instance_uuid`.
fn backfill_linked_instances(tx: &Transaction<'_>) -> DbResult<()> {
    let mut stmt = tx.prepare(
        "SELECT pi.uuid, pi.value
         FROM block_parameter_instances pi
         INNER JOIN block_parameters p ON p.uuid = pi.block_parameter_uuid
         WHERE p.data_type = 'block_link'
           AND pi.linked_instance_uuid IS NULL
           AND pi.value <> '';",
    )?;
    let candidates = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut linked = 0usize;
    let mut skipped = 0usize;
    for (param_instance_uuid, value) in candidates {
        match Uuid::parse_str(value.trim()) {
            Ok(target) => {
                tx.execute(
                    "UPDATE block_parameter_instances
                     SET linked_instance_uuid = ?2
                     WHERE uuid = ?1;",
                    params![param_instance_uuid, target.to_string()],
                )?;
                linked += 1;
            }
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(
            "event=db_migrate_backfill module=db status=partial linked={linked} skipped={skipped}"
        );
    } else {
        info!("event=db_migrate_backfill module=db status=ok linked={linked}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{latest_version, registry};
    use crate::db::StoreKind;

    #[test]
    fn registries_are_strictly_increasing() {
        for store in [StoreKind::Library, StoreKind::Book] {
            let versions: Vec<u32> = registry(store).iter().map(|m| m.version).collect();
            assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
            assert_eq!(versions.first(), Some(&1));
        }
    }

    #[test]
    fn latest_versions_match_registries() {
        assert_eq!(latest_version(StoreKind::Library), 4);
        assert_eq!(latest_version(StoreKind::Book), 5);
    }
}
