use inkvault_core::db::migrations::latest_version;
use inkvault_core::db::{
    open_book_db, open_book_db_in_memory, open_library_db, open_library_db_in_memory, DbError,
    StoreKind,
};
use inkvault_core::repo::detect_store;
use rusqlite::{params, Connection};

#[test]
fn library_in_memory_applies_all_migrations() {
    let conn = open_library_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version(StoreKind::Library));
    for table in [
        "book_configurations",
        "blocks",
        "block_parameters",
        "block_tabs",
        "books",
        "notes",
        "note_groups",
        "notes_meta",
        "user_doc_pages",
    ] {
        assert_table_exists(&conn, table);
    }
    assert_table_missing(&conn, "block_instances");
    assert_eq!(detect_store(&conn).unwrap(), StoreKind::Library);
}

#[test]
fn book_in_memory_applies_all_migrations() {
    let conn = open_book_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version(StoreKind::Book));
    for table in [
        "blocks",
        "book_info",
        "chapters",
        "scenes",
        "scene_bodies",
        "block_instances",
        "block_parameter_instances",
        "instance_scene_links",
        "user_doc_pages",
    ] {
        assert_table_exists(&conn, table);
    }
    assert_table_missing(&conn, "notes");
    assert_eq!(detect_store(&conn).unwrap(), StoreKind::Book);
}

#[test]
fn reopening_book_file_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.db");

    let first = open_book_db(&path).unwrap();
    assert_eq!(schema_version(&first), 6);
    drop(first);

    let second = open_book_db(&path).unwrap();
    assert_eq!(schema_version(&second), 6);
    assert_table_exists(&second, "scenes");
}

#[test]
fn newer_library_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 42;").unwrap();
    drop(conn);

    match open_library_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            store,
            db_version,
            latest_supported,
        } => {
            assert_eq!(store, StoreKind::Library);
            assert_eq!(db_version, 42);
            assert_eq!(latest_supported, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn upgrading_book_store_backfills_link_targets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");
    let target = "6f1c1a52-7a0d-4d8e-9a51-3d2b0f1e9c44";

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/0001_schema.sql"))
        .unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/book/0002_manuscript.sql"))
        .unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/book/0003_instances.sql"))
        .unwrap();
    conn.execute(
        "INSERT INTO block_parameters (uuid, block_uuid, group_uuid, title, data_type, linked_block_uuid)
         VALUES ('p-link', 'b-1', 'g-1', 'Home', 'block_link', 'b-2'),
                ('p-text', 'b-1', 'g-1', 'Nick', 'string', NULL);",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO block_parameter_instances
            (uuid, block_instance_uuid, block_parameter_uuid, block_parameter_group_uuid, value)
         VALUES ('v-ok', 'i-1', 'p-link', 'g-1', ?1),
                ('v-bad', 'i-2', 'p-link', 'g-1', 'not a uuid'),
                ('v-text', 'i-1', 'p-text', 'g-1', ?1);",
        params![target],
    )
    .unwrap();
    conn.execute_batch("PRAGMA user_version = 3;").unwrap();
    drop(conn);

    let conn = open_book_db(&path).unwrap();
    assert_eq!(schema_version(&conn), 6);
    assert_eq!(linked_instance(&conn, "v-ok").as_deref(), Some(target));
    assert_eq!(linked_instance(&conn, "v-bad"), None);
    assert_eq!(linked_instance(&conn, "v-text"), None);

    let tree_view_columns: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('blocks') WHERE name = 'tree_view';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tree_view_columns, 1);
    let page_columns: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('blocks') WHERE name = 'user_doc_page_uuid';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(page_columns, 1);
}

fn linked_instance(conn: &Connection, uuid: &str) -> Option<String> {
    conn.query_row(
        "SELECT linked_instance_uuid FROM block_parameter_instances WHERE uuid = ?1;",
        [uuid],
        |row| row.get(0),
    )
    .unwrap()
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn table_count(conn: &Connection, table_name: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1;",
        [table_name],
        |row| row.get(0),
    )
    .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    assert_eq!(table_count(conn, table_name), 1, "table {table_name} does not exist");
}

fn assert_table_missing(conn: &Connection, table_name: &str) {
    assert_eq!(table_count(conn, table_name), 0, "table {table_name} should not exist");
}
