//! Book catalog (library store) and book identity (book store) persistence.
//!
//! # Responsibility
//! - CRUD over the library `books` catalog and its sync state.
//! - Seed a fresh book store from a configuration snapshot.
//! - Read and update the book store's `book_info` sync row.
//!
//! # Invariants
//! - A book store is seeded at most once; seeding is one transaction.
//! - Seeded schema rows keep the UUIDs of the library configuration.
//! - Seeded knowledge-base pages keep their UUIDs and are tagged with the book.

use crate::model::manuscript::{Book, BookId, BookInfo, SyncState};
use crate::repo::instance_repo::ensure_lone_instance;
use crate::repo::parameter_repo::{
    insert_group_row, insert_parameter_row, insert_possible_value_row,
};
use crate::repo::schema_repo::{
    insert_block_row, insert_configuration_row, insert_relation_row, insert_tab_row,
    ConfigurationSnapshot,
};
use crate::repo::user_doc_repo::insert_page_row;
use crate::repo::{
    bool_to_int, ensure_connection_ready, int_to_bool, parse_uuid, row_exists, RepoError,
    RepoResult, RequiredTable,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const BOOK_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    author,
    form,
    genre,
    kind,
    description,
    configuration_uuid,
    configuration_title,
    cover,
    chapter_only_mode,
    use_simple_punctuation_checker,
    local_updated_at,
    server_updated_at,
    sync_state
FROM books";

const CATALOG_REQUIRED_TABLES: &[RequiredTable] = &[RequiredTable {
    name: "books",
    columns: &[
        "uuid",
        "title",
        "configuration_uuid",
        "chapter_only_mode",
        "local_updated_at",
        "server_updated_at",
        "sync_state",
    ],
}];

const STORE_REQUIRED_TABLES: &[RequiredTable] = &[
    RequiredTable {
        name: "book_info",
        columns: &[
            "book_uuid",
            "title",
            "configuration_uuid",
            "local_updated_at",
            "server_updated_at",
            "sync_state",
        ],
    },
    RequiredTable {
        name: "block_instances",
        columns: &["uuid", "block_uuid"],
    },
    RequiredTable {
        name: "user_doc_pages",
        columns: &["uuid", "book_uuid"],
    },
];

/// Repository interface for the library book catalog.
pub trait BookCatalogRepository {
    fn create_book(&self, book: &Book) -> RepoResult<BookId>;
    fn get_book(&self, uuid: BookId) -> RepoResult<Option<Book>>;
    fn list_books(&self) -> RepoResult<Vec<Book>>;
    fn update_book(&self, book: &Book) -> RepoResult<()>;
    fn delete_book(&self, uuid: BookId) -> RepoResult<()>;
    /// Sets the sync state; `local_changes` also refreshes `local_updated_at`.
    fn mark_sync_state(&self, uuid: BookId, state: SyncState) -> RepoResult<()>;
    fn configuration_exists(&self, uuid: Uuid) -> RepoResult<bool>;
}

/// Repository interface for the identity row of one book store.
pub trait BookStoreRepository {
    /// Copies a configuration snapshot into an empty book store and writes
    /// `book_info`. Returns the number of lone instances created.
    fn import_configuration(
        &self,
        snapshot: &ConfigurationSnapshot,
        info: &BookInfo,
    ) -> RepoResult<usize>;
    fn get_book_info(&self) -> RepoResult<Option<BookInfo>>;
    fn set_sync_state(&self, state: SyncState) -> RepoResult<()>;
    /// Marks the store as synced at the given server timestamp.
    fn mark_synced(&self, server_updated_at: i64) -> RepoResult<()>;
}

pub struct SqliteBookCatalogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBookCatalogRepository<'conn> {
    /// Constructs a repository from a migrated/ready library connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, CATALOG_REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl BookCatalogRepository for SqliteBookCatalogRepository<'_> {
    fn create_book(&self, book: &Book) -> RepoResult<BookId> {
        book.validate()?;
        self.conn.execute(
            "INSERT INTO books (
                uuid,
                title,
                author,
                form,
                genre,
                kind,
                description,
                configuration_uuid,
                configuration_title,
                cover,
                chapter_only_mode,
                use_simple_punctuation_checker,
                local_updated_at,
                server_updated_at,
                sync_state
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15);",
            params![
                book.uuid.to_string(),
                book.title.trim(),
                book.author.as_str(),
                book.form.as_str(),
                book.genre.as_str(),
                book.kind.as_deref(),
                book.description.as_deref(),
                book.configuration_uuid.to_string(),
                book.configuration_title.as_str(),
                book.cover.as_deref(),
                bool_to_int(book.chapter_only_mode),
                bool_to_int(book.use_simple_punctuation_checker),
                book.local_updated_at,
                book.server_updated_at,
                book.sync_state.as_str(),
            ],
        )?;
        Ok(book.uuid)
    }

    fn get_book(&self, uuid: BookId) -> RepoResult<Option<Book>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BOOK_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([uuid.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_book_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_books(&self) -> RepoResult<Vec<Book>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BOOK_SELECT_SQL} ORDER BY created_at ASC, id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut books = Vec::new();
        while let Some(row) = rows.next()? {
            books.push(parse_book_row(row)?);
        }
        Ok(books)
    }

    fn update_book(&self, book: &Book) -> RepoResult<()> {
        book.validate()?;
        let changed = self.conn.execute(
            "UPDATE books
             SET title = ?2,
                 author = ?3,
                 form = ?4,
                 genre = ?5,
                 kind = ?6,
                 description = ?7,
                 configuration_title = ?8,
                 cover = ?9,
                 chapter_only_mode = ?10,
                 use_simple_punctuation_checker = ?11,
                 local_updated_at = (strftime('%s', 'now') * 1000),
                 sync_state = 'local_changes',
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![
                book.uuid.to_string(),
                book.title.trim(),
                book.author.as_str(),
                book.form.as_str(),
                book.genre.as_str(),
                book.kind.as_deref(),
                book.description.as_deref(),
                book.configuration_title.as_str(),
                book.cover.as_deref(),
                bool_to_int(book.chapter_only_mode),
                bool_to_int(book.use_simple_punctuation_checker),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "book",
                uuid: book.uuid,
            });
        }
        Ok(())
    }

    fn delete_book(&self, uuid: BookId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM books WHERE uuid = ?1;", [uuid.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "book",
                uuid,
            });
        }
        Ok(())
    }

    fn mark_sync_state(&self, uuid: BookId, state: SyncState) -> RepoResult<()> {
        let changed = match state {
            SyncState::LocalChanges => self.conn.execute(
                "UPDATE books
                 SET sync_state = ?2,
                     local_updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1;",
                params![uuid.to_string(), state.as_str()],
            )?,
            SyncState::ServerChanges | SyncState::Synced => self.conn.execute(
                "UPDATE books SET sync_state = ?2 WHERE uuid = ?1;",
                params![uuid.to_string(), state.as_str()],
            )?,
        };
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "book",
                uuid,
            });
        }
        Ok(())
    }

    fn configuration_exists(&self, uuid: Uuid) -> RepoResult<bool> {
        row_exists(self.conn, "book_configurations", uuid)
    }
}

pub struct SqliteBookStoreRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBookStoreRepository<'conn> {
    /// Constructs a repository from a migrated/ready book connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, STORE_REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl BookStoreRepository for SqliteBookStoreRepository<'_> {
    fn import_configuration(
        &self,
        snapshot: &ConfigurationSnapshot,
        info: &BookInfo,
    ) -> RepoResult<usize> {
        snapshot.configuration.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let seeded: i64 = tx.query_row(
            "SELECT (SELECT COUNT(*) FROM book_info) + (SELECT COUNT(*) FROM book_configurations);",
            [],
            |row| row.get(0),
        )?;
        if seeded > 0 {
            return Err(RepoError::InvalidData(
                "book store is already initialized".to_string(),
            ));
        }

        insert_configuration_row(&tx, &snapshot.configuration)?;
        for block in &snapshot.blocks {
            block.validate()?;
            insert_block_row(&tx, block)?;
        }
        for group in &snapshot.parameter_groups {
            insert_group_row(&tx, group)?;
        }
        for parameter in &snapshot.parameters {
            insert_parameter_row(&tx, parameter)?;
        }
        for value in &snapshot.possible_values {
            insert_possible_value_row(&tx, value)?;
        }
        for relation in &snapshot.relations {
            insert_relation_row(&tx, relation)?;
        }
        for tab in &snapshot.tabs {
            insert_tab_row(&tx, tab)?;
        }
        for page in &snapshot.user_doc_pages {
            let mut page = page.clone();
            page.book_uuid = Some(info.book_uuid);
            insert_page_row(&tx, &page)?;
        }

        tx.execute(
            "INSERT INTO book_info (
                id,
                book_uuid,
                title,
                configuration_uuid,
                local_updated_at,
                server_updated_at,
                sync_state
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                info.book_uuid.to_string(),
                info.title.trim(),
                info.configuration_uuid.to_string(),
                info.local_updated_at,
                info.server_updated_at,
                info.sync_state.as_str(),
            ],
        )?;

        let mut lone_instances = 0;
        for block in &snapshot.blocks {
            if ensure_lone_instance(&tx, block)?.is_some() {
                lone_instances += 1;
            }
        }
        tx.commit()?;
        Ok(lone_instances)
    }

    fn get_book_info(&self) -> RepoResult<Option<BookInfo>> {
        let info = self
            .conn
            .query_row(
                "SELECT
                    book_uuid,
                    title,
                    configuration_uuid,
                    local_updated_at,
                    server_updated_at,
                    sync_state
                 FROM book_info
                 WHERE id = 1;",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>("book_uuid")?,
                        row.get::<_, String>("title")?,
                        row.get::<_, String>("configuration_uuid")?,
                        row.get::<_, Option<i64>>("local_updated_at")?,
                        row.get::<_, Option<i64>>("server_updated_at")?,
                        row.get::<_, String>("sync_state")?,
                    ))
                },
            )
            .optional()?;
        let Some((book_text, title, configuration_text, local, server, state_text)) = info else {
            return Ok(None);
        };
        Ok(Some(BookInfo {
            book_uuid: parse_uuid(&book_text, "book_info.book_uuid")?,
            title,
            configuration_uuid: parse_uuid(&configuration_text, "book_info.configuration_uuid")?,
            local_updated_at: local,
            server_updated_at: server,
            sync_state: parse_sync_state(&state_text, "book_info.sync_state")?,
        }))
    }

    fn set_sync_state(&self, state: SyncState) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE book_info SET sync_state = ?1 WHERE id = 1;",
            [state.as_str()],
        )?;
        if changed == 0 {
            return Err(RepoError::InvalidData(
                "book store is not initialized".to_string(),
            ));
        }
        Ok(())
    }

    fn mark_synced(&self, server_updated_at: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE book_info
             SET sync_state = 'synced',
                 server_updated_at = ?1
             WHERE id = 1;",
            [server_updated_at],
        )?;
        if changed == 0 {
            return Err(RepoError::InvalidData(
                "book store is not initialized".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn parse_sync_state(value: &str, column: &'static str) -> RepoResult<SyncState> {
    SyncState::parse(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid sync state `{value}` in {column}"))
    })
}

fn parse_book_row(row: &Row<'_>) -> RepoResult<Book> {
    let uuid_text: String = row.get("uuid")?;
    let configuration_text: String = row.get("configuration_uuid")?;
    let state_text: String = row.get("sync_state")?;
    Ok(Book {
        uuid: parse_uuid(&uuid_text, "books.uuid")?,
        title: row.get("title")?,
        author: row.get("author")?,
        form: row.get("form")?,
        genre: row.get("genre")?,
        kind: row.get("kind")?,
        description: row.get("description")?,
        configuration_uuid: parse_uuid(&configuration_text, "books.configuration_uuid")?,
        configuration_title: row.get("configuration_title")?,
        cover: row.get("cover")?,
        chapter_only_mode: int_to_bool(row.get("chapter_only_mode")?, "books.chapter_only_mode")?,
        use_simple_punctuation_checker: int_to_bool(
            row.get("use_simple_punctuation_checker")?,
            "books.use_simple_punctuation_checker",
        )?,
        local_updated_at: row.get("local_updated_at")?,
        server_updated_at: row.get("server_updated_at")?,
        sync_state: parse_sync_state(&state_text, "books.sync_state")?,
    })
}
