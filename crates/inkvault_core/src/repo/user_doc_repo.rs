//! Knowledge-base page persistence (both store kinds).
//!
//! # Responsibility
//! - Provide CRUD over `user_doc_pages`.
//!
//! # Invariants
//! - Deleting a page clears every block reference to it.
//! - Page mutations in a book store mark `book_info` as `local_changes`.

use crate::db::StoreKind;
use crate::model::user_doc::{UserDocPage, UserDocPageId};
use crate::repo::{
    ensure_connection_ready, optional_uuid_text, parse_optional_uuid, parse_uuid, row_exists,
    touch_store, RepoError, RepoResult, RequiredTable,
};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const PAGE_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    markdown,
    configuration_uuid,
    book_uuid
FROM user_doc_pages";

const REQUIRED_TABLES: &[RequiredTable] = &[
    RequiredTable {
        name: "user_doc_pages",
        columns: &["uuid", "title", "markdown", "configuration_uuid", "book_uuid"],
    },
    RequiredTable {
        name: "blocks",
        columns: &["uuid", "user_doc_page_uuid"],
    },
];

/// Repository interface for knowledge-base pages.
pub trait UserDocRepository {
    /// Inserts a new page or overwrites the stored one with the same UUID.
    fn save_page(&self, page: &UserDocPage) -> RepoResult<()>;
    fn get_page(&self, uuid: UserDocPageId) -> RepoResult<Option<UserDocPage>>;
    fn list_pages(&self) -> RepoResult<Vec<UserDocPage>>;
    fn list_pages_by_configuration(&self, configuration_uuid: Uuid)
        -> RepoResult<Vec<UserDocPage>>;
    fn delete_page(&self, uuid: UserDocPageId) -> RepoResult<()>;
}

/// SQLite-backed knowledge-base repository.
pub struct SqliteUserDocRepository<'conn> {
    conn: &'conn Connection,
    store: StoreKind,
}

impl<'conn> SqliteUserDocRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let store = ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn, store })
    }
}

impl UserDocRepository for SqliteUserDocRepository<'_> {
    fn save_page(&self, page: &UserDocPage) -> RepoResult<()> {
        page.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if row_exists(&tx, "user_doc_pages", page.uuid)? {
            tx.execute(
                "UPDATE user_doc_pages
                 SET title = ?2,
                     markdown = ?3,
                     configuration_uuid = ?4,
                     book_uuid = ?5,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1;",
                params![
                    page.uuid.to_string(),
                    page.title.trim(),
                    page.markdown.as_str(),
                    optional_uuid_text(page.configuration_uuid),
                    optional_uuid_text(page.book_uuid),
                ],
            )?;
        } else {
            insert_page_row(&tx, page)?;
        }
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn get_page(&self, uuid: UserDocPageId) -> RepoResult<Option<UserDocPage>> {
        Ok(query_pages(self.conn, Some(("uuid", uuid)))?.into_iter().next())
    }

    fn list_pages(&self) -> RepoResult<Vec<UserDocPage>> {
        query_pages(self.conn, None)
    }

    fn list_pages_by_configuration(
        &self,
        configuration_uuid: Uuid,
    ) -> RepoResult<Vec<UserDocPage>> {
        list_configuration_pages(self.conn, configuration_uuid)
    }

    fn delete_page(&self, uuid: UserDocPageId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "DELETE FROM user_doc_pages WHERE uuid = ?1;",
            [uuid.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "user doc page",
                uuid,
            });
        }
        tx.execute(
            "UPDATE blocks
             SET user_doc_page_uuid = NULL,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE user_doc_page_uuid = ?1;",
            [uuid.to_string()],
        )?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }
}

pub(crate) fn insert_page_row(conn: &Connection, page: &UserDocPage) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO user_doc_pages (uuid, title, markdown, configuration_uuid, book_uuid)
         VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            page.uuid.to_string(),
            page.title.trim(),
            page.markdown.as_str(),
            optional_uuid_text(page.configuration_uuid),
            optional_uuid_text(page.book_uuid),
        ],
    )?;
    Ok(())
}

pub(crate) fn list_configuration_pages(
    conn: &Connection,
    configuration_uuid: Uuid,
) -> RepoResult<Vec<UserDocPage>> {
    query_pages(conn, Some(("configuration_uuid", configuration_uuid)))
}

fn query_pages(conn: &Connection, filter: Option<(&str, Uuid)>) -> RepoResult<Vec<UserDocPage>> {
    let (sql, keys) = match filter {
        Some((column, key)) => (
            format!("{PAGE_SELECT_SQL} WHERE {column} = ?1 ORDER BY id ASC;"),
            vec![key.to_string()],
        ),
        None => (format!("{PAGE_SELECT_SQL} ORDER BY id ASC;"), Vec::new()),
    };
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(keys.iter()))?;
    let mut pages = Vec::new();
    while let Some(row) = rows.next()? {
        pages.push(parse_page_row(row)?);
    }
    Ok(pages)
}

fn parse_page_row(row: &Row<'_>) -> RepoResult<UserDocPage> {
    let uuid_text: String = row.get("uuid")?;
    Ok(UserDocPage {
        uuid: parse_uuid(&uuid_text, "user_doc_pages.uuid")?,
        title: row.get("title")?,
        markdown: row.get("markdown")?,
        configuration_uuid: parse_optional_uuid(
            row.get("configuration_uuid")?,
            "user_doc_pages.configuration_uuid",
        )?,
        book_uuid: parse_optional_uuid(row.get("book_uuid")?, "user_doc_pages.book_uuid")?,
    })
}
