//! Note and note-group repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist notes, the note-group folder tree and the notes sync meta row.
//!
//! # Invariants
//! - Every note/group mutation marks `notes_meta` as `local_changes`.
//! - Deleting a group never deletes notes: they become ungrouped and child
//!   groups move to the deleted group's parent.

use crate::model::manuscript::SyncState;
use crate::model::note::{Note, NoteGroup, NotesMeta};
use crate::repo::book_repo::parse_sync_state;
use crate::repo::{
    ensure_connection_ready, next_order_number, optional_uuid_text, parse_optional_uuid,
    parse_uuid, row_exists, RepoError, RepoResult, RequiredTable,
};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const NOTE_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    tags,
    body,
    order_number,
    note_group_uuid,
    book_uuid,
    updated_at
FROM notes";

const GROUP_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    order_number,
    parent_uuid,
    kind_code
FROM note_groups";

const REQUIRED_TABLES: &[RequiredTable] = &[
    RequiredTable {
        name: "notes",
        columns: &[
            "uuid",
            "title",
            "tags",
            "body",
            "order_number",
            "note_group_uuid",
            "book_uuid",
            "updated_at",
        ],
    },
    RequiredTable {
        name: "note_groups",
        columns: &["uuid", "title", "order_number", "parent_uuid", "kind_code"],
    },
    RequiredTable {
        name: "notes_meta",
        columns: &["local_updated_at", "server_updated_at", "sync_state"],
    },
];

/// Repository interface for notes and note groups.
pub trait NoteRepository {
    /// Inserts (appended to its group) or updates a note; bumps `updated_at`.
    fn save_note(&self, note: &Note) -> RepoResult<Note>;
    fn get_note(&self, uuid: Uuid) -> RepoResult<Option<Note>>;
    fn delete_note(&self, uuid: Uuid) -> RepoResult<()>;
    /// Notes of one group; `None` lists ungrouped notes.
    fn list_notes_by_group(&self, group_uuid: Option<Uuid>) -> RepoResult<Vec<Note>>;
    fn list_notes_by_book(&self, book_uuid: Uuid) -> RepoResult<Vec<Note>>;
    fn list_notes(&self) -> RepoResult<Vec<Note>>;
    fn count_notes(&self) -> RepoResult<i64>;

    fn create_group(&self, group: &NoteGroup) -> RepoResult<NoteGroup>;
    fn get_group(&self, uuid: Uuid) -> RepoResult<Option<NoteGroup>>;
    fn update_group(&self, group: &NoteGroup) -> RepoResult<()>;
    fn delete_group(&self, uuid: Uuid) -> RepoResult<()>;
    fn list_top_level_groups(&self) -> RepoResult<Vec<NoteGroup>>;
    fn list_child_groups(&self, parent_uuid: Uuid) -> RepoResult<Vec<NoteGroup>>;
    /// Case-insensitive title substring search.
    fn find_groups_by_title(&self, query: &str) -> RepoResult<Vec<NoteGroup>>;
    fn find_groups_by_kind(&self, kind_code: &str) -> RepoResult<Vec<NoteGroup>>;
    fn count_groups(&self) -> RepoResult<i64>;

    fn get_meta(&self) -> RepoResult<NotesMeta>;
    fn mark_local_change(&self) -> RepoResult<()>;
    fn mark_synced(&self, server_updated_at: i64) -> RepoResult<()>;
}

/// SQLite-backed notes repository (library store).
pub struct SqliteNoteRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNoteRepository<'conn> {
    /// Constructs a repository from a migrated/ready library connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl NoteRepository for SqliteNoteRepository<'_> {
    fn save_note(&self, note: &Note) -> RepoResult<Note> {
        note.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if row_exists(&tx, "notes", note.uuid)? {
            tx.execute(
                "UPDATE notes
                 SET title = ?2,
                     tags = ?3,
                     body = ?4,
                     order_number = ?5,
                     note_group_uuid = ?6,
                     book_uuid = ?7,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1;",
                params![
                    note.uuid.to_string(),
                    note.title.trim(),
                    note.tags.as_str(),
                    note.body.as_str(),
                    note.order_number,
                    optional_uuid_text(note.note_group_uuid),
                    optional_uuid_text(note.book_uuid),
                ],
            )?;
        } else {
            let order_number =
                next_order_number(&tx, "notes", "note_group_uuid", note.note_group_uuid)?;
            tx.execute(
                "INSERT INTO notes (
                    uuid,
                    title,
                    tags,
                    body,
                    order_number,
                    note_group_uuid,
                    book_uuid
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    note.uuid.to_string(),
                    note.title.trim(),
                    note.tags.as_str(),
                    note.body.as_str(),
                    order_number,
                    optional_uuid_text(note.note_group_uuid),
                    optional_uuid_text(note.book_uuid),
                ],
            )?;
        }
        mark_notes_changed(&tx)?;
        let saved = query_notes(&tx, "uuid = ?1", Some(note.uuid))?
            .into_iter()
            .next()
            .ok_or(RepoError::NotFound {
                entity: "note",
                uuid: note.uuid,
            })?;
        tx.commit()?;
        Ok(saved)
    }

    fn get_note(&self, uuid: Uuid) -> RepoResult<Option<Note>> {
        Ok(query_notes(self.conn, "uuid = ?1", Some(uuid))?
            .into_iter()
            .next())
    }

    fn delete_note(&self, uuid: Uuid) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM notes WHERE uuid = ?1;", [uuid.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "note",
                uuid,
            });
        }
        mark_notes_changed(self.conn)
    }

    fn list_notes_by_group(&self, group_uuid: Option<Uuid>) -> RepoResult<Vec<Note>> {
        match group_uuid {
            Some(group_uuid) => query_notes(self.conn, "note_group_uuid = ?1", Some(group_uuid)),
            None => query_notes(self.conn, "note_group_uuid IS NULL", None),
        }
    }

    fn list_notes_by_book(&self, book_uuid: Uuid) -> RepoResult<Vec<Note>> {
        query_notes(self.conn, "book_uuid = ?1", Some(book_uuid))
    }

    fn list_notes(&self) -> RepoResult<Vec<Note>> {
        query_notes(self.conn, "1 = 1", None)
    }

    fn count_notes(&self) -> RepoResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM notes;", [], |row| row.get(0))?;
        Ok(count)
    }

    fn create_group(&self, group: &NoteGroup) -> RepoResult<NoteGroup> {
        group.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let order_number: i64 =
            tx.query_row("SELECT COUNT(*) FROM note_groups;", [], |row| row.get(0))?;
        tx.execute(
            "INSERT INTO note_groups (uuid, title, order_number, parent_uuid, kind_code)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                group.uuid.to_string(),
                group.title.trim(),
                order_number,
                optional_uuid_text(group.parent_uuid),
                group.kind_code.as_str(),
            ],
        )?;
        mark_notes_changed(&tx)?;
        tx.commit()?;

        let mut created = group.clone();
        created.title = group.title.trim().to_string();
        created.order_number = order_number;
        Ok(created)
    }

    fn get_group(&self, uuid: Uuid) -> RepoResult<Option<NoteGroup>> {
        Ok(query_groups(self.conn, "uuid = ?1", Some(uuid.to_string()))?
            .into_iter()
            .next())
    }

    fn update_group(&self, group: &NoteGroup) -> RepoResult<()> {
        group.validate()?;
        let changed = self.conn.execute(
            "UPDATE note_groups
             SET title = ?2,
                 order_number = ?3,
                 parent_uuid = ?4,
                 kind_code = ?5
             WHERE uuid = ?1;",
            params![
                group.uuid.to_string(),
                group.title.trim(),
                group.order_number,
                optional_uuid_text(group.parent_uuid),
                group.kind_code.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "note group",
                uuid: group.uuid,
            });
        }
        mark_notes_changed(self.conn)
    }

    fn delete_group(&self, uuid: Uuid) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let group = query_groups(&tx, "uuid = ?1", Some(uuid.to_string()))?
            .into_iter()
            .next()
            .ok_or(RepoError::NotFound {
                entity: "note group",
                uuid,
            })?;
        let key = uuid.to_string();
        tx.execute(
            "UPDATE note_groups SET parent_uuid = ?2 WHERE parent_uuid = ?1;",
            params![key.as_str(), optional_uuid_text(group.parent_uuid)],
        )?;
        tx.execute(
            "UPDATE notes
             SET note_group_uuid = NULL,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE note_group_uuid = ?1;",
            [key.as_str()],
        )?;
        tx.execute("DELETE FROM note_groups WHERE uuid = ?1;", [key.as_str()])?;
        mark_notes_changed(&tx)?;
        tx.commit()?;
        Ok(())
    }

    fn list_top_level_groups(&self) -> RepoResult<Vec<NoteGroup>> {
        query_groups(self.conn, "parent_uuid IS NULL", None)
    }

    fn list_child_groups(&self, parent_uuid: Uuid) -> RepoResult<Vec<NoteGroup>> {
        query_groups(self.conn, "parent_uuid = ?1", Some(parent_uuid.to_string()))
    }

    fn find_groups_by_title(&self, query: &str) -> RepoResult<Vec<NoteGroup>> {
        let needle = query.trim().to_lowercase();
        let groups = query_groups(self.conn, "1 = 1", None)?;
        if needle.is_empty() {
            return Ok(groups);
        }
        Ok(groups
            .into_iter()
            .filter(|group| group.title.to_lowercase().contains(&needle))
            .collect())
    }

    fn find_groups_by_kind(&self, kind_code: &str) -> RepoResult<Vec<NoteGroup>> {
        query_groups(self.conn, "kind_code = ?1", Some(kind_code.to_string()))
    }

    fn count_groups(&self) -> RepoResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM note_groups;", [], |row| row.get(0))?;
        Ok(count)
    }

    fn get_meta(&self) -> RepoResult<NotesMeta> {
        let (local_updated_at, server_updated_at, state_text) = self.conn.query_row(
            "SELECT local_updated_at, server_updated_at, sync_state
             FROM notes_meta
             WHERE id = 1;",
            [],
            |row| {
                Ok((
                    row.get::<_, Option<i64>>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )?;
        Ok(NotesMeta {
            local_updated_at,
            server_updated_at,
            sync_state: parse_sync_state(&state_text, "notes_meta.sync_state")?,
        })
    }

    fn mark_local_change(&self) -> RepoResult<()> {
        mark_notes_changed(self.conn)
    }

    fn mark_synced(&self, server_updated_at: i64) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE notes_meta
             SET sync_state = ?1,
                 server_updated_at = ?2
             WHERE id = 1;",
            params![SyncState::Synced.as_str(), server_updated_at],
        )?;
        Ok(())
    }
}

fn mark_notes_changed(conn: &Connection) -> RepoResult<()> {
    conn.execute(
        "UPDATE notes_meta
         SET sync_state = ?1,
             local_updated_at = (strftime('%s', 'now') * 1000)
         WHERE id = 1;",
        [SyncState::LocalChanges.as_str()],
    )?;
    Ok(())
}

fn query_notes(conn: &Connection, filter: &str, key: Option<Uuid>) -> RepoResult<Vec<Note>> {
    let mut stmt = conn.prepare(&format!(
        "{NOTE_SELECT_SQL} WHERE {filter} ORDER BY order_number ASC, id ASC;"
    ))?;
    let mut rows = match key {
        Some(key) => stmt.query([key.to_string()])?,
        None => stmt.query([])?,
    };
    let mut notes = Vec::new();
    while let Some(row) = rows.next()? {
        notes.push(parse_note_row(row)?);
    }
    Ok(notes)
}

fn query_groups(
    conn: &Connection,
    filter: &str,
    key: Option<String>,
) -> RepoResult<Vec<NoteGroup>> {
    let mut stmt = conn.prepare(&format!(
        "{GROUP_SELECT_SQL} WHERE {filter} ORDER BY order_number ASC, id ASC;"
    ))?;
    let mut rows = match key {
        Some(key) => stmt.query([key])?,
        None => stmt.query([])?,
    };
    let mut groups = Vec::new();
    while let Some(row) = rows.next()? {
        groups.push(parse_group_row(row)?);
    }
    Ok(groups)
}

fn parse_note_row(row: &Row<'_>) -> RepoResult<Note> {
    let uuid_text: String = row.get("uuid")?;
    Ok(Note {
        uuid: parse_uuid(&uuid_text, "notes.uuid")?,
        title: row.get("title")?,
        tags: row.get("tags")?,
        body: row.get("body")?,
        order_number: row.get("order_number")?,
        note_group_uuid: parse_optional_uuid(row.get("note_group_uuid")?, "notes.note_group_uuid")?,
        book_uuid: parse_optional_uuid(row.get("book_uuid")?, "notes.book_uuid")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_group_row(row: &Row<'_>) -> RepoResult<NoteGroup> {
    let uuid_text: String = row.get("uuid")?;
    Ok(NoteGroup {
        uuid: parse_uuid(&uuid_text, "note_groups.uuid")?,
        title: row.get("title")?,
        order_number: row.get("order_number")?,
        parent_uuid: parse_optional_uuid(row.get("parent_uuid")?, "note_groups.parent_uuid")?,
        kind_code: row.get("kind_code")?,
    })
}
