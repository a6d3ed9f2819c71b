//! Chapter and scene persistence (book store).
//!
//! # Responsibility
//! - Persist chapters, scenes and scene bodies.
//! - Keep symbol counts in sync with bodies.
//! - Recalculate the global scene order.
//!
//! # Invariants
//! - After any create/move/delete, scene order numbers are `1..=n`:
//!   chapters in their order first, then chapterless scenes.
//! - A scene body row exists for every scene.

use crate::db::StoreKind;
use crate::model::manuscript::{Chapter, ChapterId, Scene, SceneBody, SceneId, SymbolCounts};
use crate::model::require_text;
use crate::repo::{
    ensure_connection_ready, optional_uuid_text, parse_optional_uuid, parse_uuid, row_exists,
    touch_store, MoveDirection, RepoError, RepoResult, RequiredTable,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const CHAPTER_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    order_number,
    content_scene_uuid
FROM chapters";

const SCENE_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    order_number,
    chapter_uuid,
    symbol_count_with_spaces,
    symbol_count_without_spaces
FROM scenes";

const REQUIRED_TABLES: &[RequiredTable] = &[
    RequiredTable {
        name: "chapters",
        columns: &["uuid", "title", "order_number", "content_scene_uuid"],
    },
    RequiredTable {
        name: "scenes",
        columns: &[
            "uuid",
            "title",
            "order_number",
            "chapter_uuid",
            "symbol_count_with_spaces",
            "symbol_count_without_spaces",
        ],
    },
    RequiredTable {
        name: "scene_bodies",
        columns: &["scene_uuid", "body"],
    },
    RequiredTable {
        name: "instance_scene_links",
        columns: &["scene_uuid"],
    },
];

/// Repository interface for manuscript structure.
pub trait ManuscriptRepository {
    /// Inserts a chapter at the end of the chapter list.
    fn create_chapter(&self, chapter: &Chapter) -> RepoResult<Chapter>;
    fn get_chapter(&self, uuid: ChapterId) -> RepoResult<Option<Chapter>>;
    fn list_chapters(&self) -> RepoResult<Vec<Chapter>>;
    /// Updates title and content scene.
    fn update_chapter(&self, chapter: &Chapter) -> RepoResult<()>;
    /// Deletes a chapter; its scenes become chapterless.
    fn delete_chapter(&self, uuid: ChapterId) -> RepoResult<()>;
    fn move_chapter(&self, uuid: ChapterId, direction: MoveDirection) -> RepoResult<bool>;

    /// Inserts a scene with its body at the end of its chapter.
    fn create_scene(&self, scene: &Scene, body: &str) -> RepoResult<Scene>;
    fn get_scene(&self, uuid: SceneId) -> RepoResult<Option<Scene>>;
    fn get_scene_body(&self, uuid: SceneId) -> RepoResult<Option<SceneBody>>;
    /// All scenes in global order.
    fn list_scenes(&self) -> RepoResult<Vec<Scene>>;
    fn list_scenes_by_chapter(&self, chapter_uuid: ChapterId) -> RepoResult<Vec<Scene>>;
    fn rename_scene(&self, uuid: SceneId, title: &str) -> RepoResult<()>;
    /// Replaces the body and returns the recomputed counts.
    fn update_scene_body(&self, uuid: SceneId, body: &str) -> RepoResult<SymbolCounts>;
    fn delete_scene(&self, uuid: SceneId) -> RepoResult<()>;
    /// Moves a scene to the end of `chapter_uuid` (or of the chapterless tail).
    fn move_scene_to_chapter(&self, uuid: SceneId, chapter_uuid: Option<ChapterId>)
        -> RepoResult<()>;
    fn swap_scenes(&self, first: SceneId, second: SceneId) -> RepoResult<()>;
    /// Case-insensitive title substring search.
    fn find_scenes_by_title(&self, query: &str) -> RepoResult<Vec<Scene>>;
    fn recalculate_scene_order(&self) -> RepoResult<()>;
    fn count_scenes(&self) -> RepoResult<i64>;
}

/// SQLite-backed manuscript repository.
pub struct SqliteManuscriptRepository<'conn> {
    conn: &'conn Connection,
    store: StoreKind,
}

impl<'conn> SqliteManuscriptRepository<'conn> {
    /// Constructs a repository from a migrated/ready book connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let store = ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn, store })
    }
}

impl ManuscriptRepository for SqliteManuscriptRepository<'_> {
    fn create_chapter(&self, chapter: &Chapter) -> RepoResult<Chapter> {
        chapter.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let order_number: i64 = tx.query_row(
            "SELECT COALESCE(MAX(order_number), -1) + 1 FROM chapters;",
            [],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO chapters (uuid, title, order_number, content_scene_uuid)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                chapter.uuid.to_string(),
                chapter.title.trim(),
                order_number,
                optional_uuid_text(chapter.content_scene_uuid),
            ],
        )?;
        touch_store(&tx, self.store)?;
        tx.commit()?;

        let mut created = chapter.clone();
        created.title = chapter.title.trim().to_string();
        created.order_number = order_number;
        Ok(created)
    }

    fn get_chapter(&self, uuid: ChapterId) -> RepoResult<Option<Chapter>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CHAPTER_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([uuid.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_chapter_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_chapters(&self) -> RepoResult<Vec<Chapter>> {
        list_chapters(self.conn)
    }

    fn update_chapter(&self, chapter: &Chapter) -> RepoResult<()> {
        chapter.validate()?;
        let changed = self.conn.execute(
            "UPDATE chapters
             SET title = ?2,
                 content_scene_uuid = ?3
             WHERE uuid = ?1;",
            params![
                chapter.uuid.to_string(),
                chapter.title.trim(),
                optional_uuid_text(chapter.content_scene_uuid),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "chapter",
                uuid: chapter.uuid,
            });
        }
        touch_store(self.conn, self.store)
    }

    fn delete_chapter(&self, uuid: ChapterId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !row_exists(&tx, "chapters", uuid)? {
            return Err(RepoError::NotFound {
                entity: "chapter",
                uuid,
            });
        }
        tx.execute(
            "UPDATE scenes
             SET chapter_uuid = NULL,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE chapter_uuid = ?1;",
            [uuid.to_string()],
        )?;
        tx.execute("DELETE FROM chapters WHERE uuid = ?1;", [uuid.to_string()])?;
        let remaining = chapter_ids(&tx)?;
        write_chapter_order(&tx, &remaining)?;
        recalculate_scene_order(&tx)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn move_chapter(&self, uuid: ChapterId, direction: MoveDirection) -> RepoResult<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut ids = chapter_ids(&tx)?;
        let Some(index) = ids.iter().position(|id| *id == uuid) else {
            return Err(RepoError::NotFound {
                entity: "chapter",
                uuid,
            });
        };
        let neighbour = match direction {
            MoveDirection::Up if index > 0 => index - 1,
            MoveDirection::Down if index + 1 < ids.len() => index + 1,
            _ => return Ok(false),
        };
        ids.swap(index, neighbour);
        write_chapter_order(&tx, &ids)?;
        recalculate_scene_order(&tx)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(true)
    }

    fn create_scene(&self, scene: &Scene, body: &str) -> RepoResult<Scene> {
        scene.validate()?;
        let counts = SymbolCounts::of(body);
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let order_number = next_scene_order(&tx)?;
        tx.execute(
            "INSERT INTO scenes (
                uuid,
                title,
                order_number,
                chapter_uuid,
                symbol_count_with_spaces,
                symbol_count_without_spaces
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                scene.uuid.to_string(),
                scene.title.trim(),
                order_number,
                optional_uuid_text(scene.chapter_uuid),
                counts.with_spaces,
                counts.without_spaces,
            ],
        )?;
        tx.execute(
            "INSERT INTO scene_bodies (scene_uuid, body) VALUES (?1, ?2);",
            params![scene.uuid.to_string(), body],
        )?;
        recalculate_scene_order(&tx)?;
        let created = get_scene(&tx, scene.uuid)?.ok_or(RepoError::NotFound {
            entity: "scene",
            uuid: scene.uuid,
        })?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(created)
    }

    fn get_scene(&self, uuid: SceneId) -> RepoResult<Option<Scene>> {
        get_scene(self.conn, uuid)
    }

    fn get_scene_body(&self, uuid: SceneId) -> RepoResult<Option<SceneBody>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM scene_bodies WHERE scene_uuid = ?1;",
                [uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body.map(|body| SceneBody {
            scene_uuid: uuid,
            body,
        }))
    }

    fn list_scenes(&self) -> RepoResult<Vec<Scene>> {
        query_scenes(self.conn, None)
    }

    fn list_scenes_by_chapter(&self, chapter_uuid: ChapterId) -> RepoResult<Vec<Scene>> {
        query_scenes(self.conn, Some(chapter_uuid))
    }

    fn rename_scene(&self, uuid: SceneId, title: &str) -> RepoResult<()> {
        require_text("scene title", title)?;
        let changed = self.conn.execute(
            "UPDATE scenes
             SET title = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![uuid.to_string(), title.trim()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "scene",
                uuid,
            });
        }
        touch_store(self.conn, self.store)
    }

    fn update_scene_body(&self, uuid: SceneId, body: &str) -> RepoResult<SymbolCounts> {
        let counts = SymbolCounts::of(body);
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE scenes
             SET symbol_count_with_spaces = ?2,
                 symbol_count_without_spaces = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![uuid.to_string(), counts.with_spaces, counts.without_spaces],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "scene",
                uuid,
            });
        }
        tx.execute(
            "INSERT INTO scene_bodies (scene_uuid, body) VALUES (?1, ?2)
             ON CONFLICT(scene_uuid) DO UPDATE SET body = excluded.body;",
            params![uuid.to_string(), body],
        )?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(counts)
    }

    fn delete_scene(&self, uuid: SceneId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !row_exists(&tx, "scenes", uuid)? {
            return Err(RepoError::NotFound {
                entity: "scene",
                uuid,
            });
        }
        let key = uuid.to_string();
        tx.execute(
            "DELETE FROM instance_scene_links WHERE scene_uuid = ?1;",
            [key.as_str()],
        )?;
        tx.execute(
            "UPDATE chapters SET content_scene_uuid = NULL WHERE content_scene_uuid = ?1;",
            [key.as_str()],
        )?;
        tx.execute(
            "DELETE FROM scene_bodies WHERE scene_uuid = ?1;",
            [key.as_str()],
        )?;
        tx.execute("DELETE FROM scenes WHERE uuid = ?1;", [key.as_str()])?;
        recalculate_scene_order(&tx)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn move_scene_to_chapter(
        &self,
        uuid: SceneId,
        chapter_uuid: Option<ChapterId>,
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let order_number = next_scene_order(&tx)?;
        let changed = tx.execute(
            "UPDATE scenes
             SET chapter_uuid = ?2,
                 order_number = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![uuid.to_string(), optional_uuid_text(chapter_uuid), order_number],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "scene",
                uuid,
            });
        }
        recalculate_scene_order(&tx)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn swap_scenes(&self, first: SceneId, second: SceneId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let first_scene = get_scene(&tx, first)?.ok_or(RepoError::NotFound {
            entity: "scene",
            uuid: first,
        })?;
        let second_scene = get_scene(&tx, second)?.ok_or(RepoError::NotFound {
            entity: "scene",
            uuid: second,
        })?;
        for (uuid, order_number) in [
            (first, second_scene.order_number),
            (second, first_scene.order_number),
        ] {
            tx.execute(
                "UPDATE scenes
                 SET order_number = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1;",
                params![uuid.to_string(), order_number],
            )?;
        }
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn find_scenes_by_title(&self, query: &str) -> RepoResult<Vec<Scene>> {
        let needle = query.trim().to_lowercase();
        let scenes = query_scenes(self.conn, None)?;
        if needle.is_empty() {
            return Ok(scenes);
        }
        Ok(scenes
            .into_iter()
            .filter(|scene| scene.title.to_lowercase().contains(&needle))
            .collect())
    }

    fn recalculate_scene_order(&self) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        recalculate_scene_order(&tx)?;
        tx.commit()?;
        Ok(())
    }

    fn count_scenes(&self) -> RepoResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM scenes;", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Renumbers every scene from 1: chapters in order first, then chapterless
/// scenes. Relative order inside each chapter is kept.
pub(crate) fn recalculate_scene_order(conn: &Connection) -> RepoResult<()> {
    let mut ordered = Vec::new();
    for chapter in chapter_ids(conn)? {
        ordered.extend(scene_ids(conn, Some(chapter))?);
    }
    ordered.extend(scene_ids(conn, None)?);

    for (index, uuid) in ordered.into_iter().enumerate() {
        conn.execute(
            "UPDATE scenes SET order_number = ?2 WHERE uuid = ?1;",
            params![uuid.to_string(), index as i64 + 1],
        )?;
    }
    Ok(())
}

fn next_scene_order(conn: &Connection) -> RepoResult<i64> {
    let next = conn.query_row(
        "SELECT COALESCE(MAX(order_number), 0) + 1 FROM scenes;",
        [],
        |row| row.get(0),
    )?;
    Ok(next)
}

fn chapter_ids(conn: &Connection) -> RepoResult<Vec<ChapterId>> {
    let mut stmt = conn.prepare("SELECT uuid FROM chapters ORDER BY order_number ASC, id ASC;")?;
    let mut rows = stmt.query([])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, "chapters.uuid")?);
    }
    Ok(ids)
}

fn write_chapter_order(conn: &Connection, ids: &[ChapterId]) -> RepoResult<()> {
    for (index, uuid) in ids.iter().enumerate() {
        conn.execute(
            "UPDATE chapters SET order_number = ?2 WHERE uuid = ?1;",
            params![uuid.to_string(), index as i64],
        )?;
    }
    Ok(())
}

/// Scene ids of one chapter (or chapterless when `None`), in stored order.
fn scene_ids(conn: &Connection, chapter_uuid: Option<ChapterId>) -> RepoResult<Vec<SceneId>> {
    let filter = if chapter_uuid.is_some() {
        "chapter_uuid = ?1"
    } else {
        "chapter_uuid IS NULL"
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT uuid FROM scenes WHERE {filter} ORDER BY order_number ASC, id ASC;"
    ))?;
    let mut rows = match chapter_uuid {
        Some(chapter_uuid) => stmt.query([chapter_uuid.to_string()])?,
        None => stmt.query([])?,
    };
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, "scenes.uuid")?);
    }
    Ok(ids)
}

fn list_chapters(conn: &Connection) -> RepoResult<Vec<Chapter>> {
    let mut stmt = conn.prepare(&format!(
        "{CHAPTER_SELECT_SQL} ORDER BY order_number ASC, id ASC;"
    ))?;
    let mut rows = stmt.query([])?;
    let mut chapters = Vec::new();
    while let Some(row) = rows.next()? {
        chapters.push(parse_chapter_row(row)?);
    }
    Ok(chapters)
}

pub(crate) fn get_scene(conn: &Connection, uuid: SceneId) -> RepoResult<Option<Scene>> {
    let mut stmt = conn.prepare(&format!("{SCENE_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([uuid.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_scene_row(row)?)),
        None => Ok(None),
    }
}

/// `None` lists every scene in global order; `Some` lists one chapter.
fn query_scenes(conn: &Connection, chapter_uuid: Option<ChapterId>) -> RepoResult<Vec<Scene>> {
    let mut scenes = Vec::new();
    let mut stmt;
    let mut rows = match chapter_uuid {
        Some(chapter_uuid) => {
            stmt = conn.prepare(&format!(
                "{SCENE_SELECT_SQL}
                 WHERE chapter_uuid = ?1
                 ORDER BY order_number ASC, id ASC;"
            ))?;
            stmt.query([chapter_uuid.to_string()])?
        }
        None => {
            stmt = conn.prepare(&format!(
                "{SCENE_SELECT_SQL} ORDER BY order_number ASC, id ASC;"
            ))?;
            stmt.query([])?
        }
    };
    while let Some(row) = rows.next()? {
        scenes.push(parse_scene_row(row)?);
    }
    Ok(scenes)
}

fn parse_chapter_row(row: &Row<'_>) -> RepoResult<Chapter> {
    let uuid_text: String = row.get("uuid")?;
    Ok(Chapter {
        uuid: parse_uuid(&uuid_text, "chapters.uuid")?,
        title: row.get("title")?,
        order_number: row.get("order_number")?,
        content_scene_uuid: parse_optional_uuid(
            row.get("content_scene_uuid")?,
            "chapters.content_scene_uuid",
        )?,
    })
}

fn parse_scene_row(row: &Row<'_>) -> RepoResult<Scene> {
    let uuid_text: String = row.get("uuid")?;
    Ok(Scene {
        uuid: parse_uuid(&uuid_text, "scenes.uuid")?,
        title: row.get("title")?,
        order_number: row.get("order_number")?,
        chapter_uuid: parse_optional_uuid(row.get("chapter_uuid")?, "scenes.chapter_uuid")?,
        symbol_count_with_spaces: row.get("symbol_count_with_spaces")?,
        symbol_count_without_spaces: row.get("symbol_count_without_spaces")?,
    })
}
