//! Note use-case service (library store).
//!
//! # Responsibility
//! - Provide note and note-group operations with existence checks.
//! - Normalize note tags before persistence.
//! - Keep the note-group tree acyclic.
//!
//! # Invariants
//! - Notes reference an existing group or none.
//! - A group is never moved under itself or one of its descendants.
//! - Tags are stored lowercase, deduplicated and comma separated.

use crate::model::note::{Note, NoteGroup, NotesMeta};
use crate::repo::note_repo::NoteRepository;
use crate::repo::RepoError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static TAG_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,;]").expect("valid tag separator regex"));
static INNER_SPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid tag whitespace regex"));

/// Service error for note use-cases.
#[derive(Debug)]
pub enum NoteServiceError {
    NoteNotFound(Uuid),
    GroupNotFound(Uuid),
    /// Move would put a group under itself or a descendant.
    CycleDetected {
        group_uuid: Uuid,
        parent_uuid: Uuid,
    },
    Repo(RepoError),
}

impl Display for NoteServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::GroupNotFound(id) => write!(f, "note group not found: {id}"),
            Self::CycleDetected {
                group_uuid,
                parent_uuid,
            } => write!(
                f,
                "move would create cycle: group {group_uuid} under parent {parent_uuid}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for NoteServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for NoteServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: "note",
                uuid,
            } => Self::NoteNotFound(uuid),
            RepoError::NotFound {
                entity: "note group",
                uuid,
            } => Self::GroupNotFound(uuid),
            other => Self::Repo(other),
        }
    }
}

pub type NoteServiceResult<T> = Result<T, NoteServiceError>;

/// Note service facade.
pub struct NoteService<R: NoteRepository> {
    repo: R,
}

impl<R: NoteRepository> NoteService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates an empty note, optionally in a group and tied to a book.
    pub fn create_note(
        &self,
        title: impl Into<String>,
        note_group_uuid: Option<Uuid>,
        book_uuid: Option<Uuid>,
    ) -> NoteServiceResult<Note> {
        let mut note = Note::new(title);
        note.note_group_uuid = note_group_uuid;
        note.book_uuid = book_uuid;
        self.save_note(&note)
    }

    /// Creates or updates a note; `updated_at` is refreshed by storage.
    pub fn save_note(&self, note: &Note) -> NoteServiceResult<Note> {
        if let Some(group_uuid) = note.note_group_uuid {
            self.require_group(group_uuid)?;
        }
        let mut normalized = note.clone();
        normalized.tags = normalize_tags(&note.tags);
        Ok(self.repo.save_note(&normalized)?)
    }

    pub fn get_note(&self, uuid: Uuid) -> NoteServiceResult<Option<Note>> {
        Ok(self.repo.get_note(uuid)?)
    }

    pub fn delete_note(&self, uuid: Uuid) -> NoteServiceResult<()> {
        Ok(self.repo.delete_note(uuid)?)
    }

    /// Notes of a group; `None` lists ungrouped notes.
    pub fn list_notes_by_group(&self, group_uuid: Option<Uuid>) -> NoteServiceResult<Vec<Note>> {
        Ok(self.repo.list_notes_by_group(group_uuid)?)
    }

    pub fn list_notes_by_book(&self, book_uuid: Uuid) -> NoteServiceResult<Vec<Note>> {
        Ok(self.repo.list_notes_by_book(book_uuid)?)
    }

    pub fn list_notes(&self) -> NoteServiceResult<Vec<Note>> {
        Ok(self.repo.list_notes()?)
    }

    pub fn count_notes(&self) -> NoteServiceResult<i64> {
        Ok(self.repo.count_notes()?)
    }

    /// Creates a `user_group` group, top level when `parent_uuid` is `None`.
    pub fn create_group(
        &self,
        title: impl Into<String>,
        parent_uuid: Option<Uuid>,
    ) -> NoteServiceResult<NoteGroup> {
        if let Some(parent_uuid) = parent_uuid {
            self.require_group(parent_uuid)?;
        }
        Ok(self.repo.create_group(&NoteGroup::new(title, parent_uuid))?)
    }

    pub fn get_group(&self, uuid: Uuid) -> NoteServiceResult<Option<NoteGroup>> {
        Ok(self.repo.get_group(uuid)?)
    }

    /// Updates a group; a parent change is checked for cycles.
    pub fn update_group(&self, group: &NoteGroup) -> NoteServiceResult<()> {
        let stored = self.require_group(group.uuid)?;
        if let Some(parent_uuid) = group.parent_uuid {
            if stored.parent_uuid != Some(parent_uuid) {
                self.ensure_no_cycle(group.uuid, parent_uuid)?;
            }
        }
        Ok(self.repo.update_group(group)?)
    }

    pub fn rename_group(&self, uuid: Uuid, title: impl Into<String>) -> NoteServiceResult<()> {
        let mut group = self.require_group(uuid)?;
        group.title = title.into();
        Ok(self.repo.update_group(&group)?)
    }

    pub fn move_group(&self, uuid: Uuid, parent_uuid: Option<Uuid>) -> NoteServiceResult<()> {
        let mut group = self.require_group(uuid)?;
        if let Some(parent_uuid) = parent_uuid {
            self.ensure_no_cycle(uuid, parent_uuid)?;
        }
        group.parent_uuid = parent_uuid;
        Ok(self.repo.update_group(&group)?)
    }

    /// Deletes a group; child groups move up, notes become ungrouped.
    pub fn delete_group(&self, uuid: Uuid) -> NoteServiceResult<()> {
        Ok(self.repo.delete_group(uuid)?)
    }

    pub fn list_top_level_groups(&self) -> NoteServiceResult<Vec<NoteGroup>> {
        Ok(self.repo.list_top_level_groups()?)
    }

    pub fn list_child_groups(&self, parent_uuid: Uuid) -> NoteServiceResult<Vec<NoteGroup>> {
        Ok(self.repo.list_child_groups(parent_uuid)?)
    }

    pub fn find_groups_by_title(&self, query: &str) -> NoteServiceResult<Vec<NoteGroup>> {
        Ok(self.repo.find_groups_by_title(query)?)
    }

    pub fn find_groups_by_kind(&self, kind_code: &str) -> NoteServiceResult<Vec<NoteGroup>> {
        Ok(self.repo.find_groups_by_kind(kind_code)?)
    }

    pub fn count_groups(&self) -> NoteServiceResult<i64> {
        Ok(self.repo.count_groups()?)
    }

    pub fn meta(&self) -> NoteServiceResult<NotesMeta> {
        Ok(self.repo.get_meta()?)
    }

    pub fn mark_local_change(&self) -> NoteServiceResult<()> {
        Ok(self.repo.mark_local_change()?)
    }

    pub fn mark_synced(&self, server_updated_at: i64) -> NoteServiceResult<()> {
        Ok(self.repo.mark_synced(server_updated_at)?)
    }

    fn ensure_no_cycle(&self, group_uuid: Uuid, candidate_parent_uuid: Uuid) -> NoteServiceResult<()> {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_parent_uuid);
        while let Some(current) = cursor {
            if current == group_uuid || !visited.insert(current) {
                return Err(NoteServiceError::CycleDetected {
                    group_uuid,
                    parent_uuid: candidate_parent_uuid,
                });
            }
            cursor = self.require_group(current)?.parent_uuid;
        }
        Ok(())
    }

    fn require_group(&self, uuid: Uuid) -> NoteServiceResult<NoteGroup> {
        self.repo
            .get_group(uuid)?
            .ok_or(NoteServiceError::GroupNotFound(uuid))
    }
}

/// Lowercases, trims `#` prefixes and deduplicates tags, keeping first-seen
/// order. Tags are separated by commas or semicolons; a multi-word tag keeps
/// single spaces between its words.
pub fn normalize_tags(raw: &str) -> String {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for part in TAG_SEPARATOR_RE.split(raw) {
        let words = part.trim().trim_start_matches('#').trim_start();
        let tag = INNER_SPACE_RE.replace_all(words, " ").to_lowercase();
        if tag.is_empty() {
            continue;
        }
        if seen.insert(tag.clone()) {
            tags.push(tag);
        }
    }
    tags.join(", ")
}

#[cfg(test)]
mod tests {
    use super::normalize_tags;

    #[test]
    fn normalize_tags_lowercases_and_deduplicates() {
        assert_eq!(normalize_tags("#Magic, magic;  Plot; #plot"), "magic, plot");
    }

    #[test]
    fn normalize_tags_keeps_unicode_words() {
        assert_eq!(normalize_tags("Дракон; #дракон, Замок"), "дракон, замок");
    }

    #[test]
    fn normalize_tags_keeps_multi_word_tags() {
        assert_eq!(
            normalize_tags("main plot, Dark   Lord ,main plot"),
            "main plot, dark lord"
        );
    }

    #[test]
    fn normalize_tags_of_blank_input_is_empty() {
        assert_eq!(normalize_tags("  ,; # "), "");
    }
}
