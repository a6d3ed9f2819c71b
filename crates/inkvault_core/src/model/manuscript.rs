//! Manuscript model: books, chapters and scenes.
//!
//! # Responsibility
//! - Describe catalog entries and per-book manuscript structure.
//! - Derive symbol counts from scene bodies.
//!
//! # Invariants
//! - Symbol counts always match the stored body.
//! - Scene order numbers start at 1 after global recalculation.

use crate::model::{require_text, ModelValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type BookId = Uuid;
pub type ChapterId = Uuid;
pub type SceneId = Uuid;

/// Sync status of a locally stored aggregate against the server copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    LocalChanges,
    ServerChanges,
    Synced,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalChanges => "local_changes",
            Self::ServerChanges => "server_changes",
            Self::Synced => "synced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "local_changes" => Some(Self::LocalChanges),
            "server_changes" => Some(Self::ServerChanges),
            "synced" => Some(Self::Synced),
            _ => None,
        }
    }
}

/// Catalog entry in the library store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub uuid: Uuid,
    pub title: String,
    pub author: String,
    pub form: String,
    pub genre: String,
    pub kind: Option<String>,
    pub description: Option<String>,
    pub configuration_uuid: Uuid,
    pub configuration_title: String,
    pub cover: Option<String>,
    pub chapter_only_mode: bool,
    pub use_simple_punctuation_checker: bool,
    pub local_updated_at: Option<i64>,
    pub server_updated_at: Option<i64>,
    pub sync_state: SyncState,
}

impl Book {
    pub fn new(title: impl Into<String>, configuration_uuid: Uuid) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title: title.into(),
            author: String::new(),
            form: String::new(),
            genre: String::new(),
            kind: None,
            description: None,
            configuration_uuid,
            configuration_title: String::new(),
            cover: None,
            chapter_only_mode: true,
            use_simple_punctuation_checker: true,
            local_updated_at: None,
            server_updated_at: None,
            sync_state: SyncState::Synced,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("book title", &self.title)
    }
}

/// Identity and sync row of a book store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookInfo {
    pub book_uuid: Uuid,
    pub title: String,
    pub configuration_uuid: Uuid,
    pub local_updated_at: Option<i64>,
    pub server_updated_at: Option<i64>,
    pub sync_state: SyncState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub uuid: Uuid,
    pub title: String,
    pub order_number: i64,
    pub content_scene_uuid: Option<Uuid>,
}

impl Chapter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title: title.into(),
            order_number: 0,
            content_scene_uuid: None,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("chapter title", &self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub uuid: Uuid,
    pub title: String,
    pub order_number: i64,
    pub chapter_uuid: Option<Uuid>,
    pub symbol_count_with_spaces: i64,
    pub symbol_count_without_spaces: i64,
}

impl Scene {
    pub fn new(title: impl Into<String>, chapter_uuid: Option<Uuid>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title: title.into(),
            order_number: 0,
            chapter_uuid,
            symbol_count_with_spaces: 0,
            symbol_count_without_spaces: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("scene title", &self.title)
    }
}

/// Scene text, kept apart from scene metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneBody {
    pub scene_uuid: Uuid,
    pub body: String,
}

/// Character counts of a scene body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SymbolCounts {
    pub with_spaces: i64,
    pub without_spaces: i64,
}

impl SymbolCounts {
    /// Counts Unicode scalar values; line breaks are not symbols.
    pub fn of(body: &str) -> Self {
        let mut counts = Self::default();
        for ch in body.chars() {
            if ch == '\n' || ch == '\r' {
                continue;
            }
            counts.with_spaces += 1;
            if !ch.is_whitespace() {
                counts.without_spaces += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::{SymbolCounts, SyncState};

    #[test]
    fn symbol_counts_skip_line_breaks() {
        let counts = SymbolCounts::of("Он шёл.\nДождь шёл тоже.");
        assert_eq!(counts.with_spaces, 22);
        assert_eq!(counts.without_spaces, 19);
    }

    #[test]
    fn sync_state_round_trips_db_text() {
        for state in [
            SyncState::LocalChanges,
            SyncState::ServerChanges,
            SyncState::Synced,
        ] {
            assert_eq!(SyncState::parse(state.as_str()), Some(state));
        }
        assert_eq!(SyncState::parse("dirty"), None);
    }
}
