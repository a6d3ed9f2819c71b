//! Free-form notes and their folder hierarchy.

use crate::model::manuscript::SyncState;
use crate::model::{require_text, ModelValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind code of groups created by the user.
pub const USER_GROUP_KIND: &str = "user_group";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteGroup {
    pub uuid: Uuid,
    pub title: String,
    pub order_number: i64,
    /// `None` means top level.
    pub parent_uuid: Option<Uuid>,
    pub kind_code: String,
}

impl NoteGroup {
    pub fn new(title: impl Into<String>, parent_uuid: Option<Uuid>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title: title.into(),
            order_number: 0,
            parent_uuid,
            kind_code: USER_GROUP_KIND.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("note group title", &self.title)?;
        require_text("note group kind code", &self.kind_code)?;
        if self.parent_uuid == Some(self.uuid) {
            return Err(ModelValidationError::SelfReference {
                field: "parent_uuid",
                uuid: self.uuid,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub uuid: Uuid,
    pub title: String,
    pub tags: String,
    pub body: String,
    pub order_number: i64,
    pub note_group_uuid: Option<Uuid>,
    pub book_uuid: Option<Uuid>,
    /// Epoch milliseconds. Set by storage on save.
    pub updated_at: i64,
}

impl Note {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title: title.into(),
            tags: String::new(),
            body: String::new(),
            order_number: 0,
            note_group_uuid: None,
            book_uuid: None,
            updated_at: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("note title", &self.title)
    }
}

/// Singleton sync row for the whole notes collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesMeta {
    pub local_updated_at: Option<i64>,
    pub server_updated_at: Option<i64>,
    pub sync_state: SyncState,
}
