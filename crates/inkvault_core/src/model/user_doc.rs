//! Knowledge-base pages written in markdown.

use crate::model::{require_text, ModelValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserDocPageId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDocPage {
    pub uuid: UserDocPageId,
    pub title: String,
    pub markdown: String,
    /// Configuration the page documents; copied with it into book stores.
    pub configuration_uuid: Option<Uuid>,
    pub book_uuid: Option<Uuid>,
}

impl UserDocPage {
    pub fn new(title: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title: title.into(),
            markdown: markdown.into(),
            configuration_uuid: None,
            book_uuid: None,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("user doc page title", &self.title)
    }
}
