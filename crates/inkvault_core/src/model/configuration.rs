//! Book configuration: a named namespace of block schemas.
//!
//! A configuration in the library store is a template; each book store
//! carries its own copy with the same UUID.

use crate::model::{require_text, ModelValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ConfigurationId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookConfiguration {
    pub uuid: ConfigurationId,
    pub title: String,
    pub description: String,
}

impl BookConfiguration {
    /// Creates a configuration with a generated stable ID.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("configuration title", &self.title)
    }
}
