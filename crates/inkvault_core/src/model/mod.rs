//! Domain model for user-defined schemas, their instances, manuscript and notes.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep struct-level validation next to the data it guards.
//!
//! # Invariants
//! - Every domain object is identified by a client-generated UUID.
//! - Numeric storage row ids never appear in the model.

use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod block;
pub mod configuration;
pub mod instance;
pub mod manuscript;
pub mod note;
pub mod parameter;
pub mod user_doc;

/// Struct-level validation failure raised before any persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValidationError {
    /// Required text field is blank after trim.
    BlankField(&'static str),
    /// Field combination is not allowed for the given kind.
    InvalidCombination(String),
    /// An entity references itself where that is forbidden.
    SelfReference {
        field: &'static str,
        uuid: Uuid,
    },
    /// Scalar parameter value does not match its data type.
    InvalidValue {
        data_type: &'static str,
        value: String,
    },
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankField(field) => write!(f, "{field} must not be blank"),
            Self::InvalidCombination(message) => write!(f, "{message}"),
            Self::SelfReference { field, uuid } => {
                write!(f, "{field} must not reference the entity itself ({uuid})")
            }
            Self::InvalidValue { data_type, value } => {
                write!(f, "value `{value}` is not valid for data type `{data_type}`")
            }
        }
    }
}

impl Error for ModelValidationError {}

pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), ModelValidationError> {
    if value.trim().is_empty() {
        return Err(ModelValidationError::BlankField(field));
    }
    Ok(())
}
