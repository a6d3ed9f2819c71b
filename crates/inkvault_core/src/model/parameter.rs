//! Parameter definitions attached to blocks.
//!
//! # Responsibility
//! - Describe typed parameters, their groups and dropdown options.
//! - Validate scalar values against a parameter data type.
//!
//! # Invariants
//! - `block_link` parameters always carry `linked_block_uuid`.
//! - Only `block_link` parameters may be used for instance grouping.

use crate::model::{require_text, ModelValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ParameterId = Uuid;
pub type ParameterGroupId = Uuid;

static DATE_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])([T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?$")
        .expect("valid date regex")
});
static COLOR_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})$").expect("valid color regex")
});

/// Value type of a block parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDataType {
    String,
    Text,
    Checkbox,
    DatePicker,
    ColorPicker,
    Dropdown,
    BlockLink,
}

impl ParameterDataType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Checkbox => "checkbox",
            Self::DatePicker => "date_picker",
            Self::ColorPicker => "color_picker",
            Self::Dropdown => "dropdown",
            Self::BlockLink => "block_link",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "string" => Some(Self::String),
            "text" => Some(Self::Text),
            "checkbox" => Some(Self::Checkbox),
            "date_picker" => Some(Self::DatePicker),
            "color_picker" => Some(Self::ColorPicker),
            "dropdown" => Some(Self::Dropdown),
            "block_link" => Some(Self::BlockLink),
            _ => None,
        }
    }

    /// Checks one scalar value. Empty input is always accepted.
    ///
    /// `block_link` values are checked against stored instances by the
    /// instance service, not here.
    pub fn validate_value(self, raw: &str) -> Result<(), ModelValidationError> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(());
        }

        let valid = match self {
            Self::Checkbox => matches!(value, "0" | "1" | "true" | "false"),
            Self::DatePicker => DATE_VALUE_RE.is_match(value),
            Self::ColorPicker => COLOR_VALUE_RE.is_match(value),
            Self::String | Self::Text | Self::Dropdown | Self::BlockLink => true,
        };

        if valid {
            Ok(())
        } else {
            Err(ModelValidationError::InvalidValue {
                data_type: self.as_str(),
                value: value.to_string(),
            })
        }
    }
}

/// Named, ordered group of parameters within one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParameterGroup {
    pub uuid: ParameterGroupId,
    pub block_uuid: Uuid,
    pub title: String,
    pub description: String,
    pub order_number: i64,
}

impl BlockParameterGroup {
    pub fn new(block_uuid: Uuid, title: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            block_uuid,
            title: title.into(),
            description: String::new(),
            order_number: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("parameter group title", &self.title)
    }
}

/// Typed field definition of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParameter {
    pub uuid: ParameterId,
    pub block_uuid: Uuid,
    pub group_uuid: ParameterGroupId,
    pub title: String,
    pub description: String,
    pub data_type: ParameterDataType,
    pub linked_block_uuid: Option<Uuid>,
    /// Every instance receives a value slot for default parameters.
    pub is_default: bool,
    pub display_in_card: bool,
    pub order_number: i64,
    pub allow_multiple: bool,
    pub use_for_instance_grouping: bool,
}

impl BlockParameter {
    pub fn new(
        block_uuid: Uuid,
        group_uuid: ParameterGroupId,
        title: impl Into<String>,
        data_type: ParameterDataType,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            block_uuid,
            group_uuid,
            title: title.into(),
            description: String::new(),
            data_type,
            linked_block_uuid: None,
            is_default: false,
            display_in_card: false,
            order_number: 0,
            allow_multiple: false,
            use_for_instance_grouping: false,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("parameter title", &self.title)?;

        let is_link = self.data_type == ParameterDataType::BlockLink;
        if is_link && self.linked_block_uuid.is_none() {
            return Err(ModelValidationError::InvalidCombination(
                "block_link parameter requires linked_block_uuid".to_string(),
            ));
        }
        if !is_link && self.linked_block_uuid.is_some() {
            return Err(ModelValidationError::InvalidCombination(format!(
                "{} parameter must not carry linked_block_uuid",
                self.data_type.as_str()
            )));
        }
        if !is_link && self.use_for_instance_grouping {
            return Err(ModelValidationError::InvalidCombination(
                "only block_link parameters can group instances".to_string(),
            ));
        }
        Ok(())
    }
}

/// One option of a dropdown parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PossibleValue {
    pub uuid: Uuid,
    pub parameter_uuid: ParameterId,
    pub value: String,
    pub order_number: i64,
}

#[cfg(test)]
mod tests {
    use super::{BlockParameter, ParameterDataType};
    use crate::model::ModelValidationError;
    use uuid::Uuid;

    #[test]
    fn scalar_values_follow_data_type() {
        assert!(ParameterDataType::Checkbox.validate_value("true").is_ok());
        assert!(ParameterDataType::Checkbox.validate_value("yes").is_err());
        assert!(ParameterDataType::DatePicker.validate_value("2021-04-09").is_ok());
        assert!(ParameterDataType::DatePicker
            .validate_value("2021-04-09T10:15:00Z")
            .is_ok());
        assert!(ParameterDataType::DatePicker.validate_value("09.04.2021").is_err());
        assert!(ParameterDataType::ColorPicker.validate_value("#a1b2c3").is_ok());
        assert!(ParameterDataType::ColorPicker.validate_value("red").is_err());
        assert!(ParameterDataType::ColorPicker.validate_value("  ").is_ok());
        assert!(ParameterDataType::Text.validate_value("anything").is_ok());
    }

    #[test]
    fn link_parameter_requires_linked_block() {
        let mut param = BlockParameter::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Home town",
            ParameterDataType::BlockLink,
        );
        assert!(matches!(
            param.validate(),
            Err(ModelValidationError::InvalidCombination(_))
        ));
        param.linked_block_uuid = Some(Uuid::new_v4());
        param.use_for_instance_grouping = true;
        assert!(param.validate().is_ok());
    }

    #[test]
    fn grouping_is_rejected_on_scalar_parameters() {
        let mut param = BlockParameter::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Age",
            ParameterDataType::String,
        );
        param.use_for_instance_grouping = true;
        assert!(param.validate().is_err());
    }
}
