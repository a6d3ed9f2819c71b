//! Instances: records conforming to a block's runtime schema.
//!
//! # Responsibility
//! - Describe instances, instance groups and parameter values.
//! - Describe concrete instance relations and instance-to-scene links.
//!
//! # Invariants
//! - An instance is never its own parent or host.
//! - Link-typed values point at another instance through
//!   `linked_instance_uuid`, scalar values live in `value`.

use crate::model::block::Icon;
use crate::model::{require_text, ModelValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type InstanceId = Uuid;

/// One record of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInstance {
    pub uuid: InstanceId,
    pub block_uuid: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Instance of the host block that owns this nested instance.
    pub host_instance_uuid: Option<InstanceId>,
    /// Tree parent within the same block.
    pub parent_instance_uuid: Option<InstanceId>,
    pub group_uuid: Option<Uuid>,
    pub icon: Option<Icon>,
    /// Last change in epoch milliseconds. Set by storage.
    pub updated_at: i64,
}

impl BlockInstance {
    pub fn new(block_uuid: Uuid, title: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            block_uuid,
            title: title.into(),
            description: None,
            host_instance_uuid: None,
            parent_instance_uuid: None,
            group_uuid: None,
            icon: None,
            updated_at: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("instance title", &self.title)?;
        if self.parent_instance_uuid == Some(self.uuid) {
            return Err(ModelValidationError::SelfReference {
                field: "parent_instance_uuid",
                uuid: self.uuid,
            });
        }
        if self.host_instance_uuid == Some(self.uuid) {
            return Err(ModelValidationError::SelfReference {
                field: "host_instance_uuid",
                uuid: self.uuid,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInstanceGroup {
    pub uuid: Uuid,
    pub block_uuid: Uuid,
    pub title: String,
    pub order_number: i64,
}

impl BlockInstanceGroup {
    pub fn new(block_uuid: Uuid, title: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            block_uuid,
            title: title.into(),
            order_number: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("instance group title", &self.title)
    }
}

/// Value of one parameter on one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParameterInstance {
    pub uuid: Uuid,
    pub block_instance_uuid: InstanceId,
    pub block_parameter_uuid: Uuid,
    pub block_parameter_group_uuid: Uuid,
    pub value: String,
    pub linked_instance_uuid: Option<InstanceId>,
}

impl BlockParameterInstance {
    /// Empty value slot for a parameter.
    pub fn empty(
        block_instance_uuid: InstanceId,
        block_parameter_uuid: Uuid,
        block_parameter_group_uuid: Uuid,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            block_instance_uuid,
            block_parameter_uuid,
            block_parameter_group_uuid,
            value: String::new(),
            linked_instance_uuid: None,
        }
    }
}

/// Concrete association realising a declared block relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInstanceRelation {
    pub uuid: Uuid,
    pub block_relation_uuid: Uuid,
    pub source_instance_uuid: InstanceId,
    pub target_instance_uuid: InstanceId,
    pub source_block_uuid: Uuid,
    pub target_block_uuid: Uuid,
}

impl BlockInstanceRelation {
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.source_instance_uuid == self.target_instance_uuid {
            return Err(ModelValidationError::SelfReference {
                field: "target_instance_uuid",
                uuid: self.source_instance_uuid,
            });
        }
        Ok(())
    }

    /// Returns the instance on the other side of `instance_uuid`.
    pub fn counterpart_of(&self, instance_uuid: InstanceId) -> Option<InstanceId> {
        if self.source_instance_uuid == instance_uuid {
            Some(self.target_instance_uuid)
        } else if self.target_instance_uuid == instance_uuid {
            Some(self.source_instance_uuid)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSceneLink {
    pub uuid: Uuid,
    pub block_instance_uuid: InstanceId,
    pub block_uuid: Uuid,
    pub scene_uuid: Uuid,
    pub title: Option<String>,
}
