//! Instance use-case service (book store).
//!
//! # Responsibility
//! - Validate instance hierarchy, grouping and value invariants above the
//!   repository layer.
//! - Resolve parameter definitions and declared relations for instance
//!   operations.
//!
//! # Invariants
//! - A host instance is an instance of the block's host block.
//! - A parent instance is an instance of the same block; parent chains are
//!   acyclic.
//! - A `single` block never holds more than one instance.
//! - A value references an existing parameter of the instance's block; link
//!   values reference an existing instance of the linked block.
//! - An instance relation realises a declared relation between its blocks.

use crate::model::block::{Block, BlockId, BlockRelationId};
use crate::model::instance::{
    BlockInstance, BlockInstanceGroup, BlockInstanceRelation, BlockParameterInstance, InstanceId,
    InstanceSceneLink,
};
use crate::model::parameter::{BlockParameter, ParameterDataType, ParameterId};
use crate::model::ModelValidationError;
use crate::repo::instance_repo::InstanceRepository;
use crate::repo::parameter_repo::ParameterRepository;
use crate::repo::schema_repo::SchemaRepository;
use crate::repo::{MoveDirection, RepoError};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Errors from instance service operations.
#[derive(Debug)]
pub enum InstanceServiceError {
    BlockNotFound(BlockId),
    InstanceNotFound(InstanceId),
    GroupNotFound(Uuid),
    ParameterNotFound(ParameterId),
    ValueNotFound(Uuid),
    RelationNotFound(BlockRelationId),
    InstanceRelationNotFound(Uuid),
    SceneNotFound(Uuid),
    SceneLinkNotFound(Uuid),
    /// Host instance does not belong to the block's host block.
    HostMismatch {
        host_instance_uuid: InstanceId,
        block_uuid: BlockId,
    },
    /// Parent instance does not belong to the same block.
    ParentMismatch {
        parent_instance_uuid: InstanceId,
        block_uuid: BlockId,
    },
    /// Instance group belongs to another block.
    GroupMismatch {
        group_uuid: Uuid,
        block_uuid: BlockId,
    },
    /// A `single` block already holds its instance.
    SingleBlockOccupied(BlockId),
    /// Updates cannot move an instance to another block.
    BlockChangeNotAllowed(InstanceId),
    /// Re-parenting would create a cycle.
    CycleDetected {
        instance_uuid: InstanceId,
        parent_instance_uuid: InstanceId,
    },
    /// Parameter belongs to another block than the instance.
    ParameterMismatch {
        parameter_uuid: ParameterId,
        block_uuid: BlockId,
    },
    /// Link value points at an instance of the wrong block.
    LinkTargetMismatch {
        target_instance_uuid: InstanceId,
        expected_block_uuid: Option<BlockId>,
    },
    /// A single-valued parameter already has a value on the instance.
    ParameterAlreadySet {
        instance_uuid: InstanceId,
        parameter_uuid: ParameterId,
    },
    /// A stored value cannot move to another instance or parameter.
    ValueOwnerChangeNotAllowed(Uuid),
    /// Instances' blocks do not match the declared relation.
    RelationMismatch(BlockRelationId),
    SceneLinksNotAllowed(BlockId),
    InvalidValue(ModelValidationError),
    Repo(RepoError),
}

impl Display for InstanceServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlockNotFound(id) => write!(f, "block not found: {id}"),
            Self::InstanceNotFound(id) => write!(f, "instance not found: {id}"),
            Self::GroupNotFound(id) => write!(f, "instance group not found: {id}"),
            Self::ParameterNotFound(id) => write!(f, "parameter not found: {id}"),
            Self::ValueNotFound(id) => write!(f, "parameter value not found: {id}"),
            Self::RelationNotFound(id) => write!(f, "relation not found: {id}"),
            Self::InstanceRelationNotFound(id) => write!(f, "instance relation not found: {id}"),
            Self::SceneNotFound(id) => write!(f, "scene not found: {id}"),
            Self::SceneLinkNotFound(id) => write!(f, "scene link not found: {id}"),
            Self::HostMismatch {
                host_instance_uuid,
                block_uuid,
            } => write!(
                f,
                "instance {host_instance_uuid} cannot host instances of block {block_uuid}"
            ),
            Self::ParentMismatch {
                parent_instance_uuid,
                block_uuid,
            } => write!(
                f,
                "parent instance {parent_instance_uuid} is not an instance of block {block_uuid}"
            ),
            Self::GroupMismatch {
                group_uuid,
                block_uuid,
            } => write!(f, "instance group {group_uuid} does not belong to block {block_uuid}"),
            Self::SingleBlockOccupied(id) => {
                write!(f, "single block already has its instance: {id}")
            }
            Self::BlockChangeNotAllowed(id) => {
                write!(f, "instance cannot change its block: {id}")
            }
            Self::CycleDetected {
                instance_uuid,
                parent_instance_uuid,
            } => write!(
                f,
                "move would create cycle: instance {instance_uuid} under {parent_instance_uuid}"
            ),
            Self::ParameterMismatch {
                parameter_uuid,
                block_uuid,
            } => write!(f, "parameter {parameter_uuid} does not belong to block {block_uuid}"),
            Self::LinkTargetMismatch {
                target_instance_uuid,
                expected_block_uuid,
            } => match expected_block_uuid {
                Some(block_uuid) => write!(
                    f,
                    "linked instance {target_instance_uuid} is not an instance of block {block_uuid}"
                ),
                None => write!(f, "parameter cannot link instance {target_instance_uuid}"),
            },
            Self::ParameterAlreadySet {
                instance_uuid,
                parameter_uuid,
            } => write!(
                f,
                "parameter {parameter_uuid} already has a value on instance {instance_uuid}"
            ),
            Self::ValueOwnerChangeNotAllowed(id) => {
                write!(f, "parameter value cannot change its instance or parameter: {id}")
            }
            Self::RelationMismatch(id) => {
                write!(f, "instances do not match the blocks of relation {id}")
            }
            Self::SceneLinksNotAllowed(id) => write!(f, "block does not allow scene links: {id}"),
            Self::InvalidValue(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for InstanceServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidValue(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for InstanceServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: "block",
                uuid,
            } => Self::BlockNotFound(uuid),
            RepoError::NotFound {
                entity: "instance",
                uuid,
            } => Self::InstanceNotFound(uuid),
            RepoError::NotFound {
                entity: "instance group",
                uuid,
            } => Self::GroupNotFound(uuid),
            RepoError::NotFound {
                entity: "parameter value",
                uuid,
            } => Self::ValueNotFound(uuid),
            RepoError::NotFound {
                entity: "instance relation",
                uuid,
            } => Self::InstanceRelationNotFound(uuid),
            RepoError::NotFound {
                entity: "scene link",
                uuid,
            } => Self::SceneLinkNotFound(uuid),
            other => Self::Repo(other),
        }
    }
}

pub type InstanceServiceResult<T> = Result<T, InstanceServiceError>;

/// Instance service facade.
pub struct InstanceService<I, S, P>
where
    I: InstanceRepository,
    S: SchemaRepository,
    P: ParameterRepository,
{
    instances: I,
    schema: S,
    parameters: P,
}

impl<I, S, P> InstanceService<I, S, P>
where
    I: InstanceRepository,
    S: SchemaRepository,
    P: ParameterRepository,
{
    pub fn new(instances: I, schema: S, parameters: P) -> Self {
        Self {
            instances,
            schema,
            parameters,
        }
    }

    /// Creates an instance with an empty value for each default parameter.
    pub fn create_instance(
        &self,
        instance: &BlockInstance,
    ) -> InstanceServiceResult<(BlockInstance, Vec<BlockParameterInstance>)> {
        let block = self.require_block(instance.block_uuid)?;
        if block.is_single() && self.instances.count_instances(block.uuid)? > 0 {
            return Err(InstanceServiceError::SingleBlockOccupied(block.uuid));
        }
        self.ensure_placement(instance, &block)?;
        let values = self.instances.create_instance_with_defaults(instance)?;
        Ok((self.require_instance(instance.uuid)?, values))
    }

    pub fn get_instance(&self, uuid: InstanceId) -> InstanceServiceResult<Option<BlockInstance>> {
        Ok(self.instances.get_instance(uuid)?)
    }

    /// Lists instances of a block, optionally filtered by title substring.
    pub fn list_instances(
        &self,
        block_uuid: BlockId,
        title_query: Option<&str>,
    ) -> InstanceServiceResult<Vec<BlockInstance>> {
        self.require_block(block_uuid)?;
        Ok(self.instances.list_instances(block_uuid, title_query)?)
    }

    pub fn update_instance(&self, instance: &BlockInstance) -> InstanceServiceResult<()> {
        let stored = self.require_instance(instance.uuid)?;
        if stored.block_uuid != instance.block_uuid {
            return Err(InstanceServiceError::BlockChangeNotAllowed(instance.uuid));
        }
        let block = self.require_block(stored.block_uuid)?;
        self.ensure_placement(instance, &block)?;
        if let Some(parent_uuid) = instance.parent_instance_uuid {
            if stored.parent_instance_uuid != Some(parent_uuid) {
                self.ensure_no_cycle(instance.uuid, parent_uuid)?;
            }
        }
        Ok(self.instances.update_instance(instance)?)
    }

    /// Deletes an instance with its nested instances, values, link values
    /// pointing at it, relations and scene links.
    pub fn delete_instance(&self, uuid: InstanceId) -> InstanceServiceResult<()> {
        Ok(self.instances.delete_instance(uuid)?)
    }

    pub fn delete_block_instances(&self, block_uuid: BlockId) -> InstanceServiceResult<usize> {
        Ok(self.instances.delete_block_instances(block_uuid)?)
    }

    pub fn list_nested(
        &self,
        host_instance_uuid: InstanceId,
        nested_block_uuid: Option<BlockId>,
    ) -> InstanceServiceResult<Vec<BlockInstance>> {
        self.require_instance(host_instance_uuid)?;
        Ok(self
            .instances
            .list_nested_instances(host_instance_uuid, nested_block_uuid)?)
    }

    pub fn list_children(
        &self,
        parent_instance_uuid: InstanceId,
    ) -> InstanceServiceResult<Vec<BlockInstance>> {
        Ok(self.instances.list_child_instances(parent_instance_uuid)?)
    }

    /// Re-parents an instance; the new group is applied to all descendants.
    pub fn move_instance(
        &self,
        uuid: InstanceId,
        parent_instance_uuid: Option<InstanceId>,
        group_uuid: Option<Uuid>,
    ) -> InstanceServiceResult<()> {
        let instance = self.require_instance(uuid)?;
        if let Some(parent_uuid) = parent_instance_uuid {
            self.ensure_parent(parent_uuid, instance.block_uuid)?;
            self.ensure_no_cycle(uuid, parent_uuid)?;
        }
        if let Some(group_uuid) = group_uuid {
            self.ensure_group(group_uuid, instance.block_uuid)?;
        }
        Ok(self
            .instances
            .move_instance(uuid, parent_instance_uuid, group_uuid)?)
    }

    pub fn list_groups(&self, block_uuid: BlockId) -> InstanceServiceResult<Vec<BlockInstanceGroup>> {
        Ok(self.instances.list_groups(block_uuid)?)
    }

    pub fn save_group(
        &self,
        group: &BlockInstanceGroup,
    ) -> InstanceServiceResult<BlockInstanceGroup> {
        self.require_block(group.block_uuid)?;
        if let Some(stored) = self.instances.get_group(group.uuid)? {
            if stored.block_uuid != group.block_uuid {
                return Err(InstanceServiceError::GroupMismatch {
                    group_uuid: group.uuid,
                    block_uuid: group.block_uuid,
                });
            }
        }
        Ok(self.instances.save_group(group)?)
    }

    /// Deletes a group; its instances become ungrouped.
    pub fn delete_group(&self, uuid: Uuid) -> InstanceServiceResult<()> {
        Ok(self.instances.delete_group(uuid)?)
    }

    pub fn move_group(&self, uuid: Uuid, direction: MoveDirection) -> InstanceServiceResult<bool> {
        Ok(self.instances.move_group(uuid, direction)?)
    }

    pub fn list_values(
        &self,
        instance_uuid: InstanceId,
    ) -> InstanceServiceResult<Vec<BlockParameterInstance>> {
        Ok(self.instances.list_parameter_values(instance_uuid)?)
    }

    /// Validates and stores one value.
    ///
    /// For `block_link` parameters the target comes from
    /// `linked_instance_uuid`, or from `value` when that holds a UUID.
    /// A new value row for a parameter without `allow_multiple` is rejected
    /// once the instance already has one.
    pub fn save_value(
        &self,
        value: &BlockParameterInstance,
    ) -> InstanceServiceResult<BlockParameterInstance> {
        let instance = self.require_instance(value.block_instance_uuid)?;
        let parameter = self.require_parameter(value.block_parameter_uuid)?;
        if parameter.block_uuid != instance.block_uuid {
            return Err(InstanceServiceError::ParameterMismatch {
                parameter_uuid: parameter.uuid,
                block_uuid: instance.block_uuid,
            });
        }
        match self.instances.get_parameter_value(value.uuid)? {
            Some(stored) => {
                if stored.block_instance_uuid != value.block_instance_uuid
                    || stored.block_parameter_uuid != value.block_parameter_uuid
                {
                    return Err(InstanceServiceError::ValueOwnerChangeNotAllowed(value.uuid));
                }
            }
            None if !parameter.allow_multiple => {
                let taken = self
                    .instances
                    .list_parameter_values(instance.uuid)?
                    .iter()
                    .any(|stored| stored.block_parameter_uuid == parameter.uuid);
                if taken {
                    return Err(InstanceServiceError::ParameterAlreadySet {
                        instance_uuid: instance.uuid,
                        parameter_uuid: parameter.uuid,
                    });
                }
            }
            None => {}
        }

        let mut normalized = value.clone();
        normalized.block_parameter_group_uuid = parameter.group_uuid;
        if parameter.data_type == ParameterDataType::BlockLink {
            let target = self.resolve_link_target(&parameter, value)?;
            normalized.linked_instance_uuid = target;
            normalized.value = target.map(|uuid| uuid.to_string()).unwrap_or_default();
        } else {
            parameter
                .data_type
                .validate_value(&value.value)
                .map_err(InstanceServiceError::InvalidValue)?;
            normalized.linked_instance_uuid = None;
            normalized.value = value.value.trim().to_string();
        }

        self.instances.save_parameter_value(&normalized)?;
        Ok(normalized)
    }

    /// Sets the value of a parameter on an instance, reusing its slot.
    pub fn set_value(
        &self,
        instance_uuid: InstanceId,
        parameter_uuid: ParameterId,
        raw: &str,
    ) -> InstanceServiceResult<BlockParameterInstance> {
        let parameter = self.require_parameter(parameter_uuid)?;
        let existing = self
            .instances
            .list_parameter_values(instance_uuid)?
            .into_iter()
            .find(|value| value.block_parameter_uuid == parameter_uuid);
        let mut value = existing.unwrap_or_else(|| {
            BlockParameterInstance::empty(instance_uuid, parameter_uuid, parameter.group_uuid)
        });
        value.value = raw.to_string();
        value.linked_instance_uuid = None;
        self.save_value(&value)
    }

    pub fn delete_value(&self, uuid: Uuid) -> InstanceServiceResult<()> {
        Ok(self.instances.delete_parameter_value(uuid)?)
    }

    /// Link values of other instances pointing at `instance_uuid`.
    pub fn list_referencing_values(
        &self,
        instance_uuid: InstanceId,
    ) -> InstanceServiceResult<Vec<BlockParameterInstance>> {
        Ok(self.instances.list_referencing_values(instance_uuid)?)
    }

    pub fn append_default_parameters(
        &self,
        instance_uuid: InstanceId,
    ) -> InstanceServiceResult<Vec<BlockParameterInstance>> {
        Ok(self.instances.append_default_parameters(instance_uuid)?)
    }

    pub fn list_instance_relations(
        &self,
        instance_uuid: InstanceId,
        towards_block: Option<BlockId>,
    ) -> InstanceServiceResult<Vec<BlockInstanceRelation>> {
        Ok(self
            .instances
            .list_instance_relations(instance_uuid, towards_block)?)
    }

    /// Connects two instances through a declared relation.
    ///
    /// The pair may be given in either direction; it is stored in the
    /// relation's source/target orientation.
    pub fn create_instance_relation(
        &self,
        block_relation_uuid: BlockRelationId,
        first_instance_uuid: InstanceId,
        second_instance_uuid: InstanceId,
    ) -> InstanceServiceResult<BlockInstanceRelation> {
        let relation = self
            .schema
            .get_relation(block_relation_uuid)?
            .ok_or(InstanceServiceError::RelationNotFound(block_relation_uuid))?;
        let first = self.require_instance(first_instance_uuid)?;
        let second = self.require_instance(second_instance_uuid)?;

        let (source, target) = if first.block_uuid == relation.source_block_uuid
            && second.block_uuid == relation.target_block_uuid
        {
            (first, second)
        } else if second.block_uuid == relation.source_block_uuid
            && first.block_uuid == relation.target_block_uuid
        {
            (second, first)
        } else {
            return Err(InstanceServiceError::RelationMismatch(block_relation_uuid));
        };

        let instance_relation = BlockInstanceRelation {
            uuid: Uuid::new_v4(),
            block_relation_uuid,
            source_instance_uuid: source.uuid,
            target_instance_uuid: target.uuid,
            source_block_uuid: source.block_uuid,
            target_block_uuid: target.block_uuid,
        };
        instance_relation
            .validate()
            .map_err(InstanceServiceError::InvalidValue)?;
        self.instances.create_instance_relation(&instance_relation)?;
        Ok(instance_relation)
    }

    pub fn delete_instance_relation(&self, uuid: Uuid) -> InstanceServiceResult<()> {
        Ok(self.instances.delete_instance_relation(uuid)?)
    }

    pub fn delete_relations_for_instance(
        &self,
        instance_uuid: InstanceId,
    ) -> InstanceServiceResult<usize> {
        Ok(self.instances.delete_relations_for_instance(instance_uuid)?)
    }

    /// Links an instance to a scene of the manuscript.
    pub fn link_to_scene(
        &self,
        instance_uuid: InstanceId,
        scene_uuid: Uuid,
        title: Option<String>,
    ) -> InstanceServiceResult<InstanceSceneLink> {
        let instance = self.require_instance(instance_uuid)?;
        let block = self.require_block(instance.block_uuid)?;
        if !block.scene_link_allowed {
            return Err(InstanceServiceError::SceneLinksNotAllowed(block.uuid));
        }
        if !self.instances.scene_exists(scene_uuid)? {
            return Err(InstanceServiceError::SceneNotFound(scene_uuid));
        }
        let link = InstanceSceneLink {
            uuid: Uuid::new_v4(),
            block_instance_uuid: instance.uuid,
            block_uuid: block.uuid,
            scene_uuid,
            title,
        };
        self.instances.create_scene_link(&link)?;
        Ok(link)
    }

    pub fn list_scene_links_by_scene(
        &self,
        scene_uuid: Uuid,
    ) -> InstanceServiceResult<Vec<InstanceSceneLink>> {
        Ok(self.instances.list_scene_links_by_scene(scene_uuid)?)
    }

    pub fn list_scene_links_by_instance(
        &self,
        instance_uuid: InstanceId,
    ) -> InstanceServiceResult<Vec<InstanceSceneLink>> {
        Ok(self.instances.list_scene_links_by_instance(instance_uuid)?)
    }

    pub fn delete_scene_link(&self, uuid: Uuid) -> InstanceServiceResult<()> {
        Ok(self.instances.delete_scene_link(uuid)?)
    }

    fn resolve_link_target(
        &self,
        parameter: &BlockParameter,
        value: &BlockParameterInstance,
    ) -> InstanceServiceResult<Option<InstanceId>> {
        let target = match value.linked_instance_uuid {
            Some(target) => Some(target),
            None => {
                let raw = value.value.trim();
                if raw.is_empty() {
                    None
                } else {
                    Some(Uuid::parse_str(raw).map_err(|_| {
                        InstanceServiceError::InvalidValue(ModelValidationError::InvalidValue {
                            data_type: ParameterDataType::BlockLink.as_str(),
                            value: raw.to_string(),
                        })
                    })?)
                }
            }
        };
        let Some(target) = target else {
            return Ok(None);
        };

        let linked = self.require_instance(target)?;
        if parameter.linked_block_uuid != Some(linked.block_uuid) {
            return Err(InstanceServiceError::LinkTargetMismatch {
                target_instance_uuid: target,
                expected_block_uuid: parameter.linked_block_uuid,
            });
        }
        Ok(Some(target))
    }

    fn ensure_placement(&self, instance: &BlockInstance, block: &Block) -> InstanceServiceResult<()> {
        if let Some(host_uuid) = instance.host_instance_uuid {
            let host = self.require_instance(host_uuid)?;
            if block.host_block_uuid != Some(host.block_uuid) {
                return Err(InstanceServiceError::HostMismatch {
                    host_instance_uuid: host_uuid,
                    block_uuid: block.uuid,
                });
            }
        }
        if let Some(parent_uuid) = instance.parent_instance_uuid {
            self.ensure_parent(parent_uuid, block.uuid)?;
        }
        if let Some(group_uuid) = instance.group_uuid {
            self.ensure_group(group_uuid, block.uuid)?;
        }
        Ok(())
    }

    fn ensure_parent(&self, parent_uuid: InstanceId, block_uuid: BlockId) -> InstanceServiceResult<()> {
        let parent = self.require_instance(parent_uuid)?;
        if parent.block_uuid != block_uuid {
            return Err(InstanceServiceError::ParentMismatch {
                parent_instance_uuid: parent_uuid,
                block_uuid,
            });
        }
        Ok(())
    }

    fn ensure_group(&self, group_uuid: Uuid, block_uuid: BlockId) -> InstanceServiceResult<()> {
        let group = self
            .instances
            .get_group(group_uuid)?
            .ok_or(InstanceServiceError::GroupNotFound(group_uuid))?;
        if group.block_uuid != block_uuid {
            return Err(InstanceServiceError::GroupMismatch {
                group_uuid,
                block_uuid,
            });
        }
        Ok(())
    }

    fn ensure_no_cycle(
        &self,
        instance_uuid: InstanceId,
        candidate_parent_uuid: InstanceId,
    ) -> InstanceServiceResult<()> {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_parent_uuid);
        while let Some(current) = cursor {
            if current == instance_uuid || !visited.insert(current) {
                return Err(InstanceServiceError::CycleDetected {
                    instance_uuid,
                    parent_instance_uuid: candidate_parent_uuid,
                });
            }
            cursor = self.require_instance(current)?.parent_instance_uuid;
        }
        Ok(())
    }

    fn require_block(&self, uuid: BlockId) -> InstanceServiceResult<Block> {
        self.schema
            .get_block(uuid)?
            .ok_or(InstanceServiceError::BlockNotFound(uuid))
    }

    fn require_instance(&self, uuid: InstanceId) -> InstanceServiceResult<BlockInstance> {
        self.instances
            .get_instance(uuid)?
            .ok_or(InstanceServiceError::InstanceNotFound(uuid))
    }

    fn require_parameter(&self, uuid: ParameterId) -> InstanceServiceResult<BlockParameter> {
        self.parameters
            .get_parameter(uuid)?
            .ok_or(InstanceServiceError::ParameterNotFound(uuid))
    }
}
