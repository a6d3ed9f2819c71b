//! Configurator use-case service: configurations, blocks, tabs, relations
//! and parameters.
//!
//! # Responsibility
//! - Check cross-entity invariants the repositories do not: referenced rows
//!   exist, blocks stay inside one configuration, host chains stay acyclic.
//! - Expose the configurator operations over both store kinds.
//!
//! # Invariants
//! - A block's host belongs to the same configuration and is never the
//!   block itself or one of the blocks it hosts (transitively).
//! - A parameter's group belongs to the parameter's block.
//! - Possible values exist only on `dropdown` parameters.
//! - A block's knowledge-base page exists in the same store.

use crate::model::block::{
    Block, BlockId, BlockRelation, BlockRelationId, BlockTab, BlockTabId, TabKind,
};
use crate::model::configuration::{BookConfiguration, ConfigurationId};
use crate::model::user_doc::UserDocPageId;
use crate::model::parameter::{
    BlockParameter, BlockParameterGroup, ParameterDataType, ParameterGroupId, ParameterId,
    PossibleValue,
};
use crate::repo::parameter_repo::ParameterRepository;
use crate::repo::schema_repo::{ConfigurationSnapshot, SchemaRepository};
use crate::repo::{MoveDirection, RepoError};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from configurator operations.
#[derive(Debug)]
pub enum SchemaServiceError {
    ConfigurationNotFound(ConfigurationId),
    BlockNotFound(BlockId),
    TabNotFound(BlockTabId),
    RelationNotFound(BlockRelationId),
    GroupNotFound(ParameterGroupId),
    ParameterNotFound(ParameterId),
    /// Referenced block lives in another configuration.
    ConfigurationMismatch {
        block_uuid: BlockId,
        configuration_uuid: ConfigurationId,
    },
    /// Hosting would make a block (transitively) host itself.
    HostCycle {
        block_uuid: BlockId,
        host_block_uuid: BlockId,
    },
    /// Parameter group belongs to another block.
    GroupBlockMismatch {
        group_uuid: ParameterGroupId,
        block_uuid: BlockId,
    },
    /// Tab belongs to another block than the referenced row expects.
    TabTargetMismatch(BlockTabId),
    /// Possible values were given to a non-dropdown parameter.
    PossibleValuesNotAllowed(ParameterId),
    UserDocPageNotFound(UserDocPageId),
    Repo(RepoError),
}

impl Display for SchemaServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigurationNotFound(id) => write!(f, "configuration not found: {id}"),
            Self::BlockNotFound(id) => write!(f, "block not found: {id}"),
            Self::TabNotFound(id) => write!(f, "tab not found: {id}"),
            Self::RelationNotFound(id) => write!(f, "relation not found: {id}"),
            Self::GroupNotFound(id) => write!(f, "parameter group not found: {id}"),
            Self::ParameterNotFound(id) => write!(f, "parameter not found: {id}"),
            Self::ConfigurationMismatch {
                block_uuid,
                configuration_uuid,
            } => write!(
                f,
                "block {block_uuid} does not belong to configuration {configuration_uuid}"
            ),
            Self::HostCycle {
                block_uuid,
                host_block_uuid,
            } => write!(
                f,
                "hosting block {block_uuid} under {host_block_uuid} would create a cycle"
            ),
            Self::GroupBlockMismatch {
                group_uuid,
                block_uuid,
            } => write!(
                f,
                "parameter group {group_uuid} does not belong to block {block_uuid}"
            ),
            Self::TabTargetMismatch(id) => write!(f, "tab target does not match its block: {id}"),
            Self::PossibleValuesNotAllowed(id) => {
                write!(f, "possible values are only allowed on dropdown parameters: {id}")
            }
            Self::UserDocPageNotFound(id) => write!(f, "user doc page not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SchemaServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SchemaServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: "configuration",
                uuid,
            } => Self::ConfigurationNotFound(uuid),
            RepoError::NotFound {
                entity: "block",
                uuid,
            } => Self::BlockNotFound(uuid),
            RepoError::NotFound {
                entity: "tab",
                uuid,
            } => Self::TabNotFound(uuid),
            RepoError::NotFound {
                entity: "relation",
                uuid,
            } => Self::RelationNotFound(uuid),
            RepoError::NotFound {
                entity: "parameter group",
                uuid,
            } => Self::GroupNotFound(uuid),
            RepoError::NotFound {
                entity: "parameter",
                uuid,
            } => Self::ParameterNotFound(uuid),
            other => Self::Repo(other),
        }
    }
}

pub type SchemaServiceResult<T> = Result<T, SchemaServiceError>;

/// Configurator service facade.
pub struct SchemaService<S: SchemaRepository, P: ParameterRepository> {
    schema: S,
    parameters: P,
}

impl<S: SchemaRepository, P: ParameterRepository> SchemaService<S, P> {
    pub fn new(schema: S, parameters: P) -> Self {
        Self { schema, parameters }
    }

    pub fn create_configuration(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> SchemaServiceResult<BookConfiguration> {
        let configuration = BookConfiguration::new(title, description);
        self.schema.create_configuration(&configuration)?;
        self.require_configuration(configuration.uuid)
    }

    pub fn get_configuration(
        &self,
        uuid: ConfigurationId,
    ) -> SchemaServiceResult<Option<BookConfiguration>> {
        Ok(self.schema.get_configuration(uuid)?)
    }

    pub fn list_configurations(&self) -> SchemaServiceResult<Vec<BookConfiguration>> {
        Ok(self.schema.list_configurations()?)
    }

    pub fn update_configuration(
        &self,
        configuration: &BookConfiguration,
    ) -> SchemaServiceResult<()> {
        Ok(self.schema.update_configuration(configuration)?)
    }

    /// Deletes the configuration and every block and relation under it.
    pub fn delete_configuration(&self, uuid: ConfigurationId) -> SchemaServiceResult<()> {
        Ok(self.schema.delete_configuration(uuid)?)
    }

    /// Snapshot used to seed a book store.
    pub fn export_configuration(
        &self,
        uuid: ConfigurationId,
    ) -> SchemaServiceResult<ConfigurationSnapshot> {
        self.schema
            .export_configuration(uuid)?
            .ok_or(SchemaServiceError::ConfigurationNotFound(uuid))
    }

    /// Creates a block with its default parameter group and tab.
    pub fn create_block(&self, block: &Block) -> SchemaServiceResult<Block> {
        self.require_configuration(block.configuration_uuid)?;
        if let Some(host_block_uuid) = block.host_block_uuid {
            self.ensure_valid_host(block, host_block_uuid)?;
        }
        self.ensure_user_doc_page(block)?;
        self.schema.create_block(block)?;
        self.require_block(block.uuid)
    }

    pub fn get_block(&self, uuid: BlockId) -> SchemaServiceResult<Option<Block>> {
        Ok(self.schema.get_block(uuid)?)
    }

    pub fn list_blocks(&self, configuration_uuid: ConfigurationId) -> SchemaServiceResult<Vec<Block>> {
        self.require_configuration(configuration_uuid)?;
        Ok(self.schema.list_blocks(configuration_uuid)?)
    }

    pub fn list_sibling_blocks(&self, uuid: BlockId) -> SchemaServiceResult<Vec<Block>> {
        Ok(self.schema.list_sibling_blocks(uuid)?)
    }

    pub fn update_block(&self, block: &Block) -> SchemaServiceResult<()> {
        let stored = self.require_block(block.uuid)?;
        if stored.configuration_uuid != block.configuration_uuid {
            return Err(SchemaServiceError::ConfigurationMismatch {
                block_uuid: block.uuid,
                configuration_uuid: stored.configuration_uuid,
            });
        }
        if let Some(host_block_uuid) = block.host_block_uuid {
            if stored.host_block_uuid != Some(host_block_uuid) {
                self.ensure_valid_host(block, host_block_uuid)?;
            }
        }
        if stored.user_doc_page_uuid != block.user_doc_page_uuid {
            self.ensure_user_doc_page(block)?;
        }
        Ok(self.schema.update_block(block)?)
    }

    pub fn delete_block(&self, uuid: BlockId) -> SchemaServiceResult<()> {
        Ok(self.schema.delete_block(uuid)?)
    }

    /// Makes `block_uuid` a nested block of `host_block_uuid`.
    pub fn link_nested_to_host(
        &self,
        block_uuid: BlockId,
        host_block_uuid: BlockId,
    ) -> SchemaServiceResult<()> {
        let block = self.require_block(block_uuid)?;
        self.ensure_valid_host(&block, host_block_uuid)?;
        Ok(self.schema.set_host_block(block_uuid, Some(host_block_uuid))?)
    }

    /// Clears the host and resets the display kind to `list`.
    pub fn unlink_nested_from_host(&self, block_uuid: BlockId) -> SchemaServiceResult<()> {
        Ok(self.schema.set_host_block(block_uuid, None)?)
    }

    pub fn list_nested(&self, host_block_uuid: BlockId) -> SchemaServiceResult<Vec<Block>> {
        self.require_block(host_block_uuid)?;
        Ok(self.schema.list_nested_blocks(host_block_uuid)?)
    }

    pub fn list_tabs(&self, block_uuid: BlockId) -> SchemaServiceResult<Vec<BlockTab>> {
        self.require_block(block_uuid)?;
        Ok(self.schema.list_tabs(block_uuid)?)
    }

    /// Creates (appended) or updates one tab after checking what it points at.
    pub fn save_tab(&self, tab: &BlockTab) -> SchemaServiceResult<BlockTab> {
        let block = self.require_block(tab.block_uuid)?;
        match tab.tab_kind {
            TabKind::Relation => {
                if let Some(relation_uuid) = tab.relation_uuid {
                    let relation = self.require_relation(relation_uuid)?;
                    if relation.counterpart_of(block.uuid).is_none() {
                        return Err(SchemaServiceError::TabTargetMismatch(tab.uuid));
                    }
                }
            }
            TabKind::NestedBlock => {
                if let Some(nested_uuid) = tab.nested_block_uuid {
                    let nested = self.require_block(nested_uuid)?;
                    if nested.host_block_uuid != Some(block.uuid) {
                        return Err(SchemaServiceError::TabTargetMismatch(tab.uuid));
                    }
                }
            }
            TabKind::ReferencingParam => {
                if let Some(parameter_uuid) = tab.referencing_param_uuid {
                    let parameter = self.require_parameter(parameter_uuid)?;
                    if parameter.linked_block_uuid != Some(block.uuid) {
                        return Err(SchemaServiceError::TabTargetMismatch(tab.uuid));
                    }
                }
            }
            TabKind::Parameters | TabKind::Scenes => {}
        }
        Ok(self.schema.save_tab(tab)?)
    }

    pub fn delete_tab(&self, uuid: BlockTabId) -> SchemaServiceResult<()> {
        Ok(self.schema.delete_tab(uuid)?)
    }

    pub fn move_tab(&self, uuid: BlockTabId, direction: MoveDirection) -> SchemaServiceResult<bool> {
        Ok(self.schema.move_tab(uuid, direction)?)
    }

    pub fn list_relations_for_block(
        &self,
        block_uuid: BlockId,
    ) -> SchemaServiceResult<Vec<BlockRelation>> {
        Ok(self.schema.list_relations_for_block(block_uuid)?)
    }

    pub fn list_relations(
        &self,
        configuration_uuid: ConfigurationId,
    ) -> SchemaServiceResult<Vec<BlockRelation>> {
        Ok(self.schema.list_relations(configuration_uuid)?)
    }

    /// Saves a relation whose blocks both belong to its configuration.
    pub fn save_relation(&self, relation: &BlockRelation) -> SchemaServiceResult<()> {
        self.require_configuration(relation.configuration_uuid)?;
        for block_uuid in [relation.source_block_uuid, relation.target_block_uuid] {
            self.require_block_in(block_uuid, relation.configuration_uuid)?;
        }
        Ok(self.schema.save_relation(relation)?)
    }

    pub fn delete_relation(&self, uuid: BlockRelationId) -> SchemaServiceResult<()> {
        Ok(self.schema.delete_relation(uuid)?)
    }

    /// Blocks on the other side of every relation touching `block_uuid`.
    pub fn related_blocks(&self, block_uuid: BlockId) -> SchemaServiceResult<Vec<Block>> {
        self.require_block(block_uuid)?;
        let mut seen = HashSet::new();
        let mut related = Vec::new();
        for relation in self.schema.list_relations_for_block(block_uuid)? {
            let Some(other) = relation.counterpart_of(block_uuid) else {
                continue;
            };
            if seen.insert(other) {
                if let Some(block) = self.schema.get_block(other)? {
                    related.push(block);
                }
            }
        }
        Ok(related)
    }

    pub fn list_parameter_groups(
        &self,
        block_uuid: BlockId,
    ) -> SchemaServiceResult<Vec<BlockParameterGroup>> {
        self.require_block(block_uuid)?;
        Ok(self.parameters.list_groups(block_uuid)?)
    }

    /// Appends a new parameter group to the block.
    pub fn create_parameter_group(
        &self,
        block_uuid: BlockId,
        title: impl Into<String>,
    ) -> SchemaServiceResult<BlockParameterGroup> {
        self.require_block(block_uuid)?;
        let group = BlockParameterGroup::new(block_uuid, title);
        Ok(self.parameters.create_group(&group)?)
    }

    pub fn update_parameter_group(&self, group: &BlockParameterGroup) -> SchemaServiceResult<()> {
        Ok(self.parameters.update_group(group)?)
    }

    /// Deletes the group with its parameters.
    pub fn delete_parameter_group(&self, uuid: ParameterGroupId) -> SchemaServiceResult<()> {
        Ok(self.parameters.delete_group(uuid)?)
    }

    pub fn move_parameter_group(
        &self,
        uuid: ParameterGroupId,
        direction: MoveDirection,
    ) -> SchemaServiceResult<bool> {
        Ok(self.parameters.move_group(uuid, direction)?)
    }

    /// Appends a parameter to its group.
    pub fn create_parameter(
        &self,
        parameter: &BlockParameter,
    ) -> SchemaServiceResult<BlockParameter> {
        self.ensure_parameter_targets(parameter)?;
        Ok(self.parameters.create_parameter(parameter)?)
    }

    pub fn update_parameter(&self, parameter: &BlockParameter) -> SchemaServiceResult<()> {
        self.require_parameter(parameter.uuid)?;
        self.ensure_parameter_targets(parameter)?;
        Ok(self.parameters.update_parameter(parameter)?)
    }

    pub fn delete_parameter(&self, uuid: ParameterId) -> SchemaServiceResult<()> {
        Ok(self.parameters.delete_parameter(uuid)?)
    }

    pub fn move_parameter(
        &self,
        uuid: ParameterId,
        direction: MoveDirection,
    ) -> SchemaServiceResult<bool> {
        Ok(self.parameters.move_parameter(uuid, direction)?)
    }

    pub fn get_parameter(&self, uuid: ParameterId) -> SchemaServiceResult<Option<BlockParameter>> {
        Ok(self.parameters.get_parameter(uuid)?)
    }

    pub fn list_parameters_by_group(
        &self,
        group_uuid: ParameterGroupId,
    ) -> SchemaServiceResult<Vec<BlockParameter>> {
        Ok(self.parameters.list_parameters_by_group(group_uuid)?)
    }

    pub fn list_parameters_by_block(
        &self,
        block_uuid: BlockId,
    ) -> SchemaServiceResult<Vec<BlockParameter>> {
        Ok(self.parameters.list_parameters_by_block(block_uuid)?)
    }

    pub fn list_default_parameters(
        &self,
        block_uuid: BlockId,
    ) -> SchemaServiceResult<Vec<BlockParameter>> {
        Ok(self.parameters.list_default_parameters(block_uuid)?)
    }

    pub fn list_card_parameters(
        &self,
        block_uuid: BlockId,
    ) -> SchemaServiceResult<Vec<BlockParameter>> {
        Ok(self.parameters.list_card_parameters(block_uuid)?)
    }

    /// Link parameters of other blocks that point at `block_uuid`.
    pub fn list_referencing_parameters(
        &self,
        block_uuid: BlockId,
    ) -> SchemaServiceResult<Vec<BlockParameter>> {
        Ok(self.parameters.list_referencing_parameters(block_uuid)?)
    }

    pub fn list_link_parameters(
        &self,
        block_uuid: BlockId,
    ) -> SchemaServiceResult<Vec<BlockParameter>> {
        Ok(self.parameters.list_link_parameters(block_uuid)?)
    }

    pub fn grouping_parameter(
        &self,
        block_uuid: BlockId,
    ) -> SchemaServiceResult<Option<BlockParameter>> {
        Ok(self.parameters.grouping_parameter(block_uuid)?)
    }

    pub fn list_possible_values(
        &self,
        parameter_uuid: ParameterId,
    ) -> SchemaServiceResult<Vec<PossibleValue>> {
        Ok(self.parameters.list_possible_values(parameter_uuid)?)
    }

    /// Replaces all options of a dropdown parameter.
    pub fn replace_possible_values(
        &self,
        parameter_uuid: ParameterId,
        values: &[String],
    ) -> SchemaServiceResult<Vec<PossibleValue>> {
        let parameter = self.require_parameter(parameter_uuid)?;
        if parameter.data_type != ParameterDataType::Dropdown {
            return Err(SchemaServiceError::PossibleValuesNotAllowed(parameter_uuid));
        }
        Ok(self.parameters.replace_possible_values(parameter_uuid, values)?)
    }

    fn ensure_parameter_targets(&self, parameter: &BlockParameter) -> SchemaServiceResult<()> {
        let block = self.require_block(parameter.block_uuid)?;
        let group = self
            .parameters
            .get_group(parameter.group_uuid)?
            .ok_or(SchemaServiceError::GroupNotFound(parameter.group_uuid))?;
        if group.block_uuid != block.uuid {
            return Err(SchemaServiceError::GroupBlockMismatch {
                group_uuid: group.uuid,
                block_uuid: block.uuid,
            });
        }
        if let Some(linked_block_uuid) = parameter.linked_block_uuid {
            self.require_block_in(linked_block_uuid, block.configuration_uuid)?;
        }
        Ok(())
    }

    fn ensure_user_doc_page(&self, block: &Block) -> SchemaServiceResult<()> {
        match block.user_doc_page_uuid {
            Some(page_uuid) if !self.schema.user_doc_page_exists(page_uuid)? => {
                Err(SchemaServiceError::UserDocPageNotFound(page_uuid))
            }
            _ => Ok(()),
        }
    }

    fn ensure_valid_host(&self, block: &Block, host_block_uuid: BlockId) -> SchemaServiceResult<()> {
        if host_block_uuid == block.uuid {
            return Err(SchemaServiceError::HostCycle {
                block_uuid: block.uuid,
                host_block_uuid,
            });
        }
        self.require_block_in(host_block_uuid, block.configuration_uuid)?;
        if self.would_create_host_cycle(block.uuid, host_block_uuid)? {
            return Err(SchemaServiceError::HostCycle {
                block_uuid: block.uuid,
                host_block_uuid,
            });
        }
        Ok(())
    }

    fn would_create_host_cycle(
        &self,
        block_uuid: BlockId,
        candidate_host_uuid: BlockId,
    ) -> SchemaServiceResult<bool> {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_host_uuid);
        while let Some(current) = cursor {
            if current == block_uuid || !visited.insert(current) {
                return Ok(true);
            }
            cursor = self.require_block(current)?.host_block_uuid;
        }
        Ok(false)
    }

    fn require_configuration(
        &self,
        uuid: ConfigurationId,
    ) -> SchemaServiceResult<BookConfiguration> {
        self.schema
            .get_configuration(uuid)?
            .ok_or(SchemaServiceError::ConfigurationNotFound(uuid))
    }

    fn require_block(&self, uuid: BlockId) -> SchemaServiceResult<Block> {
        self.schema
            .get_block(uuid)?
            .ok_or(SchemaServiceError::BlockNotFound(uuid))
    }

    fn require_block_in(
        &self,
        uuid: BlockId,
        configuration_uuid: ConfigurationId,
    ) -> SchemaServiceResult<Block> {
        let block = self.require_block(uuid)?;
        if block.configuration_uuid != configuration_uuid {
            return Err(SchemaServiceError::ConfigurationMismatch {
                block_uuid: uuid,
                configuration_uuid,
            });
        }
        Ok(block)
    }

    fn require_relation(&self, uuid: BlockRelationId) -> SchemaServiceResult<BlockRelation> {
        self.schema
            .get_relation(uuid)?
            .ok_or(SchemaServiceError::RelationNotFound(uuid))
    }

    fn require_parameter(&self, uuid: ParameterId) -> SchemaServiceResult<BlockParameter> {
        self.parameters
            .get_parameter(uuid)?
            .ok_or(SchemaServiceError::ParameterNotFound(uuid))
    }
}
