//! Block domain model: user-defined entity types.
//!
//! # Responsibility
//! - Describe one runtime entity type (title, structure, display, nesting).
//! - Describe tabs and declared block-to-block relations.
//!
//! # Invariants
//! - A block never hosts itself (`host_block_uuid != uuid`).
//! - Relations connect two different blocks.
//! - Tab kinds that point at another object carry that object's UUID.

use crate::model::{require_text, ModelValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type BlockId = Uuid;
pub type BlockTabId = Uuid;
pub type BlockRelationId = Uuid;

/// Whether a block holds exactly one instance or a list of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Single,
    Multiple,
}

impl StructureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Multiple => "multiple",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "single" => Some(Self::Single),
            "multiple" => Some(Self::Multiple),
            _ => None,
        }
    }
}

/// How instances of a block are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayKind {
    List,
    TimeLine,
}

impl DisplayKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::TimeLine => "time_line",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "list" => Some(Self::List),
            "time_line" => Some(Self::TimeLine),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconKind {
    GameIcons,
    Custom,
}

/// Icon reference, stored as JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    pub icon_kind: IconKind,
    pub icon_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_base64: Option<String>,
}

/// Grammatical forms of a block title, stored as JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleForms {
    pub nominative: String,
    pub genitive: String,
    pub dative: String,
    pub accusative: String,
    pub instrumental: String,
    pub prepositional: String,
    pub plural: String,
}

impl TitleForms {
    /// Uses `title` for every form.
    pub fn uniform(title: &str) -> Self {
        let title = title.trim().to_string();
        Self {
            nominative: title.clone(),
            genitive: title.clone(),
            dative: title.clone(),
            accusative: title.clone(),
            instrumental: title.clone(),
            prepositional: title.clone(),
            plural: title,
        }
    }
}

/// User-defined entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub uuid: BlockId,
    pub configuration_uuid: Uuid,
    pub title: String,
    pub description: String,
    pub use_tabs: bool,
    pub use_groups: bool,
    pub structure_kind: StructureKind,
    pub display_kind: DisplayKind,
    /// Block whose instances host instances of this one.
    pub host_block_uuid: Option<BlockId>,
    pub title_forms: Option<TitleForms>,
    pub scene_link_allowed: bool,
    pub icon: Option<Icon>,
    pub show_in_scene_list: bool,
    pub show_in_main_menu: bool,
    pub tree_view: bool,
    pub show_big_header: bool,
    /// Knowledge-base page describing this block.
    pub user_doc_page_uuid: Option<Uuid>,
}

impl Block {
    /// Creates a top-level list block with creation defaults.
    pub fn new(
        configuration_uuid: Uuid,
        title: impl Into<String>,
        structure_kind: StructureKind,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            configuration_uuid,
            title: title.into(),
            description: String::new(),
            use_tabs: false,
            use_groups: false,
            structure_kind,
            display_kind: DisplayKind::List,
            host_block_uuid: None,
            title_forms: None,
            scene_link_allowed: false,
            icon: None,
            show_in_scene_list: false,
            show_in_main_menu: true,
            tree_view: false,
            show_big_header: false,
            user_doc_page_uuid: None,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("block title", &self.title)?;
        if self.host_block_uuid == Some(self.uuid) {
            return Err(ModelValidationError::SelfReference {
                field: "host_block_uuid",
                uuid: self.uuid,
            });
        }
        Ok(())
    }

    pub fn is_single(&self) -> bool {
        self.structure_kind == StructureKind::Single
    }

    /// Title shown in navigation: capitalised plural for list blocks.
    pub fn display_title(&self) -> String {
        if self.structure_kind == StructureKind::Multiple {
            if let Some(forms) = &self.title_forms {
                let plural = capitalize_first(forms.plural.trim());
                if !plural.is_empty() {
                    return plural;
                }
            }
        }
        self.title.clone()
    }
}

fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabKind {
    Parameters,
    Relation,
    NestedBlock,
    ReferencingParam,
    Scenes,
}

impl TabKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parameters => "parameters",
            Self::Relation => "relation",
            Self::NestedBlock => "nested_block",
            Self::ReferencingParam => "referencing_param",
            Self::Scenes => "scenes",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "parameters" => Some(Self::Parameters),
            "relation" => Some(Self::Relation),
            "nested_block" => Some(Self::NestedBlock),
            "referencing_param" => Some(Self::ReferencingParam),
            "scenes" => Some(Self::Scenes),
            _ => None,
        }
    }
}

/// One tab of a block's instance editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTab {
    pub uuid: BlockTabId,
    pub block_uuid: BlockId,
    pub title: String,
    pub order_number: i64,
    pub tab_kind: TabKind,
    pub relation_uuid: Option<BlockRelationId>,
    pub nested_block_uuid: Option<BlockId>,
    pub referencing_param_uuid: Option<Uuid>,
    pub is_default: bool,
}

impl BlockTab {
    pub fn new(block_uuid: BlockId, title: impl Into<String>, tab_kind: TabKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            block_uuid,
            title: title.into(),
            order_number: 0,
            tab_kind,
            relation_uuid: None,
            nested_block_uuid: None,
            referencing_param_uuid: None,
            is_default: false,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_text("tab title", &self.title)?;
        let missing = match self.tab_kind {
            TabKind::Relation => self.relation_uuid.is_none().then_some("relation_uuid"),
            TabKind::NestedBlock => self
                .nested_block_uuid
                .is_none()
                .then_some("nested_block_uuid"),
            TabKind::ReferencingParam => self
                .referencing_param_uuid
                .is_none()
                .then_some("referencing_param_uuid"),
            TabKind::Parameters | TabKind::Scenes => None,
        };
        if let Some(field) = missing {
            return Err(ModelValidationError::InvalidCombination(format!(
                "`{}` tab requires {field}",
                self.tab_kind.as_str()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToOne => "many_to_one",
            Self::ManyToMany => "many_to_many",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "one_to_one" => Some(Self::OneToOne),
            "one_to_many" => Some(Self::OneToMany),
            "many_to_one" => Some(Self::ManyToOne),
            "many_to_many" => Some(Self::ManyToMany),
            _ => None,
        }
    }
}

/// Declared association between two blocks of one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRelation {
    pub uuid: BlockRelationId,
    pub configuration_uuid: Uuid,
    pub source_block_uuid: BlockId,
    pub target_block_uuid: BlockId,
    pub relation_type: RelationType,
}

impl BlockRelation {
    pub fn new(
        configuration_uuid: Uuid,
        source_block_uuid: BlockId,
        target_block_uuid: BlockId,
        relation_type: RelationType,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            configuration_uuid,
            source_block_uuid,
            target_block_uuid,
            relation_type,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.source_block_uuid == self.target_block_uuid {
            return Err(ModelValidationError::SelfReference {
                field: "target_block_uuid",
                uuid: self.source_block_uuid,
            });
        }
        Ok(())
    }

    /// Returns the block on the other side of `block_uuid`, if it takes part.
    pub fn counterpart_of(&self, block_uuid: BlockId) -> Option<BlockId> {
        if self.source_block_uuid == block_uuid {
            Some(self.target_block_uuid)
        } else if self.target_block_uuid == block_uuid {
            Some(self.source_block_uuid)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Block, BlockTab, StructureKind, TabKind, TitleForms};
    use crate::model::ModelValidationError;
    use uuid::Uuid;

    #[test]
    fn display_title_uses_capitalised_plural_for_multiple_blocks() {
        let mut block = Block::new(Uuid::new_v4(), "character", StructureKind::Multiple);
        let mut forms = TitleForms::uniform("character");
        forms.plural = "персонажи".to_string();
        block.title_forms = Some(forms);
        assert_eq!(block.display_title(), "Персонажи");

        block.structure_kind = StructureKind::Single;
        assert_eq!(block.display_title(), "character");
    }

    #[test]
    fn block_rejects_self_hosting() {
        let mut block = Block::new(Uuid::new_v4(), "Places", StructureKind::Multiple);
        block.host_block_uuid = Some(block.uuid);
        assert!(matches!(
            block.validate(),
            Err(ModelValidationError::SelfReference { .. })
        ));
    }

    #[test]
    fn relation_tab_requires_relation_uuid() {
        let tab = BlockTab::new(Uuid::new_v4(), "Friends", TabKind::Relation);
        assert!(matches!(
            tab.validate(),
            Err(ModelValidationError::InvalidCombination(_))
        ));
    }
}
