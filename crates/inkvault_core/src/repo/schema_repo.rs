//! Configuration, block, tab and block-relation persistence.
//!
//! # Responsibility
//! - Provide CRUD over the schema tables shared by library and book stores.
//! - Create block defaults (parameter group, tab, lone instance) atomically.
//! - Own the block delete cascade.
//! - Export a configuration as a self-contained snapshot, knowledge-base
//!   pages included.
//!
//! # Invariants
//! - Every block owns at least one parameter group after creation.
//! - Deleting a block leaves no rows that reference it.
//! - In a book store a `single` block always has exactly one instance after
//!   create/update.

use crate::db::StoreKind;
use crate::model::block::{
    Block, BlockId, BlockRelation, BlockRelationId, BlockTab, BlockTabId, DisplayKind,
    RelationType, StructureKind, TabKind, TitleForms,
};
use crate::model::configuration::{BookConfiguration, ConfigurationId};
use crate::model::parameter::{BlockParameter, BlockParameterGroup, PossibleValue};
use crate::model::user_doc::{UserDocPage, UserDocPageId};
use crate::repo::instance_repo::{delete_instances_of_block, ensure_lone_instance};
use crate::repo::parameter_repo::{
    delete_parameter_cascade, delete_parameters_of_block, insert_group_row,
    list_groups_of_block, list_possible_values, query_parameters,
};
use crate::repo::user_doc_repo::list_configuration_pages;
use crate::repo::{
    bool_to_int, ensure_connection_ready, int_to_bool, move_in_scope, next_order_number,
    optional_json, optional_uuid_text, parse_optional_json, parse_optional_uuid, parse_uuid,
    renumber_scope, row_exists, scope_of, touch_store, MoveDirection, RepoError, RepoResult,
    RequiredTable,
};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

/// Title of the parameter group every new block starts with.
pub const DEFAULT_GROUP_TITLE: &str = "Main";
/// Title of the `parameters` tab every new block starts with.
pub const DEFAULT_TAB_TITLE: &str = "Parameters";

const CONFIGURATION_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    description
FROM book_configurations";

const BLOCK_SELECT_SQL: &str = "SELECT
    uuid,
    configuration_uuid,
    title,
    description,
    use_tabs,
    use_groups,
    structure_kind,
    display_kind,
    host_block_uuid,
    title_forms,
    scene_link_allowed,
    icon,
    show_in_scene_list,
    show_in_main_menu,
    tree_view,
    show_big_header,
    user_doc_page_uuid
FROM blocks";

const TAB_SELECT_SQL: &str = "SELECT
    uuid,
    block_uuid,
    title,
    order_number,
    tab_kind,
    relation_uuid,
    nested_block_uuid,
    referencing_param_uuid,
    is_default
FROM block_tabs";

const RELATION_SELECT_SQL: &str = "SELECT
    uuid,
    configuration_uuid,
    source_block_uuid,
    target_block_uuid,
    relation_type
FROM block_relations";

const REQUIRED_TABLES: &[RequiredTable] = &[
    RequiredTable {
        name: "book_configurations",
        columns: &["uuid", "title", "description"],
    },
    RequiredTable {
        name: "blocks",
        columns: &[
            "uuid",
            "configuration_uuid",
            "structure_kind",
            "host_block_uuid",
            "title_forms",
            "tree_view",
            "show_big_header",
            "user_doc_page_uuid",
        ],
    },
    RequiredTable {
        name: "block_tabs",
        columns: &[
            "uuid",
            "block_uuid",
            "tab_kind",
            "relation_uuid",
            "nested_block_uuid",
            "referencing_param_uuid",
        ],
    },
    RequiredTable {
        name: "block_relations",
        columns: &["uuid", "configuration_uuid", "source_block_uuid"],
    },
    RequiredTable {
        name: "user_doc_pages",
        columns: &["uuid", "configuration_uuid"],
    },
];

/// Self-contained copy of one configuration and every schema row under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationSnapshot {
    pub configuration: BookConfiguration,
    pub blocks: Vec<Block>,
    pub parameter_groups: Vec<BlockParameterGroup>,
    pub parameters: Vec<BlockParameter>,
    pub possible_values: Vec<PossibleValue>,
    pub relations: Vec<BlockRelation>,
    pub tabs: Vec<BlockTab>,
    pub user_doc_pages: Vec<UserDocPage>,
}

/// Repository interface for configuration schemas.
pub trait SchemaRepository {
    fn create_configuration(&self, configuration: &BookConfiguration)
        -> RepoResult<ConfigurationId>;
    fn get_configuration(&self, uuid: ConfigurationId) -> RepoResult<Option<BookConfiguration>>;
    fn list_configurations(&self) -> RepoResult<Vec<BookConfiguration>>;
    fn update_configuration(&self, configuration: &BookConfiguration) -> RepoResult<()>;
    /// Deletes the configuration with all its blocks, relations and
    /// knowledge-base pages.
    fn delete_configuration(&self, uuid: ConfigurationId) -> RepoResult<()>;

    /// Inserts a block with its default group and tab.
    fn create_block(&self, block: &Block) -> RepoResult<BlockId>;
    fn get_block(&self, uuid: BlockId) -> RepoResult<Option<Block>>;
    fn list_blocks(&self, configuration_uuid: ConfigurationId) -> RepoResult<Vec<Block>>;
    /// Other blocks of the same configuration.
    fn list_sibling_blocks(&self, uuid: BlockId) -> RepoResult<Vec<Block>>;
    fn update_block(&self, block: &Block) -> RepoResult<()>;
    fn delete_block(&self, uuid: BlockId) -> RepoResult<()>;
    /// Sets or clears the host block; clearing also resets display to `list`.
    fn set_host_block(&self, uuid: BlockId, host_block_uuid: Option<BlockId>) -> RepoResult<()>;
    fn list_nested_blocks(&self, host_block_uuid: BlockId) -> RepoResult<Vec<Block>>;
    fn user_doc_page_exists(&self, uuid: UserDocPageId) -> RepoResult<bool>;

    fn list_tabs(&self, block_uuid: BlockId) -> RepoResult<Vec<BlockTab>>;
    fn get_tab(&self, uuid: BlockTabId) -> RepoResult<Option<BlockTab>>;
    /// Inserts (appended) or updates one tab.
    fn save_tab(&self, tab: &BlockTab) -> RepoResult<BlockTab>;
    fn delete_tab(&self, uuid: BlockTabId) -> RepoResult<()>;
    fn move_tab(&self, uuid: BlockTabId, direction: MoveDirection) -> RepoResult<bool>;

    /// Relations where the block is on either side.
    fn list_relations_for_block(&self, block_uuid: BlockId) -> RepoResult<Vec<BlockRelation>>;
    fn list_relations(&self, configuration_uuid: ConfigurationId)
        -> RepoResult<Vec<BlockRelation>>;
    fn get_relation(&self, uuid: BlockRelationId) -> RepoResult<Option<BlockRelation>>;
    fn save_relation(&self, relation: &BlockRelation) -> RepoResult<()>;
    fn delete_relation(&self, uuid: BlockRelationId) -> RepoResult<()>;

    fn export_configuration(
        &self,
        uuid: ConfigurationId,
    ) -> RepoResult<Option<ConfigurationSnapshot>>;
}

/// SQLite-backed schema repository.
pub struct SqliteSchemaRepository<'conn> {
    conn: &'conn Connection,
    store: StoreKind,
}

impl<'conn> SqliteSchemaRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let store = ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn, store })
    }

    /// Kind of the store this repository writes to.
    pub fn store(&self) -> StoreKind {
        self.store
    }
}

impl SchemaRepository for SqliteSchemaRepository<'_> {
    fn create_configuration(
        &self,
        configuration: &BookConfiguration,
    ) -> RepoResult<ConfigurationId> {
        configuration.validate()?;
        insert_configuration_row(self.conn, configuration)?;
        touch_store(self.conn, self.store)?;
        Ok(configuration.uuid)
    }

    fn get_configuration(&self, uuid: ConfigurationId) -> RepoResult<Option<BookConfiguration>> {
        Ok(query_configurations(self.conn, Some(uuid))?.into_iter().next())
    }

    fn list_configurations(&self) -> RepoResult<Vec<BookConfiguration>> {
        query_configurations(self.conn, None)
    }

    fn update_configuration(&self, configuration: &BookConfiguration) -> RepoResult<()> {
        configuration.validate()?;
        let changed = self.conn.execute(
            "UPDATE book_configurations
             SET title = ?2,
                 description = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![
                configuration.uuid.to_string(),
                configuration.title.trim(),
                configuration.description.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "configuration",
                uuid: configuration.uuid,
            });
        }
        touch_store(self.conn, self.store)
    }

    fn delete_configuration(&self, uuid: ConfigurationId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !row_exists(&tx, "book_configurations", uuid)? {
            return Err(RepoError::NotFound {
                entity: "configuration",
                uuid,
            });
        }
        for block in query_blocks(&tx, "configuration_uuid = ?1", uuid)? {
            delete_block_cascade(&tx, self.store, block.uuid)?;
        }
        for relation in query_relations(&tx, "configuration_uuid = ?1", uuid)? {
            delete_relation_cascade(&tx, self.store, relation.uuid)?;
        }
        tx.execute(
            "DELETE FROM user_doc_pages WHERE configuration_uuid = ?1;",
            [uuid.to_string()],
        )?;
        tx.execute(
            "DELETE FROM book_configurations WHERE uuid = ?1;",
            [uuid.to_string()],
        )?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn create_block(&self, block: &Block) -> RepoResult<BlockId> {
        block.validate()?;
        let mut stored = block.clone();
        if stored.title_forms.is_none() {
            stored.title_forms = Some(TitleForms::uniform(&stored.title));
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        insert_block_row(&tx, &stored)?;

        let group = BlockParameterGroup::new(stored.uuid, DEFAULT_GROUP_TITLE);
        insert_group_row(&tx, &group)?;

        let mut tab = BlockTab::new(stored.uuid, DEFAULT_TAB_TITLE, TabKind::Parameters);
        tab.is_default = true;
        insert_tab_row(&tx, &tab)?;

        if self.store == StoreKind::Book {
            ensure_lone_instance(&tx, &stored)?;
        }
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(stored.uuid)
    }

    fn get_block(&self, uuid: BlockId) -> RepoResult<Option<Block>> {
        Ok(query_blocks(self.conn, "uuid = ?1", uuid)?.into_iter().next())
    }

    fn list_blocks(&self, configuration_uuid: ConfigurationId) -> RepoResult<Vec<Block>> {
        query_blocks(self.conn, "configuration_uuid = ?1", configuration_uuid)
    }

    fn list_sibling_blocks(&self, uuid: BlockId) -> RepoResult<Vec<Block>> {
        let block = self.get_block(uuid)?.ok_or(RepoError::NotFound {
            entity: "block",
            uuid,
        })?;
        Ok(self
            .list_blocks(block.configuration_uuid)?
            .into_iter()
            .filter(|sibling| sibling.uuid != uuid)
            .collect())
    }

    fn update_block(&self, block: &Block) -> RepoResult<()> {
        block.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE blocks
             SET title = ?2,
                 description = ?3,
                 use_tabs = ?4,
                 use_groups = ?5,
                 structure_kind = ?6,
                 display_kind = ?7,
                 host_block_uuid = ?8,
                 title_forms = ?9,
                 scene_link_allowed = ?10,
                 icon = ?11,
                 show_in_scene_list = ?12,
                 show_in_main_menu = ?13,
                 tree_view = ?14,
                 show_big_header = ?15,
                 user_doc_page_uuid = ?16,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![
                block.uuid.to_string(),
                block.title.trim(),
                block.description.as_str(),
                bool_to_int(block.use_tabs),
                bool_to_int(block.use_groups),
                block.structure_kind.as_str(),
                block.display_kind.as_str(),
                optional_uuid_text(block.host_block_uuid),
                optional_json(block.title_forms.as_ref(), "blocks.title_forms")?,
                bool_to_int(block.scene_link_allowed),
                optional_json(block.icon.as_ref(), "blocks.icon")?,
                bool_to_int(block.show_in_scene_list),
                bool_to_int(block.show_in_main_menu),
                bool_to_int(block.tree_view),
                bool_to_int(block.show_big_header),
                optional_uuid_text(block.user_doc_page_uuid),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "block",
                uuid: block.uuid,
            });
        }

        if self.store == StoreKind::Book {
            ensure_lone_instance(&tx, block)?;
        }
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_block(&self, uuid: BlockId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !row_exists(&tx, "blocks", uuid)? {
            return Err(RepoError::NotFound {
                entity: "block",
                uuid,
            });
        }
        delete_block_cascade(&tx, self.store, uuid)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn set_host_block(&self, uuid: BlockId, host_block_uuid: Option<BlockId>) -> RepoResult<()> {
        let changed = match host_block_uuid {
            Some(host) => self.conn.execute(
                "UPDATE blocks
                 SET host_block_uuid = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1;",
                params![uuid.to_string(), host.to_string()],
            )?,
            None => self.conn.execute(
                "UPDATE blocks
                 SET host_block_uuid = NULL,
                     display_kind = 'list',
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1;",
                [uuid.to_string()],
            )?,
        };
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "block",
                uuid,
            });
        }
        touch_store(self.conn, self.store)
    }

    fn list_nested_blocks(&self, host_block_uuid: BlockId) -> RepoResult<Vec<Block>> {
        query_blocks(self.conn, "host_block_uuid = ?1", host_block_uuid)
    }

    fn user_doc_page_exists(&self, uuid: UserDocPageId) -> RepoResult<bool> {
        row_exists(self.conn, "user_doc_pages", uuid)
    }

    fn list_tabs(&self, block_uuid: BlockId) -> RepoResult<Vec<BlockTab>> {
        query_tabs(self.conn, "block_uuid = ?1", block_uuid)
    }

    fn get_tab(&self, uuid: BlockTabId) -> RepoResult<Option<BlockTab>> {
        Ok(query_tabs(self.conn, "uuid = ?1", uuid)?.into_iter().next())
    }

    fn save_tab(&self, tab: &BlockTab) -> RepoResult<BlockTab> {
        tab.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut saved = tab.clone();
        if row_exists(&tx, "block_tabs", tab.uuid)? {
            tx.execute(
                "UPDATE block_tabs
                 SET title = ?2,
                     tab_kind = ?3,
                     relation_uuid = ?4,
                     nested_block_uuid = ?5,
                     referencing_param_uuid = ?6,
                     is_default = ?7
                 WHERE uuid = ?1;",
                params![
                    tab.uuid.to_string(),
                    tab.title.trim(),
                    tab.tab_kind.as_str(),
                    optional_uuid_text(tab.relation_uuid),
                    optional_uuid_text(tab.nested_block_uuid),
                    optional_uuid_text(tab.referencing_param_uuid),
                    bool_to_int(tab.is_default),
                ],
            )?;
            saved.order_number = query_tabs(&tx, "uuid = ?1", tab.uuid)?
                .first()
                .map_or(tab.order_number, |stored| stored.order_number);
        } else {
            saved.order_number =
                next_order_number(&tx, "block_tabs", "block_uuid", Some(tab.block_uuid))?;
            insert_tab_row(&tx, &saved)?;
        }
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(saved)
    }

    fn delete_tab(&self, uuid: BlockTabId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let block_uuid = scope_of(&tx, "block_tabs", "block_uuid", uuid)?.ok_or(
            RepoError::NotFound {
                entity: "tab",
                uuid,
            },
        )?;
        tx.execute("DELETE FROM block_tabs WHERE uuid = ?1;", [uuid.to_string()])?;
        renumber_scope(&tx, "block_tabs", "block_uuid", block_uuid)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn move_tab(&self, uuid: BlockTabId, direction: MoveDirection) -> RepoResult<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let block_uuid = scope_of(&tx, "block_tabs", "block_uuid", uuid)?.ok_or(
            RepoError::NotFound {
                entity: "tab",
                uuid,
            },
        )?;
        let moved = move_in_scope(&tx, "block_tabs", "block_uuid", block_uuid, uuid, direction)?;
        if moved {
            touch_store(&tx, self.store)?;
        }
        tx.commit()?;
        Ok(moved)
    }

    fn list_relations_for_block(&self, block_uuid: BlockId) -> RepoResult<Vec<BlockRelation>> {
        query_relations(
            self.conn,
            "source_block_uuid = ?1 OR target_block_uuid = ?1",
            block_uuid,
        )
    }

    fn list_relations(
        &self,
        configuration_uuid: ConfigurationId,
    ) -> RepoResult<Vec<BlockRelation>> {
        query_relations(self.conn, "configuration_uuid = ?1", configuration_uuid)
    }

    fn get_relation(&self, uuid: BlockRelationId) -> RepoResult<Option<BlockRelation>> {
        Ok(query_relations(self.conn, "uuid = ?1", uuid)?
            .into_iter()
            .next())
    }

    fn save_relation(&self, relation: &BlockRelation) -> RepoResult<()> {
        relation.validate()?;
        self.conn.execute(
            "INSERT INTO block_relations (
                uuid,
                configuration_uuid,
                source_block_uuid,
                target_block_uuid,
                relation_type
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(uuid) DO UPDATE SET
                source_block_uuid = excluded.source_block_uuid,
                target_block_uuid = excluded.target_block_uuid,
                relation_type = excluded.relation_type;",
            params![
                relation.uuid.to_string(),
                relation.configuration_uuid.to_string(),
                relation.source_block_uuid.to_string(),
                relation.target_block_uuid.to_string(),
                relation.relation_type.as_str(),
            ],
        )?;
        touch_store(self.conn, self.store)
    }

    fn delete_relation(&self, uuid: BlockRelationId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !row_exists(&tx, "block_relations", uuid)? {
            return Err(RepoError::NotFound {
                entity: "relation",
                uuid,
            });
        }
        delete_relation_cascade(&tx, self.store, uuid)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn export_configuration(
        &self,
        uuid: ConfigurationId,
    ) -> RepoResult<Option<ConfigurationSnapshot>> {
        let Some(configuration) = self.get_configuration(uuid)? else {
            return Ok(None);
        };

        let blocks = self.list_blocks(uuid)?;
        let mut parameter_groups = Vec::new();
        let mut parameters = Vec::new();
        let mut possible_values = Vec::new();
        let mut tabs = Vec::new();
        for block in &blocks {
            parameter_groups.extend(list_groups_of_block(self.conn, block.uuid)?);
            let block_parameters = query_parameters(self.conn, "block_uuid = ?1", block.uuid)?;
            for parameter in &block_parameters {
                possible_values.extend(list_possible_values(self.conn, parameter.uuid)?);
            }
            parameters.extend(block_parameters);
            tabs.extend(self.list_tabs(block.uuid)?);
        }

        Ok(Some(ConfigurationSnapshot {
            configuration,
            blocks,
            parameter_groups,
            parameters,
            possible_values,
            relations: self.list_relations(uuid)?,
            tabs,
            user_doc_pages: list_configuration_pages(self.conn, uuid)?,
        }))
    }
}

pub(crate) fn insert_configuration_row(
    conn: &Connection,
    configuration: &BookConfiguration,
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO book_configurations (uuid, title, description)
         VALUES (?1, ?2, ?3);",
        params![
            configuration.uuid.to_string(),
            configuration.title.trim(),
            configuration.description.as_str(),
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_block_row(conn: &Connection, block: &Block) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO blocks (
            uuid,
            configuration_uuid,
            title,
            description,
            use_tabs,
            use_groups,
            structure_kind,
            display_kind,
            host_block_uuid,
            title_forms,
            scene_link_allowed,
            icon,
            show_in_scene_list,
            show_in_main_menu,
            tree_view,
            show_big_header,
            user_doc_page_uuid
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17);",
        params![
            block.uuid.to_string(),
            block.configuration_uuid.to_string(),
            block.title.trim(),
            block.description.as_str(),
            bool_to_int(block.use_tabs),
            bool_to_int(block.use_groups),
            block.structure_kind.as_str(),
            block.display_kind.as_str(),
            optional_uuid_text(block.host_block_uuid),
            optional_json(block.title_forms.as_ref(), "blocks.title_forms")?,
            bool_to_int(block.scene_link_allowed),
            optional_json(block.icon.as_ref(), "blocks.icon")?,
            bool_to_int(block.show_in_scene_list),
            bool_to_int(block.show_in_main_menu),
            bool_to_int(block.tree_view),
            bool_to_int(block.show_big_header),
            optional_uuid_text(block.user_doc_page_uuid),
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_tab_row(conn: &Connection, tab: &BlockTab) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO block_tabs (
            uuid,
            block_uuid,
            title,
            order_number,
            tab_kind,
            relation_uuid,
            nested_block_uuid,
            referencing_param_uuid,
            is_default
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
        params![
            tab.uuid.to_string(),
            tab.block_uuid.to_string(),
            tab.title.trim(),
            tab.order_number,
            tab.tab_kind.as_str(),
            optional_uuid_text(tab.relation_uuid),
            optional_uuid_text(tab.nested_block_uuid),
            optional_uuid_text(tab.referencing_param_uuid),
            bool_to_int(tab.is_default),
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_relation_row(conn: &Connection, relation: &BlockRelation) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO block_relations (
            uuid,
            configuration_uuid,
            source_block_uuid,
            target_block_uuid,
            relation_type
        ) VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            relation.uuid.to_string(),
            relation.configuration_uuid.to_string(),
            relation.source_block_uuid.to_string(),
            relation.target_block_uuid.to_string(),
            relation.relation_type.as_str(),
        ],
    )?;
    Ok(())
}

/// Deletes one block and every schema (and, in a book store, instance) row
/// that belongs to or points at it. Blocks it hosts become top-level.
fn delete_block_cascade(conn: &Connection, store: StoreKind, uuid: BlockId) -> RepoResult<()> {
    let key = uuid.to_string();

    for relation in query_relations(
        conn,
        "source_block_uuid = ?1 OR target_block_uuid = ?1",
        uuid,
    )? {
        delete_relation_cascade(conn, store, relation.uuid)?;
    }

    for parameter in query_parameters(
        conn,
        "linked_block_uuid = ?1 AND block_uuid <> ?1",
        uuid,
    )? {
        delete_parameter_cascade(conn, store, parameter.uuid)?;
        renumber_scope(conn, "block_parameters", "group_uuid", Some(parameter.group_uuid))?;
    }
    delete_parameters_of_block(conn, store, uuid)?;

    let nested_tab_scopes = query_tabs(
        conn,
        "tab_kind = 'nested_block' AND nested_block_uuid = ?1 AND block_uuid <> ?1",
        uuid,
    )?
    .into_iter()
    .map(|tab| tab.block_uuid)
    .collect::<Vec<_>>();
    conn.execute(
        "DELETE FROM block_tabs
         WHERE block_uuid = ?1
            OR (tab_kind = 'nested_block' AND nested_block_uuid = ?1);",
        [key.as_str()],
    )?;
    for block_uuid in nested_tab_scopes {
        renumber_scope(conn, "block_tabs", "block_uuid", Some(block_uuid))?;
    }
    conn.execute(
        "UPDATE blocks
         SET host_block_uuid = NULL,
             display_kind = 'list',
             updated_at = (strftime('%s', 'now') * 1000)
         WHERE host_block_uuid = ?1;",
        [key.as_str()],
    )?;

    if store == StoreKind::Book {
        delete_instances_of_block(conn, uuid)?;
        conn.execute(
            "DELETE FROM block_instance_groups WHERE block_uuid = ?1;",
            [key.as_str()],
        )?;
    }

    conn.execute("DELETE FROM blocks WHERE uuid = ?1;", [key.as_str()])?;
    Ok(())
}

/// Deletes one relation, the tabs showing it and its instance relations.
fn delete_relation_cascade(
    conn: &Connection,
    store: StoreKind,
    uuid: BlockRelationId,
) -> RepoResult<()> {
    let key = uuid.to_string();
    let tab_scopes = query_tabs(conn, "relation_uuid = ?1", uuid)?
        .into_iter()
        .map(|tab| tab.block_uuid)
        .collect::<Vec<_>>();
    conn.execute(
        "DELETE FROM block_tabs WHERE relation_uuid = ?1;",
        [key.as_str()],
    )?;
    for block_uuid in tab_scopes {
        renumber_scope(conn, "block_tabs", "block_uuid", Some(block_uuid))?;
    }
    if store == StoreKind::Book {
        conn.execute(
            "DELETE FROM block_instance_relations WHERE block_relation_uuid = ?1;",
            [key.as_str()],
        )?;
    }
    conn.execute("DELETE FROM block_relations WHERE uuid = ?1;", [key.as_str()])?;
    Ok(())
}

fn query_configurations(
    conn: &Connection,
    uuid: Option<ConfigurationId>,
) -> RepoResult<Vec<BookConfiguration>> {
    let mut configurations = Vec::new();
    let mut stmt;
    let mut rows = match uuid {
        Some(uuid) => {
            stmt = conn.prepare(&format!("{CONFIGURATION_SELECT_SQL} WHERE uuid = ?1;"))?;
            stmt.query([uuid.to_string()])?
        }
        None => {
            stmt = conn.prepare(&format!(
                "{CONFIGURATION_SELECT_SQL} ORDER BY created_at ASC, id ASC;"
            ))?;
            stmt.query([])?
        }
    };
    while let Some(row) = rows.next()? {
        let uuid_text: String = row.get("uuid")?;
        configurations.push(BookConfiguration {
            uuid: parse_uuid(&uuid_text, "book_configurations.uuid")?,
            title: row.get("title")?,
            description: row.get("description")?,
        });
    }
    Ok(configurations)
}

pub(crate) fn query_blocks(conn: &Connection, filter: &str, key: Uuid) -> RepoResult<Vec<Block>> {
    let mut stmt = conn.prepare(&format!(
        "{BLOCK_SELECT_SQL} WHERE {filter} ORDER BY id ASC;"
    ))?;
    let mut rows = stmt.query([key.to_string()])?;
    let mut blocks = Vec::new();
    while let Some(row) = rows.next()? {
        blocks.push(parse_block_row(row)?);
    }
    Ok(blocks)
}

fn query_tabs(conn: &Connection, filter: &str, key: Uuid) -> RepoResult<Vec<BlockTab>> {
    let mut stmt = conn.prepare(&format!(
        "{TAB_SELECT_SQL} WHERE {filter} ORDER BY order_number ASC, id ASC;"
    ))?;
    let mut rows = stmt.query([key.to_string()])?;
    let mut tabs = Vec::new();
    while let Some(row) = rows.next()? {
        tabs.push(parse_tab_row(row)?);
    }
    Ok(tabs)
}

fn query_relations(conn: &Connection, filter: &str, key: Uuid) -> RepoResult<Vec<BlockRelation>> {
    let mut stmt = conn.prepare(&format!(
        "{RELATION_SELECT_SQL} WHERE {filter} ORDER BY id ASC;"
    ))?;
    let mut rows = stmt.query([key.to_string()])?;
    let mut relations = Vec::new();
    while let Some(row) = rows.next()? {
        relations.push(parse_relation_row(row)?);
    }
    Ok(relations)
}

fn parse_block_row(row: &Row<'_>) -> RepoResult<Block> {
    let uuid_text: String = row.get("uuid")?;
    let configuration_text: String = row.get("configuration_uuid")?;
    let structure_text: String = row.get("structure_kind")?;
    let structure_kind = StructureKind::parse(&structure_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid structure kind `{structure_text}` in blocks.structure_kind"
        ))
    })?;
    let display_text: String = row.get("display_kind")?;
    let display_kind = DisplayKind::parse(&display_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid display kind `{display_text}` in blocks.display_kind"
        ))
    })?;

    Ok(Block {
        uuid: parse_uuid(&uuid_text, "blocks.uuid")?,
        configuration_uuid: parse_uuid(&configuration_text, "blocks.configuration_uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        use_tabs: int_to_bool(row.get("use_tabs")?, "blocks.use_tabs")?,
        use_groups: int_to_bool(row.get("use_groups")?, "blocks.use_groups")?,
        structure_kind,
        display_kind,
        host_block_uuid: parse_optional_uuid(row.get("host_block_uuid")?, "blocks.host_block_uuid")?,
        title_forms: parse_optional_json(row.get("title_forms")?, "blocks.title_forms")?,
        scene_link_allowed: int_to_bool(
            row.get("scene_link_allowed")?,
            "blocks.scene_link_allowed",
        )?,
        icon: parse_optional_json(row.get("icon")?, "blocks.icon")?,
        show_in_scene_list: int_to_bool(
            row.get("show_in_scene_list")?,
            "blocks.show_in_scene_list",
        )?,
        show_in_main_menu: int_to_bool(row.get("show_in_main_menu")?, "blocks.show_in_main_menu")?,
        tree_view: int_to_bool(row.get("tree_view")?, "blocks.tree_view")?,
        show_big_header: int_to_bool(row.get("show_big_header")?, "blocks.show_big_header")?,
        user_doc_page_uuid: parse_optional_uuid(
            row.get("user_doc_page_uuid")?,
            "blocks.user_doc_page_uuid",
        )?,
    })
}

fn parse_tab_row(row: &Row<'_>) -> RepoResult<BlockTab> {
    let uuid_text: String = row.get("uuid")?;
    let block_text: String = row.get("block_uuid")?;
    let kind_text: String = row.get("tab_kind")?;
    let tab_kind = TabKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid tab kind `{kind_text}` in block_tabs.tab_kind"))
    })?;

    Ok(BlockTab {
        uuid: parse_uuid(&uuid_text, "block_tabs.uuid")?,
        block_uuid: parse_uuid(&block_text, "block_tabs.block_uuid")?,
        title: row.get("title")?,
        order_number: row.get("order_number")?,
        tab_kind,
        relation_uuid: parse_optional_uuid(row.get("relation_uuid")?, "block_tabs.relation_uuid")?,
        nested_block_uuid: parse_optional_uuid(
            row.get("nested_block_uuid")?,
            "block_tabs.nested_block_uuid",
        )?,
        referencing_param_uuid: parse_optional_uuid(
            row.get("referencing_param_uuid")?,
            "block_tabs.referencing_param_uuid",
        )?,
        is_default: int_to_bool(row.get("is_default")?, "block_tabs.is_default")?,
    })
}

fn parse_relation_row(row: &Row<'_>) -> RepoResult<BlockRelation> {
    let uuid_text: String = row.get("uuid")?;
    let configuration_text: String = row.get("configuration_uuid")?;
    let source_text: String = row.get("source_block_uuid")?;
    let target_text: String = row.get("target_block_uuid")?;
    let type_text: String = row.get("relation_type")?;
    let relation_type = RelationType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid relation type `{type_text}` in block_relations.relation_type"
        ))
    })?;

    Ok(BlockRelation {
        uuid: parse_uuid(&uuid_text, "block_relations.uuid")?,
        configuration_uuid: parse_uuid(&configuration_text, "block_relations.configuration_uuid")?,
        source_block_uuid: parse_uuid(&source_text, "block_relations.source_block_uuid")?,
        target_block_uuid: parse_uuid(&target_text, "block_relations.target_block_uuid")?,
        relation_type,
    })
}
