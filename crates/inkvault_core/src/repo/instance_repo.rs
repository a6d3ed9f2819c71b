//! Instance repository contracts and SQLite implementation (book store).
//!
//! # Responsibility
//! - Persist instances, instance groups, parameter values, instance
//!   relations and instance-to-scene links.
//! - Own the instance delete cascade and group propagation on move.
//!
//! # Invariants
//! - Deleting an instance removes its nested instances, its values, link
//!   values pointing at it, its relations and scene links; its children
//!   move up to its parent.
//! - Any change to values or relations bumps the owning instance's
//!   `updated_at`.
//! - Only usable on book stores (`block_instances` must exist).

use crate::db::StoreKind;
use crate::model::block::Block;
use crate::model::instance::{
    BlockInstance, BlockInstanceGroup, BlockInstanceRelation, BlockParameterInstance, InstanceId,
    InstanceSceneLink,
};
use crate::model::parameter::BlockParameter;
use crate::repo::parameter_repo::query_parameters;
use crate::repo::{
    ensure_connection_ready, move_in_scope, next_order_number, optional_json,
    optional_uuid_text, parse_optional_json, parse_optional_uuid, parse_uuid, renumber_scope,
    row_exists, scope_of, touch_store, MoveDirection, RepoError, RepoResult, RequiredTable,
};
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::collections::HashSet;
use uuid::Uuid;

const INSTANCE_SELECT_SQL: &str = "SELECT
    uuid,
    block_uuid,
    title,
    description,
    host_instance_uuid,
    parent_instance_uuid,
    group_uuid,
    icon,
    updated_at
FROM block_instances";

const VALUE_SELECT_SQL: &str = "SELECT
    uuid,
    block_instance_uuid,
    block_parameter_uuid,
    block_parameter_group_uuid,
    value,
    linked_instance_uuid
FROM block_parameter_instances";

const RELATION_SELECT_SQL: &str = "SELECT
    uuid,
    block_relation_uuid,
    source_instance_uuid,
    target_instance_uuid,
    source_block_uuid,
    target_block_uuid
FROM block_instance_relations";

const SCENE_LINK_SELECT_SQL: &str = "SELECT
    uuid,
    block_instance_uuid,
    block_uuid,
    scene_uuid,
    title
FROM instance_scene_links";

const REQUIRED_TABLES: &[RequiredTable] = &[
    RequiredTable {
        name: "block_instances",
        columns: &[
            "uuid",
            "block_uuid",
            "host_instance_uuid",
            "parent_instance_uuid",
            "group_uuid",
            "updated_at",
        ],
    },
    RequiredTable {
        name: "block_instance_groups",
        columns: &["uuid", "block_uuid", "order_number"],
    },
    RequiredTable {
        name: "block_parameter_instances",
        columns: &[
            "uuid",
            "block_instance_uuid",
            "block_parameter_uuid",
            "value",
            "linked_instance_uuid",
        ],
    },
    RequiredTable {
        name: "block_instance_relations",
        columns: &["uuid", "block_relation_uuid", "source_instance_uuid"],
    },
    RequiredTable {
        name: "instance_scene_links",
        columns: &["uuid", "block_instance_uuid", "scene_uuid"],
    },
    RequiredTable {
        name: "scenes",
        columns: &["uuid"],
    },
];

/// Repository interface for instance data of one book.
pub trait InstanceRepository {
    fn create_instance(&self, instance: &BlockInstance) -> RepoResult<InstanceId>;
    /// Creates the instance plus an empty value for every default parameter.
    fn create_instance_with_defaults(
        &self,
        instance: &BlockInstance,
    ) -> RepoResult<Vec<BlockParameterInstance>>;
    fn get_instance(&self, uuid: InstanceId) -> RepoResult<Option<BlockInstance>>;
    /// Lists instances of a block in creation order.
    ///
    /// `title_query` keeps only titles containing it, case-insensitively.
    fn list_instances(
        &self,
        block_uuid: Uuid,
        title_query: Option<&str>,
    ) -> RepoResult<Vec<BlockInstance>>;
    fn count_instances(&self, block_uuid: Uuid) -> RepoResult<i64>;
    fn update_instance(&self, instance: &BlockInstance) -> RepoResult<()>;
    fn delete_instance(&self, uuid: InstanceId) -> RepoResult<()>;
    fn delete_block_instances(&self, block_uuid: Uuid) -> RepoResult<usize>;
    fn list_nested_instances(
        &self,
        host_instance_uuid: InstanceId,
        nested_block_uuid: Option<Uuid>,
    ) -> RepoResult<Vec<BlockInstance>>;
    fn list_child_instances(&self, parent_instance_uuid: InstanceId)
        -> RepoResult<Vec<BlockInstance>>;
    /// Re-parents one instance and propagates `group_uuid` to its descendants.
    fn move_instance(
        &self,
        uuid: InstanceId,
        parent_instance_uuid: Option<InstanceId>,
        group_uuid: Option<Uuid>,
    ) -> RepoResult<()>;

    fn list_groups(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockInstanceGroup>>;
    fn get_group(&self, uuid: Uuid) -> RepoResult<Option<BlockInstanceGroup>>;
    /// Inserts (appended) or renames one group.
    fn save_group(&self, group: &BlockInstanceGroup) -> RepoResult<BlockInstanceGroup>;
    fn delete_group(&self, uuid: Uuid) -> RepoResult<()>;
    fn move_group(&self, uuid: Uuid, direction: MoveDirection) -> RepoResult<bool>;

    fn list_parameter_values(
        &self,
        instance_uuid: InstanceId,
    ) -> RepoResult<Vec<BlockParameterInstance>>;
    fn get_parameter_value(&self, uuid: Uuid) -> RepoResult<Option<BlockParameterInstance>>;
    /// Inserts or updates one value by UUID.
    fn save_parameter_value(&self, value: &BlockParameterInstance) -> RepoResult<()>;
    fn delete_parameter_value(&self, uuid: Uuid) -> RepoResult<()>;
    /// Link values of other instances that point at `instance_uuid`.
    fn list_referencing_values(
        &self,
        instance_uuid: InstanceId,
    ) -> RepoResult<Vec<BlockParameterInstance>>;
    fn append_default_parameters(
        &self,
        instance_uuid: InstanceId,
    ) -> RepoResult<Vec<BlockParameterInstance>>;

    /// Relations of an instance; `towards_block` keeps those whose other
    /// side belongs to that block.
    fn list_instance_relations(
        &self,
        instance_uuid: InstanceId,
        towards_block: Option<Uuid>,
    ) -> RepoResult<Vec<BlockInstanceRelation>>;
    fn get_instance_relation(&self, uuid: Uuid) -> RepoResult<Option<BlockInstanceRelation>>;
    fn create_instance_relation(&self, relation: &BlockInstanceRelation) -> RepoResult<Uuid>;
    fn delete_instance_relation(&self, uuid: Uuid) -> RepoResult<()>;
    fn delete_relations_for_instance(&self, instance_uuid: InstanceId) -> RepoResult<usize>;

    fn create_scene_link(&self, link: &InstanceSceneLink) -> RepoResult<Uuid>;
    fn list_scene_links_by_scene(&self, scene_uuid: Uuid) -> RepoResult<Vec<InstanceSceneLink>>;
    fn list_scene_links_by_instance(
        &self,
        instance_uuid: InstanceId,
    ) -> RepoResult<Vec<InstanceSceneLink>>;
    fn delete_scene_link(&self, uuid: Uuid) -> RepoResult<()>;
    fn scene_exists(&self, scene_uuid: Uuid) -> RepoResult<bool>;
}

/// SQLite-backed instance repository.
pub struct SqliteInstanceRepository<'conn> {
    conn: &'conn Connection,
    store: StoreKind,
}

impl<'conn> SqliteInstanceRepository<'conn> {
    /// Constructs a repository from a migrated/ready book connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let store = ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn, store })
    }

    fn query_instances(&self, filter: &str, keys: &[String]) -> RepoResult<Vec<BlockInstance>> {
        query_instances(self.conn, filter, keys)
    }
}

impl InstanceRepository for SqliteInstanceRepository<'_> {
    fn create_instance(&self, instance: &BlockInstance) -> RepoResult<InstanceId> {
        instance.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        insert_instance_row(&tx, instance)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(instance.uuid)
    }

    fn create_instance_with_defaults(
        &self,
        instance: &BlockInstance,
    ) -> RepoResult<Vec<BlockParameterInstance>> {
        instance.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        insert_instance_row(&tx, instance)?;
        let values = append_default_parameters(&tx, instance.uuid, instance.block_uuid)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(values)
    }

    fn get_instance(&self, uuid: InstanceId) -> RepoResult<Option<BlockInstance>> {
        get_instance(self.conn, uuid)
    }

    fn list_instances(
        &self,
        block_uuid: Uuid,
        title_query: Option<&str>,
    ) -> RepoResult<Vec<BlockInstance>> {
        let instances = self.query_instances("block_uuid = ?1", &[block_uuid.to_string()])?;
        let needle = title_query
            .map(|query| query.trim().to_lowercase())
            .filter(|query| !query.is_empty());
        match needle {
            Some(needle) => Ok(instances
                .into_iter()
                .filter(|instance| instance.title.to_lowercase().contains(&needle))
                .collect()),
            None => Ok(instances),
        }
    }

    fn count_instances(&self, block_uuid: Uuid) -> RepoResult<i64> {
        count_instances(self.conn, block_uuid)
    }

    fn update_instance(&self, instance: &BlockInstance) -> RepoResult<()> {
        instance.validate()?;
        let changed = self.conn.execute(
            "UPDATE block_instances
             SET title = ?2,
                 description = ?3,
                 host_instance_uuid = ?4,
                 parent_instance_uuid = ?5,
                 group_uuid = ?6,
                 icon = ?7,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![
                instance.uuid.to_string(),
                instance.title.trim(),
                instance.description.as_deref(),
                optional_uuid_text(instance.host_instance_uuid),
                optional_uuid_text(instance.parent_instance_uuid),
                optional_uuid_text(instance.group_uuid),
                optional_json(instance.icon.as_ref(), "block_instances.icon")?,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "instance",
                uuid: instance.uuid,
            });
        }
        touch_store(self.conn, self.store)
    }

    fn delete_instance(&self, uuid: InstanceId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !row_exists(&tx, "block_instances", uuid)? {
            return Err(RepoError::NotFound {
                entity: "instance",
                uuid,
            });
        }
        delete_instance_cascade(&tx, uuid)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_block_instances(&self, block_uuid: Uuid) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let deleted = delete_instances_of_block(&tx, block_uuid)?;
        if deleted > 0 {
            touch_store(&tx, self.store)?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn list_nested_instances(
        &self,
        host_instance_uuid: InstanceId,
        nested_block_uuid: Option<Uuid>,
    ) -> RepoResult<Vec<BlockInstance>> {
        match nested_block_uuid {
            Some(block_uuid) => self.query_instances(
                "host_instance_uuid = ?1 AND block_uuid = ?2",
                &[host_instance_uuid.to_string(), block_uuid.to_string()],
            ),
            None => self.query_instances(
                "host_instance_uuid = ?1",
                &[host_instance_uuid.to_string()],
            ),
        }
    }

    fn list_child_instances(
        &self,
        parent_instance_uuid: InstanceId,
    ) -> RepoResult<Vec<BlockInstance>> {
        self.query_instances(
            "parent_instance_uuid = ?1",
            &[parent_instance_uuid.to_string()],
        )
    }

    fn move_instance(
        &self,
        uuid: InstanceId,
        parent_instance_uuid: Option<InstanceId>,
        group_uuid: Option<Uuid>,
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE block_instances
             SET parent_instance_uuid = ?2,
                 group_uuid = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![
                uuid.to_string(),
                optional_uuid_text(parent_instance_uuid),
                optional_uuid_text(group_uuid),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "instance",
                uuid,
            });
        }

        tx.execute(
            "WITH RECURSIVE subtree(uuid) AS (
                SELECT uuid
                FROM block_instances
                WHERE parent_instance_uuid = ?1
                UNION
                SELECT child.uuid
                FROM block_instances child
                INNER JOIN subtree parent ON child.parent_instance_uuid = parent.uuid
            )
            UPDATE block_instances
            SET group_uuid = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
            WHERE uuid IN (SELECT uuid FROM subtree);",
            params![uuid.to_string(), optional_uuid_text(group_uuid)],
        )?;

        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn list_groups(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockInstanceGroup>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, block_uuid, title, order_number
             FROM block_instance_groups
             WHERE block_uuid = ?1
             ORDER BY order_number ASC, id ASC;",
        )?;
        let mut rows = stmt.query([block_uuid.to_string()])?;
        let mut groups = Vec::new();
        while let Some(row) = rows.next()? {
            groups.push(parse_group_row(row)?);
        }
        Ok(groups)
    }

    fn get_group(&self, uuid: Uuid) -> RepoResult<Option<BlockInstanceGroup>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, block_uuid, title, order_number
             FROM block_instance_groups
             WHERE uuid = ?1;",
        )?;
        let mut rows = stmt.query([uuid.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_group_row(row)?)),
            None => Ok(None),
        }
    }

    fn save_group(&self, group: &BlockInstanceGroup) -> RepoResult<BlockInstanceGroup> {
        group.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut saved = group.clone();
        let existing_order: Option<i64> = tx
            .query_row(
                "SELECT order_number FROM block_instance_groups WHERE uuid = ?1;",
                [group.uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match existing_order {
            Some(order_number) => {
                saved.order_number = order_number;
                tx.execute(
                    "UPDATE block_instance_groups SET title = ?2 WHERE uuid = ?1;",
                    params![group.uuid.to_string(), group.title.trim()],
                )?;
            }
            None => {
                saved.order_number = next_order_number(
                    &tx,
                    "block_instance_groups",
                    "block_uuid",
                    Some(group.block_uuid),
                )?;
                tx.execute(
                    "INSERT INTO block_instance_groups (uuid, block_uuid, title, order_number)
                     VALUES (?1, ?2, ?3, ?4);",
                    params![
                        saved.uuid.to_string(),
                        saved.block_uuid.to_string(),
                        saved.title.trim(),
                        saved.order_number,
                    ],
                )?;
            }
        }

        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(saved)
    }

    fn delete_group(&self, uuid: Uuid) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let block_uuid = scope_of(&tx, "block_instance_groups", "block_uuid", uuid)?.ok_or(
            RepoError::NotFound {
                entity: "instance group",
                uuid,
            },
        )?;
        tx.execute(
            "UPDATE block_instances
             SET group_uuid = NULL,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE group_uuid = ?1;",
            [uuid.to_string()],
        )?;
        tx.execute(
            "DELETE FROM block_instance_groups WHERE uuid = ?1;",
            [uuid.to_string()],
        )?;
        renumber_scope(&tx, "block_instance_groups", "block_uuid", block_uuid)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn move_group(&self, uuid: Uuid, direction: MoveDirection) -> RepoResult<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let block_uuid = scope_of(&tx, "block_instance_groups", "block_uuid", uuid)?.ok_or(
            RepoError::NotFound {
                entity: "instance group",
                uuid,
            },
        )?;
        let moved = move_in_scope(
            &tx,
            "block_instance_groups",
            "block_uuid",
            block_uuid,
            uuid,
            direction,
        )?;
        if moved {
            touch_store(&tx, self.store)?;
        }
        tx.commit()?;
        Ok(moved)
    }

    fn list_parameter_values(
        &self,
        instance_uuid: InstanceId,
    ) -> RepoResult<Vec<BlockParameterInstance>> {
        query_values(
            self.conn,
            "block_instance_uuid = ?1",
            &instance_uuid.to_string(),
        )
    }

    fn get_parameter_value(&self, uuid: Uuid) -> RepoResult<Option<BlockParameterInstance>> {
        Ok(query_values(self.conn, "uuid = ?1", &uuid.to_string())?
            .into_iter()
            .next())
    }

    fn save_parameter_value(&self, value: &BlockParameterInstance) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO block_parameter_instances (
                uuid,
                block_instance_uuid,
                block_parameter_uuid,
                block_parameter_group_uuid,
                value,
                linked_instance_uuid
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(uuid) DO UPDATE SET
                block_parameter_group_uuid = excluded.block_parameter_group_uuid,
                value = excluded.value,
                linked_instance_uuid = excluded.linked_instance_uuid;",
            params![
                value.uuid.to_string(),
                value.block_instance_uuid.to_string(),
                value.block_parameter_uuid.to_string(),
                value.block_parameter_group_uuid.to_string(),
                value.value.as_str(),
                optional_uuid_text(value.linked_instance_uuid),
            ],
        )?;
        bump_instance(&tx, value.block_instance_uuid)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_parameter_value(&self, uuid: Uuid) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let owner: Option<String> = tx
            .query_row(
                "SELECT block_instance_uuid FROM block_parameter_instances WHERE uuid = ?1;",
                [uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let owner = owner.ok_or(RepoError::NotFound {
            entity: "parameter value",
            uuid,
        })?;
        tx.execute(
            "DELETE FROM block_parameter_instances WHERE uuid = ?1;",
            [uuid.to_string()],
        )?;
        bump_instance(
            &tx,
            parse_uuid(&owner, "block_parameter_instances.block_instance_uuid")?,
        )?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn list_referencing_values(
        &self,
        instance_uuid: InstanceId,
    ) -> RepoResult<Vec<BlockParameterInstance>> {
        query_values(
            self.conn,
            "linked_instance_uuid = ?1",
            &instance_uuid.to_string(),
        )
    }

    fn append_default_parameters(
        &self,
        instance_uuid: InstanceId,
    ) -> RepoResult<Vec<BlockParameterInstance>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let instance = get_instance(&tx, instance_uuid)?.ok_or(RepoError::NotFound {
            entity: "instance",
            uuid: instance_uuid,
        })?;
        let created = append_default_parameters(&tx, instance.uuid, instance.block_uuid)?;
        if !created.is_empty() {
            bump_instance(&tx, instance.uuid)?;
            touch_store(&tx, self.store)?;
        }
        tx.commit()?;
        Ok(created)
    }

    fn list_instance_relations(
        &self,
        instance_uuid: InstanceId,
        towards_block: Option<Uuid>,
    ) -> RepoResult<Vec<BlockInstanceRelation>> {
        let key = instance_uuid.to_string();
        let block = optional_uuid_text(towards_block);
        let mut stmt = self.conn.prepare(&format!(
            "{RELATION_SELECT_SQL}
             WHERE (source_instance_uuid = ?1 AND (?2 IS NULL OR target_block_uuid = ?2))
                OR (target_instance_uuid = ?1 AND (?2 IS NULL OR source_block_uuid = ?2))
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query(params![key, block])?;
        let mut relations = Vec::new();
        while let Some(row) = rows.next()? {
            relations.push(parse_relation_row(row)?);
        }
        Ok(relations)
    }

    fn get_instance_relation(&self, uuid: Uuid) -> RepoResult<Option<BlockInstanceRelation>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RELATION_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([uuid.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_relation_row(row)?)),
            None => Ok(None),
        }
    }

    fn create_instance_relation(&self, relation: &BlockInstanceRelation) -> RepoResult<Uuid> {
        relation.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO block_instance_relations (
                uuid,
                block_relation_uuid,
                source_instance_uuid,
                target_instance_uuid,
                source_block_uuid,
                target_block_uuid
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                relation.uuid.to_string(),
                relation.block_relation_uuid.to_string(),
                relation.source_instance_uuid.to_string(),
                relation.target_instance_uuid.to_string(),
                relation.source_block_uuid.to_string(),
                relation.target_block_uuid.to_string(),
            ],
        )?;
        bump_instance(&tx, relation.source_instance_uuid)?;
        bump_instance(&tx, relation.target_instance_uuid)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(relation.uuid)
    }

    fn delete_instance_relation(&self, uuid: Uuid) -> RepoResult<()> {
        let relation = self
            .get_instance_relation(uuid)?
            .ok_or(RepoError::NotFound {
                entity: "instance relation",
                uuid,
            })?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM block_instance_relations WHERE uuid = ?1;",
            [uuid.to_string()],
        )?;
        bump_instance(&tx, relation.source_instance_uuid)?;
        bump_instance(&tx, relation.target_instance_uuid)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_relations_for_instance(&self, instance_uuid: InstanceId) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let deleted = tx.execute(
            "DELETE FROM block_instance_relations
             WHERE source_instance_uuid = ?1
                OR target_instance_uuid = ?1;",
            [instance_uuid.to_string()],
        )?;
        if deleted > 0 {
            bump_instance(&tx, instance_uuid)?;
            touch_store(&tx, self.store)?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn create_scene_link(&self, link: &InstanceSceneLink) -> RepoResult<Uuid> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO instance_scene_links (
                uuid,
                block_instance_uuid,
                block_uuid,
                scene_uuid,
                title
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                link.uuid.to_string(),
                link.block_instance_uuid.to_string(),
                link.block_uuid.to_string(),
                link.scene_uuid.to_string(),
                link.title.as_deref(),
            ],
        )?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(link.uuid)
    }

    fn list_scene_links_by_scene(&self, scene_uuid: Uuid) -> RepoResult<Vec<InstanceSceneLink>> {
        query_scene_links(self.conn, "scene_uuid = ?1", &scene_uuid.to_string())
    }

    fn list_scene_links_by_instance(
        &self,
        instance_uuid: InstanceId,
    ) -> RepoResult<Vec<InstanceSceneLink>> {
        query_scene_links(
            self.conn,
            "block_instance_uuid = ?1",
            &instance_uuid.to_string(),
        )
    }

    fn delete_scene_link(&self, uuid: Uuid) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM instance_scene_links WHERE uuid = ?1;",
            [uuid.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "scene link",
                uuid,
            });
        }
        touch_store(self.conn, self.store)
    }

    fn scene_exists(&self, scene_uuid: Uuid) -> RepoResult<bool> {
        row_exists(self.conn, "scenes", scene_uuid)
    }
}

pub(crate) fn insert_instance_row(conn: &Connection, instance: &BlockInstance) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO block_instances (
            uuid,
            block_uuid,
            title,
            description,
            host_instance_uuid,
            parent_instance_uuid,
            group_uuid,
            icon
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
        params![
            instance.uuid.to_string(),
            instance.block_uuid.to_string(),
            instance.title.trim(),
            instance.description.as_deref(),
            optional_uuid_text(instance.host_instance_uuid),
            optional_uuid_text(instance.parent_instance_uuid),
            optional_uuid_text(instance.group_uuid),
            optional_json(instance.icon.as_ref(), "block_instances.icon")?,
        ],
    )?;
    Ok(())
}

/// Inserts an empty value for every default parameter the instance lacks.
pub(crate) fn append_default_parameters(
    conn: &Connection,
    instance_uuid: InstanceId,
    block_uuid: Uuid,
) -> RepoResult<Vec<BlockParameterInstance>> {
    let defaults = query_parameters(conn, "block_uuid = ?1 AND is_default = 1", block_uuid)?;
    let mut created = Vec::new();
    for parameter in defaults {
        if has_value_for(conn, instance_uuid, parameter.uuid)? {
            continue;
        }
        let value =
            BlockParameterInstance::empty(instance_uuid, parameter.uuid, parameter.group_uuid);
        insert_value_row(conn, &value)?;
        created.push(value);
    }
    Ok(created)
}

/// Creates the lone instance of a `single` block unless one already exists.
pub(crate) fn ensure_lone_instance(
    conn: &Connection,
    block: &Block,
) -> RepoResult<Option<InstanceId>> {
    if !block.is_single() || count_instances(conn, block.uuid)? > 0 {
        return Ok(None);
    }
    let instance = BlockInstance::new(block.uuid, block.title.trim());
    insert_instance_row(conn, &instance)?;
    append_default_parameters(conn, instance.uuid, block.uuid)?;
    Ok(Some(instance.uuid))
}

/// Gives every instance of a `single` block an empty value for `parameter`.
pub(crate) fn ensure_parameter_slots_for_block(
    conn: &Connection,
    parameter: &BlockParameter,
) -> RepoResult<()> {
    let structure: Option<String> = conn
        .query_row(
            "SELECT structure_kind FROM blocks WHERE uuid = ?1;",
            [parameter.block_uuid.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    if structure.as_deref() != Some("single") {
        return Ok(());
    }

    let instances = query_instances(conn, "block_uuid = ?1", &[parameter.block_uuid.to_string()])?;
    for instance in instances {
        if has_value_for(conn, instance.uuid, parameter.uuid)? {
            continue;
        }
        let value =
            BlockParameterInstance::empty(instance.uuid, parameter.uuid, parameter.group_uuid);
        insert_value_row(conn, &value)?;
    }
    Ok(())
}

/// Deletes every instance of a block with the full instance cascade.
pub(crate) fn delete_instances_of_block(
    conn: &Connection,
    block_uuid: Uuid,
) -> RepoResult<usize> {
    let instances = query_instances(conn, "block_uuid = ?1", &[block_uuid.to_string()])?;
    let mut deleted = 0;
    for instance in instances {
        if row_exists(conn, "block_instances", instance.uuid)? {
            delete_instance_cascade(conn, instance.uuid)?;
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// Deletes one instance and everything owned by or pointing at it.
pub(crate) fn delete_instance_cascade(conn: &Connection, uuid: InstanceId) -> RepoResult<()> {
    let mut visited = HashSet::new();
    delete_instance_inner(conn, uuid, &mut visited)
}

fn delete_instance_inner(
    conn: &Connection,
    uuid: InstanceId,
    visited: &mut HashSet<InstanceId>,
) -> RepoResult<()> {
    if !visited.insert(uuid) {
        return Ok(());
    }

    for nested in query_instances(conn, "host_instance_uuid = ?1", &[uuid.to_string()])? {
        delete_instance_inner(conn, nested.uuid, visited)?;
    }

    let key = uuid.to_string();
    let parent: Option<String> = conn
        .query_row(
            "SELECT parent_instance_uuid FROM block_instances WHERE uuid = ?1;",
            [key.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .flatten();

    conn.execute(
        "UPDATE block_instances
         SET parent_instance_uuid = ?2,
             updated_at = (strftime('%s', 'now') * 1000)
         WHERE parent_instance_uuid = ?1;",
        params![key, parent],
    )?;
    conn.execute(
        "DELETE FROM block_parameter_instances
         WHERE block_instance_uuid = ?1
            OR linked_instance_uuid = ?1;",
        [key.as_str()],
    )?;
    conn.execute(
        "DELETE FROM block_instance_relations
         WHERE source_instance_uuid = ?1
            OR target_instance_uuid = ?1;",
        [key.as_str()],
    )?;
    conn.execute(
        "DELETE FROM instance_scene_links WHERE block_instance_uuid = ?1;",
        [key.as_str()],
    )?;
    conn.execute("DELETE FROM block_instances WHERE uuid = ?1;", [key.as_str()])?;
    Ok(())
}

pub(crate) fn get_instance(
    conn: &Connection,
    uuid: InstanceId,
) -> RepoResult<Option<BlockInstance>> {
    Ok(query_instances(conn, "uuid = ?1", &[uuid.to_string()])?
        .into_iter()
        .next())
}

pub(crate) fn count_instances(conn: &Connection, block_uuid: Uuid) -> RepoResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM block_instances WHERE block_uuid = ?1;",
        [block_uuid.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn query_instances(
    conn: &Connection,
    filter: &str,
    keys: &[String],
) -> RepoResult<Vec<BlockInstance>> {
    let mut stmt = conn.prepare(&format!(
        "{INSTANCE_SELECT_SQL} WHERE {filter} ORDER BY id ASC;"
    ))?;
    let mut rows = stmt.query(params_from_iter(keys.iter()))?;
    let mut instances = Vec::new();
    while let Some(row) = rows.next()? {
        instances.push(parse_instance_row(row)?);
    }
    Ok(instances)
}

fn query_values(
    conn: &Connection,
    filter: &str,
    key: &str,
) -> RepoResult<Vec<BlockParameterInstance>> {
    let mut stmt = conn.prepare(&format!(
        "{VALUE_SELECT_SQL} WHERE {filter} ORDER BY id ASC;"
    ))?;
    let mut rows = stmt.query([key])?;
    let mut values = Vec::new();
    while let Some(row) = rows.next()? {
        values.push(parse_value_row(row)?);
    }
    Ok(values)
}

fn query_scene_links(
    conn: &Connection,
    filter: &str,
    key: &str,
) -> RepoResult<Vec<InstanceSceneLink>> {
    let mut stmt = conn.prepare(&format!(
        "{SCENE_LINK_SELECT_SQL} WHERE {filter} ORDER BY id ASC;"
    ))?;
    let mut rows = stmt.query([key])?;
    let mut links = Vec::new();
    while let Some(row) = rows.next()? {
        let uuid_text: String = row.get("uuid")?;
        let instance_text: String = row.get("block_instance_uuid")?;
        let block_text: String = row.get("block_uuid")?;
        let scene_text: String = row.get("scene_uuid")?;
        links.push(InstanceSceneLink {
            uuid: parse_uuid(&uuid_text, "instance_scene_links.uuid")?,
            block_instance_uuid: parse_uuid(
                &instance_text,
                "instance_scene_links.block_instance_uuid",
            )?,
            block_uuid: parse_uuid(&block_text, "instance_scene_links.block_uuid")?,
            scene_uuid: parse_uuid(&scene_text, "instance_scene_links.scene_uuid")?,
            title: row.get("title")?,
        });
    }
    Ok(links)
}

fn insert_value_row(conn: &Connection, value: &BlockParameterInstance) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO block_parameter_instances (
            uuid,
            block_instance_uuid,
            block_parameter_uuid,
            block_parameter_group_uuid,
            value,
            linked_instance_uuid
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            value.uuid.to_string(),
            value.block_instance_uuid.to_string(),
            value.block_parameter_uuid.to_string(),
            value.block_parameter_group_uuid.to_string(),
            value.value.as_str(),
            optional_uuid_text(value.linked_instance_uuid),
        ],
    )?;
    Ok(())
}

fn has_value_for(
    conn: &Connection,
    instance_uuid: InstanceId,
    parameter_uuid: Uuid,
) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM block_parameter_instances
            WHERE block_instance_uuid = ?1
              AND block_parameter_uuid = ?2
        );",
        params![instance_uuid.to_string(), parameter_uuid.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn bump_instance(conn: &Connection, uuid: InstanceId) -> RepoResult<()> {
    conn.execute(
        "UPDATE block_instances
         SET updated_at = (strftime('%s', 'now') * 1000)
         WHERE uuid = ?1;",
        [uuid.to_string()],
    )?;
    Ok(())
}

fn parse_instance_row(row: &Row<'_>) -> RepoResult<BlockInstance> {
    let uuid_text: String = row.get("uuid")?;
    let block_text: String = row.get("block_uuid")?;
    Ok(BlockInstance {
        uuid: parse_uuid(&uuid_text, "block_instances.uuid")?,
        block_uuid: parse_uuid(&block_text, "block_instances.block_uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        host_instance_uuid: parse_optional_uuid(
            row.get("host_instance_uuid")?,
            "block_instances.host_instance_uuid",
        )?,
        parent_instance_uuid: parse_optional_uuid(
            row.get("parent_instance_uuid")?,
            "block_instances.parent_instance_uuid",
        )?,
        group_uuid: parse_optional_uuid(row.get("group_uuid")?, "block_instances.group_uuid")?,
        icon: parse_optional_json(row.get("icon")?, "block_instances.icon")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_group_row(row: &Row<'_>) -> RepoResult<BlockInstanceGroup> {
    let uuid_text: String = row.get("uuid")?;
    let block_text: String = row.get("block_uuid")?;
    Ok(BlockInstanceGroup {
        uuid: parse_uuid(&uuid_text, "block_instance_groups.uuid")?,
        block_uuid: parse_uuid(&block_text, "block_instance_groups.block_uuid")?,
        title: row.get("title")?,
        order_number: row.get("order_number")?,
    })
}

fn parse_value_row(row: &Row<'_>) -> RepoResult<BlockParameterInstance> {
    let uuid_text: String = row.get("uuid")?;
    let instance_text: String = row.get("block_instance_uuid")?;
    let parameter_text: String = row.get("block_parameter_uuid")?;
    let group_text: String = row.get("block_parameter_group_uuid")?;
    Ok(BlockParameterInstance {
        uuid: parse_uuid(&uuid_text, "block_parameter_instances.uuid")?,
        block_instance_uuid: parse_uuid(
            &instance_text,
            "block_parameter_instances.block_instance_uuid",
        )?,
        block_parameter_uuid: parse_uuid(
            &parameter_text,
            "block_parameter_instances.block_parameter_uuid",
        )?,
        block_parameter_group_uuid: parse_uuid(
            &group_text,
            "block_parameter_instances.block_parameter_group_uuid",
        )?,
        value: row.get("value")?,
        linked_instance_uuid: parse_optional_uuid(
            row.get("linked_instance_uuid")?,
            "block_parameter_instances.linked_instance_uuid",
        )?,
    })
}

fn parse_relation_row(row: &Row<'_>) -> RepoResult<BlockInstanceRelation> {
    let uuid_text: String = row.get("uuid")?;
    let relation_text: String = row.get("block_relation_uuid")?;
    let source_text: String = row.get("source_instance_uuid")?;
    let target_text: String = row.get("target_instance_uuid")?;
    let source_block_text: String = row.get("source_block_uuid")?;
    let target_block_text: String = row.get("target_block_uuid")?;
    Ok(BlockInstanceRelation {
        uuid: parse_uuid(&uuid_text, "block_instance_relations.uuid")?,
        block_relation_uuid: parse_uuid(
            &relation_text,
            "block_instance_relations.block_relation_uuid",
        )?,
        source_instance_uuid: parse_uuid(
            &source_text,
            "block_instance_relations.source_instance_uuid",
        )?,
        target_instance_uuid: parse_uuid(
            &target_text,
            "block_instance_relations.target_instance_uuid",
        )?,
        source_block_uuid: parse_uuid(
            &source_block_text,
            "block_instance_relations.source_block_uuid",
        )?,
        target_block_uuid: parse_uuid(
            &target_block_text,
            "block_instance_relations.target_block_uuid",
        )?,
    })
}
