//! Parameter group, parameter and possible-value persistence.
//!
//! # Responsibility
//! - Provide ordered CRUD over `block_parameter_groups`, `block_parameters`
//!   and `block_parameter_possible_values`.
//! - Keep sibling order contiguous after deletes and moves.
//!
//! # Invariants
//! - New groups/parameters are appended at the end of their scope.
//! - Deleting a parameter removes its possible values and, in a book
//!   store, every value stored for it on instances.
//! - Possible values are always replaced as a whole list.
//! - Retargeting or retyping a link parameter empties stored values that no
//!   longer link an instance of its linked block.

use crate::db::StoreKind;
use crate::model::parameter::{
    BlockParameter, BlockParameterGroup, ParameterDataType, ParameterGroupId, ParameterId,
    PossibleValue,
};
use crate::repo::instance_repo::ensure_parameter_slots_for_block;
use crate::repo::{
    bool_to_int, ensure_connection_ready, int_to_bool, move_in_scope, next_order_number,
    optional_uuid_text, parse_optional_uuid, parse_uuid, renumber_scope, scope_of, touch_store,
    MoveDirection, RepoError, RepoResult, RequiredTable,
};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const GROUP_SELECT_SQL: &str = "SELECT
    uuid,
    block_uuid,
    title,
    description,
    order_number
FROM block_parameter_groups";

const PARAMETER_SELECT_SQL: &str = "SELECT
    uuid,
    block_uuid,
    group_uuid,
    title,
    description,
    data_type,
    linked_block_uuid,
    is_default,
    display_in_card,
    order_number,
    allow_multiple,
    use_for_instance_grouping
FROM block_parameters";

/// Parameters of one block ordered by group order, then parameter order.
const BLOCK_PARAMETER_ORDER_SQL: &str = " ORDER BY
    (SELECT g.order_number
     FROM block_parameter_groups g
     WHERE g.uuid = block_parameters.group_uuid) ASC,
    order_number ASC,
    id ASC;";

const REQUIRED_TABLES: &[RequiredTable] = &[
    RequiredTable {
        name: "block_parameter_groups",
        columns: &["uuid", "block_uuid", "order_number"],
    },
    RequiredTable {
        name: "block_parameters",
        columns: &[
            "uuid",
            "block_uuid",
            "group_uuid",
            "data_type",
            "linked_block_uuid",
            "use_for_instance_grouping",
        ],
    },
    RequiredTable {
        name: "block_parameter_possible_values",
        columns: &["uuid", "parameter_uuid", "value", "order_number"],
    },
];

/// Repository interface for block parameter definitions.
pub trait ParameterRepository {
    fn list_groups(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockParameterGroup>>;
    fn get_group(&self, uuid: ParameterGroupId) -> RepoResult<Option<BlockParameterGroup>>;
    /// Appends a group at the end of its block.
    fn create_group(&self, group: &BlockParameterGroup) -> RepoResult<BlockParameterGroup>;
    /// Updates title and description; order is managed by `move_group`.
    fn update_group(&self, group: &BlockParameterGroup) -> RepoResult<()>;
    /// Deletes the group with all its parameters, then renumbers groups.
    fn delete_group(&self, uuid: ParameterGroupId) -> RepoResult<()>;
    fn move_group(&self, uuid: ParameterGroupId, direction: MoveDirection) -> RepoResult<bool>;

    fn list_parameters_by_group(&self, group_uuid: ParameterGroupId)
        -> RepoResult<Vec<BlockParameter>>;
    fn list_parameters_by_block(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockParameter>>;
    fn get_parameter(&self, uuid: ParameterId) -> RepoResult<Option<BlockParameter>>;
    /// Appends a parameter at the end of its group.
    fn create_parameter(&self, parameter: &BlockParameter) -> RepoResult<BlockParameter>;
    fn update_parameter(&self, parameter: &BlockParameter) -> RepoResult<()>;
    fn delete_parameter(&self, uuid: ParameterId) -> RepoResult<()>;
    fn move_parameter(&self, uuid: ParameterId, direction: MoveDirection) -> RepoResult<bool>;

    fn list_default_parameters(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockParameter>>;
    fn list_card_parameters(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockParameter>>;
    /// Link parameters of any block that point at `block_uuid`.
    fn list_referencing_parameters(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockParameter>>;
    /// Link parameters declared on `block_uuid` itself.
    fn list_link_parameters(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockParameter>>;
    fn grouping_parameter(&self, block_uuid: Uuid) -> RepoResult<Option<BlockParameter>>;

    fn list_possible_values(&self, parameter_uuid: ParameterId) -> RepoResult<Vec<PossibleValue>>;
    fn replace_possible_values(
        &self,
        parameter_uuid: ParameterId,
        values: &[String],
    ) -> RepoResult<Vec<PossibleValue>>;
}

/// SQLite-backed parameter repository.
pub struct SqliteParameterRepository<'conn> {
    conn: &'conn Connection,
    store: StoreKind,
}

impl<'conn> SqliteParameterRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let store = ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn, store })
    }

    fn query_parameters(&self, filter: &str, key: Uuid) -> RepoResult<Vec<BlockParameter>> {
        query_parameters(self.conn, filter, key)
    }
}

impl ParameterRepository for SqliteParameterRepository<'_> {
    fn list_groups(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockParameterGroup>> {
        list_groups_of_block(self.conn, block_uuid)
    }

    fn get_group(&self, uuid: ParameterGroupId) -> RepoResult<Option<BlockParameterGroup>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{GROUP_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([uuid.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_group_row(row)?)),
            None => Ok(None),
        }
    }

    fn create_group(&self, group: &BlockParameterGroup) -> RepoResult<BlockParameterGroup> {
        group.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut created = group.clone();
        created.order_number = next_order_number(
            &tx,
            "block_parameter_groups",
            "block_uuid",
            Some(group.block_uuid),
        )?;
        insert_group_row(&tx, &created)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(created)
    }

    fn update_group(&self, group: &BlockParameterGroup) -> RepoResult<()> {
        group.validate()?;
        let changed = self.conn.execute(
            "UPDATE block_parameter_groups
             SET title = ?2,
                 description = ?3
             WHERE uuid = ?1;",
            params![
                group.uuid.to_string(),
                group.title.trim(),
                group.description.as_str()
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "parameter group",
                uuid: group.uuid,
            });
        }
        touch_store(self.conn, self.store)
    }

    fn delete_group(&self, uuid: ParameterGroupId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let block_uuid = scope_of(&tx, "block_parameter_groups", "block_uuid", uuid)?
            .flatten()
            .ok_or(RepoError::NotFound {
                entity: "parameter group",
                uuid,
            })?;

        for parameter in query_parameters(&tx, "group_uuid = ?1", uuid)? {
            delete_parameter_cascade(&tx, self.store, parameter.uuid)?;
        }
        tx.execute(
            "DELETE FROM block_parameter_groups WHERE uuid = ?1;",
            [uuid.to_string()],
        )?;
        renumber_scope(&tx, "block_parameter_groups", "block_uuid", Some(block_uuid))?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn move_group(&self, uuid: ParameterGroupId, direction: MoveDirection) -> RepoResult<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let block_uuid = scope_of(&tx, "block_parameter_groups", "block_uuid", uuid)?.ok_or(
            RepoError::NotFound {
                entity: "parameter group",
                uuid,
            },
        )?;
        let moved = move_in_scope(
            &tx,
            "block_parameter_groups",
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

    fn list_parameters_by_group(
        &self,
        group_uuid: ParameterGroupId,
    ) -> RepoResult<Vec<BlockParameter>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PARAMETER_SELECT_SQL}
             WHERE group_uuid = ?1
             ORDER BY order_number ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([group_uuid.to_string()])?;
        let mut parameters = Vec::new();
        while let Some(row) = rows.next()? {
            parameters.push(parse_parameter_row(row)?);
        }
        Ok(parameters)
    }

    fn list_parameters_by_block(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockParameter>> {
        self.query_parameters("block_uuid = ?1", block_uuid)
    }

    fn get_parameter(&self, uuid: ParameterId) -> RepoResult<Option<BlockParameter>> {
        get_parameter(self.conn, uuid)
    }

    fn create_parameter(&self, parameter: &BlockParameter) -> RepoResult<BlockParameter> {
        parameter.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut created = parameter.clone();
        created.order_number = next_order_number(
            &tx,
            "block_parameters",
            "group_uuid",
            Some(parameter.group_uuid),
        )?;
        insert_parameter_row(&tx, &created)?;
        if self.store == StoreKind::Book && created.is_default {
            ensure_parameter_slots_for_block(&tx, &created)?;
        }
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(created)
    }

    fn update_parameter(&self, parameter: &BlockParameter) -> RepoResult<()> {
        parameter.validate()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let previous = get_parameter(&tx, parameter.uuid)?.ok_or(RepoError::NotFound {
            entity: "parameter",
            uuid: parameter.uuid,
        })?;

        let order_number = if previous.group_uuid != parameter.group_uuid {
            next_order_number(
                &tx,
                "block_parameters",
                "group_uuid",
                Some(parameter.group_uuid),
            )?
        } else {
            previous.order_number
        };

        tx.execute(
            "UPDATE block_parameters
             SET group_uuid = ?2,
                 title = ?3,
                 description = ?4,
                 data_type = ?5,
                 linked_block_uuid = ?6,
                 is_default = ?7,
                 display_in_card = ?8,
                 order_number = ?9,
                 allow_multiple = ?10,
                 use_for_instance_grouping = ?11
             WHERE uuid = ?1;",
            params![
                parameter.uuid.to_string(),
                parameter.group_uuid.to_string(),
                parameter.title.trim(),
                parameter.description.as_str(),
                parameter.data_type.as_str(),
                optional_uuid_text(parameter.linked_block_uuid),
                bool_to_int(parameter.is_default),
                bool_to_int(parameter.display_in_card),
                order_number,
                bool_to_int(parameter.allow_multiple),
                bool_to_int(parameter.use_for_instance_grouping),
            ],
        )?;

        if previous.group_uuid != parameter.group_uuid {
            renumber_scope(
                &tx,
                "block_parameters",
                "group_uuid",
                Some(previous.group_uuid),
            )?;
        }

        if self.store == StoreKind::Book {
            if previous.group_uuid != parameter.group_uuid {
                tx.execute(
                    "UPDATE block_parameter_instances
                     SET block_parameter_group_uuid = ?2
                     WHERE block_parameter_uuid = ?1;",
                    params![parameter.uuid.to_string(), parameter.group_uuid.to_string()],
                )?;
            }
            if !previous.is_default && parameter.is_default {
                ensure_parameter_slots_for_block(&tx, parameter)?;
            }
            let was_link = previous.data_type == ParameterDataType::BlockLink;
            if parameter.data_type == ParameterDataType::BlockLink {
                if !was_link || previous.linked_block_uuid != parameter.linked_block_uuid {
                    clear_stale_link_values(&tx, parameter.uuid, parameter.linked_block_uuid)?;
                }
            } else if was_link {
                clear_stale_link_values(&tx, parameter.uuid, None)?;
            }
        }

        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_parameter(&self, uuid: ParameterId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let group_uuid = scope_of(&tx, "block_parameters", "group_uuid", uuid)?.ok_or(
            RepoError::NotFound {
                entity: "parameter",
                uuid,
            },
        )?;
        delete_parameter_cascade(&tx, self.store, uuid)?;
        renumber_scope(&tx, "block_parameters", "group_uuid", group_uuid)?;
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(())
    }

    fn move_parameter(&self, uuid: ParameterId, direction: MoveDirection) -> RepoResult<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let group_uuid = scope_of(&tx, "block_parameters", "group_uuid", uuid)?.ok_or(
            RepoError::NotFound {
                entity: "parameter",
                uuid,
            },
        )?;
        let moved = move_in_scope(
            &tx,
            "block_parameters",
            "group_uuid",
            group_uuid,
            uuid,
            direction,
        )?;
        if moved {
            touch_store(&tx, self.store)?;
        }
        tx.commit()?;
        Ok(moved)
    }

    fn list_default_parameters(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockParameter>> {
        self.query_parameters("block_uuid = ?1 AND is_default = 1", block_uuid)
    }

    fn list_card_parameters(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockParameter>> {
        self.query_parameters("block_uuid = ?1 AND display_in_card = 1", block_uuid)
    }

    fn list_referencing_parameters(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockParameter>> {
        self.query_parameters(
            "linked_block_uuid = ?1 AND data_type = 'block_link'",
            block_uuid,
        )
    }

    fn list_link_parameters(&self, block_uuid: Uuid) -> RepoResult<Vec<BlockParameter>> {
        self.query_parameters("block_uuid = ?1 AND data_type = 'block_link'", block_uuid)
    }

    fn grouping_parameter(&self, block_uuid: Uuid) -> RepoResult<Option<BlockParameter>> {
        let parameters = self.query_parameters(
            "block_uuid = ?1 AND data_type = 'block_link' AND use_for_instance_grouping = 1",
            block_uuid,
        )?;
        Ok(parameters.into_iter().next())
    }

    fn list_possible_values(&self, parameter_uuid: ParameterId) -> RepoResult<Vec<PossibleValue>> {
        list_possible_values(self.conn, parameter_uuid)
    }

    fn replace_possible_values(
        &self,
        parameter_uuid: ParameterId,
        values: &[String],
    ) -> RepoResult<Vec<PossibleValue>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if get_parameter(&tx, parameter_uuid)?.is_none() {
            return Err(RepoError::NotFound {
                entity: "parameter",
                uuid: parameter_uuid,
            });
        }

        tx.execute(
            "DELETE FROM block_parameter_possible_values WHERE parameter_uuid = ?1;",
            [parameter_uuid.to_string()],
        )?;
        let mut stored = Vec::with_capacity(values.len());
        for (index, value) in values.iter().enumerate() {
            let possible = PossibleValue {
                uuid: Uuid::new_v4(),
                parameter_uuid,
                value: value.trim().to_string(),
                order_number: index as i64,
            };
            insert_possible_value_row(&tx, &possible)?;
            stored.push(possible);
        }
        touch_store(&tx, self.store)?;
        tx.commit()?;
        Ok(stored)
    }
}

pub(crate) fn insert_group_row(conn: &Connection, group: &BlockParameterGroup) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO block_parameter_groups (
            uuid,
            block_uuid,
            title,
            description,
            order_number
        ) VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            group.uuid.to_string(),
            group.block_uuid.to_string(),
            group.title.trim(),
            group.description.as_str(),
            group.order_number,
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_parameter_row(
    conn: &Connection,
    parameter: &BlockParameter,
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO block_parameters (
            uuid,
            block_uuid,
            group_uuid,
            title,
            description,
            data_type,
            linked_block_uuid,
            is_default,
            display_in_card,
            order_number,
            allow_multiple,
            use_for_instance_grouping
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
        params![
            parameter.uuid.to_string(),
            parameter.block_uuid.to_string(),
            parameter.group_uuid.to_string(),
            parameter.title.trim(),
            parameter.description.as_str(),
            parameter.data_type.as_str(),
            optional_uuid_text(parameter.linked_block_uuid),
            bool_to_int(parameter.is_default),
            bool_to_int(parameter.display_in_card),
            parameter.order_number,
            bool_to_int(parameter.allow_multiple),
            bool_to_int(parameter.use_for_instance_grouping),
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_possible_value_row(
    conn: &Connection,
    value: &PossibleValue,
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO block_parameter_possible_values (
            uuid,
            parameter_uuid,
            value,
            order_number
        ) VALUES (?1, ?2, ?3, ?4);",
        params![
            value.uuid.to_string(),
            value.parameter_uuid.to_string(),
            value.value.as_str(),
            value.order_number,
        ],
    )?;
    Ok(())
}

/// Deletes one parameter with its possible values, instance values and
/// `referencing_param` tabs pointing at it.
pub(crate) fn delete_parameter_cascade(
    conn: &Connection,
    store: StoreKind,
    uuid: ParameterId,
) -> RepoResult<()> {
    let key = uuid.to_string();
    conn.execute(
        "DELETE FROM block_parameter_possible_values WHERE parameter_uuid = ?1;",
        [key.as_str()],
    )?;
    conn.execute(
        "DELETE FROM block_tabs
         WHERE tab_kind = 'referencing_param'
           AND referencing_param_uuid = ?1;",
        [key.as_str()],
    )?;
    if store == StoreKind::Book {
        conn.execute(
            "DELETE FROM block_parameter_instances WHERE block_parameter_uuid = ?1;",
            [key.as_str()],
        )?;
    }
    conn.execute("DELETE FROM block_parameters WHERE uuid = ?1;", [key.as_str()])?;
    Ok(())
}

/// Deletes every group and parameter of a block.
pub(crate) fn delete_parameters_of_block(
    conn: &Connection,
    store: StoreKind,
    block_uuid: Uuid,
) -> RepoResult<()> {
    for parameter in query_parameters(conn, "block_uuid = ?1", block_uuid)? {
        delete_parameter_cascade(conn, store, parameter.uuid)?;
    }
    conn.execute(
        "DELETE FROM block_parameter_groups WHERE block_uuid = ?1;",
        [block_uuid.to_string()],
    )?;
    Ok(())
}

pub(crate) fn list_groups_of_block(
    conn: &Connection,
    block_uuid: Uuid,
) -> RepoResult<Vec<BlockParameterGroup>> {
    let mut stmt = conn.prepare(&format!(
        "{GROUP_SELECT_SQL}
         WHERE block_uuid = ?1
         ORDER BY order_number ASC, id ASC;"
    ))?;
    let mut rows = stmt.query([block_uuid.to_string()])?;
    let mut groups = Vec::new();
    while let Some(row) = rows.next()? {
        groups.push(parse_group_row(row)?);
    }
    Ok(groups)
}

/// Runs `PARAMETER_SELECT_SQL` with a one-key filter in block display order.
pub(crate) fn query_parameters(
    conn: &Connection,
    filter: &str,
    key: Uuid,
) -> RepoResult<Vec<BlockParameter>> {
    let mut stmt = conn.prepare(&format!(
        "{PARAMETER_SELECT_SQL} WHERE {filter}{BLOCK_PARAMETER_ORDER_SQL}"
    ))?;
    let mut rows = stmt.query([key.to_string()])?;
    let mut parameters = Vec::new();
    while let Some(row) = rows.next()? {
        parameters.push(parse_parameter_row(row)?);
    }
    Ok(parameters)
}

pub(crate) fn get_parameter(
    conn: &Connection,
    uuid: ParameterId,
) -> RepoResult<Option<BlockParameter>> {
    let mut stmt = conn.prepare(&format!("{PARAMETER_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([uuid.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_parameter_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn list_possible_values(
    conn: &Connection,
    parameter_uuid: ParameterId,
) -> RepoResult<Vec<PossibleValue>> {
    let mut stmt = conn.prepare(
        "SELECT uuid, parameter_uuid, value, order_number
         FROM block_parameter_possible_values
         WHERE parameter_uuid = ?1
         ORDER BY order_number ASC, id ASC;",
    )?;
    let mut rows = stmt.query([parameter_uuid.to_string()])?;
    let mut values = Vec::new();
    while let Some(row) = rows.next()? {
        let uuid_text: String = row.get("uuid")?;
        let parameter_text: String = row.get("parameter_uuid")?;
        values.push(PossibleValue {
            uuid: parse_uuid(&uuid_text, "block_parameter_possible_values.uuid")?,
            parameter_uuid: parse_uuid(
                &parameter_text,
                "block_parameter_possible_values.parameter_uuid",
            )?,
            value: row.get("value")?,
            order_number: row.get("order_number")?,
        });
    }
    Ok(values)
}

/// Empties values of `parameter_uuid` that do not link an instance of
/// `linked_block_uuid`; with `None` every non-empty value is emptied.
/// Owning instances get a fresh `updated_at`.
fn clear_stale_link_values(
    conn: &Connection,
    parameter_uuid: ParameterId,
    linked_block_uuid: Option<Uuid>,
) -> RepoResult<usize> {
    const STALE_FILTER: &str = "block_parameter_uuid = ?1
        AND (value <> '' OR linked_instance_uuid IS NOT NULL)
        AND (linked_instance_uuid IS NULL
             OR linked_instance_uuid NOT IN (
                 SELECT uuid FROM block_instances WHERE block_uuid = ?2
             ))";
    let parameter_text = parameter_uuid.to_string();
    let linked_text = optional_uuid_text(linked_block_uuid);
    conn.execute(
        &format!(
            "UPDATE block_instances
             SET updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid IN (
                 SELECT block_instance_uuid
                 FROM block_parameter_instances
                 WHERE {STALE_FILTER}
             );"
        ),
        params![parameter_text, linked_text],
    )?;
    let cleared = conn.execute(
        &format!(
            "UPDATE block_parameter_instances
             SET value = '',
                 linked_instance_uuid = NULL
             WHERE {STALE_FILTER};"
        ),
        params![parameter_text, linked_text],
    )?;
    Ok(cleared)
}

fn parse_group_row(row: &Row<'_>) -> RepoResult<BlockParameterGroup> {
    let uuid_text: String = row.get("uuid")?;
    let block_text: String = row.get("block_uuid")?;
    Ok(BlockParameterGroup {
        uuid: parse_uuid(&uuid_text, "block_parameter_groups.uuid")?,
        block_uuid: parse_uuid(&block_text, "block_parameter_groups.block_uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        order_number: row.get("order_number")?,
    })
}

fn parse_parameter_row(row: &Row<'_>) -> RepoResult<BlockParameter> {
    let uuid_text: String = row.get("uuid")?;
    let block_text: String = row.get("block_uuid")?;
    let group_text: String = row.get("group_uuid")?;
    let data_type_text: String = row.get("data_type")?;
    let data_type = ParameterDataType::parse(&data_type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid data type `{data_type_text}` in block_parameters.data_type"
        ))
    })?;

    Ok(BlockParameter {
        uuid: parse_uuid(&uuid_text, "block_parameters.uuid")?,
        block_uuid: parse_uuid(&block_text, "block_parameters.block_uuid")?,
        group_uuid: parse_uuid(&group_text, "block_parameters.group_uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        data_type,
        linked_block_uuid: parse_optional_uuid(
            row.get("linked_block_uuid")?,
            "block_parameters.linked_block_uuid",
        )?,
        is_default: int_to_bool(row.get("is_default")?, "block_parameters.is_default")?,
        display_in_card: int_to_bool(
            row.get("display_in_card")?,
            "block_parameters.display_in_card",
        )?,
        order_number: row.get("order_number")?,
        allow_multiple: int_to_bool(row.get("allow_multiple")?, "block_parameters.allow_multiple")?,
        use_for_instance_grouping: int_to_bool(
            row.get("use_for_instance_grouping")?,
            "block_parameters.use_for_instance_grouping",
        )?,
    })
}
