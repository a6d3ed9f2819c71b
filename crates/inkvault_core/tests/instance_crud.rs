use inkvault_core::model::block::{Block, BlockRelation, RelationType, StructureKind};
use inkvault_core::model::configuration::BookConfiguration;
use inkvault_core::model::instance::{BlockInstance, BlockInstanceGroup, BlockParameterInstance};
use inkvault_core::model::parameter::{BlockParameter, ParameterDataType};
use inkvault_core::model::ModelValidationError;
use inkvault_core::{open_book_db_in_memory, MoveDirection};
use inkvault_core::repo::instance_repo::SqliteInstanceRepository;
use inkvault_core::repo::parameter_repo::SqliteParameterRepository;
use inkvault_core::repo::scene_repo::SqliteManuscriptRepository;
use inkvault_core::repo::schema_repo::SqliteSchemaRepository;
use inkvault_core::service::instance_service::{InstanceService, InstanceServiceError};
use inkvault_core::service::manuscript_service::ManuscriptService;
use inkvault_core::service::schema_service::SchemaService;
use rusqlite::Connection;

type Schema<'conn> = SchemaService<SqliteSchemaRepository<'conn>, SqliteParameterRepository<'conn>>;
type Instances<'conn> = InstanceService<
    SqliteInstanceRepository<'conn>,
    SqliteSchemaRepository<'conn>,
    SqliteParameterRepository<'conn>,
>;

struct Fixture<'conn> {
    schema: Schema<'conn>,
    instances: Instances<'conn>,
    configuration: BookConfiguration,
}

fn fixture(conn: &Connection) -> Fixture<'_> {
    let schema = SchemaService::new(
        SqliteSchemaRepository::try_new(conn).unwrap(),
        SqliteParameterRepository::try_new(conn).unwrap(),
    );
    let instances = InstanceService::new(
        SqliteInstanceRepository::try_new(conn).unwrap(),
        SqliteSchemaRepository::try_new(conn).unwrap(),
        SqliteParameterRepository::try_new(conn).unwrap(),
    );
    let configuration = schema.create_configuration("Saga", "").unwrap();
    Fixture {
        schema,
        instances,
        configuration,
    }
}

impl Fixture<'_> {
    fn block(&self, title: &str, structure: StructureKind) -> Block {
        self.schema
            .create_block(&Block::new(self.configuration.uuid, title, structure))
            .unwrap()
    }

    fn parameter(
        &self,
        block: &Block,
        title: &str,
        data_type: ParameterDataType,
        configure: impl FnOnce(&mut BlockParameter),
    ) -> BlockParameter {
        let group = self.schema.list_parameter_groups(block.uuid).unwrap().remove(0);
        let mut parameter = BlockParameter::new(block.uuid, group.uuid, title, data_type);
        configure(&mut parameter);
        self.schema.create_parameter(&parameter).unwrap()
    }

    fn instance(&self, block: &Block, title: &str) -> BlockInstance {
        self.instances
            .create_instance(&BlockInstance::new(block.uuid, title))
            .unwrap()
            .0
    }
}

#[test]
fn single_block_gets_exactly_one_instance() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);

    let world = fx.block("World", StructureKind::Single);

    let lone = fx.instances.list_instances(world.uuid, None).unwrap();
    assert_eq!(lone.len(), 1);
    assert_eq!(lone[0].title, "World");

    let err = fx
        .instances
        .create_instance(&BlockInstance::new(world.uuid, "Second"))
        .unwrap_err();
    assert!(matches!(err, InstanceServiceError::SingleBlockOccupied(id) if id == world.uuid));
}

#[test]
fn default_parameters_receive_value_slots() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let hero = fx.block("Hero", StructureKind::Multiple);
    let age = fx.parameter(&hero, "Age", ParameterDataType::String, |p| {
        p.is_default = true
    });
    fx.parameter(&hero, "Motto", ParameterDataType::Text, |_| {});

    let (instance, slots) = fx
        .instances
        .create_instance(&BlockInstance::new(hero.uuid, "Aria"))
        .unwrap();

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].block_parameter_uuid, age.uuid);
    assert_eq!(slots[0].value, "");
    assert!(fx
        .instances
        .append_default_parameters(instance.uuid)
        .unwrap()
        .is_empty());
}

#[test]
fn scalar_values_are_validated_and_slots_reused() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let hero = fx.block("Hero", StructureKind::Multiple);
    let born = fx.parameter(&hero, "Born", ParameterDataType::DatePicker, |_| {});
    let alive = fx.parameter(&hero, "Alive", ParameterDataType::Checkbox, |_| {});
    let aria = fx.instance(&hero, "Aria");

    let first = fx.instances.set_value(aria.uuid, born.uuid, " 1201-03-14 ").unwrap();
    assert_eq!(first.value, "1201-03-14");
    let second = fx.instances.set_value(aria.uuid, born.uuid, "1202-01-01").unwrap();
    assert_eq!(second.uuid, first.uuid);

    let err = fx.instances.set_value(aria.uuid, alive.uuid, "maybe").unwrap_err();
    assert!(matches!(
        err,
        InstanceServiceError::InvalidValue(ModelValidationError::InvalidValue { .. })
    ));

    let values = fx.instances.list_values(aria.uuid).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].value, "1202-01-01");
}

#[test]
fn link_values_point_at_instances_of_linked_block() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let hero = fx.block("Hero", StructureKind::Multiple);
    let city = fx.block("City", StructureKind::Multiple);
    let home = fx.parameter(&hero, "Home", ParameterDataType::BlockLink, |p| {
        p.linked_block_uuid = Some(city.uuid)
    });
    let aria = fx.instance(&hero, "Aria");
    let bren = fx.instance(&hero, "Bren");
    let port = fx.instance(&city, "Port Sable");

    let err = fx
        .instances
        .set_value(aria.uuid, home.uuid, &bren.uuid.to_string())
        .unwrap_err();
    assert!(matches!(err, InstanceServiceError::LinkTargetMismatch { .. }));

    let linked = fx
        .instances
        .set_value(aria.uuid, home.uuid, &port.uuid.to_string())
        .unwrap();
    assert_eq!(linked.linked_instance_uuid, Some(port.uuid));
    assert_eq!(linked.value, port.uuid.to_string());

    let referencing = fx.instances.list_referencing_values(port.uuid).unwrap();
    assert_eq!(referencing.len(), 1);
    assert_eq!(referencing[0].block_instance_uuid, aria.uuid);

    fx.instances.delete_instance(port.uuid).unwrap();
    assert!(fx.instances.list_values(aria.uuid).unwrap().is_empty());
}

#[test]
fn nested_instances_follow_block_hosting() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let city = fx.block("City", StructureKind::Multiple);
    let hero = fx.block("Hero", StructureKind::Multiple);
    let district = fx.block("District", StructureKind::Multiple);
    fx.schema.link_nested_to_host(district.uuid, city.uuid).unwrap();

    let port = fx.instance(&city, "Port Sable");
    let aria = fx.instance(&hero, "Aria");

    let mut docks = BlockInstance::new(district.uuid, "Docks");
    docks.host_instance_uuid = Some(aria.uuid);
    let err = fx.instances.create_instance(&docks).unwrap_err();
    assert!(matches!(err, InstanceServiceError::HostMismatch { .. }));

    docks.host_instance_uuid = Some(port.uuid);
    fx.instances.create_instance(&docks).unwrap();
    let nested = fx
        .instances
        .list_nested(port.uuid, Some(district.uuid))
        .unwrap();
    assert_eq!(nested.len(), 1);

    fx.instances.delete_instance(port.uuid).unwrap();
    assert!(fx.instances.get_instance(docks.uuid).unwrap().is_none());
}

#[test]
fn instance_tree_rejects_cycles_and_reparents_on_delete() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let place = fx.block("Place", StructureKind::Multiple);
    let realm = fx.instance(&place, "Realm");
    let mut province = BlockInstance::new(place.uuid, "Province");
    province.parent_instance_uuid = Some(realm.uuid);
    fx.instances.create_instance(&province).unwrap();
    let mut town = BlockInstance::new(place.uuid, "Town");
    town.parent_instance_uuid = Some(province.uuid);
    fx.instances.create_instance(&town).unwrap();

    let err = fx
        .instances
        .move_instance(realm.uuid, Some(town.uuid), None)
        .unwrap_err();
    assert!(matches!(err, InstanceServiceError::CycleDetected { .. }));

    fx.instances.delete_instance(province.uuid).unwrap();
    let children = fx.instances.list_children(realm.uuid).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].uuid, town.uuid);
}

#[test]
fn instance_relations_are_oriented_by_declaration() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let hero = fx.block("Hero", StructureKind::Multiple);
    let guild = fx.block("Guild", StructureKind::Multiple);
    let city = fx.block("City", StructureKind::Multiple);
    let membership = BlockRelation::new(
        fx.configuration.uuid,
        hero.uuid,
        guild.uuid,
        RelationType::ManyToOne,
    );
    fx.schema.save_relation(&membership).unwrap();
    let aria = fx.instance(&hero, "Aria");
    let thieves = fx.instance(&guild, "Thieves");
    let port = fx.instance(&city, "Port Sable");

    let relation = fx
        .instances
        .create_instance_relation(membership.uuid, thieves.uuid, aria.uuid)
        .unwrap();
    assert_eq!(relation.source_instance_uuid, aria.uuid);
    assert_eq!(relation.target_instance_uuid, thieves.uuid);

    let err = fx
        .instances
        .create_instance_relation(membership.uuid, aria.uuid, port.uuid)
        .unwrap_err();
    assert!(matches!(err, InstanceServiceError::RelationMismatch(_)));

    let towards_guild = fx
        .instances
        .list_instance_relations(aria.uuid, Some(guild.uuid))
        .unwrap();
    assert_eq!(towards_guild.len(), 1);
    assert!(fx
        .instances
        .list_instance_relations(aria.uuid, Some(city.uuid))
        .unwrap()
        .is_empty());

    fx.instances.delete_instance(thieves.uuid).unwrap();
    assert!(fx
        .instances
        .list_instance_relations(aria.uuid, None)
        .unwrap()
        .is_empty());
}

#[test]
fn scene_links_require_permission_and_scene() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let manuscript = ManuscriptService::new(SqliteManuscriptRepository::try_new(&conn).unwrap());
    let prop = fx.block("Prop", StructureKind::Multiple);
    let mut hero = fx.block("Hero", StructureKind::Multiple);
    hero.scene_link_allowed = true;
    fx.schema.update_block(&hero).unwrap();
    let lamp = fx.instance(&prop, "Lamp");
    let aria = fx.instance(&hero, "Aria");
    let scene = manuscript.create_scene("Arrival", None, "She came.").unwrap();

    let err = fx.instances.link_to_scene(lamp.uuid, scene.uuid, None).unwrap_err();
    assert!(matches!(err, InstanceServiceError::SceneLinksNotAllowed(id) if id == prop.uuid));
    let missing = uuid::Uuid::new_v4();
    let err = fx.instances.link_to_scene(aria.uuid, missing, None).unwrap_err();
    assert!(matches!(err, InstanceServiceError::SceneNotFound(id) if id == missing));

    let link = fx
        .instances
        .link_to_scene(aria.uuid, scene.uuid, Some("POV".to_string()))
        .unwrap();
    assert_eq!(
        fx.instances.list_scene_links_by_scene(scene.uuid).unwrap(),
        vec![link]
    );

    manuscript.delete_scene(scene.uuid).unwrap();
    assert!(fx
        .instances
        .list_scene_links_by_instance(aria.uuid)
        .unwrap()
        .is_empty());
}

#[test]
fn list_instances_filters_by_title_case_insensitively() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let hero = fx.block("Hero", StructureKind::Multiple);
    fx.instance(&hero, "Aria Vell");
    fx.instance(&hero, "Bren");
    fx.instance(&hero, "Mara Vellis");

    let titles: Vec<String> = fx
        .instances
        .list_instances(hero.uuid, Some("VELL"))
        .unwrap()
        .into_iter()
        .map(|instance| instance.title)
        .collect();
    assert_eq!(titles, vec!["Aria Vell", "Mara Vellis"]);
}

#[test]
fn retargeting_link_parameter_clears_stale_values() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let hero = fx.block("Hero", StructureKind::Multiple);
    let city = fx.block("City", StructureKind::Multiple);
    let realm = fx.block("Realm", StructureKind::Multiple);
    let mut home = fx.parameter(&hero, "Home", ParameterDataType::BlockLink, |p| {
        p.linked_block_uuid = Some(city.uuid)
    });
    let aria = fx.instance(&hero, "Aria");
    let port = fx.instance(&city, "Port Sable");
    let north = fx.instance(&realm, "North");
    fx.instances
        .set_value(aria.uuid, home.uuid, &port.uuid.to_string())
        .unwrap();

    home.linked_block_uuid = Some(realm.uuid);
    fx.schema.update_parameter(&home).unwrap();

    let values = fx.instances.list_values(aria.uuid).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].value, "");
    assert_eq!(values[0].linked_instance_uuid, None);
    assert!(fx.instances.list_referencing_values(port.uuid).unwrap().is_empty());

    let relinked = fx
        .instances
        .set_value(aria.uuid, home.uuid, &north.uuid.to_string())
        .unwrap();
    assert_eq!(relinked.linked_instance_uuid, Some(north.uuid));

    home.data_type = ParameterDataType::String;
    home.linked_block_uuid = None;
    fx.schema.update_parameter(&home).unwrap();

    let values = fx.instances.list_values(aria.uuid).unwrap();
    assert_eq!(values[0].value, "");
    assert_eq!(values[0].linked_instance_uuid, None);
}

#[test]
fn single_valued_parameter_holds_one_value_per_instance() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let hero = fx.block("Hero", StructureKind::Multiple);
    let motto = fx.parameter(&hero, "Motto", ParameterDataType::String, |_| {});
    let titles = fx.parameter(&hero, "Titles", ParameterDataType::String, |p| {
        p.allow_multiple = true
    });
    let aria = fx.instance(&hero, "Aria");
    let bren = fx.instance(&hero, "Bren");

    let stored = fx.instances.set_value(aria.uuid, motto.uuid, "Onward").unwrap();
    let mut extra = BlockParameterInstance::empty(aria.uuid, motto.uuid, motto.group_uuid);
    extra.value = "Again".to_string();
    let err = fx.instances.save_value(&extra).unwrap_err();
    assert!(matches!(
        err,
        InstanceServiceError::ParameterAlreadySet { instance_uuid, parameter_uuid }
            if instance_uuid == aria.uuid && parameter_uuid == motto.uuid
    ));

    for title in ["Knight", "Warden"] {
        let mut value = BlockParameterInstance::empty(aria.uuid, titles.uuid, titles.group_uuid);
        value.value = title.to_string();
        fx.instances.save_value(&value).unwrap();
    }
    let titles_count = fx
        .instances
        .list_values(aria.uuid)
        .unwrap()
        .iter()
        .filter(|value| value.block_parameter_uuid == titles.uuid)
        .count();
    assert_eq!(titles_count, 2);

    let mut moved = stored.clone();
    moved.block_instance_uuid = bren.uuid;
    let err = fx.instances.save_value(&moved).unwrap_err();
    assert!(matches!(err, InstanceServiceError::ValueOwnerChangeNotAllowed(id) if id == stored.uuid));
    assert!(fx.instances.list_values(bren.uuid).unwrap().is_empty());
}

#[test]
fn instance_groups_are_ordered_and_released_on_delete() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let hero = fx.block("Hero", StructureKind::Multiple);
    let mut knights = fx
        .instances
        .save_group(&BlockInstanceGroup::new(hero.uuid, "Knights"))
        .unwrap();
    let mages = fx
        .instances
        .save_group(&BlockInstanceGroup::new(hero.uuid, "Mages"))
        .unwrap();
    let rogues = fx
        .instances
        .save_group(&BlockInstanceGroup::new(hero.uuid, "Rogues"))
        .unwrap();
    assert_eq!(
        (knights.order_number, mages.order_number, rogues.order_number),
        (0, 1, 2)
    );

    knights.title = "Paladins".to_string();
    let renamed = fx.instances.save_group(&knights).unwrap();
    assert_eq!(renamed.order_number, 0);

    assert!(fx.instances.move_group(rogues.uuid, MoveDirection::Up).unwrap());
    assert!(!fx.instances.move_group(knights.uuid, MoveDirection::Up).unwrap());
    let titles: Vec<_> = fx
        .instances
        .list_groups(hero.uuid)
        .unwrap()
        .into_iter()
        .map(|group| group.title)
        .collect();
    assert_eq!(titles, ["Paladins", "Rogues", "Mages"]);

    let mut aria = BlockInstance::new(hero.uuid, "Aria");
    aria.group_uuid = Some(knights.uuid);
    fx.instances.create_instance(&aria).unwrap();

    fx.instances.delete_group(knights.uuid).unwrap();

    let released = fx.instances.get_instance(aria.uuid).unwrap().unwrap();
    assert_eq!(released.group_uuid, None);
    let remaining: Vec<_> = fx
        .instances
        .list_groups(hero.uuid)
        .unwrap()
        .into_iter()
        .map(|group| (group.title, group.order_number))
        .collect();
    assert_eq!(
        remaining,
        vec![("Rogues".to_string(), 0), ("Mages".to_string(), 1)]
    );
}

#[test]
fn moving_instance_regroups_its_descendants() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let place = fx.block("Place", StructureKind::Multiple);
    let north = fx
        .instances
        .save_group(&BlockInstanceGroup::new(place.uuid, "North"))
        .unwrap();
    let realm = fx.instance(&place, "Realm");
    let mut province = BlockInstance::new(place.uuid, "Province");
    province.parent_instance_uuid = Some(realm.uuid);
    fx.instances.create_instance(&province).unwrap();
    let mut town = BlockInstance::new(place.uuid, "Town");
    town.parent_instance_uuid = Some(province.uuid);
    fx.instances.create_instance(&town).unwrap();

    fx.instances
        .move_instance(province.uuid, None, Some(north.uuid))
        .unwrap();

    let moved = fx.instances.get_instance(province.uuid).unwrap().unwrap();
    assert_eq!(moved.parent_instance_uuid, None);
    assert_eq!(moved.group_uuid, Some(north.uuid));
    let town = fx.instances.get_instance(town.uuid).unwrap().unwrap();
    assert_eq!(town.group_uuid, Some(north.uuid));
    assert_eq!(town.parent_instance_uuid, Some(province.uuid));
    let realm = fx.instances.get_instance(realm.uuid).unwrap().unwrap();
    assert_eq!(realm.group_uuid, None);
}

#[test]
fn default_flag_backfills_slots_on_single_blocks_only() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let world = fx.block("World", StructureKind::Single);
    let hero = fx.block("Hero", StructureKind::Multiple);
    let mut era = fx.parameter(&world, "Era", ParameterDataType::String, |_| {});
    let mut motto = fx.parameter(&hero, "Motto", ParameterDataType::String, |_| {});
    let lone = fx.instances.list_instances(world.uuid, None).unwrap().remove(0);
    let aria = fx.instance(&hero, "Aria");
    assert!(fx.instances.list_values(lone.uuid).unwrap().is_empty());

    era.is_default = true;
    fx.schema.update_parameter(&era).unwrap();
    motto.is_default = true;
    fx.schema.update_parameter(&motto).unwrap();

    let slots = fx.instances.list_values(lone.uuid).unwrap();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].block_parameter_uuid, era.uuid);
    assert_eq!(slots[0].value, "");
    assert!(fx.instances.list_values(aria.uuid).unwrap().is_empty());
}

#[test]
fn deleting_block_removes_its_instances_and_groups() {
    let conn = open_book_db_in_memory().unwrap();
    let fx = fixture(&conn);
    let hero = fx.block("Hero", StructureKind::Multiple);
    let city = fx.block("City", StructureKind::Multiple);
    let motto = fx.parameter(&hero, "Motto", ParameterDataType::String, |_| {});
    let knights = fx
        .instances
        .save_group(&BlockInstanceGroup::new(hero.uuid, "Knights"))
        .unwrap();
    let mut aria = BlockInstance::new(hero.uuid, "Aria");
    aria.group_uuid = Some(knights.uuid);
    fx.instances.create_instance(&aria).unwrap();
    fx.instances.set_value(aria.uuid, motto.uuid, "Onward").unwrap();
    let port = fx.instance(&city, "Port Sable");

    fx.schema.delete_block(hero.uuid).unwrap();

    assert!(fx.instances.get_instance(aria.uuid).unwrap().is_none());
    assert!(fx.instances.list_values(aria.uuid).unwrap().is_empty());
    assert!(fx.instances.list_groups(hero.uuid).unwrap().is_empty());
    assert!(fx.instances.get_instance(port.uuid).unwrap().is_some());
}
